//! AIM (Annotation and Image Markup) document export for a finished report.
//!
//! The exporter walks the report's markup subtree, re-resolves every
//! annotation to its slice, and writes one XML document cross-referenced
//! against the DICOM header database. All document state is local to one
//! export call.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use thiserror::Error;

use crate::dicom_db::{
    strip_bracketed, HeaderLookup, TAG_SERIES_INSTANCE_UID, TAG_SOP_INSTANCE_UID,
    TAG_STUDY_INSTANCE_UID,
};
use crate::model::{MarkupKind, NodeId, SceneNode};
use crate::resolver;
use crate::scene::Scene;
use crate::Reporting;

const AIM_XMLNS: &str = "gme://caCORE.caCORE/3.2/edu.northwestern.radiology.AIM";
const AIM_VERSION: &str = "3.0";
const XSI_XMLNS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const AIM_SCHEMA_LOCATION: &str =
    "gme://caCORE.caCORE/3.2/edu.northwestern.radiology.AIM AIM_v3_rv11_XML.xsd";
// yyyy/mm/dd-hh-mm-ss-ms-±hh:mm
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d-%H-%M-%S-00-%:z";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{0} is not a report node in the scene")]
    ReportNotFound(NodeId),
    #[error("no markup hierarchy found for report {0}")]
    MarkupNotFound(NodeId),
    #[error("annotation {0} does not resolve to a single DICOM slice")]
    UnresolvedSlice(String),
    #[error("annotation {name}: expected {expected} projected point(s), got {actual}")]
    BadCoordinateCount {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("empty {field} UID for instance {uid}")]
    EmptyHeaderValue { field: &'static str, uid: String },
    #[error("failed to build the AIM document: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One annotation, resolved and projected, in discovery order.
struct ShapeRecord {
    kind: MarkupKind,
    slice_uid: String,
    points: Vec<(f64, f64)>,
}

/// Study → series and series → image groupings, duplicates suppressed.
struct ImageReferences {
    study_to_series: BTreeMap<String, Vec<String>>,
    series_to_images: BTreeMap<String, Vec<String>>,
}

impl Reporting {
    /// Serializes the report's annotations and their DICOM cross-references
    /// to an AIM XML file at `path`.
    ///
    /// The markup set is always re-derived from the report's own volume; a
    /// report without a volume fails with [`ExportError::MarkupNotFound`].
    /// The whole export fails when any annotation does not resolve to a
    /// single slice or a header lookup comes back empty; no partially valid
    /// document is produced. The scene must not be mutated concurrently
    /// during the call.
    pub fn export_report(
        &mut self,
        scene: &mut dyn Scene,
        database: &mut dyn HeaderLookup,
        report_id: &NodeId,
        path: &Path,
    ) -> Result<(), ExportError> {
        let description = match scene.node(report_id) {
            Some(SceneNode::Report(report)) => report.description.clone().unwrap_or_default(),
            _ => return Err(ExportError::ReportNotFound(report_id.clone())),
        };

        // re-derive the markup set from this report's volume; the session
        // pointer may still be aimed at another report's markup set, so it
        // is never consulted without the derivation
        let volume_id = self
            .volume_id_for_report(scene, report_id)
            .ok_or_else(|| ExportError::MarkupNotFound(report_id.clone()))?;
        self.set_active_markup_hierarchy_from_node(scene, &volume_id);
        let markup = self
            .session
            .active_markup()
            .cloned()
            .ok_or_else(|| ExportError::MarkupNotFound(report_id.clone()))?;

        let shapes = self.collect_shapes(scene, &markup)?;
        let mut slice_uids: Vec<String> = Vec::new();
        for shape in &shapes {
            if !slice_uids.contains(&shape.slice_uid) {
                slice_uids.push(shape.slice_uid.clone());
            }
        }
        let references = cross_reference(database, &slice_uids)?;

        let xml = build_document(&description, &shapes, &references)?;
        fs::write(path, xml).map_err(|source| ExportError::Write {
            path: path.to_owned(),
            source,
        })?;
        log::info!("wrote AIM report for {report_id} to {}", path.display());
        Ok(())
    }

    /// Depth-first walk of the markup subtree, one shape per annotation.
    fn collect_shapes(
        &self,
        scene: &dyn Scene,
        markup_id: &NodeId,
    ) -> Result<Vec<ShapeRecord>, ExportError> {
        let mut shapes = Vec::new();
        for child in self.hierarchy.all_children(markup_id) {
            let associated = scene
                .node(&child)
                .and_then(SceneNode::as_hierarchy)
                .and_then(|h| h.associated_id.clone());
            let Some(content) = associated else { continue };
            let (name, kind) = match scene.node(&content) {
                Some(SceneNode::Annotation(annotation)) => {
                    (annotation.name.clone(), annotation.kind)
                }
                Some(other) => {
                    log::warn!("unsupported markup content {} in the markup set", other.name());
                    continue;
                }
                None => continue,
            };

            let slice_uid = resolver::resolve_slice_uid(scene, &content)
                .ok_or_else(|| ExportError::UnresolvedSlice(name.clone()))?;
            let points = resolver::markup_point_coordinates(scene, &content).unwrap_or_default();
            let expected = match kind {
                MarkupKind::Fiducial => 1,
                MarkupKind::Ruler => 2,
            };
            if points.len() != expected {
                return Err(ExportError::BadCoordinateCount {
                    name,
                    expected,
                    actual: points.len(),
                });
            }
            shapes.push(ShapeRecord {
                kind,
                slice_uid,
                points,
            });
        }
        Ok(shapes)
    }
}

fn cross_reference(
    database: &mut dyn HeaderLookup,
    slice_uids: &[String],
) -> Result<ImageReferences, ExportError> {
    let mut references = ImageReferences {
        study_to_series: BTreeMap::new(),
        series_to_images: BTreeMap::new(),
    };
    for uid in slice_uids {
        database.load_instance_header(uid);
        let image = required_header(database, TAG_SOP_INSTANCE_UID, "image", uid)?;
        let study = required_header(database, TAG_STUDY_INSTANCE_UID, "study", uid)?;
        let series = required_header(database, TAG_SERIES_INSTANCE_UID, "series", uid)?;

        let images = references.series_to_images.entry(series.clone()).or_default();
        if !images.contains(&image) {
            images.push(image);
        }
        let series_list = references.study_to_series.entry(study).or_default();
        if !series_list.contains(&series) {
            series_list.push(series);
        }
    }
    Ok(references)
}

fn required_header(
    database: &dyn HeaderLookup,
    tag: &str,
    field: &'static str,
    uid: &str,
) -> Result<String, ExportError> {
    let raw = database.header_value(tag);
    match strip_bracketed(&raw) {
        Some(value) if !value.is_empty() => Ok(value.to_owned()),
        _ => Err(ExportError::EmptyHeaderValue {
            field,
            uid: uid.to_owned(),
        }),
    }
}

fn document_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn build_document(
    description: &str,
    shapes: &[ShapeRecord],
    references: &ImageReferences,
) -> Result<String, ExportError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;

    let timestamp = document_timestamp();
    let mut root = BytesStart::new("ImageAnnotation");
    root.push_attribute(("xmlns", AIM_XMLNS));
    root.push_attribute(("aimVersion", AIM_VERSION));
    root.push_attribute(("cagridId", "0"));
    root.push_attribute(("codeMeaning", "Response Assessment in Neuro-Oncology"));
    root.push_attribute(("codeValue", "RANO"));
    root.push_attribute(("codeSchemeDesignator", "RANO"));
    root.push_attribute(("dateTime", timestamp.as_str()));
    root.push_attribute(("name", description));
    root.push_attribute(("uniqueIdentifier", "n.a"));
    root.push_attribute(("xmlns:xsi", XSI_XMLNS));
    root.push_attribute(("xsi:schemaLocation", AIM_SCHEMA_LOCATION));
    writer.write_event(Event::Start(root))?;

    // user / equipment / person identity blocks, best effort
    let login = std::env::var("USER").unwrap_or_default();
    let mut user = BytesStart::new("user");
    user.push_attribute(("cagridId", "0"));
    user.push_attribute(("loginName", login.as_str()));
    user.push_attribute(("name", env!("CARGO_PKG_NAME")));
    user.push_attribute(("numberWithinRoleOfClinicalTrial", "1"));
    user.push_attribute(("roleInTrial", "Performing"));
    writer.write_event(Event::Empty(user))?;

    let host = std::env::var("HOST")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_default();
    let mut equipment = BytesStart::new("equipment");
    equipment.push_attribute(("cagridId", "0"));
    equipment.push_attribute(("manufacturerModelName", env!("CARGO_PKG_NAME")));
    equipment.push_attribute(("manufacturerName", host.as_str()));
    equipment.push_attribute(("softwareVersion", env!("CARGO_PKG_VERSION")));
    writer.write_event(Event::Empty(equipment))?;

    let mut person = BytesStart::new("person");
    person.push_attribute(("birthDate", "1990-01-01T00:00:00"));
    person.push_attribute(("cagridId", "0"));
    person.push_attribute(("id", "123456"));
    person.push_attribute(("name", "Anonymous"));
    person.push_attribute(("sex", "M"));
    writer.write_event(Event::Empty(person))?;

    writer.write_event(Event::Start(BytesStart::new("geometricShapeCollection")))?;
    for (shape_id, shape) in shapes.iter().enumerate() {
        let xsi_type = match shape.kind {
            MarkupKind::Fiducial => "Point",
            MarkupKind::Ruler => "MultiPoint",
        };
        let id_text = shape_id.to_string();
        let mut gs = BytesStart::new("GeometricShape");
        gs.push_attribute(("xsi:type", xsi_type));
        gs.push_attribute(("shapeIdentifier", id_text.as_str()));
        gs.push_attribute(("includeFlag", "true"));
        gs.push_attribute(("cagridId", "0"));
        writer.write_event(Event::Start(gs))?;

        writer.write_event(Event::Start(BytesStart::new("spatialCoordinateCollection")))?;
        for (x, y) in &shape.points {
            let x_text = x.to_string();
            let y_text = y.to_string();
            let mut sc = BytesStart::new("SpatialCoordinate");
            sc.push_attribute(("cagridId", "0"));
            sc.push_attribute(("coordinateIndex", "0"));
            sc.push_attribute(("imageReferenceUID", shape.slice_uid.as_str()));
            sc.push_attribute(("referenceFrameNumber", "1"));
            sc.push_attribute(("xsi:type", "TwoDimensionSpatialCoordinate"));
            sc.push_attribute(("x", x_text.as_str()));
            sc.push_attribute(("y", y_text.as_str()));
            writer.write_event(Event::Empty(sc))?;
        }
        writer.write_event(Event::End(BytesEnd::new("spatialCoordinateCollection")))?;
        writer.write_event(Event::End(BytesEnd::new("GeometricShape")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("geometricShapeCollection")))?;

    writer.write_event(Event::Start(BytesStart::new("imageReferenceCollection")))?;
    for (study_uid, series_uids) in &references.study_to_series {
        for series_uid in series_uids {
            let mut reference = BytesStart::new("ImageReference");
            reference.push_attribute(("cagridId", "0"));
            reference.push_attribute(("xsi:type", "DICOMImageReference"));
            writer.write_event(Event::Start(reference))?;

            writer.write_event(Event::Start(BytesStart::new("imageStudy")))?;
            let mut study = BytesStart::new("ImageStudy");
            study.push_attribute(("cagridId", "0"));
            study.push_attribute(("instanceUID", study_uid.as_str()));
            study.push_attribute(("startDate", "2000-01-01T00:00:00"));
            study.push_attribute(("startTime", "000000"));
            writer.write_event(Event::Start(study))?;

            writer.write_event(Event::Start(BytesStart::new("imageSeries")))?;
            let mut series = BytesStart::new("ImageSeries");
            series.push_attribute(("cagridId", "0"));
            series.push_attribute(("instanceUID", series_uid.as_str()));
            writer.write_event(Event::Empty(series))?;

            writer.write_event(Event::Start(BytesStart::new("imageCollection")))?;
            if let Some(images) = references.series_to_images.get(series_uid) {
                for image_uid in images {
                    let mut image = BytesStart::new("Image");
                    image.push_attribute(("cagridId", "0"));
                    image.push_attribute(("sopClassUID", "NA"));
                    image.push_attribute(("sopInstanceUID", image_uid.as_str()));
                    writer.write_event(Event::Empty(image))?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new("imageCollection")))?;
            writer.write_event(Event::End(BytesEnd::new("imageSeries")))?;
            writer.write_event(Event::End(BytesEnd::new("ImageStudy")))?;
            writer.write_event(Event::End(BytesEnd::new("imageStudy")))?;
            writer.write_event(Event::End(BytesEnd::new("ImageReference")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("imageReferenceCollection")))?;
    writer.write_event(Event::End(BytesEnd::new("ImageAnnotation")))?;

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}
