//! Slice identity: mapping a spatial annotation to the DICOM instance it was
//! drawn on.
//!
//! Everything here is a pure query over the scene; failures are logged and
//! reported through `None`, never thrown.

use crate::model::{NodeId, SceneNode};
use crate::scene::Scene;

/// Resolves the single DICOM instance UID under every control point of an
/// annotation.
///
/// Returns `None` whenever the annotation cannot be tied to exactly one
/// slice: the node is missing or not an annotation, its volume association
/// is missing or not a DICOM volume, it has no control points, or its points
/// land on different slices. Multi-slice annotations are an expected
/// outcome, not a bug; callers fall back on their own policy.
pub fn resolve_slice_uid(scene: &dyn Scene, annotation_id: &NodeId) -> Option<String> {
    let annotation = match scene.node(annotation_id) {
        Some(SceneNode::Annotation(annotation)) => annotation,
        Some(_) => {
            log::error!("resolve_slice_uid: {annotation_id} is not an annotation node");
            return None;
        }
        None => {
            log::error!("resolve_slice_uid: no node with id {annotation_id}");
            return None;
        }
    };
    let Some(volume_id) = &annotation.associated_volume_id else {
        log::debug!(
            "resolve_slice_uid: annotation {} has no associated volume",
            annotation.name
        );
        return None;
    };
    let volume = match scene.node(volume_id) {
        Some(SceneNode::Volume(volume)) => volume,
        Some(_) => {
            log::error!("resolve_slice_uid: associated node {volume_id} is not a volume");
            return None;
        }
        None => {
            log::error!("resolve_slice_uid: associated volume {volume_id} not found");
            return None;
        }
    };
    let Some(raw_uids) = &volume.instance_uids else {
        log::error!(
            "resolve_slice_uid: volume {} carries no per-slice instance UID list",
            volume.name
        );
        return None;
    };
    let uids: Vec<&str> = raw_uids.split_whitespace().collect();
    if uids.is_empty() {
        log::error!(
            "resolve_slice_uid: volume {} has an empty instance UID list",
            volume.name
        );
        return None;
    }

    let mut common: Option<&str> = None;
    for (index, point) in annotation.points.iter().enumerate() {
        let ijk = volume.ras_to_ijk.apply(*point);
        let k = ijk[2].round();
        // UIDs are ordered by slice index; an out-of-range index means
        // multi-frame data, which collapses onto the first entry for now
        let uid = if k >= 0.0 && (k as usize) < uids.len() {
            uids[k as usize]
        } else {
            uids[0]
        };
        match common {
            None => common = Some(uid),
            Some(seed) if seed != uid => {
                log::warn!(
                    "annotation {} point {index} lies on slice {uid} but earlier points on {seed}; \
                     not resolvable to one slice",
                    annotation.name
                );
                return None;
            }
            Some(_) => {}
        }
    }
    // with zero control points nothing was produced
    common.map(str::to_owned)
}

/// Volume the annotation was drawn on, when present and actually a volume.
pub fn annotation_volume(scene: &dyn Scene, annotation_id: &NodeId) -> Option<NodeId> {
    let annotation = scene.node(annotation_id)?.as_annotation()?;
    let volume_id = annotation.associated_volume_id.clone()?;
    match scene.node(&volume_id) {
        Some(SceneNode::Volume(_)) => Some(volume_id),
        _ => {
            log::error!("annotation_volume: associated node {volume_id} is not a volume");
            None
        }
    }
}

/// Control points projected into the volume's voxel space, keeping the
/// in-plane (i, j) pair per point. Assumes acquisition along the volume's
/// z axis.
pub fn markup_point_coordinates(
    scene: &dyn Scene,
    annotation_id: &NodeId,
) -> Option<Vec<(f64, f64)>> {
    let volume_id = annotation_volume(scene, annotation_id)?;
    let volume = scene.node(&volume_id)?.as_volume()?;
    let annotation = scene.node(annotation_id)?.as_annotation()?;
    Some(
        annotation
            .points
            .iter()
            .map(|point| {
                let ijk = volume.ras_to_ijk.apply(*point);
                (ijk[0], ijk[1])
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationNode, RasToIjk, ReportNode, VolumeNode};
    use crate::scene::MemoryScene;

    fn add_dicom_volume(scene: &mut MemoryScene) -> NodeId {
        let mut volume = VolumeNode::new("CT chest");
        volume.instance_uids = Some("UID0 UID1 UID2".to_owned());
        scene.add_node(SceneNode::Volume(volume))
    }

    fn add_fiducial(scene: &mut MemoryScene, volume: &NodeId, z: f64) -> NodeId {
        let mut annotation = AnnotationNode::fiducial("tumor", [0.0, 0.0, z]);
        annotation.associated_volume_id = Some(volume.clone());
        scene.add_node(SceneNode::Annotation(annotation))
    }

    #[test]
    fn rounds_to_nearest_slice_index() {
        let mut scene = MemoryScene::new();
        let volume = add_dicom_volume(&mut scene);
        let annotation = add_fiducial(&mut scene, &volume, 1.4);
        assert_eq!(resolve_slice_uid(&scene, &annotation).as_deref(), Some("UID1"));
    }

    #[test]
    fn resolves_point_at_list_boundary() {
        let mut scene = MemoryScene::new();
        let volume = add_dicom_volume(&mut scene);
        let annotation = add_fiducial(&mut scene, &volume, 2.0);
        assert_eq!(resolve_slice_uid(&scene, &annotation).as_deref(), Some("UID2"));
    }

    #[test]
    fn out_of_range_index_falls_back_to_first_uid() {
        let mut scene = MemoryScene::new();
        let volume = add_dicom_volume(&mut scene);
        let high = add_fiducial(&mut scene, &volume, 7.0);
        assert_eq!(resolve_slice_uid(&scene, &high).as_deref(), Some("UID0"));
        let negative = add_fiducial(&mut scene, &volume, -3.0);
        assert_eq!(resolve_slice_uid(&scene, &negative).as_deref(), Some("UID0"));
    }

    #[test]
    fn ruler_on_one_slice_resolves() {
        let mut scene = MemoryScene::new();
        let volume = add_dicom_volume(&mut scene);
        let mut ruler = AnnotationNode::ruler("diameter", [0.0, 0.0, 1.1], [5.0, 3.0, 0.9]);
        ruler.associated_volume_id = Some(volume);
        let annotation = scene.add_node(SceneNode::Annotation(ruler));
        assert_eq!(resolve_slice_uid(&scene, &annotation).as_deref(), Some("UID1"));
    }

    #[test]
    fn ruler_spanning_slices_returns_none() {
        let mut scene = MemoryScene::new();
        let volume = add_dicom_volume(&mut scene);
        let mut ruler = AnnotationNode::ruler("diameter", [0.0, 0.0, 0.0], [5.0, 3.0, 2.0]);
        ruler.associated_volume_id = Some(volume);
        let annotation = scene.add_node(SceneNode::Annotation(ruler));
        assert_eq!(resolve_slice_uid(&scene, &annotation), None);
    }

    #[test]
    fn zero_control_points_resolve_to_nothing() {
        let mut scene = MemoryScene::new();
        let volume = add_dicom_volume(&mut scene);
        let mut annotation = AnnotationNode::fiducial("empty", [0.0; 3]);
        annotation.points.clear();
        annotation.associated_volume_id = Some(volume);
        let id = scene.add_node(SceneNode::Annotation(annotation));
        assert_eq!(resolve_slice_uid(&scene, &id), None);
    }

    #[test]
    fn volume_without_uid_list_is_rejected() {
        let mut scene = MemoryScene::new();
        let volume = scene.add_node(SceneNode::Volume(VolumeNode::new("non-dicom")));
        let annotation = add_fiducial(&mut scene, &volume, 1.0);
        assert_eq!(resolve_slice_uid(&scene, &annotation), None);
    }

    #[test]
    fn missing_or_wrong_association_is_rejected() {
        let mut scene = MemoryScene::new();
        let lonely = scene.add_node(SceneNode::Annotation(AnnotationNode::fiducial(
            "lonely",
            [0.0; 3],
        )));
        assert_eq!(resolve_slice_uid(&scene, &lonely), None);

        let report = scene.add_node(SceneNode::Report(ReportNode::new("not a volume")));
        let mut annotation = AnnotationNode::fiducial("confused", [0.0; 3]);
        annotation.associated_volume_id = Some(report);
        let id = scene.add_node(SceneNode::Annotation(annotation));
        assert_eq!(resolve_slice_uid(&scene, &id), None);
    }

    #[test]
    fn coordinates_project_through_the_volume_affine() {
        let mut scene = MemoryScene::new();
        let mut volume = VolumeNode::new("CT chest");
        volume.instance_uids = Some("UID0".to_owned());
        volume.ras_to_ijk = RasToIjk::new([
            [2.0, 0.0, 0.0, 1.0],
            [0.0, 2.0, 0.0, -1.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let volume = scene.add_node(SceneNode::Volume(volume));
        let annotation = add_fiducial(&mut scene, &volume, 0.0);
        let coords = markup_point_coordinates(&scene, &annotation).unwrap();
        assert_eq!(coords, vec![(1.0, -1.0)]);
    }
}
