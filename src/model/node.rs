use std::fmt;

use super::geometry::RasToIjk;

/// Opaque scene node identifier. Allocation belongs to the scene; this crate
/// only stores and compares ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    Fiducial,
    Ruler,
}

impl MarkupKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Fiducial => "Fiducial",
            Self::Ruler => "Ruler",
        }
    }
}

/// A logical clinical report. One hierarchy subtree roots at each report.
#[derive(Debug, Clone)]
pub struct ReportNode {
    pub name: String,
    pub description: Option<String>,
    /// Suppresses modified-event fan-out during bulk hierarchy setup.
    pub disable_modified_events: bool,
}

impl ReportNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            disable_modified_events: false,
        }
    }
}

/// An image volume. When sourced from DICOM it carries a space-separated
/// list of per-slice instance UIDs, ordered so that index `k` corresponds to
/// IJK z-coordinate `k`.
#[derive(Debug, Clone)]
pub struct VolumeNode {
    pub name: String,
    pub ras_to_ijk: RasToIjk,
    pub instance_uids: Option<String>,
    pub is_label_map: bool,
    /// For label maps: the source volume this one was derived from.
    pub associated_volume_id: Option<NodeId>,
    pub disable_modified_events: bool,
}

impl VolumeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ras_to_ijk: RasToIjk::identity(),
            instance_uids: None,
            is_label_map: false,
            associated_volume_id: None,
            disable_modified_events: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationDisplay {
    pub visible: bool,
}

/// A user-placed markup: a single point (fiducial) or a two-point ruler,
/// with control points in world (RAS) coordinates.
#[derive(Debug, Clone)]
pub struct AnnotationNode {
    pub name: String,
    pub kind: MarkupKind,
    pub points: Vec<[f64; 3]>,
    /// Volume the annotation was drawn on.
    pub associated_volume_id: Option<NodeId>,
    pub visible: bool,
    pub displays: Vec<AnnotationDisplay>,
}

impl AnnotationNode {
    pub fn fiducial(name: impl Into<String>, point: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            kind: MarkupKind::Fiducial,
            points: vec![point],
            associated_volume_id: None,
            visible: true,
            displays: vec![AnnotationDisplay { visible: true }],
        }
    }

    pub fn ruler(name: impl Into<String>, from: [f64; 3], to: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            kind: MarkupKind::Ruler,
            points: vec![from, to],
            associated_volume_id: None,
            visible: true,
            displays: vec![AnnotationDisplay { visible: true }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyKind {
    Displayable,
    Annotation,
}

/// Structural tree node, distinct from content nodes. Forms a tree: no
/// cycles, at most one parent.
#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub name: String,
    pub kind: HierarchyKind,
    pub parent_id: Option<NodeId>,
    pub associated_id: Option<NodeId>,
    /// Stealth nodes exist purely for structure and stay out of editor UIs.
    pub hide_from_editors: bool,
}

impl HierarchyNode {
    /// A hidden structural node with no parent or association yet.
    pub fn stealth(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: HierarchyKind::Displayable,
            parent_id: None,
            associated_id: None,
            hide_from_editors: true,
        }
    }
}

/// Structured assessment companion, created 1:1 per report.
#[derive(Debug, Clone)]
pub struct RanoNode {
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum SceneNode {
    Report(ReportNode),
    Volume(VolumeNode),
    Annotation(AnnotationNode),
    Hierarchy(HierarchyNode),
    Rano(RanoNode),
}

/// Closed classification used by the event router, computed once at the
/// scene boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Fiducial,
    Ruler,
    LabelVolume,
    Other,
}

impl SceneNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Report(n) => &n.name,
            Self::Volume(n) => &n.name,
            Self::Annotation(n) => &n.name,
            Self::Hierarchy(n) => &n.name,
            Self::Rano(n) => &n.name,
        }
    }

    pub fn set_name(&mut self, name: String) {
        match self {
            Self::Report(n) => n.name = name,
            Self::Volume(n) => n.name = name,
            Self::Annotation(n) => n.name = name,
            Self::Hierarchy(n) => n.name = name,
            Self::Rano(n) => n.name = name,
        }
    }

    pub fn class(&self) -> NodeClass {
        match self {
            Self::Annotation(a) => match a.kind {
                MarkupKind::Fiducial => NodeClass::Fiducial,
                MarkupKind::Ruler => NodeClass::Ruler,
            },
            Self::Volume(v) if v.is_label_map => NodeClass::LabelVolume,
            _ => NodeClass::Other,
        }
    }

    pub fn as_hierarchy(&self) -> Option<&HierarchyNode> {
        match self {
            Self::Hierarchy(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_hierarchy_mut(&mut self) -> Option<&mut HierarchyNode> {
        match self {
            Self::Hierarchy(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&AnnotationNode> {
        match self {
            Self::Annotation(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_volume(&self) -> Option<&VolumeNode> {
        match self {
            Self::Volume(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_tag_driven() {
        let fid = SceneNode::Annotation(AnnotationNode::fiducial("f", [0.0; 3]));
        assert_eq!(fid.class(), NodeClass::Fiducial);

        let ruler = SceneNode::Annotation(AnnotationNode::ruler("r", [0.0; 3], [1.0; 3]));
        assert_eq!(ruler.class(), NodeClass::Ruler);

        let mut volume = VolumeNode::new("v");
        assert_eq!(SceneNode::Volume(volume.clone()).class(), NodeClass::Other);
        volume.is_label_map = true;
        assert_eq!(SceneNode::Volume(volume).class(), NodeClass::LabelVolume);

        let report = SceneNode::Report(ReportNode::new("rep"));
        assert_eq!(report.class(), NodeClass::Other);
    }
}
