pub mod geometry;
pub mod node;

pub use geometry::RasToIjk;
pub use node::{
    AnnotationDisplay, AnnotationNode, HierarchyKind, HierarchyNode, MarkupKind, NodeClass,
    NodeId, RanoNode, ReportNode, SceneNode, VolumeNode,
};
