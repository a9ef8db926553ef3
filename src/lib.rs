//! Clinical reporting on top of an annotated 3D scene: a report groups one
//! DICOM volume and the fiducial and ruler markups drawn on it, keeps them in
//! a consistent hierarchy as the scene changes, and serializes the result to
//! an AIM XML document.
//!
//! The scene itself belongs to the host application; it talks to this crate
//! through the [`Scene`] trait and by forwarding [`SceneEvent`]s to
//! [`Reporting::process_scene_event`]. All state lives in the [`Reporting`]
//! value and is single-threaded; the scene must not be mutated concurrently
//! with any call into it.

pub mod dicom_db;
pub mod export;
pub mod hierarchy;
pub mod model;
pub mod resolver;
pub mod router;
pub mod scene;
pub mod session;

pub use dicom_db::{DicomDirDatabase, HeaderLookup};
pub use export::ExportError;
pub use hierarchy::{HierarchyIndex, TOP_LEVEL_HIERARCHY_NAME};
pub use model::{NodeClass, NodeId, SceneNode};
pub use scene::{MemoryScene, Scene, SceneEvent};
pub use session::ReportingSession;

/// The reporting engine: per-session selection state plus the content to
/// hierarchy index. One value per scene.
#[derive(Debug, Default)]
pub struct Reporting {
    pub session: ReportingSession,
    pub hierarchy: HierarchyIndex,
}

impl Reporting {
    pub fn new() -> Self {
        Self::default()
    }
}
