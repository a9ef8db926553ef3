//! Scene event routing: classifies node lifecycle events and keeps the
//! reporting tree and the session's active pointers current.

use crate::model::{NodeClass, NodeId, SceneNode};
use crate::resolver;
use crate::scene::{Scene, SceneEvent};
use crate::Reporting;

impl Reporting {
    /// Entry point for host scene notifications. Only node-added and
    /// node-removed carry work; batch boundaries are acknowledged and
    /// dropped.
    pub fn process_scene_event(&mut self, scene: &mut dyn Scene, event: &SceneEvent) {
        match event {
            SceneEvent::NodeAdded(id) => self.on_node_added(scene, id),
            SceneEvent::NodeRemoved(id) => self.on_node_removed(id),
            SceneEvent::EndBatch => log::debug!("scene batch finished"),
        }
    }

    fn on_node_added(&mut self, scene: &mut dyn Scene, id: &NodeId) {
        let class = match scene.node(id) {
            Some(node) => node.class(),
            None => {
                log::error!("node-added event for unknown node {id}");
                return;
            }
        };
        match class {
            NodeClass::LabelVolume => self.attach_label_volume(scene, id),
            NodeClass::Fiducial | NodeClass::Ruler => self.attach_annotation(scene, id),
            NodeClass::Other => {}
        }
    }

    /// A removed node must not stay selected: both active pointers are
    /// invalidated eagerly here rather than re-validated on every read.
    fn on_node_removed(&mut self, id: &NodeId) {
        if self.session.active_report() == Some(id) {
            log::warn!("active report {id} was removed from the scene");
            self.session.set_active_report(None);
        }
        if self.session.active_markup() == Some(id) {
            log::warn!("active markup set {id} was removed from the scene");
            self.session.set_active_markup(None);
        }
        self.hierarchy.forget(id);
    }

    /// Label maps derived from the active report's volume get a 1:1
    /// hierarchy node under the active markup set. Label maps for any other
    /// volume are ignored.
    fn attach_label_volume(&mut self, scene: &mut dyn Scene, id: &NodeId) {
        let associated = scene
            .node(id)
            .and_then(SceneNode::as_volume)
            .and_then(|volume| volume.associated_volume_id.clone());
        let Some(associated) = associated else {
            log::debug!("label volume {id} has no source volume association");
            return;
        };

        let report_volume = self
            .session
            .active_report()
            .cloned()
            .and_then(|report| self.volume_id_for_report(scene, &report));
        if report_volume.as_ref() != Some(&associated) {
            log::debug!(
                "label volume {id} belongs to {associated}, not the active report's volume"
            );
            return;
        }

        let Some(markup) = self.session.active_markup().cloned() else {
            log::error!("no active markup hierarchy; label volume {id} left unattached");
            return;
        };
        if let Some(h) = self.ensure_one_to_one_hierarchy(scene, id) {
            self.hierarchy.set_parent(scene, &h, Some(markup));
        }
    }

    /// Newly placed annotations join the active markup set and take the
    /// report's naming scheme, but only when the reporting GUI is showing
    /// and the annotation resolves to a single slice.
    fn attach_annotation(&mut self, scene: &mut dyn Scene, id: &NodeId) {
        // while the GUI is hidden, placed annotations stay plain scene
        // nodes; skipping them is intentional, not a failure
        if self.session.gui_hidden() {
            log::debug!("reporting GUI hidden; leaving annotation {id} alone");
            return;
        }

        let Some(uid) = resolver::resolve_slice_uid(scene, id) else {
            log::debug!("annotation {id} does not resolve to a single slice; not attaching it");
            return;
        };
        log::debug!("annotation {id} resolved to slice {uid}");

        let markup = self.session.active_markup().cloned();
        if let Some(h) = self.ensure_one_to_one_hierarchy(scene, id) {
            self.hierarchy.set_parent(scene, &h, markup);
        }
        self.rename_for_active_report(scene, id);
    }

    fn rename_for_active_report(&mut self, scene: &mut dyn Scene, id: &NodeId) {
        let Some(report_id) = self.session.active_report().cloned() else {
            return;
        };
        let description = match scene.node(&report_id) {
            Some(SceneNode::Report(report)) => report.description.clone(),
            _ => return,
        };
        let kind = match scene.node(id).and_then(SceneNode::as_annotation) {
            Some(annotation) => annotation.kind,
            None => return,
        };
        let base = match description {
            Some(description) if !description.is_empty() => {
                format!("{description}_{}", kind.label())
            }
            _ => format!("Report_{}", kind.label()),
        };
        let name = scene.unique_name(&base);
        if let Some(node) = scene.node_mut(id) {
            node.set_name(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationNode, ReportNode, VolumeNode};
    use crate::scene::MemoryScene;

    /// Report "Case 12" (description "TestReport") with one DICOM volume,
    /// hierarchy initialized and both active pointers set.
    fn reporting_scene() -> (MemoryScene, Reporting, NodeId, NodeId) {
        let mut scene = MemoryScene::new();
        let mut reporting = Reporting::new();

        let mut report = ReportNode::new("Case 12");
        report.description = Some("TestReport".to_owned());
        let report = scene.add_node(SceneNode::Report(report));
        reporting.initialize_hierarchy_for_report(&mut scene, &report);
        reporting.session.set_active_report(Some(report.clone()));

        let mut volume = VolumeNode::new("CT chest");
        volume.instance_uids = Some("UID0 UID1 UID2".to_owned());
        let volume = scene.add_node(SceneNode::Volume(volume));
        reporting.initialize_hierarchy_for_volume(&mut scene, &volume);

        (scene, reporting, report, volume)
    }

    fn place_fiducial(scene: &mut MemoryScene, volume: &NodeId, z: f64) -> NodeId {
        let mut annotation = AnnotationNode::fiducial("tumor", [0.0, 0.0, z]);
        annotation.associated_volume_id = Some(volume.clone());
        scene.add_node(SceneNode::Annotation(annotation))
    }

    #[test]
    fn placed_annotation_joins_markup_and_is_renamed() {
        let (mut scene, mut reporting, _report, volume) = reporting_scene();
        let markup = reporting.session.active_markup().cloned().unwrap();

        let annotation = place_fiducial(&mut scene, &volume, 1.0);
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(annotation.clone()));

        let h = reporting
            .hierarchy
            .associated_hierarchy(&annotation)
            .cloned()
            .expect("annotation hierarchy");
        let parent = scene.node(&h).and_then(SceneNode::as_hierarchy).unwrap().parent_id.clone();
        assert_eq!(parent, Some(markup));
        assert_eq!(scene.node(&annotation).unwrap().name(), "TestReport_Fiducial");
    }

    #[test]
    fn annotation_names_stay_unique_per_report() {
        let (mut scene, mut reporting, _report, volume) = reporting_scene();
        let first = place_fiducial(&mut scene, &volume, 1.0);
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(first));
        let second = place_fiducial(&mut scene, &volume, 1.0);
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(second.clone()));
        assert_eq!(scene.node(&second).unwrap().name(), "TestReport_Fiducial_1");
    }

    #[test]
    fn ruler_takes_the_ruler_suffix() {
        let (mut scene, mut reporting, _report, volume) = reporting_scene();
        let mut ruler = AnnotationNode::ruler("diameter", [0.0, 0.0, 1.0], [4.0, 0.0, 1.0]);
        ruler.associated_volume_id = Some(volume);
        let annotation = scene.add_node(SceneNode::Annotation(ruler));
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(annotation.clone()));
        assert_eq!(scene.node(&annotation).unwrap().name(), "TestReport_Ruler");
    }

    #[test]
    fn report_without_description_uses_generic_prefix() {
        let (mut scene, mut reporting, report, volume) = reporting_scene();
        if let Some(SceneNode::Report(r)) = scene.node_mut(&report) {
            r.description = None;
        }
        let annotation = place_fiducial(&mut scene, &volume, 1.0);
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(annotation.clone()));
        assert_eq!(scene.node(&annotation).unwrap().name(), "Report_Fiducial");
    }

    #[test]
    fn hidden_gui_leaves_annotation_untouched() {
        let (mut scene, mut reporting, _report, volume) = reporting_scene();
        reporting.session.set_gui_hidden(true);

        let annotation = place_fiducial(&mut scene, &volume, 1.0);
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(annotation.clone()));

        assert!(reporting.hierarchy.associated_hierarchy(&annotation).is_none());
        assert_eq!(scene.node(&annotation).unwrap().name(), "tumor");
    }

    #[test]
    fn unresolvable_annotation_stays_unparented() {
        let (mut scene, mut reporting, _report, volume) = reporting_scene();
        if let Some(SceneNode::Volume(v)) = scene.node_mut(&volume) {
            v.instance_uids = None;
        }
        let annotation = place_fiducial(&mut scene, &volume, 1.0);
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(annotation.clone()));
        assert!(reporting.hierarchy.associated_hierarchy(&annotation).is_none());
    }

    #[test]
    fn label_map_for_report_volume_joins_markup() {
        let (mut scene, mut reporting, _report, volume) = reporting_scene();
        let markup = reporting.session.active_markup().cloned().unwrap();

        let mut label = VolumeNode::new("CT chest-label");
        label.is_label_map = true;
        label.associated_volume_id = Some(volume);
        let label = scene.add_node(SceneNode::Volume(label));
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(label.clone()));

        let h = reporting
            .hierarchy
            .associated_hierarchy(&label)
            .cloned()
            .expect("label map hierarchy");
        let parent = scene.node(&h).and_then(SceneNode::as_hierarchy).unwrap().parent_id.clone();
        assert_eq!(parent, Some(markup));
    }

    #[test]
    fn label_map_for_other_volume_is_ignored() {
        let (mut scene, mut reporting, _report, _volume) = reporting_scene();
        let other = scene.add_node(SceneNode::Volume(VolumeNode::new("MR head")));

        let mut label = VolumeNode::new("MR head-label");
        label.is_label_map = true;
        label.associated_volume_id = Some(other);
        let label = scene.add_node(SceneNode::Volume(label));
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(label.clone()));

        assert!(reporting.hierarchy.associated_hierarchy(&label).is_none());
    }

    #[test]
    fn label_map_without_active_markup_is_left_unattached() {
        let (mut scene, mut reporting, _report, volume) = reporting_scene();
        reporting.session.set_active_markup(None);

        let mut label = VolumeNode::new("CT chest-label");
        label.is_label_map = true;
        label.associated_volume_id = Some(volume);
        let label = scene.add_node(SceneNode::Volume(label));
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeAdded(label.clone()));

        assert!(reporting.hierarchy.associated_hierarchy(&label).is_none());
    }

    #[test]
    fn removal_invalidates_active_pointers() {
        let (mut scene, mut reporting, report, _volume) = reporting_scene();
        let markup = reporting.session.active_markup().cloned().unwrap();

        scene.remove_node(&report);
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeRemoved(report));
        assert_eq!(reporting.session.active_report(), None);

        scene.remove_node(&markup);
        reporting.process_scene_event(&mut scene, &SceneEvent::NodeRemoved(markup));
        assert_eq!(reporting.session.active_markup(), None);
    }
}
