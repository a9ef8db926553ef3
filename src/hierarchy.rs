//! Hierarchy maintenance: the reporting tree skeleton (top level → report →
//! volume → markup set → annotations) and the index that keeps content and
//! hierarchy nodes in a 1:1 relation.

use std::collections::HashMap;

use crate::model::{HierarchyKind, HierarchyNode, NodeId, RanoNode, SceneNode};
use crate::scene::Scene;
use crate::Reporting;

/// Display name of the single well-known root under which every report
/// hierarchy lives.
pub const TOP_LEVEL_HIERARCHY_NAME: &str = "Reporting Hierarchy";

/// Bidirectional index over the hierarchy tree: content node → its (single)
/// hierarchy node, and hierarchy node → ordered children.
///
/// Mutations go through [`set_parent`](Self::set_parent) and
/// [`link_associated`](Self::link_associated) so the scene node fields and
/// the index never disagree.
#[derive(Debug, Default)]
pub struct HierarchyIndex {
    assoc: HashMap<NodeId, NodeId>,
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl HierarchyIndex {
    /// Hierarchy node associated with a content node, if any.
    pub fn associated_hierarchy(&self, content_id: &NodeId) -> Option<&NodeId> {
        self.assoc.get(content_id)
    }

    /// Direct children of a hierarchy node, in attachment order.
    pub fn children(&self, hierarchy_id: &NodeId) -> &[NodeId] {
        self.children
            .get(hierarchy_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Full subtree below a hierarchy node, depth-first, excluding the node
    /// itself.
    pub fn all_children(&self, hierarchy_id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_children(hierarchy_id, &mut out);
        out
    }

    fn collect_children(&self, id: &NodeId, out: &mut Vec<NodeId>) {
        for child in self.children(id) {
            out.push(child.clone());
            self.collect_children(child, out);
        }
    }

    /// Moves `hierarchy_id` under `parent_id` (or detaches it when `None`),
    /// updating the scene node and the child lists together.
    pub fn set_parent(
        &mut self,
        scene: &mut dyn Scene,
        hierarchy_id: &NodeId,
        parent_id: Option<NodeId>,
    ) {
        let previous = scene
            .node(hierarchy_id)
            .and_then(SceneNode::as_hierarchy)
            .and_then(|h| h.parent_id.clone());
        match scene.node_mut(hierarchy_id).and_then(SceneNode::as_hierarchy_mut) {
            Some(node) => node.parent_id = parent_id.clone(),
            None => {
                log::error!("set_parent: {hierarchy_id} is not a hierarchy node");
                return;
            }
        }
        if let Some(previous) = previous {
            if let Some(list) = self.children.get_mut(&previous) {
                list.retain(|c| c != hierarchy_id);
            }
        }
        if let Some(parent) = parent_id {
            self.children.entry(parent).or_default().push(hierarchy_id.clone());
        }
    }

    /// Records `hierarchy_id` as the hierarchy node for `content_id`. Each
    /// content node gets at most one; a second link attempt is an error and
    /// leaves the first in place.
    pub fn link_associated(
        &mut self,
        scene: &mut dyn Scene,
        hierarchy_id: &NodeId,
        content_id: &NodeId,
    ) {
        if let Some(existing) = self.assoc.get(content_id) {
            if existing != hierarchy_id {
                log::error!(
                    "content node {content_id} already has hierarchy node {existing}, not linking {hierarchy_id}"
                );
            }
            return;
        }
        // hold modified-event fan-out on the content node while linking
        set_disable_modified(scene, content_id, true);
        match scene.node_mut(hierarchy_id).and_then(SceneNode::as_hierarchy_mut) {
            Some(node) => node.associated_id = Some(content_id.clone()),
            None => {
                log::error!("link_associated: {hierarchy_id} is not a hierarchy node");
                set_disable_modified(scene, content_id, false);
                return;
            }
        }
        set_disable_modified(scene, content_id, false);
        self.assoc.insert(content_id.clone(), hierarchy_id.clone());
    }

    /// Drops every index entry touching `id`, whether it was a content node,
    /// a hierarchy node, or someone's child. Called when the scene removes a
    /// node.
    pub fn forget(&mut self, id: &NodeId) {
        self.assoc.remove(id);
        self.assoc.retain(|_, hierarchy| hierarchy != id);
        self.children.remove(id);
        for list in self.children.values_mut() {
            list.retain(|child| child != id);
        }
    }
}

fn set_disable_modified(scene: &mut dyn Scene, id: &NodeId, value: bool) {
    match scene.node_mut(id) {
        Some(SceneNode::Report(report)) => report.disable_modified_events = value,
        Some(SceneNode::Volume(volume)) => volume.disable_modified_events = value,
        _ => {}
    }
}

impl Reporting {
    /// Finds or creates the top-level reporting hierarchy node. Repeated
    /// calls return the same id.
    pub fn ensure_top_level_hierarchy(&mut self, scene: &mut dyn Scene) -> NodeId {
        if let Some(id) = scene.first_node_by_name(TOP_LEVEL_HIERARCHY_NAME) {
            return id;
        }
        scene.add_node(SceneNode::Hierarchy(HierarchyNode {
            name: TOP_LEVEL_HIERARCHY_NAME.to_owned(),
            kind: HierarchyKind::Displayable,
            parent_id: None,
            associated_id: None,
            hide_from_editors: false,
        }))
    }

    /// Hierarchy node of the session's active report, if a report is active
    /// and already initialized.
    pub fn active_report_hierarchy_id(&self) -> Option<NodeId> {
        let report = self.session.active_report()?;
        match self.hierarchy.associated_hierarchy(report) {
            Some(id) => Some(id.clone()),
            None => {
                log::debug!("active report {report} has no hierarchy node yet");
                None
            }
        }
    }

    /// Sets up the hierarchy subtree for a report: a stealth `<Name>
    /// Hierarchy` node under the top level, plus the nested assessment
    /// substructure every report carries. No-op when the report already has
    /// a hierarchy node.
    pub fn initialize_hierarchy_for_report(&mut self, scene: &mut dyn Scene, report_id: &NodeId) {
        let report_name = match scene.node(report_id) {
            Some(SceneNode::Report(report)) => report.name.clone(),
            Some(_) => {
                log::error!("initialize_hierarchy_for_report: {report_id} is not a report node");
                return;
            }
            None => {
                log::error!("initialize_hierarchy_for_report: no node with id {report_id}");
                return;
            }
        };
        if let Some(existing) = self.hierarchy.associated_hierarchy(report_id) {
            log::debug!("report {report_id} already has hierarchy node {existing}");
            return;
        }

        let top = self.ensure_top_level_hierarchy(scene);
        let name = scene.unique_name(&format!("{report_name} Hierarchy"));
        let report_h = scene.add_node(SceneNode::Hierarchy(HierarchyNode::stealth(name)));
        self.hierarchy.set_parent(scene, &report_h, Some(top));
        self.hierarchy.link_associated(scene, &report_h, report_id);

        // assessment substructure, created alongside every report
        let rano_h_name = scene.unique_name(&format!("{report_name} RANO Hierarchy"));
        let rano_h = scene.add_node(SceneNode::Hierarchy(HierarchyNode::stealth(rano_h_name)));
        self.hierarchy.set_parent(scene, &rano_h, Some(report_h));
        let rano_name = scene.unique_name(&format!("{report_name} RANO"));
        let rano = scene.add_node(SceneNode::Rano(RanoNode { name: rano_name }));
        self.hierarchy.link_associated(scene, &rano_h, &rano);
    }

    /// Sets up (or repairs) the hierarchy for a volume under the active
    /// report, finds or creates its `Markup <Volume>` annotation hierarchy,
    /// and makes that the active markup set.
    pub fn initialize_hierarchy_for_volume(&mut self, scene: &mut dyn Scene, volume_id: &NodeId) {
        let volume_name = match scene.node(volume_id) {
            Some(SceneNode::Volume(volume)) => volume.name.clone(),
            Some(_) => {
                log::error!("initialize_hierarchy_for_volume: {volume_id} is not a volume node");
                return;
            }
            None => {
                log::error!("initialize_hierarchy_for_volume: no node with id {volume_id}");
                return;
            }
        };

        let active_report_h = self.active_report_hierarchy_id();
        let volume_h = match self.hierarchy.associated_hierarchy(volume_id).cloned() {
            Some(existing) => {
                // the volume may have been added before a report was
                // selected; re-parent it under the current report
                log::debug!(
                    "volume {volume_id} already has hierarchy node {existing}, re-parenting"
                );
                self.hierarchy.set_parent(scene, &existing, active_report_h);
                existing
            }
            None => {
                if active_report_h.is_none() {
                    log::warn!("no active report selected; volume hierarchy left unparented");
                }
                let name = scene.unique_name(&format!("{volume_name} Hierarchy"));
                let created = scene.add_node(SceneNode::Hierarchy(HierarchyNode::stealth(name)));
                self.hierarchy.set_parent(scene, &created, active_report_h);
                self.hierarchy.link_associated(scene, &created, volume_id);
                created
            }
        };

        let markup_name = format!("Markup {volume_name}");
        let markup = match scene.first_node_by_name(&markup_name) {
            Some(id) => id,
            None => {
                let id = scene.add_node(SceneNode::Hierarchy(HierarchyNode {
                    name: markup_name,
                    kind: HierarchyKind::Annotation,
                    parent_id: None,
                    associated_id: None,
                    hide_from_editors: false,
                }));
                self.hierarchy.set_parent(scene, &id, Some(volume_h));
                id
            }
        };
        self.session.set_active_markup(Some(markup));
    }

    /// First volume found in the report's subtree, depth-first. The design
    /// supports one volume per report; with several, the traversal order of
    /// the child lists decides.
    pub fn volume_id_for_report(&self, scene: &dyn Scene, report_id: &NodeId) -> Option<NodeId> {
        let Some(report_h) = self.hierarchy.associated_hierarchy(report_id) else {
            log::error!("volume_id_for_report: report {report_id} has no hierarchy node");
            return None;
        };
        for child in self.hierarchy.all_children(report_h) {
            let associated = scene
                .node(&child)
                .and_then(SceneNode::as_hierarchy)
                .and_then(|h| h.associated_id.clone());
            if let Some(content) = associated {
                if matches!(scene.node(&content), Some(SceneNode::Volume(_))) {
                    return Some(content);
                }
            }
        }
        None
    }

    /// Shows every annotation under `report_id`'s hierarchy and hides the
    /// annotations of every other report. Rewrites visibility across all
    /// report subtrees on each call.
    pub fn hide_annotations_for_other_reports(
        &mut self,
        scene: &mut dyn Scene,
        report_id: &NodeId,
    ) {
        let top = self.ensure_top_level_hierarchy(scene);
        let Some(report_h) = self.hierarchy.associated_hierarchy(report_id).cloned() else {
            log::error!(
                "hide_annotations_for_other_reports: report {report_id} has no hierarchy node"
            );
            return;
        };
        for report_subtree in self.hierarchy.children(&top).to_vec() {
            let visible = report_subtree == report_h;
            for child in self.hierarchy.all_children(&report_subtree) {
                let associated = scene
                    .node(&child)
                    .and_then(SceneNode::as_hierarchy)
                    .and_then(|h| h.associated_id.clone());
                let Some(content) = associated else { continue };
                if let Some(SceneNode::Annotation(annotation)) = scene.node_mut(&content) {
                    annotation.visible = visible;
                    for display in &mut annotation.displays {
                        display.visible = visible;
                    }
                }
            }
        }
    }

    /// Points the active markup set at the markup hierarchy belonging to
    /// `node_id`. Resolution order: exact `Markup <Name>` scene name, then
    /// the first annotation-typed hierarchy child named `Markup*`, else the
    /// active markup is cleared.
    pub fn set_active_markup_hierarchy_from_node(&mut self, scene: &dyn Scene, node_id: &NodeId) {
        let Some(node) = scene.node(node_id) else {
            log::warn!("no node with id {node_id}; clearing the active markup set");
            self.session.set_active_markup(None);
            return;
        };
        let node_name = node.name().to_owned();
        if node_name.is_empty() {
            log::warn!("node {node_id} has no name; clearing the active markup set");
            self.session.set_active_markup(None);
            return;
        }

        let markup_name = format!("Markup {node_name}");
        if let Some(id) = scene.first_node_by_name(&markup_name) {
            self.session.set_active_markup(Some(id));
            return;
        }

        // no exact name match; look through the node's own hierarchy children
        if let Some(node_h) = self.hierarchy.associated_hierarchy(node_id) {
            for child in self.hierarchy.children(node_h) {
                if let Some(hierarchy) = scene.node(child).and_then(SceneNode::as_hierarchy) {
                    if hierarchy.kind == HierarchyKind::Annotation
                        && hierarchy.name.starts_with("Markup")
                    {
                        self.session.set_active_markup(Some(child.clone()));
                        return;
                    }
                }
            }
        }
        log::warn!("no markup hierarchy found for {node_id}; clearing the active markup set");
        self.session.set_active_markup(None);
    }

    /// Finds or creates the 1:1 stealth hierarchy node for a content node.
    pub fn ensure_one_to_one_hierarchy(
        &mut self,
        scene: &mut dyn Scene,
        content_id: &NodeId,
    ) -> Option<NodeId> {
        if let Some(existing) = self.hierarchy.associated_hierarchy(content_id) {
            return Some(existing.clone());
        }
        let content_name = scene.node(content_id)?.name().to_owned();
        let name = scene.unique_name(&format!("{content_name} Hierarchy"));
        let created = scene.add_node(SceneNode::Hierarchy(HierarchyNode::stealth(name)));
        self.hierarchy.link_associated(scene, &created, content_id);
        Some(created)
    }
}
