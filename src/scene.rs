//! Boundary to the host scene graph: node storage, naming, and the lifecycle
//! events the reporting engine reacts to.

use std::collections::HashMap;

use crate::model::{NodeId, SceneNode};

/// Node lifecycle notifications delivered by the host scene. The host calls
/// [`crate::Reporting::process_scene_event`] with these; no subscription
/// machinery lives in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    EndBatch,
}

/// Storage and naming services the host scene graph provides.
pub trait Scene {
    fn node(&self, id: &NodeId) -> Option<&SceneNode>;
    fn node_mut(&mut self, id: &NodeId) -> Option<&mut SceneNode>;
    /// First node carrying exactly this display name, in scene order.
    fn first_node_by_name(&self, name: &str) -> Option<NodeId>;
    fn add_node(&mut self, node: SceneNode) -> NodeId;
    fn remove_node(&mut self, id: &NodeId) -> Option<SceneNode>;
    /// A display name no current node uses, derived from `base`.
    fn unique_name(&self, base: &str) -> String;
}

/// In-memory scene for tests and embedders without a host scene graph.
/// Keeps insertion order so name lookups are deterministic.
#[derive(Debug, Default)]
pub struct MemoryScene {
    nodes: HashMap<NodeId, SceneNode>,
    order: Vec<NodeId>,
    next_id: u64,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.order.iter()
    }

    fn alloc_id(&mut self, node: &SceneNode) -> NodeId {
        self.next_id += 1;
        let prefix = match node {
            SceneNode::Report(_) => "Report",
            SceneNode::Volume(_) => "Volume",
            SceneNode::Annotation(_) => "Annotation",
            SceneNode::Hierarchy(_) => "Hierarchy",
            SceneNode::Rano(_) => "Rano",
        };
        NodeId::new(format!("{prefix}{}", self.next_id))
    }
}

impl Scene for MemoryScene {
    fn node(&self, id: &NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    fn first_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.order
            .iter()
            .find(|id| self.nodes.get(*id).is_some_and(|n| n.name() == name))
            .cloned()
    }

    fn add_node(&mut self, node: SceneNode) -> NodeId {
        let id = self.alloc_id(&node);
        self.nodes.insert(id.clone(), node);
        self.order.push(id.clone());
        id
    }

    fn remove_node(&mut self, id: &NodeId) -> Option<SceneNode> {
        self.order.retain(|n| n != id);
        self.nodes.remove(id)
    }

    fn unique_name(&self, base: &str) -> String {
        if self.first_node_by_name(base).is_none() {
            return base.to_owned();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}_{n}");
            if self.first_node_by_name(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportNode;

    #[test]
    fn name_lookup_follows_insertion_order() {
        let mut scene = MemoryScene::new();
        let first = scene.add_node(SceneNode::Report(ReportNode::new("twin")));
        let _second = scene.add_node(SceneNode::Report(ReportNode::new("twin")));
        assert_eq!(scene.first_node_by_name("twin"), Some(first));
    }

    #[test]
    fn unique_name_counts_up_from_collisions() {
        let mut scene = MemoryScene::new();
        assert_eq!(scene.unique_name("Case"), "Case");
        scene.add_node(SceneNode::Report(ReportNode::new("Case")));
        assert_eq!(scene.unique_name("Case"), "Case_1");
        scene.add_node(SceneNode::Report(ReportNode::new("Case_1")));
        assert_eq!(scene.unique_name("Case"), "Case_2");
    }

    #[test]
    fn removal_drops_node_and_order_entry() {
        let mut scene = MemoryScene::new();
        let id = scene.add_node(SceneNode::Report(ReportNode::new("gone")));
        assert!(scene.remove_node(&id).is_some());
        assert!(scene.node(&id).is_none());
        assert!(scene.is_empty());
    }
}
