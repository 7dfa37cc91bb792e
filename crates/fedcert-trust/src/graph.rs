//! Federation graph
//!
//! Local record of declared `superior -> subordinate` edges and of the
//! identifiers trusted as anchors, optionally pinned to their federation
//! keys. Each side of an edge is stored
//! independently and nothing here is cryptographically confirmed; the
//! resolver re-derives every edge from published statements.
//!
//! The graph is append-only.

use fedcert_core::{EntityId, JwkSet};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct GraphState {
    superiors: HashMap<EntityId, Vec<EntityId>>,
    subordinates: HashMap<EntityId, Vec<EntityId>>,
    trust_anchors: HashMap<EntityId, Option<JwkSet>>,
}

/// Declared federation edges and trust anchors
#[derive(Debug, Default)]
pub struct FederationGraph {
    state: RwLock<GraphState>,
}

fn push_unique(list: &mut Vec<EntityId>, id: &EntityId) -> bool {
    if list.contains(id) {
        return false;
    }
    list.push(id.clone());
    true
}

impl FederationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `superior` vouches for `subordinate`
    ///
    /// Returns false if the edge was already known.
    pub fn add_subordinate(&self, superior: &EntityId, subordinate: &EntityId) -> bool {
        let mut state = self.state.write().unwrap();
        let added = push_unique(
            state.subordinates.entry(superior.clone()).or_default(),
            subordinate,
        );
        if added {
            debug!(superior = %superior, subordinate = %subordinate, "Recorded subordinate");
        }
        added
    }

    /// Record several subordinates of `superior`, in order
    pub fn add_subordinates(&self, superior: &EntityId, subordinates: &[EntityId]) {
        for subordinate in subordinates {
            self.add_subordinate(superior, subordinate);
        }
    }

    /// Record that `entity` declares `superior` as an authority
    ///
    /// Declaration order is kept; it becomes the entity's `authority_hints`
    /// order and so the order in which the resolver tries superiors.
    pub fn add_superior(&self, entity: &EntityId, superior: &EntityId) -> bool {
        let mut state = self.state.write().unwrap();
        let added = push_unique(state.superiors.entry(entity.clone()).or_default(), superior);
        if added {
            debug!(entity = %entity, superior = %superior, "Recorded superior");
        }
        added
    }

    /// Trust `id` as a trust anchor
    ///
    /// Returns false if `id` was already an anchor; existing pinned keys are kept.
    pub fn add_trust_anchor(&self, id: &EntityId) -> bool {
        let mut state = self.state.write().unwrap();
        if state.trust_anchors.contains_key(id) {
            return false;
        }
        state.trust_anchors.insert(id.clone(), None);
        true
    }

    /// Trust `id` as a trust anchor whose configuration must be signed by
    /// one of `keys`
    pub fn pin_trust_anchor(&self, id: &EntityId, keys: JwkSet) {
        debug!(anchor = %id, kids = ?keys.kids(), "Pinned trust anchor keys");
        self.state
            .write()
            .unwrap()
            .trust_anchors
            .insert(id.clone(), Some(keys));
    }

    /// Pinned keys of anchor `id`, if any
    pub fn trust_anchor_keys(&self, id: &EntityId) -> Option<JwkSet> {
        self.state
            .read()
            .unwrap()
            .trust_anchors
            .get(id)
            .cloned()
            .flatten()
    }

    /// Declared superiors of `id`, in declaration order
    pub fn superiors_of(&self, id: &EntityId) -> Vec<EntityId> {
        self.state
            .read()
            .unwrap()
            .superiors
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Declared subordinates of `id`, in declaration order
    pub fn subordinates_of(&self, id: &EntityId) -> Vec<EntityId> {
        self.state
            .read()
            .unwrap()
            .subordinates
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_subordinate(&self, superior: &EntityId, subordinate: &EntityId) -> bool {
        self.state
            .read()
            .unwrap()
            .subordinates
            .get(superior)
            .is_some_and(|subs| subs.contains(subordinate))
    }

    pub fn is_trust_anchor(&self, id: &EntityId) -> bool {
        self.state.read().unwrap().trust_anchors.contains_key(id)
    }

    /// Trust anchors, sorted
    pub fn trust_anchors(&self) -> Vec<EntityId> {
        let mut anchors: Vec<EntityId> = self
            .state
            .read()
            .unwrap()
            .trust_anchors
            .keys()
            .cloned()
            .collect();
        anchors.sort();
        anchors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[test]
    fn test_sides_are_independent() {
        let graph = FederationGraph::new();
        let ta = id("https://ta.example");
        let leaf = id("https://leaf.example");

        assert!(graph.add_subordinate(&ta, &leaf));
        assert!(graph.is_subordinate(&ta, &leaf));
        assert!(graph.superiors_of(&leaf).is_empty());

        assert!(graph.add_superior(&leaf, &ta));
        assert_eq!(graph.superiors_of(&leaf), vec![ta.clone()]);
        assert_eq!(graph.subordinates_of(&ta), vec![leaf]);
    }

    #[test]
    fn test_duplicate_edges_ignored() {
        let graph = FederationGraph::new();
        let ta = id("https://ta.example");
        let leaf = id("https://leaf.example");

        assert!(graph.add_subordinate(&ta, &leaf));
        assert!(!graph.add_subordinate(&ta, &leaf));
        assert_eq!(graph.subordinates_of(&ta).len(), 1);
    }

    #[test]
    fn test_superior_order_preserved() {
        let graph = FederationGraph::new();
        let leaf = id("https://leaf.example");
        let b = id("https://b.example");
        let a = id("https://a.example");

        graph.add_superior(&leaf, &b);
        graph.add_superior(&leaf, &a);
        assert_eq!(graph.superiors_of(&leaf), vec![b, a]);
    }

    #[test]
    fn test_self_superior_accepted_at_mutation_time() {
        let graph = FederationGraph::new();
        let leaf = id("https://leaf.example");
        assert!(graph.add_superior(&leaf, &leaf));
    }

    #[test]
    fn test_trust_anchors() {
        let graph = FederationGraph::new();
        let ta = id("https://ta.example");
        assert!(!graph.is_trust_anchor(&ta));

        assert!(graph.add_trust_anchor(&ta));
        assert!(!graph.add_trust_anchor(&ta));
        assert!(graph.is_trust_anchor(&ta));
        assert!(graph.trust_anchor_keys(&ta).is_none());
        assert_eq!(graph.trust_anchors(), vec![ta]);
    }

    #[test]
    fn test_pinned_keys_survive_re_adding() {
        let graph = FederationGraph::new();
        let ta = id("https://ta.example");

        graph.pin_trust_anchor(&ta, JwkSet::default());
        assert!(!graph.add_trust_anchor(&ta));
        assert_eq!(graph.trust_anchor_keys(&ta), Some(JwkSet::default()));
    }
}
