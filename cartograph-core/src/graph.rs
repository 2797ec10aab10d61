use crate::model::{Action, ActionAttrs, GraphExport, Place, PlaceAttrs};
use cartograph_explorer::ActionDescriptor;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum GraphError {
    /// An edge referenced a place that does not exist. Unreachable by
    /// construction; treated as a fatal internal-invariant violation.
    #[error("action references unknown place: {0}")]
    UnknownPlace(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage contract for one run's exploration graph.
///
/// Concurrency discipline is single-writer: all mutation calls are
/// serialized by the exploration controller, and concurrent writers are
/// unsupported. `export` returns a point-in-time copy and is safe to hand to
/// a concurrent read-only consumer.
pub trait GraphStore {
    /// Create-or-merge a place. Merge semantics are `Place::merge`:
    /// last-write-wins observation fields, set-union available actions.
    fn upsert_place(&mut self, attrs: PlaceAttrs) -> Result<Place, GraphError>;

    /// Record an action edge. Both endpoints must already exist; the store
    /// assigns the sequence number and edge id.
    fn add_action(&mut self, attrs: ActionAttrs) -> Result<Action, GraphError>;

    fn get_place(&self, id: &str) -> Result<Option<Place>, GraphError>;

    /// Remove one available action from a place, returning it. The
    /// controller claims an action before performing it, so an action is
    /// attempted at most once per place per run.
    fn claim_action(
        &mut self,
        place_id: &str,
        locator: &str,
    ) -> Result<Option<ActionDescriptor>, GraphError>;

    fn place_count(&self) -> Result<usize, GraphError>;

    fn action_count(&self) -> Result<usize, GraphError>;

    /// Full export in serialization-stable order: places in insertion
    /// order, actions in sequence-number order.
    fn export(&self) -> Result<GraphExport, GraphError>;
}

/// Default in-memory backend, petgraph-based, process-lifetime.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graph: DiGraph<Place, Action>,
    index: HashMap<String, NodeIndex>,
    sequence: u64,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn node(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }
}

impl GraphStore for MemoryGraphStore {
    fn upsert_place(&mut self, attrs: PlaceAttrs) -> Result<Place, GraphError> {
        if let Some(idx) = self.node(&attrs.id) {
            let place = &mut self.graph[idx];
            place.merge(&attrs);
            debug!(place_id = %place.id, "merged revisited place");
            return Ok(place.clone());
        }
        let discovered_at = self.next_sequence();
        let place = attrs.into_place(discovered_at);
        let idx = self.graph.add_node(place.clone());
        self.index.insert(place.id.clone(), idx);
        debug!(place_id = %place.id, depth = place.depth, "discovered place");
        Ok(place)
    }

    fn add_action(&mut self, attrs: ActionAttrs) -> Result<Action, GraphError> {
        let from = self
            .node(&attrs.from_id)
            .ok_or_else(|| GraphError::UnknownPlace(attrs.from_id.clone()))?;
        let to = self
            .node(&attrs.to_id)
            .ok_or_else(|| GraphError::UnknownPlace(attrs.to_id.clone()))?;

        let sequence_number = self.next_sequence();
        let action = Action {
            id: format!("{} -> {} @{}", attrs.from_id, attrs.to_id, sequence_number),
            from_id: attrs.from_id,
            to_id: attrs.to_id,
            action_type: attrs.action_type,
            trigger_description: attrs.trigger_description,
            expected_observation: attrs.expected_observation,
            actual_observation: attrs.actual_observation,
            sequence_number,
        };
        self.graph.add_edge(from, to, action.clone());
        Ok(action)
    }

    fn get_place(&self, id: &str) -> Result<Option<Place>, GraphError> {
        Ok(self.node(id).map(|idx| self.graph[idx].clone()))
    }

    fn claim_action(
        &mut self,
        place_id: &str,
        locator: &str,
    ) -> Result<Option<ActionDescriptor>, GraphError> {
        let Some(idx) = self.node(place_id) else {
            return Ok(None);
        };
        let place = &mut self.graph[idx];
        let position = place
            .available_actions
            .iter()
            .position(|a| a.locator == locator);
        Ok(position.map(|pos| place.available_actions.remove(pos)))
    }

    fn place_count(&self) -> Result<usize, GraphError> {
        Ok(self.graph.node_count())
    }

    fn action_count(&self) -> Result<usize, GraphError> {
        Ok(self.graph.edge_count())
    }

    fn export(&self) -> Result<GraphExport, GraphError> {
        // Node indices are insertion-ordered; edges are re-sorted by
        // sequence number for a serialization-stable document.
        let nodes: Vec<Place> = self
            .graph
            .node_indices()
            .map(|idx| self.graph[idx].clone())
            .collect();
        let mut edges: Vec<Action> = self
            .graph
            .edge_indices()
            .map(|idx| self.graph[idx].clone())
            .collect();
        edges.sort_by_key(|a| a.sequence_number);
        Ok(GraphExport { nodes, edges })
    }
}
