use crate::model::{Action, ActionType, GraphExport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One traversal step of a flow: the edge plus resolved endpoint context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    pub from_id: String,
    pub from_address: String,
    pub to_id: String,
    pub to_address: String,
    pub to_classification: String,
    pub action_type: ActionType,
    pub trigger_description: String,
    pub expected_observation: String,
    pub actual_observation: String,
    pub sequence_number: u64,
    /// Evidence artifact names of the destination place.
    pub evidence: Vec<String>,
}

/// A maximal simple path from the root: the unit a QA test case is derived
/// from. A root with no outgoing edges yields one flow with no steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub steps: Vec<FlowStep>,
}

impl Flow {
    pub fn last_place_id(&self) -> Option<&str> {
        self.steps.last().map(|s| s.to_id.as_str())
    }
}

/// Extract every maximal simple path from the graph root.
///
/// Back-navigation edges are bookkeeping, not user intent, and are never
/// followed. An edge leading to a place already on the current path is not
/// followed either, which keeps extraction cycle-safe. Sibling edges are
/// visited in ascending sequence order, so output is deterministic.
pub fn extract_flows(graph: &GraphExport) -> Vec<Flow> {
    let Some(root) = graph.root() else {
        return Vec::new();
    };

    let mut adjacency: HashMap<&str, Vec<&Action>> = HashMap::new();
    for edge in &graph.edges {
        if edge.action_type == ActionType::BackNavigation {
            continue;
        }
        adjacency.entry(edge.from_id.as_str()).or_default().push(edge);
    }
    for edges in adjacency.values_mut() {
        edges.sort_by_key(|e| e.sequence_number);
    }

    let mut flows = Vec::new();
    let mut path: Vec<FlowStep> = Vec::new();
    let mut on_path = vec![root.id.as_str()];
    walk(graph, &adjacency, &mut on_path, &mut path, &mut flows);
    flows
}

fn walk<'g>(
    graph: &'g GraphExport,
    adjacency: &HashMap<&str, Vec<&'g Action>>,
    on_path: &mut Vec<&'g str>,
    path: &mut Vec<FlowStep>,
    flows: &mut Vec<Flow>,
) {
    let here = *on_path.last().unwrap();
    let traversable: Vec<&'g Action> = adjacency
        .get(here)
        .map(|edges| {
            edges
                .iter()
                .filter(|e| !on_path.contains(&e.to_id.as_str()))
                .copied()
                .collect()
        })
        .unwrap_or_default();

    if traversable.is_empty() {
        flows.push(Flow { steps: path.clone() });
        return;
    }

    for edge in traversable {
        path.push(step_for(graph, edge));
        on_path.push(edge.to_id.as_str());
        walk(graph, adjacency, on_path, path, flows);
        on_path.pop();
        path.pop();
    }
}

fn step_for(graph: &GraphExport, edge: &Action) -> FlowStep {
    let from = graph.get(&edge.from_id);
    let to = graph.get(&edge.to_id);
    FlowStep {
        from_id: edge.from_id.clone(),
        from_address: from.map(|p| p.display_address.clone()).unwrap_or_default(),
        to_id: edge.to_id.clone(),
        to_address: to.map(|p| p.display_address.clone()).unwrap_or_default(),
        to_classification: to.map(|p| p.classification.clone()).unwrap_or_default(),
        action_type: edge.action_type,
        trigger_description: edge.trigger_description.clone(),
        expected_observation: edge.expected_observation.clone(),
        actual_observation: edge.actual_observation.clone(),
        sequence_number: edge.sequence_number,
        evidence: to.map(|p| p.evidence.clone()).unwrap_or_default(),
    }
}
