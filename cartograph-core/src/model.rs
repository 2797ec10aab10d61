use cartograph_explorer::{ActionDescriptor, InventorySnapshot};
use serde::{Deserialize, Serialize};

/// Kind of transition an action edge records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Navigation that changed the address.
    FullNavigation,
    /// Content changed without an address change (SPA view switch).
    InPlaceTransition,
    /// Explicit backtracking to an earlier place.
    BackNavigation,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::FullNavigation => "full_navigation",
            ActionType::InPlaceTransition => "in_place_transition",
            ActionType::BackNavigation => "back_navigation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "full_navigation" => Some(ActionType::FullNavigation),
            "in_place_transition" => Some(ActionType::InPlaceTransition),
            "back_navigation" => Some(ActionType::BackNavigation),
            _ => None,
        }
    }
}

/// A distinct, de-duplicated state of the explored application.
///
/// Places are append-only within a run: revisits merge into the existing
/// node, nothing is ever deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    pub display_address: String,
    pub address: String,
    pub depth: usize,
    /// Logical discovery sequence, not wall-clock time.
    pub discovered_at: u64,
    pub content_fingerprint: String,
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub observations: Vec<String>,
    /// Interactive elements not yet explored from this place.
    #[serde(default)]
    pub available_actions: Vec<ActionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_snapshot: Option<InventorySnapshot>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl Place {
    /// Merge semantics shared by every backend: last-write-wins on
    /// observation fields, set-union on available actions (keyed by
    /// locator), append-only notes and evidence.
    pub fn merge(&mut self, attrs: &PlaceAttrs) {
        self.display_address = attrs.display_address.clone();
        self.content_fingerprint = attrs.content_fingerprint.clone();
        if let Some(classification) = &attrs.classification {
            self.classification = classification.clone();
        }
        if let Some(observation) = &attrs.observation {
            self.observations.push(observation.clone());
        }
        if let Some(snapshot) = &attrs.inventory_snapshot {
            self.inventory_snapshot = Some(snapshot.clone());
        }
        if let Some(evidence) = &attrs.evidence {
            self.evidence.push(evidence.clone());
        }
        for action in &attrs.available_actions {
            if !self
                .available_actions
                .iter()
                .any(|a| a.locator == action.locator)
            {
                self.available_actions.push(action.clone());
            }
        }
    }
}

/// A recorded transition attempt between two places. Immutable once created;
/// edges reference places by id, never own them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub action_type: ActionType,
    pub trigger_description: String,
    #[serde(default)]
    pub expected_observation: String,
    #[serde(default)]
    pub actual_observation: String,
    pub sequence_number: u64,
}

/// Attributes for a create-or-merge place write.
#[derive(Debug, Clone, Default)]
pub struct PlaceAttrs {
    pub id: String,
    pub display_address: String,
    pub address: String,
    pub depth: usize,
    pub content_fingerprint: String,
    pub classification: Option<String>,
    pub observation: Option<String>,
    pub inventory_snapshot: Option<InventorySnapshot>,
    pub available_actions: Vec<ActionDescriptor>,
    pub evidence: Option<String>,
}

impl PlaceAttrs {
    /// A fresh node from these attributes; `discovered_at` is assigned by
    /// the store.
    pub fn into_place(self, discovered_at: u64) -> Place {
        Place {
            id: self.id,
            display_address: self.display_address,
            address: self.address,
            depth: self.depth,
            discovered_at,
            content_fingerprint: self.content_fingerprint,
            classification: self.classification.unwrap_or_default(),
            observations: self.observation.into_iter().collect(),
            available_actions: self.available_actions,
            inventory_snapshot: self.inventory_snapshot,
            evidence: self.evidence.into_iter().collect(),
        }
    }
}

/// Attributes for an action edge; `id` and `sequence_number` are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct ActionAttrs {
    pub from_id: String,
    pub to_id: String,
    pub action_type: ActionType,
    pub trigger_description: String,
    pub expected_observation: String,
    pub actual_observation: String,
}

/// Point-in-time export of the full graph: the document the visualization
/// and test-generation consumers parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<Place>,
    pub edges: Vec<Action>,
}

impl GraphExport {
    /// The root place: first discovered node.
    pub fn root(&self) -> Option<&Place> {
        self.nodes.first()
    }

    pub fn get(&self, id: &str) -> Option<&Place> {
        self.nodes.iter().find(|p| p.id == id)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
