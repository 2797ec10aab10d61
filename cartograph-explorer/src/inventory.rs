use crate::driver::{ActionDescriptor, Observation, RawElement, Zone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured snapshot of the interactive surface of one place, grouped by
/// structural zone. Snapshots are only comparable within the same place id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub zones: BTreeMap<Zone, Vec<ElementEntry>>,
}

/// One captured element. Labels are whitespace-normalized at capture time so
/// animation/render noise does not register as a structural change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementEntry {
    pub kind: String,
    pub label: String,
    pub locator: String,
    pub enabled: bool,
}

impl ElementEntry {
    fn identity(&self) -> (&str, &str, &str) {
        (&self.kind, &self.label, &self.locator)
    }
}

/// Per-zone structural difference between two snapshots of the same place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneChange {
    pub zone: Zone,
    pub added: Vec<ElementEntry>,
    pub removed: Vec<ElementEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeReport {
    /// No prior snapshot existed for this place: full capture, not an error.
    pub first_visit: bool,
    pub changes: Vec<ZoneChange>,
    pub significant: bool,
}

impl ChangeReport {
    pub fn summarize(&self) -> String {
        if self.first_visit {
            return "first visit, full capture".to_string();
        }
        if self.changes.is_empty() {
            return "no structural change".to_string();
        }
        let parts: Vec<String> = self
            .changes
            .iter()
            .map(|c| format!("{}: +{} -{}", c.zone.as_str(), c.added.len(), c.removed.len()))
            .collect();
        parts.join(", ")
    }
}

/// Significance policy knobs.
#[derive(Debug, Clone)]
pub struct DiffPolicy {
    /// Additions (or removals) in content/footer zones below this count are
    /// not significant, absorbing infinite-scroll noise.
    pub content_change_threshold: usize,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            content_change_threshold: 3,
        }
    }
}

/// Build a snapshot from a raw driver observation: invisible elements are
/// dropped, labels whitespace-normalized, zone grouping preserved in
/// reported order.
pub fn capture(observation: &Observation) -> InventorySnapshot {
    let mut zones: BTreeMap<Zone, Vec<ElementEntry>> = BTreeMap::new();
    for element in &observation.elements {
        if !element.visible {
            continue;
        }
        zones.entry(element.zone).or_default().push(ElementEntry {
            kind: element.kind.clone(),
            label: normalize_label(&element.label),
            locator: element.locator.clone(),
            enabled: element.enabled,
        });
    }
    InventorySnapshot { zones }
}

/// The actionable subset of an observation: visible, enabled elements the
/// controller may choose to act on. Overlay elements come first so open
/// dialogs get handled before the page behind them.
pub fn interactive_actions(observation: &Observation) -> Vec<ActionDescriptor> {
    let mut actions: Vec<ActionDescriptor> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut push = |el: &RawElement| {
        if el.visible && el.enabled && is_actionable_kind(&el.kind) && seen.insert(el.locator.clone())
        {
            actions.push(ActionDescriptor {
                kind: el.kind.clone(),
                label: normalize_label(&el.label),
                locator: el.locator.clone(),
            });
        }
    };
    for el in observation.elements.iter().filter(|e| e.zone == Zone::Overlay) {
        push(el);
    }
    for el in observation.elements.iter().filter(|e| e.zone != Zone::Overlay) {
        push(el);
    }
    actions
}

fn is_actionable_kind(kind: &str) -> bool {
    matches!(kind, "link" | "button" | "tab" | "menu_item")
}

fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compare the previous snapshot of a place against the current one.
///
/// Pure reordering of an unchanged element set is not a change. Any
/// addition/removal in header, forms or overlay zones is significant;
/// content and footer churn only counts once it crosses the policy
/// threshold.
pub fn diff(
    policy: &DiffPolicy,
    previous: Option<&InventorySnapshot>,
    current: &InventorySnapshot,
) -> ChangeReport {
    let Some(previous) = previous else {
        return ChangeReport {
            first_visit: true,
            changes: Vec::new(),
            significant: true,
        };
    };

    let empty: Vec<ElementEntry> = Vec::new();
    let mut changes = Vec::new();
    let mut significant = false;

    for zone in Zone::ALL {
        let before = previous.zones.get(&zone).unwrap_or(&empty);
        let after = current.zones.get(&zone).unwrap_or(&empty);

        let added: Vec<ElementEntry> = after
            .iter()
            .filter(|el| !before.iter().any(|b| b.identity() == el.identity()))
            .cloned()
            .collect();
        let removed: Vec<ElementEntry> = before
            .iter()
            .filter(|el| !after.iter().any(|a| a.identity() == el.identity()))
            .cloned()
            .collect();

        if added.is_empty() && removed.is_empty() {
            continue;
        }

        let zone_significant = match zone {
            Zone::Header | Zone::Forms | Zone::Overlay => true,
            Zone::Content | Zone::Footer => {
                added.len() >= policy.content_change_threshold
                    || removed.len() >= policy.content_change_threshold
            }
        };
        significant = significant || zone_significant;
        changes.push(ZoneChange {
            zone,
            added,
            removed,
        });
    }

    ChangeReport {
        first_visit: false,
        changes,
        significant,
    }
}
