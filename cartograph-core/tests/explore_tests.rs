// Controller tests against a scripted driver

use async_trait::async_trait;
use cartograph_core::explore::{
    ActionSelector, ExploreOptions, Explorer, FirstAvailable, ScriptedSelector, TerminationReason,
};
use cartograph_core::graph::{GraphStore, MemoryGraphStore};
use cartograph_core::model::ActionType;
use cartograph_explorer::error::{ExploreError, Result as DriverResult};
use cartograph_explorer::{
    ActionDescriptor, BackOutcome, Driver, Observation, RawElement, VisibleContent, Zone,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;

fn link(label: &str, locator: &str) -> RawElement {
    RawElement {
        zone: Zone::Content,
        kind: "link".to_string(),
        label: label.to_string(),
        locator: locator.to_string(),
        visible: true,
        enabled: true,
    }
}

fn page(address: &str, title: &str, text: &str, elements: Vec<RawElement>) -> Observation {
    Observation {
        address: address.to_string(),
        content: VisibleContent {
            title: title.to_string(),
            headings: vec![title.to_string()],
            primary_text: text.to_string(),
            active_nav: String::new(),
        },
        elements,
        screenshot: Vec::new(),
    }
}

/// Replays fixed observations: `pages` answers `navigate`, `transitions`
/// answers `perform` by locator, and `go_back` walks an internal history.
struct FakeDriver {
    pages: HashMap<String, Observation>,
    transitions: HashMap<String, Observation>,
    history: Vec<Observation>,
    back_supported: bool,
    fail_locators: Vec<String>,
}

impl FakeDriver {
    fn new(pages: Vec<Observation>, transitions: Vec<(&str, Observation)>) -> Self {
        Self {
            pages: pages.into_iter().map(|p| (p.address.clone(), p)).collect(),
            transitions: transitions
                .into_iter()
                .map(|(locator, obs)| (locator.to_string(), obs))
                .collect(),
            history: Vec::new(),
            back_supported: true,
            fail_locators: Vec::new(),
        }
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn navigate(&mut self, address: &str) -> DriverResult<Observation> {
        let obs = self
            .pages
            .get(address)
            .cloned()
            .ok_or_else(|| ExploreError::ElementNotFound(address.to_string()))?;
        self.history.push(obs.clone());
        Ok(obs)
    }

    async fn perform(&mut self, action: &ActionDescriptor) -> DriverResult<Observation> {
        if self.fail_locators.contains(&action.locator) {
            return Err(ExploreError::ElementNotFound(action.locator.clone()));
        }
        let obs = self
            .transitions
            .get(&action.locator)
            .cloned()
            .ok_or_else(|| ExploreError::ElementNotFound(action.locator.clone()))?;
        self.history.push(obs.clone());
        Ok(obs)
    }

    async fn observe(&mut self) -> DriverResult<Observation> {
        self.history
            .last()
            .cloned()
            .ok_or_else(|| ExploreError::Crashed("no page loaded".to_string()))
    }

    async fn go_back(&mut self) -> DriverResult<BackOutcome> {
        if !self.back_supported || self.history.len() < 2 {
            return Ok(BackOutcome::NoBackAffordance);
        }
        self.history.pop();
        Ok(BackOutcome::Returned(self.history.last().unwrap().clone()))
    }

    async fn close(&mut self) -> DriverResult<()> {
        Ok(())
    }
}

fn explorer_with(
    driver: FakeDriver,
    selector: Box<dyn ActionSelector>,
    options: ExploreOptions,
) -> Explorer<MemoryGraphStore> {
    Explorer::new(MemoryGraphStore::new(), Box::new(driver), selector, options)
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[tokio::test]
async fn test_empty_root_yields_one_place_and_no_edges() {
    let driver = FakeDriver::new(
        vec![page("https://site/", "Home", "nothing here", vec![])],
        vec![],
    );
    let mut explorer = explorer_with(
        driver,
        Box::new(FirstAvailable),
        ExploreOptions::new("https://site/"),
    );

    let summary = explorer.run().await.unwrap();

    assert_eq!(summary.places_discovered, 1);
    assert_eq!(summary.actions_attempted, 0);
    assert_eq!(summary.termination, TerminationReason::Exhausted);
    let export = explorer.store().export().unwrap();
    assert_eq!(export.nodes.len(), 1);
    assert!(export.edges.is_empty());
}

#[tokio::test]
async fn test_full_navigation_records_single_edge() {
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop")],
    );
    let shop = page("https://site/shop", "Shop", "the catalog", vec![]);
    let driver = FakeDriver::new(vec![root], vec![("#shop", shop)]);
    let mut explorer = explorer_with(
        driver,
        Box::new(FirstAvailable),
        ExploreOptions::new("https://site/"),
    );

    let summary = explorer.run().await.unwrap();

    assert_eq!(summary.places_discovered, 2);
    assert_eq!(summary.actions_attempted, 1);
    assert_eq!(summary.actions_failed, 0);
    assert_eq!(summary.termination, TerminationReason::Exhausted);

    // No place left with unexplored actions, so the run ends without a
    // physical backtrack and records exactly one edge.
    let export = explorer.store().export().unwrap();
    assert_eq!(export.edges.len(), 1);
    assert_eq!(export.edges[0].action_type, ActionType::FullNavigation);
    assert_eq!(export.edges[0].trigger_description, "clicked 'Shop'");
}

#[tokio::test]
async fn test_in_place_transition_mints_variant_place() {
    let root = page(
        "https://site/app",
        "App",
        "inbox view",
        vec![link("Settings", "#settings")],
    );
    // Same address, different content.
    let settings = page("https://site/app", "App", "settings view", vec![]);
    let driver = FakeDriver::new(vec![root], vec![("#settings", settings)]);
    let mut explorer = explorer_with(
        driver,
        Box::new(FirstAvailable),
        ExploreOptions::new("https://site/app"),
    );

    let summary = explorer.run().await.unwrap();

    assert_eq!(summary.places_discovered, 2);
    let export = explorer.store().export().unwrap();
    let forward = &export.edges[0];
    assert_eq!(forward.action_type, ActionType::InPlaceTransition);
    let variant = export.get(&forward.to_id).unwrap();
    assert!(variant.display_address.contains("#variant:"));
}

#[tokio::test]
async fn test_backtrack_and_sibling_exploration() {
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop"), link("About", "#about")],
    );
    let shop = page("https://site/shop", "Shop", "the catalog", vec![]);
    let about = page("https://site/about", "About", "who we are", vec![]);
    let driver = FakeDriver::new(vec![root], vec![("#shop", shop), ("#about", about)]);
    let mut explorer = explorer_with(
        driver,
        Box::new(FirstAvailable),
        ExploreOptions::new("https://site/"),
    );

    let summary = explorer.run().await.unwrap();
    assert_eq!(summary.places_discovered, 3);
    assert_eq!(summary.actions_attempted, 2);

    // Two forward edges plus the back edge taken to reach the sibling.
    let export = explorer.store().export().unwrap();
    assert_eq!(export.nodes.len(), 3);
    assert_eq!(export.edges.len(), 3);
    assert_eq!(
        export
            .edges
            .iter()
            .filter(|e| e.action_type == ActionType::BackNavigation)
            .count(),
        1
    );

    let flows = cartograph_core::flow::extract_flows(&export);
    assert_eq!(flows.len(), 2);
    assert_eq!(flows[0].steps.len(), 1);
    assert_eq!(flows[1].steps.len(), 1);
    assert_ne!(flows[0].steps[0].to_id, flows[1].steps[0].to_id);
}

// ============================================================================
// Budget / Failure / Stop Tests
// ============================================================================

#[tokio::test]
async fn test_place_budget_stops_the_run() {
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop")],
    );
    let shop = page("https://site/shop", "Shop", "the catalog", vec![]);
    let driver = FakeDriver::new(vec![root], vec![("#shop", shop)]);
    let mut options = ExploreOptions::new("https://site/");
    options.max_places = Some(1);
    let mut explorer = explorer_with(driver, Box::new(FirstAvailable), options);

    let summary = explorer.run().await.unwrap();
    assert_eq!(summary.termination, TerminationReason::PlaceBudget);
    assert_eq!(summary.places_discovered, 1);
}

#[tokio::test]
async fn test_max_depth_prevents_acting_deeper() {
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop")],
    );
    let shop = page(
        "https://site/shop",
        "Shop",
        "the catalog",
        vec![link("Item", "#item")],
    );
    let item = page("https://site/item", "Item", "details", vec![]);
    let driver = FakeDriver::new(vec![root], vec![("#shop", shop), ("#item", item)]);
    let mut options = ExploreOptions::new("https://site/");
    options.max_depth = Some(1);
    let mut explorer = explorer_with(driver, Box::new(FirstAvailable), options);

    let summary = explorer.run().await.unwrap();
    // The shop's item link is never followed.
    assert_eq!(summary.places_discovered, 2);
    assert_eq!(summary.actions_attempted, 1);
}

#[tokio::test]
async fn test_failed_action_is_counted_and_recorded_without_edge() {
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Broken", "#broken")],
    );
    let mut driver = FakeDriver::new(vec![root], vec![]);
    driver.fail_locators.push("#broken".to_string());
    let mut explorer = explorer_with(
        driver,
        Box::new(FirstAvailable),
        ExploreOptions::new("https://site/"),
    );

    let summary = explorer.run().await.unwrap();
    assert_eq!(summary.actions_attempted, 1);
    assert_eq!(summary.actions_failed, 1);

    let export = explorer.store().export().unwrap();
    assert!(export.edges.is_empty());
    let root_place = &export.nodes[0];
    assert!(
        root_place
            .observations
            .iter()
            .any(|o| o.contains("action failed after retry"))
    );
}

#[tokio::test]
async fn test_stop_signal_is_honored_between_states() {
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop")],
    );
    let shop = page("https://site/shop", "Shop", "the catalog", vec![]);
    let driver = FakeDriver::new(vec![root], vec![("#shop", shop)]);
    let mut explorer = explorer_with(
        driver,
        Box::new(FirstAvailable),
        ExploreOptions::new("https://site/"),
    );
    explorer.stop_handle().store(true, Ordering::Relaxed);

    let summary = explorer.run().await.unwrap();
    assert_eq!(summary.termination, TerminationReason::Stopped);
    assert_eq!(summary.actions_attempted, 0);
}

#[tokio::test]
async fn test_no_back_affordance_falls_back_to_renavigation() {
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop"), link("About", "#about")],
    );
    let shop = page("https://site/shop", "Shop", "the catalog", vec![]);
    let about = page("https://site/about", "About", "who we are", vec![]);
    let mut driver = FakeDriver::new(vec![root], vec![("#shop", shop), ("#about", about)]);
    driver.back_supported = false;
    let mut explorer = explorer_with(
        driver,
        Box::new(FirstAvailable),
        ExploreOptions::new("https://site/"),
    );

    let summary = explorer.run().await.unwrap();
    assert_eq!(summary.termination, TerminationReason::Exhausted);

    // The back edge is still recorded even though the driver had no
    // back affordance.
    let export = explorer.store().export().unwrap();
    assert!(
        export
            .edges
            .iter()
            .any(|e| e.action_type == ActionType::BackNavigation)
    );
}

// ============================================================================
// Evidence Tests
// ============================================================================

#[tokio::test]
async fn test_attached_evidence_names_have_stored_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop")],
    );
    root.screenshot = b"root-shot".to_vec();
    let mut shop = page("https://site/shop", "Shop", "the catalog", vec![]);
    shop.screenshot = b"shop-shot".to_vec();
    let driver = FakeDriver::new(vec![root], vec![("#shop", shop)]);
    let mut options = ExploreOptions::new("https://site/");
    options.evidence_dir = Some(dir.path().to_path_buf());
    let mut explorer = explorer_with(driver, Box::new(FirstAvailable), options);

    explorer.run().await.unwrap();

    // Every artifact name carried by the graph maps to a file on disk.
    let export = explorer.store().export().unwrap();
    let mut attached = 0;
    for node in &export.nodes {
        for name in &node.evidence {
            attached += 1;
            let path = dir.path().join(format!("{name}.png"));
            assert!(path.exists(), "no stored file for artifact {name}");
        }
    }
    // Two arrival captures plus the before-action capture.
    assert_eq!(attached, 3);
    assert!(
        export.nodes[0]
            .evidence
            .iter()
            .any(|name| name.contains("before_"))
    );
}

#[tokio::test]
async fn test_no_evidence_names_attached_without_stored_bytes() {
    let dir = tempfile::tempdir().unwrap();
    // The driver sends no screenshot payloads, so nothing is written and
    // no artifact names may dangle.
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop")],
    );
    let shop = page("https://site/shop", "Shop", "the catalog", vec![]);
    let driver = FakeDriver::new(vec![root], vec![("#shop", shop)]);
    let mut options = ExploreOptions::new("https://site/");
    options.evidence_dir = Some(dir.path().to_path_buf());
    let mut explorer = explorer_with(driver, Box::new(FirstAvailable), options);

    explorer.run().await.unwrap();

    let export = explorer.store().export().unwrap();
    assert!(export.nodes.iter().all(|n| n.evidence.is_empty()));
}

#[tokio::test]
async fn test_scripted_selector_follows_the_script() {
    let root = page(
        "https://site/",
        "Home",
        "welcome",
        vec![link("Shop", "#shop"), link("About", "#about")],
    );
    let shop = page("https://site/shop", "Shop", "the catalog", vec![]);
    let about = page("https://site/about", "About", "who we are", vec![]);
    let driver = FakeDriver::new(vec![root], vec![("#shop", shop), ("#about", about)]);
    let selector = ScriptedSelector::from_lines("# visit about only\nAbout\n");
    let mut explorer = explorer_with(
        driver,
        Box::new(selector),
        ExploreOptions::new("https://site/"),
    );

    let summary = explorer.run().await.unwrap();
    assert_eq!(summary.actions_attempted, 1);

    let export = explorer.store().export().unwrap();
    let forward = export
        .edges
        .iter()
        .find(|e| e.action_type == ActionType::FullNavigation)
        .unwrap();
    assert_eq!(forward.trigger_description, "clicked 'About'");
}
