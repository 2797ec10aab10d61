use crate::graph::{GraphError, GraphStore};
use crate::model::{ActionAttrs, ActionType, Place, PlaceAttrs};
use cartograph_explorer::{
    ActionDescriptor, BackOutcome, ChangeReport, DiffPolicy, Driver, EvidenceManager, ExploreError,
    FingerprintConfig, FingerprintEngine, Observation, inventory,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("driver error: {0}")]
    Driver(#[from] ExploreError),
}

/// Options for configuring an exploration run.
pub struct ExploreOptions {
    pub root_address: String,
    /// Stop discovering once this many places exist. None is unbounded.
    pub max_places: Option<usize>,
    /// Do not act from places deeper than this. None is unbounded.
    pub max_depth: Option<usize>,
    pub diff_policy: DiffPolicy,
    pub volatile_patterns: Vec<String>,
    /// Directory for screenshot artifacts. None disables persistence.
    pub evidence_dir: Option<PathBuf>,
}

impl ExploreOptions {
    pub fn new(root_address: impl Into<String>) -> Self {
        Self {
            root_address: root_address.into(),
            max_places: None,
            max_depth: None,
            diff_policy: DiffPolicy::default(),
            volatile_patterns: Vec::new(),
            evidence_dir: None,
        }
    }
}

/// Why a run ended. Budget stops are normal completions, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Every reachable action was attempted.
    Exhausted,
    /// The place budget was reached.
    PlaceBudget,
    /// An external stop was requested.
    Stopped,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Exhausted => "exhausted",
            TerminationReason::PlaceBudget => "place_budget",
            TerminationReason::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub places_discovered: usize,
    pub actions_attempted: usize,
    pub actions_failed: usize,
    pub termination: TerminationReason,
}

/// Picks the next action to attempt at a place. The controller has already
/// filtered the list to unattempted actions.
pub trait ActionSelector: Send {
    fn select(&mut self, place: &Place, actions: &[ActionDescriptor]) -> Option<ActionDescriptor>;
}

/// Default policy: take actions in the order the inventory reported them,
/// which puts overlay dismissals first.
#[derive(Debug, Default)]
pub struct FirstAvailable;

impl ActionSelector for FirstAvailable {
    fn select(&mut self, _place: &Place, actions: &[ActionDescriptor]) -> Option<ActionDescriptor> {
        actions.first().cloned()
    }
}

/// Replays a fixed list of action labels, one per choice, for deterministic
/// runs. A label with no match at the current place is skipped; an empty
/// script means stop choosing.
#[derive(Debug, Default)]
pub struct ScriptedSelector {
    labels: VecDeque<String>,
}

impl ScriptedSelector {
    pub fn new(labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    /// One label per non-empty line, `#` comments ignored.
    pub fn from_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from),
        )
    }
}

impl ActionSelector for ScriptedSelector {
    fn select(&mut self, _place: &Place, actions: &[ActionDescriptor]) -> Option<ActionDescriptor> {
        while let Some(label) = self.labels.pop_front() {
            if let Some(action) = actions.iter().find(|a| a.label == label) {
                return Some(action.clone());
            }
            debug!(%label, "scripted label not present at this place, skipping");
        }
        None
    }
}

/// Shareable stop flag, honored between controller states.
pub type StopHandle = Arc<AtomicBool>;

struct VisitedFrame {
    place_id: String,
    address: String,
    depth: usize,
}

/// The exploration state machine. Owns the store, the driver session, the
/// identity engine and the evidence manager for the duration of one run.
pub struct Explorer<S: GraphStore> {
    store: S,
    driver: Box<dyn Driver>,
    selector: Box<dyn ActionSelector>,
    fingerprints: FingerprintEngine,
    evidence: EvidenceManager,
    options: ExploreOptions,
    stop: StopHandle,
    /// Locators already claimed per place, so a revisit's fresh inventory
    /// cannot resurrect an attempted action.
    attempted: HashMap<String, HashSet<String>>,
    /// Screenshot bytes from the most recent observation, kept so the
    /// before-action artifact can be written from the current view.
    last_screenshot: Vec<u8>,
    actions_attempted: usize,
    actions_failed: usize,
}

impl<S: GraphStore> Explorer<S> {
    pub fn new(
        store: S,
        driver: Box<dyn Driver>,
        selector: Box<dyn ActionSelector>,
        options: ExploreOptions,
    ) -> Self {
        let fingerprints = FingerprintEngine::new(FingerprintConfig {
            volatile_patterns: options.volatile_patterns.clone(),
        });
        let evidence = EvidenceManager::new(options.evidence_dir.clone());
        Self {
            store,
            driver,
            selector,
            fingerprints,
            evidence,
            options,
            stop: Arc::new(AtomicBool::new(false)),
            attempted: HashMap::new(),
            last_screenshot: Vec::new(),
            actions_attempted: 0,
            actions_failed: 0,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Run the exploration to termination. The graph remains exportable on
    /// every exit path, including errors.
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        let result = self.drive().await;
        if let Err(err) = self.driver.close().await {
            warn!(error = %err, "driver session did not close cleanly");
        }
        let termination = result?;
        Ok(RunSummary {
            places_discovered: self.store.place_count()?,
            actions_attempted: self.actions_attempted,
            actions_failed: self.actions_failed,
            termination,
        })
    }

    async fn drive(&mut self) -> Result<TerminationReason, RunError> {
        let root_address = self.options.root_address.clone();
        info!(address = %root_address, "starting exploration");

        let observation = self.navigate_with_retry(&root_address).await?;
        let mut current = self.arrive(observation, 0)?;
        let mut stack: Vec<VisitedFrame> = Vec::new();

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested, ending run");
                return Ok(TerminationReason::Stopped);
            }
            if self.place_budget_reached()? {
                info!("place budget reached, ending run");
                return Ok(TerminationReason::PlaceBudget);
            }

            let selected = self.choose_action(&current)?;
            let Some(action) = selected else {
                // Nothing left here. Backtrack to the nearest place with
                // unexplored actions, or finish.
                let Some(frame) = self.pop_workable_frame(&mut stack)? else {
                    info!("no places left to explore, run exhausted");
                    return Ok(TerminationReason::Exhausted);
                };
                current = self.backtrack(&current, frame).await?;
                continue;
            };

            self.actions_attempted += 1;
            let before_name = self
                .evidence
                .capture(&format!("before_{}", action.describe()));
            if self.persist_screenshot(&before_name, &self.last_screenshot) {
                self.attach_evidence(&current, before_name)?;
            }

            let Some(after) = self.perform_with_retry(&current, &action).await? else {
                self.actions_failed += 1;
                self.note_failure(&current, &action)?;
                // Restabilize the session on the current place before
                // choosing again.
                let observation = self.navigate_with_retry(&current.address).await?;
                current = self.arrive(observation, current.depth)?;
                continue;
            };

            current = self.resolve_transition(current, &action, after, &mut stack)?;
        }
    }

    /// AT_PLACE: resolve identity, capture inventory, diff against the prior
    /// snapshot and upsert. Returns the up-to-date place.
    fn arrive(&mut self, observation: Observation, depth: usize) -> Result<Place, RunError> {
        let resolution = self
            .fingerprints
            .resolve(&observation.address, &observation.content);
        let snapshot = inventory::capture(&observation);
        let previous = self.store.get_place(&resolution.place_id)?;
        let report = inventory::diff(
            &self.options.diff_policy,
            previous.as_ref().and_then(|p| p.inventory_snapshot.as_ref()),
            &snapshot,
        );

        let observation_note = self.revisit_note(&resolution.place_id, &previous, &report);
        // Attach an artifact name only when its file actually got written,
        // so exports never reference missing evidence.
        let artifact = self
            .evidence
            .maybe_capture(&resolution.display_address, &report)
            .filter(|name| self.persist_screenshot(name, &observation.screenshot));

        let attempted = self.attempted.entry(resolution.place_id.clone()).or_default();
        let available_actions: Vec<ActionDescriptor> = inventory::interactive_actions(&observation)
            .into_iter()
            .filter(|a| !attempted.contains(&a.locator))
            .collect();

        let place = self.store.upsert_place(PlaceAttrs {
            id: resolution.place_id,
            display_address: resolution.display_address,
            address: observation.address.clone(),
            depth,
            content_fingerprint: resolution.content_fingerprint,
            classification: None,
            observation: observation_note,
            inventory_snapshot: Some(snapshot),
            available_actions,
            evidence: artifact,
        })?;
        self.last_screenshot = observation.screenshot;
        Ok(place)
    }

    fn revisit_note(
        &self,
        place_id: &str,
        previous: &Option<Place>,
        report: &ChangeReport,
    ) -> Option<String> {
        if previous.is_some() && !report.first_visit && report.significant {
            let summary = report.summarize();
            warn!(%place_id, %summary, "ATTENTION: layout changed since last visit");
            Some(format!("layout changed since last visit: {summary}"))
        } else {
            None
        }
    }

    /// CHOOSING_ACTION: let the selector pick, then claim the action so it
    /// is attempted at most once this run.
    fn choose_action(&mut self, current: &Place) -> Result<Option<ActionDescriptor>, RunError> {
        if let Some(max_depth) = self.options.max_depth
            && current.depth >= max_depth
        {
            debug!(place_id = %current.id, depth = current.depth, "depth budget reached here");
            return Ok(None);
        }
        let Some(place) = self.store.get_place(&current.id)? else {
            return Err(GraphError::UnknownPlace(current.id.clone()).into());
        };
        let Some(chosen) = self.selector.select(&place, &place.available_actions) else {
            return Ok(None);
        };
        self.attempted
            .entry(current.id.clone())
            .or_default()
            .insert(chosen.locator.clone());
        Ok(self.store.claim_action(&current.id, &chosen.locator)?)
    }

    /// ACTING: one bounded retry after a re-observe, then give up on the
    /// action. Fatal driver errors propagate.
    async fn perform_with_retry(
        &mut self,
        current: &Place,
        action: &ActionDescriptor,
    ) -> Result<Option<Observation>, RunError> {
        match self.driver.perform(action).await {
            Ok(observation) => Ok(Some(observation)),
            Err(err) if err.is_action_failure() => {
                warn!(place_id = %current.id, action = %action.describe(), error = %err,
                    "action failed, retrying once");
                if let Err(observe_err) = self.driver.observe().await
                    && !observe_err.is_action_failure()
                {
                    return Err(observe_err.into());
                }
                match self.driver.perform(action).await {
                    Ok(observation) => Ok(Some(observation)),
                    Err(err) if err.is_action_failure() => {
                        warn!(place_id = %current.id, action = %action.describe(), error = %err,
                            "action failed after retry, marking failed");
                        Ok(None)
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn note_failure(&mut self, current: &Place, action: &ActionDescriptor) -> Result<(), RunError> {
        self.store.upsert_place(PlaceAttrs {
            id: current.id.clone(),
            display_address: current.display_address.clone(),
            address: current.address.clone(),
            depth: current.depth,
            content_fingerprint: current.content_fingerprint.clone(),
            observation: Some(format!("action failed after retry: {}", action.describe())),
            ..Default::default()
        })?;
        Ok(())
    }

    /// RESOLVING: classify the transition, record the edge, and move the
    /// cursor. A transition into a different place pushes the origin onto
    /// the visited stack.
    fn resolve_transition(
        &mut self,
        origin: Place,
        action: &ActionDescriptor,
        after: Observation,
        stack: &mut Vec<VisitedFrame>,
    ) -> Result<Place, RunError> {
        let address_changed = cartograph_explorer::fingerprint::normalize_address(&after.address)
            != cartograph_explorer::fingerprint::normalize_address(&origin.address);
        let destination = self.arrive(after, origin.depth + 1)?;

        if destination.id == origin.id {
            // The action consumed itself without a state change; keep
            // choosing from the same place, no edge recorded.
            debug!(place_id = %origin.id, action = %action.describe(), "no state change");
            return Ok(destination);
        }

        let action_type = if address_changed {
            ActionType::FullNavigation
        } else {
            ActionType::InPlaceTransition
        };
        self.store.add_action(ActionAttrs {
            from_id: origin.id.clone(),
            to_id: destination.id.clone(),
            action_type,
            trigger_description: action.describe(),
            expected_observation: format!("{} changes the view", action.describe()),
            actual_observation: format!("arrived at {}", destination.display_address),
        })?;
        stack.push(VisitedFrame {
            place_id: origin.id,
            address: origin.address,
            depth: origin.depth,
        });
        Ok(destination)
    }

    /// BACKTRACKING: prefer the app's own back affordance and record the
    /// `back_navigation` edge; fall back to direct re-navigation.
    async fn backtrack(
        &mut self,
        current: &Place,
        frame: VisitedFrame,
    ) -> Result<Place, RunError> {
        debug!(from = %current.id, to = %frame.place_id, "backtracking");
        let observation = match self.driver.go_back().await {
            Ok(BackOutcome::Returned(observation)) => observation,
            Ok(BackOutcome::NoBackAffordance) => {
                debug!(address = %frame.address, "no back affordance, re-navigating");
                self.navigate_with_retry(&frame.address).await?
            }
            Err(err) if err.is_action_failure() => {
                warn!(error = %err, "back navigation failed, re-navigating");
                self.navigate_with_retry(&frame.address).await?
            }
            Err(err) => return Err(err.into()),
        };
        let arrived = self.arrive(observation, frame.depth)?;
        self.store.add_action(ActionAttrs {
            from_id: current.id.clone(),
            to_id: arrived.id.clone(),
            action_type: ActionType::BackNavigation,
            trigger_description: "went back".to_string(),
            expected_observation: format!("returns to {}", arrived.display_address),
            actual_observation: format!("arrived at {}", arrived.display_address),
        })?;
        Ok(arrived)
    }

    async fn navigate_with_retry(&mut self, address: &str) -> Result<Observation, RunError> {
        match self.driver.navigate(address).await {
            Ok(observation) => Ok(observation),
            Err(err) if err.is_action_failure() => {
                warn!(%address, error = %err, "navigation failed, retrying once");
                Ok(self.driver.navigate(address).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Discard stacked frames with nothing left to explore, so the run does
    /// not navigate back just to immediately terminate.
    fn pop_workable_frame(
        &self,
        stack: &mut Vec<VisitedFrame>,
    ) -> Result<Option<VisitedFrame>, RunError> {
        while let Some(frame) = stack.pop() {
            if let Some(max_depth) = self.options.max_depth
                && frame.depth >= max_depth
            {
                continue;
            }
            let has_actions = self
                .store
                .get_place(&frame.place_id)?
                .map(|p| !p.available_actions.is_empty())
                .unwrap_or(false);
            if has_actions {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    fn place_budget_reached(&self) -> Result<bool, RunError> {
        let Some(max_places) = self.options.max_places else {
            return Ok(false);
        };
        Ok(self.store.place_count()? >= max_places)
    }

    /// Record a persisted artifact name on the origin place.
    fn attach_evidence(&mut self, place: &Place, name: String) -> Result<(), RunError> {
        self.store.upsert_place(PlaceAttrs {
            id: place.id.clone(),
            display_address: place.display_address.clone(),
            address: place.address.clone(),
            depth: place.depth,
            content_fingerprint: place.content_fingerprint.clone(),
            evidence: Some(name),
            ..Default::default()
        })?;
        Ok(())
    }

    /// Returns true only when a file was written.
    fn persist_screenshot(&self, name: &str, bytes: &[u8]) -> bool {
        match self.evidence.store(name, bytes) {
            Ok(path) => path.is_some(),
            Err(err) => {
                warn!(artifact = %name, error = %err, "failed to persist screenshot");
                false
            }
        }
    }
}
