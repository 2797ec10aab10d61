use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structural zone a surface element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Header,
    Content,
    Forms,
    Footer,
    Overlay,
}

impl Zone {
    pub const ALL: [Zone; 5] = [
        Zone::Header,
        Zone::Content,
        Zone::Forms,
        Zone::Footer,
        Zone::Overlay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Header => "header",
            Zone::Content => "content",
            Zone::Forms => "forms",
            Zone::Footer => "footer",
            Zone::Overlay => "overlay",
        }
    }
}

/// One interactive or structural element as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawElement {
    pub zone: Zone,
    /// Element kind, e.g. "link", "button", "input".
    pub kind: String,
    pub label: String,
    /// Selector or locator usable in a later `perform` call.
    pub locator: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Normalized text extraction used for content fingerprinting: headings,
/// primary text and the active navigation indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub headings: Vec<String>,
    #[serde(default)]
    pub primary_text: String,
    #[serde(default)]
    pub active_nav: String,
}

/// A raw observation of the current page/screen, as reported by the driver.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub address: String,
    pub content: VisibleContent,
    pub elements: Vec<RawElement>,
    pub screenshot: Vec<u8>,
}

/// One actionable element, the unit the controller chooses between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: String,
    pub label: String,
    pub locator: String,
}

impl ActionDescriptor {
    pub fn describe(&self) -> String {
        if self.label.is_empty() {
            format!("activated {} `{}`", self.kind, self.locator)
        } else {
            format!("clicked '{}'", self.label)
        }
    }
}

/// Result of asking the driver to go back via the application's own
/// back affordance.
#[derive(Debug)]
pub enum BackOutcome {
    Returned(Observation),
    /// The driver found no back button or equivalent; the caller falls back
    /// to direct re-navigation by address.
    NoBackAffordance,
}

/// The automation surface Cartograph drives. Implementations perform real
/// navigation and observation (browser, mobile UI) or replay scripted
/// observations in tests.
///
/// Calls are strictly sequential: the controller never issues a second
/// command before the prior one resolves.
#[async_trait]
pub trait Driver: Send {
    async fn navigate(&mut self, address: &str) -> Result<Observation>;

    async fn perform(&mut self, action: &ActionDescriptor) -> Result<Observation>;

    async fn observe(&mut self) -> Result<Observation>;

    async fn go_back(&mut self) -> Result<BackOutcome>;

    /// Release the underlying session. Must be safe to call on every exit
    /// path, including abort.
    async fn close(&mut self) -> Result<()>;
}
