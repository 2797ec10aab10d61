pub mod driver;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod inventory;
pub mod subprocess;

pub use driver::{ActionDescriptor, BackOutcome, Driver, Observation, RawElement, VisibleContent, Zone};
pub use error::{ExploreError, Result};
pub use evidence::EvidenceManager;
pub use fingerprint::{FingerprintConfig, FingerprintEngine, Resolution};
pub use inventory::{ChangeReport, DiffPolicy, InventorySnapshot};
pub use subprocess::SubprocessDriver;
