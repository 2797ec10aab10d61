pub mod data;
pub mod explore;
pub mod flow;
pub mod graph;
pub mod model;
pub mod report;

pub use data::Database;
pub use explore::{
    ActionSelector, ExploreOptions, Explorer, FirstAvailable, RunError, RunSummary,
    ScriptedSelector, StopHandle, TerminationReason,
};
pub use flow::{Flow, FlowStep, extract_flows};
pub use graph::{GraphError, GraphStore, MemoryGraphStore};
pub use model::{Action, ActionAttrs, ActionType, GraphExport, Place, PlaceAttrs};
pub use report::{
    CaseType, ReportFormat, TestCase, TestStep, derive_test_cases, generate_management_export,
    generate_markdown_report, save_report,
};
