// Test-case derivation and report generation from an exported graph

use crate::flow::Flow;
use crate::model::GraphExport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReportFormat {
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Some(ReportFormat::Markdown),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// Test-case type, with the numeric id used by test-management imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    Smoke,
    Functional,
    Regression,
    Navigation,
    EndToEnd,
    Edge,
    Negative,
}

impl CaseType {
    pub fn type_id(&self) -> u32 {
        match self {
            CaseType::Smoke => 1,
            CaseType::Functional => 2,
            CaseType::Regression => 3,
            CaseType::Navigation => 4,
            CaseType::EndToEnd => 5,
            CaseType::Edge => 6,
            CaseType::Negative => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::Smoke => "Smoke",
            CaseType::Functional => "Functional",
            CaseType::Regression => "Regression",
            CaseType::Navigation => "Navigation",
            CaseType::EndToEnd => "End-to-End",
            CaseType::Edge => "Edge",
            CaseType::Negative => "Negative",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStep {
    pub index: usize,
    pub action: String,
    pub expected: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// `TC-001`, `TC-002`, ... in flow order.
    pub id: String,
    pub title: String,
    /// 1 is highest.
    pub priority: u32,
    pub case_type: CaseType,
    pub preconditions: String,
    pub steps: Vec<TestStep>,
    /// Place ids this case visits, root included.
    pub covered_places: Vec<String>,
}

/// Derive one test case per flow. The first flow is the smoke path and gets
/// top priority; an empty flow becomes a root-renders check with no steps.
pub fn derive_test_cases(graph: &GraphExport, flows: &[Flow]) -> Vec<TestCase> {
    let root_address = graph
        .root()
        .map(|p| p.display_address.clone())
        .unwrap_or_default();

    flows
        .iter()
        .enumerate()
        .map(|(idx, flow)| {
            let id = format!("TC-{:03}", idx + 1);
            let (priority, case_type) = if idx == 0 {
                (1, CaseType::Smoke)
            } else {
                (2, CaseType::Functional)
            };

            let title = match flow.steps.last() {
                Some(last) => format!("Navigate from {} to {}", root_address, last.to_address),
                None => format!("{} renders and is reachable", root_address),
            };

            let mut covered_places = Vec::new();
            if let Some(root) = graph.root() {
                covered_places.push(root.id.clone());
            }
            let steps = flow
                .steps
                .iter()
                .enumerate()
                .map(|(step_idx, step)| {
                    covered_places.push(step.to_id.clone());
                    TestStep {
                        index: step_idx + 1,
                        action: step.trigger_description.clone(),
                        expected: if step.actual_observation.is_empty() {
                            step.expected_observation.clone()
                        } else {
                            step.actual_observation.clone()
                        },
                        screenshots: step.evidence.clone(),
                    }
                })
                .collect();

            TestCase {
                id,
                title,
                priority,
                case_type,
                preconditions: format!("Application is reachable at {}", root_address),
                steps,
                covered_places,
            }
        })
        .collect()
}

pub fn generate_markdown_report(graph: &GraphExport, cases: &[TestCase]) -> String {
    let mut report = String::new();

    report.push_str("# QA Test Report\n\n");
    report.push_str(&format!(
        "Generated: {}\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(root) = graph.root() {
        report.push_str(&format!("Root: {}\n\n", root.display_address));
    }
    report.push_str(&format!(
        "Places explored: {} | Transitions recorded: {} | Test cases: {}\n\n",
        graph.nodes.len(),
        graph.edges.len(),
        cases.len()
    ));

    for case in cases {
        report.push_str(&format!("## {}: {}\n\n", case.id, case.title));
        report.push_str(&format!(
            "Priority: P{} | Type: {}\n\n",
            case.priority,
            case.case_type.as_str()
        ));
        report.push_str(&format!("Preconditions: {}\n\n", case.preconditions));

        if case.steps.is_empty() {
            report.push_str("No navigation steps: verify the root view renders.\n\n");
            continue;
        }

        report.push_str("| Step | Action | Expected Result | Screenshot |\n");
        report.push_str("|------|--------|-----------------|------------|\n");
        for step in &case.steps {
            report.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                step.index,
                escape_cell(&step.action),
                escape_cell(&step.expected),
                step.screenshots.join(", ")
            ));
        }
        report.push('\n');
    }

    report.push_str(&generate_coverage_matrix(graph, cases));
    report
}

/// Which places each case touches, and which places no case reaches.
fn generate_coverage_matrix(graph: &GraphExport, cases: &[TestCase]) -> String {
    let mut coverage: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for case in cases {
        for place_id in &case.covered_places {
            let ids = coverage.entry(place_id.as_str()).or_default();
            if !ids.contains(&case.id.as_str()) {
                ids.push(&case.id);
            }
        }
    }

    let mut section = String::new();
    section.push_str("## Coverage\n\n");
    section.push_str("| Place | Address | Covered by |\n");
    section.push_str("|-------|---------|------------|\n");
    for place in &graph.nodes {
        let covered = coverage
            .get(place.id.as_str())
            .map(|ids| ids.join(", "))
            .unwrap_or_else(|| "none".to_string());
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            place.id,
            escape_cell(&place.display_address),
            covered
        ));
    }
    section
}

/// Test-management import document: cases with separated steps, screenshot
/// names as step attachments.
pub fn generate_management_export(
    graph: &GraphExport,
    cases: &[TestCase],
) -> Result<String, serde_json::Error> {
    let suite_name = graph
        .root()
        .map(|p| format!("Exploration of {}", p.display_address))
        .unwrap_or_else(|| "Exploration".to_string());

    let export = serde_json::json!({
        "suite": {
            "name": suite_name,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "places": graph.nodes.len(),
            "transitions": graph.edges.len(),
        },
        "cases": cases.iter().map(|case| {
            serde_json::json!({
                "title": format!("{}: {}", case.id, case.title),
                "priority_id": case.priority,
                "type_id": case.case_type.type_id(),
                "custom_preconds": case.preconditions,
                "custom_steps_separated": case.steps.iter().map(|step| {
                    serde_json::json!({
                        "content": step.action,
                        "expected": step.expected,
                        "attachments": step.screenshots,
                    })
                }).collect::<Vec<_>>(),
            })
        }).collect::<Vec<_>>(),
    });

    serde_json::to_string_pretty(&export)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
