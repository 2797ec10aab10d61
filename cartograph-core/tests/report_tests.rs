// Tests for test-case derivation and report rendering

use cartograph_core::flow::extract_flows;
use cartograph_core::model::{Action, ActionType, GraphExport, Place};
use cartograph_core::report::{
    CaseType, derive_test_cases, generate_management_export, generate_markdown_report,
};

fn place(id: &str, address: &str) -> Place {
    Place {
        id: id.to_string(),
        display_address: address.to_string(),
        address: address.to_string(),
        depth: 0,
        discovered_at: 0,
        content_fingerprint: format!("fp_{id}"),
        classification: String::new(),
        observations: Vec::new(),
        available_actions: Vec::new(),
        inventory_snapshot: None,
        evidence: Vec::new(),
    }
}

fn action(from: &str, to: &str, seq: u64) -> Action {
    Action {
        id: format!("{from} -> {to} @{seq}"),
        from_id: from.to_string(),
        to_id: to.to_string(),
        action_type: ActionType::FullNavigation,
        trigger_description: "clicked 'Shop'".to_string(),
        expected_observation: "the catalog renders".to_string(),
        actual_observation: "arrived at https://site/shop".to_string(),
        sequence_number: seq,
    }
}

fn sample_graph() -> GraphExport {
    let mut shop = place("place_b", "https://site/shop");
    shop.evidence = vec!["step_002_shop".to_string()];
    GraphExport {
        nodes: vec![
            place("place_a", "https://site/"),
            shop,
            place("place_c", "https://site/about"),
        ],
        edges: vec![
            action("place_a", "place_b", 1),
            action("place_a", "place_c", 3),
        ],
    }
}

#[test]
fn test_case_ids_and_priorities() {
    let graph = sample_graph();
    let flows = extract_flows(&graph);
    let cases = derive_test_cases(&graph, &flows);

    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].id, "TC-001");
    assert_eq!(cases[0].priority, 1);
    assert_eq!(cases[0].case_type, CaseType::Smoke);
    assert_eq!(cases[1].id, "TC-002");
    assert_eq!(cases[1].priority, 2);
    assert_eq!(cases[1].case_type, CaseType::Functional);
}

#[test]
fn test_empty_flow_becomes_root_renders_case() {
    let graph = GraphExport {
        nodes: vec![place("place_a", "https://site/")],
        edges: Vec::new(),
    };
    let flows = extract_flows(&graph);
    let cases = derive_test_cases(&graph, &flows);

    assert_eq!(cases.len(), 1);
    assert!(cases[0].steps.is_empty());
    assert!(cases[0].title.contains("renders"));
    assert_eq!(cases[0].covered_places, vec!["place_a"]);
}

#[test]
fn test_steps_carry_actions_and_screenshots() {
    let graph = sample_graph();
    let flows = extract_flows(&graph);
    let cases = derive_test_cases(&graph, &flows);

    let step = &cases[0].steps[0];
    assert_eq!(step.index, 1);
    assert_eq!(step.action, "clicked 'Shop'");
    assert_eq!(step.expected, "arrived at https://site/shop");
    assert_eq!(step.screenshots, vec!["step_002_shop"]);
}

#[test]
fn test_markdown_report_contains_cases_and_coverage() {
    let graph = sample_graph();
    let flows = extract_flows(&graph);
    let cases = derive_test_cases(&graph, &flows);
    let report = generate_markdown_report(&graph, &cases);

    assert!(report.contains("# QA Test Report"));
    assert!(report.contains("## TC-001"));
    assert!(report.contains("| Step | Action | Expected Result | Screenshot |"));
    assert!(report.contains("## Coverage"));
    assert!(report.contains("place_b"));
}

#[test]
fn test_management_export_shape() {
    let graph = sample_graph();
    let flows = extract_flows(&graph);
    let cases = derive_test_cases(&graph, &flows);
    let json = generate_management_export(&graph, &cases).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["suite"]["places"], 3);
    let exported_cases = parsed["cases"].as_array().unwrap();
    assert_eq!(exported_cases.len(), 2);
    assert_eq!(exported_cases[0]["priority_id"], 1);
    assert_eq!(exported_cases[0]["type_id"], 1);
    let steps = exported_cases[0]["custom_steps_separated"].as_array().unwrap();
    assert_eq!(steps[0]["content"], "clicked 'Shop'");
    assert_eq!(steps[0]["attachments"][0], "step_002_shop");
}
