use crate::inventory::ChangeReport;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_SLUG_LEN: usize = 60;

/// Decides when a screenshot is worth keeping and assigns deterministic,
/// human-readable artifact names (`step_003_after_click_Sign_In`). The
/// counter is run-scoped, so repeated runs over an unchanged target produce
/// diffable evidence sets.
#[derive(Debug)]
pub struct EvidenceManager {
    step_counter: u32,
    out_dir: Option<PathBuf>,
}

impl EvidenceManager {
    pub fn new(out_dir: Option<PathBuf>) -> Self {
        Self {
            step_counter: 0,
            out_dir,
        }
    }

    /// Unconditional capture, used immediately before/after an action runs.
    pub fn capture(&mut self, label: &str) -> String {
        self.step_counter += 1;
        format!("step_{:03}_{}", self.step_counter, slugify(label))
    }

    /// Capture gated on the inventory diff: first visits and significant
    /// revisits produce an artifact, perceptually redundant revisits are
    /// skipped.
    pub fn maybe_capture(&mut self, label: &str, report: &ChangeReport) -> Option<String> {
        if report.first_visit || report.significant {
            Some(self.capture(label))
        } else {
            debug!(label, "skipping redundant capture: {}", report.summarize());
            None
        }
    }

    /// Persist screenshot bytes under the artifact name, when an output
    /// directory is configured.
    pub fn store(&self, artifact_name: &str, bytes: &[u8]) -> io::Result<Option<PathBuf>> {
        let Some(dir) = &self.out_dir else {
            return Ok(None);
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{artifact_name}.png"));
        fs::write(&path, bytes)?;
        Ok(Some(path))
    }

    pub fn out_dir(&self) -> Option<&Path> {
        self.out_dir.as_deref()
    }

    pub fn captures_taken(&self) -> u32 {
        self.step_counter
    }
}

fn slugify(label: &str) -> String {
    let mut slug: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    while slug.contains("__") {
        slug = slug.replace("__", "_");
    }
    let slug = slug.trim_matches('_');
    let truncated: String = slug.chars().take(MAX_SLUG_LEN).collect();
    if truncated.is_empty() {
        "capture".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ChangeReport;

    fn insignificant() -> ChangeReport {
        ChangeReport {
            first_visit: false,
            changes: Vec::new(),
            significant: false,
        }
    }

    #[test]
    fn names_are_sequential_and_slugged() {
        let mut evidence = EvidenceManager::new(None);
        assert_eq!(evidence.capture("homepage"), "step_001_homepage");
        assert_eq!(
            evidence.capture("after click Sign In!"),
            "step_002_after_click_Sign_In"
        );
    }

    #[test]
    fn redundant_revisit_is_skipped() {
        let mut evidence = EvidenceManager::new(None);
        let first = ChangeReport {
            first_visit: true,
            changes: Vec::new(),
            significant: true,
        };
        assert!(evidence.maybe_capture("cart", &first).is_some());
        assert!(evidence.maybe_capture("cart", &insignificant()).is_none());
        // Skipped captures do not consume a step number.
        assert_eq!(evidence.capture("next"), "step_002_next");
    }

    #[test]
    fn stores_bytes_under_artifact_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut evidence = EvidenceManager::new(Some(dir.path().to_path_buf()));
        let name = evidence.capture("homepage");
        let path = evidence.store(&name, b"png-bytes").unwrap().unwrap();
        assert!(path.ends_with("step_001_homepage.png"));
        assert_eq!(std::fs::read(path).unwrap(), b"png-bytes");
    }

    #[test]
    fn empty_screenshot_bytes_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut evidence = EvidenceManager::new(Some(dir.path().to_path_buf()));
        let name = evidence.capture("blank");
        assert!(evidence.store(&name, b"").unwrap().is_none());
    }
}
