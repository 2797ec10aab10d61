//! Subprocess automation driver.
//!
//! The concrete automation surface (a browser or mobile-UI controller) runs
//! in its own process and speaks newline-delimited JSON over stdin/stdout.
//! The process boundary exists because typical automation libraries are not
//! safely multi-threaded; isolating them keeps that constraint out of this
//! core.

use crate::driver::{ActionDescriptor, BackOutcome, Driver, Observation, RawElement, VisibleContent};
use crate::error::{ExploreError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Navigate { address: &'a str },
    Perform { action: &'a ActionDescriptor },
    Observe,
    GoBack,
    Quit,
}

#[derive(Deserialize)]
struct WireObservation {
    #[serde(default)]
    address: String,
    #[serde(default)]
    content: VisibleContent,
    #[serde(default)]
    elements: Vec<RawElement>,
    #[serde(default)]
    screenshot_b64: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Response {
    Ok {
        #[serde(flatten)]
        observation: WireObservation,
    },
    NoBackAffordance,
    Error {
        kind: String,
        #[serde(default)]
        message: String,
    },
}

/// Driver implementation backed by a long-running helper process.
pub struct SubprocessDriver {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    call_timeout: Duration,
}

impl SubprocessDriver {
    /// Spawn the helper command and attach to its pipes.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        Self::spawn_with_timeout(program, args, DEFAULT_CALL_TIMEOUT)
    }

    pub fn spawn_with_timeout(
        program: &str,
        args: &[String],
        call_timeout: Duration,
    ) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExploreError::Protocol("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExploreError::Protocol("driver stdout unavailable".to_string()))?;

        debug!(program, "spawned automation driver process");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            call_timeout,
        })
    }

    async fn call(&mut self, request: Request<'_>) -> Result<Response> {
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let reply = timeout(self.call_timeout, self.stdout.next_line())
            .await
            .map_err(|_| ExploreError::Timeout(self.call_timeout))??;

        let Some(reply) = reply else {
            return Err(ExploreError::Crashed(
                "driver process closed its stdout".to_string(),
            ));
        };
        Ok(serde_json::from_str(&reply)?)
    }

    fn into_observation(&self, wire: WireObservation) -> Result<Observation> {
        let screenshot = match wire.screenshot_b64 {
            Some(encoded) => BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| ExploreError::Protocol(format!("bad screenshot payload: {e}")))?,
            None => Vec::new(),
        };
        Ok(Observation {
            address: wire.address,
            content: wire.content,
            elements: wire.elements,
            screenshot,
        })
    }

    fn expect_observation(&self, response: Response) -> Result<Observation> {
        match response {
            Response::Ok { observation } => self.into_observation(observation),
            Response::NoBackAffordance => Err(ExploreError::Protocol(
                "unexpected no_back_affordance reply".to_string(),
            )),
            Response::Error { kind, message } => {
                Err(map_failure(&kind, message, self.call_timeout))
            }
        }
    }
}

/// A remote `timeout` carries the configured call timeout, since the driver
/// observes the same deadline as this side of the pipe.
fn map_failure(kind: &str, message: String, call_timeout: Duration) -> ExploreError {
    match kind {
        "timeout" => ExploreError::Timeout(call_timeout),
        "element_not_found" => ExploreError::ElementNotFound(message),
        "crashed" => ExploreError::Crashed(message),
        other => ExploreError::Protocol(format!("{other}: {message}")),
    }
}

#[async_trait]
impl Driver for SubprocessDriver {
    async fn navigate(&mut self, address: &str) -> Result<Observation> {
        let response = self.call(Request::Navigate { address }).await?;
        self.expect_observation(response)
    }

    async fn perform(&mut self, action: &ActionDescriptor) -> Result<Observation> {
        let response = self.call(Request::Perform { action }).await?;
        self.expect_observation(response)
    }

    async fn observe(&mut self) -> Result<Observation> {
        let response = self.call(Request::Observe).await?;
        self.expect_observation(response)
    }

    async fn go_back(&mut self) -> Result<BackOutcome> {
        match self.call(Request::GoBack).await? {
            Response::Ok { observation } => {
                Ok(BackOutcome::Returned(self.into_observation(observation)?))
            }
            Response::NoBackAffordance => Ok(BackOutcome::NoBackAffordance),
            Response::Error { kind, message } => {
                Err(map_failure(&kind, message, self.call_timeout))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Best-effort polite shutdown; the child is killed on drop anyway.
        if let Err(e) = self.call(Request::Quit).await {
            warn!("driver did not acknowledge shutdown: {e}");
        }
        if let Err(e) = self.child.start_kill() {
            debug!("driver process already exited: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_serialize_with_op_tags() {
        let action = ActionDescriptor {
            kind: "link".to_string(),
            label: "Checkout".to_string(),
            locator: "#checkout".to_string(),
        };
        let json = serde_json::to_string(&Request::Perform { action: &action }).unwrap();
        assert!(json.contains("\"op\":\"perform\""));
        assert!(json.contains("\"locator\":\"#checkout\""));

        let json = serde_json::to_string(&Request::Navigate {
            address: "https://site/",
        })
        .unwrap();
        assert!(json.contains("\"op\":\"navigate\""));
    }

    #[test]
    fn ok_response_deserializes_into_observation_payload() {
        let raw = r##"{
            "status": "ok",
            "address": "https://site/cart",
            "content": {"title": "Cart", "headings": ["Your cart"], "primary_text": "1 item", "active_nav": "Cart"},
            "elements": [{"zone": "header", "kind": "link", "label": "Home", "locator": "#home"}]
        }"##;
        let response: Response = serde_json::from_str(raw).unwrap();
        let Response::Ok { observation } = response else {
            panic!("expected ok response");
        };
        assert_eq!(observation.address, "https://site/cart");
        assert_eq!(observation.elements.len(), 1);
        assert!(observation.elements[0].visible);
    }

    #[test]
    fn typed_failures_map_to_explore_errors() {
        let call_timeout = Duration::from_secs(12);
        assert!(matches!(
            map_failure("timeout", String::new(), call_timeout),
            ExploreError::Timeout(d) if d == call_timeout
        ));
        assert!(matches!(
            map_failure("element_not_found", "#gone".to_string(), call_timeout),
            ExploreError::ElementNotFound(_)
        ));
        assert!(matches!(
            map_failure("crashed", "boom".to_string(), call_timeout),
            ExploreError::Crashed(_)
        ));
    }

    #[test]
    fn no_back_affordance_round_trips() {
        let response: Response =
            serde_json::from_str(r#"{"status": "no_back_affordance"}"#).unwrap();
        assert!(matches!(response, Response::NoBackAffordance));
    }
}
