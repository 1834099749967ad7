use crate::{Error, Invocation, Result};
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Invokes the external simulation executable and extracts its result.
///
/// The contract with the executable: it receives `--key value` flags, may
/// print arbitrary diagnostics to stdout, and must emit the result as a
/// single JSON document on the last non-empty stdout line.
#[derive(Debug, Clone)]
pub struct SimRunner {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

/// A successful run: the parsed result document and how long it took.
#[derive(Debug, Clone)]
pub struct SimOutput {
    pub result: Value,
    pub elapsed: Duration,
}

impl SimRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Arguments placed before the invocation's `--key value` flags,
    /// e.g. the script path when `program` is an interpreter.
    pub fn base_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.base_args = args.into_iter().collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self, invocation: &Invocation) -> Result<SimOutput> {
        let started = Instant::now();
        let child = Command::new(&self.program)
            .args(&self.base_args)
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| Error::Spawn(error.to_string()))?;

        // Dropping the wait future on timeout drops the child, which kills
        // the process (kill_on_drop above).
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
            .map_err(|error| Error::Spawn(error.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                status = %output.status,
                "simulation failed: {}",
                stderr.trim_end()
            );
            return Err(Error::Simulation {
                stderr: stderr.trim_end().to_owned(),
            });
        }

        let result = parse_last_line(&stdout).ok_or_else(|| Error::MalformedOutput {
            stdout: stdout.to_string(),
        })?;

        Ok(SimOutput {
            result,
            elapsed: started.elapsed(),
        })
    }
}

/// Everything before the last non-empty line is diagnostic output.
fn parse_last_line(stdout: &str) -> Option<Value> {
    let line = stdout.lines().rev().find(|line| !line.trim().is_empty())?;
    serde_json::from_str(line.trim()).ok()
}
