use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::helpers::process_group::kill_process_group;
use crate::logger::EXECUTOR_TARGET;
use crate::measurement_mode::MeasurementMode;
use crate::prelude::*;

mod output;
mod run_result;

pub use output::{parse_throughput, tail};
pub use run_result::{RunResult, TIMEOUT_ERROR, successful_durations};

pub const STDOUT_TAIL_BYTES: usize = 1000;
pub const STDERR_TAIL_BYTES: usize = 500;
/// How long output may keep flowing once the workload has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Runs one workload invocation and reports how it went.
///
/// An `Err` means the workload could not be launched at all. Anything that happens once the
/// process exists (failure, timeout) is recorded on the returned [`RunResult`].
#[async_trait(?Send)]
pub trait ScriptRunner {
    async fn run(&self, script: &str, mode: MeasurementMode) -> Result<RunResult>;
}

/// Runs workloads through `bash -c` under a hard timeout, then sleeps for the cooldown.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    timeout: Duration,
    cooldown: Duration,
    env_overrides: Vec<(String, String)>,
}

struct Exit {
    status: io::Result<ExitStatus>,
    timed_out: bool,
    ended_at: Instant,
}

impl ScriptExecutor {
    pub fn new(timeout: Duration, cooldown: Duration, env_overrides: Vec<(String, String)>) -> Self {
        ScriptExecutor {
            timeout,
            cooldown,
            env_overrides,
        }
    }

    fn build_command(&self, script: &str) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(script)
            .envs(self.env_overrides.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group, so a timeout can take the whole tree down
            .process_group(0)
            .kill_on_drop(true);
        cmd
    }

    async fn execute(&self, script: &str, mode: MeasurementMode) -> Result<RunResult> {
        debug!(target: EXECUTOR_TARGET, "Running `{script}` (timeout {:?})", self.timeout);

        let mut cmd = self.build_command(script);
        let start_time = Utc::now();
        let started_at = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to launch workload `{script}`"))?;
        let pid = child.id().unwrap_or_default();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut stdout_buffer = Vec::new();
        let mut stderr_buffer = Vec::new();

        let exit = {
            let reading = async {
                tokio::join!(
                    read_stream(stdout, &mut stdout_buffer),
                    read_stream(stderr, &mut stderr_buffer)
                )
            };
            let wait = async {
                match tokio::time::timeout(self.timeout, child.wait()).await {
                    Ok(status) => Exit {
                        status,
                        timed_out: false,
                        ended_at: Instant::now(),
                    },
                    Err(_) => {
                        kill_process_group(pid, EXECUTOR_TARGET);
                        let ended_at = Instant::now();
                        Exit {
                            status: child.wait().await,
                            timed_out: true,
                            ended_at,
                        }
                    }
                }
            };
            tokio::pin!(reading, wait);

            // Output is drained while waiting so a chatty workload never blocks on a full pipe
            let mut output_closed = false;
            let exit = loop {
                tokio::select! {
                    exit = &mut wait => break exit,
                    _ = &mut reading, if !output_closed => output_closed = true,
                }
            };

            if !output_closed {
                // Background jobs left in the group still hold the pipes open
                if !exit.timed_out {
                    kill_process_group(pid, EXECUTOR_TARGET);
                }
                if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reading)
                    .await
                    .is_err()
                {
                    debug!(
                        target: EXECUTOR_TARGET,
                        "Output of pid {pid} still open after exit, keeping what was read"
                    );
                }
            }
            exit
        };
        let (stdout, stderr) = (stdout_buffer, stderr_buffer);

        let duration_ms = exit.ended_at.duration_since(started_at).as_micros() as f64 / 1000.0;
        let end_time = start_time
            + chrono::Duration::from_std(exit.ended_at.duration_since(started_at))
                .unwrap_or_else(|_| chrono::Duration::zero());

        let (exit_code, error) = match (&exit.status, exit.timed_out) {
            (_, true) => (-1, Some(TIMEOUT_ERROR.to_string())),
            (Ok(status), false) => match status.code() {
                Some(0) => (0, None),
                Some(code) => (code, Some(format!("exit status {code}"))),
                None => (-1, Some(format!("terminated by signal: {status}"))),
            },
            (Err(e), false) => (-1, Some(format!("failed to wait for workload: {e}"))),
        };

        let stdout_text = String::from_utf8_lossy(&stdout);
        trace!(target: EXECUTOR_TARGET, "stdout of pid {pid}:\n{stdout_text}");
        trace!(
            target: EXECUTOR_TARGET,
            "stderr of pid {pid}:\n{}",
            String::from_utf8_lossy(&stderr)
        );

        let throughput = (mode == MeasurementMode::Throughput && !exit.timed_out)
            .then(|| parse_throughput(&stdout_text));

        Ok(RunResult {
            start_time,
            end_time,
            duration_ms,
            exit_code,
            stdout_tail: tail(&stdout, STDOUT_TAIL_BYTES),
            stderr_tail: tail(&stderr, STDERR_TAIL_BYTES),
            error,
            throughput,
            pid,
        })
    }
}

#[async_trait(?Send)]
impl ScriptRunner for ScriptExecutor {
    async fn run(&self, script: &str, mode: MeasurementMode) -> Result<RunResult> {
        let result = self.execute(script, mode).await;

        // Charged whatever the outcome, so the next run starts from a settled system
        if !self.cooldown.is_zero() {
            tokio::time::sleep(self.cooldown).await;
        }

        result
    }
}

/// Append everything the stream yields to `buffer`. Data read before a cancellation is kept.
async fn read_stream(stream: Option<impl AsyncRead + Unpin>, buffer: &mut Vec<u8>) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
            Err(e) => {
                debug!(target: EXECUTOR_TARGET, "Failed to read workload output: {e}");
                break;
            }
        }
    }
}
