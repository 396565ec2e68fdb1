//! Kernel telemetry sampled alongside a single workload run.
//!
//! Every signal is sampled by an external tracing tool launched by `start()`, then watched by
//! one background task. The tasks own their backend process and their reading, and only take
//! the collector lock to hand the reading over once the backend is gone.

use std::mem;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::helpers::process_group::{interrupt_process_group, is_root_user, kill_process_group};
use crate::logger::TELEMETRY_TARGET;
use crate::prelude::*;

mod backend;
mod histogram;
mod lookup;
mod metrics;
mod stacks;
mod syscalls;

pub use backend::{
    BCC_TOOLS_DIR, Backend, BackendCommand, ProbeOutput, ProbeTool, SIGNAL_SAMPLERS, Signal,
    SignalSampler, ToolLocation, TracingScript,
};
pub use histogram::{Histogram, weighted_mean};
pub use lookup::ToolLookup;
pub use metrics::{AggregatedMetrics, Metrics, StackTrace, aggregate};

/// How long a backend asked to print its result may take before it is killed
const BACKEND_INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Brackets one workload run with telemetry sampling.
#[async_trait(?Send)]
pub trait TelemetrySource {
    /// Begin sampling. Must be called before the workload is launched.
    fn start(&self);

    /// Stop sampling once the workload has exited and return what was collected.
    async fn stop(&self) -> Metrics;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Attaching probes requires root
    NotPrivileged,
    NoBackend,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Available => write!(f, "available"),
            Availability::NotPrivileged => write!(f, "not running as root"),
            Availability::NoBackend => write!(f, "no tracing tool found"),
        }
    }
}

#[derive(Default)]
struct CollectorState {
    running: bool,
    accumulator: Metrics,
    samplers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

pub struct TelemetryCollector {
    availability: Availability,
    signal_samplers: &'static [SignalSampler],
    lookup: Arc<ToolLookup>,
    state: Arc<Mutex<CollectorState>>,
}

impl TelemetryCollector {
    /// Probe privilege and tools once, with the default sampler table and the current `PATH`.
    pub fn new() -> Self {
        Self::with_samplers(SIGNAL_SAMPLERS, ToolLookup::from_env(), is_root_user())
    }

    pub fn with_samplers(
        signal_samplers: &'static [SignalSampler],
        lookup: ToolLookup,
        privileged: bool,
    ) -> Self {
        let availability = if !privileged {
            Availability::NotPrivileged
        } else if signal_samplers
            .iter()
            .any(|sampler| sampler.resolve(&lookup).is_some())
        {
            Availability::Available
        } else {
            Availability::NoBackend
        };

        TelemetryCollector {
            availability,
            signal_samplers,
            lookup: Arc::new(lookup),
            state: Arc::new(Mutex::new(CollectorState::default())),
        }
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    /// The backend each signal would use right now, `None` when nothing resolves.
    pub fn resolved_backends(&self) -> Vec<(Signal, Option<(&'static str, BackendCommand)>)> {
        self.signal_samplers
            .iter()
            .map(|sampler| {
                let resolved = sampler
                    .resolve(&self.lookup)
                    .map(|(backend, command)| (backend.name(), command));
                (sampler.signal, resolved)
            })
            .collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl TelemetrySource for TelemetryCollector {
    fn start(&self) {
        if !self.is_available() {
            return;
        }

        let mut state = self.lock_state();
        if state.running {
            return;
        }

        let cancel = CancellationToken::new();
        state.running = true;
        state.accumulator = Metrics::default();
        state.cancel = cancel.clone();
        // Backends are launched here, before the caller spawns the workload
        state.samplers = self
            .signal_samplers
            .iter()
            .filter_map(|sampler| {
                let Some((backend, command)) = sampler.resolve(&self.lookup) else {
                    debug!(target: TELEMETRY_TARGET, "No backend for {}, skipping", sampler.signal);
                    return None;
                };
                let child = spawn_backend(&command)?;
                Some(tokio::spawn(sample(
                    sampler.signal,
                    backend,
                    command,
                    child,
                    Arc::clone(&self.state),
                    cancel.clone(),
                )))
            })
            .collect();
    }

    async fn stop(&self) -> Metrics {
        let (samplers, cancel) = {
            let mut state = self.lock_state();
            if !state.running {
                return Metrics::default();
            }
            state.running = false;
            (mem::take(&mut state.samplers), state.cancel.clone())
        };

        cancel.cancel();
        for sampler in samplers {
            if let Err(e) = sampler.await {
                debug!(target: TELEMETRY_TARGET, "Telemetry sampler failed: {e}");
            }
        }

        mem::take(&mut self.lock_state().accumulator)
    }
}

fn spawn_backend(command: &BackendCommand) -> Option<Child> {
    match Command::new(&command.program)
        .args(&command.args)
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => Some(child),
        Err(e) => {
            debug!(target: TELEMETRY_TARGET, "Failed to start `{command}`: {e}");
            None
        }
    }
}

/// Wait for a running backend to exit or sampling to be cancelled, then hand its reading to
/// the collector.
async fn sample(
    signal: Signal,
    backend: &'static dyn Backend,
    command: BackendCommand,
    child: Child,
    state: Arc<Mutex<CollectorState>>,
    cancel: CancellationToken,
) {
    let output =
        collect_backend_output(&command, child, backend.interrupt_on_stop(), &cancel).await;

    let reading = backend.parse(&String::from_utf8_lossy(&output));
    debug!(
        target: TELEMETRY_TARGET,
        "{signal} sampled by {}: {} bytes of output", backend.name(), output.len()
    );

    state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .accumulator
        .merge(reading);
}

/// Standard output of the backend until it exits or is killed on cancellation.
async fn collect_backend_output(
    command: &BackendCommand,
    mut child: Child,
    interrupt_on_stop: bool,
    cancel: &CancellationToken,
) -> Vec<u8> {
    let pid = child.id().unwrap_or_default();

    let stdout = child.stdout.take();
    let reader = async move {
        let mut output = Vec::new();
        if let Some(mut stdout) = stdout {
            if let Err(e) = stdout.read_to_end(&mut output).await {
                debug!(target: TELEMETRY_TARGET, "Failed to read backend output: {e}");
            }
        }
        output
    };

    let wait = async {
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => debug!(target: TELEMETRY_TARGET, "`{command}` exited on its own: {status}"),
                Err(e) => debug!(target: TELEMETRY_TARGET, "Failed to wait for `{command}`: {e}"),
            },
            _ = cancel.cancelled() => {
                if interrupt_on_stop {
                    interrupt_process_group(pid, TELEMETRY_TARGET);
                    if tokio::time::timeout(BACKEND_INTERRUPT_GRACE, child.wait()).await.is_err() {
                        debug!(target: TELEMETRY_TARGET, "`{command}` ignored the interrupt");
                    }
                }
            }
        }

        // Anything left in the group would keep the output pipe open
        kill_process_group(pid, TELEMETRY_TARGET);
        if let Err(e) = child.wait().await {
            debug!(target: TELEMETRY_TARGET, "Failed to reap `{command}`: {e}");
        }
    };

    let (output, ()) = tokio::join!(reader, wait);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    static FAKE_RUNQUEUE_TOOL: ProbeTool = ProbeTool {
        tool: "fake-runqlat",
        args: &[],
        location: ToolLocation::SearchPath,
        output: ProbeOutput::RunqueueHistogram,
    };
    static FAKE_SYSCALL_TOOL: ProbeTool = ProbeTool {
        tool: "fake-syscount",
        args: &[],
        location: ToolLocation::SearchPath,
        output: ProbeOutput::SyscallTable,
    };
    static MISSING_TOOL: ProbeTool = ProbeTool {
        tool: "fake-biolatency",
        args: &[],
        location: ToolLocation::SearchPath,
        output: ProbeOutput::BlockIoHistogram,
    };

    static FAKE_SAMPLERS: &[SignalSampler] = &[
        SignalSampler {
            signal: Signal::Runqueue,
            backends: &[&FAKE_RUNQUEUE_TOOL],
        },
        SignalSampler {
            signal: Signal::Syscalls,
            backends: &[&FAKE_SYSCALL_TOOL],
        },
        SignalSampler {
            signal: Signal::BlockIo,
            backends: &[&MISSING_TOOL],
        },
    ];

    static MARKER_TOOL: ProbeTool = ProbeTool {
        tool: "marker-runqlat",
        args: &[],
        location: ToolLocation::SearchPath,
        output: ProbeOutput::RunqueueHistogram,
    };
    static MARKER_SAMPLERS: &[SignalSampler] = &[SignalSampler {
        signal: Signal::Runqueue,
        backends: &[&MARKER_TOOL],
    }];

    static FAKE_OFF_CPU_TOOL: ProbeTool = ProbeTool {
        tool: "fake-offcputime",
        args: &[],
        location: ToolLocation::SearchPath,
        output: ProbeOutput::FoldedStacks,
    };
    static OFF_CPU_SAMPLERS: &[SignalSampler] = &[SignalSampler {
        signal: Signal::OffCpu,
        backends: &[&FAKE_OFF_CPU_TOOL],
    }];

    /// Poll for `path` with blocking sleeps only, so no spawned task gets to run meanwhile.
    fn wait_for_file(path: &std::path::Path) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !path.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        path.exists()
    }

    /// Fake tools print one interval, then hang like the real ones until they are killed.
    fn fake_tools() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        lookup::tests::install_fake_tool(
            dir.path(),
            "fake-runqlat",
            "echo '     usecs : count'\necho '  0 -> 1 : 4'\necho '  2 -> 3 : 4'\nsleep 30",
        );
        lookup::tests::install_fake_tool(
            dir.path(),
            "fake-syscount",
            "echo 'SYSCALL COUNT TIME (us)'\necho 'read 10 20.0'\nsleep 30 &\nwait",
        );
        dir
    }

    fn collector(dir: &tempfile::TempDir, privileged: bool) -> TelemetryCollector {
        TelemetryCollector::with_samplers(
            FAKE_SAMPLERS,
            ToolLookup::new(vec![dir.path().to_path_buf()]),
            privileged,
        )
    }

    #[test]
    fn test_unprivileged_collector_is_unavailable() {
        let dir = fake_tools();
        assert_eq!(collector(&dir, false).availability(), Availability::NotPrivileged);
    }

    #[test]
    fn test_collector_without_tools_is_unavailable() {
        let empty = tempfile::tempdir().unwrap();
        let collector = TelemetryCollector::with_samplers(
            FAKE_SAMPLERS,
            ToolLookup::new(vec![empty.path().to_path_buf()]),
            true,
        );
        assert_eq!(collector.availability(), Availability::NoBackend);
    }

    #[test_log::test(tokio::test)]
    async fn test_unavailable_collector_never_runs() {
        let dir = fake_tools();
        let collector = collector(&dir, false);

        collector.start();
        assert!(!collector.is_running());
        assert_eq!(collector.stop().await, Metrics::default());
    }

    #[test_log::test(tokio::test)]
    async fn test_stop_when_idle_returns_empty_metrics() {
        let dir = fake_tools();
        let collector = collector(&dir, true);
        assert!(collector.is_available());
        assert!(collector.stop().await.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_start_sample_stop() {
        let dir = fake_tools();
        let collector = collector(&dir, true);

        collector.start();
        assert!(collector.is_running());
        // Starting twice is a no-op
        collector.start();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let stopped_at = Instant::now();
        let metrics = collector.stop().await;
        assert!(stopped_at.elapsed() < Duration::from_secs(10));
        assert!(!collector.is_running());

        assert_eq!(metrics.runqueue_latency_us, Some(1.5));
        assert_eq!(metrics.runqlat_histogram.unwrap().len(), 2);
        assert_eq!(metrics.top_syscalls.unwrap()["read"], 10);
        assert_eq!(metrics.syscall_latency_us.unwrap()["read"], 2.0);
        // Unresolvable signals stay absent
        assert_eq!(metrics.io_latency_us, None);
        assert_eq!(metrics.offcpu_time_ms, None);
    }

    #[test_log::test(tokio::test)]
    async fn test_backends_are_running_when_start_returns() {
        let dir = tempfile::tempdir().unwrap();
        lookup::tests::install_fake_tool(
            dir.path(),
            "marker-runqlat",
            "touch \"$(dirname \"$0\")/started\"\nsleep 30",
        );
        let collector = TelemetryCollector::with_samplers(
            MARKER_SAMPLERS,
            ToolLookup::new(vec![dir.path().to_path_buf()]),
            true,
        );

        collector.start();

        assert!(wait_for_file(&dir.path().join("started")));
        collector.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_off_cpu_backend_prints_when_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        lookup::tests::install_fake_tool(
            dir.path(),
            "fake-offcputime",
            "trap 'echo \"main;work 3000\"; exit 0' INT\ntouch \"$(dirname \"$0\")/started\"\nsleep 30 &\nwait",
        );
        let collector = TelemetryCollector::with_samplers(
            OFF_CPU_SAMPLERS,
            ToolLookup::new(vec![dir.path().to_path_buf()]),
            true,
        );

        collector.start();
        assert!(wait_for_file(&dir.path().join("started")));

        let stopped_at = Instant::now();
        let metrics = collector.stop().await;

        assert!(stopped_at.elapsed() < BACKEND_INTERRUPT_GRACE);
        assert_eq!(metrics.offcpu_time_ms, Some(3.0));
        assert_eq!(metrics.offcpu_top_stacks.unwrap()[0].stack, "main;work");
    }

    #[test_log::test(tokio::test)]
    async fn test_each_run_gets_a_fresh_accumulator() {
        let dir = fake_tools();
        let collector = collector(&dir, true);

        for _ in 0..2 {
            collector.start();
            tokio::time::sleep(Duration::from_millis(300)).await;
            let metrics = collector.stop().await;
            assert_eq!(metrics.top_syscalls.unwrap()["read"], 10);
        }
    }

    #[test]
    fn test_resolved_backends_lists_every_signal() {
        let dir = fake_tools();
        let resolved = collector(&dir, false).resolved_backends();

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].0, Signal::Runqueue);
        assert!(resolved[0].1.is_some());
        assert_eq!(resolved[2].0, Signal::BlockIo);
        assert!(resolved[2].1.is_none());
    }
}
