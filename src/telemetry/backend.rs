use std::fmt;
use std::path::{Path, PathBuf};

use super::histogram::{
    Histogram, parse_arrow_histogram, parse_bracket_histogram, total_count, weighted_mean,
};
use super::lookup::{ToolLookup, is_executable};
use super::metrics::Metrics;
use super::stacks::parse_folded_stacks;
use super::syscalls::parse_syscall_table;

/// Where distributions install the compiled probe tools when they are not on the path.
pub const BCC_TOOLS_DIR: &str = "/usr/share/bcc/tools";

/// Runqueue latency histogram for the tracing engine, printed and reset every second.
const RUNQUEUE_TRACING_SCRIPT: &str = r#"
tracepoint:sched:sched_wakeup,tracepoint:sched:sched_wakeup_new { @qtime[args->pid] = nsecs; }
tracepoint:sched:sched_switch {
    if (@qtime[args->next_pid]) {
        @usecs = hist((nsecs - @qtime[args->next_pid]) / 1000);
        delete(@qtime[args->next_pid]);
    }
}
interval:s:1 { print(@usecs); clear(@usecs); }
"#;

/// A runnable backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for BackendCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '<script>'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// An external tracing tool able to sample one signal.
pub trait Backend: Sync {
    fn name(&self) -> &'static str;

    /// The command to run, or `None` when the tool cannot be found.
    fn resolve(&self, lookup: &ToolLookup) -> Option<BackendCommand>;

    /// Turn the tool's complete standard output into the fields of its signal.
    fn parse(&self, output: &str) -> Metrics;

    /// Whether the tool only prints its result once interrupted, and must get SIGINT before
    /// being killed at the end of sampling.
    fn interrupt_on_stop(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ToolLocation {
    SearchPath,
    Directory(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub enum ProbeOutput {
    RunqueueHistogram,
    BlockIoHistogram,
    FoldedStacks,
    SyscallTable,
}

/// A compiled probe tool from the BCC toolset.
#[derive(Debug)]
pub struct ProbeTool {
    pub tool: &'static str,
    pub args: &'static [&'static str],
    pub location: ToolLocation,
    pub output: ProbeOutput,
}

/// A script run by a generic tracing engine, reporting runqueue latency.
#[derive(Debug)]
pub struct TracingScript {
    pub engine: &'static str,
    pub script: &'static str,
}

fn runqueue_reading(histogram: Histogram) -> Metrics {
    if total_count(&histogram) == 0 {
        return Metrics::default();
    }
    Metrics {
        runqueue_latency_us: Some(weighted_mean(&histogram)),
        runqlat_histogram: Some(histogram),
        ..Default::default()
    }
}

fn block_io_reading(histogram: Histogram) -> Metrics {
    if total_count(&histogram) == 0 {
        return Metrics::default();
    }
    Metrics {
        io_latency_us: Some(weighted_mean(&histogram)),
        biolat_histogram: Some(histogram),
        ..Default::default()
    }
}

impl Backend for ProbeTool {
    fn name(&self) -> &'static str {
        self.tool
    }

    fn resolve(&self, lookup: &ToolLookup) -> Option<BackendCommand> {
        let program = match self.location {
            ToolLocation::SearchPath => lookup.find(self.tool)?,
            ToolLocation::Directory(dir) => {
                let candidate = Path::new(dir).join(self.tool);
                is_executable(&candidate).then_some(candidate)?
            }
        };
        Some(BackendCommand {
            program,
            args: self.args.iter().map(|arg| arg.to_string()).collect(),
        })
    }

    fn parse(&self, output: &str) -> Metrics {
        match self.output {
            ProbeOutput::RunqueueHistogram => runqueue_reading(parse_arrow_histogram(output)),
            ProbeOutput::BlockIoHistogram => block_io_reading(parse_arrow_histogram(output)),
            ProbeOutput::FoldedStacks => parse_folded_stacks(output),
            ProbeOutput::SyscallTable => parse_syscall_table(output),
        }
    }

    fn interrupt_on_stop(&self) -> bool {
        matches!(self.output, ProbeOutput::FoldedStacks)
    }
}

impl Backend for TracingScript {
    fn name(&self) -> &'static str {
        self.engine
    }

    fn resolve(&self, lookup: &ToolLookup) -> Option<BackendCommand> {
        Some(BackendCommand {
            program: lookup.find(self.engine)?,
            args: vec!["-e".to_string(), self.script.to_string()],
        })
    }

    fn parse(&self, output: &str) -> Metrics {
        runqueue_reading(parse_bracket_histogram(output))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Runqueue,
    BlockIo,
    OffCpu,
    Syscalls,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Runqueue => write!(f, "runqueue latency"),
            Signal::BlockIo => write!(f, "block I/O latency"),
            Signal::OffCpu => write!(f, "off-CPU time"),
            Signal::Syscalls => write!(f, "syscalls"),
        }
    }
}

/// The backends able to sample one signal, by decreasing priority.
pub struct SignalSampler {
    pub signal: Signal,
    pub backends: &'static [&'static dyn Backend],
}

impl SignalSampler {
    /// First backend of the list that resolves.
    pub fn resolve(&self, lookup: &ToolLookup) -> Option<(&'static dyn Backend, BackendCommand)> {
        self.backends
            .iter()
            .find_map(|backend| Some((*backend, backend.resolve(lookup)?)))
    }
}

const fn probe(
    tool: &'static str,
    args: &'static [&'static str],
    location: ToolLocation,
    output: ProbeOutput,
) -> ProbeTool {
    ProbeTool {
        tool,
        args,
        location,
        output,
    }
}

pub static SIGNAL_SAMPLERS: &[SignalSampler] = &[
    SignalSampler {
        signal: Signal::Runqueue,
        backends: &[
            &probe("runqlat", &["1"], ToolLocation::SearchPath, ProbeOutput::RunqueueHistogram),
            &probe(
                "runqlat",
                &["1"],
                ToolLocation::Directory(BCC_TOOLS_DIR),
                ProbeOutput::RunqueueHistogram,
            ),
            &TracingScript {
                engine: "bpftrace",
                script: RUNQUEUE_TRACING_SCRIPT,
            },
        ],
    },
    SignalSampler {
        signal: Signal::BlockIo,
        backends: &[
            &probe("biolatency", &["1"], ToolLocation::SearchPath, ProbeOutput::BlockIoHistogram),
            &probe(
                "biolatency",
                &["1"],
                ToolLocation::Directory(BCC_TOOLS_DIR),
                ProbeOutput::BlockIoHistogram,
            ),
        ],
    },
    SignalSampler {
        signal: Signal::OffCpu,
        backends: &[
            &probe("offcputime", &["-f"], ToolLocation::SearchPath, ProbeOutput::FoldedStacks),
            &probe(
                "offcputime",
                &["-f"],
                ToolLocation::Directory(BCC_TOOLS_DIR),
                ProbeOutput::FoldedStacks,
            ),
        ],
    },
    SignalSampler {
        signal: Signal::Syscalls,
        backends: &[
            &probe(
                "syscount",
                &["-L", "-i", "1"],
                ToolLocation::SearchPath,
                ProbeOutput::SyscallTable,
            ),
            &probe(
                "syscount",
                &["-L", "-i", "1"],
                ToolLocation::Directory(BCC_TOOLS_DIR),
                ProbeOutput::SyscallTable,
            ),
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::lookup::tests::install_fake_tool;

    fn runqueue_sampler() -> &'static SignalSampler {
        &SIGNAL_SAMPLERS[0]
    }

    #[test]
    fn test_every_signal_has_a_sampler() {
        let signals: Vec<Signal> = SIGNAL_SAMPLERS.iter().map(|s| s.signal).collect();
        assert_eq!(
            signals,
            vec![Signal::Runqueue, Signal::BlockIo, Signal::OffCpu, Signal::Syscalls]
        );
    }

    #[test]
    fn test_probe_tool_on_path_wins_over_tracing_engine() {
        let dir = tempfile::tempdir().unwrap();
        install_fake_tool(dir.path(), "runqlat", "true");
        install_fake_tool(dir.path(), "bpftrace", "true");
        let lookup = ToolLookup::new(vec![dir.path().to_path_buf()]);

        let (backend, command) = runqueue_sampler().resolve(&lookup).unwrap();

        assert_eq!(backend.name(), "runqlat");
        assert_eq!(command.program, dir.path().join("runqlat"));
        assert_eq!(command.args, vec!["1"]);
    }

    #[test]
    fn test_tracing_engine_is_the_runqueue_fallback() {
        if Path::new(BCC_TOOLS_DIR).join("runqlat").exists() {
            // The install directory resolves before the tracing engine on this machine
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        install_fake_tool(dir.path(), "bpftrace", "true");
        let lookup = ToolLookup::new(vec![dir.path().to_path_buf()]);

        let (backend, command) = runqueue_sampler().resolve(&lookup).unwrap();

        assert_eq!(backend.name(), "bpftrace");
        assert_eq!(command.args[0], "-e");
        assert!(command.args[1].contains("hist("));
    }

    #[test]
    fn test_tracing_engine_does_not_sample_block_io() {
        if Path::new(BCC_TOOLS_DIR).join("biolatency").exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        install_fake_tool(dir.path(), "bpftrace", "true");
        let lookup = ToolLookup::new(vec![dir.path().to_path_buf()]);

        assert!(SIGNAL_SAMPLERS[1].resolve(&lookup).is_none());
    }

    #[test]
    fn test_install_directory_location() {
        let dir = tempfile::tempdir().unwrap();
        install_fake_tool(dir.path(), "biolatency", "true");
        let dir_path: &'static str = Box::leak(dir.path().to_string_lossy().into_owned().into_boxed_str());
        let tool = probe(
            "biolatency",
            &["1"],
            ToolLocation::Directory(dir_path),
            ProbeOutput::BlockIoHistogram,
        );

        let command = tool.resolve(&ToolLookup::default()).unwrap();

        assert_eq!(command.program, dir.path().join("biolatency"));
    }

    #[test]
    fn test_histogram_backends_fill_their_own_signal() {
        let output = "     usecs : count\n  0 -> 1 : 2\n  2 -> 3 : 2\n";
        let runqlat = probe("runqlat", &[], ToolLocation::SearchPath, ProbeOutput::RunqueueHistogram);
        let biolatency = probe("biolatency", &[], ToolLocation::SearchPath, ProbeOutput::BlockIoHistogram);

        let runqueue = runqlat.parse(output);
        assert_eq!(runqueue.runqueue_latency_us, Some(1.5));
        assert_eq!(runqueue.io_latency_us, None);

        let block_io = biolatency.parse(output);
        assert_eq!(block_io.io_latency_us, Some(1.5));
        assert_eq!(block_io.biolat_histogram.unwrap().len(), 2);
        assert_eq!(block_io.runqueue_latency_us, None);
    }

    #[test]
    fn test_empty_backend_output_leaves_signal_absent() {
        let runqlat = probe("runqlat", &[], ToolLocation::SearchPath, ProbeOutput::RunqueueHistogram);
        assert!(runqlat.parse("").is_empty());
        assert!(runqlat.parse("     usecs : count\n  0 -> 1 : 0\n").is_empty());
    }

    #[test]
    fn test_tracing_script_parses_bracket_histogram() {
        let backend = TracingScript {
            engine: "bpftrace",
            script: RUNQUEUE_TRACING_SCRIPT,
        };
        let metrics = backend.parse("@usecs:\n[2, 4)   4 |@@@@|\n[4, 8)   4 |@@@@|\n");
        assert_eq!(metrics.runqueue_latency_us, Some(4.5));
    }

    #[test]
    fn test_off_cpu_tool_traces_until_interrupted() {
        let off_cpu = &SIGNAL_SAMPLERS[2];
        assert_eq!(off_cpu.signal, Signal::OffCpu);

        for backend in off_cpu.backends {
            assert!(backend.interrupt_on_stop());
        }
        let dir = tempfile::tempdir().unwrap();
        install_fake_tool(dir.path(), "offcputime", "true");
        let (_, command) = off_cpu
            .resolve(&ToolLookup::new(vec![dir.path().to_path_buf()]))
            .unwrap();
        // A trailing number would be a total duration, not an interval
        assert_eq!(command.args, vec!["-f"]);

        assert!(!SIGNAL_SAMPLERS[0].backends[0].interrupt_on_stop());
    }

    #[test]
    fn test_command_display_hides_scripts() {
        let command = BackendCommand {
            program: PathBuf::from("/usr/bin/bpftrace"),
            args: vec!["-e".to_string(), RUNQUEUE_TRACING_SCRIPT.to_string()],
        };
        assert_eq!(command.to_string(), "/usr/bin/bpftrace -e '<script>'");
    }
}
