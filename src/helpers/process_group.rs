use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, Uid};

use crate::prelude::*;

/// SIGKILL the whole process group led by `pid`, grandchildren included.
///
/// The process must have been spawned as the leader of its own group.
pub fn kill_process_group(pid: u32, log_target: &str) {
    signal_process_group(pid, Signal::SIGKILL, log_target);
}

/// SIGINT the process group led by `pid`, asking tools to print their results and exit.
pub fn interrupt_process_group(pid: u32, log_target: &str) {
    signal_process_group(pid, Signal::SIGINT, log_target);
}

fn signal_process_group(pid: u32, signal: Signal, log_target: &str) {
    let Ok(raw_pid) = i32::try_from(pid) else {
        return;
    };
    if raw_pid <= 0 {
        return;
    }

    if let Err(e) = killpg(Pid::from_raw(raw_pid), signal) {
        debug!(target: log_target, "Failed to send {signal} to process group {raw_pid}: {e}");
    }
}

pub fn is_root_user() -> bool {
    Uid::effective().is_root()
}
