// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-platform process termination.
//!
//! Unix gets a real SIGTERM for the graceful step. Windows has no
//! equivalent, and child processes do not inherit signal behaviour, so a
//! force kill there additionally issues a detached `taskkill /T` to take
//! the whole tree down.

#[cfg(unix)]
pub(crate) fn send_graceful(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
pub(crate) fn send_graceful(_pid: u32) {
    // No SIGTERM on this platform; the grace window still applies before
    // the force kill.
}

/// Issue the platform's tree kill after a force kill. Errors are ignored;
/// the direct child is already being killed through the handle.
#[cfg(windows)]
pub(crate) fn kill_tree(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn();
}

#[cfg(not(windows))]
pub(crate) fn kill_tree(_pid: u32) {}
