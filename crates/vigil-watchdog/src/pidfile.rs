//! Single-instance marker.
//!
//! At most one watchdog may supervise a host. The marker is a small file
//! holding the owner's decimal pid: claimed at startup, verified against
//! the process table before honoring it, and released on graceful exit.

use std::io::ErrorKind;
use std::path::Path;

use nix::unistd::Pid;

use vigil_types::VigilError;

use crate::fsutil::write_atomic;

/// Claim the instance marker for this process. Returns the pid recorded.
pub fn write(path: &Path) -> Result<u32, VigilError> {
    let pid = std::process::id();
    write_atomic(path, &format!("{pid}\n")).map_err(VigilError::StateError)?;
    tracing::debug!(pid, marker = %path.display(), "instance marker claimed");
    Ok(pid)
}

/// Pid recorded in the marker, if it exists and holds a number.
pub fn read(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| text.trim().parse().ok())
}

/// Release the marker. An already-absent file is not worth reporting.
pub fn remove(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(marker = %path.display(), error = %e, "could not release instance marker"),
    }
}

/// Whether a process with this pid currently exists.
pub fn is_process_alive(pid: u32) -> bool {
    // Signal 0 probes for existence without delivering anything. A pid too
    // large for i32 cannot name a process on this host, and a negative cast
    // would address a whole process group, so both count as dead.
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => nix::sys::signal::kill(Pid::from_raw(raw), None).is_ok(),
        _ => false,
    }
}

/// Pid of a live watchdog recorded at `path`, with stale markers cleaned up.
pub fn live_pid(path: &Path) -> Option<u32> {
    let pid = read(path)?;
    if is_process_alive(pid) {
        return Some(pid);
    }
    tracing::warn!(pid, "instance marker is stale, discarding it");
    remove(path);
    None
}
