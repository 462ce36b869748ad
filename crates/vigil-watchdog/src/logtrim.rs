//! Log file size control.
//!
//! Log writes are append-only; when the file grows past the configured line
//! cap, the tail (half the cap) is written to a temp file and renamed over
//! the original atomically.

use std::path::Path;

/// Trim `path` to its last `max_lines / 2` lines once it exceeds
/// `max_lines`. Returns whether a trim happened.
pub fn trim_log(path: &Path, max_lines: usize) -> std::io::Result<bool> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= max_lines {
        return Ok(false);
    }

    let keep = (max_lines / 2).max(1);
    let tail = &lines[lines.len() - keep..];
    let tmp = path.with_extension("log.tmp");
    std::fs::write(&tmp, tail.join("\n") + "\n")?;
    std::fs::rename(&tmp, path)?;
    tracing::info!(
        dropped = lines.len() - keep,
        kept = keep,
        "trimmed supervisor log"
    );
    Ok(true)
}
