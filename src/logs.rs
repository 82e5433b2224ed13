use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Reads every line of `paths`, oldest source first. Missing files are
/// skipped; Steam only writes `content_log.previous.txt` after a rotation.
pub fn read_log_lines(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for path in paths {
        if !path.exists() {
            warn!(path = %path.display(), "content log not found; skipping");
            continue;
        }
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read content log {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        let before = lines.len();
        lines.extend(text.lines().map(str::to_string));
        debug!(path = %path.display(), lines = lines.len() - before, "read content log");
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn concatenates_sources_in_order_and_skips_missing() {
        let tmp = TempDir::new().expect("temp dir");
        let previous = tmp.path().join("content_log.previous.txt");
        let current = tmp.path().join("content_log.txt");
        fs::write(&previous, "first\r\nsecond\n").expect("write previous");
        fs::write(&current, b"third\n\xFFfourth").expect("write current");

        let lines = read_log_lines(&[
            tmp.path().join("missing.txt"),
            previous,
            current,
        ])
        .expect("read logs");

        assert_eq!(lines, vec!["first", "second", "third", "\u{FFFD}fourth"]);
    }
}
