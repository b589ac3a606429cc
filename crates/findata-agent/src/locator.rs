//! Result locator: map execution output to a deliverable artifact path
//!
//! Resolution order: explicit `OUTPUT_PATH:` tag in stdout, then the
//! expected paths in their declared priority, then the last non-empty
//! stdout line if it names an existing file.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Tag generated scripts print before the deliverable path
pub const OUTPUT_TAG: &str = "OUTPUT_PATH:";

/// Extract the tagged output path from captured stdout
///
/// When the tag appears more than once the last occurrence wins, matching
/// the convention that later prints supersede earlier ones.
pub fn tagged_path(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(OUTPUT_TAG))
        .map(|rest| PathBuf::from(rest.trim()))
        .filter(|path| !path.as_os_str().is_empty())
}

/// Resolve the artifact a successful execution produced
///
/// `expected` is ordered by priority; the first path that exists on disk
/// wins. When none exists, the last non-empty output line is treated as a
/// candidate path and accepted only if it also exists. `None` means the
/// run succeeded without a locatable deliverable.
pub fn locate(expected: &[PathBuf], output: &str) -> Option<PathBuf> {
    if let Some(path) = tagged_path(output) {
        if path.exists() {
            return Some(path);
        }
        debug!(path = %path.display(), "Tagged output path does not exist");
    }

    if let Some(path) = expected.iter().find(|p| p.exists()) {
        return Some(path.clone());
    }

    let candidate = output.lines().rev().find_map(|line| {
        let line = line.trim();
        (!line.is_empty()).then(|| Path::new(line))
    })?;
    candidate.exists().then(|| candidate.to_path_buf())
}
