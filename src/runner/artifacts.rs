//! Subtask workspace artifacts: the summary file and the produced-file list.

use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Appended to a synthesized summary when the output had to be cut
pub const TRUNCATION_MARKER: &str = "\n\n[... output truncated ...]";

/// Build a summary from accumulated executor text, bounded to `max_chars`
/// characters before the truncation marker.
pub fn synthesize_summary(title: &str, output: &str, max_chars: usize) -> String {
    let body = output.trim();
    let body = if body.is_empty() {
        "(the step produced no text output)".to_string()
    } else if body.chars().count() > max_chars {
        let cut: String = body.chars().take(max_chars).collect();
        format!("{}{}", cut, TRUNCATION_MARKER)
    } else {
        body.to_string()
    };
    format!("# {}\n\n{}\n", title, body)
}

/// Every file under `dir`, relative to it and joined with `/`, sorted
pub fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}
