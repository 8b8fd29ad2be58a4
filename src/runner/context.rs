//! Forward context passed from completed subtasks to the next one.

use crate::plan::SubtaskResult;

/// Digest of earlier results: step number, outcome banner, produced files.
///
/// This is the only information carried forward between subtasks.
pub fn build_context_summary(prior_results: &[SubtaskResult]) -> String {
    if prior_results.is_empty() {
        return String::new();
    }

    let mut summary = String::from("## Previous steps\n");
    for result in prior_results {
        let banner = if result.success { "✓ completed" } else { "✗ failed" };
        summary.push_str(&format!("\n### Step {} ({})\n", result.sequence, banner));

        if let Some(error) = &result.error {
            summary.push_str(&format!("Error: {}\n", error));
        }

        if result.files.is_empty() {
            summary.push_str("Files: (no files tracked)\n");
        } else {
            summary.push_str("Files:\n");
            for file in &result.files {
                summary.push_str(&format!(
                    "- subtask-{}/{}\n",
                    result.sequence, file
                ));
            }
        }
    }
    summary
}
