// Change detection between successive artifacts of a versioned source.

use std::collections::BTreeSet;

use capitolwatch_common::AnalysisArtifact;

/// Confidence moves smaller than this are noise.
const CONFIDENCE_EPSILON: f64 = 0.05;

/// Describe what changed from `previous` to `current`. Deterministic; no
/// provider call. Returns `"No material change"` when nothing differs.
pub fn describe_changes(previous: &AnalysisArtifact, current: &AnalysisArtifact) -> String {
    let before = &previous.result;
    let after = &current.result;
    let mut parts = Vec::new();

    if before.summary.trim() != after.summary.trim() {
        parts.push("Summary revised".to_string());
    }

    let old_points: BTreeSet<&str> = before.key_points.iter().map(|s| s.trim()).collect();
    let new_points: BTreeSet<&str> = after.key_points.iter().map(|s| s.trim()).collect();
    let added: Vec<&str> = new_points.difference(&old_points).copied().collect();
    let removed: Vec<&str> = old_points.difference(&new_points).copied().collect();
    if !added.is_empty() {
        parts.push(format!("Added: {}", added.join("; ")));
    }
    if !removed.is_empty() {
        parts.push(format!("Removed: {}", removed.join("; ")));
    }

    if before.sentiment != after.sentiment {
        parts.push(format!(
            "Sentiment {} -> {}",
            before.sentiment, after.sentiment
        ));
    }
    if (before.confidence - after.confidence).abs() >= CONFIDENCE_EPSILON {
        parts.push(format!(
            "Confidence {:.2} -> {:.2}",
            before.confidence, after.confidence
        ));
    }

    if parts.is_empty() {
        "No material change".to_string()
    } else {
        parts.join(". ")
    }
}
