/// Confidence when the answer was grounded on retrieved sources.
///
/// Maps the mean source similarity into 0.7-0.95; `None` when nothing was retrieved.
pub fn retrieval_confidence(scores: &[f32]) -> Option<f32> {
	if scores.is_empty() {
		return None;
	}

	let avg = scores.iter().sum::<f32>() / scores.len() as f32;

	Some((0.7 + avg * 0.25).min(0.95))
}

/// Confidence for a plain completion, keyed by the upstream finish reason.
pub fn completion_confidence(finish_reason: Option<&str>) -> f32 {
	match finish_reason {
		Some("stop") => 0.9,
		Some("length") => 0.7,
		_ => 0.5,
	}
}
