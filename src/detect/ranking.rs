use crate::detect::correlation::CauseCandidate;
use crate::detect::CauseOut;

/// Likely causes reported per analysis.
pub const MAX_CAUSES: usize = 5;

/// Round to three decimal places.
fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Normalise candidate scores against the top scorer and keep the best
/// [`MAX_CAUSES`].
///
/// The sort is stable: equal confidences stay in the order the candidates
/// were first discovered.
pub fn rank(candidates: Vec<CauseCandidate<'_>>) -> Vec<CauseOut> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let max_score = candidates.iter().map(|c| c.score).fold(0.0_f64, f64::max);
    let max_score = if max_score > 0.0 { max_score } else { 1.0 };

    let mut causes: Vec<CauseOut> = candidates
        .into_iter()
        .map(|c| CauseOut {
            event_type: c.event.event_type.clone(),
            ts: c.ts,
            meta: c.event.meta.clone(),
            confidence: round3(c.score / max_score),
            evidence: c.evidence,
        })
        .collect();

    causes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    causes.truncate(MAX_CAUSES);
    causes
}
