use crate::capability::ExternalScore;
use crate::constants::{CONFIDENCE_THRESHOLD, CONFIDENT_EXTERNAL_WEIGHT, HESITANT_EXTERNAL_WEIGHT};

/// Blend the heuristic score with an external assessment.
///
/// The external score is discounted by its own confidence, and a confident
/// assessment earns a larger share of the blend. Without an external score
/// the heuristic is returned exactly as given. A non-finite external score
/// or confidence counts as no external score.
#[must_use]
pub fn combine(heuristic: f64, external: Option<&ExternalScore>) -> f64 {
    let Some(external) = external.filter(|e| e.score.is_finite() && e.confidence.is_finite())
    else {
        return heuristic;
    };
    let weight = if external.confidence >= CONFIDENCE_THRESHOLD {
        CONFIDENT_EXTERNAL_WEIGHT
    } else {
        HESITANT_EXTERNAL_WEIGHT
    };
    let blended = heuristic * (1.0 - weight) + (external.score * external.confidence) * weight;
    blended.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external(score: f64, confidence: f64) -> ExternalScore {
        ExternalScore {
            score,
            issues: Vec::new(),
            confidence,
            token_usage: 0,
        }
    }

    #[test]
    fn absent_external_is_identity() {
        for h in [0.0, 0.37, 1.0] {
            assert_eq!(combine(h, None), h);
        }
    }

    #[test]
    fn confident_external_weighs_more() {
        let confident = combine(0.5, Some(&external(1.0, 0.5)));
        // 0.5 * 0.6 + 0.5 * 0.4
        assert!((confident - 0.5).abs() < 1e-9);
        let hesitant = combine(0.5, Some(&external(1.0, 0.4)));
        // 0.5 * 0.8 + 0.4 * 0.2
        assert!((hesitant - 0.48).abs() < 1e-9);
    }

    #[test]
    fn non_finite_external_falls_back_to_heuristic() {
        assert_eq!(combine(0.5, Some(&external(f64::NAN, 0.9))), 0.5);
        assert_eq!(combine(0.5, Some(&external(0.8, f64::NAN))), 0.5);
        assert_eq!(combine(0.3, Some(&external(f64::INFINITY, 1.0))), 0.3);
    }

    #[test]
    fn result_is_clamped() {
        assert_eq!(combine(1.0, Some(&external(5.0, 1.0))), 1.0);
        assert_eq!(combine(0.0, Some(&external(-3.0, 1.0))), 0.0);
    }
}
