//! Left/right primer pair validation

use super::dimer::hetero_complementarity;
use super::error::{DesignError, Result};
use super::types::{DesignConfig, PairResult, ScoredPrimer};

const HETERO_WEIGHT: f64 = 1.0;

/// Check insert size and heterodimer risk of a pair without failing.
pub fn check_pair(left: &ScoredPrimer, right: &ScoredPrimer, cfg: &DesignConfig) -> PairResult {
    check_pair_wrapped(left, right, 0, cfg)
}

/// As [`check_pair`], with `wrap` added to the right primer's position.
/// A pair closing a circular reference of length L uses `wrap = L`.
pub fn check_pair_wrapped(
    left: &ScoredPrimer,
    right: &ScoredPrimer,
    wrap: usize,
    cfg: &DesignConfig,
) -> PairResult {
    let right_start = right.candidate.start + wrap;
    let amplicon_len = right_start.saturating_sub(left.candidate.end());
    let size_ok = right_start >= left.candidate.end()
        && (cfg.amplicon_size_min..=cfg.amplicon_size_max).contains(&amplicon_len);

    // No point aligning a pair that is already out
    let hetero = if size_ok {
        hetero_complementarity(
            left.candidate.sequence.as_bytes(),
            right.candidate.sequence.as_bytes(),
            &cfg.alignment,
        )
    } else {
        0
    };

    PairResult {
        passes: size_ok && hetero <= cfg.max_hetero_dimer_score,
        amplicon_len,
        heterodimer_risk: hetero as f64,
        score: left.score.quality + right.score.quality - HETERO_WEIGHT * hetero as f64,
    }
}

/// Validate a pair, naming the first check it fails.
pub fn validate(left: &ScoredPrimer, right: &ScoredPrimer, cfg: &DesignConfig) -> Result<PairResult> {
    let result = check_pair(left, right, cfg);
    if right.candidate.start < left.candidate.end()
        || !(cfg.amplicon_size_min..=cfg.amplicon_size_max).contains(&result.amplicon_len)
    {
        return Err(DesignError::SizeOutOfRange {
            len: result.amplicon_len,
            min: cfg.amplicon_size_min,
            max: cfg.amplicon_size_max,
        });
    }
    if !result.passes {
        return Err(DesignError::DimerRiskTooHigh {
            score: result.heterodimer_risk as i32,
            max: cfg.max_hetero_dimer_score,
        });
    }
    Ok(result)
}
