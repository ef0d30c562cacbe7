//! Thermodynamic scoring of primer candidates

use rayon::prelude::*;

use super::dimer::self_complementarity;
use super::iupac::count_degenerate;
use super::thermo::{calc_tm, gc_fraction, max_homopolymer};
use super::types::{DesignConfig, FailReason, PrimerCandidate, ScoreResult, ScoredPrimer};

const TM_WEIGHT: f64 = 2.0;
const GC_WEIGHT: f64 = 50.0;
const HAIRPIN_WEIGHT: f64 = 1.0;
const DEGENERATE_WEIGHT: f64 = 5.0;

/// Score one candidate. Pure function of the candidate and config.
pub fn score(candidate: &PrimerCandidate, cfg: &DesignConfig) -> ScoreResult {
    let bases = candidate.sequence.as_bytes();

    let tm = calc_tm(bases, &cfg.thermo);
    let gc = gc_fraction(bases);
    let hairpin = self_complementarity(bases, &cfg.alignment);
    let degenerate = count_degenerate(bases);
    let homopolymer = max_homopolymer(bases);

    let reason_if_failed = if degenerate > cfg.max_degenerate_bases {
        Some(FailReason::TooDegenerate)
    } else if hairpin > cfg.max_self_dimer_score {
        Some(FailReason::Hairpin)
    } else if homopolymer > cfg.primer_homopolymer_max {
        Some(FailReason::Homopolymer)
    } else if tm < cfg.primer_tm_min {
        Some(FailReason::LowTm)
    } else if tm > cfg.primer_tm_max {
        Some(FailReason::HighTm)
    } else if gc < cfg.primer_gc_min {
        Some(FailReason::LowGc)
    } else if gc > cfg.primer_gc_max {
        Some(FailReason::HighGc)
    } else {
        None
    };

    let tm_mid = (cfg.primer_tm_min + cfg.primer_tm_max) / 2.0;
    let gc_mid = (cfg.primer_gc_min + cfg.primer_gc_max) / 2.0;
    let quality = 100.0
        - TM_WEIGHT * (tm - tm_mid).abs()
        - GC_WEIGHT * (gc - gc_mid).abs()
        - HAIRPIN_WEIGHT * hairpin as f64
        - DEGENERATE_WEIGHT * degenerate as f64;

    ScoreResult {
        passes: reason_if_failed.is_none(),
        tm,
        gc,
        hairpin_risk: hairpin as f64,
        degenerate,
        homopolymer,
        quality: (quality * 10.0).round() / 10.0,
        reason_if_failed,
    }
}

/// Score candidates on the rayon pool, keeping only those that pass.
/// Output order follows input order.
pub fn score_passing(candidates: Vec<PrimerCandidate>, cfg: &DesignConfig) -> Vec<ScoredPrimer> {
    candidates
        .into_par_iter()
        .filter_map(|candidate| {
            let score = score(&candidate, cfg);
            score.passes.then_some(ScoredPrimer { candidate, score })
        })
        .collect()
}
