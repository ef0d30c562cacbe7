//! Whole-run orchestration: tile every reference, pool the result, report

use std::sync::mpsc::Sender;

use rayon::prelude::*;
use tracing::{info, warn};

use super::error::{DesignError, Result};
use super::mispriming::MatchIndex;
use super::pools::assign_pools;
use super::store::SequenceStore;
use super::tiler::{CancelToken, Tiler};
use super::types::{
    Amplicon, DesignConfig, Gap, ProgressUpdate, Scheme, SchemeReport, SequenceSummary,
    TilingResult,
};

/// Stretches of `[0, seq_len)` outside every amplicon insert. A wrapping
/// insert covers the reference end and the reference start.
pub fn coverage_gaps(seq_id: &str, seq_len: usize, amplicons: &[Amplicon]) -> Vec<Gap> {
    let mut inserts: Vec<(usize, usize)> = amplicons
        .iter()
        .filter(|a| a.seq_id == seq_id)
        .flat_map(|a| {
            if a.wraps() {
                vec![(a.insert_start(), seq_len), (0, a.right.candidate.start)]
            } else {
                vec![(a.insert_start(), a.insert_end())]
            }
        })
        .collect();
    inserts.sort_unstable();

    let mut gaps = Vec::new();
    let mut covered_to = 0;
    for (start, end) in inserts {
        if start > covered_to {
            gaps.push(Gap {
                seq_id: seq_id.to_string(),
                start: covered_to,
                end: start,
            });
        }
        covered_to = covered_to.max(end);
    }
    if covered_to < seq_len {
        gaps.push(Gap {
            seq_id: seq_id.to_string(),
            start: covered_to,
            end: seq_len,
        });
    }
    gaps
}

fn tile_all(
    store: &SequenceStore,
    cfg: &DesignConfig,
    cancel: &CancelToken,
    progress_tx: Option<&Sender<ProgressUpdate>>,
) -> (Option<MatchIndex>, Vec<TilingResult>) {
    let index = cfg
        .mispriming_check
        .then(|| MatchIndex::from_config(store, cfg));
    let tilings = store
        .sequences()
        .par_iter()
        .map(|seq| {
            Tiler::new(seq, cfg, cancel, progress_tx)
                .with_index(index.as_ref())
                .run()
        })
        .collect();
    (index, tilings)
}

/// Design a pooled scheme over every reference in `store`.
///
/// Only an invalid configuration or an empty store is an error. Regions that
/// could not be tiled and pool conflicts are listed in the report.
pub fn design_scheme(
    store: &SequenceStore,
    cfg: &DesignConfig,
    cancel: &CancelToken,
    progress_tx: Option<Sender<ProgressUpdate>>,
) -> Result<SchemeReport> {
    cfg.validate()?;
    if store.is_empty() {
        return Err(DesignError::InvalidSequence {
            id: "<input>".to_string(),
            reason: "no reference sequences".to_string(),
        });
    }

    let num_threads = cfg.thread_count.get_count();
    info!(
        sequences = store.len(),
        threads = num_threads,
        pools = cfg.n_pools,
        "designing scheme"
    );

    let (index, tilings) = match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
    {
        Ok(pool) => pool.install(|| tile_all(store, cfg, cancel, progress_tx.as_ref())),
        Err(e) => {
            warn!(error = %e, "falling back to the global thread pool");
            tile_all(store, cfg, cancel, progress_tx.as_ref())
        }
    };

    let cancelled = tilings.iter().any(|t| t.cancelled);
    let issues: Vec<_> = tilings.iter().flat_map(|t| t.issues.iter().cloned()).collect();
    let amplicons: Vec<_> = tilings
        .iter()
        .flat_map(|t| t.amplicons.iter().cloned())
        .collect();

    let pooled = assign_pools(amplicons, cfg, index.as_ref());

    let mut gaps = Vec::new();
    let mut sequences = Vec::with_capacity(tilings.len());
    for t in &tilings {
        let seq_gaps = coverage_gaps(&t.seq_id, t.seq_len, &pooled.amplicons);
        let uncovered: usize = seq_gaps.iter().map(Gap::len).sum();
        sequences.push(SequenceSummary {
            seq_id: t.seq_id.clone(),
            length: t.seq_len,
            amplicons: pooled.amplicons.iter().filter(|a| a.seq_id == t.seq_id).count(),
            covered_bases: t.seq_len - uncovered,
        });
        gaps.extend(seq_gaps);
    }

    info!(
        amplicons = pooled.amplicons.len(),
        gaps = gaps.len(),
        issues = issues.len(),
        conflicts = pooled.conflicts.len(),
        cancelled,
        "scheme finished"
    );

    Ok(SchemeReport {
        config: cfg.clone(),
        scheme: Scheme {
            n_pools: cfg.n_pools,
            amplicons: pooled.amplicons,
        },
        sequences,
        gaps,
        issues,
        pool_conflicts: pooled.conflicts,
        cancelled,
    })
}
