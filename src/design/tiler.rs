//! Greedy amplicon tiling over one reference
//!
//! The tiler walks a cursor left to right. Each step scores the left-primer
//! window at the cursor, then tries the left alternatives best-first, pairing
//! each with the right primer closest to the target amplicon size. Candidate
//! scoring runs on the rayon pool; the walk itself is sequential. On a
//! circular reference a final amplicon closes the tiling across the origin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::digester::digest_anchors;
use super::error::{DesignError, Result};
use super::mispriming::MatchIndex;
use super::pair::{check_pair, check_pair_wrapped};
use super::scorer::score_passing;
use super::store::Sequence;
use super::types::{
    Amplicon, DesignConfig, IssueKind, PairResult, ProgressUpdate, RegionIssue, ScoredPrimer,
    Strand, TilingResult,
};

/// Run-level cancellation flag, shared by clones
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Where the next left primer's 3' end is searched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// No amplicon to overlap: scan 3' ends from `from`
    Walk { from: usize, region_start: usize },
    /// Land the 3' end near `ideal`, never at or before `floor`
    Overlap { ideal: usize, floor: usize },
}

impl Cursor {
    fn position(&self) -> usize {
        match *self {
            Self::Walk { from, .. } => from,
            Self::Overlap { ideal, .. } => ideal,
        }
    }

    /// Half-open range of acceptable left 3' ends
    fn left_window(&self, cfg: &DesignConfig) -> (usize, usize) {
        match *self {
            Self::Walk { from, .. } => (from, from + cfg.left_lookahead),
            Self::Overlap { ideal, floor } => (
                ideal.saturating_sub(cfg.overlap_tolerance).max(floor),
                ideal + cfg.overlap_tolerance + 1,
            ),
        }
    }

    /// Distance of a left 3' end from where this cursor wants it
    fn miss(&self, end: usize) -> usize {
        match *self {
            Self::Walk { from, .. } => end.saturating_sub(from),
            Self::Overlap { ideal, .. } => end.abs_diff(ideal),
        }
    }

    /// Cursor for the step after `amplicon`
    fn after(amplicon: &Amplicon, cfg: &DesignConfig) -> Self {
        let floor = amplicon.insert_start() + 1;
        let ideal = amplicon.insert_end().saturating_sub(cfg.target_overlap).max(floor);
        Self::Overlap { ideal, floor }
    }

    /// Walk cursor resuming past a failed overlap band
    fn walk_past(&self, cfg: &DesignConfig) -> Self {
        let (lo, hi) = self.left_window(cfg);
        match *self {
            Self::Walk { .. } => *self,
            Self::Overlap { .. } => Self::Walk { from: hi, region_start: lo },
        }
    }
}

#[derive(Debug)]
enum State {
    SeekingLeft,
    /// Left alternatives still to try, best on top
    SeekingRight { lefts: Vec<ScoredPrimer> },
    Done,
}

/// Alternatives left over when an amplicon was placed
#[derive(Debug)]
struct Frame {
    cursor: Cursor,
    lefts: Vec<ScoredPrimer>,
}

/// An amplicon withdrawn while its alternatives are tried
#[derive(Debug)]
struct Backtrack {
    displaced: Amplicon,
    /// Whether the band that failed after it had any left primers
    failed_with_lefts: bool,
    alternative_placed: bool,
}

/// Mutable state of one tiling run
#[derive(Debug)]
struct Run {
    cursor: Cursor,
    amplicons: Vec<Amplicon>,
    issues: Vec<RegionIssue>,
    last_frame: Option<Frame>,
    backtrack: Option<Backtrack>,
    lefts_seen: bool,
}

impl Run {
    /// Resolve a backtrack still open when the walk ends. A cancelled run
    /// puts the withdrawn amplicon back; a finished one keeps the alternative.
    fn settle_backtrack(&mut self, cancelled: bool) {
        let Some(bt) = self.backtrack.take() else {
            return;
        };
        if cancelled || !bt.alternative_placed {
            if bt.alternative_placed {
                self.amplicons.pop();
            }
            self.amplicons.push(bt.displaced);
        }
    }
}

pub struct Tiler<'a> {
    sequence: &'a Sequence,
    cfg: &'a DesignConfig,
    cancel: &'a CancelToken,
    progress: Option<&'a Sender<ProgressUpdate>>,
    index: Option<&'a MatchIndex>,
}

impl<'a> Tiler<'a> {
    pub fn new(
        sequence: &'a Sequence,
        cfg: &'a DesignConfig,
        cancel: &'a CancelToken,
        progress: Option<&'a Sender<ProgressUpdate>>,
    ) -> Self {
        Self {
            sequence,
            cfg,
            cancel,
            progress,
            index: None,
        }
    }

    /// Reject pairs that amplify anything besides their own amplicon
    pub fn with_index(mut self, index: Option<&'a MatchIndex>) -> Self {
        self.index = index;
        self
    }

    /// Tile the whole sequence. Region failures end up in `issues`;
    /// a cancelled run returns the amplicons placed so far.
    pub fn run(&self) -> TilingResult {
        let cfg = self.cfg;
        let seq_len = self.sequence.len();
        // last left 3' end that leaves room for an insert and a right primer
        let end_at = seq_len.saturating_sub(cfg.amplicon_size_min + cfg.primer_size_min);

        let start = self.sequence.first_unmasked(0);
        let mut run = Run {
            cursor: Cursor::Walk {
                from: start + cfg.primer_size_min,
                region_start: start,
            },
            amplicons: Vec::new(),
            issues: Vec::new(),
            last_frame: None,
            backtrack: None,
            lefts_seen: false,
        };
        let mut state = State::SeekingLeft;
        let mut cancelled = false;

        info!(seq = self.sequence.id(), len = seq_len, "tiling started");

        loop {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            state = match state {
                State::Done => break,

                State::SeekingLeft => {
                    if run.cursor.position() >= end_at {
                        State::Done
                    } else {
                        match self.left_alternatives(&run.cursor) {
                            Ok(lefts) => {
                                run.lefts_seen = true;
                                State::SeekingRight { lefts }
                            }
                            Err(e) => {
                                debug!(seq = self.sequence.id(), error = %e, "step has no left primer");
                                self.step_failed(&mut run, false)
                            }
                        }
                    }
                }

                State::SeekingRight { mut lefts } => match lefts.pop() {
                    Some(left) => match self.best_pair(&left) {
                        Ok((right, pair)) => self.place(&mut run, left, right, pair, lefts),
                        Err(e) => {
                            debug!(seq = self.sequence.id(), error = %e, "left primer rejected");
                            State::SeekingRight { lefts }
                        }
                    },
                    None => self.step_failed(&mut run, true),
                },
            };
        }

        run.settle_backtrack(cancelled);
        if cfg.circular && !cancelled {
            self.close_circle(&mut run);
        }
        let mut amplicons = run.amplicons;
        for (i, a) in amplicons.iter_mut().enumerate() {
            a.number = i + 1;
        }

        info!(
            seq = self.sequence.id(),
            amplicons = amplicons.len(),
            issues = run.issues.len(),
            cancelled,
            "tiling finished"
        );

        TilingResult {
            seq_id: self.sequence.id().to_string(),
            seq_len,
            amplicons,
            issues: run.issues,
            cancelled,
        }
    }

    fn place(
        &self,
        run: &mut Run,
        left: ScoredPrimer,
        right: ScoredPrimer,
        pair: PairResult,
        lefts: Vec<ScoredPrimer>,
    ) -> State {
        let amplicon = Amplicon {
            seq_id: self.sequence.id().to_string(),
            number: run.amplicons.len() + 1,
            left,
            right,
            heterodimer_risk: pair.heterodimer_risk,
            score: pair.score,
            joined: matches!(run.cursor, Cursor::Overlap { .. }),
            pool: None,
            wrap: 0,
        };
        debug!(
            seq = self.sequence.id(),
            number = amplicon.number,
            start = amplicon.start(),
            end = amplicon.end(),
            joined = amplicon.joined,
            "amplicon placed"
        );

        if let Some(bt) = run.backtrack.as_mut() {
            if bt.alternative_placed {
                debug!(seq = self.sequence.id(), "backtrack resolved");
                run.backtrack = None;
            } else {
                bt.alternative_placed = true;
            }
        }

        run.last_frame = Some(Frame {
            cursor: run.cursor,
            lefts,
        });
        run.cursor = Cursor::after(&amplicon, self.cfg);
        run.lefts_seen = false;
        self.report_progress(&amplicon, run.amplicons.len() + 1);
        run.amplicons.push(amplicon);
        State::SeekingLeft
    }

    /// Add the amplicon that runs from the last insert over the origin into
    /// the first one, or flag the band if none fits.
    fn close_circle(&self, run: &mut Run) {
        let (Some(first), Some(last)) = (run.amplicons.first(), run.amplicons.last()) else {
            return;
        };
        let band = Cursor::after(last, self.cfg);
        match self.closing_pair(first, &band) {
            Ok((left, right, pair)) => {
                let amplicon = Amplicon {
                    seq_id: self.sequence.id().to_string(),
                    number: run.amplicons.len() + 1,
                    left,
                    right,
                    heterodimer_risk: pair.heterodimer_risk,
                    score: pair.score,
                    joined: true,
                    pool: None,
                    wrap: self.sequence.len(),
                };
                debug!(
                    seq = self.sequence.id(),
                    start = amplicon.start(),
                    end = amplicon.right.candidate.end(),
                    "closing amplicon placed"
                );
                self.report_progress(&amplicon, run.amplicons.len() + 1);
                run.amplicons.push(amplicon);
            }
            Err(e) => {
                let had_lefts = !matches!(e, DesignError::NoPrimerFound { .. });
                self.flag_overlap_failure(&band, had_lefts, &mut run.issues);
            }
        }
    }

    /// Left primer in `band`, right primer within one amplicon past the first
    /// insert start, sized across the origin.
    fn closing_pair(
        &self,
        first: &Amplicon,
        band: &Cursor,
    ) -> Result<(ScoredPrimer, ScoredPrimer, PairResult)> {
        let cfg = self.cfg;
        let len = self.sequence.len();
        let mut lefts = self.left_alternatives(band)?;

        let lo = first.insert_start() + 1;
        let hi = (first.insert_start() + cfg.amplicon_size_max).min(len);
        let anchors = (lo + cfg.primer_size_min)..(hi + cfg.primer_size_max).min(len + 1);
        let candidates: Vec<_> = digest_anchors(self.sequence, anchors, Strand::Reverse, cfg)
            .into_iter()
            .filter(|c| (lo..hi).contains(&c.start))
            .collect();
        let rights = score_passing(candidates, cfg);

        while let Some(left) = lefts.pop() {
            let tail = len - left.candidate.end();
            let target = cfg.target_amplicon();
            let mut order: Vec<&ScoredPrimer> = rights.iter().collect();
            order.sort_by(|a, b| {
                (tail + a.candidate.start)
                    .abs_diff(target)
                    .cmp(&(tail + b.candidate.start).abs_diff(target))
                    .then_with(|| b.score.quality.total_cmp(&a.score.quality))
                    .then_with(|| a.candidate.start.cmp(&b.candidate.start))
                    .then_with(|| a.candidate.len.cmp(&b.candidate.len))
            });
            let found = order
                .into_par_iter()
                .map(|right| (right, check_pair_wrapped(&left, right, len, cfg)))
                .find_first(|(_, pair)| pair.passes);
            if let Some((right, pair)) = found {
                return Ok((left, right.clone(), pair));
            }
        }
        Err(DesignError::NoPairFound {
            id: self.sequence.id().to_string(),
            left_end: band.position(),
        })
    }

    /// The current step found no usable pair. Decide whether to backtrack,
    /// walk past the overlap band, or keep scanning.
    fn step_failed(&self, run: &mut Run, had_lefts: bool) -> State {
        let cfg = self.cfg;
        let had_lefts = had_lefts || run.lefts_seen;

        // Alternatives for a withdrawn amplicon ran out: put it back
        if let Some(bt) = run.backtrack.take_if(|bt| !bt.alternative_placed) {
            debug!(seq = self.sequence.id(), "backtrack exhausted, restoring amplicon");
            let failed = Cursor::after(&bt.displaced, cfg);
            run.amplicons.push(bt.displaced);
            run.last_frame = None;
            self.flag_overlap_failure(&failed, bt.failed_with_lefts, &mut run.issues);
            run.cursor = failed.walk_past(cfg);
            run.lefts_seen = false;
            return State::SeekingLeft;
        }

        match run.cursor {
            Cursor::Overlap { .. } => {
                if cfg.backtrack {
                    if let Some(frame) = run.last_frame.take() {
                        let retry = if let Some(bt) = run.backtrack.as_mut() {
                            // the alternative itself led nowhere
                            run.amplicons.pop();
                            bt.alternative_placed = false;
                            true
                        } else if frame.lefts.is_empty() {
                            false
                        } else if let Some(displaced) = run.amplicons.pop() {
                            debug!(
                                seq = self.sequence.id(),
                                number = displaced.number,
                                "backtracking"
                            );
                            run.backtrack = Some(Backtrack {
                                displaced,
                                failed_with_lefts: had_lefts,
                                alternative_placed: false,
                            });
                            true
                        } else {
                            false
                        };
                        if retry {
                            run.cursor = frame.cursor;
                            run.lefts_seen = false;
                            return State::SeekingRight { lefts: frame.lefts };
                        }
                    }
                }

                self.flag_overlap_failure(&run.cursor, had_lefts, &mut run.issues);
                run.cursor = run.cursor.walk_past(cfg);
                run.last_frame = None;
                run.lefts_seen = false;
            }
            Cursor::Walk { from, region_start } => {
                let from = from + cfg.left_lookahead;
                let mut region_start = region_start;
                if from - region_start >= cfg.max_scan_distance {
                    let kind = if had_lefts {
                        IssueKind::NoPairFound
                    } else {
                        IssueKind::NoPrimerFound
                    };
                    self.flag(region_start, from, kind, &mut run.issues);
                    region_start = from;
                    run.lefts_seen = false;
                }
                run.cursor = Cursor::Walk { from, region_start };
            }
        }
        State::SeekingLeft
    }

    fn flag_overlap_failure(&self, cursor: &Cursor, had_lefts: bool, issues: &mut Vec<RegionIssue>) {
        let (lo, hi) = cursor.left_window(self.cfg);
        let kind = if had_lefts {
            IssueKind::NoPairFound
        } else {
            IssueKind::NoPrimerFound
        };
        self.flag(lo, hi, kind, issues);
    }

    fn flag(&self, start: usize, end: usize, kind: IssueKind, issues: &mut Vec<RegionIssue>) {
        let end = end.min(self.sequence.len());
        warn!(seq = self.sequence.id(), start, end, ?kind, "region left uncovered");
        issues.push(RegionIssue {
            seq_id: self.sequence.id().to_string(),
            start,
            end,
            kind,
        });
    }

    /// Passing left primers with 3' end in the cursor window, best on top.
    fn left_alternatives(&self, cursor: &Cursor) -> Result<Vec<ScoredPrimer>> {
        let cfg = self.cfg;
        let (lo, hi) = cursor.left_window(cfg);
        let anchors = lo.saturating_sub(cfg.primer_size_max)
            ..hi.saturating_sub(cfg.primer_size_min).min(self.sequence.len());

        let candidates: Vec<_> = digest_anchors(self.sequence, anchors, Strand::Forward, cfg)
            .into_iter()
            .filter(|c| (lo..hi).contains(&c.end()))
            .collect();

        let mut lefts = score_passing(candidates, cfg);
        lefts.sort_by(|a, b| {
            b.score
                .quality
                .total_cmp(&a.score.quality)
                .then_with(|| cursor.miss(a.candidate.end()).cmp(&cursor.miss(b.candidate.end())))
                .then_with(|| a.candidate.start.cmp(&b.candidate.start))
                .then_with(|| a.candidate.len.cmp(&b.candidate.len))
        });
        lefts.reverse();
        if lefts.is_empty() {
            return Err(DesignError::NoPrimerFound {
                id: self.sequence.id().to_string(),
                start: lo,
                end: hi,
            });
        }
        Ok(lefts)
    }

    /// First valid right primer for `left`, closest to the target size first.
    fn best_pair(&self, left: &ScoredPrimer) -> Result<(ScoredPrimer, PairResult)> {
        let cfg = self.cfg;
        let left_end = left.candidate.end();
        let lo = left_end + cfg.amplicon_size_min;
        let hi = left_end + cfg.amplicon_size_max + 1;
        let anchors = (lo + cfg.primer_size_min)..(hi + cfg.primer_size_max).min(self.sequence.len() + 1);

        let candidates: Vec<_> = digest_anchors(self.sequence, anchors, Strand::Reverse, cfg)
            .into_iter()
            .filter(|c| (lo..hi).contains(&c.start))
            .collect();

        let target = left_end + cfg.target_amplicon();
        let mut rights = score_passing(candidates, cfg);
        rights.sort_by(|a, b| {
            a.candidate
                .start
                .abs_diff(target)
                .cmp(&b.candidate.start.abs_diff(target))
                .then_with(|| b.score.quality.total_cmp(&a.score.quality))
                .then_with(|| a.candidate.start.cmp(&b.candidate.start))
                .then_with(|| a.candidate.len.cmp(&b.candidate.len))
        });

        rights
            .into_par_iter()
            .map(|right| {
                let pair = check_pair(left, &right, cfg);
                (right, pair)
            })
            .find_first(|(right, pair)| pair.passes && self.primes_only_target(left, right))
            .ok_or_else(|| DesignError::NoPairFound {
                id: self.sequence.id().to_string(),
                left_end,
            })
    }

    fn primes_only_target(&self, left: &ScoredPrimer, right: &ScoredPrimer) -> bool {
        let Some(index) = self.index else {
            return true;
        };
        match index.check_pair(left, right, self.cfg) {
            Ok(()) => true,
            Err(e) => {
                debug!(seq = self.sequence.id(), error = %e, "pair rejected");
                false
            }
        }
    }

    fn report_progress(&self, amplicon: &Amplicon, count: usize) {
        if let Some(tx) = self.progress {
            let _ = tx.send(ProgressUpdate {
                seq_id: self.sequence.id().to_string(),
                position: amplicon.end(),
                seq_len: self.sequence.len(),
                amplicons: count,
                message: format!(
                    "{}: amplicon {} at {}..{}",
                    self.sequence.id(),
                    count,
                    amplicon.start(),
                    amplicon.end()
                ),
            });
        }
    }
}

/// Tile one sequence with a fresh tiler
pub fn tile_sequence(
    sequence: &Sequence,
    cfg: &DesignConfig,
    cancel: &CancelToken,
    progress: Option<&Sender<ProgressUpdate>>,
) -> TilingResult {
    Tiler::new(sequence, cfg, cancel, progress).run()
}
