//! Data types for primer scheme design

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::error::{DesignError, Result};

/// Strand a primer anneals along
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strand {
    /// Left primer, read 5'->3' along the reference
    Forward,
    /// Right primer, reverse complement of its reference window
    Reverse,
}

impl Strand {
    pub fn symbol(&self) -> char {
        match self {
            Self::Forward => '+',
            Self::Reverse => '-',
        }
    }
}

/// Thread count configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadCount {
    /// Use all available CPU cores
    Auto,
    /// Use a specific number of threads
    Fixed(usize),
}

impl Default for ThreadCount {
    fn default() -> Self {
        Self::Auto
    }
}

impl ThreadCount {
    /// Get the actual number of threads to use
    pub fn get_count(&self) -> usize {
        match self {
            Self::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            Self::Fixed(n) => (*n).max(1),
        }
    }
}

/// Reaction conditions for the nearest-neighbour Tm estimate.
/// Salt and dNTP concentrations in mM, oligo concentration in nM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermoParams {
    pub mv_conc: f64,
    pub dv_conc: f64,
    pub dntp_conc: f64,
    pub dna_conc: f64,
}

impl Default for ThermoParams {
    fn default() -> Self {
        Self {
            mv_conc: 100.0,
            dv_conc: 2.0,
            dntp_conc: 0.8,
            dna_conc: 15.0,
        }
    }
}

/// Scores for the complementarity alignments behind hairpin and dimer checks.
/// Gap penalties are negative, as rust-bio expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimerScoring {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl Default for DimerScoring {
    fn default() -> Self {
        Self {
            match_score: 1,
            mismatch_score: -1,
            gap_open: -3,
            gap_extend: -1,
        }
    }
}

/// What to do with an amplicon that fits in no pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Keep it in its round-robin pool and report the conflict
    Accept,
    /// Remove it from the scheme and report the conflict
    Drop,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::Accept
    }
}

/// Longest k-mer the mispriming index can pack into a u64
pub const MAX_KMER: usize = 32;

/// Design parameters, read-only for the whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignConfig {
    pub amplicon_size_min: usize,
    pub amplicon_size_max: usize,
    /// Preferred insert length; the midpoint of min and max when unset
    pub amplicon_size_target: Option<usize>,
    pub primer_size_min: usize,
    pub primer_size_max: usize,
    pub primer_tm_min: f64,
    pub primer_tm_max: f64,
    /// GC bounds as fractions in 0..=1
    pub primer_gc_min: f64,
    pub primer_gc_max: f64,
    pub primer_homopolymer_max: usize,
    pub max_self_dimer_score: i32,
    pub max_hetero_dimer_score: i32,
    pub max_degenerate_bases: usize,
    pub target_overlap: usize,
    pub overlap_tolerance: usize,
    pub n_pools: usize,
    /// Primers closer than this (bp) must not share a pool
    pub interaction_distance: usize,
    /// Also reject pools holding a primer that dimerises with the newcomer
    pub pool_dimer_check: bool,
    pub pool_conflict_policy: ConflictPolicy,
    /// Width of the window of left-primer 3' ends searched per step
    pub left_lookahead: usize,
    /// Distance scanned without finding a primer before a region is flagged
    pub max_scan_distance: usize,
    pub backtrack: bool,
    /// Close the tiling with an amplicon spanning the end and start of
    /// each reference
    pub circular: bool,
    /// Reject pairs and pool members that prime elsewhere in the references
    pub mispriming_check: bool,
    /// Primer 3' k-mer looked up in the index; `primer_size_min` when unset
    pub mispriming_kmer_size: Option<usize>,
    /// Also look up every single-base variant of the k-mer
    pub mispriming_fuzzy: bool,
    /// Longest 3'-to-3' distance counted as an off-target product; a full
    /// `amplicon_size_max` product with both primers when unset
    pub mispriming_product_size: Option<usize>,
    pub thermo: ThermoParams,
    pub alignment: DimerScoring,
    pub thread_count: ThreadCount,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            amplicon_size_min: 360,
            amplicon_size_max: 400,
            amplicon_size_target: None,
            primer_size_min: 19,
            primer_size_max: 34,
            primer_tm_min: 59.5,
            primer_tm_max: 62.5,
            primer_gc_min: 0.30,
            primer_gc_max: 0.55,
            primer_homopolymer_max: 5,
            max_self_dimer_score: 10,
            max_hetero_dimer_score: 10,
            max_degenerate_bases: 2,
            target_overlap: 20,
            overlap_tolerance: 10,
            n_pools: 2,
            interaction_distance: 50,
            pool_dimer_check: true,
            pool_conflict_policy: ConflictPolicy::Accept,
            left_lookahead: 20,
            max_scan_distance: 400,
            backtrack: false,
            circular: false,
            mispriming_check: true,
            mispriming_kmer_size: None,
            mispriming_fuzzy: true,
            mispriming_product_size: None,
            thermo: ThermoParams::default(),
            alignment: DimerScoring::default(),
            thread_count: ThreadCount::Auto,
        }
    }
}

impl DesignConfig {
    /// Insert length the right-primer search is centred on
    pub fn target_amplicon(&self) -> usize {
        self.amplicon_size_target
            .unwrap_or((self.amplicon_size_min + self.amplicon_size_max) / 2)
            .clamp(self.amplicon_size_min, self.amplicon_size_max)
    }

    pub fn mispriming_kmer(&self) -> usize {
        self.mispriming_kmer_size
            .unwrap_or(self.primer_size_min.min(MAX_KMER))
    }

    pub fn mispriming_product(&self) -> usize {
        self.mispriming_product_size
            .unwrap_or(self.amplicon_size_max + 2 * self.primer_size_max)
    }

    pub fn primer_lengths(&self) -> RangeInclusive<usize> {
        self.primer_size_min..=self.primer_size_max
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(DesignError::InvalidConfig(msg));

        if self.primer_size_min == 0 || self.primer_size_min > self.primer_size_max {
            return fail(format!(
                "primer size range {}..={} is empty",
                self.primer_size_min, self.primer_size_max
            ));
        }
        if self.amplicon_size_min == 0 || self.amplicon_size_min > self.amplicon_size_max {
            return fail(format!(
                "amplicon size range {}..={} is empty",
                self.amplicon_size_min, self.amplicon_size_max
            ));
        }
        if let Some(target) = self.amplicon_size_target {
            if !(self.amplicon_size_min..=self.amplicon_size_max).contains(&target) {
                return fail(format!("amplicon target {} outside size range", target));
            }
        }
        if self.primer_tm_min > self.primer_tm_max {
            return fail("primer Tm range is empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.primer_gc_min)
            || !(0.0..=1.0).contains(&self.primer_gc_max)
            || self.primer_gc_min > self.primer_gc_max
        {
            return fail("primer GC bounds must be fractions with min <= max".to_string());
        }
        if self.overlap_tolerance > self.target_overlap {
            return fail(format!(
                "overlap tolerance {} exceeds target overlap {}",
                self.overlap_tolerance, self.target_overlap
            ));
        }
        if self.target_overlap >= self.amplicon_size_min {
            return fail("target overlap must be shorter than the minimum amplicon".to_string());
        }
        if self.n_pools == 0 {
            return fail("at least one pool is required".to_string());
        }
        if self.left_lookahead == 0 {
            return fail("left lookahead must be positive".to_string());
        }
        let k = self.mispriming_kmer();
        if k == 0 || k > MAX_KMER || k > self.primer_size_min {
            return fail(format!(
                "mispriming k-mer of {} must be within 1..={} and no longer than the shortest primer",
                k, MAX_KMER
            ));
        }
        if self.alignment.match_score <= 0 {
            return fail("alignment match score must be positive".to_string());
        }
        Ok(())
    }
}

/// Why a primer candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailReason {
    LowTm,
    HighTm,
    LowGc,
    HighGc,
    Hairpin,
    Homopolymer,
    TooDegenerate,
}

/// A primer window on one strand of a reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimerCandidate {
    pub seq_id: String,
    /// Forward-axis start of the window
    pub start: usize,
    pub len: usize,
    pub strand: Strand,
    /// Oligo sequence 5'->3'
    pub sequence: String,
}

impl PrimerCandidate {
    /// Forward-axis end of the window (exclusive)
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Genomic position of the 3' end
    pub fn three_prime(&self) -> usize {
        match self.strand {
            Strand::Forward => self.end(),
            Strand::Reverse => self.start,
        }
    }
}

/// Outcome of the thermodynamic scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub passes: bool,
    pub tm: f64,
    pub gc: f64,
    pub hairpin_risk: f64,
    pub degenerate: usize,
    pub homopolymer: usize,
    /// Higher is better; rounded to one decimal so near-equal primers tie
    pub quality: f64,
    pub reason_if_failed: Option<FailReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrimer {
    pub candidate: PrimerCandidate,
    pub score: ScoreResult,
}

/// Outcome of the pair validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairResult {
    pub passes: bool,
    pub amplicon_len: usize,
    pub heterodimer_risk: f64,
    pub score: f64,
}

/// A left/right primer pair accepted into a scheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amplicon {
    pub seq_id: String,
    /// 1-based position within its sequence's tiling
    pub number: usize,
    pub left: ScoredPrimer,
    pub right: ScoredPrimer,
    pub heterodimer_risk: f64,
    pub score: f64,
    /// Placed against the previous amplicon's overlap target
    pub joined: bool,
    pub pool: Option<usize>,
    /// Length added to the right primer's coordinates when the amplicon
    /// runs over the end of a circular reference; 0 otherwise
    #[serde(default)]
    pub wrap: usize,
}

impl Amplicon {
    /// First base of the PCR product
    pub fn start(&self) -> usize {
        self.left.candidate.start
    }

    /// One past the last base of the PCR product. Past the reference end
    /// for a wrapping amplicon.
    pub fn end(&self) -> usize {
        self.right.candidate.end() + self.wrap
    }

    /// First base of the primer-trimmed insert
    pub fn insert_start(&self) -> usize {
        self.left.candidate.end()
    }

    pub fn insert_end(&self) -> usize {
        self.right.candidate.start + self.wrap
    }

    pub fn wraps(&self) -> bool {
        self.wrap > 0
    }

    pub fn insert_len(&self) -> usize {
        self.insert_end() - self.insert_start()
    }

    /// Primer-trimmed coverage shared with the following amplicon.
    /// Negative when the two leave a gap.
    pub fn overlap_with(&self, next: &Amplicon) -> i64 {
        self.insert_end() as i64 - next.insert_start() as i64
    }

    pub fn primers(&self) -> [&ScoredPrimer; 2] {
        [&self.left, &self.right]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    NoPrimerFound,
    NoPairFound,
}

/// A stretch of reference the tiler gave up on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionIssue {
    pub seq_id: String,
    pub start: usize,
    pub end: usize,
    pub kind: IssueKind,
}

/// Reference bases not covered by any amplicon insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub seq_id: String,
    pub start: usize,
    pub end: usize,
}

impl Gap {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// An amplicon for which no conflict-free pool existed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConflict {
    pub seq_id: String,
    pub amplicon: usize,
    /// Round-robin pool it was given, None when dropped
    pub pool: Option<usize>,
    /// Amplicon numbers in that pool it conflicts with
    pub conflicts_with: Vec<usize>,
}

/// Tiling of one reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilingResult {
    pub seq_id: String,
    pub seq_len: usize,
    pub amplicons: Vec<Amplicon>,
    pub issues: Vec<RegionIssue>,
    pub cancelled: bool,
}

/// Pooled amplicons of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scheme {
    pub n_pools: usize,
    pub amplicons: Vec<Amplicon>,
}

impl Scheme {
    pub fn pool(&self, pool: usize) -> impl Iterator<Item = &Amplicon> {
        self.amplicons.iter().filter(move |a| a.pool == Some(pool))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceSummary {
    pub seq_id: String,
    pub length: usize,
    pub amplicons: usize,
    pub covered_bases: usize,
}

/// Everything a run produced, including what it could not do
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeReport {
    pub config: DesignConfig,
    pub scheme: Scheme,
    pub sequences: Vec<SequenceSummary>,
    pub gaps: Vec<Gap>,
    pub issues: Vec<RegionIssue>,
    pub pool_conflicts: Vec<PoolConflict>,
    pub cancelled: bool,
}

/// Progress update during tiling
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub seq_id: String,
    pub position: usize,
    pub seq_len: usize,
    pub amplicons: usize,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = DesignConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.target_amplicon(), 380);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut cfg = DesignConfig::default();
        cfg.primer_size_min = 40;
        assert!(matches!(cfg.validate(), Err(DesignError::InvalidConfig(_))));

        let mut cfg = DesignConfig::default();
        cfg.n_pools = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = DesignConfig::default();
        cfg.overlap_tolerance = cfg.target_overlap + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = DesignConfig::default();
        cfg.primer_gc_max = 55.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_mispriming_defaults() {
        let mut cfg = DesignConfig::default();
        assert!(cfg.mispriming_check && cfg.mispriming_fuzzy && !cfg.circular);
        assert_eq!(cfg.mispriming_kmer(), 19);
        assert_eq!(cfg.mispriming_product(), 400 + 2 * 34);

        cfg.mispriming_kmer_size = Some(20);
        assert!(cfg.validate().is_err());
        cfg.primer_size_min = 33;
        cfg.mispriming_kmer_size = None;
        assert_eq!(cfg.mispriming_kmer(), MAX_KMER);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_config_json_defaults() {
        let cfg: DesignConfig =
            serde_json::from_str(r#"{"amplicon_size_min": 150, "amplicon_size_max": 200}"#).unwrap();
        assert_eq!(cfg.amplicon_size_min, 150);
        assert_eq!(cfg.primer_size_min, 19);
        assert_eq!(cfg.target_amplicon(), 175);
    }

    #[test]
    fn test_three_prime() {
        let fwd = PrimerCandidate {
            seq_id: "s".into(),
            start: 10,
            len: 20,
            strand: Strand::Forward,
            sequence: String::new(),
        };
        assert_eq!(fwd.three_prime(), 30);
        let rev = PrimerCandidate { strand: Strand::Reverse, ..fwd };
        assert_eq!(rev.three_prime(), 10);
    }
}
