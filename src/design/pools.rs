//! Multiplex pool assignment
//!
//! Amplicons are visited in genome order and offered pool `index mod N`
//! first, then the following pools with wrap-around. A pool is refused when
//! it already holds an amplicon of the same reference whose primers sit
//! within `interaction_distance`, or (optionally) a primer that forms a
//! strong heterodimer with the newcomer. With a mispriming index, a pool is
//! also refused when the newcomer's primers and a member's primers would
//! amplify a product together.

use rayon::prelude::*;
use tracing::{debug, warn};

use super::dimer::worst_interaction;
use super::error::{DesignError, Result};
use super::mispriming::{cross_products, Hit, MatchIndex};
use super::types::{Amplicon, ConflictPolicy, DesignConfig, PoolConflict};

/// Bases between the closest primers of two amplicons on one reference.
/// `None` when they sit on different references.
pub fn primer_distance(a: &Amplicon, b: &Amplicon) -> Option<usize> {
    if a.seq_id != b.seq_id {
        return None;
    }
    a.primers()
        .iter()
        .flat_map(|p| b.primers().map(move |q| (p, q)))
        .map(|(p, q)| {
            let (p, q) = (&p.candidate, &q.candidate);
            if p.end() <= q.start {
                q.start - p.end()
            } else if q.end() <= p.start {
                p.start - q.end()
            } else {
                0
            }
        })
        .min()
}

/// True when `a` and `b` must not share a pool because of their positions
pub fn too_close(a: &Amplicon, b: &Amplicon, cfg: &DesignConfig) -> bool {
    primer_distance(a, b).is_some_and(|d| d < cfg.interaction_distance)
}

/// Pools built up so far; members are indices into `placed`
pub struct PoolAssigner<'a> {
    cfg: &'a DesignConfig,
    index: Option<&'a MatchIndex>,
    placed: Vec<Amplicon>,
    /// Primer sites of each placed amplicon, empty without an index
    hits: Vec<Vec<Hit>>,
    pools: Vec<Vec<usize>>,
}

impl<'a> PoolAssigner<'a> {
    pub fn new(cfg: &'a DesignConfig) -> Self {
        Self {
            cfg,
            index: None,
            placed: Vec::new(),
            hits: Vec::new(),
            pools: vec![Vec::new(); cfg.n_pools.max(1)],
        }
    }

    pub fn with_index(mut self, index: Option<&'a MatchIndex>) -> Self {
        self.index = index;
        self
    }

    fn hits_of(&self, amplicon: &Amplicon) -> Vec<Hit> {
        self.index
            .map(|idx| idx.pair_hits(&amplicon.left, &amplicon.right))
            .unwrap_or_default()
    }

    /// True when `hits` would amplify something with a member of `pool`
    fn pool_products(&self, hits: &[Hit], pool: usize) -> bool {
        let max_product = self.cfg.mispriming_product();
        self.pools[pool]
            .par_iter()
            .any(|&i| cross_products(hits, &self.hits[i], max_product) > 0)
    }

    /// Members of `pool` that `amplicon` would clash with
    fn clashes(&self, amplicon: &Amplicon, pool: usize) -> Vec<usize> {
        self.pools[pool]
            .iter()
            .filter(|&&i| too_close(amplicon, &self.placed[i], self.cfg))
            .copied()
            .collect()
    }

    /// Worst heterodimer score between `amplicon` and any primer in `pool`
    fn pool_dimer(&self, amplicon: &Amplicon, pool: usize) -> i32 {
        let ours: Vec<&[u8]> = amplicon
            .primers()
            .iter()
            .map(|p| p.candidate.sequence.as_bytes())
            .collect();

        self.pools[pool]
            .par_iter()
            .map(|&i| {
                let theirs: Vec<&[u8]> = self.placed[i]
                    .primers()
                    .iter()
                    .map(|p| p.candidate.sequence.as_bytes())
                    .collect();
                worst_interaction(ours.iter().copied(), theirs.iter().copied(), &self.cfg.alignment)
            })
            .max()
            .unwrap_or(0)
    }

    fn accepts(&self, amplicon: &Amplicon, hits: &[Hit], pool: usize) -> bool {
        if !self.clashes(amplicon, pool).is_empty() {
            return false;
        }
        if self.cfg.pool_dimer_check
            && self.pool_dimer(amplicon, pool) > self.cfg.max_hetero_dimer_score
        {
            return false;
        }
        !(self.index.is_some() && self.pool_products(hits, pool))
    }

    /// First conflict-free pool starting from `preferred`.
    pub fn find_pool(&self, amplicon: &Amplicon, preferred: usize) -> Result<usize> {
        let n = self.pools.len();
        let hits = self.hits_of(amplicon);
        (0..n)
            .map(|k| (preferred + k) % n)
            .find(|&pool| self.accepts(amplicon, &hits, pool))
            .ok_or_else(|| DesignError::PoolAssignmentFailed {
                id: amplicon.seq_id.clone(),
                amplicon: amplicon.number,
            })
    }

    /// Record `amplicon` as a member of `pool`
    pub fn place(&mut self, mut amplicon: Amplicon, pool: usize) {
        amplicon.pool = Some(pool);
        self.hits.push(self.hits_of(&amplicon));
        self.pools[pool].push(self.placed.len());
        self.placed.push(amplicon);
    }

    pub fn into_amplicons(self) -> Vec<Amplicon> {
        self.placed
    }
}

/// Outcome of pool assignment over a whole run
#[derive(Debug, Clone, Default)]
pub struct PoolAssignment {
    pub amplicons: Vec<Amplicon>,
    pub conflicts: Vec<PoolConflict>,
}

/// Assign every amplicon a pool. Input must be in genome order per
/// reference; output keeps that order minus any dropped amplicons.
pub fn assign_pools(
    amplicons: Vec<Amplicon>,
    cfg: &DesignConfig,
    index: Option<&MatchIndex>,
) -> PoolAssignment {
    let mut assigner = PoolAssigner::new(cfg).with_index(index);
    let n_pools = cfg.n_pools.max(1);
    let mut conflicts = Vec::new();

    for (index, amplicon) in amplicons.into_iter().enumerate() {
        let preferred = index % n_pools;
        match assigner.find_pool(&amplicon, preferred) {
            Ok(pool) => {
                debug!(
                    seq = %amplicon.seq_id,
                    amplicon = amplicon.number,
                    pool,
                    "pool assigned"
                );
                assigner.place(amplicon, pool);
            }
            Err(e) => {
                let conflicts_with: Vec<usize> = assigner
                    .clashes(&amplicon, preferred)
                    .into_iter()
                    .map(|i| assigner.placed[i].number)
                    .collect();
                warn!(error = %e, policy = ?cfg.pool_conflict_policy, "unresolved pool conflict");

                let pool = match cfg.pool_conflict_policy {
                    ConflictPolicy::Accept => Some(preferred),
                    ConflictPolicy::Drop => None,
                };
                conflicts.push(PoolConflict {
                    seq_id: amplicon.seq_id.clone(),
                    amplicon: amplicon.number,
                    pool,
                    conflicts_with,
                });
                if let Some(pool) = pool {
                    assigner.place(amplicon, pool);
                }
            }
        }
    }

    PoolAssignment {
        amplicons: assigner.into_amplicons(),
        conflicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::store::Sequence;
    use crate::design::tiler::tests::{scenario_config, synthetic};
    use crate::design::tiler::{tile_sequence, CancelToken};
    use crate::design::iupac::reverse_complement;
    use crate::design::store::SequenceStore;
    use crate::design::types::{PrimerCandidate, ScoreResult, ScoredPrimer, Strand};

    fn primer(start: usize, len: usize, strand: Strand, seq: &str) -> ScoredPrimer {
        ScoredPrimer {
            candidate: PrimerCandidate {
                seq_id: "s".into(),
                start,
                len,
                strand,
                sequence: seq.to_string(),
            },
            score: ScoreResult {
                passes: true,
                tm: 60.0,
                gc: 0.5,
                hairpin_risk: 0.0,
                degenerate: 0,
                homopolymer: 1,
                quality: 100.0,
                reason_if_failed: None,
            },
        }
    }

    fn amplicon(number: usize, left_start: usize, size: usize) -> Amplicon {
        let left = primer(left_start, 20, Strand::Forward, "CACCAACACACCAACCACAC");
        let right = primer(left_start + 20 + size, 20, Strand::Reverse, "CACACCAACCACACCAACAC");
        Amplicon {
            seq_id: "s".into(),
            number,
            left,
            right,
            heterodimer_risk: 0.0,
            score: 200.0,
            joined: false,
            pool: None,
            wrap: 0,
        }
    }

    /// Amplicon whose primers are the real windows of `raw`
    fn amplicon_on(raw: &str, number: usize, left_start: usize, right_start: usize) -> Amplicon {
        let window = |start: usize| &raw[start..start + 20];
        let right_seq = reverse_complement(window(right_start).as_bytes());
        let mut a = amplicon(number, 0, 0);
        a.left = primer(left_start, 20, Strand::Forward, window(left_start));
        a.right = primer(
            right_start,
            20,
            Strand::Reverse,
            std::str::from_utf8(&right_seq).unwrap(),
        );
        a
    }

    #[test]
    fn test_neighbours_never_share_pool() {
        let cfg = DesignConfig::default();
        let result = assign_pools(vec![amplicon(1, 0, 150), amplicon(2, 5, 150)], &cfg, None);
        let pools: Vec<_> = result.amplicons.iter().map(|a| a.pool).collect();
        assert_eq!(pools.len(), 2);
        assert_ne!(pools[0], pools[1]);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_primer_distance() {
        let a = amplicon(1, 0, 150);
        let b = amplicon(2, 5, 150);
        assert_eq!(primer_distance(&a, &b), Some(0));

        let far = amplicon(3, 1000, 150);
        assert_eq!(primer_distance(&a, &far), Some(1000 - 190));

        let mut other = amplicon(4, 0, 150);
        other.seq_id = "t".into();
        assert_eq!(primer_distance(&a, &other), None);
    }

    #[test]
    fn test_single_pool_conflict_policies() {
        let mut cfg = DesignConfig::default();
        cfg.n_pools = 1;
        let input = vec![amplicon(1, 0, 150), amplicon(2, 5, 150)];

        let accepted = assign_pools(input.clone(), &cfg, None);
        assert_eq!(accepted.amplicons.len(), 2);
        assert_eq!(accepted.conflicts.len(), 1);
        assert_eq!(accepted.conflicts[0].amplicon, 2);
        assert_eq!(accepted.conflicts[0].pool, Some(0));
        assert_eq!(accepted.conflicts[0].conflicts_with, vec![1]);

        cfg.pool_conflict_policy = ConflictPolicy::Drop;
        let dropped = assign_pools(input, &cfg, None);
        assert_eq!(dropped.amplicons.len(), 1);
        assert_eq!(dropped.conflicts[0].pool, None);
    }

    #[test]
    fn test_dimer_check_refuses_pool() {
        let mut cfg = DesignConfig::default();
        cfg.n_pools = 2;
        let a = amplicon(1, 0, 150);
        let mut b = amplicon(2, 5000, 150);
        // b's left is the reverse complement of a's left
        b.left.candidate.sequence = "GTGTGGTTGGTGTGTTGGTG".into();

        // c would go to pool 0 with b, but pairs with it
        let c = amplicon(3, 10_000, 150);
        let result = assign_pools(vec![b.clone(), a.clone(), c], &cfg, None);
        let pools: Vec<_> = result.amplicons.iter().map(|x| x.pool).collect();
        assert_eq!(pools, vec![Some(0), Some(1), Some(1)]);
        assert!(result.conflicts.is_empty());

        cfg.n_pools = 1;
        let result = assign_pools(vec![b.clone(), a.clone()], &cfg, None);
        assert_eq!(result.conflicts.len(), 1);
        // far apart, so only the dimer is to blame
        assert!(result.conflicts[0].conflicts_with.is_empty());

        cfg.pool_dimer_check = false;
        let result = assign_pools(vec![b, a], &cfg, None);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_tiled_scheme_pools_hold() {
        let cfg = scenario_config();
        let seq = Sequence::new("s", &synthetic(3000, 23)).unwrap();
        let tiling = tile_sequence(&seq, &cfg, &CancelToken::new(), None);
        let result = assign_pools(tiling.amplicons, &cfg, None);

        for (i, a) in result.amplicons.iter().enumerate() {
            for b in &result.amplicons[i + 1..] {
                if a.pool != b.pool || !too_close(a, b, &cfg) {
                    continue;
                }
                let listed = result.conflicts.iter().any(|c| {
                    (c.amplicon == b.number && c.conflicts_with.contains(&a.number))
                        || (c.amplicon == a.number && c.conflicts_with.contains(&b.number))
                });
                assert!(listed, "{} and {} share pool {:?}", a.number, b.number, a.pool);
            }
        }
        assert!(result.amplicons.iter().all(|a| a.pool.is_some_and(|p| p < cfg.n_pools)));
    }

    #[test]
    fn test_off_target_products_refuse_pool() {
        let mut cfg = DesignConfig::default();
        cfg.n_pools = 2;
        cfg.interaction_distance = 10;
        cfg.pool_dimer_check = false;
        let raw = synthetic(6000, 5);
        let mut store = SequenceStore::new();
        store.load("s", &raw).unwrap();
        let index = MatchIndex::build(&store, 18, false);

        let a = amplicon_on(&raw, 1, 100, 2000);
        let c = amplicon_on(&raw, 2, 4000, 4200);
        // b's right faces a's left 198 bp downstream
        let b = amplicon_on(&raw, 3, 3000, 300);

        let plain = assign_pools(vec![a.clone(), c.clone(), b.clone()], &cfg, None);
        let pools: Vec<_> = plain.amplicons.iter().map(|x| x.pool).collect();
        assert_eq!(pools, vec![Some(0), Some(1), Some(0)]);

        let checked = assign_pools(vec![a, c, b], &cfg, Some(&index));
        let pools: Vec<_> = checked.amplicons.iter().map(|x| x.pool).collect();
        assert_eq!(pools, vec![Some(0), Some(1), Some(1)]);
        assert!(checked.conflicts.is_empty());
    }
}
