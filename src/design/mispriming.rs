//! Off-target priming
//!
//! A k-mer index over every reference. Primers are looked up by their 3'
//! k-mer: a forward hit is a site where the oligo anneals as written, a
//! reverse hit a site holding its reverse complement. A forward and a reverse
//! hit on the same reference that face each other within the product size
//! make a product.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::info;

use super::error::{DesignError, Result};
use super::iupac::reverse_complement;
use super::store::SequenceStore;
use super::types::{DesignConfig, ScoredPrimer, Strand};

const BASES: [u8; 4] = *b"ACGT";

fn base_code(b: u8) -> Option<u64> {
    match b {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Two bits per base; None for anything but ACGT
fn encode(kmer: &[u8]) -> Option<u64> {
    kmer.iter()
        .try_fold(0u64, |acc, &b| Some((acc << 2) | base_code(b)?))
}

/// A 3' k-mer site. `pos` is the forward-axis start of the k-mer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hit {
    pub seq: usize,
    pub pos: usize,
    pub strand: Strand,
}

#[derive(Debug, Clone, Default)]
pub struct MatchIndex {
    k: usize,
    fuzzy: bool,
    ids: HashMap<String, usize>,
    kmers: HashMap<u64, Vec<(usize, usize)>>,
}

impl MatchIndex {
    /// Index every ACGT-only k-mer of every reference in the store.
    pub fn build(store: &SequenceStore, k: usize, fuzzy: bool) -> Self {
        let per_seq: Vec<Vec<(u64, usize)>> = store
            .sequences()
            .par_iter()
            .map(|s| {
                s.bases()
                    .windows(k)
                    .enumerate()
                    .filter_map(|(pos, w)| encode(w).map(|code| (code, pos)))
                    .collect()
            })
            .collect();

        let mut kmers: HashMap<u64, Vec<(usize, usize)>> = HashMap::new();
        for (seq, sites) in per_seq.into_iter().enumerate() {
            for (code, pos) in sites {
                kmers.entry(code).or_default().push((seq, pos));
            }
        }
        let ids = store
            .sequences()
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id().to_string(), i))
            .collect();

        info!(k, fuzzy, distinct = kmers.len(), "mispriming index built");
        Self {
            k,
            fuzzy,
            ids,
            kmers,
        }
    }

    pub fn from_config(store: &SequenceStore, cfg: &DesignConfig) -> Self {
        Self::build(store, cfg.mispriming_kmer(), cfg.mispriming_fuzzy)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn variants(&self, kmer: &[u8]) -> Vec<Vec<u8>> {
        let mut out = vec![kmer.to_vec()];
        if self.fuzzy {
            for i in 0..kmer.len() {
                for &b in BASES.iter().filter(|&&b| b != kmer[i]) {
                    let mut v = kmer.to_vec();
                    v[i] = b;
                    out.push(v);
                }
            }
        }
        out
    }

    /// Every site the 3' k-mer of `oligo` anneals to, sorted.
    pub fn hits(&self, oligo: &[u8]) -> Vec<Hit> {
        if self.k == 0 || oligo.len() < self.k {
            return Vec::new();
        }
        let kmer = &oligo[oligo.len() - self.k..];

        let mut hits = Vec::new();
        for v in self.variants(kmer) {
            for (strand, query) in [
                (Strand::Forward, v.clone()),
                (Strand::Reverse, reverse_complement(&v)),
            ] {
                if let Some(sites) = encode(&query).and_then(|code| self.kmers.get(&code)) {
                    hits.extend(sites.iter().map(|&(seq, pos)| Hit { seq, pos, strand }));
                }
            }
        }
        hits.sort_unstable();
        hits.dedup();
        hits
    }

    /// Hits of both primers of a pair
    pub fn pair_hits(&self, left: &ScoredPrimer, right: &ScoredPrimer) -> Vec<Hit> {
        let mut hits = self.hits(left.candidate.sequence.as_bytes());
        hits.extend(self.hits(right.candidate.sequence.as_bytes()));
        hits.sort_unstable();
        hits.dedup();
        hits
    }

    /// The product a pair is designed to amplify
    fn intended(&self, left: &ScoredPrimer, right: &ScoredPrimer) -> Option<(Hit, Hit)> {
        let seq = *self.ids.get(&left.candidate.seq_id)?;
        Some((
            Hit {
                seq,
                pos: left.candidate.end().saturating_sub(self.k),
                strand: Strand::Forward,
            },
            Hit {
                seq,
                pos: right.candidate.start,
                strand: Strand::Reverse,
            },
        ))
    }

    /// Products the pair forms besides its own amplicon
    pub fn off_target_products(
        &self,
        left: &ScoredPrimer,
        right: &ScoredPrimer,
        max_product: usize,
    ) -> usize {
        let hits = self.pair_hits(left, right);
        let intended = self.intended(left, right);
        products(&hits, &hits, max_product)
            .filter(|p| Some(*p) != intended)
            .count()
    }

    pub fn check_pair(
        &self,
        left: &ScoredPrimer,
        right: &ScoredPrimer,
        cfg: &DesignConfig,
    ) -> Result<()> {
        match self.off_target_products(left, right, cfg.mispriming_product()) {
            0 => Ok(()),
            products => Err(DesignError::OffTargetProduct {
                id: left.candidate.seq_id.clone(),
                products,
            }),
        }
    }
}

/// Forward hits of `fwd` facing reverse hits of `rev` on the same reference,
/// closer than `max_product`.
pub fn products<'h>(
    fwd: &'h [Hit],
    rev: &'h [Hit],
    max_product: usize,
) -> impl Iterator<Item = (Hit, Hit)> + 'h {
    fwd.iter()
        .filter(|f| f.strand == Strand::Forward)
        .flat_map(move |f| {
            rev.iter()
                .filter(move |r| {
                    r.strand == Strand::Reverse
                        && r.seq == f.seq
                        && r.pos > f.pos
                        && r.pos - f.pos < max_product
                })
                .map(move |r| (*f, *r))
        })
}

/// Products two primer sets form with each other, in either direction
pub fn cross_products(a: &[Hit], b: &[Hit], max_product: usize) -> usize {
    products(a, b, max_product).count() + products(b, a, max_product).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::scorer::score;
    use crate::design::tiler::tests::synthetic;
    use crate::design::types::PrimerCandidate;

    fn primer(raw: &str, start: usize, len: usize, strand: Strand) -> ScoredPrimer {
        let window = &raw.as_bytes()[start..start + len];
        let sequence = match strand {
            Strand::Forward => window.to_vec(),
            Strand::Reverse => reverse_complement(window),
        };
        let candidate = PrimerCandidate {
            seq_id: "s".into(),
            start,
            len,
            strand,
            sequence: String::from_utf8(sequence).unwrap(),
        };
        let score = score(&candidate, &DesignConfig::default());
        ScoredPrimer { candidate, score }
    }

    fn index(raw: &str, fuzzy: bool) -> MatchIndex {
        let mut store = SequenceStore::new();
        store.load("s", raw).unwrap();
        MatchIndex::build(&store, 18, fuzzy)
    }

    /// `base` with `base[from..to]` copied in at 600
    fn with_copy(base: &str, from: usize, to: usize) -> String {
        format!("{}{}{}", &base[..600], &base[from..to], &base[600..])
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(b"A"), Some(0));
        assert_eq!(encode(b"CG"), Some(0b0110));
        assert_eq!(encode(b"ACNT"), None);
    }

    #[test]
    fn test_hits_on_both_strands() {
        let raw = synthetic(1000, 5);
        let idx = index(&raw, false);
        let left = primer(&raw, 100, 20, Strand::Forward);
        let right = primer(&raw, 300, 20, Strand::Reverse);

        let hits = idx.hits(left.candidate.sequence.as_bytes());
        assert!(hits.contains(&Hit { seq: 0, pos: 102, strand: Strand::Forward }));
        let hits = idx.hits(right.candidate.sequence.as_bytes());
        assert!(hits.contains(&Hit { seq: 0, pos: 300, strand: Strand::Reverse }));
    }

    #[test]
    fn test_intended_product_is_not_off_target() {
        let raw = synthetic(1000, 5);
        let idx = index(&raw, true);
        let left = primer(&raw, 100, 20, Strand::Forward);
        let right = primer(&raw, 300, 20, Strand::Reverse);
        assert_eq!(idx.off_target_products(&left, &right, 250), 0);
        assert!(idx.check_pair(&left, &right, &DesignConfig::default()).is_ok());
    }

    #[test]
    fn test_duplicated_amplicon_is_off_target() {
        let raw = with_copy(&synthetic(1000, 5), 100, 320);
        let idx = index(&raw, false);
        let left = primer(&raw, 100, 20, Strand::Forward);
        let right = primer(&raw, 300, 20, Strand::Reverse);

        assert_eq!(idx.off_target_products(&left, &right, 250), 1);
        let cfg = DesignConfig {
            amplicon_size_min: 150,
            amplicon_size_max: 200,
            ..Default::default()
        };
        assert!(matches!(
            idx.check_pair(&left, &right, &cfg),
            Err(DesignError::OffTargetProduct { products: 1, .. })
        ));
        // longer products are not counted
        assert_eq!(idx.off_target_products(&left, &right, 150), 0);
    }

    #[test]
    fn test_lone_extra_site_forms_no_product() {
        let raw = with_copy(&synthetic(1000, 5), 100, 125);
        let idx = index(&raw, false);
        let left = primer(&raw, 100, 20, Strand::Forward);
        let right = primer(&raw, 300, 20, Strand::Reverse);
        assert_eq!(idx.hits(left.candidate.sequence.as_bytes()).len(), 2);
        assert_eq!(idx.off_target_products(&left, &right, 250), 0);
    }

    #[test]
    fn test_fuzzy_lookup_tolerates_one_mismatch() {
        let mut raw = with_copy(&synthetic(1000, 5), 100, 320).into_bytes();
        raw[610] = match raw[610] {
            b'A' => b'C',
            _ => b'A',
        };
        let raw = String::from_utf8(raw).unwrap();
        let left = primer(&raw, 100, 20, Strand::Forward);
        let right = primer(&raw, 300, 20, Strand::Reverse);

        assert_eq!(index(&raw, false).off_target_products(&left, &right, 250), 0);
        assert_eq!(index(&raw, true).off_target_products(&left, &right, 250), 1);
    }

    #[test]
    fn test_cross_products_between_pairs() {
        let raw = synthetic(1000, 5);
        let idx = index(&raw, false);
        let a = idx.pair_hits(
            &primer(&raw, 100, 20, Strand::Forward),
            &primer(&raw, 300, 20, Strand::Reverse),
        );
        let b = idx.pair_hits(
            &primer(&raw, 260, 20, Strand::Forward),
            &primer(&raw, 460, 20, Strand::Reverse),
        );
        // a's left faces b's right 358 bp away, b's left faces a's right 38 bp away
        assert_eq!(cross_products(&a, &b, 250), 1);
        assert_eq!(cross_products(&a, &b, 400), 2);
    }
}
