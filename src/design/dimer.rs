//! Primer complementarity via local alignment using rust-bio
//!
//! Two oligos that can base-pair align well when one is compared against the
//! reverse complement of the other. Degenerate symbols pair if any of their
//! bases can.

use bio::alignment::pairwise::Aligner;

use super::iupac::{bases_overlap, reverse_complement};
use super::types::DimerScoring;

/// Best local alignment score of `a` against the reverse complement of `b`.
pub fn complementarity(a: &[u8], b: &[u8], scoring: &DimerScoring) -> i32 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let rc = reverse_complement(b);
    let match_score = scoring.match_score;
    let mismatch_score = scoring.mismatch_score;

    let mut aligner = Aligner::with_capacity(
        a.len(),
        rc.len(),
        scoring.gap_open,
        scoring.gap_extend,
        move |x: u8, y: u8| -> i32 {
            if bases_overlap(x, y) { match_score } else { mismatch_score }
        },
    );

    aligner.local(a, &rc).score.max(0)
}

/// Hairpin / self-dimer risk of a single oligo
pub fn self_complementarity(seq: &[u8], scoring: &DimerScoring) -> i32 {
    complementarity(seq, seq, scoring)
}

/// Heterodimer risk between two primers, both given 5'->3'
pub fn hetero_complementarity(left: &[u8], right: &[u8], scoring: &DimerScoring) -> i32 {
    complementarity(left, right, scoring)
}

/// Largest heterodimer score between any primer of `ours` and any of `theirs`
pub fn worst_interaction<'a, I, J>(ours: I, theirs: J, scoring: &DimerScoring) -> i32
where
    I: IntoIterator<Item = &'a [u8]>,
    J: IntoIterator<Item = &'a [u8]> + Clone,
{
    ours.into_iter()
        .flat_map(|a| {
            theirs
                .clone()
                .into_iter()
                .map(move |b| hetero_complementarity(a, b, scoring))
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palindrome_scores_full_length() {
        let s = DimerScoring::default();
        assert_eq!(self_complementarity(b"ACGTACGTACGTACGTACGT", &s), 20);
    }

    #[test]
    fn test_non_pairing_scores_zero() {
        let s = DimerScoring::default();
        // A/C only: the reverse complement is all G/T, nothing pairs
        assert_eq!(self_complementarity(b"CACCAACACACCAACCACAC", &s), 0);
        assert_eq!(hetero_complementarity(b"AAAAAAAAAA", b"AAAAAAAAAA", &s), 0);
    }

    #[test]
    fn test_hetero_with_reverse_complement() {
        let s = DimerScoring::default();
        let left = b"AGCTTGACCTGATCGGATCA";
        let right = reverse_complement(left);
        assert_eq!(hetero_complementarity(left, &right, &s), 20);
    }

    #[test]
    fn test_degenerate_pairs() {
        let s = DimerScoring::default();
        // N pairs with anything
        assert_eq!(hetero_complementarity(b"NNNNNN", b"CCCCCC", &s), 6);
    }

    #[test]
    fn test_worst_interaction() {
        let s = DimerScoring::default();
        let pool: Vec<&[u8]> = vec![b"CACCAACACA", b"TTTTTTTT"];
        let ours: Vec<&[u8]> = vec![b"AAAAAAAA"];
        assert_eq!(worst_interaction(ours.iter().copied(), pool.iter().copied(), &s), 8);
    }
}
