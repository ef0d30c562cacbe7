//! IUPAC nucleotide alphabet, complements and bitmask helpers

use once_cell::sync::Lazy;

/// Standard DNA bases
pub const STANDARD_BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Byte -> complement byte. Unknown bytes map to themselves.
pub static COMPLEMENT: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = i as u8;
    }
    for (a, b) in [
        (b'A', b'T'),
        (b'C', b'G'),
        (b'R', b'Y'),
        (b'K', b'M'),
        (b'B', b'V'),
        (b'D', b'H'),
    ] {
        table[a as usize] = b;
        table[b as usize] = a;
    }
    // S, W and N are their own complements
    table
});

#[inline]
pub fn is_standard_base(b: u8) -> bool {
    matches!(b, b'A' | b'C' | b'G' | b'T')
}

#[inline]
pub fn is_ambiguous_base(b: u8) -> bool {
    matches!(b, b'R' | b'Y' | b'S' | b'W' | b'K' | b'M' | b'B' | b'D' | b'H' | b'V' | b'N')
}

#[inline]
pub fn is_gap(b: u8) -> bool {
    matches!(b, b'-' | b'.')
}

/// Check if a byte is a valid DNA symbol (including ambiguous)
#[inline]
pub fn is_valid_dna(b: u8) -> bool {
    is_standard_base(b) || is_ambiguous_base(b)
}

#[inline]
pub fn complement(b: u8) -> u8 {
    COMPLEMENT[b as usize]
}

/// Compute the reverse complement of a DNA sequence
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// Count symbols outside A/C/G/T
pub fn count_degenerate(seq: &[u8]) -> usize {
    seq.iter().filter(|&&b| !is_standard_base(b)).count()
}

/// Contribution of one symbol to GC content. Degenerate codes weigh one half.
#[inline]
pub fn gc_weight(b: u8) -> f64 {
    match b {
        b'G' | b'C' => 1.0,
        b'A' | b'T' => 0.0,
        _ => 0.5,
    }
}

/// Set of bases a symbol may stand for, one bit each: A=1, C=2, G=4, T=8.
/// Zero for anything outside the alphabet.
#[inline]
pub fn iupac_mask(b: u8) -> u8 {
    match b {
        b'A' => 0b0001,
        b'C' => 0b0010,
        b'G' => 0b0100,
        b'T' => 0b1000,
        b'R' => 0b0101,
        b'Y' => 0b1010,
        b'S' => 0b0110,
        b'W' => 0b1001,
        b'K' => 0b1100,
        b'M' => 0b0011,
        b'B' => 0b1110,
        b'D' => 0b1101,
        b'H' => 0b1011,
        b'V' => 0b0111,
        b'N' => 0b1111,
        _ => 0,
    }
}

/// Two symbols can denote the same base.
#[inline]
pub fn bases_overlap(a: u8, b: u8) -> bool {
    iupac_mask(a) & iupac_mask(b) != 0
}

/// Concrete bases a symbol stands for, in A, C, G, T order.
pub fn expand_base(b: u8) -> impl Iterator<Item = u8> {
    let mask = iupac_mask(b);
    STANDARD_BASES
        .into_iter()
        .enumerate()
        .filter(move |(i, _)| mask & (1 << i) != 0)
        .map(|(_, base)| base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_cover_expansions() {
        for &code in b"ACGTRYSWKMBDHVN" {
            let union = expand_base(code).fold(0u8, |m, base| m | iupac_mask(base));
            assert_eq!(union, iupac_mask(code), "{}", code as char);
        }
        assert_eq!(iupac_mask(b'X'), 0);
    }

    #[test]
    fn test_complement_matches_masks() {
        // complementing every member base must give the complement code
        for &code in b"ACGTRYSWKMBDHVN" {
            let mask = expand_base(code).fold(0u8, |m, base| m | iupac_mask(complement(base)));
            assert_eq!(mask, iupac_mask(complement(code)), "{}", code as char);
        }
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"AACGTT"), b"AACGTT".to_vec());
        assert_eq!(reverse_complement(b"ATGCR"), b"YGCAT".to_vec());
    }

    #[test]
    fn test_degenerate_and_gc() {
        assert_eq!(count_degenerate(b"ACGTNRY"), 3);
        let gc: f64 = b"GCAN".iter().map(|&b| gc_weight(b)).sum();
        assert_eq!(gc, 2.5);
    }

    #[test]
    fn test_bases_overlap() {
        assert!(bases_overlap(b'A', b'R'));
        assert!(bases_overlap(b'N', b'T'));
        assert!(!bases_overlap(b'A', b'Y'));
        assert!(!bases_overlap(b'A', b'X'));
    }

    #[test]
    fn test_expand_base() {
        assert_eq!(expand_base(b'N').collect::<Vec<_>>(), b"ACGT".to_vec());
        assert_eq!(expand_base(b'Y').collect::<Vec<_>>(), b"CT".to_vec());
        assert_eq!(expand_base(b'G').collect::<Vec<_>>(), b"G".to_vec());
    }
}
