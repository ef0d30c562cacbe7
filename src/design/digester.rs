//! Candidate primer enumeration
//!
//! A digest is anchored at the primer's 5' end: forward candidates read
//! rightwards from the anchor, reverse candidates are the reverse complement
//! of the window ending at the anchor. One candidate per allowed length.

use std::ops::{Range, RangeInclusive};

use super::error::{DesignError, Result};
use super::iupac::reverse_complement;
use super::store::Sequence;
use super::types::{DesignConfig, PrimerCandidate, Strand};

/// Lazy candidates at one anchor. Pure: cloning restarts it.
#[derive(Debug, Clone)]
pub struct Digest<'a> {
    sequence: &'a Sequence,
    position: usize,
    strand: Strand,
    lengths: RangeInclusive<usize>,
}

impl Iterator for Digest<'_> {
    type Item = Result<PrimerCandidate>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let len = self.lengths.next()?;
            match window(self.sequence, self.position, len, self.strand) {
                Ok(Some(candidate)) => return Some(Ok(candidate)),
                // masked window, try the next length
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

pub fn candidates_at<'a>(
    sequence: &'a Sequence,
    position: usize,
    strand: Strand,
    cfg: &DesignConfig,
) -> Digest<'a> {
    Digest {
        sequence,
        position,
        strand,
        lengths: cfg.primer_lengths(),
    }
}

/// All in-bounds candidates for a run of anchors, in anchor then length order.
pub fn digest_anchors(
    sequence: &Sequence,
    anchors: Range<usize>,
    strand: Strand,
    cfg: &DesignConfig,
) -> Vec<PrimerCandidate> {
    anchors
        .flat_map(|p| candidates_at(sequence, p, strand, cfg))
        .filter_map(|c| c.ok())
        .collect()
}

fn window(
    sequence: &Sequence,
    position: usize,
    len: usize,
    strand: Strand,
) -> Result<Option<PrimerCandidate>> {
    let (start, end) = match strand {
        Strand::Forward => (position, position.saturating_add(len)),
        Strand::Reverse => match position.checked_sub(len) {
            Some(start) => (start, position),
            None => {
                return Err(DesignError::OutOfRange {
                    id: sequence.id().to_string(),
                    start: 0,
                    end: position,
                    len: sequence.len(),
                })
            }
        },
    };

    let bases = sequence.slice(start, end)?;
    if sequence.is_masked(start, end) {
        return Ok(None);
    }

    let oligo = match strand {
        Strand::Forward => String::from_utf8_lossy(bases).into_owned(),
        Strand::Reverse => String::from_utf8_lossy(&reverse_complement(bases)).into_owned(),
    };

    Ok(Some(PrimerCandidate {
        seq_id: sequence.id().to_string(),
        start,
        len,
        strand,
        sequence: oligo,
    }))
}
