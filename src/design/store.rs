//! Read-only store of reference sequences

use std::collections::HashMap;
use std::ops::Range;

use super::error::{DesignError, Result};
use super::fasta::ReferenceData;
use super::iupac::is_valid_dna;

/// One reference: id, IUPAC symbols and excluded intervals
#[derive(Debug, Clone)]
pub struct Sequence {
    id: String,
    bases: Vec<u8>,
    masked: Vec<Range<usize>>,
}

impl Sequence {
    /// Validate and uppercase a raw sequence. Degenerate codes are kept as-is.
    pub fn new(id: &str, raw: &str) -> Result<Self> {
        let bases: Vec<u8> = raw
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .map(|b| b.to_ascii_uppercase())
            .collect();

        if bases.is_empty() {
            return Err(DesignError::InvalidSequence {
                id: id.to_string(),
                reason: "sequence is empty".to_string(),
            });
        }
        if let Some(pos) = bases.iter().position(|&b| !is_valid_dna(b)) {
            return Err(DesignError::InvalidSequence {
                id: id.to_string(),
                reason: format!("invalid symbol '{}' at offset {}", bases[pos] as char, pos),
            });
        }

        Ok(Self {
            id: id.to_string(),
            bases,
            masked: Vec::new(),
        })
    }

    /// Attach excluded intervals; they are clipped, sorted and merged.
    pub fn with_mask(mut self, mut mask: Vec<Range<usize>>) -> Self {
        let len = self.bases.len();
        mask.retain(|r| r.start < r.end && r.start < len);
        for r in mask.iter_mut() {
            r.end = r.end.min(len);
        }
        mask.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(mask.len());
        for r in mask {
            match merged.last_mut() {
                Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
                _ => merged.push(r),
            }
        }
        self.masked = merged;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn masked(&self) -> &[Range<usize>] {
        &self.masked
    }

    /// Symbols in `[start, end)`
    pub fn slice(&self, start: usize, end: usize) -> Result<&[u8]> {
        if start > end || end > self.bases.len() {
            return Err(DesignError::OutOfRange {
                id: self.id.clone(),
                start,
                end,
                len: self.bases.len(),
            });
        }
        Ok(&self.bases[start..end])
    }

    /// True if `[start, end)` touches an excluded interval
    pub fn is_masked(&self, start: usize, end: usize) -> bool {
        self.masked.iter().any(|r| r.start < end && start < r.end)
    }

    /// First position at or after `pos` not inside an excluded interval
    pub fn first_unmasked(&self, pos: usize) -> usize {
        let mut pos = pos;
        for r in &self.masked {
            if r.contains(&pos) {
                pos = r.end;
            }
        }
        pos
    }
}

/// All references of a run, in load order
#[derive(Debug, Clone, Default)]
pub struct SequenceStore {
    sequences: Vec<Sequence>,
    index: HashMap<String, usize>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from parsed FASTA records, attaching masks by id.
    pub fn from_references(
        data: &ReferenceData,
        masks: &HashMap<String, Vec<Range<usize>>>,
    ) -> Result<Self> {
        let mut store = Self::new();
        for (name, seq) in data.iter() {
            let mask = masks.get(name).cloned().unwrap_or_default();
            store.insert(Sequence::new(name, seq)?.with_mask(mask))?;
        }
        Ok(store)
    }

    pub fn load(&mut self, id: &str, raw: &str) -> Result<&Sequence> {
        self.insert(Sequence::new(id, raw)?)
    }

    pub fn insert(&mut self, sequence: Sequence) -> Result<&Sequence> {
        if self.index.contains_key(sequence.id()) {
            return Err(DesignError::InvalidSequence {
                id: sequence.id().to_string(),
                reason: "duplicate sequence id".to_string(),
            });
        }
        let idx = self.sequences.len();
        self.index.insert(sequence.id().to_string(), idx);
        self.sequences.push(sequence);
        Ok(&self.sequences[idx])
    }

    pub fn get(&self, id: &str) -> Result<&Sequence> {
        self.index
            .get(id)
            .map(|&i| &self.sequences[i])
            .ok_or_else(|| DesignError::UnknownSequence(id.to_string()))
    }

    pub fn slice(&self, id: &str, start: usize, end: usize) -> Result<&[u8]> {
        self.get(id)?.slice(start, end)
    }

    pub fn length(&self, id: &str) -> Result<usize> {
        Ok(self.get(id)?.len())
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_slice() {
        let mut store = SequenceStore::new();
        store.load("chr1", "acgtNNRYacgt").unwrap();
        assert_eq!(store.length("chr1").unwrap(), 12);
        assert_eq!(store.slice("chr1", 4, 8).unwrap(), b"NNRY");
        assert_eq!(store.slice("chr1", 12, 12).unwrap(), b"");
    }

    #[test]
    fn test_slice_out_of_range() {
        let mut store = SequenceStore::new();
        store.load("chr1", "ACGT").unwrap();
        assert!(matches!(
            store.slice("chr1", 2, 5),
            Err(DesignError::OutOfRange { len: 4, .. })
        ));
        assert!(matches!(store.slice("chr2", 0, 1), Err(DesignError::UnknownSequence(_))));
    }

    #[test]
    fn test_invalid_sequences() {
        let mut store = SequenceStore::new();
        assert!(matches!(store.load("e", ""), Err(DesignError::InvalidSequence { .. })));
        assert!(matches!(store.load("x", "ACGZ"), Err(DesignError::InvalidSequence { .. })));
        store.load("a", "ACGT").unwrap();
        assert!(store.load("a", "ACGT").is_err());
    }

    #[test]
    fn test_mask_merge_and_lookup() {
        let seq = Sequence::new("s", "ACGTACGTACGTACGTACGT")
            .unwrap()
            .with_mask(vec![5..8, 0..3, 2..4, 18..40]);
        assert_eq!(seq.masked(), &[0..4, 5..8, 18..20]);
        assert!(seq.is_masked(3, 5));
        assert!(!seq.is_masked(8, 18));
        assert_eq!(seq.first_unmasked(0), 4);
        assert_eq!(seq.first_unmasked(6), 8);
        assert_eq!(seq.first_unmasked(10), 10);
    }
}
