//! FASTA parsing for reference genomes

use std::path::Path;

use super::error::{DesignError, Result};
use super::iupac::{is_gap, is_valid_dna};

/// Parsed reference sequences, in file order
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub sequences: Vec<String>,
    pub names: Vec<String>,
}

impl ReferenceData {
    pub fn new() -> Self {
        Self {
            sequences: Vec::new(),
            names: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.sequences.iter().map(String::as_str))
    }
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and parse a multi-record FASTA file.
pub fn read_reference_fasta(path: &Path) -> Result<ReferenceData> {
    let text = std::fs::read_to_string(path)?;
    parse_reference_fasta(&text)
}

/// Parse multi-sequence FASTA as reference set.
///
/// Bases are uppercased and alignment gaps dropped, so an aligned FASTA
/// yields the ungapped genomes. Symbols outside the IUPAC alphabet are
/// rejected with their 1-based position in the record.
pub fn parse_reference_fasta(text: &str) -> Result<ReferenceData> {
    let mut data = ReferenceData::new();
    let mut current_name: Option<String> = None;
    let mut current_seq = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            if let Some(name) = current_name.take() {
                push_record(&mut data, name, &mut current_seq)?;
            }
            // The id is the first word of the header line
            let name = header
                .split_whitespace()
                .next()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Sequence_{}", data.len() + 1));
            current_name = Some(name);
        } else {
            let name = current_name
                .get_or_insert_with(|| format!("Sequence_{}", data.len() + 1))
                .clone();
            for c in line.bytes() {
                let c = c.to_ascii_uppercase();
                if is_gap(c) || c.is_ascii_whitespace() {
                    continue;
                }
                if c == b'U' {
                    current_seq.push('T');
                } else if is_valid_dna(c) {
                    current_seq.push(c as char);
                } else {
                    return Err(DesignError::InvalidSequence {
                        id: name,
                        reason: format!(
                            "invalid character '{}' at position {}",
                            c as char,
                            current_seq.len() + 1
                        ),
                    });
                }
            }
        }
    }

    if let Some(name) = current_name {
        push_record(&mut data, name, &mut current_seq)?;
    }

    if data.is_empty() {
        return Err(DesignError::InvalidSequence {
            id: String::new(),
            reason: "no sequences found in reference input".to_string(),
        });
    }

    Ok(data)
}

fn push_record(data: &mut ReferenceData, name: String, seq: &mut String) -> Result<()> {
    if seq.is_empty() {
        return Err(DesignError::InvalidSequence {
            id: name,
            reason: "record is empty".to_string(),
        });
    }
    data.names.push(name);
    data.sequences.push(std::mem::take(seq));
    Ok(())
}
