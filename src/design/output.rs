//! Scheme files and mask input
//!
//! BED coordinates are written as stored: 0-based, end exclusive. Pools are
//! numbered from 1 in every file. The amplicon closing a circular reference
//! ends past the reference length; its primers keep their own coordinates.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::info;

use super::error::{DesignError, Result};
use super::types::{Amplicon, SchemeReport, ScoredPrimer, Strand};

pub const PRIMER_BED: &str = "primer.bed";
pub const AMPLICON_BED: &str = "amplicon.bed";
pub const PRIMER_TSV: &str = "primers.tsv";
pub const REPORT_JSON: &str = "report.json";

/// Amplicon and primer names for one scheme
#[derive(Debug, Clone)]
pub struct Naming {
    prefix: String,
    /// Put the reference id in names when more than one reference is tiled
    with_seq_id: bool,
}

impl Naming {
    pub fn new(prefix: &str, report: &SchemeReport) -> Self {
        Self {
            prefix: prefix.to_string(),
            with_seq_id: report.sequences.len() > 1,
        }
    }

    pub fn amplicon(&self, amplicon: &Amplicon) -> String {
        if self.with_seq_id {
            format!("{}_{}_{}", self.prefix, amplicon.seq_id, amplicon.number)
        } else {
            format!("{}_{}", self.prefix, amplicon.number)
        }
    }

    pub fn primer(&self, amplicon: &Amplicon, primer: &ScoredPrimer) -> String {
        let side = match primer.candidate.strand {
            Strand::Forward => "LEFT",
            Strand::Reverse => "RIGHT",
        };
        format!("{}_{}", self.amplicon(amplicon), side)
    }
}

fn pool_number(amplicon: &Amplicon) -> usize {
    amplicon.pool.map_or(0, |p| p + 1)
}

pub fn write_primer_bed<W: Write>(out: &mut W, report: &SchemeReport, naming: &Naming) -> Result<()> {
    for amplicon in &report.scheme.amplicons {
        for primer in amplicon.primers() {
            let c = &primer.candidate;
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                amplicon.seq_id,
                c.start,
                c.end(),
                naming.primer(amplicon, primer),
                pool_number(amplicon),
                c.strand.symbol(),
                c.sequence
            )?;
        }
    }
    Ok(())
}

pub fn write_amplicon_bed<W: Write>(
    out: &mut W,
    report: &SchemeReport,
    naming: &Naming,
) -> Result<()> {
    for amplicon in &report.scheme.amplicons {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            amplicon.seq_id,
            amplicon.start(),
            amplicon.end(),
            naming.amplicon(amplicon),
            pool_number(amplicon)
        )?;
    }
    Ok(())
}

pub fn write_primer_tsv<W: Write>(out: &mut W, report: &SchemeReport, naming: &Naming) -> Result<()> {
    writeln!(out, "name\tseq\tpool")?;
    for amplicon in &report.scheme.amplicons {
        for primer in amplicon.primers() {
            writeln!(
                out,
                "{}\t{}\t{}",
                naming.primer(amplicon, primer),
                primer.candidate.sequence,
                pool_number(amplicon)
            )?;
        }
    }
    Ok(())
}

fn write_file<F>(dir: &Path, name: &str, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let path = dir.join(name);
    let mut out = BufWriter::new(File::create(&path)?);
    write(&mut out)?;
    out.flush()?;
    Ok(path)
}

/// Write all scheme files into `dir`, creating it if needed.
pub fn write_outputs(dir: &Path, prefix: &str, report: &SchemeReport) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let naming = Naming::new(prefix, report);

    let paths = vec![
        write_file(dir, PRIMER_BED, |out| write_primer_bed(out, report, &naming))?,
        write_file(dir, AMPLICON_BED, |out| write_amplicon_bed(out, report, &naming))?,
        write_file(dir, PRIMER_TSV, |out| write_primer_tsv(out, report, &naming))?,
        write_file(dir, REPORT_JSON, |out| {
            serde_json::to_writer_pretty(&mut *out, report)?;
            Ok(())
        })?,
    ];

    info!(dir = %dir.display(), files = paths.len(), "scheme written");
    Ok(paths)
}

/// Parse BED intervals to exclude from primer design, keyed by chrom.
/// Header lines (`#`, `track`, `browser`) are skipped.
pub fn parse_mask_bed(text: &str) -> Result<HashMap<String, Vec<Range<usize>>>> {
    let mut masks: HashMap<String, Vec<Range<usize>>> = HashMap::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with("track")
            || line.starts_with("browser")
        {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(DesignError::InvalidBed {
                line: i + 1,
                reason: format!("expected at least 3 fields, found {}", fields.len()),
            });
        }
        let coord = |s: &str| {
            s.trim().parse::<usize>().map_err(|e| DesignError::InvalidBed {
                line: i + 1,
                reason: format!("bad coordinate '{}': {}", s, e),
            })
        };
        let start = coord(fields[1])?;
        let end = coord(fields[2])?;
        if end < start {
            return Err(DesignError::InvalidBed {
                line: i + 1,
                reason: format!("end {} before start {}", end, start),
            });
        }
        masks.entry(fields[0].to_string()).or_default().push(start..end);
    }

    Ok(masks)
}

pub fn read_mask_bed(path: &Path) -> Result<HashMap<String, Vec<Range<usize>>>> {
    let text = std::fs::read_to_string(path)?;
    parse_mask_bed(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::scheme::design_scheme;
    use crate::design::store::SequenceStore;
    use crate::design::tiler::tests::{scenario_config, synthetic};
    use crate::design::tiler::CancelToken;

    fn report() -> SchemeReport {
        let mut store = SequenceStore::new();
        store.load("ref", &synthetic(900, 41)).unwrap();
        design_scheme(&store, &scenario_config(), &CancelToken::new(), None).unwrap()
    }

    #[test]
    fn test_primer_bed_rows() {
        let report = report();
        let naming = Naming::new("scheme", &report);
        let mut buf = Vec::new();
        write_primer_bed(&mut buf, &report, &naming).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2 * report.scheme.amplicons.len());

        let first: Vec<&str> = lines[0].split('\t').collect();
        let a = &report.scheme.amplicons[0];
        assert_eq!(first[0], "ref");
        assert_eq!(first[1], a.left.candidate.start.to_string());
        assert_eq!(first[3], "scheme_1_LEFT");
        assert_eq!(first[4], "1");
        assert_eq!(first[5], "+");
        assert_eq!(first[6], a.left.candidate.sequence);

        let second: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(second[3], "scheme_1_RIGHT");
        assert_eq!(second[5], "-");
    }

    #[test]
    fn test_write_outputs() {
        let report = report();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let paths = write_outputs(&out, "scheme", &report).unwrap();
        assert_eq!(paths.len(), 4);

        let tsv = std::fs::read_to_string(out.join(PRIMER_TSV)).unwrap();
        assert!(tsv.starts_with("name\tseq\tpool\n"));
        assert_eq!(tsv.lines().count(), 1 + 2 * report.scheme.amplicons.len());

        let bed = std::fs::read_to_string(out.join(AMPLICON_BED)).unwrap();
        let second: Vec<&str> = bed.lines().nth(1).unwrap().split('\t').collect();
        assert_eq!(second[3], "scheme_2");
        assert_eq!(second[4], "2");

        let json = std::fs::read_to_string(out.join(REPORT_JSON)).unwrap();
        let back: SchemeReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scheme.amplicons, report.scheme.amplicons);
    }

    #[test]
    fn test_names_carry_seq_id_for_panels() {
        let mut store = SequenceStore::new();
        store.load("a", &synthetic(600, 1)).unwrap();
        store.load("b", &synthetic(600, 2)).unwrap();
        let report = design_scheme(&store, &scenario_config(), &CancelToken::new(), None).unwrap();
        let naming = Naming::new("p", &report);
        let a = &report.scheme.amplicons[0];
        assert_eq!(naming.primer(a, &a.right), "p_a_1_RIGHT");
    }

    #[test]
    fn test_parse_mask_bed() {
        let text = "track name=mask\n# comment\nchr1\t10\t20\tlow\nchr1\t50\t60\nchr2\t0\t5\n";
        let masks = parse_mask_bed(text).unwrap();
        assert_eq!(masks["chr1"], vec![10..20, 50..60]);
        assert_eq!(masks["chr2"], vec![0..5]);

        assert!(matches!(
            parse_mask_bed("chr1\t10\n"),
            Err(DesignError::InvalidBed { line: 1, .. })
        ));
        assert!(matches!(
            parse_mask_bed("chr1\t1\t2\nchr1\tx\t5\n"),
            Err(DesignError::InvalidBed { line: 2, .. })
        ));
        assert!(parse_mask_bed("chr1\t9\t5\n").is_err());
    }

    #[test]
    fn test_wrapping_amplicon_row() {
        let mut cfg = scenario_config();
        cfg.circular = true;
        let mut store = SequenceStore::new();
        store.load("ring", &synthetic(1000, 19)).unwrap();
        let report = design_scheme(&store, &cfg, &CancelToken::new(), None).unwrap();
        let naming = Naming::new("scheme", &report);

        let mut buf = Vec::new();
        write_amplicon_bed(&mut buf, &report, &naming).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let last: Vec<&str> = text.lines().last().unwrap().split('\t').collect();
        let closing = report.scheme.amplicons.last().unwrap();
        assert!(closing.wraps());
        assert_eq!(last[1], closing.left.candidate.start.to_string());
        assert_eq!(last[2], (closing.right.candidate.end() + 1000).to_string());

        let mut buf = Vec::new();
        write_primer_bed(&mut buf, &report, &naming).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let right: Vec<&str> = text.lines().last().unwrap().split('\t').collect();
        assert_eq!(right[1], closing.right.candidate.start.to_string());
        assert!(right[2].parse::<usize>().unwrap() <= 1000);
    }
}
