//! Command-line run: load inputs, design the scheme, write it out

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use primal_digest::{
    design_scheme, read_mask_bed, read_reference_fasta, write_outputs, CancelToken,
    DesignConfig, ProgressUpdate, SchemeReport, SequenceStore, ThreadCount,
};

#[derive(Parser, Debug)]
#[command(name = "primal-digest")]
#[command(about = "Design tiled multiplex PCR primer schemes")]
#[command(version)]
pub struct Cli {
    /// Reference FASTA, one or more records
    pub fasta: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON design config; missing fields take defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub amplicon_min: Option<usize>,

    #[arg(long)]
    pub amplicon_max: Option<usize>,

    /// Target overlap between neighbouring amplicons (bp)
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Number of multiplex pools
    #[arg(long)]
    pub pools: Option<usize>,

    /// Worker threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Retry the previous amplicon's alternatives when a step fails
    #[arg(long)]
    pub backtrack: bool,

    /// Close the tiling across the origin of circular references
    #[arg(long)]
    pub circular: bool,

    /// Skip the off-target priming check
    #[arg(long)]
    pub no_mispriming: bool,

    /// Stop tiling after this many seconds and write what was designed
    #[arg(long)]
    pub timeout: Option<u64>,

    /// BED file of regions primers must avoid
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Name prefix for amplicons and primers
    #[arg(long, default_value = "scheme")]
    pub prefix: String,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied
    pub fn design_config(&self) -> Result<DesignConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => DesignConfig::default(),
        };

        if let Some(v) = self.amplicon_min {
            cfg.amplicon_size_min = v;
        }
        if let Some(v) = self.amplicon_max {
            cfg.amplicon_size_max = v;
        }
        if let Some(v) = self.overlap {
            cfg.target_overlap = v;
        }
        if let Some(v) = self.pools {
            cfg.n_pools = v;
        }
        if let Some(v) = self.threads {
            cfg.thread_count = ThreadCount::Fixed(v);
        }
        if self.backtrack {
            cfg.backtrack = true;
        }
        if self.circular {
            cfg.circular = true;
        }
        if self.no_mispriming {
            cfg.mispriming_check = false;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn log_progress(update: &ProgressUpdate) {
    let percent = if update.seq_len > 0 {
        100.0 * update.position as f64 / update.seq_len as f64
    } else {
        100.0
    };
    debug!(
        seq = %update.seq_id,
        amplicons = update.amplicons,
        "{:.1}% {}",
        percent.min(100.0),
        update.message
    );
}

fn summarize(report: &SchemeReport) {
    if report.cancelled {
        warn!("design was cancelled, scheme is partial");
    }
    for pool in 0..report.scheme.n_pools {
        info!(pool = pool + 1, amplicons = report.scheme.pool(pool).count(), "pool");
    }
    for s in &report.sequences {
        info!(
            seq = %s.seq_id,
            length = s.length,
            amplicons = s.amplicons,
            covered = s.covered_bases,
            "coverage"
        );
    }
    for gap in &report.gaps {
        warn!(seq = %gap.seq_id, start = gap.start, end = gap.end, "uncovered gap");
    }
    for c in &report.pool_conflicts {
        warn!(
            seq = %c.seq_id,
            amplicon = c.amplicon,
            pool = ?c.pool,
            with = ?c.conflicts_with,
            "pool conflict left in scheme"
        );
    }
}

/// Design a scheme from the command line and write it to the output dir.
pub fn run(cli: &Cli) -> Result<SchemeReport> {
    let cfg = cli.design_config()?;

    let references = read_reference_fasta(&cli.fasta)
        .with_context(|| format!("reading reference {}", cli.fasta.display()))?;
    let masks = match &cli.mask {
        Some(path) => read_mask_bed(path)
            .with_context(|| format!("reading mask {}", path.display()))?,
        None => HashMap::new(),
    };
    let store = SequenceStore::from_references(&references, &masks)?;
    info!(
        sequences = store.len(),
        bases = store.sequences().iter().map(|s| s.len()).sum::<usize>(),
        "references loaded"
    );

    // Progress is drained on its own thread while the design runs
    let (progress_tx, progress_rx) = channel::<ProgressUpdate>();
    let logger = thread::spawn(move || {
        for update in progress_rx {
            log_progress(&update);
        }
    });

    // Watchdog cancels the run once the time limit passes
    let cancel = CancelToken::new();
    let (done_tx, done_rx) = channel::<()>();
    let watchdog = cli.timeout.map(|secs| {
        let cancel = cancel.clone();
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(Duration::from_secs(secs)) {
                warn!(seconds = secs, "time limit reached, cancelling");
                cancel.cancel();
            }
        })
    });

    let report = design_scheme(&store, &cfg, &cancel, Some(progress_tx));
    drop(done_tx);
    if logger.join().is_err() {
        warn!("progress logger panicked");
    }
    if let Some(handle) = watchdog {
        if handle.join().is_err() {
            warn!("watchdog panicked");
        }
    }
    let report = report?;

    let paths = write_outputs(&cli.output, &cli.prefix, &report)
        .with_context(|| format!("writing scheme to {}", cli.output.display()))?;
    summarize(&report);
    for path in paths {
        println!("{}", path.display());
    }

    Ok(report)
}
