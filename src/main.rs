//! The `shoal` command line.
//!
//! `align` prints hit lines for every reference contig; `assess` prints an
//! error profile over a read sample. Hit lines and `#` headers go to
//! stdout, everything diagnostic goes to stderr through `tracing`.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shoal::assess::{self, DirectedSink};
use shoal::nuc::Nuc;
use shoal::scan::{ReadBatch, ScanError, ScanSettings};
use shoal::{cache, fasta};

#[derive(Parser)]
#[command(name = "shoal", version, about = "Bit-parallel short-read aligner")]
struct Cli {
    /// Worker threads used per reference contig.
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Align reads against every contig of a reference.
    Align {
        /// Total edit budget per hit.
        max_errors: u32,
        /// Cost of one indel; substitutions always cost 1.
        indel_cost: u32,
        /// Reference FASTA file.
        reference: PathBuf,
        /// Read FASTA files.
        #[arg(required = true)]
        reads: Vec<PathBuf>,
    },
    /// Profile alignment errors over a random read sample.
    Assess {
        /// Number of reads to sample.
        sample_size: usize,
        /// Total edit budget per hit.
        max_errors: u32,
        /// Reference FASTA file.
        reference: PathBuf,
        /// Read FASTA files.
        #[arg(required = true)]
        reads: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Align { max_errors, indel_cost, reference, reads } => {
            align(cli.jobs, max_errors, indel_cost, &reference, &reads)
        }
        Command::Assess { sample_size, max_errors, reference, reads } => {
            let report =
                assess::run(&cache::default_root(), sample_size, max_errors, &reference, &reads)?;
            print!("{}", report);
            Ok(())
        }
    }
}

fn align(
    jobs: usize,
    max_errors: u32,
    indel_cost: u32,
    reference: &Path,
    read_files: &[PathBuf],
) -> Result<()> {
    if indel_cost == 0 {
        bail!("the indel cost must be at least 1");
    }

    let mut reads = Vec::new();
    for path in read_files {
        reads.extend(
            fasta::read_file(path).with_context(|| format!("reading {}", path.display()))?,
        );
    }
    info!(reads = reads.len(), files = read_files.len(), "loaded reads");
    let batches = ReadBatch::partition(reads);

    let contigs = fasta::read_file(reference)
        .with_context(|| format!("reading {}", reference.display()))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    writeln!(out, "#Max errors: {}", max_errors)?;
    writeln!(out, "#Indel cost: {}", indel_cost)?;

    for (name, contig) in &contigs {
        writeln!(out, "#Reference: {}", name)?;
        info!(reference = name.as_str(), length = contig.len(), "aligning");

        if jobs <= 1 || batches.len() <= 1 {
            let settings = ScanSettings::new(max_errors, indel_cost);
            for batch in &batches {
                scan_batch(&settings, contig, batch, &mut out)?;
            }
        } else {
            // farm contiguous runs of batches out to workers and splice
            // their buffers back together in order
            let per_worker = (batches.len() + jobs - 1) / jobs;
            let buffers = thread::scope(|scope| {
                let mut workers = Vec::new();
                for chunk in batches.chunks(per_worker) {
                    workers.push(scope.spawn(move || -> Result<Vec<u8>, ScanError> {
                        let settings = ScanSettings::new(max_errors, indel_cost);
                        let mut buf = Vec::new();
                        for batch in chunk {
                            scan_batch(&settings, contig, batch, &mut buf)?;
                        }
                        Ok(buf)
                    }));
                }
                workers
                    .into_iter()
                    .map(|worker| worker.join().expect("alignment worker panicked"))
                    .collect::<Result<Vec<_>, ScanError>>()
            })?;
            for buffer in buffers {
                out.write_all(&buffer)?;
            }
        }
        out.flush()?;
    }
    Ok(())
}

/// Scan one batch in both orientations, writing directed hit lines.
fn scan_batch<W: Write>(
    settings: &ScanSettings,
    contig: &[Nuc],
    batch: &ReadBatch,
    out: &mut W,
) -> Result<(), ScanError> {
    let mut sink = DirectedSink { direction: "fwd", out: &mut *out };
    settings.scan(contig, batch, &mut sink)?;
    let mut sink = DirectedSink { direction: "rev", out: &mut *out };
    settings.scan(contig, &batch.reverse_complement(), &mut sink)
}
