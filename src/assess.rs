//! Alignment quality assessment over a read sample.
//!
//! Takes a random sample of reads, aligns it against the reference with
//! the ordinary driver, and reports where in the reads the errors sit:
//! per-position SNP and indel counts, an error histogram, and how many
//! sampled reads hit nothing or had no clear best hit. Both the sample
//! and its alignment are cached by file signature, so repeated runs over
//! unchanged inputs only pay for the bookkeeping.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use culpa::{throw, throws};
use rand::Rng;
use thiserror::Error;
use tracing::info;

use crate::cache::{self, CacheKey};
use crate::fasta;
use crate::scan::{HitRecord, HitSink, ReadBatch, ScanError, ScanSettings};

/// Errors of an assessment run.
#[derive(Error, Debug)]
pub enum AssessError {
    #[error("error reading or writing assessment files")]
    Io(#[from] io::Error),
    #[error("bad sequence input")]
    Fasta(#[from] fasta::FastaError),
    #[error("alignment failed")]
    Scan(#[from] ScanError),
    #[error("malformed hit line in cached alignment: {line:?}")]
    MalformedHit { line: String },
}
type Error = AssessError; // do it this way for better docs

/// Writes hit lines with an orientation column after the read name:
/// `<name> <fwd|rev> <n_errors> <start>..<end> <read_ali> <ref_ali>`.
///
/// This is the line format the assessment parses back, and the format the
/// CLI prints.
pub struct DirectedSink<W: Write> {
    pub direction: &'static str,
    pub out: W,
}

impl<W: Write> HitSink for DirectedSink<W> {
    #[throws(io::Error)]
    fn accept(&mut self, hit: &HitRecord<'_>) {
        writeln!(
            self.out,
            "{} {} {} {}..{} {} {}",
            hit.name, self.direction, hit.n_errors, hit.start, hit.end, hit.read_ali, hit.ref_ali
        )?;
    }
}

/// What the assessment found.
pub struct Report {
    pub sampled: usize,
    pub ambiguous: usize,
    pub unhit: usize,
    /// Hits per error count, indexed by `n_errors`.
    pub error_count: Vec<usize>,
    /// Substitutions per read position (forward orientation).
    pub snp_pos: Vec<usize>,
    /// Indels per read position (forward orientation).
    pub indel_pos: Vec<usize>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error profile")?;
        for (pos, (snps, indels)) in self.snp_pos.iter().zip(&self.indel_pos).enumerate() {
            writeln!(f, "pos={:5} snps={:5} indels={:5}", pos + 1, snps, indels)?;
        }
        writeln!(f)?;
        writeln!(f, "Sampled {} reads", self.sampled)?;
        writeln!(f, "{} had no clear best hit", self.ambiguous)?;
        writeln!(f, "{} hit nothing", self.unhit)?;
        for (errors, count) in self.error_count.iter().enumerate() {
            writeln!(f, "{:3} errors: {}", errors, count)?;
        }
        Ok(())
    }
}

/// Sample `sample_size` reads, align them, and build the report.
///
/// The alignment runs with an indel cost of 1, the cheapest model, so the
/// profile never misses a gapped hit a substitution-only pass would.
#[throws]
pub fn run(
    cache_root: &Path,
    sample_size: usize,
    max_errors: u32,
    reference: &Path,
    read_files: &[PathBuf],
) -> Report {
    let sample = sample(cache_root, sample_size, read_files)?;
    let hits = align_sample(cache_root, max_errors, reference, &sample)?;
    report(max_errors, &sample, &hits)?
}

/// Reservoir-sample reads out of `read_files` into a cached FASTA file.
#[throws]
fn sample(cache_root: &Path, sample_size: usize, read_files: &[PathBuf]) -> PathBuf {
    let mut key = CacheKey::new("assess-sample").number(sample_size as u64);
    for path in read_files {
        key = key.file(&cache::file_signature(path)?);
    }

    let entry = cache::get::<Error, _>(cache_root, &key, |dir| {
        info!("sampling {} reads", sample_size);
        let mut rng = rand::thread_rng();
        let mut samples = Vec::with_capacity(sample_size);
        let mut seen = 0usize;
        for path in read_files {
            for record in fasta::read_file(path)? {
                seen += 1;
                if samples.len() < sample_size {
                    samples.push(record);
                } else if rng.gen_range(0..seen) < sample_size {
                    let slot = rng.gen_range(0..sample_size);
                    samples[slot] = record;
                }
            }
        }
        let mut out = BufWriter::new(File::create(dir.join("sample.fna"))?);
        fasta::write(&mut out, &samples)?;
        Ok(())
    })?;
    entry.join("sample.fna")
}

/// Align the sample against every reference contig, both orientations,
/// into a cached hit file.
#[throws]
fn align_sample(cache_root: &Path, max_errors: u32, reference: &Path, sample: &Path) -> PathBuf {
    let key = CacheKey::new("assess-align")
        .file(&cache::file_signature(reference)?)
        .file(&cache::file_signature(sample)?)
        .number(u64::from(max_errors));

    let entry = cache::get::<Error, _>(cache_root, &key, |dir| {
        info!("aligning the sample");
        let contigs = fasta::read_file(reference)?;
        let batches = ReadBatch::partition(fasta::read_file(sample)?);
        let settings = ScanSettings::new(max_errors, 1);

        let mut out = BufWriter::new(File::create(dir.join("hits.myr"))?);
        writeln!(out, "#Max errors: {}", max_errors)?;
        writeln!(out, "#Indel cost: 1")?;
        for (name, contig) in &contigs {
            writeln!(out, "#Reference: {}", name)?;
            for batch in &batches {
                let mut sink = DirectedSink { direction: "fwd", out: &mut out };
                settings.scan(contig, batch, &mut sink)?;
                let mut sink = DirectedSink { direction: "rev", out: &mut out };
                settings.scan(contig, &batch.reverse_complement(), &mut sink)?;
            }
        }
        out.flush()?;
        Ok(())
    })?;
    entry.join("hits.myr")
}

#[throws]
fn report(max_errors: u32, sample: &Path, hit_file: &Path) -> Report {
    // every sampled read gets a hit list, empty or not
    let mut hits: BTreeMap<String, Vec<(u32, bool, String, String)>> = BTreeMap::new();
    let mut max_len = 0;
    for (name, seq) in fasta::read_file(sample)? {
        max_len = max_len.max(seq.len());
        hits.entry(name).or_default();
    }

    for line in BufReader::new(File::open(hit_file)?).lines() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let parsed = match fields.as_slice() {
            [name, direction, n_errors, _span, read_ali, ref_ali] => n_errors
                .parse::<u32>()
                .ok()
                .map(|n| (*name, n, *direction == "fwd", *read_ali, *ref_ali)),
            _ => None,
        };
        let (name, n_errors, forward, read_ali, ref_ali) = match parsed {
            Some(parsed) => parsed,
            None => throw!(Error::MalformedHit { line }),
        };
        if let Some(list) = hits.get_mut(name) {
            list.push((n_errors, forward, read_ali.to_string(), ref_ali.to_string()));
        }
    }

    let mut out = Report {
        sampled: hits.len(),
        ambiguous: 0,
        unhit: 0,
        error_count: vec![0; max_errors as usize + 1],
        snp_pos: vec![0; max_len],
        indel_pos: vec![0; max_len],
    };

    for list in hits.values_mut() {
        list.sort();
        let best = match list.first() {
            Some(best) => best,
            None => {
                out.unhit += 1;
                continue;
            }
        };
        // a clear best hit needs a margin of at least two errors
        if list.len() > 1 && best.0 + 2 > list[1].0 {
            out.ambiguous += 1;
            continue;
        }
        out.error_count[best.0 as usize] += 1;

        let (_, forward, read_ali, ref_ali) = best;
        let (read_ali, ref_ali) = if *forward {
            (read_ali.clone(), ref_ali.clone())
        } else {
            // flip back so positions index the original read
            (read_ali.chars().rev().collect(), ref_ali.chars().rev().collect())
        };

        let mut read_pos = 0usize;
        for (r, c) in read_ali.chars().zip(ref_ali.chars()) {
            if r == '-' || c == '-' {
                out.indel_pos[read_pos] += 1;
            } else if r != c {
                out.snp_pos[read_pos] += 1;
            }
            if r != '-' {
                read_pos += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn profile_counts_errors_per_read_position() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.fna");
        let reads = dir.path().join("reads.fna");
        fs::write(&reference, b">chr\nTTTTACGGTCATTTTT\n").unwrap();
        // r1 exact, r2 one substitution at read position 4 (1-based)
        fs::write(&reads, b">r1\nACGGTCAT\n>r2\nACGATCAT\n").unwrap();

        let report = run(
            &dir.path().join("cache"),
            10,
            2,
            &reference,
            &[reads],
        )
        .unwrap();

        assert_eq!(report.sampled, 2);
        assert_eq!(report.unhit, 0);
        assert_eq!(report.ambiguous, 0);
        assert_eq!(report.error_count, vec![1, 1, 0]);
        assert_eq!(report.snp_pos.len(), 8);
        assert_eq!(report.snp_pos[3], 1);
        assert_eq!(report.snp_pos.iter().sum::<usize>(), 1);
        assert_eq!(report.indel_pos, vec![0; 8]);
    }

    #[test]
    fn rerun_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.fna");
        let reads = dir.path().join("reads.fna");
        fs::write(&reference, b">chr\nACGTACGT\n").unwrap();
        fs::write(&reads, b">r1\nCGTA\n").unwrap();

        let cache_root = dir.path().join("cache");
        let first = run(&cache_root, 5, 1, &reference, &[reads.clone()]).unwrap();
        let second = run(&cache_root, 5, 1, &reference, &[reads]).unwrap();
        assert_eq!(first.sampled, second.sampled);
        assert_eq!(first.error_count, second.error_count);
    }

    #[test]
    fn report_lists_every_error_bucket() {
        let report = Report {
            sampled: 3,
            ambiguous: 1,
            unhit: 1,
            error_count: vec![1, 0, 0],
            snp_pos: vec![0, 1],
            indel_pos: vec![0, 0],
        };
        let text = report.to_string();
        assert!(text.contains("Error profile"));
        assert!(text.contains("pos=    2 snps=    1 indels=    0"));
        assert!(text.contains("Sampled 3 reads"));
        assert!(text.contains("  0 errors: 1"));
        assert!(text.contains("  2 errors: 0"));
    }
}
