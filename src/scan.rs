//! The scan driver.
//!
//! One [`ScanSettings::scan`] call runs one read batch over one reference:
//! per reference nucleotide it advances the matcher, harvests terminal-row
//! candidates, lets the dominance window settle, and hands every surviving
//! hit to the band-limited aligner before the sink sees it. The two
//! frontier buffers and the nucleotide mask are the only allocations and
//! live for exactly one call.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::mem;

use culpa::{throw, throws};
use thiserror::Error;
use tracing::debug;

use crate::banded;
use crate::filter::{DominanceFilter, Hit};
use crate::matcher::{advance, Frontier, NucMask};
use crate::nuc::{self, Nuc};
use crate::pack::{lane_bit, Word, WORD_BITS};

/// Errors of a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("all reads in a batch must share one length: read {name:?} has length {found}, the batch has length {expected}")]
    ReadLength {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("read {name:?} ending at reference position {ref_pos}: reconstruction cost {reconstructed} disagrees with the predicted {predicted} errors. This is a bug in the matcher or the aligner, not in your input.")]
    PredictionMismatch {
        name: String,
        ref_pos: usize,
        predicted: u32,
        reconstructed: u32,
    },
    #[error("error writing to the hit sink")]
    Sink(#[from] io::Error),
}
type Error = ScanError; // do it this way for better docs

/// Largest batch [`ReadBatch::partition`] will produce. Keeps the packed
/// matrices of one scan within a few megabytes.
pub const MAX_BATCH_READS: usize = 8192;

/// A fixed-length read batch: the unit the matcher works on.
pub struct ReadBatch {
    read_len: usize,
    names: Vec<String>,
    seqs: Vec<Vec<Nuc>>,
}

impl ReadBatch {
    /// Build a batch from `(name, sequence)` pairs.
    ///
    /// Every sequence must have the same length; mixed-length input is
    /// refused here, before any matcher state exists.
    #[throws]
    pub fn new(reads: Vec<(String, Vec<Nuc>)>) -> ReadBatch {
        let read_len = reads.first().map(|(_, seq)| seq.len()).unwrap_or(0);
        for (name, seq) in &reads {
            if seq.len() != read_len {
                throw!(Error::ReadLength {
                    name: name.clone(),
                    expected: read_len,
                    found: seq.len(),
                });
            }
        }
        let (names, seqs) = reads.into_iter().unzip();
        ReadBatch { read_len, names, seqs }
    }

    /// Group arbitrary reads into scannable batches: one run of batches
    /// per read length, split at [`MAX_BATCH_READS`].
    pub fn partition(reads: Vec<(String, Vec<Nuc>)>) -> Vec<ReadBatch> {
        let mut by_len: BTreeMap<usize, Vec<(String, Vec<Nuc>)>> = BTreeMap::new();
        for read in reads {
            by_len.entry(read.1.len()).or_default().push(read);
        }

        let mut batches = Vec::new();
        for (_, mut group) in by_len {
            while group.len() > MAX_BATCH_READS {
                let rest = group.split_off(MAX_BATCH_READS);
                batches.push(ReadBatch::new(group).expect("grouped by length"));
                group = rest;
            }
            batches.push(ReadBatch::new(group).expect("grouped by length"));
        }
        batches
    }

    /// The same reads in the opposite orientation, names shared.
    pub fn reverse_complement(&self) -> ReadBatch {
        ReadBatch {
            read_len: self.read_len,
            names: self.names.clone(),
            seqs: self.seqs.iter().map(|seq| nuc::reverse_complement(seq)).collect(),
        }
    }

    /// Number of reads.
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// The shared read length.
    pub fn read_len(&self) -> usize {
        self.read_len
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn seqs(&self) -> &[Vec<Nuc>] {
        &self.seqs
    }
}

/// One accepted, reconstructed hit, as handed to the sink.
///
/// `Display` renders the canonical hit line:
/// `<name> <n_errors> <start>..<end> <read_alignment> <ref_alignment>`,
/// with a 1-based inclusive reference span.
#[derive(Debug)]
pub struct HitRecord<'a> {
    pub name: &'a str,
    pub n_errors: u32,
    /// Zero or negative when the alignment overhangs the reference start.
    pub start: i64,
    pub end: usize,
    pub read_ali: String,
    pub ref_ali: String,
}

impl fmt::Display for HitRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}..{} {} {}",
            self.name, self.n_errors, self.start, self.end, self.read_ali, self.ref_ali
        )
    }
}

/// Where accepted hits go. Failure aborts the scan; nothing retries.
pub trait HitSink {
    fn accept(&mut self, hit: &HitRecord<'_>) -> Result<(), io::Error>;
}

/// Writes one canonical hit line per hit.
pub struct LineSink<W: Write>(pub W);

impl<W: Write> HitSink for LineSink<W> {
    #[throws(io::Error)]
    fn accept(&mut self, hit: &HitRecord<'_>) {
        writeln!(self.0, "{}", hit)?;
    }
}

/// Collects rendered hit lines; convenient in tests.
impl HitSink for Vec<String> {
    #[throws(io::Error)]
    fn accept(&mut self, hit: &HitRecord<'_>) {
        self.push(hit.to_string());
    }
}

/// A builder-style struct that configures one scan.
///
/// Create it with [`ScanSettings::new`], optionally attach a cancellation
/// probe, then call [`scan`](ScanSettings::scan) once per (reference,
/// batch) pair. The settings are reusable and hold no scan state.
pub struct ScanSettings<'a> {
    max_errors: u32,
    indel_cost: u32,
    cancelled: Option<&'a dyn Fn() -> bool>,
}

impl<'a> ScanSettings<'a> {
    /// `max_errors` is the total edit budget per hit; `indel_cost` is the
    /// price of one indel, at least 1 (substitutions always cost 1).
    pub fn new(max_errors: u32, indel_cost: u32) -> Self {
        assert!(indel_cost >= 1, "an indel must cost at least one error");
        ScanSettings { max_errors, indel_cost, cancelled: None }
    }

    /// Probe called between reference positions; returning `true` stops
    /// the scan early. A cancelled scan emits a prefix of the hit stream
    /// and does not flush the dominance window.
    pub fn cancel_when(&mut self, probe: &'a dyn Fn() -> bool) -> &mut Self {
        self.cancelled = Some(probe);
        self
    }

    pub fn max_errors(&self) -> u32 {
        self.max_errors
    }

    pub fn indel_cost(&self) -> u32 {
        self.indel_cost
    }

    /// Align every read of `batch` against `reference`, feeding accepted
    /// hits to `sink` in non-decreasing end-position order.
    #[throws]
    pub fn scan<S: HitSink>(&self, reference: &[Nuc], batch: &ReadBatch, sink: &mut S) {
        if batch.is_empty() || batch.read_len() == 0 {
            return;
        }

        let mask = NucMask::build(batch.read_len(), batch.seqs());
        let mut cur = Frontier::new(self.max_errors, batch.read_len(), batch.len());
        let mut next = Frontier::new(self.max_errors, batch.read_len(), batch.len());
        let mut filter = DominanceFilter::new(self.max_errors);
        let mut seen = vec![0 as Word; mask.stride()];

        debug!(
            reads = batch.len(),
            read_len = batch.read_len(),
            reference_len = reference.len(),
            "scanning batch"
        );

        for (pos, &base) in reference.iter().enumerate() {
            if let Some(cancelled) = self.cancelled {
                if cancelled() {
                    debug!(pos, "scan cancelled");
                    return;
                }
            }

            advance(&cur, &mut next, mask.plane(base), self.indel_cost);
            self.collect_candidates(&next, pos, &mut seen, &mut filter);
            while let Some(hit) = filter.pop_ready(pos) {
                self.deliver(reference, batch, hit, sink)?;
            }
            mem::swap(&mut cur, &mut next);
        }

        while let Some(hit) = filter.pop() {
            self.deliver(reference, batch, hit, sink)?;
        }
    }

    /// Register, for every read with any terminal bit set, the candidate
    /// with the smallest error count.
    fn collect_candidates(
        &self,
        frontier: &Frontier,
        pos: usize,
        seen: &mut [Word],
        filter: &mut DominanceFilter,
    ) {
        for word in seen.iter_mut() {
            *word = 0;
        }
        for e in 0..=self.max_errors as usize {
            let terminal = frontier.terminal(e);
            for (w, (&term, seen)) in terminal.iter().zip(seen.iter_mut()).enumerate() {
                let mut fresh = term & !*seen;
                *seen |= fresh;
                while fresh != 0 {
                    let lane = w * WORD_BITS + fresh.leading_zeros() as usize;
                    fresh &= !lane_bit(lane);
                    filter.register(Hit { ref_pos: pos, read: lane, n_errors: e as u32 });
                }
            }
        }
    }

    #[throws]
    fn deliver<S: HitSink>(&self, reference: &[Nuc], batch: &ReadBatch, hit: Hit, sink: &mut S) {
        let name = &batch.names()[hit.read];
        let rebuilt = banded::reconstruct(
            reference,
            hit.ref_pos,
            &batch.seqs()[hit.read],
            self.max_errors,
            self.indel_cost,
        );
        if rebuilt.cost != hit.n_errors {
            throw!(Error::PredictionMismatch {
                name: name.clone(),
                ref_pos: hit.ref_pos,
                predicted: hit.n_errors,
                reconstructed: rebuilt.cost,
            });
        }
        sink.accept(&HitRecord {
            name,
            n_errors: hit.n_errors,
            start: rebuilt.start,
            end: rebuilt.end,
            read_ali: rebuilt.read_ali,
            ref_ali: rebuilt.ref_ali,
        })?;
    }
}
