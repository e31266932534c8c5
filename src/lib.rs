#![forbid(unsafe_code)]

//! Bit-parallel alignment of short DNA reads against a long reference.
//!
//! The matcher advances one approximate-match automaton per read, all
//! packed side by side into machine words, one reference nucleotide at a
//! time. Candidate hits come off the automaton's terminal row, survive a
//! dominance filter that strips shifted and extended duplicates, and are
//! reconstructed into gapped alignments by a banded dynamic program whose
//! cost must agree with the matcher's prediction.
//!
//! [`ScanSettings`] is the entry point: configure the error budget and
//! indel cost, then [`scan`](ScanSettings::scan) a [`ReadBatch`] against a
//! reference, receiving hits through a [`HitSink`].

pub mod assess;
pub mod banded;
pub mod cache;
pub mod fasta;
pub mod filter;
pub mod matcher;
pub mod nuc;
pub mod pack;
pub mod scan;

pub use scan::{HitRecord, HitSink, LineSink, ReadBatch, ScanError, ScanSettings};
