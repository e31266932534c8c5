//! The bit-parallel matching kernel.
//!
//! One scan holds two [`Frontier`] matrices and one [`NucMask`]. For every
//! reference nucleotide the driver looks up the matching bit-plane in the
//! mask and calls [`advance`] to step every read's approximate-match
//! automaton at once, one machine word of reads at a time.
//!
//! The frontier tracks, for every error budget `e`, read-prefix length
//! `p+1` and read, whether a match with cost at most `e` can end at the
//! reference position just consumed. Matches cost nothing, substitutions
//! cost one, and either flavour of indel costs the configured `indel_cost`.

mod frontier;
mod mask;

pub use frontier::*;
pub use mask::*;
