use crate::nuc::{self, Nuc};
use crate::pack::{self, Word};

/// Per-nucleotide match bit-planes for one read batch.
///
/// Plane `v` holds, for every read position `p` and read `r`, whether
/// `read[r][p] == v`. Planes are indexed by reference nucleotide during the
/// scan, so the plane for `N` is identically zero: a reference `N` matches
/// no read position, and a read `N` sets no bit in any plane.
pub struct NucMask {
    len: usize,
    lanes: usize,
    stride: usize,
    planes: [Vec<Word>; nuc::ALPHABET],
}

impl NucMask {
    /// Build the planes for `reads`, all of which must have length `len`.
    pub fn build(len: usize, reads: &[Vec<Nuc>]) -> Self {
        let lanes = reads.len();
        let mut flags = vec![false; len * lanes.max(1)];

        let mut plane = |value: Nuc| {
            for slot in flags.iter_mut() {
                *slot = false;
            }
            if value != nuc::N {
                for (lane, read) in reads.iter().enumerate() {
                    debug_assert_eq!(read.len(), len);
                    for (p, &base) in read.iter().enumerate() {
                        if base == value {
                            flags[p * lanes + lane] = true;
                        }
                    }
                }
            }
            pack::pack(&flags, lanes.max(1))
        };

        let planes = [plane(nuc::A), plane(nuc::C), plane(nuc::G), plane(nuc::T), plane(nuc::N)];
        NucMask { len, lanes, stride: pack::words_for(lanes.max(1)), planes }
    }

    /// The plane matching reference nucleotide `value`, `len * stride` words.
    #[inline]
    pub fn plane(&self, value: Nuc) -> &[Word] {
        &self.planes[value as usize]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Words per position row.
    pub fn stride(&self) -> usize {
        self.stride
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nuc::encode_seq;
    use crate::pack::{lane_bit, lane_word};

    fn bit(mask: &NucMask, value: Nuc, p: usize, lane: usize) -> bool {
        mask.plane(value)[p * mask.stride() + lane_word(lane)] & lane_bit(lane) != 0
    }

    #[test]
    fn one_plane_per_canonical_slot() {
        let reads = vec![encode_seq(b"ACGT"), encode_seq(b"AANA")];
        let mask = NucMask::build(4, &reads);

        for p in 0..4 {
            for lane in 0..2 {
                let set: usize = (0..nuc::ALPHABET as Nuc)
                    .filter(|&v| bit(&mask, v, p, lane))
                    .count();
                let is_n = reads[lane][p] == nuc::N;
                assert_eq!(set, if is_n { 0 } else { 1 }, "p={} lane={}", p, lane);
            }
        }
        assert!(bit(&mask, nuc::G, 2, 0));
        assert!(!bit(&mask, nuc::G, 2, 1));
    }

    #[test]
    fn n_plane_is_zero() {
        let mask = NucMask::build(3, &[encode_seq(b"NNN")]);
        assert!(mask.plane(nuc::N).iter().all(|&w| w == 0));
        for v in [nuc::A, nuc::C, nuc::G, nuc::T] {
            assert!(mask.plane(v).iter().all(|&w| w == 0));
        }
    }
}
