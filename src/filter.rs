//! Candidate hits and the dominance window.
//!
//! The matcher reports a candidate every time a read's terminal bit comes
//! up, so a single biological alignment surfaces repeatedly: shifted by an
//! indel, or extended by one more paid-for reference base. The dominance
//! relation recognises those echoes — two hits of the same read whose end
//! positions differ by `d` cannot be independent if one has at least `d`
//! fewer errors, because the better one can be slid or stretched into the
//! worse one. The filter keeps only hits no live hit dominates.

use std::collections::VecDeque;

/// A candidate match of one read, ending at `ref_pos` (0-based) with
/// minimal cost `n_errors`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hit {
    pub ref_pos: usize,
    pub read: usize,
    pub n_errors: u32,
}

impl Hit {
    /// Whether this hit makes `other` redundant.
    ///
    /// Reflexive, and transitive across a chain of discarded hits, which
    /// is what lets the filter drop a hit the moment any live hit
    /// dominates it.
    pub fn dominates(&self, other: &Hit) -> bool {
        if self.read != other.read {
            return false;
        }
        let shift = (self.ref_pos as i64 - other.ref_pos as i64).unsigned_abs();
        match other.n_errors.checked_sub(self.n_errors) {
            Some(slack) => shift <= u64::from(slack),
            None => false,
        }
    }
}

/// A sliding window of live hits, drained in end-position order.
///
/// A hit at `ref_pos` can still be dominated by a hit up to `max_errors`
/// positions later (the dominator needs one spare error per position of
/// shift), so a hit only becomes final once the scan has moved more than
/// `max_errors` past it.
pub struct DominanceFilter {
    window: VecDeque<Hit>,
    horizon: usize,
}

impl DominanceFilter {
    pub fn new(max_errors: u32) -> Self {
        DominanceFilter { window: VecDeque::new(), horizon: max_errors as usize }
    }

    /// Offer a candidate. Registration order must be non-decreasing in
    /// `ref_pos`; the window preserves it.
    pub fn register(&mut self, hit: Hit) {
        if self.window.iter().any(|live| live.dominates(&hit)) {
            return;
        }
        self.window.retain(|live| !hit.dominates(live));
        self.window.push_back(hit);
    }

    /// Take the oldest live hit that no future candidate can dominate any
    /// more, given that the scan has reached `cur_pos`.
    pub fn pop_ready(&mut self, cur_pos: usize) -> Option<Hit> {
        match self.window.front() {
            Some(front) if front.ref_pos + self.horizon < cur_pos => self.window.pop_front(),
            _ => None,
        }
    }

    /// Take the oldest live hit unconditionally; end-of-reference flush.
    pub fn pop(&mut self) -> Option<Hit> {
        self.window.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hit(ref_pos: usize, read: usize, n_errors: u32) -> Hit {
        Hit { ref_pos, read, n_errors }
    }

    fn drain(filter: &mut DominanceFilter) -> Vec<Hit> {
        let mut out = Vec::new();
        while let Some(h) = filter.pop() {
            out.push(h);
        }
        out
    }

    #[test]
    fn relation() {
        // same read, one position apart, one error cheaper
        assert!(hit(5, 0, 0).dominates(&hit(4, 0, 1)));
        assert!(hit(5, 0, 0).dominates(&hit(6, 0, 1)));
        // too far for the slack
        assert!(!hit(5, 0, 0).dominates(&hit(8, 0, 2)));
        // never across reads
        assert!(!hit(5, 0, 0).dominates(&hit(5, 1, 2)));
        // never upward in errors
        assert!(!hit(5, 0, 2).dominates(&hit(5, 0, 1)));
        // reflexive
        assert!(hit(5, 0, 1).dominates(&hit(5, 0, 1)));
    }

    #[test]
    fn better_hit_evicts_worse_neighbours() {
        let mut filter = DominanceFilter::new(2);
        filter.register(hit(3, 0, 1));
        filter.register(hit(4, 0, 0));
        assert_eq!(drain(&mut filter), vec![hit(4, 0, 0)]);
    }

    #[test]
    fn worse_hit_is_refused_on_arrival() {
        let mut filter = DominanceFilter::new(2);
        filter.register(hit(4, 0, 0));
        filter.register(hit(5, 0, 1));
        assert_eq!(drain(&mut filter), vec![hit(4, 0, 0)]);
    }

    #[test]
    fn registration_is_idempotent() {
        let mut once = DominanceFilter::new(3);
        let mut twice = DominanceFilter::new(3);
        for f in [&mut once, &mut twice] {
            f.register(hit(7, 2, 1));
        }
        twice.register(hit(7, 2, 1));
        assert_eq!(drain(&mut once), drain(&mut twice));
    }

    #[test]
    fn survivors_are_pairwise_undominated() {
        let mut filter = DominanceFilter::new(3);
        for h in [
            hit(2, 0, 3),
            hit(4, 0, 1),
            hit(4, 1, 2),
            hit(9, 0, 2),
            hit(9, 0, 2), // duplicate
            hit(10, 1, 0),
        ] {
            filter.register(h);
        }
        let out = drain(&mut filter);
        for a in &out {
            for b in &out {
                if a != b {
                    assert!(!a.dominates(b), "{:?} dominates {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn window_releases_only_settled_hits() {
        let mut filter = DominanceFilter::new(2);
        filter.register(hit(10, 0, 1));
        filter.register(hit(11, 1, 0));
        // at position 12, a future hit could still reach back to 10
        assert_eq!(filter.pop_ready(12), None);
        assert_eq!(filter.pop_ready(13), Some(hit(10, 0, 1)));
        assert_eq!(filter.pop_ready(13), None);
        // flush picks up the rest
        assert_eq!(filter.pop(), Some(hit(11, 1, 0)));
        assert!(filter.is_empty());
    }

    #[test]
    fn emission_order_follows_end_position() {
        let mut filter = DominanceFilter::new(1);
        for p in [3usize, 3, 5, 8, 8, 9] {
            filter.register(hit(p, p % 3, 1));
        }
        let out = drain(&mut filter);
        for pair in out.windows(2) {
            assert!(pair[0].ref_pos <= pair[1].ref_pos);
        }
    }
}
