//! Fit policies and free-block selection.
//!
//! A strategy hands the selector its free blocks as a stream of
//! [`Candidate`]s in whatever order its bookkeeping naturally yields
//! (address order for the sorted list, list order for boundary tags), plus
//! the total extent the request needs. The selector owns the entire
//! "which block wins" decision so the strategies never reimplement it:
//!
//! - first fit takes the first eligible candidate and stops consuming the
//!   stream immediately,
//! - best fit takes the smallest eligible candidate,
//! - worst fit takes the largest eligible candidate,
//!
//! and ties keep the earliest candidate encountered, so repeated requests
//! against an unchanged arena pick the same block.

/// One free block offered to the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Offset of the block inside its arena.
    pub offset: usize,
    /// Total extent of the block in bytes.
    pub extent: usize,
}

/// Policy for choosing among eligible free blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Take the first block large enough.
    #[default]
    FirstFit = 0,
    /// Take the smallest block large enough.
    BestFit = 1,
    /// Take the largest block large enough.
    WorstFit = 2,
}

impl FitMode {
    /// Chooses a block of at least `required` bytes from `candidates`, or
    /// `None` when no candidate is large enough.
    ///
    /// First fit short-circuits; the other modes consume the whole stream.
    ///
    /// # Examples
    ///
    /// ```
    /// use quarry_alloc::{Candidate, FitMode};
    ///
    /// let holes = [
    ///     Candidate { offset: 24, extent: 50 },
    ///     Candidate { offset: 96, extent: 200 },
    ///     Candidate { offset: 320, extent: 80 },
    /// ];
    ///
    /// assert_eq!(FitMode::FirstFit.select(holes, 48).unwrap().extent, 50);
    /// assert_eq!(FitMode::BestFit.select(holes, 48).unwrap().extent, 50);
    /// assert_eq!(FitMode::WorstFit.select(holes, 48).unwrap().extent, 200);
    /// assert!(FitMode::FirstFit.select(holes, 500).is_none());
    /// ```
    pub fn select<I>(self, candidates: I, required: usize) -> Option<Candidate>
    where
        I: IntoIterator<Item = Candidate>,
    {
        let mut eligible = candidates
            .into_iter()
            .filter(|block| block.extent >= required);

        match self {
            FitMode::FirstFit => eligible.next(),
            FitMode::BestFit => {
                let mut chosen: Option<Candidate> = None;
                for block in eligible {
                    match chosen {
                        // Strict inequality keeps the earliest on ties.
                        Some(best) if best.extent <= block.extent => {}
                        _ => chosen = Some(block),
                    }
                }
                chosen
            }
            FitMode::WorstFit => {
                let mut chosen: Option<Candidate> = None;
                for block in eligible {
                    match chosen {
                        Some(worst) if worst.extent >= block.extent => {}
                        _ => chosen = Some(block),
                    }
                }
                chosen
            }
        }
    }

    /// Header-word encoding of this mode.
    pub(crate) const fn encode(self) -> usize {
        self as usize
    }

    /// Decodes a header word back into a mode.
    pub(crate) const fn decode(word: usize) -> Self {
        match word {
            0 => FitMode::FirstFit,
            1 => FitMode::BestFit,
            2 => FitMode::WorstFit,
            _ => FitMode::FirstFit, // Default fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn holes() -> [Candidate; 3] {
        [
            Candidate { offset: 24, extent: 50 },
            Candidate { offset: 96, extent: 200 },
            Candidate { offset: 320, extent: 80 },
        ]
    }

    #[test]
    fn test_first_fit_takes_first_eligible() {
        let chosen = FitMode::FirstFit.select(holes(), 48).unwrap();
        assert_eq!(chosen, Candidate { offset: 24, extent: 50 });

        let chosen = FitMode::FirstFit.select(holes(), 60).unwrap();
        assert_eq!(chosen.offset, 96);
    }

    #[test]
    fn test_best_fit_takes_smallest_eligible() {
        let chosen = FitMode::BestFit.select(holes(), 48).unwrap();
        assert_eq!(chosen.extent, 50);

        let chosen = FitMode::BestFit.select(holes(), 60).unwrap();
        assert_eq!(chosen.extent, 80);
    }

    #[test]
    fn test_worst_fit_takes_largest_eligible() {
        let chosen = FitMode::WorstFit.select(holes(), 48).unwrap();
        assert_eq!(chosen.extent, 200);
    }

    #[test]
    fn test_no_eligible_candidate() {
        assert_eq!(FitMode::FirstFit.select(holes(), 201), None);
        assert_eq!(FitMode::BestFit.select(holes(), 201), None);
        assert_eq!(FitMode::WorstFit.select(holes(), 201), None);
        assert_eq!(FitMode::BestFit.select([], 1), None);
    }

    #[test]
    fn test_best_fit_tie_keeps_earliest() {
        let twins = [
            Candidate { offset: 24, extent: 64 },
            Candidate { offset: 200, extent: 64 },
        ];
        assert_eq!(FitMode::BestFit.select(twins, 32).unwrap().offset, 24);
    }

    #[test]
    fn test_worst_fit_tie_keeps_earliest() {
        let twins = [
            Candidate { offset: 24, extent: 64 },
            Candidate { offset: 200, extent: 64 },
        ];
        assert_eq!(FitMode::WorstFit.select(twins, 32).unwrap().offset, 24);
    }

    #[test]
    fn test_first_fit_short_circuits() {
        let seen = Cell::new(0usize);
        let counted = holes()
            .into_iter()
            .inspect(|_| seen.set(seen.get() + 1));

        let chosen = FitMode::FirstFit.select(counted, 48).unwrap();

        assert_eq!(chosen.offset, 24);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_best_fit_consumes_whole_stream() {
        let seen = Cell::new(0usize);
        let counted = holes()
            .into_iter()
            .inspect(|_| seen.set(seen.get() + 1));

        FitMode::BestFit.select(counted, 48).unwrap();

        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn test_decode_falls_back_to_first_fit() {
        assert_eq!(FitMode::decode(0), FitMode::FirstFit);
        assert_eq!(FitMode::decode(1), FitMode::BestFit);
        assert_eq!(FitMode::decode(2), FitMode::WorstFit);
        assert_eq!(FitMode::decode(99), FitMode::FirstFit);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        for mode in [FitMode::FirstFit, FitMode::BestFit, FitMode::WorstFit] {
            assert_eq!(FitMode::decode(mode.encode()), mode);
        }
    }
}
