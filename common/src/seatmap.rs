// Per-row seat availability codec and consecutive-run scans
use crate::error::{BoxofficeError, Result};
use crate::types::SeatCondition;
use serde::{Deserialize, Serialize};

const AVAILABLE: char = '0';
const BOOKED: char = '1';

/// A maximal run of available seats. `start` is the 1-based seat number of
/// the first seat in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub start: usize,
    pub length: usize,
}

/// Fixed-length availability flags for one row, one flag per seat number.
/// Index i (1-based) corresponds to seat number i.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatMap {
    booked: Vec<bool>,
}

impl SeatMap {
    pub fn from_conditions(conditions: &[SeatCondition]) -> Self {
        Self {
            booked: conditions.iter().map(|c| c.booked_by.is_some()).collect(),
        }
    }

    /// Decodes the cached representation: one character per seat,
    /// `'0'` available, `'1'` booked.
    pub fn parse(encoded: &str) -> Result<Self> {
        let mut booked = Vec::with_capacity(encoded.len());
        for c in encoded.chars() {
            match c {
                AVAILABLE => booked.push(false),
                BOOKED => booked.push(true),
                other => {
                    return Err(BoxofficeError::CorruptCacheEntry(format!(
                        "unexpected seat flag {other:?} in {encoded:?}"
                    )))
                }
            }
        }
        Ok(Self { booked })
    }

    pub fn encode(&self) -> String {
        self.booked
            .iter()
            .map(|&b| if b { BOOKED } else { AVAILABLE })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.booked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.booked.is_empty()
    }

    /// 1-based seat lookup. Out-of-range seats are not available.
    pub fn is_available(&self, seat_number: usize) -> bool {
        seat_number >= 1
            && seat_number <= self.booked.len()
            && !self.booked[seat_number - 1]
    }

    /// Emits every maximal run of available seats inside the inclusive
    /// 1-based range, including a run ending exactly at `end_seat`.
    pub fn scan_runs(&self, start_seat: usize, end_seat: usize) -> Vec<Run> {
        let from = start_seat.max(1);
        let to = end_seat.min(self.booked.len());
        let mut runs = Vec::new();
        let mut current: Option<Run> = None;

        for seat in from..=to {
            if !self.booked[seat - 1] {
                match current.as_mut() {
                    Some(run) => run.length += 1,
                    None => current = Some(Run { start: seat, length: 1 }),
                }
            } else if let Some(run) = current.take() {
                runs.push(run);
            }
        }
        if let Some(run) = current {
            runs.push(run);
        }
        runs
    }

    /// First 1-based position holding `length` consecutive available seats,
    /// scanning the whole row left to right.
    pub fn find_first_run(&self, length: usize) -> Option<usize> {
        if length == 0 {
            return None;
        }
        let mut run_start = 0;
        let mut run_len = 0;
        for seat in 1..=self.booked.len() {
            if !self.booked[seat - 1] {
                if run_len == 0 {
                    run_start = seat;
                }
                run_len += 1;
                if run_len >= length {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    /// Flips `length` seats starting at `start_seat` from available to
    /// booked. The caller must hold exclusive access to the row for the
    /// duration of the read-scan-flip-write sequence.
    pub fn claim(&mut self, start_seat: usize, length: usize) -> Result<()> {
        for seat in start_seat..start_seat + length {
            if !self.is_available(seat) {
                return Err(BoxofficeError::SeatUnavailable { seat_number: seat });
            }
        }
        for seat in start_seat..start_seat + length {
            self.booked[seat - 1] = true;
        }
        Ok(())
    }

    /// Longest run of available seats inside the inclusive 1-based range.
    pub fn max_run_in(&self, start_seat: usize, end_seat: usize) -> usize {
        self.scan_runs(start_seat, end_seat)
            .into_iter()
            .map(|r| r.length)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(encoded: &str) -> SeatMap {
        SeatMap::parse(encoded).unwrap()
    }

    #[test]
    fn parse_rejects_unknown_flags() {
        assert!(SeatMap::parse("00x10").is_err());
    }

    #[test]
    fn parse_encode_preserves_length_and_flags() {
        let m = map("0001100");
        assert_eq!(m.len(), 7);
        assert_eq!(m.encode(), "0001100");
    }

    #[test]
    fn from_conditions_marks_booked_seats() {
        let conditions = vec![
            SeatCondition { seat_id: 10, seat_number: 1, booked_by: None },
            SeatCondition { seat_id: 11, seat_number: 2, booked_by: Some(42) },
            SeatCondition { seat_id: 12, seat_number: 3, booked_by: None },
        ];
        assert_eq!(SeatMap::from_conditions(&conditions).encode(), "010");
    }

    #[test]
    fn scan_emits_every_maximal_run() {
        let runs = map("0001100").scan_runs(1, 7);
        assert_eq!(
            runs,
            vec![Run { start: 1, length: 3 }, Run { start: 6, length: 2 }]
        );
    }

    #[test]
    fn scan_includes_run_ending_at_range_end() {
        let runs = map("1100").scan_runs(1, 4);
        assert_eq!(runs, vec![Run { start: 3, length: 2 }]);
    }

    #[test]
    fn scan_respects_sub_range() {
        // The range boundary truncates the first run.
        let runs = map("0001100").scan_runs(2, 6);
        assert_eq!(
            runs,
            vec![Run { start: 2, length: 2 }, Run { start: 6, length: 1 }]
        );
    }

    #[test]
    fn scan_of_fully_booked_range_is_empty() {
        assert!(map("1111").scan_runs(1, 4).is_empty());
    }

    #[test]
    fn first_run_scans_whole_row_left_to_right() {
        // First run of length >= 2 starts at seat 1 even though a later
        // run also qualifies.
        assert_eq!(map("0001100").find_first_run(2), Some(1));
        assert_eq!(map("1101100").find_first_run(2), Some(6));
        assert_eq!(map("0001100").find_first_run(4), None);
    }

    #[test]
    fn claim_flips_exactly_the_requested_seats() {
        let mut m = map("0001100");
        let start = m.find_first_run(2).unwrap();
        m.claim(start, 2).unwrap();
        assert_eq!(m.encode(), "1101100");
    }

    #[test]
    fn claim_of_booked_seat_fails_without_partial_write() {
        let mut m = map("0100");
        let err = m.claim(1, 2).unwrap_err();
        assert!(matches!(
            err,
            BoxofficeError::SeatUnavailable { seat_number: 2 }
        ));
        assert_eq!(m.encode(), "0100");
    }

    #[test]
    fn claim_past_row_end_fails() {
        let mut m = map("000");
        assert!(m.claim(2, 3).is_err());
        assert_eq!(m.encode(), "000");
    }

    #[test]
    fn sequential_claims_never_overlap() {
        // Two length-3 claims against an empty 7-seat row: the second one
        // sees the mutated map and lands on a disjoint range. In the
        // service, concurrent claims are serialized by the cache store
        // executing the claim script atomically, so each claim observes the
        // previous one's writes exactly as modeled here.
        let mut m = map("0000000");
        let first = m.find_first_run(3).unwrap();
        m.claim(first, 3).unwrap();
        let second = m.find_first_run(3).unwrap();
        m.claim(second, 3).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 4);
        assert_eq!(m.encode(), "1111110");
        assert_eq!(m.find_first_run(3), None);
    }

    #[test]
    fn max_run_tracks_claims() {
        let mut m = map("0000000");
        assert_eq!(m.max_run_in(1, 7), 7);
        m.claim(3, 2).unwrap();
        assert_eq!(m.max_run_in(1, 7), 3);
        assert_eq!(m.max_run_in(1, 4), 2);
        assert_eq!(m.max_run_in(3, 4), 0);
    }
}
