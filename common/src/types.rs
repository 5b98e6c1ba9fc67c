// Core domain and wire types shared across the boxoffice services
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per (event, section) price envelope derived from the seats of the
/// section. Derived data, not authoritative.
#[derive(Debug, Clone, Copy, FromRow, Serialize, Deserialize)]
pub struct SectionPriceRange {
    pub section_id: i64,
    pub min_price: i64,
    pub max_price: i64,
}

/// A maximal contiguous run of same-priced seat numbers in one row for an
/// event. Blocks of a row partition its seat-number range.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SeatPriceBlock {
    pub row_id: i64,
    pub start_seat_id: i64,
    pub start_seat_number: i64,
    pub end_seat_id: i64,
    pub end_seat_number: i64,
    pub price: i64,
}

/// True when the blocks cover seat numbers 1..=row_len exactly once: no
/// gaps, no overlaps. The run scan and the per-block availability recompute
/// both assume this of every row's blocks.
pub fn blocks_partition_row(blocks: &[SeatPriceBlock], row_len: usize) -> bool {
    let mut starts: Vec<(i64, i64)> = blocks
        .iter()
        .map(|b| (b.start_seat_number, b.end_seat_number))
        .collect();
    starts.sort_unstable();
    let mut next = 1i64;
    for (start, end) in starts {
        if start != next || end < start {
            return false;
        }
        next = end + 1;
    }
    next == row_len as i64 + 1
}

/// Booking state of every seat in a row for one event, as reported by the
/// system of record.
#[derive(Debug, Clone)]
pub struct RowCondition {
    pub row_id: i64,
    pub row_name: String,
    pub seats: Vec<SeatCondition>,
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct SeatCondition {
    pub seat_id: i64,
    pub seat_number: i64,
    pub booked_by: Option<i64>,
}

/// A query result: an available run of seats at one price in one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketOffer {
    pub event_id: i64,
    pub section_id: i64,
    pub section_name: String,
    pub row_id: i64,
    pub row_name: String,
    pub price: i64,
    pub length: usize,
}

/// Queue message published by the reservation endpoint and consumed exactly
/// once by the booking consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub event_id: i64,
    pub section_id: i64,
    pub row_id: i64,
    pub price: i64,
    pub length: usize,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    SoldOut,
}

/// Unicast payload sent to the requesting session after the claim step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub session_id: String,
    pub status: ReservationStatus,
    pub event_id: i64,
    pub section_id: i64,
    pub row_id: i64,
    pub price: i64,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_seat_number: Option<usize>,
}

impl NotificationMsg {
    pub fn confirmed(req: &ReservationRequest, start_seat_number: usize) -> Self {
        Self {
            msg_type: "reservation".to_string(),
            session_id: req.session_id.clone(),
            status: ReservationStatus::Confirmed,
            event_id: req.event_id,
            section_id: req.section_id,
            row_id: req.row_id,
            price: req.price,
            length: req.length,
            start_seat_number: Some(start_seat_number),
        }
    }

    pub fn sold_out(req: &ReservationRequest) -> Self {
        Self {
            msg_type: "reservation".to_string(),
            session_id: req.session_id.clone(),
            status: ReservationStatus::SoldOut,
            event_id: req.event_id,
            section_id: req.section_id,
            row_id: req.row_id,
            price: req.price,
            length: req.length,
            start_seat_number: None,
        }
    }
}

/// One price block's availability after a claim mutated its row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUpdate {
    pub event_id: i64,
    pub section_id: i64,
    pub row_id: i64,
    pub price: i64,
    pub max_run: usize,
    pub available: bool,
}

/// Broadcast payload delivered to every registered session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub updates: Vec<BlockUpdate>,
}

impl BroadcastMsg {
    pub fn availability(updates: Vec<BlockUpdate>) -> Self {
        Self {
            msg_type: "availability".to_string(),
            updates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: i64, end: i64, price: i64) -> SeatPriceBlock {
        SeatPriceBlock {
            row_id: 9,
            start_seat_id: start + 100,
            start_seat_number: start,
            end_seat_id: end + 100,
            end_seat_number: end,
            price,
        }
    }

    #[test]
    fn exact_cover_partitions_the_row() {
        let blocks = vec![block(1, 4, 500), block(5, 7, 800)];
        assert!(blocks_partition_row(&blocks, 7));
        // Order of the slice does not matter.
        let blocks = vec![block(5, 7, 800), block(1, 4, 500)];
        assert!(blocks_partition_row(&blocks, 7));
    }

    #[test]
    fn gap_between_blocks_is_not_a_partition() {
        let blocks = vec![block(1, 3, 500), block(5, 7, 800)];
        assert!(!blocks_partition_row(&blocks, 7));
    }

    #[test]
    fn overlapping_blocks_are_not_a_partition() {
        let blocks = vec![block(1, 4, 500), block(4, 7, 800)];
        assert!(!blocks_partition_row(&blocks, 7));
    }

    #[test]
    fn short_or_long_cover_is_not_a_partition() {
        let blocks = vec![block(1, 6, 500)];
        assert!(!blocks_partition_row(&blocks, 7));
        let blocks = vec![block(1, 8, 500)];
        assert!(!blocks_partition_row(&blocks, 7));
        assert!(!blocks_partition_row(&[], 7));
        assert!(blocks_partition_row(&[], 0));
    }

    #[test]
    fn reservation_request_round_trips_as_json() {
        let req = ReservationRequest {
            event_id: 7,
            section_id: 3,
            row_id: 21,
            price: 550,
            length: 2,
            session_id: "abc".to_string(),
        };
        let encoded = serde_json::to_string(&req).unwrap();
        let decoded: ReservationRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.row_id, 21);
        assert_eq!(decoded.session_id, "abc");
    }

    #[test]
    fn sold_out_notification_omits_start_seat() {
        let req = ReservationRequest {
            event_id: 1,
            section_id: 1,
            row_id: 1,
            price: 100,
            length: 4,
            session_id: "s".to_string(),
        };
        let encoded = serde_json::to_string(&NotificationMsg::sold_out(&req)).unwrap();
        assert!(encoded.contains("\"sold_out\""));
        assert!(!encoded.contains("start_seat_number"));
    }
}
