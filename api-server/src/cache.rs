// Read-through seat availability cache over Redis.
//
// Three cooperating indexes, all using the original key layout:
//   sections_by_price                      zset, member {event}:{section}:{max_price}, score min_price
//   event:{e}:section:{s}:price_blocks    zset, member {row}:{start_id}:{start_no}:{end_id}:{end_no}, score price
//   event:{e}:section:{s}:rows            hash, field row_id, value {"row_name": ..., "seats": "0010..."}
//
// Reads run inside a CacheTxn: every key read is WATCHed, and population
// writes are staged into an atomic pipeline that only executes at commit.
// EXEC returning nil means a watched key changed and the caller retries.
use crate::store::VenueStore;
use boxoffice_common::{
    BoxofficeError, Result, SeatMap, SeatPriceBlock, SectionPriceRange,
};
use metrics::counter;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const SECTION_PRICE_INDEX: &str = "sections_by_price";

pub fn price_blocks_key(event_id: i64, section_id: i64) -> String {
    format!("event:{event_id}:section:{section_id}:price_blocks")
}

pub fn rows_key(event_id: i64, section_id: i64) -> String {
    format!("event:{event_id}:section:{section_id}:rows")
}

pub fn reservations_key(session_id: &str) -> String {
    format!("session:{session_id}:reservations")
}

/// Cached entry for one row of one section, stored as a hash field value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowEntry {
    pub row_name: String,
    pub seats: String,
}

/// Decoded row state served to the query engine.
#[derive(Debug, Clone)]
pub struct RowState {
    pub row_name: String,
    pub seats: SeatMap,
}

#[derive(Debug, Clone, Copy)]
pub struct SectionEntry {
    pub section_id: i64,
    pub min_price: i64,
    pub max_price: i64,
}

pub fn encode_section_member(event_id: i64, section_id: i64, max_price: i64) -> String {
    format!("{event_id}:{section_id}:{max_price}")
}

pub fn decode_section_member(member: &str, min_price: i64) -> Result<(i64, SectionEntry)> {
    let parts: Vec<&str> = member.split(':').collect();
    if parts.len() != 3 {
        return Err(BoxofficeError::CorruptCacheEntry(format!(
            "section member {member:?} has {} fields, expected 3",
            parts.len()
        )));
    }
    let event_id = parse_field(parts[0], member)?;
    let section_id = parse_field(parts[1], member)?;
    let max_price = parse_field(parts[2], member)?;
    Ok((
        event_id,
        SectionEntry {
            section_id,
            min_price,
            max_price,
        },
    ))
}

pub fn encode_block_member(block: &SeatPriceBlock) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        block.row_id,
        block.start_seat_id,
        block.start_seat_number,
        block.end_seat_id,
        block.end_seat_number
    )
}

pub fn decode_block_member(member: &str, price: i64) -> Result<SeatPriceBlock> {
    let parts: Vec<&str> = member.split(':').collect();
    if parts.len() != 5 {
        return Err(BoxofficeError::CorruptCacheEntry(format!(
            "price block member {member:?} has {} fields, expected 5",
            parts.len()
        )));
    }
    Ok(SeatPriceBlock {
        row_id: parse_field(parts[0], member)?,
        start_seat_id: parse_field(parts[1], member)?,
        start_seat_number: parse_field(parts[2], member)?,
        end_seat_id: parse_field(parts[3], member)?,
        end_seat_number: parse_field(parts[4], member)?,
        price,
    })
}

pub fn decode_row_entry(raw: &str) -> Result<RowState> {
    let entry: RowEntry = serde_json::from_str(raw).map_err(|e| {
        BoxofficeError::CorruptCacheEntry(format!("row entry is not valid JSON: {e}"))
    })?;
    Ok(RowState {
        row_name: entry.row_name,
        seats: SeatMap::parse(&entry.seats)?,
    })
}

fn parse_field(field: &str, member: &str) -> Result<i64> {
    field.parse().map_err(|_| {
        BoxofficeError::CorruptCacheEntry(format!(
            "non-numeric field {field:?} in member {member:?}"
        ))
    })
}

/// One optimistic unit of work against the cache. Population writes are
/// staged and only hit Redis at commit, inside MULTI/EXEC; the watched
/// reads guarantee the commit fails if any key read here changed.
pub struct CacheTxn {
    conn: redis::aio::Connection,
    staged: redis::Pipeline,
}

impl CacheTxn {
    async fn begin(client: &redis::Client) -> Result<Self> {
        let conn = client.get_async_connection().await?;
        let mut staged = redis::pipe();
        // Sentinel command so EXEC always has something to report; a nil
        // reply then unambiguously signals a watched-key conflict.
        staged.cmd("PING");
        Ok(Self { conn, staged })
    }

    async fn watch(&mut self, key: &str) -> Result<()> {
        redis::cmd("WATCH")
            .arg(key)
            .query_async::<_, ()>(&mut self.conn)
            .await?;
        Ok(())
    }

    /// Executes the staged population writes atomically. Returns false when
    /// a watched key was mutated concurrently and nothing was written.
    pub async fn commit(mut self) -> Result<bool> {
        self.staged.atomic();
        let result: Option<redis::Value> = self.staged.query_async(&mut self.conn).await?;
        Ok(result.is_some())
    }

    pub async fn abort(mut self) {
        let _: std::result::Result<(), redis::RedisError> =
            redis::cmd("UNWATCH").query_async(&mut self.conn).await;
    }
}

pub struct AvailabilityCache {
    client: redis::Client,
    store: Arc<dyn VenueStore>,
}

impl AvailabilityCache {
    pub fn new(client: redis::Client, store: Arc<dyn VenueStore>) -> Self {
        Self { client, store }
    }

    pub async fn begin(&self) -> Result<CacheTxn> {
        CacheTxn::begin(&self.client).await
    }

    /// Sections of the event whose price envelope intersects [low, high],
    /// from the shared section price index. The miss probe reads the whole
    /// index: an event is a miss only when no member of it is cached at
    /// all, so a range matching nothing never re-triggers population. A
    /// miss loads and stages the whole event so later queries with other
    /// ranges hit the cache.
    pub async fn sections_by_price(
        &self,
        txn: &mut CacheTxn,
        event_id: i64,
        low: i64,
        high: i64,
    ) -> Result<Vec<SectionEntry>> {
        txn.watch(SECTION_PRICE_INDEX).await?;

        let raw: Vec<(String, i64)> = txn
            .conn
            .zrange_withscores(SECTION_PRICE_INDEX, 0, -1)
            .await?;

        let (cached_for_event, entries) = sections_for_event(&raw, event_id, low, high)?;
        if cached_for_event {
            return Ok(entries);
        }

        counter!("boxoffice_cache_misses_total", "index" => "sections").increment(1);
        debug!("section index miss for event {}, warming whole event", event_id);

        let ranges = self.store.section_price_ranges(event_id).await?;
        let mut loaded = Vec::new();
        for range in &ranges {
            txn.staged
                .zadd(
                    SECTION_PRICE_INDEX,
                    encode_section_member(event_id, range.section_id, range.max_price),
                    range.min_price,
                )
                .ignore();
            if qualifies(range, low, high) {
                loaded.push(SectionEntry {
                    section_id: range.section_id,
                    min_price: range.min_price,
                    max_price: range.max_price,
                });
            }
        }
        Ok(loaded)
    }

    /// Price blocks of one section filtered to [low, high]. A miss loads
    /// and stages every block of the section.
    pub async fn price_blocks(
        &self,
        txn: &mut CacheTxn,
        event_id: i64,
        section_id: i64,
        low: i64,
        high: i64,
    ) -> Result<Vec<SeatPriceBlock>> {
        let key = price_blocks_key(event_id, section_id);
        txn.watch(&key).await?;

        let raw: Vec<(String, i64)> = txn.conn.zrangebyscore_withscores(&key, low, high).await?;
        if !raw.is_empty() {
            return raw
                .iter()
                .map(|(member, price)| decode_block_member(member, *price))
                .collect();
        }

        counter!("boxoffice_cache_misses_total", "index" => "price_blocks").increment(1);
        debug!(
            "price block miss for event {} section {}, warming whole section",
            event_id, section_id
        );

        let blocks = self.store.seat_price_blocks(event_id, section_id).await?;
        for block in &blocks {
            txn.staged
                .zadd(&key, encode_block_member(block), block.price)
                .ignore();
        }
        Ok(blocks
            .into_iter()
            .filter(|b| b.price >= low && b.price <= high)
            .collect())
    }

    /// Seat map of one row. A miss synthesizes the map from the row's
    /// booking condition in the system of record.
    pub async fn row_state(
        &self,
        txn: &mut CacheTxn,
        event_id: i64,
        section_id: i64,
        row_id: i64,
    ) -> Result<RowState> {
        let key = rows_key(event_id, section_id);
        txn.watch(&key).await?;

        let raw: Option<String> = txn.conn.hget(&key, row_id).await?;
        if let Some(raw) = raw {
            return decode_row_entry(&raw);
        }

        counter!("boxoffice_cache_misses_total", "index" => "rows").increment(1);

        let condition = self.store.row_booking_condition(row_id, event_id).await?;
        let seats = SeatMap::from_conditions(&condition.seats);
        let entry = RowEntry {
            row_name: condition.row_name.clone(),
            seats: seats.encode(),
        };
        txn.staged
            .hset(&key, row_id, serde_json::to_string(&entry)?)
            .ignore();
        Ok(RowState {
            row_name: condition.row_name,
            seats,
        })
    }
}

fn qualifies(range: &SectionPriceRange, low: i64, high: i64) -> bool {
    range.min_price <= high && range.max_price >= low
}

/// Splits the shared index into this event's entries, remembering whether
/// the event was cached at all. Presence in the index, not the filtered
/// result, is what distinguishes a miss from a query matching nothing.
fn sections_for_event(
    raw: &[(String, i64)],
    event_id: i64,
    low: i64,
    high: i64,
) -> Result<(bool, Vec<SectionEntry>)> {
    let mut cached = false;
    let mut entries = Vec::new();
    for (member, min_price) in raw {
        let (member_event, entry) = decode_section_member(member, *min_price)?;
        if member_event != event_id {
            continue;
        }
        cached = true;
        if entry.min_price <= high && entry.max_price >= low {
            entries.push(entry);
        }
    }
    Ok((cached, entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_member_round_trips() {
        let member = encode_section_member(7, 42, 900);
        assert_eq!(member, "7:42:900");
        let (event_id, entry) = decode_section_member(&member, 500).unwrap();
        assert_eq!(event_id, 7);
        assert_eq!(entry.section_id, 42);
        assert_eq!(entry.min_price, 500);
        assert_eq!(entry.max_price, 900);
    }

    #[test]
    fn section_member_with_wrong_field_count_is_corrupt() {
        let err = decode_section_member("7:42", 500).unwrap_err();
        assert!(matches!(err, BoxofficeError::CorruptCacheEntry(_)));
    }

    #[test]
    fn section_member_with_non_numeric_field_is_corrupt() {
        let err = decode_section_member("7:abc:900", 500).unwrap_err();
        assert!(matches!(err, BoxofficeError::CorruptCacheEntry(_)));
    }

    #[test]
    fn block_member_round_trips() {
        let block = SeatPriceBlock {
            row_id: 3,
            start_seat_id: 100,
            start_seat_number: 1,
            end_seat_id: 104,
            end_seat_number: 5,
            price: 550,
        };
        let member = encode_block_member(&block);
        assert_eq!(member, "3:100:1:104:5");
        let decoded = decode_block_member(&member, 550).unwrap();
        assert_eq!(decoded.row_id, 3);
        assert_eq!(decoded.start_seat_number, 1);
        assert_eq!(decoded.end_seat_number, 5);
        assert_eq!(decoded.price, 550);
    }

    #[test]
    fn block_member_with_wrong_field_count_is_corrupt() {
        assert!(decode_block_member("3:100:1:104", 550).is_err());
    }

    #[test]
    fn row_entry_decodes_name_and_seats() {
        let state = decode_row_entry(r#"{"row_name": "A", "seats": "0101"}"#).unwrap();
        assert_eq!(state.row_name, "A");
        assert_eq!(state.seats.encode(), "0101");
        assert_eq!(state.seats.len(), 4);
    }

    #[test]
    fn row_entry_with_bad_flags_is_corrupt() {
        assert!(decode_row_entry(r#"{"row_name": "A", "seats": "01x1"}"#).is_err());
        assert!(decode_row_entry("not json").is_err());
    }

    #[test]
    fn section_qualification_uses_envelope_overlap() {
        let range = SectionPriceRange {
            section_id: 1,
            min_price: 400,
            max_price: 700,
        };
        assert!(qualifies(&range, 500, 600));
        assert!(qualifies(&range, 700, 900));
        assert!(qualifies(&range, 100, 400));
        assert!(!qualifies(&range, 701, 900));
        assert!(!qualifies(&range, 100, 399));
    }

    #[test]
    fn cached_event_outside_the_price_range_is_not_a_miss() {
        // Event 7 is cached with envelope [800, 900]; a [100, 500] query
        // matches nothing but must not look like an uncached event.
        let raw = vec![("7:42:900".to_string(), 800i64)];
        let (cached, entries) = sections_for_event(&raw, 7, 100, 500).unwrap();
        assert!(cached);
        assert!(entries.is_empty());

        let (cached, _) = sections_for_event(&raw, 8, 100, 500).unwrap();
        assert!(!cached);

        let (cached, entries) = sections_for_event(&raw, 7, 500, 850).unwrap();
        assert!(cached);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].section_id, 42);
    }

    #[test]
    fn key_builders_match_cache_layout() {
        assert_eq!(price_blocks_key(7, 3), "event:7:section:3:price_blocks");
        assert_eq!(rows_key(7, 3), "event:7:section:3:rows");
        assert_eq!(reservations_key("abc"), "session:abc:reservations");
    }
}
