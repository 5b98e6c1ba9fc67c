// Reservation pipeline: the HTTP-facing producer publishes claim requests
// to the booking queue; consumer tasks pull them and run the atomic
// seat-claim against the cached row.
//
// The claim itself is a single server-side script so the read-scan-flip-
// write sequence for a row can never interleave with another claim on the
// same row: Redis executes scripts atomically, which is what closes the
// lost-update hazard between competing consumers.
use crate::booking_queue::BookingQueue;
use crate::cache::{
    decode_block_member, decode_row_entry, price_blocks_key, reservations_key, rows_key,
};
use crate::registry::ConnectionRegistry;
use crate::store::VenueStore;
use boxoffice_common::{
    blocks_partition_row, BlockUpdate, BoxofficeError, BroadcastMsg, NotificationMsg,
    ReservationRequest, Result, RetryPolicy, SeatPriceBlock,
};
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use metrics::counter;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{error, info, warn};

// KEYS[1] = row hash key, ARGV[1] = row id, ARGV[2] = requested length,
// ARGV[3..] = (start, end) seat-number pairs of the row's price blocks.
// Returns {claimed start | -1 sold out | -2 row missing, per-block max runs}.
const CLAIM_SCRIPT: &str = r#"
local payload = redis.call('HGET', KEYS[1], ARGV[1])
if not payload then
  return {-2, {}}
end
local entry = cjson.decode(payload)
local seats = entry['seats']
local wanted = tonumber(ARGV[2])
local n = string.len(seats)

local start = -1
local run_len = 0
local run_start = 0
for i = 1, n do
  if string.sub(seats, i, i) == '0' then
    if run_len == 0 then
      run_start = i
    end
    run_len = run_len + 1
    if run_len >= wanted then
      start = run_start
      break
    end
  else
    run_len = 0
  end
end
if start < 0 then
  return {-1, {}}
end

local updated = string.sub(seats, 1, start - 1)
  .. string.rep('1', wanted)
  .. string.sub(seats, start + wanted, n)
entry['seats'] = updated
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(entry))

local runs = {}
local idx = 3
while idx + 1 <= #ARGV do
  local block_start = tonumber(ARGV[idx])
  local block_end = tonumber(ARGV[idx + 1])
  local best = 0
  local current = 0
  for i = block_start, block_end do
    if string.sub(updated, i, i) == '0' then
      current = current + 1
      if current > best then
        best = current
      end
    else
      current = 0
    end
  end
  runs[#runs + 1] = best
  idx = idx + 2
end
return {start, runs}
"#;

pub struct ReservationPipeline {
    redis: MultiplexedConnection,
    store: Arc<dyn VenueStore>,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<BookingQueue>,
    claim_script: redis::Script,
    reservation_ttl_secs: usize,
}

impl ReservationPipeline {
    pub fn new(
        redis: MultiplexedConnection,
        store: Arc<dyn VenueStore>,
        registry: Arc<ConnectionRegistry>,
        queue: Arc<BookingQueue>,
        reservation_ttl_secs: usize,
    ) -> Self {
        Self {
            redis,
            store,
            registry,
            queue,
            claim_script: redis::Script::new(CLAIM_SCRIPT),
            reservation_ttl_secs,
        }
    }

    /// Enqueues the claim and returns immediately: acceptance of the
    /// request, not confirmation of the booking.
    pub async fn request_reservation(&self, request: &ReservationRequest) -> Result<()> {
        self.queue.publish(request).await?;
        counter!("boxoffice_reservations_requested_total").increment(1);
        Ok(())
    }

    /// Pulls from the booking queue until the task is aborted. A broker
    /// hiccup only drops the consumer stream; the stream is rebuilt with
    /// bounded backoff so the queue never sits unserviced while the reserve
    /// endpoint keeps accepting requests.
    pub async fn run_consumer(self: Arc<Self>, tag: String) -> Result<()> {
        let retry = RetryPolicy::default();
        loop {
            let mut consumer = retry.execute(|| self.queue.consumer(&tag)).await?;
            info!("booking consumer {} started", tag);

            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => self.process_delivery(delivery).await,
                    Err(e) => {
                        warn!("booking consumer {} stream error: {}", tag, e);
                        break;
                    }
                }
            }
            warn!("booking consumer {} lost its stream, reconnecting", tag);
        }
    }

    /// Ack only after the whole claim flow succeeded; transient failures
    /// requeue, poison messages and permanent failures are rejected.
    async fn process_delivery(&self, delivery: Delivery) {
        let request = match serde_json::from_slice::<ReservationRequest>(&delivery.data) {
            Ok(request) => request,
            Err(e) => {
                warn!("rejecting malformed booking message: {}", e);
                if let Err(e) = delivery.reject(BasicRejectOptions { requeue: false }).await {
                    error!("failed to reject message: {}", e);
                }
                return;
            }
        };

        match self.handle_reservation(&request).await {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!("failed to ack message: {}", e);
                }
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "requeueing reservation for session {}: {}",
                    request.session_id, e
                );
                let nack = BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                };
                if let Err(e) = delivery.nack(nack).await {
                    error!("failed to nack message: {}", e);
                }
            }
            Err(e) => {
                error!(
                    "dropping reservation for session {}: {}",
                    request.session_id, e
                );
                if let Err(e) = delivery.reject(BasicRejectOptions { requeue: false }).await {
                    error!("failed to reject message: {}", e);
                }
            }
        }
    }

    async fn handle_reservation(&self, request: &ReservationRequest) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = rows_key(request.event_id, request.section_id);

        // The row must have been warmed by a prior query; the consumer
        // never populates lazily.
        let cached: Option<String> = conn.hget(&key, request.row_id).await?;
        let row = match cached {
            Some(raw) => decode_row_entry(&raw)?,
            None => {
                return Err(BoxofficeError::RowNotCached {
                    event_id: request.event_id,
                    section_id: request.section_id,
                    row_id: request.row_id,
                })
            }
        };

        let blocks = self.row_blocks(&mut conn, request).await?;
        if !blocks_partition_row(&blocks, row.seats.len()) {
            return Err(BoxofficeError::CorruptCacheEntry(format!(
                "price blocks of row {} do not partition its {} seats",
                request.row_id,
                row.seats.len()
            )));
        }

        let mut invocation = self.claim_script.prepare_invoke();
        invocation
            .key(&key)
            .arg(request.row_id)
            .arg(request.length);
        for block in &blocks {
            invocation
                .arg(block.start_seat_number)
                .arg(block.end_seat_number);
        }
        let (claimed_start, runs): (i64, Vec<i64>) = invocation.invoke_async(&mut conn).await?;

        match claimed_start {
            -2 => {
                return Err(BoxofficeError::RowNotCached {
                    event_id: request.event_id,
                    section_id: request.section_id,
                    row_id: request.row_id,
                })
            }
            -1 => {
                // Business outcome, not a system fault: tell the requester
                // and let the message be acknowledged.
                counter!("boxoffice_reservations_sold_out_total").increment(1);
                info!(
                    "no run of {} seats left in row {} for session {}",
                    request.length, request.row_id, request.session_id
                );
                if let Err(e) = self
                    .registry
                    .notify(&request.session_id, &NotificationMsg::sold_out(request))
                    .await
                {
                    warn!("sold-out notice for session {} undelivered: {}", request.session_id, e);
                }
                return Ok(());
            }
            _ => {}
        }

        let claimed_start = claimed_start as usize;
        self.persist_reservation(&mut conn, request, claimed_start)
            .await?;
        counter!("boxoffice_reservations_claimed_total").increment(1);
        info!(
            "claimed {} seats from seat {} in row {} for session {}",
            request.length, claimed_start, request.row_id, request.session_id
        );

        // Seats are flipped and the record persisted; notification trouble
        // must not requeue the claim.
        if let Err(e) = self
            .registry
            .notify(
                &request.session_id,
                &NotificationMsg::confirmed(request, claimed_start),
            )
            .await
        {
            warn!(
                "confirmation for session {} undelivered: {}",
                request.session_id, e
            );
        }
        let updates = block_updates(request.event_id, request.section_id, &blocks, &runs);
        match self.registry.broadcast(&BroadcastMsg::availability(updates)).await {
            Ok(delivered) => {
                counter!("boxoffice_broadcasts_total").increment(1);
                info!("availability update broadcast to {} sessions", delivered);
            }
            Err(e) => warn!("availability broadcast failed: {}", e),
        }
        Ok(())
    }

    /// Price blocks of the requested row, from the cache when present and
    /// from the system of record otherwise, ordered by seat number so the
    /// broadcast is stable.
    async fn row_blocks(
        &self,
        conn: &mut MultiplexedConnection,
        request: &ReservationRequest,
    ) -> Result<Vec<SeatPriceBlock>> {
        let key = price_blocks_key(request.event_id, request.section_id);
        let raw: Vec<(String, i64)> = conn.zrange_withscores(&key, 0, -1).await?;

        let mut blocks = if raw.is_empty() {
            self.store
                .seat_price_blocks(request.event_id, request.section_id)
                .await?
        } else {
            raw.iter()
                .map(|(member, price)| decode_block_member(member, *price))
                .collect::<Result<Vec<_>>>()?
        };
        blocks.retain(|b| b.row_id == request.row_id);
        blocks.sort_by_key(|b| b.start_seat_number);
        Ok(blocks)
    }

    async fn persist_reservation(
        &self,
        conn: &mut MultiplexedConnection,
        request: &ReservationRequest,
        claimed_start: usize,
    ) -> Result<()> {
        let key = reservations_key(&request.session_id);
        let field = format!(
            "{}:{}:{}:{}:{}",
            request.event_id, request.section_id, request.row_id, claimed_start, request.length
        );
        redis::pipe()
            .hset(&key, field, "reserved")
            .ignore()
            .expire(&key, self.reservation_ttl_secs as i64)
            .ignore()
            .query_async::<_, ()>(conn)
            .await?;
        Ok(())
    }
}

/// Per-price-tier availability after a claim, in block seat order. The
/// script returns one max-run length per block it was given.
pub fn block_updates(
    event_id: i64,
    section_id: i64,
    blocks: &[SeatPriceBlock],
    runs: &[i64],
) -> Vec<BlockUpdate> {
    blocks
        .iter()
        .zip(runs.iter())
        .map(|(block, &max_run)| BlockUpdate {
            event_id,
            section_id,
            row_id: block.row_id,
            price: block.price,
            max_run: max_run.max(0) as usize,
            available: max_run > 0,
        })
        .collect()
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
    fn updates_pair_blocks_with_their_runs() {
        let blocks = vec![block(1, 4, 500), block(5, 7, 800)];
        let updates = block_updates(1, 2, &blocks, &[3, 0]);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].price, 500);
        assert_eq!(updates[0].max_run, 3);
        assert!(updates[0].available);
        assert_eq!(updates[1].price, 800);
        assert_eq!(updates[1].max_run, 0);
        assert!(!updates[1].available);
    }

    #[test]
    fn claim_semantics_match_the_script() {
        // The Lua script and SeatMap implement the same first-fit claim;
        // this pins the shared semantics the script is written against.
        use boxoffice_common::SeatMap;

        let mut row = SeatMap::parse("0001100").unwrap();
        let start = row.find_first_run(2).unwrap();
        assert_eq!(start, 1);
        row.claim(start, 2).unwrap();
        assert_eq!(row.encode(), "1101100");

        // Per-block recompute against the updated map.
        assert_eq!(row.max_run_in(1, 4), 1);
        assert_eq!(row.max_run_in(5, 7), 2);
    }
}
