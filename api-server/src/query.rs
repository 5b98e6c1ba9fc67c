// Query engine: answers "N consecutive seats in price range [lo, hi]"
// against the availability cache inside one optimistic transaction.
use crate::cache::{AvailabilityCache, CacheTxn, RowState};
use crate::store::{EventStore, VenueStore};
use boxoffice_common::{BoxofficeError, Result, SeatPriceBlock, TicketOffer};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct OfferQuery {
    pub number: usize,
    pub low_price: i64,
    pub high_price: i64,
    pub page: usize,
    pub page_size: usize,
}

pub struct QueryEngine {
    cache: Arc<AvailabilityCache>,
    events: Arc<dyn EventStore>,
    venues: Arc<dyn VenueStore>,
    max_retries: u32,
    retry_delay: Duration,
}

impl QueryEngine {
    pub fn new(
        cache: Arc<AvailabilityCache>,
        events: Arc<dyn EventStore>,
        venues: Arc<dyn VenueStore>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            cache,
            events,
            venues,
            max_retries,
            retry_delay,
        }
    }

    /// Full scan with bounded retry on concurrent cache mutation. Offers
    /// come out in (section id, price, row) order; pagination is a plain
    /// skip/take over that order.
    pub async fn list_offers(&self, event_id: i64, query: &OfferQuery) -> Result<Vec<TicketOffer>> {
        if !self.events.exists(event_id).await? {
            return Err(BoxofficeError::EventNotFound(event_id));
        }

        let mut attempt: u32 = 0;
        loop {
            let mut txn = self.cache.begin().await?;
            match self.scan_offers(&mut txn, event_id, query).await {
                Ok(offers) => {
                    if txn.commit().await? {
                        return Ok(paginate(offers, query.page, query.page_size));
                    }
                }
                Err(e) => {
                    txn.abort().await;
                    return Err(e);
                }
            }

            attempt += 1;
            counter!("boxoffice_query_conflicts_total").increment(1);
            if attempt >= self.max_retries {
                warn!(
                    "offer query for event {} conflicted {} times, giving up",
                    event_id, attempt
                );
                return Err(BoxofficeError::TxnConflict { retries: attempt });
            }
            debug!("offer query for event {} conflicted, retrying", event_id);
            tokio::time::sleep(self.retry_delay * attempt).await;
        }
    }

    async fn scan_offers(
        &self,
        txn: &mut CacheTxn,
        event_id: i64,
        query: &OfferQuery,
    ) -> Result<Vec<TicketOffer>> {
        let mut sections = self
            .cache
            .sections_by_price(txn, event_id, query.low_price, query.high_price)
            .await?;
        sections.sort_by_key(|s| s.section_id);

        let mut offers = Vec::new();
        for section in sections {
            let section_name = self.venues.section_name(section.section_id).await?;

            let mut blocks = self
                .cache
                .price_blocks(
                    txn,
                    event_id,
                    section.section_id,
                    query.low_price,
                    query.high_price,
                )
                .await?;
            blocks.sort_by_key(|b| (b.price, b.row_id, b.start_seat_number));

            let mut rows: HashMap<i64, RowState> = HashMap::new();
            for block in blocks {
                if !rows.contains_key(&block.row_id) {
                    let state = self
                        .cache
                        .row_state(txn, event_id, section.section_id, block.row_id)
                        .await?;
                    rows.insert(block.row_id, state);
                }
                let row = &rows[&block.row_id];
                offers.extend(offers_from_block(
                    event_id,
                    section.section_id,
                    &section_name,
                    &block,
                    row,
                    query.number,
                ));
            }
        }
        Ok(offers)
    }
}

/// Offers for one price block: every maximal run inside the block's
/// seat-number sub-range that seats at least `min_length` people. Rows with
/// identical prices stay distinct offers; nothing is merged.
pub fn offers_from_block(
    event_id: i64,
    section_id: i64,
    section_name: &str,
    block: &SeatPriceBlock,
    row: &RowState,
    min_length: usize,
) -> Vec<TicketOffer> {
    row.seats
        .scan_runs(
            block.start_seat_number as usize,
            block.end_seat_number as usize,
        )
        .into_iter()
        .filter(|run| run.length >= min_length)
        .map(|run| TicketOffer {
            event_id,
            section_id,
            section_name: section_name.to_string(),
            row_id: block.row_id,
            row_name: row.row_name.clone(),
            price: block.price,
            length: run.length,
        })
        .collect()
}

pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Vec<T> {
    let offset = page.saturating_sub(1).saturating_mul(page_size);
    items.into_iter().skip(offset).take(page_size).collect()
}
