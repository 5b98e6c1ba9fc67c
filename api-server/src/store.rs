// System-of-record access behind trait seams. The cache layers and the
// reservation consumer only ever see these traits; Postgres is one
// implementation.
use async_trait::async_trait;
use boxoffice_common::{Result, RowCondition, SeatCondition, SectionPriceRange, SeatPriceBlock};
use sqlx::PgPool;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn exists(&self, event_id: i64) -> Result<bool>;
}

#[async_trait]
pub trait VenueStore: Send + Sync {
    async fn section_price_ranges(&self, event_id: i64) -> Result<Vec<SectionPriceRange>>;
    async fn seat_price_blocks(
        &self,
        event_id: i64,
        section_id: i64,
    ) -> Result<Vec<SeatPriceBlock>>;
    async fn row_booking_condition(&self, row_id: i64, event_id: i64) -> Result<RowCondition>;
    async fn section_name(&self, section_id: i64) -> Result<String>;
}

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn exists(&self, event_id: i64) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

pub struct PgVenueStore {
    pool: PgPool,
}

impl PgVenueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VenueStore for PgVenueStore {
    async fn section_price_ranges(&self, event_id: i64) -> Result<Vec<SectionPriceRange>> {
        let ranges = sqlx::query_as::<_, SectionPriceRange>(
            r#"
            SELECT sections.id AS section_id,
                   MIN(event_seat.price) AS min_price,
                   MAX(event_seat.price) AS max_price
            FROM sections
            JOIN rows ON rows.section_id = sections.id
            JOIN seats ON seats.row_id = rows.id
            JOIN event_seat ON event_seat.seat_id = seats.id
            WHERE event_seat.event_id = $1
            GROUP BY sections.id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ranges)
    }

    async fn seat_price_blocks(
        &self,
        event_id: i64,
        section_id: i64,
    ) -> Result<Vec<SeatPriceBlock>> {
        // seat_number - ROW_NUMBER() is constant across consecutive seat
        // numbers sharing a price and changes at every gap, so grouping by
        // it yields the maximal same-priced blocks of each row.
        let blocks = sqlx::query_as::<_, SeatPriceBlock>(
            r#"
            WITH seat_info AS (
                SELECT seats.id AS seat_id,
                       seats.seat_number,
                       rows.id AS row_id,
                       event_seat.price AS price
                FROM rows
                JOIN seats ON seats.row_id = rows.id
                JOIN event_seat ON event_seat.seat_id = seats.id
                WHERE rows.section_id = $1
                  AND event_seat.event_id = $2
            ),
            seat_consecutive AS (
                SELECT seat_id,
                       seat_number,
                       row_id,
                       price,
                       seat_number - ROW_NUMBER()
                           OVER (PARTITION BY row_id, price ORDER BY seat_number)
                           AS grouping_key
                FROM seat_info
            )
            SELECT row_id,
                   MIN(seat_id) AS start_seat_id,
                   MIN(seat_number) AS start_seat_number,
                   MAX(seat_id) AS end_seat_id,
                   MAX(seat_number) AS end_seat_number,
                   price
            FROM seat_consecutive
            GROUP BY row_id, price, grouping_key
            ORDER BY row_id, start_seat_number
            "#,
        )
        .bind(section_id)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(blocks)
    }

    async fn row_booking_condition(&self, row_id: i64, event_id: i64) -> Result<RowCondition> {
        let row_name: String = sqlx::query_scalar("SELECT name FROM rows WHERE id = $1")
            .bind(row_id)
            .fetch_one(&self.pool)
            .await?;

        let seats = sqlx::query_as::<_, SeatCondition>(
            r#"
            SELECT seats.id AS seat_id,
                   seats.seat_number,
                   bookings.booked_by
            FROM seats
            JOIN event_seat ON event_seat.seat_id = seats.id
                           AND event_seat.event_id = $2
            LEFT JOIN bookings ON bookings.event_seat_id = event_seat.id
            WHERE seats.row_id = $1
            ORDER BY seats.seat_number
            "#,
        )
        .bind(row_id)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(RowCondition {
            row_id,
            row_name,
            seats,
        })
    }

    async fn section_name(&self, section_id: i64) -> Result<String> {
        let name: String = sqlx::query_scalar("SELECT name FROM sections WHERE id = $1")
            .bind(section_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(name)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;

    /// In-memory stand-in for the system of record.
    #[derive(Default)]
    pub struct MemoryStore {
        pub events: HashMap<i64, String>,
        pub section_ranges: HashMap<i64, Vec<SectionPriceRange>>,
        pub blocks: HashMap<(i64, i64), Vec<SeatPriceBlock>>,
        pub rows: HashMap<(i64, i64), RowCondition>,
        pub section_names: HashMap<i64, String>,
    }

    #[async_trait]
    impl EventStore for MemoryStore {
        async fn exists(&self, event_id: i64) -> Result<bool> {
            Ok(self.events.contains_key(&event_id))
        }
    }

    #[async_trait]
    impl VenueStore for MemoryStore {
        async fn section_price_ranges(&self, event_id: i64) -> Result<Vec<SectionPriceRange>> {
            Ok(self.section_ranges.get(&event_id).cloned().unwrap_or_default())
        }

        async fn seat_price_blocks(
            &self,
            event_id: i64,
            section_id: i64,
        ) -> Result<Vec<SeatPriceBlock>> {
            Ok(self
                .blocks
                .get(&(event_id, section_id))
                .cloned()
                .unwrap_or_default())
        }

        async fn row_booking_condition(&self, row_id: i64, event_id: i64) -> Result<RowCondition> {
            Ok(self
                .rows
                .get(&(event_id, row_id))
                .cloned()
                .unwrap_or(RowCondition {
                    row_id,
                    row_name: String::new(),
                    seats: Vec::new(),
                }))
        }

        async fn section_name(&self, section_id: i64) -> Result<String> {
            Ok(self
                .section_names
                .get(&section_id)
                .cloned()
                .unwrap_or_default())
        }
    }
}
