// Ticket query and reservation endpoints
use super::ApiError;
use crate::query::OfferQuery;
use crate::session::Session;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use boxoffice_common::{ReservationRequest, TicketOffer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const MAX_PARTY_SIZE: usize = 6;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct TicketQuery {
    pub number: usize,
    pub low_price: i64,
    pub high_price: i64,
    pub page: usize,
    pub page_size: usize,
}

pub async fn list_tickets(
    Path(event_id): Path<i64>,
    Query(query): Query<TicketQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TicketOffer>>, ApiError> {
    validate_query(&query).map_err(ApiError::bad_request)?;

    let offers = state
        .engine
        .list_offers(
            event_id,
            &OfferQuery {
                number: query.number,
                low_price: query.low_price,
                high_price: query.high_price,
                page: query.page,
                page_size: query.page_size,
            },
        )
        .await?;
    Ok(Json(offers))
}

#[derive(Debug, Deserialize)]
pub struct ReserveBody {
    pub section_id: i64,
    pub row_id: i64,
    pub price: i64,
    pub length: usize,
}

pub async fn reserve(
    Path(event_id): Path<i64>,
    Extension(session): Extension<Session>,
    State(state): State<AppState>,
    Json(body): Json<ReserveBody>,
) -> Result<Json<Value>, ApiError> {
    if body.length < 1 || body.length > MAX_PARTY_SIZE {
        return Err(ApiError::bad_request(format!(
            "length must be between 1 and {MAX_PARTY_SIZE}"
        )));
    }
    if !state.events.exists(event_id).await? {
        return Err(ApiError::bad_request("event does not exist"));
    }

    let request = ReservationRequest {
        event_id,
        section_id: body.section_id,
        row_id: body.row_id,
        price: body.price,
        length: body.length,
        session_id: session.0,
    };
    state.pipeline.request_reservation(&request).await?;
    info!(
        "queued reservation of {} seats in row {} for session {}",
        request.length, request.row_id, request.session_id
    );
    Ok(Json(json!({ "message": "Reservation request received" })))
}

fn validate_query(query: &TicketQuery) -> Result<(), String> {
    if query.number < 1 || query.number > MAX_PARTY_SIZE {
        return Err(format!("number must be between 1 and {MAX_PARTY_SIZE}"));
    }
    if query.low_price < 0 {
        return Err("low_price must not be negative".to_string());
    }
    if query.high_price <= query.low_price {
        return Err("high_price must be greater than low_price".to_string());
    }
    if query.page < 1 {
        return Err("page must be at least 1".to_string());
    }
    if query.page_size < 1 || query.page_size > MAX_PAGE_SIZE {
        return Err(format!("page_size must be between 1 and {MAX_PAGE_SIZE}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> TicketQuery {
        TicketQuery {
            number: 2,
            low_price: 100,
            high_price: 900,
            page: 1,
            page_size: 20,
        }
    }

    #[test]
    fn well_formed_query_passes() {
        assert!(validate_query(&query()).is_ok());
    }

    #[test]
    fn party_size_is_bounded() {
        let mut q = query();
        q.number = 0;
        assert!(validate_query(&q).is_err());
        q.number = 7;
        assert!(validate_query(&q).is_err());
        q.number = 6;
        assert!(validate_query(&q).is_ok());
    }

    #[test]
    fn price_range_must_be_increasing() {
        let mut q = query();
        q.high_price = q.low_price;
        assert!(validate_query(&q).is_err());
        q.low_price = -1;
        assert!(validate_query(&q).is_err());
    }

    #[test]
    fn paging_bounds_are_enforced() {
        let mut q = query();
        q.page = 0;
        assert!(validate_query(&q).is_err());
        q.page = 1;
        q.page_size = 101;
        assert!(validate_query(&q).is_err());
    }
}
