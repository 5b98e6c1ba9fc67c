// Boxoffice API server: seat availability queries, reservation pipeline,
// and live availability fanout over websockets.

pub mod booking_queue;
pub mod cache;
pub mod handlers;
pub mod query;
pub mod registry;
pub mod reservation;
pub mod session;
pub mod state;
pub mod store;
pub mod ws;
