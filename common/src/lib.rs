// Shared types and utilities for the boxoffice services

pub mod config;
pub mod error;
pub mod retry;
pub mod seatmap;
pub mod types;

pub use config::Config;
pub use error::{BoxofficeError, Result};
pub use retry::RetryPolicy;
pub use seatmap::{Run, SeatMap};
pub use types::*;
