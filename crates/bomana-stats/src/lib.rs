//! Append-only event storage and daily aggregates for the Bomana update
//! service.
//!
//! Launchers report lifecycle events (`launcher_start`, `app_launch`,
//! `version_check`, `update_result`, ...). Each one becomes a row in a SQLite
//! table indexed by UTC day, and [`EventStore::daily_stats`] counts them.

mod error;
mod event;
mod store;

pub use error::StoreError;
pub use event::{ClientInfo, EventPayload, day_from_timestamp, now_utc_iso};
pub use store::{DailyMetrics, DailyStats, EventStore};
