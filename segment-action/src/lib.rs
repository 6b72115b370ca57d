pub mod action;
pub mod api;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod query;
pub mod router;
pub mod server;
pub mod sink;
pub mod test_utils;
pub mod time;
pub mod transform;
