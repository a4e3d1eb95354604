//! Admission-controlled reverse proxy.
//!
//! Every configured route is forwarded to its upstream unless the process-wide
//! admission policy (a per-minute and a per-hour window) says the gateway is
//! too busy, in which case the caller gets a refusal body and a webhook alert
//! is fired.

pub mod alert;
pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod upstream;
