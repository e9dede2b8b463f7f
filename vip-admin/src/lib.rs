//! VIP Admin: dashboard statistics API
//!
//! Serves the JSON `/stats`, `/update` and `/reset` endpoints the dashboard
//! polls, backed by a [`SharedStats`](vip_core::stats::SharedStats) store. The
//! same server runs standalone (`vip-stats`) or inside the controller.

pub mod api;
pub mod error;
pub mod server;

pub use api::{dispatch, handle_request, StatusReply, UpdateRequest};
pub use error::{ApiError, ApiResult};
pub use server::{serve, start_server};
