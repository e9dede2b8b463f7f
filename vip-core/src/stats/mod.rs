//! Request statistics: counters, rolling windows and derived metrics.

pub mod store;
pub mod window;

pub use store::{
    balance_score, synthesize_response_time, RecentRequest, ServerView, SharedStats, StatsStore,
    StatsView, DEFAULT_WINDOW_CAPACITY, MAX_WINDOW_CAPACITY,
};
pub use window::BoundedWindow;
