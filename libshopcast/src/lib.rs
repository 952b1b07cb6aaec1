//! Shopcast - scheduled product posts for social platforms
//!
//! This library holds the publishing pipeline behind the `shop-*` tools:
//! the post store, queue planners, the dispatcher that claims and publishes
//! due posts, the per-platform adapters and the engagement sync.

pub mod catalog;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod generation;
pub mod logging;
pub mod planner;
pub mod platforms;
pub mod polling;
pub mod scheduling;
pub mod service;
pub mod settings;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use dispatcher::{BatchResult, DispatchStatus, Dispatcher};
pub use error::{ConfigError, DbError, PlatformError, Result, ShopcastError};
pub use service::ShopcastService;
pub use settings::{Credentials, PlatformToken};
pub use sync::{SyncReport, SyncScope};
pub use types::{
    AutopilotSettings, MetricsSnapshot, Platform, PostStatus, Product, Published, ScheduledPost,
};
