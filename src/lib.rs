//! herald - Scheduled Broadcast Campaign Dispatcher
//!
//! A recurring-broadcast engine: campaigns pair a message payload with a large
//! target list and a cron schedule, and every occurrence sweeps the full list
//! at a throttled rate with per-target outcome logging, cooperative
//! pause/delete, and automatic restart recovery.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`dispatch`] - The scheduled dispatch engine (scheduler, executor, lifecycle)
//! - [`models`] - Core data structures and types
//! - [`sender`] - Delivery boundary: target addressing and transports
//! - [`storage`] - Campaign records and outcome logs (SQLite, in-memory)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use herald::config::Config;
//! use herald::dispatch::CampaignService;
//! use herald::models::MessagePayload;
//! use herald::sender::{AcceptAllValidator, WebhookSender};
//! use herald::storage::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(SqliteStore::open(&config.database.sqlite_path)?);
//!     let sender = Arc::new(WebhookSender::new(
//!         config.gateway.url.clone(),
//!         Duration::from_secs(config.dispatch.sender_timeout_secs),
//!     )?);
//!
//!     let service = CampaignService::new(
//!         store.clone(),
//!         store,
//!         sender,
//!         Arc::new(AcceptAllValidator),
//!         config.dispatch.clone(),
//!     );
//!
//!     service.recover().await?;
//!
//!     let id = service.create_campaign(
//!         "launch notice",
//!         MessagePayload::Text { body: "we are live".into() },
//!         vec!["1001".into(), "@subscribers".into()],
//!         "0 9 * * *",
//!     )?;
//!     println!("campaign {id} armed");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod sender;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, DispatchConfig};
    pub use crate::dispatch::{
        CampaignDetail, CampaignService, CronSchedule, DispatchError, DispatchEvent,
        DispatchResult, RecoveryReport, SweepOutcome,
    };
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{
        Campaign, CampaignPage, CampaignStatus, DeliveryResult, MessagePayload, OutcomeLogEntry,
        SweepResult,
    };
    pub use crate::sender::{Sender, SenderError, TargetAddress};
    pub use crate::storage::{CampaignRepository, OutcomeLogRepository, SqliteStore};
}

// Direct re-exports for convenience
pub use models::{Campaign, CampaignStatus, MessagePayload, SweepResult};
