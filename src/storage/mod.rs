//! Durable storage for campaigns and per-target outcome logs
//!
//! The dispatch engine only depends on the repository traits defined in
//! [`repository`]; the SQLite implementation is the production backend and the
//! in-memory implementation backs tests and ephemeral runs.

pub mod repository;

pub use repository::{
    CampaignRepository, MemoryStore, OutcomeLogRepository, SqliteStore,
};
