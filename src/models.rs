// Core data structures for herald broadcast campaigns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message content delivered to every target of a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Plain text body
    Text { body: String },
    /// Image by stored reference (file id or URL)
    Image { reference: String },
    /// Document by stored reference (file id or URL)
    File { reference: String },
}

impl MessagePayload {
    /// Get string representation of the payload kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::File { .. } => "file",
        }
    }

    /// The textual content carried by the payload (body or reference)
    pub fn content(&self) -> &str {
        match self {
            Self::Text { body } => body,
            Self::Image { reference } | Self::File { reference } => reference,
        }
    }

    /// Check whether the payload carries any content at all
    pub fn is_empty(&self) -> bool {
        self.content().trim().is_empty()
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Scheduled, waiting for the next occurrence
    Pending,
    /// A sweep is currently executing
    Running,
    /// Operator-stopped, not scheduled
    Paused,
    /// Sweep aborted by an unrecoverable error; requires operator start
    Failed,
    /// Reserved for non-recurring variants; never produced by the recurring model
    Completed,
}

impl CampaignStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Whether an operator `start` is legal from this status
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Pending | Self::Paused | Self::Failed)
    }

    /// Whether an operator `pause` is legal from this status
    pub fn can_pause(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recurring broadcast campaign: payload + target list + cron schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Opaque unique identifier, assigned at creation
    pub id: Uuid,

    /// Operator-facing name
    pub name: String,

    /// Content delivered to every target
    pub payload: MessagePayload,

    /// Ordered target identifiers; never mutated after creation
    pub targets: Vec<String>,

    /// Cron trigger expression (5 fields, minute granularity)
    pub schedule: String,

    /// Current lifecycle status
    pub status: CampaignStatus,

    /// Cumulative successful deliveries across all sweeps
    pub success_count: u64,

    /// Cumulative failed deliveries across all sweeps
    pub failure_count: u64,

    /// Next computed fire instant, maintained by the scheduler
    pub next_execute_time: Option<DateTime<Utc>>,

    /// Start instant of the most recent sweep
    pub last_execute_time: Option<DateTime<Utc>>,

    /// Last fatal error, cleared on successful re-arm
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a new campaign in the initial Pending state
    pub fn new(
        name: impl Into<String>,
        payload: MessagePayload,
        targets: Vec<String>,
        schedule: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            targets,
            schedule: schedule.into(),
            status: CampaignStatus::Pending,
            success_count: 0,
            failure_count: 0,
            next_execute_time: None,
            last_execute_time: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total targets in one sweep
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Fold one sweep's tallies into the cumulative counters
    pub fn record_sweep(&mut self, result: &SweepResult) {
        self.success_count += result.success_count;
        self.failure_count += result.failure_count;
        self.updated_at = Utc::now();
    }

    /// Set status and bump the mutation timestamp
    pub fn set_status(&mut self, status: CampaignStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Per-target delivery outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryResult {
    Success,
    Failed,
}

impl DeliveryResult {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Append-only outcome record for a single target within a sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeLogEntry {
    /// Owning campaign
    pub campaign_id: Uuid,

    /// Target identifier as stored on the campaign
    pub target: String,

    /// Delivery outcome
    pub result: DeliveryResult,

    /// Error detail for failed deliveries
    pub error_detail: Option<String>,

    /// Outcome timestamp
    pub timestamp: DateTime<Utc>,
}

impl OutcomeLogEntry {
    /// Record a successful delivery
    pub fn success(campaign_id: Uuid, target: impl Into<String>) -> Self {
        Self {
            campaign_id,
            target: target.into(),
            result: DeliveryResult::Success,
            error_detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Record a failed delivery with its error detail
    pub fn failure(
        campaign_id: Uuid,
        target: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id,
            target: target.into(),
            result: DeliveryResult::Failed,
            error_detail: Some(detail.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate result of one completed (or partially completed) sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepResult {
    pub success_count: u64,
    pub failure_count: u64,
}

impl SweepResult {
    /// Total targets attempted
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Calculate success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            return 1.0;
        }
        self.success_count as f64 / self.total() as f64
    }
}

/// One page of a campaign listing
#[derive(Debug, Clone, Serialize)]
pub struct CampaignPage {
    pub items: Vec<Campaign>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}
