//! Campaign scheduler: timers, firing, and restart recovery
//!
//! Owns exactly one live timer per armed campaign. Arming computes the next
//! occurrence, persists it onto the record, and spawns a sleeping task that
//! hands off to the executor when the instant arrives. Re-arming is
//! idempotent: an existing timer for the same campaign is cancelled before the
//! new one is installed, so redundant calls (creation plus recovery, say) can
//! never produce duplicate fires.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::models::{Campaign, CampaignStatus, SweepResult};
use crate::sender::Sender;
use crate::storage::{CampaignRepository, OutcomeLogRepository};

use super::error::DispatchResult;
use super::executor::{SweepExecutor, SweepOutcome};
use super::registry::DispatchRegistry;
use super::trigger::CronSchedule;

/// Capacity of the dispatch event channel
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Events emitted by the dispatch engine
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A campaign was armed for its next occurrence
    Armed { id: Uuid, next: DateTime<Utc> },

    /// A sweep started executing
    SweepStarted { id: Uuid },

    /// A sweep finished its full target list
    SweepCompleted { id: Uuid, result: SweepResult },

    /// A sweep stopped early after observing a cancellation request
    SweepCancelled { id: Uuid, result: SweepResult },

    /// A sweep aborted on an unrecoverable error
    SweepFailed { id: Uuid, reason: String },
}

/// Shared engine state: collaborators, configuration, and live registry
///
/// One instance per process, shared by the scheduler, the executor, and the
/// lifecycle controller.
pub struct EngineContext {
    pub store: Arc<dyn CampaignRepository>,
    pub logs: Arc<dyn OutcomeLogRepository>,
    pub sender: Arc<dyn Sender>,
    pub registry: DispatchRegistry,
    pub config: DispatchConfig,
    events: broadcast::Sender<DispatchEvent>,
}

impl EngineContext {
    /// Assemble the shared context
    pub fn new(
        store: Arc<dyn CampaignRepository>,
        logs: Arc<dyn OutcomeLogRepository>,
        sender: Arc<dyn Sender>,
        config: DispatchConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            logs,
            sender,
            registry: DispatchRegistry::new(),
            config,
            events,
        }
    }

    /// Subscribe to dispatch events
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DispatchEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

/// Outcome of one restart recovery pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records found RUNNING with no live sweep, reset to PENDING
    pub repaired: usize,
    /// Campaigns re-armed with a live timer
    pub rearmed: usize,
    /// Campaigns whose re-arm failed (now FAILED)
    pub failed: usize,
}

/// The campaign scheduler
pub struct DispatchScheduler {
    ctx: Arc<EngineContext>,
}

impl DispatchScheduler {
    /// Create a scheduler over the shared context
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Subscribe to dispatch events
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.ctx.subscribe()
    }

    /// Compute and persist the next occurrence, then install the live timer
    ///
    /// Safe to call redundantly: any existing timer for the campaign is
    /// cancelled first. A schedule that fails to parse transitions the
    /// campaign to FAILED with the error recorded instead of propagating a
    /// panic into unrelated campaigns.
    pub fn arm(&self, campaign: &mut Campaign) -> DispatchResult<DateTime<Utc>> {
        Self::arm_with(&self.ctx, campaign)
    }

    fn arm_with(ctx: &Arc<EngineContext>, campaign: &mut Campaign) -> DispatchResult<DateTime<Utc>> {
        let schedule = match CronSchedule::parse(&campaign.schedule) {
            Ok(schedule) => schedule,
            Err(err) => {
                tracing::error!(
                    campaign_id = %campaign.id,
                    error = %err,
                    "Arming failed, campaign transitions to failed"
                );
                ctx.registry.cancel_timer(campaign.id);
                campaign.error_message = Some(err.to_string());
                campaign.set_status(CampaignStatus::Failed);
                if let Err(save_err) = ctx.store.save(campaign) {
                    tracing::error!(
                        campaign_id = %campaign.id,
                        error = %save_err,
                        "Failed to persist failed status"
                    );
                }
                return Err(err);
            }
        };

        let next = schedule.next_or_fallback(&Utc::now());
        campaign.next_execute_time = Some(next);
        campaign.error_message = None;
        ctx.store.save(campaign)?;

        Self::install(ctx, campaign.id, next);

        tracing::info!(
            campaign_id = %campaign.id,
            next = %next,
            "Campaign armed"
        );
        ctx.emit(DispatchEvent::Armed {
            id: campaign.id,
            next,
        });

        Ok(next)
    }

    /// Spawn the sleeping timer task and register its handle
    fn install(ctx: &Arc<EngineContext>, id: Uuid, next: DateTime<Utc>) {
        let task_ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            Self::handle_fire(task_ctx, id).await;
        });
        ctx.registry.install_timer(id, handle);
    }

    /// Cancel and remove the live timer if present; no-op if absent
    ///
    /// Does not touch the persisted status; that is the lifecycle
    /// controller's job.
    pub fn cancel(&self, id: Uuid) -> bool {
        self.ctx.registry.cancel_timer(id)
    }

    /// Timer callback: re-validate eligibility, flip to RUNNING, run the sweep
    async fn handle_fire(ctx: Arc<EngineContext>, id: Uuid) {
        // Our own entry is finished; drop it without aborting ourselves
        drop(ctx.registry.take_timer(id));

        let campaign = match ctx.store.find_by_id(id) {
            Ok(Some(campaign)) => campaign,
            Ok(None) => {
                tracing::warn!(campaign_id = %id, "Timer fired for a deleted campaign, skipping");
                return;
            }
            Err(err) => {
                tracing::error!(campaign_id = %id, error = %err, "Failed to load campaign on fire");
                return;
            }
        };

        if campaign.status != CampaignStatus::Pending {
            tracing::info!(
                campaign_id = %id,
                status = %campaign.status,
                "Campaign no longer eligible, skipping fire"
            );
            return;
        }

        let flag = match ctx.registry.begin_execution(id) {
            Some(flag) => flag,
            None => {
                tracing::warn!(campaign_id = %id, "A sweep is already in flight, skipping fire");
                return;
            }
        };

        let mut campaign = campaign;
        campaign.set_status(CampaignStatus::Running);
        campaign.last_execute_time = Some(Utc::now());
        if let Err(err) = ctx.store.save(&campaign) {
            tracing::error!(campaign_id = %id, error = %err, "Failed to persist running status");
            ctx.registry.end_execution(id);
            return;
        }

        ctx.emit(DispatchEvent::SweepStarted { id });
        let outcome = SweepExecutor::sweep(&ctx, id, &flag).await;
        Self::finish_sweep(&ctx, id, outcome);

        // Flag destroyed last: delete waits on it until the final writes land
        ctx.registry.end_execution(id);
    }

    /// Apply the sweep outcome to the persisted record
    ///
    /// Every branch re-checks existence before writing: a campaign deleted
    /// mid-sweep must not be resurrected by a final status update.
    fn finish_sweep(ctx: &Arc<EngineContext>, id: Uuid, outcome: SweepOutcome) {
        let reload = |label: &str| match ctx.store.find_by_id(id) {
            Ok(Some(campaign)) => Some(campaign),
            Ok(None) => {
                tracing::info!(
                    campaign_id = %id,
                    "Campaign deleted mid-sweep, abandoning {label} update"
                );
                None
            }
            Err(err) => {
                tracing::error!(campaign_id = %id, error = %err, "Failed to reload campaign");
                None
            }
        };

        match outcome {
            SweepOutcome::Skipped { reason } => {
                tracing::debug!(campaign_id = %id, reason, "Sweep skipped");
            }
            SweepOutcome::Completed(result) => {
                let Some(mut campaign) = reload("completion") else {
                    return;
                };
                campaign.record_sweep(&result);
                campaign.set_status(CampaignStatus::Pending);
                campaign.error_message = None;
                tracing::info!(
                    campaign_id = %id,
                    success = result.success_count,
                    failure = result.failure_count,
                    "Sweep completed"
                );
                // Recurring model: completion re-arms instead of terminating
                match Self::arm_with(ctx, &mut campaign) {
                    Ok(_) => ctx.emit(DispatchEvent::SweepCompleted { id, result }),
                    Err(err) => {
                        tracing::warn!(campaign_id = %id, error = %err, "Re-arm after sweep failed");
                    }
                }
            }
            SweepOutcome::Cancelled(result) => {
                ctx.registry.cancel_timer(id);
                let Some(mut campaign) = reload("pause") else {
                    return;
                };
                campaign.record_sweep(&result);
                campaign.set_status(CampaignStatus::Paused);
                if let Err(err) = ctx.store.save(&campaign) {
                    tracing::error!(campaign_id = %id, error = %err, "Failed to persist paused status");
                    return;
                }
                tracing::info!(
                    campaign_id = %id,
                    delivered = result.total(),
                    "Sweep cancelled cooperatively, campaign paused"
                );
                ctx.emit(DispatchEvent::SweepCancelled { id, result });
            }
            SweepOutcome::Failed { partial, reason } => {
                ctx.registry.cancel_timer(id);
                let Some(mut campaign) = reload("failure") else {
                    return;
                };
                campaign.record_sweep(&partial);
                campaign.error_message = Some(reason.clone());
                campaign.set_status(CampaignStatus::Failed);
                if let Err(err) = ctx.store.save(&campaign) {
                    tracing::error!(campaign_id = %id, error = %err, "Failed to persist failed status");
                    return;
                }
                tracing::error!(campaign_id = %id, reason = %reason, "Sweep failed");
                ctx.emit(DispatchEvent::SweepFailed { id, reason });
            }
        }
    }

    /// Restart recovery: re-arm every campaign the schedule still owns
    ///
    /// RUNNING records are repaired to PENDING first: execution flags are
    /// process-local, so a half-finished sweep cannot resume; its recurring
    /// schedule restarts instead. PAUSED and FAILED campaigns are left alone,
    /// a crash must not silently resurrect them.
    pub async fn recover(&self) -> DispatchResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let crashed = self.ctx.store.find_all_by_status(CampaignStatus::Running)?;
        for mut campaign in crashed {
            tracing::warn!(
                campaign_id = %campaign.id,
                "Found running record with no live sweep, restarting its schedule"
            );
            campaign.set_status(CampaignStatus::Pending);
            report.repaired += 1;
            match self.arm(&mut campaign) {
                Ok(_) => report.rearmed += 1,
                Err(_) => report.failed += 1,
            }
        }

        let pending = self.ctx.store.find_all_by_status(CampaignStatus::Pending)?;
        for mut campaign in pending {
            if self.ctx.registry.has_timer(campaign.id) {
                continue;
            }
            match self.arm(&mut campaign) {
                Ok(_) => report.rearmed += 1,
                Err(_) => report.failed += 1,
            }
        }

        tracing::info!(
            repaired = report.repaired,
            rearmed = report.rearmed,
            failed = report.failed,
            "Restart recovery finished"
        );
        Ok(report)
    }
}
