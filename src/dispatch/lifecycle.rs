//! Lifecycle controller: the state-machine guard over campaign operations
//!
//! All mutations of a campaign record flow through this controller. It
//! consults both the persisted status and the live registry: a listing must
//! show a campaign as running the moment its sweep is in flight, even before
//! the persisted record catches up, and an operator must not be able to start
//! a campaign whose sweep is still executing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::models::{
    Campaign, CampaignPage, CampaignStatus, MessagePayload, OutcomeLogEntry,
};
use crate::sender::{ContentValidator, Sender};
use crate::storage::{CampaignRepository, OutcomeLogRepository};

use super::error::{DispatchError, DispatchResult};
use super::registry::DispatchRegistry;
use super::scheduler::{DispatchEvent, DispatchScheduler, EngineContext, RecoveryReport};
use super::trigger::CronSchedule;

/// A campaign record together with its outcome log
#[derive(Debug, Clone)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    pub logs: Vec<OutcomeLogEntry>,
}

/// The administrative surface of the dispatch engine
pub struct CampaignService {
    ctx: Arc<EngineContext>,
    scheduler: DispatchScheduler,
    validator: Arc<dyn ContentValidator>,
}

impl CampaignService {
    /// Assemble the engine from its collaborators
    pub fn new(
        store: Arc<dyn CampaignRepository>,
        logs: Arc<dyn OutcomeLogRepository>,
        sender: Arc<dyn Sender>,
        validator: Arc<dyn ContentValidator>,
        config: DispatchConfig,
    ) -> Self {
        let ctx = Arc::new(EngineContext::new(store, logs, sender, config));
        let scheduler = DispatchScheduler::new(ctx.clone());
        Self {
            ctx,
            scheduler,
            validator,
        }
    }

    /// Subscribe to dispatch events
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.ctx.subscribe()
    }

    /// The live registry (timers and in-flight sweeps)
    pub fn registry(&self) -> &DispatchRegistry {
        &self.ctx.registry
    }

    /// Create a campaign and arm its first occurrence
    ///
    /// Validation happens before any state change: a rejected request leaves
    /// no record behind.
    pub fn create_campaign(
        &self,
        name: &str,
        payload: MessagePayload,
        targets: Vec<String>,
        schedule: &str,
    ) -> DispatchResult<Uuid> {
        if name.trim().is_empty() {
            return Err(DispatchError::validation("campaign name is empty"));
        }
        self.validator
            .validate(&payload)
            .map_err(|e| DispatchError::validation(e.reason))?;
        if targets.is_empty() {
            return Err(DispatchError::validation("target list is empty"));
        }
        if targets.len() > self.ctx.config.max_targets {
            return Err(DispatchError::validation(format!(
                "target count {} exceeds the maximum of {}",
                targets.len(),
                self.ctx.config.max_targets
            )));
        }
        CronSchedule::validate(schedule)?;

        let mut campaign = Campaign::new(name.trim(), payload, targets, schedule);
        let id = campaign.id;
        self.scheduler.arm(&mut campaign)?;

        tracing::info!(campaign_id = %id, name = %campaign.name, "Campaign created");
        Ok(id)
    }

    /// Arm a pending, paused, or failed campaign
    pub fn start_campaign(&self, id: Uuid) -> DispatchResult<()> {
        let mut campaign = self.load(id)?;

        if self.ctx.registry.is_executing(id) {
            return Err(DispatchError::illegal_state(
                "start",
                CampaignStatus::Running,
            ));
        }
        if !campaign.status.can_start() {
            return Err(DispatchError::illegal_state("start", campaign.status));
        }

        campaign.set_status(CampaignStatus::Pending);
        campaign.error_message = None;
        self.scheduler.arm(&mut campaign)?;

        tracing::info!(campaign_id = %id, "Campaign started");
        Ok(())
    }

    /// Stop scheduling a campaign; an in-flight sweep is asked to stop
    /// cooperatively
    ///
    /// With a sweep in flight the status flip is asynchronous: the sweep
    /// observes the flag at its next loop iteration, bounded by the per-target
    /// delay.
    pub fn pause_campaign(&self, id: Uuid) -> DispatchResult<()> {
        let mut campaign = self.load(id)?;

        if let Some(flag) = self.ctx.registry.execution_flag(id) {
            flag.request_stop();
            self.scheduler.cancel(id);
            tracing::info!(
                campaign_id = %id,
                "Pause requested; the sweep will stop at its next check"
            );
            return Ok(());
        }

        if !campaign.status.can_pause() {
            return Err(DispatchError::illegal_state("pause", campaign.status));
        }

        self.scheduler.cancel(id);
        campaign.set_status(CampaignStatus::Paused);
        self.ctx.store.save(&campaign)?;

        tracing::info!(campaign_id = %id, "Campaign paused");
        Ok(())
    }

    /// Delete a campaign and cascade-delete its outcome log
    ///
    /// A running campaign is asked to stop and the call blocks within the
    /// configured budget; if the sweep does not acknowledge in time the delete
    /// fails loudly instead of leaving a half-deleted record.
    pub async fn delete_campaign(&self, id: Uuid) -> DispatchResult<()> {
        self.load(id)?;

        if let Some(flag) = self.ctx.registry.execution_flag(id) {
            flag.request_stop();
            self.scheduler.cancel(id);

            let mut stopped = false;
            for _ in 0..self.ctx.config.cancel_wait_attempts {
                if !self.ctx.registry.is_executing(id) {
                    stopped = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(self.ctx.config.cancel_wait_ms)).await;
            }
            if !stopped {
                tracing::warn!(
                    campaign_id = %id,
                    "Sweep did not acknowledge cancellation within the delete budget"
                );
                return Err(DispatchError::StillRunning { id });
            }
        }

        self.scheduler.cancel(id);
        self.ctx.logs.delete_by_campaign(id)?;
        self.ctx.store.delete(id)?;

        tracing::info!(campaign_id = %id, "Campaign deleted");
        Ok(())
    }

    /// Fetch a campaign and its outcome log
    pub fn get_campaign_detail(&self, id: Uuid) -> DispatchResult<CampaignDetail> {
        let mut campaign = self.load(id)?;
        self.overlay_live_status(&mut campaign);
        let logs = self.ctx.logs.find_by_campaign(id)?;
        Ok(CampaignDetail { campaign, logs })
    }

    /// One page of campaigns, newest first, with the live running overlay
    pub fn list_campaigns(&self, page: usize, size: usize) -> DispatchResult<CampaignPage> {
        let mut result = self.ctx.store.list(page, size)?;
        for campaign in &mut result.items {
            self.overlay_live_status(campaign);
        }
        Ok(result)
    }

    /// Restart recovery; call once at process start
    pub async fn recover(&self) -> DispatchResult<RecoveryReport> {
        self.scheduler.recover().await
    }

    /// Stop all timers and ask in-flight sweeps to wind down
    pub async fn shutdown(&self) {
        self.ctx.registry.shutdown();
        for _ in 0..self.ctx.config.cancel_wait_attempts {
            if self.ctx.registry.executing_ids().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(self.ctx.config.cancel_wait_ms)).await;
        }
        tracing::warn!("Some sweeps were still winding down at shutdown");
    }

    /// The live registry is the source of truth for "is it executing right
    /// now"; the override is view-only and never written back
    fn overlay_live_status(&self, campaign: &mut Campaign) {
        if self.ctx.registry.is_executing(campaign.id) {
            campaign.status = CampaignStatus::Running;
        }
    }

    fn load(&self, id: Uuid) -> DispatchResult<Campaign> {
        self.ctx
            .store
            .find_by_id(id)?
            .ok_or(DispatchError::NotFound { id })
    }
}
