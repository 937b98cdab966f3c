//! Sweep execution: one throttled pass over a campaign's target list
//!
//! Targets are processed strictly in stored order, one at a time. The
//! inter-send delay is the system's sole throttle against the shared delivery
//! transport, and it is randomized to avoid synchronized bursts across
//! campaigns. A failing target is data, not control flow: it becomes an
//! outcome log entry and a counter bump, and the sweep moves on. Only a
//! transport or store that is unusable as a whole aborts the sweep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use crate::models::{CampaignStatus, MessagePayload, OutcomeLogEntry, SweepResult};
use crate::sender::{SenderError, TargetAddress};

use super::registry::ExecutionFlag;
use super::scheduler::EngineContext;

/// How one sweep ended
#[derive(Debug, Clone)]
pub enum SweepOutcome {
    /// The full target list was attempted
    Completed(SweepResult),
    /// The cancellation flag was observed; partial tallies included
    Cancelled(SweepResult),
    /// The sweep itself became unusable
    Failed { partial: SweepResult, reason: String },
    /// Preconditions failed; nothing was attempted
    Skipped { reason: &'static str },
}

/// Executes sweeps against the engine context
pub struct SweepExecutor;

impl SweepExecutor {
    /// Run one sweep of the campaign
    ///
    /// The persisted status is re-checked on entry: a campaign deleted or
    /// paused between the timer firing and the sweep starting must not be
    /// swept.
    pub async fn sweep(ctx: &EngineContext, id: Uuid, flag: &ExecutionFlag) -> SweepOutcome {
        let campaign = match ctx.store.find_by_id(id) {
            Ok(Some(campaign)) => campaign,
            Ok(None) => return SweepOutcome::Skipped { reason: "deleted" },
            Err(err) => {
                return SweepOutcome::Failed {
                    partial: SweepResult::default(),
                    reason: format!("failed to load campaign: {err:#}"),
                }
            }
        };

        if campaign.status != CampaignStatus::Running {
            return SweepOutcome::Skipped {
                reason: "not running",
            };
        }

        let timeout = Duration::from_secs(ctx.config.sender_timeout_secs);
        let mut result = SweepResult::default();
        let mut batch: Vec<OutcomeLogEntry> = Vec::with_capacity(ctx.config.batch_size);

        tracing::info!(
            campaign_id = %id,
            targets = campaign.targets.len(),
            "Sweep started"
        );

        for target in &campaign.targets {
            if flag.stop_requested() {
                if let Err(err) = Self::flush(ctx, &mut batch) {
                    tracing::warn!(campaign_id = %id, error = %err, "Final flush after cancel failed");
                }
                tracing::info!(
                    campaign_id = %id,
                    delivered = result.total(),
                    "Cancellation observed, stopping sweep"
                );
                return SweepOutcome::Cancelled(result);
            }

            Self::throttle(ctx.config.base_delay_ms).await;

            match Self::dispatch_one(ctx, target, &campaign.payload, timeout).await {
                Ok(()) => {
                    result.success_count += 1;
                    batch.push(OutcomeLogEntry::success(id, target.clone()));
                    tracing::debug!(campaign_id = %id, target = %target, "Delivered");
                }
                Err(err) => {
                    result.failure_count += 1;
                    batch.push(OutcomeLogEntry::failure(id, target.clone(), err.to_string()));
                    tracing::warn!(
                        campaign_id = %id,
                        target = %target,
                        error = %err,
                        "Delivery failed"
                    );

                    if err.is_fatal() {
                        if let Err(flush_err) = Self::flush(ctx, &mut batch) {
                            tracing::warn!(campaign_id = %id, error = %flush_err, "Flush on abort failed");
                        }
                        return SweepOutcome::Failed {
                            partial: result,
                            reason: err.to_string(),
                        };
                    }
                }
            }

            if batch.len() >= ctx.config.batch_size {
                if let Err(err) = Self::flush(ctx, &mut batch) {
                    return SweepOutcome::Failed {
                        partial: result,
                        reason: format!("outcome log write failed: {err:#}"),
                    };
                }
            }
        }

        if let Err(err) = Self::flush(ctx, &mut batch) {
            return SweepOutcome::Failed {
                partial: result,
                reason: format!("outcome log write failed: {err:#}"),
            };
        }

        SweepOutcome::Completed(result)
    }

    /// Sleep a randomized delay uniform in `[base, 2·base]`
    async fn throttle(base_ms: u64) {
        if base_ms == 0 {
            return;
        }
        let delay_ms = {
            let mut rng = rand::thread_rng();
            rng.gen_range(base_ms..=base_ms * 2)
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    /// Parse, resolve, and deliver a single target, each step timeout-bounded
    async fn dispatch_one(
        ctx: &EngineContext,
        target: &str,
        payload: &MessagePayload,
        timeout: Duration,
    ) -> Result<(), SenderError> {
        let address = TargetAddress::parse(target)?;
        let resolved = Self::bounded(timeout, ctx.sender.resolve(&address)).await?;
        Self::bounded(timeout, ctx.sender.deliver(&resolved, payload)).await
    }

    /// Bound a sender call; a timeout is a per-target failure, not a sweep
    /// failure
    async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, SenderError>
    where
        F: Future<Output = Result<T, SenderError>>,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SenderError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    /// Flush the pending outcome batch if non-empty
    fn flush(ctx: &EngineContext, batch: &mut Vec<OutcomeLogEntry>) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        ctx.logs.append_batch(batch)?;
        batch.clear();
        Ok(())
    }
}
