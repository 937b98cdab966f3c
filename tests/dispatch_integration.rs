//! Integration tests for the dispatch engine
//!
//! These tests verify the complete workflow of:
//! - Timer-driven sweeps with partial-failure tolerance
//! - Cooperative cancellation through pause and delete
//! - Sweep-level failure handling
//! - Restart recovery and idempotent re-arming

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Semaphore};

use herald::dispatch::{DispatchError, DispatchEvent};
use herald::models::{Campaign, CampaignStatus, DeliveryResult};
use herald::storage::{CampaignRepository, OutcomeLogRepository};

use common::{fast_config, service_with, text_payload, MockSender};

/// Guard against deadlocks while waiting for a specific event
async fn wait_for(
    events: &mut broadcast::Receiver<DispatchEvent>,
    pred: impl Fn(&DispatchEvent) -> bool,
) -> DispatchEvent {
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for dispatch event")
}

// ============================================================================
// End-to-End Sweep Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_end_to_end_sweep_with_partial_failure() {
    let sender = Arc::new(MockSender::new());
    sender.fail_chat(200);

    let (service, _store) = service_with(sender.clone(), fast_config());
    let mut events = service.subscribe();

    let id = service
        .create_campaign(
            "release notes",
            text_payload("v2 is out"),
            vec!["100".to_string(), "200".to_string(), "300".to_string()],
            "0 0 * * *",
        )
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepCompleted { .. })
    })
    .await;

    let detail = service.get_campaign_detail(id).unwrap();
    assert_eq!(detail.campaign.success_count, 2);
    assert_eq!(detail.campaign.failure_count, 1);
    assert_eq!(detail.campaign.status, CampaignStatus::Pending);
    assert!(detail.campaign.last_execute_time.is_some());
    assert!(detail.campaign.error_message.is_none());

    // Exactly one outcome entry per target, failures carrying detail
    assert_eq!(detail.logs.len(), 3);
    let failed: Vec<_> = detail
        .logs
        .iter()
        .filter(|e| e.result == DeliveryResult::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target, "200");
    assert!(failed[0].error_detail.is_some());

    assert_eq!(sender.delivered(), vec![100, 300]);

    // Stop the recurring schedule before the runtime winds down
    service.pause_campaign(id).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_completed_sweep_rearms_for_next_occurrence() {
    let sender = Arc::new(MockSender::new());
    let (service, _store) = service_with(sender, fast_config());
    let mut events = service.subscribe();

    let id = service
        .create_campaign(
            "daily ping",
            text_payload("ping"),
            vec!["1".to_string()],
            "0 0 * * *",
        )
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepCompleted { .. })
    })
    .await;

    // The recurring model returns to pending with a fresh timer installed
    assert!(service.registry().has_timer(id));
    let detail = service.get_campaign_detail(id).unwrap();
    assert_eq!(detail.campaign.status, CampaignStatus::Pending);
    assert!(detail.campaign.next_execute_time.is_some());

    service.pause_campaign(id).unwrap();
    assert!(!service.registry().has_timer(id));
}

#[tokio::test(start_paused = true)]
async fn test_cumulative_counters_across_sweeps() {
    let sender = Arc::new(MockSender::new());
    let (service, _store) = service_with(sender.clone(), fast_config());
    let mut events = service.subscribe();

    let id = service
        .create_campaign(
            "hourly ping",
            text_payload("ping"),
            vec!["1".to_string(), "2".to_string()],
            "0 * * * *",
        )
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepCompleted { .. })
    })
    .await;
    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepCompleted { .. })
    })
    .await;

    service.pause_campaign(id).unwrap();

    let detail = service.get_campaign_detail(id).unwrap();
    assert_eq!(detail.campaign.success_count, 4);
    assert_eq!(detail.campaign.failure_count, 0);
    assert_eq!(detail.logs.len(), 4);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_cancels_in_flight_sweep_cooperatively() {
    let gate = Arc::new(Semaphore::new(0));
    let sender = Arc::new(MockSender::new().gated(gate.clone()));
    let mut deliveries = sender.watch();

    let (service, _store) = service_with(sender.clone(), fast_config());
    let mut events = service.subscribe();

    let targets: Vec<String> = (1..=5).map(|i| i.to_string()).collect();
    let id = service
        .create_campaign("big blast", text_payload("hi"), targets, "0 0 * * *")
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepStarted { .. })
    })
    .await;

    // Let exactly two targets through, then request the pause
    gate.add_permits(2);
    deliveries.recv().await.unwrap();
    deliveries.recv().await.unwrap();
    service.pause_campaign(id).unwrap();
    gate.add_permits(16);

    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepCancelled { .. })
    })
    .await;

    // At most one more target after the flag was set
    let delivered = sender.delivered();
    assert!(delivered.len() <= 3, "delivered {delivered:?}");

    let detail = service.get_campaign_detail(id).unwrap();
    assert_eq!(detail.campaign.status, CampaignStatus::Paused);
    assert_eq!(detail.campaign.success_count, delivered.len() as u64);
    assert_eq!(detail.logs.len(), delivered.len());
    assert!(!service.registry().is_executing(id));
    assert!(!service.registry().has_timer(id));
}

#[tokio::test(start_paused = true)]
async fn test_delete_waits_for_sweep_then_cascades() {
    let gate = Arc::new(Semaphore::new(0));
    let sender = Arc::new(MockSender::new().gated(gate.clone()));

    let (service, store) = service_with(sender, fast_config());
    let service = Arc::new(service);
    let mut events = service.subscribe();

    let id = service
        .create_campaign(
            "short lived",
            text_payload("bye"),
            vec!["1".to_string(), "2".to_string()],
            "0 0 * * *",
        )
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepStarted { .. })
    })
    .await;

    let deleter = {
        let service = service.clone();
        tokio::spawn(async move { service.delete_campaign(id).await })
    };
    gate.add_permits(8);

    deleter.await.unwrap().unwrap();
    assert!(store.find_by_id(id).unwrap().is_none());
    assert!(store.find_by_campaign(id).unwrap().is_empty());
    assert!(!service.registry().is_executing(id));
}

#[tokio::test(start_paused = true)]
async fn test_delete_fails_loudly_when_sweep_does_not_stop() {
    let gate = Arc::new(Semaphore::new(0));
    let sender = Arc::new(MockSender::new().gated(gate.clone()));

    let mut config = fast_config();
    config.cancel_wait_attempts = 3;
    let (service, store) = service_with(sender, config);
    let mut events = service.subscribe();

    let id = service
        .create_campaign(
            "stuck",
            text_payload("hmm"),
            vec!["1".to_string(), "2".to_string(), "3".to_string()],
            "0 0 * * *",
        )
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepStarted { .. })
    })
    .await;

    // The sweep is blocked inside the transport and never observes the flag
    let err = service.delete_campaign(id).await.unwrap_err();
    assert!(matches!(err, DispatchError::StillRunning { .. }));

    // Nothing was half-deleted
    assert!(store.find_by_id(id).unwrap().is_some());

    // Unblock the sweep; the flag set by delete now pauses it
    gate.add_permits(8);
    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepCancelled { .. })
    })
    .await;

    // A second delete with the sweep stopped succeeds and cascades
    service.delete_campaign(id).await.unwrap();
    assert!(store.find_by_id(id).unwrap().is_none());
    assert!(store.find_by_campaign(id).unwrap().is_empty());
}

// ============================================================================
// Failure Handling Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unusable_transport_fails_campaign_until_restarted() {
    let sender = Arc::new(MockSender::new());
    sender.make_unavailable();

    let (service, _store) = service_with(sender, fast_config());
    let mut events = service.subscribe();

    let id = service
        .create_campaign(
            "doomed",
            text_payload("hi"),
            vec!["1".to_string(), "2".to_string()],
            "0 0 * * *",
        )
        .unwrap();

    wait_for(&mut events, |e| {
        matches!(e, DispatchEvent::SweepFailed { .. })
    })
    .await;

    let detail = service.get_campaign_detail(id).unwrap();
    assert_eq!(detail.campaign.status, CampaignStatus::Failed);
    assert!(detail
        .campaign
        .error_message
        .as_deref()
        .unwrap()
        .contains("transport is down"));
    // The first target was tallied before the abort; the second never ran
    assert_eq!(detail.campaign.failure_count, 1);
    assert_eq!(detail.logs.len(), 1);
    // No re-arm: a failed campaign does not recur on its own
    assert!(!service.registry().has_timer(id));

    // An explicit operator start clears the error and re-arms
    service.start_campaign(id).unwrap();
    let detail = service.get_campaign_detail(id).unwrap();
    assert_eq!(detail.campaign.status, CampaignStatus::Pending);
    assert!(detail.campaign.error_message.is_none());
    assert!(service.registry().has_timer(id));
}

// ============================================================================
// Recovery and Re-Arm Tests
// ============================================================================

#[tokio::test]
async fn test_recovery_rearms_running_and_pending_only() {
    let sender = Arc::new(MockSender::new());
    let (service, store) = service_with(sender, fast_config());

    let mut seeds = Vec::new();
    for (name, status) in [
        ("crashed-a", CampaignStatus::Running),
        ("crashed-b", CampaignStatus::Running),
        ("scheduled", CampaignStatus::Pending),
        ("stopped", CampaignStatus::Paused),
        ("broken", CampaignStatus::Failed),
    ] {
        let mut campaign = Campaign::new(
            name,
            text_payload("recover me"),
            vec!["1".to_string()],
            "0 0 * * *",
        );
        campaign.set_status(status);
        store.save(&campaign).unwrap();
        seeds.push((campaign.id, status));
    }

    let report = service.recover().await.unwrap();
    assert_eq!(report.repaired, 2);
    assert_eq!(report.rearmed, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(service.registry().timer_count(), 3);

    for (id, seeded_status) in seeds {
        let persisted = store.find_by_id(id).unwrap().unwrap();
        match seeded_status {
            CampaignStatus::Running | CampaignStatus::Pending => {
                // Crashed sweeps restart their recurring schedule from pending
                assert_eq!(persisted.status, CampaignStatus::Pending);
                assert!(service.registry().has_timer(id));
                assert!(persisted.next_execute_time.is_some());
            }
            _ => {
                // A crash must not silently resurrect paused or failed work
                assert!(!service.registry().has_timer(id));
                assert_eq!(persisted.status, seeded_status);
            }
        }
    }
}

#[tokio::test]
async fn test_recovery_isolates_campaigns_with_bad_schedules() {
    let sender = Arc::new(MockSender::new());
    let (service, store) = service_with(sender, fast_config());

    let mut broken = Campaign::new(
        "bad expression",
        text_payload("x"),
        vec!["1".to_string()],
        "not a cron",
    );
    broken.set_status(CampaignStatus::Running);
    store.save(&broken).unwrap();

    let healthy = Campaign::new(
        "good expression",
        text_payload("x"),
        vec!["1".to_string()],
        "0 0 * * *",
    );
    store.save(&healthy).unwrap();

    let report = service.recover().await.unwrap();
    assert_eq!(report.rearmed, 1);
    assert_eq!(report.failed, 1);

    // The broken campaign failed in place without taking the healthy one down
    let persisted = store.find_by_id(broken.id).unwrap().unwrap();
    assert_eq!(persisted.status, CampaignStatus::Failed);
    assert!(persisted.error_message.is_some());
    assert!(service.registry().has_timer(healthy.id));
}

#[tokio::test]
async fn test_recovery_survives_a_real_restart() {
    use herald::dispatch::CampaignService;
    use herald::sender::AcceptAllValidator;
    use herald::storage::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("herald.db");

    // First process: create a campaign, then simulate a crash mid-cycle
    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let service = CampaignService::new(
            store.clone(),
            store.clone(),
            Arc::new(MockSender::new()),
            Arc::new(AcceptAllValidator),
            fast_config(),
        );
        let id = service
            .create_campaign("survivor", text_payload("x"), vec!["1".to_string()], "0 0 * * *")
            .unwrap();

        let mut crashed = store.find_by_id(id).unwrap().unwrap();
        crashed.set_status(CampaignStatus::Running);
        store.save(&crashed).unwrap();
        // Process dies here; timers and flags are gone with it
    }

    // Second process: recovery re-arms from the persisted record alone
    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let service = CampaignService::new(
        store.clone(),
        store.clone(),
        Arc::new(MockSender::new()),
        Arc::new(AcceptAllValidator),
        fast_config(),
    );

    let report = service.recover().await.unwrap();
    assert_eq!(report.repaired, 1);
    assert_eq!(report.rearmed, 1);
    assert_eq!(service.registry().timer_count(), 1);

    let page = service.list_campaigns(1, 10).unwrap();
    assert_eq!(page.items[0].status, CampaignStatus::Pending);
    assert!(page.items[0].next_execute_time.is_some());
}

#[tokio::test]
async fn test_rearm_is_idempotent() {
    let sender = Arc::new(MockSender::new());
    let (service, _store) = service_with(sender, fast_config());

    let id = service
        .create_campaign(
            "armed once",
            text_payload("x"),
            vec!["1".to_string()],
            "0 0 * * *",
        )
        .unwrap();
    assert_eq!(service.registry().timer_count(), 1);

    // Redundant starts must never produce duplicate timers
    service.start_campaign(id).unwrap();
    service.start_campaign(id).unwrap();
    assert_eq!(service.registry().timer_count(), 1);

    // Recovery over an already-armed campaign keeps a single timer too
    let report = service.recover().await.unwrap();
    assert_eq!(report.rearmed, 0);
    assert_eq!(service.registry().timer_count(), 1);
}
