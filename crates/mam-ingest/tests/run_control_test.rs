mod helpers;

use helpers::{Fault, Harness};
use mam_core::{AssetStatus, PipelineStage};
use mam_ingest::IngestError;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::oneshot;

/// Poll until `check` holds; the pipeline runs on other tasks.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_cancel_fails_run_and_cleans_up() {
    let h = Harness::builder().hang_at(Fault::Segment).build();
    let created = h.service.ingest_asset(h.request("Demo")).await.unwrap();

    eventually(|| !h.events.with_prefix("transcoder:segment").is_empty()).await;
    assert_eq!(h.service.active_runs(), vec![created.id]);
    assert!(!h.work_dir_entries().is_empty());

    assert!(h.service.cancel(created.id));
    let asset = h.service.wait_for(created.id).await.unwrap().unwrap();

    assert_eq!(asset.status, AssetStatus::Failed);
    let info = asset.error_info.unwrap();
    assert_eq!(info.message, "cancelled");
    assert_eq!(info.stage, PipelineStage::Segment);
    assert_eq!(info.error_code, "CANCELLED");

    assert!(h.work_dir_entries().is_empty());
    assert!(h.service.active_runs().is_empty());
    assert!(!h.service.cancel(created.id));
}

#[tokio::test]
async fn test_run_deadline_fails_run() {
    let h = Harness::builder()
        .deadline(Duration::from_millis(300))
        .call_timeout(Duration::from_millis(300))
        .hang_at(Fault::Probe)
        .build();

    let created = h.service.ingest_asset(h.request("Demo")).await.unwrap();
    let asset = h.service.wait_for(created.id).await.unwrap().unwrap();

    assert_eq!(asset.status, AssetStatus::Failed);
    let info = asset.error_info.unwrap();
    assert_eq!(info.message, "deadline exceeded");
    assert_eq!(info.stage, PipelineStage::ExtractMetadata);
    assert!(h.work_dir_entries().is_empty());
}

#[tokio::test]
async fn test_call_timeout_applies_per_external_call() {
    let h = Harness::builder()
        .deadline(Duration::from_secs(30))
        .call_timeout(Duration::from_millis(200))
        .hang_at(Fault::Register(1))
        .build();

    let created = h.service.ingest_asset(h.request("Demo")).await.unwrap();
    let asset = h.service.wait_for(created.id).await.unwrap().unwrap();

    let info = asset.error_info.unwrap();
    assert_eq!(info.message, "deadline exceeded");
    assert_eq!(info.stage, PipelineStage::RegisterSegment);
    assert_eq!(info.segment_index, Some(1));
    assert!(info.detail.contains("registry.register_segment exceeded its 200ms timeout"));
    assert_eq!(h.registry.registered_ranges().len(), 1);
}

#[tokio::test]
async fn test_aborted_caller_does_not_cancel_run() {
    let h = Harness::builder()
        .probe_delay(Duration::from_millis(100))
        .build();

    let (created_tx, created_rx) = oneshot::channel();
    let service = h.service.clone();
    let request = h.request("Demo");
    let caller = tokio::spawn(async move {
        let asset = service.ingest_asset(request).await.unwrap();
        created_tx.send(asset.id).unwrap();
        // The handler goes on to wait for something that never comes.
        std::future::pending::<()>().await;
    });

    let asset_id = created_rx.await.unwrap();
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    let asset = h.service.wait_for(asset_id).await.unwrap().unwrap();
    assert_eq!(asset.status, AssetStatus::Ready);
    assert!(asset.error_info.is_none());
    assert_eq!(h.registry.registered_ranges().len(), 3);
}

#[tokio::test]
async fn test_panicking_run_still_reaches_failed() {
    let h = Harness::builder().panic_at(Fault::Thumbnail).build();

    let created = h.service.ingest_asset(h.request("Demo")).await.unwrap();
    let asset = h.service.wait_for(created.id).await.unwrap().unwrap();

    assert_eq!(asset.status, AssetStatus::Failed);
    let info = asset.error_info.unwrap();
    assert_eq!(info.stage, PipelineStage::GenerateThumbnail);
    assert_eq!(info.error_code, "INTERNAL_FAILURE");
    assert!(info.detail.contains("injected panic"), "{}", info.detail);

    assert!(h.service.active_runs().is_empty());
    assert!(!h.service.cancel(created.id));
    assert!(h.work_dir_entries().is_empty());
    assert_eq!(
        h.events.with_prefix("observer:transition").last().unwrap(),
        "observer:transition:processing->failed"
    );
}

#[tokio::test]
async fn test_implausible_media_duration_fails_run() {
    for bogus in [1e20, 1e9] {
        let h = Harness::builder().build();
        *h.transcoder.reported_duration_secs.lock().unwrap() = Some(bogus);

        let created = h.service.ingest_asset(h.request("Demo")).await.unwrap();
        let asset = h.service.wait_for(created.id).await.unwrap().unwrap();

        assert_eq!(asset.status, AssetStatus::Failed, "duration {}", bogus);
        let info = asset.error_info.unwrap();
        assert_eq!(info.stage, PipelineStage::ExtractMetadata);
        assert_eq!(info.error_code, "TRANSCODE_FAILURE");
        assert!(h.events.with_prefix("transcoder:segment").is_empty());
        assert!(h.service.active_runs().is_empty());
        assert!(h.work_dir_entries().is_empty());
    }
}

#[tokio::test]
async fn test_runs_are_bounded_by_max_concurrency() {
    let h = Harness::builder()
        .max_concurrent(2)
        .probe_delay(Duration::from_millis(50))
        .build();

    let mut ids = Vec::new();
    for i in 0..5 {
        let created = h
            .service
            .ingest_asset(h.request(&format!("Clip {}", i)))
            .await
            .unwrap();
        ids.push(created.id);
    }

    for id in ids {
        let asset = h.service.wait_for(id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Ready);
    }

    let peak = h.transcoder.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 2, "{} runs probed concurrently", peak);
    assert!(h.work_dir_entries().is_empty());
}

#[tokio::test]
async fn test_queued_run_can_be_cancelled_before_it_starts() {
    let h = Harness::builder()
        .max_concurrent(1)
        .hang_at(Fault::Probe)
        .build();

    let running = h.service.ingest_asset(h.request("First")).await.unwrap();
    let queued = h.service.ingest_asset(h.request("Second")).await.unwrap();
    eventually(|| !h.events.with_prefix("transcoder:probe").is_empty()).await;

    assert!(h.service.cancel(queued.id));
    let asset = h.service.wait_for(queued.id).await.unwrap().unwrap();
    assert_eq!(asset.status, AssetStatus::Failed);
    assert_eq!(asset.error_info.unwrap().message, "cancelled");
    // Never reached the registry.
    assert_eq!(asset.source_id, None);

    assert!(h.service.cancel(running.id));
    h.service.wait_for(running.id).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_active_runs() {
    let h = Harness::builder()
        .max_concurrent(1)
        .hang_at(Fault::Thumbnail)
        .build();

    let a = h.service.ingest_asset(h.request("A")).await.unwrap();
    let b = h.service.ingest_asset(h.request("B")).await.unwrap();
    eventually(|| !h.events.with_prefix("transcoder:thumbnail").is_empty()).await;

    h.service.shutdown().await;
    assert!(h.service.active_runs().is_empty());

    for id in [a.id, b.id] {
        let asset = h.service.get_asset(id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Failed);
        assert_eq!(asset.error_info.unwrap().message, "cancelled");
    }
    assert!(h.work_dir_entries().is_empty());

    let err = h.service.ingest_asset(h.request("C")).await.unwrap_err();
    assert!(matches!(err, IngestError::Cancelled));
}
