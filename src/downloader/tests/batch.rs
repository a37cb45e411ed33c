#![cfg(unix)]

use crate::downloader::test_helpers::{
    TEST_APP_ID, all_success_script, create_test_downloader_with_script, fake_success,
};
use crate::error::{Error, FetchError};
use crate::steamcmd::scratch_root;
use crate::types::{Event, ItemId, NewItem, Status};

fn id(s: &str) -> ItemId {
    ItemId(s.to_string())
}

fn new_item(id: &str) -> NewItem {
    NewItem {
        id: id.to_string(),
        source_url: None,
        title: None,
        dependencies: Vec::new(),
    }
}

fn new_item_with_deps(id: &str, deps: &[&str]) -> NewItem {
    NewItem {
        id: id.to_string(),
        source_url: None,
        title: None,
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_empty_queue_yields_empty_summary() {
    let ctx = create_test_downloader_with_script(|_| "exit 0".to_string()).await;

    let summary = ctx.downloader.download_queued().await.unwrap();
    assert!(summary.is_empty());
}

#[tokio::test]
async fn test_dependency_scenario_both_items_complete_and_relocate() {
    // Queue = [A(deps:[]), B(deps:[A])] — where A is "101", B is "202".
    // The closure of {101, 202} is {101, 202}; the simulated tool reports
    // ItemStart/ItemSuccess for both and exits 0.
    let ctx = create_test_downloader_with_script(|staging| {
        all_success_script(staging, &["101", "202"])
    })
    .await;

    ctx.downloader.add_item(new_item("101")).await.unwrap();
    ctx.downloader
        .add_item(new_item_with_deps("202", &["101"]))
        .await
        .unwrap();

    let summary = ctx.downloader.download_queued().await.unwrap();

    let mut completed = summary.completed.clone();
    completed.sort();
    assert_eq!(completed, vec![id("101"), id("202")]);
    assert!(summary.failed.is_empty());

    // Both payloads relocated into the target directory
    assert!(ctx.target().join("101").join("mod.info").is_file());
    assert!(ctx.target().join("202").join("mod.info").is_file());

    // Queue store reflects Completed for both
    for item in ["101", "202"] {
        let info = ctx.downloader.item(&id(item)).await.unwrap().unwrap();
        assert_eq!(info.status, Status::Completed, "item {item}");
    }

    // History has one record per item
    assert_eq!(ctx.downloader.history_count(None).await.unwrap(), 2);

    // Scratch hierarchy is gone after a fully successful batch
    assert!(!scratch_root(&ctx.staging()).exists());
}

#[tokio::test]
async fn test_closure_pulls_dependency_missing_from_queue() {
    // Only B is enqueued; its dependency A enters the batch via expansion
    let ctx = create_test_downloader_with_script(|staging| {
        all_success_script(staging, &["202", "101"])
    })
    .await;

    ctx.downloader
        .add_item(new_item_with_deps("202", &["101"]))
        .await
        .unwrap();

    let summary = ctx.downloader.download_queued().await.unwrap();
    assert_eq!(summary.completed.len(), 2);

    let dep = ctx.downloader.item(&id("101")).await.unwrap();
    assert!(
        dep.is_some(),
        "expanded dependency must be tracked as a queue item"
    );
    assert_eq!(dep.unwrap().status, Status::Completed);
    assert!(ctx.target().join("101").is_dir());
}

#[tokio::test]
async fn test_mixed_batch_relocates_only_successes() {
    // A and C succeed, B fails: only A and C may be relocated, B records
    // Failed with the tool's reason.
    let ctx = create_test_downloader_with_script(|staging| {
        let mut body = String::from("echo \"Logged in OK\"\n");
        body.push_str(&fake_success(staging, "a1"));
        body.push_str("echo \"ERROR! Download item b2 failed (Timeout).\"\n");
        body.push_str(&fake_success(staging, "c3"));
        body.push_str("exit 0");
        body
    })
    .await;

    for item in ["a1", "b2", "c3"] {
        ctx.downloader.add_item(new_item(item)).await.unwrap();
    }

    let summary = ctx.downloader.download_queued().await.unwrap();

    let mut completed = summary.completed.clone();
    completed.sort();
    assert_eq!(completed, vec![id("a1"), id("c3")]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, id("b2"));
    assert_eq!(summary.failed[0].1, "Timeout");

    assert!(ctx.target().join("a1").is_dir());
    assert!(ctx.target().join("c3").is_dir());
    assert!(!ctx.target().join("b2").exists());

    let b = ctx.downloader.item(&id("b2")).await.unwrap().unwrap();
    assert_eq!(b.status, Status::Failed);
    assert_eq!(b.error_message.as_deref(), Some("Timeout"));

    // History carries the per-item outcomes including the failure reason
    let failed_history = ctx
        .downloader
        .history(Some(Status::Failed), 10, 0)
        .await
        .unwrap();
    assert_eq!(failed_history.len(), 1);
    assert_eq!(failed_history[0].item_id, id("b2"));
    assert_eq!(failed_history[0].error_message.as_deref(), Some("Timeout"));
}

#[tokio::test]
async fn test_reported_success_without_payload_is_corrupt_download() {
    // The tool claims success but never writes a payload directory
    let ctx = create_test_downloader_with_script(|_| {
        "echo \"Logged in OK\"\n\
         echo \"Success. Downloaded item 404 to \\\"/nowhere\\\" (1 bytes)\"\n\
         exit 0"
            .to_string()
    })
    .await;

    // Seed some scratch content so preservation is observable
    let other_payload = ctx
        .staging()
        .join("steamapps/workshop/content")
        .join(TEST_APP_ID)
        .join("999");
    std::fs::create_dir_all(&other_payload).unwrap();

    ctx.downloader.add_item(new_item("404")).await.unwrap();

    let summary = ctx.downloader.download_queued().await.unwrap();
    assert!(summary.completed.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert!(
        summary.failed[0].1.contains("no payload"),
        "failure reason should name the corrupt download, got: {}",
        summary.failed[0].1
    );

    let info = ctx.downloader.item(&id("404")).await.unwrap().unwrap();
    assert_eq!(info.status, Status::Failed);

    // Scratch is preserved for inspection
    assert!(scratch_root(&ctx.staging()).exists());
}

#[tokio::test]
async fn test_unreported_item_fails_for_safety() {
    let ctx = create_test_downloader_with_script(|staging| {
        // Only item 1 is ever mentioned; item 2 vanishes from the output
        let mut body = String::from("echo \"Logged in OK\"\n");
        body.push_str(&fake_success(staging, "1"));
        body.push_str("exit 0");
        body
    })
    .await;

    ctx.downloader.add_item(new_item("1")).await.unwrap();
    ctx.downloader.add_item(new_item("2")).await.unwrap();

    let summary = ctx.downloader.download_queued().await.unwrap();
    assert_eq!(summary.completed, vec![id("1")]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, id("2"));

    let info = ctx.downloader.item(&id("2")).await.unwrap().unwrap();
    assert_eq!(info.status, Status::Failed);
}

#[tokio::test]
async fn test_login_failure_requeues_whole_batch() {
    let ctx = create_test_downloader_with_script(|_| {
        "echo \"FAILED login with result code Invalid Password\"\nexit 5".to_string()
    })
    .await;

    ctx.downloader.add_item(new_item("1")).await.unwrap();
    ctx.downloader.add_item(new_item("2")).await.unwrap();
    let mut events = ctx.downloader.subscribe();

    let result = ctx.downloader.download_queued().await;
    match result {
        Err(Error::Fetch(FetchError::LoginFailed(reason))) => {
            assert_eq!(reason, "Invalid Password");
        }
        other => panic!("expected LoginFailed, got {other:?}"),
    }

    // Every member requeued untouched, nothing failed, no history
    for item in ["1", "2"] {
        let info = ctx.downloader.item(&id(item)).await.unwrap().unwrap();
        assert_eq!(info.status, Status::Queued, "item {item}");
        assert!(info.error_message.is_none());
    }
    assert_eq!(ctx.downloader.history_count(None).await.unwrap(), 0);

    // One aggregated failure event, not one per item
    let mut batch_failures = 0;
    while let Ok(event) = events.try_recv() {
        if let Event::BatchFailed { error, requeued } = event {
            assert!(error.contains("Invalid Password"));
            assert_eq!(requeued, 2);
            batch_failures += 1;
        }
    }
    assert_eq!(batch_failures, 1);
}

#[tokio::test]
async fn test_abnormal_exit_without_outcomes_requeues_batch() {
    let ctx = create_test_downloader_with_script(|_| "exit 42".to_string()).await;

    ctx.downloader.add_item(new_item("1")).await.unwrap();

    let result = ctx.downloader.download_queued().await;
    assert!(
        matches!(
            result,
            Err(Error::Fetch(FetchError::AbnormalExit { code: Some(42) }))
        ),
        "got: {result:?}"
    );

    let info = ctx.downloader.item(&id("1")).await.unwrap().unwrap();
    assert_eq!(info.status, Status::Queued);
}

#[tokio::test]
async fn test_unusable_tool_path_is_config_error_and_touches_nothing() {
    let ctx = create_test_downloader_with_script(|_| "exit 0".to_string()).await;

    ctx.downloader.add_item(new_item("1")).await.unwrap();

    // Break the tool path after construction
    let mut config = (*ctx.downloader.get_config()).clone();
    config.tool.steamcmd_path = Some(ctx.temp.path().join("gone"));
    let broken = crate::downloader::WorkshopDownloader::new(config).await.unwrap();

    let result = broken.download_queued().await;
    assert!(
        matches!(result, Err(Error::Config { .. })),
        "got: {result:?}"
    );

    // No state change: the item is still simply queued
    let info = broken.item(&id("1")).await.unwrap().unwrap();
    assert_eq!(info.status, Status::Queued);

    broken.db.close().await;
}

#[tokio::test]
async fn test_rate_limited_item_is_requeued_not_failed() {
    let ctx = create_test_downloader_with_script(|staging| {
        let mut body = String::from("echo \"Logged in OK\"\n");
        body.push_str(&fake_success(staging, "1"));
        body.push_str("echo \"ERROR! Download item 2 failed (Rate Limited).\"\n");
        body.push_str("exit 0");
        body
    })
    .await;

    ctx.downloader.add_item(new_item("1")).await.unwrap();
    ctx.downloader.add_item(new_item("2")).await.unwrap();

    let summary = ctx.downloader.download_queued().await.unwrap();
    assert_eq!(summary.completed, vec![id("1")]);
    assert_eq!(summary.requeued, vec![id("2")]);
    assert!(summary.failed.is_empty());

    let info = ctx.downloader.item(&id("2")).await.unwrap().unwrap();
    assert_eq!(
        info.status,
        Status::Queued,
        "rate-limited items retry on a future run"
    );
}

#[tokio::test]
async fn test_auto_clear_removes_completed_entries() {
    let ctx =
        create_test_downloader_with_script(|staging| all_success_script(staging, &["1"])).await;

    // Flip auto-clear on for this run
    let mut config = (*ctx.downloader.get_config()).clone();
    config.download.auto_clear_queue = true;
    let downloader = crate::downloader::WorkshopDownloader::new(config).await.unwrap();

    downloader.add_item(new_item("1")).await.unwrap();
    let summary = downloader.download_queued().await.unwrap();
    assert_eq!(summary.completed, vec![id("1")]);

    // Entry cleared from the queue, but history still records the outcome
    assert!(downloader.item(&id("1")).await.unwrap().is_none());
    assert_eq!(downloader.history_count(None).await.unwrap(), 1);

    downloader.db.close().await;
}

#[tokio::test]
async fn test_second_trigger_while_fetching_is_rejected() {
    let ctx = create_test_downloader_with_script(|staging| {
        // Hold the batch open long enough for the second trigger
        let mut body = String::from("echo \"Logged in OK\"\nsleep 1\n");
        body.push_str(&fake_success(staging, "1"));
        body.push_str("exit 0");
        body
    })
    .await;

    ctx.downloader.add_item(new_item("1")).await.unwrap();

    let background = {
        let downloader = ctx.downloader.clone();
        tokio::spawn(async move { downloader.download_queued().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert!(ctx.downloader.batch_in_progress());
    let result = ctx.downloader.download_queued().await;
    assert!(
        matches!(result, Err(Error::BatchInProgress)),
        "got: {result:?}"
    );

    let summary = background.await.unwrap().unwrap();
    assert_eq!(summary.completed, vec![id("1")]);
}

#[tokio::test]
async fn test_status_events_stream_during_fetch() {
    let ctx =
        create_test_downloader_with_script(|staging| all_success_script(staging, &["7"])).await;

    ctx.downloader.add_item(new_item("7")).await.unwrap();
    let mut events = ctx.downloader.subscribe();

    ctx.downloader.download_queued().await.unwrap();

    let mut saw = std::collections::HashSet::new();
    while let Ok(event) = events.try_recv() {
        match event {
            Event::BatchStarted { .. } => saw.insert("batch_started"),
            Event::LoginSucceeded => saw.insert("login"),
            Event::Fetching { .. } => saw.insert("fetching"),
            Event::ItemFetched { .. } => saw.insert("fetched"),
            Event::Processing { .. } => saw.insert("processing"),
            Event::Relocated { .. } => saw.insert("relocated"),
            Event::Completed { .. } => saw.insert("completed"),
            Event::BatchFinished { .. } => saw.insert("finished"),
            _ => false,
        };
    }

    for expected in [
        "batch_started",
        "login",
        "fetching",
        "fetched",
        "processing",
        "relocated",
        "completed",
        "finished",
    ] {
        assert!(saw.contains(expected), "missing {expected} event");
    }
}

#[tokio::test]
async fn test_queue_processor_drains_newly_enqueued_items() {
    let ctx =
        create_test_downloader_with_script(|staging| all_success_script(staging, &["1"])).await;

    let handle = ctx.downloader.start_queue_processor();

    ctx.downloader.add_item(new_item("1")).await.unwrap();

    // Wait for the processor to pick the item up and finish it
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    loop {
        let info = ctx.downloader.item(&id("1")).await.unwrap().unwrap();
        if info.status == Status::Completed {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "processor never completed the item, status: {:?}",
            info.status
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    ctx.downloader.shutdown().await.unwrap();
    handle.await.unwrap();
}
