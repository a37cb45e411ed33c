use super::output::ProcessEvent;
use super::*;
use crate::config::LoginMode;
use crate::types::ItemId;

fn id(s: &str) -> ItemId {
    ItemId(s.to_string())
}

fn driver(binary: PathBuf, staging: &Path, timeout: Option<Duration>) -> SteamCmd {
    SteamCmd::new(
        binary,
        "108600".to_string(),
        staging.to_path_buf(),
        LoginMode::Anonymous,
        timeout,
    )
}

// --- argument construction ---

#[test]
fn command_args_anonymous_login() {
    let driver = driver(
        PathBuf::from("/usr/bin/steamcmd"),
        Path::new("/staging"),
        None,
    );

    let args = driver.command_args(&[id("111"), id("222")]);
    let args: Vec<String> = args
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    assert_eq!(
        args,
        vec![
            "+login",
            "anonymous",
            "+force_install_dir",
            "/staging",
            "+workshop_download_item",
            "108600",
            "111",
            "+workshop_download_item",
            "108600",
            "222",
            "+quit",
        ]
    );
}

#[test]
fn command_args_credentialed_login_uses_username() {
    let driver = SteamCmd::new(
        PathBuf::from("steamcmd"),
        "108600".to_string(),
        PathBuf::from("/staging"),
        LoginMode::Credentialed {
            username: "alice".to_string(),
        },
        None,
    );

    let args = driver.command_args(&[id("1")]);
    let args: Vec<String> = args
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    assert_eq!(args[0], "+login");
    assert_eq!(args[1], "alice");
    assert_eq!(*args.last().unwrap(), "+quit");
}

// --- payload layout helpers ---

#[test]
fn payload_dir_follows_the_fixed_tool_layout() {
    let dir = item_payload_dir(Path::new("/staging"), "108600", &id("2392709985"));
    assert_eq!(
        dir,
        PathBuf::from("/staging/steamapps/workshop/content/108600/2392709985")
    );
}

#[test]
fn scratch_root_is_the_steamapps_subtree() {
    assert_eq!(
        scratch_root(Path::new("/staging")),
        PathBuf::from("/staging/steamapps")
    );
}

// --- live driver tests against a scripted fake tool ---

#[cfg(unix)]
mod live {
    use super::*;
    use tokio_util::sync::CancellationToken;

    /// Write an executable shell script standing in for steamcmd
    fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-steamcmd.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    async fn run_and_collect(
        driver: &SteamCmd,
        items: Vec<ItemId>,
        cancel: CancellationToken,
    ) -> (Vec<ProcessEvent>, BatchReport) {
        let mut running = driver.run(items, cancel).expect("spawn should succeed");
        let mut events = Vec::new();
        while let Some(event) = running.events.recv().await {
            events.push(event);
        }
        let report = running.report.await.unwrap();
        (events, report)
    }

    #[tokio::test]
    async fn successful_batch_reports_all_items_completed() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(
            temp.path(),
            r#"echo "Logged in OK"
echo "Downloading item 111 ..."
echo "Success. Downloaded item 111 to \"/x\" (100 bytes)"
echo "Downloading item 222 ..."
echo "Success. Downloaded item 222 to \"/x\" (200 bytes)"
exit 0"#,
        );

        let driver = driver(script, temp.path(), None);
        let (events, report) =
            run_and_collect(&driver, vec![id("111"), id("222")], CancellationToken::new()).await;

        assert_eq!(report.disposition, BatchDisposition::Completed);
        assert_eq!(
            report.outcomes,
            vec![
                (id("111"), ItemOutcome::Success),
                (id("222"), ItemOutcome::Success),
            ]
        );
        assert!(events.contains(&ProcessEvent::LoginOk));
        assert!(events.contains(&ProcessEvent::ItemStart(id("111"))));
        assert!(events.contains(&ProcessEvent::ItemSuccess(id("222"))));
    }

    #[tokio::test]
    async fn mixed_batch_reports_per_item_outcomes() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(
            temp.path(),
            r#"echo "Logged in OK"
echo "Success. Downloaded item 1 to \"/x\" (1 bytes)"
echo "ERROR! Download item 2 failed (Timeout)."
exit 0"#,
        );

        // Item 3 is never reported — it must come back Unknown
        let driver = driver(script, temp.path(), None);
        let (_events, report) = run_and_collect(
            &driver,
            vec![id("1"), id("2"), id("3")],
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.disposition, BatchDisposition::Completed);
        assert_eq!(
            report.outcomes,
            vec![
                (id("1"), ItemOutcome::Success),
                (id("2"), ItemOutcome::Failed("Timeout".to_string())),
                (id("3"), ItemOutcome::Unknown),
            ]
        );
    }

    #[tokio::test]
    async fn rate_limited_items_are_marked_retriable() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(
            temp.path(),
            r#"echo "Logged in OK"
echo "ERROR! Download item 5 failed (Rate Limited)."
exit 0"#,
        );

        let driver = driver(script, temp.path(), None);
        let (events, report) =
            run_and_collect(&driver, vec![id("5")], CancellationToken::new()).await;

        assert_eq!(report.outcomes, vec![(id("5"), ItemOutcome::Retry)]);
        assert!(events.contains(&ProcessEvent::RateLimited { id: Some(id("5")) }));
    }

    #[tokio::test]
    async fn login_failure_overrides_everything() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(
            temp.path(),
            r#"echo "FAILED login with result code Invalid Password"
exit 5"#,
        );

        let driver = driver(script, temp.path(), None);
        let (events, report) =
            run_and_collect(&driver, vec![id("1")], CancellationToken::new()).await;

        assert_eq!(
            report.disposition,
            BatchDisposition::LoginFailed("Invalid Password".to_string())
        );
        assert!(events.contains(&ProcessEvent::LoginFailed("Invalid Password".to_string())));
    }

    #[tokio::test]
    async fn abnormal_exit_without_outcomes_is_a_batch_failure() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(temp.path(), "exit 42");

        let driver = driver(script, temp.path(), None);
        let (_events, report) =
            run_and_collect(&driver, vec![id("1"), id("2")], CancellationToken::new()).await;

        assert_eq!(report.disposition, BatchDisposition::AbnormalExit(Some(42)));
        assert!(
            report
                .outcomes
                .iter()
                .all(|(_, outcome)| *outcome == ItemOutcome::Unknown)
        );
    }

    #[tokio::test]
    async fn nonzero_exit_with_explicit_outcomes_keeps_them() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(
            temp.path(),
            r#"echo "Success. Downloaded item 1 to \"/x\" (1 bytes)"
exit 8"#,
        );

        let driver = driver(script, temp.path(), None);
        let (_events, report) =
            run_and_collect(&driver, vec![id("1")], CancellationToken::new()).await;

        assert_eq!(
            report.disposition,
            BatchDisposition::Completed,
            "explicit per-item classifications win over the exit code"
        );
        assert_eq!(report.outcomes, vec![(id("1"), ItemOutcome::Success)]);
    }

    #[tokio::test]
    async fn cancellation_kills_the_child_promptly() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(temp.path(), "sleep 30");

        let driver = driver(script, temp.path(), None);
        let cancel = CancellationToken::new();
        let running = driver.run(vec![id("1")], cancel.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        // The report must arrive long before the script's sleep would end
        let report = tokio::time::timeout(Duration::from_secs(5), running.report)
            .await
            .expect("cancel must terminate the batch promptly")
            .unwrap();

        assert_eq!(report.disposition, BatchDisposition::Cancelled);
        assert_eq!(report.outcomes, vec![(id("1"), ItemOutcome::Unknown)]);
    }

    #[tokio::test]
    async fn silent_child_is_killed_by_the_inactivity_watchdog() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(temp.path(), "sleep 30");

        let driver = driver(script, temp.path(), Some(Duration::from_millis(200)));
        let running = driver
            .run(vec![id("1")], CancellationToken::new())
            .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), running.report)
            .await
            .expect("watchdog must terminate the batch")
            .unwrap();

        assert_eq!(
            report.disposition,
            BatchDisposition::Stalled(Duration::from_millis(200))
        );
    }

    #[tokio::test]
    async fn stderr_lines_are_classified_too() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(
            temp.path(),
            r#"echo "ERROR! Download item 9 failed (Failure)." >&2
exit 0"#,
        );

        let driver = driver(script, temp.path(), None);
        let (_events, report) =
            run_and_collect(&driver, vec![id("9")], CancellationToken::new()).await;

        assert_eq!(
            report.outcomes,
            vec![(id("9"), ItemOutcome::Failed("Failure".to_string()))]
        );
    }

    #[tokio::test]
    async fn unrecognized_lines_are_forwarded_as_events() {
        let temp = tempfile::tempdir().unwrap();
        let script = write_script(
            temp.path(),
            r#"echo "Loading Steam API...OK"
echo "Success. Downloaded item 1 to \"/x\" (1 bytes)"
exit 0"#,
        );

        let driver = driver(script, temp.path(), None);
        let (events, _report) =
            run_and_collect(&driver, vec![id("1")], CancellationToken::new()).await;

        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProcessEvent::Unrecognized(raw) if raw.contains("Loading Steam API"))),
            "diagnostic lines must never be dropped silently"
        );
    }
}

#[tokio::test]
async fn launch_failure_is_reported_without_spawning() {
    let driver = driver(
        PathBuf::from("/nonexistent/steamcmd-binary"),
        Path::new("/staging"),
        None,
    );

    match driver.run(vec![id("1")], tokio_util::sync::CancellationToken::new()) {
        Err(crate::error::FetchError::Launch { tool, .. }) => {
            assert_eq!(tool, PathBuf::from("/nonexistent/steamcmd-binary"));
        }
        Ok(_) => panic!("spawn of a nonexistent binary must fail"),
        Err(other) => panic!("expected Launch error, got {other:?}"),
    }
}
