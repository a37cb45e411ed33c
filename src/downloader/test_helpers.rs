//! Shared fixtures for downloader tests.

use crate::config::{Config, DownloadConfig, FetchConfig, PersistenceConfig, ToolConfig};
use crate::downloader::WorkshopDownloader;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(crate) const TEST_APP_ID: &str = "108600";

/// Layout of one test sandbox: staging/, mods/, db, and a fake tool script
pub(crate) struct TestContext {
    pub(crate) temp: TempDir,
    pub(crate) downloader: WorkshopDownloader,
}

impl TestContext {
    pub(crate) fn staging(&self) -> PathBuf {
        self.temp.path().join("staging")
    }

    pub(crate) fn target(&self) -> PathBuf {
        self.temp.path().join("mods")
    }
}

/// Write an executable script standing in for steamcmd
pub(crate) fn write_fake_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-steamcmd.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// Script fragment that fakes a successful download of one item: prints the
/// tool's success vocabulary and writes a payload under the staging dir
pub(crate) fn fake_success(staging: &Path, id: &str) -> String {
    let payload = format!(
        "{}/steamapps/workshop/content/{TEST_APP_ID}/{id}",
        staging.display()
    );
    format!(
        "echo \"Downloading item {id} ...\"\n\
         mkdir -p \"{payload}\"\n\
         echo \"name={id}\" > \"{payload}/mod.info\"\n\
         echo \"Success. Downloaded item {id} to \\\"{payload}\\\" (100 bytes)\"\n"
    )
}

/// Script body that logs in and successfully downloads every given item
pub(crate) fn all_success_script(staging: &Path, ids: &[&str]) -> String {
    let mut body = String::from("echo \"Logged in OK\"\n");
    for id in ids {
        body.push_str(&fake_success(staging, id));
    }
    body.push_str("exit 0");
    body
}

/// Build a downloader whose fake tool runs the script produced by
/// `build_script` (which receives the staging directory)
pub(crate) async fn create_test_downloader_with_script(
    build_script: impl FnOnce(&Path) -> String,
) -> TestContext {
    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    let target = temp.path().join("mods");
    std::fs::create_dir_all(&staging).unwrap();

    let script_body = build_script(&staging);
    let tool = write_fake_tool(temp.path(), &script_body);

    let config = Config {
        tool: ToolConfig {
            steamcmd_path: Some(tool),
            search_path: false,
            app_id: TEST_APP_ID.to_string(),
        },
        download: DownloadConfig {
            target_dir: target,
            staging_dir: staging,
            auto_clear_queue: false,
        },
        fetch: FetchConfig {
            inactivity_timeout_secs: Some(30),
            queue_poll_interval_ms: 50,
        },
        persistence: PersistenceConfig {
            database_path: temp.path().join("workshop-dl.db"),
        },
        ..Default::default()
    };

    let downloader = WorkshopDownloader::new(config).await.unwrap();
    TestContext { temp, downloader }
}

/// Build a downloader with an inert fake tool (for queue-only tests)
pub(crate) async fn create_test_downloader() -> TestContext {
    create_test_downloader_with_script(|_| "exit 0".to_string()).await
}
