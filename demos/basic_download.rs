//! Basic download example
//!
//! This example demonstrates the core functionality of workshop-dl:
//! - Configuring the steamcmd tool and directories
//! - Creating a downloader instance
//! - Subscribing to events
//! - Enqueueing Workshop items (with a dependency)
//! - Running one batch and inspecting the outcome

use workshop_dl::config::{Config, DownloadConfig, ToolConfig};
use workshop_dl::{Event, NewItem, WorkshopDownloader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    // Build configuration — steamcmd is discovered on PATH when no explicit
    // path is set
    let config = Config {
        tool: ToolConfig {
            steamcmd_path: None,
            search_path: true,
            app_id: "108600".to_string(), // Project Zomboid
        },
        download: DownloadConfig {
            target_dir: "mods".into(),
            staging_dir: "staging".into(),
            auto_clear_queue: true,
        },
        ..Default::default()
    };

    // Create downloader instance
    let downloader = WorkshopDownloader::new(config).await?;

    // Subscribe to events
    let mut events = downloader.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Queued { id, title } => {
                    println!("queued {} ({})", id, title.as_deref().unwrap_or("untitled"));
                }
                Event::Fetching { id } => {
                    println!("fetching {}", id);
                }
                Event::ItemFetched { id } => {
                    println!("fetched {}", id);
                }
                Event::Relocated { id, folders } => {
                    println!("relocated {} -> {:?}", id, folders);
                }
                Event::Completed { id } => {
                    println!("completed {}", id);
                }
                Event::Failed { id, stage, error } => {
                    println!("failed {} at {:?}: {}", id, stage, error);
                }
                Event::BatchFailed { error, requeued } => {
                    println!("batch failed ({error}), {requeued} items requeued");
                }
                _ => {}
            }
        }
    });

    // Enqueue an item and a second one that requires it
    downloader
        .add_item(NewItem {
            id: "2200148440".to_string(),
            source_url: Some(
                "https://steamcommunity.com/sharedfiles/filedetails/?id=2200148440".to_string(),
            ),
            title: Some("Common Sense".to_string()),
            dependencies: vec![],
        })
        .await?;
    downloader
        .add_item(NewItem {
            id: "2392709985".to_string(),
            source_url: Some(
                "https://steamcommunity.com/sharedfiles/filedetails/?id=2392709985".to_string(),
            ),
            title: Some("Tsar's Common Library".to_string()),
            dependencies: vec!["2200148440".to_string()],
        })
        .await?;

    // Run one batch: dependency closure, steamcmd invocation, relocation
    let summary = downloader.download_queued().await?;
    println!(
        "batch done: {} completed, {} failed, {} requeued",
        summary.completed.len(),
        summary.failed.len(),
        summary.requeued.len()
    );

    downloader.shutdown().await?;
    Ok(())
}
