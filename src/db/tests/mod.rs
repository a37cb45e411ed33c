
use super::NewQueueItem;
use crate::types::ItemId;

/// Build a NewQueueItem with the given id and no metadata
fn item(id: &str) -> NewQueueItem {
    NewQueueItem {
        item_id: ItemId(id.to_string()),
        title: None,
        source_url: None,
        dependencies: Vec::new(),
    }
}

/// Build a NewQueueItem with the given id, title, and dependency ids
fn item_with_deps(id: &str, title: &str, deps: &[&str]) -> NewQueueItem {
    NewQueueItem {
        item_id: ItemId(id.to_string()),
        title: Some(title.to_string()),
        source_url: Some(format!(
            "https://steamcommunity.com/sharedfiles/filedetails/?id={id}"
        )),
        dependencies: deps.iter().map(|d| ItemId(d.to_string())).collect(),
    }
}
