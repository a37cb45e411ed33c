//! Dependency resolution and closure expansion
//!
//! Workshop items can require other items ("Required Items" on the item's
//! page). The browser layer records those ids alongside each queue entry; the
//! resolver seam turns a set of seed ids into the full transitive closure the
//! fetch tool should be invoked with.

use crate::db::Database;
use crate::types::ItemId;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Source of dependency metadata for an item
///
/// Implementations answer "which other items does this one require". The
/// default implementation reads the metadata stored with each queue entry; a
/// consumer embedding the crate can plug in a resolver that queries the
/// remote repository instead.
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Determine the direct dependency ids of an item
    ///
    /// An unknown item resolves to no dependencies; failures are treated as
    /// warnings by the closure expansion, never as fatal errors.
    async fn resolve(&self, id: &ItemId) -> crate::Result<Vec<ItemId>>;

    /// Implementation name for logging
    fn name(&self) -> &'static str;
}

/// Resolver backed by the dependency metadata stored with each queue entry
pub struct StoredMetadataResolver {
    db: Arc<Database>,
}

impl StoredMetadataResolver {
    /// Create a resolver reading from the given database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DependencyResolver for StoredMetadataResolver {
    async fn resolve(&self, id: &ItemId) -> crate::Result<Vec<ItemId>> {
        let row = self.db.get_item(id).await?;
        Ok(row.map(|r| r.dependency_ids()).unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "stored-metadata"
    }
}

/// Expand a set of seed ids into their full transitive dependency closure
///
/// Breadth-first traversal over [`DependencyResolver::resolve`]. The result
/// contains each reachable id exactly once, seeds first in their given order,
/// dependencies following in discovery order — deterministic for a fixed
/// dependency graph.
///
/// Cycles are broken by the visited set: an id already in the closure is not
/// re-resolved (treated as already satisfied) and the revisit is logged.
/// Resolution failures are downgraded to warnings; the affected item stays in
/// the closure and simply contributes no further dependencies.
pub async fn expand_closure(resolver: &dyn DependencyResolver, seeds: &[ItemId]) -> Vec<ItemId> {
    let mut order: Vec<ItemId> = Vec::new();
    let mut seen: HashSet<ItemId> = HashSet::new();
    let mut work: VecDeque<ItemId> = VecDeque::new();

    for seed in seeds {
        if seen.insert(seed.clone()) {
            order.push(seed.clone());
            work.push_back(seed.clone());
        }
    }

    while let Some(id) = work.pop_front() {
        let deps = match resolver.resolve(&id).await {
            Ok(deps) => deps,
            Err(e) => {
                tracing::warn!(
                    item_id = %id,
                    resolver = resolver.name(),
                    error = %e,
                    "dependency resolution failed, item proceeds without expansion"
                );
                continue;
            }
        };

        for dep in deps {
            if seen.insert(dep.clone()) {
                order.push(dep.clone());
                work.push_back(dep);
            } else {
                // Revisit — either a cycle or a shared dependency; both are
                // already satisfied by the closure.
                tracing::debug!(item_id = %id, dependency = %dep, "dependency already in closure");
            }
        }
    }

    order
}
