// State shared by every visit worker: the result tree and the link
// registry, each behind its own async mutex so mutation stays effectively
// sequential; variable scopes are per session and never land here.

use crate::keypath::{self, PathStep};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// A resolved `{url, metadata}` pair queued for a page session.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitTarget {
    pub url: String,
    pub metadata: BTreeMap<String, Value>,
}

impl VisitTarget {
    pub fn bare(url: impl Into<String>) -> Self {
        VisitTarget {
            url: url.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Named groups of links discovered during extraction, appended by any
/// worker and read back when a later page spec references `$group`.
pub type LinkRegistry = HashMap<String, Vec<VisitTarget>>;

#[derive(Default)]
pub struct SharedState {
    data: Mutex<Value>,
    links: Mutex<LinkRegistry>,
    pages_visited: AtomicUsize,
}

impl SharedState {
    pub fn new() -> Self {
        SharedState {
            data: Mutex::new(Value::Object(Map::new())),
            links: Mutex::new(LinkRegistry::new()),
            pages_visited: AtomicUsize::new(0),
        }
    }

    /// Merge-assign a value at a resolved path. Single writer at a time.
    pub async fn assign(&self, path: &[PathStep], value: Value, merge: bool) {
        let mut data = self.data.lock().await;
        keypath::assign(&mut data, path, value, merge);
    }

    /// Resolve a scope expression against the current tree.
    pub async fn resolve_scope(
        &self,
        expr: &str,
        vars: &HashMap<String, Value>,
    ) -> crate::error::Result<Vec<PathStep>> {
        let data = self.data.lock().await;
        keypath::resolve(expr, &data, vars)
    }

    /// Resolve a scope and merge-assign to it in one critical section.
    /// `name[]` appends resolve to an index past the current end, so the
    /// lock must span both steps or two workers can claim the same slot
    /// and one write clobbers the other.
    pub async fn resolve_and_assign(
        &self,
        expr: &str,
        vars: &HashMap<String, Value>,
        value: Value,
        merge: bool,
    ) -> crate::error::Result<Vec<PathStep>> {
        let mut data = self.data.lock().await;
        let path = keypath::resolve(expr, &data, vars)?;
        keypath::assign(&mut data, &path, value, merge);
        Ok(path)
    }

    pub async fn append_links(&self, group: &str, entries: Vec<VisitTarget>) {
        let mut links = self.links.lock().await;
        links.entry(group.to_string()).or_default().extend(entries);
    }

    /// Snapshot of one group's current contents. Missing groups read as
    /// empty rather than erroring.
    pub async fn links_snapshot(&self, group: &str) -> Vec<VisitTarget> {
        let links = self.links.lock().await;
        links.get(group).cloned().unwrap_or_default()
    }

    /// Counted once per fully-completed visit.
    pub fn mark_visit_complete(&self) {
        self.pages_visited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited.load(Ordering::Relaxed)
    }

    pub async fn data_snapshot(&self) -> Value {
        self.data.lock().await.clone()
    }

    pub async fn links_clone(&self) -> LinkRegistry {
        self.links.lock().await.clone()
    }
}
