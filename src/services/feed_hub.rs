//! In-process live answer feed.
//!
//! The hub owns a JSON tree laid out as
//! `class_id / content_id / student_id / problem_index -> event`. A
//! subscriber watches one node of that tree and receives the full subtree
//! snapshot on subscribe and after every write that touches it. Dropping
//! the [`FeedSubscription`] removes the listener.

use crate::models::live_event::LiveAnswerEvent;
use serde_json::{Map, Value as JsonValue};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    Class { class_id: String },
    Content { class_id: String, content_id: String },
}

impl FeedScope {
    pub fn new(class_id: impl Into<String>, content_id: Option<String>) -> Self {
        let class_id = class_id.into();
        match content_id.filter(|c| !c.is_empty()) {
            Some(content_id) => FeedScope::Content { class_id, content_id },
            None => FeedScope::Class { class_id },
        }
    }

    pub fn class_id(&self) -> &str {
        match self {
            FeedScope::Class { class_id } | FeedScope::Content { class_id, .. } => class_id,
        }
    }

    pub fn content_id(&self) -> Option<&str> {
        match self {
            FeedScope::Class { .. } => None,
            FeedScope::Content { content_id, .. } => Some(content_id),
        }
    }

    pub fn path(&self) -> Vec<String> {
        match self {
            FeedScope::Class { class_id } => vec![class_id.clone()],
            FeedScope::Content { class_id, content_id } => {
                vec![class_id.clone(), content_id.clone()]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Snapshot(JsonValue),
    /// The feed became unusable for this subscriber, e.g. access revoked.
    /// Always the last update a subscription receives.
    Error(String),
}

struct Listener {
    id: u64,
    path: Vec<String>,
    tx: mpsc::UnboundedSender<FeedUpdate>,
}

#[derive(Default)]
struct HubState {
    tree: Map<String, JsonValue>,
    listeners: Vec<Listener>,
    next_id: u64,
}

impl HubState {
    fn snapshot(&self, path: &[String]) -> JsonValue {
        let mut node = match path.split_first() {
            None => return JsonValue::Object(self.tree.clone()),
            Some((first, _)) => self.tree.get(first),
        };
        for segment in path.iter().skip(1) {
            node = node.and_then(|n| n.get(segment));
        }
        node.cloned().unwrap_or_else(|| JsonValue::Object(Map::new()))
    }

    fn write(&mut self, path: &[String], value: JsonValue) {
        let Some((last, parents)) = path.split_last() else {
            if let JsonValue::Object(map) = value {
                self.tree = map;
            }
            return;
        };
        let mut node = &mut self.tree;
        for segment in parents {
            let child = node
                .entry(segment.clone())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !child.is_object() {
                *child = JsonValue::Object(Map::new());
            }
            let JsonValue::Object(map) = child else { return };
            node = map;
        }
        node.insert(last.clone(), value);
    }

    /// Sends the current snapshot to every listener whose node overlaps the
    /// written path, dropping listeners whose receiver is gone.
    fn notify(&mut self, written: &[String]) {
        let snapshots: Vec<(u64, JsonValue)> = self
            .listeners
            .iter()
            .filter(|l| overlaps(&l.path, written))
            .map(|l| (l.id, self.snapshot(&l.path)))
            .collect();

        for (id, snapshot) in snapshots {
            if let Some(listener) = self.listeners.iter().find(|l| l.id == id) {
                if listener.tx.send(FeedUpdate::Snapshot(snapshot)).is_err() {
                    self.listeners.retain(|l| l.id != id);
                }
            }
        }
    }
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

#[derive(Clone, Default)]
pub struct FeedHub {
    state: Arc<Mutex<HubState>>,
}

impl FeedHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn event_path(event: &LiveAnswerEvent) -> Vec<String> {
        vec![
            event.class_id.clone(),
            event.content_id.clone(),
            event.student_id.clone(),
            event.problem_index.to_string(),
        ]
    }

    pub fn publish(&self, event: &LiveAnswerEvent) -> crate::error::Result<()> {
        let value = serde_json::to_value(event)?;
        self.publish_raw(&Self::event_path(event), value);
        Ok(())
    }

    /// Writes any JSON node into the tree, replacing what was there.
    pub fn publish_raw(&self, path: &[String], value: JsonValue) {
        let mut state = self.lock();
        state.write(path, value);
        state.notify(path);
    }

    pub fn snapshot(&self, scope: &FeedScope) -> JsonValue {
        self.lock().snapshot(&scope.path())
    }

    pub fn subscribe(&self, scope: &FeedScope) -> FeedSubscription {
        let path = scope.path();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        // The receiver is alive here, so the initial send cannot fail.
        let _ = tx.send(FeedUpdate::Snapshot(state.snapshot(&path)));
        state.listeners.push(Listener { id, path, tx });
        tracing::debug!(listener = id, scope = ?scope, "Feed listener registered");

        FeedSubscription {
            id,
            rx,
            hub: Arc::downgrade(&self.state),
        }
    }

    /// Pushes a final error to every listener at or below `prefix` and
    /// deregisters them. Their subscriptions yield `None` after the error.
    pub fn revoke(&self, prefix: &[String], reason: &str) {
        let mut state = self.lock();
        state.listeners.retain(|listener| {
            if !listener.path.starts_with(prefix) {
                return true;
            }
            let _ = listener.tx.send(FeedUpdate::Error(reason.to_string()));
            false
        });
        tracing::info!(prefix = ?prefix, reason, "Feed listeners revoked");
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

pub struct FeedSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<FeedUpdate>,
    hub: Weak<Mutex<HubState>>,
}

impl FeedSubscription {
    /// Cancel-safe. `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<FeedUpdate> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<FeedUpdate> {
        self.rx.try_recv().ok()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(state) = self.hub.upgrade() {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.listeners.retain(|l| l.id != self.id);
            tracing::debug!(listener = self.id, "Feed listener removed");
        }
    }
}
