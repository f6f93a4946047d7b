use crate::database::EnrollmentSource;
use crate::dto::activity_dto::{ActivityQuery, ActivityView, CorrectnessFilter};
use crate::error::{Error, Result};
use crate::models::live_event::{Correctness, LiveAnswerEvent};
use crate::models::viewer::{Role, Viewer};
use crate::services::feed_hub::{FeedHub, FeedScope, FeedSubscription, FeedUpdate};
use crate::utils::time::parse_timestamp;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use tokio::time::timeout;

pub const UNKNOWN_STUDENT: &str = "Unknown Student";
pub const NO_ANSWER: &str = "No answer provided";
pub const DEFAULT_QUESTION: &str = "Question";
pub const DEFAULT_ANSWER_TYPE: &str = "text";
pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityFilter {
    pub correctness: CorrectnessFilter,
    pub search: Option<String>,
    pub recent_only: bool,
    pub recent_window: Duration,
    pub limit: usize,
}

impl Default for ActivityFilter {
    fn default() -> Self {
        Self {
            correctness: CorrectnessFilter::All,
            search: None,
            recent_only: false,
            recent_window: Duration::hours(1),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ActivityFilter {
    fn matches_correctness(&self, event: &LiveAnswerEvent) -> bool {
        match self.correctness {
            CorrectnessFilter::All => true,
            CorrectnessFilter::Correct => event.correctness() == Correctness::Correct,
            CorrectnessFilter::Incorrect => event.correctness() == Correctness::Incorrect,
            CorrectnessFilter::Pending => event.correctness() == Correctness::Pending,
        }
    }
}

fn children(node: &JsonValue) -> Vec<(String, &JsonValue)> {
    match node {
        JsonValue::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        JsonValue::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn text_field(node: &Map<String, JsonValue>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| node.get(*n).and_then(JsonValue::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number_field(node: &Map<String, JsonValue>, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|n| match node.get(*n) {
        Some(JsonValue::Number(v)) => v.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn answer_text(node: &Map<String, JsonValue>) -> String {
    match node.get("answer") {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => s.clone(),
        None | Some(JsonValue::Null) | Some(JsonValue::String(_)) => NO_ANSWER.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Builds an event from whatever the node holds; the tree keys stand in for
/// missing ids.
fn normalize_event(
    node: &Map<String, JsonValue>,
    class_id: &str,
    content_key: &str,
    student_key: &str,
    problem_key: &str,
    observed_at: DateTime<Utc>,
) -> LiveAnswerEvent {
    let timestamp = ["timestamp", "updated_at", "updatedAt"]
        .iter()
        .find_map(|n| node.get(*n).and_then(parse_timestamp))
        .unwrap_or(observed_at);

    LiveAnswerEvent {
        student_id: text_field(node, &["student_id", "studentId"])
            .unwrap_or_else(|| student_key.to_string()),
        student_name: text_field(node, &["student_name", "studentName"])
            .unwrap_or_else(|| UNKNOWN_STUDENT.to_string()),
        class_id: class_id.to_string(),
        content_id: text_field(node, &["content_id", "contentId"])
            .unwrap_or_else(|| content_key.to_string()),
        problem_index: node
            .get("problem_index")
            .or_else(|| node.get("problemIndex"))
            .and_then(JsonValue::as_i64)
            .and_then(|i| i32::try_from(i).ok())
            .or_else(|| problem_key.parse().ok())
            .unwrap_or(0),
        question_text: text_field(node, &["question_text", "questionText"])
            .unwrap_or_else(|| DEFAULT_QUESTION.to_string()),
        answer: answer_text(node),
        answer_type: text_field(node, &["answer_type", "answerType"])
            .unwrap_or_else(|| DEFAULT_ANSWER_TYPE.to_string()),
        correct: node.get("correct").and_then(JsonValue::as_bool),
        partial_credit: number_field(node, &["partial_credit", "partialCredit"]),
        score: number_field(node, &["score"]).unwrap_or(0.0),
        problem_points: number_field(node, &["problem_points", "problemPoints"]).unwrap_or(0.0),
        timestamp,
    }
}

fn flatten_students(
    node: &JsonValue,
    class_id: &str,
    content_key: &str,
    observed_at: DateTime<Utc>,
    out: &mut Vec<LiveAnswerEvent>,
) {
    for (student_key, answers) in children(node) {
        for (problem_key, event) in children(answers) {
            if let JsonValue::Object(map) = event {
                out.push(normalize_event(
                    map,
                    class_id,
                    content_key,
                    &student_key,
                    &problem_key,
                    observed_at,
                ));
            }
        }
    }
}

/// Flattens a snapshot for the given scope into a uniform list. Nodes that
/// are not objects at the event level are skipped.
pub fn flatten_snapshot(
    scope: &FeedScope,
    snapshot: &JsonValue,
    observed_at: DateTime<Utc>,
) -> Vec<LiveAnswerEvent> {
    let mut events = Vec::new();
    match scope {
        FeedScope::Content { class_id, content_id } => {
            flatten_students(snapshot, class_id, content_id, observed_at, &mut events);
        }
        FeedScope::Class { class_id } => {
            for (content_key, students) in children(snapshot) {
                flatten_students(students, class_id, &content_key, observed_at, &mut events);
            }
        }
    }
    events
}

/// Staleness, correctness, search, newest-first sort, truncation, in that
/// order. A pure function of the full event list.
pub fn apply_filter(
    events: &[LiveAnswerEvent],
    filter: &ActivityFilter,
    now: DateTime<Utc>,
) -> Vec<LiveAnswerEvent> {
    let cutoff = now - filter.recent_window;
    let needle = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut selected: Vec<LiveAnswerEvent> = events
        .iter()
        .filter(|e| !filter.recent_only || e.timestamp >= cutoff)
        .filter(|e| filter.matches_correctness(e))
        .filter(|e| match &needle {
            Some(needle) => {
                e.student_name.to_lowercase().contains(needle)
                    || e.question_text.to_lowercase().contains(needle)
                    || e.answer.to_lowercase().contains(needle)
            }
            None => true,
        })
        .cloned()
        .collect();

    selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    selected.truncate(filter.limit);
    selected
}

pub fn active_students(events: &[LiveAnswerEvent]) -> BTreeSet<String> {
    events.iter().map(|e| e.student_id.clone()).collect()
}

pub fn build_view(
    scope: &FeedScope,
    snapshot: &JsonValue,
    filter: &ActivityFilter,
    now: DateTime<Utc>,
) -> ActivityView {
    let events = flatten_snapshot(scope, snapshot, now);
    let count = |c: Correctness| events.iter().filter(|e| e.correctness() == c).count();

    ActivityView {
        class_id: scope.class_id().to_string(),
        content_id: scope.content_id().map(str::to_string),
        entries: apply_filter(&events, filter, now),
        active_students: active_students(&events).len(),
        total_events: events.len(),
        correct_count: count(Correctness::Correct),
        incorrect_count: count(Correctness::Incorrect),
        pending_count: count(Correctness::Pending),
        error: None,
        generated_at: now,
    }
}

/// A live view over one feed scope. Keeps the last full snapshot so a
/// filter change re-renders from the complete event set.
pub struct ActivityMonitor {
    scope: FeedScope,
    subscription: FeedSubscription,
    filter: ActivityFilter,
    last_snapshot: JsonValue,
    error: Option<String>,
}

impl ActivityMonitor {
    pub fn new(scope: FeedScope, subscription: FeedSubscription, filter: ActivityFilter) -> Self {
        Self {
            scope,
            subscription,
            filter,
            last_snapshot: JsonValue::Object(Map::new()),
            error: None,
        }
    }

    pub fn scope(&self) -> &FeedScope {
        &self.scope
    }

    /// Waits for the next feed update and renders it. `None` once the feed
    /// is closed.
    pub async fn next_view(&mut self) -> Option<ActivityView> {
        let update = self.subscription.next().await?;
        self.apply_update(update);
        Some(self.current_view())
    }

    /// Drains already-queued updates without waiting.
    pub fn poll_view(&mut self) -> Option<ActivityView> {
        let mut changed = false;
        while let Some(update) = self.subscription.try_next() {
            self.apply_update(update);
            changed = true;
        }
        changed.then(|| self.current_view())
    }

    fn apply_update(&mut self, update: FeedUpdate) {
        match update {
            // Errors are terminal; nothing after one is rendered.
            FeedUpdate::Snapshot(_) if self.error.is_some() => {}
            FeedUpdate::Snapshot(snapshot) => {
                self.last_snapshot = snapshot;
            }
            FeedUpdate::Error(reason) => {
                tracing::warn!(scope = ?self.scope, reason = %reason, "Live feed closed with an error");
                self.error = Some(reason);
                self.last_snapshot = JsonValue::Object(Map::new());
            }
        }
    }

    pub fn set_filter(&mut self, filter: ActivityFilter) -> ActivityView {
        self.filter = filter;
        self.current_view()
    }

    pub fn current_view(&self) -> ActivityView {
        let now = Utc::now();
        if let Some(error) = &self.error {
            return ActivityView {
                class_id: self.scope.class_id().to_string(),
                content_id: self.scope.content_id().map(str::to_string),
                entries: Vec::new(),
                active_students: 0,
                total_events: 0,
                correct_count: 0,
                incorrect_count: 0,
                pending_count: 0,
                error: Some(error.clone()),
                generated_at: now,
            };
        }
        build_view(&self.scope, &self.last_snapshot, &self.filter, now)
    }
}

pub const DEFAULT_FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Clone)]
pub struct ActivityService {
    hub: FeedHub,
    recent_window: Duration,
    max_entries: usize,
    fetch_timeout: std::time::Duration,
}

impl ActivityService {
    pub fn new(hub: FeedHub, recent_window: Duration, max_entries: usize) -> Self {
        Self {
            hub,
            recent_window,
            max_entries: max_entries.max(1),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Bounds the enrollment lookup done when a monitor is opened.
    pub fn with_fetch_timeout(mut self, fetch_timeout: std::time::Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn hub(&self) -> &FeedHub {
        &self.hub
    }

    pub fn filter_from_query(&self, query: &ActivityQuery) -> ActivityFilter {
        ActivityFilter {
            correctness: query.filter.unwrap_or_default(),
            search: query.search.clone(),
            recent_only: query.recent_only.unwrap_or(false),
            recent_window: self.recent_window,
            limit: query
                .limit
                .unwrap_or(DEFAULT_LIMIT)
                .clamp(1, self.max_entries),
        }
    }

    /// Only the class's teacher or an admin may watch a class feed.
    pub async fn authorize<S>(&self, store: &S, viewer: &Viewer, class_id: &str) -> Result<()>
    where
        S: EnrollmentSource,
    {
        match viewer.role {
            Role::Student => Err(Error::Forbidden(
                "Students cannot monitor live activity".to_string(),
            )),
            Role::Admin => Ok(()),
            Role::Teacher => {
                let classes = timeout(self.fetch_timeout, store.classes_for(viewer))
                    .await
                    .map_err(|_| {
                        Error::Timeout("Fetching enrolled classes timed out".to_string())
                    })??;
                if classes.iter().any(|c| c.id == class_id) {
                    Ok(())
                } else {
                    Err(Error::Forbidden(format!(
                        "Class {} is not taught by this user",
                        class_id
                    )))
                }
            }
        }
    }

    pub async fn open<S>(
        &self,
        store: &S,
        viewer: &Viewer,
        scope: FeedScope,
        query: &ActivityQuery,
    ) -> Result<ActivityMonitor>
    where
        S: EnrollmentSource,
    {
        self.authorize(store, viewer, scope.class_id()).await?;
        let subscription = self.hub.subscribe(&scope);
        tracing::info!(viewer = %viewer.id, scope = ?scope, "Opened live activity monitor");
        Ok(ActivityMonitor::new(scope, subscription, self.filter_from_query(query)))
    }

    /// One-shot view of the current feed state.
    pub async fn snapshot_view<S>(
        &self,
        store: &S,
        viewer: &Viewer,
        scope: FeedScope,
        query: &ActivityQuery,
    ) -> Result<ActivityView>
    where
        S: EnrollmentSource,
    {
        let mut monitor = self.open(store, viewer, scope, query).await?;
        monitor
            .poll_view()
            .ok_or_else(|| Error::Feed("Live feed produced no snapshot".to_string()))
    }
}
