use crate::tier::Tier;
use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad category of a marketplace task, used for pool filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Comment,
    Review,
    Social,
    Visit,
}

impl TaskKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Comment => "comment",
            TaskKind::Review => "review",
            TaskKind::Social => "social",
            TaskKind::Visit => "visit",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Content-addressed id over the template fields plus a timestamp nonce.
    pub fn derive(kind: TaskKind, description: &str, nonce: i64) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(description.as_bytes());
        hasher.update(&nonce.to_le_bytes());
        Self(hex::encode(&hasher.finalize().as_bytes()[..12]))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a user-held task instance.
///
/// Templates in the admin pool are the "unassigned" stage; a status value
/// only exists once a template has been cloned into a user's collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Available,
    Started,
    Pending,
    Completed,
}

impl TaskStatus {
    /// Valid edges: available -> started -> pending -> {completed | started}.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Available, TaskStatus::Started)
                | (TaskStatus::Started, TaskStatus::Pending)
                | (TaskStatus::Pending, TaskStatus::Completed)
                | (TaskStatus::Pending, TaskStatus::Started)
        )
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Available => "available",
            TaskStatus::Started => "started",
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Input for publishing a template to the marketplace pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTemplate {
    pub kind: TaskKind,
    pub description: String,
    pub instructions: String,
    pub link: String,
    pub tier: Tier,
}

/// Admin-curated task definition. Immutable once published; reservation and
/// assignment clone it into a user's collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    pub instructions: String,
    pub link: String,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
}

impl TaskTemplate {
    pub fn new(spec: NewTemplate, now: DateTime<Utc>) -> Self {
        let id = TaskId::derive(spec.kind, &spec.description, now.timestamp_nanos_opt().unwrap_or(0));
        Self {
            id,
            kind: spec.kind,
            description: spec.description,
            instructions: spec.instructions,
            link: spec.link,
            tier: spec.tier,
            created_at: now,
        }
    }

    /// Clone into a fresh user-held instance. Copy semantics: mutating the
    /// instance never touches the template or other users' copies.
    pub fn instantiate(&self, now: DateTime<Utc>) -> TaskInstance {
        TaskInstance {
            id: self.id.clone(),
            kind: self.kind,
            description: self.description.clone(),
            instructions: self.instructions.clone(),
            link: self.link.clone(),
            tier: self.tier,
            status: TaskStatus::Available,
            submission: None,
            reward_granted: false,
            reserved_at: now,
        }
    }
}

/// A task reserved by (or assigned to) a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    pub instructions: String,
    pub link: String,
    pub tier: Tier,
    pub status: TaskStatus,
    pub submission: Option<String>,
    /// Set when the reward was credited at submission time, so approval never
    /// double-credits and rejection knows to reclaim.
    pub reward_granted: bool,
    pub reserved_at: DateTime<Utc>,
}
