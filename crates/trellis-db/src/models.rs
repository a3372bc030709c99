use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Scraping,
    Generating,
    Ready,
    Error,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scraping => "scraping",
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanStatus {
    type Err = PlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scraping" => Ok(Self::Scraping),
            "generating" => Ok(Self::Generating),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(PlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanStatus`] string.
#[derive(Debug, Clone)]
pub struct PlanStatusParseError(pub String);

impl fmt::Display for PlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan status: {:?}", self.0)
    }
}

impl std::error::Error for PlanStatusParseError {}

// ---------------------------------------------------------------------------

/// Completion status of an outcome, deliverable, or action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Todo,
    Doing,
    Done,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeStatus {
    type Err = NodeStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            other => Err(NodeStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`NodeStatus`] string.
#[derive(Debug, Clone)]
pub struct NodeStatusParseError(pub String);

impl fmt::Display for NodeStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node status: {:?}", self.0)
    }
}

impl std::error::Error for NodeStatusParseError {}

// ---------------------------------------------------------------------------

/// Status of an AI adjustment attempt. Monotonic: `pending` is the only
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    Pending,
    Applied,
    Error,
}

impl fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for AdjustmentStatus {
    type Err = AdjustmentStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "applied" => Ok(Self::Applied),
            "error" => Ok(Self::Error),
            other => Err(AdjustmentStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`AdjustmentStatus`] string.
#[derive(Debug, Clone)]
pub struct AdjustmentStatusParseError(pub String);

impl fmt::Display for AdjustmentStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid adjustment status: {:?}", self.0)
    }
}

impl std::error::Error for AdjustmentStatusParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A plan -- the root of one user's idea-to-execution hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: String,
    /// Original free-text idea. Immutable after creation; adjustment drafts
    /// must echo it back unchanged.
    pub idea: String,
    pub title: String,
    pub summary: String,
    pub status: PlanStatus,
    pub generation_error: Option<String>,
    /// Research snippets gathered before generation, as a JSON array.
    pub research: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An outcome -- the top tier under a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Outcome {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub title: String,
    pub summary: String,
    pub status: NodeStatus,
    /// Position within the plan's outcomes; dense 0..n-1 at rest.
    pub ord: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A deliverable -- the middle tier, owned by one outcome.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deliverable {
    pub id: Uuid,
    pub outcome_id: Uuid,
    pub title: String,
    /// Acceptance sentence: when this reads true, the deliverable is done.
    pub done_when: String,
    pub notes: Option<String>,
    pub status: NodeStatus,
    pub ord: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An action -- the leaf tier, owned by one deliverable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Action {
    pub id: Uuid,
    pub deliverable_id: Uuid,
    pub title: String,
    pub status: NodeStatus,
    pub ord: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An audited AI generation/adjustment attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdjustmentEvent {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub prompt: String,
    pub thread_id: String,
    pub status: AdjustmentStatus,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The one-to-one mapping from a plan to its model conversation context.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationThread {
    pub plan_id: Uuid,
    pub user_id: String,
    /// Opaque handle understood by the external model service.
    pub thread_handle: String,
    pub created_at: DateTime<Utc>,
}

/// A service-issued integration key, stored irreversibly (salted digest).
#[derive(Debug, Clone, FromRow)]
pub struct IntegrationKey {
    pub key_id: String,
    pub user_id: String,
    /// Hex-encoded random salt.
    pub salt: String,
    /// Hex-encoded HMAC-SHA256(salt, secret).
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// A user's own model API key, stored reversibly (by value).
#[derive(Debug, Clone, FromRow)]
pub struct ModelKey {
    pub user_id: String,
    pub api_key: String,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
