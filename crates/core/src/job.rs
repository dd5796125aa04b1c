//! Job model: kinds, payloads, lifecycle statuses and the tracked record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRef;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Lifecycle status of a job.
///
/// Discriminants are the persisted status ids.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending = 1,
    Started = 2,
    Success = 3,
    Failure = 4,
}

impl JobStatus {
    /// Return the persisted status id.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Parse a persisted status id.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Started),
            3 => Some(Self::Success),
            4 => Some(Self::Failure),
            _ => None,
        }
    }

    /// Wire name, e.g. `"PENDING"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Position in the lifecycle. Both terminal statuses share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Started => 1,
            Self::Success | Self::Failure => 2,
        }
    }

    /// Whether a record currently at `self` may be replaced by one at `next`.
    ///
    /// Nothing leaves a terminal status. Otherwise the status may stay put
    /// (a redelivered job is STARTED again) or move forward.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Kinds and payloads
// ---------------------------------------------------------------------------

/// Closed set of job kinds. Each kind has exactly one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Simple,
    Upscale,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Upscale => "UPSCALE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SIMPLE" => Some(Self::Simple),
            "UPSCALE" => Some(Self::Upscale),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific arguments of a job.
///
/// Serialized as `{"kind": "SIMPLE", "payload": 1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPayload {
    /// Toy task; the handler echoes the value back.
    Simple(i64),
    /// Read the image at `input`, write the enlarged image at `output`.
    Upscale {
        input: ArtifactRef,
        output: ArtifactRef,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Simple(_) => JobKind::Simple,
            Self::Upscale { .. } => JobKind::Upscale,
        }
    }
}

/// One unit of queued work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
}

impl Job {
    pub fn new(id: JobId, payload: JobPayload) -> Self {
        Self { id, payload }
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Tracked lifecycle state and outcome of a job.
///
/// Records are values: every transition builds a new record which the
/// result store swaps in whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Handler output, set on SUCCESS.
    pub result: Option<serde_json::Value>,
    /// Fault description, set on FAILURE.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl JobRecord {
    /// Initial record written at submission time.
    pub fn pending(id: JobId, kind: JobKind) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    pub fn started(&self) -> Self {
        let now = chrono::Utc::now();
        Self {
            status: JobStatus::Started,
            started_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn succeeded(&self, result: serde_json::Value) -> Self {
        let now = chrono::Utc::now();
        Self {
            status: JobStatus::Success,
            result: Some(result),
            error: None,
            finished_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn failed(&self, error: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            status: JobStatus::Failure,
            result: None,
            error: Some(error.into()),
            finished_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
