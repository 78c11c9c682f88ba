//! Render job model.
//!
//! A [`Job`] is the single in-flight unit of render work. It moves through
//! `Accepted -> Running -> {Succeeded | Failed | TimedOut | Cancelled} -> Released`
//! and records the pipeline's output while it runs.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU64;
use std::time::Duration;

use crate::marker::{EXTERNAL_URL_KEY, Markers, OUTPUT_KEY};
use crate::supervisor::{LogLine, LogStream};
use crate::{Error, JobId, Result};

/// Default cap on retained log text.
pub const DEFAULT_LOG_LIMIT_BYTES: usize = 1024 * 1024;

/// Positive listing identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ListingId(NonZeroU64);

impl ListingId {
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

/// Variant tag selecting the video template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Variant(String);

impl Variant {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A validated render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub listing_id: ListingId,
    pub variant: Variant,
}

impl RenderRequest {
    /// Validate a JSON request body.
    ///
    /// `listingId` may also be spelled `id` or `listing_id`, and may be a
    /// number or a numeric string. A missing or empty `variant` falls back to
    /// `default_variant`.
    pub fn from_json(body: &Value, default_variant: &str) -> Result<Self> {
        let raw_id = ["listingId", "id", "listing_id"]
            .iter()
            .find_map(|key| body.get(*key).filter(|v| !v.is_null()));

        let listing_id = raw_id
            .and_then(parse_listing_id)
            .ok_or_else(|| Error::Validation("listingId (positive number) is required".into()))?;

        let variant = match body.get("variant") {
            None | Some(Value::Null) => default_variant.to_string(),
            Some(Value::String(s)) if s.trim().is_empty() => default_variant.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Err(Error::Validation("variant must be a string".into())),
        };

        Ok(Self {
            listing_id,
            variant: Variant::new(variant),
        })
    }
}

fn parse_listing_id(value: &Value) -> Option<ListingId> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f > 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .and_then(ListingId::new),
        Value::String(s) => s.trim().parse::<u64>().ok().and_then(ListingId::new),
        _ => None,
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[display("accepted")]
    Accepted,
    #[display("running")]
    Running,
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
    #[display("timed_out")]
    TimedOut,
    #[display("cancelled")]
    Cancelled,
    #[display("released")]
    Released,
}

impl JobState {
    /// True for the four outcome states.
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Cancelled
        )
    }

    fn can_advance_to(&self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Accepted, JobState::Running) => true,
            // Spawn failure: nothing was ever supervised.
            (JobState::Accepted, JobState::Released) => true,
            (JobState::Running, next) => next.is_outcome(),
            (from, JobState::Released) => from.is_outcome(),
            _ => false,
        }
    }
}

/// Why a job was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// `POST /api/cancel`.
    #[display("requested")]
    Requested,
    /// The client that submitted the render went away.
    #[display("disconnected")]
    Disconnected,
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        output: Option<String>,
        external_url: Option<String>,
    },
    Failed {
        exit_code: Option<i32>,
        logs: String,
    },
    TimedOut,
    Cancelled {
        reason: CancelReason,
    },
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded { .. } => JobState::Succeeded,
            JobOutcome::Failed { .. } => JobState::Failed,
            JobOutcome::TimedOut => JobState::TimedOut,
            JobOutcome::Cancelled { .. } => JobState::Cancelled,
        }
    }
}

/// Final report handed to whoever is waiting on a job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobId,
    pub listing_id: ListingId,
    pub variant: Variant,
    pub outcome: JobOutcome,
    pub duration: Duration,
}

/// Accumulated pipeline output, keeping only the most recent `limit` bytes.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl LogBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');

        if self.text.len() > self.limit {
            let mut cut = self.text.len() - self.limit;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
            self.truncated = true;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether older output has been discarded.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LOG_LIMIT_BYTES)
    }
}

/// The single in-flight unit of render work.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub listing_id: ListingId,
    pub variant: Variant,
    pub started_at: DateTime<Utc>,
    pub logs: LogBuffer,
    pub markers: Markers,
    state: JobState,
}

impl Job {
    pub fn new(request: RenderRequest, log_limit: usize) -> Self {
        Self {
            id: JobId::new(),
            listing_id: request.listing_id,
            variant: request.variant,
            started_at: Utc::now(),
            logs: LogBuffer::with_limit(log_limit),
            markers: Markers::default(),
            state: JobState::Accepted,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`, rejecting anything the lifecycle does not allow.
    pub fn advance(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Tee one line of pipeline output into the log buffer and, for stdout,
    /// the marker table.
    pub fn record(&mut self, line: &LogLine) {
        self.logs.push_line(&line.content);
        if matches!(line.stream, LogStream::Stdout) {
            self.markers.observe(&line.content);
        }
    }

    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Outcome for a pipeline that exited with `exit_code`.
    pub fn exit_outcome(&self, exit_code: Option<i32>) -> JobOutcome {
        if exit_code == Some(0) {
            JobOutcome::Succeeded {
                output: self.markers.get(OUTPUT_KEY).map(str::to_string),
                external_url: self.markers.get(EXTERNAL_URL_KEY).map(str::to_string),
            }
        } else {
            JobOutcome::Failed {
                exit_code,
                logs: self.logs.as_str().to_string(),
            }
        }
    }

    pub fn report(&self, outcome: JobOutcome) -> JobReport {
        JobReport {
            job_id: self.id,
            listing_id: self.listing_id,
            variant: self.variant.clone(),
            outcome,
            duration: self.elapsed(),
        }
    }
}
