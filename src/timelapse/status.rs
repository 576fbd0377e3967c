//! Single-flight guard and pollable status for timelapse generation.
//!
//! State machine: `idle -> generating -> idle`. A second request while
//! generating is rejected, not queued. The lock is held only to flip state,
//! never across an encode.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GenerationRequest {
    Daily { date: NaiveDate },
    Weekly { year: i32, week: u32 },
}

impl fmt::Display for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationRequest::Daily { date } => write!(f, "daily {date}"),
            GenerationRequest::Weekly { year, week } => write!(f, "weekly {year}-W{week:02}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Outcome {
    Generated { file: String },
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    #[default]
    Idle,
    Generating,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRun {
    pub id: Uuid,
    pub request: GenerationRequest,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub outcome: Option<Outcome>,
}

/// What `GET /api/timelapse/status` reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationStatus {
    pub state: GenerationState,
    pub current: Option<GenerationRun>,
    pub last: Option<GenerationRun>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationTracker {
    inner: Arc<Mutex<GenerationStatus>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the generator for `request`, or `None` if one is already running.
    pub fn try_begin(&self, request: GenerationRequest) -> Option<GenerationTicket> {
        // ---
        let mut status = self.lock();
        if status.state == GenerationState::Generating {
            return None;
        }
        let run = GenerationRun {
            id: Uuid::new_v4(),
            request,
            started_at: Local::now().naive_local(),
            finished_at: None,
            outcome: None,
        };
        let id = run.id;
        status.state = GenerationState::Generating;
        status.current = Some(run);
        Some(GenerationTicket {
            tracker: self.clone(),
            id,
            outcome: None,
        })
    }

    pub fn snapshot(&self) -> GenerationStatus {
        self.lock().clone()
    }

    pub fn is_generating(&self) -> bool {
        self.lock().state == GenerationState::Generating
    }

    fn lock(&self) -> MutexGuard<'_, GenerationStatus> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of holding the generator. Dropping it returns the tracker to idle.
#[derive(Debug)]
pub struct GenerationTicket {
    tracker: GenerationTracker,
    id: Uuid,
    outcome: Option<Outcome>,
}

impl GenerationTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Record the outcome and release the generator.
    pub fn finish(mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for GenerationTicket {
    fn drop(&mut self) {
        // ---
        let mut status = self.tracker.lock();
        if let Some(mut run) = status.current.take() {
            run.finished_at = Some(Local::now().naive_local());
            run.outcome = Some(self.outcome.take().unwrap_or(Outcome::Skipped));
            status.last = Some(run);
        }
        status.state = GenerationState::Idle;
    }
}
