//! Recurring jobs and their registration.
//!
//! Every action reads the wall clock when it fires, so "today" and "this
//! week" always mean the moment of the run, not the moment of registration.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, Timelike};
use tracing::{debug, info};

use crate::{
    app::AppState,
    retention,
    scheduler::{Scheduler, Trigger},
    timelapse::{self, GenerationRequest},
};

// ---

/// Local time of the nightly retention sweep.
const RETENTION_TIME: NaiveTime = match NaiveTime::from_hms_opt(1, 0, 0) {
    Some(time) => time,
    None => panic!("retention time out of range"),
};

/// `start <= hour < end`, local time.
pub fn in_operating_hours(hour: u32, start: u32, end: u32) -> bool {
    start <= hour && hour < end
}

/// Capture at `now` unless it falls outside the operating window.
pub async fn capture_within_hours(state: &AppState, now: NaiveDateTime) -> Option<PathBuf> {
    // ---
    let cfg = state.capture.config();
    if !in_operating_hours(now.hour(), cfg.start_hour, cfg.end_hour) {
        debug!(hour = now.hour(), "Outside operating hours, skipping capture");
        return None;
    }
    state.capture.capture().await
}

/// One capture at startup so the station always has a frame to show.
pub async fn startup_capture(state: &AppState) -> Option<PathBuf> {
    // ---
    let photo = capture_within_hours(state, Local::now().naive_local()).await;
    if let Some(path) = &photo {
        info!(path = %path.display(), "Startup capture complete");
    }
    photo
}

/// Generate under the shared single-flight flag; skip if one is already running.
pub async fn generate_if_idle(state: &AppState, request: GenerationRequest) -> Option<PathBuf> {
    // ---
    let Some(ticket) = state.generation.try_begin(request) else {
        info!(%request, "Timelapse generation already running, skipping");
        return None;
    };
    timelapse::run_tracked(&state.timelapse, ticket, request).await
}

/// Run the retention sweep off the async runtime.
pub async fn sweep_photos(state: &AppState) -> Result<retention::PruneSummary> {
    // ---
    let dir = state.config.storage.photo_dir.clone();
    let days = state.config.storage.retention_days;
    let summary = tokio::task::spawn_blocking(move || retention::prune(&dir, days)).await?;
    debug!(?summary, "Retention sweep finished");
    Ok(summary)
}

/// Register the station's recurring jobs on `scheduler`.
pub fn register_jobs(scheduler: &mut Scheduler, state: &AppState) {
    // ---
    let cfg = &state.config;

    let s = state.clone();
    scheduler.register(
        "capture",
        Trigger::Every {
            minutes: cfg.capture.interval_minutes,
        },
        move || {
            let s = s.clone();
            async move {
                capture_within_hours(&s, Local::now().naive_local()).await;
                Ok(())
            }
        },
    );

    for time in &cfg.analysis.times {
        let s = state.clone();
        scheduler.register(
            format!("analysis@{}", time.format("%H:%M")),
            Trigger::DailyAt(*time),
            move || {
                let s = s.clone();
                async move {
                    s.analysis.analyze().await;
                    Ok(())
                }
            },
        );
    }

    let s = state.clone();
    scheduler.register(
        "daily-timelapse",
        Trigger::DailyAt(cfg.timelapse.daily_time),
        move || {
            let s = s.clone();
            async move {
                let date = Local::now().date_naive();
                generate_if_idle(&s, GenerationRequest::Daily { date }).await;
                Ok(())
            }
        },
    );

    let s = state.clone();
    scheduler.register(
        "weekly-timelapse",
        Trigger::WeeklyAt {
            day: cfg.timelapse.weekly_day,
            time: cfg.timelapse.weekly_time,
        },
        move || {
            let s = s.clone();
            async move {
                let week = Local::now().date_naive().iso_week();
                let request = GenerationRequest::Weekly {
                    year: week.year(),
                    week: week.week(),
                };
                generate_if_idle(&s, request).await;
                Ok(())
            }
        },
    );

    let s = state.clone();
    scheduler.register(
        "retention",
        Trigger::DailyAt(RETENTION_TIME),
        move || {
            let s = s.clone();
            async move { sweep_photos(&s).await.map(|_| ()) }
        },
    );
}
