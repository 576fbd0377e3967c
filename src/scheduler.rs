//! Wall-clock job scheduler.
//!
//! A single dispatch loop wakes every `poll_interval`, runs every due job in
//! registration order and reschedules it. Each job is isolated: an error or
//! a panic is logged and the next due job still runs in the same tick.

use std::{fmt, panic::AssertUnwindSafe, time::Duration};

use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Weekday};
use futures::{future::BoxFuture, FutureExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

// ---

/// Default polling interval for the dispatch loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Every { minutes: u32 },
    DailyAt(NaiveTime),
    WeeklyAt { day: Weekday, time: NaiveTime },
}

impl Trigger {
    /// When a job with this trigger fires next, given it last ran (or was
    /// registered) at `after`. Always strictly later than `after`.
    pub fn next_after(&self, after: NaiveDateTime) -> NaiveDateTime {
        // ---
        match *self {
            Trigger::Every { minutes } => after + ChronoDuration::minutes(i64::from(minutes.max(1))),
            Trigger::DailyAt(time) => {
                let today = after.date().and_time(time);
                if today > after {
                    today
                } else {
                    today + ChronoDuration::days(1)
                }
            }
            Trigger::WeeklyAt { day, time } => {
                let ahead = (7 + day.num_days_from_monday() as i64
                    - after.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = (after.date() + ChronoDuration::days(ahead)).and_time(time);
                if candidate > after {
                    candidate
                } else {
                    candidate + ChronoDuration::weeks(1)
                }
            }
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Every { minutes } => write!(f, "every {minutes} minutes"),
            Trigger::DailyAt(time) => write!(f, "every day at {}", time.format("%H:%M")),
            Trigger::WeeklyAt { day, time } => {
                write!(f, "every {day} at {}", time.format("%H:%M"))
            }
        }
    }
}

type Action = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Job {
    name: String,
    trigger: Trigger,
    next_run: NaiveDateTime,
    action: Action,
}

/// Snapshot of one registered job, for logging and inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub name: String,
    pub trigger: Trigger,
    pub next_run: NaiveDateTime,
}

pub struct Scheduler {
    origin: NaiveDateTime,
    poll_interval: Duration,
    jobs: Vec<Job>,
}

impl Scheduler {
    /// `origin` is the registration time from which first runs are computed.
    pub fn new(origin: NaiveDateTime, poll_interval: Duration) -> Self {
        Scheduler {
            origin,
            poll_interval,
            jobs: Vec::new(),
        }
    }

    pub fn register<F, Fut>(&mut self, name: impl Into<String>, trigger: Trigger, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        // ---
        let name = name.into();
        let next_run = trigger.next_after(self.origin);
        debug!(job = %name, %trigger, %next_run, "Registered job");
        self.jobs.push(Job {
            name,
            trigger,
            next_run,
            action: Box::new(move || action().boxed()),
        });
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        self.jobs
            .iter()
            .map(|j| JobInfo {
                name: j.name.clone(),
                trigger: j.trigger,
                next_run: j.next_run,
            })
            .collect()
    }

    /// Run every job due at `now`, in registration order. Returns how many ran.
    pub async fn run_pending(&mut self, now: NaiveDateTime) -> usize {
        // ---
        let mut ran = 0;
        for job in self.jobs.iter_mut().filter(|j| j.next_run <= now) {
            debug!(job = %job.name, "Running job");
            match AssertUnwindSafe((job.action)()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(job = %job.name, error = %e, "Job failed"),
                Err(panic) => error!(job = %job.name, panic = %panic_message(&*panic), "Job panicked"),
            }
            job.next_run = job.trigger.next_after(now);
            ran += 1;
        }
        ran
    }

    /// Dispatch loop. Never returns.
    pub async fn run(mut self) {
        // ---
        info!(
            jobs = self.jobs.len(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "Scheduler started"
        );
        for job in self.jobs() {
            info!(job = %job.name, trigger = %job.trigger, next_run = %job.next_run, "Scheduled");
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_pending(Local::now().naive_local()).await;
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    // ---
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        // 2026-02-02 is a Monday.
        NaiveDate::from_ymd_opt(2026, 2, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn camera_busy() -> anyhow::Result<()> {
        anyhow::bail!("camera busy")
    }

    fn explode() -> anyhow::Result<()> {
        panic!("boom")
    }

    #[test]
    fn test_interval_trigger() {
        // ---
        let every = Trigger::Every { minutes: 30 };
        assert_eq!(every.next_after(at(2, 10, 0)), at(2, 10, 30));
        assert_eq!(every.next_after(at(2, 23, 45)), at(3, 0, 15));
    }

    #[test]
    fn test_daily_trigger_is_strictly_after() {
        // ---
        let daily = Trigger::DailyAt(hm(22, 30));
        assert_eq!(daily.next_after(at(2, 9, 0)), at(2, 22, 30));
        assert_eq!(daily.next_after(at(2, 22, 30)), at(3, 22, 30));
        assert_eq!(daily.next_after(at(2, 23, 0)), at(3, 22, 30));
    }

    #[test]
    fn test_weekly_trigger() {
        // ---
        let sunday = Trigger::WeeklyAt {
            day: Weekday::Sun,
            time: hm(23, 0),
        };
        // Monday -> the coming Sunday.
        assert_eq!(sunday.next_after(at(2, 8, 0)), at(8, 23, 0));
        // Sunday before the time -> same day.
        assert_eq!(sunday.next_after(at(8, 12, 0)), at(8, 23, 0));
        // Sunday at or past the time -> next week.
        assert_eq!(sunday.next_after(at(8, 23, 0)), at(15, 23, 0));

        let monday = Trigger::WeeklyAt {
            day: Weekday::Mon,
            time: hm(6, 0),
        };
        assert_eq!(monday.next_after(at(8, 23, 0)), at(9, 6, 0));
    }

    #[test]
    fn test_trigger_display() {
        // ---
        assert_eq!(Trigger::Every { minutes: 15 }.to_string(), "every 15 minutes");
        assert_eq!(
            Trigger::WeeklyAt {
                day: Weekday::Sun,
                time: hm(23, 0)
            }
            .to_string(),
            "every Sun at 23:00"
        );
    }

    #[tokio::test]
    async fn test_failing_and_panicking_jobs_do_not_block_others() {
        // ---
        let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let mut scheduler = Scheduler::new(at(2, 9, 0), DEFAULT_POLL_INTERVAL);

        let l = Arc::clone(&log);
        scheduler.register("fails", Trigger::Every { minutes: 10 }, move || {
            let l = Arc::clone(&l);
            async move {
                l.lock().unwrap().push("fails");
                camera_busy()
            }
        });
        let l = Arc::clone(&log);
        scheduler.register("panics", Trigger::Every { minutes: 10 }, move || {
            let l = Arc::clone(&l);
            async move {
                l.lock().unwrap().push("panics");
                explode()
            }
        });
        let l = Arc::clone(&log);
        scheduler.register("works", Trigger::Every { minutes: 10 }, move || {
            let l = Arc::clone(&l);
            async move {
                l.lock().unwrap().push("works");
                Ok(())
            }
        });

        assert_eq!(scheduler.run_pending(at(2, 9, 5)).await, 0);
        assert_eq!(scheduler.run_pending(at(2, 9, 10)).await, 3);
        assert_eq!(*log.lock().unwrap(), vec!["fails", "panics", "works"]);

        // All three were rescheduled alike.
        for job in scheduler.jobs() {
            assert_eq!(job.next_run, at(2, 9, 20), "{}", job.name);
        }
        assert_eq!(scheduler.run_pending(at(2, 9, 20)).await, 3);
    }

    #[tokio::test]
    async fn test_only_due_jobs_run() {
        // ---
        let count = Arc::new(Mutex::new(0u32));
        let mut scheduler = Scheduler::new(at(2, 9, 0), DEFAULT_POLL_INTERVAL);

        let c = Arc::clone(&count);
        scheduler.register("nightly", Trigger::DailyAt(hm(1, 0)), move || {
            let c = Arc::clone(&c);
            async move {
                *c.lock().unwrap() += 1;
                Ok(())
            }
        });

        assert_eq!(scheduler.jobs()[0].next_run, at(3, 1, 0));
        scheduler.run_pending(at(2, 23, 59)).await;
        assert_eq!(*count.lock().unwrap(), 0);

        scheduler.run_pending(at(3, 1, 0)).await;
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(scheduler.jobs()[0].next_run, at(4, 1, 0));
    }
}
