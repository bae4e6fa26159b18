//! Wall-clock triggers for the background jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::AppConfig;
use crate::jobs::Jobs;
use crate::week::next_weekly_slot;

const DRAIN_EVERY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct WeeklySlot {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

impl WeeklySlot {
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        next_weekly_slot(now, tz, self.weekday, self.hour, self.minute)
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub tz: Tz,
    pub weekly_run: WeeklySlot,
    pub expire_sweep: WeeklySlot,
}

impl Schedule {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            tz: config.tz()?,
            weekly_run: WeeklySlot {
                weekday: config.run_weekday()?,
                hour: config.run_hour,
                minute: 0,
            },
            expire_sweep: WeeklySlot {
                weekday: config.sweep_weekday()?,
                hour: config.sweep_hour,
                minute: config.sweep_minute,
            },
        })
    }
}

async fn sleep_until(at: DateTime<Utc>) {
    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(wait).await;
}

/// Spawns one task per job. Failures are logged and the loop waits for the
/// next slot.
pub fn spawn(jobs: Arc<Jobs>, schedule: Schedule) {
    let run_jobs = jobs.clone();
    let slot = schedule.weekly_run;
    let tz = schedule.tz;
    tokio::spawn(async move {
        loop {
            let next = slot.next_after(Utc::now(), tz);
            tracing::info!(next = %next, "next weekly run scheduled");
            sleep_until(next).await;
            // Errors are already logged and counted by the job itself.
            let _ = run_jobs.weekly_run(Utc::now()).await;
        }
    });

    let sweep_jobs = jobs.clone();
    let slot = schedule.expire_sweep;
    tokio::spawn(async move {
        loop {
            let next = slot.next_after(Utc::now(), tz);
            tracing::info!(next = %next, "next expire sweep scheduled");
            sleep_until(next).await;
            if let Err(e) = sweep_jobs.expire_sweep(Utc::now()).await {
                tracing::error!(error = %e, "expire sweep failed");
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(DRAIN_EVERY);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = jobs.drain_notifications(Utc::now()).await {
                tracing::error!(error = %e, "delayed notification drain failed");
            }
        }
    });
}
