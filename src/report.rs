use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::cache::SnapshotCache;
use crate::db::{self, Pool, Room, SubmissionRecord, TrackedUser};
use crate::digest::{self, SolvedProblem, UserDigest};
use crate::model::{problem_url, Submission};
use crate::stats::{Catalog, StatsError, StatsSource};
use crate::webhook::{notify_best_effort, Notifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    /// Prefix of error notifications.
    pub instance_name: String,
    pub user_delay: Duration,
    pub max_listed: usize,
}

/// What happened to one room during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomOutcome {
    Posted,
    NothingNew,
    /// Fetching a user failed; the room is retried next cycle.
    Skipped,
    /// A database error aborted the room; it is retried next cycle.
    Failed,
}

/// Resolve API submissions into rows, naming problems through the catalog.
pub fn to_records(
    catalog: &Catalog,
    submissions: &[Submission],
) -> Result<Vec<SubmissionRecord>, StatsError> {
    submissions
        .iter()
        .map(|s| {
            Ok(SubmissionRecord {
                submission_url: s.url(),
                problem_url: s.problem_url(),
                problem_name: catalog.problem_name(&s.contest_id, &s.problem_id)?,
                result: s.result.clone(),
                score: s.point,
            })
        })
        .collect()
}

#[instrument(skip(pool, stats, catalog))]
pub async fn update_user(
    pool: &Pool,
    stats: &dyn StatsSource,
    catalog: &Catalog,
    atcoder_id: &str,
) -> Result<u64> {
    let submissions = stats.fetch_submissions(atcoder_id).await?;
    let records = to_records(catalog, &submissions)?;
    let inserted = db::record_submissions(pool, atcoder_id, &records, Utc::now()).await?;
    info!(atcoder_id, fetched = submissions.len(), inserted, "updated user");
    Ok(inserted)
}

/// Fetch every tracked user of the room, then post what they solved since the
/// room's last report.
#[instrument(skip_all, fields(room_id = %room.room_id))]
pub async fn report_room(
    pool: &Pool,
    stats: &dyn StatsSource,
    notifier: &dyn Notifier,
    catalog: &Catalog,
    room: &Room,
    settings: &ReportSettings,
) -> Result<RoomOutcome> {
    let since = db::init_last_reported(pool, &room.room_id, Utc::now()).await?;
    let users = db::list_users(pool, &room.room_id).await?;

    for (i, user) in users.iter().enumerate() {
        if i > 0 && !settings.user_delay.is_zero() {
            tokio::time::sleep(settings.user_delay).await;
        }
        if let Err(err) = update_user(pool, stats, catalog, &user.atcoder_id).await {
            error!(?err, user_id = %user.user_id, "failed to update user; skipping room");
            let text = format!(
                "{}: `{}` at user @{}",
                settings.instance_name, err, user.user_id
            );
            notify_best_effort(notifier, &room.webhook_url, &text).await;
            return Ok(RoomOutcome::Skipped);
        }
    }

    let text = summarize(pool, &users, since, settings.max_listed).await?;
    if text.is_empty() {
        info!("nothing new to report");
        return Ok(RoomOutcome::NothingNew);
    }

    info!(%text, "posting digest");
    notify_best_effort(notifier, &room.webhook_url, &text).await;
    db::set_last_reported(pool, &room.room_id, Utc::now()).await?;
    Ok(RoomOutcome::Posted)
}

async fn summarize(
    pool: &Pool,
    users: &[TrackedUser],
    since: chrono::DateTime<Utc>,
    max_listed: usize,
) -> Result<String> {
    let mut digests = Vec::with_capacity(users.len());
    for user in users {
        let solved = db::newly_accepted(pool, &user.atcoder_id, since).await?;
        digests.push(UserDigest::new(
            user.user_id.as_str(),
            solved.into_iter().map(SolvedProblem::from).collect(),
        ));
    }
    Ok(digest::compose(digests, max_listed))
}

/// One polling cycle over every activated room.
#[instrument(skip_all)]
pub async fn report_all_rooms(
    pool: &Pool,
    stats: &dyn StatsSource,
    notifier: &dyn Notifier,
    settings: &ReportSettings,
) -> Result<Vec<(String, RoomOutcome)>> {
    let rooms = db::activated_rooms(pool).await?;
    let catalog = match Catalog::fetch(stats).await {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(?err, "failed to fetch contest catalog; skipping cycle");
            return Ok(Vec::new());
        }
    };

    let mut outcomes = Vec::with_capacity(rooms.len());
    for room in &rooms {
        let outcome = match report_room(pool, stats, notifier, &catalog, room, settings).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(?err, room_id = %room.room_id, "failed to report room");
                RoomOutcome::Failed
            }
        };
        outcomes.push((room.room_id.clone(), outcome));
    }
    Ok(outcomes)
}

/// Day a daemon starting on `today` counts as already reported.
/// `None` makes the first check run a cycle.
pub fn initial_report_day(today: NaiveDate, run_now: bool) -> Option<NaiveDate> {
    if run_now {
        None
    } else {
        Some(today)
    }
}

/// A cycle is due once per local date.
pub fn cycle_due(last_day: Option<NaiveDate>, today: NaiveDate) -> bool {
    last_day != Some(today)
}

/// Wake every `poll_interval` and run a cycle whenever the local date changed.
/// With `run_now` the first cycle starts immediately.
pub async fn run_daemon(
    pool: &Pool,
    stats: &dyn StatsSource,
    notifier: &dyn Notifier,
    settings: &ReportSettings,
    poll_interval: Duration,
    run_now: bool,
) {
    let mut last_day = initial_report_day(Local::now().date_naive(), run_now);
    loop {
        let today = Local::now().date_naive();
        if cycle_due(last_day, today) {
            last_day = Some(today);
            info!(%today, "begin report cycle");
            match report_all_rooms(pool, stats, notifier, settings).await {
                Ok(outcomes) => info!(rooms = outcomes.len(), "end report cycle"),
                Err(err) => error!(?err, "report cycle failed"),
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Database-free digest: diff each user's submissions against the snapshot
/// cached by the previous run. `users` maps chat handle to AtCoder id.
#[instrument(skip_all)]
pub async fn standalone_digest(
    stats: &dyn StatsSource,
    cache: &SnapshotCache,
    users: &BTreeMap<String, String>,
    settings: &ReportSettings,
) -> Result<String> {
    let catalog = Catalog::fetch(stats)
        .await
        .context("failed to fetch contest catalog")?;

    let mut digests = Vec::with_capacity(users.len());
    for (i, (handle, atcoder_id)) in users.iter().enumerate() {
        if i > 0 && !settings.user_delay.is_zero() {
            tokio::time::sleep(settings.user_delay).await;
        }
        let latest = stats
            .fetch_submissions(atcoder_id)
            .await
            .with_context(|| format!("failed to fetch submissions of {atcoder_id}"))?;
        let previous = cache.swap(atcoder_id, &latest).await?;

        let mut problems = Vec::new();
        for problem_id in digest::accepted_delta(&latest, &previous) {
            let Some(sub) = latest
                .iter()
                .find(|s| s.is_accepted() && s.problem_id == problem_id)
            else {
                continue;
            };
            problems.push(SolvedProblem {
                name: catalog.problem_name(&sub.contest_id, &problem_id)?,
                url: problem_url(&sub.contest_id, &problem_id),
                score: catalog.problem(&problem_id)?.point,
            });
        }
        if problems.is_empty() {
            continue;
        }
        info!(handle, solved = problems.len(), "new accepted problems");
        digests.push(UserDigest::new(handle.as_str(), problems));
    }
    Ok(digest::compose(digests, settings.max_listed))
}
