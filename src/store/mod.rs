//! Persistent Stats Store (C3).
//!
//! A relational store of user-package settings and daily I/O usage rows,
//! backed by embedded SQLite via `rusqlite` + `r2d2` + `r2d2_sqlite` for a
//! local on-disk store with a genuine two-table relational schema and the
//! aggregation/retention/cascade-delete queries this crate needs.
//!
//! SQLite-level transactions provide atomicity for every `save*` contract;
//! the store itself is single-thread-safe per connection, and callers
//! serialize at the pool rather than the store taking its own lock.

mod error;
mod schema;

pub use error::StoreError;

use crate::types::{DailyIoUsage, KillableState, PerStateBytes, UserPackageKey};
use chrono::{Duration, NaiveDate};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// One entry for `saveUserPackageSettings`.
#[derive(Debug, Clone)]
pub struct UserPackageSettingsEntry {
    pub key: UserPackageKey,
    pub killable_state: KillableState,
}

/// One entry for `saveIoUsageStats`.
#[derive(Debug, Clone)]
pub struct IoUsageStatsEntry {
    pub key: UserPackageKey,
    pub usage: DailyIoUsage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalOveruseStats {
    pub start_date: NaiveDate,
    pub total_overuses: u64,
    pub total_times_killed: u64,
    pub written_bytes: PerStateBytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySystemSummary {
    pub date: NaiveDate,
    pub written_bytes: PerStateBytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopUserDailySummary {
    pub user_id: i32,
    pub package_name: String,
    pub date: NaiveDate,
    pub written_bytes: PerStateBytes,
}

fn date_to_epoch(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
        .timestamp()
}

fn epoch_to_date(epoch: i64) -> NaiveDate {
    chrono::DateTime::from_timestamp(epoch, 0)
        .expect("epoch seconds fit in DateTime<Utc>")
        .date_naive()
}

fn killable_state_str(state: KillableState) -> &'static str {
    match state {
        KillableState::Yes => "yes",
        KillableState::No => "no",
        KillableState::Never => "never",
    }
}

fn killable_state_from_str(s: &str) -> KillableState {
    match s {
        "no" => KillableState::No,
        "never" => KillableState::Never,
        _ => KillableState::Yes,
    }
}

/// C3: the persistent stats store.
pub struct StatsStore {
    pool: Pool<SqliteConnectionManager>,
    row_id_cache: Mutex<HashMap<UserPackageKey, i64>>,
}

impl StatsStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::new(manager)?;
        Self::from_pool(pool)
    }

    /// In-memory store for tests. A single pooled connection is pinned so
    /// the in-memory database isn't dropped between checkouts.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        {
            let conn = pool.get()?;
            schema::ensure_schema(&conn)?;
        }
        let row_id_cache = Mutex::new(Self::load_row_id_cache(&pool)?);
        Ok(Self { pool, row_id_cache })
    }

    fn load_row_id_cache(
        pool: &Pool<SqliteConnectionManager>,
    ) -> Result<HashMap<UserPackageKey, i64>, StoreError> {
        let conn = pool.get()?;
        let mut stmt =
            conn.prepare("SELECT row_id, package_name, user_id FROM user_package_settings")?;
        let rows = stmt.query_map([], |row| {
            let row_id: i64 = row.get(0)?;
            let package_name: String = row.get(1)?;
            let user_id: i32 = row.get(2)?;
            Ok((UserPackageKey::new(user_id, package_name), row_id))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (key, row_id) = row?;
            map.insert(key, row_id);
        }
        Ok(map)
    }

    /// Row id assigned to `key`, if it has ever been persisted.
    pub fn row_id(&self, key: &UserPackageKey) -> Option<i64> {
        self.row_id_cache.lock().expect("lock").get(key).copied()
    }

    /// All persisted settings rows, used by the overuse engine's init
    /// pipeline to seed in-memory killable state and the default-not-killable
    /// set.
    pub fn list_user_package_settings(
        &self,
    ) -> Result<Vec<(UserPackageKey, KillableState)>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT package_name, user_id, killable_state FROM user_package_settings")?;
        let rows = stmt.query_map([], |row| {
            let package_name: String = row.get(0)?;
            let user_id: i32 = row.get(1)?;
            let state: String = row.get(2)?;
            Ok((
                UserPackageKey::new(user_id, package_name),
                killable_state_from_str(&state),
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Atomic replace-or-insert of all rows in a single transaction;
    /// all-or-nothing. Newly inserted rows are then queried to populate the
    /// in-memory row-id mapping.
    pub fn save_user_package_settings(
        &self,
        entries: &[UserPackageSettingsEntry],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT INTO user_package_settings (package_name, user_id, killable_state)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(package_name, user_id) DO UPDATE SET killable_state = excluded.killable_state",
                params![
                    entry.key.generic_package_name,
                    entry.key.user_id,
                    killable_state_str(entry.killable_state)
                ],
            )?;
        }
        tx.commit()?;

        let mut cache = self.row_id_cache.lock().expect("lock");
        for entry in entries {
            let row_id: i64 = conn.query_row(
                "SELECT row_id FROM user_package_settings WHERE package_name = ?1 AND user_id = ?2",
                params![entry.key.generic_package_name, entry.key.user_id],
                |row| row.get(0),
            )?;
            cache.insert(entry.key.clone(), row_id);
        }
        Ok(())
    }

    /// For each entry, look up the row id via the settings map; silently
    /// skip entries whose day is older than the retention period when the
    /// check is enabled; atomic replace of the remaining rows in one
    /// transaction. Returns the number of rows actually written.
    pub fn save_io_usage_stats(
        &self,
        entries: &[IoUsageStatsEntry],
        check_retention: bool,
        retention_days: i64,
        today: NaiveDate,
    ) -> Result<usize, StoreError> {
        let cutoff = today - Duration::days(retention_days - 1);
        let row_ids: HashMap<UserPackageKey, i64> = self.row_id_cache.lock().expect("lock").clone();

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let mut written = 0usize;
        for entry in entries {
            if check_retention && entry.usage.date < cutoff {
                continue;
            }
            let Some(row_id) = row_ids.get(&entry.key) else {
                continue;
            };

            let (rem_fg, rem_bg, rem_gm) = match entry.usage.remaining_write_bytes {
                Some(p) => (
                    Some(p.foreground_bytes as i64),
                    Some(p.background_bytes as i64),
                    Some(p.garage_mode_bytes as i64),
                ),
                None => (None, None, None),
            };
            let (forg_fg, forg_bg, forg_gm) = match entry.usage.forgiven_write_bytes {
                Some(p) => (
                    Some(p.foreground_bytes as i64),
                    Some(p.background_bytes as i64),
                    Some(p.garage_mode_bytes as i64),
                ),
                None => (None, None, None),
            };

            tx.execute(
                "INSERT INTO io_usage_stats (
                    user_package_id, date_epoch, num_overuses, num_forgiven_overuses,
                    num_times_killed, written_fg, written_bg, written_gm,
                    remaining_fg, remaining_bg, remaining_gm,
                    forgiven_fg, forgiven_bg, forgiven_gm
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
                 ON CONFLICT(user_package_id, date_epoch) DO UPDATE SET
                    num_overuses = excluded.num_overuses,
                    num_forgiven_overuses = excluded.num_forgiven_overuses,
                    num_times_killed = excluded.num_times_killed,
                    written_fg = excluded.written_fg,
                    written_bg = excluded.written_bg,
                    written_gm = excluded.written_gm,
                    remaining_fg = excluded.remaining_fg,
                    remaining_bg = excluded.remaining_bg,
                    remaining_gm = excluded.remaining_gm,
                    forgiven_fg = excluded.forgiven_fg,
                    forgiven_bg = excluded.forgiven_bg,
                    forgiven_gm = excluded.forgiven_gm",
                params![
                    row_id,
                    date_to_epoch(entry.usage.date),
                    entry.usage.total_overuses as i64,
                    entry.usage.forgiven_overuses as i64,
                    entry.usage.total_times_killed as i64,
                    entry.usage.written_bytes.foreground_bytes as i64,
                    entry.usage.written_bytes.background_bytes as i64,
                    entry.usage.written_bytes.garage_mode_bytes as i64,
                    rem_fg,
                    rem_bg,
                    rem_gm,
                    forg_fg,
                    forg_bg,
                    forg_gm,
                ],
            )?;
            written += 1;
        }
        tx.commit()?;
        Ok(written)
    }

    /// Per-package aggregate of today's row. Callers are expected to
    /// memoize this for the duration of a boot (prior-boot rows for today
    /// are immutable from the point this is first read).
    pub fn get_today_io_usage_stats(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<(UserPackageKey, DailyIoUsage)>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT p.package_name, p.user_id,
                    s.num_overuses, s.num_forgiven_overuses, s.num_times_killed,
                    s.written_fg, s.written_bg, s.written_gm,
                    s.remaining_fg, s.remaining_bg, s.remaining_gm,
                    s.forgiven_fg, s.forgiven_bg, s.forgiven_gm
             FROM io_usage_stats s
             JOIN user_package_settings p ON p.row_id = s.user_package_id
             WHERE s.date_epoch = ?1",
        )?;
        let today_epoch = date_to_epoch(today);
        let rows = stmt.query_map(params![today_epoch], |row| {
            let package_name: String = row.get(0)?;
            let user_id: i32 = row.get(1)?;
            let usage = row_to_daily_usage(row, 2, today)?;
            Ok((UserPackageKey::new(user_id, package_name), usage))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Sums overuses, times-killed, and per-state written bytes over
    /// `(today - num_days_ago, today)`. Returns `None` when no rows exist
    /// or total written is zero.
    pub fn get_historical_io_overuse_stats(
        &self,
        user_id: i32,
        package_name: &str,
        num_days_ago: i64,
        today: NaiveDate,
    ) -> Result<Option<HistoricalOveruseStats>, StoreError> {
        let Some(row_id) = self.row_id(&UserPackageKey::new(user_id, package_name)) else {
            return Ok(None);
        };
        let from_epoch = date_to_epoch(today - Duration::days(num_days_ago));
        let to_epoch = date_to_epoch(today);

        let conn = self.pool.get()?;
        let result = conn.query_row(
            "SELECT COALESCE(SUM(num_overuses), 0), COALESCE(SUM(num_times_killed), 0),
                    COALESCE(SUM(written_fg), 0), COALESCE(SUM(written_bg), 0), COALESCE(SUM(written_gm), 0),
                    MIN(date_epoch), COUNT(*)
             FROM io_usage_stats
             WHERE user_package_id = ?1 AND date_epoch >= ?2 AND date_epoch < ?3",
            params![row_id, from_epoch, to_epoch],
            |row| {
                let total_overuses: i64 = row.get(0)?;
                let total_times_killed: i64 = row.get(1)?;
                let fg: i64 = row.get(2)?;
                let bg: i64 = row.get(3)?;
                let gm: i64 = row.get(4)?;
                let min_epoch: Option<i64> = row.get(5)?;
                let count: i64 = row.get(6)?;
                Ok((total_overuses, total_times_killed, fg, bg, gm, min_epoch, count))
            },
        )?;

        let (total_overuses, total_times_killed, fg, bg, gm, min_epoch, count) = result;
        let written_bytes = PerStateBytes::new(fg as u64, bg as u64, gm as u64);
        if count == 0 || (fg == 0 && bg == 0 && gm == 0) {
            return Ok(None);
        }
        Ok(Some(HistoricalOveruseStats {
            start_date: epoch_to_date(min_epoch.unwrap_or(from_epoch)),
            total_overuses: total_overuses as u64,
            total_times_killed: total_times_killed as u64,
            written_bytes,
        }))
    }

    /// Groups by UTC day across all packages; ascending date order,
    /// suppressing days with zero writes.
    pub fn get_daily_system_io_usage_summaries(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailySystemSummary>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT date_epoch, SUM(written_fg), SUM(written_bg), SUM(written_gm)
             FROM io_usage_stats
             WHERE date_epoch >= ?1 AND date_epoch <= ?2
             GROUP BY date_epoch
             HAVING SUM(written_fg) + SUM(written_bg) + SUM(written_gm) > 0
             ORDER BY date_epoch ASC",
        )?;
        let rows = stmt.query_map(params![date_to_epoch(from), date_to_epoch(to)], |row| {
            let epoch: i64 = row.get(0)?;
            let fg: i64 = row.get(1)?;
            let bg: i64 = row.get(2)?;
            let gm: i64 = row.get(3)?;
            Ok(DailySystemSummary {
                date: epoch_to_date(epoch),
                written_bytes: PerStateBytes::new(fg as u64, bg as u64, gm as u64),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Two-phase query: inner selects the top-n (user_package_id,
    /// total-written) pairs meeting the minimum; outer returns daily
    /// summaries for those ids only.
    pub fn get_top_users_daily_io_usage_summaries(
        &self,
        n: u32,
        min_total_written: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TopUserDailySummary>, StoreError> {
        let conn = self.pool.get()?;
        let from_epoch = date_to_epoch(from);
        let to_epoch = date_to_epoch(to);

        let mut top_stmt = conn.prepare(
            "SELECT user_package_id, SUM(written_fg + written_bg + written_gm) AS total
             FROM io_usage_stats
             WHERE date_epoch >= ?1 AND date_epoch <= ?2
             GROUP BY user_package_id
             HAVING total >= ?3
             ORDER BY total DESC
             LIMIT ?4",
        )?;
        let top_ids: Vec<i64> = top_stmt
            .query_map(
                params![from_epoch, to_epoch, min_total_written as i64, n],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        if top_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = top_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT p.user_id, p.package_name, s.date_epoch, s.written_fg, s.written_bg, s.written_gm
             FROM io_usage_stats s
             JOIN user_package_settings p ON p.row_id = s.user_package_id
             WHERE s.user_package_id IN ({placeholders}) AND s.date_epoch >= ? AND s.date_epoch <= ?
             ORDER BY s.date_epoch ASC"
        );
        let mut params: Vec<&dyn rusqlite::ToSql> =
            top_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        params.push(&from_epoch);
        params.push(&to_epoch);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            let user_id: i32 = row.get(0)?;
            let package_name: String = row.get(1)?;
            let epoch: i64 = row.get(2)?;
            let fg: i64 = row.get(3)?;
            let bg: i64 = row.get(4)?;
            let gm: i64 = row.get(5)?;
            Ok(TopUserDailySummary {
                user_id,
                package_name,
                date: epoch_to_date(epoch),
                written_bytes: PerStateBytes::new(fg as u64, bg as u64, gm as u64),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Per user_package_id, returns `totalOveruses - forgivenOveruses` when
    /// strictly positive, over `(today - num_days_ago, today)`.
    pub fn get_not_forgiven_historical_io_overuses(
        &self,
        num_days_ago: i64,
        today: NaiveDate,
    ) -> Result<HashMap<i64, u64>, StoreError> {
        let conn = self.pool.get()?;
        let from_epoch = date_to_epoch(today - Duration::days(num_days_ago));
        let to_epoch = date_to_epoch(today);
        let mut stmt = conn.prepare(
            "SELECT user_package_id, SUM(num_overuses) - SUM(num_forgiven_overuses) AS diff
             FROM io_usage_stats
             WHERE date_epoch >= ?1 AND date_epoch < ?2
             GROUP BY user_package_id
             HAVING diff > 0",
        )?;
        let rows = stmt.query_map(params![from_epoch, to_epoch], |row| {
            let id: i64 = row.get(0)?;
            let diff: i64 = row.get(1)?;
            Ok((id, diff as u64))
        })?;
        rows.collect::<Result<HashMap<_, _>, _>>().map_err(StoreError::from)
    }

    /// Updates `num_forgiven_overuses = num_overuses` for matching rows in
    /// the window, for the given (userId, packageName) pairs.
    pub fn forgive_historical_overuses(
        &self,
        packages_by_user_id: &HashMap<i32, Vec<String>>,
        num_days_ago: i64,
        today: NaiveDate,
    ) -> Result<(), StoreError> {
        let row_ids: Vec<i64> = packages_by_user_id
            .iter()
            .flat_map(|(user_id, packages)| {
                packages.iter().filter_map(move |package_name| {
                    self.row_id(&UserPackageKey::new(*user_id, package_name.clone()))
                })
            })
            .collect();
        if row_ids.is_empty() {
            return Ok(());
        }

        let from_epoch = date_to_epoch(today - Duration::days(num_days_ago));
        let to_epoch = date_to_epoch(today);
        let placeholders = row_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "UPDATE io_usage_stats SET num_forgiven_overuses = num_overuses
             WHERE user_package_id IN ({placeholders}) AND date_epoch >= ? AND date_epoch < ?"
        );
        let mut params: Vec<&dyn rusqlite::ToSql> =
            row_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        params.push(&from_epoch);
        params.push(&to_epoch);

        let conn = self.pool.get()?;
        conn.execute(&sql, params.as_slice())?;
        Ok(())
    }

    /// Deletes settings rows (and, by cascade, usage rows) whose user id is
    /// not in `alive_ids`.
    pub fn sync_users(&self, alive_ids: &[i32]) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        if alive_ids.is_empty() {
            conn.execute("DELETE FROM user_package_settings", [])?;
        } else {
            let placeholders = alive_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "DELETE FROM user_package_settings WHERE user_id NOT IN ({placeholders})"
            );
            let params: Vec<&dyn rusqlite::ToSql> =
                alive_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
            conn.execute(&sql, params.as_slice())?;
        }
        self.row_id_cache
            .lock()
            .expect("lock")
            .retain(|key, _| alive_ids.contains(&key.user_id));
        Ok(())
    }

    /// Idempotent per calendar day: deletes rows older than retention and
    /// nulls out the current/forgiven columns for historical rows.
    pub fn shrink_database(&self, today: NaiveDate, retention_days: i64) -> Result<(), StoreError> {
        let cutoff_epoch = date_to_epoch(today - Duration::days(retention_days - 1));
        let today_epoch = date_to_epoch(today);
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM io_usage_stats WHERE date_epoch < ?1",
            params![cutoff_epoch],
        )?;
        conn.execute(
            "UPDATE io_usage_stats SET
                remaining_fg = NULL, remaining_bg = NULL, remaining_gm = NULL,
                forgiven_fg = NULL, forgiven_bg = NULL, forgiven_gm = NULL
             WHERE date_epoch < ?1 AND date_epoch >= ?2",
            params![today_epoch, cutoff_epoch],
        )?;
        Ok(())
    }
}

fn row_to_daily_usage(
    row: &rusqlite::Row<'_>,
    start: usize,
    date: NaiveDate,
) -> rusqlite::Result<DailyIoUsage> {
    let total_overuses: i64 = row.get(start)?;
    let forgiven_overuses: i64 = row.get(start + 1)?;
    let total_times_killed: i64 = row.get(start + 2)?;
    let fg: i64 = row.get(start + 3)?;
    let bg: i64 = row.get(start + 4)?;
    let gm: i64 = row.get(start + 5)?;
    let remaining_fg: Option<i64> = row.get(start + 6)?;
    let remaining_bg: Option<i64> = row.get(start + 7)?;
    let remaining_gm: Option<i64> = row.get(start + 8)?;
    let forgiven_fg: Option<i64> = row.get(start + 9)?;
    let forgiven_bg: Option<i64> = row.get(start + 10)?;
    let forgiven_gm: Option<i64> = row.get(start + 11)?;

    let remaining_write_bytes = match (remaining_fg, remaining_bg, remaining_gm) {
        (Some(fg), Some(bg), Some(gm)) => {
            Some(PerStateBytes::new(fg as u64, bg as u64, gm as u64))
        }
        _ => None,
    };
    let forgiven_write_bytes = match (forgiven_fg, forgiven_bg, forgiven_gm) {
        (Some(fg), Some(bg), Some(gm)) => {
            Some(PerStateBytes::new(fg as u64, bg as u64, gm as u64))
        }
        _ => None,
    };

    Ok(DailyIoUsage {
        date,
        total_overuses: total_overuses as u64,
        forgiven_overuses: forgiven_overuses as u64,
        total_times_killed: total_times_killed as u64,
        written_bytes: PerStateBytes::new(fg as u64, bg as u64, gm as u64),
        remaining_write_bytes,
        forgiven_write_bytes,
    })
}
