//! On-disk schema. Schema version 1.

use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS user_package_settings (
            row_id        INTEGER PRIMARY KEY AUTOINCREMENT,
            package_name  TEXT NOT NULL,
            user_id       INTEGER NOT NULL,
            killable_state TEXT NOT NULL,
            UNIQUE(package_name, user_id)
        );

        CREATE TABLE IF NOT EXISTS io_usage_stats (
            user_package_id       INTEGER NOT NULL,
            date_epoch            INTEGER NOT NULL,
            num_overuses          INTEGER NOT NULL DEFAULT 0,
            num_forgiven_overuses INTEGER NOT NULL DEFAULT 0,
            num_times_killed      INTEGER NOT NULL DEFAULT 0,
            written_fg            INTEGER NOT NULL DEFAULT 0,
            written_bg            INTEGER NOT NULL DEFAULT 0,
            written_gm            INTEGER NOT NULL DEFAULT 0,
            remaining_fg          INTEGER,
            remaining_bg          INTEGER,
            remaining_gm          INTEGER,
            forgiven_fg           INTEGER,
            forgiven_bg           INTEGER,
            forgiven_gm           INTEGER,
            PRIMARY KEY (user_package_id, date_epoch),
            FOREIGN KEY (user_package_id) REFERENCES user_package_settings(row_id)
                ON DELETE CASCADE
        );
        ",
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
