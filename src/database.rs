use crate::types::{
    DrawRow, EntryRow, NewDraw, NewEntry, Numbers, ResultRow, SettingRow, SubscriptionRow, Winner,
};
use crate::utils::{numbers_from_string, numbers_to_string};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

pub fn create_database_with_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS draws (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            draw_date TEXT NOT NULL,
            numbers TEXT NOT NULL,
            jackpot_pence INTEGER NOT NULL,
            lucky_dip_prize_pence INTEGER NOT NULL,
            random_data TEXT NOT NULL,
            signature TEXT NOT NULL,
            is_test INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE UNIQUE INDEX IF NOT EXISTS draws_one_live_per_date
            ON draws (draw_date) WHERE is_test = 0;

        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            numbers TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            subscription_id TEXT,
            payment_ref TEXT UNIQUE,
            draw_date TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (subscription_id, draw_date, line_number)
        );

        CREATE INDEX IF NOT EXISTS entries_by_date ON entries (draw_date, is_active);

        CREATE TABLE IF NOT EXISTS results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            draw_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            entry_id INTEGER NOT NULL,
            matches INTEGER NOT NULL,
            prize_pence INTEGER NOT NULL,
            is_winner INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (draw_id, entry_id),
            FOREIGN KEY (draw_id) REFERENCES draws (id),
            FOREIGN KEY (entry_id) REFERENCES entries (id)
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            external_id TEXT NOT NULL UNIQUE,
            customer_id TEXT NOT NULL,
            lines TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            canceled_at DATETIME
        );",
    )
}

fn bad_column(idx: usize, what: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, format!("Invalid {}: {}", what, raw), Type::Text)
}

fn numbers_column(row: &Row, idx: usize) -> Result<Numbers> {
    let raw: String = row.get(idx)?;
    numbers_from_string(&raw).ok_or_else(|| bad_column(idx, "numbers", &raw))
}

/// True if a UNIQUE index or constraint rejected the statement.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// Draws

const DRAW_COLUMNS: &str = "id, draw_date, numbers, jackpot_pence, lucky_dip_prize_pence, \
                            random_data, signature, is_test, created_at";

fn draw_from_row(row: &Row) -> Result<DrawRow> {
    Ok(DrawRow {
        id: row.get(0)?,
        draw_date: row.get(1)?,
        numbers: numbers_column(row, 2)?,
        jackpot_pence: row.get(3)?,
        lucky_dip_prize_pence: row.get(4)?,
        random_data: row.get(5)?,
        signature: row.get(6)?,
        is_test: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn live_draw_exists_for_date(conn: &Connection, date: &str) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT COUNT(*) FROM draws WHERE draw_date = ?1 AND is_test = 0")?;
    let count: i64 = stmt.query_row([date], |row| row.get(0))?;
    Ok(count > 0)
}

pub fn insert_draw(conn: &Connection, draw: &NewDraw) -> Result<i64> {
    conn.execute(
        "INSERT INTO draws (
            draw_date, numbers, jackpot_pence, lucky_dip_prize_pence, random_data, signature, is_test
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            draw.draw_date,
            numbers_to_string(&draw.numbers),
            draw.jackpot_pence,
            draw.lucky_dip_prize_pence,
            draw.random_data,
            draw.signature,
            draw.is_test,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_draw_by_id(conn: &Connection, draw_id: i64) -> Result<Option<DrawRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM draws WHERE id = ?1", DRAW_COLUMNS))?;
    stmt.query_row([draw_id], draw_from_row).optional()
}

pub fn get_draw_by_date(conn: &Connection, date: &str) -> Result<Option<DrawRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM draws WHERE draw_date = ?1 AND is_test = 0",
        DRAW_COLUMNS
    ))?;
    stmt.query_row([date], draw_from_row).optional()
}

pub fn get_latest_draws(conn: &Connection, limit: i64) -> Result<Vec<DrawRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM draws WHERE is_test = 0 ORDER BY draw_date DESC LIMIT ?1",
        DRAW_COLUMNS
    ))?;
    let draw_iter = stmt.query_map([limit], draw_from_row)?;

    let mut draws = Vec::new();
    for draw in draw_iter {
        draws.push(draw?);
    }
    Ok(draws)
}

pub fn count_draws(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM draws", [], |row| row.get(0))
}

// Entries

const ENTRY_COLUMNS: &str =
    "id, user_id, numbers, line_number, is_active, subscription_id, payment_ref, draw_date";

fn entry_from_row(row: &Row) -> Result<EntryRow> {
    Ok(EntryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        numbers: numbers_column(row, 2)?,
        line_number: row.get(3)?,
        is_active: row.get(4)?,
        subscription_id: row.get(5)?,
        payment_ref: row.get(6)?,
        draw_date: row.get(7)?,
    })
}

fn collect_entries(conn: &Connection, sql: &str, param: &str) -> Result<Vec<EntryRow>> {
    let mut stmt = conn.prepare(sql)?;
    let entry_iter = stmt.query_map([param], entry_from_row)?;

    let mut entries = Vec::new();
    for entry in entry_iter {
        entries.push(entry?);
    }
    Ok(entries)
}

/// Inserts an entry. Returns `None` when an identical subscription line or
/// payment reference is already stored.
pub fn insert_entry(conn: &Connection, entry: &NewEntry) -> Result<Option<i64>> {
    conn.execute(
        "INSERT OR IGNORE INTO entries (
            user_id, numbers, line_number, subscription_id, payment_ref, draw_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.user_id,
            numbers_to_string(&entry.numbers),
            entry.line_number,
            entry.subscription_id,
            entry.payment_ref,
            entry.draw_date,
        ],
    )?;

    if conn.changes() > 0 {
        Ok(Some(conn.last_insert_rowid()))
    } else {
        Ok(None)
    }
}

pub fn get_active_entries_for_date(conn: &Connection, date: &str) -> Result<Vec<EntryRow>> {
    collect_entries(
        conn,
        &format!(
            "SELECT {} FROM entries WHERE draw_date = ?1 AND is_active = 1 ORDER BY id",
            ENTRY_COLUMNS
        ),
        date,
    )
}

pub fn get_entries_for_user(conn: &Connection, user_id: &str) -> Result<Vec<EntryRow>> {
    collect_entries(
        conn,
        &format!(
            "SELECT {} FROM entries WHERE user_id = ?1 ORDER BY draw_date DESC, line_number",
            ENTRY_COLUMNS
        ),
        user_id,
    )
}

pub fn get_entries_for_subscription(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Vec<EntryRow>> {
    collect_entries(
        conn,
        &format!(
            "SELECT {} FROM entries WHERE subscription_id = ?1 ORDER BY draw_date, line_number",
            ENTRY_COLUMNS
        ),
        subscription_id,
    )
}

pub fn get_entry_by_payment_ref(conn: &Connection, payment_ref: &str) -> Result<Option<EntryRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM entries WHERE payment_ref = ?1",
        ENTRY_COLUMNS
    ))?;
    stmt.query_row([payment_ref], entry_from_row).optional()
}

pub fn deactivate_entry(conn: &Connection, entry_id: i64) -> Result<()> {
    conn.execute("UPDATE entries SET is_active = 0 WHERE id = ?1", [entry_id])?;
    Ok(())
}

/// Deactivates a subscription's entries for dates that have no live draw yet.
pub fn deactivate_undrawn_subscription_entries(
    conn: &Connection,
    subscription_id: &str,
) -> Result<usize> {
    conn.execute(
        "UPDATE entries SET is_active = 0
         WHERE subscription_id = ?1
           AND is_active = 1
           AND draw_date NOT IN (SELECT draw_date FROM draws WHERE is_test = 0)",
        [subscription_id],
    )
}

// Results

fn result_from_row(row: &Row) -> Result<ResultRow> {
    Ok(ResultRow {
        id: row.get(0)?,
        draw_id: row.get(1)?,
        user_id: row.get(2)?,
        entry_id: row.get(3)?,
        matches: row.get(4)?,
        prize_pence: row.get(5)?,
        is_winner: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Records a winner. Re-recording the same entry for a draw returns the existing row id.
pub fn insert_result(conn: &Connection, draw_id: i64, winner: &Winner) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO results (
            draw_id, user_id, entry_id, matches, prize_pence, is_winner
        ) VALUES (?1, ?2, ?3, ?4, ?5, 1)",
        params![
            draw_id,
            winner.user_id,
            winner.entry_id,
            winner.kind.matches(),
            winner.prize_pence,
        ],
    )?;

    if conn.changes() > 0 {
        return Ok(conn.last_insert_rowid());
    }

    let mut stmt = conn.prepare("SELECT id FROM results WHERE draw_id = ?1 AND entry_id = ?2")?;
    stmt.query_row([draw_id, winner.entry_id], |row| row.get::<_, i64>(0))
}

pub fn get_results_for_draw(conn: &Connection, draw_id: i64) -> Result<Vec<ResultRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, draw_id, user_id, entry_id, matches, prize_pence, is_winner, created_at
         FROM results WHERE draw_id = ?1 ORDER BY matches DESC, id",
    )?;
    let result_iter = stmt.query_map([draw_id], result_from_row)?;

    let mut results = Vec::new();
    for result in result_iter {
        results.push(result?);
    }
    Ok(results)
}

// Settings

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<SettingRow>> {
    let mut stmt =
        conn.prepare("SELECT key, value, version, updated_at FROM settings WHERE key = ?1")?;
    stmt.query_row([key], |row| {
        Ok(SettingRow {
            key: row.get(0)?,
            value: row.get(1)?,
            version: row.get(2)?,
            updated_at: row.get(3)?,
        })
    })
    .optional()
}

/// Writes a setting and returns its new version.
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT (key) DO UPDATE SET
            value = excluded.value,
            version = settings.version + 1,
            updated_at = CURRENT_TIMESTAMP",
        [key, value],
    )?;
    conn.query_row("SELECT version FROM settings WHERE key = ?1", [key], |row| {
        row.get(0)
    })
}

// Subscriptions

fn lines_to_string(lines: &[Numbers]) -> String {
    lines
        .iter()
        .map(numbers_to_string)
        .collect::<Vec<_>>()
        .join(";")
}

fn subscription_from_row(row: &Row) -> Result<SubscriptionRow> {
    let raw: String = row.get(4)?;
    let lines = raw
        .split(';')
        .filter(|l| !l.is_empty())
        .map(|l| numbers_from_string(l).ok_or_else(|| bad_column(4, "lines", &raw)))
        .collect::<Result<Vec<_>>>()?;

    Ok(SubscriptionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        external_id: row.get(2)?,
        customer_id: row.get(3)?,
        lines,
        status: row.get(5)?,
        created_at: row.get(6)?,
        canceled_at: row.get(7)?,
    })
}

/// Records a subscription. Returns the row id and whether it was newly created.
pub fn insert_subscription(
    conn: &Connection,
    user_id: &str,
    external_id: &str,
    customer_id: &str,
    lines: &[Numbers],
) -> Result<(i64, bool)> {
    conn.execute(
        "INSERT OR IGNORE INTO subscriptions (user_id, external_id, customer_id, lines)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, external_id, customer_id, lines_to_string(lines)],
    )?;

    if conn.changes() > 0 {
        return Ok((conn.last_insert_rowid(), true));
    }

    let id = conn.query_row(
        "SELECT id FROM subscriptions WHERE external_id = ?1",
        [external_id],
        |row| row.get(0),
    )?;
    Ok((id, false))
}

pub fn get_subscription_by_external_id(
    conn: &Connection,
    external_id: &str,
) -> Result<Option<SubscriptionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, external_id, customer_id, lines, status, created_at, canceled_at
         FROM subscriptions WHERE external_id = ?1",
    )?;
    stmt.query_row([external_id], subscription_from_row).optional()
}

/// Mirrors the processor's status locally. Non-active statuses stamp `canceled_at` once.
pub fn update_subscription_status(conn: &Connection, external_id: &str, status: &str) -> Result<usize> {
    conn.execute(
        "UPDATE subscriptions SET
            status = ?2,
            canceled_at = CASE
                WHEN ?2 = 'active' THEN NULL
                ELSE COALESCE(canceled_at, CURRENT_TIMESTAMP)
            END
         WHERE external_id = ?1",
        [external_id, status],
    )
}
