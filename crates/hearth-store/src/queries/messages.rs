// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::records::MessageRecord;

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert(conn: &Connection, msg: &MessageRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO messages (id, user_id, role, content, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            &msg.id,
            &msg.user_id,
            &msg.role,
            &msg.content,
            msg.created_at
        ],
    )?;
    Ok(())
}

/// The `limit` most recent messages for a user, returned oldest first so
/// callers can hand them straight to a provider.
///
/// Ties on `created_at` are broken by insertion order (rowid), which keeps
/// the per-user ordering stable when messages land in the same millisecond.
pub fn list_recent(conn: &Connection, user_id: &str, limit: usize) -> Result<Vec<MessageRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, user_id, role, content, created_at
        FROM (
            SELECT id, user_id, role, content, created_at, rowid
            FROM messages
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
        )
        ORDER BY created_at ASC, rowid ASC
        "#,
    )?;
    let rows = stmt
        .query_map(params![user_id, limit as i64], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count(conn: &Connection, user_id: &str) -> Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Delete all of a user's messages with `created_at` strictly before the
/// cutoff.  Returns the number deleted.
pub fn delete_before(conn: &Connection, user_id: &str, cutoff: i64) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM messages WHERE user_id = ?1 AND created_at < ?2",
        params![user_id, cutoff],
    )?;
    Ok(n)
}

/// Delete every message stored under `user_id` (used when killing a
/// sub-agent, whose conversation lives under its synthetic user id).
pub fn delete_for_user(conn: &Connection, user_id: &str) -> Result<usize> {
    let n = conn.execute("DELETE FROM messages WHERE user_id = ?1", [user_id])?;
    Ok(n)
}
