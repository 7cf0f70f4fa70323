// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::records::MemoryRecord;

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    Ok(MemoryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        key: row.get(2)?,
        content: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Insert or replace the note stored under `(user_id, key)`.
pub fn upsert(conn: &Connection, record: &MemoryRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO memory (id, user_id, key, content, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(user_id, key) DO UPDATE SET
            content = ?4,
            updated_at = ?5
        "#,
        params![
            &record.id,
            &record.user_id,
            &record.key,
            &record.content,
            record.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, user_id: &str, key: &str) -> Result<Option<MemoryRecord>> {
    let record = conn
        .query_row(
            "SELECT id, user_id, key, content, updated_at FROM memory \
             WHERE user_id = ?1 AND key = ?2",
            params![user_id, key],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

/// Substring search over a user's episodic notes, most recently updated
/// first.
pub fn search(
    conn: &Connection,
    user_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<MemoryRecord>> {
    let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
    let mut stmt = conn.prepare(
        "SELECT id, user_id, key, content, updated_at FROM memory \
         WHERE user_id = ?1 AND (content LIKE ?2 ESCAPE '\\' OR key LIKE ?2 ESCAPE '\\') \
         ORDER BY updated_at DESC LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![user_id, pattern, limit as i64], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
