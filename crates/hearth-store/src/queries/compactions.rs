// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::records::CompactionRecord;

pub fn insert(conn: &Connection, record: &CompactionRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO compactions (id, user_id, summary, replaced_before, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            &record.id,
            &record.user_id,
            &record.summary,
            record.replaced_before,
            record.created_at,
        ],
    )?;
    Ok(())
}

/// The most recent compaction summary for a user, if any.  Only the latest
/// is ever consulted when seeding a conversation.
pub fn latest(conn: &Connection, user_id: &str) -> Result<Option<CompactionRecord>> {
    let record = conn
        .query_row(
            r#"
            SELECT id, user_id, summary, replaced_before, created_at
            FROM compactions
            WHERE user_id = ?1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            [user_id],
            |row| {
                Ok(CompactionRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    summary: row.get(2)?,
                    replaced_before: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}
