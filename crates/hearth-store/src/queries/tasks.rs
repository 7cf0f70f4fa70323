// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::records::{TaskRecord, TaskStatus};

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status_str: String = row.get(4)?;
    Ok(TaskRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        agent_id: row.get(2)?,
        task_description: row.get(3)?,
        status: TaskStatus::parse(&status_str).unwrap_or(TaskStatus::Failed),
        result: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        delivered_at: row.get(8)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, user_id, agent_id, task_description, status, result, started_at, completed_at, \
     delivered_at";

pub fn insert(conn: &Connection, task: &TaskRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO tasks (id, user_id, agent_id, task_description, status, result,
                           started_at, completed_at, delivered_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            &task.id,
            &task.user_id,
            &task.agent_id,
            &task.task_description,
            task.status.as_str(),
            &task.result,
            task.started_at,
            task.completed_at,
            task.delivered_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<TaskRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM tasks WHERE id = ?1"),
            [id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

/// Record the outcome of a finished run: `completed` with its result text
/// or `failed` with the error string.
pub fn complete(
    conn: &Connection,
    id: &str,
    status: TaskStatus,
    result: &str,
    completed_at: i64,
) -> Result<bool> {
    let n = conn.execute(
        "UPDATE tasks SET status = ?2, result = ?3, completed_at = ?4 WHERE id = ?1",
        params![id, status.as_str(), result, completed_at],
    )?;
    Ok(n > 0)
}

/// Finished tasks not yet surfaced to the user, oldest first.
pub fn list_undelivered(conn: &Connection, user_id: &str) -> Result<Vec<TaskRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM tasks \
         WHERE user_id = ?1 AND status IN ('completed', 'failed') AND delivered_at IS NULL \
         ORDER BY completed_at ASC"
    ))?;
    let rows = stmt
        .query_map([user_id], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Only a finished task can be delivered; a row still `running` is left
/// alone so the invariant completed/failed → delivered holds.
pub fn mark_delivered(conn: &Connection, id: &str, now: i64) -> Result<bool> {
    let n = conn.execute(
        "UPDATE tasks SET status = 'delivered', delivered_at = ?2 \
         WHERE id = ?1 AND status IN ('completed', 'failed')",
        params![id, now],
    )?;
    Ok(n > 0)
}

/// Mark long-`running` rows as failed.  These are tasks whose in-memory
/// future was lost (crash, restart): the row persists as `running` and
/// goes stale.
pub fn mark_stale_failed(conn: &Connection, started_before: i64, now: i64) -> Result<usize> {
    let n = conn.execute(
        "UPDATE tasks SET status = 'failed', result = 'stale: runner no longer tracking task', \
         completed_at = ?2 \
         WHERE status = 'running' AND started_at < ?1",
        params![started_before, now],
    )?;
    Ok(n)
}
