// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::records::{AgentRecord, AgentStatus};

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRecord> {
    let tools_json: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    Ok(AgentRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        system_prompt: row.get(3)?,
        tools_granted: serde_json::from_str(&tools_json).unwrap_or_default(),
        tier_preference: row.get(5)?,
        status: AgentStatus::parse(&status_str).unwrap_or(AgentStatus::SoftDeleted),
        performance_score: row.get(7)?,
        total_tasks: row.get(8)?,
        successful_tasks: row.get(9)?,
        template_id: row.get(10)?,
        created_at: row.get(11)?,
        last_active_at: row.get(12)?,
        deleted_at: row.get(13)?,
    })
}

const SELECT_COLUMNS: &str = "id, user_id, role, system_prompt, tools_granted, tier_preference, \
                              status, performance_score, total_tasks, successful_tasks, \
                              template_id, created_at, last_active_at, deleted_at";

pub fn insert(conn: &Connection, agent: &AgentRecord) -> Result<()> {
    let tools_json = serde_json::to_string(&agent.tools_granted)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    conn.execute(
        r#"
        INSERT INTO agents (id, user_id, role, system_prompt, tools_granted, tier_preference,
                            status, performance_score, total_tasks, successful_tasks,
                            template_id, created_at, last_active_at, deleted_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            &agent.id,
            &agent.user_id,
            &agent.role,
            &agent.system_prompt,
            &tools_json,
            &agent.tier_preference,
            agent.status.as_str(),
            agent.performance_score,
            agent.total_tasks,
            agent.successful_tasks,
            &agent.template_id,
            agent.created_at,
            agent.last_active_at,
            agent.deleted_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<AgentRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM agents WHERE id = ?1"),
            [id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

/// A user's agents in any of the given statuses, most recently active first.
pub fn list_by_status(
    conn: &Connection,
    user_id: &str,
    statuses: &[AgentStatus],
) -> Result<Vec<AgentRecord>> {
    let placeholders = statuses
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM agents \
         WHERE user_id = ?1 AND status IN ({placeholders}) \
         ORDER BY last_active_at DESC"
    );
    let mut stmt = conn.prepare(&query)?;
    let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];
    for s in statuses {
        sql_params.push(Box::new(s.as_str().to_string()));
    }
    let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_active(conn: &Connection, user_id: &str) -> Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM agents WHERE user_id = ?1 AND status = 'active'",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Transition an agent's status, setting or clearing the tombstone.
pub fn set_status(
    conn: &Connection,
    id: &str,
    status: AgentStatus,
    deleted_at: Option<i64>,
) -> Result<bool> {
    let n = conn.execute(
        "UPDATE agents SET status = ?2, deleted_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), deleted_at],
    )?;
    Ok(n > 0)
}

/// Fold one task outcome into the agent's running performance accounting.
/// The score is recomputed in SQL from the pre-update counters so the
/// read-modify-write stays atomic under the store's write lock.
pub fn record_task_result(conn: &Connection, id: &str, success: bool, now: i64) -> Result<bool> {
    let delta: i64 = if success { 1 } else { 0 };
    let n = conn.execute(
        r#"
        UPDATE agents SET
            total_tasks = total_tasks + 1,
            successful_tasks = successful_tasks + ?2,
            performance_score = CAST(successful_tasks + ?2 AS REAL) / (total_tasks + 1),
            last_active_at = ?3
        WHERE id = ?1
        "#,
        params![id, delta, now],
    )?;
    Ok(n > 0)
}

pub fn touch_last_active(conn: &Connection, id: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE agents SET last_active_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    Ok(())
}

/// Hard-delete tombstoned agents whose `deleted_at` fell before the cutoff.
/// Returns the number removed.
pub fn delete_expired(conn: &Connection, cutoff: i64) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM agents WHERE status = 'soft_deleted' AND deleted_at < ?1",
        params![cutoff],
    )?;
    Ok(n)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM agents WHERE id = ?1", [id])?;
    Ok(n > 0)
}
