// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::records::{BlackboardRecord, BlackboardStatus};

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlackboardRecord> {
    let status_str: String = row.get(8)?;
    Ok(BlackboardRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        problem_id: row.get(2)?,
        problem_text: row.get(3)?,
        agent_id: row.get(4)?,
        agent_role: row.get(5)?,
        proposal: row.get(6)?,
        confidence: row.get(7)?,
        status: BlackboardStatus::parse(&status_str).unwrap_or(BlackboardStatus::Open),
        synthesis: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const SELECT_COLUMNS: &str = "id, user_id, problem_id, problem_text, agent_id, agent_role, \
                              proposal, confidence, status, synthesis, created_at";

pub fn insert(conn: &Connection, entry: &BlackboardRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO blackboard (id, user_id, problem_id, problem_text, agent_id, agent_role,
                                proposal, confidence, status, synthesis, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            &entry.id,
            &entry.user_id,
            &entry.problem_id,
            &entry.problem_text,
            &entry.agent_id,
            &entry.agent_role,
            &entry.proposal,
            entry.confidence,
            entry.status.as_str(),
            &entry.synthesis,
            entry.created_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<BlackboardRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM blackboard WHERE id = ?1"),
            [id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

/// Proposals for a problem (the root row excluded), best confidence first.
pub fn proposals_for(conn: &Connection, problem_id: &str) -> Result<Vec<BlackboardRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM blackboard \
         WHERE problem_id = ?1 AND id != problem_id \
         ORDER BY confidence DESC"
    ))?;
    let rows = stmt
        .query_map([problem_id], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn proposal_count(conn: &Connection, problem_id: &str) -> Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM blackboard WHERE problem_id = ?1 AND id != problem_id",
        [problem_id],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Mark the root problem resolved and store the synthesis.  Proposal rows
/// are untouched and remain queryable.
pub fn resolve(conn: &Connection, problem_id: &str, synthesis: &str) -> Result<bool> {
    let n = conn.execute(
        "UPDATE blackboard SET status = 'resolved', synthesis = ?2 \
         WHERE id = ?1 AND id = problem_id",
        params![problem_id, synthesis],
    )?;
    Ok(n > 0)
}

/// Open problem roots for a user, oldest first.
pub fn open_problems(conn: &Connection, user_id: &str) -> Result<Vec<BlackboardRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM blackboard \
         WHERE user_id = ?1 AND status = 'open' AND id = problem_id \
               AND problem_text IS NOT NULL \
         ORDER BY created_at ASC"
    ))?;
    let rows = stmt
        .query_map([user_id], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Hard-delete resolved problems older than the cutoff, cascading to their
/// proposals.  Returns the number of problem roots removed.
pub fn delete_resolved_before(conn: &Connection, cutoff: i64) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id FROM blackboard \
         WHERE status = 'resolved' AND id = problem_id AND created_at < ?1",
    )?;
    let expired: Vec<String> = stmt
        .query_map(params![cutoff], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for problem_id in &expired {
        conn.execute(
            "DELETE FROM blackboard WHERE problem_id = ?1",
            [problem_id],
        )?;
    }
    Ok(expired.len())
}
