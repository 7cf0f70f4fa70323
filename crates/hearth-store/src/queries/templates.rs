// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::records::TemplateRecord;

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateRecord> {
    let tools_json: String = row.get(4)?;
    let tags_json: String = row.get(8)?;
    Ok(TemplateRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        role_description: row.get(3)?,
        default_tools: serde_json::from_str(&tools_json).unwrap_or_default(),
        default_tier: row.get(5)?,
        times_used: row.get(6)?,
        avg_performance: row.get(7)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const SELECT_COLUMNS: &str = "id, user_id, name, role_description, default_tools, default_tier, \
                              times_used, avg_performance, tags, created_at, updated_at";

pub fn insert(conn: &Connection, template: &TemplateRecord) -> Result<()> {
    let tools_json = serde_json::to_string(&template.default_tools)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let tags_json =
        serde_json::to_string(&template.tags).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    conn.execute(
        r#"
        INSERT INTO templates (id, user_id, name, role_description, default_tools, default_tier,
                               times_used, avg_performance, tags, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            &template.id,
            &template.user_id,
            &template.name,
            &template.role_description,
            &tools_json,
            &template.default_tier,
            template.times_used,
            template.avg_performance,
            &tags_json,
            template.created_at,
            template.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<TemplateRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM templates WHERE id = ?1"),
            [id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<TemplateRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM templates WHERE user_id = ?1 ORDER BY created_at ASC"
    ))?;
    let rows = stmt
        .query_map([user_id], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count(conn: &Connection, user_id: &str) -> Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM templates WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Rewrite the mutable columns of a template (patch-style update composed
/// by the manager).
pub fn update(conn: &Connection, template: &TemplateRecord) -> Result<bool> {
    let tools_json = serde_json::to_string(&template.default_tools)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let tags_json =
        serde_json::to_string(&template.tags).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let n = conn.execute(
        r#"
        UPDATE templates SET
            name = ?2,
            role_description = ?3,
            default_tools = ?4,
            default_tier = ?5,
            tags = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
        params![
            &template.id,
            &template.name,
            &template.role_description,
            &tools_json,
            &template.default_tier,
            &tags_json,
            template.updated_at,
        ],
    )?;
    Ok(n > 0)
}

/// Fold one usage score into the running mean.  The mean is recomputed in
/// SQL from the pre-update counters, mirroring the agent-side accounting.
pub fn record_usage(conn: &Connection, id: &str, score: f64, now: i64) -> Result<bool> {
    let n = conn.execute(
        r#"
        UPDATE templates SET
            avg_performance = (avg_performance * times_used + ?2) / (times_used + 1),
            times_used = times_used + 1,
            updated_at = ?3
        WHERE id = ?1
        "#,
        params![id, score, now],
    )?;
    Ok(n > 0)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM templates WHERE id = ?1", [id])?;
    Ok(n > 0)
}
