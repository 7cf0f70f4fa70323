// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::records::MetricRecord;

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetricRecord> {
    let success: i64 = row.get(6)?;
    Ok(MetricRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_type: row.get(2)?,
        tier: row.get(3)?,
        duration_ms: row.get(4)?,
        iterations: row.get(5)?,
        success: success != 0,
        created_at: row.get(7)?,
    })
}

pub fn insert(conn: &Connection, metric: &MetricRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO metrics (id, user_id, task_type, tier, duration_ms, iterations,
                             success, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            &metric.id,
            &metric.user_id,
            &metric.task_type,
            &metric.tier,
            metric.duration_ms,
            metric.iterations,
            metric.success as i64,
            metric.created_at,
        ],
    )?;
    Ok(())
}

/// The most recent metrics for a (task_type, tier) pair, newest first.
/// A `None` tier matches rows with no tier recorded.
pub fn recent(
    conn: &Connection,
    task_type: &str,
    tier: Option<&str>,
    limit: usize,
) -> Result<Vec<MetricRecord>> {
    const COLUMNS: &str =
        "id, user_id, task_type, tier, duration_ms, iterations, success, created_at";
    let rows = match tier {
        Some(t) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM metrics \
                 WHERE task_type = ?1 AND tier = ?2 \
                 ORDER BY created_at DESC LIMIT ?3"
            ))?;
            let result = stmt
                .query_map(params![task_type, t, limit as i64], row_to_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            result
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM metrics \
                 WHERE task_type = ?1 AND tier IS NULL \
                 ORDER BY created_at DESC LIMIT ?2"
            ))?;
            let result = stmt
                .query_map(params![task_type, limit as i64], row_to_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            result
        }
    };
    Ok(rows)
}
