// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::Connection;

use crate::error::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 1;

// NOTE: list columns (tools_granted, default_tools, tags) are stored as JSON
// text.  They are opaque to SQL — every documented query pattern filters by
// user_id / status / created_at / problem_id, never by list membership — so
// a join table would buy nothing here.

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            system_prompt TEXT NOT NULL,
            tools_granted TEXT NOT NULL,
            tier_preference TEXT,
            status TEXT NOT NULL,
            performance_score REAL NOT NULL,
            total_tasks INTEGER NOT NULL,
            successful_tasks INTEGER NOT NULL,
            template_id TEXT,
            created_at INTEGER NOT NULL,
            last_active_at INTEGER NOT NULL,
            deleted_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            role_description TEXT NOT NULL,
            default_tools TEXT NOT NULL,
            default_tier TEXT,
            times_used INTEGER NOT NULL,
            avg_performance REAL NOT NULL,
            tags TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            task_description TEXT NOT NULL,
            status TEXT NOT NULL,
            result TEXT,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            delivered_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS compactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            replaced_before INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS blackboard (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            problem_id TEXT NOT NULL,
            problem_text TEXT,
            agent_id TEXT,
            agent_role TEXT,
            proposal TEXT,
            confidence REAL,
            status TEXT NOT NULL,
            synthesis TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS metrics (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            task_type TEXT NOT NULL,
            tier TEXT,
            duration_ms INTEGER NOT NULL,
            iterations INTEGER NOT NULL,
            success INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memory (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            key TEXT NOT NULL,
            content TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (user_id, key)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_user_ts ON messages(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_agents_user_status ON agents(user_id, status);
        CREATE INDEX IF NOT EXISTS idx_templates_user ON templates(user_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_user_status ON tasks(user_id, status);
        CREATE INDEX IF NOT EXISTS idx_compactions_user_ts ON compactions(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_blackboard_problem ON blackboard(problem_id);
        CREATE INDEX IF NOT EXISTS idx_blackboard_user_status ON blackboard(user_id, status);
        CREATE INDEX IF NOT EXISTS idx_metrics_type_tier ON metrics(task_type, tier);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS memory;
        DROP TABLE IF EXISTS metrics;
        DROP TABLE IF EXISTS blackboard;
        DROP TABLE IF EXISTS compactions;
        DROP TABLE IF EXISTS tasks;
        DROP TABLE IF EXISTS templates;
        DROP TABLE IF EXISTS agents;
        DROP TABLE IF EXISTS messages;
        "#,
    )?;
    Ok(())
}
