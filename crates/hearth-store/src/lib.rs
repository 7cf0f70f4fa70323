// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod error;
mod queries;
mod records;
mod schema;
mod store;

pub use error::{Result, StoreError};
pub use records::{
    subagent_user_id, AgentRecord, AgentStatus, BlackboardRecord, BlackboardStatus,
    CompactionRecord, MemoryRecord, MessageRecord, MetricRecord, TaskRecord, TaskStatus,
    TemplateRecord,
};
pub use store::Store;
