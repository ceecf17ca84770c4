//! SQLite node execution adapter

use super::{decode_timestamp, encode_timestamp, placeholders, NodeExecutionService};
use crate::db::Database;
use crate::error::{InterruptError, Result};
use crate::models::{ExecutionMode, InterruptEffect, NodeExecution, Status};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

const NODE_COLUMNS: &str = "id, plan_execution_id, parent_id, status, mode, old_retry, \
                            interrupt_histories, created_at, last_updated_at";

// Must list every terminal status; checked by `test_active_filter_covers_terminal_statuses`.
const SELECT_ACTIVE: &str = "SELECT id, plan_execution_id, parent_id, status, mode, old_retry, \
                             interrupt_histories, created_at, last_updated_at \
                             FROM node_executions \
                             WHERE plan_execution_id = ? AND old_retry = 0 \
                             AND status NOT IN ('SUCCEEDED', 'FAILED', 'ERRORED', 'ABORTED', \
                             'EXPIRED', 'SKIPPED', 'IGNORE_FAILED') \
                             ORDER BY created_at ASC, id ASC";

/// Node executions stored in the `node_executions` table
#[derive(Clone, Debug)]
pub struct SqliteNodeExecutionService {
    db: Arc<Database>,
}

impl SqliteNodeExecutionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a node
    pub async fn upsert(&self, node: &NodeExecution) -> Result<()> {
        let histories = serde_json::to_string(&node.interrupt_histories)?;

        sqlx::query(
            "INSERT INTO node_executions (id, plan_execution_id, parent_id, status, mode, old_retry,
                                          interrupt_histories, created_at, last_updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 parent_id = excluded.parent_id,
                 status = excluded.status,
                 mode = excluded.mode,
                 old_retry = excluded.old_retry,
                 interrupt_histories = excluded.interrupt_histories,
                 last_updated_at = excluded.last_updated_at",
        )
        .bind(&node.id)
        .bind(&node.plan_execution_id)
        .bind(&node.parent_id)
        .bind(node.status.as_str())
        .bind(node.mode.as_str())
        .bind(node.old_retry)
        .bind(histories)
        .bind(encode_timestamp(&node.created_at))
        .bind(encode_timestamp(&node.last_updated_at))
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}

fn node_from_row(row: &SqliteRow) -> Result<NodeExecution> {
    let status: String = row.try_get("status")?;
    let mode: String = row.try_get("mode")?;
    let histories: String = row.try_get("interrupt_histories")?;
    let created_at: String = row.try_get("created_at")?;
    let last_updated_at: String = row.try_get("last_updated_at")?;

    Ok(NodeExecution {
        id: row.try_get("id")?,
        parent_id: row.try_get("parent_id")?,
        plan_execution_id: row.try_get("plan_execution_id")?,
        status: status.parse::<Status>().map_err(InterruptError::Other)?,
        mode: mode.parse::<ExecutionMode>().map_err(InterruptError::Other)?,
        old_retry: row.try_get("old_retry")?,
        interrupt_histories: serde_json::from_str(&histories)?,
        created_at: decode_timestamp("created_at", &created_at)?,
        last_updated_at: decode_timestamp("last_updated_at", &last_updated_at)?,
    })
}

#[async_trait]
impl NodeExecutionService for SqliteNodeExecutionService {
    async fn get(&self, node_execution_id: &str) -> Result<NodeExecution> {
        let sql = format!("SELECT {} FROM node_executions WHERE id = ?", NODE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(node_execution_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| InterruptError::NodeNotFound(node_execution_id.to_string()))?;

        node_from_row(&row)
    }

    async fn find_by_plan_and_status(
        &self,
        plan_execution_id: &str,
        statuses: &[Status],
    ) -> Result<Vec<NodeExecution>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM node_executions
             WHERE plan_execution_id = ? AND status IN ({})
             ORDER BY created_at ASC, id ASC",
            NODE_COLUMNS,
            placeholders(statuses.len())
        );
        let mut query = sqlx::query(&sql).bind(plan_execution_id);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter().map(node_from_row).collect()
    }

    fn stream_active<'a>(
        &'a self,
        plan_execution_id: &'a str,
    ) -> BoxStream<'a, Result<NodeExecution>> {
        sqlx::query(SELECT_ACTIVE)
            .bind(plan_execution_id)
            .fetch(self.db.pool())
            .map(|row: std::result::Result<SqliteRow, sqlx::Error>| -> Result<NodeExecution> {
                node_from_row(&row?)
            })
            .boxed()
    }

    async fn update_status_if(
        &self,
        node_execution_id: &str,
        expected: &[Status],
        status: Status,
        effect: Option<InterruptEffect>,
    ) -> Result<Option<NodeExecution>> {
        if expected.is_empty() {
            return Ok(None);
        }

        let histories_clause = if effect.is_some() {
            ", interrupt_histories = json_insert(interrupt_histories, '$[#]', json(?))"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE node_executions SET status = ?, last_updated_at = ?{}
             WHERE id = ? AND status IN ({})
             RETURNING {}",
            histories_clause,
            placeholders(expected.len()),
            NODE_COLUMNS
        );

        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(encode_timestamp(&Utc::now()));
        if let Some(effect) = &effect {
            query = query.bind(serde_json::to_string(effect)?);
        }
        query = query.bind(node_execution_id);
        for expected_status in expected {
            query = query.bind(expected_status.as_str());
        }

        match query.fetch_optional(self.db.pool()).await? {
            Some(row) => Ok(Some(node_from_row(&row)?)),
            None => {
                // Distinguish a lost race from a missing node
                self.get(node_execution_id).await?;
                Ok(None)
            }
        }
    }
}
