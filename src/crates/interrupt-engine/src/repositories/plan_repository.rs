//! SQLite plan execution adapter

use super::{encode_timestamp, PlanExecutionService};
use crate::db::Database;
use crate::error::{InterruptError, Result};
use crate::models::{PlanExecution, Status};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Plan executions stored in the `plan_executions` table
#[derive(Clone, Debug)]
pub struct SqlitePlanExecutionService {
    db: Arc<Database>,
}

impl SqlitePlanExecutionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a plan or overwrite its status
    pub async fn upsert(&self, plan: &PlanExecution) -> Result<()> {
        let now = encode_timestamp(&Utc::now());

        sqlx::query(
            "INSERT INTO plan_executions (id, status, created_at, last_updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 last_updated_at = excluded.last_updated_at",
        )
        .bind(&plan.id)
        .bind(plan.status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PlanExecutionService for SqlitePlanExecutionService {
    async fn get(&self, plan_execution_id: &str) -> Result<PlanExecution> {
        let row = sqlx::query("SELECT id, status FROM plan_executions WHERE id = ?")
            .bind(plan_execution_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| InterruptError::PlanNotFound(plan_execution_id.to_string()))?;

        let status: String = row.try_get("status")?;
        Ok(PlanExecution {
            id: row.try_get("id")?,
            status: status.parse::<Status>().map_err(InterruptError::Other)?,
        })
    }
}
