//! SQLite interrupt repository

use super::{
    decode_timestamp, encode_timestamp, ensure_processed_state, placeholders, InterruptRepository,
};
use crate::db::Database;
use crate::error::{InterruptError, Result};
use crate::models::{Interrupt, InterruptState, InterruptType};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;

const INTERRUPT_COLUMNS: &str = "id, plan_execution_id, interrupt_type, state, forceful, config, \
                                 target_node_execution_id, created_at, last_updated_at";

const ACTIVE_STATES: &str = "('REGISTERED', 'PROCESSING')";

/// Interrupts stored in the `interrupts` table
#[derive(Clone, Debug)]
pub struct SqliteInterruptRepository {
    db: Arc<Database>,
}

impl SqliteInterruptRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn interrupt_from_row(row: &SqliteRow) -> Result<Interrupt> {
    let interrupt_type: String = row.try_get("interrupt_type")?;
    let state: String = row.try_get("state")?;
    let config: String = row.try_get("config")?;
    let created_at: String = row.try_get("created_at")?;
    let last_updated_at: String = row.try_get("last_updated_at")?;

    Ok(Interrupt {
        id: row.try_get("id")?,
        plan_execution_id: row.try_get("plan_execution_id")?,
        interrupt_type: interrupt_type.parse::<InterruptType>()?,
        state: state.parse::<InterruptState>().map_err(InterruptError::Other)?,
        forceful: row.try_get("forceful")?,
        config: serde_json::from_str(&config)?,
        target_node_execution_id: row.try_get("target_node_execution_id")?,
        created_at: decode_timestamp("created_at", &created_at)?,
        last_updated_at: decode_timestamp("last_updated_at", &last_updated_at)?,
    })
}

#[async_trait]
impl InterruptRepository for SqliteInterruptRepository {
    async fn save(&self, interrupt: &Interrupt) -> Result<Interrupt> {
        let config = serde_json::to_string(&interrupt.config)?;

        sqlx::query(
            "INSERT INTO interrupts (id, plan_execution_id, interrupt_type, state, forceful, config,
                                     target_node_execution_id, created_at, last_updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&interrupt.id)
        .bind(&interrupt.plan_execution_id)
        .bind(interrupt.interrupt_type.as_str())
        .bind(interrupt.state.as_str())
        .bind(interrupt.forceful)
        .bind(config)
        .bind(&interrupt.target_node_execution_id)
        .bind(encode_timestamp(&interrupt.created_at))
        .bind(encode_timestamp(&interrupt.last_updated_at))
        .execute(self.db.pool())
        .await?;

        Ok(interrupt.clone())
    }

    async fn get(&self, interrupt_id: &str) -> Result<Interrupt> {
        let sql = format!("SELECT {} FROM interrupts WHERE id = ?", INTERRUPT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(interrupt_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| InterruptError::InterruptNotFound(interrupt_id.to_string()))?;

        interrupt_from_row(&row)
    }

    async fn find_active(
        &self,
        plan_execution_id: &str,
        interrupt_type: Option<InterruptType>,
    ) -> Result<Vec<Interrupt>> {
        let type_clause = if interrupt_type.is_some() {
            " AND interrupt_type = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM interrupts
             WHERE plan_execution_id = ? AND state IN {}{}
             ORDER BY created_at ASC, id ASC",
            INTERRUPT_COLUMNS, ACTIVE_STATES, type_clause
        );

        let mut query = sqlx::query(&sql).bind(plan_execution_id);
        if let Some(ty) = interrupt_type {
            query = query.bind(ty.as_str());
        }

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter().map(interrupt_from_row).collect()
    }

    async fn list_active(&self, interrupt_types: &[InterruptType]) -> Result<Vec<Interrupt>> {
        if interrupt_types.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM interrupts
             WHERE state IN {} AND interrupt_type IN ({})
             ORDER BY created_at ASC, id ASC",
            INTERRUPT_COLUMNS,
            ACTIVE_STATES,
            placeholders(interrupt_types.len())
        );

        let mut query = sqlx::query(&sql);
        for ty in interrupt_types {
            query = query.bind(ty.as_str());
        }

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter().map(interrupt_from_row).collect()
    }

    async fn mark_processed(
        &self,
        interrupt_id: &str,
        state: InterruptState,
        forceful: bool,
    ) -> Result<Interrupt> {
        ensure_processed_state(interrupt_id, state)?;

        let sql = format!(
            "UPDATE interrupts SET state = ?, forceful = ?, last_updated_at = ?
             WHERE id = ? AND state IN {}",
            ACTIVE_STATES
        );
        sqlx::query(&sql)
            .bind(state.as_str())
            .bind(forceful)
            .bind(encode_timestamp(&Utc::now()))
            .bind(interrupt_id)
            .execute(self.db.pool())
            .await?;

        self.get(interrupt_id).await
    }

    async fn close_all_active(&self, plan_execution_id: &str) -> Result<u64> {
        let sql = format!(
            "UPDATE interrupts SET state = 'PROCESSED_SUCCESSFULLY', last_updated_at = ?
             WHERE plan_execution_id = ? AND state IN {}",
            ACTIVE_STATES
        );
        let result = sqlx::query(&sql)
            .bind(encode_timestamp(&Utc::now()))
            .bind(plan_execution_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
