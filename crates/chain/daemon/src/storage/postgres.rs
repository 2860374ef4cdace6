//! PostgreSQL storage implementation
//!
//! Aggregates are stored whole as JSONB next to the scalar columns used for
//! filtering. Saves are `UPDATE ... WHERE version = $n`, so two writers of
//! the same record cannot both succeed.

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chain_types::{
    ChainDefinition, ChainDefinitionId, ChainExecution, ChainExecutionId, FamilyId,
};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS chain_definitions (
                id UUID PRIMARY KEY,
                family_id UUID NOT NULL,
                trigger_event_type TEXT NOT NULL,
                is_enabled BOOLEAN NOT NULL,
                version BIGINT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS chain_definitions_family ON chain_definitions(family_id, is_enabled);"#,
            r#"
            CREATE TABLE IF NOT EXISTS chain_executions (
                id UUID PRIMARY KEY,
                chain_definition_id UUID NOT NULL,
                family_id UUID NOT NULL,
                status TEXT NOT NULL,
                version BIGINT NOT NULL,
                data JSONB NOT NULL,
                started_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS chain_executions_family ON chain_executions(family_id, chain_definition_id, status);"#,
            r#"CREATE INDEX IF NOT EXISTS chain_executions_status ON chain_executions(status);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, StorageError> {
        serde_json::to_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, StorageError> {
        serde_json::from_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
    }

    fn decode_rows<T: serde::de::DeserializeOwned>(
        rows: Vec<sqlx::postgres::PgRow>,
    ) -> StorageResult<Vec<T>> {
        rows.into_iter()
            .map(|row| {
                let data: Value = row
                    .try_get("data")
                    .map_err(|e| StorageError::Query(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    fn to_version(version: u64) -> StorageResult<i64> {
        i64::try_from(version)
            .map_err(|_| StorageError::InvalidData(format!("version {} out of range", version)))
    }

    /// Distinguish a stale version from a missing row after a zero-row update
    async fn stale_or_missing(&self, table: &str, id: Uuid, version: u64) -> StorageError {
        let query = format!("SELECT version FROM {} WHERE id = $1", table);
        match sqlx::query(&query).bind(id).fetch_optional(&self.pool).await {
            Ok(Some(row)) => {
                let stored: i64 = row.try_get("version").unwrap_or_default();
                StorageError::Conflict(format!(
                    "{} {} is at version {}, not {}",
                    table, id, stored, version
                ))
            }
            Ok(None) => StorageError::NotFound(format!("{} {}", table, id)),
            Err(e) => StorageError::Query(e.to_string()),
        }
    }
}

#[async_trait]
impl DefinitionStorage for PostgresStorage {
    async fn get_definition(
        &self,
        id: &ChainDefinitionId,
    ) -> StorageResult<Option<ChainDefinition>> {
        let row = sqlx::query("SELECT data FROM chain_definitions WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match row {
            Some(record) => {
                let data: Value = record
                    .try_get("data")
                    .map_err(|e| StorageError::Query(e.to_string()))?;
                Ok(Some(Self::from_json(data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_definitions(
        &self,
        family_id: &FamilyId,
        enabled: Option<bool>,
    ) -> StorageResult<Vec<ChainDefinition>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM chain_definitions
            WHERE family_id = $1 AND ($2::BOOLEAN IS NULL OR is_enabled = $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(*family_id.as_uuid())
        .bind(enabled)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Self::decode_rows(rows)
    }

    async fn insert_definition(&self, definition: &mut ChainDefinition) -> StorageResult<()> {
        let mut stored = definition.clone();
        stored.version = 1;
        let data = Self::to_json(&stored)?;

        let done = sqlx::query(
            r#"
            INSERT INTO chain_definitions
                (id, family_id, trigger_event_type, is_enabled, version, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 1, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(*definition.id.as_uuid())
        .bind(*definition.family_id.as_uuid())
        .bind(&definition.trigger_event_type)
        .bind(definition.is_enabled)
        .bind(data)
        .bind(definition.created_at)
        .bind(definition.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if done.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "chain definition {} already exists",
                definition.id
            )));
        }
        definition.version = 1;
        Ok(())
    }

    async fn save_definition(&self, definition: &mut ChainDefinition) -> StorageResult<()> {
        let expected = definition.version;
        let mut next = definition.clone();
        next.version = expected + 1;
        let data = Self::to_json(&next)?;

        let done = sqlx::query(
            r#"
            UPDATE chain_definitions
            SET is_enabled = $3, version = $4, data = $5, updated_at = $6
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(*definition.id.as_uuid())
        .bind(Self::to_version(expected)?)
        .bind(next.is_enabled)
        .bind(Self::to_version(next.version)?)
        .bind(data)
        .bind(next.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if done.rows_affected() == 0 {
            return Err(self
                .stale_or_missing("chain_definitions", *definition.id.as_uuid(), expected)
                .await);
        }
        definition.version = next.version;
        Ok(())
    }

    async fn delete_definition(&self, id: &ChainDefinitionId) -> StorageResult<bool> {
        let done = sqlx::query("DELETE FROM chain_definitions WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl ExecutionStorage for PostgresStorage {
    async fn insert_execution(&self, execution: &mut ChainExecution) -> StorageResult<()> {
        let mut stored = execution.clone();
        stored.version = 1;
        let data = Self::to_json(&stored)?;

        let done = sqlx::query(
            r#"
            INSERT INTO chain_executions
                (id, chain_definition_id, family_id, status, version, data, started_at, updated_at)
            VALUES ($1, $2, $3, $4, 1, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(*execution.id.as_uuid())
        .bind(*execution.chain_definition_id.as_uuid())
        .bind(*execution.family_id.as_uuid())
        .bind(execution.status.as_str())
        .bind(data)
        .bind(execution.started_at)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if done.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "chain execution {} already exists",
                execution.id
            )));
        }
        execution.version = 1;
        Ok(())
    }

    async fn save_execution(&self, execution: &mut ChainExecution) -> StorageResult<()> {
        let expected = execution.version;
        let mut next = execution.clone();
        next.version = expected + 1;
        let data = Self::to_json(&next)?;

        let done = sqlx::query(
            r#"
            UPDATE chain_executions
            SET status = $3, version = $4, data = $5, updated_at = $6
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(*execution.id.as_uuid())
        .bind(Self::to_version(expected)?)
        .bind(next.status.as_str())
        .bind(Self::to_version(next.version)?)
        .bind(data)
        .bind(next.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if done.rows_affected() == 0 {
            return Err(self
                .stale_or_missing("chain_executions", *execution.id.as_uuid(), expected)
                .await);
        }
        execution.version = next.version;
        Ok(())
    }

    async fn get_execution(&self, id: &ChainExecutionId) -> StorageResult<Option<ChainExecution>> {
        let row = sqlx::query("SELECT data FROM chain_executions WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match row {
            Some(record) => {
                let data: Value = record
                    .try_get("data")
                    .map_err(|e| StorageError::Query(e.to_string()))?;
                Ok(Some(Self::from_json(data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> StorageResult<Vec<ChainExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM chain_executions
            WHERE family_id = $1
              AND ($2::UUID IS NULL OR chain_definition_id = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY started_at DESC, id
            "#,
        )
        .bind(*filter.family_id.as_uuid())
        .bind(filter.definition_id.map(|id| *id.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Self::decode_rows(rows)
    }

    async fn list_unfinished_executions(&self) -> StorageResult<Vec<ChainExecution>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM chain_executions
            WHERE status IN ('pending', 'running', 'compensating')
            ORDER BY started_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Self::decode_rows(rows)
    }
}
