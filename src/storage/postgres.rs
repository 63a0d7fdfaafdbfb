// src/storage/postgres.rs - Postgres-backed store (one jsonb table per collection)
use async_trait::async_trait;
use bb8_postgres::PostgresConnectionManager;
use log::debug;
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;

use crate::error::StoreError;
use crate::storage::{FindFilter, RecordStore, UpsertOutcome};

pub type PgPool = bb8::Pool<PostgresConnectionManager<NoTls>>;

const DEFAULT_POOL_SIZE: u32 = 16;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(db_url: &str) -> Result<PostgresStore, StoreError> {
        let manager = PostgresConnectionManager::new_from_stringlike(db_url, NoTls)
            .map_err(|e| StoreError::Backend(format!("invalid connection string: {}", e)))?;
        let pool = bb8::Pool::builder()
            .max_size(DEFAULT_POOL_SIZE)
            .build(manager)
            .await
            .map_err(|e| StoreError::Backend(format!("pool build failed: {}", e)))?;
        Ok(PostgresStore { pool })
    }

    pub fn with_pool(pool: PgPool) -> PostgresStore {
        PostgresStore { pool }
    }

    /// Creates the backing table for a collection if it does not exist.
    pub async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        let table = validated_table(collection)?;
        let conn = self.conn().await?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, doc JSONB NOT NULL)",
            table
        );
        conn.execute(ddl.as_str(), &[])
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn conn(
        &self,
    ) -> Result<bb8::PooledConnection<'_, PostgresConnectionManager<NoTls>>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Backend(format!("connection checkout failed: {}", e)))
    }
}

/// Collection names become table identifiers; only conservative names pass.
fn validated_table(collection: &str) -> Result<String, StoreError> {
    let ok = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !collection.starts_with(|c: char| c.is_ascii_digit());
    if ok {
        Ok(collection.to_string())
    } else {
        Err(StoreError::CollectionNotFound(collection.to_string()))
    }
}

/// Builds the WHERE clause and parameter list for a filter. Equality
/// filters compare the jsonb member's text rendering.
fn build_where(filter: &FindFilter) -> (String, Vec<Box<dyn ToSql + Sync + Send>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();

    for (field, value) in &filter.eq {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        params.push(Box::new(rendered));
        clauses.push(format!("doc->>'{}' = ${}", escape_field(field), params.len()));
    }
    if let Some(after) = &filter.id_after {
        params.push(Box::new(after.clone()));
        clauses.push(format!("id > ${}", params.len()));
    }
    if let Some(ids) = &filter.id_in {
        params.push(Box::new(ids.clone()));
        clauses.push(format!("id = ANY(${})", params.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, params)
}

fn escape_field(field: &str) -> String {
    field.replace('\'', "''")
}

fn as_refs(params: &[Box<dyn ToSql + Sync + Send>]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn find(
        &self,
        collection: &str,
        filter: &FindFilter,
        limit: Option<usize>,
        skip: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let table = validated_table(collection)?;
        let (where_sql, params) = build_where(filter);
        let mut sql = format!("SELECT doc FROM {}{} ORDER BY id", table, where_sql);
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if skip > 0 {
            sql.push_str(&format!(" OFFSET {}", skip));
        }
        debug!("find: {}", sql);

        let conn = self.conn().await?;
        let rows = conn
            .query(sql.as_str(), &as_refs(&params))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|row| row.get::<_, Value>("doc"))
            .collect())
    }

    async fn count(&self, collection: &str, filter: &FindFilter) -> Result<usize, StoreError> {
        let table = validated_table(collection)?;
        let (where_sql, params) = build_where(filter);
        let sql = format!("SELECT COUNT(*) AS n FROM {}{}", table, where_sql);
        let conn = self.conn().await?;
        let row = conn
            .query_one(sql.as_str(), &as_refs(&params))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }

    async fn text_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let table = validated_table(collection)?;
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT doc FROM {} WHERE doc::text LIKE '%' || $1 || '%' ORDER BY id LIMIT {}",
            table, limit
        );
        let conn = self.conn().await?;
        let rows = conn
            .query(sql.as_str(), &[&query])
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|row| row.get::<_, Value>("doc"))
            .collect())
    }

    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let table = validated_table(collection)?;
        let sql = format!(
            "INSERT INTO {} (id, doc) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc
             RETURNING (xmax = 0) AS inserted",
            table
        );
        let conn = self.conn().await?;
        let row = conn
            .query_one(sql.as_str(), &[&key, &document])
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let inserted: bool = row.get("inserted");
        Ok(UpsertOutcome { inserted })
    }

    async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        let table = validated_table(collection)?;
        let conn = self.conn().await?;
        let sql = format!("DELETE FROM {}", table);
        conn.execute(sql.as_str(), &[])
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(validated_table("match_results").is_ok());
        assert!(validated_table("units2").is_ok());
        assert!(validated_table("").is_err());
        assert!(validated_table("drop table; --").is_err());
        assert!(validated_table("1units").is_err());
    }

    #[test]
    fn test_where_clause_numbering() {
        let filter = FindFilter {
            eq: vec![("a".to_string(), Value::String("x".to_string()))],
            id_after: Some("m".to_string()),
            id_in: Some(vec!["p".to_string()]),
        };
        let (sql, params) = build_where(&filter);
        assert!(sql.contains("doc->>'a' = $1"));
        assert!(sql.contains("id > $2"));
        assert!(sql.contains("id = ANY($3)"));
        assert_eq!(params.len(), 3);
    }
}
