use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio_postgres::{Client, NoTls};

use super::database::{
    ColumnInfo, ConnectionInfo, QueryResult, SchemaCatalog, TableInfo, TableSchema,
};
use crate::errors::{AgentError, AgentResult};
use crate::providers::configs::redact;

const LIST_TABLES: &str = "
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1
      AND table_type = 'BASE TABLE'
      AND table_name LIKE $2 ESCAPE '\\'
    ORDER BY table_name";

const TABLE_COLUMNS: &str = "
    SELECT c.column_name::text,
           c.data_type::text,
           c.character_maximum_length::int4,
           c.is_nullable::text,
           c.column_default::text,
           COALESCE(d.description, '')
    FROM information_schema.columns c
    LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = c.table_schema
    LEFT JOIN pg_catalog.pg_class k ON k.relname = c.table_name AND k.relnamespace = n.oid
    LEFT JOIN pg_catalog.pg_description d
      ON d.objoid = k.oid AND d.objsubid = c.ordinal_position::int4
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position";

const PRIMARY_KEYS: &str = "
    SELECT a.column_name::text
    FROM information_schema.table_constraints t
    JOIN information_schema.key_column_usage a
      ON t.constraint_name = a.constraint_name
     AND t.table_schema = a.table_schema
     AND t.table_name = a.table_name
    WHERE t.table_schema = $1
      AND t.table_name = $2
      AND t.constraint_type = 'PRIMARY KEY'
    ORDER BY a.ordinal_position";

const TABLE_SIZE: &str = "SELECT pg_size_pretty(pg_total_relation_size($1::text::regclass))";

/// Connection settings for a live PostgreSQL server
#[derive(Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_deref().map(redact))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// A `SchemaCatalog` reading `information_schema` of a live PostgreSQL database.
///
/// Every call opens its own connection. Queries run inside a read-only
/// transaction.
pub struct PostgresCatalog {
    config: PostgresConfig,
}

impl PostgresCatalog {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> AgentResult<Client> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.config.host)
            .port(self.config.port)
            .dbname(&self.config.database)
            .user(&self.config.user)
            .connect_timeout(self.config.connect_timeout);
        if let Some(password) = &self.config.password {
            config.password(password);
        }

        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            AgentError::ExecutionError(format!(
                "could not connect to {}:{}/{}: {}",
                self.config.host, self.config.port, self.config.database, e
            ))
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(client)
    }
}

#[async_trait]
impl SchemaCatalog for PostgresCatalog {
    async fn test_connection(&self) -> AgentResult<ConnectionInfo> {
        let client = self.connect().await?;
        let row = client
            .query_one("SELECT version()", &[])
            .await
            .map_err(query_error)?;

        Ok(ConnectionInfo {
            database: self.config.database.clone(),
            host: self.config.host.clone(),
            port: self.config.port,
            user: self.config.user.clone(),
            version: row.get(0),
        })
    }

    async fn list_tables(&self, schema: &str, prefix: &str) -> AgentResult<Vec<String>> {
        let client = self.connect().await?;
        let pattern = like_prefix(prefix);
        let rows = client
            .query(LIST_TABLES, &[&schema, &pattern])
            .await
            .map_err(query_error)?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn table_schema(&self, table: &str, schema: &str) -> AgentResult<TableSchema> {
        let client = self.connect().await?;
        load_table_schema(&client, table, schema).await
    }

    async fn execute_query(&self, query: &str) -> AgentResult<QueryResult> {
        let mut client = self.connect().await?;
        let transaction = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(query_error)?;

        let statement = query.trim().trim_end_matches(';');
        let prepared = transaction.prepare(statement).await.map_err(query_error)?;
        let columns: Vec<String> = prepared
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let rows = transaction
            .query(json_rows_query(statement).as_str(), &[])
            .await
            .map_err(query_error)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row.get(0);
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => result.push(map),
                Ok(other) => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other);
                    result.push(map);
                }
                Err(e) => {
                    return Err(AgentError::Internal(format!(
                        "row is not valid JSON: {}",
                        e
                    )))
                }
            }
        }

        transaction.rollback().await.map_err(query_error)?;
        Ok(QueryResult {
            rows: result,
            columns,
        })
    }

    async fn table_info(&self, table: &str, schema: &str) -> AgentResult<TableInfo> {
        let client = self.connect().await?;
        let table_schema = load_table_schema(&client, table, schema).await?;

        let qualified = qualified_name(schema, table);
        let count = client
            .query_one(format!("SELECT COUNT(*) FROM {}", qualified).as_str(), &[])
            .await
            .map_err(query_error)?;
        let size = client
            .query_one(TABLE_SIZE, &[&qualified])
            .await
            .map_err(query_error)?;

        Ok(TableInfo {
            table_name: table_schema.table_name,
            schema: table_schema.schema,
            row_count: count.get(0),
            size: size.get(0),
            columns: table_schema.columns,
            primary_keys: table_schema.primary_keys,
        })
    }
}

async fn load_table_schema(client: &Client, table: &str, schema: &str) -> AgentResult<TableSchema> {
    let column_rows = client
        .query(TABLE_COLUMNS, &[&schema, &table])
        .await
        .map_err(query_error)?;
    if column_rows.is_empty() {
        return Err(AgentError::ExecutionError(format!(
            "table {}.{} does not exist",
            schema, table
        )));
    }

    let primary_keys: Vec<String> = client
        .query(PRIMARY_KEYS, &[&schema, &table])
        .await
        .map_err(query_error)?
        .iter()
        .map(|row| row.get(0))
        .collect();

    let columns = column_rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let max_length: Option<i32> = row.get(2);
            let nullable: String = row.get(3);
            ColumnInfo {
                is_primary_key: primary_keys.contains(&name),
                name,
                data_type: row.get(1),
                max_length: max_length.map(i64::from),
                nullable: nullable == "YES",
                default: row.get(4),
                comment: row.get(5),
            }
        })
        .collect();

    Ok(TableSchema {
        table_name: table.to_string(),
        schema: schema.to_string(),
        columns,
        primary_keys,
    })
}

fn query_error(e: tokio_postgres::Error) -> AgentError {
    match e.as_db_error() {
        Some(db) => AgentError::ExecutionError(db.message().to_string()),
        None => AgentError::ExecutionError(e.to_string()),
    }
}

/// LIKE pattern matching names that start with `prefix` literally
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Wrap a SELECT so every row comes back as one JSON object
fn json_rows_query(statement: &str) -> String {
    format!("SELECT row_to_json(q)::text FROM ({}) AS q", statement)
}
