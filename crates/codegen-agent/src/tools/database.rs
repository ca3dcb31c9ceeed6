//! Database introspection tools
//!
//! The five tools registered here are what the model uses to explore a
//! schema before generating code: list tables, describe a table, test the
//! connection, run a read-only query and fetch table statistics. They talk
//! to any `SchemaCatalog` implementation.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::output::ToolOutput;
use crate::registry::ToolRegistry;

pub const DEFAULT_SCHEMA: &str = "public";

lazy_static! {
    static ref SELECT_STATEMENT: Regex = Regex::new(r"(?is)^\s*select\b[^;]*;?\s*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub database: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub max_length: Option<i64>,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub schema: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_name: String,
    pub schema: String,
    pub row_count: i64,
    pub size: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
}

/// Read access to a database's structure
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn test_connection(&self) -> AgentResult<ConnectionInfo>;

    /// Base tables of `schema` whose name starts with `prefix`, sorted
    async fn list_tables(&self, schema: &str, prefix: &str) -> AgentResult<Vec<String>>;

    async fn table_schema(&self, table: &str, schema: &str) -> AgentResult<TableSchema>;

    /// Run a statement that has already been checked to be a single SELECT
    async fn execute_query(&self, query: &str) -> AgentResult<QueryResult>;

    async fn table_info(&self, table: &str, schema: &str) -> AgentResult<TableInfo>;
}

/// True for a single SELECT statement, optionally terminated by `;`
pub fn is_read_only_query(query: &str) -> bool {
    SELECT_STATEMENT.is_match(query)
}

/// Register the database tools on `registry`, all backed by `catalog`
pub fn register_database_tools(registry: &mut ToolRegistry, catalog: Arc<dyn SchemaCatalog>) {
    let db = Arc::clone(&catalog);
    registry.register_fn(
        "list_tables",
        "List the tables in the database. A prefix can be given to filter table names.",
        json!({
            "type": "object",
            "properties": {
                "prefix": {
                    "type": "string",
                    "description": "Table name prefix, e.g. 'sys_' only returns tables starting with sys_. Defaults to an empty string, which returns every table."
                },
                "schema": {
                    "type": "string",
                    "description": "Database schema to look in, defaults to 'public'."
                }
            }
        }),
        move |args| {
            let db = Arc::clone(&db);
            async move {
                let schema = string_arg(&args, "schema").unwrap_or(DEFAULT_SCHEMA);
                let prefix = string_arg(&args, "prefix").unwrap_or_default();
                let tables = db.list_tables(schema, prefix).await?;
                Ok(success(json!({
                    "count": tables.len(),
                    "tables": tables,
                    "schema": schema,
                    "prefix": prefix,
                })))
            }
        },
    );

    let db = Arc::clone(&catalog);
    registry.register_fn(
        "get_table_schema",
        "Get the complete structure of a table: column names, data types, primary keys and comments.",
        json!({
            "type": "object",
            "properties": {
                "table_name": {
                    "type": "string",
                    "description": "Name of the table to describe, e.g. 'sys_user'"
                }
            },
            "required": ["table_name"]
        }),
        move |args| {
            let db = Arc::clone(&db);
            async move {
                let table = string_arg(&args, "table_name").unwrap_or_default();
                let table_schema = db.table_schema(table, DEFAULT_SCHEMA).await?;
                let mut output = to_map(&table_schema)?;
                output.insert("column_count".to_string(), json!(table_schema.columns.len()));
                Ok(success(Value::Object(output)))
            }
        },
    );

    let db = Arc::clone(&catalog);
    registry.register_fn(
        "test_database_connection",
        "Test whether the database connection works and return the database version.",
        json!({
            "type": "object",
            "properties": {}
        }),
        move |_| {
            let db = Arc::clone(&db);
            async move {
                let info = db.test_connection().await?;
                let mut output = to_map(&info)?;
                output.insert("message".to_string(), json!("Database connection succeeded"));
                Ok(success(Value::Object(output)))
            }
        },
    );

    let db = Arc::clone(&catalog);
    registry.register_fn(
        "execute_query",
        "Execute a SQL query. Only SELECT statements are allowed; the query result is returned.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL SELECT statement"
                }
            },
            "required": ["query"]
        }),
        move |args| {
            let db = Arc::clone(&db);
            async move {
                let query = string_arg(&args, "query").unwrap_or_default();
                if !is_read_only_query(query) {
                    return Err(AgentError::InvalidParameters(
                        "only a single SELECT statement is allowed".to_string(),
                    ));
                }
                let result = db.execute_query(query).await?;
                Ok(success(json!({
                    "row_count": result.rows.len(),
                    "rows": result.rows,
                    "columns": result.columns,
                })))
            }
        },
    );

    let db = catalog;
    registry.register_fn(
        "get_table_info",
        "Get detailed information about a table, including row count, table size and column structure.",
        json!({
            "type": "object",
            "properties": {
                "table_name": {
                    "type": "string",
                    "description": "Table name"
                }
            },
            "required": ["table_name"]
        }),
        move |args| {
            let db = Arc::clone(&db);
            async move {
                let table = string_arg(&args, "table_name").unwrap_or_default();
                let info = db.table_info(table, DEFAULT_SCHEMA).await?;
                Ok(success(Value::Object(to_map(&info)?)))
            }
        },
    );
}

fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn to_map<T: Serialize>(value: &T) -> AgentResult<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::Internal(format!(
            "expected an object, got {}",
            other
        ))),
        Err(e) => Err(AgentError::Internal(e.to_string())),
    }
}

/// Tag a structured tool result as successful
fn success(value: Value) -> ToolOutput {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    map.insert("success".to_string(), json!(true));
    ToolOutput::Structured(map)
}
