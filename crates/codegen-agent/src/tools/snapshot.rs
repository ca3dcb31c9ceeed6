use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

use super::database::{
    ColumnInfo, ConnectionInfo, QueryResult, SchemaCatalog, TableInfo, TableSchema,
    DEFAULT_SCHEMA,
};
use crate::errors::{AgentError, AgentResult};

lazy_static! {
    static ref SELECT_ALL: Regex = Regex::new(
        r"(?i)^\s*select\s+\*\s+from\s+([a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)?)(?:\s+limit\s+(\d+))?\s*;?\s*$"
    )
    .unwrap();
    static ref SELECT_COUNT: Regex = Regex::new(
        r"(?i)^\s*select\s+count\(\s*\*\s*\)\s+from\s+([a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)?)\s*;?\s*$"
    )
    .unwrap();
}

/// Connection details recorded alongside a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConnection {
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for SnapshotConnection {
    fn default() -> Self {
        Self {
            database: String::new(),
            host: default_host(),
            port: default_port(),
            user: String::new(),
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub max_length: Option<i64>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTable {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub columns: Vec<SnapshotColumn>,
    /// Sample rows, used to answer simple queries
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
    /// Total row count when the snapshot only holds a sample
    #[serde(default)]
    pub row_count: Option<i64>,
    #[serde(default)]
    pub size: Option<String>,
}

impl SnapshotTable {
    fn row_count(&self) -> i64 {
        self.row_count.unwrap_or(self.rows.len() as i64)
    }

    fn to_schema(&self) -> TableSchema {
        let columns: Vec<ColumnInfo> = self
            .columns
            .iter()
            .map(|column| ColumnInfo {
                name: column.name.clone(),
                data_type: column.data_type.clone(),
                max_length: column.max_length,
                nullable: column.nullable,
                default: column.default.clone(),
                is_primary_key: column.primary_key,
                comment: column.comment.clone(),
            })
            .collect();
        let primary_keys = columns
            .iter()
            .filter(|column| column.is_primary_key)
            .map(|column| column.name.clone())
            .collect();

        TableSchema {
            table_name: self.name.clone(),
            schema: self.schema.clone(),
            columns,
            primary_keys,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub connection: SnapshotConnection,
    pub tables: Vec<SnapshotTable>,
}

/// A `SchemaCatalog` answering from a schema snapshot stored as JSON.
///
/// Only `SELECT * FROM t [LIMIT n]` and `SELECT COUNT(*) FROM t` can be
/// answered, from the sample rows kept in the snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotCatalog {
    snapshot: Snapshot,
}

impl SnapshotCatalog {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(json).context("Failed to parse schema snapshot")?;
        Ok(Self::new(snapshot))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema snapshot {}", path.display()))?;
        let catalog = Self::from_json_str(&json)?;
        tracing::info!(
            path = %path.display(),
            tables = catalog.snapshot.tables.len(),
            "loaded schema snapshot"
        );
        Ok(catalog)
    }

    fn find(&self, table: &str, schema: &str) -> AgentResult<&SnapshotTable> {
        self.snapshot
            .tables
            .iter()
            .find(|t| t.name == table && t.schema == schema)
            .ok_or_else(|| {
                AgentError::ExecutionError(format!("table {}.{} does not exist", schema, table))
            })
    }

    fn find_qualified(&self, qualified: &str) -> AgentResult<&SnapshotTable> {
        match qualified.split_once('.') {
            Some((schema, table)) => self.find(table, schema),
            None => self.find(qualified, DEFAULT_SCHEMA),
        }
    }
}

#[async_trait]
impl SchemaCatalog for SnapshotCatalog {
    async fn test_connection(&self) -> AgentResult<ConnectionInfo> {
        let connection = &self.snapshot.connection;
        Ok(ConnectionInfo {
            database: connection.database.clone(),
            host: connection.host.clone(),
            port: connection.port,
            user: connection.user.clone(),
            version: connection.version.clone(),
        })
    }

    async fn list_tables(&self, schema: &str, prefix: &str) -> AgentResult<Vec<String>> {
        let mut tables: Vec<String> = self
            .snapshot
            .tables
            .iter()
            .filter(|t| t.schema == schema && t.name.starts_with(prefix))
            .map(|t| t.name.clone())
            .collect();
        tables.sort();
        Ok(tables)
    }

    async fn table_schema(&self, table: &str, schema: &str) -> AgentResult<TableSchema> {
        Ok(self.find(table, schema)?.to_schema())
    }

    async fn execute_query(&self, query: &str) -> AgentResult<QueryResult> {
        if let Some(captures) = SELECT_COUNT.captures(query) {
            let table = self.find_qualified(&captures[1])?;
            let mut row = Map::new();
            row.insert("count".to_string(), json!(table.row_count()));
            return Ok(QueryResult {
                rows: vec![row],
                columns: vec!["count".to_string()],
            });
        }

        if let Some(captures) = SELECT_ALL.captures(query) {
            let table = self.find_qualified(&captures[1])?;
            let limit = match captures.get(2) {
                Some(limit) => limit.as_str().parse::<usize>().map_err(|e| {
                    AgentError::InvalidParameters(format!("invalid LIMIT: {}", e))
                })?,
                None => usize::MAX,
            };
            return Ok(QueryResult {
                rows: table.rows.iter().take(limit).cloned().collect(),
                columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            });
        }

        Err(AgentError::InvalidParameters(
            "the schema snapshot can only answer SELECT * FROM <table> [LIMIT n] and SELECT COUNT(*) FROM <table>"
                .to_string(),
        ))
    }

    async fn table_info(&self, table: &str, schema: &str) -> AgentResult<TableInfo> {
        let found = self.find(table, schema)?;
        let table_schema = found.to_schema();
        Ok(TableInfo {
            table_name: table_schema.table_name,
            schema: table_schema.schema,
            row_count: found.row_count(),
            size: found.size.clone().unwrap_or_else(|| "unknown".to_string()),
            columns: table_schema.columns,
            primary_keys: table_schema.primary_keys,
        })
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_version() -> String {
    "schema snapshot".to_string()
}

fn default_nullable() -> bool {
    true
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn catalog() -> SnapshotCatalog {
        SnapshotCatalog::from_json_str(
            r#"{
                "tables": [
                    {
                        "name": "sys_dept",
                        "columns": [
                            {"name": "dept_id", "type": "bigint", "primary_key": true, "nullable": false},
                            {"name": "dept_name", "type": "character varying", "max_length": 30}
                        ],
                        "rows": [
                            {"dept_id": 100, "dept_name": "HQ"},
                            {"dept_id": 101, "dept_name": "R&D"},
                            {"dept_id": 102, "dept_name": "Sales"}
                        ],
                        "row_count": 250
                    },
                    {
                        "name": "sys_dept",
                        "schema": "archive",
                        "columns": [{"name": "dept_id", "type": "bigint"}]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_defaults() -> anyhow::Result<()> {
        let catalog = catalog();
        let connection = catalog.test_connection().await?;
        assert_eq!(connection.host, "localhost");
        assert_eq!(connection.port, 5432);

        let schema = catalog.table_schema("sys_dept", "public").await?;
        assert!(!schema.columns[0].nullable);
        assert!(schema.columns[1].nullable);
        assert_eq!(schema.columns[1].comment, "");
        assert_eq!(schema.primary_keys, vec!["dept_id"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_tables_respects_schema() -> anyhow::Result<()> {
        let catalog = catalog();
        assert_eq!(catalog.list_tables("public", "").await?, vec!["sys_dept"]);
        assert_eq!(catalog.list_tables("archive", "sys").await?, vec!["sys_dept"]);
        assert!(catalog.list_tables("public", "biz_").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_count_uses_recorded_row_count() -> anyhow::Result<()> {
        let catalog = catalog();
        let result = catalog.execute_query("select count(*) from sys_dept").await?;
        assert_eq!(result.rows[0]["count"], 250);

        let info = catalog.table_info("sys_dept", "public").await?;
        assert_eq!(info.row_count, 250);
        assert_eq!(info.size, "unknown");
        Ok(())
    }

    #[tokio::test]
    async fn test_select_all_with_limit() -> anyhow::Result<()> {
        let catalog = catalog();
        let all = catalog.execute_query("SELECT * FROM public.sys_dept").await?;
        assert_eq!(all.rows.len(), 3);

        let limited = catalog.execute_query("SELECT * FROM sys_dept LIMIT 2").await?;
        assert_eq!(limited.rows.len(), 2);
        assert_eq!(limited.columns, vec!["dept_id", "dept_name"]);

        let archived = catalog.execute_query("SELECT * FROM archive.sys_dept").await?;
        assert!(archived.rows.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_query() {
        let catalog = catalog();
        let result = catalog
            .execute_query("SELECT dept_name FROM sys_dept WHERE dept_id = 100")
            .await;
        assert!(matches!(result, Err(AgentError::InvalidParameters(_))));
    }

    #[test]
    fn test_from_file() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            r#"{{"connection": {{"database": "lifehub"}}, "tables": []}}"#
        )?;

        let catalog = SnapshotCatalog::from_file(file.path())?;
        let connection = tokio_test::block_on(catalog.test_connection())?;
        assert_eq!(connection.database, "lifehub");
        Ok(())
    }

    #[test]
    fn test_from_file_missing() {
        let result = SnapshotCatalog::from_file("/nonexistent/snapshot.json");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read schema snapshot"));
    }
}
