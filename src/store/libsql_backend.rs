//! libSQL backend: a local stand-in for the remote spreadsheet.
//!
//! Each sheet is a header (JSON array) in `sheets` plus one JSON-array row per
//! data row in `sheet_rows`, ordered by `position`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{SheetBackend, Table};

/// libSQL sheet backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Sheet database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn decode_cells(sheet: &str, json: &str) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(json)
        .map_err(|e| DatabaseError::Serialization(format!("{sheet}: bad row JSON: {e}")))
}

fn encode_cells(cells: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(cells).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

#[async_trait]
impl SheetBackend for LibSqlBackend {
    fn name(&self) -> &str {
        "libsql"
    }

    async fn read_table(&self, sheet: &str) -> Result<Table, DatabaseError> {
        let conn = self.conn();

        let mut rows = conn
            .query("SELECT header FROM sheets WHERE name = ?1", params![sheet])
            .await
            .map_err(|e| DatabaseError::Query(format!("read_table header: {e}")))?;

        let header = match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("read_table header col: {e}")))?;
                decode_cells(sheet, &json)?
            }
            Ok(None) => return Ok(Table::default()),
            Err(e) => return Err(DatabaseError::Query(format!("read_table header row: {e}"))),
        };

        let mut rows = conn
            .query(
                "SELECT cells FROM sheet_rows WHERE sheet = ?1 ORDER BY position ASC",
                params![sheet],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("read_table rows: {e}")))?;

        let mut data = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("read_table row: {e}")))?
        {
            let json: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("read_table cells col: {e}")))?;
            data.push(decode_cells(sheet, &json)?);
        }

        let mut table = Table { header, rows: data };
        table.normalize();
        debug!(sheet, rows = table.len(), "Sheet read");
        Ok(table)
    }

    async fn write_table(&self, sheet: &str, table: &Table) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("write_table begin: {e}")))?;

        tx.execute(
            "INSERT INTO sheets (name, header, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(name) DO UPDATE SET header = excluded.header, updated_at = excluded.updated_at",
            params![sheet, encode_cells(&table.header)?],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("write_table header: {e}")))?;

        tx.execute("DELETE FROM sheet_rows WHERE sheet = ?1", params![sheet])
            .await
            .map_err(|e| DatabaseError::Query(format!("write_table clear: {e}")))?;

        for (position, cells) in table.rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO sheet_rows (sheet, position, cells) VALUES (?1, ?2, ?3)",
                params![sheet, position as i64, encode_cells(cells)?],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("write_table row {position}: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("write_table commit: {e}")))?;
        debug!(sheet, rows = table.len(), "Sheet written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn table(rows: &[&[&str]]) -> Table {
        Table::from_values(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[tokio::test]
    async fn missing_sheet_reads_uninitialized() {
        let db = test_db().await;
        let t = db.read_table("notes").await.unwrap();
        assert!(t.is_uninitialized());
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn write_then_read_preserves_order_and_text() {
        let db = test_db().await;
        let t = table(&[
            &["날짜", "내용"],
            &["2026-01-04", "첫 번째\n줄바꿈 \"따옴표\""],
            &["2026-01-05", "두 번째"],
        ]);
        db.write_table("notes", &t).await.unwrap();

        let back = db.read_table("notes").await.unwrap();
        assert_eq!(back, t);
    }

    #[tokio::test]
    async fn rewrite_replaces_all_rows() {
        let db = test_db().await;
        db.write_table("chats", &table(&[&["a"], &["1"], &["2"], &["3"]]))
            .await
            .unwrap();
        db.write_table("chats", &table(&[&["a", "b"], &["9", "8"]]))
            .await
            .unwrap();

        let back = db.read_table("chats").await.unwrap();
        assert_eq!(back.header, vec!["a", "b"]);
        assert_eq!(back.rows, vec![vec!["9".to_string(), "8".to_string()]]);
    }

    #[tokio::test]
    async fn sheets_are_isolated() {
        let db = test_db().await;
        db.write_table("config", &table(&[&["메뉴명"], &["A"]]))
            .await
            .unwrap();
        db.write_table("notes", &table(&[&["내용"], &["x"], &["y"]]))
            .await
            .unwrap();

        assert_eq!(db.read_table("config").await.unwrap().len(), 1);
        assert_eq!(db.read_table("notes").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("worklog.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.write_table("notes", &table(&[&["내용"], &["kept"]]))
                .await
                .unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let back = db.read_table("notes").await.unwrap();
        assert_eq!(back.cell(0, "내용"), "kept");
    }
}
