pub mod dataset;
pub mod schema;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

pub use schema::DDL;

pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("failed to open warehouse: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("query failed: {message}")]
    Query { message: String },

    #[error("only read-only statements are allowed")]
    NotReadOnly,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Ordered records with a uniform column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub summary: Row,
    pub by_region: Vec<Row>,
    pub by_year: Vec<Row>,
}

/// Handle to the sales cube. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Warehouse {
    db: Arc<Mutex<Connection>>,
}

impl Warehouse {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WarehouseError> {
        let conn = Connection::open(path.as_ref()).map_err(WarehouseError::Open)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, WarehouseError> {
        let conn = Connection::open_in_memory().map_err(WarehouseError::Open)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, WarehouseError> {
        conn.execute_batch(schema::DDL)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replaces the cube contents with `rows` synthetic sales.
    pub async fn seed(&self, rows: usize, seed: u64) -> Result<usize, WarehouseError> {
        let records = dataset::generate(rows, seed);
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        tx.execute("DELETE FROM fact_sales", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fact_sales (order_id, order_date, year, quarter, month, month_name, \
                 region, country, category, subcategory, customer_segment, quantity, unit_price, \
                 revenue, cost, profit, profit_margin) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )?;
            for r in &records {
                stmt.execute(params![
                    r.order_id,
                    r.order_date,
                    r.year,
                    r.quarter,
                    r.month,
                    r.month_name,
                    r.region,
                    r.country,
                    r.category,
                    r.subcategory,
                    r.customer_segment,
                    r.quantity,
                    r.unit_price,
                    r.revenue,
                    r.cost,
                    r.profit,
                    r.profit_margin,
                ])?;
            }
        }
        tx.execute_batch(schema::REBUILD_DIMENSIONS)?;
        tx.commit()?;
        info!("Warehouse seeded with {} sales (seed {})", records.len(), seed);
        Ok(records.len())
    }

    pub async fn fact_count(&self) -> Result<i64, WarehouseError> {
        let db = self.db.lock().await;
        let count = db.query_row(
            &format!("SELECT COUNT(*) FROM {}", schema::FACT_TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Seeds only when the fact table is empty. Returns the row count.
    pub async fn ensure_seeded(&self, rows: usize, seed: u64) -> Result<i64, WarehouseError> {
        let count = self.fact_count().await?;
        if count > 0 {
            return Ok(count);
        }
        Ok(self.seed(rows, seed).await? as i64)
    }

    pub async fn query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        let db = self.db.lock().await;
        run_query(&db, sql, false)
    }

    /// Like `query` but refuses anything that would write.
    pub async fn query_read_only(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        let db = self.db.lock().await;
        run_query(&db, sql, true)
    }

    pub async fn schema_info(&self) -> Result<BTreeMap<String, Vec<ColumnInfo>>, WarehouseError> {
        let db = self.db.lock().await;
        let mut info = BTreeMap::new();
        for table in schema::TABLES {
            let mut stmt = db.prepare(&format!("PRAGMA table_info({table})"))?;
            let rows = stmt.query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                })
            })?;
            let mut columns = Vec::new();
            for row in rows {
                columns.push(row?);
            }
            info.insert(table.to_string(), columns);
        }
        Ok(info)
    }

    pub async fn overview(&self) -> Result<Overview, WarehouseError> {
        let summary = self
            .query(
                "SELECT COUNT(*) AS total_orders, \
                 ROUND(SUM(revenue), 0) AS total_revenue, \
                 ROUND(SUM(profit), 0) AS total_profit, \
                 ROUND(AVG(profit_margin), 2) AS avg_margin_pct, \
                 MIN(year) AS min_year, MAX(year) AS max_year, \
                 COUNT(DISTINCT country) AS countries, \
                 COUNT(DISTINCT category) AS categories \
                 FROM fact_sales",
            )
            .await?
            .rows
            .into_iter()
            .next()
            .unwrap_or_default();
        let by_region = self
            .query(
                "SELECT region, ROUND(SUM(revenue), 0) AS revenue \
                 FROM fact_sales GROUP BY region ORDER BY revenue DESC",
            )
            .await?
            .rows;
        let by_year = self
            .query(
                "SELECT year, ROUND(SUM(revenue), 0) AS revenue \
                 FROM fact_sales GROUP BY year ORDER BY year",
            )
            .await?
            .rows;
        Ok(Overview {
            summary,
            by_region,
            by_year,
        })
    }
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse").finish_non_exhaustive()
    }
}

fn query_error(e: rusqlite::Error) -> WarehouseError {
    WarehouseError::Query {
        message: e.to_string(),
    }
}

fn run_query(db: &Connection, sql: &str, read_only: bool) -> Result<QueryResult, WarehouseError> {
    let mut stmt = db.prepare(sql).map_err(query_error)?;
    if read_only && !stmt.readonly() {
        return Err(WarehouseError::NotReadOnly);
    }
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([]).map_err(query_error)?;
    while let Some(row) = cursor.next().map_err(query_error)? {
        let mut record = Map::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            let value = row.get_ref(idx).map_err(query_error)?;
            record.insert(name.clone(), to_json(value));
        }
        rows.push(record);
    }
    Ok(QueryResult { columns, rows })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        // from_f64 rejects NaN and infinities
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
    }
}
