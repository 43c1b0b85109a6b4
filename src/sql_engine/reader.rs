//! Relational reader: loads a whole PostgreSQL table into Arrow record batches

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use datafusion::arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float32Builder, Float64Builder, Int16Builder,
    Int32Builder, Int64Builder, StringBuilder, TimestampMicrosecondBuilder,
};
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Row};
use tracing::{debug, info, warn};

use super::ast_utils::{build_select_all, TableRef};
use super::tables::{ColumnDef, SqlType, TableSchema};
use crate::commands::config::ConnectionParams;

/// Default number of rows per record batch
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// The full contents of one table at query time
#[derive(Debug, Clone)]
pub struct RawTable {
    name: String,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl RawTable {
    pub fn try_new(
        name: impl Into<String>,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<Self> {
        for batch in &batches {
            if batch.schema() != schema {
                bail!("Record batch schema does not match the table schema");
            }
        }
        Ok(Self {
            name: name.into(),
            schema,
            batches,
        })
    }

    /// Name of the source table (without schema qualifier)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }
}

/// One decoded value of a result row
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

/// Options controlling how a table is read
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub table: TableRef,
    pub batch_size: usize,
    /// Schema declared in the project config, used instead of the introspected types
    pub declared: Option<TableSchema>,
}

/// Turn connection parameters into sqlx connect options.
///
/// Every parameter has to be set (only the password may be empty); sqlx would otherwise fill gaps from `PG*`
/// variables or `localhost`, connecting somewhere nobody asked for.
pub fn connect_options(params: &ConnectionParams) -> Result<PgConnectOptions> {
    let missing = params.missing();
    if !missing.is_empty() {
        bail!(
            "Cannot connect to {}: unset or empty connection variables: {}",
            params.redacted_url(),
            missing.join(", ")
        );
    }

    let (user, password, host, port, db_name) = (
        params.user.as_deref().unwrap_or_default(),
        params.password.as_deref().unwrap_or_default(),
        params.host.as_deref().unwrap_or_default(),
        params.port.as_deref().unwrap_or_default(),
        params.db_name.as_deref().unwrap_or_default(),
    );
    let port: u16 = port.trim().parse().with_context(|| {
        format!(
            "Cannot connect to {}: invalid port '{}'",
            params.redacted_url(),
            port
        )
    })?;

    Ok(PgConnectOptions::new()
        .host(host)
        .port(port)
        .username(user)
        .password(password)
        .database(db_name))
}

/// Open one connection, read the whole table and close the connection again
pub async fn read_table(params: &ConnectionParams, options: &ReadOptions) -> Result<RawTable> {
    let connect = connect_options(params)?;
    let mut conn = PgConnection::connect_with(&connect)
        .await
        .with_context(|| format!("Failed to connect to {}", params.redacted_url()))?;
    info!("Connected to {}", params.redacted_url());

    let result = read_with_connection(&mut conn, options).await;

    if let Err(err) = conn.close().await {
        warn!("Error closing database connection: {}", err);
    }
    result
}

async fn read_with_connection(conn: &mut PgConnection, options: &ReadOptions) -> Result<RawTable> {
    let start_time = Instant::now();

    let introspected = introspect_table(conn, &options.table).await?;
    let schema = match &options.declared {
        Some(declared) => {
            check_declared_schema(declared, &introspected)?;
            declared.clone()
        }
        None => introspected,
    };

    let query = build_select_all(&options.table, &schema);
    debug!("Read query: {}", query);

    let rows: Vec<PgRow> = sqlx::query(&query)
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("Failed to read table {}", options.table))?;

    let arrow_schema = schema.to_arrow_schema();
    let batch_size = options.batch_size.max(1);
    let mut batches = Vec::with_capacity(rows.len().div_ceil(batch_size));
    for chunk in rows.chunks(batch_size) {
        let cells = chunk
            .iter()
            .map(|row| decode_row(row, &schema))
            .collect::<Result<Vec<_>>>()?;
        batches.push(build_batch(&schema, Arc::clone(&arrow_schema), &cells)?);
    }

    let table = RawTable::try_new(options.table.table.clone(), arrow_schema, batches)?;
    info!(
        "Read {} rows x {} columns from {} in {:.2?}",
        table.num_rows(),
        table.num_columns(),
        options.table,
        start_time.elapsed()
    );
    Ok(table)
}

/// Look up the table's columns in `information_schema.columns`.
///
/// A table that exists but has no columns is rejected; nothing can be
/// selected from it.
pub async fn introspect_table(conn: &mut PgConnection, table: &TableRef) -> Result<TableSchema> {
    let query = r#"
        SELECT column_name::text, data_type::text, (is_nullable::text = 'YES') AS nullable
        FROM information_schema.columns
        WHERE table_name::text = $1
          AND table_schema::text = COALESCE($2::text, current_schema()::text)
        ORDER BY ordinal_position
    "#;

    let rows: Vec<(String, String, bool)> = sqlx::query_as(query)
        .bind(table.table.as_str())
        .bind(table.schema.as_deref())
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("Failed to look up columns of {}", table))?;

    if rows.is_empty() {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table.to_object_name().to_string())
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("Failed to look up table {}", table))?;
        if exists {
            bail!("Table {} has no columns; zero-column tables are not supported", table);
        }
        bail!("Table {} does not exist", table);
    }

    let columns = rows
        .into_iter()
        .map(|(name, data_type, nullable)| {
            let data_type = SqlType::from_information_schema(&data_type);
            if let SqlType::Other(name) = &data_type {
                debug!("Unmapped PostgreSQL type '{}', reading as text", name);
            }
            ColumnDef {
                name,
                data_type,
                nullable,
            }
        })
        .collect();

    Ok(TableSchema {
        name: table.table.clone(),
        columns,
    })
}

/// Declared columns must name exactly the table's columns, in order
pub fn check_declared_schema(declared: &TableSchema, actual: &TableSchema) -> Result<()> {
    let declared_names = declared.column_names();
    let actual_names = actual.column_names();
    if declared_names != actual_names {
        bail!(
            "Declared schema for {} does not match the table: declared [{}], actual [{}]",
            actual.name,
            declared_names.join(", "),
            actual_names.join(", ")
        );
    }
    Ok(())
}

/// Decode one result row according to the schema it was selected with
pub fn decode_row(row: &PgRow, schema: &TableSchema) -> Result<Vec<Cell>> {
    if row.len() != schema.columns.len() {
        bail!(
            "Result row has {} columns, schema has {}",
            row.len(),
            schema.columns.len()
        );
    }

    schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            decode_cell(row, i, &col.data_type)
                .with_context(|| format!("Failed to decode column '{}'", col.name))
        })
        .collect()
}

fn decode_cell(row: &PgRow, i: usize, sql_type: &SqlType) -> Result<Cell> {
    let cell = match sql_type {
        SqlType::SmallInt => row.try_get::<Option<i16>, _>(i)?.map(Cell::Int16),
        SqlType::Integer => row.try_get::<Option<i32>, _>(i)?.map(Cell::Int32),
        SqlType::BigInt => row.try_get::<Option<i64>, _>(i)?.map(Cell::Int64),
        SqlType::Real => row.try_get::<Option<f32>, _>(i)?.map(Cell::Float32),
        SqlType::Double | SqlType::Numeric => row.try_get::<Option<f64>, _>(i)?.map(Cell::Float64),
        SqlType::Text | SqlType::Other(_) => row.try_get::<Option<String>, _>(i)?.map(Cell::Text),
        SqlType::Boolean => row.try_get::<Option<bool>, _>(i)?.map(Cell::Boolean),
        SqlType::Date => row.try_get::<Option<NaiveDate>, _>(i)?.map(Cell::Date),
        SqlType::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(i)?
            .map(Cell::Timestamp),
        SqlType::TimestampTz => row
            .try_get::<Option<DateTime<Utc>>, _>(i)?
            .map(Cell::TimestampTz),
    };
    Ok(cell.unwrap_or(Cell::Null))
}

/// Assemble decoded rows into one record batch.
///
/// A cell whose variant does not match its column type is an error, and so is
/// a null in a non-nullable column. The schema needs at least one column.
pub fn build_batch(
    schema: &TableSchema,
    arrow_schema: SchemaRef,
    rows: &[Vec<Cell>],
) -> Result<RecordBatch> {
    if schema.columns.is_empty() {
        bail!("Table {} has no columns", schema.name);
    }
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.columns.len());

    for (i, col) in schema.columns.iter().enumerate() {
        let mut cells = Vec::with_capacity(rows.len());
        for row in rows {
            let cell = row.get(i).with_context(|| {
                format!("Row has {} cells, expected {}", row.len(), schema.columns.len())
            })?;
            if !col.nullable && *cell == Cell::Null {
                bail!("Null value in non-nullable column '{}'", col.name);
            }
            cells.push(cell);
        }
        let array = build_column(&col.data_type, &cells)
            .with_context(|| format!("Failed to build column '{}'", col.name))?;
        columns.push(array);
    }

    Ok(RecordBatch::try_new(arrow_schema, columns)?)
}

macro_rules! build_array {
    ($builder:expr, $cells:expr, $variant:ident, $convert:expr) => {{
        let mut builder = $builder;
        for cell in $cells {
            match cell {
                Cell::Null => builder.append_null(),
                Cell::$variant(value) => builder.append_value($convert(value)),
                other => bail!("Unexpected value {:?}", other),
            }
        }
        Arc::new(builder.finish()) as ArrayRef
    }};
}

fn build_column(sql_type: &SqlType, cells: &[&Cell]) -> Result<ArrayRef> {
    let len = cells.len();
    let array = match sql_type {
        SqlType::SmallInt => {
            build_array!(Int16Builder::with_capacity(len), cells, Int16, |v: &i16| *v)
        }
        SqlType::Integer => {
            build_array!(Int32Builder::with_capacity(len), cells, Int32, |v: &i32| *v)
        }
        SqlType::BigInt => {
            build_array!(Int64Builder::with_capacity(len), cells, Int64, |v: &i64| *v)
        }
        SqlType::Real => {
            build_array!(Float32Builder::with_capacity(len), cells, Float32, |v: &f32| *v)
        }
        SqlType::Double | SqlType::Numeric => {
            build_array!(Float64Builder::with_capacity(len), cells, Float64, |v: &f64| *v)
        }
        SqlType::Text | SqlType::Other(_) => {
            build_array!(StringBuilder::new(), cells, Text, String::as_str)
        }
        SqlType::Boolean => {
            build_array!(BooleanBuilder::with_capacity(len), cells, Boolean, |v: &bool| *v)
        }
        SqlType::Date => {
            build_array!(Date32Builder::with_capacity(len), cells, Date, days_since_epoch)
        }
        SqlType::Timestamp => build_array!(
            TimestampMicrosecondBuilder::with_capacity(len),
            cells,
            Timestamp,
            |v: &NaiveDateTime| v.and_utc().timestamp_micros()
        ),
        SqlType::TimestampTz => build_array!(
            TimestampMicrosecondBuilder::with_capacity(len).with_timezone("UTC"),
            cells,
            TimestampTz,
            |v: &DateTime<Utc>| v.timestamp_micros()
        ),
    };
    Ok(array)
}

fn days_since_epoch(date: &NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    date.signed_duration_since(epoch).num_days() as i32
}
