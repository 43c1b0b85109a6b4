use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use tracing::warn;

use super::config::{load_env_file, read_config, ConnectionParams};
use super::load::read_options;
use crate::sql_engine::reader::{check_declared_schema, connect_options, introspect_table};
use crate::sql_engine::tables::TableSchema;

/// Print the column -> SQL type -> Arrow type mapping of a table without reading its rows
pub async fn schema_command(
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    table: Option<String>,
) -> Result<()> {
    load_env_file(env_file.as_deref())?;
    let mut config = read_config(config_path)?;
    if let Some(table) = table {
        config.table = table;
    }
    let options = read_options(&config)?;
    let params = ConnectionParams::from_env();

    let mut conn = PgConnection::connect_with(&connect_options(&params)?)
        .await
        .with_context(|| format!("Failed to connect to {}", params.redacted_url()))?;
    let introspected = introspect_table(&mut conn, &options.table).await;
    if let Err(err) = conn.close().await {
        warn!("Error closing database connection: {}", err);
    }
    let introspected = introspected?;

    let (schema, source) = match options.declared {
        Some(declared) => {
            check_declared_schema(&declared, &introspected)?;
            (declared, "declared")
        }
        None => (introspected, "introspected"),
    };

    println!(
        "\n--- {} ({}) ---",
        format!("Schema of {}", options.table).green(),
        source
    );
    print!("{}", render_schema(&schema));
    Ok(())
}

/// One line per column: name, SQL type, Arrow type and nullability
pub fn render_schema(schema: &TableSchema) -> String {
    let width = schema
        .columns
        .iter()
        .map(|col| col.name.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for col in &schema.columns {
        out.push_str(&format!(
            "  {:<width$}  {:<18} -> {:?}{}\n",
            col.name,
            col.data_type.to_string(),
            col.data_type.arrow_type(),
            if col.nullable { "" } else { " NOT NULL" },
            width = width
        ));
    }
    out
}
