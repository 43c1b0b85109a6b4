use std::path::PathBuf;
use std::time::Instant;

use anyhow::{ensure, Result};
use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use super::config::{load_env_file, read_config, ConnectionParams, LoaderConfig};
use crate::distributed::ProcessingSession;
use crate::sql_engine::ast_utils::TableRef;
use crate::sql_engine::reader::{read_table, RawTable, ReadOptions};
use crate::sql_engine::tables::TableManager;

/// Command-line overrides for the load command
#[derive(Debug, Default, Clone)]
pub struct LoadArgs {
    pub config: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub table: Option<String>,
    pub partitions: Option<usize>,
    pub format: String,
}

/// Shapes reported by one run of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub raw_shape: (usize, usize),
    pub distributed_shape: (usize, usize),
    pub partitions: usize,
}

/// Run the load command
pub async fn load_command(args: &LoadArgs) -> Result<()> {
    let start_time = Instant::now();

    load_env_file(args.env_file.as_deref())?;
    let mut config = read_config(args.config.clone())?;
    apply_overrides(&mut config, args);

    let params = ConnectionParams::from_env();
    let snapshot = read_snapshot(&params, &config).await?;
    check_expected_columns(&config, &snapshot);

    if args.format == "text" {
        println!("Raw Table Shape: {}", format_shape(snapshot.shape()));
    }

    let report = convert(&config, &snapshot).await?;

    match args.format.as_str() {
        "text" => {
            println!(
                "Raw Distributed DataFrame Shape: {}",
                format_shape(report.distributed_shape)
            );
        }
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        other => {
            eprintln!(
                "{}",
                format!("Unsupported output format: {}. Using text format instead.", other)
                    .yellow()
            );
            println!("Raw Table Shape: {}", format_shape(report.raw_shape));
            println!(
                "Raw Distributed DataFrame Shape: {}",
                format_shape(report.distributed_shape)
            );
        }
    }

    info!("Load finished in {:.2?}", start_time.elapsed());
    Ok(())
}

/// Command-line flags win over the project file
pub fn apply_overrides(config: &mut LoaderConfig, args: &LoadArgs) {
    if let Some(table) = &args.table {
        config.table = table.clone();
    }
    if let Some(partitions) = args.partitions {
        config.partitions = Some(partitions);
    }
}

/// Configuration loader + relational reader
pub async fn read_snapshot(params: &ConnectionParams, config: &LoaderConfig) -> Result<RawTable> {
    let options = read_options(config)?;
    read_table(params, &options).await
}

pub fn read_options(config: &LoaderConfig) -> Result<ReadOptions> {
    let table = TableRef::parse(&config.table)?;
    let manager = TableManager::from_declarations(&config.tables);
    let declared = manager
        .get_schema(&config.table)
        .or_else(|| manager.get_schema(&table.table))
        .cloned();

    Ok(ReadOptions {
        table,
        batch_size: config.batch_size,
        declared,
    })
}

/// Distributed converter: start a session, convert, compare shapes, shut down
pub async fn convert(config: &LoaderConfig, snapshot: &RawTable) -> Result<LoadReport> {
    let mut session = ProcessingSession::builder()
        .app_name(config.app_name.as_str())
        .target_partitions(config.effective_partitions())
        .batch_size(config.batch_size)
        .start();

    let result = convert_in_session(&mut session, snapshot).await;
    session.shutdown();
    result
}

pub async fn convert_in_session(
    session: &mut ProcessingSession,
    snapshot: &RawTable,
) -> Result<LoadReport> {
    let frame = session.create_dataframe(snapshot).await?;
    let raw_shape = snapshot.shape();
    let distributed_shape = frame.shape().await?;

    ensure!(
        raw_shape == distributed_shape,
        "Shape mismatch after conversion of '{}': snapshot {} vs dataframe {}",
        snapshot.name(),
        format_shape(raw_shape),
        format_shape(distributed_shape)
    );

    Ok(LoadReport {
        table: snapshot.name().to_string(),
        raw_shape,
        distributed_shape,
        partitions: frame.num_partitions(),
    })
}

/// The column count is advisory; a mismatch is logged, not enforced
pub fn check_expected_columns(config: &LoaderConfig, snapshot: &RawTable) -> bool {
    match config.expected_columns {
        Some(expected) if expected != snapshot.num_columns() => {
            warn!(
                "Table '{}' has {} columns, expected {}",
                snapshot.name(),
                snapshot.num_columns(),
                expected
            );
            false
        }
        _ => true,
    }
}

/// `(rows, columns)`
pub fn format_shape(shape: (usize, usize)) -> String {
    format!("({}, {})", shape.0, shape.1)
}
