use std::sync::Arc;

use anyhow::{Context, Result};
use datafusion::arrow::compute::concat_batches;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::common::TableReference;
use datafusion::datasource::MemTable;
use datafusion::prelude::{SessionConfig, SessionContext};
use tracing::{debug, info, warn};

use super::frame::DistributedFrame;
use crate::sql_engine::reader::{RawTable, DEFAULT_BATCH_SIZE};

/// Builder for a [`ProcessingSession`]
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    app_name: String,
    target_partitions: usize,
    batch_size: usize,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            app_name: "raw_loader".to_string(),
            target_partitions: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SessionBuilder {
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Number of partitions dataframes are split into (at least 1)
    pub fn target_partitions(mut self, partitions: usize) -> Self {
        self.target_partitions = partitions.max(1);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Start the session
    pub fn start(self) -> ProcessingSession {
        let config = SessionConfig::new()
            .with_target_partitions(self.target_partitions)
            .with_batch_size(self.batch_size);
        let ctx = SessionContext::new_with_config(config);
        info!(
            "Started processing session '{}' (id {}, {} partitions)",
            self.app_name,
            ctx.session_id(),
            self.target_partitions
        );

        ProcessingSession {
            ctx,
            app_name: self.app_name,
            target_partitions: self.target_partitions,
            registered: Vec::new(),
        }
    }
}

/// An explicitly owned DataFusion session.
///
/// Frames created through it stay usable until [`shutdown`](Self::shutdown)
/// deregisters their tables.
pub struct ProcessingSession {
    ctx: SessionContext,
    app_name: String,
    target_partitions: usize,
    registered: Vec<TableReference>,
}

impl ProcessingSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn target_partitions(&self) -> usize {
        self.target_partitions
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Copy a snapshot into a partitioned in-memory table and return a frame over it.
    ///
    /// The table is registered under the snapshot's name taken verbatim (no
    /// case folding, dots are part of the name), replacing an earlier
    /// registration of the same name.
    pub async fn create_dataframe(&mut self, snapshot: &RawTable) -> Result<DistributedFrame> {
        let schema = snapshot.schema();
        let partitions =
            split_into_partitions(&schema, snapshot.batches(), self.target_partitions)?;
        let num_partitions = partitions.len();

        let table = MemTable::try_new(Arc::clone(&schema), partitions)
            .context("Failed to build in-memory table")?;

        let name = snapshot.name().to_string();
        let table_ref = TableReference::bare(name.as_str());
        if self.ctx.deregister_table(table_ref.clone())?.is_some() {
            debug!("Replaced registered table '{}'", name);
        }
        self.ctx
            .register_table(table_ref.clone(), Arc::new(table))
            .with_context(|| format!("Failed to register table '{}'", name))?;

        let df = self.ctx.table(table_ref.clone()).await?;
        if !self.registered.contains(&table_ref) {
            self.registered.push(table_ref);
        }
        debug!(
            "Created dataframe '{}' with {} partitions",
            name, num_partitions
        );
        Ok(DistributedFrame::new(name, df, num_partitions))
    }

    /// Run SQL against the tables registered in this session
    pub async fn sql(&self, query: &str) -> Result<DistributedFrame> {
        let df = self
            .ctx
            .sql(query)
            .await
            .with_context(|| format!("Failed to plan query: {}", query))?;
        Ok(DistributedFrame::new("query", df, self.target_partitions))
    }

    /// Deregister every table this session created and drop the context
    pub fn shutdown(self) {
        for name in &self.registered {
            if let Err(err) = self.ctx.deregister_table(name.clone()) {
                warn!("Failed to deregister table '{}': {}", name, err);
            }
        }
        info!("Stopped processing session '{}'", self.app_name);
    }
}

/// Split the rows of `batches` evenly into at most `num_partitions` partitions.
///
/// Never produces more partitions than rows; an empty input yields a single
/// partition holding one empty batch.
pub fn split_into_partitions(
    schema: &SchemaRef,
    batches: &[RecordBatch],
    num_partitions: usize,
) -> Result<Vec<Vec<RecordBatch>>> {
    let combined = concat_batches(schema, batches).context("Failed to combine record batches")?;
    let ranges = compute_partition_ranges(combined.num_rows(), num_partitions);
    if ranges.is_empty() {
        return Ok(vec![vec![RecordBatch::new_empty(Arc::clone(schema))]]);
    }

    Ok(ranges
        .into_iter()
        .map(|(offset, len)| vec![combined.slice(offset, len)])
        .collect())
}

/// Compute `(offset, len)` row ranges for `num_partitions` partitions.
///
/// The last partition receives the remainder rows.
pub fn compute_partition_ranges(total_rows: usize, num_partitions: usize) -> Vec<(usize, usize)> {
    if total_rows == 0 || num_partitions == 0 {
        return vec![];
    }

    let effective_partitions = num_partitions.min(total_rows);
    let base_size = total_rows / effective_partitions;
    let remainder = total_rows % effective_partitions;

    let mut ranges = Vec::with_capacity(effective_partitions);
    let mut offset = 0;
    for i in 0..effective_partitions {
        let len = if i == effective_partitions - 1 {
            base_size + remainder
        } else {
            base_size
        };
        ranges.push((offset, len));
        offset += len;
    }
    ranges
}
