use anyhow::{Context, Result};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::DataFrame;

/// A dataframe whose rows are split into partitions of a processing session
#[derive(Debug, Clone)]
pub struct DistributedFrame {
    name: String,
    df: DataFrame,
    num_partitions: usize,
}

impl DistributedFrame {
    pub(crate) fn new(name: impl Into<String>, df: DataFrame, num_partitions: usize) -> Self {
        Self {
            name: name.into(),
            df,
            num_partitions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of partitions the source data was split into
    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Column names, in schema order
    pub fn columns(&self) -> Vec<String> {
        self.df
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }

    /// Count rows by executing the plan
    pub async fn count(&self) -> Result<usize> {
        self.df
            .clone()
            .count()
            .await
            .with_context(|| format!("Failed to count rows of '{}'", self.name))
    }

    /// `(rows, columns)`
    pub async fn shape(&self) -> Result<(usize, usize)> {
        Ok((self.count().await?, self.columns().len()))
    }

    /// Execute the plan and collect every batch
    pub async fn collect(&self) -> Result<Vec<RecordBatch>> {
        self.df
            .clone()
            .collect()
            .await
            .with_context(|| format!("Failed to collect '{}'", self.name))
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }
}
