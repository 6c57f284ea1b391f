use crate::core::{Pipeline, RunSummary};
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        tracing::info!("Starting conversion");

        let batch = self.pipeline.extract().await?;
        tracing::info!("Extracted {} submissions", batch.submissions.len());

        let result = self.pipeline.transform(batch).await?;
        let rows = result.table.rows.len();
        let dropped_columns = result.dropped_columns.len();
        tracing::info!(
            "Transformed {} rows into {} columns ({} constant columns dropped)",
            rows,
            result.table.headers.len(),
            dropped_columns
        );

        let output_path = self.pipeline.load(result).await?;
        tracing::info!("Output saved to: {}", output_path);

        Ok(RunSummary {
            output_path,
            rows,
            dropped_columns,
            elapsed: started.elapsed(),
        })
    }
}
