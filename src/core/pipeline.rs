use crate::core::client::{submissions_url, SubmissionsClient};
use crate::core::output::{default_output_filename, encode_csv};
use crate::core::table::{build_table, coerce_submissions, drop_constant_columns, form_name};
use crate::core::{ConfigProvider, Pipeline, Storage, SubmissionBatch, TransformResult};
use crate::utils::error::Result;

pub struct SubmissionsPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    client: SubmissionsClient,
}

impl<S: Storage, C: ConfigProvider> SubmissionsPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Result<Self> {
        let client = SubmissionsClient::new(config.api_key(), config.fetch_options())?;
        Ok(Self {
            storage,
            config,
            client,
        })
    }

    fn output_target(&self, form_name: Option<&str>) -> String {
        match self.config.output_csv() {
            Some(path) => path.to_string(),
            None => default_output_filename(form_name, chrono::Local::now().date_naive()),
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for SubmissionsPipeline<S, C> {
    async fn extract(&self) -> Result<SubmissionBatch> {
        let url = submissions_url(
            self.config.api_base(),
            self.config.submissions_path(),
            self.config.ggis_reference_number(),
        )?;
        tracing::info!(
            "Fetching submissions for GGIS reference {}",
            self.config.ggis_reference_number()
        );

        let doc = self.client.fetch_all_pages(&url).await?;
        let submissions = coerce_submissions(&doc)?;
        Ok(SubmissionBatch {
            form_name: form_name(&doc),
            submissions,
        })
    }

    async fn transform(&self, batch: SubmissionBatch) -> Result<TransformResult> {
        let table = build_table(&batch.submissions, self.config.row_options())?;
        tracing::debug!(
            "Built {} rows across {} columns",
            table.rows.len(),
            table.headers.len()
        );

        let (table, dropped_columns) = if self.config.drop_constant_columns() {
            drop_constant_columns(table)
        } else {
            (table, Vec::new())
        };
        if !dropped_columns.is_empty() {
            tracing::debug!("Dropped constant columns: {}", dropped_columns.join(", "));
        }

        Ok(TransformResult {
            table,
            dropped_columns,
            form_name: batch.form_name,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let target = self.output_target(result.form_name.as_deref());
        let data = encode_csv(&result.table)?;

        tracing::debug!("Writing CSV ({} bytes) to {}", data.len(), target);
        self.storage.write_file(&target, &data).await?;
        Ok(target)
    }
}
