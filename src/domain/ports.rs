use crate::domain::model::{FetchOptions, RowOptions, SubmissionBatch, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn api_base(&self) -> &str;
    fn submissions_path(&self) -> &str;
    fn ggis_reference_number(&self) -> &str;
    fn api_key(&self) -> &str;
    /// `None` derives a file name from the form name and today's date.
    fn output_csv(&self) -> Option<&str>;
    fn fetch_options(&self) -> FetchOptions;
    fn row_options(&self) -> RowOptions;
    fn drop_constant_columns(&self) -> bool;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<SubmissionBatch>;
    async fn transform(&self, batch: SubmissionBatch) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
