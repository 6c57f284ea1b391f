pub mod client;
pub mod etl;
pub mod flatten;
pub mod output;
pub mod pipeline;
pub mod table;

pub use crate::domain::model::{RunSummary, SubmissionBatch, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
