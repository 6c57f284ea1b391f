pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::{
    cli::{LocalStorage, StdoutStorage},
    CliConfig,
};
pub use core::{etl::EtlEngine, pipeline::SubmissionsPipeline};
pub use utils::error::{ConvertError, Result};
