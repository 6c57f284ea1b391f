use clap::Parser;
use find_a_grant_csv::core::{ConfigProvider, Storage};
use find_a_grant_csv::domain::model::RunSummary;
use find_a_grant_csv::utils::{logger, validation::Validate};
use find_a_grant_csv::{
    CliConfig, ConvertError, EtlEngine, LocalStorage, StdoutStorage, SubmissionsPipeline,
};

async fn convert<S: Storage, C: ConfigProvider>(
    storage: S,
    config: C,
) -> Result<RunSummary, ConvertError> {
    let pipeline = SubmissionsPipeline::new(storage, config)?;
    EtlEngine::new(pipeline).run().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    if config.log_json {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting find-a-grant-csv");
    tracing::debug!("CLI config: {:?}", config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(e.severity().exit_code());
    }

    let to_stdout = config.writes_to_stdout();
    let outcome = if to_stdout {
        convert(StdoutStorage, config).await
    } else {
        convert(LocalStorage::new("."), config).await
    };

    match outcome {
        Ok(summary) => {
            let mut report = format!(
                "Output written to: {}\nRetrieved {} applications in {:.2} seconds",
                if to_stdout { "<stdout>" } else { summary.output_path.as_str() },
                summary.rows,
                summary.elapsed.as_secs_f64()
            );
            if summary.dropped_columns > 0 {
                report.push_str(&format!(
                    "\nDropped {} constant columns (use --keep-constant-columns to keep them)",
                    summary.dropped_columns
                ));
            }
            if to_stdout {
                eprintln!("{}", report);
            } else {
                println!("{}", report);
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Conversion failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(e.severity().exit_code());
        }
    }

    Ok(())
}
