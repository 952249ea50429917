//! Run command implementation
//!
//! De-identifies an NDJSON file record by record through the batch executor.

use super::exit_code_for;
use crate::adapters::ndjson::{NdjsonReader, NdjsonWriter};
use crate::config::{load_config, DeidConfig};
use crate::core::pipeline::{BatchExecutor, ItemTransform, PipelineOutcome};
use crate::deid::audit::AuditLogger;
use crate::deid::config::{DateShiftScope, DeidConfiguration};
use crate::deid::DeidEngine;
use crate::domain::RecordFamily;
use clap::Args;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input file, one JSON record per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file, one JSON record per line
    #[arg(short, long)]
    pub output: PathBuf,

    /// Record family (path or tag); overrides the configured family
    #[arg(long)]
    pub family: Option<RecordFamily>,

    /// Rule file; overrides deidentification.rules_path
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Worker tasks
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Records per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Write records as soon as their batch finishes
    #[arg(long)]
    pub no_keep_order: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(input = %self.input.display(), "Starting run command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        self.apply_overrides(&mut config);
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let rules = match DeidConfiguration::from_file(&config.deidentification.rules_path) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load rule configuration");
                eprintln!("Failed to load rule configuration: {e}");
                return Ok(2);
            }
        };
        let rules = match scope_prefix(rules.parameters().date_shift_scope, &self.input) {
            Some(prefix) => {
                tracing::debug!(prefix = %prefix, "Date-shift scope prefix set from input path");
                rules.with_scope_prefix(prefix)
            }
            None => rules,
        };

        let engine = match self.build_engine(&config, rules) {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize engine");
                eprintln!("Failed to initialize engine: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        let reader = match NdjsonReader::open(&self.input).await {
            Ok(r) => r,
            Err(e) => {
                eprintln!("{e}");
                return Ok(5);
            }
        };
        let mut writer = match NdjsonWriter::create(&self.output).await {
            Ok(w) => w,
            Err(e) => {
                eprintln!("{e}");
                return Ok(5);
            }
        };

        let family = config.deidentification.family;
        let transform_engine = engine.clone();
        let transform: ItemTransform<Value, Value> = Arc::new(move |value: Value| {
            transform_engine
                .deidentify_json(value, family)
                .map(|(output, _)| output)
        });

        println!("🚀 De-identifying {}...", self.input.display());
        let executor = BatchExecutor::new(config.pipeline.to_options(), transform);
        let summary = match executor.run(reader, &mut writer, shutdown_signal).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Run failed");
                eprintln!("Run failed: {e}");
                return Ok(5);
            }
        };

        if let Err(e) = engine.save_identifier_mapping() {
            tracing::error!(error = %e, "Failed to save identifier mapping");
            eprintln!("Failed to save identifier mapping: {e}");
            return Ok(5);
        }

        println!();
        println!("📊 Run Summary:");
        println!("  Records written: {}", summary.consumed);
        println!("  Records failed: {}", summary.failed);
        println!("  Batches: {}", summary.batches);
        println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
        println!("  Throughput: {:.1} records/s", summary.throughput());
        println!();

        if summary.outcome == PipelineOutcome::Cancelled {
            println!("⚠️  Run cancelled. Records written so far are complete.");
            return Ok(3);
        }
        println!("✅ Run completed successfully!");
        Ok(0)
    }

    fn apply_overrides(&self, config: &mut DeidConfig) {
        if let Some(family) = self.family {
            config.deidentification.family = family;
        }
        if let Some(rules) = &self.rules {
            config.deidentification.rules_path = rules.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency;
        }
        if let Some(batch_size) = self.batch_size {
            config.pipeline.batch_size = batch_size;
        }
        if self.no_keep_order {
            config.pipeline.keep_order = false;
        }
    }

    fn build_engine(
        &self,
        config: &DeidConfig,
        rules: DeidConfiguration,
    ) -> crate::domain::Result<DeidEngine> {
        let audit = AuditLogger::new(
            config.audit.log_path.clone(),
            config.audit.json_format,
            config.audit.enabled,
        )?;
        Ok(DeidEngine::new(rules)?.with_audit(audit))
    }
}

/// Date-shift scope prefix implied by the input path
///
/// `file` scope uses the file name, `folder` scope the name of the containing directory.
fn scope_prefix(scope: DateShiftScope, input: &Path) -> Option<String> {
    match scope {
        DateShiftScope::Resource => None,
        DateShiftScope::File => input.file_name().map(|n| n.to_string_lossy().into_owned()),
        DateShiftScope::Folder => {
            let absolute = if input.is_absolute() {
                input.to_path_buf()
            } else {
                std::env::current_dir().ok()?.join(input)
            };
            absolute
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        ApplicationConfig, AuditConfig, DeidentificationConfig, LoggingConfig, PipelineConfig,
    };

    fn args() -> RunArgs {
        RunArgs {
            input: PathBuf::from("/data/site-a/batch-01.ndjson"),
            output: PathBuf::from("out.ndjson"),
            family: Some(RecordFamily::Tag),
            rules: Some(PathBuf::from("other-rules.toml")),
            concurrency: Some(2),
            batch_size: None,
            no_keep_order: true,
        }
    }

    #[test]
    fn test_scope_prefix() {
        let input = Path::new("/data/site-a/batch-01.ndjson");
        assert_eq!(scope_prefix(DateShiftScope::Resource, input), None);
        assert_eq!(
            scope_prefix(DateShiftScope::File, input).as_deref(),
            Some("batch-01.ndjson")
        );
        assert_eq!(scope_prefix(DateShiftScope::Folder, input).as_deref(), Some("site-a"));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = DeidConfig {
            application: ApplicationConfig::default(),
            pipeline: PipelineConfig::default(),
            deidentification: DeidentificationConfig {
                rules_path: PathBuf::from("rules.toml"),
                family: RecordFamily::Path,
            },
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        };

        args().apply_overrides(&mut config);

        assert_eq!(config.deidentification.family, RecordFamily::Tag);
        assert_eq!(config.deidentification.rules_path, PathBuf::from("other-rules.toml"));
        assert_eq!(config.pipeline.concurrency, 2);
        assert_eq!(config.pipeline.batch_size, 100);
        assert!(!config.pipeline.keep_order);
    }
}
