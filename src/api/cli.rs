//! Command-line surface of the `ic50-train` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::common::config::RunOptions;
use crate::common::log::LogFormat;
use crate::training::RunRequest;

#[derive(Debug, Parser)]
#[command(name = "ic50-train", about = "Train and export an IC50 regression model")]
pub struct Args {
    /// Training data: a JSON Lines file or a directory of them.
    pub train_data: PathBuf,

    /// Evaluation data: a JSON Lines file or a directory of them.
    pub eval_data: PathBuf,

    /// Directory under which the run directory is created.
    pub model_root: PathBuf,

    /// Model variant to train (dense, linear).
    pub model_name: String,

    /// JSON parameter file of the model.
    pub params_file: PathBuf,

    /// Comma-separated feature names.
    pub features: String,

    /// Run directory suffix; defaults to the start time.
    #[arg(long)]
    pub model_suffix: Option<String>,

    /// Steps between checkpoints.
    #[arg(long, default_value_t = 300)]
    pub save_checkpoints_steps: u64,

    /// Minimum seconds between evaluations.
    #[arg(long, default_value_t = 60)]
    pub eval_throttle_secs: u64,

    /// Total training steps.
    #[arg(long, default_value_t = 10_000)]
    pub train_steps: u64,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Shuffle buffer size in records.
    #[arg(long, default_value_t = 20_000)]
    pub buffer_size: usize,

    /// Parser threads; 1 leaves the choice to the input pipeline.
    #[arg(long, default_value_t = 1)]
    pub number_of_threads: usize,

    /// Batches assembled ahead of the training step.
    #[arg(long, default_value_t = 6)]
    pub prefetch_buffer_size: usize,

    /// Log output format (text or json).
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn into_request(self) -> RunRequest {
        let options = RunOptions {
            train_path: self.train_data,
            eval_path: self.eval_data,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            dropout: self.dropout,
            buffer_size: self.buffer_size,
            num_threads: self.number_of_threads,
            prefetch_size: self.prefetch_buffer_size,
        };
        RunRequest {
            model_suffix: self.model_suffix,
            save_checkpoints_steps: self.save_checkpoints_steps,
            eval_throttle_secs: self.eval_throttle_secs,
            max_steps: self.train_steps,
            ..RunRequest::new(
                self.model_root,
                self.model_name,
                self.params_file,
                self.features,
                options,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from([
            "ic50-train",
            "train.jsonl",
            "eval.jsonl",
            "models",
            "dense",
            "params.json",
            "gene_expression,mutation",
        ])
        .unwrap();
        assert_eq!(args.log_format, LogFormat::Text);

        let request = args.into_request();
        assert_eq!(request.variant, "dense");
        assert_eq!(request.model_suffix, None);
        assert_eq!(request.save_checkpoints_steps, 300);
        assert_eq!(request.eval_throttle_secs, 60);
        assert_eq!(request.max_steps, 10_000);
        assert_eq!(request.options.batch_size, 64);
        assert_eq!(request.options.learning_rate, 1e-3);
        assert_eq!(request.options.dropout, 0.5);
        assert_eq!(request.options.buffer_size, 20_000);
        assert_eq!(request.options.num_threads, 1);
        assert_eq!(request.options.prefetch_size, 6);
    }

    #[test]
    fn optional_flags_override_defaults() {
        let args = Args::try_parse_from([
            "ic50-train",
            "t",
            "e",
            "m",
            "linear",
            "p.json",
            "mutation",
            "--model-suffix",
            "v2",
            "--train-steps",
            "50",
            "--number-of-threads",
            "4",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.log_format, LogFormat::Json);
        let request = args.into_request();
        assert_eq!(request.model_suffix.as_deref(), Some("v2"));
        assert_eq!(request.max_steps, 50);
        assert_eq!(request.options.num_threads, 4);
    }

    #[test]
    fn missing_positionals_are_rejected() {
        assert!(Args::try_parse_from(["ic50-train", "train.jsonl"]).is_err());
    }
}
