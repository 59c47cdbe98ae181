use clap::Parser;
use tracing::{error, info};

use ic50_train::api::cli::Args;
use ic50_train::common::log;
use ic50_train::ExitCode;

fn main() {
    let args = Args::parse();
    log::init(args.log_format);

    let code = match ic50_train::run(&args.into_request()) {
        Ok(summary) => {
            info!(
                run_dir = %summary.run_dir.display(),
                steps = summary.global_step,
                trainable_parameters = summary.trainable_parameters,
                eval_loss = summary.final_metrics.loss,
                "training finished"
            );
            ExitCode::Ok
        }
        Err(err) => {
            let code = err.code();
            error!(code = code as u32, kind = ?code, "{err}");
            code
        }
    };
    std::process::exit(code as i32);
}
