use clap::Parser;
use oatlab::{Args, default_data_dir, init_logging};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);

    let _logging = init_logging(&data_dir, &args.log_level, args.log_stderr)?;

    let result = oatlab::cli::run(&args);
    if let Err(err) = &result {
        tracing::error!("analysis failed: {err}");
    }

    tracing::info!("oatlab shutting down");
    result
}
