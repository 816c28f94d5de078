use clap::Parser;
use sitemap_export::cli::{self, Cli};
use sitemap_export::error::{ExportError, EXIT_FAILURE};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    cli::init_logging(args.log_format, args.quiet);

    match cli::export_cmd::run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<ExportError>()
                .map(ExportError::exit_code)
                .unwrap_or(EXIT_FAILURE);
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(code as u8)
        }
    }
}
