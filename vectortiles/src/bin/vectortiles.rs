use std::env;
use std::io::stdout;

use clap::Parser as _;
use log::log_enabled;
use tracing::error;
use vectortiles::args::Args;
use vectortiles::commands::run;
use vectortiles::config::OsEnv;
use vectortiles::logging::{LOG_FORMAT_ENV, ensure_core_log_level_matches, init_tracing};

#[tokio::main]
async fn main() {
    let filter = ensure_core_log_level_matches(env::var("RUST_LOG").ok());
    init_tracing(&filter, env::var(LOG_FORMAT_ENV).ok());

    let args = Args::parse();
    let env = OsEnv;
    if let Err(e) = run(args, &env, &mut stdout().lock()).await {
        // Ensure the message is printed, even if the logging is disabled
        if log_enabled!(log::Level::Error) {
            error!("{e}");
        } else {
            eprintln!("{e}");
        }
        std::process::exit(1);
    }
}
