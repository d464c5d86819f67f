use clap::Parser;
use cinefluent::cli::{App, Command};
use cinefluent::config::{self, CliOverrides};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};
use std::fs::File;

#[derive(Parser)]
#[command(name = "cinefluent", about = "CineFluent catalogue and progress client")]
struct Args {
    /// API base URL (overrides config and CINEFLUENT_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Bearer token for authenticated routes
    #[arg(long, global = true)]
    token: Option<String>,

    /// User whose progress to read or update
    #[arg(long, global = true)]
    user_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    // Initialize file logger - writes to cinefluent.log in current directory
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create("cinefluent.log") {
        let _ = WriteLogger::init(LevelFilter::Debug, log_config, log_file);
    }

    let file_config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    let resolved = config::resolve(
        &file_config,
        &CliOverrides {
            base_url: args.api_base,
            access_token: args.token,
            user_id: args.user_id,
        },
    );

    log::info!("CineFluent starting up against {}", resolved.base_url);

    if let Err(e) = App::new(resolved).run(args.command).await {
        log::error!("command failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}
