mod cli;

use clap::Parser;
use color_eyre::Result;

use sitecrew::config::Config;
use sitecrew::logging;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = cli::Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Logs go to a file so they don't mix with command output
  let _guard = logging::init(&config.log_dir()?)?;

  cli::run(args, config).await
}
