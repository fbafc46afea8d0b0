mod api;
mod app;
mod cache;
mod commands;
mod config;
mod event;
mod logging;
mod query;
mod resources;
mod sort;
mod ui;

use api::ApiClient;
use clap::Parser;
use color_eyre::Result;
use resources::Resources;
use sort::SortSpec;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ghpm")]
#[command(about = "A terminal UI for milestones, issues and labels")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ghpm/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Label sort order for issue lists, comma separated (overrides config)
  #[arg(short, long, value_delimiter = ',')]
  sort: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Held until exit so buffered log lines are flushed
  let _log_guard = logging::init(&config::Config::data_dir()?)?;

  let sort = match args.sort {
    Some(labels) => SortSpec::new(labels),
    None => SortSpec::new(config.sort.labels.iter().cloned()),
  };

  let client = ApiClient::new(&config.server.url, config::Config::credentials())?;
  let resources = Resources::new(client, sort);

  // Initialize and run the app
  let mut app = app::App::new(config, resources);
  app.run().await?;

  Ok(())
}
