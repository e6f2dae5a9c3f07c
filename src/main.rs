use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use mpg123_remote::{Mpg123Client, PlayerConfig, PlayerEvent};

#[derive(Parser, Debug)]
#[command(about = "Play a file through mpg123's remote-control interface")]
struct Args {
  /// Audio file to play
  path: PathBuf,

  /// Config file (defaults to the user config dir)
  #[arg(long)]
  config: Option<PathBuf>,

  /// mpg123 executable, overrides the config file
  #[arg(long)]
  mpg123: Option<String>,

  /// Initial volume in percent
  #[arg(long)]
  volume: Option<f64>,

  /// Print the final player snapshot as JSON
  #[arg(long)]
  json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .init();

  let mut config = match args.config.clone().or_else(PlayerConfig::default_path) {
    Some(path) => PlayerConfig::load(&path)
      .with_context(|| format!("loading config from {}", path.display()))?,
    None => PlayerConfig::default(),
  };
  if let Some(mpg123) = args.mpg123.clone() {
    config.mpg123_path = Some(mpg123);
  }

  let player = Mpg123Client::launch(config)
    .await
    .context("starting mpg123")?;

  let events = player.events();
  let watcher = tokio::spawn(async move {
    while let Ok(event) = events.recv().await {
      match event {
        PlayerEvent::StateChanged(state) => log::info!("state: {:?}", state),
        PlayerEvent::Metadata(meta) => {
          log::info!("now playing: {} - {} ({})", meta.artist, meta.title, meta.album)
        }
        PlayerEvent::Died(reason) => {
          log::info!("player gone: {}", reason);
          break;
        }
        _ => {}
      }
    }
  });

  if let Some(volume) = args.volume {
    player.set_volume(volume).await?;
  }
  player
    .playfile(&args.path.to_string_lossy())
    .await
    .context("loading file")?;

  tokio::time::sleep(Duration::from_secs(3)).await;
  println!(
    "{} / {} / {} / {}  [{:.1}s of {:.1}s]",
    player.title(),
    player.artist(),
    player.album(),
    player.year(),
    player.position(),
    player.duration(),
  );

  println!("Press enter to exit");
  let mut stdin = BufReader::new(tokio::io::stdin()).lines();
  let _ = stdin.next_line().await;

  if args.json {
    println!("{}", serde_json::to_string_pretty(&player.snapshot())?);
  }

  player.quit().await?;
  let _ = watcher.await;
  Ok(())
}
