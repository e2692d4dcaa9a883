mod cache;
mod config;
mod health;
mod logging;
mod net;
mod request;
mod server;
mod worker;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::cache::{CacheStorage, MemoryStorage, PartitionSet, SqliteStorage};
use crate::config::Config;
use crate::health::HealthCheckCache;
use crate::net::HttpFetcher;
use crate::request::{Destination, Request};
use crate::server::AppState;
use crate::worker::ServiceWorker;

#[derive(Parser, Debug)]
#[command(name = "connectome-offline")]
#[command(about = "Offline caching worker and local caching proxy for the SNU Connectome site")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/connectome-offline/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin to put the worker in front of
  #[arg(short, long, global = true)]
  origin: Option<Url>,

  /// Keep the cache in memory instead of the SQLite database
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install and activate the worker, then run the caching proxy
  Serve {
    /// Address to listen on (overrides `listen` from the config)
    #[arg(short, long)]
    listen: Option<String>,
  },
  /// Pre-cache the shell into the static partition
  Install,
  /// Install, then delete partitions from other cache versions
  Activate,
  /// Run a single request through the worker
  Fetch {
    /// Absolute URL, or a path resolved against the origin
    url: String,
    /// Issue the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// Fetch destination, as a browser would send in `Sec-Fetch-Dest`
    #[arg(long)]
    dest: Option<String>,
  },
  /// List cache partitions and their entry counts
  Partitions,
  /// Post a JSON message to the worker, e.g. '{"type":"GET_VERSION"}'
  Message { json: String },
  /// Show the notification a push payload would produce
  Push { payload: Option<String> },
  /// Fire a background sync event
  Sync { tag: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn list_partitions(storage: &dyn CacheStorage, partitions: &PartitionSet) -> Result<()> {
  for name in storage.partition_names()? {
    let entries = storage.keys(&name)?.len();
    let marker = if partitions.is_current(&name) {
      "current"
    } else {
      "stale"
    };
    println!("{:<40} {:>6} entries  {}", name, entries, marker);
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    Config {
      origin: Some(origin),
      ..config
    }
  } else {
    config
  };

  let _log_guard = logging::init_logging(&config.logging)?;

  let storage: Box<dyn CacheStorage> = if args.ephemeral {
    Box::new(MemoryStorage::new())
  } else {
    Box::new(SqliteStorage::open(config.cache.path.as_deref())?)
  };

  if let Command::Partitions = args.command {
    let partitions = PartitionSet::new(&config.cache.prefix, &config.cache.version);
    return list_partitions(&*storage, &partitions);
  }

  let worker = ServiceWorker::new(&config, storage, HttpFetcher::new()?)?;

  match args.command {
    Command::Serve { listen } => {
      worker.install().await?;
      worker.activate().await?;

      let listen = listen.unwrap_or_else(|| config.listen.clone());
      let health = HealthCheckCache::new(config.health.ttl()?);
      let state = Arc::new(AppState::new(worker, health));
      server::run(&listen, state).await?;
    }
    Command::Install => print_json(&worker.install().await?)?,
    Command::Activate => {
      worker.install().await?;
      let deleted = worker.activate().await?;
      print_json(&deleted)?;
    }
    Command::Fetch { url, navigate, dest } => {
      let url = worker.resolve(&url)?;
      let mut request = if navigate {
        Request::navigate(url)
      } else {
        Request::get(url)
      };
      if let Some(dest) = dest {
        request = request.with_destination(Destination::from_fetch_dest(&dest));
      }
      let category = worker
        .classify(&request)
        .map(|c| c.as_str())
        .unwrap_or("not intercepted");

      let response = worker.handle_fetch(&request).await?;
      println!("{} ({})", response.status, category);
      for (name, value) in &response.headers {
        println!("{}: {}", name, value);
      }
      println!(
        "\n{} bytes of {}",
        response.body.len(),
        response.header("content-type").unwrap_or("unknown content")
      );
    }
    // Listed above, without needing an origin
    Command::Partitions => {}
    Command::Message { json } => print_json(&worker.message(&json).await?)?,
    Command::Push { payload } => {
      let notification = worker.push(payload.as_deref());
      print_json(&notification)?;
      println!("opens {}", worker.notification_click(&notification));
    }
    Command::Sync { tag } => {
      if worker.sync(&tag) {
        println!("sync {} handled", tag);
      } else {
        println!("sync {} ignored: unknown tag", tag);
      }
    }
  }

  Ok(())
}
