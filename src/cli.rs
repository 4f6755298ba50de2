use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use sitecrew::config::Config;
use sitecrew::images::{ImageCache, WorkerPhoto};
use sitecrew::network::{self, ConnectivityMonitor, NetworkStatus, StaticStatus};
use sitecrew::queue::{OfflineQueue, PunchInput};
use sitecrew::store::{SqliteKvStore, SqliteTxStore};
use sitecrew::sync::{self, AttendanceClient};

#[derive(Parser, Debug)]
#[command(name = "sitecrew")]
#[command(about = "Offline punch queue and worker photo cache for site attendance")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sitecrew/config.yaml)
  #[arg(short, long)]
  pub config: Option<PathBuf>,

  /// Treat the device as offline regardless of reachability
  #[arg(long)]
  pub offline: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Inspect or edit the offline punch queue
  Queue {
    #[command(subcommand)]
    action: QueueAction,
  },
  /// Inspect or fill the worker photo cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
  /// Probe connectivity and show queue length
  Status,
  /// Push queued punches to the attendance API once
  Sync,
  /// Keep draining the queue whenever the network is reachable
  Watch,
}

#[derive(Subcommand, Debug)]
pub enum QueueAction {
  /// Print queued punches as JSON
  List,
  /// Print the number of queued punches
  Count,
  /// Queue punches from a JSON file (object or array), or "-" for stdin
  Add { file: PathBuf },
  /// Remove a punch by id
  Remove { id: String },
  /// Empty the queue
  Clear,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
  /// Print fresh cached photos for the given workers
  Get {
    #[arg(required = true)]
    worker_ids: Vec<String>,
  },
  /// Cache photos from a JSON file (object or array), or "-" for stdin
  Put { file: PathBuf },
  /// Delete expired photos
  Sweep,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
  One(T),
  Many(Vec<T>),
}

impl<T> OneOrMany<T> {
  fn into_vec(self) -> Vec<T> {
    match self {
      Self::One(v) => vec![v],
      Self::Many(v) => v,
    }
  }
}

pub async fn run(args: Args, config: Config) -> Result<()> {
  match args.command {
    Command::Queue { action } => {
      let queue = open_queue(&config, Arc::new(StaticStatus(!args.offline)))?;
      run_queue(action, &queue)
    }
    Command::Cache { action } => run_cache(action, &open_cache(&config)?).await,
    Command::Status => {
      let online = !args.offline && probe(&config).await;
      let queue = open_queue(&config, Arc::new(StaticStatus(online)))?;
      println!(
        "network: {}",
        if queue.is_connected() { "online" } else { "offline" }
      );
      println!("queued punches: {}", queue.count());
      Ok(())
    }
    Command::Sync => {
      let client = attendance_client(&config)?;
      let online = !args.offline && probe(&config).await;
      let queue = open_queue(&config, Arc::new(StaticStatus(online)))?;

      let report = sync::drain(&queue, &client).await;
      if report.skipped_offline {
        println!("offline; {} punches left queued", queue.count());
      } else {
        println!(
          "synced {} of {} punches ({} failed)",
          report.synced, report.attempted, report.failed
        );
      }
      Ok(())
    }
    Command::Watch => watch(&config, args.offline).await,
  }
}

fn run_queue(action: QueueAction, queue: &OfflineQueue<SqliteKvStore>) -> Result<()> {
  match action {
    QueueAction::List => {
      let all = queue
        .try_get_all()
        .map_err(|e| eyre!("Failed to read queue: {}", e))?;
      println!("{}", serde_json::to_string_pretty(&all)?);
    }
    QueueAction::Count => println!("{}", queue.count()),
    QueueAction::Add { file } => {
      let punches: Vec<PunchInput> = read_json::<OneOrMany<PunchInput>>(&file)?.into_vec();
      for punch in punches {
        let queued = queue
          .try_enqueue(punch)
          .map_err(|e| eyre!("Failed to queue punch: {}", e))?;
        println!("queued {} at {}", queued.id(), queued.timestamp);
      }
    }
    QueueAction::Remove { id } => {
      let removed = queue
        .try_remove_by_id(&id)
        .map_err(|e| eyre!("Failed to remove {}: {}", id, e))?;
      if removed {
        println!("removed {}", id);
      } else {
        println!("{} is not queued", id);
      }
    }
    QueueAction::Clear => {
      queue
        .try_clear_all()
        .map_err(|e| eyre!("Failed to clear queue: {}", e))?;
      println!("queue cleared");
    }
  }
  Ok(())
}

async fn run_cache(action: CacheAction, cache: &ImageCache<SqliteTxStore>) -> Result<()> {
  match action {
    CacheAction::Get { worker_ids } => {
      let images = cache
        .try_get_cached_images(&worker_ids)
        .await
        .map_err(|e| eyre!("Failed to read image cache: {}", e))?;
      println!("{}", serde_json::to_string_pretty(&images)?);
    }
    CacheAction::Put { file } => {
      let photos: Vec<WorkerPhoto> = read_json::<OneOrMany<WorkerPhoto>>(&file)?.into_vec();
      let count = photos.len();
      cache
        .cache_worker_images(photos)
        .await
        .map_err(|e| eyre!("Failed to cache photos: {}", e))?;
      println!("cached {} photos", count);
    }
    CacheAction::Sweep => {
      let removed = cache
        .try_clear_expired_cache()
        .await
        .map_err(|e| eyre!("Failed to sweep image cache: {}", e))?;
      println!("removed {} expired photos", removed);
    }
  }
  Ok(())
}

/// Long-running coordinator: sweep the cache once, then drain on every tick
/// while the network looks reachable.
async fn watch(config: &Config, offline: bool) -> Result<()> {
  let client = attendance_client(config)?;
  let network: Arc<dyn NetworkStatus> = if offline {
    Arc::new(StaticStatus::offline())
  } else {
    Arc::new(
      ConnectivityMonitor::start(
        config.network.probe_addr.clone(),
        config.network.probe_interval(),
        config.network.probe_timeout(),
      )
      .await,
    )
  };
  let queue = open_queue(config, network)?;

  let cache = Arc::new(open_cache(config)?);
  let _sweep = cache.spawn_clear_expired();

  let mut ticker = tokio::time::interval(config.network.probe_interval());
  info!("watch started");
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        if queue.count() > 0 {
          sync::drain(&queue, &client).await;
        }
      }
      _ = tokio::signal::ctrl_c() => {
        info!("watch stopped");
        return Ok(());
      }
    }
  }
}

fn open_queue(
  config: &Config,
  network: Arc<dyn NetworkStatus>,
) -> Result<OfflineQueue<SqliteKvStore>> {
  let path = config.queue_db_path()?;
  let store = SqliteKvStore::open(&path)
    .map_err(|e| eyre!("Failed to open queue at {}: {}", path.display(), e))?;

  Ok(
    OfflineQueue::new(store)
      .with_storage_key(config.queue.storage_key.clone())
      .with_max_len(config.queue.max_len)
      .with_network(network),
  )
}

fn open_cache(config: &Config) -> Result<ImageCache<SqliteTxStore>> {
  Ok(
    ImageCache::sqlite(config.images_db_path()?)
      .with_freshness(config.images.freshness()?)
      .with_op_timeout(Duration::from_secs(config.images.op_timeout_secs)),
  )
}

fn attendance_client(config: &Config) -> Result<AttendanceClient> {
  let base_url = config
    .api
    .base_url
    .as_deref()
    .ok_or_else(|| eyre!("api.base_url is not configured"))?;

  AttendanceClient::new(base_url, Config::get_api_token())
    .map_err(|e| eyre!("Failed to create attendance client: {}", e))
}

async fn probe(config: &Config) -> bool {
  network::probe(&config.network.probe_addr, config.network.probe_timeout()).await
}

fn read_json<T: DeserializeOwned>(file: &Path) -> Result<T> {
  let contents = if file == Path::new("-") {
    let mut buf = String::new();
    std::io::stdin()
      .read_to_string(&mut buf)
      .map_err(|e| eyre!("Failed to read stdin: {}", e))?;
    buf
  } else {
    std::fs::read_to_string(file)
      .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?
  };

  serde_json::from_str(&contents).map_err(|e| eyre!("Failed to parse {}: {}", file.display(), e))
}
