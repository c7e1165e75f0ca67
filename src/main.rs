use clap::Parser;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use youtube_comment_downloader_lib::downloader::{
    ClientConfig, ContinuationPaginator, DownloadError, JsonFileSink, MemoryChannelDirectory,
    PlaylistExpander, ReqwestTransport, StorageConfig, Transport,
};
use youtube_comment_downloader_lib::queue::{
    enqueue_url, JobOptions, QueueManager, QueueWorker, WorkerControl,
};

const DEFAULT_OUTPUT_DIR: &str = "comments";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video, playlist or community post URLs (or bare video ids) to add to the queue
    urls: Vec<String>,

    /// Put paused and interrupted items back in line
    #[arg(long)]
    resume: bool,

    /// Empty the saved queue before adding anything
    #[arg(long)]
    clear: bool,

    /// Only add to the queue, do not download
    #[arg(long)]
    no_run: bool,

    /// State directory (default: $YTCD_HOME or ~/.youtube_comment_downloader)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Where comment files are written
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Comment order: popular or recent
    #[arg(long)]
    sort: Option<String>,

    /// Interface language sent to YouTube (e.g. en, de)
    #[arg(long)]
    language: Option<String>,

    /// Keep only comments by this channel id or display name
    #[arg(long)]
    author: Option<String>,

    /// Keep only comments by the video's own channel
    #[arg(long)]
    video_author: bool,

    /// Date window: all, day, week, month or year
    #[arg(long)]
    date: Option<String>,

    /// Stop after this many comments per video
    #[arg(long)]
    limit: Option<u64>,

    /// HTTP or SOCKS proxy URL
    #[arg(long)]
    proxy: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

impl Args {
    /// Options given on the command line override the saved ones
    fn apply_to(&self, settings: &mut Map<String, Value>) {
        let mut set = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                settings.insert(key.to_string(), value);
            }
        };
        set("sort", self.sort.as_ref().map(|v| json!(v)));
        set("language", self.language.as_ref().map(|v| json!(v)));
        set("author", self.author.as_ref().map(|v| json!(v)));
        set("date_preset", self.date.as_ref().map(|v| json!(v)));
        set("limit", self.limit.map(|v| json!(v)));
        set(
            "output_dir",
            self.output.as_ref().map(|v| json!(v.to_string_lossy())),
        );
        if self.video_author {
            set("filter_video_author", Some(json!(true)));
        }
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), DownloadError> {
    let args = Args::parse();
    init_logging();

    let storage = args
        .home
        .clone()
        .map(StorageConfig::new)
        .unwrap_or_default();
    let mut queue = QueueManager::new(storage);
    let restored = queue.restore();

    if args.clear {
        queue.clear();
    }
    if args.resume {
        queue.reset_paused();
    } else if restored && queue.has_pending_or_paused() {
        tracing::info!("Saved queue has unfinished items; run with --resume to continue paused ones");
    }
    args.apply_to(queue.settings_mut());

    let config = ClientConfig::default()
        .with_proxy(args.proxy.clone())
        .with_timeout(args.timeout);
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config)?);

    let expander = PlaylistExpander::new(transport.clone(), config.clone());
    for url in &args.urls {
        if let Err(e) = enqueue_url(&mut queue, &expander, url).await {
            tracing::warn!("Skipping {}: {}", url, e);
        }
    }
    queue.persist()?;

    if args.no_run {
        return Ok(());
    }

    let output_dir = JobOptions::from_settings(queue.settings())
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let control = Arc::new(WorkerControl::new());

    let ctrl_c = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Pausing after the current item (Ctrl-C again to stop now)...");
            ctrl_c.pause();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stopping after the current page...");
            ctrl_c.stop();
        }
    });

    let worker = QueueWorker::new(
        ContinuationPaginator::new(transport, config),
        Arc::new(JsonFileSink::new(output_dir)),
        Arc::new(MemoryChannelDirectory::new()),
        control,
    );
    let summary = worker.run(&mut queue).await;

    tracing::info!(
        "Done: {} complete, {} failed{}",
        summary.completed,
        summary.failed,
        if summary.stopped || summary.paused {
            ", interrupted (resume with --resume)"
        } else {
            ""
        }
    );
    Ok(())
}
