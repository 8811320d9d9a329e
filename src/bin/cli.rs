use clap::Parser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::{error, info, warn};
use std::fs;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tubegrab::config::{self, FileConfig};
use tubegrab::progress::BarReporter;
use tubegrab::prompt::PromptPolicy;
use tubegrab::{Request, SelectionInput};
use tubegrab_core::analytics::Analytics;
use tubegrab_core::collision::{CollisionDecision, CollisionPolicy};
use tubegrab_core::model::{AudioFormat, MediaKind};
use tubegrab_core::provider::YtDlpProvider;
use tubegrab_core::retry::RetryPolicy;
use tubegrab_core::transcoder::Transcoder;
use tubegrab_core::{Downloader, DownloaderConfig, ExecutionMode, PlaylistSelection};

/// The exit code of a missing 'yt-dlp' or 'ffmpeg'.
const CONFIGURATION_EXIT_CODE: i32 = 2;

/// The exit code of a second interrupt, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser, Clone)]
#[command(version, about)]
pub struct Cli {
    /// Video or playlist URLs.
    pub urls: Vec<String>,

    #[arg(
        long = "type",
        short = 't',
        default_value = "video",
        value_parser = clap::builder::PossibleValuesParser::new(["video", "audio"])
    )]
    pub kind: String,

    /// A file listing one URL per line.
    #[arg(long = "file", short = 'f')]
    pub file: Option<PathBuf>,

    #[arg(long = "output-dir", short = 'd')]
    pub output_dir: Option<PathBuf>,

    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,

    /// Playlist entries to download, e.g. '1,3,5', 'all', or 'ask' to choose from the list.
    #[arg(long = "select", short = 's')]
    pub select: Option<String>,

    /// The name of the batch or playlist directory.
    #[arg(long = "label", short = 'l')]
    pub label: Option<String>,

    #[arg(long = "retries", short = 'r')]
    pub retries: Option<u32>,

    /// Seconds between two attempts.
    #[arg(long = "delay")]
    pub delay: Option<f64>,

    #[arg(long = "concurrent-downloads", short = 'c')]
    pub concurrent_downloads: Option<usize>,

    #[arg(long = "sequential", action = clap::ArgAction::SetTrue)]
    pub sequential: bool,

    #[arg(
        long = "bitrate",
        short = 'b',
        value_parser = clap::builder::PossibleValuesParser::new([
            "8k", "16k", "24k", "32k", "40k", "48k", "64k", "80k", "96k", "112k", "128k", "160k", "192k", "224k", "256k", "320k"
        ])
    )]
    pub bitrate: Option<String>,

    #[arg(
        long = "format",
        value_parser = clap::builder::PossibleValuesParser::new([
            "mp3", "flac", "ogg", "opus", "m4a", "wav"
        ])
    )]
    pub format: Option<String>,

    #[arg(
        long = "container",
        value_parser = clap::builder::PossibleValuesParser::new(["mp4", "webm", "mkv"])
    )]
    pub container: Option<String>,

    /// Skip decoding finished files to detect corruption.
    #[arg(long = "no-check", action = clap::ArgAction::SetTrue)]
    pub no_check: bool,

    /// Do not write ID3 tags to MP3 files.
    #[arg(long = "no-tags", action = clap::ArgAction::SetTrue)]
    pub no_tags: bool,

    #[arg(
        long = "on-conflict",
        value_parser = clap::builder::PossibleValuesParser::new(["ask", "skip", "rename", "overwrite"])
    )]
    pub on_conflict: Option<String>,

    #[arg(long = "ffmpeg")]
    pub ffmpeg: Option<PathBuf>,

    #[arg(long = "yt-dlp")]
    pub yt_dlp: Option<PathBuf>,

    /// Print the download analytics and exit.
    #[arg(long = "stats", action = clap::ArgAction::SetTrue)]
    pub stats: bool,

    #[arg(
        long = "verbosity",
        short = 'v',
        default_value = "info",
        value_parser = clap::builder::PossibleValuesParser::new([
            "info", "debug", "error", "none", "full"
        ])
    )]
    pub verbosity: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Cli::parse();
    let multi = init_logger(&args.verbosity)?;
    let file_config = config::load();

    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| file_config.log_dir.clone())
        .unwrap_or_else(config::default_log_dir);

    if args.stats {
        let analytics = Analytics::new(&log_dir).load().await?;
        println!("{}", analytics);
        return Ok(());
    }

    let mut sources = args.urls.clone();
    if let Some(file) = &args.file {
        sources.extend(tubegrab::read_sources(BufReader::new(fs::File::open(file)?))?);
    }
    if sources.is_empty() {
        error!("No URL given. Pass URLs as arguments or a list with --file.");
        std::process::exit(1);
    }

    let (provider, transcoder) = match locate_tools(&args, &file_config) {
        Ok(tools) => tools,
        Err(e) => {
            error!("{}", e);
            std::process::exit(CONFIGURATION_EXIT_CODE);
        }
    };

    let downloader_config = downloader_config(&args, &file_config, log_dir)?;
    let policy = collision_policy(&args, &file_config, &multi)?;

    let downloader = Downloader::builder(Arc::new(provider), transcoder)
        .config(downloader_config)
        .collision_policy(policy)
        .progress(Arc::new(BarReporter::new(multi.clone())))
        .build()
        .await;
    info!("{}", downloader);

    let cancel = downloader.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Received interrupt signal, stopping downloads... Press Ctrl-C again to quit now.");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Interrupted again, quitting.");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let request = Request {
        sources,
        kind: args.kind.parse::<MediaKind>()?,
        label: args.label.clone(),
        selection: match args.select.as_deref() {
            Some(select) if select.trim().eq_ignore_ascii_case("ask") => SelectionInput::Ask,
            Some(select) => SelectionInput::Given(PlaylistSelection::parse(select)?),
            None => SelectionInput::Given(PlaylistSelection::Entire),
        },
    };

    let download_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.download_dir.clone())
        .unwrap_or_else(config::default_download_dir);

    let report = match tubegrab::run(&downloader, &download_dir, request, &multi).await {
        Ok(report) => report,
        Err(e) if e.is_configuration() => {
            error!("{}", e);
            std::process::exit(CONFIGURATION_EXIT_CODE);
        }
        Err(e) => return Err(e.into()),
    };

    for item in &report.reports {
        match &item.integrity {
            Some(integrity) if !integrity.is_ok() => warn!(
                "{} may be corrupted: {}",
                integrity.path.display(),
                integrity.errors.join("; ")
            ),
            _ => {}
        }
        println!("{}", item);
    }
    println!("{}", report);

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logger(verbosity: &str) -> Result<MultiProgress, Box<dyn std::error::Error + Send + Sync>> {
    let level = match verbosity {
        "none" => log::LevelFilter::Off,
        "error" => log::LevelFilter::Error,
        "debug" => log::LevelFilter::Debug,
        "full" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    // Other crates only get to warn, unless everything is silenced
    let others = level.min(log::LevelFilter::Warn);
    let logger = env_logger::Builder::new()
        .filter_level(others)
        .filter_module("tubegrab", level)
        .filter_module("tubegrab_core", level)
        .parse_default_env()
        .build();
    let max_level = logger.filter();

    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(max_level);

    Ok(multi)
}

fn locate_tools(
    args: &Cli,
    file_config: &FileConfig,
) -> tubegrab_core::error::Result<(YtDlpProvider, Transcoder)> {
    let provider = YtDlpProvider::locate(args.yt_dlp.clone().or_else(|| file_config.yt_dlp.clone()))?
        .with_args(file_config.yt_dlp_args.clone());
    let transcoder = Transcoder::locate(args.ffmpeg.clone().or_else(|| file_config.ffmpeg.clone()))?;
    Ok((provider, transcoder))
}

fn downloader_config(
    args: &Cli,
    file_config: &FileConfig,
    log_dir: PathBuf,
) -> Result<DownloaderConfig, Box<dyn std::error::Error + Send + Sync>> {
    let defaults = DownloaderConfig::default();

    let delay = match args.delay.or(file_config.retry_delay) {
        Some(secs) => Duration::try_from_secs_f64(secs)?,
        None => defaults.retry.delay,
    };
    let retry = RetryPolicy {
        max_attempts: args
            .retries
            .or(file_config.retries)
            .unwrap_or(defaults.retry.max_attempts)
            .max(1),
        delay,
    };

    let sequential = args.sequential || file_config.sequential.unwrap_or(false);
    let audio_format = match args.format.as_ref().or(file_config.format.as_ref()) {
        Some(format) => format.parse::<AudioFormat>()?,
        None => defaults.audio_format,
    };

    Ok(DownloaderConfig {
        retry,
        mode: if sequential {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Concurrent
        },
        max_concurrent: args
            .concurrent_downloads
            .or(file_config.concurrent_downloads)
            .unwrap_or(defaults.max_concurrent)
            .max(1),
        audio_format,
        audio_bitrate: args
            .bitrate
            .clone()
            .or_else(|| file_config.bitrate.clone())
            .unwrap_or(defaults.audio_bitrate),
        video_container: args
            .container
            .clone()
            .or_else(|| file_config.container.clone())
            .unwrap_or(defaults.video_container),
        verify_integrity: !args.no_check && file_config.verify.unwrap_or(true),
        tag_audio: !args.no_tags && file_config.tags.unwrap_or(true),
        history_dir: Some(log_dir),
        ..defaults
    })
}

fn collision_policy(
    args: &Cli,
    file_config: &FileConfig,
    multi: &MultiProgress,
) -> Result<Arc<dyn CollisionPolicy>, Box<dyn std::error::Error + Send + Sync>> {
    let choice = args
        .on_conflict
        .as_deref()
        .or(file_config.on_conflict.as_deref())
        .unwrap_or("ask");

    let policy: Arc<dyn CollisionPolicy> = match choice {
        "ask" => Arc::new(PromptPolicy::new(multi.clone())),
        "skip" => Arc::new(CollisionDecision::Skip),
        "rename" => Arc::new(CollisionDecision::Rename),
        "overwrite" => Arc::new(CollisionDecision::Overwrite),
        other => return Err(format!("Unknown conflict policy: {}", other).into()),
    };
    Ok(policy)
}
