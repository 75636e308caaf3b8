//! Binary entrypoint for signage-frame.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{ArgAction, Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use signage_frame::catalog::{self, ImageDraft};
use signage_frame::clock::{Clock, LocalClock, OffsetClock, parse_local_datetime};
use signage_frame::config::Configuration;
use signage_frame::events::SinkCommand;
use signage_frame::repository::{ImageRepository, JsonFileRepository};
use signage_frame::sink::ChannelSink;
use signage_frame::tasks::{scheduler, viewer};
use signage_model::{Image, Playlist};

#[derive(Debug, Parser)]
#[command(
    name = "signage-frame",
    version,
    about = "Scheduled image rotation for unattended displays"
)]
struct Cli {
    /// Path to YAML config (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Image collection file; overrides `repository-path` from the config
    #[arg(long, value_name = "FILE", global = true)]
    repository: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rotate eligible images until interrupted (default)
    Run {
        /// Start the wall clock at this local date-time instead of now
        #[arg(long, value_name = "DATETIME")]
        now: Option<String>,
    },
    /// Print each image's eligibility and the resulting playlist order
    Playlist {
        /// Evaluate at this local date-time instead of now
        #[arg(long, value_name = "DATETIME")]
        at: Option<String>,
    },
    /// Inspect or edit the image collection
    #[command(subcommand)]
    Images(ImagesCommand),
}

#[derive(Debug, Subcommand)]
enum ImagesCommand {
    /// List stored images
    List,
    /// Add an image (shown every day unless --days or --every-day is given)
    Add(DraftArgs),
    /// Change fields of an existing image
    Update {
        id: u64,
        #[command(flatten)]
        fields: DraftArgs,
    },
    /// Delete an image
    Remove { id: u64 },
}

#[derive(Debug, Args)]
struct DraftArgs {
    /// Image location
    #[arg(long)]
    url: Option<String>,
    /// Window start, HH:MM or HH:MM:SS
    #[arg(long, value_name = "TIME")]
    start: Option<String>,
    /// Window end (inclusive), HH:MM or HH:MM:SS
    #[arg(long, value_name = "TIME")]
    end: Option<String>,
    /// Comma-separated weekday tokens, e.g. Mon,Wed,Fri
    #[arg(long, value_delimiter = ',', value_name = "DAYS")]
    days: Option<Vec<String>>,
    /// Ignore --days and show on every day of the week
    #[arg(long, value_name = "BOOL")]
    every_day: Option<bool>,
    /// Seconds on screen per turn
    #[arg(long = "duration", value_name = "SECONDS")]
    duration_sec: Option<i64>,
    /// First day the image is no longer shown
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "no_expiry")]
    expires: Option<NaiveDate>,
    /// Remove the expiry date
    #[arg(long)]
    no_expiry: bool,
}

impl DraftArgs {
    fn apply_to(self, mut draft: ImageDraft) -> ImageDraft {
        if let Some(url) = self.url {
            draft.url = url;
        }
        if let Some(start) = self.start {
            draft.start_time = start;
        }
        if let Some(end) = self.end {
            draft.end_time = end;
        }
        if let Some(days) = self.days {
            draft.repeat_days = days;
        }
        if let Some(every_day) = self.every_day {
            draft.every_day = every_day;
        }
        if let Some(duration_sec) = self.duration_sec {
            draft.duration_sec = duration_sec;
        }
        if self.no_expiry {
            draft.expiry_date = None;
        } else if let Some(expires) = self.expires {
            draft.expiry_date = Some(expires.into());
        }
        draft
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("signage_frame={level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        config,
        repository,
        verbose,
        command,
    } = Cli::parse();
    init_tracing(verbose)?;

    let mut cfg = Configuration::load(config.as_deref())?;
    if let Some(path) = repository {
        cfg.repository_path = path;
    }
    tracing::debug!("configuration: {cfg:#?}");
    let repo = JsonFileRepository::new(&cfg.repository_path);

    match command.unwrap_or(Command::Run { now: None }) {
        Command::Run { now } => {
            let now = now.as_deref().map(parse_local_datetime).transpose()?;
            run_signage(cfg, repo, now).await
        }
        Command::Playlist { at } => {
            let at = at.as_deref().map(parse_local_datetime).transpose()?;
            print_playlist(&cfg, &repo, at.unwrap_or_else(|| LocalClock.now()));
            Ok(())
        }
        Command::Images(images) => manage_images(&repo, images),
    }
}

async fn run_signage(
    cfg: Configuration,
    repo: JsonFileRepository,
    now_override: Option<NaiveDateTime>,
) -> Result<()> {
    tracing::info!(
        repository = %repo.path().display(),
        poll = %humantime::format_duration(cfg.poll_interval),
        min_duration = %humantime::format_duration(cfg.min_duration),
        "starting rotation"
    );

    let (sink_tx, sink_rx) = mpsc::channel::<SinkCommand>(cfg.sink_queue_depth); // Scheduler -> Viewer
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    // Viewer
    tasks.spawn({
        let transition = cfg.transition.clone();
        let cancel = cancel.clone();
        async move {
            viewer::run(sink_rx, transition, cancel)
                .await
                .context("viewer task failed")
        }
    });

    // Scheduler
    let sink = ChannelSink::new(sink_tx);
    match now_override {
        Some(origin) => {
            tracing::info!(%origin, "wall clock overridden");
            spawn_scheduler(&mut tasks, &cfg, repo, sink, OffsetClock::starting_at(origin), &cancel);
        }
        None => spawn_scheduler(&mut tasks, &cfg, repo, sink, LocalClock, &cancel),
    }

    // Drain JoinSet; the first task to finish takes the rest down with it.
    while let Some(res) = tasks.join_next().await {
        cancel.cancel();
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}

fn spawn_scheduler<C: Clock + 'static>(
    tasks: &mut JoinSet<Result<()>>,
    cfg: &Configuration,
    repo: JsonFileRepository,
    sink: ChannelSink,
    clock: C,
    cancel: &CancellationToken,
) {
    let options = cfg.rotation_options();
    let poll_interval = cfg.poll_interval;
    let cancel = cancel.clone();
    tasks.spawn(async move {
        scheduler::run(repo, sink, clock, options, poll_interval, cancel)
            .await
            .context("scheduler task failed")
    });
}

fn print_playlist(cfg: &Configuration, repo: &JsonFileRepository, at: NaiveDateTime) {
    let snapshot = repo.get();
    println!(
        "# playlist dry run\n# repository: {}\n# now: {}\n# records: {}\n",
        repo.path().display(),
        at.format("%Y-%m-%d %H:%M:%S (%a)"),
        snapshot.len()
    );

    if snapshot.is_empty() {
        println!("(no images stored; the display would show the no-data notice)");
        return;
    }

    println!("# eligibility:");
    for image in &snapshot {
        match image.ineligibility(at) {
            None => println!("  {:>4}  eligible", image.id),
            Some(reason) => println!("  {:>4}  skipped: {reason}", image.id),
        }
    }

    let playlist = Playlist::build(&snapshot, at, cfg.min_duration);
    println!("\n# playlist order:");
    if playlist.is_empty() {
        println!("(nothing in window; the display would show the placeholder)");
    } else {
        for (idx, entry) in playlist.entries().iter().enumerate() {
            println!(
                "  {:>4}: #{} {} ({}s)",
                idx + 1,
                entry.image.id,
                entry.image.url,
                entry.duration.as_secs()
            );
        }
    }
}

fn manage_images(repo: &JsonFileRepository, command: ImagesCommand) -> Result<()> {
    match command {
        ImagesCommand::List => {
            let images = catalog::list(repo).context("failed to read image collection")?;
            if images.is_empty() {
                println!("(no images stored in {})", repo.path().display());
            }
            for image in &images {
                println!("{}", describe(image));
            }
        }
        ImagesCommand::Add(fields) => {
            let mut base = ImageDraft::default();
            if fields.days.is_none() && fields.every_day.is_none() {
                base.every_day = true;
            }
            let image = catalog::add(repo, fields.apply_to(base)).context("failed to add image")?;
            println!("added {}", describe(&image));
        }
        ImagesCommand::Update { id, fields } => {
            let existing = catalog::list(repo)
                .context("failed to read image collection")?
                .into_iter()
                .find(|image| image.id == id)
                .with_context(|| format!("no image with id {id}"))?;
            let draft = fields.apply_to(ImageDraft::from_image(&existing));
            let image = catalog::update(repo, id, draft)
                .with_context(|| format!("failed to update image {id}"))?;
            println!("updated {}", describe(&image));
        }
        ImagesCommand::Remove { id } => {
            let image = catalog::remove(repo, id)
                .with_context(|| format!("failed to remove image {id}"))?;
            println!("removed {}", describe(&image));
        }
    }
    Ok(())
}

fn describe(image: &Image) -> String {
    let schedule = &image.display_schedule;
    let days = if schedule.every_day {
        "every day".to_string()
    } else if schedule.repeat_days.is_empty() {
        "no days".to_string()
    } else {
        schedule
            .repeat_days
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };
    let expiry = image
        .expiry_date
        .as_ref()
        .map_or_else(|| "never".to_string(), ToString::to_string);
    format!(
        "#{:<4} {}-{}  {:<20} {:>4}s  expires {:<10}  {}",
        image.id, schedule.start_time, schedule.end_time, days, schedule.duration_sec, expiry, image.url
    )
}
