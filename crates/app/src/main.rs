mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bandhub_core::{
    AnnotationBackend, AssetId, AssetNotes, ClockOpener, Comment, CommentFilter, CommentId,
    Identity, MediaAsset, MemoryBackend, PlaybackState, ReviewSession, SessionError, Timecode,
    extract_peaks_from_file, ingest_file, load_store, save_store,
};
use clap::{Parser, Subcommand, ValueEnum};

use config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const READY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "bandhub", version, about = "Review media with time-anchored comments")]
struct Cli {
    /// Config file. Defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store file, overriding the config.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// User id to act as.
    #[arg(long, global = true)]
    user: Option<String>,

    /// Display name to act as.
    #[arg(long, global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the duration and peak envelope of an audio file as JSON
    Peaks {
        file: PathBuf,
        #[arg(long)]
        count: Option<usize>,
    },
    /// Register a media file in the store
    Ingest { file: PathBuf },
    /// List stored assets
    Assets,
    /// List the comments on an asset
    Comments {
        asset: String,
        #[arg(long, value_enum)]
        filter: Option<FilterArg>,
    },
    /// Add a comment, anchored at `--at` seconds on timeline media
    Comment {
        asset: String,
        text: String,
        #[arg(long, default_value_t = 0.0)]
        at: f64,
    },
    /// Reply to a comment
    Reply {
        asset: String,
        comment: String,
        text: String,
    },
    /// Mark a comment resolved, or unresolved with `--reopen`
    Resolve {
        asset: String,
        comment: String,
        #[arg(long)]
        reopen: bool,
    },
    /// Delete one of your own comments
    Delete { asset: String, comment: String },
    /// Show or replace lyrics and song structure
    Notes {
        asset: String,
        #[arg(long)]
        lyrics: Option<String>,
        #[arg(long)]
        structure: Option<String>,
    },
    /// Keep a local copy of an asset for offline playback
    Offline { asset: String, path: PathBuf },
    /// Play an asset for a while, reporting position and passed comments
    Play {
        asset: String,
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
        #[arg(long)]
        from: Option<f64>,
        #[arg(long)]
        rate: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Unresolved,
    Mine,
}

impl From<FilterArg> for CommentFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => CommentFilter::All,
            FilterArg::Unresolved => CommentFilter::Unresolved,
            FilterArg::Mine => CommentFilter::Mine,
        }
    }
}

struct Workspace {
    config: Config,
    config_path: Option<PathBuf>,
    store_path: PathBuf,
    backend: MemoryBackend,
    identity: Identity,
}

impl Workspace {
    fn open(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref());
        let store_path = cli
            .store
            .clone()
            .or_else(|| config.store.clone())
            .or_else(Config::default_store_path)
            .context("no data directory for the store")?;
        let backend = load_store(&store_path)
            .with_context(|| format!("failed to load {}", store_path.display()))?;
        let identity = config.identity(cli.user.clone(), cli.name.clone());

        log::debug!("store {} as {}", store_path.display(), identity.uid);
        Ok(Self {
            config,
            config_path: cli.config.clone(),
            store_path,
            backend,
            identity,
        })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        save_store(&self.store_path, &self.backend)
            .with_context(|| format!("failed to save {}", self.store_path.display()))
    }

    /// A session with `asset` loaded and its first comment snapshot applied. Media that
    /// cannot be played still leaves the comments reachable.
    fn session(&self, asset: &AssetId) -> Result<ReviewSession> {
        let mut session = ReviewSession::new(
            Arc::new(self.backend.clone()),
            ClockOpener::default(),
            self.identity.clone(),
            self.config.cache_status(),
            self.config.review.clone(),
        );
        match session.load_asset(asset) {
            Ok(()) => {}
            Err(SessionError::Playback(e)) => log::warn!("{e}"),
            Err(e) => return Err(e.into()),
        }
        session.poll();
        Ok(session)
    }
}

/// Poll until the media source reports its duration.
fn wait_until_ready(session: &mut ReviewSession) {
    let deadline = Instant::now() + READY_TIMEOUT;
    while session.engine().state() == PlaybackState::Loading && Instant::now() < deadline {
        session.poll();
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn print_comment(comment: &Comment, session: &ReviewSession) {
    let anchor = comment
        .timestamp
        .map(|t| Timecode(t).to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let state = if comment.resolved { "x" } else { " " };
    let mine = if session.can_delete(comment) { "*" } else { "" };
    println!(
        "[{state}] {anchor}  {}{mine}  {}: {}",
        comment.id, comment.author.name, comment.text
    );
    if let Some(created) = comment.created_at {
        println!("          {}", created.format("%Y-%m-%d %H:%M"));
    }
    for reply in &comment.replies {
        println!("          > {}: {}", reply.author, reply.text);
    }
}

fn print_asset(asset: &MediaAsset) {
    let duration = asset
        .duration
        .map(|d| Timecode(d).to_string())
        .unwrap_or_else(|| "--:--".to_string());
    println!(
        "{}  {:<6} {duration}  {:>3} comments  {}",
        asset.id, asset.kind, asset.comment_count, asset.name
    );
}

fn peaks(file: &Path, count: usize) -> Result<()> {
    let extraction = extract_peaks_from_file(file, count, &AtomicBool::new(false))
        .with_context(|| format!("failed to read {}", file.display()))?;
    let peaks: Vec<f32> = extraction.envelope.into();
    let output = serde_json::json!({
        "duration": extraction.duration_secs,
        "peaks": peaks,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn play(
    ws: &Workspace,
    asset: &AssetId,
    seconds: f64,
    from: Option<f64>,
    rate: Option<f64>,
) -> Result<()> {
    let mut session = ws.session(asset)?;
    if session.engine().url().is_none() {
        anyhow::bail!("{asset} cannot be played here");
    }
    wait_until_ready(&mut session);

    if let Some(from) = from {
        session.engine_mut().seek_to(from);
    }
    if let Some(rate) = rate {
        session.engine_mut().set_playback_rate(rate);
    }
    session.engine_mut().play();

    let mut passed = session.engine().current_time();
    let mut last_report = Instant::now();
    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    while Instant::now() < deadline {
        let changes = session.poll();
        if let Some(position) = changes.position {
            let reached = session
                .regions()
                .iter()
                .filter(|r| r.start > passed && r.start <= position)
                .map(|r| r.comment.clone())
                .collect::<Vec<_>>();
            for comment in session.visible_comments() {
                if reached.contains(&comment.id) {
                    print_comment(comment, &session);
                }
            }
            passed = position;
            if last_report.elapsed() >= Duration::from_millis(250) {
                println!("{}", Timecode(position).precise());
                last_report = Instant::now();
            }
        }
        if session.engine().state() == PlaybackState::Ended {
            println!("ended at {}", Timecode(session.engine().duration()));
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    session.engine_mut().pause();
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Peaks { file, count } = &cli.command {
        let count =
            count.unwrap_or_else(|| Config::load(cli.config.as_deref()).review.peak_count);
        return peaks(file, count);
    }

    let mut ws = Workspace::open(&cli)?;

    match cli.command {
        Command::Peaks { .. } => {}
        Command::Ingest { file } => {
            let id = ingest_file(&ws.backend, &file, &ws.identity, ws.config.review.peak_count)?;
            ws.save()?;
            println!("{id}");
        }
        Command::Assets => {
            for id in ws.backend.asset_ids() {
                print_asset(&ws.backend.asset(&id)?);
            }
        }
        Command::Comments { asset, filter } => {
            let mut session = ws.session(&AssetId::from(asset.as_str()))?;
            if let Some(filter) = filter {
                session.set_filter(filter.into());
            }
            let visible = session.visible_comments();
            if visible.is_empty() {
                println!("{}", session.empty_message());
            }
            for comment in visible {
                print_comment(comment, &session);
            }
        }
        Command::Comment { asset, text, at } => {
            let mut session = ws.session(&AssetId::from(asset.as_str()))?;
            let seekable = session.asset().is_some_and(MediaAsset::is_seekable);
            if seekable {
                wait_until_ready(&mut session);
                session.engine_mut().seek_to(at);
                session
                    .request_comment_at_playhead()
                    .context("media is not playable here, so the comment cannot be anchored")?;
            } else {
                session.request_comment()?;
            }
            let id = session.add_comment(&text)?;
            ws.save()?;
            println!("{id}");
        }
        Command::Reply {
            asset,
            comment,
            text,
        } => {
            let mut session = ws.session(&AssetId::from(asset.as_str()))?;
            session.reply_to_comment(&CommentId::from(comment.as_str()), &text)?;
            ws.save()?;
        }
        Command::Resolve {
            asset,
            comment,
            reopen,
        } => {
            let mut session = ws.session(&AssetId::from(asset.as_str()))?;
            session.resolve_comment(&CommentId::from(comment.as_str()), !reopen)?;
            ws.save()?;
        }
        Command::Delete { asset, comment } => {
            let mut session = ws.session(&AssetId::from(asset.as_str()))?;
            session.delete_comment(&CommentId::from(comment.as_str()))?;
            ws.save()?;
        }
        Command::Notes {
            asset,
            lyrics,
            structure,
        } => {
            let id = AssetId::from(asset.as_str());
            if lyrics.is_none() && structure.is_none() {
                let notes = ws.backend.asset(&id)?.notes;
                println!("{}", notes.lyrics.unwrap_or_default());
                println!("{}", notes.song_structure.unwrap_or_default());
            } else {
                let notes = AssetNotes {
                    lyrics,
                    song_structure: structure,
                };
                ws.backend.update_asset_notes(&id, notes, &ws.identity.uid)?;
                ws.save()?;
            }
        }
        Command::Offline { asset, path } => {
            let id = AssetId::from(asset.as_str());
            ws.backend.asset(&id)?;
            let path = std::path::absolute(&path)?;
            ws.config.saved.insert(id.to_string(), path);
            ws.config.save(ws.config_path.as_deref())?;
        }
        Command::Play {
            asset,
            seconds,
            from,
            rate,
        } => play(&ws, &AssetId::from(asset.as_str()), seconds, from, rate)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    run(Cli::parse())
}
