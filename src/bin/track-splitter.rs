use clap::{Parser, Subcommand};
use std::{path::PathBuf, process};
use track_splitter_core::{
    download_file_name, ensure_tool, load_stems,
    job::LockState,
    set_download_progress_callback, set_split_progress_callback, CommandFetcher, JobLock,
    JobStatus, Library, Registry, SeparationRunner, SplitProgress, SplitterConfig, StemCatalog,
    StemLookup,
};

#[derive(Parser)]
#[command(name = "track-splitter")]
#[command(about = "Split songs into stems and inspect the results", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON config file; TRACK_SPLITTER_* variables override it
    #[arg(short, long, global = true, env = "TRACK_SPLITTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Separate a song from the library (skipped when all stems are cached)
    Split {
        #[arg(short, long)]
        song: String,

        #[arg(short, long, default_value = "")]
        model: String,

        /// Do not install the decoding tool before running
        #[arg(long)]
        no_tool: bool,

        #[arg(short, long)]
        quiet: bool,
    },

    /// Show whether a song's stems are ready
    Stems {
        #[arg(short, long)]
        song: String,

        #[arg(short, long, default_value = "")]
        model: String,
    },

    /// Load cached stems into the player and report their durations
    Durations {
        #[arg(short, long)]
        song: String,

        #[arg(short, long, default_value = "")]
        model: String,
    },

    /// List songs in the input directory
    Songs,

    /// Copy a local file into the input directory
    Upload { path: PathBuf },

    /// Download a song from a URL into the input directory
    Fetch {
        url: String,

        #[arg(long, default_value = "yt-dlp")]
        downloader: PathBuf,
    },

    /// Install the decoding tool
    PrepareTool {
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the separation lock
    LockStatus,

    /// List available models
    List,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = load_config(cli.config).and_then(|cfg| match cli.command {
        Commands::Split {
            song,
            model,
            no_tool,
            quiet,
        } => handle_split(&cfg, &song, &model, no_tool, quiet),
        Commands::Stems { song, model } => handle_stems(&cfg, &song, &model),
        Commands::Durations { song, model } => handle_durations(&cfg, &song, &model),
        Commands::Songs => handle_songs(&cfg),
        Commands::Upload { path } => handle_upload(&cfg, path),
        Commands::Fetch { url, downloader } => handle_fetch(&cfg, &url, downloader),
        Commands::PrepareTool { quiet } => handle_prepare(&cfg, quiet),
        Commands::LockStatus => handle_lock_status(&cfg),
        Commands::List => handle_list(),
    });

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

type CliResult = Result<i32, Box<dyn std::error::Error>>;

fn load_config(path: Option<PathBuf>) -> Result<SplitterConfig, Box<dyn std::error::Error>> {
    let cfg = match path {
        Some(p) => SplitterConfig::load(&p)?,
        None => SplitterConfig::from_env()?,
    };
    Ok(cfg)
}

fn handle_split(cfg: &SplitterConfig, song: &str, model: &str, no_tool: bool, quiet: bool) -> CliResult {
    let model = Registry::builtin()?.resolve(model)?;
    let song = Library::new(&cfg.input_dir).song(song)?;
    let catalog = StemCatalog::new(cfg.layout());

    if catalog.is_complete(&song.file_name, model) {
        eprintln!("✅ {} already separated with {}", song.id, model.name);
        return Ok(0);
    }

    if !quiet {
        setup_progress_callbacks();
    }

    let mut runner = SeparationRunner::from_config(cfg);
    if !no_tool {
        runner = runner.with_tool(ensure_tool(&cfg.tool)?);
    }

    if !quiet {
        eprintln!("🎵 Track Splitter");
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("Song:   {}", song.file_name);
        eprintln!("Output: {}", cfg.output_dir.display());
        eprintln!("Model:  {}", model.label());
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!();
    }

    match runner.run(&song.path, model)? {
        JobStatus::Busy { lock_age } => {
            eprintln!(
                "⏳ Another separation is running ({:.0}s). Please wait a moment before trying again.",
                lock_age.as_secs_f64()
            );
            Ok(2)
        }
        JobStatus::Completed(report) => {
            if quiet {
                for p in &report.stems {
                    println!("{}", p.display());
                }
            } else {
                eprintln!();
                eprintln!(
                    "✅ Split completed in {:.2}s",
                    report.elapsed.as_secs_f64()
                );
                eprintln!();
                eprintln!("Output files:");
                for p in &report.stems {
                    eprintln!("  {}", p.display());
                }
            }
            Ok(0)
        }
    }
}

fn handle_stems(cfg: &SplitterConfig, song: &str, model: &str) -> CliResult {
    let model = Registry::builtin()?.resolve(model)?;
    let catalog = StemCatalog::new(cfg.layout());
    match catalog.resolve(song, model)? {
        StemLookup::Ready(set) => {
            for stem in set.iter() {
                println!(
                    "{:<8} {:>10} bytes  {}  (download as \"{}\")",
                    stem.name,
                    stem.bytes.len(),
                    stem.path.display(),
                    download_file_name(song, &stem.name)
                );
            }
            Ok(0)
        }
        StemLookup::Missing { absent } => {
            eprintln!("Missing stems: {}. Run `track-splitter split` first.", absent.join(", "));
            Ok(3)
        }
    }
}

fn handle_durations(cfg: &SplitterConfig, song: &str, model: &str) -> CliResult {
    let model = Registry::builtin()?.resolve(model)?;
    let set = match StemCatalog::new(cfg.layout()).resolve(song, model)? {
        StemLookup::Ready(set) => set,
        StemLookup::Missing { absent } => {
            eprintln!("Missing stems: {}", absent.join(", "));
            return Ok(3);
        }
    };

    let player = load_stems(&set);
    for name in player.track_names() {
        println!("{:<8} {:?}", name, player.track_state(name));
    }
    match player.check_ready() {
        Ok(_) => {
            println!("session  {}", player.transport().time_label());
            Ok(0)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(4)
        }
    }
}

fn handle_songs(cfg: &SplitterConfig) -> CliResult {
    for song in Library::new(&cfg.input_dir).list_songs()? {
        println!("{}", song.file_name);
    }
    Ok(0)
}

fn handle_upload(cfg: &SplitterConfig, path: PathBuf) -> CliResult {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("not a file: {}", path.display()))?;
    let bytes = std::fs::read(&path)?;
    let song = Library::new(&cfg.input_dir).save_upload(&name, &bytes)?;
    println!("{}", song.path.display());
    Ok(0)
}

fn handle_fetch(cfg: &SplitterConfig, url: &str, downloader: PathBuf) -> CliResult {
    let song = Library::new(&cfg.input_dir).fetch(&CommandFetcher::new(downloader), url)?;
    eprintln!("✅ Download complete!");
    println!("{}", song.file_name);
    Ok(0)
}

fn handle_prepare(cfg: &SplitterConfig, quiet: bool) -> CliResult {
    if !quiet {
        eprintln!("📦 Preparing {}", cfg.tool.binary_name);
        set_download_progress_callback(print_download_progress);
    }

    let tool = ensure_tool(&cfg.tool)?;

    if !quiet {
        eprintln!("✅ Ready: {}", tool.executable.display());
    } else {
        println!("{}", tool.executable.display());
    }
    Ok(0)
}

fn handle_lock_status(cfg: &SplitterConfig) -> CliResult {
    let lock = JobLock::new(&cfg.lock_path, cfg.lock_timeout());
    match lock.inspect()? {
        LockState::Free => println!("free"),
        LockState::Held { acquired_at, age } => {
            println!("held since {acquired_at} ({:.0}s)", age.as_secs_f64())
        }
        LockState::Stale { acquired_at, age } => println!(
            "stale since {acquired_at} ({:.0}s, will be reclaimed)",
            age.as_secs_f64()
        ),
    }
    Ok(0)
}

fn handle_list() -> CliResult {
    let registry = Registry::builtin()?;

    eprintln!("📋 Available Models");
    eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for model in &registry.models {
        let marker = if model.name == registry.default {
            " (default)"
        } else {
            ""
        };
        eprintln!("  • {}{} - {}", model.name, marker, model.label());
    }

    eprintln!();
    eprintln!("Use --model <name> to specify a model");

    Ok(0)
}

fn print_download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let percent = (downloaded as f64 / total as f64 * 100.0).round() as u64;
        let downloaded_mb = downloaded as f64 / 1_000_000.0;
        let total_mb = total as f64 / 1_000_000.0;
        eprint!(
            "\r📥 Downloading: {:>3}% ({:.2} MB / {:.2} MB)",
            percent, downloaded_mb, total_mb
        );
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\r📥 Downloading: {:.2} MB", downloaded as f64 / 1_000_000.0);
    }
}

fn setup_progress_callbacks() {
    set_download_progress_callback(print_download_progress);

    set_split_progress_callback(|progress| match progress {
        SplitProgress::Stage(stage) => {
            let stage_name = match *stage {
                "separate" => "Separating tracks",
                "write_stems" => "Writing stems",
                other => other,
            };
            eprintln!("⏳ {}", stage_name);
        }
        SplitProgress::Chunks(p) => {
            eprint!("\r🔄 {}", p.status_line());
            if p.is_complete() {
                eprintln!();
            }
        }
        SplitProgress::Finished => {}
    });
}
