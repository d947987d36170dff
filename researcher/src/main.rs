//! Research agent CLI.
//!
//! Breaks a topic into subtopics, researches each with the model's web
//! search, saves one note per subtopic, and writes a synthesized report.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use researcher::chat::{run_chat, run_one};
use researcher::exit_codes;
use researcher::io::client::MoonshotClient;
use researcher::io::config::{
    CONFIG_FILE, ResearchPaths, ResearcherConfig, load_config, write_config,
};
use researcher::io::session_log::SessionLog;
use researcher::logging;
use researcher::pipeline::Pipeline;

#[derive(Parser)]
#[command(
    name = "researcher",
    version,
    about = "Topic decomposition, web-search research, and report synthesis"
)]
struct Cli {
    /// Workspace root holding `researcher.toml` and the output directories.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `researcher.toml` and create the output directories.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Research one topic and write its report.
    Run {
        /// Topic to research (words are joined with spaces).
        #[arg(required = true, num_args = 1..)]
        topic: Vec<String>,
    },
    /// Research topics interactively until `exit`.
    Chat,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Run { topic } => cmd_run(&cli.root, &topic.join(" ")),
        Command::Chat => cmd_chat(&cli.root),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let config_path = root.join(CONFIG_FILE);
    let cfg = if force || !config_path.exists() {
        let cfg = ResearcherConfig::default();
        write_config(&config_path, &cfg)?;
        println!("wrote {}", config_path.display());
        cfg
    } else {
        println!("kept existing {}", config_path.display());
        load_config(&config_path)?
    };
    let paths = cfg.paths(root);
    paths.create_all()?;
    println!("notes:   {}", paths.notes_dir.display());
    println!("reports: {}", paths.reports_dir.display());
    println!("logs:    {}", paths.logs_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, topic: &str) -> Result<i32> {
    let session = Session::open(root)?;
    let pipeline = Pipeline::new(&session.client, &session.config, &session.paths, &session.log);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match run_one(&pipeline, topic, session.config.preview_chars, &mut out) {
        Ok(outcome) => {
            writeln!(out, "\nNotes:")?;
            for note in &outcome.notes {
                writeln!(out, "  {}", note.path.display())?;
            }
            writeln!(out, "Report: {}", outcome.report.path.display())?;
            writeln!(out, "Session log: {}", session.log.transcript_path().display())?;
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("✗ {err}");
            eprintln!("Notes kept under: {}", session.paths.notes_dir.display());
            eprintln!("Session log: {}", session.log.transcript_path().display());
            Ok(exit_codes::for_error(&err))
        }
    }
}

fn cmd_chat(root: &Path) -> Result<i32> {
    let session = Session::open(root)?;
    let pipeline = Pipeline::new(&session.client, &session.config, &session.paths, &session.log);
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    let summary = run_chat(
        &pipeline,
        &session.log,
        session.config.preview_chars,
        stdin.lock(),
        stdout.lock(),
    )?;
    info!(
        completed = summary.completed,
        failed = summary.failed,
        "chat session ended"
    );
    Ok(exit_codes::OK)
}

/// Everything a pipeline needs for one CLI invocation.
struct Session {
    config: ResearcherConfig,
    paths: ResearchPaths,
    client: MoonshotClient,
    log: SessionLog,
}

impl Session {
    fn open(root: &Path) -> Result<Self> {
        load_dotenv(root);
        let config = load_config(&root.join(CONFIG_FILE))?;
        let api_key = config.api_key()?;
        let paths = config.paths(root);
        paths.create_all()?;
        let client = MoonshotClient::new(&config, api_key)?;
        let log = SessionLog::create(&paths.logs_dir, Local::now().naive_local())
            .context("create session log")?;
        debug!(
            model = %config.model,
            session = %log.dir().display(),
            "session opened"
        );
        Ok(Self {
            config,
            paths,
            client,
            log,
        })
    }
}

/// Load `.env` from the workspace root, else from the usual search path.
///
/// Variables already set in the environment win.
fn load_dotenv(root: &Path) {
    let local = root.join(".env");
    let loaded = if local.is_file() {
        dotenvy::from_path(&local).map(|_| local)
    } else {
        dotenvy::dotenv()
    };
    match loaded {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => eprintln!("warning: ignoring .env: {err}"),
    }
}
