use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use log::{info, warn};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use triage_kiosk::{
    app::App,
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    inference::{gemini::GeminiClient, InferenceClient},
    measurement::{MeasurementOrchestrator, MeasurementTiming},
    runtime::{event_channel, spawn_terminal_reader, EventSource, FixedTicker, Runner, Ticker},
    sensors::SensorManager,
    store::PatientStore,
    ui,
};

const TICK_RATE_MS: u64 = 100;

/// kiosk tui for symptom intake, vital signs and preliminary ai triage
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A kiosk TUI that walks a patient through a symptom questionnaire, measures temperature and pulse from attached sensors (or simulates them), asks a Gemini model for a preliminary triage and stores the result locally."
)]
pub struct Cli {
    /// path to the JSON config file
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// path to the patient database
    #[clap(long)]
    db: Option<PathBuf>,

    /// never probe hardware, simulate every reading
    #[clap(short = 's', long)]
    simulate: bool,

    /// Gemini API key
    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// write logs here instead of the state directory
    #[clap(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Command-line values take precedence over the config file
    fn apply(&self, mut config: Config) -> Config {
        if let Some(db) = &self.db {
            config.database_path = Some(db.clone());
        }
        if self.simulate {
            config.simulate_sensors = true;
        }
        if let Some(key) = &self.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(log) = &self.log_file {
            config.log_path = Some(log.clone());
        }
        config
    }
}

fn database_path(config: &Config) -> PathBuf {
    config
        .database_path
        .clone()
        .or_else(AppDirs::db_path)
        .unwrap_or_else(|| PathBuf::from("patients.db"))
}

/// The TUI owns stdout, so log records go to a file.
fn init_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config_store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let stored = config_store.load_or_create();
    let config = cli.apply(match &stored {
        Ok(cfg) => cfg.clone(),
        Err(_) => config_store.load(),
    });

    let log_path = config
        .log_path
        .clone()
        .or_else(AppDirs::log_path)
        .unwrap_or_else(|| PathBuf::from("triage-kiosk.log"));
    init_logging(&log_path)?;
    info!("triage kiosk starting, config at {}", config_store.path().display());
    if let Err(err) = &stored {
        warn!("could not write default config: {err}");
    }

    let store = PatientStore::open(database_path(&config))?;
    let sensors = SensorManager::from_config(&config);
    let orchestrator =
        MeasurementOrchestrator::new(Box::new(sensors), MeasurementTiming::default());
    if config.api_key.is_none() {
        warn!("no API key configured, analysis will fail until one is set");
    }
    let inference: Arc<dyn InferenceClient> =
        Arc::new(GeminiClient::new(config.api_key.clone(), config.models.clone()));

    let (tx, source) = event_channel();
    spawn_terminal_reader(tx.clone());
    let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(TICK_RATE_MS)));
    let mut app = App::new(orchestrator, inference, store, tx);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;
    info!("triage kiosk stopped");

    result
}

fn run_tui<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui::draw(app, f))?;
        app.handle_event(runner.step());
        if app.should_quit() {
            return Ok(());
        }
    }
}
