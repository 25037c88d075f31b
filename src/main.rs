use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use duet::app::App;
use duet::config::Config;
use duet::events::{EventHandler, TICK_RATE};
use duet::{logging, tui};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "duet")]
#[command(version)]
#[command(about = "Chat with an LLM in the terminal, or watch two sessions talk to each other", long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Single chat with model, temperature, prompt and export controls (default)
    Chat,
    /// Two side-by-side chats that can converse with each other
    Dual {
        /// Start with "converse with self" switched on
        #[arg(long)]
        auto: bool,
        /// Seconds before a relayed reply is asked on the other side
        #[arg(long)]
        delay: Option<f32>,
    },
    /// Show the resolved configuration
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

/// Values that override the configuration file for this run
#[derive(Args)]
struct Overrides {
    /// Model name
    #[arg(long, global = true)]
    model: Option<String>,
    /// Sampling temperature (0-2)
    #[arg(long, global = true)]
    temperature: Option<f32>,
    /// Seconds between streaming UI updates (0-1)
    #[arg(long, global = true)]
    throttle: Option<f32>,
    /// System prompt sent before every conversation
    #[arg(long, global = true)]
    system_prompt: Option<String>,
    /// Directory exported conversations are written to
    #[arg(long, global = true)]
    export_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(model) = self.model {
            config.default_model = model;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(throttle) = self.throttle {
            config.throttle = throttle;
        }
        if let Some(prompt) = self.system_prompt {
            config.system_prompt = prompt;
        }
        if let Some(dir) = self.export_dir {
            config.export_dir = Some(dir);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    cli.overrides.apply(&mut config);

    let app = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Config { init } => {
            if init {
                config.save()?;
                println!("Wrote {}", config.config_path().display());
            }
            println!("{}", config.describe());
            return Ok(());
        }
        Commands::Chat => {
            logging::init(&config)?;
            App::single(config)?
        }
        Commands::Dual { auto, delay } => {
            if let Some(delay) = delay {
                config.auto_converse_delay = delay;
            }
            logging::init(&config)?;
            App::dual(config, auto)?
        }
    };

    run_tui(app).await
}

async fn run_tui(mut app: App) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init().context("Failed to set up the terminal")?;
    let mut events = EventHandler::new(TICK_RATE);

    let result = app.run(&mut terminal, &mut events).await;

    tui::restore()?;
    tracing::info!("duet exited");
    result
}
