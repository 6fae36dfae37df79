//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Hot reloading for definition scripts
#[derive(Parser)]
#[command(
    name = "hotreload",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reload definition scripts in place while they run",
    long_about = "Watch definition scripts and swap their functions and classes in place \
                  whenever the source changes, keeping every existing reference valid.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    #[command(about = "Set up .hotreload directory with default configuration")]
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Load a script and re-run its entry function after every reload
    #[command(
        about = "Load a definition script and keep it reloaded",
        after_help = "Examples:\n  hotreload run app.hr\n  hotreload run app.hr --entry start"
    )]
    Run {
        /// Definition script to load
        file: PathBuf,

        /// Function to call after each successful load (overrides config)
        #[arg(short, long)]
        entry: Option<String>,
    },

    /// Print settled file events for a directory
    #[command(about = "Show debounced file events under a directory")]
    Watch {
        /// Directory (or a file inside it) to watch
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,
}
