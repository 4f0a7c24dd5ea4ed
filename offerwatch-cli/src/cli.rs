use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "offerwatch", version, about = "UCAS offer monitor with push notifications")]
pub struct Args {
    /// Path to the config file (defaults to the user config directory).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Poll the offer count and push a notification on change.
    Watch {
        /// Seconds between polls.
        #[arg(long, default_value_t = 60)]
        interval: u64,

        /// Consecutive re-login attempts before giving up.
        #[arg(long, default_value_t = 2)]
        max_login_retries: u32,
    },

    /// Interactively configure sign-in and push settings.
    Setup,

    /// Fetch and print the current offer count once.
    Status,

    /// Send a test notification through the configured push sink.
    Notify {
        /// Message body.
        #[arg(default_value = "Offerwatch test notification")]
        message: String,
    },
}
