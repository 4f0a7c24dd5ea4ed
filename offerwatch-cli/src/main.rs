mod cli;
mod config;
mod error;
mod setup;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use offer_monitor::{
    BarkNotifier, Credentials, Monitor, MonitorConfig, NoNotifier, Notifier, UcasAuthenticator,
};
use ucas_client::track::TrackClient;

use crate::cli::{Args, Commands};
use crate::config::{AppConfig, FileStore};
use crate::error::{AppError, Result};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let path = AppConfig::resolve_path(args.config.as_deref());
    let mut config = AppConfig::load(&path)?;
    let client = ucas_client::default_client();

    match args.command.unwrap_or(Commands::Watch {
        interval: 60,
        max_login_retries: 2,
    }) {
        Commands::Setup => {
            print_banner();
            setup::run_setup(&mut config, &path, &client).await?;
        }

        Commands::Status => {
            let cookies = config.cookies.clone().ok_or_else(|| {
                AppError::InvalidInput("no saved session; run `offerwatch setup` first".into())
            })?;
            let count = TrackClient::new(client.clone())
                .fetch_offer_count(&cookies)
                .await?;
            println!("Current offers: {count}");
        }

        Commands::Notify { message } => {
            if config.bark_key.is_none() {
                println!("No Bark key configured; nothing to send.");
            } else if notifier(&config, &client)
                .notify("Offerwatch test", &message)
                .await
            {
                println!("Notification sent.");
            } else {
                println!("Notification failed; check the key.");
            }
        }

        Commands::Watch {
            interval,
            max_login_retries,
        } => {
            print_banner();
            setup::ensure_session_ready(&mut config, &path, &client).await?;
            watch(config, path, client, interval, max_login_retries).await?;
        }
    }

    Ok(())
}

async fn watch(
    config: AppConfig,
    path: PathBuf,
    client: Client,
    interval: u64,
    max_login_retries: u32,
) -> Result<()> {
    let credentials = Credentials {
        cookies: config.cookies.clone().unwrap_or_default(),
        username: config.username.clone(),
        password: config.password.clone(),
    };

    let mut monitor = Monitor::new(
        TrackClient::new(client.clone()),
        UcasAuthenticator::new(client.clone()),
        notifier(&config, &client),
        FileStore::new(path),
        credentials,
        MonitorConfig {
            interval: Duration::from_secs(interval),
            max_login_retries,
        },
    );

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_token.cancel();
        }
    });

    info!(interval_secs = interval, "watching for offer changes (Ctrl-C to stop)");
    monitor.run(token).await?;
    Ok(())
}

fn notifier(config: &AppConfig, client: &Client) -> Box<dyn Notifier> {
    match &config.bark_key {
        Some(key) => Box::new(BarkNotifier::new(client.clone(), key.clone())),
        None => Box::new(NoNotifier),
    }
}

fn print_banner() {
    println!("========================================================================================");
    println!(" ██████╗ ███████╗███████╗███████╗██████╗ ██╗    ██╗ █████╗ ████████╗ ██████╗██╗  ██╗");
    println!("██╔═══██╗██╔════╝██╔════╝██╔════╝██╔══██╗██║    ██║██╔══██╗╚══██╔══╝██╔════╝██║  ██║");
    println!("██║   ██║█████╗  █████╗  █████╗  ██████╔╝██║ █╗ ██║███████║   ██║   ██║     ███████║");
    println!("██║   ██║██╔══╝  ██╔══╝  ██╔══╝  ██╔══██╗██║███╗██║██╔══██║   ██║   ██║     ██╔══██║");
    println!("╚██████╔╝██║     ██║     ███████╗██║  ██║╚███╔███╔╝██║  ██║   ██║   ╚██████╗██║  ██║");
    println!(" ╚═════╝ ╚═╝     ╚═╝     ╚══════╝╚═╝  ╚═╝ ╚══╝╚══╝ ╚═╝  ╚═╝   ╚═╝    ╚═════╝╚═╝  ╚═╝");
    println!();
    println!(
        "Offerwatch v{} - UCAS offer monitor with push notifications",
        env!("CARGO_PKG_VERSION")
    );
    println!("========================================================================================");
    println!();
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
