//! Interactive configuration dialogue.

use std::path::Path;

use inquire::{Confirm, Password, Select, Text};
use reqwest::Client;

use offer_monitor::{BarkNotifier, Notifier};
use ucas_client::auth;

use crate::config::AppConfig;
use crate::error::{AppError, Result};

const METHOD_COOKIES: &str = "Paste session cookies";
const METHOD_CREDENTIALS: &str = "Sign in with username and password";

/// Make sure a usable session exists before monitoring starts, running
/// the setup dialogue when there is none (or the user wants a fresh one).
pub async fn ensure_session_ready(
    config: &mut AppConfig,
    path: &Path,
    client: &Client,
) -> Result<()> {
    if config.has_session() {
        let reuse = Confirm::new("A saved session exists. Use it?")
            .with_default(true)
            .prompt()?;
        if reuse {
            return Ok(());
        }
    }
    run_setup(config, path, client).await
}

pub async fn run_setup(config: &mut AppConfig, path: &Path, client: &Client) -> Result<()> {
    let method = Select::new(
        "How do you want to sign in?",
        vec![METHOD_COOKIES, METHOD_CREDENTIALS],
    )
    .prompt()?;

    if method == METHOD_COOKIES {
        let cookies = Text::new("Session cookies:").prompt()?;
        let cookies = cookies.trim();
        if cookies.is_empty() {
            return Err(AppError::InvalidInput("cookies must not be empty".into()));
        }
        config.cookies = Some(cookies.to_owned());
        config.username = None;
        config.password = None;
    } else {
        let username = Text::new("UCAS username:").prompt()?;
        let username = username.trim().to_owned();
        let password = Password::new("UCAS password:")
            .without_confirmation()
            .prompt()?;
        if username.is_empty() || password.is_empty() {
            return Err(AppError::InvalidInput(
                "username and password must not be empty".into(),
            ));
        }

        println!("Signing in...");
        let cookies = auth::login(client, &username, &password).await?;
        println!("Sign-in succeeded.");

        config.cookies = Some(cookies);
        config.username = Some(username);
        config.password = Some(password);
    }

    let bark_key = Text::new("Bark push key (leave empty to skip):").prompt()?;
    let bark_key = bark_key.trim();
    config.bark_key = (!bark_key.is_empty()).then(|| bark_key.to_owned());

    config.save(path)?;
    println!("Configuration saved to {}", path.display());

    if let Some(key) = &config.bark_key
        && Confirm::new("Send a test notification?")
            .with_default(false)
            .prompt()?
    {
        let notifier = BarkNotifier::new(client.clone(), key.clone());
        if notifier
            .notify("Offerwatch configured", "Monitoring is ready to start.")
            .await
        {
            println!("Test notification sent.");
        } else {
            println!("Test notification failed; check the key.");
        }
    }

    Ok(())
}
