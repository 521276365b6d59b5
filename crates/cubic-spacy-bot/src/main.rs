mod config;
mod dispatch;
mod logging;
mod polling;
#[cfg(unix)]
mod socket;
mod webhook;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cubic_spacy_api::{BotClient, SetWebhook};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{Args, Config, Mode};
use crate::dispatch::Dispatcher;

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

fn cancel_on_signal(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => {
                tracing::info!("received exit signal");
                shutdown.cancel();
            }
            Err(err) => tracing::error!(error = %err, "failed to install signal handler"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::try_from(Args::parse())?;
    logging::init(&config.log)?;

    let client = BotClient::new(config.token.clone(), config.api_url.as_deref())
        .context("failed to create Telegram bot client")?;
    tracing::debug!(url = client.base_url(), mode = ?config.mode, "configured Telegram bot client");

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let Some(me) =
        polling::retry_until_ok(&shutdown, "get bot info", polling::STARTUP_RETRY_DELAY, || {
            client.get_me()
        })
        .await
        .context("Telegram rejected the bot token")?
    else {
        return Ok(());
    };

    let registration = SetWebhook {
        url: config.webhook_url().to_string(),
        secret_token: config.secret_token.clone(),
        allowed_updates: polling::allowed_updates(),
    };
    let registered =
        polling::retry_until_ok(&shutdown, "set webhook", polling::STARTUP_RETRY_DELAY, || {
            client.set_webhook(&registration)
        })
        .await
        .context("Telegram rejected the bot token")?;
    if registered.is_none() {
        return Ok(());
    }

    tracing::info!(
        username = me.username.as_deref().unwrap_or_default(),
        id = me.id,
        "started Telegram bot"
    );

    let dispatcher = Dispatcher::new(Arc::new(client.clone()), TaskTracker::new());
    run(&config, &client, &dispatcher, &shutdown).await?;
    dispatcher.drain().await;
    Ok(())
}

async fn run(
    config: &Config,
    client: &BotClient,
    dispatcher: &Dispatcher,
    shutdown: &CancellationToken,
) -> Result<()> {
    match &config.mode {
        Mode::Polling => {
            polling::run(client, dispatcher, shutdown).await;
            Ok(())
        }
        Mode::Webhook(webhook_config) => {
            let app = webhook::app(dispatcher.clone(), config.secret_token.clone());
            webhook::serve(webhook_config, app, shutdown.clone()).await
        }
    }
}
