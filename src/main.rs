use std::sync::Arc;

use dotenv::dotenv;
use futures::future::join_all;
use log::{LevelFilter, info, warn};
use slotwatch::{
    CheckLane, CheckerContext,
    history::CheckHistory,
    notifier::{LogSink, NotificationSink, outbox, run_delivery_lane},
    telegram::{TelegramBot, TelegramClient},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const OUTBOX_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let context = CheckerContext::new()?;
    let website = context.config.website;
    info!("Watching {} ({})", website.name, website.base_url);

    let cancel = CancellationToken::new();
    let history = Arc::new(Mutex::new(CheckHistory::new()));
    let (outbox, inbox) = outbox(OUTBOX_CAPACITY);

    let telegram = context
        .config
        .telegram_api_key
        .as_deref()
        .map(|api_key| Arc::new(TelegramClient::new(context.http_client.clone(), api_key)));
    let sink: Arc<dyn NotificationSink> = match &telegram {
        Some(client) => client.clone(),
        None => {
            warn!("TELEGRAM_API_KEY is not set, notifications only go to the log");
            Arc::new(LogSink)
        }
    };

    let mut handles = vec![tokio::spawn(run_delivery_lane(sink, inbox, cancel.clone()))];
    if let Some(client) = telegram {
        let bot = TelegramBot::new(client, history.clone(), outbox.clone());
        handles.push(tokio::spawn(bot.run(cancel.clone())));
    }
    let lane = CheckLane::new(
        website,
        context.availability_engine(),
        context.check_intervals(),
        history,
        outbox,
        context.config.telegram_chat_ids.clone(),
    );
    handles.push(tokio::spawn(lane.run(cancel.clone())));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    cancel.cancel();
    for joined in join_all(handles).await {
        if let Err(err) = joined {
            warn!("A lane ended abnormally: {err}");
        }
    }
    Ok(())
}
