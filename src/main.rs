use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meter_lookup_bot::access::{AccessResolver, ROSTER_SHEET};
use meter_lookup_bot::bot::{self, Conversation};
use meter_lookup_bot::cache::SheetCache;
use meter_lookup_bot::config::BotConfig;
use meter_lookup_bot::fiber::{FiberDirectory, FIBER_SHEET};
use meter_lookup_bot::keepalive;
use meter_lookup_bot::lookup::RecordLookup;
use meter_lookup_bot::request_log::RequestLog;
use meter_lookup_bot::server::{self, ServerState};
use meter_lookup_bot::session::{self, InMemorySessionStore, SessionStore};
use meter_lookup_bot::sheet::{HttpSheetSource, SheetSource};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_logging();

    info!("Starting Meter Lookup Telegram Bot");

    let config = BotConfig::from_env()?;
    if config.region_sheets.is_empty() {
        warn!("REGION_SHEETS_MAP is empty, every meter lookup will miss");
    }

    let source: Arc<dyn SheetSource> = Arc::new(HttpSheetSource::new(config.fetch_timeout)?);

    let datasets = Arc::new(SheetCache::new(
        "datasets",
        config.region_sheets.clone(),
        Arc::clone(&source),
    ));
    let roster = Arc::new(SheetCache::new(
        "roster",
        vec![(ROSTER_SHEET.to_string(), config.roster_url.clone())],
        Arc::clone(&source),
    ));
    let fiber_cache = config.fiber_sheet_url.as_ref().map(|url| {
        Arc::new(SheetCache::new(
            "fiber",
            vec![(FIBER_SHEET.to_string(), url.clone())],
            Arc::clone(&source),
        ))
    });

    // Warm the caches; failures are retried lazily on first use
    let loaded = datasets.refresh().await;
    info!(loaded, total = config.region_sheets.len(), "Region datasets warmed up");
    roster.refresh().await;
    if let Some(cache) = &fiber_cache {
        cache.refresh().await;
    }

    if !config.dataset_refresh.is_zero() {
        Arc::clone(&datasets).spawn_refresh(config.dataset_refresh);
        if let Some(cache) = &fiber_cache {
            Arc::clone(cache).spawn_refresh(config.dataset_refresh);
        }
    }
    if !config.roster_refresh.is_zero() {
        Arc::clone(&roster).spawn_refresh(config.roster_refresh);
    }

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(config.session_ttl));
    session::spawn_purge(Arc::clone(&sessions), config.session_ttl);

    let request_log = match &config.request_log_path {
        Some(path) => Some(Arc::new(
            RequestLog::open(path).with_context(|| format!("Failed to open request log {path}"))?,
        )),
        None => None,
    };

    let access = Arc::new(AccessResolver::new(
        roster,
        config.roster_schema.clone(),
        config.allowed_user_ids.clone(),
    ));
    let lookup = Arc::new(RecordLookup::new(datasets, config.meter_column.clone()));

    let mut conversation = Conversation::new(sessions, access, lookup)
        .with_help_images(config.help_images.clone())
        .with_inline_categories(config.inline_categories);
    if let Some(cache) = fiber_cache {
        conversation = conversation.with_fiber(Arc::new(FiberDirectory::new(
            cache,
            config.fiber_schema.clone(),
        )));
    }
    if let Some(log) = &request_log {
        conversation = conversation.with_request_log(Arc::clone(log));
    }
    let conversation = Arc::new(conversation);

    let bot = Bot::new(config.bot_token.clone());

    match config.webhook_url() {
        Some(url) => {
            let url = reqwest::Url::parse(&url).with_context(|| format!("Invalid SELF_URL {url}"))?;
            bot.set_webhook(url.clone()).await?;
            info!(url = %url, "Webhook registered");

            if let (Some(every), Some(base)) = (config.keepalive, config.self_url.clone()) {
                keepalive::spawn(reqwest::Client::new(), base, every);
            }

            let state = ServerState {
                bot,
                conversation,
                request_log,
            };
            server::serve(&config.bind_addr, config.port, state).await?;
        }
        None => {
            bot.delete_webhook().await?;
            info!("SELF_URL not set, starting long polling dispatcher");

            let handler = dptree::entry()
                .branch(Update::filter_message().endpoint({
                    let conversation = Arc::clone(&conversation);
                    move |bot: Bot, msg: Message| {
                        let conversation = Arc::clone(&conversation);
                        async move { bot::message_handler(bot, msg, conversation).await }
                    }
                }))
                .branch(Update::filter_callback_query().endpoint({
                    let conversation = Arc::clone(&conversation);
                    move |bot: Bot, q: CallbackQuery| {
                        let conversation = Arc::clone(&conversation);
                        async move { bot::callback_handler(bot, q, conversation).await }
                    }
                }));

            Dispatcher::builder(bot, handler)
                .enable_ctrlc_handler()
                .build()
                .dispatch()
                .await;
        }
    }

    Ok(())
}
