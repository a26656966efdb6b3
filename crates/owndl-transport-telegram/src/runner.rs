use crate::bot;
use crate::bot::handlers::Command;
use crate::bot::TelegramDelivery;
use crate::config::{BotSettings, TelegramSettings, LOCAL_SERVER_TIMEOUT};
use owndl_core::assembly::MediaAssembler;
use owndl_core::config::{DeliveryLimits, RelaySettings};
use owndl_core::delivery::ChatDelivery;
use owndl_core::dispatch::DispatchRouter;
use owndl_core::handler::ResponseHandler;
use owndl_core::janitor::{Janitor, JanitorHandle};
use owndl_core::preferences::{JsonPreferenceStore, PreferenceStore};
use owndl_core::registry::ConnectionRegistry;
use owndl_core::server::RelayServer;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let (bot, local_backend) = select_backend(&settings.telegram).await;

    let preferences = init_preferences(&settings.relay);
    let registry = Arc::new(ConnectionRegistry::new());
    let delivery: Arc<dyn ChatDelivery> = Arc::new(TelegramDelivery::new(bot.clone()));
    let assembler = Arc::new(MediaAssembler::new(
        Arc::clone(&delivery),
        Arc::clone(&preferences),
        DeliveryLimits::default(),
        local_backend,
    ));
    let response_handler = Arc::new(ResponseHandler::new(
        Arc::clone(&registry),
        assembler,
        delivery,
    ));
    let router = Arc::new(DispatchRouter::new(Arc::clone(&registry)));

    let shutdown = CancellationToken::new();
    let server = match RelayServer::bind(settings.relay.bind_addr(), registry, response_handler)
        .await
    {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind relay server on {}: {}", settings.relay.bind_addr(), e);
            std::process::exit(1);
        }
    };
    let server_task = tokio::spawn(server.run(shutdown.clone()));
    let janitor = init_janitor(&settings.relay);

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![preferences, router])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Shutting down relay...");
    shutdown.cancel();
    if let Err(e) = server_task.await {
        error!("Relay server task failed: {}", e);
    }
    if let Some(janitor) = janitor {
        janitor.stop().await;
    }
}

/// Picks the local Bot API server when it answers, the official API otherwise.
///
/// The boolean tells whether the local server is in use.
async fn select_backend(telegram: &TelegramSettings) -> (Bot, bool) {
    let token = telegram.telegram_bot_token.clone();

    if let Some(bot) = connect_local_server(&token, &telegram.local_api_url()).await {
        return (bot, true);
    }

    let bot = Bot::new(token);
    match bot.get_me().await {
        Ok(me) => {
            info!("Connected to the official Bot API as @{}", me.username());
            (bot, false)
        }
        Err(e) => {
            error!("Failed to reach the Telegram Bot API: {}", e);
            std::process::exit(1);
        }
    }
}

async fn connect_local_server(token: &str, url: &str) -> Option<Bot> {
    let api_url = match reqwest::Url::parse(url) {
        Ok(api_url) => api_url,
        Err(e) => {
            warn!("Invalid local Bot API URL {}: {}", url, e);
            return None;
        }
    };

    let bot = Bot::new(token).set_api_url(api_url);
    match tokio::time::timeout(LOCAL_SERVER_TIMEOUT, bot.get_me()).await {
        Ok(Ok(me)) => {
            info!("Connected to local Bot API server at {} as @{}", url, me.username());
            Some(bot)
        }
        Ok(Err(e)) => {
            info!("Local Bot API server unavailable ({}), using the official API", e);
            None
        }
        Err(_) => {
            info!("Local Bot API server at {} timed out, using the official API", url);
            None
        }
    }
}

fn init_preferences(relay: &RelaySettings) -> Arc<dyn PreferenceStore> {
    let store = JsonPreferenceStore::new(relay.settings_file.clone());
    info!("Preference store initialized at {}", store.path().display());
    Arc::new(store)
}

fn init_janitor(relay: &RelaySettings) -> Option<JanitorHandle> {
    let Some(dir) = relay.download_folder.clone() else {
        info!("DOWNLOAD_FOLDER not set, stale file cleanup disabled");
        return None;
    };

    info!(
        "Starting stale file cleanup in {} (timeout: {}s, interval: {}s)",
        dir.display(),
        relay.stale_file_timeout_secs,
        relay.cleanup_interval_secs
    );
    Some(Janitor::new(dir, relay.stale_after(), relay.cleanup_interval()).spawn())
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some() || msg.caption().is_some())
                .endpoint(handle_link_message),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    preferences: Arc<dyn PreferenceStore>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Changeview => bot::handlers::change_view(bot, msg, preferences).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_link_message(
    msg: Message,
    router: Arc<DispatchRouter>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_text(msg, router).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}
