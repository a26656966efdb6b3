use dotenvy::dotenv;
use owndl_core::config::RelaySettings;
use owndl_transport_telegram::config::{BotSettings, TelegramSettings};
use owndl_transport_telegram::runner::run_bot;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Telegram bot token shapes and their masked form, applied in order.
const TOKEN_RULES: [(&str, &str); 3] = [
    // Bot API request URLs: https://host/bot<token>/method
    (r"(https?://[^/\s]+/bot)[0-9]+:[A-Za-z0-9_-]+", "${1}[TELEGRAM_TOKEN]"),
    // Bare tokens
    (r"\b[0-9]{8,10}:[A-Za-z0-9_-]{35}\b", "[TELEGRAM_TOKEN]"),
    // "bot<id>:<secret>" fragments without a scheme
    (r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+", "${1}[TELEGRAM_TOKEN]"),
];

/// Compiled [`TOKEN_RULES`].
struct TokenMask {
    rules: Vec<(Regex, &'static str)>,
}

impl TokenMask {
    fn compile() -> Result<Self, regex::Error> {
        let rules = TOKEN_RULES
            .iter()
            .map(|&(pattern, replacement)| Regex::new(pattern).map(|regex| (regex, replacement)))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    fn mask(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, (regex, replacement)| {
                regex.replace_all(&acc, *replacement).into_owned()
            })
    }
}

/// Buffers one formatted event and writes it masked when flushed or dropped,
/// so a token split across several `write` calls is still caught.
struct MaskedEvent<W: Write> {
    inner: W,
    mask: Arc<TokenMask>,
    buf: Vec<u8>,
}

impl<W: Write> Write for MaskedEvent<W> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let masked = self.mask.mask(&String::from_utf8_lossy(&self.buf));
            self.buf.clear();
            self.inner.write_all(masked.as_bytes())?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Drop for MaskedEvent<W> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// `MakeWriter` handing out masked stderr writers.
struct MaskedStderr(Arc<TokenMask>);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MaskedStderr {
    type Writer = MaskedEvent<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        MaskedEvent {
            inner: io::stderr(),
            mask: Arc::clone(&self.0),
            buf: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let mask = TokenMask::compile().map_err(|e| {
        eprintln!("Failed to compile token masks: {e}");
        e
    })?;
    init_logging(Arc::new(mask));

    info!("Starting OwnDownloader TG Bot...");

    let settings = init_settings();
    run_bot(settings).await;

    Ok(())
}

fn init_logging(mask: Arc<TokenMask>) {
    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let default_directives = if debug_mode {
        "debug"
    } else {
        "owndl_core=info,owndl_transport_telegram=info,owndl_telegram_bot=info,hyper=warn,h2=error,reqwest=warn,tokio=warn,tower=warn,tungstenite=warn,tokio_tungstenite=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(MaskedStderr(mask)))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let relay_settings = match RelaySettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load relay configuration: {}", e);
            std::process::exit(1);
        }
    };
    let telegram_settings = match TelegramSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load telegram configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration loaded successfully.");
    Arc::new(BotSettings::new(relay_settings, telegram_settings))
}
