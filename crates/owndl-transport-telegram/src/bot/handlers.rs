use anyhow::Result;
use owndl_core::dispatch::{DispatchOutcome, DispatchRouter};
use owndl_core::links::extract_links;
use owndl_core::preferences::PreferenceStore;
use owndl_core::registry::ChatContext;
use std::sync::Arc;
use teloxide::{prelude::*, utils::command::BotCommands};
use tracing::{debug, info, warn};

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Toggle the "Sent by" signature for this chat
    #[command(description = "Change signature status.")]
    Changeview,
}

/// Display name of a sender: username, then first name, then "Unknown".
#[must_use]
pub fn display_name(username: Option<&str>, first_name: Option<&str>) -> String {
    username
        .or(first_name.filter(|name| !name.is_empty()))
        .unwrap_or("Unknown")
        .to_string()
}

fn get_sender_name(msg: &Message) -> String {
    let user = msg.from.as_ref();
    display_name(
        user.and_then(|u| u.username.as_deref()),
        user.map(|u| u.first_name.as_str()),
    )
}

/// Reply text for a signature state.
#[must_use]
pub const fn signature_status_text(active: bool) -> &'static str {
    if active {
        "Signature status is on."
    } else {
        "Signature status is off."
    }
}

/// `/changeview` handler
///
/// # Errors
///
/// Returns an error if the preference cannot be saved or the reply cannot be sent.
pub async fn change_view(
    bot: Bot,
    msg: Message,
    preferences: Arc<dyn PreferenceStore>,
) -> Result<()> {
    let chat_id = msg.chat.id;
    let active = preferences.toggle_signature(chat_id.0).await?;
    info!(chat_id = chat_id.0, active, "Signature status changed");
    bot.send_message(chat_id, signature_status_text(active)).await?;
    Ok(())
}

/// Text handler: forwards every supported link to its platform worker.
///
/// Links without a registered worker are dropped silently.
///
/// # Errors
///
/// Never fails today; dispatch errors are logged per link.
pub async fn handle_text(msg: Message, router: Arc<DispatchRouter>) -> Result<()> {
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };

    let links = extract_links(text);
    if links.is_empty() {
        return Ok(());
    }

    let context = ChatContext {
        chat_id: msg.chat.id.0,
        sender: get_sender_name(&msg),
        message_id: msg.id.0,
    };

    for link in links {
        info!(
            sender = %context.sender,
            platform = %link.platform,
            url = %link.url,
            "Link received"
        );
        match router.dispatch(&link, context.clone()).await {
            Ok(DispatchOutcome::Sent(id)) => debug!(connection = %id, "Forwarded to worker"),
            Ok(DispatchOutcome::NoWorker) => {}
            Err(e) => warn!(url = %link.url, error = %e, "Failed to forward link"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_username() {
        assert_eq!(display_name(Some("alice"), Some("Alice")), "alice");
        assert_eq!(display_name(None, Some("Alice")), "Alice");
        assert_eq!(display_name(None, Some("")), "Unknown");
        assert_eq!(display_name(None, None), "Unknown");
    }

    #[test]
    fn test_signature_status_text() {
        assert_eq!(signature_status_text(true), "Signature status is on.");
        assert_eq!(signature_status_text(false), "Signature status is off.");
    }

    #[test]
    fn test_command_parsing() {
        assert!(matches!(
            Command::parse("/changeview", "owndl_bot"),
            Ok(Command::Changeview)
        ));
        assert!(Command::parse("/unknown", "owndl_bot").is_err());
    }
}
