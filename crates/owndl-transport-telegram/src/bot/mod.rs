/// `ChatDelivery` over the Bot API
pub mod delivery;
/// Command and link message handlers
pub mod handlers;

pub use delivery::TelegramDelivery;
