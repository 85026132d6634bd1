//! Turns a [`diff::ChangeSet`] into Discord messages and delivers them.

mod compose;
mod delivery;
mod embed;
mod webhook;

pub use compose::{format_cents, pack, Composer, MAX_EMBEDS_PER_MESSAGE};
pub use delivery::{Delivery, DeliveryError, LogDelivery};
pub use embed::{colors, Embed, EmbedField, EmbedFooter, Message};
pub use webhook::DiscordWebhook;
