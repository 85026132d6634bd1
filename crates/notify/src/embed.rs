use serde::Serialize;

pub mod colors {
    pub const GREEN: u32 = 0x008000;
    pub const ORANGE: u32 = 0xFFA500;
    pub const RED: u32 = 0xFF0000;
    pub const LIGHT_BLUE: u32 = 0xADD8E6;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// One rich-content block of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

/// Webhook payload. Holds at most [`crate::MAX_EMBEDS_PER_MESSAGE`] embeds
/// when built by the composer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Message {
    pub embeds: Vec<Embed>,
}
