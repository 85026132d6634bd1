use diff::{ChangeSet, PriceEvent};
use snapshot::Branch;

use crate::embed::{colors, Embed, EmbedField, EmbedFooter, Message};

/// Discord rejects messages carrying more embeds than this.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

#[derive(Debug, Clone, Copy)]
enum BranchChange {
    New,
    Updated,
    Deleted,
}

/// Builds message payloads for one run. Every embed carries the app name
/// as its footer when one is known.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    footer: Option<String>,
}

impl Composer {
    pub fn new(footer: Option<String>) -> Self {
        Self { footer }
    }

    /// New, then deleted, then updated branches, packed ten embeds per
    /// message. Empty when no branch changed.
    pub fn branch_messages(&self, changes: &ChangeSet) -> Vec<Message> {
        let embeds = changes
            .new_branches
            .iter()
            .map(|b| self.branch_embed(BranchChange::New, b))
            .chain(
                changes
                    .deleted_branches
                    .iter()
                    .map(|b| self.branch_embed(BranchChange::Deleted, b)),
            )
            .chain(
                changes
                    .updated_branches
                    .iter()
                    .map(|b| self.branch_embed(BranchChange::Updated, b)),
            )
            .collect();
        pack(embeds)
    }

    /// Zero or one message holding the price embed.
    pub fn price_messages(&self, changes: &ChangeSet) -> Vec<Message> {
        changes
            .price_change
            .iter()
            .map(|event| Message {
                embeds: vec![self.price_embed(event)],
            })
            .collect()
    }

    fn branch_embed(&self, change: BranchChange, branch: &Branch) -> Embed {
        let (title, color, description) = match change {
            BranchChange::New => (
                "New Branch",
                colors::GREEN,
                format!(
                    "The branch `{}` was added at <t:{}:F>.",
                    branch.name, branch.last_updated
                ),
            ),
            BranchChange::Updated => (
                "Updated Branch",
                colors::ORANGE,
                format!(
                    "The branch `{}` was updated at <t:{}:F>.",
                    branch.name, branch.last_updated
                ),
            ),
            BranchChange::Deleted => (
                "Deleted Branch",
                colors::RED,
                format!("The branch `{}` was deleted.", branch.name),
            ),
        };

        let fields = match change {
            BranchChange::Deleted => Vec::new(),
            BranchChange::New | BranchChange::Updated => branch_fields(branch),
        };

        self.embed(title, color, description, fields)
    }

    fn price_embed(&self, event: &PriceEvent) -> Embed {
        let (title, description) = match *event {
            PriceEvent::BaseChanged { from, to } => (
                "Price Change",
                format!(
                    "The base price has changed from {} to {}.",
                    format_cents(from),
                    format_cents(to)
                ),
            ),
            PriceEvent::SaleStarted {
                initial,
                current,
                discount_percent,
            } => (
                "Sale Started!",
                format!(
                    "A sale has started! From {} to {} ({}% off).",
                    format_cents(initial),
                    format_cents(current),
                    discount_percent
                ),
            ),
            PriceEvent::SaleDeepened { from, to } => (
                "Sale Update",
                format!(
                    "The sale has increased! From {} ({}% off) to {} ({}% off).",
                    format_cents(from.price),
                    from.discount_percent,
                    format_cents(to.price),
                    to.discount_percent
                ),
            ),
            PriceEvent::SaleReduced { from, to } => (
                "Sale Update",
                format!(
                    "The sale has decreased. From {} ({}% off) to {} ({}% off).",
                    format_cents(from.price),
                    from.discount_percent,
                    format_cents(to.price),
                    to.discount_percent
                ),
            ),
            PriceEvent::SaleEnded { price } => (
                "Sale Ended",
                format!("The sale has ended. Back to {}.", format_cents(price)),
            ),
        };

        self.embed(title, colors::LIGHT_BLUE, description, Vec::new())
    }

    fn embed(&self, title: &str, color: u32, description: String, fields: Vec<EmbedField>) -> Embed {
        Embed {
            title: title.to_string(),
            color,
            description,
            fields,
            footer: self
                .footer
                .as_ref()
                .map(|text| EmbedFooter { text: text.clone() }),
        }
    }
}

fn branch_fields(branch: &Branch) -> Vec<EmbedField> {
    let mut fields = vec![EmbedField::inline("Name", branch.name.as_str())];
    if !branch.description.is_empty() {
        fields.push(EmbedField::inline("Description", branch.description.as_str()));
    }
    fields.push(EmbedField::inline(
        "Password Required",
        if branch.password_required { "Yes" } else { "No" },
    ));
    fields.push(EmbedField::inline("BuildId", branch.build_id.to_string()));
    fields
}

/// Greedy fill: a new message starts only once the current one is full.
pub fn pack(embeds: Vec<Embed>) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();
    for embed in embeds {
        match messages.last_mut() {
            Some(message) if message.embeds.len() < MAX_EMBEDS_PER_MESSAGE => {
                message.embeds.push(embed)
            }
            _ => messages.push(Message {
                embeds: vec![embed],
            }),
        }
    }
    messages
}

/// `1999` -> `$19.99`
pub fn format_cents(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
