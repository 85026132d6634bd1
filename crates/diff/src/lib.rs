use std::collections::HashMap;

use serde::Serialize;
use snapshot::{Branch, PriceRecord, Snapshot};

/// Differences between the previous and the current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Present now, absent before. Order follows the current snapshot.
    pub new_branches: Vec<Branch>,
    /// Present in both with a different `last_updated`; holds the current values.
    pub updated_branches: Vec<Branch>,
    /// Present before, absent now; holds the previous values. Order follows
    /// the previous snapshot.
    pub deleted_branches: Vec<Branch>,
    pub price_change: Option<PriceEvent>,
}

impl ChangeSet {
    pub fn has_branch_changes(&self) -> bool {
        !(self.new_branches.is_empty()
            && self.updated_branches.is_empty()
            && self.deleted_branches.is_empty())
    }

    pub fn branch_change_count(&self) -> usize {
        self.new_branches.len() + self.updated_branches.len() + self.deleted_branches.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_branch_changes() && self.price_change.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PricePoint {
    pub price: u64,
    pub discount_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceEvent {
    /// The undiscounted price moved.
    BaseChanged { from: u64, to: u64 },
    SaleStarted {
        initial: u64,
        current: u64,
        discount_percent: u8,
    },
    SaleEnded { price: u64 },
    /// The sale price dropped further.
    SaleDeepened { from: PricePoint, to: PricePoint },
    /// The sale price went up but the sale is still running.
    SaleReduced { from: PricePoint, to: PricePoint },
}

impl PriceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PriceEvent::BaseChanged { .. } => "base_changed",
            PriceEvent::SaleStarted { .. } => "sale_started",
            PriceEvent::SaleEnded { .. } => "sale_ended",
            PriceEvent::SaleDeepened { .. } => "sale_deepened",
            PriceEvent::SaleReduced { .. } => "sale_reduced",
        }
    }
}

pub fn diff(previous: &Snapshot, current: &Snapshot) -> ChangeSet {
    let (new_branches, updated_branches, deleted_branches) =
        diff_branches(previous.branches(), current.branches());

    ChangeSet {
        new_branches,
        updated_branches,
        deleted_branches,
        price_change: classify_price(previous.price(), current.price()),
    }
}

/// Splits branches into `(new, updated, deleted)`. Unchanged branches are
/// dropped.
///
/// Names are expected to be unique per side, which [`Snapshot`] enforces.
/// For raw slices that repeat a name, the first occurrence is the one
/// compared against.
pub fn diff_branches(
    previous: &[Branch],
    current: &[Branch],
) -> (Vec<Branch>, Vec<Branch>, Vec<Branch>) {
    let before = index_by_name(previous);
    let after = index_by_name(current);

    let mut new_branches = Vec::new();
    let mut updated_branches = Vec::new();
    for branch in current {
        match before.get(branch.name.as_str()) {
            None => new_branches.push(branch.clone()),
            Some(old) if old.last_updated != branch.last_updated => {
                updated_branches.push(branch.clone())
            }
            Some(_) => {}
        }
    }

    let deleted_branches = previous
        .iter()
        .filter(|b| !after.contains_key(b.name.as_str()))
        .cloned()
        .collect();

    (new_branches, updated_branches, deleted_branches)
}

fn index_by_name(branches: &[Branch]) -> HashMap<&str, &Branch> {
    let mut index = HashMap::with_capacity(branches.len());
    for branch in branches {
        index.entry(branch.name.as_str()).or_insert(branch);
    }
    index
}

/// At most one event per run. A base price change wins over any sale
/// movement.
pub fn classify_price(previous: &PriceRecord, current: &PriceRecord) -> Option<PriceEvent> {
    if current.initial_price != previous.initial_price {
        return Some(PriceEvent::BaseChanged {
            from: previous.initial_price,
            to: current.initial_price,
        });
    }

    if current.current_price == previous.current_price {
        return None;
    }

    let from = PricePoint {
        price: previous.current_price,
        discount_percent: previous.discount_percent,
    };
    let to = PricePoint {
        price: current.current_price,
        discount_percent: current.discount_percent,
    };

    let event = if !previous.is_discounted() {
        PriceEvent::SaleStarted {
            initial: current.initial_price,
            current: current.current_price,
            discount_percent: current.discount_percent,
        }
    } else if current.current_price == previous.initial_price {
        PriceEvent::SaleEnded {
            price: current.initial_price,
        }
    } else if current.current_price < previous.current_price {
        PriceEvent::SaleDeepened { from, to }
    } else {
        PriceEvent::SaleReduced { from, to }
    };
    Some(event)
}
