//! Branch and price records for one tracked app, plus the snapshot that
//! groups them for a single run.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("branch `{name}` appears more than once")]
    DuplicateBranch { name: String },
}

/// Build identifier of a branch. Unknown ids are written as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildId(Option<u64>);

impl BuildId {
    pub const UNKNOWN: BuildId = BuildId(None);

    pub fn new(id: u64) -> Self {
        Self(Some(id))
    }

    /// Parses a raw build id, falling back to unknown when it isn't a
    /// non-negative integer.
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().parse::<u64>().ok())
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("-1"),
        }
    }
}

impl Serialize for BuildId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(id) => serializer.serialize_u64(id),
            None => serializer.serialize_i64(-1),
        }
    }
}

impl<'de> Deserialize<'de> for BuildId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(u64::try_from(raw).map(BuildId::new).unwrap_or(BuildId::UNKNOWN))
    }
}

/// One distribution branch of the tracked app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(rename = "branchName")]
    pub name: String,
    /// Seconds since the Unix epoch.
    #[serde(rename = "timeUpdated")]
    pub last_updated: i64,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "buildId", default)]
    pub build_id: BuildId,
    #[serde(rename = "pwdRequired", default, with = "flag")]
    pub password_required: bool,
}

impl Branch {
    pub fn new(name: impl Into<String>, last_updated: i64, build_id: BuildId) -> Self {
        Self {
            name: name.into(),
            last_updated,
            description: String::new(),
            build_id,
            password_required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_password_required(mut self, required: bool) -> Self {
        self.password_required = required;
        self
    }
}

/// Prices in minor currency units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    #[serde(default)]
    pub initial_price: u64,
    #[serde(default)]
    pub current_price: u64,
    #[serde(default)]
    pub discount_percent: u8,
}

impl PriceRecord {
    pub fn new(initial_price: u64, current_price: u64, discount_percent: u8) -> Self {
        Self {
            initial_price,
            current_price,
            discount_percent,
        }
    }

    pub fn is_discounted(&self) -> bool {
        self.discount_percent > 0
    }
}

/// Branches and price of the tracked app as seen by one run.
///
/// Branch names are unique; [`Snapshot::new`] rejects input that repeats
/// a name instead of picking one of the duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    branches: Vec<Branch>,
    price: PriceRecord,
}

impl Snapshot {
    pub fn new(branches: Vec<Branch>, price: PriceRecord) -> Result<Self, SnapshotError> {
        ensure_unique_names(&branches)?;
        Ok(Self { branches, price })
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn price(&self) -> &PriceRecord {
        &self.price
    }

    pub fn branch(&self, name: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.price == PriceRecord::default()
    }
}

pub fn ensure_unique_names(branches: &[Branch]) -> Result<(), SnapshotError> {
    let mut seen = HashSet::with_capacity(branches.len());
    for branch in branches {
        if !seen.insert(branch.name.as_str()) {
            return Err(SnapshotError::DuplicateBranch {
                name: branch.name.clone(),
            });
        }
    }
    Ok(())
}

// `pwdRequired` is stored as 0/1; older files may carry a bool.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Bool(bool),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(v) => v != 0,
            Raw::Bool(v) => v,
        })
    }
}
