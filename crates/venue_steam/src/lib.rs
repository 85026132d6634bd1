//! Branch and price metadata for a Steam app.
//!
//! Branches come from a public mirror of Steam's product-info (PICS) data,
//! prices from the storefront `appdetails` endpoint.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use snapshot::{ensure_unique_names, Branch, BuildId, PriceRecord, SnapshotError};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_INFO_API: &str = "https://api.steamcmd.net";
pub const DEFAULT_STORE_API: &str = "https://store.steampowered.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("app {app_id} is unavailable: {reason}")]
    Unavailable { app_id: u32, reason: String },
    #[error("response is missing `{0}`")]
    MissingField(String),
    #[error("`{field}` has an invalid value: {value}")]
    InvalidField { field: String, value: String },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Everything one run needs to know about the tracked app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMetadata {
    pub app_id: u32,
    pub name: Option<String>,
    pub branches: Vec<Branch>,
    /// `None` for free apps or regions without a listed price.
    pub price: Option<PriceRecord>,
}

pub trait MetadataSource {
    fn fetch(&self, app_id: u32) -> impl Future<Output = Result<AppMetadata, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub struct SteamConfig {
    pub info_api: String,
    pub store_api: String,
    /// Storefront country code, decides the currency of prices.
    pub country: String,
}

impl Default for SteamConfig {
    fn default() -> Self {
        Self {
            info_api: DEFAULT_INFO_API.to_string(),
            store_api: DEFAULT_STORE_API.to_string(),
            country: "us".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SteamClient {
    http: Client,
    config: SteamConfig,
}

impl SteamClient {
    pub fn new(config: SteamConfig) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    pub fn info_url(&self, app_id: u32) -> String {
        format!("{}/v1/info/{app_id}", self.config.info_api.trim_end_matches('/'))
    }

    pub fn price_url(&self, app_id: u32) -> String {
        format!(
            "{}/api/appdetails?appids={app_id}&cc={}&filters=price_overview",
            self.config.store_api.trim_end_matches('/'),
            self.config.country
        )
    }

    async fn get_json(&self, url: String) -> Result<Value, FetchError> {
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(resp.json::<Value>().await?)
    }

    pub async fn fetch_branches(
        &self,
        app_id: u32,
    ) -> Result<(Option<String>, Vec<Branch>), FetchError> {
        let body = self.get_json(self.info_url(app_id)).await?;
        parse_product_info(app_id, &body)
    }

    pub async fn fetch_price(&self, app_id: u32) -> Result<Option<PriceRecord>, FetchError> {
        let body = self.get_json(self.price_url(app_id)).await?;
        parse_price_overview(app_id, &body)
    }
}

impl MetadataSource for SteamClient {
    async fn fetch(&self, app_id: u32) -> Result<AppMetadata, FetchError> {
        let ((name, branches), price) =
            tokio::try_join!(self.fetch_branches(app_id), self.fetch_price(app_id))?;
        debug!(app_id, branches = branches.len(), has_price = price.is_some(), "metadata fetched");
        Ok(AppMetadata {
            app_id,
            name,
            branches,
            price,
        })
    }
}

/// Reads the app name and branch list out of a product-info response.
/// Branch order follows the response.
pub fn parse_product_info(
    app_id: u32,
    body: &Value,
) -> Result<(Option<String>, Vec<Branch>), FetchError> {
    if let Some(status) = body.get("status").and_then(Value::as_str) {
        if status != "success" {
            return Err(FetchError::Unavailable {
                app_id,
                reason: format!("product info status `{status}`"),
            });
        }
    }

    let app = body
        .get("data")
        .and_then(|data| data.get(app_id.to_string()))
        .ok_or_else(|| FetchError::MissingField(format!("data.{app_id}")))?;

    let name = app
        .pointer("/common/name")
        .and_then(Value::as_str)
        .map(str::to_string);

    let entries = app
        .pointer("/depots/branches")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::MissingField("depots.branches".into()))?;

    let mut branches = Vec::with_capacity(entries.len());
    for (branch_name, entry) in entries {
        branches.push(parse_branch(branch_name, entry)?);
    }
    ensure_unique_names(&branches)?;

    Ok((name, branches))
}

fn parse_branch(name: &str, entry: &Value) -> Result<Branch, FetchError> {
    let field = |key: &str| format!("branches.{name}.{key}");

    let raw_updated = entry
        .get("timeupdated")
        .ok_or_else(|| FetchError::MissingField(field("timeupdated")))?;
    let last_updated = lenient_i64(raw_updated).ok_or_else(|| FetchError::InvalidField {
        field: field("timeupdated"),
        value: raw_updated.to_string(),
    })?;

    let build_id = match entry.get("buildid") {
        Some(Value::String(s)) => BuildId::parse(s),
        Some(Value::Number(n)) => n.as_u64().map(BuildId::new).unwrap_or(BuildId::UNKNOWN),
        _ => BuildId::UNKNOWN,
    };

    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let password_required = entry
        .get("pwdrequired")
        .and_then(lenient_i64)
        .map(|v| v != 0)
        .unwrap_or(false);

    Ok(Branch::new(name, last_updated, build_id)
        .with_description(description)
        .with_password_required(password_required))
}

/// Reads `price_overview` from an `appdetails` response. Free apps come
/// back without one and yield `None`.
pub fn parse_price_overview(app_id: u32, body: &Value) -> Result<Option<PriceRecord>, FetchError> {
    let entry = body
        .get(app_id.to_string())
        .ok_or_else(|| FetchError::MissingField(app_id.to_string()))?;

    if !entry.get("success").and_then(Value::as_bool).unwrap_or(false) {
        return Err(FetchError::Unavailable {
            app_id,
            reason: "store details not available".into(),
        });
    }

    let Some(overview) = entry.pointer("/data/price_overview") else {
        return Ok(None);
    };

    let initial_price = price_field(overview, "initial")?;
    let current_price = price_field(overview, "final")?;
    let discount = price_field(overview, "discount_percent")?;
    let discount_percent = u8::try_from(discount)
        .ok()
        .filter(|d| *d <= 100)
        .ok_or_else(|| FetchError::InvalidField {
            field: "price_overview.discount_percent".into(),
            value: discount.to_string(),
        })?;

    Ok(Some(PriceRecord::new(
        initial_price,
        current_price,
        discount_percent,
    )))
}

fn price_field(overview: &Value, key: &str) -> Result<u64, FetchError> {
    let raw = overview
        .get(key)
        .ok_or_else(|| FetchError::MissingField(format!("price_overview.{key}")))?;
    lenient_i64(raw)
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| FetchError::InvalidField {
            field: format!("price_overview.{key}"),
            value: raw.to_string(),
        })
}

// Product-info values arrive as strings, storefront values as numbers.
fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
