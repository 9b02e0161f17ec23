//! # Backend Order Service Client
//!
//! Thin HTTP client for the drive-thru backend that holds the menu and the
//! per-call orders. The voice pipeline only needs it for three things:
//! creating the call (which yields the session id), seeding/reading the
//! menu before the handshake, and polling the order so it can be logged.
//!
//! The agent itself talks to the order endpoints directly through the
//! function URLs sent in the handshake; see [`BackendClient::order_items_url`].

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Opaque identifier of one conversation on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a backend-issued id. Surrounding whitespace is trimmed and an
    /// empty id is rejected, since it would produce broken callback URLs.
    pub fn parse(raw: &str) -> VoiceResult<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(VoiceError::Backend(
                "Backend returned an empty call id".to_string(),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One menu entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
}

/// The whole menu, keyed by item name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Menu {
    pub items: HashMap<String, Item>,
}

impl Menu {
    /// Item names in a stable order, for prompts and JSON schema enums.
    pub fn item_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.items.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub items: Vec<Item>,
    pub total_cost: f64,
}

/// Backend view of a call and its order so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    pub order: Option<Order>,
}

impl Call {
    /// One-line description used in the status log.
    pub fn order_summary(&self) -> String {
        match &self.order {
            Some(order) if !order.items.is_empty() => {
                let names: Vec<&str> = order.items.iter().map(|i| i.name.as_str()).collect();
                format!("{} (total {:.2})", names.join(", "), order.total_cost)
            }
            _ => "no items yet".to_string(),
        }
    }
}

/// HTTP client for the order/menu service.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL the agent posts to (add) or deletes from (remove) for this call.
    pub fn order_items_url(&self, id: &SessionId) -> String {
        format!("{}/calls/{}/order/items", self.base_url, id)
    }

    /// Register a new call and return its id.
    pub async fn create_call(&self) -> VoiceResult<SessionId> {
        let response = self
            .http
            .post(format!("{}/calls", self.base_url))
            .send()
            .await?;
        let body = checked(response).await?.text().await?;
        let id = SessionId::parse(&body)?;
        debug!(session_id = %id, "Call created");
        Ok(id)
    }

    pub async fn get_call(&self, id: &SessionId) -> VoiceResult<Call> {
        let response = self
            .http
            .get(format!("{}/calls/{}", self.base_url, id))
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    pub async fn get_menu(&self) -> VoiceResult<Menu> {
        let response = self
            .http
            .get(format!("{}/menu", self.base_url))
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }

    pub async fn add_menu_item(&self, item: &Item) -> VoiceResult<()> {
        let response = self
            .http
            .post(format!("{}/menu/items", self.base_url))
            .json(item)
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    pub async fn clear_menu(&self) -> VoiceResult<()> {
        let response = self
            .http
            .delete(format!("{}/menu/items", self.base_url))
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }
}

/// Turn a non-success status into a `Backend` error carrying the body text.
async fn checked(response: reqwest::Response) -> VoiceResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(VoiceError::Backend(format!(
        "{} returned {}: {}",
        url,
        status,
        body.trim()
    )))
}
