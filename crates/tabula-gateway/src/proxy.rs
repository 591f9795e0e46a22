//! Data proxy client
//!
//! Implements [`DatasetStore`] and [`ConversationStore`] over the data
//! proxy's REST endpoints. List endpoints may answer with a bare array or
//! wrap it under `data` / `rows` / `items`.

use crate::http::{build_client, endpoint, parse_base, read_json, transport};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tabula_access::{Dataset, DatasetStore, ProfileAssignment, UserProfileRecord};
use tabula_core::{ConfigError, GatewayConfig, RequestFailure};
use tabula_report::normalize::find_payload;
use tabula_report::{ConversationRecord, ConversationStore, SavedConversation};
use url::Url;

const LIST_KEYS: &[&str] = &["data", "rows", "items", "datasets", "assignments"];

fn rows(value: Value) -> Result<Vec<Value>, RequestFailure> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut object) => LIST_KEYS
            .iter()
            .find_map(|key| match object.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| RequestFailure::Malformed("expected a list of rows".into())),
        _ => Err(RequestFailure::Malformed("expected a list of rows".into())),
    }
}

fn decode_rows<T: DeserializeOwned>(value: Value, what: &str) -> Result<Vec<T>, RequestFailure> {
    serde_json::from_value(Value::Array(rows(value)?))
        .map_err(|e| RequestFailure::Malformed(format!("invalid {what} row: {e}")))
}

#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base: Url,
}

impl ProxyClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let base = parse_base(config.require_proxy_url()?)?;
        Ok(Self {
            client: build_client(config)?,
            base,
        })
    }

    pub fn with_reqwest_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    async fn get(&self, url: Url) -> Result<Value, RequestFailure> {
        tracing::debug!(%url, "proxy request");
        let response = self.client.get(url).send().await.map_err(|e| transport(&e))?;
        read_json(response).await
    }
}

#[async_trait]
impl DatasetStore for ProxyClient {
    async fn datasets_for_user(&self, email: &str) -> Result<Vec<Dataset>, RequestFailure> {
        let mut url = endpoint(&self.base, &["datasets"]);
        url.query_pairs_mut().append_pair("ownerEmail", email.trim());
        decode_rows(self.get(url).await?, "dataset")
    }

    async fn all_datasets(&self) -> Result<Vec<Dataset>, RequestFailure> {
        decode_rows(self.get(endpoint(&self.base, &["datasets"])).await?, "dataset")
    }

    async fn profile_assignments(&self) -> Result<Vec<ProfileAssignment>, RequestFailure> {
        decode_rows(
            self.get(endpoint(&self.base, &["profile-assignments"])).await?,
            "profile assignment",
        )
    }

    async fn user_profile(&self, email: &str) -> Result<Option<UserProfileRecord>, RequestFailure> {
        let url = endpoint(&self.base, &["users", email.trim()]);
        let value = match self.get(url).await {
            Ok(value) => value,
            Err(RequestFailure::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(object) = find_payload(&value, |o| o.contains_key("email")) else {
            return Ok(None);
        };
        serde_json::from_value(Value::Object(object))
            .map(Some)
            .map_err(|e| RequestFailure::Malformed(format!("invalid user row: {e}")))
    }
}

#[async_trait]
impl ConversationStore for ProxyClient {
    async fn save_conversation(
        &self,
        record: &ConversationRecord,
    ) -> Result<SavedConversation, RequestFailure> {
        let url = endpoint(&self.base, &["conversations"]);
        let response = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let value = read_json(response).await?;

        let id = find_payload(&value, |o| o.contains_key("id"))
            .and_then(|o| match o.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_default();
        Ok(SavedConversation { id })
    }
}
