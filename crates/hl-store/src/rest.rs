//! PostgREST-backed store (Supabase-compatible).

use async_trait::async_trait;
use hl_core::{LocationRecord, SubjectId};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, instrument};
use url::Url;

use crate::realtime::{self, ChannelSpec};
use crate::{ChangeFeed, LocationStore, RealtimeConfig, StoreConfig, StoreError, StoreResult};

/// Store that talks to a PostgREST endpoint and follows changes over the
/// realtime WebSocket.
#[derive(Debug, Clone)]
pub struct RestStore {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    table: String,
    schema: String,
    realtime: RealtimeConfig,
}

impl RestStore {
    /// Build a store from configuration.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidUrl` if the URL or key is missing or the
    /// URL is not http(s); `StoreError::Http` if the client cannot be built.
    pub fn new(config: &StoreConfig, realtime: RealtimeConfig) -> StoreResult<Self> {
        let raw_url = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StoreError::InvalidUrl("store URL is not set".into()))?;
        let anon_key = config
            .anon_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StoreError::InvalidUrl("store key is not set".into()))?
            .to_string();

        let base_url = normalize_base_url(raw_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(auth_headers(&anon_key)?)
            .build()?;

        Ok(Self {
            http,
            base_url,
            anon_key,
            table: config.table.clone(),
            schema: config.schema.clone(),
            realtime,
        })
    }

    /// REST endpoint of the configured table.
    #[must_use]
    pub fn table_url(&self) -> Url {
        self.endpoint(&format!("rest/v1/{}", self.table))
    }

    /// Realtime WebSocket endpoint derived from the store URL.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidUrl` if the scheme cannot be mapped.
    pub fn realtime_url(&self) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(StoreError::InvalidUrl(format!("unsupported scheme {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| StoreError::InvalidUrl(format!("cannot switch to {scheme}")))?;
        url.set_path(&joined_path(&self.base_url, "realtime/v1/websocket"));
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", realtime::PROTOCOL_VERSION);
        Ok(url)
    }

    fn endpoint(&self, suffix: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&joined_path(&self.base_url, suffix));
        url
    }
}

// Keeps any path prefix of a self-hosted deployment (`https://host/db`).
fn joined_path(base: &Url, suffix: &str) -> String {
    format!("{}/{suffix}", base.path().trim_end_matches('/'))
}

fn normalize_base_url(raw: &str) -> StoreResult<Url> {
    let url = Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| StoreError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(StoreError::InvalidUrl(format!(
            "{raw}: scheme must be http or https"
        )));
    }
    if url.host_str().is_none() {
        return Err(StoreError::InvalidUrl(format!("{raw}: missing host")));
    }
    Ok(url)
}

fn auth_headers(anon_key: &str) -> StoreResult<HeaderMap> {
    let invalid = |_| StoreError::InvalidUrl("store key contains invalid header characters".into());
    let mut headers = HeaderMap::new();
    headers.insert("apikey", HeaderValue::from_str(anon_key).map_err(invalid)?);
    let mut bearer =
        HeaderValue::from_str(&format!("Bearer {anon_key}")).map_err(invalid)?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}

async fn api_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    // PostgREST error bodies carry a `message` field.
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);
    StoreError::Api { status, message }
}

#[async_trait]
impl LocationStore for RestStore {
    fn backend(&self) -> &'static str {
        "postgrest"
    }

    #[instrument(skip(self, record), fields(subject = %record.subject_id))]
    async fn upsert(&self, record: &LocationRecord) -> StoreResult<()> {
        let mut url = self.table_url();
        url.query_pairs_mut().append_pair("on_conflict", "id");

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header("Content-Profile", &self.schema)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        debug!(timestamp = record.timestamp, "location upserted");
        Ok(())
    }

    #[instrument(skip(self), fields(subject = %subject))]
    async fn select_one(&self, subject: &SubjectId) -> StoreResult<Option<LocationRecord>> {
        let mut url = self.table_url();
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{subject}"))
            .append_pair("select", "*")
            .append_pair("limit", "1");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .header("Accept-Profile", &self.schema)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let body = response.text().await?;
        let rows: Vec<LocationRecord> = serde_json::from_str(&body)?;
        Ok(rows.into_iter().next())
    }

    async fn subscribe(&self, subject: &SubjectId) -> StoreResult<ChangeFeed> {
        let spec = ChannelSpec {
            url: self.realtime_url()?,
            access_token: self.anon_key.clone(),
            schema: self.schema.clone(),
            table: self.table.clone(),
            subject: subject.clone(),
        };
        Ok(realtime::spawn_channel(spec, self.realtime.clone()))
    }
}
