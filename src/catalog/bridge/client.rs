//! Bridge HTTP client
//!
//! Handles communication with the catalog bridge service.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};

use super::{adapter, dto};
use crate::auth::{AuthError, ConnectionStatus};
use crate::catalog::domain::{Candidate, CatalogError, DestinationError};
use crate::config::BridgeConfig;

/// User agent string sent with every request
const USER_AGENT: &str = concat!("PlaylistBridge/", env!("CARGO_PKG_VERSION"));

/// Catalog bridge client
pub struct BridgeClient {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    batch_size: usize,
}

impl BridgeClient {
    /// Create a client from the `[bridge]` config section
    pub fn new(config: &BridgeConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Maximum ids per add request
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Search restricted to songs (top 3)
    pub async fn search_songs(
        &self,
        title: &str,
        artists: &[String],
    ) -> Result<Option<Candidate>, CatalogError> {
        self.search(title, artists, Some("songs"), 3).await
    }

    /// Unfiltered search (top 5)
    pub async fn search_any(
        &self,
        title: &str,
        artists: &[String],
    ) -> Result<Option<Candidate>, CatalogError> {
        self.search(title, artists, None, 5).await
    }

    async fn search(
        &self,
        title: &str,
        artists: &[String],
        filter: Option<&str>,
        limit: u32,
    ) -> Result<Option<Candidate>, CatalogError> {
        let query = adapter::query_text(title, artists);
        let mut params = vec![("q", query), ("limit", limit.to_string())];
        if let Some(filter) = filter {
            params.push(("filter", filter.to_string()));
        }

        let response = self
            .authorized(self.http_client.get(format!("{}/search", self.base_url)))
            .query(&params)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(adapter::catalog_error(status, message));
        }

        let body = response
            .json::<dto::SearchResponse>()
            .await
            .map_err(|e| CatalogError::Unavailable(format!("Malformed search response: {}", e)))?;

        Ok(adapter::to_candidate(body))
    }

    /// Create an empty playlist and return its id
    pub async fn create_playlist(
        &self,
        name: &str,
        description: &str,
    ) -> Result<String, DestinationError> {
        let response = self
            .authorized(self.http_client.post(format!("{}/playlists", self.base_url)))
            .json(&dto::CreatePlaylistRequest { name, description })
            .send()
            .await
            .map_err(|e| DestinationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(adapter::destination_error(status, message));
        }

        let body = response
            .json::<dto::CreatePlaylistResponse>()
            .await
            .map_err(|e| DestinationError::Rejected(format!("Malformed create response: {}", e)))?;

        Ok(body.playlist_id)
    }

    /// Append ids to a playlist
    pub async fn add_tracks(
        &self,
        playlist_id: &str,
        external_ids: &[String],
    ) -> Result<(), DestinationError> {
        if external_ids.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/playlists/{}/items",
            self.base_url,
            urlencoding::encode(playlist_id)
        );
        let response = self
            .authorized(self.http_client.post(url))
            .json(&dto::AddItemsRequest { external_ids })
            .send()
            .await
            .map_err(|e| DestinationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(adapter::destination_error(status, message));
        }
        Ok(())
    }

    /// Ask the bridge whether it holds usable catalog credentials
    pub async fn connection_status(&self) -> Result<ConnectionStatus, AuthError> {
        let response = self
            .authorized(self.http_client.get(format!("{}/auth/status", self.base_url)))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(AuthError::Unavailable(message));
        }

        let body = response
            .json::<dto::AuthStatusResponse>()
            .await
            .map_err(|e| AuthError::Unavailable(format!("Malformed auth response: {}", e)))?;

        Ok(ConnectionStatus {
            connected: body.connected,
            action: body.action,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Best-effort error text from a failed response
async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<dto::ApiError>().await {
        Ok(error) => format!("HTTP {}: {}", status.as_u16(), error.error),
        Err(_) => format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    }
}
