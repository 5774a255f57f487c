//! Bridge API Data Transfer Objects
//!
//! These types match EXACTLY what the bridge sends and accepts.
//! DO NOT use these types outside the bridge module - convert to domain types.

use serde::{Deserialize, Serialize};

/// Search response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    /// Results in the catalog's own relevance order
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// One search hit
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Playable id; absent for entities that cannot be added (artists, albums)
    pub external_id: Option<String>,
    /// Entity kind (song, video, ...)
    pub result_type: Option<String>,
}

/// Create playlist request body
#[derive(Debug, Clone, Serialize)]
pub struct CreatePlaylistRequest<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

/// Create playlist response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylistResponse {
    pub playlist_id: String,
}

/// Add items request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemsRequest<'a> {
    pub external_ids: &'a [String],
}

/// Credential status of the bridge
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatusResponse {
    pub connected: bool,
    /// What the user has to do, when the bridge is waiting on them
    pub action: Option<String>,
}

/// Error body
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_tolerates_missing_fields() {
        let json = r#"{"results":[{"resultType":"artist"},{"externalId":"v1","resultType":"song","title":"T"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert!(parsed.results[0].external_id.is_none());
        assert_eq!(parsed.results[1].external_id.as_deref(), Some("v1"));
    }

    #[test]
    fn test_add_items_request_shape() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let body = serde_json::to_string(&AddItemsRequest { external_ids: &ids }).unwrap();
        assert_eq!(body, r#"{"externalIds":["a","b"]}"#);
    }
}
