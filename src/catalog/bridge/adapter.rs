//! Adapter layer: convert bridge DTOs and HTTP statuses to domain types
//!
//! This is the ONLY place where bridge DTO types are converted to domain
//! types.

use reqwest::StatusCode;

use super::dto;
use crate::catalog::domain::{Candidate, CatalogError, DestinationError};

/// Build the free-text query for a track: `"{artists} {title}"`.
pub fn query_text(title: &str, artists: &[String]) -> String {
    format!("{} {}", artists.join(", "), title).trim().to_string()
}

/// First result that carries a playable id.
pub fn to_candidate(response: dto::SearchResponse) -> Option<Candidate> {
    response.results.into_iter().find_map(|r| {
        r.external_id
            .filter(|id| !id.is_empty())
            .map(|external_id| Candidate {
                external_id,
                result_type: r.result_type,
            })
    })
}

/// Map a failed search status to a catalog error.
pub(super) fn catalog_error(status: StatusCode, message: String) -> CatalogError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CatalogError::Unauthorized(message),
        _ => CatalogError::Unavailable(message),
    }
}

/// Map a failed write status to a destination error.
pub(super) fn destination_error(status: StatusCode, message: String) -> DestinationError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DestinationError::Unauthorized(message)
        }
        StatusCode::TOO_MANY_REQUESTS => DestinationError::Unavailable(message),
        s if s.is_server_error() => DestinationError::Unavailable(message),
        _ => DestinationError::Rejected(message),
    }
}
