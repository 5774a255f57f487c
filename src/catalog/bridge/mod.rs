//! Catalog bridge integration
//!
//! Talks JSON over HTTP to a bridge service that fronts the destination
//! catalog. The bridge owns vendor specifics (authentication, search
//! ranking, playlist APIs); this client only speaks the small contract below.
//!
//! - `GET  /search?q=..&filter=songs&limit=3` and `GET /search?q=..&limit=5`
//! - `POST /playlists` and `POST /playlists/{id}/items`
//! - `GET  /auth/status`

pub mod dto;
mod adapter;
mod client;

pub use adapter::{query_text, to_candidate};
pub use client::BridgeClient;
