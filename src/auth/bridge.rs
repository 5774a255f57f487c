//! Sign-in through the catalog bridge.
//!
//! The bridge owns the vendor login. This flow only polls its status
//! endpoint and surfaces the action text while the user completes it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{AuthError, AuthReporter, CredentialFlow};
use crate::catalog::BridgeClient;

/// Interval between status polls
const POLL_INTERVAL: Duration = Duration::from_secs(2);

const DEFAULT_ACTION: &str = "Complete the sign-in in the bridge window";

/// [`CredentialFlow`] that waits for the bridge to report a connection.
pub struct BridgeSignIn {
    client: Arc<BridgeClient>,
    poll_interval: Duration,
}

impl BridgeSignIn {
    pub fn new(client: Arc<BridgeClient>) -> Self {
        Self {
            client,
            poll_interval: POLL_INTERVAL,
        }
    }
}

#[async_trait]
impl CredentialFlow for BridgeSignIn {
    async fn acquire(&self, reporter: &AuthReporter) -> Result<(), AuthError> {
        reporter.progress("Checking bridge credentials");

        loop {
            let status = self.client.connection_status().await?;
            if status.connected {
                return Ok(());
            }

            let action = status
                .action
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ACTION.to_string());
            reporter.needs_manual_step(action);

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
