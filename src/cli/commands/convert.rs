//! Playlist conversion command.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::auth::{AuthMonitor, AuthState, BridgeSignIn, StartOutcome};
use crate::catalog::{BridgeClient, ManifestLister};
use crate::checkpoint;
use crate::config::Config;
use crate::convert::{Converter, JobEnd, ProgressEvent, ProgressHub, RunningJob};
use crate::error::ResultExt;
use crate::model::{Outcome, canonical_source_ref};

/// Convert the playlist behind `source`, printing progress as it happens.
///
/// Ctrl-C stops submitting new tracks; in-flight ones finish and are
/// checkpointed so the same command resumes later.
pub fn cmd_convert(
    rt: &Runtime,
    mut config: Config,
    source: &str,
    concurrency: Option<usize>,
    bridge_url: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(n) = concurrency {
        config.conversion.max_concurrent = n;
    }
    if let Some(url) = bridge_url {
        config.bridge.base_url = url.to_string();
    }
    let source = canonical_source_ref(source);

    rt.block_on(async {
        let client = Arc::new(
            BridgeClient::new(&config.bridge).with_context("building bridge client")?,
        );
        let store = checkpoint::open(&config.checkpoint)
            .await
            .with_context("opening checkpoint store")?;

        let auth = Arc::new(AuthMonitor::new(
            Arc::new(BridgeSignIn::new(client.clone())),
            Duration::from_secs(config.bridge.auth_timeout_secs),
        ));
        let state = wait_for_sign_in(&auth).await;
        if !state.is_connected() {
            eprintln!("Not connected to the destination: {}", state);
        }

        let converter = Arc::new(
            Converter::new(
                Arc::new(ManifestLister::new()),
                client.clone(),
                client,
                store,
                ProgressHub::new(config.conversion.event_capacity),
                config.convert_options(),
            )
            .with_auth(auth),
        );

        let RunningJob {
            job_id,
            mut events,
            cancel,
            mut handle,
        } = converter
            .submit(source)
            .with_context("submitting conversion")?;
        info!(job_id = %job_id, "Submitted conversion");

        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                print_event(&event, json);
            }
        });

        let end = tokio::select! {
            end = &mut handle => end?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nInterrupted, waiting for in-flight tracks...");
                cancel.cancel();
                handle.await?
            }
        };

        // Aborted jobs never emit a terminal event
        converter.hub().forget(&job_id);
        let _ = printer.await;

        match end {
            JobEnd::Succeeded { .. } => {}
            JobEnd::Failed(reason) => anyhow::bail!("Conversion failed: {}", reason),
            JobEnd::Aborted => {
                println!("Aborted. Progress saved; run the same command again to resume.");
            }
        }
        anyhow::Ok(())
    })
}

/// Start sign-in if needed and wait until it settles, echoing prompts.
async fn wait_for_sign_in(auth: &AuthMonitor) -> AuthState {
    if auth.start() == StartOutcome::AlreadyConnected {
        return AuthState::Succeeded;
    }

    let mut last_shown: Option<AuthState> = None;
    loop {
        let state = auth.status();
        if !state.is_active() {
            debug!(state = %state, "Sign-in settled");
            return state;
        }
        if let AuthState::NeedsManualStep { ref message } = state
            && last_shown.as_ref() != Some(&state)
        {
            eprintln!("Action required: {}", message);
            last_shown = Some(state.clone());
        }

        tokio::select! {
            _ = auth.settled() => {}
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }
}

fn print_event(event: &ProgressEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Failed to encode event: {}", e),
        }
        return;
    }

    match event {
        ProgressEvent::Snapshot { .. } => {}
        ProgressEvent::Started { job_id, .. } => println!("Job {}", job_id),
        ProgressEvent::ListFetched { name, total } => {
            println!("{} ({} tracks)", name, total);
        }
        ProgressEvent::TrackResolved {
            index,
            title,
            artists,
            outcome,
        } => {
            let mark = match outcome {
                Outcome::Found { .. } => "found  ",
                Outcome::Missing => "missing",
            };
            println!("  {:>4}  {}  {} - {}", index + 1, mark, artists.join(", "), title);
        }
        ProgressEvent::Finished {
            created_playlist_id,
            found_count,
            missing_count,
            missing_list,
        } => {
            println!();
            match created_playlist_id {
                Some(id) => println!("Created playlist {}", id),
                None => println!("Nothing found, no playlist created"),
            }
            println!("Found: {}  Missing: {}", found_count, missing_count);
            for track in missing_list {
                println!("  missing: {} - {}", track.artists.join(", "), track.title);
            }
        }
        ProgressEvent::Failed { reason } => eprintln!("\n{}", reason),
    }
}
