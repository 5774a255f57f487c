//! Checkpoint inspection commands.

use tokio::runtime::Runtime;

use crate::checkpoint;
use crate::config::Config;
use crate::error::ResultExt;
use crate::model::{JobId, canonical_source_ref};

/// Show saved progress for `source`
pub fn cmd_checkpoint_show(rt: &Runtime, config: &Config, source: &str) -> anyhow::Result<()> {
    let job_id = JobId::from_source_ref(&canonical_source_ref(source));

    rt.block_on(async {
        let store = checkpoint::open(&config.checkpoint)
            .await
            .with_context("opening checkpoint store")?;
        let record = store
            .load(&job_id)
            .await
            .with_context(format!("loading checkpoint for job {}", job_id))?;

        if record.is_empty() {
            println!("No saved progress for job {}", job_id);
            return Ok(());
        }

        println!("Job {}", job_id);
        println!("  Resolved tracks: {}", record.resolved.len());
        for (index, external_id) in &record.resolved {
            println!("    {:>4}  {}", index + 1, external_id);
        }
        match record.playlist {
            Some(progress) => println!(
                "  Playlist {} ({} tracks added)",
                progress.playlist_id,
                progress.written.len()
            ),
            None => println!("  No playlist created yet"),
        }
        anyhow::Ok(())
    })
}

/// Delete saved progress for `source`
pub fn cmd_checkpoint_clear(rt: &Runtime, config: &Config, source: &str) -> anyhow::Result<()> {
    let job_id = JobId::from_source_ref(&canonical_source_ref(source));

    rt.block_on(async {
        let store = checkpoint::open(&config.checkpoint)
            .await
            .with_context("opening checkpoint store")?;
        store
            .clear(&job_id)
            .await
            .with_context(format!("clearing checkpoint for job {}", job_id))?;
        println!("Cleared saved progress for job {}", job_id);
        anyhow::Ok(())
    })
}
