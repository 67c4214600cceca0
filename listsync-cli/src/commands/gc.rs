//! Tombstone collection.

use chrono::Utc;
use clap::Args;
use listsync_core::{collect_garbage, FileStore, Store, StoreError, TOMBSTONE_RETENTION};

use crate::config::Config;
use crate::sync::build_engine;

/// Remove deleted lists older than the retention period
#[derive(Debug, Args)]
pub struct GcCommand {
    /// Report what would be removed without saving
    #[arg(long)]
    pub dry_run: bool,
}

impl GcCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let store = FileStore::new(config.data_dir.value.clone());

        let removed = if self.dry_run {
            let (_, removed) =
                collect_garbage(store.load_records(), Utc::now(), TOMBSTONE_RETENTION);
            removed
        } else {
            match build_engine(config) {
                Ok(engine) => {
                    // Tombstones must reach the server before they are dropped.
                    let rt = tokio::runtime::Runtime::new()?;
                    let records = store.load_records();
                    if records.is_empty() {
                        println!("No deleted items older than {} days", retention_days());
                        return Ok(());
                    }
                    let delivered = rt.block_on(async {
                        engine.push(records);
                        let delivered = engine.flush().await;
                        engine.shutdown();
                        delivered
                    });
                    if !delivered {
                        println!("Could not sync first; deleted items are kept");
                        return Ok(());
                    }
                    engine.collect_garbage()
                }
                Err(_) => collect_local(&store)?,
            }
        };

        match (removed, self.dry_run) {
            (0, _) => println!("No deleted items older than {} days", retention_days()),
            (n, true) => println!("Would remove {} deleted item{}", n, plural(n)),
            (n, false) => println!("Removed {} deleted item{}", n, plural(n)),
        }
        Ok(())
    }
}

fn collect_local(store: &dyn Store) -> Result<usize, StoreError> {
    let (kept, removed) = collect_garbage(store.load_records(), Utc::now(), TOMBSTONE_RETENTION);
    if removed > 0 {
        store.save_records(&kept)?;
    }
    Ok(removed)
}

fn retention_days() -> u64 {
    TOMBSTONE_RETENTION.as_secs() / 86_400
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
