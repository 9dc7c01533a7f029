// src/main.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use lodestore::engine::sort_records;
use lodestore::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <config.json> <command> [args]", args[0]);
        eprintln!("Commands:");
        eprintln!("  init                 create the local storage layout");
        eprintln!("  search <text>        search local records");
        eprintln!("  rebuild-index        rebuild the search index");
        eprintln!("  push                 push everything to the remote mirror");
        eprintln!("  pull                 pull everything from the remote mirror");
        return Ok(());
    }

    let config = Config::load_or_default(Path::new(&args[1]));
    if !config.enabled {
        tracing::info!("Local storage is disabled in the config, nothing to do");
        return Ok(());
    }

    let command = args[2].as_str();

    // ========== STORAGE ROOTS ==========
    let roots = StorageRoots::from_config(&config);
    roots.seed_default_folders(config.store_asset_variants)?;
    tracing::info!("✓ Storage roots ready");

    // ========== REMOTE MIRROR ==========
    let (mirror_handle, mirror_worker) = if config.use_remote_storage {
        let client = Arc::new(MirrorClient::from_config(&config)?);
        if !client.test_connection().await {
            tracing::error!("Failed to connect to file server");
        } else {
            client
                .init_remote_structure(config.store_asset_variants)
                .await;

            // Fresh machine, existing mirror: adopt the remote database.
            if config.use_database_backend && !config.database_path.exists() {
                use lodestore::mirror::client::REMOTE_DATABASE_PATH;
                if client.exists(REMOTE_DATABASE_PATH).await {
                    tracing::info!("Found remote database, downloading...");
                    if !client.download_database(&config.database_path).await {
                        tracing::warn!("Failed to download database, will create a new one");
                    }
                }
            }
        }

        let db_path: Option<PathBuf> = config
            .use_database_backend
            .then(|| config.database_path.clone());
        let (handle, worker) =
            spawn_mirror_worker(client, roots.clone(), db_path, config.store_asset_variants);
        tracing::info!("✓ Mirror worker started");
        (Some(handle), Some(worker))
    } else {
        (None, None)
    };

    // Automatic mode catches the local store up before anything reads it.
    if config.sync_mode == SyncMode::AutomaticStartStop {
        if let Some(handle) = &mirror_handle {
            if handle.enqueue(MirrorJob::PullAll).wait().await {
                tracing::info!("✓ Pulled remote state");
            } else {
                tracing::warn!("Initial pull from mirror failed, continuing with local state");
            }
        }
    }

    // ========== RECORD STORE ==========
    let backend: Arc<dyn RecordBackend> = if config.use_database_backend {
        Arc::new(DatabaseBackend::open(&config, mirror_handle.clone())?)
    } else {
        Arc::new(FileTreeBackend::new(&config, mirror_handle.clone()))
    };
    tracing::info!(
        "✓ Record store ready ({})",
        if config.use_database_backend {
            "database backend"
        } else {
            "file-tree backend"
        }
    );

    // ========== SEARCH INDEX ==========
    let index = Arc::new(SearchIndex::new(&config));
    if config.enable_search_integration {
        index.rebuild();
        tracing::info!("✓ Search index built");
    }

    match command {
        "init" => {
            tracing::info!("Local storage initialized");
        }
        "rebuild-index" => {
            index.rebuild();
        }
        "search" => {
            let Some(text) = args.get(3) else {
                eprintln!("Usage: {} <config.json> search <text>", args[0]);
                return Ok(());
            };
            let mut results =
                Searcher::search(&index, backend.as_ref(), text, config.case_sensitive);
            sort_records(&mut results, config.default_sort_method);
            for record in &results {
                println!("{}\t{}\t{}", record.record_id, record.path, record.name);
            }
            tracing::info!("{} result(s) for '{}'", results.len(), text);
        }
        "push" => match &mirror_handle {
            Some(handle) => {
                if handle.enqueue(MirrorJob::PushAll).wait().await {
                    tracing::info!("Push complete");
                } else {
                    tracing::error!("Push failed");
                }
            }
            None => tracing::error!("Remote storage is not enabled"),
        },
        "pull" => match &mirror_handle {
            Some(handle) => {
                if handle.enqueue(MirrorJob::PullAll).wait().await {
                    tracing::info!("Pull complete");
                } else {
                    tracing::error!("Pull failed");
                }
            }
            None => tracing::error!("Remote storage is not enabled"),
        },
        other => {
            eprintln!("Unknown command: {}", other);
        }
    }

    // One final blocking push so shutdown never races an in-flight
    // mirror operation.
    if config.sync_mode == SyncMode::AutomaticStartStop {
        if let Some(handle) = &mirror_handle {
            if !handle.enqueue(MirrorJob::PushAll).wait().await {
                tracing::error!("Final mirror push failed");
            }
        }
    }

    drop(mirror_handle);
    if let Some(worker) = mirror_worker {
        let _ = worker.await;
    }

    Ok(())
}
