use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod db;
mod importer;
mod models;
mod services;

use config::AppConfig;
use importer::host::{CalibreImportRequest, ImportJobHandle};

/// Tracks all background task handles for graceful shutdown
struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.push((name, handle));
    }

    async fn shutdown(self) {
        tracing::info!("Initiating graceful shutdown...");

        // Signal all tasks to stop
        self.shutdown.cancel();

        // Wait for all tasks with a timeout
        for (name, handle) in self.handles {
            tracing::debug!("Waiting for {} to finish...", name);
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(())) => tracing::debug!("{} finished cleanly", name),
                Ok(Err(e)) => tracing::warn!("{} panicked: {}", name, e),
                Err(_) => tracing::warn!("{} timed out during shutdown", name),
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: AppConfig,
    /// The currently running (or last finished) Calibre import, if any.
    pub import_job: tokio::sync::Mutex<Option<ImportJobHandle>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cleverferret=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();

    config.paths.ensure_dirs().await?;

    config.log_config();

    // Database setup
    let database_url = config.database_url();
    tracing::debug!("Database URL: {}", database_url);

    let connect_options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        // WAL mode for better concurrent read/write performance
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        // NORMAL sync is safe with WAL and much faster
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        // Enable foreign key enforcement
        .foreign_keys(true)
        // Busy timeout for concurrent access (5 seconds)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        // Configure PRAGMAs on every new connection via after_connect hook
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                use sqlx::Executor;
                // Cache size: -32000 = 32MB (negative = KB)
                conn.execute("PRAGMA cache_size = -32000").await?;
                // Store temp tables in memory
                conn.execute("PRAGMA temp_store = MEMORY").await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await?;

    db::migrate(&pool).await?;

    let state = std::sync::Arc::new(AppState {
        db: pool.clone(),
        config: config.clone(),
        import_job: tokio::sync::Mutex::new(None),
    });

    let mut bg_tasks = BackgroundTasks::new();

    // Spawn background task to import configured Calibre libraries
    // (one-time task; imports run one after another)
    if config.import_on_startup && !config.calibre_libraries.is_empty() {
        let bg_pool = pool.clone();
        let bg_config = config.clone();
        bg_tasks.spawn("calibre-startup-import", async move {
            // Small delay to let the server fully start
            tokio::time::sleep(Duration::from_millis(500)).await;

            tracing::info!(
                "Background: importing {} configured Calibre libraries...",
                bg_config.calibre_libraries.len()
            );

            for lib in &bg_config.calibre_libraries {
                let root = lib.library_root.to_str().unwrap_or_default();

                let existing: Option<(String,)> =
                    match sqlx::query_as("SELECT id FROM libraries WHERE path = ?")
                        .bind(root)
                        .fetch_optional(&bg_pool)
                        .await
                    {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::error!("Failed to check library '{}': {}", lib.name, e);
                            continue;
                        }
                    };

                let library_id = match existing {
                    Some((id,)) => id,
                    None => {
                        let id = uuid::Uuid::new_v4().to_string();
                        tracing::info!("Creating library '{}' at {}", lib.name, root);
                        if let Err(e) = sqlx::query(
                            "INSERT INTO libraries (id, name, path, library_type) VALUES (?, ?, ?, 'books')",
                        )
                        .bind(&id)
                        .bind(&lib.name)
                        .bind(root)
                        .execute(&bg_pool)
                        .await
                        {
                            tracing::error!("Failed to create library '{}': {}", lib.name, e);
                            continue;
                        }
                        id
                    }
                };

                let request = CalibreImportRequest {
                    source_db: lib.source_db.clone(),
                    library_root: lib.library_root.clone(),
                    library_id,
                };
                importer::host::run_import(&bg_pool, &request).await;
            }

            tracing::info!("Background: startup imports complete");
        });
    }

    // Root handler
    async fn root_handler() -> &'static str {
        "CleverFerret Server"
    }

    // Build router
    let app = Router::new()
        .route("/", get(root_handler).head(root_handler))
        .route("/health", get(|| async { "OK" }))
        .merge(api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;
    tracing::info!("Starting server on {}", addr);

    // Create shutdown signal listener
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // Cancel any import still running, then stop background tasks
    if let Some(job) = state.import_job.lock().await.take() {
        job.cancel();
        job.join().await;
    }
    bg_tasks.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
