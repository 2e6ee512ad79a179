use anyhow::Context;
use meme_board::{
    board::Board,
    config::Config,
    notice::{NoticeLevel, Notices},
    routes::create_router,
    share::MemoryClipboard,
    startup::build_backend,
    AppState,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "meme_board=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(backend = ?config.backend, storage_domain = %config.storage_domain, "Configuration loaded");

    let backend = build_backend(&config).await?;
    let notices = Notices::new();
    spawn_notice_logger(&notices);

    let board = Board::new(
        backend.clone(),
        notices,
        config.admin_password.clone(),
        config.page_url.clone(),
        Arc::new(MemoryClipboard::default()),
    );
    board.mount().await;

    let state = Arc::new(AppState {
        board: board.clone(),
        backend,
    });
    let app = create_router(state);

    tracing::info!("Server listening on http://{}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .context(format!("Failed to bind {}", config.bind_address))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    board.unmount().await;
    Ok(())
}

// The server has no UI; notices end up in the log.
fn spawn_notice_logger(notices: &Notices) {
    let mut rx = notices.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notice) => match notice.level {
                    NoticeLevel::Success => tracing::info!(notice = %notice.message),
                    NoticeLevel::Error => tracing::warn!(notice = %notice.message),
                },
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "notice logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
