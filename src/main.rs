use commit_mailer::api;
use commit_mailer::config::{ListenTarget, MailerConfig, ServerConfig};
use commit_mailer::error::MailerError;
use commit_mailer::logging::{FileLogger, setup_logging};
use commit_mailer::{AppState, SharedState};
use std::sync::Arc;
use tracing::{self, error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let file_logger = match FileLogger::from_env() {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Logging configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let _log_guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    let config = match MailerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let server = match ServerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Relaying pushes to {} via {}:{}",
        config.recipient, config.smtp_host, config.smtp_port
    );

    let state: SharedState = Arc::new(AppState::new(config));
    let app = api::router(state);

    if let Err(e) = serve(server.listen, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(listen: ListenTarget, app: axum::Router) -> Result<(), MailerError> {
    match listen {
        ListenTarget::Tcp { host, port } => {
            let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
            info!("Listening on {}", listener.local_addr()?);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        #[cfg(unix)]
        ListenTarget::Unix(path) => {
            // A socket file left by a previous run would make bind fail.
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            let listener = tokio::net::UnixListener::bind(&path)?;
            info!("Listening on unix socket {:?}", path);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            std::fs::remove_file(&path).ok();
        }
        #[cfg(not(unix))]
        ListenTarget::Unix(path) => {
            return Err(MailerError::ConfigError(format!(
                "UNIX_SOCKET {:?} is not supported on this platform",
                path
            )));
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
