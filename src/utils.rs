//graceful-shutdown helper shared by the serve path and tests
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Token that fires on ctrl-c. Hand `token.cancelled_owned()` to
/// `axum::serve(...).with_graceful_shutdown`.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+C handler");
        info!("shutdown signal received");
        tc.cancel();
    });
    token
}
