use anyhow::Result;
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod core;
mod middleware;
mod models;

#[cfg(test)]
mod tests;

use crate::core::{config::Settings, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new()?;

    info!(
        "Starting pagewise context service on {}:{}",
        settings.server.host, settings.server.port
    );

    let state = AppState::build(&settings).await?;
    let app = router(state.clone());

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    finish_pending_saves(&state).await;

    Ok(())
}

/// Resolves on Ctrl+C and tells open event streams to close
async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, draining connections...");
    state.shutdown.send_replace(true);
}

/// Write debounced saves already acknowledged with 202
async fn finish_pending_saves(state: &AppState) -> usize {
    match state.save.flush().await {
        Ok(flushed) => {
            info!("Flushed {} pending saves before exit", flushed);
            flushed
        },
        Err(e) => {
            error!("Failed to flush pending saves on shutdown: {}", e);
            0
        },
    }
}

#[cfg(test)]
async fn create_app(settings: Settings) -> Result<Router> {
    let state = AppState::build(&settings).await?;
    Ok(router(state))
}

fn router(state: AppState) -> Router {
    use crate::middleware::{error_handler, request_id};
    use axum::middleware;

    let turn_routes = Router::new()
        .route("/v1/turns/begin", post(api::turns::begin_turn))
        .route("/v1/turns/complete", post(api::turns::complete_turn));

    let conversation_routes = Router::new()
        .route(
            "/v1/conversations",
            get(api::conversations::list_conversations),
        )
        .route(
            "/v1/conversations/:domain",
            get(api::conversations::get_conversation)
                .delete(api::conversations::delete_conversation),
        );

    let entity_routes = Router::new()
        .route("/v1/entities", get(api::entities::list_entities))
        .route("/v1/entities/extract", post(api::entities::extract_entities));

    let settings_routes = Router::new()
        .route(
            "/v1/settings/:key",
            get(api::settings::get_setting).put(api::settings::put_setting),
        )
        .route("/v1/save/status", get(api::settings::save_status))
        .route("/v1/settings/flush", post(api::settings::flush_settings))
        .route("/v1/mode", post(api::settings::set_mode));

    let notification_routes = Router::new()
        .route(
            "/v1/notifications",
            get(api::notifications::list_notifications)
                .post(api::notifications::post_notification),
        )
        .route(
            "/v1/notifications/:id",
            delete(api::notifications::dismiss_notification),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(api::stats::get_stats))
        .route("/v1/events", get(api::events::stream_events))
        .merge(turn_routes)
        .merge(conversation_routes)
        .merge(entity_routes)
        .merge(settings_routes)
        .merge(notification_routes)
        .with_state(state)
        .layer(middleware::from_fn(error_handler::log_failures))
        .layer(middleware::from_fn(request_id::add_request_id))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health_check() -> &'static str {
    "OK"
}
