use crate::{
    auth,
    classify::classify,
    config::Config,
    errors::AppError,
    logbook::{LogEntry, Logbook},
    metadata::{Extractor, FetchOptions, ForwardedHeaders},
    render,
    resolve::{normalize_path, query_param, Resolver},
    storage::BackendLocal,
};
use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

pub const LOGS_PATH: &str = "/_logs";
pub const DEBUG_PATH: &str = "/_debug";
pub const HEALTH_PATH: &str = "/health";

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,
    pub resolver: Resolver,
    pub extractor: Extractor,
    pub logbook: Logbook,
}

impl SharedState {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let resolver = Resolver::from_config(&config.short_links)?;
        let extractor = Extractor::http(FetchOptions::from(&config))?;
        let logs_dir = config.logs_dir();
        let store = BackendLocal::new(&logs_dir)
            .with_context(|| format!("couldn't create {}", logs_dir.display()))?;
        let logbook = Logbook::new(Arc::new(store), config.log_requests);

        Ok(Self {
            config: Arc::new(config),
            resolver,
            extractor,
            logbook,
        })
    }
}

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(
                    tower_http::trace::TraceLayer::new_for_http()
                        .make_span_with(
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                        )
                        .on_response(
                            tower_http::trace::DefaultOnResponse::new()
                                .level(tracing::Level::INFO),
                        ),
                )
                // the same URL answers differently for bots and humans
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::VARY,
                    HeaderValue::from_static("user-agent"),
                )),
        )
        .with_state(state)
}

async fn start_app(state: SharedState) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr.clone();
    let app = router(Arc::new(state));

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        // pending log writes may be dropped here
        log::warn!("shutting down");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("couldn't bind {bind_addr}"))?;
    log::info!("listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(config: Config) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let state = SharedState::from_config(config)?;
            start_app(state).await
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

fn health() -> Response {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn redirect(location: HeaderValue) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn html(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Every request lands here. A resolvable target wins over `/health`.
async fn dispatch(
    State(state): State<Arc<SharedState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = normalize_path(uri.path());
    let query = uri.query();

    if path == LOGS_PATH {
        return read_logs(&state, query, &headers).await;
    }

    let Some(target) = state.resolver.resolve(uri.path(), query) else {
        if path == HEALTH_PATH {
            return Ok(health());
        }
        return Err(AppError::MissingTarget);
    };

    state
        .logbook
        .record(LogEntry::from_request(&target, &headers));

    let location = HeaderValue::from_str(&target)
        .map_err(|_| AppError::InvalidTarget(target.to_string()))?;

    let force_preview = query_param(query, "preview").as_deref() == Some("1");
    let classification = classify(header_str(&headers, header::USER_AGENT), force_preview);
    log::debug!(
        "{target}: {:?} for {:?}",
        classification.kind,
        classification.user_agent
    );

    if !classification.wants_preview(state.config.preview_search_engines) {
        return Ok(redirect(location));
    }

    let forwarded = ForwardedHeaders {
        user_agent: header_str(&headers, header::USER_AGENT).map(str::to_string),
        accept_language: header_str(&headers, header::ACCEPT_LANGUAGE).map(str::to_string),
    };

    let meta = match state.extractor.extract(&target, &forwarded).await {
        Ok(meta) => meta,
        Err(err) => {
            log::warn!("{target}: preview unavailable, redirecting: {err}");
            return Ok(redirect(location));
        }
    };

    if path == DEBUG_PATH {
        return Ok(Json(meta).into_response());
    }

    Ok(html(render::render_preview(&meta, &target)))
}

async fn read_logs(
    state: &SharedState,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let token = query_param(query, "token");
    if !auth::is_authorized(
        token.as_deref(),
        header_str(headers, header::AUTHORIZATION),
        state.config.log_read_token.as_deref(),
    ) {
        return Err(AppError::Unauthorized);
    }

    let logbook = state.logbook.clone();
    let entries = tokio::task::spawn_blocking(move || logbook.entries())
        .await
        .context("log reader task failed")?;

    let body = serde_json::to_string_pretty(&entries).context("couldn't serialize log entries")?;

    Ok((
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response())
}
