use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use chrono::Utc;
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use ia_broadcast::{EventBroadcaster, MessageBatcher};
use ia_domain::config::Config;
use ia_engine::{RoomLockMap, RoomManager, TurnEngine};
use ia_domain::trace::TraceEvent;
use ia_persistence::JsonSnapshotStore;
use ia_protocol::event::GameEvent;

mod api;
mod auth;
mod cli;
mod state;
mod ws;

use auth::hash_token;
use cli::{Cli, Command};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server(Arc::new(cli::load_config())).await
        }
        Some(Command::ConfigValidate) => {
            let config = cli::load_config();
            if !cli::validate_config(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::ConfigShow) => {
            cli::show_config(&cli::load_config());
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ia_gateway=debug")))
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("interaction-server starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ia_domain::config::ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ia_domain::config::ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ia_domain::config::ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ia_domain::config::ConfigSeverity::Error).count()
        );
    }

    // ── Snapshot persistence ──────────────────────────────────────────
    let snapshot_dir = std::env::var("SNAPSHOT_DIR").unwrap_or_else(|_| "./data/snapshots".into());
    let store = Arc::new(
        JsonSnapshotStore::new(&snapshot_dir)
            .await
            .with_context(|| format!("initializing snapshot store at {snapshot_dir}"))?,
    );
    tracing::info!(dir = %snapshot_dir, "snapshot store ready");

    // ── Room manager, turn engine ────────────────────────────────────
    let rooms = Arc::new(RoomManager::new(config.rooms.clone(), Some(store)));
    let room_locks = Arc::new(RoomLockMap::new());
    let turn_engine = Arc::new(TurnEngine::new(
        config.rules.clone(),
        Duration::from_millis(config.rooms.turn_time_limit_ms),
    ));
    tracing::info!(
        movement_budget = config.rules.movement_budget,
        attack_range = config.rules.attack_range,
        "room manager + turn engine ready"
    );

    // ── Event broadcaster, message batcher ───────────────────────────
    let broadcaster = Arc::new(EventBroadcaster::new(config.subscriptions.clone()));
    let batcher = Arc::new(MessageBatcher::new(config.batcher.clone()));
    tracing::info!(
        max_batch_size = config.batcher.max_batch_size,
        batch_delay_ms = config.batcher.batch_delay_ms,
        "event broadcaster + message batcher ready"
    );

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = match std::env::var("API_TOKEN") {
        Ok(token) if !token.is_empty() => {
            tracing::info!("API bearer-token auth enabled");
            Some(hash_token(&token))
        }
        _ => {
            tracing::warn!("API bearer-token auth DISABLED — set API_TOKEN to enable");
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        rooms,
        room_locks,
        turn_engine,
        broadcaster,
        batcher,
        api_token_hash,
    };

    // ── Periodic dirty-room snapshot flush ───────────────────────────
    {
        let state = state.clone();
        let interval_ms = config.rooms.snapshot_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                match state.rooms.flush_dirty().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(rooms = n, "flushed dirty room snapshots"),
                    Err(err) => tracing::warn!(%err, "snapshot flush failed"),
                }
            }
        });
    }

    // ── Periodic inactivity sweep ─────────────────────────────────────
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let removed = state.rooms.sweep(Utc::now());
                for interaction_id in removed {
                    state.broadcaster.remove_room(&interaction_id);
                    state.room_locks.remove(&interaction_id);
                    state.batcher.cleanup(&interaction_id);
                    tracing::info!(interaction_id = %interaction_id, "room swept for inactivity");
                }
            }
        });
    }

    // ── Periodic subscription TTL sweep ─────────────────────────────────
    {
        let state = state.clone();
        let ttl_ms = config.subscriptions.ttl_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis((ttl_ms / 10).max(1_000)));
            loop {
                interval.tick().await;
                state.broadcaster.cleanup();
            }
        });
    }

    // ── Periodic room-lock pruning ─────────────────────────────────────
    {
        let room_locks = state.room_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                room_locks.prune_idle();
            }
        });
    }

    // ── Periodic overdue-turn timeout sweep ───────────────────────────
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                check_overdue_turns(&state).await;
            }
        });
    }

    // ── Batcher flush loop ─────────────────────────────────────────────
    {
        let state = state.clone();
        let tick = Duration::from_millis((config.batcher.batch_delay_ms / 2).max(10));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                flush_due_batches(&state);
            }
        });
    }
    tracing::info!("background tasks started");

    // ── CORS layer ─────────────────────────────────────────────────────
    let cors_origins: Vec<String> = std::env::var("CORS_ALLOWED_ORIGINS")
        .map(|v| v.split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_else(|_| vec![config.server.frontend_url.clone()]);
    let cors_layer = build_cors_layer(&cors_origins);

    // ── Concurrency limit ────────────────────────────────────────────
    let max_concurrent = std::env::var("MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Rate-limit layer (per-IP token bucket via governor) ──────────
    let per_second = (config.rate_limit.max_requests as u64 * 1000 / config.rate_limit.window_ms.max(1)).max(1);
    let gov_config = tower_governor::governor::GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(config.rate_limit.max_requests.max(1))
        .finish()
        .expect("rate_limit: window_ms and max_requests must be > 0");
    tracing::info!(per_second, burst_size = config.rate_limit.max_requests, "per-IP rate limiting enabled");
    let governor_layer = tower_governor::GovernorLayer {
        config: Arc::new(gov_config),
    };

    // ── Router ───────────────────────────────────────────────────────
    let router = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .layer(governor_layer)
        .with_state(state);

    // ── Bind ───────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "interaction-server listening");

    axum::serve(listener, router).await.context("axum server error")?;

    Ok(())
}

/// For every room whose active turn's deadline has passed, force a
/// server-driven timeout and tell subscribers the turn moved on.
async fn check_overdue_turns(state: &AppState) {
    for interaction_id in state.rooms.interaction_ids() {
        let Some(_permit) = state.room_locks.acquire(&interaction_id).await.ok() else {
            continue;
        };
        let record = state.rooms.with_room(&interaction_id, |room| {
            if !state.turn_engine.is_overdue(room) {
                return None;
            }
            state.turn_engine.timeout_turn(room);
            room.game_state.turn_history.last().cloned()
        });
        if let Some(Some(record)) = record {
            state.broadcaster.broadcast(
                &interaction_id,
                GameEvent::TurnSkipped {
                    interaction_id: interaction_id.clone(),
                    timestamp: Utc::now(),
                    entity_id: record.entity_id,
                    turn_number: record.turn_number,
                    round_number: record.round_number,
                    reason: "turn time limit exceeded".into(),
                },
            );
        }
    }
}

/// Flush every room whose batched deltas are due and broadcast the
/// resulting `STATE_DELTA` event.
fn flush_due_batches(state: &AppState) {
    for interaction_id in state.batcher.active_rooms() {
        if !state.batcher.is_due(&interaction_id) {
            continue;
        }
        let Some(deltas) = state.batcher.begin_flush(&interaction_id) else {
            continue;
        };
        if !deltas.is_empty() {
            let batch = ia_protocol::event::DeltaBatch {
                deltas,
                timestamp: Utc::now(),
                batch_id: uuid::Uuid::new_v4().to_string(),
            };
            TraceEvent::BatchFlushed {
                interaction_id: interaction_id.clone(),
                batch_id: batch.batch_id.clone(),
                message_count: batch.deltas.len(),
                delta_count: batch.deltas.len(),
            }
            .emit();
            state.broadcaster.broadcast_delta(&interaction_id, batch);
        }
        state.batcher.end_flush(&interaction_id);
    }
}

/// Build a [`CorsLayer`] from the configured allowed origins. Origins may
/// contain a trailing `*` wildcard for the port segment (e.g.
/// `http://localhost:*`), expanded into a predicate that matches any port
/// on that host. A literal `"*"` allows all origins.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    if allowed_origins.len() == 1 && allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, "x-user-id".parse().unwrap()]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in allowed_origins {
        if let Some(prefix) = origin.strip_suffix('*') {
            wildcard_prefixes.push(prefix.to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, "x-user-id".parse().unwrap()])
        .allow_credentials(true)
}
