//! jacques daemon entrypoint: wires up the Session Registry task, the WS
//! Hub, the HTTP/SSE Gateway, and the background Process Monitor and
//! Cleanup Service loops described in spec §4-§6.

mod http_gateway;
mod registry_task;
mod ws_hub;

use std::net::SocketAddr;
use std::time::Duration;

use jacques_core::config;
use jacques_core::session::{IDLE_TIMEOUT_MS, PROCESS_VERIFY_INTERVAL_MS};
use jacques_protocol::{HTTP_GATEWAY_PORT, WS_HUB_PORT};

/// How often the Cleanup Service sweeps expired tombstones and idle
/// sessions. Not named explicitly by the spec's timing table; chosen to sit
/// well under the 30 s tombstone TTL so an eviction never lags the TTL it's
/// enforcing by more than this interval.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Some(home) = config::jacques_home() {
        jacques_core::backoff::apply_startup_backoff(&home.join("daemon-backoff.json")).await;
    }

    let config = config::load_config();
    let registry = registry_task::spawn(config.notifications.clone());

    let ws_addr = SocketAddr::from(([127, 0, 0, 1], WS_HUB_PORT));
    let http_addr = SocketAddr::from(([127, 0, 0, 1], HTTP_GATEWAY_PORT));

    let ws_registry = registry.clone();
    let ws_task = tokio::spawn(async move {
        if let Err(err) = ws_hub::serve(ws_registry, ws_addr).await {
            tracing::error!(error = %err, "WS Hub exited");
        }
    });

    let http_state = http_gateway::AppState::new(registry.clone());
    let http_task = tokio::spawn(async move {
        if let Err(err) = http_gateway::serve(http_state, http_addr).await {
            tracing::error!(error = %err, "HTTP Gateway exited");
        }
    });

    let monitor_registry = registry.clone();
    tokio::spawn(async move {
        process_monitor_loop(monitor_registry).await;
    });

    let cleanup_registry = registry;
    tokio::spawn(async move {
        cleanup_loop(cleanup_registry).await;
    });

    let _ = tokio::join!(ws_task, http_task);
}

/// Process Monitor (spec §4.5): every [`PROCESS_VERIFY_INTERVAL_MS`],
/// snapshots the live process table and hands it to the registry task as a
/// single atomic pass, then fans the resulting deltas out as log lines.
async fn process_monitor_loop(registry: registry_task::RegistryHandle) {
    let mut interval = tokio::time::interval(Duration::from_millis(PROCESS_VERIFY_INTERVAL_MS));
    loop {
        interval.tick().await;

        let running = tokio::task::spawn_blocking(jacques_core::process::get_claude_processes)
            .await
            .unwrap_or_default();
        let now_ms = chrono::Utc::now().timestamp_millis();

        let outcome = registry.run_monitor_pass(running, now_ms, IDLE_TIMEOUT_MS).await;
        if !outcome.retired_dead.is_empty()
            || !outcome.retired_trashed.is_empty()
            || !outcome.retired_idle.is_empty()
            || !outcome.enriched.is_empty()
            || !outcome.promoted_bypass.is_empty()
        {
            tracing::info!(
                retired_dead = outcome.retired_dead.len(),
                retired_trashed = outcome.retired_trashed.len(),
                retired_idle = outcome.retired_idle.len(),
                enriched = outcome.enriched.len(),
                promoted_bypass = outcome.promoted_bypass.len(),
                "process monitor pass"
            );
        }
    }
}

/// Cleanup Service sweep (spec §4.6): evicts expired end-of-session
/// tombstones so a session id can be re-registered again.
async fn cleanup_loop(registry: registry_task::RegistryHandle) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
    loop {
        interval.tick().await;
        let now_ms = chrono::Utc::now().timestamp_millis();
        registry.evict_expired_tombstones(now_ms).await;
    }
}
