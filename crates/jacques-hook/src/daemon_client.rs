//! WS client for sending a single hook event to the WS Hub (spec §4.8,
//! §6): connects, sends one text frame, and disconnects. The hub treats a
//! producer connection as disposable, so there is no session/handshake to
//! maintain here — connect, send, close.

use std::time::Duration;

use futures_util::SinkExt;
use jacques_protocol::hook_event::HookEvent;
use tokio_tungstenite::tungstenite::Message;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RETRY_DELAY: Duration = Duration::from_millis(50);

fn server_url() -> String {
    std::env::var("JACQUES_SERVER_URL").unwrap_or_else(|_| format!("ws://127.0.0.1:{}/", jacques_protocol::WS_HUB_PORT))
}

/// Sends `event` to the hub, retrying once after a short delay on failure.
/// Never panics; a daemon that isn't running just means the event is lost,
/// same as the teacher's at-most-once delivery guarantee for producers.
pub async fn send_event(event: &HookEvent) -> Result<(), String> {
    match send_once(event).await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::warn!(error = %err, "failed to send hook event to daemon, retrying once");
            tokio::time::sleep(RETRY_DELAY).await;
            send_once(event).await
        }
    }
}

async fn send_once(event: &HookEvent) -> Result<(), String> {
    let url = server_url();
    let payload = serde_json::to_string(event).map_err(|e| format!("failed to serialize event: {e}"))?;

    let (mut socket, _response) = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&url))
        .await
        .map_err(|_| format!("timed out connecting to {url}"))?
        .map_err(|e| format!("failed to connect to {url}: {e}"))?;

    socket
        .send(Message::Text(payload))
        .await
        .map_err(|e| format!("failed to send event: {e}"))?;
    let _ = socket.close(None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    struct EnvGuard {
        prior: Option<String>,
    }

    impl EnvGuard {
        fn set(value: &str) -> Self {
            let prior = std::env::var("JACQUES_SERVER_URL").ok();
            std::env::set_var("JACQUES_SERVER_URL", value);
            Self { prior }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prior {
                Some(value) => std::env::set_var("JACQUES_SERVER_URL", value),
                None => std::env::remove_var("JACQUES_SERVER_URL"),
            }
        }
    }

    #[test]
    fn server_url_defaults_to_ws_hub_port() {
        let _lock = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        std::env::remove_var("JACQUES_SERVER_URL");
        assert_eq!(server_url(), format!("ws://127.0.0.1:{}/", jacques_protocol::WS_HUB_PORT));
    }

    #[test]
    fn server_url_honours_override() {
        let _lock = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let _guard = EnvGuard::set("ws://example.test:9999/");
        assert_eq!(server_url(), "ws://example.test:9999/");
    }
}
