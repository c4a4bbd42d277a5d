//! One-shot HTTP probe of the stream URL.
//!
//! Browser stream clients surface only an opaque failure on handshake
//! rejection; this probe makes authentication and routing errors
//! observable as typed errors before the opaque stream upgrade is
//! attempted.

use std::collections::HashMap;

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::PreflightError;

/// Translates a `ws`/`wss` stream URL into the `http`/`https` URL used for
/// the preflight probe. Any other scheme is left untouched.
///
/// # Errors
///
/// Returns [`PreflightError::Transport`] if `stream_url` does not parse as
/// a URL.
pub fn translate_scheme(stream_url: &str) -> Result<Url, PreflightError> {
    let mut url = Url::parse(stream_url).map_err(|e| PreflightError::Transport(e.to_string()))?;
    let translated = match url.scheme() {
        "ws" => Some("http"),
        "wss" => Some("https"),
        _ => None,
    };
    if let Some(scheme) = translated {
        url.set_scheme(scheme)
            .map_err(|()| PreflightError::Transport(format!("cannot set scheme {scheme}")))?;
    }
    Ok(url)
}

/// Issues a single GET against the http(s)-translated `stream_url` with
/// `headers`, classifying the response per the preflight success rule.
///
/// Success: HTTP 200, or HTTP 400 with a body exactly equal to
/// `"Bad Request\n"` (the server's signal that only the upgrade handshake
/// is missing).
///
/// # Errors
///
/// Returns a typed [`PreflightError`] for any other outcome: a registered
/// status (400/401/404/409/500) with a body other than the sentinel
/// yields the corresponding variant; any other status yields
/// [`PreflightError::Generic`]; a transport-level failure (DNS, TLS,
/// connection refused) yields [`PreflightError::Transport`].
pub async fn preflight(
    client: &Client,
    stream_url: &str,
    headers: &HashMap<String, String>,
) -> Result<(), PreflightError> {
    let url = translate_scheme(stream_url)?;
    debug!(url = %url, "sending preflight probe");

    let mut request = client.get(url.clone());
    for (key, value) in headers {
        request = request.header(key, value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| PreflightError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    if status == 200 {
        debug!(url = %url, "preflight succeeded (200)");
        return Ok(());
    }

    let body = response
        .text()
        .await
        .map_err(|e| PreflightError::Transport(e.to_string()))?;

    if status == 400 && body == PreflightError::UPGRADE_ONLY_SENTINEL {
        debug!(url = %url, "preflight succeeded (400 upgrade-only)");
        return Ok(());
    }

    warn!(url = %url, status, "preflight rejected");
    Err(PreflightError::from_status(status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Spawns a real listener that accepts one connection, discards the
    /// request, and writes a single HTTP response built from `status` and
    /// `body`. Returns the address to hit.
    async fn spawn_responder(status: u16, reason: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });

        format!("ws://{addr}/socket")
    }

    #[test]
    fn translates_ws_to_http() {
        let url = translate_scheme("ws://example.test/socket").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn translates_wss_to_https() {
        let url = translate_scheme("wss://example.test/socket").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn leaves_other_schemes_untouched() {
        let url = translate_scheme("http://example.test/socket").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[tokio::test]
    async fn success_on_200() {
        let url = spawn_responder(200, "OK", "").await;
        let client = Client::new();
        preflight(&client, &url, &HashMap::new()).await.unwrap();
    }

    #[tokio::test]
    async fn success_on_400_with_sentinel_body() {
        let url = spawn_responder(400, "Bad Request", "Bad Request\n").await;
        let client = Client::new();
        preflight(&client, &url, &HashMap::new()).await.unwrap();
    }

    #[tokio::test]
    async fn fails_on_400_without_sentinel_body() {
        let url = spawn_responder(400, "Bad Request", "Bad Request").await;
        let client = Client::new();
        let err = preflight(&client, &url, &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, PreflightError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn fails_with_conflict_on_409() {
        let url = spawn_responder(409, "Conflict", "name taken").await;
        let client = Client::new();
        let err = preflight(&client, &url, &HashMap::new()).await.unwrap_err();
        assert_eq!(
            err,
            PreflightError::Conflict {
                message: "name taken".into()
            }
        );
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn fails_generic_on_unregistered_status() {
        let url = spawn_responder(503, "Service Unavailable", "").await;
        let client = Client::new();
        let err = preflight(&client, &url, &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, PreflightError::Generic { status: 503, .. }));
    }
}
