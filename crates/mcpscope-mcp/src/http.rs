//! Network transport
//!
//! sse servers are reached with rmcp's streamable HTTP client. Configured
//! headers become the reqwest client's default headers, and a session token
//! is sent as a bearer credential.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcpscope_core::{ClosedNotifier, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use tracing::{debug, error, info};

use crate::channel::RmcpChannel;
use crate::handler::McpClientHandler;

/// Build the default header map. A token overrides any configured
/// Authorization header.
pub(crate) fn build_headers(
    headers: &HashMap<String, String>,
    token: Option<&str>,
) -> Result<HeaderMap, TransportError> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            TransportError::InvalidConfig(format!("invalid header name '{}': {}", key, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TransportError::InvalidConfig(format!("invalid header value for '{}': {}", key, e))
        })?;
        header_map.insert(name, value);
    }

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| TransportError::InvalidConfig("token is not a valid header value".into()))?;
        value.set_sensitive(true);
        header_map.insert(AUTHORIZATION, value);
    }
    Ok(header_map)
}

pub(crate) async fn open(
    server_name: &str,
    url: &str,
    headers: &HashMap<String, String>,
    token: Option<&str>,
    handshake_timeout: Duration,
    notifier: ClosedNotifier,
) -> Result<Arc<RmcpChannel>, TransportError> {
    let header_map = build_headers(headers, token)?;
    debug!(
        server = %server_name,
        url = %url,
        header_count = header_map.len(),
        with_token = token.is_some(),
        channel_id = notifier.channel_id(),
        "Connecting to HTTP server"
    );

    let client = reqwest::Client::builder()
        .default_headers(header_map)
        .build()
        .map_err(|e| TransportError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

    let transport_config = StreamableHttpClientTransportConfig::with_uri(url);
    let transport = StreamableHttpClientTransport::with_client(client, transport_config);

    let handler = McpClientHandler::new(server_name);
    let client = match tokio::time::timeout(handshake_timeout, handler.serve(transport)).await {
        Ok(Ok(client)) => client,
        Ok(Err(e)) => {
            error!(server = %server_name, url = %url, error = %e, "HTTP connection failed");
            return Err(TransportError::Handshake(e.to_string()));
        }
        Err(_) => {
            error!(server = %server_name, url = %url, timeout = ?handshake_timeout, "HTTP connection timed out");
            return Err(TransportError::Handshake(format!(
                "no initialize response within {:?}",
                handshake_timeout
            )));
        }
    };

    info!(server = %server_name, url = %url, "HTTP server connected");
    Ok(RmcpChannel::spawn(server_name, client, notifier))
}
