//! Duplex connection to the speech agent.

use crate::error::{VoiceError, VoiceResult};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

pub type AgentStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the WebSocket to the agent, authenticating with `Token <api_key>`.
pub async fn connect(url: &str, api_key: &str) -> VoiceResult<AgentStream> {
    let mut request = url.into_client_request()?;
    let token = HeaderValue::from_str(&format!("Token {}", api_key))
        .map_err(|e| VoiceError::Config(format!("API key is not a valid header value: {}", e)))?;
    request.headers_mut().insert(AUTHORIZATION, token);

    debug!(url, "Connecting to agent");
    let (stream, response) = connect_async(request).await?;
    info!(url, status = %response.status(), "Connected to agent");
    Ok(stream)
}
