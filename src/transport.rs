use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the conversation socket. Resolves once the handshake completes.
pub async fn connect(config: &ClientConfig) -> Result<WsStream> {
    let mut request = config.server_url.as_str().into_client_request()?;
    if let Some(token) = config.token() {
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
    }

    log::info!("🔗 Connecting to {}", config.server_url);
    let (ws_stream, response) = connect_async(request).await?;
    log::info!("🔗 Connected (status {})", response.status());
    Ok(ws_stream)
}

/// [`connect`], abandoned with [`ClientError::Interrupted`] when `cancel` fires first
pub async fn connect_until_cancelled(
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<WsStream> {
    tokio::select! {
        _ = cancel.cancelled() => {
            log::info!("🛑 Connection attempt interrupted");
            Err(ClientError::Interrupted)
        }
        result = connect(config) => result,
    }
}
