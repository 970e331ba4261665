//! WebSocket connection to the backend's progress notification channel.

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::info;

use crate::error::BackendError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open notification channel bound to one session identifier.
///
/// Reading events is left to the caller through [`EventStream::into_inner`].
pub struct EventStream {
    session_id: String,
    url: String,
    socket: Socket,
}

impl EventStream {
    pub(crate) async fn connect(ws_base_url: &str, session_id: &str) -> Result<Self, BackendError> {
        let url = event_stream_url(ws_base_url, session_id);
        info!(url = %url, "Connecting to backend event stream");

        let (socket, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| BackendError::EventStream {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

        Ok(Self {
            session_id: session_id.to_string(),
            url,
            socket,
        })
    }

    /// Session identifier the stream was opened with.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Take the underlying WebSocket.
    pub fn into_inner(self) -> Socket {
        self.socket
    }

    /// Send a close frame and wait for the handshake to finish.
    pub async fn close(mut self) -> Result<(), BackendError> {
        self.socket
            .close(None)
            .await
            .map_err(|e| BackendError::EventStream {
                url: self.url.clone(),
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("session_id", &self.session_id)
            .field("url", &self.url)
            .finish()
    }
}

fn event_stream_url(ws_base_url: &str, session_id: &str) -> String {
    format!(
        "{}/ws?clientId={}",
        ws_base_url,
        urlencoding::encode(session_id)
    )
}
