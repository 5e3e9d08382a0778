//! WebSocket transport for the telemetry stream.

use futures::{future, SinkExt, StreamExt};
use sim_api::Url;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use super::{StreamError, Subscription};

/// Opens the telemetry WebSocket at `url` and starts forwarding it.
///
/// Text frames are telemetry messages. Binary frames are accepted if they
/// hold UTF-8. A close frame ends the stream gracefully; any other
/// transport error ends it abnormally.
pub async fn connect(url: &Url) -> Result<Subscription, StreamError> {
    let (socket, _response) =
        connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
    info!(%url, "telemetry stream connected");

    let (mut sink, stream) = socket.split();
    let frames = stream
        .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| future::ready(frame_text(message)));

    Ok(Subscription::spawn(frames, move || async move {
        if let Err(e) = sink.close().await {
            debug!(error = %e, "telemetry close handshake failed");
        }
    }))
}

/// Maps one WebSocket read to a text frame, skipping control frames.
fn frame_text(message: Result<Message, WsError>) -> Option<Result<String, WsError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Some(Ok(text)),
            Err(_) => {
                warn!("dropping non-UTF-8 binary telemetry frame");
                None
            }
        },
        Ok(_) => None,
        // A peer that closes without a close frame is still a finished run.
        Err(WsError::ConnectionClosed) => None,
        Err(e) => Some(Err(e)),
    }
}
