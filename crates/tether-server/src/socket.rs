//! Transport handle owned by a connection.
//!
//! A [`Socket`] is a frame sink (write half) and a frame stream (read half).
//! The halves are handed to the write and read pumps respectively, so neither
//! needs a lock. Adapters exist for Axum server-side WebSockets and for
//! tokio-tungstenite streams (client side or custom acceptors).

use std::pin::Pin;

use axum::extract::ws::Message as AxumMessage;
use bytes::Bytes;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tether_core::Frame;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use crate::error::TransportError;

/// Write half of a socket.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Read half of a socket.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// A live, already-upgraded duplex transport.
pub struct Socket {
    sink: FrameSink,
    stream: FrameStream,
}

impl Socket {
    /// Wrap any combined frame sink/stream.
    pub fn new<T>(transport: T) -> Self
    where
        T: Sink<Frame, Error = TransportError>
            + Stream<Item = Result<Frame, TransportError>>
            + Send
            + 'static,
    {
        let (sink, stream) = transport.split();
        Self::from_parts(sink, stream)
    }

    /// Build a socket from separately owned halves.
    pub fn from_parts<W, R>(sink: W, stream: R) -> Self
    where
        W: Sink<Frame, Error = TransportError> + Send + 'static,
        R: Stream<Item = Result<Frame, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Adapt an upgraded Axum WebSocket.
    pub fn from_axum(ws: axum::extract::ws::WebSocket) -> Self {
        let (sink, stream) = ws.split();
        let sink = sink.with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame_to_axum(frame))));
        let stream = stream.map(|msg| msg.map(axum_to_frame).map_err(TransportError::from));
        Self::from_parts(sink, stream)
    }

    /// Adapt a tokio-tungstenite stream.
    ///
    /// tungstenite buffers a whole message before the read pump can check its
    /// size, and its default cap is 64 MiB. Build the stream with
    /// [`ConnectionLimits::websocket_config`](crate::ConnectionLimits::websocket_config)
    /// (for example through `connect_async_with_config`) so oversized
    /// messages are refused while they are still being read.
    pub fn from_tungstenite<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let sink = sink.with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame_to_tungstenite(frame))));
        let stream = stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(msg) => tungstenite_to_frame(msg).map(Ok),
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });
        Self::from_parts(sink, stream)
    }

    pub(crate) fn into_parts(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket").finish_non_exhaustive()
    }
}

/// Text when the payload is UTF-8, binary otherwise.
fn split_payload(payload: Bytes) -> Result<String, Bytes> {
    match std::str::from_utf8(&payload) {
        Ok(text) => Ok(text.to_owned()),
        Err(_) => Err(payload),
    }
}

fn frame_to_axum(frame: Frame) -> AxumMessage {
    match frame {
        Frame::Data(payload) => match split_payload(payload) {
            Ok(text) => AxumMessage::Text(text.into()),
            Err(binary) => AxumMessage::Binary(binary),
        },
        Frame::Ping(payload) => AxumMessage::Ping(payload),
        Frame::Pong(payload) => AxumMessage::Pong(payload),
        Frame::Close => AxumMessage::Close(None),
    }
}

fn axum_to_frame(msg: AxumMessage) -> Frame {
    match msg {
        AxumMessage::Text(text) => Frame::Data(Bytes::copy_from_slice(text.as_str().as_bytes())),
        AxumMessage::Binary(payload) => Frame::Data(payload),
        AxumMessage::Ping(payload) => Frame::Ping(payload),
        AxumMessage::Pong(payload) => Frame::Pong(payload),
        AxumMessage::Close(_) => Frame::Close,
    }
}

fn frame_to_tungstenite(frame: Frame) -> WsMessage {
    match frame {
        Frame::Data(payload) => match split_payload(payload) {
            Ok(text) => WsMessage::Text(text.into()),
            Err(binary) => WsMessage::Binary(binary),
        },
        Frame::Ping(payload) => WsMessage::Ping(payload),
        Frame::Pong(payload) => WsMessage::Pong(payload),
        Frame::Close => WsMessage::Close(None),
    }
}

fn tungstenite_to_frame(msg: WsMessage) -> Option<Frame> {
    match msg {
        WsMessage::Text(text) => Some(Frame::Data(Bytes::copy_from_slice(text.as_str().as_bytes()))),
        WsMessage::Binary(payload) => Some(Frame::Data(payload)),
        WsMessage::Ping(payload) => Some(Frame::Ping(payload)),
        WsMessage::Pong(payload) => Some(Frame::Pong(payload)),
        WsMessage::Close(_) => Some(Frame::Close),
        // Raw frames only surface when reading with a custom config.
        WsMessage::Frame(_) => None,
    }
}
