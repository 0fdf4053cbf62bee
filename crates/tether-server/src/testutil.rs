//! In-memory socket, registry and router used by unit tests.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc as fmpsc;
use futures::Sink;
use parking_lot::Mutex;
use serde_json::Value;
use tether_core::{ConnectionId, Frame};

use crate::connection::Connection;
use crate::error::{EncodeError, TransportError};
use crate::registry::Registry;
use crate::router::Router;
use crate::socket::Socket;

/// Remote end of a mock socket.
pub struct MockPeer {
    inbound: fmpsc::UnboundedSender<Result<Frame, TransportError>>,
    frames: Arc<Mutex<Vec<Frame>>>,
    closes: Arc<AtomicUsize>,
}

impl MockPeer {
    pub fn send_frame(&self, frame: Frame) {
        let _ = self.inbound.unbounded_send(Ok(frame));
    }

    pub fn send_data(&self, payload: &str) {
        self.send_frame(Frame::data(payload.to_owned()));
    }

    pub fn send_error(&self, error: TransportError) {
        let _ = self.inbound.unbounded_send(Err(error));
    }

    /// Every frame the connection wrote, in order.
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }

    /// Payloads of written data frames, as strings.
    pub fn data(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| match f {
                Frame::Data(b) => Some(String::from_utf8_lossy(b).into_owned()),
                _ => None,
            })
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.frames.lock().iter().filter(|f| matches!(f, Frame::Ping(_))).count()
    }

    /// How many times the sink was closed.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// What the sink does when it reaches the faulty data frame.
#[derive(Clone, Copy)]
enum Fault {
    /// The write returns an I/O error.
    Fail,
    /// The write panics.
    Panic,
    /// The frame is accepted but never flushed; every later poll stays pending.
    Stall,
}

struct RecordingSink {
    frames: Arc<Mutex<Vec<Frame>>>,
    closes: Arc<AtomicUsize>,
    fault: Option<(usize, Fault)>,
    data_seen: usize,
    stalled: bool,
}

impl Sink<Frame> for RecordingSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.stalled { Poll::Pending } else { Poll::Ready(Ok(())) }
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        let this = self.get_mut();
        if matches!(item, Frame::Data(_)) {
            this.data_seen += 1;
            match this.fault {
                Some((n, Fault::Fail)) if n == this.data_seen => {
                    return Err(TransportError::Io("broken pipe".into()));
                }
                Some((n, Fault::Panic)) if n == this.data_seen => panic!("sink exploded on frame {n}"),
                Some((n, Fault::Stall)) if n == this.data_seen => this.stalled = true,
                _ => {}
            }
        }
        this.frames.lock().push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.stalled { Poll::Pending } else { Poll::Ready(Ok(())) }
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        if self.stalled { Poll::Pending } else { Poll::Ready(Ok(())) }
    }
}

/// A socket whose writes are recorded and whose reads come from the peer.
pub fn mock_socket() -> (Socket, MockPeer) {
    build_socket(None)
}

/// Like [`mock_socket`], but the `n`th data frame write fails.
pub fn mock_socket_failing_at(n: usize) -> (Socket, MockPeer) {
    build_socket(Some((n, Fault::Fail)))
}

/// Like [`mock_socket`], but the `n`th data frame write panics.
pub fn mock_socket_panicking_at(n: usize) -> (Socket, MockPeer) {
    build_socket(Some((n, Fault::Panic)))
}

/// Like [`mock_socket`], but the `n`th data frame write never completes.
pub fn mock_socket_stalling_at(n: usize) -> (Socket, MockPeer) {
    build_socket(Some((n, Fault::Stall)))
}

fn build_socket(fault: Option<(usize, Fault)>) -> (Socket, MockPeer) {
    let (tx, rx) = fmpsc::unbounded();
    let frames = Arc::new(Mutex::new(Vec::new()));
    let closes = Arc::new(AtomicUsize::new(0));
    let sink = RecordingSink {
        frames: Arc::clone(&frames),
        closes: Arc::clone(&closes),
        fault,
        data_seen: 0,
        stalled: false,
    };
    let peer = MockPeer {
        inbound: tx,
        frames,
        closes,
    };
    (Socket::from_parts(sink, rx), peer)
}

/// Registry that records calls in order.
#[derive(Default)]
pub struct RecordingRegistry {
    pub events: Mutex<Vec<(&'static str, ConnectionId)>>,
}

impl RecordingRegistry {
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl Registry for RecordingRegistry {
    fn register(&self, connection: Arc<Connection>) {
        self.events.lock().push(("register", connection.id().clone()));
    }

    fn unregister(&self, connection: &Arc<Connection>) {
        self.events.lock().push(("unregister", connection.id().clone()));
    }
}

/// Router that records payloads and lifecycle calls.
///
/// Parsing the payload `boom` panics. Emitting the event `fail` is rejected.
#[derive(Default)]
pub struct RecordingRouter {
    pub parsed: Mutex<Vec<Bytes>>,
    pub connected: AtomicUsize,
    pub closed: AtomicUsize,
}

impl RecordingRouter {
    pub fn parsed(&self) -> Vec<String> {
        self.parsed
            .lock()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Router for RecordingRouter {
    fn parse(&self, _connection: &Arc<Connection>, payload: Bytes) {
        assert!(payload.as_ref() != b"boom", "router exploded");
        self.parsed.lock().push(payload);
    }

    fn prepare_for_emit(&self, event: &str, data: &Value) -> Result<Bytes, EncodeError> {
        if event == "fail" {
            return Err(EncodeError::Rejected {
                event: event.to_owned(),
                reason: "test rejection".into(),
            });
        }
        Ok(Bytes::from(format!("{event}:{data}")))
    }

    fn on_connected(&self, _connection: &Arc<Connection>) {
        let _ = self.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_closed(&self, _connection: &Arc<Connection>) {
        let _ = self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `cond` every 10ms for up to five seconds.
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
