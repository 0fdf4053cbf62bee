//! Exactly-once connection teardown.

use std::mem;
use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::read_pump::ReadExit;
use super::write_pump::WriteExit;
use super::Connection;

/// Runs unregister → close queue → close socket → `on_closed` once.
///
/// The normal path is [`Teardown::finish`]. If the `run` future is dropped
/// first, `Drop` performs the same sequence synchronously and aborts the
/// write pump instead of waiting for it.
pub(super) struct Teardown {
    conn: Arc<Connection>,
    writer: Option<JoinHandle<WriteExit>>,
    released: bool,
    notified: bool,
}

impl Teardown {
    pub(super) fn new(conn: Arc<Connection>, writer: JoinHandle<WriteExit>) -> Self {
        Self {
            conn,
            writer: Some(writer),
            released: false,
            notified: false,
        }
    }

    pub(super) async fn finish(mut self, exit: ReadExit) {
        info!(conn_id = %self.conn.id, reason = %exit, "read pump stopped");
        self.release();

        if let Some(mut writer) = self.writer.take() {
            let wait = self.conn.limits.write_timeout;
            match tokio::time::timeout(wait, &mut writer).await {
                Ok(Ok(exit)) => debug!(conn_id = %self.conn.id, reason = %exit, "write pump stopped"),
                Ok(Err(e)) => warn!(conn_id = %self.conn.id, error = %e, "write pump task failed"),
                Err(_) => {
                    warn!(conn_id = %self.conn.id, "write pump still busy after write timeout, aborting");
                    writer.abort();
                }
            }
        }

        self.notify_closed();
    }

    fn release(&mut self) {
        if mem::replace(&mut self.released, true) {
            return;
        }
        self.conn.registry.unregister(&self.conn);
        let _ = self.conn.close();
        if self.conn.closer.close() {
            debug!(conn_id = %self.conn.id, "socket closed by teardown");
        }
        counter!("ws_connections_closed_total").increment(1);
    }

    fn notify_closed(&mut self) {
        if mem::replace(&mut self.notified, true) {
            return;
        }
        self.conn.router.on_closed(&self.conn);
        info!(conn_id = %self.conn.id, "connection closed");
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.released && self.notified {
            return;
        }
        warn!(conn_id = %self.conn.id, "connection task stopped abnormally, tearing down");
        self.release();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        self.notify_closed();
    }
}
