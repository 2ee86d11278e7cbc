//! Per-node TCP session
//!
//! Each cluster member gets one connection, implemented as an actor task
//! that owns the socket. The task dials, proposes the protocol tag,
//! then serves queued requests strictly in order with at most one in
//! flight; the wire does not multiplex, so responses are matched to
//! requests purely by arrival order.
//!
//! On any failure the task fails the in-flight and queued requests,
//! publishes `Disconnected`, and redials after the reconnect interval.
//! Submissions made while disconnected fail immediately so the cluster
//! can fall through to another replica; submissions made while dialing
//! or negotiating are queued and dispatched once the server accepts the
//! protocol.

use crate::common::{ClientConfig, Error, Result};
use crate::protocol;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Responses above this are treated as a broken peer.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    ProtocolProposal,
    Idle,
    Request,
    Disconnected,
}

/// Self-reported readiness: `Good` covers every state in which the
/// session is live or still being established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Good,
    Bad,
}

struct PendingRequest {
    body: Vec<u8>,
    reply: oneshot::Sender<Result<Bytes>>,
}

/// Handle to a node session. Owned by the cluster; cloneable state is
/// shared with the actor task.
pub struct Connection {
    addr: String,
    tx: mpsc::Sender<PendingRequest>,
    state_rx: watch::Receiver<ConnState>,
    shutdown: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Spawn the session task for `addr` and return its handle.
    pub fn open(addr: String, config: &ClientConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (state_tx, state_rx) = watch::channel(ConnState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(AtomicBool::new(false));

        let actor = ConnectionActor {
            addr: addr.clone(),
            config: config.clone(),
            rx,
            state_tx,
            shutdown: shutdown.clone(),
            shutdown_rx,
        };
        let task = tokio::spawn(actor.run());

        Self {
            addr,
            tx,
            state_rx,
            shutdown,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> ConnState {
        *self.state_rx.borrow()
    }

    pub fn health(&self) -> Health {
        if self.shutdown.load(Ordering::Acquire) || self.state() == ConnState::Disconnected {
            Health::Bad
        } else {
            Health::Good
        }
    }

    /// Submit a request body and await the response body.
    ///
    /// Fails synchronously when the connection is shut down or
    /// disconnected; otherwise the request queues behind earlier ones
    /// and is answered in FIFO order.
    pub async fn send(&self, body: Vec<u8>) -> Result<Bytes> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::ShutdownRequested);
        }
        if self.state() == ConnState::Disconnected {
            return Err(Error::ConnectionClosed(format!(
                "{} is disconnected",
                self.addr
            )));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                body,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::ConnectionClosed(format!("{} session ended", self.addr)))?;

        reply_rx
            .await
            .map_err(|_| Error::ConnectionClosed(format!("{} session ended", self.addr)))?
    }

    /// Graceful shutdown: refuse new submissions, let the in-flight
    /// request finish, fail queued ones, then join the task.
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().expect("connection task lock").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

struct ConnectionActor {
    addr: String,
    config: ClientConfig,
    rx: mpsc::Receiver<PendingRequest>,
    state_tx: watch::Sender<ConnState>,
    shutdown: Arc<AtomicBool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            if self.shutdown_requested() {
                break;
            }

            self.set_state(ConnState::Connecting);
            match timeout(self.config.connect_timeout(), TcpStream::connect(&self.addr)).await {
                Ok(Ok(mut stream)) => match self.negotiate(&mut stream).await {
                    Ok(()) => {
                        tracing::debug!(addr = %self.addr, "protocol accepted");
                        self.set_state(ConnState::Idle);
                        let reason = self.serve(&mut stream).await;
                        tracing::debug!(addr = %self.addr, reason, "session ended");
                    }
                    Err(e) => {
                        tracing::warn!(addr = %self.addr, error = %e, "protocol negotiation failed")
                    }
                },
                Ok(Err(e)) => tracing::debug!(addr = %self.addr, error = %e, "dial failed"),
                Err(_) => tracing::debug!(addr = %self.addr, "dial timed out"),
            }

            self.set_state(ConnState::Disconnected);
            // A session torn down by close() fails its queue with the
            // shutdown error, not the transient closed-connection one.
            let shutdown = self.shutdown_requested();
            let handle_gone = self.drain_queue(shutdown);

            if handle_gone || shutdown {
                break;
            }

            let tick = tokio::time::sleep(self.config.reconnect_interval());
            tokio::pin!(tick);
            tokio::select! {
                _ = &mut tick => {}
                _ = self.shutdown_rx.changed() => {}
            }
        }

        self.set_state(ConnState::Disconnected);
        let _ = self.drain_queue(true);
    }

    /// Propose the 3-byte protocol tag; the server answers with exactly
    /// two bytes, `ok` or a rejection.
    async fn negotiate(&mut self, stream: &mut TcpStream) -> Result<()> {
        self.set_state(ConnState::ProtocolProposal);
        stream
            .write_all(self.config.protocol_tag.as_bytes())
            .await?;

        let mut answer = [0u8; 2];
        timeout(self.config.request_timeout(), stream.read_exact(&mut answer))
            .await
            .map_err(|_| Error::RequestTimeout)??;

        if &answer == b"ok" {
            Ok(())
        } else {
            Err(Error::ProtocolRejected(answer.to_vec()))
        }
    }

    /// Serve requests until the session dies. Returns a reason for the
    /// log; the caller handles the state transition and queue drain.
    async fn serve(&mut self, stream: &mut TcpStream) -> &'static str {
        let mut probe = [0u8; 1];
        loop {
            // Biased so a signaled shutdown outranks queued work: once
            // close() fires, queued requests must fail, not dispatch.
            tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => return "shutdown",
                maybe = self.rx.recv() => {
                    let Some(request) = maybe else { return "handle dropped" };
                    if let Err(reason) = self.dispatch(stream, request).await {
                        return reason;
                    }
                }
                read = stream.read(&mut probe) => {
                    // Nothing is in flight, so any read here is the peer
                    // closing (0 bytes) or breaking protocol.
                    return match read {
                        Ok(0) => "closed by peer",
                        Ok(_) => "unsolicited data",
                        Err(_) => "read error",
                    };
                }
            }
        }
    }

    /// Write one frame and await its response. Any failure ends the
    /// session; the request future is always resolved exactly once.
    async fn dispatch(
        &mut self,
        stream: &mut TcpStream,
        request: PendingRequest,
    ) -> std::result::Result<(), &'static str> {
        self.set_state(ConnState::Request);

        let framed = protocol::frame(&request.body);
        if let Err(e) = stream.write_all(&framed).await {
            let _ = request
                .reply
                .send(Err(Error::ConnectionClosed(e.to_string())));
            return Err("write failed");
        }

        match timeout(self.config.request_timeout(), read_frame(stream)).await {
            Ok(Ok(body)) => {
                self.set_state(ConnState::Idle);
                let _ = request.reply.send(Ok(body));
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = request
                    .reply
                    .send(Err(Error::ConnectionClosed(e.to_string())));
                Err("read failed")
            }
            Err(_) => {
                // Closing the socket is the only safe way out: a late
                // response would otherwise be matched to the next request.
                let _ = request.reply.send(Err(Error::RequestTimeout));
                Err("request timeout")
            }
        }
    }

    /// Fail every queued request. Returns true when the handle side of
    /// the channel is gone and the actor should stop redialing.
    fn drain_queue(&mut self, shutdown: bool) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(request) => {
                    let error = if shutdown {
                        Error::ShutdownRequested
                    } else {
                        Error::ConnectionClosed(format!("{} disconnected", self.addr))
                    };
                    let _ = request.reply.send(Err(error));
                }
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn set_state(&self, state: ConnState) {
        self.state_tx.send_replace(state);
    }
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Bytes> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}
