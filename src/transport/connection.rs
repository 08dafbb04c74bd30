//! One TCP session with the controller.
//!
//! A [`Connection`] lives for exactly one connection generation. It owns the
//! socket halves, the frame decoder, the request multiplexer and the liveness
//! monitor; the supervisor drives it from its `select!` loop:
//!
//! | Supervisor event | Connection method |
//! |------------------|-------------------|
//! | socket readable | [`read_chunk`](Connection::read_chunk) then [`on_read`](Connection::on_read) |
//! | deadline reached | [`on_timer`](Connection::on_timer) |
//! | host command | [`submit`](Connection::submit) |
//! | loss or disconnect | [`close`](Connection::close) |
//!
//! Every timer the session uses is derived from
//! [`next_deadline`](Connection::next_deadline) and dies with the session, so
//! nothing from an old generation can fire against a new socket.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, trace, warn};

use crate::config::{ClientOptions, DeviceAddress};
use crate::error::{Error, Result};
use crate::events::EventSender;
use crate::identifiers::Generation;
use crate::model::Synchronizer;
use crate::protocol::{Command, Incoming, Request, Response};

use super::codec::{LineCodec, encode};
use super::liveness::{LivenessAction, LivenessMonitor};
use super::multiplexer::{Dispatch, Expired, Multiplexer};
use super::throttle::LogThrottle;

// ============================================================================
// Constants
// ============================================================================

/// Size of a single socket read.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Window for repeated framing warnings.
const FRAMING_LOG_WINDOW: Duration = Duration::from_secs(60);

// ============================================================================
// Types
// ============================================================================

/// Who is waiting for a request's reply.
#[derive(Debug)]
pub(crate) enum Waiter {
    /// A host application call.
    Caller(oneshot::Sender<Result<Response>>),
    /// Bookkeeping issued by the client itself.
    Internal(InternalRequest),
}

/// Requests the client issues on its own behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InternalRequest {
    /// Liveness probe.
    Keepalive,
    /// Identity query on connect.
    SystemInfo,
    /// Object discovery on connect.
    Discovery,
    /// Attribute subscription batch.
    Subscribe,
}

/// Timing and sizing knobs of one session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionSettings {
    pub(crate) connect_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) keepalive_interval: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) max_frame_len: usize,
}

impl From<&ClientOptions> for SessionSettings {
    fn from(options: &ClientOptions) -> Self {
        Self {
            connect_timeout: options.connect_timeout,
            request_timeout: options.request_timeout,
            keepalive_interval: options.keepalive_interval,
            idle_timeout: options.idle_timeout,
            max_frame_len: options.max_frame_len,
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A live session with the controller.
pub(crate) struct Connection {
    generation: Generation,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    codec: LineCodec,
    mux: Multiplexer<Waiter>,
    liveness: LivenessMonitor,
    framing_log: LogThrottle,
    read_buf: Box<[u8]>,
}

impl Connection {
    /// Opens a socket to the controller within the connect timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectTimeout`] if the attempt took too long
    /// - [`Error::ConnectFailure`] if the socket could not be opened
    pub(crate) async fn open(
        address: DeviceAddress,
        settings: SessionSettings,
        generation: Generation,
    ) -> Result<Self> {
        debug!(%generation, %address, "Connecting");

        let stream = timeout(
            settings.connect_timeout,
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        .map_err(|_| {
            Error::connect_timeout(
                address.to_string(),
                settings.connect_timeout.as_millis() as u64,
            )
        })?
        .map_err(|e| Error::connect_failure(address.to_string(), e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%generation, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let now = Instant::now();

        info!(%generation, %address, "Connected");

        Ok(Self {
            generation,
            reader,
            writer,
            codec: LineCodec::new(settings.max_frame_len),
            mux: Multiplexer::new(settings.request_timeout),
            liveness: LivenessMonitor::new(
                settings.keepalive_interval,
                settings.idle_timeout,
                now,
            ),
            framing_log: LogThrottle::new(FRAMING_LOG_WINDOW),
            read_buf: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
        })
    }

    /// Generation this session belongs to.
    #[inline]
    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    /// Queues the post-connect queries: identity, discovery, subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails.
    pub(crate) async fn start(&mut self, sync: &Synchronizer, discovery_keys: &[String]) -> Result<()> {
        self.submit(Command::system_info(), Waiter::Internal(InternalRequest::SystemInfo))
            .await?;
        self.submit(
            Command::discovery(discovery_keys.iter().cloned()),
            Waiter::Internal(InternalRequest::Discovery),
        )
        .await?;

        let batches = sync.resubscribe_commands();
        debug!(generation = %self.generation, batches = batches.len(), "Resubscribing");
        for command in batches {
            self.submit(command, Waiter::Internal(InternalRequest::Subscribe))
                .await?;
        }
        Ok(())
    }

    /// Earliest instant at which [`on_timer`](Self::on_timer) has work to do.
    #[must_use]
    pub(crate) fn next_deadline(&self) -> Instant {
        let liveness = self.liveness.next_deadline();
        match self.mux.deadline() {
            Some(stall) => stall.min(liveness),
            None => liveness,
        }
    }

    /// Waits for bytes from the device. Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] when the device closes the socket and
    /// [`Error::Io`] on read failure.
    pub(crate) async fn read_chunk(&mut self) -> Result<usize> {
        match self.reader.read(&mut self.read_buf).await? {
            0 => Err(Error::ConnectionLost),
            n => Ok(n),
        }
    }

    /// Processes the `len` bytes delivered by the last [`read_chunk`](Self::read_chunk).
    ///
    /// # Errors
    ///
    /// Returns an error if writing the next queued request fails.
    pub(crate) async fn on_read(
        &mut self,
        len: usize,
        sync: &Synchronizer,
        events: &EventSender,
    ) -> Result<()> {
        let now = Instant::now();
        self.liveness.record_received(now);

        let frames = self.codec.feed(&self.read_buf[..len]);
        for frame in frames {
            match frame {
                Ok(body) => self.dispatch(Incoming::classify(body), now, sync, events).await?,
                Err(e) => {
                    if let Some(suppressed) = self.framing_log.check(now) {
                        warn!(generation = %self.generation, error = %e, suppressed, "Dropped malformed frame");
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs deadlock detection and liveness checks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] when the idle timeout is exceeded, or
    /// a write error.
    pub(crate) async fn on_timer(&mut self, now: Instant) -> Result<()> {
        if let Some((expired, next)) = self.mux.check_timeout(now) {
            self.expire(expired);
            if let Some(request) = next {
                self.write(&request).await?;
            }
        }

        match self.liveness.poll(now) {
            LivenessAction::Idle => Ok(()),
            LivenessAction::SendKeepalive => {
                trace!(generation = %self.generation, "Sending keep-alive");
                self.liveness.keepalive_sent(now);
                self.submit(Command::keepalive(), Waiter::Internal(InternalRequest::Keepalive))
                    .await
            }
            LivenessAction::Dead { silent_for } => {
                warn!(
                    generation = %self.generation,
                    silent_ms = silent_for.as_millis() as u64,
                    "Connection idle for too long"
                );
                Err(Error::ConnectionLost)
            }
        }
    }

    /// Hands a command to the multiplexer and writes it if the slot is free.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails.
    pub(crate) async fn submit(&mut self, command: Command, waiter: Waiter) -> Result<()> {
        if let Some(request) = self.mux.submit(command, waiter, Instant::now()) {
            self.write(&request).await?;
        }
        Ok(())
    }

    /// Shuts the socket and fails every outstanding request.
    pub(crate) async fn close(mut self) {
        let pending = self.mux.drain();
        let count = pending.len();
        for entry in pending {
            if let Waiter::Caller(tx) = entry.waiter {
                let _ = tx.send(Err(Error::ConnectionLost));
            }
        }
        if count > 0 {
            debug!(generation = %self.generation, count, "Failed pending requests on close");
        }

        if let Err(e) = self.writer.shutdown().await {
            trace!(generation = %self.generation, error = %e, "Socket shutdown failed");
        }
        debug!(generation = %self.generation, "Session closed");
    }

    /// Routes one decoded message.
    async fn dispatch(
        &mut self,
        incoming: Incoming,
        now: Instant,
        sync: &Synchronizer,
        events: &EventSender,
    ) -> Result<()> {
        match incoming {
            Incoming::Response(response) => {
                let (dispatch, next) = self.mux.on_response(response, now);
                if let Dispatch::Completed {
                    waiter,
                    request,
                    response,
                    ..
                } = dispatch
                {
                    self.complete(waiter, &request, response, sync, events);
                }
                if let Some(request) = next {
                    self.write(&request).await?;
                }
            }
            Incoming::Notification(notification) => {
                if notification.carries_changes() {
                    events.send_all(sync.apply(notification.updates()));
                } else {
                    trace!(generation = %self.generation, command = %notification.command, "Ignoring notification");
                }
            }
        }
        Ok(())
    }

    /// Delivers a reply to its waiter.
    fn complete(
        &mut self,
        waiter: Waiter,
        request: &Request,
        response: Response,
        sync: &Synchronizer,
        events: &EventSender,
    ) {
        match waiter {
            Waiter::Caller(tx) => {
                if tx.send(response.into_result()).is_err() {
                    trace!(message_id = %request.message_id, "Caller went away before reply");
                }
            }
            Waiter::Internal(kind) => {
                if kind == InternalRequest::Keepalive {
                    self.liveness.keepalive_finished();
                }
                if response.is_success() {
                    events.send_all(sync.apply(response.object_list()));
                } else {
                    warn!(
                        generation = %self.generation,
                        request = ?kind,
                        message_id = %request.message_id,
                        code = %response.code,
                        "Device rejected internal request"
                    );
                }
            }
        }
    }

    /// Fails a request dropped by deadlock detection.
    fn expire(&mut self, expired: Expired<Waiter>) {
        let message_id = expired.pending.request.message_id;
        match expired.pending.waiter {
            Waiter::Caller(tx) => {
                let _ = tx.send(Err(Error::request_timeout(
                    message_id,
                    expired.waited.as_millis() as u64,
                )));
            }
            Waiter::Internal(kind) => {
                if kind == InternalRequest::Keepalive {
                    self.liveness.keepalive_finished();
                }
                debug!(generation = %self.generation, request = ?kind, %message_id, "Internal request timed out");
            }
        }
    }

    /// Writes one request frame.
    async fn write(&mut self, request: &Request) -> Result<()> {
        let bytes = encode(request)?;
        self.writer.write_all(&bytes).await?;
        trace!(
            generation = %self.generation,
            message_id = %request.message_id,
            command = request.command.name(),
            "Request sent"
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::RwLock;
    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    use crate::events;
    use crate::model::{AttributePolicy, PoolModel};

    fn settings() -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_millis(200),
            keepalive_interval: Duration::from_millis(50),
            idle_timeout: Duration::from_millis(400),
            max_frame_len: 64 * 1024,
        }
    }

    async fn pair() -> (Connection, tokio::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let address = DeviceAddress::parse("127.0.0.1", port).expect("address");

        let (connection, accepted) = tokio::join!(
            Connection::open(address, settings(), Generation::default().next()),
            listener.accept()
        );
        (connection.expect("connect"), accepted.expect("accept").0)
    }

    fn synchronizer() -> Synchronizer {
        Synchronizer::new(
            Arc::new(RwLock::new(PoolModel::new())),
            AttributePolicy::default(),
            50,
        )
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let address = DeviceAddress::parse("127.0.0.1", port).expect("address");
        let result = Connection::open(address, settings(), Generation::default()).await;
        assert!(matches!(result, Err(Error::ConnectFailure { .. })));
    }

    #[tokio::test]
    async fn test_only_first_request_is_written() {
        let (mut connection, device) = pair().await;
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();

        connection
            .submit(Command::keepalive(), Waiter::Caller(tx1))
            .await
            .expect("submit");
        connection
            .submit(Command::keepalive(), Waiter::Caller(tx2))
            .await
            .expect("submit");

        let mut lines = BufReader::new(device).lines();
        let first = lines.next_line().await.expect("read").expect("line");
        let value: Value = serde_json::from_str(&first).expect("json");
        assert_eq!(value["messageID"], "1");

        let second = tokio::time::timeout(Duration::from_millis(50), lines.next_line()).await;
        assert!(second.is_err(), "second request must wait for the first reply");
    }

    #[tokio::test]
    async fn test_reply_completes_caller_and_notification_updates_model() {
        let (mut connection, mut device) = pair().await;
        let sync = synchronizer();
        let (events_tx, mut events_rx) = events::channel();
        let (tx, rx) = oneshot::channel();

        connection
            .submit(Command::keepalive(), Waiter::Caller(tx))
            .await
            .expect("submit");

        device
            .write_all(
                b"{\"messageID\":\"1\",\"command\":\"SendParamList\",\"response\":\"200\"}\r\n\
{\"command\":\"NotifyList\",\"objectList\":[{\"objnam\":\"C0001\",\"params\":{\"STATUS\":\"ON\"}}]}\r\n",
            )
            .await
            .expect("write");

        while events_rx.try_recv().is_none() {
            let n = connection.read_chunk().await.expect("read");
            connection.on_read(n, &sync, &events_tx).await.expect("handle");
        }

        let response = rx.await.expect("reply").expect("success");
        assert!(response.is_success());
        assert_eq!(
            sync.model().read().get("C0001").and_then(|o| o.get("STATUS")),
            Some("ON")
        );
    }

    #[tokio::test]
    async fn test_close_fails_pending_requests() {
        let (mut connection, _device) = pair().await;
        let (tx, rx) = oneshot::channel();
        connection
            .submit(Command::keepalive(), Waiter::Caller(tx))
            .await
            .expect("submit");

        connection.close().await;
        assert!(matches!(rx.await.expect("reply"), Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_idle_session_sends_keepalive_then_dies() {
        let (mut connection, device) = pair().await;
        let mut lines = BufReader::new(device).lines();

        tokio::time::sleep_until(connection.next_deadline()).await;
        connection.on_timer(Instant::now()).await.expect("keep-alive");

        let line = lines.next_line().await.expect("read").expect("line");
        let value: Value = serde_json::from_str(&line).expect("json");
        assert_eq!(value["condition"], "OBJTYP=SYSTEM");

        let mut result = Ok(());
        for _ in 0..20 {
            tokio::time::sleep_until(connection.next_deadline()).await;
            result = connection.on_timer(Instant::now()).await;
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }
}
