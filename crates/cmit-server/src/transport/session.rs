//! One connection: read frames, dispatch, write responses.
//!
//! Lifecycle:
//! - `single_shot`: one frame in, one response out, close
//! - `persistent`: loop until EOF, a transport failure, an oversized frame or
//!   server shutdown
//!
//! A malformed frame is answered with an error response and, in persistent
//! mode, the session keeps reading. Read and write deadlines are optional.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info_span, warn, Instrument};

use cmit_core::error::CmitError;
use cmit_core::protocol::{serialize_response, FrameDecoder, ProtocolVersion, Request, Response};

use crate::app_state::ServerState;
use crate::config::SessionMode;
use crate::obs::ServerMetrics;

const INITIAL_READ_CAPACITY: usize = 4 * 1024;

/// Label used for verbs with no registered handler, so arbitrary client
/// input cannot grow the metric series.
const UNKNOWN_VERB_LABEL: &str = "_unknown";

enum Inbound {
    Request(Request),
    Malformed(CmitError),
    Closed,
}

pub struct Session<S> {
    state: ServerState,
    stream: S,
    sid: u64,
    buf: BytesMut,
    decoder: FrameDecoder,
    mode: SessionMode,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(state: ServerState, stream: S, sid: u64) -> Self {
        let section = &state.cfg().server;
        let mode = section.session_mode;
        let read_timeout = section.read_timeout();
        let write_timeout = section.write_timeout();
        let decoder = state.decoder();
        Self {
            state,
            stream,
            sid,
            buf: BytesMut::with_capacity(INITIAL_READ_CAPACITY),
            decoder,
            mode,
            read_timeout,
            write_timeout,
            shutdown: None,
        }
    }

    /// Close the session (between requests) once `rx` turns `true`.
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    pub async fn run(self) {
        let span = info_span!("session", sid = self.sid);
        self.serve().instrument(span).await
    }

    async fn serve(mut self) {
        let _active = ActiveSession::open(self.state.metrics());
        debug!(mode = ?self.mode, "session opened");

        loop {
            let keep_open = match self.read_request().await {
                Inbound::Request(req) => self.respond(req).await,
                Inbound::Malformed(err) => self.respond_malformed(err).await,
                Inbound::Closed => false,
            };
            if !keep_open || self.mode == SessionMode::SingleShot {
                break;
            }
        }

        if let Err(error) = self.stream.shutdown().await {
            debug!(error = %error, "stream shutdown failed");
        }
        debug!("session closed");
    }

    async fn read_request(&mut self) -> Inbound {
        loop {
            match self.decoder.decode_request(&mut self.buf) {
                Ok(Some(req)) => return Inbound::Request(req),
                Ok(None) => {}
                Err(err) => {
                    self.state
                        .metrics()
                        .decode_errors
                        .inc(&[("code", err.client_code().as_str())]);
                    return Inbound::Malformed(err);
                }
            }

            let read = tokio::select! {
                biased;
                _ = shutdown_signalled(&mut self.shutdown) => {
                    debug!("server shutting down");
                    return Inbound::Closed;
                }
                read = with_deadline(self.read_timeout, self.stream.read_buf(&mut self.buf)) => read,
            };

            match read {
                Ok(0) => {
                    if !self.buf.is_empty() {
                        debug!(pending = self.buf.len(), "peer closed mid-frame");
                    }
                    return Inbound::Closed;
                }
                Ok(_) => {}
                Err(error) if error.kind() == io::ErrorKind::TimedOut => {
                    debug!("read deadline elapsed");
                    return Inbound::Closed;
                }
                Err(error) => {
                    warn!(error = %error, "read failed");
                    return Inbound::Closed;
                }
            }
        }
    }

    async fn respond(&mut self, mut req: Request) -> bool {
        req.envelope.stamp_defaults();

        let registry = self.state.registry();
        let verb_label = if registry.contains(&req.verb) {
            req.verb.clone()
        } else {
            UNKNOWN_VERB_LABEL.to_string()
        };

        let started = Instant::now();
        let resp = match ProtocolVersion::check(&req.version) {
            Ok(_) => registry.dispatch(req, self.state.queue()).await,
            Err(err) => Response::error(None, Some(&req.envelope), &err),
        };

        let metrics = self.state.metrics();
        metrics
            .dispatch_duration
            .observe(&[("verb", verb_label.as_str())], started.elapsed());
        metrics
            .requests_total
            .inc(&[("verb", verb_label.as_str()), ("status", resp.status.as_str())]);
        debug!(
            verb = %verb_label,
            id = %resp.id(),
            topic = %resp.topic(),
            status = %resp.status,
            "request served"
        );

        self.write(&resp).await
    }

    async fn respond_malformed(&mut self, err: CmitError) -> bool {
        debug!(error = %err, "malformed frame");
        let fatal = matches!(err, CmitError::PayloadTooLarge { .. });
        let written = self.write(&Response::error(None, None, &err)).await;
        written && !fatal
    }

    async fn write(&mut self, resp: &Response) -> bool {
        let bytes = serialize_response(resp);
        let stream = &mut self.stream;
        let written = with_deadline(self.write_timeout, async move {
            stream.write_all(&bytes).await?;
            stream.flush().await
        })
        .await;
        match written {
            Ok(()) => true,
            Err(error) => {
                warn!(error = %error, "response write failed");
                false
            }
        }
    }
}

/// Counts a session in `sessions_active` until dropped, including when the
/// session task is aborted.
struct ActiveSession(Arc<ServerMetrics>);

impl ActiveSession {
    fn open(metrics: Arc<ServerMetrics>) -> Self {
        metrics.sessions_active.inc(&[]);
        Self(metrics)
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.0.sessions_active.dec(&[]);
    }
}

/// Resolves once shutdown is requested (or its sender is gone). Never
/// resolves for sessions without a shutdown channel.
async fn shutdown_signalled(rx: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn with_deadline<F, T>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"))?,
        None => fut.await,
    }
}
