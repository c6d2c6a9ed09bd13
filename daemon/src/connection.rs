//! Per-connection request loop
//!
//! ```text
//! AWAIT_FRAME --frame--> DISPATCH --response--> RESPONDING --written--> AWAIT_FRAME
//!      |                                             |
//!      +--eof / read error / timeout / shutdown------+--write error--> CLOSED
//! ```
//!
//! A connection owns its socket, frame buffer and handler context outright.
//! Requests are answered strictly in order, one response frame per request.

use crate::handlers::{HandlerContext, dispatch};
use bytes::Bytes;
use meeting_protocol::{FrameBuffer, FrameError, Response, StatusCode, build_response, parse_request};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Bytes pulled from the socket per read
const READ_CHUNK_SIZE: usize = 4096;

/// Per-connection limits
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub max_frame_size: usize,

    /// Idle deadline for one read; `None` waits forever
    pub read_timeout: Option<Duration>,
}

/// Why a connection reached CLOSED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its end
    Eof,
    ReadTimeout,
    Shutdown,
    ReadFailed,
    WriteFailed,
    /// The handler panicked and took the context with it
    HandlerFailed,
}

enum State {
    AwaitFrame,
    Dispatch(Bytes),
    Responding(Response),
    Closed(CloseReason),
}

/// One client session
pub struct Connection<S> {
    id: u64,
    peer: SocketAddr,
    stream: S,
    frames: FrameBuffer,
    ctx: Option<HandlerContext>,
    read_timeout: Option<Duration>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        id: u64,
        peer: SocketAddr,
        stream: S,
        ctx: HandlerContext,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            frames: FrameBuffer::new(settings.max_frame_size),
            ctx: Some(ctx),
            read_timeout: settings.read_timeout,
        }
    }

    /// Serve requests until the connection closes
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> CloseReason {
        info!("Connection {} from {} opened", self.id, self.peer);

        let mut state = State::AwaitFrame;
        let reason = loop {
            state = match state {
                State::AwaitFrame => self.await_frame(&mut shutdown).await,
                State::Dispatch(frame) => self.dispatch(frame).await,
                State::Responding(response) => self.respond(response).await,
                State::Closed(reason) => break reason,
            };
        };

        info!("Connection {} from {} closed: {:?}", self.id, self.peer, reason);
        reason
    }

    async fn await_frame(&mut self, shutdown: &mut watch::Receiver<bool>) -> State {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.frames.next_frame() {
                Ok(Some(frame)) => return State::Dispatch(frame),
                Ok(None) => {}
                Err(FrameError::TooLarge { size, max }) => {
                    warn!(
                        "Connection {}: frame exceeds {} bytes ({} buffered)",
                        self.id, max, size
                    );
                    return State::Responding(Response::new(
                        StatusCode::BadRequest,
                        "FRAME_TOO_LARGE",
                    ));
                }
            }

            let stopping = *shutdown.borrow();
            if stopping {
                return State::Closed(CloseReason::Shutdown);
            }

            let read = tokio::select! {
                _ = shutdown.changed() => return State::Closed(CloseReason::Shutdown),
                read = read_with_deadline(&mut self.stream, &mut chunk, self.read_timeout) => read,
            };

            match read {
                Ok(Some(0)) => {
                    if self.frames.pending() > 0 {
                        debug!(
                            "Connection {}: dropping {} unterminated bytes",
                            self.id,
                            self.frames.pending()
                        );
                    }
                    return State::Closed(CloseReason::Eof);
                }
                Ok(Some(n)) => self.frames.extend(&chunk[..n]),
                Ok(None) => return State::Closed(CloseReason::ReadTimeout),
                Err(e) => {
                    debug!("Connection {}: read failed: {}", self.id, e);
                    return State::Closed(CloseReason::ReadFailed);
                }
            }
        }
    }

    async fn dispatch(&mut self, frame: Bytes) -> State {
        let request = match parse_request(&frame) {
            Ok(request) => request,
            Err(e) => {
                debug!("Connection {}: undecodable frame: {}", self.id, e);
                return State::Responding(Response::new(StatusCode::BadRequest, "INVALID_FORMAT"));
            }
        };

        let Some(mut ctx) = self.ctx.take() else {
            return State::Closed(CloseReason::HandlerFailed);
        };

        debug!("Connection {}: {}", self.id, request.command);
        let joined = tokio::task::spawn_blocking(move || {
            let response = dispatch(&mut ctx, &request);
            (ctx, response)
        })
        .await;

        match joined {
            Ok((ctx, response)) => {
                self.ctx = Some(ctx);
                State::Responding(response)
            }
            Err(e) => {
                error!("Connection {}: handler failed: {}", self.id, e);
                State::Closed(CloseReason::HandlerFailed)
            }
        }
    }

    async fn respond(&mut self, response: Response) -> State {
        let frame = match response.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Connection {}: unencodable response: {}", self.id, e);
                match build_response(StatusCode::InternalError, "RESPONSE_TOO_LARGE") {
                    Ok(frame) => frame,
                    Err(_) => return State::Closed(CloseReason::WriteFailed),
                }
            }
        };

        let written = async {
            self.stream.write_all(frame.as_bytes()).await?;
            self.stream.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                debug!("Connection {}: replied {}", self.id, response.status);
                State::AwaitFrame
            }
            Err(e) => {
                debug!("Connection {}: write failed: {}", self.id, e);
                State::Closed(CloseReason::WriteFailed)
            }
        }
    }
}

/// Read once; `Ok(None)` when the deadline passes first
async fn read_with_deadline<S>(
    stream: &mut S,
    buf: &mut [u8],
    deadline: Option<Duration>,
) -> std::io::Result<Option<usize>>
where
    S: AsyncRead + Unpin,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, stream.read(buf)).await {
            Ok(read) => read.map(Some),
            Err(_) => Ok(None),
        },
        None => stream.read(buf).await.map(Some),
    }
}
