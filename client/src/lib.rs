//! Meeting Client Library
//!
//! Speaks the `COMMAND||TOKEN||DATA` protocol over one TCP connection.
//! Requests are answered in order, so [`Client::send`] writes one frame and
//! waits for exactly one response frame.

use meeting_protocol::{
    CodecError, FRAME_DELIMITER, FrameBuffer, FrameError, MAX_PAYLOAD_SIZE, Request, Response,
    Role, SUBFIELD_DELIMITER, StatusCode, parse_response,
};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Status field plus delimiter plus terminator
const RESPONSE_OVERHEAD: usize = 16;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Connection closed by server")]
    Closed,

    #[error("Request rejected: {status}||{payload}")]
    Rejected { status: StatusCode, payload: String },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

/// Token and role returned by REGISTER and LOGIN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub role: Role,
}

/// One connection to a meeting server
pub struct Client {
    stream: TcpStream,
    frames: FrameBuffer,
    session: Option<Session>,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            frames: FrameBuffer::new(MAX_PAYLOAD_SIZE + RESPONSE_OVERHEAD),
            session: None,
        })
    }

    /// Session established by the last successful register or login
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Send one request and wait for its response
    pub async fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        let frame = request.to_frame()?;
        self.stream.write_all(frame.as_bytes()).await?;
        self.stream.flush().await?;
        debug!("Sent {}", request.command);
        self.read_response().await
    }

    /// Send raw bytes and wait for one response; for exercising framing
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<Response, ClientError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.read_response().await
    }

    /// Send `command` with the current session token
    pub async fn call(&mut self, command: &str, data: &str) -> Result<Response, ClientError> {
        let token = self
            .session
            .as_ref()
            .map(|s| s.token.clone())
            .unwrap_or_default();
        self.send(&Request::new(command, token, data)).await
    }

    pub async fn register(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Session, ClientError> {
        let data = [username, password, role.as_str()].join(FRAME_DELIMITER);
        let response = self.send(&Request::new("REGISTER", "", data)).await?;
        self.establish(response)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<Session, ClientError> {
        let data = [username, password].join(SUBFIELD_DELIMITER);
        let response = self.send(&Request::new("LOGIN", "", data)).await?;
        self.establish(response)
    }

    /// Forget the session once the server confirms
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let response = self.call("LOGOUT", "").await?;
        expect_success(response)?;
        self.session = None;
        Ok(())
    }

    fn establish(&mut self, response: Response) -> Result<Session, ClientError> {
        let response = expect_success(response)?;
        let fields = response.fields();
        let [_, token, role] = fields.as_slice() else {
            return Err(ClientError::MalformedReply(response.payload));
        };
        let role = role
            .parse()
            .map_err(|_| ClientError::MalformedReply(response.payload.clone()))?;

        let session = Session {
            token: token.clone(),
            role,
        };
        self.session = Some(session.clone());
        Ok(session)
    }

    async fn read_response(&mut self) -> Result<Response, ClientError> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = self.frames.next_frame()? {
                return Ok(parse_response(&frame)?);
            }
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ClientError::Closed);
            }
            self.frames.extend(&chunk[..n]);
        }
    }
}

/// Turn a non-success response into [`ClientError::Rejected`]
pub fn expect_success(response: Response) -> Result<Response, ClientError> {
    if response.status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Rejected {
            status: response.status,
            payload: response.payload,
        })
    }
}
