//! Client side of the line protocol.
//!
//! Sends one line per request and reads the response up to its terminating
//! empty line.

use std::io;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// A connection to a message log server
pub struct Client<S = TcpStream> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    /// Limit on waiting for a response (None = wait forever)
    timeout: Option<Duration>,
}

impl Client<TcpStream> {
    /// Connect to `addr`. Connecting and every later response are bounded by `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> io::Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection timed out"))??;
        debug!(addr, "Connected");
        Ok(Self::from_stream(stream).with_timeout(timeout))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Wrap an already-connected stream
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Client {
            reader: BufReader::new(reader),
            writer,
            timeout: None,
        }
    }

    /// Give up on a response after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send one line and wait for its response.
    ///
    /// The returned text has the terminating empty line and trailing newline
    /// removed. Fails with `InvalidInput` for a line the server would not
    /// answer, `UnexpectedEof` if the server closed the connection, and
    /// `TimedOut` if no response arrived in time.
    pub async fn request(&mut self, line: &str) -> io::Result<String> {
        validate_request(line)?;
        trace!(line, "Sending request");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_response())
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "response timed out"))?,
            None => self.read_response().await,
        }
    }

    async fn read_response(&mut self) -> io::Result<String> {
        let mut lines = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                ));
            }

            let text = line.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                break;
            }
            lines.push(text.to_string());
        }

        Ok(lines.join("\n"))
    }
}

/// Check that `line` is a single, non-blank request.
///
/// Blank lines get no response and embedded newlines would split the line
/// into several requests.
pub fn validate_request(line: &str) -> io::Result<()> {
    if line.contains(['\n', '\r']) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "message must not contain line breaks",
        ));
    }
    if line.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "message must not be blank",
        ));
    }
    Ok(())
}

/// Whether a line asks the server to close the connection
pub fn is_close(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("CLOSE")
}

/// Connect, send a single message, and return the server's response
pub async fn send_message(addr: &str, message: &str, timeout: Duration) -> io::Result<String> {
    validate_request(message)?;
    let mut client = Client::connect(addr, timeout).await?;
    client.request(message).await
}

/// Read lines from `input`, send each one, and print the responses to `output`.
///
/// End of input sends CLOSE. Returns once CLOSE was acknowledged or the
/// server went away.
pub async fn interactive<S, R, W>(
    client: &mut Client<S>,
    mut input: R,
    mut output: W,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(b"Connected. Type messages, 'LIST' to list them, 'CLOSE' to quit.\n")
        .await?;

    let mut line = String::new();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        line.clear();
        let request = if input.read_line(&mut line).await? == 0 {
            output.write_all(b"\n").await?;
            "CLOSE"
        } else {
            line.trim()
        };
        if request.is_empty() {
            continue;
        }

        match client.request(request).await {
            Ok(response) => {
                output.write_all(response.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
            Err(e) if is_disconnect(&e) => {
                output.write_all(b"Connection closed by server.\n").await?;
                break;
            }
            Err(e) => return Err(e),
        }

        if is_close(request) {
            break;
        }
    }

    output.flush().await
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
