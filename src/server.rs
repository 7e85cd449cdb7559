//! TCP server for the message log.
//!
//! Accepts connections, gives each one its own task, and runs every request
//! against the message store.

use crate::config::Config;
use crate::protocol::{Command, ParseResult, Parser, Response};
use crate::storage::{MessageStore, StorageResult};
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 4 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server instance
pub struct Server {
    listener: TcpListener,
    store: Arc<MessageStore>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Prepare the message table and bind the listening socket
    pub async fn bind(config: &Config) -> Result<Self, BoxError> {
        config.validate()?;

        let store = MessageStore::new(&config.database, config.busy_timeout);
        let init_store = Arc::clone(&store);
        tokio::task::spawn_blocking(move || init_store.init()).await??;

        let addr = tokio::net::lookup_host(&config.listen)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address found for '{}'", config.listen),
                )
            })?;
        let listener = TcpListener::from_std(bind_listener(addr, config.backlog)?)?;

        info!(
            address = %listener.local_addr()?,
            database = %store.path().display(),
            "Server listening"
        );

        Ok(Server {
            listener,
            store,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<(), BoxError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already being served keep running on their own tasks.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), BoxError> {
        tokio::pin!(shutdown);

        loop {
            // Wait for a connection slot
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&self.connection_limit).acquire_owned() => permit?,
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    info!(peer = %addr, "Connection accepted");

                    let store = Arc::clone(&self.store);

                    tokio::spawn(async move {
                        match handle_connection(stream, store).await {
                            Ok(()) => info!(peer = %addr, "Connection closed"),
                            Err(e) => debug!(peer = %addr, error = %e, "Connection error"),
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        info!("Server shutting down");
        Ok(())
    }
}

/// Build a listening socket with address reuse and the configured backlog
fn bind_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

/// Serve a single client connection until CLOSE, end of stream, or a protocol error
pub async fn handle_connection<S>(mut stream: S, store: Arc<MessageStore>) -> Result<(), BoxError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        match Parser::parse(&buffer) {
            ParseResult::Complete(command, consumed) => {
                buffer.advance(consumed);

                let response = execute_command(&command, &store).await;
                stream.write_all(&response).await?;

                if command == Command::Close {
                    stream.shutdown().await?;
                    return Ok(());
                }
            }

            ParseResult::Blank(consumed) => buffer.advance(consumed),

            ParseResult::Incomplete => {
                let n = stream.read_buf(&mut buffer).await?;
                if n == 0 {
                    // Peer finished sending; an unterminated tail is still a request
                    if let Some(command) = Parser::parse_final(&buffer) {
                        let response = execute_command(&command, &store).await;
                        stream.write_all(&response).await?;
                    }
                    trace!("Connection closed by client");
                    return Ok(());
                }
            }

            ParseResult::Error(e) => {
                warn!(error = %e, "Parse error");
                stream
                    .write_all(&Response::client_error(&e.to_string()))
                    .await?;
                return Ok(());
            }
        }
    }
}

/// Run a command against the store and build its response
async fn execute_command(command: &Command, store: &Arc<MessageStore>) -> BytesMut {
    match command {
        Command::Store(msg) => {
            info!(msg = %msg, "Message received");
            let owned = msg.clone();
            match with_store(store, move |store| store.insert(&owned)).await {
                Ok(id) => {
                    debug!(id, "Message stored");
                    Response::received(msg)
                }
                Err(e) => database_error(e),
            }
        }

        Command::List => match with_store(store, |store| store.list()).await {
            Ok(entries) => {
                debug!(count = entries.len(), "Listing messages");
                Response::listing(&entries)
            }
            Err(e) => database_error(e),
        },

        Command::Close => Response::closed(),
    }
}

/// Run a blocking store operation off the async workers
async fn with_store<T, F>(store: &Arc<MessageStore>, op: F) -> Result<T, BoxError>
where
    F: FnOnce(&MessageStore) -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    Ok(tokio::task::spawn_blocking(move || op(&store)).await??)
}

fn database_error(e: BoxError) -> BytesMut {
    error!(error = %e, "Database error");
    Response::database_error(&e)
}
