//! FTP implementation of [`ArchiveTransport`].
//!
//! `suppaftp`'s client is blocking, so each session runs on tokio's blocking
//! pool. An `FtpSession` owns the control connection and sends `QUIT` when
//! dropped, which covers every early return below.

use std::fs::File;
use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use super::ArchiveTransport;
use crate::config::ServerConfig;
use crate::error::{Error, Result, io_context};

/// Production [`ArchiveTransport`] speaking FTP, one control connection per call.
#[derive(Clone, Debug)]
pub struct FtpTransport {
    server: ServerConfig,
    chunk_size: usize,
}

impl FtpTransport {
    /// Create a transport for the given server, streaming files in `chunk_size` pieces
    pub fn new(server: ServerConfig, chunk_size: usize) -> Self {
        Self {
            server,
            chunk_size: chunk_size.max(1),
        }
    }

    fn list_blocking(&self, path: &str) -> Result<Vec<String>> {
        let mut session = FtpSession::open(&self.server)?;
        session.cwd(path)?;
        session.list(path)
    }

    fn retrieve_blocking(&self, remote_dir: &str, file_name: &str, target: &Path) -> Result<u64> {
        let mut session = FtpSession::open(&self.server)?;
        session.cwd(remote_dir)?;
        session.retrieve(file_name, target, self.chunk_size)
    }
}

#[async_trait::async_trait]
impl ArchiveTransport for FtpTransport {
    async fn list_lines(&self, path: &str) -> Result<Vec<String>> {
        let transport = self.clone();
        let path = path.to_string();
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || transport.list_blocking(&task_path))
            .await
            .map_err(|e| {
                Error::connection(Some(path.as_str()), format!("listing task failed: {e}"))
                    .retryable(false)
            })?
    }

    async fn retrieve(&self, remote_dir: &str, file_name: &str, target: &Path) -> Result<u64> {
        let transport = self.clone();
        let remote_dir = remote_dir.to_string();
        let name = file_name.to_string();
        let target: PathBuf = target.to_path_buf();
        tokio::task::spawn_blocking(move || transport.retrieve_blocking(&remote_dir, &name, &target))
            .await
            .map_err(|e| Error::transfer(file_name, format!("transfer task failed: {e}")))?
    }
}

/// Scoped FTP control connection; logs out on drop.
struct FtpSession {
    stream: Option<FtpStream>,
    host: String,
}

impl FtpSession {
    fn open(server: &ServerConfig) -> Result<Self> {
        let stream = connect(&resolve(server)?, server)?;

        if let Some(timeout) = server.io_timeout {
            let socket = stream.get_ref();
            socket
                .set_read_timeout(Some(timeout))
                .and_then(|_| socket.set_write_timeout(Some(timeout)))
                .map_err(|e| Error::connection(None, e))?;
        }

        // Wrap before login so a rejected login still sends QUIT
        let mut session = Self {
            stream: Some(stream),
            host: server.host.clone(),
        };
        session
            .stream_mut()?
            .login(server.username.as_str(), server.password.as_str())
            .map_err(|e| {
                Error::connection(None, format!("login to {} failed: {e}", server.host))
                    .retryable(is_transient(&e))
            })?;

        tracing::debug!(host = %server.host, "FTP session opened");
        Ok(session)
    }

    fn stream_mut(&mut self) -> Result<&mut FtpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::connection(None, "session already closed"))
    }

    fn cwd(&mut self, path: &str) -> Result<()> {
        self.stream_mut()?
            .cwd(path)
            .map_err(|e| Error::connection(Some(path), &e).retryable(is_transient(&e)))
    }

    fn list(&mut self, path: &str) -> Result<Vec<String>> {
        self.stream_mut()?
            .list(None)
            .map_err(|e| {
                Error::connection(Some(path), format!("LIST failed: {e}")).retryable(is_transient(&e))
            })
    }

    fn retrieve(&mut self, file_name: &str, target: &Path, chunk_size: usize) -> Result<u64> {
        let stream = self.stream_mut()?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| Error::transfer(file_name, &e).retryable(is_transient(&e)))?;

        let mut file = File::create(target).map_err(|e| io_context(target, e))?;
        let mut local_error: Option<std::io::Error> = None;

        let result = stream.retr(file_name, |reader: &mut dyn Read| {
            let mut buf = vec![0u8; chunk_size];
            let mut written = 0u64;
            loop {
                let n = reader.read(&mut buf).map_err(FtpError::ConnectionError)?;
                if n == 0 {
                    break;
                }
                if let Err(e) = file.write_all(&buf[..n]) {
                    let kind = e.kind();
                    local_error = Some(e);
                    return Err(FtpError::ConnectionError(std::io::Error::new(
                        kind,
                        "local write failed",
                    )));
                }
                written += n as u64;
            }
            Ok(written)
        });

        let result = match (result, local_error) {
            (_, Some(e)) => Err(io_context(target, e)),
            (Ok(written), None) => file
                .flush()
                .and_then(|_| file.sync_all())
                .map(|_| written)
                .map_err(|e| io_context(target, e)),
            (Err(e), None) => Err(Error::transfer(file_name, &e).retryable(is_transient(&e))),
        };

        if result.is_err() {
            drop(file);
            if let Err(e) = std::fs::remove_file(target) {
                tracing::debug!(path = %target.display(), error = %e, "Could not remove partial file");
            }
        }
        result
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take()
            && let Err(e) = stream.quit()
        {
            tracing::debug!(host = %self.host, error = %e, "FTP QUIT failed");
        }
    }
}

/// Socket failures and 4xx replies are worth another attempt; 5xx replies are not
fn is_transient(err: &FtpError) -> bool {
    match err {
        FtpError::ConnectionError(_) => true,
        FtpError::UnexpectedResponse(response) => (400..500).contains(&response.status.code()),
        _ => false,
    }
}

/// Every address the host resolves to, in resolver order
fn resolve(server: &ServerConfig) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (server.host.as_str(), server.port)
        .to_socket_addrs()
        .map_err(|e| Error::connection(None, format!("cannot resolve {}: {e}", server.host)))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::connection(None, format!("no address for {}", server.host)));
    }
    Ok(addrs)
}

/// Connect to the first address that accepts, reporting the last failure otherwise
fn connect(addrs: &[SocketAddr], server: &ServerConfig) -> Result<FtpStream> {
    let mut last_error = None;
    for &addr in addrs {
        match FtpStream::connect_timeout(addr, server.connect_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(host = %server.host, %addr, error = %e, "FTP connect attempt failed");
                last_error = Some(
                    Error::connection(None, format!("{} ({addr}): {e}", server.host))
                        .retryable(is_transient(&e)),
                );
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| Error::connection(None, format!("no address for {}", server.host))))
}
