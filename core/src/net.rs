//! Unify behavior of tcp & unix transports.
//!
//! An address beginning with `/` is an abstract-free unix socket path,
//! anything else is handed to the tcp stack (which also resolves
//! `host:port` names).

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::{fmt, fs, io};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

/// Unify behavior of tcp & unix addr
#[derive(Clone, PartialEq, Eq)]
pub enum UnifyAddr {
    Tcp(String),
    Path(PathBuf),
}

impl FromStr for UnifyAddr {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty address"));
        }
        if s.starts_with('/') {
            return Ok(Self::Path(PathBuf::from(s)));
        }
        Ok(Self::Tcp(s.to_string()))
    }
}

impl fmt::Display for UnifyAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp(s) => write!(f, "{}", s),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

impl fmt::Debug for UnifyAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Unify behavior of tcp & unix stream
pub enum UnifyStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl UnifyStream {
    pub async fn connect(addr: &UnifyAddr) -> io::Result<Self> {
        match addr {
            UnifyAddr::Tcp(s) => Ok(Self::Tcp(TcpStream::connect(s.as_str()).await?)),
            UnifyAddr::Path(p) => Ok(Self::Unix(UnixStream::connect(p).await?)),
        }
    }
}

impl fmt::Debug for UnifyStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp(s) => match s.peer_addr() {
                Ok(addr) => write!(f, "conn {}", addr),
                Err(_) => write!(f, "tcp conn unknown"),
            },
            Self::Unix(_) => write!(f, "unix conn"),
        }
    }
}

impl AsyncRead for UnifyStream {
    fn poll_read(
        self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for UnifyStream {
    fn poll_write(
        self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Unify behavior of tcp & unix socket listener
pub enum UnifyListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl UnifyListener {
    pub async fn bind(addr: &str) -> io::Result<Self> {
        match UnifyAddr::from_str(addr)? {
            UnifyAddr::Tcp(s) => Ok(Self::Tcp(TcpListener::bind(s.as_str()).await?)),
            UnifyAddr::Path(ref path) => {
                if path.exists() {
                    fs::remove_file(path)?;
                }
                Ok(Self::Unix(UnixListener::bind(path)?))
            }
        }
    }

    pub async fn accept(&self) -> io::Result<UnifyStream> {
        match self {
            Self::Tcp(l) => {
                let (stream, _) = l.accept().await?;
                Ok(UnifyStream::Tcp(stream))
            }
            Self::Unix(l) => {
                let (stream, _) = l.accept().await?;
                Ok(UnifyStream::Unix(stream))
            }
        }
    }

    /// The bound address in the same form [bind](Self::bind) accepts, handy
    /// for `127.0.0.1:0` ephemeral listeners.
    pub fn local_addr(&self) -> io::Result<String> {
        match self {
            Self::Tcp(l) => Ok(l.local_addr()?.to_string()),
            Self::Unix(l) => {
                let addr = l.local_addr()?;
                match addr.as_pathname() {
                    Some(p) => Ok(p.display().to_string()),
                    None => Ok("unix:unnamed".to_string()),
                }
            }
        }
    }
}

impl fmt::Debug for UnifyListener {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.local_addr() {
            Ok(addr) => write!(f, "listener {}", addr),
            Err(_) => write!(f, "listener unknown"),
        }
    }
}

impl Drop for UnifyListener {
    fn drop(&mut self) {
        if let Self::Unix(l) = self {
            if let Ok(addr) = l.local_addr() {
                if let Some(p) = addr.as_pathname() {
                    let _ = fs::remove_file(Path::new(p));
                }
            }
        }
    }
}
