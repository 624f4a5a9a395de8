/// The error type surfaced by every client-facing operation.
///
/// Cloneable on purpose: when the receive side of a connection dies, the
/// same transport error is fanned out to every call still pending on it.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The sentinel returned by operations on a client that was already
    /// closed by the user or torn down by a transport failure.
    #[error("connection is shut down")]
    Shutdown,
    /// The peer closed the stream at a frame boundary or mid-frame. Kept
    /// apart from [Io](Self::Io) so orderly disconnects are not logged as
    /// failures.
    #[error("end of stream")]
    Eof,
    /// Read or write failure on the underlying stream.
    #[error("rpc: io error: {0}")]
    Io(String),
    /// Malformed preamble, wrong magic number, or an oversized frame.
    #[error("rpc: protocol error: {0}")]
    Protocol(String),
    #[error("rpc codec: encode error: {0}")]
    Encode(String),
    #[error("rpc codec: decode error: {0}")]
    Decode(String),
    /// Whatever the server put in `Header.Error`, verbatim. Covers method
    /// errors, dispatch failures and server-side handle timeouts.
    #[error("{0}")]
    Server(String),
    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),
    #[error("rpc discovery: no available servers")]
    NoAvailableServers,
    #[error("rpc registry: {0}")]
    Registry(String),
    #[error("rpc client: wrong format {0:?}, expect protocol@addr")]
    AddrFormat(String),
    #[error("unexpected HTTP response: {0}")]
    HttpResponse(String),
}

impl From<std::io::Error> for RpcError {
    #[inline]
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Self::Eof;
        }
        Self::Io(e.to_string())
    }
}

/// Failures while resolving `Service.Method` on the server.
///
/// These never tear down a connection; their rendering is sent back in
/// `Header.Error` and the dispatch loop moves on to the next frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("rpc server: service/method request ill-formed: {0}")]
    IllFormed(String),
    #[error("rpc server: can't find service {0}")]
    ServiceNotFound(String),
    #[error("rpc server: can't find method {0}")]
    MethodNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rendering() {
        let e = RpcError::Shutdown;
        assert_eq!(e.to_string(), "connection is shut down");
        let e = DispatchError::ServiceNotFound("Foo".to_string());
        assert_eq!(e.to_string(), "rpc server: can't find service Foo");
        let e: RpcError = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert_eq!(e, RpcError::Eof);
        let e: RpcError = std::io::Error::from(std::io::ErrorKind::ConnectionReset).into();
        assert!(matches!(e, RpcError::Io(_)));
    }
}
