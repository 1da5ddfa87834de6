//! Connection helpers for the transfer executor
//!
//! Handles locating the transfer port (control port + 1), dialing it with a
//! bounded timeout, the optional TLS handshake, and the HTXF preamble.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use hotline_common::handshake::{Handshake, ReferenceNumber};

use crate::config::TransferSettings;
use crate::network::{ControlSession, connect_tls, transfer_address};
use crate::transfers::types::TransferError;

/// Byte stream to the transfer port, plain or TLS
pub trait TransferStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> TransferStream for T {}

/// Boxed transfer connection (type alias to reduce complexity)
pub type BoxedStream = Box<dyn TransferStream>;

/// Where a transfer connects, derived from the control session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub addr: SocketAddr,
    pub host: String,
    pub tls: bool,
}

impl TransferTarget {
    pub fn from_session<S>(session: &S) -> Result<Self, TransferError>
    where
        S: ControlSession + ?Sized,
    {
        let control = session.remote_addr();
        let addr = transfer_address(control).ok_or_else(|| {
            TransferError::connection(
                "connection failed",
                format!("control port {} has no transfer port", control.port()),
            )
        })?;
        Ok(Self {
            addr,
            host: session.host(),
            tls: session.uses_tls(),
        })
    }
}

/// Dial the transfer port and negotiate TLS when the control session uses it
pub async fn open(
    target: &TransferTarget,
    settings: &TransferSettings,
) -> Result<BoxedStream, TransferError> {
    let limit = settings.connect_timeout();

    let tcp = timeout(limit, TcpStream::connect(target.addr))
        .await
        .map_err(|_| TransferError::connection("connection failed", timed_out(limit)))?
        .map_err(|e| TransferError::connection("connection failed", e))?;
    // Not fatal: only affects latency of small writes
    let _ = tcp.set_nodelay(true);

    if !target.tls {
        debug!(addr = %target.addr, "transfer connection established");
        return Ok(Box::new(tcp));
    }

    let tls = timeout(
        limit,
        connect_tls(tcp, &target.host, settings.verify_certificates),
    )
    .await
    .map_err(|_| TransferError::connection("tls handshake failed", timed_out(limit)))?
    .map_err(|e| TransferError::connection("tls handshake failed", e))?;

    debug!(
        addr = %target.addr,
        verified = settings.verify_certificates,
        "transfer connection established over TLS"
    );
    Ok(Box::new(tls))
}

/// Send the 16-byte HTXF preamble identifying this transfer
pub async fn send_handshake<W>(
    stream: &mut W,
    reference: ReferenceNumber,
    total_size: u32,
    idle_timeout: Option<Duration>,
) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    let handshake = Handshake::new(reference, total_size);
    let write = handshake.write_to(stream);
    match idle_timeout {
        Some(limit) => timeout(limit, write)
            .await
            .map_err(|_| TransferError::protocol("handshake failed", timed_out(limit)))?,
        None => write.await,
    }
    .map_err(|e| TransferError::protocol("handshake failed", e))?;

    debug!(%reference, total_size, "handshake sent");
    Ok(())
}

fn timed_out(limit: Duration) -> String {
    format!("timed out after {} seconds", limit.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ControlEndpoint;
    use crate::transfers::types::ErrorKind;

    #[test]
    fn test_target_from_session() {
        let session = ControlEndpoint::new("127.0.0.1:5500".parse().unwrap(), true);
        let target = TransferTarget::from_session(&session).unwrap();
        assert_eq!(target.addr, "127.0.0.1:5501".parse().unwrap());
        assert_eq!(target.host, "127.0.0.1");
        assert!(target.tls);
    }

    #[test]
    fn test_target_rejects_last_port() {
        let session = ControlEndpoint::new("127.0.0.1:65535".parse().unwrap(), false);
        let error = TransferTarget::from_session(&session).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_send_handshake_bytes() {
        let mut out = Vec::new();
        send_handshake(
            &mut out,
            ReferenceNumber([0, 0, 0, 7]),
            1024,
            Some(Duration::from_secs(1)),
        )
        .await
        .unwrap();
        assert_eq!(
            out,
            [
                0x48, 0x54, 0x58, 0x46, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00,
                0x00, 0x00
            ]
        );
    }

    #[tokio::test]
    async fn test_open_refused() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let target = TransferTarget {
            addr,
            host: "127.0.0.1".to_string(),
            tls: false,
        };
        let error = open(&target, &TransferSettings::default())
            .await
            .err()
            .unwrap();
        assert_eq!(error.kind(), ErrorKind::Connection);
        assert_eq!(error.stage(), "connection failed");
    }
}
