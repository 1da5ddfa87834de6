//! Control session seam and transfer port connections

mod tls;

use std::net::SocketAddr;

pub use tls::{connect_tls, server_name_for};

use hotline_common::TRANSFER_PORT_OFFSET;

/// What the transfer layer needs to know about the control connection
///
/// The control protocol itself lives elsewhere; it only has to report where
/// it is connected and whether that connection is encrypted.
pub trait ControlSession {
    /// Remote address of the control connection
    fn remote_addr(&self) -> SocketAddr;

    /// Whether the control connection runs over TLS
    fn uses_tls(&self) -> bool;

    /// Host name used for certificate validation
    fn host(&self) -> String {
        self.remote_addr().ip().to_string()
    }
}

/// A plain address + TLS flag, for callers without a live control session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEndpoint {
    pub addr: SocketAddr,
    pub tls: bool,
    pub host: Option<String>,
}

impl ControlEndpoint {
    pub fn new(addr: SocketAddr, tls: bool) -> Self {
        Self {
            addr,
            tls,
            host: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

impl ControlSession for ControlEndpoint {
    fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    fn uses_tls(&self) -> bool {
        self.tls
    }

    fn host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| self.addr.ip().to_string())
    }
}

/// Transfer port address for a control connection (same host, port + 1)
///
/// Returns `None` when the control port is 65535.
pub fn transfer_address(control: SocketAddr) -> Option<SocketAddr> {
    let port = control.port().checked_add(TRANSFER_PORT_OFFSET)?;
    Some(SocketAddr::new(control.ip(), port))
}
