//! Hotline file transfer client
//!
//! Runs downloads and uploads over the transfer port (control port + 1), each
//! on its own tokio task, and tracks them in a shared [`TaskManager`].
//!
//! The control connection is not handled here. It supplies the reference
//! number and declared size for each transfer ([`TransferReply`]) and exposes
//! its remote address and TLS status through [`ControlSession`].

pub mod config;
pub mod constants;
pub mod network;
pub mod transfers;

pub use config::TransferSettings;
pub use network::{ControlEndpoint, ControlSession};
pub use transfers::{
    ErrorKind, Task, TaskManager, TaskStatus, TransferDirection, TransferError, TransferEvent,
    TransferExecutor, TransferReply,
};
