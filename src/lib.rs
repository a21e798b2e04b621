pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod host;
pub mod outcome;
pub mod pool;
pub mod session;
pub mod transfer;
pub mod ui;
pub mod utils;

pub use dispatch::{fan_out, ExecRequest, TransferRequest};
pub use error::{Error, Result};
pub use host::{Credentials, HostConfig};
pub use outcome::{ExecOutcome, TransferOutcome};
pub use pool::{ConnectionPool, Connector, PoolPolicy};
pub use session::{RemoteSession, SshConnector};
