//! Delegating private key operations to remote signing servers.
//!
//! Servers are grouped by site in a [`Roster`]. A [`RemoteSigner`] keeps a
//! [`SessionPool`] of open connections and fails over between the servers
//! of the roster when one of them cannot be reached.

pub mod csr;
pub mod probe;

mod endpoint;
mod error;
mod failover;
mod keys;
mod pool;
mod signer;
mod transport;

pub use self::endpoint::{Endpoint, Roster, SiteGroup};
pub use self::error::{RpcError, SignerError};
pub use self::failover::Failover;
pub use self::keys::{GeneratedKey, KeyLabel, KeyMap};
pub use self::pool::{Session, SessionPool};
pub use self::probe::ProbeStatus;
pub use self::signer::{RemoteSigner, SignerSettings};
pub use self::transport::{HttpConnection, HttpSettings, HttpTransport, Transport};
