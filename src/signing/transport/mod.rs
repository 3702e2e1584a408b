//! Remote operations against a single signing server.
//!
//! A [`Transport`] knows how to open a connection to an [`Endpoint`] and
//! how to perform each remote operation over such a connection. The
//! connection itself is opaque to the rest of the crate: the session pool
//! and the failover logic only move it around and hand it back to the
//! transport to be used or closed.

mod http;

pub use self::http::{HttpConnection, HttpSettings, HttpTransport};

use super::{endpoint::Endpoint, error::RpcError, keys::KeyLabel};

//------------ Transport -----------------------------------------------------

pub trait Transport: Send + Sync {
    /// A live connection to one server.
    type Connection: Send;

    /// Opens a connection to the given server.
    ///
    /// A server that cannot be reached in time results in
    /// [`RpcError::Timeout`], a malformed endpoint configuration in
    /// [`RpcError::Config`].
    fn open(&self, endpoint: &Endpoint) -> Result<Self::Connection, RpcError>;

    /// Closes a connection. Failures are not reported.
    fn close(&self, conn: Self::Connection);

    /// Has the server create a key pair under `label` and returns a PEM
    /// encoded certificate request for it.
    fn issue_csr(
        &self,
        conn: &Self::Connection,
        subject: &str,
        label: &KeyLabel,
        key_algorithm: &str,
    ) -> Result<String, RpcError>;

    /// Signs `message` with the key stored under `label`.
    fn sign(
        &self,
        conn: &Self::Connection,
        message: &[u8],
        label: &KeyLabel,
        digest_algorithm: &str,
    ) -> Result<Vec<u8>, RpcError>;

    /// Verifies `signature` over `message` with the key stored under `label`.
    fn verify(
        &self,
        conn: &Self::Connection,
        message: &[u8],
        signature: &[u8],
        label: &KeyLabel,
        digest_algorithm: &str,
        check_crl: bool,
    ) -> Result<bool, RpcError>;

    /// Stores the DER encoded certificate for the key under `label`.
    fn upload_certificate(
        &self,
        conn: &Self::Connection,
        label: &KeyLabel,
        certificate: &[u8],
    ) -> Result<bool, RpcError>;
}
