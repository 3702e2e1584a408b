//! Choosing the signing server that performs an operation.

use log::{debug, warn};

use super::{
    endpoint::Roster,
    error::{RpcError, SignerError},
    keys::KeyLabel,
    pool::{Session, SessionPool},
    transport::Transport,
};

//------------ Failover ------------------------------------------------------

/// Runs remote operations against the servers of a roster.
///
/// Operations that any server can perform are retried down the candidate
/// list: a timeout closes the session and moves on, a failure reported by
/// the server keeps the session and moves on. Anything else ends the
/// operation, since a different server would not do better.
pub struct Failover<'a, T: Transport> {
    pool: &'a SessionPool<T>,
    roster: &'a Roster,
}

impl<'a, T: Transport> Failover<'a, T> {
    pub fn new(pool: &'a SessionPool<T>, roster: &'a Roster) -> Self {
        Failover { pool, roster }
    }

    /// Returns a pooled session or a new one to the first server that
    /// accepts a connection.
    pub fn session(&self, operation: &'static str) -> Result<Session<T::Connection>, SignerError> {
        if let Some(session) = self.pool.acquire() {
            return Ok(session);
        }

        let mut last = None;
        for endpoint in self.roster.candidates() {
            match self.pool.open(endpoint) {
                Ok(session) => return Ok(session),
                Err(err) => {
                    warn!("Cannot connect to signing server {} for {}: {}", endpoint, operation, err);
                    last = Some(err);
                }
            }
        }

        Err(SignerError::NoServerAvailable {
            operation,
            attempted: self.roster.len(),
            last,
        })
    }

    /// Performs an operation once, on the given session.
    ///
    /// The session goes back to the pool unless the server timed out.
    pub fn once<R>(
        &self,
        operation: &'static str,
        label: &KeyLabel,
        session: Session<T::Connection>,
        op: impl FnOnce(&T, &T::Connection) -> Result<R, RpcError>,
    ) -> Result<R, SignerError> {
        let res = op(self.pool.transport(), session.conn());
        let endpoint = session.endpoint().clone();
        match res {
            Ok(res) => {
                self.pool.release(session);
                Ok(res)
            }
            Err(err) => {
                if err.is_timeout() {
                    self.pool.close(session);
                } else {
                    self.pool.release(session);
                }
                Err(SignerError::remote(operation, endpoint, label, err))
            }
        }
    }

    /// Performs an operation on the first server able to complete it.
    ///
    /// Servers are tried in roster order, so an earlier site is used again
    /// as soon as it recovers. An idle session to a server is reused before
    /// a new one is opened.
    pub fn run<R>(
        &self,
        operation: &'static str,
        label: &KeyLabel,
        op: impl Fn(&T, &T::Connection) -> Result<R, RpcError>,
    ) -> Result<R, SignerError> {
        let mut last = None;

        for endpoint in self.roster.candidates() {
            let session = match self.pool.acquire_for(endpoint) {
                Some(session) => session,
                None => match self.pool.open(endpoint) {
                    Ok(session) => session,
                    Err(err) => {
                        warn!("Cannot connect to signing server {} for {}: {}", endpoint, operation, err);
                        last = Some(err);
                        continue;
                    }
                },
            };

            match op(self.pool.transport(), session.conn()) {
                Ok(res) => {
                    debug!("{} for key '{}' done by {}", operation, label, endpoint);
                    self.pool.release(session);
                    return Ok(res);
                }
                Err(err @ RpcError::Timeout(_)) => {
                    warn!("Signing server {} timed out during {} for key '{}': {}", endpoint, operation, label, err);
                    self.pool.close(session);
                    last = Some(err);
                }
                Err(err @ RpcError::Failed { .. }) => {
                    warn!("Signing server {} failed {} for key '{}': {}", endpoint, operation, label, err);
                    self.pool.release(session);
                    last = Some(err);
                }
                Err(err) => {
                    self.pool.release(session);
                    return Err(SignerError::remote(operation, endpoint, label, err));
                }
            }
        }

        Err(SignerError::NoServerAvailable {
            operation,
            attempted: self.roster.len(),
            last,
        })
    }
}
