//! Reuse of open connections to signing servers.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
};

use log::{debug, trace};

use super::{endpoint::Endpoint, error::RpcError, transport::Transport};

//------------ Session -------------------------------------------------------

/// A live connection together with the server it was opened against.
pub struct Session<C> {
    endpoint: Arc<Endpoint>,
    conn: C,
}

impl<C> Session<C> {
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn conn(&self) -> &C {
        &self.conn
    }
}

impl<C> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session").field("endpoint", &self.endpoint.to_string()).finish()
    }
}

//------------ SessionPool ---------------------------------------------------

/// A bounded set of idle sessions.
///
/// Neither taking nor returning a session ever waits: an empty pool simply
/// has nothing to hand out, and a session returned to a full pool is closed
/// on the spot. The lock guarding the idle sessions is never held while
/// talking to a server.
pub struct SessionPool<T: Transport> {
    transport: T,
    idle: Mutex<VecDeque<Session<T::Connection>>>,
    capacity: usize,
}

impl<T: Transport> SessionPool<T> {
    pub fn new(transport: T, capacity: usize) -> Self {
        SessionPool {
            transport,
            idle: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("session pool lock is poisoned").len()
    }

    /// Takes an idle session, if there is one.
    pub fn acquire(&self) -> Option<Session<T::Connection>> {
        let session = self.idle.lock().expect("session pool lock is poisoned").pop_front();
        if let Some(session) = &session {
            trace!("Reusing session to {}", session.endpoint);
        }
        session
    }

    /// Takes an idle session to the given server, if there is one.
    ///
    /// Sessions to other servers stay where they are.
    pub fn acquire_for(&self, endpoint: &Arc<Endpoint>) -> Option<Session<T::Connection>> {
        let session = {
            let mut idle = self.idle.lock().expect("session pool lock is poisoned");
            let pos = idle.iter().position(|s| Arc::ptr_eq(&s.endpoint, endpoint))?;
            idle.remove(pos)
        };
        if let Some(session) = &session {
            trace!("Reusing session to {}", session.endpoint);
        }
        session
    }

    /// Hands a session back for reuse, closing it if the pool is full.
    pub fn release(&self, session: Session<T::Connection>) {
        let overflow = {
            let mut idle = self.idle.lock().expect("session pool lock is poisoned");
            if idle.len() < self.capacity {
                idle.push_back(session);
                None
            } else {
                Some(session)
            }
        };

        if let Some(session) = overflow {
            debug!("Session pool is full, closing session to {}", session.endpoint);
            self.close(session);
        }
    }

    /// Opens a new session to the given server.
    pub fn open(&self, endpoint: &Arc<Endpoint>) -> Result<Session<T::Connection>, RpcError> {
        let conn = self.transport.open(endpoint)?;
        debug!("Opened session to {}", endpoint);
        Ok(Session {
            endpoint: endpoint.clone(),
            conn,
        })
    }

    /// Closes a session. It must not be used again.
    pub fn close(&self, session: Session<T::Connection>) {
        trace!("Closing session to {}", session.endpoint);
        self.transport.close(session.conn);
    }
}

impl<T: Transport> Drop for SessionPool<T> {
    fn drop(&mut self) {
        let idle = match self.idle.get_mut() {
            Ok(idle) => std::mem::take(idle),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for session in idle {
            self.transport.close(session.conn);
        }
    }
}

impl<T: Transport> fmt::Debug for SessionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("capacity", &self.capacity)
            .field("idle", &self.idle_count())
            .finish()
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use secrecy::SecretString;

    use super::*;
    use crate::signing::keys::KeyLabel;

    /// A transport that only counts connections.
    #[derive(Default)]
    struct Counting {
        opened: AtomicUsize,
        closed: Mutex<Vec<usize>>,
    }

    impl Transport for Counting {
        type Connection = usize;

        fn open(&self, _endpoint: &Endpoint) -> Result<usize, RpcError> {
            Ok(self.opened.fetch_add(1, Ordering::SeqCst))
        }

        fn close(&self, conn: usize) {
            self.closed.lock().unwrap().push(conn);
        }

        fn issue_csr(&self, _: &usize, _: &str, _: &KeyLabel, _: &str) -> Result<String, RpcError> {
            unimplemented!()
        }

        fn sign(&self, _: &usize, _: &[u8], _: &KeyLabel, _: &str) -> Result<Vec<u8>, RpcError> {
            unimplemented!()
        }

        fn verify(&self, _: &usize, _: &[u8], _: &[u8], _: &KeyLabel, _: &str, _: bool) -> Result<bool, RpcError> {
            unimplemented!()
        }

        fn upload_certificate(&self, _: &usize, _: &KeyLabel, _: &[u8]) -> Result<bool, RpcError> {
            unimplemented!()
        }
    }

    fn endpoint() -> Arc<Endpoint> {
        Arc::new(Endpoint::new("a", "10.0.0.1", "8080", SecretString::new(String::new())))
    }

    #[test]
    fn empty_pool_hands_out_nothing() {
        let pool = SessionPool::new(Counting::default(), 2);
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn overflow_is_closed_not_kept() {
        let pool = SessionPool::new(Counting::default(), 2);
        let endpoint = endpoint();
        let sessions: Vec<_> = (0..5).map(|_| pool.open(&endpoint).unwrap()).collect();

        for session in sessions {
            pool.release(session);
            assert!(pool.idle_count() <= 2);
        }

        assert_eq!(2, pool.idle_count());
        assert_eq!(vec![2, 3, 4], *pool.transport().closed.lock().unwrap());
    }

    #[test]
    fn sessions_are_reused_in_order() {
        let pool = SessionPool::new(Counting::default(), 4);
        let endpoint = endpoint();
        pool.release(pool.open(&endpoint).unwrap());
        pool.release(pool.open(&endpoint).unwrap());

        assert_eq!(0, *pool.acquire().unwrap().conn());
        assert_eq!(1, *pool.acquire().unwrap().conn());
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn sessions_to_other_servers_are_left_alone() {
        let pool = SessionPool::new(Counting::default(), 4);
        let a = endpoint();
        let b = Arc::new(Endpoint::new("b", "10.1.0.1", "8080", SecretString::new(String::new())));
        pool.release(pool.open(&b).unwrap());

        assert!(pool.acquire_for(&a).is_none());
        assert_eq!(1, pool.idle_count());

        pool.release(pool.open(&a).unwrap());
        let session = pool.acquire_for(&a).unwrap();
        assert_eq!(1, *session.conn());
        assert!(Arc::ptr_eq(&a, session.endpoint()));
        assert_eq!(0, *pool.acquire_for(&b).unwrap().conn());
    }

    #[test]
    fn zero_capacity_closes_everything() {
        let pool = SessionPool::new(Counting::default(), 0);
        pool.release(pool.open(&endpoint()).unwrap());
        assert_eq!(0, pool.idle_count());
        assert_eq!(vec![0], *pool.transport().closed.lock().unwrap());
    }
}
