//! The signing operations offered to the rest of the node.

use std::{sync::Arc, time::Duration};

use log::{debug, info};

use super::{
    csr,
    endpoint::{Endpoint, Roster},
    error::SignerError,
    failover::Failover,
    keys::{GeneratedKey, KeyLabel, KeyMap},
    pool::SessionPool,
    probe::{self, ProbeStatus},
    transport::{HttpTransport, Transport},
};
use crate::{
    config::Config,
    constants::{
        DEFAULT_DIGEST_ALGORITHM, DEFAULT_HEALTH_CHECK_TIMEOUT_SECS, DEFAULT_KEY_ALGORITHM,
        DEFAULT_KEY_LABEL_PREFIX, DEFAULT_POOL_CAPACITY, DEFAULT_SUBJECT_DN,
    },
};

const OP_GENERATE_KEY: &str = "generate key";
const OP_SIGN: &str = "sign";
const OP_VERIFY: &str = "verify";
const OP_UPLOAD_CERT: &str = "upload certificate";

//------------ SignerSettings ------------------------------------------------

#[derive(Clone, Debug)]
pub struct SignerSettings {
    /// Prepended to the random identifier of each new key label.
    pub key_label_prefix: String,

    /// The subject of the certificate requests for new keys.
    pub subject_dn: String,

    pub key_algorithm: String,
    pub digest_algorithm: String,

    /// The number of idle sessions kept for reuse.
    pub pool_capacity: usize,

    pub health_check_timeout: Duration,

    /// Whether servers should check revocation when verifying.
    pub check_crl: bool,
}

impl Default for SignerSettings {
    fn default() -> Self {
        SignerSettings {
            key_label_prefix: DEFAULT_KEY_LABEL_PREFIX.to_string(),
            subject_dn: DEFAULT_SUBJECT_DN.to_string(),
            key_algorithm: DEFAULT_KEY_ALGORITHM.to_string(),
            digest_algorithm: DEFAULT_DIGEST_ALGORITHM.to_string(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
            check_crl: true,
        }
    }
}

//------------ RemoteSigner --------------------------------------------------

/// Key generation, signing and verification by remote signing servers.
///
/// Private keys never leave the servers. Each signer owns its session pool,
/// so independent signers do not share connections.
pub struct RemoteSigner<T: Transport> {
    settings: SignerSettings,
    roster: Roster,
    pool: SessionPool<T>,
    keys: KeyMap,
}

impl RemoteSigner<HttpTransport> {
    /// Creates a signer talking HTTP to the configured servers.
    pub fn from_config(config: &Config) -> Self {
        RemoteSigner::new(
            HttpTransport::new(config.http_settings()),
            config.roster(),
            config.signer_settings(),
        )
    }
}

impl<T: Transport> RemoteSigner<T> {
    pub fn new(transport: T, roster: Roster, settings: SignerSettings) -> Self {
        let pool = SessionPool::new(transport, settings.pool_capacity);
        RemoteSigner {
            settings,
            roster,
            pool,
            keys: KeyMap::default(),
        }
    }

    pub fn settings(&self) -> &SignerSettings {
        &self.settings
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn pool(&self) -> &SessionPool<T> {
        &self.pool
    }

    pub fn keys(&self) -> &KeyMap {
        &self.keys
    }

    fn failover(&self) -> Failover<'_, T> {
        Failover::new(&self.pool, &self.roster)
    }

    /// Has a signing server create a new key pair.
    ///
    /// Uses a pooled session or the first server accepting a connection.
    /// A failure of the server is not retried elsewhere.
    pub fn generate_key(&self, ephemeral: bool) -> Result<GeneratedKey, SignerError> {
        let label = KeyLabel::generate(&self.settings.key_label_prefix);
        let failover = self.failover();

        let session = failover.session(OP_GENERATE_KEY)?;
        let endpoint = session.endpoint().clone();

        let pem = failover.once(OP_GENERATE_KEY, &label, session, |transport, conn| {
            transport.issue_csr(conn, &self.settings.subject_dn, &label, &self.settings.key_algorithm)
        })?;

        let der = csr::decode_request(&pem)?;
        let public_key = csr::request_public_key(&der)?;

        info!("Created key '{}' at {}", label, endpoint);
        self.keys.remember(label.clone(), endpoint);

        Ok(GeneratedKey::new(label, public_key, ephemeral))
    }

    /// Signs a message with the given key on any available server.
    pub fn sign(&self, label: &KeyLabel, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let digest = self.settings.digest_algorithm.as_str();
        self.failover()
            .run(OP_SIGN, label, |transport, conn| transport.sign(conn, message, label, digest))
    }

    /// Verifies a signature with the given key on any available server.
    pub fn verify(&self, label: &KeyLabel, message: &[u8], signature: &[u8]) -> Result<bool, SignerError> {
        let digest = self.settings.digest_algorithm.as_str();
        let check_crl = self.settings.check_crl;
        self.failover().run(OP_VERIFY, label, |transport, conn| {
            transport.verify(conn, message, signature, label, digest, check_crl)
        })
    }

    /// Stores the certificate for a key.
    ///
    /// Goes to the server that created the key if it was created by this
    /// signer. There is exactly one attempt. Once the certificate is stored
    /// the key is no longer bound to that server.
    pub fn upload_certificate(&self, label: &KeyLabel, certificate: &[u8]) -> Result<(), SignerError> {
        let der = csr::certificate_der(certificate)?;
        let failover = self.failover();

        let session = match self.keys.endpoint_for(label) {
            Some(endpoint) => self
                .pool
                .open(&endpoint)
                .map_err(|err| SignerError::remote(OP_UPLOAD_CERT, &endpoint, label, err))?,
            None => {
                debug!("Key '{}' was not created here, uploading to any server", label);
                failover.session(OP_UPLOAD_CERT)?
            }
        };
        let endpoint = session.endpoint().clone();

        let stored = failover.once(OP_UPLOAD_CERT, label, session, |transport, conn| {
            transport.upload_certificate(conn, label, &der)
        })?;

        if stored {
            info!("Uploaded certificate for key '{}' to {}", label, endpoint);
            self.keys.forget(label);
            Ok(())
        } else {
            Err(SignerError::CertificateRejected {
                endpoint: endpoint.to_string(),
                label: label.to_string(),
            })
        }
    }

    /// Probes every configured server, in roster order.
    pub fn probe_endpoints(&self) -> Vec<(Arc<Endpoint>, ProbeStatus)> {
        let timeout = probe::health_check_timeout(self.settings.health_check_timeout);

        // An endpoint with an unusable port cannot be reached.
        let addresses: Vec<Option<String>> = self
            .roster
            .candidates()
            .iter()
            .map(|endpoint| endpoint.authority().ok())
            .collect();
        let usable: Vec<&str> = addresses.iter().flatten().map(String::as_str).collect();
        let mut statuses = probe::check_all(&usable, timeout).into_iter();

        self.roster
            .candidates()
            .iter()
            .zip(addresses.iter())
            .map(|(endpoint, address)| {
                let status = match address {
                    Some(_) => statuses.next().unwrap_or(ProbeStatus::Unreachable),
                    None => ProbeStatus::Unreachable,
                };
                (endpoint.clone(), status)
            })
            .collect()
    }
}
