#![allow(dead_code)] // Different tests use different parts.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use openssl::{
    asn1::Asn1Time,
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{HasPublic, PKey, PKeyRef, Private, Public},
    sign::{Signer, Verifier},
    x509::{X509, X509Builder, X509Name, X509NameBuilder, X509ReqBuilder},
};
use secrecy::SecretString;
use signproxy::signing::{Endpoint, KeyLabel, Roster, RpcError, SignerSettings, SiteGroup, Transport};

//------------ Test data -----------------------------------------------------

pub const PORT: &str = "8080";
pub const PASSWORD: &str = "secret";

/// Builds a roster from site names and server addresses.
pub fn roster(sites: &[(&str, &[&str])]) -> Roster {
    Roster::new(
        sites
            .iter()
            .map(|(name, addresses)| {
                addresses.iter().fold(SiteGroup::new(*name), |site, address| {
                    site.with_endpoint(*address, PORT, SecretString::new(PASSWORD.to_string()))
                })
            })
            .collect(),
    )
}

pub fn settings(pool_capacity: usize) -> SignerSettings {
    SignerSettings {
        pool_capacity,
        ..Default::default()
    }
}

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// Parses a `CN=x,O=y` style distinguished name.
pub fn name(dn: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    for part in dn.split(',') {
        if let Some((field, value)) = part.split_once('=') {
            name.append_entry_by_text(field.trim(), value.trim()).unwrap();
        }
    }
    name.build()
}

pub fn request_pem(key: &PKey<Private>, subject: &str) -> String {
    let mut req = X509ReqBuilder::new().unwrap();
    req.set_subject_name(&name(subject)).unwrap();
    req.set_pubkey(key).unwrap();
    req.sign(key, MessageDigest::sha256()).unwrap();
    String::from_utf8(req.build().to_pem().unwrap()).unwrap()
}

/// Issues a certificate for the given public key from a throwaway issuer.
pub fn certificate_for<T: HasPublic>(public_key: &PKeyRef<T>) -> X509 {
    let issuer = ec_key();
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name("CN=signproxy")).unwrap();
    builder.set_issuer_name(&name("CN=test issuer")).unwrap();
    builder.set_pubkey(public_key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
    builder.sign(&issuer, MessageDigest::sha256()).unwrap();
    builder.build()
}

//------------ ScriptedTransport ---------------------------------------------

/// What a scripted server does with every operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Succeed,
    Timeout,
    Fail(i32),
    MissingPayload,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Open { id: usize, address: String },
    Close { id: usize, address: String },
    Call { id: usize, address: String, op: &'static str },
}

#[derive(Debug)]
pub struct ScriptedConn {
    pub id: usize,
    pub address: String,
}

#[derive(Default)]
struct ScriptState {
    unreachable: Mutex<HashSet<String>>,
    outcomes: Mutex<HashMap<String, Outcome>>,
    events: Mutex<Vec<Event>>,
    next_id: AtomicUsize,
}

/// A transport whose servers behave as told and which records what was
/// done to them.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<ScriptState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections to the address time out.
    pub fn unreachable(self, address: &str) -> Self {
        self.state.unreachable.lock().unwrap().insert(address.to_string());
        self
    }

    pub fn outcome(self, address: &str, outcome: Outcome) -> Self {
        self.set_outcome(address, outcome);
        self
    }

    pub fn set_outcome(&self, address: &str, outcome: Outcome) {
        self.state.outcomes.lock().unwrap().insert(address.to_string(), outcome);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.state.events.lock().unwrap().clear()
    }

    /// The addresses operations were sent to, in order.
    pub fn calls(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Call { address, .. } => Some(address),
                _ => None,
            })
            .collect()
    }

    pub fn opened(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Open { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Close { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn closed_addresses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Close { address, .. } => Some(address),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.state.events.lock().unwrap().push(event);
    }

    fn perform<R>(&self, conn: &ScriptedConn, op: &'static str, success: impl FnOnce() -> R) -> Result<R, RpcError> {
        self.record(Event::Call {
            id: conn.id,
            address: conn.address.clone(),
            op,
        });
        let outcome = self
            .state
            .outcomes
            .lock()
            .unwrap()
            .get(&conn.address)
            .copied()
            .unwrap_or(Outcome::Succeed);
        match outcome {
            Outcome::Succeed => Ok(success()),
            Outcome::Timeout => Err(RpcError::timeout(&conn.address)),
            Outcome::Fail(code) => Err(RpcError::failed(code, format!("{} refused {}", conn.address, op))),
            Outcome::MissingPayload => Err(RpcError::MissingPayload("data")),
        }
    }
}

impl Transport for ScriptedTransport {
    type Connection = ScriptedConn;

    fn open(&self, endpoint: &Endpoint) -> Result<ScriptedConn, RpcError> {
        endpoint.port()?;
        if self.state.unreachable.lock().unwrap().contains(endpoint.address()) {
            return Err(RpcError::timeout(endpoint.address()));
        }
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let address = endpoint.address().to_string();
        self.record(Event::Open {
            id,
            address: address.clone(),
        });
        Ok(ScriptedConn { id, address })
    }

    fn close(&self, conn: ScriptedConn) {
        self.record(Event::Close {
            id: conn.id,
            address: conn.address,
        });
    }

    fn issue_csr(&self, conn: &ScriptedConn, subject: &str, _: &KeyLabel, _: &str) -> Result<String, RpcError> {
        self.perform(conn, "genP10", || request_pem(&ec_key(), subject))
    }

    fn sign(&self, conn: &ScriptedConn, _: &[u8], _: &KeyLabel, _: &str) -> Result<Vec<u8>, RpcError> {
        let signature = format!("signed by {}", conn.address).into_bytes();
        self.perform(conn, "sign", || signature)
    }

    fn verify(
        &self,
        conn: &ScriptedConn,
        _: &[u8],
        _: &[u8],
        _: &KeyLabel,
        _: &str,
        _: bool,
    ) -> Result<bool, RpcError> {
        self.perform(conn, "verify", || true)
    }

    fn upload_certificate(&self, conn: &ScriptedConn, _: &KeyLabel, _: &[u8]) -> Result<bool, RpcError> {
        self.perform(conn, "uploadCert", || true)
    }
}

//------------ FakeHsm -------------------------------------------------------

/// Code used by the fake HSM for keys it does not hold.
pub const KEY_NOT_FOUND: i32 = 7;

struct HsmKey {
    key: PKey<Private>,
    certificate: Option<Vec<u8>>,
}

#[derive(Default)]
struct HsmState {
    keys: Mutex<HashMap<(String, String), HsmKey>>,
}

/// Signing servers that really create keys and sign, using openssl.
///
/// Each server address has its own key store. Keys cannot be used for
/// signing before their certificate has been uploaded.
#[derive(Clone, Default)]
pub struct FakeHsm {
    state: Arc<HsmState>,
}

impl FakeHsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_count(&self, address: &str) -> usize {
        self.state
            .keys
            .lock()
            .unwrap()
            .keys()
            .filter(|(a, _)| a == address)
            .count()
    }

    pub fn has_certificate(&self, address: &str, label: &KeyLabel) -> bool {
        self.state
            .keys
            .lock()
            .unwrap()
            .get(&(address.to_string(), label.to_string()))
            .map(|key| key.certificate.is_some())
            .unwrap_or(false)
    }

    fn with_key<R>(
        &self,
        address: &str,
        label: &KeyLabel,
        op: impl FnOnce(&mut HsmKey) -> Result<R, RpcError>,
    ) -> Result<R, RpcError> {
        let mut keys = self.state.keys.lock().unwrap();
        match keys.get_mut(&(address.to_string(), label.to_string())) {
            Some(key) => op(key),
            None => Err(RpcError::failed(KEY_NOT_FOUND, format!("no key '{}' at {}", label, address))),
        }
    }
}

impl Transport for FakeHsm {
    type Connection = String;

    fn open(&self, endpoint: &Endpoint) -> Result<String, RpcError> {
        endpoint.port()?;
        Ok(endpoint.address().to_string())
    }

    fn close(&self, _conn: String) {}

    fn issue_csr(&self, conn: &String, subject: &str, label: &KeyLabel, _: &str) -> Result<String, RpcError> {
        let key = ec_key();
        let pem = request_pem(&key, subject);
        self.state.keys.lock().unwrap().insert(
            (conn.clone(), label.to_string()),
            HsmKey {
                key,
                certificate: None,
            },
        );
        Ok(pem)
    }

    fn sign(&self, conn: &String, message: &[u8], label: &KeyLabel, _: &str) -> Result<Vec<u8>, RpcError> {
        self.with_key(conn, label, |key| {
            if key.certificate.is_none() {
                return Err(RpcError::MissingPayload("data"));
            }
            let mut signer = Signer::new(MessageDigest::sha256(), &key.key).map_err(RpcError::generic)?;
            signer.update(message).map_err(RpcError::generic)?;
            signer.sign_to_vec().map_err(RpcError::generic)
        })
    }

    fn verify(
        &self,
        conn: &String,
        message: &[u8],
        signature: &[u8],
        label: &KeyLabel,
        _: &str,
        _: bool,
    ) -> Result<bool, RpcError> {
        self.with_key(conn, label, |key| {
            if key.certificate.is_none() {
                return Err(RpcError::MissingPayload("data"));
            }
            let mut verifier = Verifier::new(MessageDigest::sha256(), &key.key).map_err(RpcError::generic)?;
            verifier.update(message).map_err(RpcError::generic)?;
            // A mangled signature may not even parse.
            Ok(verifier.verify(signature).unwrap_or(false))
        })
    }

    fn upload_certificate(&self, conn: &String, label: &KeyLabel, certificate: &[u8]) -> Result<bool, RpcError> {
        let cert = X509::from_der(certificate).map_err(RpcError::generic)?;
        let public_key: PKey<Public> = cert.public_key().map_err(RpcError::generic)?;
        let mut keys = self.state.keys.lock().unwrap();
        match keys.get_mut(&(conn.clone(), label.to_string())) {
            Some(key) if key.key.public_eq(&public_key) => {
                key.certificate = Some(certificate.to_vec());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
