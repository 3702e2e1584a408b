//! Key labels and the servers holding the keys.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use openssl::pkey::{PKey, Public};
use rand::Rng;

use super::{endpoint::Endpoint, error::SignerError};
use crate::constants::KEY_ID_DIGITS;

//------------ KeyLabel ------------------------------------------------------

/// The name under which a signing server stores a key pair.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct KeyLabel(String);

impl KeyLabel {
    /// Creates a new label from the given prefix and a random identifier.
    ///
    /// The label does not depend on anything the signing server returns,
    /// so it can be used in the very request that creates the key.
    pub fn generate(prefix: &str) -> Self {
        let mut rng = rand::rng();
        let id: String = (0..KEY_ID_DIGITS)
            .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
            .collect();
        KeyLabel(format!("{}{}", prefix, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for KeyLabel {
    fn from(s: String) -> Self {
        KeyLabel(s)
    }
}

impl From<&str> for KeyLabel {
    fn from(s: &str) -> Self {
        KeyLabel(s.to_string())
    }
}

impl AsRef<str> for KeyLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

//------------ GeneratedKey --------------------------------------------------

/// A key pair freshly created by a signing server.
#[derive(Clone, Debug)]
pub struct GeneratedKey {
    label: KeyLabel,
    public_key: PKey<Public>,
    ephemeral: bool,
}

impl GeneratedKey {
    pub fn new(label: KeyLabel, public_key: PKey<Public>, ephemeral: bool) -> Self {
        GeneratedKey {
            label,
            public_key,
            ephemeral,
        }
    }

    pub fn label(&self) -> &KeyLabel {
        &self.label
    }

    pub fn public_key(&self) -> &PKey<Public> {
        &self.public_key
    }

    /// Returns the DER encoded SubjectPublicKeyInfo of the key.
    pub fn public_key_der(&self) -> Result<Vec<u8>, SignerError> {
        Ok(self.public_key.public_key_to_der()?)
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }
}

//------------ KeyMap --------------------------------------------------------

/// An in-memory mapping of key labels to the server that created the key.
///
/// Keys are only guaranteed to be known to the server that created them
/// until their certificate has been uploaded, so operations tied to that
/// moment must be sent to that server.
#[derive(Debug, Default)]
pub struct KeyMap {
    keys: RwLock<HashMap<KeyLabel, Arc<Endpoint>>>,
}

impl KeyMap {
    pub fn remember(&self, label: KeyLabel, endpoint: Arc<Endpoint>) {
        self.keys
            .write()
            .expect("key map lock is poisoned")
            .insert(label, endpoint);
    }

    /// Drops the binding of a key, once nothing needs its creating server.
    pub fn forget(&self, label: &KeyLabel) -> Option<Arc<Endpoint>> {
        self.keys.write().expect("key map lock is poisoned").remove(label)
    }

    pub fn endpoint_for(&self, label: &KeyLabel) -> Option<Arc<Endpoint>> {
        self.keys
            .read()
            .expect("key map lock is poisoned")
            .get(label)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.read().expect("key map lock is poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//------------ Tests ---------------------------------------------------------
