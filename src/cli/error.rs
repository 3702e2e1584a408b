use std::{fmt, io, path::Path};

use crate::{config::ConfigError, signing::SignerError};

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    Signer(SignerError),
    Io(String, io::Error),
    Input(String),
}

impl Error {
    pub fn io(path: &Path, e: io::Error) -> Self {
        Error::Io(path.display().to_string(), e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Signer(e) => e.fmt(f),
            Error::Io(path, e) => write!(f, "Cannot read '{}': {}", path, e),
            Error::Input(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<SignerError> for Error {
    fn from(e: SignerError) -> Self {
        Error::Signer(e)
    }
}
