//! Various crate-wide constants.

//------------ Binary Names -------------------------------------------------

/// The friendly name of the `signproxy` binary.
pub const SIGNPROXY_APP: &str = "Signproxy";

/// The version of this crate.
pub const SIGNPROXY_VERSION: &str = env!("CARGO_PKG_VERSION");


//------------ Config Files Paths -------------------------------------------

/// The default path to the config file.
pub const SIGNPROXY_DEFAULT_CONFIG_FILE: &str = "./defaults/signproxy.conf";


//------------ Environment Variables ----------------------------------------

/// The environment variable with the log level.
///
/// The variable should contain the name of a [`log::LevelFilter`]. It is
/// used when the config file does not set a level. The default is “info.”
pub const SIGNPROXY_ENV_LOG_LEVEL: &str = "SIGNPROXY_LOG_LEVEL";

/// The environment variable with the health check timeout in seconds.
///
/// Absent or unparsable values fall back to
/// [`DEFAULT_HEALTH_CHECK_TIMEOUT_SECS`].
pub const SIGNPROXY_ENV_HEALTH_TIMEOUT: &str = "SIGNPROXY_HEALTH_TIMEOUT";


//------------ Result Codes -------------------------------------------------

/// The result code of a successful remote operation.
pub const RESULT_OK: i32 = 0;

/// The result code reserved for “connection timeout / peer unreachable.”
///
/// Failures carrying this code are retried on the next signing server.
pub const RESULT_TIMEOUT: i32 = -8034;

/// The result code used for generic failures without a code of their own.
pub const RESULT_GENERIC_FAILURE: i32 = 1;

/// The result code used for responses that lack an expected payload.
pub const RESULT_PROTOCOL_ERROR: i32 = 2;

/// The result code used for unusable endpoint configuration.
pub const RESULT_CONFIG_ERROR: i32 = 3;


//------------ Timeouts -----------------------------------------------------

/// The default time allowed for establishing a connection to a server.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// The default time allowed for a complete request to a server.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// The default timeout of a single connectivity probe.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 3;


//------------ Signing Defaults ---------------------------------------------

/// The default number of idle sessions kept by the session pool.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// The default path under which the signing server exposes its operations.
pub const DEFAULT_BASE_PATH: &str = "/brilliance/netsign";

/// The default prefix of generated key labels.
pub const DEFAULT_KEY_LABEL_PREFIX: &str = "signproxy-";

/// The default subject of issued certificate requests.
pub const DEFAULT_SUBJECT_DN: &str = "CN=signproxy";

/// The default key algorithm requested from the signing server.
pub const DEFAULT_KEY_ALGORITHM: &str = "SM2";

/// The default digest algorithm used for signing and verification.
pub const DEFAULT_DIGEST_ALGORITHM: &str = "SM3";

/// The number of decimal digits in a generated key identifier.
pub const KEY_ID_DIGITS: usize = 16;
