//! The JSON over HTTP flavour of the signing server protocol.

use std::{
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::{Arc, Mutex},
    time::Duration,
};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::Transport;
use crate::{
    constants::{
        DEFAULT_BASE_PATH, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, RESULT_OK, RESULT_TIMEOUT,
    },
    signing::{endpoint::Endpoint, error::RpcError, keys::KeyLabel},
};

const PATH_GEN_P10: &str = "genP10";
const PATH_UPLOAD_CERT: &str = "uploadCert";
const PATH_SIGN: &str = "sign";
const PATH_VERIFY: &str = "verify";

/// The user name sent along with an endpoint's password.
const AUTH_USER: &str = "signproxy";

//------------ HttpSettings --------------------------------------------------

#[derive(Clone, Debug)]
pub struct HttpSettings {
    /// The path under which the server exposes its operations.
    pub base_path: String,

    /// Time allowed for establishing a connection.
    pub connect_timeout: Duration,

    /// Time allowed for a complete request.
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            base_path: DEFAULT_BASE_PATH.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

//------------ HttpConnection ------------------------------------------------

/// A connection to one signing server.
///
/// The HTTP client is shared by all connections of a transport.
#[derive(Debug)]
pub struct HttpConnection {
    base: Url,
    client: Client,
    credentials: Option<String>,
}

//------------ HttpTransport -------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    settings: HttpSettings,

    /// Built on first use. Clones of the transport share it.
    client: Arc<Mutex<Option<Client>>>,
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Self {
        HttpTransport {
            settings,
            client: Arc::default(),
        }
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Returns the shared HTTP client, creating it if needed.
    fn client(&self) -> Result<Client, RpcError> {
        let mut cached = self.client.lock().expect("HTTP client lock is poisoned");
        if let Some(client) = cached.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .build()
            .map_err(|e| RpcError::generic(format!("cannot create HTTP client: {}", e)))?;
        *cached = Some(client.clone());
        Ok(client)
    }

    /// Checks that something is listening at the endpoint.
    fn dial(&self, authority: &str, addrs: Vec<SocketAddr>) -> Result<(), RpcError> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.settings.connect_timeout) {
                Ok(_) => return Ok(()),
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) => Err(classify_io_error(authority, err)),
            None => Err(RpcError::generic(format!("{} resolves to no address", authority))),
        }
    }

    fn operation_url(&self, conn: &HttpConnection, operation: &str) -> Result<Url, RpcError> {
        let base_path = self.settings.base_path.trim_matches('/');
        let path = if base_path.is_empty() {
            operation.to_string()
        } else {
            format!("{}/{}", base_path, operation)
        };
        conn.base
            .join(&path)
            .map_err(|e| RpcError::config(format!("cannot build URI for {}: {}", operation, e)))
    }

    /// Posts a request document and returns the `data` member of the reply.
    fn post(&self, conn: &HttpConnection, operation: &str, body: &impl Serialize) -> Result<Option<Value>, RpcError> {
        let url = self.operation_url(conn, operation)?;

        let mut request = conn.client.post(url.clone()).json(body);
        if let Some(password) = &conn.credentials {
            request = request.basic_auth(AUTH_USER, Some(password));
        }

        let response = request.send().map_err(|e| classify_request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::failed(
                i32::from(status.as_u16()),
                format!("unexpected status {} from {}", status, url),
            ));
        }

        let text = response.text().map_err(|e| classify_request_error(&url, e))?;
        let reply: Reply = serde_json::from_str(&text)
            .map_err(|e| RpcError::invalid_payload(format!("cannot parse response from {}: {}", url, e)))?;

        match reply.code {
            RESULT_OK => Ok(reply.data),
            RESULT_TIMEOUT => Err(RpcError::timeout(reply.describe(&url))),
            code => Err(RpcError::failed(code, reply.describe(&url))),
        }
    }
}

impl Transport for HttpTransport {
    type Connection = HttpConnection;

    fn open(&self, endpoint: &Endpoint) -> Result<HttpConnection, RpcError> {
        let port = endpoint.port()?;
        let authority = endpoint.authority()?;

        let addrs: Vec<SocketAddr> = (endpoint.address(), port)
            .to_socket_addrs()
            .map_err(|e| RpcError::generic(format!("cannot resolve {}: {}", authority, e)))?
            .collect();
        self.dial(&authority, addrs)?;

        let base = Url::parse(&format!("http://{}/", authority))
            .map_err(|e| RpcError::config(format!("invalid server address {}: {}", authority, e)))?;

        Ok(HttpConnection {
            base,
            client: self.client()?,
            credentials: endpoint.password().map(str::to_string),
        })
    }

    fn close(&self, conn: HttpConnection) {
        drop(conn)
    }

    fn issue_csr(
        &self,
        conn: &HttpConnection,
        subject: &str,
        label: &KeyLabel,
        key_algorithm: &str,
    ) -> Result<String, RpcError> {
        let body = CsrRequest {
            key_label: label.as_str(),
            cert_dn: subject,
            key_type: key_algorithm,
            is_cover: "true",
        };
        let data = self.post(conn, PATH_GEN_P10, &body)?;
        match data.as_ref().and_then(|data| data.get("p10")) {
            None | Some(Value::Null) => Err(RpcError::MissingPayload("data.p10")),
            Some(Value::String(p10)) => Ok(p10.clone()),
            Some(other) => Err(RpcError::invalid_payload(format!("expected string for data.p10, got {}", other))),
        }
    }

    fn sign(
        &self,
        conn: &HttpConnection,
        message: &[u8],
        label: &KeyLabel,
        digest_algorithm: &str,
    ) -> Result<Vec<u8>, RpcError> {
        let body = SignRequest {
            key_label: label.as_str(),
            orig_bytes: BASE64.encode(message),
            digest_alg: digest_algorithm,
        };
        let signature = expect_string(self.post(conn, PATH_SIGN, &body)?)?;
        BASE64
            .decode(signature.as_bytes())
            .map_err(|e| RpcError::invalid_payload(format!("signature is not base64: {}", e)))
    }

    fn verify(
        &self,
        conn: &HttpConnection,
        message: &[u8],
        signature: &[u8],
        label: &KeyLabel,
        digest_algorithm: &str,
        check_crl: bool,
    ) -> Result<bool, RpcError> {
        let body = VerifyRequest {
            key_label: label.as_str(),
            orig_bytes: BASE64.encode(message),
            signature: BASE64.encode(signature),
            digest_alg: digest_algorithm,
            // The server expects "0" to request a revocation check.
            is_verify_crl: if check_crl { "0" } else { "1" },
        };
        expect_bool(self.post(conn, PATH_VERIFY, &body)?)
    }

    fn upload_certificate(
        &self,
        conn: &HttpConnection,
        label: &KeyLabel,
        certificate: &[u8],
    ) -> Result<bool, RpcError> {
        let body = UploadCertRequest {
            key_label: label.as_str(),
            cert: BASE64.encode(certificate),
        };
        expect_bool(self.post(conn, PATH_UPLOAD_CERT, &body)?)
    }
}

//------------ Request and response documents --------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CsrRequest<'a> {
    key_label: &'a str,
    cert_dn: &'a str,
    key_type: &'a str,
    is_cover: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    key_label: &'a str,
    orig_bytes: String,
    digest_alg: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    key_label: &'a str,
    orig_bytes: String,
    signature: String,
    digest_alg: &'a str,
    is_verify_crl: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadCertRequest<'a> {
    key_label: &'a str,
    cert: String,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    code: i32,

    #[serde(default)]
    message: Option<String>,

    #[serde(default)]
    data: Option<Value>,
}

impl Reply {
    fn describe(&self, url: &Url) -> String {
        match &self.message {
            Some(message) => format!("{} reported: {}", url, message),
            None => format!("{} reported code {}", url, self.code),
        }
    }
}

fn expect_string(data: Option<Value>) -> Result<String, RpcError> {
    match data {
        None | Some(Value::Null) => Err(RpcError::MissingPayload("data")),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(RpcError::invalid_payload(format!("expected string data, got {}", other))),
    }
}

fn expect_bool(data: Option<Value>) -> Result<bool, RpcError> {
    match data {
        None | Some(Value::Null) => Err(RpcError::MissingPayload("data")),
        Some(Value::Bool(b)) => Ok(b),
        Some(other) => Err(RpcError::invalid_payload(format!("expected boolean data, got {}", other))),
    }
}

//------------ Failure classification ----------------------------------------

/// Not being able to reach a server at all counts as a timeout: another
/// server may well be reachable.
fn classify_io_error(authority: &str, err: io::Error) -> RpcError {
    match err.kind() {
        io::ErrorKind::TimedOut
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => RpcError::timeout(format!("{}: {}", authority, err)),
        _ => RpcError::generic(format!("cannot connect to {}: {}", authority, err)),
    }
}

fn classify_request_error(url: &Url, err: reqwest::Error) -> RpcError {
    if err.is_timeout() || err.is_connect() {
        RpcError::timeout(format!("{}: {}", url, err))
    } else {
        RpcError::generic(format!("request to {} failed: {}", url, err))
    }
}

//------------ Tests ---------------------------------------------------------
