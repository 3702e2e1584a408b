//! Signing servers and the order in which they are tried.

use std::{fmt, sync::Arc};

use secrecy::{ExposeSecret, SecretString};

use super::error::RpcError;

//------------ Endpoint ------------------------------------------------------

/// A single remote signing server.
///
/// The port is kept as configured and only parsed when the endpoint is
/// used, so that one badly configured server does not prevent the others
/// from being tried.
#[derive(Debug)]
pub struct Endpoint {
    site: String,
    address: String,
    port: String,
    password: SecretString,
}

impl Endpoint {
    pub fn new(
        site: impl Into<String>,
        address: impl Into<String>,
        port: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Endpoint {
            site: site.into(),
            address: address.into(),
            port: port.into(),
            password,
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the port number, or a configuration error if it is malformed.
    pub fn port(&self) -> Result<u16, RpcError> {
        self.port
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| RpcError::config(format!("invalid port '{}' for server {}", self.port, self.address)))
    }

    /// Returns the `host:port` form of the endpoint.
    pub fn authority(&self) -> Result<String, RpcError> {
        let port = self.port()?;
        if self.address.contains(':') && !self.address.starts_with('[') {
            Ok(format!("[{}]:{}", self.address, port))
        } else {
            Ok(format!("{}:{}", self.address, port))
        }
    }

    /// Returns the connection secret, if one was configured.
    pub fn password(&self) -> Option<&str> {
        let password = self.password.expose_secret();
        if password.is_empty() {
            None
        } else {
            Some(password.as_str())
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}:{}", self.site, self.address, self.port)
    }
}

//------------ SiteGroup -----------------------------------------------------

/// The signing servers of one deployment site.
#[derive(Debug)]
pub struct SiteGroup {
    name: String,
    endpoints: Vec<Arc<Endpoint>>,
}

impl SiteGroup {
    pub fn new(name: impl Into<String>) -> Self {
        SiteGroup {
            name: name.into(),
            endpoints: Vec::new(),
        }
    }

    /// Adds a server to this site. Its site tag is the site's name.
    pub fn with_endpoint(
        mut self,
        address: impl Into<String>,
        port: impl Into<String>,
        password: SecretString,
    ) -> Self {
        let endpoint = Endpoint::new(self.name.clone(), address, port, password);
        self.endpoints.push(Arc::new(endpoint));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }
}

//------------ Roster --------------------------------------------------------

/// All configured signing servers, grouped by site.
///
/// The candidate list used for failover is the concatenation of the sites
/// in their configured order, each site contributing its servers in their
/// configured order. It is computed once, when the roster is built.
#[derive(Debug)]
pub struct Roster {
    sites: Vec<SiteGroup>,
    candidates: Vec<Arc<Endpoint>>,
}

impl Roster {
    pub fn new(sites: Vec<SiteGroup>) -> Self {
        let candidates = sites
            .iter()
            .flat_map(|site| site.endpoints().iter().cloned())
            .collect();
        Roster { sites, candidates }
    }

    pub fn sites(&self) -> &[SiteGroup] {
        &self.sites
    }

    /// Returns the servers in the order in which they are to be tried.
    pub fn candidates(&self) -> &[Arc<Endpoint>] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

//------------ Tests ---------------------------------------------------------
