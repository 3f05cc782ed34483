//! # Address Allocation
//!
//! Finds a free local TCP port by binding `localhost:0`, reading the
//! OS-assigned port and releasing the listener again.
//!
//! The port is not reserved once the listener is dropped; another process
//! may grab it before the supervised binary binds it.

use crate::error::{Error, Result};
use std::net::{IpAddr, TcpListener};
use tracing::debug;
use url::Url;

/// Allocates one host/port pair, once
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddressManager {
    port: Option<u16>,
    host: Option<String>,
}

impl AddressManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a host/port pair for this manager
    ///
    /// # Errors
    ///
    /// `Error::AlreadyInitialized` on a second call, `Error::Io` if no
    /// listener can be bound.
    pub fn initialize(&mut self) -> Result<(u16, String)> {
        if self.port.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let (port, ip) = {
            let listener = TcpListener::bind("localhost:0")?;
            let addr = listener.local_addr()?;
            (addr.port(), addr.ip())
        };
        let host = ip.to_string();
        debug!(port, host = %host, "Allocated free address");

        self.port = Some(port);
        self.host = Some(host.clone());
        Ok((port, host))
    }

    /// # Errors
    ///
    /// `Error::NotInitialized` before [`initialize`](Self::initialize).
    pub fn port(&self) -> Result<u16> {
        self.port.ok_or(Error::NotInitialized)
    }

    /// # Errors
    ///
    /// `Error::NotInitialized` before [`initialize`](Self::initialize).
    pub fn host(&self) -> Result<&str> {
        self.host.as_deref().ok_or(Error::NotInitialized)
    }

    /// `<scheme>://<host>:<port>` for the allocated address
    ///
    /// # Errors
    ///
    /// `Error::NotInitialized` before [`initialize`](Self::initialize).
    pub fn url(&self, scheme: &str) -> Result<Url> {
        let port = self.port()?;
        let host = self.host()?;
        let host = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
            _ => host.to_string(),
        };
        Url::parse(&format!("{scheme}://{host}:{port}"))
            .map_err(|e| Error::Config(format!("invalid URL for {host}:{port}: {e}")))
    }
}

/// Allocate a fresh address and return it as a URL
///
/// # Errors
///
/// Propagates [`AddressManager::initialize`] failures.
pub fn free_url(scheme: &str) -> Result<Url> {
    let mut manager = AddressManager::new();
    manager.initialize()?;
    manager.url(scheme)
}
