//! Best-effort UPnP port forwarding, grounded on
//! `original_source/src/networking/upnp.cpp`: on construction, attempt to
//! discover an Internet Gateway Device on the local network and add a TCP
//! port mapping for our P2P listen port; on drop, attempt to remove it.
//! Never required for correctness — a gateway that doesn't support UPnP
//! (or isn't present at all) just leaves `PortMapping::active()` false.

use std::net::SocketAddrV4;
use std::time::Duration;

use igd::{search_gateway, Gateway, PortMappingProtocol, SearchOptions};
use tracing::{debug, trace};

use crate::error::{P2pError, P2pResult};

const SERVICE_NAME: &str = "carapace";
const LEASE_DURATION_SECS: u32 = 0; // 0 == the gateway's own default/no expiry.

/// A UPnP port mapping for one local TCP port. Mirrors the original's
/// `UPNP` class: discovery and mapping happen eagerly at construction, the
/// mapping is torn down on `Drop`.
pub struct PortMapping {
    gateway: Option<Gateway>,
    port: u16,
    external_address: Option<std::net::Ipv4Addr>,
}

impl PortMapping {
    /// Discovers a gateway and maps `port` (TCP) to `local_addr`. Discovery
    /// failures are logged and folded into an inactive mapping rather than
    /// propagated — matching `upnp.cpp`'s "never required for correctness"
    /// framing; callers that want to observe the UPnP-specific error kinds
    /// should call `discover` + `add` directly instead.
    pub fn new(local_addr: SocketAddrV4, port: u16) -> Self {
        match Self::try_new(local_addr, port) {
            Ok(mapping) => mapping,
            Err(e) => {
                debug!(error = %e, "upnp port forward unavailable");
                Self { gateway: None, port, external_address: None }
            }
        }
    }

    fn try_new(local_addr: SocketAddrV4, port: u16) -> P2pResult<Self> {
        let gateway = discover()?;
        add(&gateway, local_addr, port)?;
        let external_address = gateway.get_external_ip().ok();
        if let Some(addr) = external_address {
            debug!(%addr, "upnp detected external address");
        }
        Ok(Self { gateway: Some(gateway), port, external_address })
    }

    pub fn active(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn external_address(&self) -> Option<std::net::Ipv4Addr> {
        self.external_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortMapping {
    fn drop(&mut self) {
        if let Some(gateway) = self.gateway.take() {
            match gateway.remove_port(PortMappingProtocol::TCP, self.port) {
                Ok(()) => debug!(port = self.port, "upnp port forward removed"),
                Err(e) => trace!(error = %e, "could not remove upnp port forward"),
            }
        }
    }
}

fn discover() -> P2pResult<Gateway> {
    let options = SearchOptions { timeout: Some(Duration::from_millis(1000)), ..Default::default() };
    search_gateway(options).map_err(|e| {
        trace!(error = %e, "upnp gateway discovery failed");
        P2pError::UpnpNotSupported
    })
}

fn add(gateway: &Gateway, local_addr: SocketAddrV4, port: u16) -> P2pResult<()> {
    gateway
        .add_port(
            PortMappingProtocol::TCP,
            port,
            local_addr,
            LEASE_DURATION_SECS,
            SERVICE_NAME,
        )
        .map_err(|e| P2pError::UpnpFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_failure_is_never_fatal() {
        // No gateway is reachable in the test sandbox; `new` must degrade
        // to an inactive mapping rather than panic or block past its
        // discovery timeout.
        let local = SocketAddrV4::new(std::net::Ipv4Addr::new(127, 0, 0, 1), 12897);
        let mapping = PortMapping::new(local, 12897);
        assert!(!mapping.active());
        assert!(mapping.external_address().is_none());
    }
}
