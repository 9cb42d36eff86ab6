/*
   Copyright 2020 Ilya Grishkov

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

pub(crate) mod packet_builder;
mod response;
mod transport;

pub use transport::PnetEngine;

use async_std::channel::Sender;
use pnet::datalink::{MacAddr, NetworkInterface};
use std::net::IpAddr;
use std::time::Duration;

use crate::config::{LocalAddress, ProbeConfig};
use crate::error::{EngineResult, LocalAddressError, ProbeFailure};

/// Reply observed for a successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReply {
    /// Address of the node that answered
    pub address: IpAddr,
    /// Round-Trip Time
    pub rtt: Duration,
    /// Byte length of the response packet
    pub size: usize,
}

/// Result of a single issued probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// TTL the probe was sent with
    pub ttl: u8,
    pub result: Result<ProbeReply, ProbeFailure>,
}

impl ProbeOutcome {
    pub fn reply(ttl: u8, address: IpAddr, rtt: Duration, size: usize) -> Self {
        ProbeOutcome { ttl, result: Ok(ProbeReply { address, rtt, size }) }
    }

    pub fn failure(ttl: u8, failure: ProbeFailure) -> Self {
        ProbeOutcome { ttl, result: Err(failure) }
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Producer side of a run.
///
/// An engine sends one [`ProbeOutcome`] per probe, keeping all outcomes of a
/// TTL contiguous, and closes the stream by dropping `results` when it returns.
/// `run` blocks; sending on `results` blocks while the consumer is behind.
pub trait ProbeEngine {
    fn run(&mut self, config: &ProbeConfig, results: Sender<ProbeOutcome>) -> EngineResult<()>;
}

/// Picks the first IPv4 address of the first available interface.
#[derive(Debug, Default, Clone, Copy)]
pub struct InterfaceAddress;

impl LocalAddress for InterfaceAddress {
    fn local_address(&self) -> Result<IpAddr, LocalAddressError> {
        get_available_interfaces()
            .iter()
            .flat_map(|i| i.ips.iter())
            .find(|ip| ip.is_ipv4())
            .map(|ip| ip.ip())
            .ok_or(LocalAddressError::NoInterface)
    }
}

/// Returns the list of interfaces that are up, not loopback,
/// and have an IPv4 address associated with them.
pub fn get_available_interfaces() -> Vec<NetworkInterface> {
    pnet::datalink::interfaces()
        .into_iter()
        .filter(is_available)
        .collect()
}

fn is_available(interface: &NetworkInterface) -> bool {
    let has_ipv4 = interface.ips.iter().any(|ip| ip.is_ipv4() && !ip.ip().is_unspecified());
    let has_mac = interface.mac.map_or(false, |mac| mac != MacAddr::zero());
    if cfg!(target_family = "windows") {
        has_mac && has_ipv4
    } else {
        interface.is_up() && !interface.is_loopback() && has_ipv4 && has_mac
    }
}
