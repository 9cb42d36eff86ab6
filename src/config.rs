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

use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult, LocalAddressError};

/// Process-wide defaults applied by [`Options::resolve`] and the CLI.
pub mod defaults {
    use std::time::Duration;

    /// Conventional base port for UDP traceroute.
    pub const DEFAULT_DESTINATION_PORT: u16 = 33434;
    pub const DEFAULT_STARTING_TTL: u8 = 1;
    pub const DEFAULT_MAX_TTL: u8 = 30;
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
    pub const DEFAULT_PROBE_COUNT: u32 = 3;
    /// Longest accepted per-probe timeout
    pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(3600);
}

/// Wire technique used for probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// UDP datagrams to incrementing high ports
    Udp,
    /// TCP SYN segments
    Tcp,
    /// ICMP echo requests
    Icmp,
}

/// Complete probe plan handed to a probe engine.
///
/// Produced only by [`Options::resolve`], so every field is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub source_address: IpAddr,
    pub source_port: u16,
    pub destination_address: IpAddr,
    pub destination_port: u16,
    pub probe_kind: ProbeKind,
    /// First hop to probe, inclusive
    pub starting_ttl: u8,
    /// Last hop to probe, inclusive
    pub max_ttl: u8,
    pub probe_timeout: Duration,
    pub probe_count: u32,
    /// Spacing between consecutive probes. Zero lets the engine send back to back.
    pub probe_wait: Duration,
}

/// Source of the local outbound address used when no source address was given.
pub trait LocalAddress {
    fn local_address(&self) -> Result<IpAddr, LocalAddressError>;
}

/// Raw, possibly incomplete, user input for a run.
///
/// Empty addresses and zero ports mean "not provided".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    source_address: String,
    source_port: u16,
    destination_address: String,
    destination_port: u16,
    probe_kind: ProbeKind,
    starting_ttl: u8,
    max_ttl: u8,
    probe_timeout: Duration,
    probe_count: u32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            source_address: String::new(),
            source_port: 0,
            destination_address: String::new(),
            destination_port: 0,
            probe_kind: ProbeKind::Udp,
            starting_ttl: defaults::DEFAULT_STARTING_TTL,
            max_ttl: defaults::DEFAULT_MAX_TTL,
            probe_timeout: defaults::DEFAULT_PROBE_TIMEOUT,
            probe_count: defaults::DEFAULT_PROBE_COUNT,
        }
    }
}

impl Options {
    /// Builder: Source address literal. Empty means auto-detect
    pub fn with_source_address<S: Into<String>>(mut self, address: S) -> Self {
        self.source_address = address.into();
        self
    }

    /// Builder: Source port. Zero copies the destination port
    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = port;
        self
    }

    /// Builder: Destination address literal. Required
    pub fn with_destination_address<S: Into<String>>(mut self, address: S) -> Self {
        self.destination_address = address.into();
        self
    }

    /// Builder: Destination port. Zero uses the default traceroute port
    pub fn with_destination_port(mut self, port: u16) -> Self {
        self.destination_port = port;
        self
    }

    /// Builder: Probe kind
    pub fn with_probe_kind(mut self, probe_kind: ProbeKind) -> Self {
        self.probe_kind = probe_kind;
        self
    }

    /// Builder: First TTL to probe
    pub fn with_starting_ttl(mut self, ttl: u8) -> Self {
        self.starting_ttl = ttl;
        self
    }

    /// Builder: Last TTL to probe
    pub fn with_max_ttl(mut self, ttl: u8) -> Self {
        self.max_ttl = ttl;
        self
    }

    /// Builder: Timeout per probe
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Builder: Number of probes per TTL
    pub fn with_probe_count(mut self, count: u32) -> Self {
        self.probe_count = count;
        self
    }

    /// Fills in defaults and validates, producing a complete [`ProbeConfig`].
    ///
    /// Addresses must be IP literals: no DNS lookup is performed. An
    /// unparsable source address is treated as absent and auto-detected
    /// through `local`, which is consulted at most once.
    pub fn resolve<L: LocalAddress + ?Sized>(&self, local: &L) -> ConfigResult<ProbeConfig> {
        let destination_address = match parse_cli_addr(&self.destination_address) {
            Some(addr) => addr,
            None if self.destination_address.trim().is_empty() => {
                return Err(ConfigError::MissingDestination)
            }
            None => {
                return Err(ConfigError::InvalidDestination(
                    self.destination_address.clone(),
                ))
            }
        };

        if self.starting_ttl == 0 || self.max_ttl < self.starting_ttl {
            return Err(ConfigError::InvalidTtlRange {
                starting_ttl: self.starting_ttl,
                max_ttl: self.max_ttl,
            });
        }
        if self.probe_count == 0 {
            return Err(ConfigError::ZeroProbeCount);
        }
        if self.probe_timeout == Duration::from_secs(0) {
            return Err(ConfigError::ZeroProbeTimeout);
        }
        if self.probe_timeout > defaults::MAX_PROBE_TIMEOUT {
            return Err(ConfigError::ProbeTimeoutTooLarge(self.probe_timeout));
        }

        let destination_port = match self.destination_port {
            0 => defaults::DEFAULT_DESTINATION_PORT,
            port => port,
        };
        let source_port = match self.source_port {
            0 => destination_port,
            port => port,
        };

        let source_address = match parse_cli_addr(&self.source_address) {
            Some(addr) => addr,
            None => {
                if !self.source_address.trim().is_empty() {
                    warn!(
                        source = %self.source_address,
                        "source address is not an IP literal, auto-detecting"
                    );
                }
                local.local_address().map_err(ConfigError::LocalAddress)?
            }
        };

        let config = ProbeConfig {
            source_address,
            source_port,
            destination_address,
            destination_port,
            probe_kind: self.probe_kind,
            starting_ttl: self.starting_ttl,
            max_ttl: self.max_ttl,
            probe_timeout: self.probe_timeout,
            probe_count: self.probe_count,
            probe_wait: Duration::from_secs(0),
        };
        debug!(?config, "resolved probe configuration");
        Ok(config)
    }
}

/// Parses a command line address. Anything that is not an IP literal is `None`.
pub fn parse_cli_addr(addr: &str) -> Option<IpAddr> {
    addr.trim().parse().ok()
}
