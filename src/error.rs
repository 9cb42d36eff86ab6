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

use std::io;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProbeKind;

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while turning user input into a probe configuration.
///
/// All of these are fatal and happen before any probe is sent.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("must have a destination set")]
    MissingDestination,
    #[error("destination is not an IP address literal: {0}")]
    InvalidDestination(String),
    #[error("invalid TTL range: starting={starting_ttl}, max={max_ttl}")]
    InvalidTtlRange { starting_ttl: u8, max_ttl: u8 },
    #[error("probe count must be at least 1")]
    ZeroProbeCount,
    #[error("probe timeout must be greater than zero")]
    ZeroProbeTimeout,
    #[error("probe timeout of {0:?} exceeds the maximum of {max:?}", max = crate::config::defaults::MAX_PROBE_TIMEOUT)]
    ProbeTimeoutTooLarge(Duration),
    #[error("unable to get source IP: {0}")]
    LocalAddress(#[source] LocalAddressError),
}

/// Failure of the local outbound address lookup.
#[derive(Error, Debug)]
pub enum LocalAddressError {
    #[error("no usable network interface with an IPv4 address")]
    NoInterface,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal errors returned by a probe engine.
///
/// These are reported only after the outcome stream has been drained.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("probe kind {0:?} is not supported by this engine")]
    UnsupportedProbeKind(ProbeKind),
    #[error("address family of {0} is not supported by this engine")]
    UnsupportedAddressFamily(IpAddr),
    #[error("unable to open probe channel: {0}")]
    Channel(#[source] io::Error),
    #[error("result receiver closed before probing finished")]
    ResultsClosed,
}

/// Terminal failure of a whole run, observed after the report was drained.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("unable to write report: {0}")]
    Output(#[from] io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Why a single probe produced no reply.
///
/// Rendered uniformly as "no response"; never aborts a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("probe timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<io::Error> for ProbeFailure {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProbeFailure::Timeout,
            _ => ProbeFailure::Transport(err.to_string()),
        }
    }
}
