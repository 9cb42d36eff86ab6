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

//! # hoptrace
//! `hoptrace` turns a stream of TTL-limited probe outcomes into a per-hop
//! report of responding addresses and round-trip times.
//!
//! ## Features
//! A run is split into three parts:
//! - [`Options`] resolves partial user input into a complete [`ProbeConfig`]
//!   (default ports, auto-detected source address, TTL range checks)
//! - a [`ProbeEngine`] sends the probes and pushes one [`ProbeOutcome`] per
//!   probe into a channel
//! - [`HopReport`] drains that channel concurrently and renders one block per
//!   TTL, grouping consecutive replies from the same address on one line
//!
//! Addresses are IP literals only, no DNS lookup is performed.
//!
//! The bundled [`PnetEngine`] is based on [pnet](https://github.com/libpnet/libpnet)
//! raw IPv4 sockets and requires the privileges to open them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hoptrace::{InterfaceAddress, Options, PnetEngine};
//! use std::io;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Options::default()
//!         .with_destination_address("93.184.216.34")  // example.com
//!         .with_max_ttl(20)
//!         .resolve(&InterfaceAddress)?;
//!
//!     async_std::task::block_on(hoptrace::run(config, PnetEngine::new(), io::stdout()))?;
//!     Ok(())
//! }
//! ```

/// Probe configuration and its resolution from user input
pub mod config;
/// Probe engines and the outcomes they produce
pub mod engine;
pub mod error;
/// Streaming hop report
pub mod report;

pub use crate::config::{LocalAddress, Options, ProbeConfig, ProbeKind};
pub use crate::engine::{InterfaceAddress, PnetEngine, ProbeEngine, ProbeOutcome, ProbeReply};
pub use crate::error::{ConfigError, EngineError, ProbeFailure, RunError};
pub use crate::report::{drain, HopReport};

use async_std::channel;
use async_std::task;
use std::io::Write;

/// Runs `engine` with `config` while rendering its outcomes into `out`.
///
/// Both the engine and the report are awaited before returning, so the
/// report is complete even when the engine fails. Output errors take
/// precedence over engine errors.
pub async fn run<E, W>(config: ProbeConfig, mut engine: E, out: W) -> Result<W, RunError>
where
    E: ProbeEngine + Send + 'static,
    W: Write + Send + 'static,
{
    let (sender, receiver) = channel::bounded(1);
    let aggregator = task::spawn(drain(receiver, HopReport::new(config.max_ttl), out));
    let probing = task::spawn_blocking(move || engine.run(&config, sender));

    let probed = probing.await;
    let out = aggregator.await?;
    probed?;
    Ok(out)
}
