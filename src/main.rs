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

use anyhow::Context;
use clap::Parser;
use hoptrace::config::defaults;
use hoptrace::{InterfaceAddress, Options, PnetEngine, ProbeKind};
use std::io;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Print the route packets take to a network host, one line per hop.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Source address, auto-detected when unset
    #[arg(long = "srcAddr", default_value = "")]
    src_addr: String,

    /// Source port, 0 copies the destination port
    #[arg(long = "srcPort", default_value_t = 0)]
    src_port: u16,

    /// Destination address (IP literal)
    #[arg(long = "dstAddr", default_value = "")]
    dst_addr: String,

    /// Destination port
    #[arg(long = "dstPort", default_value_t = defaults::DEFAULT_DESTINATION_PORT)]
    dst_port: u16,

    /// What TTL to start with
    #[arg(long = "startingTTL", default_value_t = defaults::DEFAULT_STARTING_TTL)]
    starting_ttl: u8,

    /// Max TTL to go to
    #[arg(long = "maxTTL", default_value_t = defaults::DEFAULT_MAX_TTL)]
    max_ttl: u8,

    /// Probe timeout in seconds
    #[arg(long = "probeTimeout", default_value_t = defaults::DEFAULT_PROBE_TIMEOUT.as_secs())]
    probe_timeout: u64,

    /// Number of probes to do at each TTL
    #[arg(long = "probeCount", default_value_t = defaults::DEFAULT_PROBE_COUNT)]
    probe_count: u32,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn options(&self) -> Options {
        Options::default()
            .with_source_address(self.src_addr.as_str())
            .with_source_port(self.src_port)
            .with_destination_address(self.dst_addr.as_str())
            .with_destination_port(self.dst_port)
            .with_probe_kind(ProbeKind::Udp)
            .with_starting_ttl(self.starting_ttl)
            .with_max_ttl(self.max_ttl)
            .with_probe_timeout(Duration::from_secs(self.probe_timeout))
            .with_probe_count(self.probe_count)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args
        .options()
        .resolve(&InterfaceAddress)
        .context("invalid probe configuration")?;

    async_std::task::block_on(hoptrace::run(config, PnetEngine::new(), io::stdout()))
        .context("traceroute failed")?;
    Ok(())
}
