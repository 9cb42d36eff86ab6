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

use async_std::channel::Sender;
use async_std::task::block_on;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::transport::TransportChannelType::{Layer3, Layer4};
use pnet::transport::TransportProtocol::Ipv4;
use pnet::transport::{icmp_packet_iter, transport_channel, IcmpTransportChannelIterator, TransportSender};
use std::net::{IpAddr, Ipv4Addr};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::packet_builder::PacketBuilder;
use super::response::matches_probe;
use super::{ProbeEngine, ProbeOutcome};
use crate::config::ProbeConfig;
use crate::error::{EngineError, EngineResult, ProbeFailure};

const DEFAULT_BUFFER_SIZE: usize = 4096;
/// Shortest wait the receive timeout can express
const MIN_WAIT: Duration = Duration::from_micros(1);
/// Wait used when the deadline cannot be represented
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// IPv4 probe engine sending raw IP packets and listening for ICMP replies.
///
/// Probes are sent one at a time, so outcomes of a TTL are always
/// contiguous. Requires raw socket privileges.
pub struct PnetEngine {
    buffer_size: usize,
}

impl Default for PnetEngine {
    fn default() -> Self {
        PnetEngine { buffer_size: DEFAULT_BUFFER_SIZE }
    }
}

impl PnetEngine {
    pub fn new() -> Self {
        Default::default()
    }
}

impl ProbeEngine for PnetEngine {
    fn run(&mut self, config: &ProbeConfig, results: Sender<ProbeOutcome>) -> EngineResult<()> {
        let (source_ip, destination_ip) = match (config.source_address, config.destination_address) {
            (IpAddr::V4(source), IpAddr::V4(destination)) => (source, destination),
            (IpAddr::V4(_), other) | (other, _) => {
                return Err(EngineError::UnsupportedAddressFamily(other))
            }
        };

        let builder = PacketBuilder::new(config.probe_kind, source_ip, config.source_port, rand::random())?;
        let (mut tx, _) = transport_channel(self.buffer_size, Layer3(builder.protocol()))
            .map_err(EngineError::Channel)?;
        let (_, mut rx) = transport_channel(self.buffer_size, Layer4(Ipv4(IpNextHeaderProtocols::Icmp)))
            .map_err(EngineError::Channel)?;
        let mut replies = icmp_packet_iter(&mut rx);
        debug!(
            kind = ?config.probe_kind,
            source = %source_ip,
            destination = %destination_ip,
            "probe channels open"
        );

        let mut sequence: u16 = 0;
        for ttl in config.starting_ttl..=config.max_ttl {
            let mut reached = false;
            for _ in 0..config.probe_count {
                let probe = Probe { ttl, sequence, destination_ip };
                let outcome = probe.send(&mut tx, &mut replies, &builder, config);
                trace!(?outcome, sequence, "probe finished");
                if let Ok(reply) = &outcome.result {
                    reached |= reply.address == config.destination_address;
                }
                block_on(results.send(outcome)).map_err(|_| EngineError::ResultsClosed)?;

                sequence = sequence.wrapping_add(1);
                if !config.probe_wait.is_zero() {
                    thread::sleep(config.probe_wait);
                }
            }
            if reached {
                debug!(ttl, "destination reached");
                break;
            }
        }
        Ok(())
    }
}

struct Probe {
    ttl: u8,
    sequence: u16,
    destination_ip: Ipv4Addr,
}

impl Probe {
    /// Sends the probe and waits for the matching reply until the probe timeout.
    fn send(
        &self,
        tx: &mut TransportSender,
        replies: &mut IcmpTransportChannelIterator<'_>,
        builder: &PacketBuilder,
        config: &ProbeConfig,
    ) -> ProbeOutcome {
        let packet = match builder.build_packet(self.destination_ip, self.ttl, config.destination_port, self.sequence) {
            Some(packet) => packet,
            None => return self.failed("probe does not fit its packet buffer"),
        };
        let ip_packet = match Ipv4Packet::new(&packet) {
            Some(ip_packet) => ip_packet,
            None => return self.failed("malformed probe packet"),
        };
        let key = builder.probe_key(self.destination_ip, config.destination_port, self.sequence);

        let sent = Instant::now();
        if let Err(e) = tx.send_to(ip_packet, IpAddr::V4(self.destination_ip)) {
            return ProbeOutcome::failure(self.ttl, e.into());
        }

        let deadline = sent.checked_add(config.probe_timeout);
        loop {
            let remaining = match remaining_wait(deadline, Instant::now()) {
                Some(remaining) => remaining,
                None => return ProbeOutcome::failure(self.ttl, ProbeFailure::Timeout),
            };
            match replies.next_with_timeout(remaining) {
                Ok(Some((icmp_packet, from))) => {
                    if matches_probe(&key, icmp_packet.packet()) {
                        return ProbeOutcome::reply(self.ttl, from, sent.elapsed(), icmp_packet.packet().len());
                    }
                }
                Ok(None) => return ProbeOutcome::failure(self.ttl, ProbeFailure::Timeout),
                Err(e) => return ProbeOutcome::failure(self.ttl, e.into()),
            }
        }
    }

    fn failed(&self, reason: &str) -> ProbeOutcome {
        ProbeOutcome::failure(self.ttl, ProbeFailure::Transport(reason.to_string()))
    }
}

/// Time left to wait for a reply, `None` once the deadline has passed.
///
/// Waits shorter than [`MIN_WAIT`] count as expired: a zero timeval blocks
/// forever on `SO_RCVTIMEO`.
fn remaining_wait(deadline: Option<Instant>, now: Instant) -> Option<Duration> {
    let remaining = match deadline {
        Some(deadline) => deadline.saturating_duration_since(now),
        None => MAX_WAIT,
    };
    if remaining < MIN_WAIT {
        None
    } else {
        Some(remaining)
    }
}
