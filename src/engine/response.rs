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

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::EchoRequestPacket;
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

use super::packet_builder::ProbeKey;

/// Unused word between the ICMP header and the quoted datagram
const ICMP_ERROR_UNUSED_LEN: usize = 4;

/// Whether an incoming ICMP message answers the probe identified by `key`.
///
/// Accepts `TimeExceeded` and `DestinationUnreachable` quoting the probe,
/// and `EchoReply` for echo probes.
pub(crate) fn matches_probe(key: &ProbeKey, packet: &[u8]) -> bool {
    handle_icmp_packet(key, packet).unwrap_or(false)
}

fn handle_icmp_packet(key: &ProbeKey, packet: &[u8]) -> Option<bool> {
    let icmp_packet = IcmpPacket::new(packet)?;

    match icmp_packet.get_icmp_type() {
        IcmpTypes::TimeExceeded | IcmpTypes::DestinationUnreachable => {
            handle_quoted_ipv4_packet(key, icmp_packet.payload().get(ICMP_ERROR_UNUSED_LEN..)?)
        }
        IcmpTypes::EchoReply => match *key {
            ProbeKey::Icmp { identifier, sequence, .. } => {
                let reply = EchoReplyPacket::new(packet)?;
                Some(reply.get_identifier() == identifier && reply.get_sequence_number() == sequence)
            }
            ProbeKey::Udp { .. } => Some(false),
        },
        _ => Some(false),
    }
}

/// Checks the IPv4 header and leading transport bytes quoted by an ICMP error.
fn handle_quoted_ipv4_packet(key: &ProbeKey, packet: &[u8]) -> Option<bool> {
    let header = Ipv4Packet::new(packet)?;
    let transport = packet.get(usize::from(header.get_header_length()) * 4..)?;

    match *key {
        ProbeKey::Udp { destination, source_port, destination_port } => {
            if header.get_destination() != destination
                || header.get_next_level_protocol() != IpNextHeaderProtocols::Udp
            {
                return Some(false);
            }
            let udp = UdpPacket::new(transport)?;
            Some(udp.get_source() == source_port && udp.get_destination() == destination_port)
        }
        ProbeKey::Icmp { destination, identifier, sequence } => {
            if header.get_destination() != destination
                || header.get_next_level_protocol() != IpNextHeaderProtocols::Icmp
            {
                return Some(false);
            }
            let echo = EchoRequestPacket::new(transport)?;
            Some(echo.get_identifier() == identifier && echo.get_sequence_number() == sequence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeKind;
    use crate::engine::packet_builder::PacketBuilder;
    use pnet::packet::icmp::echo_reply::MutableEchoReplyPacket;
    use pnet::packet::icmp::{IcmpCode, IcmpType, MutableIcmpPacket};
    use std::net::Ipv4Addr;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);
    const DST: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

    /// ICMP error message quoting the IP header and first 8 bytes of `probe`.
    fn icmp_error(icmp_type: IcmpType, probe: &[u8]) -> Vec<u8> {
        let quoted = &probe[..28];
        let mut buf = vec![0u8; 8 + quoted.len()];
        {
            let mut icmp = MutableIcmpPacket::new(&mut buf).unwrap();
            icmp.set_icmp_type(icmp_type);
            icmp.set_icmp_code(IcmpCode::new(0));
        }
        buf[8..].copy_from_slice(quoted);
        buf
    }

    #[test]
    fn test_time_exceeded_matches_udp_probe() {
        let builder = PacketBuilder::new(ProbeKind::Udp, SRC, 33434, 0).unwrap();
        let probe = builder.build_packet(DST, 4, 33434, 3).unwrap();
        let reply = icmp_error(IcmpTypes::TimeExceeded, &probe);

        assert!(matches_probe(&builder.probe_key(DST, 33434, 3), &reply));
        assert!(!matches_probe(&builder.probe_key(DST, 33434, 4), &reply));
        let other = Ipv4Addr::new(1, 1, 1, 1);
        assert!(!matches_probe(&builder.probe_key(other, 33434, 3), &reply));
    }

    #[test]
    fn test_port_unreachable_matches_udp_probe() {
        let builder = PacketBuilder::new(ProbeKind::Udp, SRC, 33434, 0).unwrap();
        let probe = builder.build_packet(DST, 12, 33434, 0).unwrap();
        let reply = icmp_error(IcmpTypes::DestinationUnreachable, &probe);
        assert!(matches_probe(&builder.probe_key(DST, 33434, 0), &reply));
    }

    #[test]
    fn test_time_exceeded_matches_echo_probe() {
        let builder = PacketBuilder::new(ProbeKind::Icmp, SRC, 0, 77).unwrap();
        let probe = builder.build_packet(DST, 2, 0, 8).unwrap();
        let reply = icmp_error(IcmpTypes::TimeExceeded, &probe);
        assert!(matches_probe(&builder.probe_key(DST, 0, 8), &reply));
        assert!(!matches_probe(&builder.probe_key(DST, 0, 9), &reply));
    }

    #[test]
    fn test_echo_reply() {
        let builder = PacketBuilder::new(ProbeKind::Icmp, SRC, 0, 77).unwrap();
        let mut buf = vec![0u8; 16];
        {
            let mut reply = MutableEchoReplyPacket::new(&mut buf).unwrap();
            reply.set_icmp_type(IcmpTypes::EchoReply);
            reply.set_identifier(77);
            reply.set_sequence_number(8);
        }
        assert!(matches_probe(&builder.probe_key(DST, 0, 8), &buf));
        assert!(!matches_probe(&builder.probe_key(DST, 0, 1), &buf));

        let udp = PacketBuilder::new(ProbeKind::Udp, SRC, 33434, 0).unwrap();
        assert!(!matches_probe(&udp.probe_key(DST, 33434, 8), &buf));
    }

    #[test]
    fn test_truncated_and_unrelated_packets() {
        let builder = PacketBuilder::new(ProbeKind::Udp, SRC, 33434, 0).unwrap();
        let key = builder.probe_key(DST, 33434, 0);
        assert!(!matches_probe(&key, &[]));
        assert!(!matches_probe(&key, &[11, 0, 0, 0, 0, 0, 0, 0, 0x45]));

        let mut buf = vec![0u8; 8];
        buf[0] = 8; // echo request
        assert!(!matches_probe(&key, &buf));
    }
}
