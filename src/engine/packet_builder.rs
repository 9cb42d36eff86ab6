use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{self, IcmpCode, IcmpPacket, IcmpTypes};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::udp::{self, MutableUdpPacket};
use pnet::packet::{MutablePacket, Packet};
use std::net::Ipv4Addr;

use crate::config::ProbeKind;
use crate::error::{EngineError, EngineResult};

const IPV4_HEADER_LEN: usize = 20;
/// UDP header and a 24 byte zero payload
const UDP_LEN: usize = 32;
/// ICMP echo header and a 44 byte zero payload
const ICMP_LEN: usize = 52;

/// Fields of an outstanding probe that a reply quotes back to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeKey {
    Udp { destination: Ipv4Addr, source_port: u16, destination_port: u16 },
    Icmp { destination: Ipv4Addr, identifier: u16, sequence: u16 },
}

#[derive(Debug, Clone, Copy)]
enum Wire {
    Udp { source_port: u16 },
    Icmp { identifier: u16 },
}

/// Builds raw IPv4 probe packets for one run.
pub(crate) struct PacketBuilder {
    wire: Wire,
    source_ip: Ipv4Addr,
}

impl PacketBuilder {
    pub(crate) fn new(
        kind: ProbeKind,
        source_ip: Ipv4Addr,
        source_port: u16,
        identifier: u16,
    ) -> EngineResult<Self> {
        let wire = match kind {
            ProbeKind::Udp => Wire::Udp { source_port },
            ProbeKind::Icmp => Wire::Icmp { identifier },
            ProbeKind::Tcp => return Err(EngineError::UnsupportedProbeKind(kind)),
        };
        Ok(PacketBuilder { wire, source_ip })
    }

    /// IP protocol carried by the probes
    pub(crate) fn protocol(&self) -> IpNextHeaderProtocol {
        match self.wire {
            Wire::Udp { .. } => IpNextHeaderProtocols::Udp,
            Wire::Icmp { .. } => IpNextHeaderProtocols::Icmp,
        }
    }

    /// Key identifying probe `sequence` sent towards `port`
    pub(crate) fn probe_key(&self, destination_ip: Ipv4Addr, port: u16, sequence: u16) -> ProbeKey {
        match self.wire {
            Wire::Udp { source_port } => ProbeKey::Udp {
                destination: destination_ip,
                source_port,
                destination_port: port.wrapping_add(sequence),
            },
            Wire::Icmp { identifier } => ProbeKey::Icmp {
                destination: destination_ip,
                identifier,
                sequence,
            },
        }
    }

    /// Builds the IPv4 packet for probe `sequence`. UDP probes go to `port + sequence`.
    pub(crate) fn build_packet(
        &self,
        destination_ip: Ipv4Addr,
        ttl: u8,
        port: u16,
        sequence: u16,
    ) -> Option<Vec<u8>> {
        match self.wire {
            Wire::Udp { source_port } => self.build_udp_packet(
                destination_ip,
                ttl,
                source_port,
                port.wrapping_add(sequence),
                sequence,
            ),
            Wire::Icmp { identifier } => {
                self.build_icmp_packet(destination_ip, ttl, identifier, sequence)
            }
        }
    }

    fn build_ipv4_header<'p>(
        &self,
        buf: &'p mut [u8],
        destination_ip: Ipv4Addr,
        ttl: u8,
        protocol: IpNextHeaderProtocol,
        identification: u16,
    ) -> Option<MutableIpv4Packet<'p>> {
        let total_length = buf.len() as u16;
        let mut ip_header = MutableIpv4Packet::new(buf)?;

        ip_header.set_version(4);
        ip_header.set_header_length(5);
        ip_header.set_total_length(total_length);
        ip_header.set_identification(identification);
        ip_header.set_ttl(ttl);
        ip_header.set_next_level_protocol(protocol);
        ip_header.set_source(self.source_ip);
        ip_header.set_destination(destination_ip);
        ip_header.set_checksum(ipv4::checksum(&ip_header.to_immutable()));
        Some(ip_header)
    }

    /// Create a new UDP packet.
    fn build_udp_packet(
        &self,
        destination_ip: Ipv4Addr,
        ttl: u8,
        source_port: u16,
        destination_port: u16,
        sequence: u16,
    ) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; IPV4_HEADER_LEN + UDP_LEN];
        let mut ip_header = self.build_ipv4_header(
            &mut buf,
            destination_ip,
            ttl,
            IpNextHeaderProtocols::Udp,
            sequence,
        )?;

        let mut udp_header = MutableUdpPacket::new(ip_header.payload_mut())?;
        udp_header.set_source(source_port);
        udp_header.set_destination(destination_port);
        udp_header.set_length(UDP_LEN as u16);
        let checksum = udp::ipv4_checksum(&udp_header.to_immutable(), &self.source_ip, &destination_ip);
        udp_header.set_checksum(checksum);

        Some(buf)
    }

    /// Create a new ICMP echo request packet.
    fn build_icmp_packet(
        &self,
        destination_ip: Ipv4Addr,
        ttl: u8,
        identifier: u16,
        sequence: u16,
    ) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; IPV4_HEADER_LEN + ICMP_LEN];
        let mut ip_header = self.build_ipv4_header(
            &mut buf,
            destination_ip,
            ttl,
            IpNextHeaderProtocols::Icmp,
            sequence,
        )?;

        let mut echo = MutableEchoRequestPacket::new(ip_header.payload_mut())?;
        echo.set_icmp_type(IcmpTypes::EchoRequest);
        echo.set_icmp_code(IcmpCode::new(0));
        echo.set_identifier(identifier);
        echo.set_sequence_number(sequence);
        let checksum = icmp::checksum(&IcmpPacket::new(echo.packet())?);
        echo.set_checksum(checksum);

        Some(buf)
    }
}
