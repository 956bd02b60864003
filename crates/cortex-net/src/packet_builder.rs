//! Raw packet construction for the SYN worker.
//!
//! Builds an IPv4 + TCP frame (optionally with an Ethernet header) with
//! correct header checksums. `pnet`'s packet types keep all field writes
//! bounds-checked.

use pnet::packet::{
    ethernet::{EtherTypes, MutableEthernetPacket},
    ip::IpNextHeaderProtocols,
    ipv4::{checksum as ipv4_checksum, MutableIpv4Packet},
    tcp::{ipv4_checksum as tcp_ipv4_checksum, MutableTcpPacket},
};
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketBuilderError {
    #[error("Buffer too small for packet: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl From<PacketBuilderError> for cortex_core::Error {
    fn from(err: PacketBuilderError) -> Self {
        cortex_core::Error::Network(format!("packet builder error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PacketBuilderError>;

/// TCP flags as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0b0000_0001);
    pub const SYN: TcpFlags = TcpFlags(0b0000_0010);
    pub const RST: TcpFlags = TcpFlags(0b0000_0100);
    pub const PSH: TcpFlags = TcpFlags(0b0000_1000);
    pub const ACK: TcpFlags = TcpFlags(0b0001_0000);
    pub const URG: TcpFlags = TcpFlags(0b0010_0000);
    pub const ECE: TcpFlags = TcpFlags(0b0100_0000);
    pub const CWR: TcpFlags = TcpFlags(0b1000_0000);

    pub const fn empty() -> Self {
        TcpFlags(0)
    }

    pub fn combine(&self, other: TcpFlags) -> Self {
        TcpFlags(self.0 | other.0)
    }

    pub fn has(&self, flag: TcpFlags) -> bool {
        (self.0 & flag.0) != 0
    }
}

/// Builder for an IPv4 + TCP packet, with an optional Ethernet header.
#[derive(Debug, Clone)]
pub struct TcpPacketBuilder {
    src_mac: Option<MacAddr>,
    dst_mac: Option<MacAddr>,

    src_ip: Option<Ipv4Addr>,
    dst_ip: Option<Ipv4Addr>,
    ttl: u8,
    ip_id: u16,

    src_port: Option<u16>,
    dst_port: Option<u16>,
    seq: u32,
    ack: u32,
    flags: TcpFlags,
    window: u16,
    urgent_ptr: u16,
}

impl Default for TcpPacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpPacketBuilder {
    pub fn new() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        Self {
            src_mac: None,
            dst_mac: None,
            src_ip: None,
            dst_ip: None,
            ttl: 64,
            ip_id: rng.gen(),
            src_port: None,
            dst_port: None,
            seq: rng.gen(),
            ack: 0,
            flags: TcpFlags::empty(),
            window: 65535,
            urgent_ptr: 0,
        }
    }

    pub fn source_mac(mut self, mac: MacAddr) -> Self {
        self.src_mac = Some(mac);
        self
    }

    pub fn dest_mac(mut self, mac: MacAddr) -> Self {
        self.dst_mac = Some(mac);
        self
    }

    pub fn source_ip(mut self, ip: Ipv4Addr) -> Self {
        self.src_ip = Some(ip);
        self
    }

    pub fn dest_ip(mut self, ip: Ipv4Addr) -> Self {
        self.dst_ip = Some(ip);
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn source_port(mut self, port: u16) -> Self {
        self.src_port = Some(port);
        self
    }

    pub fn dest_port(mut self, port: u16) -> Self {
        self.dst_port = Some(port);
        self
    }

    pub fn sequence(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn flags(mut self, flags: TcpFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    /// Builds the full frame, including an Ethernet header if both MAC
    /// addresses were set.
    pub fn build(self) -> Result<Vec<u8>> {
        let src_ip = self
            .src_ip
            .ok_or_else(|| PacketBuilderError::MissingField("source_ip".to_string()))?;
        let dst_ip = self
            .dst_ip
            .ok_or_else(|| PacketBuilderError::MissingField("dest_ip".to_string()))?;
        let src_port = self
            .src_port
            .ok_or_else(|| PacketBuilderError::MissingField("source_port".to_string()))?;
        let dst_port = self
            .dst_port
            .ok_or_else(|| PacketBuilderError::MissingField("dest_port".to_string()))?;

        let tcp_header_size = 20;
        let ip_total_size = 20 + tcp_header_size;
        let (total_size, has_ethernet) = if self.src_mac.is_some() && self.dst_mac.is_some() {
            (14 + ip_total_size, true)
        } else {
            (ip_total_size, false)
        };

        let mut buffer = vec![0u8; total_size];
        let mut offset = 0;

        if has_ethernet {
            let src_mac = self.src_mac.unwrap();
            let dst_mac = self.dst_mac.unwrap();
            let buffer_len = buffer.len();

            let mut eth_packet = MutableEthernetPacket::new(&mut buffer[offset..offset + 14])
                .ok_or(PacketBuilderError::BufferTooSmall {
                    needed: 14,
                    available: buffer_len,
                })?;

            eth_packet.set_destination(dst_mac);
            eth_packet.set_source(src_mac);
            eth_packet.set_ethertype(EtherTypes::Ipv4);

            offset += 14;
        }

        {
            let buffer_len = buffer.len();
            let mut ip_packet = MutableIpv4Packet::new(&mut buffer[offset..offset + 20]).ok_or(
                PacketBuilderError::BufferTooSmall {
                    needed: 20,
                    available: buffer_len - offset,
                },
            )?;

            ip_packet.set_version(4);
            ip_packet.set_header_length(5);
            ip_packet.set_dscp(0);
            ip_packet.set_ecn(0);
            ip_packet.set_total_length(ip_total_size as u16);
            ip_packet.set_identification(self.ip_id);
            ip_packet.set_flags(2);
            ip_packet.set_fragment_offset(0);
            ip_packet.set_ttl(self.ttl);
            ip_packet.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
            ip_packet.set_source(src_ip);
            ip_packet.set_destination(dst_ip);

            let checksum = ipv4_checksum(&ip_packet.to_immutable());
            ip_packet.set_checksum(checksum);

            offset += 20;
        }

        {
            let buffer_len = buffer.len();
            let mut tcp_packet = MutableTcpPacket::new(
                &mut buffer[offset..offset + tcp_header_size],
            )
            .ok_or(PacketBuilderError::BufferTooSmall {
                needed: tcp_header_size,
                available: buffer_len - offset,
            })?;

            tcp_packet.set_source(src_port);
            tcp_packet.set_destination(dst_port);
            tcp_packet.set_sequence(self.seq);
            tcp_packet.set_acknowledgement(self.ack);
            tcp_packet.set_data_offset((tcp_header_size / 4) as u8);
            tcp_packet.set_reserved(0);
            tcp_packet.set_flags(self.flags.0);
            tcp_packet.set_window(self.window);
            tcp_packet.set_urgent_ptr(self.urgent_ptr);

            let checksum = tcp_ipv4_checksum(&tcp_packet.to_immutable(), &src_ip, &dst_ip);
            tcp_packet.set_checksum(checksum);
        }

        Ok(buffer)
    }

    /// Builds just the IP + TCP packet, dropping any MAC addresses set.
    pub fn build_ip_packet(self) -> Result<Vec<u8>> {
        let builder = Self {
            src_mac: None,
            dst_mac: None,
            ..self
        };
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_flags() {
        let syn = TcpFlags::SYN;
        assert_eq!(syn.0, 0b0000_0010);
        assert!(syn.has(TcpFlags::SYN));
        assert!(!syn.has(TcpFlags::ACK));

        let syn_ack = syn.combine(TcpFlags::ACK);
        assert!(syn_ack.has(TcpFlags::SYN));
        assert!(syn_ack.has(TcpFlags::ACK));
    }

    #[test]
    fn test_tcp_packet_builder_basic() {
        let packet = TcpPacketBuilder::new()
            .source_ip(Ipv4Addr::new(10, 0, 0, 1))
            .dest_ip(Ipv4Addr::new(10, 0, 0, 2))
            .source_port(12345)
            .dest_port(80)
            .flags(TcpFlags::SYN)
            .build_ip_packet()
            .expect("failed to build packet");

        assert_eq!(packet.len(), 40);
        assert_eq!(packet[0] >> 4, 4);
        assert_eq!(packet[0] & 0x0F, 5);
        assert_eq!(packet[9], 6);
    }

    #[test]
    fn test_tcp_packet_builder_with_ethernet() {
        let packet = TcpPacketBuilder::new()
            .source_mac(MacAddr::new(1, 2, 3, 4, 5, 6))
            .dest_mac(MacAddr::new(6, 5, 4, 3, 2, 1))
            .source_ip(Ipv4Addr::new(10, 0, 0, 1))
            .dest_ip(Ipv4Addr::new(10, 0, 0, 2))
            .source_port(12345)
            .dest_port(80)
            .flags(TcpFlags::SYN)
            .build()
            .expect("failed to build packet");

        assert_eq!(packet.len(), 14 + 40);
    }

    #[test]
    fn test_tcp_packet_builder_missing_fields() {
        let result = TcpPacketBuilder::new()
            .source_ip(Ipv4Addr::new(10, 0, 0, 1))
            .dest_port(80)
            .build_ip_packet();

        assert!(result.is_err());
    }

    #[test]
    fn test_checksum_is_nonzero() {
        let packet = TcpPacketBuilder::new()
            .source_ip(Ipv4Addr::new(10, 0, 0, 1))
            .dest_ip(Ipv4Addr::new(10, 0, 0, 2))
            .source_port(12345)
            .dest_port(80)
            .flags(TcpFlags::SYN)
            .build_ip_packet()
            .expect("failed to build packet");

        let ip_checksum = u16::from_be_bytes([packet[10], packet[11]]);
        let tcp_checksum = u16::from_be_bytes([packet[36], packet[37]]);
        assert_ne!(ip_checksum, 0);
        assert_ne!(tcp_checksum, 0);
    }
}
