//! Ingress packet descriptors and their classification into flow events.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::domain::backend::{MacAddr, VirtualService};
use crate::domain::routing::BackendTable;

/// EtherType for IPv4.
pub const ETH_TYPE_IPV4: u16 = 0x0800;
/// EtherType for ARP.
pub const ETH_TYPE_ARP: u16 = 0x0806;

/// ARP operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArpOpcode {
    /// Who-has query.
    Request,
    /// Is-at answer.
    Reply,
}

/// The fields of an ARP packet the controller reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpPacket {
    /// Request or reply.
    pub opcode: ArpOpcode,
    /// Sender hardware address.
    pub sender_mac: MacAddr,
    /// Sender protocol address.
    pub sender_ip: Ipv4Addr,
    /// Target hardware address (zero in requests).
    #[serde(default)]
    pub target_mac: MacAddr,
    /// Target protocol address.
    pub target_ip: Ipv4Addr,
}

/// The IPv4 (and optional transport) header fields of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Packet {
    /// Source address.
    pub src: Ipv4Addr,
    /// Destination address.
    pub dst: Ipv4Addr,
    /// IP protocol number.
    #[serde(default)]
    pub protocol: u8,
    /// Transport source port, when the packet carries TCP/UDP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
    /// Transport destination port, when the packet carries TCP/UDP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
}

/// What the switch managed to parse above the Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// An ARP packet.
    Arp(ArpPacket),
    /// An IPv4 packet.
    Ipv4(Ipv4Packet),
    /// Any other EtherType.
    Other {
        /// The EtherType value.
        ether_type: u16,
    },
    /// The frame could not be parsed.
    Malformed,
}

/// A packet punted to the controller because no installed rule matched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketIn {
    /// Switch port the packet arrived on.
    pub in_port: u16,
    /// Switch buffer holding the packet, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_id: Option<u32>,
    /// Ethernet source.
    pub eth_src: MacAddr,
    /// Ethernet destination.
    pub eth_dst: MacAddr,
    /// Parsed payload.
    pub payload: Payload,
}

impl PacketIn {
    /// EtherType implied by the payload, if known.
    pub fn ether_type(&self) -> Option<u16> {
        match self.payload {
            Payload::Arp(_) => Some(ETH_TYPE_ARP),
            Payload::Ipv4(_) => Some(ETH_TYPE_IPV4),
            Payload::Other { ether_type } => Some(ether_type),
            Payload::Malformed => None,
        }
    }
}

/// Exact-match flow key derived from a single packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    /// Ingress switch port.
    pub in_port: u16,
    /// Ethernet source.
    pub dl_src: MacAddr,
    /// Ethernet destination.
    pub dl_dst: MacAddr,
    /// EtherType.
    pub dl_type: u16,
    /// IPv4 source.
    pub nw_src: Ipv4Addr,
    /// IPv4 destination.
    pub nw_dst: Ipv4Addr,
    /// IP protocol.
    pub nw_proto: u8,
    /// Transport source port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tp_src: Option<u16>,
    /// Transport destination port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tp_dst: Option<u16>,
}

impl FlowMatch {
    /// Build the exact key of an IPv4 packet as it arrived.
    pub fn from_packet(packet: &PacketIn, ip: &Ipv4Packet) -> Self {
        Self {
            in_port: packet.in_port,
            dl_src: packet.eth_src,
            dl_dst: packet.eth_dst,
            dl_type: ETH_TYPE_IPV4,
            nw_src: ip.src,
            nw_dst: ip.dst,
            nw_proto: ip.protocol,
            tp_src: ip.src_port,
            tp_dst: ip.dst_port,
        }
    }
}

/// The minimal view of an IPv4 packet needed to synthesize a rule for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Ingress switch port.
    pub in_port: u16,
    /// IPv4 source.
    pub src: Ipv4Addr,
    /// IPv4 destination.
    pub dst: Ipv4Addr,
    /// Exact flow key of the packet.
    pub flow_match: FlowMatch,
    /// Switch buffer holding the packet, if any.
    pub buffer_id: Option<u32>,
}

/// Why a packet was not acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The frame could not be parsed.
    Malformed,
    /// EtherType the controller does not handle.
    UnsupportedEtherType(u16),
    /// An ARP reply; only requests are answered.
    ArpReply,
    /// IPv4 traffic neither to the VIP nor from a backend.
    Unrelated,
}

/// A classified ingress packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    /// An ARP request. The responder decides whether it targets the VIP.
    ArpQuery {
        /// Port the query arrived on.
        in_port: u16,
        /// The query itself.
        query: ArpPacket,
    },
    /// Client traffic addressed to the virtual service.
    ForwardCandidate(Candidate),
    /// Traffic originating from a configured backend.
    ReverseCandidate(Candidate),
    /// Nothing to do.
    Ignored(IgnoreReason),
}

/// Classify a packet relative to the virtual service and backend table.
///
/// Destination-is-VIP wins over source-is-backend, so a backend talking to
/// the VIP is balanced like any other client.
pub fn classify(packet: &PacketIn, vip: &VirtualService, backends: &BackendTable) -> FlowEvent {
    match packet.payload {
        Payload::Malformed => FlowEvent::Ignored(IgnoreReason::Malformed),
        Payload::Other { ether_type } => {
            FlowEvent::Ignored(IgnoreReason::UnsupportedEtherType(ether_type))
        }
        Payload::Arp(arp) => match arp.opcode {
            ArpOpcode::Request => FlowEvent::ArpQuery {
                in_port: packet.in_port,
                query: arp,
            },
            ArpOpcode::Reply => FlowEvent::Ignored(IgnoreReason::ArpReply),
        },
        Payload::Ipv4(ip) => {
            let candidate = Candidate {
                in_port: packet.in_port,
                src: ip.src,
                dst: ip.dst,
                flow_match: FlowMatch::from_packet(packet, &ip),
                buffer_id: packet.buffer_id,
            };

            if ip.dst == vip.address {
                FlowEvent::ForwardCandidate(candidate)
            } else if backends.contains(ip.src) {
                FlowEvent::ReverseCandidate(candidate)
            } else {
                FlowEvent::Ignored(IgnoreReason::Unrelated)
            }
        }
    }
}
