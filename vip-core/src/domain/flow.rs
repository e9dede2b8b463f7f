//! Flow intents and packet-out descriptors handed to the switch transport.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::domain::backend::MacAddr;
use crate::domain::packet::{ArpPacket, FlowMatch};

/// Where a rewritten packet leaves the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPort {
    /// A specific switch port.
    Physical(u16),
    /// Every port except the ingress port.
    Flood,
    /// Back out of the ingress port.
    InPort,
}

/// A single rewrite or output step of a flow rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum FlowAction {
    /// Rewrite the Ethernet destination.
    SetDlDst(MacAddr),
    /// Rewrite the Ethernet source.
    SetDlSrc(MacAddr),
    /// Rewrite the IPv4 destination.
    SetNwDst(Ipv4Addr),
    /// Rewrite the IPv4 source.
    SetNwSrc(Ipv4Addr),
    /// Emit the packet.
    Output(OutputPort),
}

/// A forwarding rule the transport should install.
///
/// Forward and reverse rules are independent records; expiry after the idle
/// or hard timeout is enforced by the switch, not the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowIntent {
    /// Exact key the rule matches.
    pub flow_match: FlowMatch,
    /// Ordered actions; the last one is the output.
    pub actions: Vec<FlowAction>,
    /// Seconds without traffic before the rule expires.
    pub idle_timeout: u16,
    /// Seconds after installation before the rule expires.
    pub hard_timeout: u16,
    /// Rule priority.
    pub priority: u16,
    /// Buffered packet to release through the new rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_id: Option<u32>,
}

impl FlowIntent {
    /// The output target of this rule, if it has one.
    pub fn output(&self) -> Option<OutputPort> {
        self.actions.iter().rev().find_map(|action| match action {
            FlowAction::Output(port) => Some(*port),
            _ => None,
        })
    }
}

/// A packet the controller injects directly (used for ARP replies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressReply {
    /// Port to send the frame out of.
    pub out_port: u16,
    /// Ethernet source.
    pub eth_src: MacAddr,
    /// Ethernet destination.
    pub eth_dst: MacAddr,
    /// The ARP body.
    pub arp: ArpPacket,
}
