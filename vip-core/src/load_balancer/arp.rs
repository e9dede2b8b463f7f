//! ARP answers for the virtual service address.

use crate::domain::backend::VirtualService;
use crate::domain::flow::AddressReply;
use crate::domain::packet::{ArpOpcode, ArpPacket};

/// Answers "who-has VIP" so clients learn the virtual link identity.
///
/// Stateless: every matching query is answered, nothing is cached.
#[derive(Debug, Clone, Copy)]
pub struct AddressResolutionResponder {
    vip: VirtualService,
}

impl AddressResolutionResponder {
    /// Create a responder for the virtual service.
    pub fn new(vip: VirtualService) -> Self {
        Self { vip }
    }

    /// Build the reply to `query`, sent back out of `in_port`.
    ///
    /// Returns `None` for replies and for queries about any other address.
    pub fn resolve(&self, in_port: u16, query: &ArpPacket) -> Option<AddressReply> {
        if query.opcode != ArpOpcode::Request || query.target_ip != self.vip.address {
            return None;
        }

        Some(AddressReply {
            out_port: in_port,
            eth_src: self.vip.mac,
            eth_dst: query.sender_mac,
            arp: ArpPacket {
                opcode: ArpOpcode::Reply,
                sender_mac: self.vip.mac,
                sender_ip: self.vip.address,
                target_mac: query.sender_mac,
                target_ip: query.sender_ip,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backend::MacAddr;
    use std::net::Ipv4Addr;

    fn responder() -> AddressResolutionResponder {
        AddressResolutionResponder::new(VirtualService::new(
            Ipv4Addr::new(10, 0, 0, 100),
            MacAddr::new(0, 0, 0, 0, 0, 0xff),
        ))
    }

    fn query(target: Ipv4Addr) -> ArpPacket {
        ArpPacket {
            opcode: ArpOpcode::Request,
            sender_mac: MacAddr::new(0, 0, 0, 0, 0, 4),
            sender_ip: Ipv4Addr::new(10, 0, 0, 4),
            target_mac: MacAddr::default(),
            target_ip: target,
        }
    }

    #[test]
    fn test_reply_for_vip() {
        let reply = responder()
            .resolve(4, &query(Ipv4Addr::new(10, 0, 0, 100)))
            .expect("vip query is answered");

        assert_eq!(reply.out_port, 4);
        assert_eq!(reply.eth_src, MacAddr::new(0, 0, 0, 0, 0, 0xff));
        assert_eq!(reply.eth_dst, MacAddr::new(0, 0, 0, 0, 0, 4));
        assert_eq!(reply.arp.opcode, ArpOpcode::Reply);
        assert_eq!(reply.arp.sender_ip, Ipv4Addr::new(10, 0, 0, 100));
        assert_eq!(reply.arp.sender_mac, MacAddr::new(0, 0, 0, 0, 0, 0xff));
        assert_eq!(reply.arp.target_ip, Ipv4Addr::new(10, 0, 0, 4));
        assert_eq!(reply.arp.target_mac, MacAddr::new(0, 0, 0, 0, 0, 4));
    }

    #[test]
    fn test_no_reply_for_other_targets() {
        assert!(responder().resolve(4, &query(Ipv4Addr::new(10, 0, 0, 1))).is_none());
    }

    #[test]
    fn test_no_reply_to_replies() {
        let mut packet = query(Ipv4Addr::new(10, 0, 0, 100));
        packet.opcode = ArpOpcode::Reply;
        assert!(responder().resolve(4, &packet).is_none());
    }

    #[test]
    fn test_every_query_answered() {
        let responder = responder();
        let q = query(Ipv4Addr::new(10, 0, 0, 100));
        assert_eq!(responder.resolve(1, &q), responder.resolve(1, &q));
    }
}
