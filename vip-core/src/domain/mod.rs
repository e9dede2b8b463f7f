//! Domain models: backends, packets, flow events and flow intents.

pub mod backend;
pub mod flow;
pub mod packet;
pub mod routing;

pub use backend::{BackendId, BackendServer, MacAddr, VirtualService};
pub use flow::{AddressReply, FlowAction, FlowIntent, OutputPort};
pub use packet::{
    classify, ArpOpcode, ArpPacket, Candidate, FlowEvent, FlowMatch, IgnoreReason, Ipv4Packet, PacketIn,
    Payload,
};
pub use routing::{BackendTable, SharedBackendTable};
