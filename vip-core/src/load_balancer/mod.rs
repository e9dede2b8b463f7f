//! Load-balancing decisions: backend selection, rule synthesis and ARP.

pub mod arp;
pub mod rules;
pub mod selector;

pub use arp::AddressResolutionResponder;
pub use rules::{FlowRuleSynthesizer, FlowSettings};
pub use selector::{RequestCounts, SelectionPolicy, ServerSelector};
