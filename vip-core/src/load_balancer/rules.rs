//! Forward and reverse flow-rule synthesis.
//!
//! Together the two rules make backend selection transparent: the forward
//! rule steers client traffic for the VIP to the chosen backend, the reverse
//! rule makes the backend's replies appear to come from the VIP.

use serde::{Deserialize, Serialize};

use crate::domain::backend::{BackendServer, VirtualService};
use crate::domain::flow::{FlowAction, FlowIntent, OutputPort};
use crate::domain::packet::Candidate;
use crate::domain::routing::SharedBackendTable;

/// Priority and lifetime applied to every synthesized rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Rule priority; must sit above the table-miss default.
    pub priority: u16,
    /// Idle timeout in seconds.
    pub idle_timeout: u16,
    /// Hard timeout in seconds.
    pub hard_timeout: u16,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            priority: 100,
            idle_timeout: 10,
            hard_timeout: 30,
        }
    }
}

/// Builds rule descriptors from classified packets. Holds only static state.
#[derive(Debug, Clone)]
pub struct FlowRuleSynthesizer {
    vip: VirtualService,
    backends: SharedBackendTable,
    settings: FlowSettings,
}

impl FlowRuleSynthesizer {
    /// Create a synthesizer for a virtual service and its backends.
    pub fn new(vip: VirtualService, backends: SharedBackendTable, settings: FlowSettings) -> Self {
        Self {
            vip,
            backends,
            settings,
        }
    }

    fn intent(&self, event: &Candidate, actions: Vec<FlowAction>) -> FlowIntent {
        FlowIntent {
            flow_match: event.flow_match,
            actions,
            idle_timeout: self.settings.idle_timeout,
            hard_timeout: self.settings.hard_timeout,
            priority: self.settings.priority,
            buffer_id: event.buffer_id,
        }
    }

    /// Rule steering a client flow for the VIP to `backend`.
    pub fn forward(&self, event: &Candidate, backend: &BackendServer) -> FlowIntent {
        self.intent(
            event,
            vec![
                FlowAction::SetDlDst(backend.mac),
                FlowAction::SetNwDst(backend.address),
                FlowAction::Output(OutputPort::Physical(backend.port)),
            ],
        )
    }

    /// Rule rewriting a backend's reply so it appears to come from the VIP.
    ///
    /// The client's ingress port is not remembered between the forward and
    /// reverse events, so the reply is flooded. Returns `None` when the
    /// source is not a configured backend.
    pub fn reverse(&self, event: &Candidate) -> Option<FlowIntent> {
        self.backends.find_by_address(event.src)?;

        Some(self.intent(
            event,
            vec![
                FlowAction::SetNwSrc(self.vip.address),
                FlowAction::SetDlSrc(self.vip.mac),
                FlowAction::Output(OutputPort::Flood),
            ],
        ))
    }
}
