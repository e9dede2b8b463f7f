//! The load-balancing control loop.
//!
//! One engine serves one switch connection. It classifies every punted
//! packet and turns it into at most one ARP reply or flow rule, recording
//! forwarding decisions in the shared statistics store.

use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use vip_admin::UpdateRequest;
use vip_core::domain::{classify, BackendServer, Candidate, FlowEvent, PacketIn, SharedBackendTable, VirtualService};
use vip_core::load_balancer::{
    AddressResolutionResponder, FlowRuleSynthesizer, FlowSettings, SelectionPolicy, ServerSelector,
};
use vip_core::stats::SharedStats;

use crate::notifier::{NotifyOutcome, StatsNotifier};
use crate::transport::FlowSink;

/// What the engine did with one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// An ARP reply for the VIP was sent.
    Replied,
    /// A forward rule towards this backend was installed.
    Forwarded(BackendServer),
    /// A reverse rule for replies from this backend was installed.
    Reversed(Ipv4Addr),
    /// A reply candidate from an address outside the backend table was
    /// dropped without emitting anything. `classify` already filters these,
    /// so only a direct `reverse` call reaches it.
    Dropped,
    /// The packet needed no action.
    Ignored,
}

/// Per-connection decision engine.
pub struct LoadBalancingEngine<S: FlowSink> {
    vip: VirtualService,
    backends: SharedBackendTable,
    selector: ServerSelector,
    synthesizer: FlowRuleSynthesizer,
    responder: AddressResolutionResponder,
    stats: SharedStats,
    notifier: Option<StatsNotifier>,
    sink: S,
}

impl<S: FlowSink> LoadBalancingEngine<S> {
    /// Create an engine emitting to `sink` and recording into `stats`.
    pub fn new(
        vip: VirtualService,
        backends: SharedBackendTable,
        policy: SelectionPolicy,
        flow: FlowSettings,
        stats: SharedStats,
        sink: S,
    ) -> Self {
        Self {
            vip,
            selector: ServerSelector::new(policy, backends.clone()),
            synthesizer: FlowRuleSynthesizer::new(vip, backends.clone(), flow),
            responder: AddressResolutionResponder::new(vip),
            backends,
            stats,
            notifier: None,
            sink,
        }
    }

    /// Push every forwarding decision to the dashboard API as well.
    pub fn with_notifier(mut self, notifier: Option<StatsNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Process packets until the event stream closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<PacketIn>) {
        while let Some(packet) = events.recv().await {
            self.handle(&packet);
        }
    }

    /// Classify and act on a single packet.
    pub fn handle(&mut self, packet: &PacketIn) -> Dispatch {
        match classify(packet, &self.vip, &self.backends) {
            FlowEvent::ArpQuery { in_port, query } => match self.responder.resolve(in_port, &query) {
                Some(reply) => {
                    info!("ARP request for {} from {}", self.vip.address, query.sender_ip);
                    self.sink.send_reply(reply);
                    info!("ARP reply sent: {} is at {}", self.vip.address, self.vip.mac);
                    Dispatch::Replied
                }
                None => {
                    trace!(target_ip = %query.target_ip, "ARP request not for the VIP");
                    Dispatch::Ignored
                }
            },
            FlowEvent::ForwardCandidate(candidate) => self.forward(&candidate),
            FlowEvent::ReverseCandidate(candidate) => self.reverse(&candidate),
            FlowEvent::Ignored(reason) => {
                trace!(?reason, in_port = packet.in_port, "packet ignored");
                Dispatch::Ignored
            }
        }
    }

    fn forward(&mut self, candidate: &Candidate) -> Dispatch {
        // Select and record under one lock so concurrent engines never
        // observe a decision without its counter update.
        let (backend, total, entry) = {
            let mut store = self.stats.lock();
            let backend = self.selector.select(&*store);
            let entry = store.record_forward(backend.address, candidate.src, None);
            (backend, store.total_requests(), entry)
        };

        info!(
            "Request #{}: {} -> {} (forwarding to {} via port {})",
            total, candidate.src, self.vip.address, backend.address, backend.port
        );

        if let Some(notifier) = &self.notifier {
            let outcome = notifier.notify(UpdateRequest {
                server_ip: Some(backend.address.to_string()),
                client_ip: Some(candidate.src.to_string()),
                timestamp: Some(entry.timestamp),
                response_time: None,
            });
            if outcome != NotifyOutcome::Queued {
                trace!(?outcome, "dashboard notification skipped");
            }
        }

        self.sink.install_flow(self.synthesizer.forward(candidate, &backend));
        Dispatch::Forwarded(backend)
    }

    fn reverse(&mut self, candidate: &Candidate) -> Dispatch {
        match self.synthesizer.reverse(candidate) {
            Some(intent) => {
                info!(
                    "Response: {} -> {} (rewriting source to {})",
                    candidate.src, candidate.dst, self.vip.address
                );
                self.sink.install_flow(intent);
                Dispatch::Reversed(candidate.src)
            }
            None => {
                debug!(src = %candidate.src, "reply from unknown backend dropped");
                Dispatch::Dropped
            }
        }
    }
}
