use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::error::{NegotiationStage, ProbeError};
use crate::lifecycle::LifecycleController;
use crate::registry::SessionRegistry;
use crate::session::{CloseReason, ProbeSession, SessionState};
use crate::transport::{session_inbox, PeerSession, PeerTransport, SessionDescription};

/// Result of a successful offer/answer exchange.
#[derive(Debug)]
pub struct Negotiated {
    pub answer: String,
    pub session: Arc<ProbeSession>,
}

/// Turns inbound offers into answered, lifecycle-managed probe sessions.
pub struct Negotiator {
    transport: Arc<dyn PeerTransport>,
    config: Arc<ProbeConfig>,
    registry: SessionRegistry,
}

impl Negotiator {
    pub fn new(transport: Arc<dyn PeerTransport>, config: ProbeConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
            registry: SessionRegistry::new(),
        }
    }

    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Answer `offer_sdp`, waiting at most `gather_timeout` for path discovery.
    ///
    /// A path-discovery timeout is not an error: the best description
    /// available at that point is returned. The session keeps running after
    /// this returns and is torn down by its lifecycle controller.
    pub async fn negotiate(
        &self,
        offer_sdp: &str,
        gather_timeout: Duration,
    ) -> Result<Negotiated, ProbeError> {
        if offer_sdp.trim().is_empty() {
            counter!("rtc_probe_negotiation_failures_total", "reason" => "invalid_input")
                .increment(1);
            return Err(ProbeError::InvalidInput("missing SDP data"));
        }

        let started = Instant::now();
        let peer = self.transport.create_session().await.map_err(|err| {
            counter!("rtc_probe_negotiation_failures_total", "reason" => "session_creation")
                .increment(1);
            ProbeError::SessionCreation(err)
        })?;

        let session = Arc::new(ProbeSession::new(
            Arc::clone(&peer),
            self.config.session_ttl,
        ));
        counter!("rtc_probe_sessions_created_total").increment(1);

        // Observers go in before any description is applied so an early
        // channel request cannot slip past the inbox.
        let (sink, events) = session_inbox();
        peer.subscribe(sink.clone());
        self.registry.insert(Arc::clone(&session));
        LifecycleController::new(
            Arc::clone(&session),
            events,
            sink,
            Arc::clone(&self.config),
            self.registry.clone(),
        )
        .spawn();

        session.advance(SessionState::Negotiating);
        let result = self
            .exchange(&session, peer.as_ref(), offer_sdp, gather_timeout)
            .await;

        match result {
            Ok(answer) => {
                histogram!("rtc_probe_negotiation_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(
                    session_id = %session.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "offer answered"
                );
                Ok(Negotiated { answer, session })
            }
            Err(err) => {
                counter!(
                    "rtc_probe_negotiation_failures_total",
                    "reason" => err.metric_label()
                )
                .increment(1);
                warn!(session_id = %session.id(), error = %err, "negotiation failed");
                session.close(CloseReason::NegotiationFailed).await;
                Err(err)
            }
        }
    }

    async fn exchange(
        &self,
        session: &ProbeSession,
        peer: &dyn PeerSession,
        offer_sdp: &str,
        gather_timeout: Duration,
    ) -> Result<String, ProbeError> {
        peer.set_remote_description(SessionDescription::offer(offer_sdp))
            .await
            .map_err(ProbeError::negotiation(NegotiationStage::RemoteDescription))?;

        let answer = peer
            .create_answer()
            .await
            .map_err(ProbeError::negotiation(NegotiationStage::CreateAnswer))?;

        peer.set_local_description(answer)
            .await
            .map_err(ProbeError::negotiation(NegotiationStage::LocalDescription))?;

        let budget = gather_timeout.min(session.remaining());
        match timeout(budget, peer.gathering_complete()).await {
            Ok(()) => debug!(session_id = %session.id(), "path discovery complete"),
            Err(_) => warn!(
                session_id = %session.id(),
                budget_ms = budget.as_millis() as u64,
                "path discovery timed out; answering with partial description"
            ),
        }

        match peer.local_description().await {
            Some(local) if !local.sdp.trim().is_empty() => Ok(local.sdp),
            _ => Err(ProbeError::IncompleteNegotiation),
        }
    }
}
