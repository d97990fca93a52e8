use std::fmt;

use thiserror::Error;

/// Failures reported by the negotiation/transport collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("description rejected: {0}")]
    Rejected(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("transport error: {0}")]
    Backend(String),
}

impl From<webrtc::Error> for TransportError {
    fn from(err: webrtc::Error) -> Self {
        TransportError::Backend(err.to_string())
    }
}

/// Which step of the offer/answer exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStage {
    RemoteDescription,
    CreateAnswer,
    LocalDescription,
}

impl NegotiationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStage::RemoteDescription => "remote_description",
            NegotiationStage::CreateAnswer => "create_answer",
            NegotiationStage::LocalDescription => "local_description",
        }
    }
}

impl fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("unable to create peer session: {0}")]
    SessionCreation(#[source] TransportError),
    #[error("negotiation failed at {stage}: {source}")]
    Negotiation {
        stage: NegotiationStage,
        #[source]
        source: TransportError,
    },
    #[error("no local description available after path discovery")]
    IncompleteNegotiation,
}

impl ProbeError {
    pub(crate) fn negotiation(stage: NegotiationStage) -> impl FnOnce(TransportError) -> Self {
        move |source| ProbeError::Negotiation { stage, source }
    }

    /// True when resubmitting the same request cannot succeed.
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            ProbeError::InvalidInput(_)
                | ProbeError::Negotiation {
                    stage: NegotiationStage::RemoteDescription,
                    ..
                }
        )
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            ProbeError::InvalidInput(_) => "invalid_input",
            ProbeError::SessionCreation(_) => "session_creation",
            ProbeError::Negotiation { stage, .. } => stage.as_str(),
            ProbeError::IncompleteNegotiation => "incomplete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn caller_fault_covers_input_and_rejected_offers() {
        assert!(ProbeError::InvalidInput("missing SDP data").is_caller_fault());
        assert!(ProbeError::Negotiation {
            stage: NegotiationStage::RemoteDescription,
            source: TransportError::Rejected("bad sdp".into()),
        }
        .is_caller_fault());
        assert!(!ProbeError::Negotiation {
            stage: NegotiationStage::CreateAnswer,
            source: TransportError::Backend("boom".into()),
        }
        .is_caller_fault());
        assert!(!ProbeError::IncompleteNegotiation.is_caller_fault());
    }
}
