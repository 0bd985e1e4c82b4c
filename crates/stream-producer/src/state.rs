//! # Connection State Machine
//!
//! `Disconnected → Connecting → Subscribed → Streaming`, falling back to
//! `Disconnected` on any failure. `Draining` is entered once, on shutdown,
//! and is terminal: buffered blocks are flushed and the producer exits.

/// Connection lifecycle of the stream producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProducerState {
    /// No connection; next step is a (re)connect attempt.
    Disconnected,
    /// Dialing the upstream endpoint.
    Connecting,
    /// Connected with an acknowledged head subscription.
    Subscribed,
    /// Receiving notifications and emitting blocks.
    Streaming,
    /// Shutdown requested; flushing buffered blocks.
    Draining,
}

impl ProducerState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: ProducerState) -> bool {
        use ProducerState::*;
        match (self, next) {
            // Shutdown can interrupt any live state.
            (Disconnected | Connecting | Subscribed | Streaming, Draining) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Subscribed) => true,
            (Subscribed, Streaming) => true,
            // Any live state can lose the connection.
            (Connecting | Subscribed | Streaming, Disconnected) => true,
            _ => false,
        }
    }

    /// Short name for logs and health events.
    pub fn as_str(self) -> &'static str {
        match self {
            ProducerState::Disconnected => "disconnected",
            ProducerState::Connecting => "connecting",
            ProducerState::Subscribed => "subscribed",
            ProducerState::Streaming => "streaming",
            ProducerState::Draining => "draining",
        }
    }
}

impl std::fmt::Display for ProducerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProducerState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Subscribed));
        assert!(Subscribed.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Disconnected));
    }

    #[test]
    fn test_draining_reachable_from_everywhere_live() {
        for state in [Disconnected, Connecting, Subscribed, Streaming] {
            assert!(state.can_transition_to(Draining));
        }
    }

    #[test]
    fn test_draining_is_terminal() {
        for next in [Disconnected, Connecting, Subscribed, Streaming, Draining] {
            assert!(!Draining.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_skipping_subscribe() {
        assert!(!Connecting.can_transition_to(Streaming));
        assert!(!Disconnected.can_transition_to(Streaming));
    }
}
