//! Runtime statement state of a connection.
//!
//! ## Transitions
//!
//! ```text
//! Idle -> AwaitingResponse (request sent)
//! AwaitingResponse -> ProcessingTokens (first token read)
//! ProcessingTokens -> Idle (final DONE)
//! any -> Poisoned (protocol error; the transport is closed)
//! Poisoned -> Idle (reconnect)
//! ```

/// What the connection is doing with its single in-flight statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
    /// No statement in flight.
    #[default]
    Idle,
    /// Request sent, nothing read back yet.
    AwaitingResponse,
    /// Reading the token stream of a response.
    ProcessingTokens,
    /// A malformed stream was seen; the connection must be reopened.
    Poisoned,
}

impl ProtocolState {
    /// Check if the connection can be used after reconnecting at most.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Poisoned)
    }

    /// Check if a statement is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::AwaitingResponse | Self::ProcessingTokens)
    }

    /// Mark a request as sent.
    pub fn request_sent(&mut self) {
        *self = Self::AwaitingResponse;
    }

    /// Mark the first response token as read.
    pub fn tokens_started(&mut self) {
        if *self == Self::AwaitingResponse {
            *self = Self::ProcessingTokens;
        }
    }

    /// Mark the response as fully consumed.
    pub fn finished(&mut self) {
        if *self != Self::Poisoned {
            *self = Self::Idle;
        }
    }

    /// Mark the stream as unusable.
    pub fn poison(&mut self) {
        *self = Self::Poisoned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_cycle() {
        let mut state = ProtocolState::default();
        assert!(!state.is_busy());

        state.request_sent();
        assert!(state.is_busy());
        state.tokens_started();
        assert_eq!(state, ProtocolState::ProcessingTokens);
        state.finished();
        assert_eq!(state, ProtocolState::Idle);
    }

    #[test]
    fn test_poison_sticks_until_reset() {
        let mut state = ProtocolState::AwaitingResponse;
        state.poison();
        state.finished();
        state.tokens_started();
        assert!(!state.is_usable());
        assert!(!state.is_busy());

        state = ProtocolState::default();
        assert!(state.is_usable());
    }
}
