// crates/reachability/src/state.rs
//! Connectivity state machine

/// Current view of the network
///
/// Starts as `Unknown` and settles into `Reachable`/`Unreachable` after the
/// first report. `Unknown` is never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    /// No report has been received yet
    #[default]
    Unknown,
    /// The network is reachable
    Reachable,
    /// The network is unreachable
    Unreachable,
}

impl ConnectivityState {
    /// Returns true if the network is known to be reachable
    pub fn is_reachable(&self) -> bool {
        matches!(self, ConnectivityState::Reachable)
    }

    /// Returns true if the network is known to be unreachable
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ConnectivityState::Unreachable)
    }

    /// Returns true if moving from `self` to `next` is a valid transition
    ///
    /// Valid transitions are Unknown -> {Reachable, Unreachable} and
    /// Reachable <-> Unreachable. Same-state reports and any move back to
    /// `Unknown` are rejected.
    pub fn can_transition_to(&self, next: ConnectivityState) -> bool {
        next != ConnectivityState::Unknown && *self != next
    }

    /// Returns true if `self` -> `next` is a loss transition
    pub fn is_loss_to(&self, next: ConnectivityState) -> bool {
        next == ConnectivityState::Unreachable && *self != ConnectivityState::Unreachable
    }

    /// Returns true if `self` -> `next` is a restore transition
    pub fn is_restore_to(&self, next: ConnectivityState) -> bool {
        next == ConnectivityState::Reachable && *self == ConnectivityState::Unreachable
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectivityState::Unknown => "unknown",
            ConnectivityState::Reachable => "reachable",
            ConnectivityState::Unreachable => "unreachable",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(ConnectivityState::default(), ConnectivityState::Unknown);
    }

    #[test]
    fn test_valid_transitions() {
        assert!(ConnectivityState::Unknown.can_transition_to(ConnectivityState::Reachable));
        assert!(ConnectivityState::Unknown.can_transition_to(ConnectivityState::Unreachable));
        assert!(ConnectivityState::Reachable.can_transition_to(ConnectivityState::Unreachable));
        assert!(ConnectivityState::Unreachable.can_transition_to(ConnectivityState::Reachable));
    }

    #[test]
    fn test_unknown_never_reentered() {
        assert!(!ConnectivityState::Reachable.can_transition_to(ConnectivityState::Unknown));
        assert!(!ConnectivityState::Unreachable.can_transition_to(ConnectivityState::Unknown));
        assert!(!ConnectivityState::Unknown.can_transition_to(ConnectivityState::Unknown));
    }

    #[test]
    fn test_same_state_rejected() {
        assert!(!ConnectivityState::Reachable.can_transition_to(ConnectivityState::Reachable));
        assert!(!ConnectivityState::Unreachable.can_transition_to(ConnectivityState::Unreachable));
    }

    #[test]
    fn test_loss_and_restore_classification() {
        assert!(ConnectivityState::Reachable.is_loss_to(ConnectivityState::Unreachable));
        assert!(ConnectivityState::Unknown.is_loss_to(ConnectivityState::Unreachable));
        assert!(!ConnectivityState::Unreachable.is_loss_to(ConnectivityState::Unreachable));

        assert!(ConnectivityState::Unreachable.is_restore_to(ConnectivityState::Reachable));
        // First contact is not a restore
        assert!(!ConnectivityState::Unknown.is_restore_to(ConnectivityState::Reachable));
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectivityState::Reachable.to_string(), "reachable");
        assert_eq!(ConnectivityState::Unreachable.to_string(), "unreachable");
        assert_eq!(ConnectivityState::Unknown.to_string(), "unknown");
    }
}
