//! Escrow FSM State Definitions
//!
//! State IDs are designed for PostgreSQL storage as SMALLINT.
//! "None" is represented by the absence of an escrow row.

use std::fmt;

/// Escrow lifecycle states
///
/// Transitions are one-directional: `Held -> Released` or
/// `Held -> Refunded`. Both settlement states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum EscrowState {
    /// Funds held against the bounty; the only state settlement can
    /// start from
    Held = 10,

    /// Terminal: paid out to the hunter (minus platform fee)
    Released = 20,

    /// Terminal: returned to the poster in full
    Refunded = 30,
}

impl EscrowState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowState::Released | EscrowState::Refunded)
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(EscrowState::Held),
            20 => Some(EscrowState::Released),
            30 => Some(EscrowState::Refunded),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowState::Held => "HELD",
            EscrowState::Released => "RELEASED",
            EscrowState::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for EscrowState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        EscrowState::from_id(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(EscrowState::Released.is_terminal());
        assert!(EscrowState::Refunded.is_terminal());
        assert!(!EscrowState::Held.is_terminal());
    }

    #[test]
    fn test_state_id_roundtrip() {
        for state in [
            EscrowState::Held,
            EscrowState::Released,
            EscrowState::Refunded,
        ] {
            assert_eq!(EscrowState::from_id(state.id()), Some(state));
        }
    }

    #[test]
    fn test_invalid_state_id() {
        assert!(EscrowState::from_id(0).is_none());
        assert!(EscrowState::from_id(999).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(EscrowState::Held.to_string(), "HELD");
        assert_eq!(EscrowState::Released.to_string(), "RELEASED");
        assert_eq!(EscrowState::Refunded.to_string(), "REFUNDED");
    }
}
