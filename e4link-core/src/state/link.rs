//! Lifecycle of the bridge connection and its receive loop.
//!
//! Transitions are validated and return `Result` instead of panicking.

use std::time::Instant;

use crate::error::E4Error;

// ── LinkPhase ────────────────────────────────────────────────────

/// The current phase of the bridge connection.
///
/// ```text
///  Connecting ──► Active ──► Stopped
/// ```
///
/// The client starts `Connecting`; the receive loop activates the phase
/// when it starts and stops it when it exits. `Stopped` is terminal; a
/// fresh client is needed to reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkPhase {
    /// Socket open, receive loop not yet running.
    #[default]
    Connecting,

    /// Socket is up and the receive loop is consuming lines.
    Active {
        /// When the loop started.
        since: Instant,
    },

    /// The loop has exited: closed locally, or the peer went away.
    Stopped,
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Active { .. } => write!(f, "Active"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

impl LinkPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// How long the loop has been running. `None` unless `Active`.
    pub fn active_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Active { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Active`.
    ///
    /// Valid from: `Connecting`.
    pub fn activate(&mut self) -> Result<(), E4Error> {
        match self {
            Self::Connecting => {
                *self = Self::Active {
                    since: Instant::now(),
                };
                Ok(())
            }
            other => Err(E4Error::Other(format!(
                "cannot activate receive loop from {other}"
            ))),
        }
    }

    /// Transition to `Stopped`. Idempotent.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn stop(&mut self) -> bool {
        let was_stopped = self.is_stopped();
        *self = Self::Stopped;
        !was_stopped
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = LinkPhase::default();
        assert_eq!(phase, LinkPhase::Connecting);

        phase.activate().unwrap();
        assert!(phase.is_active());
        assert!(phase.active_duration().is_some());

        assert!(phase.stop());
        assert!(phase.is_stopped());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut phase = LinkPhase::Active {
            since: Instant::now(),
        };
        assert!(phase.stop());
        assert!(!phase.stop());
    }

    #[test]
    fn cannot_restart_stopped_loop() {
        let mut phase = LinkPhase::Stopped;
        assert!(phase.activate().is_err());
    }

    #[test]
    fn cannot_activate_twice() {
        let mut phase = LinkPhase::Connecting;
        phase.activate().unwrap();
        assert!(phase.activate().is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(LinkPhase::Connecting.to_string(), "Connecting");
        assert_eq!(
            LinkPhase::Active {
                since: Instant::now()
            }
            .to_string(),
            "Active"
        );
        assert_eq!(LinkPhase::Stopped.to_string(), "Stopped");
    }
}
