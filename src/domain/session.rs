use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Session lifecycle state machine.
///
/// State transitions:
/// - Idle -> Recording (start)
/// - Recording -> Transcribing (stop; entered before the buffer is drained
///   so status queries reflect the true state)
/// - Recording -> Idle (cancel, buffer discarded)
/// - Transcribing -> Idle (always, whether transcription succeeded or not)
///
/// There is exactly one session per process; the phase is the sole arbiter
/// of which operations are legal at any moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SessionPhase {
    /// No capture in progress, ready to start.
    Idle = 0,
    /// Actively capturing microphone audio.
    Recording = 1,
    /// Capture stopped, transcription in flight.
    Transcribing = 2,
}

impl SessionPhase {
    /// Check if a new recording can be started from this phase.
    #[must_use]
    pub fn can_start(&self) -> bool {
        matches!(self, SessionPhase::Idle)
    }

    /// Check if the session can be stopped or canceled from this phase.
    #[must_use]
    pub fn can_stop(&self) -> bool {
        matches!(self, SessionPhase::Recording)
    }

    /// Wire representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Recording => "recording",
            SessionPhase::Transcribing => "transcribing",
        }
    }
}

impl From<u8> for SessionPhase {
    fn from(value: u8) -> Self {
        match value {
            1 => SessionPhase::Recording,
            2 => SessionPhase::Transcribing,
            _ => SessionPhase::Idle,
        }
    }
}

impl From<SessionPhase> for u8 {
    fn from(phase: SessionPhase) -> Self {
        phase as u8
    }
}

/// Atomic wrapper for SessionPhase so status reads never block behind an
/// in-flight operation and never observe a torn value.
#[derive(Debug)]
pub struct AtomicSessionPhase(AtomicU8);

impl AtomicSessionPhase {
    pub fn new(phase: SessionPhase) -> Self {
        Self(AtomicU8::new(phase.into()))
    }

    pub fn load(&self) -> SessionPhase {
        self.0.load(Ordering::Acquire).into()
    }

    pub fn store(&self, phase: SessionPhase) {
        self.0.store(phase.into(), Ordering::Release);
    }

    /// Compare and swap, returns true if successful.
    pub fn compare_exchange(&self, current: SessionPhase, new: SessionPhase) -> bool {
        self.0
            .compare_exchange(current.into(), new.into(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicSessionPhase {
    fn default() -> Self {
        Self::new(SessionPhase::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_can_start() {
        assert!(SessionPhase::Idle.can_start());
        assert!(!SessionPhase::Recording.can_start());
        assert!(!SessionPhase::Transcribing.can_start());
    }

    #[test]
    fn test_phase_can_stop() {
        assert!(!SessionPhase::Idle.can_stop());
        assert!(SessionPhase::Recording.can_stop());
        assert!(!SessionPhase::Transcribing.can_stop());
    }

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            SessionPhase::Idle,
            SessionPhase::Recording,
            SessionPhase::Transcribing,
        ] {
            let value: u8 = phase.into();
            let recovered: SessionPhase = value.into();
            assert_eq!(phase, recovered);
        }
    }

    #[test]
    fn test_atomic_phase() {
        let atomic = AtomicSessionPhase::default();
        assert_eq!(atomic.load(), SessionPhase::Idle);

        atomic.store(SessionPhase::Recording);
        assert_eq!(atomic.load(), SessionPhase::Recording);

        // Successful CAS
        assert!(atomic.compare_exchange(SessionPhase::Recording, SessionPhase::Transcribing));
        assert_eq!(atomic.load(), SessionPhase::Transcribing);

        // Failed CAS (wrong current value)
        assert!(!atomic.compare_exchange(SessionPhase::Recording, SessionPhase::Idle));
        assert_eq!(atomic.load(), SessionPhase::Transcribing);
    }
}
