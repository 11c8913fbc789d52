use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const FORCED: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptState {
    /// Generation runs freely.
    Idle,
    /// Pause for user input at the next opportunity.
    Armed,
    /// Halt immediately.
    Forced,
}

impl InterruptState {
    fn from_u8(value: u8) -> Self {
        match value {
            IDLE => InterruptState::Idle,
            ARMED => InterruptState::Armed,
            _ => InterruptState::Forced,
        }
    }
}

/// Two-stage cancellation token shared between the controller and whatever
/// delivers interrupts to it. The first signal arms, any later one forces.
/// Forced is terminal.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    state: Arc<AtomicU8>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers one interrupt and returns the resulting state.
    pub fn signal(&self) -> InterruptState {
        match self
            .state
            .compare_exchange(IDLE, ARMED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => InterruptState::Armed,
            Err(_) => {
                self.state.store(FORCED, Ordering::SeqCst);
                InterruptState::Forced
            }
        }
    }

    pub fn state(&self) -> InterruptState {
        InterruptState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_armed(&self) -> bool {
        self.state() == InterruptState::Armed
    }

    pub fn is_forced(&self) -> bool {
        self.state() == InterruptState::Forced
    }

    pub(crate) fn arm(&self) {
        let _ = self
            .state
            .compare_exchange(IDLE, ARMED, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub(crate) fn disarm(&self) {
        let _ = self
            .state
            .compare_exchange(ARMED, IDLE, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn force(&self) {
        self.state.store(FORCED, Ordering::SeqCst);
    }
}
