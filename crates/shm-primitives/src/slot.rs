use crate::sync::{AtomicU32, Ordering};

/// Lifecycle state of one slab slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SlotState {
    Free = 0,
    Allocated = 1,
    InFlight = 2,
}

impl SlotState {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(SlotState::Free),
            1 => Some(SlotState::Allocated),
            2 => Some(SlotState::InFlight),
            _ => None,
        }
    }
}

/// Per-slot metadata: a generation counter (bumped on every allocation, used
/// to detect stale handles) plus a lifecycle state.
pub struct SlotMeta {
    pub generation: AtomicU32,
    pub state: AtomicU32,
}

impl SlotMeta {
    /// Reset to the initial (Free, generation 0) state.
    pub fn init(&mut self) {
        self.generation = AtomicU32::new(0);
        self.state = AtomicU32::new(SlotState::Free as u32);
    }

    #[inline]
    pub fn load_state(&self) -> Option<SlotState> {
        SlotState::from_u32(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn load_generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// Attempt a single CAS state transition. Returns the observed state on
    /// failure.
    pub fn try_transition(&self, from: SlotState, to: SlotState) -> Result<(), Option<SlotState>> {
        self.state
            .compare_exchange(from as u32, to as u32, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(SlotState::from_u32)
    }
}
