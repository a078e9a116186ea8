#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod array;
pub mod hashmap;
pub mod mpmc_ring;
pub mod mpmc_stack;
pub mod region;
pub mod slot;
pub mod spsc;
pub mod sync;
pub mod treiber;

#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;

pub use array::{AccessError, Array, ArrayHeader};
pub use hashmap::{FixedKey, Map, MapError, MapHeader, Set};
pub use mpmc_ring::{Queue, QueueHeader, RingError};
pub use mpmc_stack::{Stack, StackError, StackHeader};
pub use slot::{SlotMeta, SlotState};
pub use spsc::{PushResult, RingStatus, SpscConsumer, SpscProducer, SpscRing, SpscRingHeader};
pub use treiber::{AllocResult, FreeError, SlotError, SlotHandle, TreiberSlab, TreiberSlabHeader};

#[cfg(all(test, feature = "loom"))]
mod loom_tests;
