//! Every structure header reserves its first 4 bytes for a kind tag so a
//! reader (the CLI, or a typed `open()` on the wrong type) can tell what
//! it's looking at without trusting the caller's type parameter.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Kind {
    Array = 1,
    Queue = 2,
    Stack = 3,
    Map = 4,
    Set = 5,
    Pool = 6,
    Ring = 7,
    Semaphore = 8,
    Barrier = 9,
    Latch = 10,
    Channel = 11,
    Future = 12,
    Lazy = 13,
    Stream = 14,
}

impl Kind {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => Kind::Array,
            2 => Kind::Queue,
            3 => Kind::Stack,
            4 => Kind::Map,
            5 => Kind::Set,
            6 => Kind::Pool,
            7 => Kind::Ring,
            8 => Kind::Semaphore,
            9 => Kind::Barrier,
            10 => Kind::Latch,
            11 => Kind::Channel,
            12 => Kind::Future,
            13 => Kind::Lazy,
            14 => Kind::Stream,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Kind::Array => "array",
            Kind::Queue => "queue",
            Kind::Stack => "stack",
            Kind::Map => "map",
            Kind::Set => "set",
            Kind::Pool => "pool",
            Kind::Ring => "ring",
            Kind::Semaphore => "semaphore",
            Kind::Barrier => "barrier",
            Kind::Latch => "latch",
            Kind::Channel => "channel",
            Kind::Future => "future",
            Kind::Lazy => "lazy",
            Kind::Stream => "stream",
        };
        write!(f, "{s}")
    }
}

/// Reads the 4-byte kind tag at the start of a structure header and
/// verifies it matches `expected`, without requiring the caller to know
/// the structure's full layout.
pub(crate) fn check_kind(
    region: &shm_primitives::Region,
    header_offset: usize,
    name: &str,
    expected: u32,
) -> Result<(), crate::error::Error> {
    let found = unsafe { *region.get::<u32>(header_offset) };
    if found != expected {
        return Err(crate::error::Error::WrongKind { name: name.to_string(), expected, found });
    }
    Ok(())
}
