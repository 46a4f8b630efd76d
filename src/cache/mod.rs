pub mod arena;
pub mod pool;
pub mod record;

pub use arena::{Arena, ArenaKind, FindMode};
pub use pool::{InternMode, StringId, StringPool};
pub use record::{RdataVariant, Record, RrFlags, RrId, RrState};
