pub mod circulation;
pub mod configs;

pub use circulation::coordinator::{Coordinator, PairState, Resolution};
pub use circulation::repo::{MemoryStore, PgStore};
pub use circulation::request::Decision;
pub use circulation::{CirculationError, Notice, Notifier, NotifyError, Result};
