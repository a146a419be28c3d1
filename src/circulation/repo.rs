mod diesel;
mod memory;

pub use self::diesel::PgStore;
pub use self::memory::MemoryStore;
