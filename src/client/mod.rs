pub mod day_card;
pub mod error;
pub mod handle;
pub mod kv;
pub mod session;

pub use day_card::{DayCard, DayCardDraft, DayCardState, DayCardStore, EntryBackend};
pub use error::ClientError;
pub use handle::{ApiClient, ClientConfig, ClientSlot};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use session::SessionTracker;
