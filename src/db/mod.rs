mod models;
mod schema;
pub mod seed;

pub use models::{ConfigShape, FormatParams, JournalEntry, PublisherProfile, RegistryStats};
pub use schema::{journal_key, Registry};
