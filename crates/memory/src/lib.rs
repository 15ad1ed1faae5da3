//! Record store and world book implementations for Lorekeeper.

pub mod extract;
pub mod records;
pub mod in_memory;
pub mod file_backend;

pub use extract::TextExtractor;
pub use records::{RecordStore, StagedRecord};
pub use in_memory::InMemoryWorldBook;
pub use file_backend::FileWorldBook;
