pub mod file_storage;
pub mod log_sanitizer;

pub use file_storage::{FileStorage, StoredFile};
pub use log_sanitizer::*;
