pub mod filter;
pub mod models;
pub mod repository;

pub use filter::{PostFilter, Sort, SortField, SortOrder};
pub use models::{NewPost, Page, PostChanges, PostRecord};
pub use repository::{PostRepository, StorageError};
