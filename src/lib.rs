pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod models;
pub mod remote;
pub mod store;
pub mod tree;
pub mod validation;

pub use error::{RemoteError, StoreError, ValidationError};
pub use models::{AuthorSnapshot, PostNode};
pub use remote::PostRemote;
pub use store::PostStore;
