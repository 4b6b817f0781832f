//! Policy layer for logical ("paranoid") deletion.
//!
//! Pure logic only: configuration, deletion-state classification,
//! association declarations, hooks and the in-memory record model. Storage
//! access lives in `paranoid_db`.

pub mod association;
pub mod classifier;
pub mod clock;
pub mod error;
pub mod hooks;
pub mod identifier;
pub mod outcome;
pub mod paranoid;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;
pub mod window;
