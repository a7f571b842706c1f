//! The register store, its change-event stream, the process-wide
//! shutdown/event bus, and the environment abstraction that decouples all of
//! it from system time and randomness.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod events;
pub mod item;
pub mod register;
pub mod store;

pub use env::{Environment, SystemEnv};
pub use error::StoreError;
pub use events::{EventBus, ShutdownEvent, Subscriber};
pub use item::{content_hash, Attributes, RegisterItem};
pub use register::RegisterIndex;
pub use store::{ChangeEvent, ChangeOp, InMemoryStore, RegisterStore};
