//! Weight and replay persistence.

pub mod checkpointer;

pub use checkpointer::{Checkpointer, CheckpointerConfig};
