// Sequent - fair distributed locks over a hierarchical coordination store
//
// This library re-exports the lock protocol and, with the `log` feature,
// the logging setup used by applications embedding it.

// Re-export core functionality
pub use sequent_lock::*;

// Re-export optional crates
#[cfg(feature = "log")]
pub use sequent_log;
