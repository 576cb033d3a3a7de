//! Crate-internal prelude.
//!
//! Re-exports the `Display` derive from derive_more, used by the value types,
//! the parse error and the small enums that name things in log output.

pub use derive_more::Display;
