//! Utility Module
//!
//! - [`interner`]: String interning for pass and element names
//!
//! # String Interning
//!
//! Interned names compare in O(1), which matters for lookup tables that are
//! rebuilt and queried every frame.
//!
//! ```rust,ignore
//! use composure::utils::Name;
//!
//! let a = Name::new("Beauty");
//! let b = Name::from("Beauty");
//! assert_eq!(a, b);
//! ```

pub mod interner;

pub use interner::{Name, Symbol};
