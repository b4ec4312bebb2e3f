//! Domain model for records carrying a variable set of typed attributes.
//!
//! # Responsibility
//! - Define attribute definitions, typed values and the record aggregate.
//! - Keep value coercion in one place shared by both storage backends.
//!
//! # Invariants
//! - Every record and definition is identified by a stable UUID.
//! - Dynamic values are always stored in their string storage form.

pub mod attribute;
pub mod record;
pub mod value;
