//! Record store contract for stowage.
//!
//! Lock records, block records and stream metadata all live in named
//! collections of keyed records. The backing service is an external
//! collaborator; this crate only fixes the contract it must honour and
//! ships an in-memory reference backend.
//!
//! # Contract
//!
//! - `insert` is a unique insert: it fails with
//!   [`RecordError::DuplicateKey`] if the key exists. This is the primitive
//!   that lock acquisition races on.
//! - `update_if` is a compare-and-swap on the record's version field and
//!   fails with [`RecordError::ConcurrencyConflict`] if the stored version
//!   changed since it was read.
//! - `count_matching` answers "does any other record reference this
//!   value", which is all the querying the stream store needs.
//!
//! # Modules
//!
//! - [`error`]: [`RecordError`] and the [`Result`] alias
//! - [`traits`]: [`Record`], [`Collection`] and [`FieldFilter`]
//! - [`memory`]: [`InMemoryCollection`] for tests and embedding

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{RecordError, Result};
pub use memory::InMemoryCollection;
pub use traits::{Collection, FieldFilter, Record};
