//! # bytelayout: declaration-ordered binary record schemas
//!
//! Declare the fields of a binary record in wire order. A field's type may depend on
//! the values of fields declared before it (a length, a count, a flag). The
//! schema compiles once into a [`Codec`]; the resulting [`RecordType`] builds records,
//! parses them from any [`std::io::Read`], and serializes them back, so that
//! `parse(to_bytes(r)) == r`.
//!
//! ## Pieces
//!
//! - [`Placeholder`]: deferred reference to an earlier field, with explicit
//!   combinators (`add`, `mul`, `equals`, ...)
//! - [`SchemaBuilder`]: registers fields in order, returns a handle per field,
//!   rejects duplicates and references to fields that are not declared yet
//! - [`Codec`]: the compiled, immutable parse/build engine
//! - [`RecordType`] / [`Record`]: construction with defaults, parse, `to_bytes`
//! - [`types`]: the [`FieldType`] trait and built-in types (integers, padded text,
//!   byte blocks, padding, magic constants, arrays, optionals)
//!
//! Fields whose name starts with `_` are reserved: they are on the wire but not part
//! of a record's public fields.
//!
//! ## Example
//!
//! ```
//! use bytelayout::types::{self, TypeSpec};
//! use bytelayout::{Schema, Value};
//!
//! let mut b = Schema::builder("MyStructure");
//! b.field_with_default("magic", types::U32, Value::U32(0x11223344)).unwrap();
//! b.field("version", types::U32).unwrap();
//! b.field("name", TypeSpec::padded_string(32u8)).unwrap();
//! let length = b.field("length", types::U32).unwrap();
//! b.field("items", TypeSpec::padded_string(length)).unwrap();
//! let my_structure = b.build().unwrap();
//!
//! let rec = my_structure
//!     .record()
//!     .set("version", 1u32)
//!     .set("name", "hello")
//!     .set("length", 3u32)
//!     .set("items", "xyz")
//!     .build()
//!     .unwrap();
//! let bytes = rec.to_bytes().unwrap();
//! assert_eq!(bytes.len(), 47);
//!
//! let mut stream = std::io::Cursor::new(bytes);
//! assert_eq!(my_structure.parse(&mut stream).unwrap(), rec);
//! ```
//!
//! The crate logs through `tracing` (`debug` per record and schema, `trace` per field)
//! and never installs a subscriber.

pub mod codec;
pub mod context;
pub mod error;
pub mod expr;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;

pub use codec::Codec;
pub use context::{Endianness, ResolutionContext};
pub use error::{CodecError, SchemaError};
pub use expr::{BinaryOp, Placeholder, UnaryOp};
pub use record::{Record, RecordBuilder, RecordType};
pub use schema::{FieldDeclaration, Schema, SchemaBuilder, RESERVED_PREFIX};
pub use types::{BaseType, FieldType, TypeSpec};
pub use value::Value;
