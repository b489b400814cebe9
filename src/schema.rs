//! Schema declaration: an ordered list of named, typed fields.
//!
//! Fields are registered one at a time through [`SchemaBuilder`]. Each registration
//! returns a [`Placeholder`] naming the new field, which later registrations use in
//! their type descriptions (sizes, counts, conditions). A type description may only
//! mention fields declared before it; anything else is rejected on the spot with
//! [`SchemaError::UnresolvedReference`].
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
//! assert_eq!(my_structure.schema().fields().len(), 5);
//! ```
//!
//! Names starting with [`RESERVED_PREFIX`] are reserved: they are on the wire and
//! visible to later type descriptions, but not part of a record's public fields.

use crate::codec::Codec;
use crate::context::Endianness;
use crate::error::SchemaError;
use crate::expr::Placeholder;
use crate::record::RecordType;
use crate::types::FieldType;
use crate::value::Value;
use std::sync::Arc;
use tracing::{trace, warn};

/// Leading character of reserved field names (padding, magic, spare words).
pub const RESERVED_PREFIX: char = '_';

/// One named, typed slot of a schema.
#[derive(Debug, Clone)]
pub struct FieldDeclaration {
    pub name: String,
    pub ty: Arc<dyn FieldType>,
    pub default: Option<Value>,
}

impl FieldDeclaration {
    pub fn new(name: impl Into<String>, ty: impl FieldType + 'static, default: Option<Value>) -> Self {
        FieldDeclaration { name: name.into(), ty: Arc::new(ty), default }
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved(&self.name)
    }
}

pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Ordered field declarations plus the byte order used for every field.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    endianness: Endianness,
    fields: Vec<FieldDeclaration>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema { name: name.into(), endianness: Endianness::default(), fields: Vec::new() },
        }
    }

    /// Assemble a schema from declarations made elsewhere. Nothing is checked until
    /// [`Codec::compile`].
    pub fn from_fields(name: impl Into<String>, endianness: Endianness, fields: Vec<FieldDeclaration>) -> Self {
        Schema { name: name.into(), endianness, fields }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn fields(&self) -> &[FieldDeclaration] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDeclaration> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Check name uniqueness and that every field only refers backwards.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (i, f) in self.fields.iter().enumerate() {
            check_name(&f.name)?;
            if self.fields[..i].iter().any(|prev| prev.name == f.name) {
                return Err(SchemaError::DuplicateField(f.name.clone()));
            }
            check_references(f.ty.as_ref(), &self.fields[..i])?;
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn check_references(ty: &dyn FieldType, earlier: &[FieldDeclaration]) -> Result<(), SchemaError> {
    for name in ty.references() {
        if !earlier.iter().any(|f| f.name == name) {
            return Err(SchemaError::UnresolvedReference(name.to_string()));
        }
    }
    Ok(())
}

fn coerce_default(name: &str, ty: &dyn FieldType, default: Option<Value>) -> Result<Option<Value>, SchemaError> {
    default
        .map(|v| ty.coerce(v))
        .transpose()
        .map_err(|e| SchemaError::InvalidDefault { field: name.to_string(), reason: e.to_string() })
}

/// Collects field declarations in source order.
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn endianness(&mut self, endianness: Endianness) -> &mut Self {
        self.schema.endianness = endianness;
        self
    }

    /// Declare a required field and get a handle for later type descriptions.
    pub fn field(&mut self, name: &str, ty: impl FieldType + 'static) -> Result<Placeholder, SchemaError> {
        self.declare(name, Arc::new(ty), None)
    }

    /// Declare a field that falls back to `default` when a record omits it.
    pub fn field_with_default(
        &mut self,
        name: &str,
        ty: impl FieldType + 'static,
        default: impl Into<Value>,
    ) -> Result<Placeholder, SchemaError> {
        self.declare(name, Arc::new(ty), Some(default.into()))
    }

    fn declare(
        &mut self,
        name: &str,
        ty: Arc<dyn FieldType>,
        default: Option<Value>,
    ) -> Result<Placeholder, SchemaError> {
        check_name(name)?;
        if self.schema.position(name).is_some() {
            return Err(SchemaError::DuplicateField(name.to_string()));
        }
        check_references(ty.as_ref(), &self.schema.fields)?;
        let default = coerce_default(name, ty.as_ref(), default)?;
        trace!(schema = %self.schema.name, field = name, ?ty, "field declared");
        self.schema.fields.push(FieldDeclaration { name: name.to_string(), ty, default });
        Ok(Placeholder::field(name))
    }

    /// Handle for a field that is already declared.
    pub fn this(&self, name: &str) -> Result<Placeholder, SchemaError> {
        match self.schema.position(name) {
            Some(_) => Ok(Placeholder::field(name)),
            None => Err(SchemaError::UnresolvedReference(name.to_string())),
        }
    }

    /// Replace an existing declaration, keeping its position.
    ///
    /// The new type may only refer to fields declared before that position.
    pub fn redeclare(
        &mut self,
        name: &str,
        ty: impl FieldType + 'static,
        default: Option<Value>,
    ) -> Result<Placeholder, SchemaError> {
        let pos = self
            .schema
            .position(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))?;
        let ty: Arc<dyn FieldType> = Arc::new(ty);
        check_references(ty.as_ref(), &self.schema.fields[..pos])?;
        let default = coerce_default(name, ty.as_ref(), default)?;
        warn!(schema = %self.schema.name, field = name, position = pos, "field redeclared in place");
        self.schema.fields[pos] = FieldDeclaration { name: name.to_string(), ty, default };
        Ok(Placeholder::field(name))
    }

    /// Stop collecting and return the schema without compiling it.
    pub fn finish(self) -> Schema {
        self.schema
    }

    /// Compile the collected fields into a reusable record type.
    pub fn build(self) -> Result<RecordType, SchemaError> {
        Ok(RecordType::new(Codec::compile(self.finish())?))
    }
}
