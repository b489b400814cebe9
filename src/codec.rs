//! Compiled schema: sequential parse and build over the declared fields.
//!
//! Both directions walk the fields in declaration order and thread a
//! [`ResolutionContext`] holding the fields already handled, so a field's
//! type description sees exactly the same earlier values on parse and on build.
//! The codec adds no framing: the encoding of a record is the concatenation of
//! its fields' encodings.

use crate::context::ResolutionContext;
use crate::error::{CodecError, SchemaError};
use crate::schema::Schema;
use crate::value::Value;
use std::io::{Cursor, Read};
use tracing::{debug, trace};

/// Immutable, shareable parse/build engine for one schema.
#[derive(Debug)]
pub struct Codec {
    schema: Schema,
}

impl Codec {
    /// Validate `schema` (unique names, backward-only references) and compile it.
    pub fn compile(schema: Schema) -> Result<Self, SchemaError> {
        schema.validate()?;
        debug!(
            schema = %schema.name(),
            fields = schema.fields().len(),
            endianness = ?schema.endianness(),
            "schema compiled"
        );
        Ok(Codec { schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parse one record's field values, in declaration order, from `r`.
    pub fn decode<R: Read>(&self, r: &mut R) -> Result<Vec<Value>, CodecError> {
        let fields = self.schema.fields();
        let mut ctx = ResolutionContext::with_capacity(self.schema.endianness(), fields.len());
        for f in fields {
            let v = f.ty.decode(&mut *r, &ctx).map_err(|e| e.in_field(&f.name))?;
            trace!(field = %f.name, value = %v, "field decoded");
            ctx.set(f.name.as_str(), v);
        }
        Ok(ctx.into_values())
    }

    /// Parse from a byte slice. Returns the values and the number of bytes consumed.
    pub fn decode_slice(&self, bytes: &[u8]) -> Result<(Vec<Value>, usize), CodecError> {
        let mut cursor = Cursor::new(bytes);
        let values = self.decode(&mut cursor)?;
        Ok((values, cursor.position() as usize))
    }

    /// Append the encoding of `values` (one per field, declaration order) to `w`.
    pub fn encode(&self, values: &[Value], w: &mut Vec<u8>) -> Result<(), CodecError> {
        let fields = self.schema.fields();
        if values.len() != fields.len() {
            return Err(CodecError::Encode(format!(
                "{} has {} fields, got {} values",
                self.schema.name(),
                fields.len(),
                values.len()
            )));
        }
        let mut ctx = ResolutionContext::with_capacity(self.schema.endianness(), fields.len());
        for (f, v) in fields.iter().zip(values) {
            let start = w.len();
            f.ty.encode(v, &ctx, w).map_err(|e| e.in_field(&f.name))?;
            trace!(field = %f.name, bytes = w.len() - start, "field encoded");
            ctx.set(f.name.as_str(), v.clone());
        }
        Ok(())
    }

    pub fn encode_to_vec(&self, values: &[Value]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode(values, &mut out)?;
        Ok(out)
    }
}
