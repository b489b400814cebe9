//! Record types and instances: construction, parse and serialization.
//!
//! A [`RecordType`] is the reusable shape produced from a compiled schema. It builds
//! [`Record`]s either from caller-supplied field values (declared defaults fill the
//! gaps) or by parsing a stream.
//!
//! Reserved fields (names starting with `_`) are parsed, kept and re-serialized, but
//! are not part of the public surface: they cannot be supplied on construction and
//! are skipped by [`Record::get`], [`Record::fields`] and `Display`.

use crate::codec::Codec;
use crate::context::ResolutionContext;
use crate::error::CodecError;
use crate::schema::{is_reserved, Schema};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::debug;

/// Reusable record shape bound to a compiled [`Codec`]. Cheap to clone, shareable across threads.
#[derive(Debug, Clone)]
pub struct RecordType {
    codec: Arc<Codec>,
}

impl RecordType {
    pub fn new(codec: Codec) -> Self {
        RecordType { codec: Arc::new(codec) }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn schema(&self) -> &Schema {
        self.codec.schema()
    }

    pub fn name(&self) -> &str {
        self.schema().name()
    }

    /// Public field names in declaration order.
    pub fn public_fields(&self) -> impl Iterator<Item = &str> {
        self.schema().fields().iter().map(|f| f.name.as_str()).filter(|n| !is_reserved(n))
    }

    /// Construct a record from named values.
    ///
    /// Omitted fields take their declared default; a public field with neither fails
    /// with [`CodecError::MissingRequiredField`]. Reserved fields take their default,
    /// or the type's zero value when none was declared.
    pub fn new_record<I, K, V>(&self, fields: I) -> Result<Record, CodecError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let schema = self.schema();
        let mut supplied: HashMap<String, Value> = HashMap::new();
        for (k, v) in fields {
            let k = k.into();
            if is_reserved(&k) || schema.field(&k).is_none() {
                return Err(CodecError::UnknownField(k));
            }
            supplied.insert(k, v.into());
        }

        let mut ctx = ResolutionContext::with_capacity(schema.endianness(), schema.fields().len());
        for f in schema.fields() {
            let v = if f.is_reserved() {
                match &f.default {
                    Some(d) => d.clone(),
                    None => f.ty.default_value(&ctx).map_err(|e| e.in_field(&f.name))?,
                }
            } else if let Some(v) = supplied.remove(&f.name) {
                f.ty.coerce(v).map_err(|e| e.in_field(&f.name))?
            } else if let Some(d) = &f.default {
                d.clone()
            } else {
                return Err(CodecError::MissingRequiredField(f.name.clone()));
            };
            ctx.set(f.name.as_str(), v);
        }
        Ok(Record { ty: self.clone(), values: ctx.into_values() })
    }

    /// Fluent alternative to [`RecordType::new_record`].
    pub fn record(&self) -> RecordBuilder<'_> {
        RecordBuilder { ty: self, fields: Vec::new() }
    }

    /// Parse one record from `r`, consuming exactly its encoding.
    pub fn parse<R: Read>(&self, r: &mut R) -> Result<Record, CodecError> {
        let values = self.codec.decode(r)?;
        debug!(record = %self.name(), "record parsed");
        Ok(Record { ty: self.clone(), values })
    }

    /// Parse one record from the front of `bytes`; also returns the bytes consumed.
    pub fn parse_slice(&self, bytes: &[u8]) -> Result<(Record, usize), CodecError> {
        let (values, consumed) = self.codec.decode_slice(bytes)?;
        debug!(record = %self.name(), consumed, "record parsed");
        Ok((Record { ty: self.clone(), values }, consumed))
    }
}

/// Collects named values for [`RecordType::new_record`].
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    ty: &'a RecordType,
    fields: Vec<(String, Value)>,
}

impl RecordBuilder<'_> {
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Record, CodecError> {
        self.ty.new_record(self.fields)
    }
}

/// One record instance: a value per declared field, in declaration order.
#[derive(Clone)]
pub struct Record {
    ty: RecordType,
    values: Vec<Value>,
}

impl Record {
    pub fn record_type(&self) -> &RecordType {
        &self.ty
    }

    fn slot(&self, name: &str) -> Option<usize> {
        self.ty.schema().position(name)
    }

    /// Value of a public field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if is_reserved(name) {
            return None;
        }
        self.slot(name).map(|i| &self.values[i])
    }

    /// Value of a reserved field, as parsed or defaulted.
    pub fn reserved(&self, name: &str) -> Option<&Value> {
        if !is_reserved(name) {
            return None;
        }
        self.slot(name).map(|i| &self.values[i])
    }

    /// Replace a public field's value.
    ///
    /// Later reserved fields without a declared default whose type reads other fields
    /// (a spare block sized by a count, say) are recomputed from the updated values.
    /// On error the record is left unchanged.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), CodecError> {
        let schema = self.ty.schema();
        let i = self
            .slot(name)
            .filter(|_| !is_reserved(name))
            .ok_or_else(|| CodecError::UnknownField(name.to_string()))?;
        let updated = schema.fields()[i].ty.coerce(value.into()).map_err(|e| e.in_field(name))?;

        let mut ctx = ResolutionContext::with_capacity(schema.endianness(), self.values.len());
        for (j, (f, old)) in schema.fields().iter().zip(&self.values).enumerate() {
            let v = if j == i {
                updated.clone()
            } else if j > i && f.is_reserved() && f.default.is_none() && !f.ty.references().is_empty() {
                f.ty.default_value(&ctx).map_err(|e| e.in_field(&f.name))?
            } else {
                old.clone()
            };
            ctx.set(f.name.as_str(), v);
        }
        self.values = ctx.into_values();
        Ok(())
    }

    /// Public `(name, value)` pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.ty
            .schema()
            .fields()
            .iter()
            .zip(&self.values)
            .filter(|(f, _)| !f.is_reserved())
            .map(|(f, v)| (f.name.as_str(), v))
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        let Record { ty, values } = self;
        ty.schema()
            .fields()
            .iter()
            .zip(values)
            .filter(|(f, _)| !f.is_reserved())
            .map(|(f, v)| (f.name.clone(), v))
            .collect()
    }

    /// Serialize every field, reserved ones included, in declaration order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let out = self.ty.codec().encode_to_vec(&self.values)?;
        debug!(record = %self.ty.name(), bytes = out.len(), "record built");
        Ok(out)
    }

    /// Serialize straight into a writer with a single `write_all`. Returns the byte count.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<usize, CodecError> {
        let bytes = self.to_bytes()?;
        w.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        let a = self.ty.schema();
        let b = other.ty.schema();
        a.name() == b.name()
            && a.fields().len() == b.fields().len()
            && a.fields().iter().zip(b.fields()).all(|(x, y)| x.name == y.name)
            && self.values == other.values
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ty.name())?;
        for (i, (name, v)) in self.fields().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, v)?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.ty.name());
        for (name, v) in self.fields() {
            s.field(name, v);
        }
        s.finish()
    }
}
