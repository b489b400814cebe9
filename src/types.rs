//! Field type descriptions: the [`FieldType`] capability and the built-in [`TypeSpec`] library.
//!
//! A type description knows how to read one field from a stream and write it back.
//! Sizes, counts and presence conditions are [`Placeholder`]s, so they can depend
//! on fields declared earlier in the same schema:
//!
//! ```
//! use bytelayout::types::{self, TypeSpec};
//! use bytelayout::Schema;
//!
//! let mut b = Schema::builder("Blob");
//! let len = b.field("len", types::U16).unwrap();
//! b.field("data", TypeSpec::bytes(len)).unwrap();
//! ```
//!
//! Custom types implement [`FieldType`] and are registered the same way.

use crate::context::{Endianness, ResolutionContext};
use crate::error::CodecError;
use crate::expr::Placeholder;
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Read;

/// Capability every field type provides: decode from a stream, encode into a buffer.
///
/// Both directions receive the context of the fields committed earlier in the pass.
pub trait FieldType: fmt::Debug + Send + Sync {
    fn decode(&self, r: &mut dyn Read, ctx: &ResolutionContext) -> Result<Value, CodecError>;

    fn encode(&self, value: &Value, ctx: &ResolutionContext, w: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Names of the fields this type reads while resolving its parameters.
    ///
    /// Types holding a [`Placeholder`] must return its [`Placeholder::references`] here.
    /// The declaration-time backward-reference check only sees what this returns; a
    /// missing name otherwise surfaces as [`CodecError::UnresolvedReference`] mid-parse.
    fn references(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Value used for a reserved field that was declared without a default.
    fn default_value(&self, _ctx: &ResolutionContext) -> Result<Value, CodecError> {
        Ok(Value::Padding)
    }

    /// Normalize a caller-supplied value to the representation `decode` produces.
    fn coerce(&self, value: Value) -> Result<Value, CodecError> {
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Bool,
    Float,
    Double,
}

impl BaseType {
    pub fn size(self) -> usize {
        match self {
            BaseType::U8 | BaseType::I8 | BaseType::Bool => 1,
            BaseType::U16 | BaseType::I16 => 2,
            BaseType::U32 | BaseType::I32 | BaseType::Float => 4,
            BaseType::U64 | BaseType::I64 | BaseType::Double => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            BaseType::U8 => "u8",
            BaseType::U16 => "u16",
            BaseType::U32 => "u32",
            BaseType::U64 => "u64",
            BaseType::I8 => "i8",
            BaseType::I16 => "i16",
            BaseType::I32 => "i32",
            BaseType::I64 => "i64",
            BaseType::Bool => "bool",
            BaseType::Float => "float",
            BaseType::Double => "double",
        }
    }

    fn zero(self) -> Value {
        match self {
            BaseType::U8 => Value::U8(0),
            BaseType::U16 => Value::U16(0),
            BaseType::U32 => Value::U32(0),
            BaseType::U64 => Value::U64(0),
            BaseType::I8 => Value::I8(0),
            BaseType::I16 => Value::I16(0),
            BaseType::I32 => Value::I32(0),
            BaseType::I64 => Value::I64(0),
            BaseType::Bool => Value::Bool(false),
            BaseType::Float => Value::Float(0.0),
            BaseType::Double => Value::Double(0.0),
        }
    }

    /// Convert any numeric value that fits into this type's variant.
    fn coerce(self, v: &Value) -> Result<Value, CodecError> {
        let mismatch = || CodecError::TypeMismatch { expected: self.name(), found: v.to_string() };
        let unsigned = || v.as_u64().filter(|_| v.is_integer()).ok_or_else(mismatch);
        let signed = || v.as_i64().filter(|_| v.is_integer()).ok_or_else(mismatch);
        Ok(match self {
            BaseType::U8 => Value::U8(u8::try_from(unsigned()?).map_err(|_| mismatch())?),
            BaseType::U16 => Value::U16(u16::try_from(unsigned()?).map_err(|_| mismatch())?),
            BaseType::U32 => Value::U32(u32::try_from(unsigned()?).map_err(|_| mismatch())?),
            BaseType::U64 => Value::U64(unsigned()?),
            BaseType::I8 => Value::I8(i8::try_from(signed()?).map_err(|_| mismatch())?),
            BaseType::I16 => Value::I16(i16::try_from(signed()?).map_err(|_| mismatch())?),
            BaseType::I32 => Value::I32(i32::try_from(signed()?).map_err(|_| mismatch())?),
            BaseType::I64 => Value::I64(signed()?),
            BaseType::Bool => Value::Bool(v.as_bool().ok_or_else(mismatch)?),
            BaseType::Float => match v {
                Value::Float(x) => Value::Float(*x),
                Value::Double(x) => Value::Float(*x as f32),
                _ => Value::Float(signed()? as f32),
            },
            BaseType::Double => match v {
                Value::Float(x) => Value::Double(*x as f64),
                Value::Double(x) => Value::Double(*x),
                _ => Value::Double(signed()? as f64),
            },
        })
    }

    fn decode<B: ByteOrder>(self, r: &mut dyn Read) -> Result<Value, CodecError> {
        Ok(match self {
            BaseType::U8 => Value::U8(r.read_u8()?),
            BaseType::U16 => Value::U16(r.read_u16::<B>()?),
            BaseType::U32 => Value::U32(r.read_u32::<B>()?),
            BaseType::U64 => Value::U64(r.read_u64::<B>()?),
            BaseType::I8 => Value::I8(r.read_i8()?),
            BaseType::I16 => Value::I16(r.read_i16::<B>()?),
            BaseType::I32 => Value::I32(r.read_i32::<B>()?),
            BaseType::I64 => Value::I64(r.read_i64::<B>()?),
            BaseType::Bool => Value::Bool(r.read_u8()? != 0),
            BaseType::Float => Value::Float(r.read_f32::<B>()?),
            BaseType::Double => Value::Double(r.read_f64::<B>()?),
        })
    }

    fn encode<B: ByteOrder>(self, w: &mut Vec<u8>, v: &Value) -> Result<(), CodecError> {
        match self.coerce(v)? {
            Value::U8(x) => w.write_u8(x)?,
            Value::U16(x) => w.write_u16::<B>(x)?,
            Value::U32(x) => w.write_u32::<B>(x)?,
            Value::U64(x) => w.write_u64::<B>(x)?,
            Value::I8(x) => w.write_i8(x)?,
            Value::I16(x) => w.write_i16::<B>(x)?,
            Value::I32(x) => w.write_i32::<B>(x)?,
            Value::I64(x) => w.write_i64::<B>(x)?,
            Value::Bool(b) => w.write_u8(b as u8)?,
            Value::Float(x) => w.write_f32::<B>(x)?,
            Value::Double(x) => w.write_f64::<B>(x)?,
            other => {
                return Err(CodecError::TypeMismatch { expected: self.name(), found: other.to_string() })
            }
        }
        Ok(())
    }
}

/// Built-in field types.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Base(BaseType),
    /// UTF-8 text stored in exactly `len` bytes, NUL padded.
    PaddedString(Placeholder),
    /// Raw bytes of exactly `len`.
    Bytes(Placeholder),
    /// `len` zero bytes; content is ignored on parse.
    Padding(Placeholder),
    /// Constant bytes; parse fails when the stream does not match.
    Magic(Vec<u8>),
    /// `count` consecutive elements.
    Array(Box<TypeSpec>, Placeholder),
    /// Element present only when the condition holds; a list of zero or one element.
    Optional(Placeholder, Box<TypeSpec>),
}

pub const U8: TypeSpec = TypeSpec::Base(BaseType::U8);
pub const U16: TypeSpec = TypeSpec::Base(BaseType::U16);
pub const U32: TypeSpec = TypeSpec::Base(BaseType::U32);
pub const U64: TypeSpec = TypeSpec::Base(BaseType::U64);
pub const I8: TypeSpec = TypeSpec::Base(BaseType::I8);
pub const I16: TypeSpec = TypeSpec::Base(BaseType::I16);
pub const I32: TypeSpec = TypeSpec::Base(BaseType::I32);
pub const I64: TypeSpec = TypeSpec::Base(BaseType::I64);
pub const BOOL: TypeSpec = TypeSpec::Base(BaseType::Bool);
pub const FLOAT: TypeSpec = TypeSpec::Base(BaseType::Float);
pub const DOUBLE: TypeSpec = TypeSpec::Base(BaseType::Double);

impl TypeSpec {
    pub fn padded_string(len: impl Into<Placeholder>) -> Self {
        TypeSpec::PaddedString(len.into())
    }

    pub fn bytes(len: impl Into<Placeholder>) -> Self {
        TypeSpec::Bytes(len.into())
    }

    pub fn padding(len: impl Into<Placeholder>) -> Self {
        TypeSpec::Padding(len.into())
    }

    pub fn magic(bytes: impl Into<Vec<u8>>) -> Self {
        TypeSpec::Magic(bytes.into())
    }

    pub fn array(elem: TypeSpec, count: impl Into<Placeholder>) -> Self {
        TypeSpec::Array(Box::new(elem), count.into())
    }

    pub fn optional(condition: impl Into<Placeholder>, elem: TypeSpec) -> Self {
        TypeSpec::Optional(condition.into(), Box::new(elem))
    }
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
fn read_exact_vec(r: &mut dyn Read, len: usize) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(len.min(4096));
    Read::take(&mut *r, len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

/// Arrays of elements that consume no input are capped at this many elements.
const MAX_EMPTY_ELEMENTS: usize = 4096;

/// Counts bytes pulled through the inner reader.
struct CountingReader<'a> {
    inner: &'a mut dyn Read,
    count: u64,
}

impl Read for CountingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Text ending in NUL cannot survive the padding strip on decode.
fn check_text(s: &str) -> Result<(), CodecError> {
    if s.ends_with('\0') {
        return Err(CodecError::Encode(format!("text {:?} ends with NUL", s)));
    }
    Ok(())
}

fn magic_value(expected: &[u8], value: &Value) -> Result<Value, CodecError> {
    match value {
        Value::Padding => Ok(Value::Bytes(expected.to_vec())),
        Value::Bytes(b) if b == expected => Ok(Value::Bytes(b.clone())),
        Value::Bytes(b) => Err(CodecError::Encode(format!(
            "magic mismatch: expected {}, found {}",
            Value::Bytes(expected.to_vec()),
            Value::Bytes(b.clone())
        ))),
        other => Err(CodecError::TypeMismatch { expected: "bytes", found: other.to_string() }),
    }
}

fn condition_holds(cond: &Placeholder, ctx: &ResolutionContext) -> Result<bool, CodecError> {
    let v = cond.resolve(ctx)?;
    v.as_bool()
        .ok_or_else(|| CodecError::InvalidExpression(format!("{} is not a condition ({})", cond, v)))
}

impl FieldType for TypeSpec {
    fn decode(&self, r: &mut dyn Read, ctx: &ResolutionContext) -> Result<Value, CodecError> {
        match self {
            TypeSpec::Base(bt) => match ctx.endianness() {
                Endianness::Big => bt.decode::<BigEndian>(r),
                Endianness::Little => bt.decode::<LittleEndian>(r),
            },
            TypeSpec::PaddedString(len) => {
                let n = len.resolve_usize(ctx)?;
                let mut buf = read_exact_vec(r, n)?;
                while buf.last() == Some(&0) {
                    buf.pop();
                }
                String::from_utf8(buf)
                    .map(Value::Text)
                    .map_err(|e| CodecError::Decode(format!("invalid UTF-8: {}", e)))
            }
            TypeSpec::Bytes(len) => {
                let n = len.resolve_usize(ctx)?;
                Ok(Value::Bytes(read_exact_vec(r, n)?))
            }
            TypeSpec::Padding(len) => {
                let n = len.resolve_usize(ctx)?;
                read_exact_vec(r, n)?;
                Ok(Value::Padding)
            }
            TypeSpec::Magic(expected) => {
                let buf = read_exact_vec(r, expected.len())?;
                if &buf != expected {
                    return Err(CodecError::Decode(format!(
                        "magic mismatch: expected {}, found {}",
                        Value::Bytes(expected.clone()),
                        Value::Bytes(buf)
                    )));
                }
                Ok(Value::Bytes(buf))
            }
            TypeSpec::Array(elem, count) => {
                let n = count.resolve_usize(ctx)?;
                let mut list = Vec::with_capacity(n.min(4096));
                let mut counted = CountingReader { inner: r, count: 0 };
                for _ in 0..n {
                    let before = counted.count;
                    list.push(elem.decode(&mut counted, ctx)?);
                    if counted.count == before && n > MAX_EMPTY_ELEMENTS {
                        return Err(CodecError::Decode(format!(
                            "array of {} elements that consume no input exceeds {}",
                            n, MAX_EMPTY_ELEMENTS
                        )));
                    }
                }
                Ok(Value::List(list))
            }
            TypeSpec::Optional(cond, elem) => {
                if condition_holds(cond, ctx)? {
                    Ok(Value::List(vec![elem.decode(r, ctx)?]))
                } else {
                    Ok(Value::List(vec![]))
                }
            }
        }
    }

    fn encode(&self, value: &Value, ctx: &ResolutionContext, w: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            TypeSpec::Base(bt) => match ctx.endianness() {
                Endianness::Big => bt.encode::<BigEndian>(w, value),
                Endianness::Little => bt.encode::<LittleEndian>(w, value),
            },
            TypeSpec::PaddedString(len) => {
                let n = len.resolve_usize(ctx)?;
                let s = value
                    .as_str()
                    .ok_or_else(|| CodecError::TypeMismatch { expected: "text", found: value.to_string() })?;
                check_text(s)?;
                if s.len() > n {
                    return Err(CodecError::Encode(format!("text of {} bytes exceeds length {}", s.len(), n)));
                }
                w.extend_from_slice(s.as_bytes());
                w.resize(w.len() + (n - s.len()), 0);
                Ok(())
            }
            TypeSpec::Bytes(len) => {
                let n = len.resolve_usize(ctx)?;
                let b = value
                    .as_bytes()
                    .ok_or_else(|| CodecError::TypeMismatch { expected: "bytes", found: value.to_string() })?;
                if b.len() != n {
                    return Err(CodecError::Encode(format!("expected {} bytes, found {}", n, b.len())));
                }
                w.extend_from_slice(b);
                Ok(())
            }
            TypeSpec::Padding(len) => {
                if *value != Value::Padding {
                    return Err(CodecError::TypeMismatch { expected: "padding", found: value.to_string() });
                }
                let n = len.resolve_usize(ctx)?;
                w.resize(w.len() + n, 0);
                Ok(())
            }
            TypeSpec::Magic(expected) => {
                magic_value(expected, value)?;
                w.extend_from_slice(expected);
                Ok(())
            }
            TypeSpec::Array(elem, count) => {
                let n = count.resolve_usize(ctx)?;
                let items = value
                    .as_list()
                    .ok_or_else(|| CodecError::TypeMismatch { expected: "list", found: value.to_string() })?;
                if items.len() != n {
                    return Err(CodecError::Encode(format!("expected {} elements, found {}", n, items.len())));
                }
                for item in items {
                    elem.encode(item, ctx, w)?;
                }
                Ok(())
            }
            TypeSpec::Optional(cond, elem) => {
                let items = value
                    .as_list()
                    .ok_or_else(|| CodecError::TypeMismatch { expected: "list", found: value.to_string() })?;
                match (condition_holds(cond, ctx)?, items) {
                    (true, [item]) => elem.encode(item, ctx, w),
                    (false, []) => Ok(()),
                    (present, _) => Err(CodecError::Encode(format!(
                        "optional has {} element(s) but condition {} is {}",
                        items.len(),
                        cond,
                        present
                    ))),
                }
            }
        }
    }

    fn references(&self) -> Vec<&str> {
        match self {
            TypeSpec::Base(_) | TypeSpec::Magic(_) => Vec::new(),
            TypeSpec::PaddedString(len) | TypeSpec::Bytes(len) | TypeSpec::Padding(len) => len.references(),
            TypeSpec::Array(elem, count) => {
                let mut out = count.references();
                for name in elem.references() {
                    if !out.contains(&name) {
                        out.push(name);
                    }
                }
                out
            }
            TypeSpec::Optional(cond, elem) => {
                let mut out = cond.references();
                for name in elem.references() {
                    if !out.contains(&name) {
                        out.push(name);
                    }
                }
                out
            }
        }
    }

    fn default_value(&self, ctx: &ResolutionContext) -> Result<Value, CodecError> {
        match self {
            TypeSpec::Base(bt) => Ok(bt.zero()),
            TypeSpec::PaddedString(_) => Ok(Value::Text(String::new())),
            TypeSpec::Bytes(len) => Ok(Value::Bytes(vec![0; len.resolve_usize(ctx)?])),
            TypeSpec::Padding(_) => Ok(Value::Padding),
            TypeSpec::Magic(expected) => Ok(Value::Bytes(expected.clone())),
            TypeSpec::Array(elem, count) => {
                let n = count.resolve_usize(ctx)?;
                (0..n).map(|_| elem.default_value(ctx)).collect::<Result<Vec<_>, _>>().map(Value::List)
            }
            TypeSpec::Optional(cond, elem) => {
                if condition_holds(cond, ctx)? {
                    Ok(Value::List(vec![elem.default_value(ctx)?]))
                } else {
                    Ok(Value::List(vec![]))
                }
            }
        }
    }

    fn coerce(&self, value: Value) -> Result<Value, CodecError> {
        match (self, value) {
            (TypeSpec::Base(bt), v) => bt.coerce(&v),
            (TypeSpec::Array(elem, _) | TypeSpec::Optional(_, elem), Value::List(items)) => items
                .into_iter()
                .map(|item| elem.coerce(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (TypeSpec::PaddedString(_), Value::Text(s)) => {
                check_text(&s)?;
                Ok(Value::Text(s))
            }
            (TypeSpec::PaddedString(_), v) => Err(CodecError::TypeMismatch { expected: "text", found: v.to_string() }),
            (TypeSpec::Padding(_), Value::Padding) => Ok(Value::Padding),
            (TypeSpec::Padding(_), v) => Err(CodecError::TypeMismatch { expected: "padding", found: v.to_string() }),
            (TypeSpec::Magic(expected), v) => magic_value(expected, &v),
            (_, v) => Ok(v),
        }
    }
}
