//! Integration tests: build records, serialize, parse back from streams.

use bytelayout::types::{self, TypeSpec};
use bytelayout::{CodecError, Endianness, Placeholder, RecordType, Schema, SchemaError, Value};
use proptest::prelude::*;
use std::io::{Cursor, Read, Seek, SeekFrom};

fn my_structure() -> RecordType {
    let mut b = Schema::builder("MyStructure");
    b.field_with_default("magic", types::U32, Value::U32(0x11223344)).expect("magic");
    b.field("version", types::U32).expect("version");
    b.field("name", TypeSpec::padded_string(32u8)).expect("name");
    let length = b.field("length", types::U32).expect("length");
    b.field("items", TypeSpec::padded_string(length)).expect("items");
    b.build().expect("build")
}

fn sample(ty: &RecordType) -> bytelayout::Record {
    ty.record()
        .set("version", 1u32)
        .set("name", "hello")
        .set("length", 3u32)
        .set("items", "xyz")
        .build()
        .expect("record")
}

#[test]
fn test_basic_roundtrip() {
    let ty = my_structure();
    let old = sample(&ty);

    let mut buf = Cursor::new(Vec::new());
    let written = old.write_to(&mut buf).expect("write");
    assert_eq!(written, 4 + 4 + 32 + 4 + 3);
    buf.seek(SeekFrom::Start(0)).expect("seek");

    let new = ty.parse(&mut buf).expect("parse");
    assert_eq!(old, new);
    let mut rest = Vec::new();
    buf.read_to_end(&mut rest).expect("read rest");
    assert!(rest.is_empty());
}

#[test]
fn test_exact_layout() {
    let ty = my_structure();
    let bytes = sample(&ty).to_bytes().expect("encode");
    assert_eq!(bytes.len(), 47);
    assert_eq!(&bytes[0..4], &[0x44, 0x33, 0x22, 0x11]);
    assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
    assert_eq!(&bytes[8..13], b"hello");
    assert!(bytes[13..40].iter().all(|&b| b == 0));
    assert_eq!(&bytes[40..44], &[3, 0, 0, 0]);
    assert_eq!(&bytes[44..], b"xyz");
}

#[test]
fn test_parsed_values() {
    let ty = my_structure();
    let bytes = sample(&ty).to_bytes().expect("encode");
    let (rec, consumed) = ty.parse_slice(&bytes).expect("parse");
    assert_eq!(consumed, 47);
    assert_eq!(rec.get("magic"), Some(&Value::U32(0x11223344)));
    assert_eq!(rec.get("version").and_then(Value::as_u64), Some(1));
    assert_eq!(rec.get("name").and_then(Value::as_str), Some("hello"));
    assert_eq!(rec.get("items").and_then(Value::as_str), Some("xyz"));
    assert_eq!(
        rec.to_string(),
        r#"MyStructure(magic=287454020, version=1, name="hello", length=3, items="xyz")"#
    );
}

#[test]
fn test_truncated_input() {
    let ty = my_structure();
    let bytes = sample(&ty).to_bytes().expect("encode");
    for cut in 0..bytes.len() {
        match ty.parse(&mut Cursor::new(&bytes[..cut])) {
            Err(CodecError::TruncatedInput { .. }) => {}
            other => panic!("prefix of {} bytes: expected TruncatedInput, got {:?}", cut, other),
        }
    }
}

#[test]
fn test_truncation_reports_field() {
    let ty = my_structure();
    let bytes = sample(&ty).to_bytes().expect("encode");
    match ty.parse_slice(&bytes[..45]) {
        Err(CodecError::TruncatedInput { field }) => assert_eq!(field, "items"),
        other => panic!("expected TruncatedInput, got {:?}", other),
    }
}

#[test]
fn test_declaration_order_determinism() {
    let a = sample(&my_structure()).to_bytes().expect("encode");
    let b = sample(&my_structure()).to_bytes().expect("encode");
    assert_eq!(a, b);
}

fn with_reserved() -> RecordType {
    let mut b = Schema::builder("Tagged");
    b.field("id", types::U16).expect("id");
    b.field_with_default("_reserved", types::U16, 0xbeefu32).expect("_reserved");
    let n = b.field("n", types::U8).expect("n");
    b.field("_pad", TypeSpec::padding(n.clone())).expect("_pad");
    b.field("data", TypeSpec::bytes(n)).expect("data");
    b.build().expect("build")
}

#[test]
fn test_reserved_fields_excluded_from_public_surface() {
    let ty = with_reserved();
    let bytes = [0x01, 0x00, 0x02, 0x01, 0x02, 0x00, 0x00, 0xaa, 0xbb];
    let (rec, consumed) = ty.parse_slice(&bytes).expect("parse");
    assert_eq!(consumed, bytes.len());

    let names: Vec<_> = rec.fields().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["id", "n", "data"]);
    assert_eq!(rec.get("_reserved"), None);
    assert_eq!(rec.reserved("_reserved"), Some(&Value::U16(0x0102)));
    assert_eq!(rec.get("data"), Some(&Value::Bytes(vec![0xaa, 0xbb])));

    // The reserved word is re-emitted in place; padding comes back zeroed.
    assert_eq!(rec.to_bytes().expect("encode"), bytes.to_vec());
}

#[test]
fn test_reserved_fields_use_defaults_on_construction() {
    let ty = with_reserved();
    let rec = ty
        .record()
        .set("id", 7u16)
        .set("n", 1u8)
        .set("data", vec![0x55u8])
        .build()
        .expect("record");
    let bytes = rec.to_bytes().expect("encode");
    assert_eq!(bytes, vec![7, 0, 0xef, 0xbe, 1, 0, 0x55]);
    let (parsed, _) = ty.parse_slice(&bytes).expect("parse");
    assert_eq!(parsed, rec);
}

#[test]
fn test_derived_size_expression() {
    let mut b = Schema::builder("Image");
    b.endianness(Endianness::Big);
    let width = b.field("width", types::U16).expect("width");
    let height = b.field("height", types::U16).expect("height");
    b.field("pixels", TypeSpec::bytes(width.mul(height))).expect("pixels");
    let ty = b.build().expect("build");

    let rec = ty
        .record()
        .set("width", 3u16)
        .set("height", 2u16)
        .set("pixels", vec![1u8, 2, 3, 4, 5, 6])
        .build()
        .expect("record");
    let bytes = rec.to_bytes().expect("encode");
    assert_eq!(bytes, vec![0, 3, 0, 2, 1, 2, 3, 4, 5, 6]);
    assert_eq!(ty.parse(&mut Cursor::new(bytes)).expect("parse"), rec);
}

#[test]
fn test_conditional_field() {
    let mut b = Schema::builder("Optional");
    let has_crc = b.field("has_crc", types::BOOL).expect("has_crc");
    b.field("body", types::U8).expect("body");
    b.field("crc", TypeSpec::optional(has_crc, types::U32)).expect("crc");
    let ty = b.build().expect("build");

    let with = ty
        .record()
        .set("has_crc", true)
        .set("body", 1u8)
        .set("crc", Value::List(vec![Value::U32(0xdeadbeef)]))
        .build()
        .expect("record");
    let without = ty
        .record()
        .set("has_crc", false)
        .set("body", 1u8)
        .set("crc", Value::List(vec![]))
        .build()
        .expect("record");

    let a = with.to_bytes().expect("encode");
    let b = without.to_bytes().expect("encode");
    assert_eq!(a.len(), 6);
    assert_eq!(b.len(), 2);
    assert_eq!(ty.parse_slice(&a).expect("parse").0, with);
    assert_eq!(ty.parse_slice(&b).expect("parse").0, without);
}

#[test]
fn test_counted_array() {
    let mut b = Schema::builder("Samples");
    let count = b.field("count", types::U8).expect("count");
    b.field("samples", TypeSpec::array(types::I16, count)).expect("samples");
    let ty = b.build().expect("build");

    let rec = ty
        .new_record([
            ("count", Value::U8(3)),
            ("samples", Value::List(vec![Value::I16(-1), Value::I16(0), Value::I16(300)])),
        ])
        .expect("record");
    let bytes = rec.to_bytes().expect("encode");
    assert_eq!(bytes.len(), 1 + 3 * 2);
    assert_eq!(ty.parse_slice(&bytes).expect("parse").0, rec);
}

#[test]
fn test_magic_mismatch_is_decode_error() {
    let mut b = Schema::builder("Framed");
    b.field("_magic", TypeSpec::magic(*b"FRM1")).expect("_magic");
    b.field("v", types::U8).expect("v");
    let ty = b.build().expect("build");

    let rec = ty.record().set("v", 5u8).build().expect("record");
    assert_eq!(rec.to_bytes().expect("encode"), b"FRM1\x05".to_vec());

    let err = ty.parse_slice(b"FRM2\x05").unwrap_err();
    assert!(matches!(&err, CodecError::Field { field, .. } if field == "_magic"));
    assert!(matches!(err.root(), CodecError::Decode(_)));
}

#[test]
fn test_constant_fields_reject_other_values() {
    let mut b = Schema::builder("Tagged");
    b.field("tag", TypeSpec::magic(*b"AB")).expect("tag");
    b.field("pad", TypeSpec::padding(2u8)).expect("pad");
    let ty = b.build().expect("build");

    let err = ty.record().set("tag", b"XY".to_vec()).build().unwrap_err();
    assert!(matches!(&err, CodecError::Field { field, .. } if field == "tag"));
    assert!(matches!(err.root(), CodecError::Encode(_)));

    let err = ty.record().set("pad", 5u8).build().unwrap_err();
    assert!(matches!(err.root(), CodecError::TypeMismatch { expected: "padding", .. }));

    // Omitted constants come back as the decoder sees them.
    let rec = ty.record().set("tag", Value::Padding).set("pad", Value::Padding).build().expect("record");
    assert_eq!(rec.get("tag"), Some(&Value::Bytes(b"AB".to_vec())));
    let bytes = rec.to_bytes().expect("encode");
    assert_eq!(bytes, b"AB\0\0".to_vec());
    assert_eq!(ty.parse_slice(&bytes).expect("parse").0, rec);

    let mut b = Schema::builder("Reserved");
    let err = b
        .field_with_default("_m", TypeSpec::magic(*b"AB"), b"XX".to_vec())
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidDefault { field, .. } if field == "_m"));
}

#[test]
fn test_text_ending_in_nul_rejected() {
    let ty = my_structure();
    let err = ty
        .record()
        .set("version", 1u32)
        .set("name", "ab\0")
        .set("length", 3u32)
        .set("items", "xyz")
        .build()
        .unwrap_err();
    assert!(matches!(&err, CodecError::Field { field, .. } if field == "name"));
    assert!(matches!(err.root(), CodecError::Encode(_)));
}

#[test]
fn test_size_from_reserved_field() {
    let mut b = Schema::builder("Hidden");
    let len = b.field_with_default("_len", types::U16, 2u16).expect("_len");
    b.field("data", TypeSpec::bytes(len)).expect("data");
    let ty = b.build().expect("build");

    let bytes = [3, 0, 0xa, 0xb, 0xc];
    let (rec, consumed) = ty.parse_slice(&bytes).expect("parse");
    assert_eq!(consumed, bytes.len());
    assert_eq!(rec.get("_len"), None);
    assert_eq!(rec.reserved("_len"), Some(&Value::U16(3)));
    assert_eq!(rec.get("data"), Some(&Value::Bytes(vec![0xa, 0xb, 0xc])));
    assert_eq!(rec.to_bytes().expect("encode"), bytes.to_vec());

    let built = ty.record().set("data", vec![1u8, 2]).build().expect("record");
    let out = built.to_bytes().expect("encode");
    assert_eq!(out, vec![2, 0, 1, 2]);
    assert_eq!(ty.parse_slice(&out).expect("parse").0, built);

    let wrong = ty.record().set("data", vec![1u8]).build().expect("record");
    assert!(matches!(wrong.to_bytes().unwrap_err().root(), CodecError::Encode(_)));
}

#[test]
fn test_huge_count_of_empty_elements_rejected() {
    let mut b = Schema::builder("Names");
    let count = b.field("count", types::U32).expect("count");
    b.field("names", TypeSpec::array(TypeSpec::padded_string(0u8), count)).expect("names");
    let ty = b.build().expect("build");

    let err = ty.parse_slice(&20_000_000u32.to_le_bytes()).unwrap_err();
    assert!(matches!(&err, CodecError::Field { field, .. } if field == "names"));
    assert!(matches!(err.root(), CodecError::Decode(_)));
}

#[test]
fn test_length_mismatch_fails_build() {
    let ty = my_structure();
    let rec = ty
        .record()
        .set("version", 1u32)
        .set("name", "hello")
        .set("length", 2u32)
        .set("items", "xyz")
        .build()
        .expect("record");
    let err = rec.to_bytes().unwrap_err();
    assert!(matches!(err.root(), CodecError::Encode(_)));
}

#[test]
fn test_back_to_back_records() {
    let ty = my_structure();
    let first = sample(&ty);
    let mut second = sample(&ty);
    second.set("version", 2u32).expect("set");

    let mut stream = Vec::new();
    first.write_to(&mut stream).expect("write");
    second.write_to(&mut stream).expect("write");

    let mut r = Cursor::new(stream);
    assert_eq!(ty.parse(&mut r).expect("first"), first);
    assert_eq!(ty.parse(&mut r).expect("second"), second);
    assert_eq!(r.position() as usize, r.get_ref().len());
}

#[test]
fn test_file_transport() {
    let ty = my_structure();
    let rec = sample(&ty);
    let mut file = tempfile::tempfile().expect("tempfile");
    rec.write_to(&mut file).expect("write");
    file.seek(SeekFrom::Start(0)).expect("seek");
    assert_eq!(ty.parse(&mut file).expect("parse"), rec);
    let mut rest = Vec::new();
    file.read_to_end(&mut rest).expect("read rest");
    assert!(rest.is_empty());
}

#[test]
fn test_concurrent_parse() {
    let ty = my_structure();
    let bytes = sample(&ty).to_bytes().expect("encode");
    std::thread::scope(|s| {
        for version in 0..4u32 {
            let ty = ty.clone();
            let bytes = bytes.clone();
            s.spawn(move || {
                let mut rec = ty.parse_slice(&bytes).expect("parse").0;
                rec.set("version", version).expect("set");
                let again = rec.to_bytes().expect("encode");
                assert_eq!(ty.parse_slice(&again).expect("parse").0, rec);
            });
        }
    });
}

#[test]
fn test_placeholder_handles_are_plain_field_refs() {
    let mut b = Schema::builder("Refs");
    let n = b.field("n", types::U8).expect("n");
    assert_eq!(n, Placeholder::field("n"));
    b.field("twice", TypeSpec::bytes(n.mul(2u8))).expect("twice");
    let ty = b.build().expect("build");
    let (rec, consumed) = ty.parse_slice(&[2, 9, 9, 9, 9, 0xff]).expect("parse");
    assert_eq!(consumed, 5);
    assert_eq!(rec.get("twice"), Some(&Value::Bytes(vec![9; 4])));
}

proptest! {
    #[test]
    fn prop_roundtrip(version in any::<u32>(), name in "[a-zA-Z0-9 ]{0,32}", items in "[a-z]{0,64}") {
        let ty = my_structure();
        let rec = ty
            .record()
            .set("version", version)
            .set("name", name.as_str())
            .set("length", items.len() as u32)
            .set("items", items.as_str())
            .build()
            .expect("record");
        let bytes = rec.to_bytes().expect("encode");
        prop_assert_eq!(bytes.len(), 44 + items.len());
        let mut r = Cursor::new(bytes);
        let parsed = ty.parse(&mut r).expect("parse");
        prop_assert_eq!(&parsed, &rec);
        prop_assert_eq!(r.position() as usize, r.get_ref().len());
    }
}
