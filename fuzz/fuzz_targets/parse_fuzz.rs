//! Parse fuzz target: feed arbitrary bytes to a schema whose sizes come from the input.
//! Parsing must not panic; when it succeeds, re-serializing must reproduce the consumed bytes
//! except for padding, which is always written as zeros.
//! Build with: cargo fuzz run parse_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use bytelayout::types::{self, TypeSpec};
#[cfg(fuzzing)]
use bytelayout::{RecordType, Schema};
#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fn schema() -> RecordType {
    let mut b = Schema::builder("Fuzz");
    let flags = b.field("flags", types::U8).expect("flags");
    let len = b.field("len", types::U16).expect("len");
    b.field("name", TypeSpec::padded_string(len.clone().rem(64u8))).expect("name");
    let count = b.field("count", types::U8).expect("count");
    b.field("values", TypeSpec::array(types::I16, count)).expect("values");
    b.field("extra", TypeSpec::optional(flags.rem(2u8).equals(1u8), types::U32)).expect("extra");
    b.field("blob", TypeSpec::bytes(len)).expect("blob");
    b.build().expect("build")
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let ty = schema();
    if let Ok((rec, consumed)) = ty.parse_slice(data) {
        let bytes = rec.to_bytes().expect("re-encode parsed record");
        assert_eq!(bytes.len(), consumed);
        let (again, _) = ty.parse_slice(&bytes).expect("re-parse");
        assert_eq!(again, rec);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parse_fuzz");
}
