#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rdbms_types::{Charset, decode_value};
use tds_protocol::{TdsVersion, TypeTable};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    sybase: bool,
    type_id: u8,
    /// Bytes following the type id in the column description.
    type_tail: Vec<u8>,
    data: Option<Vec<u8>>,
}

fuzz_target!(|input: FuzzInput| {
    let version = if input.sybase {
        TdsVersion::V5_0
    } else {
        TdsVersion::V7_4
    };
    let mut tail = input.type_tail.as_slice();
    let Ok(info) = TypeTable::for_version(version).decode_type_info(input.type_id, &mut tail) else {
        return;
    };
    let _ = decode_value(&info, input.data.as_deref(), Charset::Utf8);
});
