#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tds_protocol::{Charset, DecodeContext, EnvChange, TdsVersion};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let version = if selector & 1 == 0 {
        TdsVersion::V5_0
    } else {
        TdsVersion::V7_4
    };
    let ctx = DecodeContext::new(version, Charset::Utf8);
    let mut bytes = Bytes::copy_from_slice(body);
    if let Ok(changes) = EnvChange::decode_all(&mut bytes, &ctx) {
        for change in &changes {
            let _ = change.packet_size();
        }
    }
});
