#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tds_protocol::PreLogin;

fuzz_target!(|data: &[u8]| {
    // server-controlled bytes read before login
    let _ = PreLogin::decode(Bytes::copy_from_slice(data));
});
