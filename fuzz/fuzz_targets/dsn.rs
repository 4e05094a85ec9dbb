#![no_main]

use libfuzzer_sys::fuzz_target;
use rdbms_client::{ConnectionOptions, Dsn};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(dsn) = Dsn::parse(s) else {
        return;
    };
    // display output must parse back to the same DSN
    let reparsed = Dsn::parse(&dsn.to_string()).expect("displayed DSN parses");
    assert_eq!(reparsed, dsn);
    assert!(dsn.without_password().password().is_none());
    let _ = ConnectionOptions::from_dsn(&dsn);
});
