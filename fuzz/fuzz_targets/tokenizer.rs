#![no_main]

use arbitrary::Arbitrary;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tds_codec::Tokenizer;
use tds_protocol::{Charset, TdsVersion};
use tokio_util::codec::Decoder;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    sybase: bool,
    /// Sizes of the slices the stream arrives in.
    chunks: Vec<u8>,
    data: Vec<u8>,
}

fn run(version: TdsVersion, data: &[u8], chunks: &[u8]) -> Vec<String> {
    let mut tokenizer = Tokenizer::new(version, Charset::Utf8);
    let mut buf = BytesMut::new();
    let mut tokens = Vec::new();
    let mut rest = data;
    let mut sizes = chunks.iter().copied().cycle();

    while !rest.is_empty() {
        let size = usize::from(sizes.next().unwrap_or(u8::MAX)).clamp(1, rest.len());
        let (chunk, tail) = rest.split_at(size);
        rest = tail;
        buf.extend_from_slice(chunk);
        loop {
            match tokenizer.decode(&mut buf) {
                Ok(Some(token)) => tokens.push(format!("{token:?}")),
                Ok(None) => break,
                Err(e) => {
                    tokens.push(format!("error: {e}"));
                    return tokens;
                }
            }
        }
    }
    tokens
}

fuzz_target!(|input: FuzzInput| {
    let version = if input.sybase {
        TdsVersion::V5_0
    } else {
        TdsVersion::V7_4
    };
    // chunk boundaries must not change what is decoded
    let whole = run(version, &input.data, &[]);
    let chunked = run(version, &input.data, &input.chunks);
    assert_eq!(whole, chunked);
});
