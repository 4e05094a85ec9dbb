//! Benchmarks for the resumable token tokenizer.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{BufMut, BytesMut};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tds_codec::Tokenizer;
use tds_protocol::codec::{write_b_varchar, write_utf16_string};
use tds_protocol::token::{Done, DoneKind, DoneStatus};
use tds_protocol::{Charset, TdsVersion};
use tokio_util::codec::Decoder;

/// COLMETADATA for `id int, title nvarchar(50)`, `rows` ROW tokens and the
/// final DONE.
fn v7_rows(rows: u32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(0x81);
    buf.put_u16_le(2);
    buf.put_u32_le(0);
    buf.put_u16_le(0x0000);
    buf.put_u8(0x38);
    write_b_varchar(&mut buf, "id");
    buf.put_u32_le(0);
    buf.put_u16_le(0x0001);
    buf.put_u8(0xE7);
    buf.put_u16_le(100);
    buf.put_slice(&[0x09, 0x04, 0xD0, 0x00, 0x34]);
    write_b_varchar(&mut buf, "title");

    for id in 0..rows {
        let mut title = BytesMut::new();
        write_utf16_string(&mut title, &format!("headline number {id}"));
        buf.put_u8(0xD1);
        buf.put_u32_le(id);
        buf.put_u16_le(title.len() as u16);
        buf.put_slice(&title);
    }

    buf.put_u8(0xFD);
    Done {
        kind: DoneKind::Done,
        status: DoneStatus::COUNT,
        cur_cmd: 0xC1,
        row_count: u64::from(rows),
    }
    .encode(&mut buf, TdsVersion::V7_4);
    buf.to_vec()
}

fn tokenize(stream: &[u8], chunk: usize) -> usize {
    let mut tokenizer = Tokenizer::new(TdsVersion::V7_4, Charset::Utf8);
    let mut buf = BytesMut::with_capacity(chunk);
    let mut tokens = 0;
    for piece in stream.chunks(chunk) {
        buf.extend_from_slice(piece);
        while let Some(token) = tokenizer.decode(&mut buf).unwrap() {
            black_box(token);
            tokens += 1;
        }
    }
    tokens
}

fn bench_tokenizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer");
    let stream = v7_rows(1000);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    // whole buffer, a typical packet payload and a pathological split
    for chunk in [stream.len(), 4088, 7] {
        group.bench_with_input(BenchmarkId::new("v7_rows", chunk), &chunk, |b, &chunk| {
            b.iter(|| tokenize(black_box(&stream), chunk))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tokenizer);
criterion_main!(benches);
