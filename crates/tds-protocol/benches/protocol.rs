//! Benchmarks for TDS protocol encoding and decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use tds_protocol::{
    Charset, DecodeContext, Done, DoneKind, Login5, Login7, Message, MessageKind, PreLogin,
    TdsVersion, encode_language, encode_sql_batch,
    packet::{PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType},
};

/// Benchmark packet header encoding.
fn bench_packet_header_encode(c: &mut Criterion) {
    let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 512);

    c.bench_function("packet_header_encode", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
            header.encode(&mut buf);
            black_box(buf)
        })
    });
}

/// Benchmark packet header decoding.
fn bench_packet_header_decode(c: &mut Criterion) {
    let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 512);
    let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
    header.encode(&mut buf);
    let encoded = buf.freeze();

    c.bench_function("packet_header_decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(PacketHeader::decode(&mut cursor).unwrap())
        })
    });
}

/// Benchmark the two login records.
fn bench_login_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("login_encode");

    let login5 = Login5::new()
        .with_credentials("report", "VeryStr0ng!")
        .with_hostname("app-01")
        .with_app_name("rdbms-client")
        .with_server_name("db1")
        .with_charset(Charset::Utf8)
        .with_packet_size(4096);
    group.bench_function("tds5", |b| b.iter(|| black_box(login5.encode().unwrap())));

    let login7 = Login7::new()
        .with_tds_version(TdsVersion::V7_4)
        .with_sql_auth("report", "VeryStr0ng!")
        .with_database("reports")
        .with_hostname("app-01")
        .with_app_name("rdbms-client")
        .with_server_name("db1")
        .with_packet_size(4096);
    group.bench_function("tds7", |b| b.iter(|| black_box(login7.encode())));

    group.finish();
}

/// Benchmark the PreLogin exchange.
fn bench_prelogin(c: &mut Criterion) {
    let encoded = PreLogin::new().encode();

    c.bench_function("prelogin_encode", |b| {
        b.iter(|| black_box(PreLogin::new().encode()))
    });
    c.bench_function("prelogin_decode", |b| {
        b.iter(|| black_box(PreLogin::decode(encoded.clone()).unwrap()))
    });
}

/// Benchmark request encoding with various statement sizes.
fn bench_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");

    let statements = [
        ("simple", "select 1".to_string()),
        (
            "criteria",
            "select id, title, created_at from news where category_id = 12 \
             and title like '%release%' and (deleted_at is null or status in \
             ('draft', 'published')) order by created_at desc"
                .to_string(),
        ),
        ("large", format!("select * from news where id in ({})", {
            let ids: Vec<String> = (0..1000).map(|i| i.to_string()).collect();
            ids.join(", ")
        })),
    ];

    for (name, sql) in &statements {
        group.throughput(Throughput::Bytes(sql.len() as u64));
        group.bench_function(format!("language_{name}"), |b| {
            b.iter(|| black_box(encode_language(black_box(sql), Charset::Utf8)))
        });
        group.bench_function(format!("sql_batch_{name}"), |b| {
            b.iter(|| black_box(encode_sql_batch(black_box(sql), TdsVersion::V7_4)))
        });
    }

    group.finish();
}

/// Benchmark decoding of the tokens every response ends with.
fn bench_token_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_decode");

    // status COUNT, command 0xC1, 25 rows
    let done5 = Bytes::from_static(&[0x10, 0x00, 0xC1, 0x00, 25, 0, 0, 0]);
    group.bench_function("done_tds5", |b| {
        b.iter(|| {
            let mut src = done5.clone();
            black_box(Done::decode(&mut src, TdsVersion::V5_0, DoneKind::Done).unwrap())
        })
    });

    let done7 = Bytes::from_static(&[0x10, 0x00, 0xC1, 0x00, 25, 0, 0, 0, 0, 0, 0, 0]);
    group.bench_function("done_tds7", |b| {
        b.iter(|| {
            let mut src = done7.clone();
            black_box(Done::decode(&mut src, TdsVersion::V7_4, DoneKind::Done).unwrap())
        })
    });

    let ctx = DecodeContext::new(TdsVersion::V7_4, Charset::Utf8);
    let text: Vec<u8> = "Invalid object name 'nope'."
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    let mut error = Vec::new();
    error.extend_from_slice(&208i32.to_le_bytes());
    error.extend_from_slice(&[1, 16]);
    error.extend_from_slice(&((text.len() / 2) as u16).to_le_bytes());
    error.extend_from_slice(&text);
    error.extend_from_slice(&[3, b'd', 0, b'b', 0, b'1', 0]);
    error.push(0);
    error.extend_from_slice(&1u32.to_le_bytes());
    let error = Bytes::from(error);
    group.bench_function("error_tds7", |b| {
        b.iter(|| {
            let mut src = error.clone();
            black_box(Message::decode(&mut src, &ctx, MessageKind::Error).unwrap())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_packet_header_encode,
    bench_packet_header_decode,
    bench_login_encode,
    bench_prelogin,
    bench_request_encode,
    bench_token_decode,
);

criterion_main!(benches);
