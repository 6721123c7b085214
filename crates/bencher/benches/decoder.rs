use bencher::{Sample, SampleKind, samples};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_icap::codec::RequestDecoder;
use micro_icap::protocol::{Message, PayloadItem};
use std::hint::black_box;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Decodes one request from `bytes` and returns how many items came out.
fn decode_all(decoder: &mut RequestDecoder, bytes: &mut BytesMut) -> usize {
    let mut items = 0;
    loop {
        match decoder.decode(bytes).expect("sample should be a valid icap request") {
            Some(Message::Payload(PayloadItem::Eof | PayloadItem::Ieof)) => return items + 1,
            Some(message) => {
                black_box(message);
                items += 1;
            }
            None => return items,
        }
    }
}

fn bench_samples(criterion: &mut Criterion, group_name: &str, filter: impl Fn(&Sample) -> bool) {
    let mut group = criterion.benchmark_group(group_name);

    for sample in samples().into_iter().filter(|sample| filter(sample)) {
        group.throughput(Throughput::Bytes(sample.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sample.name()), &sample, |b, sample| {
            let mut decoder = RequestDecoder::new();
            b.iter_batched_ref(
                || BytesMut::from(sample.content()),
                |bytes_mut| black_box(decode_all(&mut decoder, bytes_mut)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_request_decoder(criterion: &mut Criterion) {
    bench_samples(criterion, "request_decoder", |sample| sample.kind() != SampleKind::LargeBody);
}

fn benchmark_large_body_decoder(criterion: &mut Criterion) {
    bench_samples(criterion, "large_body_decoder", |sample| sample.kind() == SampleKind::LargeBody);
}

criterion_group!(decoder, benchmark_request_decoder, benchmark_large_body_decoder);
criterion_main!(decoder);
