use criterion::{criterion_group, criterion_main, Criterion};
use serial_overlapped::rfc2217::{encode, BaudrateControlCmd, ControlCmd, SignatureControlCmd};
use serial_overlapped::settings::{FlowControl, Parity, SerialPortSettings};
use serial_overlapped::Dcb;
use std::hint::black_box;
use std::time::Duration;

pub fn bench_encode(c: &mut Criterion) {
    let baudrate: &dyn ControlCmd = &BaudrateControlCmd::new(115200);
    let signature: &dyn ControlCmd = &SignatureControlCmd::new("serial-overlapped bench");

    c.bench_function("encode_set_baudrate", |b| {
        b.iter(|| black_box(encode(Some(black_box(baudrate))).unwrap()))
    });
    c.bench_function("encode_signature", |b| {
        b.iter(|| black_box(encode(Some(black_box(signature))).unwrap()))
    });
}

pub fn bench_dcb_mapping(c: &mut Criterion) {
    let settings = SerialPortSettings::builder(115200)
        .parity(Parity::Even)
        .flow_control(FlowControl::RtsCtsInOut)
        .build()
        .unwrap();

    c.bench_function("dcb_from_settings", |b| {
        b.iter(|| black_box(Dcb::from_settings(black_box(&settings))))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_encode, bench_dcb_mapping
}
criterion_main!(benches);
