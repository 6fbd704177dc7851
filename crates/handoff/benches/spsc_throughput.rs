use criterion::{Criterion, black_box, criterion_group, criterion_main};
use handoff::SpscRing;
use std::sync::Arc;
use std::thread;

fn benchmark_push_pop(c: &mut Criterion) {
    let ring = SpscRing::with_capacity(64);

    c.bench_function("spsc_push_pop", |b| {
        b.iter(|| {
            ring.push(black_box(0xDEAD_BEEFusize)).unwrap();
            black_box(ring.pop());
        })
    });
}

fn benchmark_cross_thread(c: &mut Criterion) {
    c.bench_function("spsc_cross_thread_10k", |b| {
        b.iter(|| {
            const ITEMS: usize = 10_000;
            let ring = Arc::new(SpscRing::with_capacity(32));

            let producer = {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for i in 0..ITEMS {
                        let mut value = i;
                        while let Err(back) = ring.push(value) {
                            value = back;
                            std::hint::spin_loop();
                        }
                    }
                })
            };

            let mut received = 0;
            while received < ITEMS {
                if ring.pop().is_some() {
                    received += 1;
                } else {
                    std::hint::spin_loop();
                }
            }

            producer.join().unwrap();
        })
    });
}

criterion_group!(benches, benchmark_push_pop, benchmark_cross_thread);
criterion_main!(benches);
