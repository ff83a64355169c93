// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use understory_delegate::adapters::memory::{MemoryTree, NodeId, RecordingSource};
use understory_delegate::dispatcher::Dispatcher;
use understory_delegate::limiter::Delay;
use understory_delegate::registry::Descriptor;
use understory_delegate::resolver::resolve;
use understory_delegate::types::{Event, Target, Timestamp};

type D = Dispatcher<NodeId, (), MemoryTree, RecordingSource>;

// A single chain of `depth` nodes labelled `.lN`; returns the tree and its leaf.
fn chain(depth: usize) -> (MemoryTree, NodeId) {
    let mut t = MemoryTree::new();
    let mut parent = None;
    let mut leaf = NodeId(0);
    for i in 0..depth {
        let label = format!(".l{i}");
        leaf = t.insert(parent, &[label.as_str()]);
        parent = Some(leaf);
    }
    (t, leaf)
}

// Every fourth level gets a click registration, plus one on the document.
fn descriptors(depth: usize) -> Vec<Descriptor> {
    let mut ds = vec![Descriptor::new("document", "click")];
    ds.extend((0..depth).step_by(4).map(|i| Descriptor::new(format!(".l{i}").as_str(), "click")));
    ds
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for depth in [8_usize, 64, 256] {
        let (t, leaf) = chain(depth);
        let ds = descriptors(depth);
        group.bench_function(format!("chain_{depth}"), |b| {
            b.iter(|| {
                let r = resolve(black_box(&ds), &Target::Node(leaf), &t);
                black_box(r.map(|r| r.index));
            });
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    for depth in [8_usize, 64] {
        group.bench_function(format!("click_chain_{depth}"), |b| {
            b.iter_batched(
                || {
                    let (t, leaf) = chain(depth);
                    let mut d = D::new(t, RecordingSource::new());
                    d.on("handleClick", |e, _| {
                        black_box(e);
                    });
                    for desc in descriptors(depth) {
                        d.add(desc);
                    }
                    d.start();
                    (d, leaf)
                },
                |(mut d, leaf)| {
                    for t in 0..100 {
                        d.handle_event(Event::new("click", Target::Node(leaf)), Timestamp(t));
                    }
                    d
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.bench_function("throttled_mousemove", |b| {
        b.iter_batched(
            || {
                let (t, leaf) = chain(16);
                let mut d = D::new(t, RecordingSource::new());
                d.on("handleMousemove", |e, _| {
                    black_box(e);
                });
                d.add(Descriptor::new(".l0", "mousemove").throttled(Delay::from_millis(16)));
                d.start();
                (d, leaf)
            },
            |(mut d, leaf)| {
                for t in 0..1_000 {
                    d.handle_event(Event::new("mousemove", Target::Node(leaf)), Timestamp(t));
                }
                d
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_dispatch);
criterion_main!(benches);
