use std::{hint::black_box, time::Instant};

use criterion::{criterion_group, criterion_main, Criterion};
use tessera_ecs::{systems::query::Query, Component, SystemConfig, ECS};

fn system_loop(query: Query<&A>) {
  for (_, a) in query {
    black_box(a);
  }
}

fn query_loop_benchmark(c: &mut Criterion) {
  for i in [1, 1000] {
    c.bench_function(&format!("query loop {}", i), |b| {
      b.iter_custom(|iters| {
        let mut builder = ECS::builder();
        builder.sync_system_exec(true);
        builder
          .add_system(system_loop, SystemConfig::default())
          .unwrap();

        for _ in 0..i {
          builder.create_entity(A { _x: 0.0 });
        }
        let mut ecs = builder.build();

        let start = Instant::now();
        for _ in 0..iters {
          ecs.update(black_box(0.016));
        }
        start.elapsed()
      })
    });
  }
}

criterion_group!(query_loop, query_loop_benchmark);
criterion_main!(query_loop);

#[derive(Component)]
struct A {
  _x: f32,
}
