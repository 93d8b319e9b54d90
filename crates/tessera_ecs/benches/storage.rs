use std::{hint::black_box, time::Instant};

use criterion::{criterion_group, criterion_main, Criterion};
use tessera_ecs::{Component, Entity, World};

fn create_n(world: &mut World, n: u64) -> Vec<Entity> {
  (0..n).map(|_| world.create_entity(A { _x: 0.0 })).collect()
}

fn edit_n(world: &mut World, entities: &[Entity]) {
  for &entity in entities {
    let _ = world.add(entity, B { _y: 0.0 });
    world.remove::<B>(entity);
  }
}

fn get_n(world: &World, entities: &[Entity]) {
  for &entity in entities {
    let _ = black_box(world.get::<A>(entity));
  }
}

fn despawn_n(world: &mut World, entities: &[Entity]) {
  for &entity in entities {
    world.despawn(entity);
  }
}

fn create_benchmark(c: &mut Criterion) {
  for i in [1, 1000] {
    c.bench_function(&format!("create {}", i), |b| {
      b.iter_custom(|iters| {
        let mut world = World::new();
        let start = Instant::now();
        for _ in 0..iters {
          create_n(&mut world, black_box(i));
        }
        start.elapsed()
      })
    });
  }
}

fn add_benchmark(c: &mut Criterion) {
  for i in [1, 1000] {
    c.bench_function(&format!("add remove {}", i), |b| {
      b.iter_custom(|iters| {
        let mut world = World::new();
        let entities = create_n(&mut world, i);

        let start = Instant::now();
        for _ in 0..iters {
          edit_n(&mut world, black_box(&entities))
        }
        start.elapsed()
      })
    });
  }
}

fn get_benchmark(c: &mut Criterion) {
  for i in [1, 1000] {
    c.bench_function(&format!("get {}", i), |b| {
      b.iter_custom(|iters| {
        let mut world = World::new();
        let entities = create_n(&mut world, i);

        let start = Instant::now();
        for _ in 0..iters {
          get_n(&world, black_box(&entities))
        }
        start.elapsed()
      })
    });
  }
}

fn despawn_benchmark(c: &mut Criterion) {
  for i in [1, 1000] {
    c.bench_function(&format!("despawn {}", i), |b| {
      b.iter_custom(|iters| {
        let mut world = World::new();
        let mut elapsed = std::time::Duration::ZERO;

        for _ in 0..iters {
          let entities = create_n(&mut world, i);
          let start = Instant::now();
          despawn_n(&mut world, black_box(&entities));
          elapsed += start.elapsed();
        }
        elapsed
      })
    });
  }
}

criterion_group!(create, create_benchmark);
criterion_group!(add, add_benchmark);
criterion_group!(get, get_benchmark);
criterion_group!(despawn, despawn_benchmark);
criterion_main!(create, add, get, despawn);

#[derive(Component)]
struct A {
  _x: f32,
}

#[derive(Component)]
struct B {
  _y: f32,
}
