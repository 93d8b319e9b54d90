use anyhow::Context;
use tessera::{init_logger, log::info, prelude::*};

#[derive(Component, Debug, Clone, Copy)]
struct Position {
  x: f32,
  y: f32,
}

#[derive(Component, Debug, Clone, Copy)]
struct Velocity {
  x: f32,
  y: f32,
}

#[derive(Component)]
struct Expired;

#[derive(Default)]
struct Spawned(u32);

fn movement(query: Query<(&mut Position, &Velocity)>, time: Res<Time>) {
  let dt = time.fixed_delta();
  for (_, pos, vel) in query {
    pos.x += vel.x * dt;
    pos.y += vel.y * dt;
  }
}

fn spawner(cmds: &mut CommandBuffer, mut spawned: ResMut<Spawned>, time: Res<Time>) {
  if time.frame() % 2 == 0 {
    let p = cmds.spawn_named(format!("bolt {}", spawned.0), Position { x: 0.0, y: 0.0 });
    cmds.add_component(p, Velocity { x: 1.0, y: 0.5 });
    spawned.0 += 1;
  }
}

fn cleanup(query: Query<&Position, Without<Expired>>, cmds: &mut CommandBuffer) {
  for (entity, pos) in query {
    if pos.x > 0.1 {
      cmds.add_component(entity, Expired);
    }
  }
}

fn reaper(query: Query<&Position, With<Expired>>, cmds: &mut CommandBuffer) {
  for (entity, _) in query {
    cmds.despawn(entity);
  }
}

fn system(name: &str, phase: Phase) -> SystemConfig {
  SystemConfig::new().named(name).in_phase(phase)
}

fn main() -> anyhow::Result<()> {
  init_logger();

  let mut builder = ECS::builder();
  builder.add_resource(Spawned::default());
  builder.add_system(spawner, system("spawner", Phase::EarlyUpdate))?;
  builder.add_system(movement, system("movement", Phase::FixedUpdate))?;
  builder.add_system(cleanup, system("cleanup", Phase::LateUpdate))?;
  builder.add_system(reaper, system("reaper", Phase::LateUpdate).before("cleanup"))?;

  let mut ecs = builder.build();
  for _ in 0..10 {
    ecs.update(1.0 / 60.0);
  }

  let spawned = ecs
    .get_resource::<Spawned>()
    .context("Spawned resource missing")?
    .0;
  info!("{} bolts spawned, {} alive", spawned, ecs.world().len());

  for (components, count) in ecs.world().archetype_signatures() {
    println!("{:>4} x [{}]", count, components.join(", "));
  }
  println!("late update: {:?}", ecs.phase_order(Phase::LateUpdate));

  Ok(())
}
