use std::{cmp::Reverse, collections::BinaryHeap, fmt};

#[cfg(feature = "debug")]
use log::trace;
use tessera_ecs_macros::all_tuples;

use crate::{
  components::{Component, ComponentBox},
  error::EcsError,
};

/// Identity of an object in a [`World`](crate::world::World). Only the exact
/// `(id, generation)` pair is valid; ids are reused after despawn with a new generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
  id: u32,
  generation: u32,
}

impl Entity {
  pub(crate) fn new(id: u32, generation: u32) -> Self {
    Self { id, generation }
  }

  pub fn id(&self) -> u32 {
    self.id
  }

  pub fn generation(&self) -> u32 {
    self.generation
  }

  pub fn to_bits(self) -> u64 {
    ((self.generation as u64) << 32) | self.id as u64
  }

  pub fn from_bits(bits: u64) -> Self {
    Self {
      id: bits as u32,
      generation: (bits >> 32) as u32,
    }
  }

  #[inline]
  pub(crate) fn index(&self) -> usize {
    self.id as usize
  }
}

impl fmt::Debug for Entity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}v{}", self.id, self.generation)
  }
}

impl fmt::Display for Entity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

/// Issues and recycles entity ids.
///
/// Every slot carries a generation counter: odd generations are alive, even
/// ones are free. Freed ids are handed out again lowest first. A slot whose
/// generation cannot be bumped any further is retired for good.
pub struct EntityAllocator {
  generations: Vec<u32>,
  free: BinaryHeap<Reverse<u32>>,
  alive: usize,
  max_entities: u32,
}

const RETIRED: u32 = 0;

impl Default for EntityAllocator {
  fn default() -> Self {
    Self::with_limit(u32::MAX)
  }
}

impl EntityAllocator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_limit(max_entities: u32) -> Self {
    Self {
      generations: Vec::new(),
      free: BinaryHeap::new(),
      alive: 0,
      max_entities,
    }
  }

  pub fn allocate(&mut self) -> Result<Entity, EcsError> {
    let entity = if let Some(Reverse(id)) = self.free.pop() {
      let generation = &mut self.generations[id as usize];
      *generation += 1;
      Entity::new(id, *generation)
    } else {
      if self.generations.len() >= self.max_entities as usize {
        return Err(EcsError::CapacityExhausted(self.max_entities));
      }

      let id = self.generations.len() as u32;
      self.generations.push(1);
      Entity::new(id, 1)
    };

    #[cfg(feature = "debug")]
    trace!("Allocated Entity {}", entity);

    self.alive += 1;
    Ok(entity)
  }

  pub fn free(&mut self, entity: Entity) -> bool {
    if !self.is_alive(entity) {
      return false;
    }

    let generation = &mut self.generations[entity.index()];
    match generation.checked_add(1) {
      Some(next) => {
        *generation = next;
        self.free.push(Reverse(entity.id));
      }
      None => {
        #[cfg(feature = "debug")]
        trace!("Retiring Entity slot {}", entity.id);
        *generation = RETIRED;
      }
    }

    self.alive -= 1;
    true
  }

  #[inline]
  pub fn is_alive(&self, entity: Entity) -> bool {
    self
      .generations
      .get(entity.index())
      .is_some_and(|&generation| generation == entity.generation && generation & 1 == 1)
  }

  /// Number of currently live entities.
  pub fn len(&self) -> usize {
    self.alive
  }

  pub fn is_empty(&self) -> bool {
    self.alive == 0
  }

  pub fn max_entities(&self) -> u32 {
    self.max_entities
  }
}

/// Anything that can be turned into the component set of a new entity.
///
/// Implemented for single components and tuples of up to 16 components. When
/// a type occurs more than once the last value wins.
pub trait IntoEntity {
  fn into_entity(self) -> Vec<ComponentBox>;
}

impl IntoEntity for () {
  #[inline]
  fn into_entity(self) -> Vec<ComponentBox> {
    Vec::new()
  }
}

impl<F0: Component> IntoEntity for F0 {
  #[inline]
  fn into_entity(self) -> Vec<ComponentBox> {
    vec![ComponentBox::new(self)]
  }
}

macro_rules! impl_into_entity {
  ($($params:ident),*) => {
    #[allow(non_snake_case)]
    impl<$($params : Component),*> IntoEntity for ($($params ,)*) {
      #[inline]
      fn into_entity(self) -> Vec<ComponentBox> {
        let ($($params ,)*) = self;
        vec![$(ComponentBox::new($params)),*]
      }
    }
  };
}

all_tuples!(impl_into_entity, 1, 16, F);
