#[cfg(feature = "debug")]
use log::trace;
use rustc_hash::FxHashMap;

use super::QuerySignature;
use crate::storage::{Archetype, ArchetypeId};

/// Memoized `signature → matching archetypes` lookups. Entries are extended
/// when archetypes are created, so each signature is scanned at most once.
#[derive(Default)]
pub struct QueryCache {
  entries: FxHashMap<QuerySignature, Vec<ArchetypeId>>,
  scans: usize,
}

impl QueryCache {
  pub fn compile(
    &mut self,
    signature: &QuerySignature,
    archetypes: &[Archetype],
  ) -> &[ArchetypeId] {
    if !self.entries.contains_key(signature) {
      #[cfg(feature = "debug")]
      trace!("Compiling Query {:?}", signature);

      let matched = archetypes
        .iter()
        .filter(|a| signature.matches(a.signature()))
        .map(Archetype::id)
        .collect();

      self.scans += 1;
      self.entries.insert(signature.clone(), matched);
    }

    self.entries.get(signature).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn get(&self, signature: &QuerySignature) -> Option<&[ArchetypeId]> {
    self.entries.get(signature).map(Vec::as_slice)
  }

  pub fn on_archetype_created(&mut self, archetype: &Archetype) {
    for (signature, matched) in &mut self.entries {
      if signature.matches(archetype.signature()) {
        matched.push(archetype.id());
      }
    }
  }

  /// Number of full archetype scans performed so far.
  pub fn scan_count(&self) -> usize {
    self.scans
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod test {
  use tessera_ecs_macros::Component;

  use super::QueryCache;
  use crate::{
    self as tessera_ecs,
    components::{ComponentId, ComponentRegistry},
    query::QuerySignature,
    storage::{Archetype, ArchetypeId, Signature},
  };

  #[derive(Component)]
  struct Position(f32);

  #[derive(Component)]
  struct Velocity(f32);

  #[derive(Component)]
  struct Frozen;

  fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register::<Position>();
    registry.register::<Velocity>();
    registry.register::<Frozen>();
    registry
  }

  fn archetype(id: u32, ids: &[u32]) -> Archetype {
    let registry = registry();
    let signature = Signature::new(ids.iter().map(|&i| ComponentId(i)));
    let columns = signature
      .ids()
      .iter()
      .map(|&c| registry.info(c).unwrap().descriptor().new_column())
      .collect();

    Archetype::new(ArchetypeId(id), signature, columns)
  }

  #[test]
  fn compile_is_memoized() {
    let archetypes = vec![archetype(0, &[]), archetype(1, &[0]), archetype(2, &[0, 1])];
    let mut cache = QueryCache::default();
    let signature = QuerySignature::new([ComponentId(0)], [ComponentId(1)]);

    let first = cache.compile(&signature, &archetypes).to_vec();
    let second = cache.compile(&signature, &archetypes).to_vec();

    assert_eq!(first, vec![ArchetypeId(1)]);
    assert_eq!(first, second);
    assert_eq!(cache.scan_count(), 1);
  }

  #[test]
  fn extends_without_rescan() {
    let archetypes = vec![archetype(0, &[]), archetype(1, &[0])];
    let mut cache = QueryCache::default();
    let with_a = QuerySignature::new([ComponentId(0)], []);
    let without_b = QuerySignature::new([], [ComponentId(1)]);

    cache.compile(&with_a, &archetypes);
    cache.compile(&without_b, &archetypes);
    assert_eq!(cache.scan_count(), 2);

    cache.on_archetype_created(&archetype(2, &[0, 2]));
    cache.on_archetype_created(&archetype(3, &[1]));

    assert_eq!(
      cache.get(&with_a).unwrap(),
      &[ArchetypeId(1), ArchetypeId(2)]
    );
    assert_eq!(
      cache.get(&without_b).unwrap(),
      &[ArchetypeId(0), ArchetypeId(1), ArchetypeId(2)]
    );
    assert_eq!(cache.scan_count(), 2);
  }
}
