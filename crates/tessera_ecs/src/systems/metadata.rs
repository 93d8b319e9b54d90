use std::any::{type_name, TypeId};

use rustc_hash::FxHashMap;

use crate::components::{Component, ComponentId};

/// Declared data access of one system. Built when the system is initialized
/// and used to decide which systems may share a parallel batch.
#[derive(Default, Debug)]
pub struct SystemMeta {
  querys: QueryMeta,
  res: FxHashMap<TypeId, (AccessType, &'static str)>,
  cmds: bool,
}

#[derive(Default, Debug)]
pub struct QueryMeta {
  comps: FxHashMap<ComponentId, AccessType>,
  names: FxHashMap<ComponentId, &'static str>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AccessType {
  Write,
  Read,
}

impl SystemMeta {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_res<R: 'static>(&mut self, access: AccessType) {
    match self.res.get(&TypeId::of::<R>()) {
      Some(_) => {
        panic!(
          "System Access Error: Cannot access resource {} multiple times in the same system",
          type_name::<R>()
        );
      }
      None => {
        self
          .res
          .insert(TypeId::of::<R>(), (access, type_name::<R>()));
      }
    }
  }

  pub fn add_query(&mut self, query: QueryMeta) {
    for (c, a) in query.comps {
      let name = query.names.get(&c).copied().unwrap_or("<unnamed>");
      match self.querys.comps.get(&c) {
        Some(&AccessType::Read) => {
          if a == AccessType::Write {
            panic!("System Access Error: Cannot access component {} mutable in the same system if it is already used immutable", name);
          }
        }
        Some(&AccessType::Write) => {
          panic!("System Access Error: Cannot access component {} multiple times in the same system if it is already used mutable", name);
        }
        None => {
          self.querys.comps.insert(c, a);
          self.querys.names.insert(c, name);
        }
      }
    }
  }

  pub fn add_cmds(&mut self) {
    if self.cmds {
      panic!("System Access Error: Cannot access commands multiple times in the same system");
    } else {
      self.cmds = true;
    }
  }

  pub fn uses_cmds(&self) -> bool {
    self.cmds
  }

  /// Whether running both systems at once could alias a write.
  pub fn overlaps(&self, other: &SystemMeta) -> bool {
    let comps = self.querys.comps.iter().any(|(comp, access)| {
      other
        .querys
        .comps
        .get(comp)
        .is_some_and(|other| *access == AccessType::Write || *other == AccessType::Write)
    });

    let res = self.res.iter().any(|(id, (access, _))| {
      other
        .res
        .get(id)
        .is_some_and(|(other, _)| *access == AccessType::Write || *other == AccessType::Write)
    });

    comps || res
  }

  pub fn component_access(&self, id: ComponentId) -> Option<AccessType> {
    self.querys.comps.get(&id).copied()
  }

  pub fn resource_access<R: 'static>(&self) -> Option<AccessType> {
    self.res.get(&TypeId::of::<R>()).map(|(access, _)| *access)
  }
}

impl QueryMeta {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_comp<C: Component>(&mut self, id: ComponentId, access: AccessType) {
    match self.comps.get(&id) {
      Some(_) => {
        panic!(
          "System Access Error: Cannot access component {} multiple times in the same query",
          type_name::<C>()
        );
      }
      None => {
        self.comps.insert(id, access);
        self.names.insert(id, type_name::<C>());
      }
    }
  }
}
