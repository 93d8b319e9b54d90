use std::{
  alloc::Layout,
  any::{type_name, Any, TypeId},
  fmt,
};

use log::debug;
use rustc_hash::FxHashMap;

use crate::{
  error::EcsError,
  storage::column::{Column, TypedColumn},
};

/// Data that can be stored in archetype columns. Use `#[derive(Component)]`.
pub trait Component: Send + Sync + 'static {}

/// Stable numeric id assigned to a component type by the [`ComponentRegistry`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
  #[inline]
  pub fn index(&self) -> usize {
    self.0 as usize
  }
}

/// Display name of an entity, used by named spawns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Name(pub String);

impl Component for Name {}

impl From<&str> for Name {
  fn from(value: &str) -> Self {
    Name(value.to_string())
  }
}

impl fmt::Display for Name {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Type-erased description of a component type.
#[derive(Clone, Copy)]
pub struct ComponentDescriptor {
  name: &'static str,
  type_id: TypeId,
  layout: Layout,
  new_column: fn() -> Box<dyn Column>,
}

impl ComponentDescriptor {
  pub fn of<T: Component>() -> Self {
    Self {
      name: type_name::<T>(),
      type_id: TypeId::of::<T>(),
      layout: Layout::new::<T>(),
      new_column: TypedColumn::<T>::new_boxed,
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  pub fn layout(&self) -> Layout {
    self.layout
  }

  pub fn new_column(&self) -> Box<dyn Column> {
    (self.new_column)()
  }
}

impl fmt::Debug for ComponentDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComponentDescriptor")
      .field("name", &self.name)
      .field("layout", &self.layout)
      .finish()
  }
}

/// An owned component value whose type is only known at runtime.
pub struct ComponentBox {
  value: Box<dyn Any + Send>,
  descriptor: ComponentDescriptor,
}

impl ComponentBox {
  pub fn new<T: Component>(value: T) -> Self {
    Self {
      value: Box::new(value),
      descriptor: ComponentDescriptor::of::<T>(),
    }
  }

  pub fn descriptor(&self) -> &ComponentDescriptor {
    &self.descriptor
  }

  pub fn downcast<T: Component>(self) -> Result<T, Self> {
    if self.descriptor.type_id == TypeId::of::<T>() {
      match self.value.downcast::<T>() {
        Ok(value) => Ok(*value),
        Err(value) => Err(Self {
          value,
          descriptor: self.descriptor,
        }),
      }
    } else {
      Err(self)
    }
  }

  pub(crate) fn into_inner(self) -> Box<dyn Any + Send> {
    self.value
  }
}

impl fmt::Debug for ComponentBox {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ComponentBox({})", self.descriptor.name)
  }
}

pub(crate) type DefaultFn = fn() -> Box<dyn Any + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
  Data,
  /// Zero-sized marker component.
  Tag,
}

pub struct ComponentInfo {
  id: ComponentId,
  descriptor: ComponentDescriptor,
  default: Option<DefaultFn>,
  kind: StorageKind,
}

impl ComponentInfo {
  pub fn id(&self) -> ComponentId {
    self.id
  }

  pub fn name(&self) -> &'static str {
    self.descriptor.name
  }

  pub fn descriptor(&self) -> &ComponentDescriptor {
    &self.descriptor
  }

  pub fn layout(&self) -> Layout {
    self.descriptor.layout
  }

  pub fn kind(&self) -> StorageKind {
    self.kind
  }

  pub fn has_default(&self) -> bool {
    self.default.is_some()
  }

  pub(crate) fn make_default(&self) -> Option<Box<dyn Any + Send>> {
    self.default.map(|default| default())
  }
}

/// Append-only mapping from component types to [`ComponentId`]s.
#[derive(Default)]
pub struct ComponentRegistry {
  infos: Vec<ComponentInfo>,
  by_type: FxHashMap<TypeId, ComponentId>,
  by_name: FxHashMap<String, ComponentId>,
}

impl ComponentRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<T: Component>(&mut self) -> ComponentId {
    self.register_descriptor(ComponentDescriptor::of::<T>())
  }

  pub fn register_descriptor(&mut self, descriptor: ComponentDescriptor) -> ComponentId {
    if let Some(&id) = self.by_type.get(&descriptor.type_id) {
      return id;
    }

    let id = ComponentId(self.infos.len() as u32);
    debug!("Registering Component {} as {:?}", descriptor.name, id);

    let kind = if descriptor.layout.size() == 0 {
      StorageKind::Tag
    } else {
      StorageKind::Data
    };

    self.by_type.insert(descriptor.type_id, id);
    self
      .by_name
      .entry(descriptor.name.to_string())
      .or_insert(id);
    self.infos.push(ComponentInfo {
      id,
      descriptor,
      default: None,
      kind,
    });

    id
  }

  /// Registers `T` and makes its [`Default`] available to
  /// [`World::add_default_by_id`](crate::world::World::add_default_by_id).
  pub fn register_default<T: Component + Default>(&mut self) -> ComponentId {
    let id = self.register::<T>();
    self.infos[id.index()].default = Some(|| -> Box<dyn Any + Send> { Box::new(T::default()) });
    id
  }

  /// Binds an additional lookup name to `T`.
  pub fn register_name<T: Component>(&mut self, name: &str) -> Result<ComponentId, EcsError> {
    let id = self.register::<T>();

    match self.by_name.get(name) {
      Some(&existing) if existing != id => Err(EcsError::DuplicateRegistration {
        name: name.to_string(),
        existing: self.infos[existing.index()].name(),
      }),
      Some(_) => Ok(id),
      None => {
        debug!("Binding name {} to Component {}", name, type_name::<T>());
        self.by_name.insert(name.to_string(), id);
        Ok(id)
      }
    }
  }

  #[inline]
  pub fn id<T: Component>(&self) -> Option<ComponentId> {
    self.id_by_type(TypeId::of::<T>())
  }

  #[inline]
  pub fn id_by_type(&self, type_id: TypeId) -> Option<ComponentId> {
    self.by_type.get(&type_id).copied()
  }

  pub fn id_by_name(&self, name: &str) -> Option<ComponentId> {
    self.by_name.get(name).copied()
  }

  pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
    self.infos.get(id.index())
  }

  pub fn layout(&self, id: ComponentId) -> Option<Layout> {
    self.info(id).map(ComponentInfo::layout)
  }

  pub fn len(&self) -> usize {
    self.infos.len()
  }

  pub fn is_empty(&self) -> bool {
    self.infos.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
    self.infos.iter()
  }
}
