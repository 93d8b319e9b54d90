use std::{
  any::type_name,
  ops::{Deref, DerefMut},
};

use super::{
  metadata::{AccessType, SystemMeta},
  CommandsCell, SystemParam,
};
use crate::world::{UnsafeWorldCell, World};

/// Shared access to a world resource. Panics when the resource is missing.
pub struct Res<'a, T: 'static> {
  value: &'a T,
}

impl<T: 'static> Deref for Res<'_, T> {
  type Target = T;

  fn deref(&self) -> &Self::Target {
    self.value
  }
}

impl<T: Send + Sync + 'static> SystemParam for Res<'_, T> {
  type State = ();
  type Item<'new> = Res<'new, T>;

  fn init(_: &mut World, meta: &mut SystemMeta) -> Self::State {
    meta.add_res::<T>(AccessType::Read);
  }

  unsafe fn get_param<'w>(
    _: &'w mut Self::State,
    world: UnsafeWorldCell<'w>,
    _: CommandsCell<'w>,
  ) -> Self::Item<'w> {
    match world.world().get_resource() {
      Some(value) => Res { value },
      None => panic!("Resource {} not found", type_name::<T>()),
    }
  }
}

/// Exclusive access to a world resource. Panics when the resource is missing.
pub struct ResMut<'a, T: 'static> {
  value: &'a mut T,
}

impl<T: 'static> Deref for ResMut<'_, T> {
  type Target = T;

  fn deref(&self) -> &Self::Target {
    self.value
  }
}

impl<T: 'static> DerefMut for ResMut<'_, T> {
  fn deref_mut(&mut self) -> &mut Self::Target {
    self.value
  }
}

impl<T: Send + Sync + 'static> SystemParam for ResMut<'_, T> {
  type State = ();
  type Item<'new> = ResMut<'new, T>;

  fn init(_: &mut World, meta: &mut SystemMeta) -> Self::State {
    meta.add_res::<T>(AccessType::Write);
  }

  unsafe fn get_param<'w>(
    _: &'w mut Self::State,
    world: UnsafeWorldCell<'w>,
    _: CommandsCell<'w>,
  ) -> Self::Item<'w> {
    match world.world().get_resource_unchecked_mut() {
      Some(value) => ResMut { value },
      None => panic!("Resource {} not found", type_name::<T>()),
    }
  }
}
