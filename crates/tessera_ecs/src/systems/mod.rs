use std::{
  any::{type_name, Any, TypeId},
  marker::PhantomData,
  ptr::NonNull,
};

#[cfg(feature = "debug")]
use log::trace;
use log::warn;
use tessera_ecs_macros::all_tuples;

use crate::{
  commands::CommandBuffer,
  world::{UnsafeWorldCell, World},
};
use metadata::SystemMeta;

pub mod metadata;
pub mod query;
pub mod resources;

/// Something the scheduler can run once per phase pass.
pub trait System: Send {
  fn name(&self) -> &str;
  /// Registers the data the system accesses. Called once before the first run.
  fn init(&mut self, world: &mut World);
  fn run(&mut self, world: UnsafeWorldCell<'_>, commands: &mut CommandBuffer);
  fn meta(&self) -> &SystemMeta;

  /// Optional feature lookup, see [`ECS::system_capability`](crate::ECS::system_capability).
  fn capability(&self, _capability: TypeId) -> Option<&dyn Any> {
    None
  }
}

pub trait IntoSystem<Marker> {
  type System: System;

  fn into_system(self) -> Self::System;
}

/// Marker for [`IntoSystem`] on types that already are a [`System`].
pub struct SystemMarker;

impl<S: System> IntoSystem<SystemMarker> for S {
  type System = S;

  fn into_system(self) -> Self::System {
    self
  }
}

/// Handle to the command buffer of the running system.
#[derive(Clone, Copy)]
pub struct CommandsCell<'w>(NonNull<CommandBuffer>, PhantomData<&'w mut CommandBuffer>);

impl<'w> CommandsCell<'w> {
  pub fn new(commands: &'w mut CommandBuffer) -> Self {
    Self(NonNull::from(commands), PhantomData)
  }

  /// # Safety
  /// only one reference obtained from this cell may be alive at a time
  pub unsafe fn get(self) -> &'w mut CommandBuffer {
    &mut *self.0.as_ptr()
  }
}

pub trait SystemParam {
  type State: Send + 'static;
  type Item<'new>;

  fn init(world: &mut World, meta: &mut SystemMeta) -> Self::State;
  /// # Safety
  /// the access declared in [`SystemParam::init`] must not conflict with
  /// any other system running at the same time
  unsafe fn get_param<'w>(
    state: &'w mut Self::State,
    world: UnsafeWorldCell<'w>,
    commands: CommandsCell<'w>,
  ) -> Self::Item<'w>;
}

impl SystemParam for &mut CommandBuffer {
  type State = ();
  type Item<'new> = &'new mut CommandBuffer;

  fn init(_: &mut World, meta: &mut SystemMeta) -> Self::State {
    meta.add_cmds();
  }

  unsafe fn get_param<'w>(
    _: &'w mut Self::State,
    _: UnsafeWorldCell<'w>,
    commands: CommandsCell<'w>,
  ) -> Self::Item<'w> {
    commands.get()
  }
}

macro_rules! impl_system_param {
  ($($params:ident),*) => {
    #[allow(non_snake_case, unused_variables, clippy::unused_unit)]
    impl<$($params: SystemParam),*> SystemParam for ($($params ,)*) {
      type State = ($($params::State ,)*);
      type Item<'new> = ($($params::Item<'new> ,)*);

      fn init(world: &mut World, meta: &mut SystemMeta) -> Self::State {
        ($($params::init(world, meta) ,)*)
      }

      unsafe fn get_param<'w>(
        state: &'w mut Self::State,
        world: UnsafeWorldCell<'w>,
        commands: CommandsCell<'w>,
      ) -> Self::Item<'w> {
        let ($($params ,)*) = state;
        ($($params::get_param($params, world, commands) ,)*)
      }
    }
  };
}

all_tuples!(impl_system_param, 0, 16, F);

/// A plain function or closure run as a system.
pub struct FunctionSystem<Input: SystemParam, F> {
  f: F,
  name: String,
  meta: SystemMeta,
  state: Option<Input::State>,
  marker: PhantomData<fn() -> Input>,
}

impl<Input: SystemParam, F> FunctionSystem<Input, F> {
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }
}

macro_rules! impl_system {
  ($($params:ident),*) => {
    #[allow(unused_variables)]
    #[allow(non_snake_case)]
    impl<F: FnMut($($params),*) + Send + 'static, $($params : SystemParam + 'static),*> System for FunctionSystem<($($params ,)*), F>
    where
      for<'a, 'b> &'a mut F:
        FnMut($($params),*) +
        FnMut($(<$params as SystemParam>::Item<'b>),*)
    {
      fn name(&self) -> &str {
        &self.name
      }

      fn init(&mut self, world: &mut World) {
        let mut meta = SystemMeta::new();
        self.state = Some(<($($params ,)*) as SystemParam>::init(world, &mut meta));
        self.meta = meta;
      }

      fn run(&mut self, world: UnsafeWorldCell<'_>, commands: &mut CommandBuffer) {
        #[cfg(feature = "debug")]
        trace!("Executing System {}", self.name);
        #[allow(clippy::too_many_arguments)]
        fn call_inner<$($params),*>(
          mut f: impl FnMut($($params),*),
          $($params: $params),*
        ) {
          f($($params),*)
        }

        let Some(state) = self.state.as_mut() else {
          warn!("System {} ran before it was initialized", self.name);
          return;
        };

        let ($($params ,)*) = unsafe {
          <($($params ,)*) as SystemParam>::get_param(state, world, CommandsCell::new(commands))
        };

        call_inner(&mut self.f, $($params),*)
      }

      fn meta(&self) -> &SystemMeta {
        &self.meta
      }
    }

    #[allow(unused_variables)]
    #[allow(non_snake_case)]
    impl<F: FnMut($($params),*) + Send + 'static, $($params : SystemParam + 'static),*> IntoSystem<($($params ,)*)> for F
    where
      for<'a, 'b> &'a mut F:
        FnMut($($params),*) +
        FnMut($(<$params as SystemParam>::Item<'b>),*)
    {
      type System = FunctionSystem<($($params ,)*), Self>;

      fn into_system(self) -> Self::System {
        FunctionSystem {
          f: self,
          name: type_name::<F>().to_string(),
          meta: SystemMeta::new(),
          state: None,
          marker: PhantomData,
        }
      }
    }
  };
}

all_tuples!(impl_system, 0, 16, F);

pub(crate) type StoredSystem = Box<dyn System>;
