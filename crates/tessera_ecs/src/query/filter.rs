use std::marker::PhantomData;

use tessera_ecs_macros::all_tuples;

use crate::components::{Component, ComponentId, ComponentRegistry};

/// Archetype-level restriction of a query.
pub trait QueryFilter {
  fn register(
    registry: &mut ComponentRegistry,
    required: &mut Vec<ComponentId>,
    excluded: &mut Vec<ComponentId>,
  );
}

pub trait QueryFilterParam {
  fn register(
    registry: &mut ComponentRegistry,
    required: &mut Vec<ComponentId>,
    excluded: &mut Vec<ComponentId>,
  );
}

impl QueryFilter for () {
  #[inline]
  fn register(_: &mut ComponentRegistry, _: &mut Vec<ComponentId>, _: &mut Vec<ComponentId>) {}
}

macro_rules! impl_query_filter {
  ($($params:ident),*) => {
    #[allow(unused_parens)]
    impl<$($params: QueryFilterParam),*> QueryFilter for ($($params),*) {
      fn register(
        registry: &mut ComponentRegistry,
        required: &mut Vec<ComponentId>,
        excluded: &mut Vec<ComponentId>,
      ) {
        $(
          $params::register(registry, required, excluded);
        )*
      }
    }
  };
}

all_tuples!(impl_query_filter, 1, 16, F);

/// Only archetypes containing `C`.
pub struct With<C: Component>(PhantomData<C>);

impl<C: Component> QueryFilterParam for With<C> {
  fn register(registry: &mut ComponentRegistry, required: &mut Vec<ComponentId>, _: &mut Vec<ComponentId>) {
    required.push(registry.register::<C>());
  }
}

/// Only archetypes without `C`.
pub struct Without<C: Component>(PhantomData<C>);

impl<C: Component> QueryFilterParam for Without<C> {
  fn register(registry: &mut ComponentRegistry, _: &mut Vec<ComponentId>, excluded: &mut Vec<ComponentId>) {
    excluded.push(registry.register::<C>());
  }
}
