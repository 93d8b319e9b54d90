use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared, lockable value. A poisoned lock hands out the inner value anyway.
#[derive(Debug)]
pub struct Mutator<T> {
  data: Arc<Mutex<T>>,
}

impl<T> Mutator<T> {
  pub fn new(data: T) -> Self {
    Mutator {
      data: Arc::new(Mutex::new(data)),
    }
  }

  pub fn set(&self, data: T) {
    *self.get() = data;
  }

  pub fn get(&self) -> MutexGuard<'_, T> {
    self.data.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn inner_clone(mutator: &Mutator<T>) -> Mutator<T> {
    Mutator {
      data: Arc::clone(&mutator.data),
    }
  }
}

impl<T> Clone for Mutator<T> {
  fn clone(&self) -> Self {
    Mutator::inner_clone(self)
  }
}
