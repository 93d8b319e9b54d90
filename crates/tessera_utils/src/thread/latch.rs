use std::{
  any::Any,
  sync::{Arc, Condvar, Mutex, PoisonError},
};

pub type PanicPayload = Box<dyn Any + Send + 'static>;

struct LatchState {
  remaining: usize,
  panic: Option<PanicPayload>,
}

/// Count-down barrier. Every job releases the latch exactly once, and the
/// first panic payload reported by a job is handed back to the waiter.
#[derive(Clone)]
pub struct Latch {
  state: Arc<(Mutex<LatchState>, Condvar)>,
}

impl Latch {
  pub fn new(count: usize) -> Self {
    Self {
      state: Arc::new((
        Mutex::new(LatchState {
          remaining: count,
          panic: None,
        }),
        Condvar::new(),
      )),
    }
  }

  pub fn count_down(&self) {
    self.release(None);
  }

  pub fn count_down_with_panic(&self, payload: PanicPayload) {
    self.release(Some(payload));
  }

  fn release(&self, payload: Option<PanicPayload>) {
    let (lock, cvar) = &*self.state;
    let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);

    if state.panic.is_none() {
      state.panic = payload;
    }
    state.remaining = state.remaining.saturating_sub(1);

    if state.remaining == 0 {
      cvar.notify_all();
    }
  }

  /// Blocks until the count reaches zero.
  pub fn wait(&self) -> Result<(), PanicPayload> {
    let (lock, cvar) = &*self.state;
    let state = lock.lock().unwrap_or_else(PoisonError::into_inner);
    let mut state = cvar
      .wait_while(state, |state| state.remaining > 0)
      .unwrap_or_else(PoisonError::into_inner);

    match state.panic.take() {
      Some(payload) => Err(payload),
      None => Ok(()),
    }
  }

  pub fn is_released(&self) -> bool {
    let (lock, _) = &*self.state;
    lock.lock().unwrap_or_else(PoisonError::into_inner).remaining == 0
  }
}

#[cfg(test)]
mod test {
  use std::thread;

  use super::Latch;

  #[test]
  fn releases_after_all_jobs() {
    let latch = Latch::new(4);

    let handles = (0..4)
      .map(|_| {
        let latch = latch.clone();
        thread::spawn(move || latch.count_down())
      })
      .collect::<Vec<_>>();

    assert!(latch.wait().is_ok());
    assert!(latch.is_released());

    for handle in handles {
      handle.join().unwrap();
    }
  }

  #[test]
  fn zero_count_does_not_block() {
    assert!(Latch::new(0).wait().is_ok());
  }

  #[test]
  fn reports_first_panic() {
    let latch = Latch::new(2);

    latch.count_down_with_panic(Box::new("first"));
    latch.count_down_with_panic(Box::new("second"));

    let payload = latch.wait().unwrap_err();
    assert_eq!(*payload.downcast::<&str>().unwrap(), "first");
  }
}
