/// Frame timing, kept up to date by the scheduler as a world resource.
#[derive(Debug, Clone, Default)]
pub struct Time {
  pub(crate) delta: f32,
  pub(crate) elapsed: f64,
  pub(crate) frame: u64,
  pub(crate) fixed_delta: f32,
}

impl Time {
  /// Seconds since the previous update.
  pub fn delta(&self) -> f32 {
    self.delta
  }

  pub fn elapsed(&self) -> f64 {
    self.elapsed
  }

  /// Number of completed updates before the current one.
  pub fn frame(&self) -> u64 {
    self.frame
  }

  /// Step length used inside `FixedUpdate`.
  pub fn fixed_delta(&self) -> f32 {
    self.fixed_delta
  }

  pub(crate) fn advance(&mut self, delta: f32) {
    self.delta = delta;
    self.elapsed += delta as f64;
  }
}
