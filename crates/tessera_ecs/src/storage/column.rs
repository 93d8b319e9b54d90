use std::{
  any::{type_name, Any},
  cell::UnsafeCell,
};

use crate::components::Component;

/// Densely packed storage for the values of one component type inside one archetype.
pub trait Column: Send + Sync {
  fn len(&self) -> usize;
  fn is_empty(&self) -> bool {
    self.len() == 0
  }
  fn push_boxed(&mut self, value: Box<dyn Any + Send>);
  fn replace_boxed(&mut self, row: usize, value: Box<dyn Any + Send>);
  /// Removes `row` by moving the last value into its place and drops it.
  fn swap_remove_drop(&mut self, row: usize);
  /// Like [`Column::swap_remove_drop`] but pushes the removed value onto `target`.
  fn swap_remove_into(&mut self, row: usize, target: &mut dyn Column);
  fn as_any(&self) -> &dyn Any;
  fn as_any_mut(&mut self) -> &mut dyn Any;
}

///from https://github.com/reem/rust-unsafe-any
/// # Safety
/// only use this if you are absolutely certain that the trait object is the struct you want
/// if it is another type it will result in undefined behavior
/// use [`Column::as_any`] instead if you are not certain
pub unsafe trait UnsafeDowncast {
  /// # Safety
  /// see trait
  unsafe fn downcast_ref_unchecked<T: Any>(&self) -> &T {
    &*data(self)
  }

  /// # Safety
  /// see trait
  unsafe fn downcast_mut_unchecked<T: Any>(&mut self) -> &mut T {
    &mut *data_mut(self)
  }
}

///from https://github.com/reem/rust-traitobject
unsafe fn data<T: ?Sized, R>(val: *const T) -> *const R {
  val as *const R
}

///from https://github.com/reem/rust-traitobject
unsafe fn data_mut<T: ?Sized, R>(val: *mut T) -> *mut R {
  val as *mut R
}

unsafe impl UnsafeDowncast for dyn Column {}

pub struct TypedColumn<T> {
  data: UnsafeCell<Vec<T>>,
}

// Rows are only handed out mutably to systems with non-overlapping access.
unsafe impl<T: Component> Sync for TypedColumn<T> {}

impl<T: Component> Default for TypedColumn<T> {
  fn default() -> Self {
    Self {
      data: UnsafeCell::new(Vec::new()),
    }
  }
}

impl<T: Component> TypedColumn<T> {
  pub fn new_boxed() -> Box<dyn Column> {
    Box::new(Self::default())
  }

  pub fn push(&mut self, value: T) {
    self.data.get_mut().push(value);
  }

  pub fn as_slice(&self) -> &[T] {
    unsafe { &*self.data.get() }
  }

  pub fn as_mut_slice(&mut self) -> &mut [T] {
    self.data.get_mut()
  }

  /// # Safety
  /// the caller has to make sure no other reference into the column is alive
  /// while values are written through the pointer
  pub(crate) unsafe fn as_mut_ptr(&self) -> *mut T {
    (*self.data.get()).as_mut_ptr()
  }

  fn unbox(value: Box<dyn Any + Send>) -> T {
    match value.downcast::<T>() {
      Ok(value) => *value,
      Err(_) => panic!("Column of {} received a value of another type", type_name::<T>()),
    }
  }
}

impl<T: Component> Column for TypedColumn<T> {
  #[inline]
  fn len(&self) -> usize {
    self.as_slice().len()
  }

  fn push_boxed(&mut self, value: Box<dyn Any + Send>) {
    self.push(Self::unbox(value));
  }

  fn replace_boxed(&mut self, row: usize, value: Box<dyn Any + Send>) {
    self.data.get_mut()[row] = Self::unbox(value);
  }

  fn swap_remove_drop(&mut self, row: usize) {
    self.data.get_mut().swap_remove(row);
  }

  fn swap_remove_into(&mut self, row: usize, target: &mut dyn Column) {
    let value = self.data.get_mut().swap_remove(row);
    match target.as_any_mut().downcast_mut::<TypedColumn<T>>() {
      Some(target) => target.push(value),
      None => panic!("Moving {} into a column of another type", type_name::<T>()),
    }
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }
}
