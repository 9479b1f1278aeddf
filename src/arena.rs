use std::ptr::NonNull;

use libc::{c_void, free, malloc};

/// Contiguous backing buffer obtained from the system allocator.
///
/// The buffer is released exactly once, when the arena is dropped.
pub struct Arena {
  base: NonNull<u8>,
  size: usize,
}

// SAFETY: the arena exclusively owns its buffer; moving it to another thread
// moves that ownership along with it.
unsafe impl Send for Arena {}

impl Arena {
  /// Acquires `size` bytes with `malloc(3)`. Returns `None` if the system
  /// allocator refuses the request or `size` is zero.
  pub fn acquire(size: usize) -> Option<Self> {
    if size == 0 {
      return None;
    }

    let address = unsafe { malloc(size) } as *mut u8;
    let base = NonNull::new(address)?;

    Some(Self { base, size })
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub fn size(&self) -> usize {
    self.size
  }

  /// Pointer to the byte at `offset`, which must lie inside the buffer.
  pub fn address_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    debug_assert!(offset < self.size);
    // SAFETY: `offset` is within the buffer, so the result stays in bounds
    // and is non-null.
    unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
  }

  /// Signed byte distance of `address` from the arena base.
  pub fn offset_of(
    &self,
    address: NonNull<u8>,
  ) -> isize {
    (address.as_ptr() as usize).wrapping_sub(self.base.as_ptr() as usize) as isize
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { free(self.base.as_ptr() as *mut c_void) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_acquire_and_write() {
    let arena = Arena::acquire(64).unwrap();
    assert_eq!(arena.size(), 64);

    unsafe {
      let last = arena.address_at(63).as_ptr();
      *last = 0xAB;
      assert_eq!(*last, 0xAB);
    }
  }

  #[test]
  fn test_acquire_zero() {
    assert!(Arena::acquire(0).is_none());
  }

  #[test]
  fn test_acquire_exhausted() {
    assert!(Arena::acquire(usize::MAX - 4095).is_none());
  }

  #[test]
  fn test_offsets() {
    let arena = Arena::acquire(32).unwrap();
    let address = arena.address_at(24);

    assert_eq!(arena.offset_of(address), 24);
    assert_eq!(arena.offset_of(arena.base()), 0);

    let before = NonNull::new(arena.base().as_ptr().wrapping_sub(8)).unwrap();
    assert_eq!(arena.offset_of(before), -8);
  }
}
