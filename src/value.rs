//! Type-erased owned values.
//!
//! Directive values, constructor results, and conversion inputs/outputs all
//! travel through the engine as [`OwnedValue`]: a heap allocation paired with
//! the [`Shape`] describing what lives in it. The value is dropped through
//! its shape's vtable when the `OwnedValue` is dropped, unless ownership of
//! the contents has been transferred first.

use core::alloc::Layout;
use core::ptr::NonNull;

use facet_core::{Def, Facet, PtrConst, PtrMut, PtrUninit, Shape};
use facet_reflect::Peek;

use crate::error::BuildError;

/// A single value stored on the heap together with its shape.
pub struct OwnedValue {
    shape: &'static Shape,
    data: NonNull<u8>,
    layout: Layout,
}

impl OwnedValue {
    /// Moves `value` onto the heap, erasing its type.
    pub fn new<V: Facet<'static>>(value: V) -> Self {
        let layout = Layout::new::<V>();
        let data = allocate(layout);
        // SAFETY: `data` is freshly allocated (or dangling for a ZST) with
        // V's layout, so it is valid and aligned for a write of V.
        unsafe { core::ptr::write(data.as_ptr() as *mut V, value) };
        Self {
            shape: V::SHAPE,
            data,
            layout,
        }
    }

    /// Default-constructs a value of the given shape, if the shape exposes
    /// default construction. Returns `None` for unsized shapes and shapes
    /// without `default_in_place`.
    pub(crate) fn default_of(shape: &'static Shape) -> Option<Self> {
        let layout = shape.layout.sized_layout().ok()?;
        let data = allocate(layout);
        // SAFETY: `data` is uninitialized memory of the shape's layout.
        let initialized = unsafe { shape.call_default_in_place(PtrMut::new(data.as_ptr())) };
        if initialized.is_none() {
            deallocate(data, layout);
            return None;
        }
        Some(Self {
            shape,
            data,
            layout,
        })
    }

    /// Wraps `inner` into `Some` of the given option shape.
    ///
    /// The caller must pass an option shape whose payload shape matches
    /// `inner` — this is checked and `inner` is returned unchanged on
    /// mismatch.
    pub(crate) fn some_wrapping(option_shape: &'static Shape, inner: OwnedValue) -> Result<Self, OwnedValue> {
        let Def::Option(od) = option_shape.def else {
            return Err(inner);
        };
        if od.t() != inner.shape {
            return Err(inner);
        }
        let layout = match option_shape.layout.sized_layout() {
            Ok(layout) => layout,
            Err(_) => return Err(inner),
        };
        let data = allocate(layout);
        // SAFETY: `data` is uninitialized option storage; `init_some` moves
        // the payload out of `inner`, whose buffer is then released without
        // dropping the moved-out contents.
        unsafe {
            (od.vtable.init_some)(PtrUninit::new(data.as_ptr()), PtrConst::new(inner.data.as_ptr()));
        }
        inner.forget_contents();
        Ok(Self {
            shape: option_shape,
            data,
            layout,
        })
    }

    /// The shape of the stored value.
    pub fn shape(&self) -> &'static Shape {
        self.shape
    }

    /// A read-only reflection view of the stored value.
    pub fn peek(&self) -> Peek<'_, 'static> {
        // SAFETY: `data` holds an initialized value of `shape` for as long
        // as `self` is alive.
        unsafe { Peek::unchecked_new(PtrConst::new(self.data.as_ptr()), self.shape) }
    }

    /// Turns the erased value back into a concrete `V`.
    ///
    /// Fails with a shape mismatch if the stored value is not a `V`.
    pub fn materialize<V: Facet<'static>>(self) -> Result<V, BuildError> {
        self.try_materialize().map_err(|value| BuildError::ShapeMismatch {
            key: "<value>".to_string(),
            expected: V::SHAPE,
            actual: value.shape,
        })
    }

    /// Like [`materialize`](Self::materialize), but hands the value back on
    /// mismatch so the caller can attach its own context.
    pub(crate) fn try_materialize<V: Facet<'static>>(self) -> Result<V, Self> {
        if self.shape != V::SHAPE {
            return Err(self);
        }
        // SAFETY: shape equality guarantees the buffer holds a valid V.
        let value = unsafe { core::ptr::read(self.data.as_ptr() as *const V) };
        self.forget_contents();
        Ok(value)
    }

    /// A mutable pointer to the stored value.
    pub(crate) fn as_ptr_mut(&mut self) -> PtrMut {
        PtrMut::new(self.data.as_ptr())
    }

    /// Moves the stored value into `dest`, which must be uninitialized (or
    /// already dropped) storage of the same shape.
    ///
    /// # Safety
    ///
    /// `dest` must be valid, aligned storage for this value's shape, and must
    /// not currently hold a live value.
    pub(crate) unsafe fn move_into(self, dest: PtrUninit) {
        // SAFETY: per the contract, `dest` is writable storage of the right
        // layout; the source buffer is released without dropping the
        // moved-out contents.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.data.as_ptr(),
                dest.as_mut_byte_ptr(),
                self.layout.size(),
            );
        }
        self.forget_contents();
    }

    /// Releases the heap buffer without dropping the contents. Used after
    /// ownership of the contents has been transferred elsewhere.
    pub(crate) fn forget_contents(self) {
        deallocate(self.data, self.layout);
        core::mem::forget(self);
    }
}

impl Drop for OwnedValue {
    fn drop(&mut self) {
        // SAFETY: `data` holds an initialized value of `shape`; after the
        // drop the buffer is released.
        unsafe {
            self.shape.call_drop_in_place(PtrMut::new(self.data.as_ptr()));
        }
        deallocate(self.data, self.layout);
    }
}

impl core::fmt::Debug for OwnedValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "OwnedValue<{}>", self.shape)
    }
}

fn allocate(layout: Layout) -> NonNull<u8> {
    if layout.size() == 0 {
        return NonNull::dangling();
    }
    // SAFETY: layout has non-zero size.
    let ptr = unsafe { std::alloc::alloc(layout) };
    match NonNull::new(ptr) {
        Some(ptr) => ptr,
        None => std::alloc::handle_alloc_error(layout),
    }
}

fn deallocate(ptr: NonNull<u8>, layout: Layout) {
    if layout.size() != 0 {
        // SAFETY: `ptr` was allocated by `allocate` with this layout.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}
