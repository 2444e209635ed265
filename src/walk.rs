//! The assignment walker: drives a directive value down a resolved path into
//! a live instance, materializing whatever is missing along the way.
//!
//! `None` intermediates become `Some(default)`, lists grow default elements
//! up to the requested index, and values that don't match the destination
//! shape are routed through the registry's conversion table before the final
//! write.

use facet_core::{Def, PtrMut, Shape};
use tracing::trace;

use crate::error::{BuildError, PathError};
use crate::path::{ResolvedPath, Step};
use crate::registry::Registry;
use crate::value::OwnedValue;

/// Assigns `value` to the destination `path` points at inside the instance
/// behind `root`.
///
/// # Safety-adjacent contract
///
/// `root` must point to a live instance of `root_shape`, and `path` must
/// have been resolved against the same shape. Both are guaranteed by the
/// builder, which is the only caller.
pub(crate) fn assign(
    root: PtrMut,
    root_shape: &'static Shape,
    path: &ResolvedPath,
    value: OwnedValue,
    registry: &Registry,
) -> Result<(), BuildError> {
    let mut ptr = root;
    let mut shape = root_shape;
    for step in &path.steps {
        (ptr, shape) = apply_step(ptr, shape, *step, path.key())?;
    }
    let value = adapt(value, shape, root_shape, path.key(), registry)?;
    // SAFETY: `ptr` points at live storage of `shape`, and `adapt` only
    // returns values whose shape is exactly `shape`. The old value is
    // dropped before the new one is moved in.
    unsafe {
        shape.call_drop_in_place(ptr);
        value.move_into(ptr.as_uninit());
    }
    Ok(())
}

/// One step down: returns the pointer and shape of the child node,
/// materializing it first if needed.
fn apply_step(
    ptr: PtrMut,
    shape: &'static Shape,
    step: Step,
    key: &str,
) -> Result<(PtrMut, &'static Shape), BuildError> {
    match step {
        Step::Field(field) => {
            // SAFETY: resolution found this field on `shape`, which `ptr`
            // points at, so the offset stays in bounds.
            let field_ptr = unsafe { ptr.as_uninit().field_init(field.offset) };
            Ok((field_ptr, field.shape()))
        }

        Step::SomeInner(inner) => {
            let Def::Option(od) = shape.def else {
                unreachable!("Some step recorded for non-option shape {shape}");
            };
            // SAFETY: `ptr` points at a live option of `shape`.
            if !unsafe { (od.vtable.is_some)(ptr.as_const()) } {
                let mut seed = OwnedValue::default_of(inner).ok_or_else(|| {
                    BuildError::ImplicitInstantiation {
                        key: key.to_string(),
                        shape: inner,
                    }
                })?;
                trace!(key, intermediate = %inner, "materializing missing intermediate");
                // SAFETY: `seed` holds a live payload value; `replace_with`
                // moves it into the option, so the seed's buffer is released
                // without dropping the moved-out contents.
                unsafe { (od.vtable.replace_with)(ptr, Some(seed.as_ptr_mut().as_const())) };
                seed.forget_contents();
            }
            // SAFETY: the option is Some at this point.
            let inner_const = unsafe { (od.vtable.get_value)(ptr.as_const()) }
                .expect("option is Some but get_value returned None");
            // SAFETY: the payload lives inside the option's storage, so the
            // offset between the two pointers is a valid field offset.
            let offset = unsafe {
                inner_const
                    .as_byte_ptr()
                    .offset_from(ptr.as_const().as_byte_ptr())
            } as usize;
            let inner_ptr = unsafe { ptr.as_uninit().field_init(offset) };
            Ok((inner_ptr, inner))
        }

        Step::Index(index) => match shape.def {
            Def::List(ld) => {
                let get_mut = ld.vtable.get_mut.ok_or_else(|| BuildError::CannotGrowList {
                    key: key.to_string(),
                    shape,
                })?;
                // SAFETY: `ptr` points at a live list of `shape`.
                let mut len = unsafe { (ld.vtable.len)(ptr.as_const()) };
                if index >= len {
                    let push = ld.push().ok_or_else(|| BuildError::CannotGrowList {
                        key: key.to_string(),
                        shape,
                    })?;
                    while len <= index {
                        let mut elem = OwnedValue::default_of(ld.t()).ok_or_else(|| {
                            BuildError::ImplicitInstantiation {
                                key: key.to_string(),
                                shape: ld.t(),
                            }
                        })?;
                        // SAFETY: `elem` holds a live element value, moved
                        // into the list; its buffer is released undropped.
                        unsafe { push(ptr, elem.as_ptr_mut()) };
                        elem.forget_contents();
                        len += 1;
                    }
                    trace!(key, list = %shape, len, "grew list with default elements");
                }
                // SAFETY: `index < len` after growth.
                let elem = unsafe { get_mut(ptr, index, shape) }.ok_or(
                    BuildError::IndexOutOfBounds {
                        key: key.to_string(),
                        shape,
                        index,
                        len,
                    },
                )?;
                Ok((elem, ld.t()))
            }
            Def::Array(ad) => {
                if index >= ad.n {
                    return Err(BuildError::IndexOutOfBounds {
                        key: key.to_string(),
                        shape,
                        index,
                        len: ad.n,
                    });
                }
                let elem_layout = ad.t().layout.sized_layout().map_err(|_| {
                    BuildError::ImplicitInstantiation {
                        key: key.to_string(),
                        shape: ad.t(),
                    }
                })?;
                // SAFETY: `index < n`, so the element offset stays inside
                // the array's storage.
                let elem_ptr =
                    unsafe { ptr.as_uninit().field_init(elem_layout.size() * index) };
                Ok((elem_ptr, ad.t()))
            }
            _ => Err(BuildError::Path(PathError::NotIndexable {
                path: key.to_string(),
                index,
                shape,
            })),
        },
    }
}

/// Brings `value` to exactly `dest` shape: identity, option wrapping, or a
/// registered conversion (possibly followed by option wrapping).
fn adapt(
    value: OwnedValue,
    dest: &'static Shape,
    owner: &'static Shape,
    key: &str,
    registry: &Registry,
) -> Result<OwnedValue, BuildError> {
    if value.shape() == dest {
        return Ok(value);
    }

    if let Def::Option(od) = dest.def {
        if od.t() == value.shape() {
            return wrap(dest, value, key);
        }
        if let Some(conversion) = registry.conversion(owner, value.shape(), od.t()) {
            trace!(key, source = %conversion.source, dest = %conversion.dest, "applying conversion");
            let converted = (conversion.apply)(value)?;
            return wrap(dest, converted, key);
        }
    }

    if let Some(conversion) = registry.conversion(owner, value.shape(), dest) {
        trace!(key, source = %conversion.source, dest = %conversion.dest, "applying conversion");
        let converted = (conversion.apply)(value)?;
        if converted.shape() == dest {
            return Ok(converted);
        }
        return Err(BuildError::ShapeMismatch {
            key: key.to_string(),
            expected: dest,
            actual: converted.shape(),
        });
    }

    Err(BuildError::NoConversionRegistered {
        owner,
        source: value.shape(),
        dest,
    })
}

fn wrap(dest: &'static Shape, value: OwnedValue, key: &str) -> Result<OwnedValue, BuildError> {
    OwnedValue::some_wrapping(dest, value).map_err(|value| BuildError::ShapeMismatch {
        key: key.to_string(),
        expected: dest,
        actual: value.shape(),
    })
}
