//! Path descriptors: parsing and resolution against a root [`Shape`].
//!
//! A path descriptor is a string like `customer.address.city` or
//! `lines[2].qty`. Resolution walks the root type's shape, validating every
//! segment eagerly and producing an ordered chain of [`Step`]s plus the
//! canonical key used for directive deduplication.

use facet_core::{Def, Field, Shape, Type, UserType};

use crate::error::PathError;

/// A single resolved step along a path.
///
/// `SomeInner` steps are inserted implicitly whenever resolution descends
/// through an `Option` intermediate — the caller writes `customer.address`,
/// not `customer::Some.address`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    /// Descend into a struct field.
    Field(&'static Field),
    /// Descend into the payload of an `Option`.
    SomeInner(&'static Shape),
    /// Descend to a list/array element.
    Index(usize),
}

/// A path descriptor resolved against a root shape.
///
/// Two descriptors are equal iff they resolve from the same root and render
/// to the same canonical key; resolution is deterministic, so resolving the
/// same string twice always yields equal paths.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    root: &'static Shape,
    pub(crate) steps: Vec<Step>,
    leaf: &'static Shape,
    key: String,
}

impl ResolvedPath {
    /// Resolve a path descriptor against a root shape.
    ///
    /// Every segment is validated here: unknown fields, field access on
    /// non-structs, indexing into non-lists, and malformed syntax all fail
    /// immediately with a [`PathError`] naming the offending segment.
    pub fn resolve(root: &'static Shape, path: &str) -> Result<Self, PathError> {
        let mut parser = Parser {
            path,
            bytes: path.as_bytes(),
            pos: 0,
        };
        let mut steps = Vec::new();
        let mut key = String::with_capacity(path.len());
        let mut current = root;

        let first = parser.ident()?;
        current = descend_field(path, current, first, &mut steps)?;
        key.push_str(first);

        loop {
            match parser.peek() {
                None => break,
                Some(b'.') => {
                    parser.pos += 1;
                    let name = parser.ident()?;
                    current = descend_field(path, current, name, &mut steps)?;
                    key.push('.');
                    key.push_str(name);
                }
                Some(b'[') => {
                    parser.pos += 1;
                    let index = parser.index()?;
                    parser.expect(b']')?;
                    current = descend_index(path, current, index, &mut steps)?;
                    key.push('[');
                    key.push_str(&index.to_string());
                    key.push(']');
                }
                Some(_) => {
                    return Err(PathError::Syntax {
                        path: path.to_string(),
                        offset: parser.pos,
                        expected: "`.` or `[`",
                    });
                }
            }
        }

        Ok(Self {
            root,
            steps,
            leaf: current,
            key,
        })
    }

    /// The root shape this path was resolved against.
    pub fn root(&self) -> &'static Shape {
        self.root
    }

    /// The declared shape of the destination the path points at.
    ///
    /// For a path ending on an `Option<T>` field this is `Option<T>`, not
    /// `T` — the final segment is never implicitly descended.
    pub fn leaf(&self) -> &'static Shape {
        self.leaf
    }

    /// The canonical string key for this path, e.g. `lines[2].qty`.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for ResolvedPath {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.root, other.root) && self.key == other.key
    }
}

impl Eq for ResolvedPath {}

impl core::fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Skip through `Option` layers, recording the implicit descents.
fn coerce_options(mut shape: &'static Shape, steps: &mut Vec<Step>) -> &'static Shape {
    while let Def::Option(od) = shape.def {
        steps.push(Step::SomeInner(od.t()));
        shape = od.t();
    }
    shape
}

fn descend_field(
    path: &str,
    shape: &'static Shape,
    name: &str,
    steps: &mut Vec<Step>,
) -> Result<&'static Shape, PathError> {
    let shape = coerce_options(shape, steps);
    match shape.ty {
        Type::User(UserType::Struct(st)) => {
            let field = st.fields.iter().find(|f| f.name == name).ok_or_else(|| {
                PathError::UnknownField {
                    path: path.to_string(),
                    segment: name.to_string(),
                    shape,
                }
            })?;
            steps.push(Step::Field(field));
            Ok(field.shape())
        }
        _ => Err(PathError::NotAStruct {
            path: path.to_string(),
            segment: name.to_string(),
            shape,
        }),
    }
}

fn descend_index(
    path: &str,
    shape: &'static Shape,
    index: usize,
    steps: &mut Vec<Step>,
) -> Result<&'static Shape, PathError> {
    let shape = coerce_options(shape, steps);
    let elem = match shape.def {
        Def::List(ld) => ld.t(),
        Def::Array(ad) => ad.t(),
        _ => {
            return Err(PathError::NotIndexable {
                path: path.to_string(),
                index,
                shape,
            });
        }
    };
    steps.push(Step::Index(index));
    Ok(elem)
}

struct Parser<'p> {
    path: &'p str,
    bytes: &'p [u8],
    pos: usize,
}

impl<'p> Parser<'p> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), PathError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(PathError::Syntax {
                path: self.path.to_string(),
                offset: self.pos,
                expected: "`]`",
            })
        }
    }

    fn ident(&mut self) -> Result<&'p str, PathError> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.pos += 1,
            _ => {
                return Err(PathError::Syntax {
                    path: self.path.to_string(),
                    offset: self.pos,
                    expected: "a field name",
                });
            }
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(&self.path[start..self.pos])
    }

    fn index(&mut self) -> Result<usize, PathError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.path[start..self.pos]
            .parse()
            .map_err(|_| PathError::Syntax {
                path: self.path.to_string(),
                offset: start,
                expected: "an index",
            })
    }
}
