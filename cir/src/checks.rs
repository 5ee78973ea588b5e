//! This module contains checks performed on the [`Cir`] at runtime. Should
//! these checks fail, the crate will panic.

use std::collections::HashSet;
use std::fmt::Debug;

use crate::{Cir, Kind, RefIdx};

impl<T: Debug> Cir<T> {
    /// Check that all origins in the [`Cir`] are unique
    ///
    /// # Panic
    ///
    /// This function panics if the provided [`Cir`] contains an origin that
    /// is present multiple times. [`Cir::append`] makes this impossible from
    /// the outside, but passes which pre-allocate origins can still collide.
    fn check_unique_origins(&self) {
        let mut origins = HashSet::new();
        self.nodes.iter().for_each(|kv| {
            let origin = kv.0;

            match origins.get(origin) {
                Some(_) => panic!("non-unique `OriginIdx` detected in `Cir`"),
                None => origins.insert(origin),
            };
        })
    }

    /// Check if the [`Cir`] only contains links between entities allowed to
    /// link together. For example, this asserts that there are no calls that
    /// have been resolved as calls to constant literals.
    ///
    /// # Panic
    ///
    /// This function panics if the provided [`Cir`] contains invalid
    /// relationships.
    fn check_valid_links(&self) {
        macro_rules! check {
            ($ref:expr => Some ( $kind:pat ), $node:expr) => {
                if let Some(_e) = $ref {
                    check!(_e => $kind, $node)
                }
            };
            ($ref:expr => $kind:pat, $node:expr) => {
                if let RefIdx::Resolved(origin) = $ref {
                    match self.nodes[&origin].kind {
                        $kind => {}
                        _ => panic!("invalid relationship detected in `Cir`:\n\n{:#?}\n\nrefers to\n\n{:#?}\n\n[reference: {:?}]", $node, self.nodes[&origin], $ref),
                    }
                }
            };
            (@$iter:expr => $kind:pat, $node:expr) => {
                $iter.iter().for_each(|value| check!(value => $kind, $node))
            };
        }

        // The type-annotation kinds, which every `ty`-ish reference must
        // point to
        macro_rules! annotation {
            () => {
                Kind::TypeReference { .. }
                    | Kind::ArrayType { .. }
                    | Kind::SequenceType { .. }
                    | Kind::NullableType { .. }
                    | Kind::FunctionType { .. }
                    | Kind::Generic { .. }
                    | Kind::RecordType { .. }
            };
        }

        self.nodes.iter().for_each(|kv| {
            let node = &kv.1;
            match &node.kind {
                Kind::Constant(r) => check!(r => Kind::RecordType { .. }, node),
                Kind::TypeReference { to, args } => {
                    check!(to => Kind::RecordType { .. } | Kind::Generic { .. }, node);
                    check!(@args => annotation!(), node);
                }
                Kind::ArrayType { element, size: _ } => {
                    check!(element => annotation!(), node)
                }
                Kind::SequenceType { element } => check!(element => annotation!(), node),
                Kind::NullableType { inner } => check!(inner => annotation!(), node),
                Kind::FunctionType { args, return_type } => {
                    check!(@args => annotation!(), node);
                    check!(return_type => Some(annotation!()), node);
                }
                Kind::Generic { bound: _ } => {}
                Kind::RecordType {
                    generics,
                    fields,
                    methods,
                    capabilities: _,
                } => {
                    check!(@generics => Kind::Generic { .. }, node);
                    check!(@fields => Kind::TypedValue { .. }, node);
                    check!(@methods => Kind::Function { .. }, node);
                }
                Kind::TypedValue { ty } => check!(ty => annotation!(), node),
                Kind::Function {
                    generics,
                    args,
                    return_type,
                    block,
                } => {
                    check!(@generics => Kind::Generic { .. }, node);
                    check!(@args => Kind::TypedValue { .. }, node);
                    check!(return_type => Some(annotation!()), node);
                    check!(block => Some(Kind::Statements(_)), node);
                }
                Kind::Binding { value: _, ty } => {
                    // `value` can link to basically anything
                    check!(ty => Some(annotation!()), node);
                }
                Kind::NodeRef(to) => {
                    // a bare function name used as a value links straight to
                    // its declaration
                    check!(to => Kind::Binding { .. } | Kind::TypedValue { .. } | Kind::Function { .. }, node)
                }
                Kind::Assignment { to, from: _ } => {
                    check!(to => Kind::NodeRef(_) | Kind::Index { .. } | Kind::FieldAccess { .. }, node);
                }
                Kind::Instantiation {
                    to,
                    generics,
                    fields: _,
                } => {
                    // instantiating a type parameter stays legal until
                    // monomorphization rewrites it to the bound class
                    check!(to => Kind::RecordType { .. } | Kind::Generic { .. }, node);
                    check!(@generics => annotation!(), node);
                }
                Kind::Call {
                    to,
                    generics,
                    args: _,
                } => {
                    // calls go to functions or to function-valued slots
                    check!(to => Kind::Function { .. } | Kind::Binding { .. } | Kind::TypedValue { .. }, node);
                    check!(@generics => annotation!(), node);
                }
                Kind::FieldAccess { instance: _ } => {}
                Kind::Statements(_) => {}
                Kind::Conditional {
                    condition: _,
                    true_block,
                    false_block,
                } => {
                    check!(true_block => Kind::Statements(_), node);
                    check!(false_block => Some(Kind::Statements(_)), node);
                }
                Kind::NullTest { on: _, negated: _ } => {}
                Kind::ForLoop {
                    index,
                    value,
                    subject: _,
                    block,
                } => {
                    check!(index => Some(Kind::TypedValue { .. }), node);
                    check!(value => Kind::TypedValue { .. }, node);
                    check!(block => Kind::Statements(_), node);
                }
                // Return statements can point to anything
                Kind::Return(_) => {}
                Kind::Index {
                    container: _,
                    index: _,
                } => {}
                Kind::Default => {}
                Kind::SequenceLiteral { elements: _ } => {}
            }
        })
    }

    /// Check that the [`Cir`] is in a valid state. This means that all
    /// [`OriginIdx`] should be unique, and that all links between nodes
    /// should be allowed
    ///
    /// # Panic
    ///
    /// This function panics if the [`Cir`] is in a state deemed invalid
    pub fn check(&self) {
        self.check_unique_origins();
        self.check_valid_links();
    }
}
