//! Canonical type values. Where the graph stores type *annotations* (nodes
//! referring to other nodes), passes compare and store [`Type`]s: owned,
//! structural values with no references into the graph left except
//! declaration identities. Two `int{}` annotations written in different
//! places produce equal [`Type`]s; two classes with the same name declared in
//! different scopes do not.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use cir::OriginIdx;
use error::{ErrKind, Error};
use symbol::Symbol;

pub mod builder;
pub mod capability;
pub mod primitives;

pub use capability::{Capabilities, Capability};
pub use primitives::PrimitiveTypes;

/// The builtin value types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Float,
    Bool,
    Char,
    String,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::String => "string",
        }
    }
}

/// Identity of a declaration: the origin of its node in the graph. The name
/// rides along for diagnostics and mangling but takes no part in equality or
/// hashing, so two declarations sharing a name stay distinct and a renamed
/// specialization stays equal to itself.
#[derive(Clone, Copy, Debug)]
pub struct DeclId {
    pub origin: OriginIdx,
    pub name: Symbol,
}

impl PartialEq for DeclId {
    fn eq(&self, other: &DeclId) -> bool {
        self.origin == other.origin
    }
}

impl Eq for DeclId {}

impl Hash for DeclId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.origin.hash(state)
    }
}

/// A fully built type. Equality and hashing are structural, which is what
/// makes the instantiation cache work: `Pair[int]` requested from two
/// different call sites is one key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    /// `[T; N]`. The length is part of the type: `[int; 4]` and `[int; 5]`
    /// do not compare equal
    FixedArray(Box<Type>, usize),
    /// `T{}`
    Sequence(Box<Type>),
    /// `T?`
    Nullable(Box<Type>),
    /// `func(T, U) -> V`
    Function(Vec<Type>, Option<Box<Type>>),
    /// A class, possibly specialized
    Record(DeclId, Vec<Type>),
    /// An in-scope type parameter
    Parameter(DeclId),
    /// The type of the bare `None` literal, assignable to every nullable
    None,
}

impl Type {
    /// Element type of a container, if the type is one
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::FixedArray(element, _) | Type::Sequence(element) => Some(element),
            _ => None,
        }
    }

    /// The type a nullable value has once proven non-null; every other type
    /// is its own narrowing. Type-level passes compare narrowed types and
    /// leave proving the narrowing to the nullability pass.
    pub fn narrowed(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Replace every [`Type::Parameter`] with its binding, recursing through
    /// all constructors. Fully concrete types come back unchanged, which
    /// makes the operation idempotent. A parameter without a binding is an
    /// error: substitution never partially applies.
    pub fn substitute(&self, bindings: &HashMap<OriginIdx, Type>) -> Result<Type, Error> {
        let substitute_all = |types: &[Type]| {
            types
                .iter()
                .map(|ty| ty.substitute(bindings))
                .collect::<Result<Vec<Type>, Error>>()
        };

        match self {
            Type::Parameter(decl) => bindings.get(&decl.origin).cloned().ok_or_else(|| {
                Error::new(ErrKind::UnboundTypeParameter).with_msg(format!(
                    "no type argument bound to parameter `{}`",
                    decl.name
                ))
            }),
            Type::Primitive(_) | Type::None => Ok(self.clone()),
            Type::FixedArray(element, size) => Ok(Type::FixedArray(
                Box::new(element.substitute(bindings)?),
                *size,
            )),
            Type::Sequence(element) => Ok(Type::Sequence(Box::new(element.substitute(bindings)?))),
            Type::Nullable(inner) => Ok(Type::Nullable(Box::new(inner.substitute(bindings)?))),
            Type::Function(args, return_type) => Ok(Type::Function(
                substitute_all(args)?,
                return_type
                    .as_ref()
                    .map(|ty| ty.substitute(bindings).map(Box::new))
                    .transpose()?,
            )),
            Type::Record(decl, args) => Ok(Type::Record(*decl, substitute_all(args)?)),
        }
    }
}

/// Match a declared type against an actual one, recording what each type
/// parameter must be for the two to line up. The first binding wins: a
/// conflicting pair leaves the earlier binding in place, and the mismatch
/// surfaces as an ordinary type error once the binding is applied. Shapes
/// that do not line up bind nothing, for the same reason.
pub fn unify(declared: &Type, actual: &Type, bindings: &mut HashMap<OriginIdx, Type>) {
    match (declared, actual) {
        (Type::Parameter(param), actual) => {
            bindings
                .entry(param.origin)
                .or_insert_with(|| actual.clone());
        }
        (Type::FixedArray(declared, _), Type::FixedArray(actual, _))
        | (Type::Sequence(declared), Type::Sequence(actual))
        | (Type::Nullable(declared), Type::Nullable(actual)) => {
            unify(declared, actual, bindings)
        }
        (Type::Function(declared_args, declared_ret), Type::Function(actual_args, actual_ret)) => {
            declared_args
                .iter()
                .zip(actual_args)
                .for_each(|(declared, actual)| unify(declared, actual, bindings));

            if let (Some(declared), Some(actual)) = (declared_ret, actual_ret) {
                unify(declared, actual, bindings);
            }
        }
        (Type::Record(_, declared_args), Type::Record(_, actual_args)) => {
            declared_args
                .iter()
                .zip(actual_args)
                .for_each(|(declared, actual)| unify(declared, actual, bindings));
        }
        _ => {}
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.name()),
            Type::FixedArray(element, size) => write!(f, "[{element}; {size}]"),
            Type::Sequence(element) => write!(f, "{element}{{}}"),
            Type::Nullable(inner) => write!(f, "{inner}?"),
            Type::Function(args, return_type) => {
                let args = args
                    .iter()
                    .map(Type::to_string)
                    .collect::<Vec<String>>()
                    .join(", ");

                match return_type {
                    Some(ty) => write!(f, "func({args}) -> {ty}"),
                    None => write!(f, "func({args})"),
                }
            }
            Type::Record(decl, args) if args.is_empty() => write!(f, "{}", decl.name),
            Type::Record(decl, args) => {
                let args = args
                    .iter()
                    .map(Type::to_string)
                    .collect::<Vec<String>>()
                    .join(", ");

                write!(f, "{}[{args}]", decl.name)
            }
            Type::Parameter(decl) => write!(f, "{}", decl.name),
            Type::None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(origin: u64, name: &str) -> DeclId {
        DeclId {
            origin: OriginIdx(origin),
            name: Symbol::from(name),
        }
    }

    #[test]
    fn array_length_is_part_of_identity() {
        let four = Type::FixedArray(Box::new(Type::Primitive(Primitive::Int)), 4);
        let five = Type::FixedArray(Box::new(Type::Primitive(Primitive::Int)), 5);

        assert_ne!(four, five);
        assert_eq!(four, four.clone());
    }

    #[test]
    fn nullable_differs_from_inner() {
        let int = Type::Primitive(Primitive::Int);
        let maybe_int = Type::Nullable(Box::new(int.clone()));

        assert_ne!(int, maybe_int);
    }

    #[test]
    fn declarations_compare_by_origin_not_name() {
        let a = Type::Record(decl(1, "Pair"), vec![]);
        let b = Type::Record(decl(2, "Pair"), vec![]);
        let renamed = Type::Record(decl(1, "Pair+int"), vec![]);

        assert_ne!(a, b);
        assert_eq!(a, renamed);
    }

    #[test]
    fn substitution_replaces_parameters_everywhere() {
        let param = Type::Parameter(decl(7, "T"));
        let ty = Type::Function(
            vec![Type::Sequence(Box::new(param.clone()))],
            Some(Box::new(Type::Nullable(Box::new(param)))),
        );

        let mut bindings = HashMap::new();
        bindings.insert(OriginIdx(7), Type::Primitive(Primitive::Float));

        let substituted = ty.substitute(&bindings).unwrap();

        assert_eq!(
            substituted,
            Type::Function(
                vec![Type::Sequence(Box::new(Type::Primitive(Primitive::Float)))],
                Some(Box::new(Type::Nullable(Box::new(Type::Primitive(
                    Primitive::Float
                ))))),
            )
        );
    }

    #[test]
    fn substitution_is_idempotent_on_concrete_types() {
        let concrete = Type::FixedArray(Box::new(Type::Primitive(Primitive::Char)), 12);

        let mut bindings = HashMap::new();
        bindings.insert(OriginIdx(7), Type::Primitive(Primitive::Int));

        assert_eq!(concrete.substitute(&bindings).unwrap(), concrete);
        assert_eq!(concrete.substitute(&HashMap::new()).unwrap(), concrete);
    }

    #[test]
    fn unbound_parameter_is_an_error() {
        let param = Type::Parameter(decl(7, "T"));

        let err = param.substitute(&HashMap::new()).unwrap_err();

        assert_eq!(err.kind(), &ErrKind::UnboundTypeParameter);
    }

    #[test]
    fn substitution_recurses_into_record_arguments() {
        let ty = Type::Record(decl(3, "Pair"), vec![Type::Parameter(decl(7, "T"))]);

        let mut bindings = HashMap::new();
        bindings.insert(OriginIdx(7), Type::Primitive(Primitive::Bool));

        assert_eq!(
            ty.substitute(&bindings).unwrap(),
            Type::Record(decl(3, "Pair"), vec![Type::Primitive(Primitive::Bool)])
        );
    }

    #[test]
    fn unification_binds_parameters_structurally() {
        let param = Type::Parameter(decl(7, "T"));
        let declared = Type::Function(
            vec![Type::Sequence(Box::new(param.clone()))],
            Some(Box::new(param)),
        );
        let actual = Type::Function(
            vec![Type::Sequence(Box::new(Type::Primitive(Primitive::Int)))],
            Some(Box::new(Type::Primitive(Primitive::Int))),
        );

        let mut bindings = HashMap::new();
        unify(&declared, &actual, &mut bindings);

        assert_eq!(bindings.get(&OriginIdx(7)), Some(&Type::Primitive(Primitive::Int)));
    }

    #[test]
    fn unification_keeps_the_first_binding() {
        let param = Type::Parameter(decl(7, "T"));
        let declared = Type::Function(vec![param.clone(), param], None);
        let actual = Type::Function(
            vec![
                Type::Primitive(Primitive::Int),
                Type::Primitive(Primitive::Float),
            ],
            None,
        );

        let mut bindings = HashMap::new();
        unify(&declared, &actual, &mut bindings);

        // the conflict surfaces as a type mismatch once `int` is applied
        assert_eq!(bindings.get(&OriginIdx(7)), Some(&Type::Primitive(Primitive::Int)));
    }

    #[test]
    fn unification_ignores_mismatched_shapes() {
        let param = Type::Parameter(decl(7, "T"));
        let declared = Type::Sequence(Box::new(param));

        let mut bindings = HashMap::new();
        unify(&declared, &Type::Primitive(Primitive::Int), &mut bindings);

        assert!(bindings.is_empty());
    }

    #[test]
    fn display_renders_surface_syntax() {
        let int = Type::Primitive(Primitive::Int);

        assert_eq!(
            format!("{}", Type::FixedArray(Box::new(int.clone()), 4)),
            "[int; 4]"
        );
        assert_eq!(format!("{}", Type::Sequence(Box::new(int.clone()))), "int{}");
        assert_eq!(format!("{}", Type::Nullable(Box::new(int.clone()))), "int?");
        assert_eq!(
            format!(
                "{}",
                Type::Function(vec![int.clone()], Some(Box::new(int.clone())))
            ),
            "func(int) -> int"
        );
        assert_eq!(
            format!("{}", Type::Record(decl(1, "Pair"), vec![int])),
            "Pair[int]"
        );
    }
}
