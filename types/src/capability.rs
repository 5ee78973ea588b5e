//! The closed set of constraints a generic bound can name, and the registry
//! recording which declarations announce which of them. Satisfaction is
//! nominal on both sides: primitives satisfy a fixed table, classes satisfy
//! exactly what they declare, and everything else satisfies nothing. There
//! is no structural inference - a class with an `__add__` method does not
//! become `Number` by accident.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use cir::{Cir, Fallible, Node, OriginIdx, RefIdx, Traversal};
use error::{ErrKind, Error};
use flatten::FlattenData;
use location::SpanTuple;
use symbol::Symbol;

use crate::{Primitive, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    Integer,
    Number,
    Comparable,
    Ordered,
}

impl Capability {
    /// Bounds and capability lists arrive as plain names; an unknown name is
    /// a definition error reported by the caller
    pub fn try_from_str(s: &str) -> Option<Capability> {
        match s {
            "Integer" => Some(Capability::Integer),
            "Number" => Some(Capability::Number),
            "Comparable" => Some(Capability::Comparable),
            "Ordered" => Some(Capability::Ordered),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Integer => "Integer",
            Capability::Number => "Number",
            Capability::Comparable => "Comparable",
            Capability::Ordered => "Ordered",
        }
    }

    /// Which primitives satisfy the capability
    fn primitives(self) -> &'static [Primitive] {
        use Primitive::*;

        match self {
            Capability::Integer => &[Int],
            Capability::Number => &[Int, Float],
            Capability::Comparable => &[Int, Float, Bool, Char, String],
            Capability::Ordered => &[Int, Float, Char, String],
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capabilities declared by user classes and by bounded type parameters,
/// keyed by the declaring node. Collected once per run before any bound is
/// checked.
#[derive(Default, Debug)]
pub struct Capabilities {
    declared: HashMap<OriginIdx, Vec<Capability>>,
}

impl Capabilities {
    pub fn declare(&mut self, origin: OriginIdx, capability: Capability) {
        self.declared.entry(origin).or_default().push(capability);
    }

    pub fn declared(&self, origin: &OriginIdx) -> &[Capability] {
        self.declared
            .get(origin)
            .map_or(&[], |capabilities| capabilities.as_slice())
    }

    pub fn satisfies(&self, ty: &Type, capability: Capability) -> bool {
        match ty {
            Type::Primitive(p) => capability.primitives().contains(p),
            // a record satisfies what its declaration lists; a parameter
            // satisfies what its bound names
            Type::Record(decl, _) | Type::Parameter(decl) => self
                .declared
                .get(&decl.origin)
                .map_or(false, |capabilities| capabilities.contains(&capability)),
            Type::FixedArray(..)
            | Type::Sequence(_)
            | Type::Nullable(_)
            | Type::Function(..)
            | Type::None => false,
        }
    }
}

fn unknown_capability(name: &Symbol, loc: &SpanTuple, usage: String) -> Error {
    Error::new(ErrKind::UnknownCapability)
        .with_msg(format!("unknown capability `{name}` {usage}"))
        .with_loc(Some(loc.clone()))
        .with_hint(Error::hint().with_msg(String::from(
            "valid capabilities are `Integer`, `Number`, `Comparable` and `Ordered`",
        )))
}

/// Walks every class declaration and every bounded type parameter, recording
/// their capability names in the registry
struct Collector(Capabilities);

impl Traversal<FlattenData<'_>, Error> for Collector {
    fn traverse_record_type(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        _generics: &[RefIdx],
        _fields: &[RefIdx],
        _methods: &[RefIdx],
        capabilities: &[Symbol],
    ) -> Fallible<Error> {
        let ast = &node.data.ast;
        // class declarations always carry a name
        let class = ast.symbol().unwrap();

        let mut errs = capabilities
            .iter()
            .filter_map(|name| match Capability::try_from_str(name.access()) {
                Some(capability) => {
                    self.0.declare(node.origin, capability);
                    None
                }
                None => Some(unknown_capability(
                    name,
                    ast.location(),
                    format!("declared on class `{class}`"),
                )),
            })
            .collect::<Vec<Error>>();

        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.swap_remove(0)),
            _ => Err(Error::new(ErrKind::Multiple(errs))),
        }
    }

    fn traverse_generic(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        bound: &Option<Symbol>,
    ) -> Fallible<Error> {
        let bound = match bound {
            Some(bound) => bound,
            None => return Ok(()),
        };

        match Capability::try_from_str(bound.access()) {
            Some(capability) => {
                self.0.declare(node.origin, capability);
                Ok(())
            }
            None => {
                // type parameters always carry a name
                let name = node.data.ast.symbol().unwrap();

                Err(unknown_capability(
                    bound,
                    node.data.ast.location(),
                    format!("used as a bound on type parameter `{name}`"),
                ))
            }
        }
    }
}

/// Collect the capability declarations of the whole program. Unknown names
/// are definition errors and all of them get reported in one run.
pub fn collect(cir: &Cir<FlattenData<'_>>) -> Result<Capabilities, Error> {
    let mut collector = Collector(Capabilities::default());

    collector
        .traverse(cir)
        .map_err(|errs| Error::new(ErrKind::Multiple(errs)))?;

    Ok(collector.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeclId;
    use symbol::Symbol;

    fn primitive(p: Primitive) -> Type {
        Type::Primitive(p)
    }

    #[test]
    fn primitive_table() {
        let registry = Capabilities::default();

        assert!(registry.satisfies(&primitive(Primitive::Int), Capability::Integer));
        assert!(registry.satisfies(&primitive(Primitive::Int), Capability::Number));
        assert!(registry.satisfies(&primitive(Primitive::Int), Capability::Comparable));
        assert!(registry.satisfies(&primitive(Primitive::Int), Capability::Ordered));

        assert!(!registry.satisfies(&primitive(Primitive::Float), Capability::Integer));
        assert!(registry.satisfies(&primitive(Primitive::Float), Capability::Number));

        assert!(registry.satisfies(&primitive(Primitive::Bool), Capability::Comparable));
        assert!(!registry.satisfies(&primitive(Primitive::Bool), Capability::Ordered));

        assert!(registry.satisfies(&primitive(Primitive::String), Capability::Ordered));
        assert!(!registry.satisfies(&primitive(Primitive::String), Capability::Number));
    }

    #[test]
    fn records_satisfy_what_they_declare() {
        let mut registry = Capabilities::default();

        let meters = DeclId {
            origin: OriginIdx(4),
            name: Symbol::from("Meters"),
        };

        registry.declare(meters.origin, Capability::Number);

        assert!(registry.satisfies(&Type::Record(meters, vec![]), Capability::Number));
        assert!(!registry.satisfies(&Type::Record(meters, vec![]), Capability::Ordered));

        let undeclared = DeclId {
            origin: OriginIdx(9),
            name: Symbol::from("Pair"),
        };

        assert!(!registry.satisfies(&Type::Record(undeclared, vec![]), Capability::Number));
    }

    #[test]
    fn structural_types_satisfy_nothing() {
        let registry = Capabilities::default();
        let int = primitive(Primitive::Int);

        // `int?` is not a number even though `int` is
        assert!(!registry.satisfies(
            &Type::Nullable(Box::new(int.clone())),
            Capability::Number
        ));
        assert!(!registry.satisfies(
            &Type::Sequence(Box::new(int.clone())),
            Capability::Comparable
        ));
        assert!(!registry.satisfies(&Type::FixedArray(Box::new(int), 3), Capability::Number));
        assert!(!registry.satisfies(&Type::None, Capability::Comparable));
    }

    #[test]
    fn spelling_round_trip() {
        for capability in [
            Capability::Integer,
            Capability::Number,
            Capability::Comparable,
            Capability::Ordered,
        ] {
            assert_eq!(
                Capability::try_from_str(capability.as_str()),
                Some(capability)
            );
        }

        assert_eq!(Capability::try_from_str("Iterable"), None);
    }

    #[test]
    fn collects_classes_and_bounds() {
        use ast::builder::*;
        use cir::Kind;
        use flatten::FlattenAst;

        let ast = block(vec![
            class(
                "Meters",
                vec![],
                vec!["Number", "Comparable"],
                vec![argument("value", ty("int"))],
                vec![],
            ),
            function(
                "smallest",
                vec![bounded_generic("T", "Ordered")],
                vec![argument("lhs", ty("T")), argument("rhs", ty("T"))],
                Some(ty("T")),
                expr_block(vec![var("lhs")]),
            ),
        ]);

        let cir = ast.flatten();
        let registry = collect(&cir).unwrap();

        let class_origin = cir
            .nodes
            .values()
            .find_map(|node| matches!(node.kind, Kind::RecordType { .. }).then_some(node.origin))
            .unwrap();
        let meters = Type::Record(
            DeclId {
                origin: class_origin,
                name: Symbol::from("Meters"),
            },
            vec![],
        );

        assert!(registry.satisfies(&meters, Capability::Number));
        assert!(registry.satisfies(&meters, Capability::Comparable));
        assert!(!registry.satisfies(&meters, Capability::Ordered));

        let bound_origin = cir
            .nodes
            .values()
            .find_map(|node| matches!(node.kind, Kind::Generic { .. }).then_some(node.origin))
            .unwrap();

        assert_eq!(registry.declared(&bound_origin), &[Capability::Ordered]);
    }

    #[test]
    fn unknown_capability_on_class() {
        use ast::builder::*;
        use flatten::FlattenAst;

        let ast = block(vec![class("Matrix", vec![], vec!["Iterable"], vec![], vec![])]);

        let cir = ast.flatten();

        assert!(collect(&cir).is_err());
    }

    #[test]
    fn unknown_bound_name() {
        use ast::builder::*;
        use flatten::FlattenAst;

        let ast = block(vec![function(
            "twice",
            vec![bounded_generic("T", "Addable")],
            vec![argument("x", ty("T"))],
            Some(ty("T")),
            expr_block(vec![var("x")]),
        )]);

        let cir = ast.flatten();

        assert!(collect(&cir).is_err());
    }
}
