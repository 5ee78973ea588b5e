//! First inference stage: record, for every node whose type is not purely
//! structural, *where* its type comes from. Literals know their type on
//! sight, uses share their target's, calls take their callee's return type,
//! loop variables take the subject's element type, and contextual
//! initializers wait for the enclosing binding's annotation. The
//! [`crate::actual`] stage then turns these facts into canonical types.

use std::collections::HashMap;
use std::convert::Infallible;

use cir::{Cir, Fallible, Kind, Node, OriginIdx, RefIdx, Traversal};
use flatten::{AstInfo, FlattenData};
use types::{Primitive, Type};

#[derive(Debug, Clone)]
pub(crate) enum TypeVariable {
    /// The node shares the type of the node it links to
    Reference(RefIdx),
    /// The node's type is known on sight
    Actual(Type),
    /// The node has the return type of the declaration it calls
    ReturnOf(RefIdx),
    /// The node has the element type of a container-typed node
    ElementOf(RefIdx),
    /// The node takes its type from the enclosing binding's annotation
    Contextual { annotation: Option<RefIdx> },
}

#[derive(Default)]
pub(crate) struct Typer {
    pub(crate) variables: HashMap<OriginIdx, TypeVariable>,
}

impl Typer {
    fn assign(&mut self, origin: OriginIdx, variable: TypeVariable) {
        self.variables.insert(origin, variable);
    }
}

impl Traversal<FlattenData<'_>, Infallible> for Typer {
    fn traverse_constant(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        _constant: &RefIdx,
    ) -> Fallible<Infallible> {
        let value = match &node.data.ast {
            AstInfo::Node(ast::Ast {
                node: ast::Node::Constant(value),
                ..
            }) => value,
            _ => unreachable!("constant node without a literal. this is an interpreter error"),
        };

        let ty = match value {
            ast::Value::Integer(_) => Type::Primitive(Primitive::Int),
            ast::Value::Float(_) => Type::Primitive(Primitive::Float),
            ast::Value::Bool(_) => Type::Primitive(Primitive::Bool),
            ast::Value::Char(_) => Type::Primitive(Primitive::Char),
            ast::Value::Str(_) => Type::Primitive(Primitive::String),
            // `None` is not contextual - it has its own type, assignable to
            // every nullable
            ast::Value::None => Type::None,
        };

        self.assign(node.origin, TypeVariable::Actual(ty));

        Ok(())
    }

    fn traverse_typed_value(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        ty: &RefIdx,
    ) -> Fallible<Infallible> {
        // loop variables keep an unresolved annotation link; the loop they
        // belong to assigns them instead
        if let RefIdx::Resolved(_) = ty {
            self.assign(node.origin, TypeVariable::Reference(*ty));
        }

        Ok(())
    }

    fn traverse_node_ref(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
    ) -> Fallible<Infallible> {
        self.assign(node.origin, TypeVariable::Reference(*to));

        Ok(())
    }

    fn traverse_call(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
        _generics: &[RefIdx],
        _args: &[RefIdx],
    ) -> Fallible<Infallible> {
        // method calls stay untyped until the dispatcher resolves them
        if let RefIdx::Resolved(_) = to {
            self.assign(node.origin, TypeVariable::ReturnOf(*to));
        }

        Ok(())
    }

    fn traverse_null_test(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        _on: &RefIdx,
        _negated: bool,
    ) -> Fallible<Infallible> {
        self.assign(
            node.origin,
            TypeVariable::Actual(Type::Primitive(Primitive::Bool)),
        );

        Ok(())
    }

    fn traverse_for_loop(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        _node: &Node<FlattenData<'_>>,
        index: &Option<RefIdx>,
        value: &RefIdx,
        subject: &RefIdx,
        _block: &RefIdx,
    ) -> Fallible<Infallible> {
        if let Some(index) = index {
            self.assign(
                index.expect_resolved(),
                TypeVariable::Actual(Type::Primitive(Primitive::Int)),
            );
        }

        self.assign(value.expect_resolved(), TypeVariable::ElementOf(*subject));

        Ok(())
    }

    fn traverse_binding(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        _node: &Node<FlattenData<'_>>,
        value: &RefIdx,
        ty: &Option<RefIdx>,
    ) -> Fallible<Infallible> {
        // contextual initializers - `default` and the empty sequence
        // literal - take the binding's annotated type
        let is_contextual = match &cir[value].kind {
            Kind::Default => true,
            Kind::SequenceLiteral { elements } => elements.is_empty(),
            _ => false,
        };

        if is_contextual {
            self.assign(
                value.expect_resolved(),
                TypeVariable::Contextual { annotation: *ty },
            );
        }

        Ok(())
    }
}
