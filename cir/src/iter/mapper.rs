use std::fmt::Debug;

use crate::iter::Incomplete;
use crate::{Cir, Kind, Node, OriginIdx, RefIdx};
use symbol::Symbol;

/// 1:1 rewrite of a [`Cir`]. Each node maps to exactly one new node; per-kind
/// methods default to keeping the node as-is with its data converted through
/// [`Mapper::map_data`]. Failed nodes are dropped from the output, and their
/// errors collected into an [`Incomplete`] alongside the partial graph.
pub trait Mapper<T: Debug, U: Debug, E> {
    /// How node data crosses the mapping. Identity for passes which keep the
    /// data type unchanged
    fn map_data(&mut self, data: T) -> U;

    fn map_constant(
        &mut self,
        data: T,
        origin: OriginIdx,
        constant: RefIdx,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Constant(constant),
        })
    }

    fn map_type_reference(
        &mut self,
        data: T,
        origin: OriginIdx,
        to: RefIdx,
        args: Vec<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::TypeReference { to, args },
        })
    }

    fn map_array_type(
        &mut self,
        data: T,
        origin: OriginIdx,
        element: RefIdx,
        size: usize,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::ArrayType { element, size },
        })
    }

    fn map_sequence_type(
        &mut self,
        data: T,
        origin: OriginIdx,
        element: RefIdx,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::SequenceType { element },
        })
    }

    fn map_nullable_type(
        &mut self,
        data: T,
        origin: OriginIdx,
        inner: RefIdx,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::NullableType { inner },
        })
    }

    fn map_function_type(
        &mut self,
        data: T,
        origin: OriginIdx,
        args: Vec<RefIdx>,
        return_type: Option<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::FunctionType { args, return_type },
        })
    }

    fn map_generic(
        &mut self,
        data: T,
        origin: OriginIdx,
        bound: Option<Symbol>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Generic { bound },
        })
    }

    fn map_record_type(
        &mut self,
        data: T,
        origin: OriginIdx,
        generics: Vec<RefIdx>,
        fields: Vec<RefIdx>,
        methods: Vec<RefIdx>,
        capabilities: Vec<Symbol>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::RecordType {
                generics,
                fields,
                methods,
                capabilities,
            },
        })
    }

    fn map_typed_value(&mut self, data: T, origin: OriginIdx, ty: RefIdx) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::TypedValue { ty },
        })
    }

    fn map_function(
        &mut self,
        data: T,
        origin: OriginIdx,
        generics: Vec<RefIdx>,
        args: Vec<RefIdx>,
        return_type: Option<RefIdx>,
        block: Option<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Function {
                generics,
                args,
                return_type,
                block,
            },
        })
    }

    fn map_binding(
        &mut self,
        data: T,
        origin: OriginIdx,
        value: RefIdx,
        ty: Option<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Binding { value, ty },
        })
    }

    fn map_node_ref(&mut self, data: T, origin: OriginIdx, to: RefIdx) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::NodeRef(to),
        })
    }

    fn map_assignment(
        &mut self,
        data: T,
        origin: OriginIdx,
        to: RefIdx,
        from: RefIdx,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Assignment { to, from },
        })
    }

    fn map_instantiation(
        &mut self,
        data: T,
        origin: OriginIdx,
        to: RefIdx,
        generics: Vec<RefIdx>,
        fields: Vec<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Instantiation {
                to,
                generics,
                fields,
            },
        })
    }

    fn map_call(
        &mut self,
        data: T,
        origin: OriginIdx,
        to: RefIdx,
        generics: Vec<RefIdx>,
        args: Vec<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Call { to, generics, args },
        })
    }

    fn map_field_access(
        &mut self,
        data: T,
        origin: OriginIdx,
        instance: RefIdx,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::FieldAccess { instance },
        })
    }

    fn map_statements(
        &mut self,
        data: T,
        origin: OriginIdx,
        stmts: Vec<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Statements(stmts),
        })
    }

    fn map_condition(
        &mut self,
        data: T,
        origin: OriginIdx,
        condition: RefIdx,
        true_block: RefIdx,
        false_block: Option<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Conditional {
                condition,
                true_block,
                false_block,
            },
        })
    }

    fn map_null_test(
        &mut self,
        data: T,
        origin: OriginIdx,
        on: RefIdx,
        negated: bool,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::NullTest { on, negated },
        })
    }

    fn map_for_loop(
        &mut self,
        data: T,
        origin: OriginIdx,
        index: Option<RefIdx>,
        value: RefIdx,
        subject: RefIdx,
        block: RefIdx,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::ForLoop {
                index,
                value,
                subject,
                block,
            },
        })
    }

    fn map_return(
        &mut self,
        data: T,
        origin: OriginIdx,
        expr: Option<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Return(expr),
        })
    }

    fn map_index(
        &mut self,
        data: T,
        origin: OriginIdx,
        container: RefIdx,
        index: RefIdx,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Index { container, index },
        })
    }

    fn map_default(&mut self, data: T, origin: OriginIdx) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::Default,
        })
    }

    fn map_sequence_literal(
        &mut self,
        data: T,
        origin: OriginIdx,
        elements: Vec<RefIdx>,
    ) -> Result<Node<U>, E> {
        Ok(Node {
            data: self.map_data(data),
            origin,
            kind: Kind::SequenceLiteral { elements },
        })
    }

    fn map_node(&mut self, node: Node<T>) -> Result<Node<U>, E> {
        match node.kind {
            Kind::Constant(c) => self.map_constant(node.data, node.origin, c),
            Kind::TypeReference { to, args } => {
                self.map_type_reference(node.data, node.origin, to, args)
            }
            Kind::ArrayType { element, size } => {
                self.map_array_type(node.data, node.origin, element, size)
            }
            Kind::SequenceType { element } => {
                self.map_sequence_type(node.data, node.origin, element)
            }
            Kind::NullableType { inner } => self.map_nullable_type(node.data, node.origin, inner),
            Kind::FunctionType { args, return_type } => {
                self.map_function_type(node.data, node.origin, args, return_type)
            }
            Kind::Generic { bound } => self.map_generic(node.data, node.origin, bound),
            Kind::RecordType {
                generics,
                fields,
                methods,
                capabilities,
            } => self.map_record_type(node.data, node.origin, generics, fields, methods, capabilities),
            Kind::TypedValue { ty } => self.map_typed_value(node.data, node.origin, ty),
            Kind::Function {
                generics,
                args,
                return_type,
                block,
            } => self.map_function(node.data, node.origin, generics, args, return_type, block),
            Kind::Binding { value, ty } => self.map_binding(node.data, node.origin, value, ty),
            Kind::NodeRef(to) => self.map_node_ref(node.data, node.origin, to),
            Kind::Assignment { to, from } => self.map_assignment(node.data, node.origin, to, from),
            Kind::Instantiation {
                to,
                generics,
                fields,
            } => self.map_instantiation(node.data, node.origin, to, generics, fields),
            Kind::Call { to, generics, args } => {
                self.map_call(node.data, node.origin, to, generics, args)
            }
            Kind::FieldAccess { instance } => {
                self.map_field_access(node.data, node.origin, instance)
            }
            Kind::Statements(stmts) => self.map_statements(node.data, node.origin, stmts),
            Kind::Conditional {
                condition,
                true_block,
                false_block,
            } => self.map_condition(node.data, node.origin, condition, true_block, false_block),
            Kind::NullTest { on, negated } => {
                self.map_null_test(node.data, node.origin, on, negated)
            }
            Kind::ForLoop {
                index,
                value,
                subject,
                block,
            } => self.map_for_loop(node.data, node.origin, index, value, subject, block),
            Kind::Return(expr) => self.map_return(node.data, node.origin, expr),
            Kind::Index { container, index } => {
                self.map_index(node.data, node.origin, container, index)
            }
            Kind::Default => self.map_default(node.data, node.origin),
            Kind::SequenceLiteral { elements } => {
                self.map_sequence_literal(node.data, node.origin, elements)
            }
        }
    }

    fn map(&mut self, cir: Cir<T>) -> Result<Cir<U>, Incomplete<U, E>> {
        let (cir, errs) = cir.nodes.into_values().fold(
            (Cir::default(), Vec::new()),
            |(new_cir, mut errs), node| match self.map_node(node) {
                Ok(node) => (new_cir.append(node), errs),
                Err(e) => {
                    errs.push(e);
                    (new_cir, errs)
                }
            },
        );

        if errs.is_empty() {
            Ok(cir)
        } else {
            Err(Incomplete { carcass: cir, errs })
        }
    }
}
