use std::fmt::Debug;

use crate::iter::Fallible;
use crate::{Cir, Kind, Node, RefIdx};
use symbol::Symbol;

/// All of the helpers and visitors call back into [`Traversal::traverse_node`]
/// which then dispatches to the proper subfunctions.
pub trait Traversal<T: Debug, E> {
    fn traverse_constant(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _constant: &RefIdx,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_type_reference(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _to: &RefIdx,
        _args: &[RefIdx],
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_array_type(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _element: &RefIdx,
        _size: usize,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_sequence_type(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _element: &RefIdx,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_nullable_type(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _inner: &RefIdx,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_function_type(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _args: &[RefIdx],
        _return_type: &Option<RefIdx>,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_generic(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _bound: &Option<Symbol>,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_record_type(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _generics: &[RefIdx],
        _fields: &[RefIdx],
        _methods: &[RefIdx],
        _capabilities: &[Symbol],
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_typed_value(&mut self, _cir: &Cir<T>, _node: &Node<T>, _ty: &RefIdx) -> Fallible<E> {
        Ok(())
    }

    fn traverse_function(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _generics: &[RefIdx],
        _args: &[RefIdx],
        _return_ty: &Option<RefIdx>,
        _block: &Option<RefIdx>,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_binding(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _value: &RefIdx,
        _ty: &Option<RefIdx>,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_node_ref(&mut self, _cir: &Cir<T>, _node: &Node<T>, _to: &RefIdx) -> Fallible<E> {
        Ok(())
    }

    fn traverse_assignment(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _to: &RefIdx,
        _from: &RefIdx,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_instantiation(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _to: &RefIdx,
        _generics: &[RefIdx],
        _fields: &[RefIdx],
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_call(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _to: &RefIdx,
        _generics: &[RefIdx],
        _args: &[RefIdx],
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_field_access(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _instance: &RefIdx,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_statements(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _stmts: &[RefIdx],
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_condition(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _condition: &RefIdx,
        _true_block: &RefIdx,
        _false_block: &Option<RefIdx>,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_null_test(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _on: &RefIdx,
        _negated: bool,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_for_loop(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _index: &Option<RefIdx>,
        _value: &RefIdx,
        _subject: &RefIdx,
        _block: &RefIdx,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_return(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _expr: &Option<RefIdx>,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_index(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _container: &RefIdx,
        _index: &RefIdx,
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_default(&mut self, _cir: &Cir<T>, _node: &Node<T>) -> Fallible<E> {
        Ok(())
    }

    fn traverse_sequence_literal(
        &mut self,
        _cir: &Cir<T>,
        _node: &Node<T>,
        _elements: &[RefIdx],
    ) -> Fallible<E> {
        Ok(())
    }

    fn traverse_node(&mut self, cir: &Cir<T>, node: &Node<T>) -> Fallible<E> {
        match &node.kind {
            Kind::Constant(c) => self.traverse_constant(cir, node, c),
            Kind::TypeReference { to, args } => self.traverse_type_reference(cir, node, to, args),
            Kind::ArrayType { element, size } => {
                self.traverse_array_type(cir, node, element, *size)
            }
            Kind::SequenceType { element } => self.traverse_sequence_type(cir, node, element),
            Kind::NullableType { inner } => self.traverse_nullable_type(cir, node, inner),
            Kind::FunctionType { args, return_type } => {
                self.traverse_function_type(cir, node, args, return_type)
            }
            Kind::Generic { bound } => self.traverse_generic(cir, node, bound),
            Kind::RecordType {
                generics,
                fields,
                methods,
                capabilities,
            } => self.traverse_record_type(cir, node, generics, fields, methods, capabilities),
            Kind::TypedValue { ty } => self.traverse_typed_value(cir, node, ty),
            Kind::Function {
                generics,
                args,
                return_type,
                block,
            } => self.traverse_function(cir, node, generics, args, return_type, block),
            Kind::Binding { value, ty } => self.traverse_binding(cir, node, value, ty),
            Kind::NodeRef(to) => self.traverse_node_ref(cir, node, to),
            Kind::Assignment { to, from } => self.traverse_assignment(cir, node, to, from),
            Kind::Instantiation {
                to,
                generics,
                fields,
            } => self.traverse_instantiation(cir, node, to, generics, fields),
            Kind::Call { to, generics, args } => self.traverse_call(cir, node, to, generics, args),
            Kind::FieldAccess { instance } => self.traverse_field_access(cir, node, instance),
            Kind::Statements(stmts) => self.traverse_statements(cir, node, stmts),
            Kind::Conditional {
                condition,
                true_block,
                false_block,
            } => self.traverse_condition(cir, node, condition, true_block, false_block),
            Kind::NullTest { on, negated } => self.traverse_null_test(cir, node, on, *negated),
            Kind::ForLoop {
                index,
                value,
                subject,
                block,
            } => self.traverse_for_loop(cir, node, index, value, subject, block),
            Kind::Return(expr) => self.traverse_return(cir, node, expr),
            Kind::Index { container, index } => self.traverse_index(cir, node, container, index),
            Kind::Default => self.traverse_default(cir, node),
            Kind::SequenceLiteral { elements } => {
                self.traverse_sequence_literal(cir, node, elements)
            }
        }
    }

    fn traverse(&mut self, cir: &Cir<T>) -> Fallible<Vec<E>> {
        let errs = cir
            .nodes
            .values()
            .fold(Vec::new(), |mut errs: Vec<E>, node| {
                match self.traverse_node(cir, node) {
                    Ok(_) => errs,
                    Err(e) => {
                        errs.push(e);
                        errs
                    }
                }
            });

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }
}
