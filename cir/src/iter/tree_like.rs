use std::fmt::Debug;

use crate::{Cir, Kind, Node, OriginIdx, RefIdx};
use symbol::Symbol;

/// Reference-following visitor. Unlike [`crate::Traversal`], which walks the
/// node map in origin order, a [`TreeLike`] starts from one entry point and
/// follows resolved references outwards. Defaults follow every edge, so
/// visiting a graph which contains recursive calls requires overriding the
/// method that closes the cycle.
pub trait TreeLike<T: Debug> {
    fn visit_many(&mut self, cir: &Cir<T>, many: &[RefIdx]) {
        many.iter().for_each(|r| self.visit_reference(cir, r))
    }

    fn visit_optional(&mut self, cir: &Cir<T>, reference: &Option<RefIdx>) {
        if let Some(r) = reference {
            self.visit_reference(cir, r)
        }
    }

    fn visit_reference(&mut self, cir: &Cir<T>, reference: &RefIdx) {
        self.visit(cir, &reference.expect_resolved())
    }

    fn visit_constant(&mut self, cir: &Cir<T>, _node: &Node<T>, c: &RefIdx) {
        self.visit_reference(cir, c)
    }

    fn visit_type_reference(
        &mut self,
        cir: &Cir<T>,
        _node: &Node<T>,
        to: &RefIdx,
        args: &[RefIdx],
    ) {
        self.visit_reference(cir, to);
        self.visit_many(cir, args);
    }

    fn visit_array_type(&mut self, cir: &Cir<T>, _node: &Node<T>, element: &RefIdx, _size: usize) {
        self.visit_reference(cir, element)
    }

    fn visit_sequence_type(&mut self, cir: &Cir<T>, _node: &Node<T>, element: &RefIdx) {
        self.visit_reference(cir, element)
    }

    fn visit_nullable_type(&mut self, cir: &Cir<T>, _node: &Node<T>, inner: &RefIdx) {
        self.visit_reference(cir, inner)
    }

    fn visit_function_type(
        &mut self,
        cir: &Cir<T>,
        _node: &Node<T>,
        args: &[RefIdx],
        return_type: &Option<RefIdx>,
    ) {
        self.visit_many(cir, args);
        self.visit_optional(cir, return_type);
    }

    fn visit_generic(&mut self, _cir: &Cir<T>, _node: &Node<T>, _bound: &Option<Symbol>) {}

    fn visit_record_type(
        &mut self,
        cir: &Cir<T>,
        _node: &Node<T>,
        generics: &[RefIdx],
        fields: &[RefIdx],
        methods: &[RefIdx],
        _capabilities: &[Symbol],
    ) {
        self.visit_many(cir, generics);
        self.visit_many(cir, fields);
        self.visit_many(cir, methods);
    }

    fn visit_typed_value(&mut self, cir: &Cir<T>, _node: &Node<T>, ty: &RefIdx) {
        // loop variables keep an unresolved type link until typing
        if let RefIdx::Resolved(_) = ty {
            self.visit_reference(cir, ty)
        }
    }

    fn visit_function(
        &mut self,
        cir: &Cir<T>,
        _node: &Node<T>,
        generics: &[RefIdx],
        args: &[RefIdx],
        return_type: &Option<RefIdx>,
        block: &Option<RefIdx>,
    ) {
        self.visit_many(cir, generics);
        self.visit_many(cir, args);
        self.visit_optional(cir, return_type);
        self.visit_optional(cir, block);
    }

    fn visit_binding(&mut self, cir: &Cir<T>, _node: &Node<T>, value: &RefIdx, ty: &Option<RefIdx>) {
        self.visit_reference(cir, value);
        self.visit_optional(cir, ty);
    }

    fn visit_node_ref(&mut self, cir: &Cir<T>, _node: &Node<T>, to: &RefIdx) {
        self.visit_reference(cir, to)
    }

    fn visit_assignment(&mut self, cir: &Cir<T>, _node: &Node<T>, to: &RefIdx, from: &RefIdx) {
        self.visit_reference(cir, to);
        self.visit_reference(cir, from);
    }

    fn visit_instantiation(
        &mut self,
        cir: &Cir<T>,
        _node: &Node<T>,
        to: &RefIdx,
        generics: &[RefIdx],
        fields: &[RefIdx],
    ) {
        self.visit_reference(cir, to);
        self.visit_many(cir, generics);
        self.visit_many(cir, fields);
    }

    fn visit_call(
        &mut self,
        cir: &Cir<T>,
        _node: &Node<T>,
        to: &RefIdx,
        generics: &[RefIdx],
        args: &[RefIdx],
    ) {
        self.visit_reference(cir, to);
        self.visit_many(cir, generics);
        self.visit_many(cir, args);
    }

    fn visit_field_access(&mut self, cir: &Cir<T>, _node: &Node<T>, instance: &RefIdx) {
        self.visit_reference(cir, instance)
    }

    fn visit_statements(&mut self, cir: &Cir<T>, _node: &Node<T>, stmts: &[RefIdx]) {
        self.visit_many(cir, stmts)
    }

    fn visit_conditional(
        &mut self,
        cir: &Cir<T>,
        _node: &Node<T>,
        condition: &RefIdx,
        true_block: &RefIdx,
        false_block: &Option<RefIdx>,
    ) {
        self.visit_reference(cir, condition);
        self.visit_reference(cir, true_block);
        self.visit_optional(cir, false_block);
    }

    fn visit_null_test(&mut self, cir: &Cir<T>, _node: &Node<T>, on: &RefIdx, _negated: bool) {
        self.visit_reference(cir, on)
    }

    fn visit_for_loop(
        &mut self,
        cir: &Cir<T>,
        _node: &Node<T>,
        index: &Option<RefIdx>,
        value: &RefIdx,
        subject: &RefIdx,
        block: &RefIdx,
    ) {
        self.visit_optional(cir, index);
        self.visit_reference(cir, value);
        self.visit_reference(cir, subject);
        self.visit_reference(cir, block);
    }

    fn visit_return(&mut self, cir: &Cir<T>, _node: &Node<T>, value: &Option<RefIdx>) {
        self.visit_optional(cir, value)
    }

    fn visit_index(&mut self, cir: &Cir<T>, _node: &Node<T>, container: &RefIdx, index: &RefIdx) {
        self.visit_reference(cir, container);
        self.visit_reference(cir, index);
    }

    fn visit_default(&mut self, _cir: &Cir<T>, _node: &Node<T>) {}

    fn visit_sequence_literal(&mut self, cir: &Cir<T>, _node: &Node<T>, elements: &[RefIdx]) {
        self.visit_many(cir, elements)
    }

    fn visit(&mut self, cir: &Cir<T>, start: &OriginIdx) {
        let node = &cir[start];

        match &node.kind {
            Kind::Constant(c) => self.visit_constant(cir, node, c),
            Kind::TypeReference { to, args } => self.visit_type_reference(cir, node, to, args),
            Kind::ArrayType { element, size } => {
                self.visit_array_type(cir, node, element, *size)
            }
            Kind::SequenceType { element } => self.visit_sequence_type(cir, node, element),
            Kind::NullableType { inner } => self.visit_nullable_type(cir, node, inner),
            Kind::FunctionType { args, return_type } => {
                self.visit_function_type(cir, node, args, return_type)
            }
            Kind::Generic { bound } => self.visit_generic(cir, node, bound),
            Kind::RecordType {
                generics,
                fields,
                methods,
                capabilities,
            } => self.visit_record_type(cir, node, generics, fields, methods, capabilities),
            Kind::TypedValue { ty } => self.visit_typed_value(cir, node, ty),
            Kind::Function {
                generics,
                args,
                return_type,
                block,
            } => self.visit_function(cir, node, generics, args, return_type, block),
            Kind::Binding { value, ty } => self.visit_binding(cir, node, value, ty),
            Kind::NodeRef(to) => self.visit_node_ref(cir, node, to),
            Kind::Assignment { to, from } => self.visit_assignment(cir, node, to, from),
            Kind::Instantiation {
                to,
                generics,
                fields,
            } => self.visit_instantiation(cir, node, to, generics, fields),
            Kind::Call { to, generics, args } => self.visit_call(cir, node, to, generics, args),
            Kind::FieldAccess { instance } => self.visit_field_access(cir, node, instance),
            Kind::Statements(stmts) => self.visit_statements(cir, node, stmts),
            Kind::Conditional {
                condition,
                true_block,
                false_block,
            } => self.visit_conditional(cir, node, condition, true_block, false_block),
            Kind::NullTest { on, negated } => self.visit_null_test(cir, node, on, *negated),
            Kind::ForLoop {
                index,
                value,
                subject,
                block,
            } => self.visit_for_loop(cir, node, index, value, subject, block),
            Kind::Return(value) => self.visit_return(cir, node, value),
            Kind::Index { container, index } => self.visit_index(cir, node, container, index),
            Kind::Default => self.visit_default(cir, node),
            Kind::SequenceLiteral { elements } => {
                self.visit_sequence_literal(cir, node, elements)
            }
        }
    }
}
