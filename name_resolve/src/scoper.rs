use std::collections::HashMap;

use crate::Scope;

use cir::{Cir, Fallible, Kind, Node, OriginIdx, RefIdx, Traversal};
use flatten::FlattenData;
use symbol::Symbol;

pub(crate) struct Scoper {
    /// The scope we are currently visiting, assigned to each node we reach
    /// in [`Scoper::scope`]
    pub(crate) current_scope: Scope,
    /// Map of each node to the scope containing it, built progressively as
    /// we visit the tree
    pub(crate) enclosing_scope: HashMap<OriginIdx, Scope>,
}

#[derive(Debug)]
pub(crate) struct ScoperError;

impl Scoper {
    /// Set the enclosing scope of `to_scope` to the current scope
    fn scope(&mut self, to_scope: &Node<FlattenData>) {
        self.enclosing_scope
            .insert(to_scope.origin, self.current_scope);
    }

    /// Enter a new scope, replacing the current one. This returns the old
    /// scope, which must be re-entered once the scoped node's children have
    /// been visited
    fn enter_scope(&mut self, new_scope: OriginIdx) -> OriginIdx {
        self.current_scope.replace(new_scope)
    }

    fn maybe_visit_child(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        ref_idx: &RefIdx,
    ) -> Fallible<ScoperError> {
        match ref_idx {
            RefIdx::Resolved(origin) => self.traverse_node(cir, &cir[origin]),
            // unresolved references are resolution edges, not structure.
            // there is nothing to scope through them
            RefIdx::Unresolved => Ok(()),
        }
    }

    fn visit_children(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        children: &[RefIdx],
    ) -> Fallible<ScoperError> {
        children
            .iter()
            .try_for_each(|child| self.maybe_visit_child(cir, child))
    }
}

impl<'ast> Traversal<FlattenData<'ast>, ScoperError> for Scoper {
    fn traverse_function(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        generics: &[RefIdx],
        args: &[RefIdx],
        return_ty: &Option<RefIdx>,
        block: &Option<RefIdx>,
    ) -> Fallible<ScoperError> {
        let old = self.enter_scope(node.origin);

        self.visit_children(cir, generics)?;
        self.visit_children(cir, args)?;
        return_ty
            .as_ref()
            .map_or(Ok(()), |ty| self.maybe_visit_child(cir, ty))?;
        block
            .as_ref()
            .map_or(Ok(()), |block| self.maybe_visit_child(cir, block))?;

        self.enter_scope(old);

        Ok(())
    }

    fn traverse_record_type(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        generics: &[RefIdx],
        fields: &[RefIdx],
        methods: &[RefIdx],
        _capabilities: &[Symbol],
    ) -> Fallible<ScoperError> {
        let old = self.enter_scope(node.origin);

        self.visit_children(cir, generics)?;
        self.visit_children(cir, fields)?;
        self.visit_children(cir, methods)?;

        self.enter_scope(old);

        Ok(())
    }

    fn traverse_statements(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        stmts: &[RefIdx],
    ) -> Fallible<ScoperError> {
        let old = self.enter_scope(node.origin);

        self.visit_children(cir, stmts)?;

        self.enter_scope(old);

        Ok(())
    }

    fn traverse_for_loop(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        index: &Option<RefIdx>,
        value: &RefIdx,
        subject: &RefIdx,
        block: &RefIdx,
    ) -> Fallible<ScoperError> {
        // the subject lives outside the loop: `for x in xs` cannot see `x`
        // from within `xs`
        self.maybe_visit_child(cir, subject)?;

        let old = self.enter_scope(node.origin);

        index
            .as_ref()
            .map_or(Ok(()), |index| self.maybe_visit_child(cir, index))?;
        self.maybe_visit_child(cir, value)?;
        self.maybe_visit_child(cir, block)?;

        self.enter_scope(old);

        Ok(())
    }

    fn traverse_node(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
    ) -> Fallible<ScoperError> {
        self.scope(node);

        match &node.kind {
            Kind::Function {
                generics,
                args,
                return_type,
                block,
            } => self.traverse_function(cir, node, generics, args, return_type, block),
            Kind::RecordType {
                generics,
                fields,
                methods,
                capabilities,
            } => self.traverse_record_type(cir, node, generics, fields, methods, capabilities),
            Kind::Statements(stmts) => self.traverse_statements(cir, node, stmts),
            Kind::ForLoop {
                index,
                value,
                subject,
                block,
            } => self.traverse_for_loop(cir, node, index, value, subject, block),
            Kind::TypeReference { to, args } => {
                self.maybe_visit_child(cir, to)?;
                self.visit_children(cir, args)
            }
            Kind::ArrayType { element, .. } | Kind::SequenceType { element } => {
                self.maybe_visit_child(cir, element)
            }
            Kind::NullableType { inner } => self.maybe_visit_child(cir, inner),
            Kind::FunctionType { args, return_type } => {
                self.visit_children(cir, args)?;
                return_type
                    .as_ref()
                    .map_or(Ok(()), |ty| self.maybe_visit_child(cir, ty))
            }
            Kind::TypedValue { ty } => self.maybe_visit_child(cir, ty),
            Kind::Binding { value, ty } => {
                ty.as_ref()
                    .map_or(Ok(()), |ty| self.maybe_visit_child(cir, ty))?;
                self.maybe_visit_child(cir, value)
            }
            Kind::NodeRef(to) => self.maybe_visit_child(cir, to),
            Kind::Assignment { to, from } => {
                self.maybe_visit_child(cir, to)?;
                self.maybe_visit_child(cir, from)
            }
            Kind::Instantiation {
                to,
                generics,
                fields,
            } => {
                self.maybe_visit_child(cir, to)?;
                self.visit_children(cir, generics)?;
                self.visit_children(cir, fields)
            }
            Kind::Call { to, generics, args } => {
                self.maybe_visit_child(cir, to)?;
                self.visit_children(cir, generics)?;
                self.visit_children(cir, args)
            }
            Kind::FieldAccess { instance } => self.maybe_visit_child(cir, instance),
            Kind::Conditional {
                condition,
                true_block,
                false_block,
            } => {
                self.maybe_visit_child(cir, condition)?;
                self.maybe_visit_child(cir, true_block)?;
                false_block
                    .as_ref()
                    .map_or(Ok(()), |block| self.maybe_visit_child(cir, block))
            }
            Kind::NullTest { on, .. } => self.maybe_visit_child(cir, on),
            Kind::Return(expr) => expr
                .as_ref()
                .map_or(Ok(()), |expr| self.maybe_visit_child(cir, expr)),
            Kind::Index { container, index } => {
                self.maybe_visit_child(cir, container)?;
                self.maybe_visit_child(cir, index)
            }
            Kind::SequenceLiteral { elements } => self.visit_children(cir, elements),
            // nothing to visit for leaf nodes, other than scoping them
            Kind::Constant(_) | Kind::Generic { .. } | Kind::Default => Ok(()),
        }
    }

    /// The scoper starts from the root node and follows the program's
    /// structure, so the flat entry point should never be called
    fn traverse(&mut self, _cir: &Cir<FlattenData<'ast>>) -> Fallible<Vec<ScoperError>> {
        unreachable!("the scoper walks the tree from its root, not the flat node list")
    }
}
