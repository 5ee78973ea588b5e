use std::collections::HashSet;

use cir::{Cir, Fallible, Node, OriginIdx, RefIdx, Traversal};
use flatten::FlattenData;
use symbol::Symbol;

use crate::{NameResolutionError, NameResolveCtx};

#[derive(Clone, Copy)]
enum DefinitionKind {
    Function,
    Type,
    Binding,
}

pub(crate) struct Declarator<'ctx> {
    pub(crate) ctx: &'ctx mut NameResolveCtx,
    /// Class fields are reached through an instance, never through the scope
    /// chain, so their slots must not be declared as bindings
    pub(crate) field_slots: HashSet<OriginIdx>,
}

impl<'ctx> Declarator<'ctx> {
    fn define(
        &mut self,
        kind: DefinitionKind,
        cir: &Cir<FlattenData>,
        node: &Node<FlattenData>,
    ) -> Fallible<NameResolutionError> {
        // anonymous functions are not defined anywhere
        let name = match node.data.ast.symbol() {
            Some(name) => name,
            None => return Ok(()),
        };

        // the scoper visits every node, or this is an interpreter error
        let scope = self.ctx.enclosing_scope[&node.origin];

        let (map, kind) = match kind {
            DefinitionKind::Function => (&mut self.ctx.mappings.functions, "function"),
            DefinitionKind::Type => (&mut self.ctx.mappings.types, "type"),
            DefinitionKind::Binding => (&mut self.ctx.mappings.bindings, "binding"),
        };

        map.insert(name, node.origin, scope)
            .map_err(|existing| NameResolutionError::non_unique(kind, node, &cir[&existing]))
    }
}

impl<'ast, 'ctx> Traversal<FlattenData<'ast>, NameResolutionError> for Declarator<'ctx> {
    fn traverse_function(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        _generics: &[RefIdx],
        _args: &[RefIdx],
        _return_ty: &Option<RefIdx>,
        _block: &Option<RefIdx>,
    ) -> Fallible<NameResolutionError> {
        self.define(DefinitionKind::Function, cir, node)
    }

    fn traverse_record_type(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        _generics: &[RefIdx],
        _fields: &[RefIdx],
        _methods: &[RefIdx],
        _capabilities: &[Symbol],
    ) -> Fallible<NameResolutionError> {
        self.define(DefinitionKind::Type, cir, node)
    }

    fn traverse_generic(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        _bound: &Option<Symbol>,
    ) -> Fallible<NameResolutionError> {
        // a type parameter is a type for everything in the declaration
        // carrying it
        self.define(DefinitionKind::Type, cir, node)
    }

    fn traverse_binding(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        _value: &RefIdx,
        _ty: &Option<RefIdx>,
    ) -> Fallible<NameResolutionError> {
        self.define(DefinitionKind::Binding, cir, node)
    }

    fn traverse_typed_value(
        &mut self,
        cir: &Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'ast>>,
        _ty: &RefIdx,
    ) -> Fallible<NameResolutionError> {
        if self.field_slots.contains(&node.origin) {
            return Ok(());
        }

        // arguments and loop variables resolve like any local binding
        self.define(DefinitionKind::Binding, cir, node)
    }
}
