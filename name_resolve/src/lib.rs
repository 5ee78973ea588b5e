//! Three phases turn a freshly flattened [`Cir`] into one where every name
//! points at the node it names:
//!
//! 1. The [`Scoper`] walks the program tree and associates each node with the
//!    scope containing it.
//! 2. The [`Declarator`] collects definitions (functions, types, bindings)
//!    into one map per scope and per namespace.
//! 3. The [`Resolver`] rewrites each use (calls, type references, variable
//!    uses, instantiations) to point at the definition its name selects.
//!
//! Method calls are the exception: `value.scale(2)` can only be resolved
//! through the receiver's type, which does not exist yet. When no free
//! function named `scale` is in scope, the call is left untouched and the
//! typechecker's dispatcher finishes the job.

use std::collections::{hash_map::Entry, HashMap};

use cir::{Cir, Incomplete, Kind, Mapper, Node, OriginIdx, Pass, RefIdx, Traversal};
use error::{ErrKind, Error};
use flatten::FlattenData;
use location::SpanTuple;
use symbol::Symbol;

mod declarator;
mod resolver;
mod scoper;

use declarator::Declarator;
use resolver::{ResolveKind, Resolver};
use scoper::Scoper;

/// A scope is the node which owns it: a function's arguments live in the
/// scope of the function node itself, a block's bindings in the scope of its
/// [`Kind::Statements`] node. Origins are unique, so sibling blocks never
/// share a scope even though they sit at the same depth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct Scope(pub(crate) OriginIdx);

impl Scope {
    /// Replace the scope with a new one, returning the previous scope
    pub(crate) fn replace(&mut self, new: OriginIdx) -> OriginIdx {
        std::mem::replace(&mut self.0, new)
    }
}

/// One definition map per scope. Lookups walk the enclosing scopes outwards,
/// so an inner definition shadows an outer one with the same name.
#[derive(Default)]
pub(crate) struct ScopedMap {
    maps: HashMap<Scope, HashMap<Symbol, OriginIdx>>,
}

impl ScopedMap {
    /// On collision, the existing definition is kept and returned as the error
    pub(crate) fn insert(
        &mut self,
        sym: Symbol,
        origin: OriginIdx,
        scope: Scope,
    ) -> Result<(), OriginIdx> {
        match self.maps.entry(scope).or_default().entry(sym) {
            Entry::Occupied(existing) => Err(*existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(origin);

                Ok(())
            }
        }
    }

    pub(crate) fn lookup(
        &self,
        sym: &Symbol,
        scope: Scope,
        enclosing_scope: &HashMap<OriginIdx, Scope>,
    ) -> Option<&OriginIdx> {
        self.maps
            .get(&scope)
            .and_then(|definitions| definitions.get(sym))
            .or_else(|| {
                // the root block's scope has no enclosing scope, which
                // terminates the walk
                enclosing_scope
                    .get(&scope.0)
                    .and_then(|outer| self.lookup(sym, *outer, enclosing_scope))
            })
    }

    fn keys(&self) -> impl Iterator<Item = &Symbol> {
        self.maps.values().flat_map(HashMap::keys)
    }
}

/// Functions, types and bindings live in separate namespaces: a binding may
/// share its name with a type without either shadowing the other.
#[derive(Default)]
pub(crate) struct Mappings {
    pub(crate) functions: ScopedMap,
    pub(crate) types: ScopedMap,
    pub(crate) bindings: ScopedMap,
}

impl Mappings {
    /// Closest defined name to an unresolved one, if any is close enough to
    /// plausibly be a typo
    fn closest(&self, sym: &Symbol) -> Option<Symbol> {
        let name = sym.access();

        self.functions
            .keys()
            .chain(self.types.keys())
            .chain(self.bindings.keys())
            .map(|candidate| (distance::levenshtein(name, candidate.access()), candidate))
            .filter(|(distance, _)| (1..=2).contains(distance) && *distance < name.len())
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| *candidate)
    }
}

pub(crate) struct NameResolutionError(pub(crate) Error);

impl NameResolutionError {
    fn non_unique(
        kind: &'static str,
        new: &Node<FlattenData>,
        existing: &Node<FlattenData>,
    ) -> NameResolutionError {
        // definitions always carry a name, or this is an interpreter error
        let name = new.data.ast.symbol().unwrap();

        NameResolutionError(
            Error::new(ErrKind::NameResolution)
                .with_msg(format!("{kind} `{name}` is defined multiple times"))
                .with_loc(Some(new.data.ast.location().clone()))
                .with_hint(
                    Error::hint()
                        .with_msg(format!("`{name}` first defined here"))
                        .with_loc(Some(existing.data.ast.location().clone())),
                ),
        )
    }

    fn unresolved(
        kind: ResolveKind,
        mappings: &Mappings,
        sym: &Symbol,
        location: &SpanTuple,
    ) -> NameResolutionError {
        let err = Error::new(ErrKind::NameResolution)
            .with_msg(format!("unresolved {kind}: `{sym}`"))
            .with_loc(Some(location.clone()));

        let err = match mappings.closest(sym) {
            Some(close) => {
                err.with_hint(Error::hint().with_msg(format!("did you mean `{close}`?")))
            }
            None => err,
        };

        NameResolutionError(err)
    }
}

#[derive(Default)]
pub(crate) struct NameResolveCtx {
    pub(crate) enclosing_scope: HashMap<OriginIdx, Scope>,
    pub(crate) mappings: Mappings,
}

impl NameResolveCtx {
    /// Associate each node with its enclosing scope. Walking the tree from
    /// its root is what makes this phase aware of which nodes open scopes,
    /// so the flat phases after it do not have to be.
    fn scope(cir: &Cir<FlattenData>) -> HashMap<OriginIdx, Scope> {
        let mut scoper = Scoper {
            current_scope: Scope::default(),
            enclosing_scope: HashMap::new(),
        };

        // flattening appends the root block last
        if let Some(root) = cir.nodes.values().last() {
            // the scoper cannot fail
            scoper.traverse_node(cir, root).unwrap();
        }

        scoper.enclosing_scope
    }

    fn define(&mut self, cir: &Cir<FlattenData>) -> Vec<NameResolutionError> {
        // class fields are reached through an instance, never through the
        // scope chain
        let field_slots = cir
            .nodes
            .values()
            .filter_map(|node| match &node.kind {
                Kind::RecordType { fields, .. } => {
                    Some(fields.iter().map(RefIdx::expect_resolved))
                }
                _ => None,
            })
            .flatten()
            .collect();

        let mut declarator = Declarator {
            ctx: self,
            field_slots,
        };

        match declarator.traverse(cir) {
            Ok(()) => vec![],
            Err(errs) => errs,
        }
    }
}

fn errors(
    definitions: Vec<NameResolutionError>,
    resolutions: Vec<NameResolutionError>,
) -> Error {
    Error::new(ErrKind::Multiple(
        definitions
            .into_iter()
            .chain(resolutions)
            .map(|err| err.0)
            .collect(),
    ))
}

impl<'ast> Pass<FlattenData<'ast>, FlattenData<'ast>, Error> for NameResolveCtx {
    fn pre_condition(_cir: &Cir<FlattenData>) {}

    fn post_condition(_cir: &Cir<FlattenData>) {}

    fn transform(
        &mut self,
        cir: Cir<FlattenData<'ast>>,
    ) -> Result<Cir<FlattenData<'ast>>, Error> {
        self.enclosing_scope = NameResolveCtx::scope(&cir);

        let definition_errors = self.define(&cir);

        // resolution still runs with an incomplete definition set, so that a
        // duplicate definition reports alongside whatever else is wrong
        match (definition_errors.is_empty(), Resolver(self).map(cir)) {
            (true, Ok(cir)) => Ok(cir),
            (false, Ok(_)) => Err(errors(definition_errors, vec![])),
            (_, Err(Incomplete { errs, .. })) => Err(errors(definition_errors, errs)),
        }
    }
}

pub trait NameResolve<'ast> {
    fn name_resolve(self) -> Result<Cir<FlattenData<'ast>>, Error>;
}

impl<'ast> NameResolve<'ast> for Cir<FlattenData<'ast>> {
    fn name_resolve(self) -> Result<Cir<FlattenData<'ast>>, Error> {
        let mut ctx = NameResolveCtx::default();

        ctx.pass(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::builder::*;
    use builtins::AppendAstBuiltins;
    use flatten::FlattenAst;

    fn find_node<'cir, 'ast>(
        cir: &'cir Cir<FlattenData<'ast>>,
        name: &str,
        filter: impl Fn(&Kind) -> bool,
    ) -> &'cir Node<FlattenData<'ast>> {
        cir.nodes
            .values()
            .find(|node| filter(&node.kind) && node.data.ast.symbol() == Some(Symbol::from(name)))
            .unwrap()
    }

    #[test]
    fn call_resolves_to_function() {
        // func pi() -> float { 3.14 }
        // pi()
        let ast = block(vec![
            function(
                "pi",
                vec![],
                vec![],
                Some(ty("float")),
                expr_block(vec![float_constant(3.14)]),
            ),
            call("pi", vec![]),
        ]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let function = find_node(&cir, "pi", |kind| matches!(kind, Kind::Function { .. }));
        let call = find_node(&cir, "pi", |kind| matches!(kind, Kind::Call { .. }));

        match &call.kind {
            Kind::Call { to, .. } => assert_eq!(*to, RefIdx::Resolved(function.origin)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn operators_resolve_to_builtin_declarations() {
        // 1 + 2
        let ast = block(vec![binary_op(
            ast::Operator::Add,
            int_constant(1),
            int_constant(2),
        )]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let declaration = find_node(&cir, "+", |kind| matches!(kind, Kind::Function { .. }));
        let operation = find_node(&cir, "+", |kind| matches!(kind, Kind::Call { .. }));

        match &operation.kind {
            Kind::Call { to, .. } => assert_eq!(*to, RefIdx::Resolved(declaration.origin)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn inner_binding_shadows_outer() {
        // { let x = 1; { let x = 2; x } }
        let ast = block(vec![
            binding("x", int_constant(1)),
            block(vec![binding("x", int_constant(2)), var("x")]),
        ]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        // the inner binding is flattened after the outer one
        let innermost = cir
            .nodes
            .values()
            .filter(|node| matches!(node.kind, Kind::Binding { .. }))
            .map(|node| node.origin)
            .max()
            .unwrap();

        let usage = find_node(&cir, "x", |kind| matches!(kind, Kind::NodeRef(_)));

        match &usage.kind {
            Kind::NodeRef(to) => assert_eq!(*to, RefIdx::Resolved(innermost)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn loop_subject_resolves_outside_the_loop() {
        // let xs = []
        // for xs in xs {}
        let ast = block(vec![
            typed_binding("xs", sequence_ty(ty("int")), sequence(vec![])),
            for_loop(None, "xs", var("xs"), block(vec![])),
        ]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let declaration = find_node(&cir, "xs", |kind| matches!(kind, Kind::Binding { .. }));
        let subject = find_node(&cir, "xs", |kind| matches!(kind, Kind::NodeRef(_)));

        match &subject.kind {
            Kind::NodeRef(to) => assert_eq!(*to, RefIdx::Resolved(declaration.origin)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn loop_variable_resolves_inside_the_loop() {
        // let xs = []
        // for v in xs { v }
        let ast = block(vec![
            typed_binding("xs", sequence_ty(ty("int")), sequence(vec![])),
            for_loop(None, "v", var("xs"), block(vec![var("v")])),
        ]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let variable = find_node(&cir, "v", |kind| matches!(kind, Kind::TypedValue { .. }));
        let usage = find_node(&cir, "v", |kind| matches!(kind, Kind::NodeRef(_)));

        match &usage.kind {
            Kind::NodeRef(to) => assert_eq!(*to, RefIdx::Resolved(variable.origin)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn type_parameter_resolves_as_a_type() {
        // func id[T](x: T) -> T { x }
        let ast = block(vec![function(
            "id",
            vec![generic("T")],
            vec![argument("x", ty("T"))],
            Some(ty("T")),
            expr_block(vec![var("x")]),
        )]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        // the builtins declare their own `T` parameters, so only `id`'s own
        // annotations are at stake
        let declaration = find_node(&cir, "id", |kind| matches!(kind, Kind::Function { .. }));
        let (parameter, argument, return_type) = match &declaration.kind {
            Kind::Function {
                generics,
                args,
                return_type,
                ..
            } => (
                generics[0].expect_resolved(),
                args[0],
                return_type.unwrap(),
            ),
            _ => unreachable!(),
        };

        let argument_ty = match &cir[&argument].kind {
            Kind::TypedValue { ty } => *ty,
            _ => unreachable!(),
        };

        for annotation in [argument_ty, return_type] {
            match &cir[&annotation].kind {
                Kind::TypeReference { to, .. } => {
                    assert_eq!(*to, RefIdx::Resolved(parameter))
                }
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn sequence_method_resolves_to_builtin() {
        // let s = []
        // s.push(15)
        let ast = block(vec![
            typed_binding("s", sequence_ty(ty("int")), sequence(vec![])),
            method_call(var("s"), "push", vec![int_constant(15)]),
        ]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let declaration = find_node(&cir, "push", |kind| matches!(kind, Kind::Function { .. }));
        let call = find_node(&cir, "push", |kind| matches!(kind, Kind::Call { .. }));

        match &call.kind {
            Kind::Call { to, .. } => assert_eq!(*to, RefIdx::Resolved(declaration.origin)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn class_method_call_waits_for_dispatch() {
        // class Meters(n: int)
        //     func scale(self: Meters, by: int) -> int { self.n * by }
        // end
        // let m = Meters(1)
        // m.scale(2)
        let ast = block(vec![
            class(
                "Meters",
                vec![],
                vec![],
                vec![argument("n", ty("int"))],
                vec![function(
                    "scale",
                    vec![],
                    vec![argument("self", ty("Meters")), argument("by", ty("int"))],
                    Some(ty("int")),
                    expr_block(vec![binary_op(
                        ast::Operator::Mul,
                        field_access(var("self"), "n"),
                        var("by"),
                    )]),
                )],
            ),
            binding("m", instantiation("Meters", vec![], vec![int_constant(1)])),
            method_call(var("m"), "scale", vec![int_constant(2)]),
        ]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let call = find_node(&cir, "scale", |kind| matches!(kind, Kind::Call { .. }));

        match &call.kind {
            Kind::Call { to, .. } => assert_eq!(*to, RefIdx::Unresolved),
            _ => unreachable!(),
        }
    }

    #[test]
    fn instantiation_resolves_to_class() {
        // class Pair(a: int, b: int)
        // Pair(1, 2)
        let ast = block(vec![
            class(
                "Pair",
                vec![],
                vec![],
                vec![argument("a", ty("int")), argument("b", ty("int"))],
                vec![],
            ),
            instantiation("Pair", vec![], vec![int_constant(1), int_constant(2)]),
        ]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let declaration = find_node(&cir, "Pair", |kind| matches!(kind, Kind::RecordType { .. }));
        let instance = find_node(&cir, "Pair", |kind| {
            matches!(kind, Kind::Instantiation { .. })
        });

        match &instance.kind {
            Kind::Instantiation { to, .. } => {
                assert_eq!(*to, RefIdx::Resolved(declaration.origin))
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn unresolved_name_is_an_error() {
        let ast = block(vec![var("nope")]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten();
        let result = cir.name_resolve();

        let err = result.unwrap_err();
        let errs = match err.kind() {
            ErrKind::Multiple(errs) => errs,
            _ => unreachable!(),
        };

        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].kind(), ErrKind::NameResolution));
        assert!(errs[0].msg().unwrap().contains("`nope`"));
    }

    #[test]
    fn redefinition_is_an_error() {
        // func f() {}
        // func f() {}
        let ast = block(vec![
            function("f", vec![], vec![], None, block(vec![])),
            function("f", vec![], vec![], None, block(vec![])),
        ]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten();
        let result = cir.name_resolve();

        let err = result.unwrap_err();
        let errs = match err.kind() {
            ErrKind::Multiple(errs) => errs,
            _ => unreachable!(),
        };

        assert!(errs
            .iter()
            .any(|err| err.msg().unwrap().contains("`f` is defined multiple times")));
    }

    #[test]
    fn fields_do_not_leak_into_method_scopes() {
        // class Pair(a: int, b: int)
        //     func first(self: Pair) -> int { a }
        // end
        let ast = block(vec![class(
            "Pair",
            vec![],
            vec![],
            vec![argument("a", ty("int")), argument("b", ty("int"))],
            vec![function(
                "first",
                vec![],
                vec![argument("self", ty("Pair"))],
                Some(ty("int")),
                expr_block(vec![var("a")]),
            )],
        )]);
        let ast = ast.append_builtins().unwrap();

        let cir = ast.flatten();
        let result = cir.name_resolve();

        assert!(result.is_err());
    }
}
