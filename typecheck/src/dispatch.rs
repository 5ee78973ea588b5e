//! Method calls cannot be resolved by name alone: `a.norm()` goes to
//! whichever class `a` turns out to be an instance of. Name resolution left
//! their targets unresolved, and this stage points them at the right method
//! using the receiver's canonical type. Operator uses whose operands are
//! class instances get the same treatment, mapped onto the class's
//! `__add__`-family methods.

use std::collections::HashMap;

use builtins::Operator;
use cir::{Cir, Fallible, Kind, Node, OriginIdx, RefIdx, Traversal};
use error::{ErrKind, Error};
use flatten::FlattenData;
use symbol::Symbol;
use types::Type;

use crate::TypeMap;

struct MethodResolver<'ctx> {
    types: &'ctx TypeMap,
    rewrites: HashMap<OriginIdx, OriginIdx>,
}

/// Resolve every dispatchable call in the graph, rewriting call targets in
/// place. Returns whether anything was rewritten: a rewrite invalidates the
/// type table, so the caller re-infers and dispatches again until a fixed
/// point. Errors are only final on a run that made no progress, since an
/// unresolved receiver may just be a not-yet-dispatched inner call.
pub(crate) fn dispatch(
    cir: &mut Cir<FlattenData<'_>>,
    types: &TypeMap,
) -> Result<bool, Error> {
    let mut resolver = MethodResolver {
        types,
        rewrites: HashMap::new(),
    };

    let errs = match resolver.traverse(cir) {
        Ok(()) => Vec::new(),
        Err(errs) => errs,
    };

    if resolver.rewrites.is_empty() {
        return match errs.len() {
            0 => Ok(false),
            1 => Err(errs.into_iter().next().unwrap()),
            _ => Err(Error::new(ErrKind::Multiple(errs))),
        };
    }

    for (origin, method) in resolver.rewrites {
        // rewrites only ever target call nodes
        if let Some(Node {
            kind: Kind::Call { to, .. },
            ..
        }) = cir.nodes.get_mut(&origin)
        {
            *to = RefIdx::Resolved(method);
        }
    }

    Ok(true)
}

/// Look a method up in a class declaration by name
fn method_on(
    cir: &Cir<FlattenData<'_>>,
    class: &Node<FlattenData<'_>>,
    name: Symbol,
) -> Option<OriginIdx> {
    let methods = match &class.kind {
        Kind::RecordType { methods, .. } => methods,
        _ => return None,
    };

    methods
        .iter()
        .find(|method| cir[*method].data.ast.symbol() == Some(name))
        .map(RefIdx::expect_resolved)
}

impl MethodResolver<'_> {
    fn receiver_class<'a, 'ast>(
        &self,
        cir: &'a Cir<FlattenData<'ast>>,
        node: &Node<FlattenData<'_>>,
        receiver: &RefIdx,
        what: &str,
    ) -> Result<(&'a Node<FlattenData<'ast>>, Symbol), Error> {
        let with_loc = |err: Error| err.with_loc(Some(node.data.ast.location().clone()));

        // a narrowed nullable receiver dispatches like the inner class
        match self.types.type_of(&receiver.expect_resolved()).map(Type::narrowed) {
            Some(Type::Record(decl, _)) => Ok((&cir[&decl.origin], decl.name)),
            Some(other) => Err(with_loc(Error::new(ErrKind::TypeChecker).with_msg(
                format!("{what} on a value of type `{other}`, which is not a class instance"),
            ))),
            None => Err(with_loc(
                Error::new(ErrKind::TypeChecker)
                    .with_msg(format!("{what} on a value whose type is not known")),
            )),
        }
    }

    fn resolve_method(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        args: &[RefIdx],
    ) -> Fallible<Error> {
        // method calls always carry their name and their receiver as first
        // argument
        let name = node.data.ast.symbol().unwrap();
        let receiver = args
            .first()
            .unwrap_or_else(|| unreachable!("method call without a receiver. this is an interpreter error"));

        let (class, class_name) =
            self.receiver_class(cir, node, receiver, &format!("call to method `{name}`"))?;

        match method_on(cir, class, name) {
            Some(method) => {
                self.rewrites.insert(node.origin, method);
                Ok(())
            }
            None => Err(Error::new(ErrKind::TypeChecker)
                .with_msg(format!("no method `{name}` on class `{class_name}`"))
                .with_loc(Some(node.data.ast.location().clone()))
                .with_hint(
                    Error::hint()
                        .with_loc(Some(class.data.ast.location().clone()))
                        .with_msg(format!("class `{class_name}` declared here")),
                )),
        }
    }

    fn resolve_operator(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        op: Operator,
        to: &RefIdx,
        args: &[RefIdx],
    ) -> Fallible<Error> {
        // only rewrite uses still aimed at the builtin operator extern;
        // primitive operands keep it, and already-dispatched uses are done
        let target_name = cir[to].data.ast.symbol().unwrap();
        if builtins::demangle(target_name.access()) != op.as_str() {
            return Ok(());
        }

        let lhs = &args[0];
        let is_class_operand = matches!(
            self.types.type_of(&lhs.expect_resolved()).map(Type::narrowed),
            Some(Type::Record(..))
        );

        if !is_class_operand {
            return Ok(());
        }

        let (class, class_name) =
            self.receiver_class(cir, node, lhs, &format!("use of operator `{}`", op.as_str()))?;

        let method_name = Symbol::from(op.method_name());

        match method_on(cir, class, method_name) {
            Some(method) => {
                self.rewrites.insert(node.origin, method);
                Ok(())
            }
            None => Err(Error::new(ErrKind::TypeChecker)
                .with_msg(format!(
                    "class `{class_name}` defines no `{method_name}` method for operator `{}`",
                    op.as_str()
                ))
                .with_loc(Some(node.data.ast.location().clone()))
                .with_hint(Error::hint().with_msg(format!(
                    "declare `{method_name}` on `{class_name}` to use `{}` on its instances",
                    op.as_str()
                )))),
        }
    }
}

impl Traversal<FlattenData<'_>, Error> for MethodResolver<'_> {
    fn traverse_call(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
        _generics: &[RefIdx],
        args: &[RefIdx],
    ) -> Fallible<Error> {
        match to {
            RefIdx::Unresolved => self.resolve_method(cir, node, args),
            RefIdx::Resolved(_) => {
                let op = node
                    .data
                    .ast
                    .symbol()
                    .and_then(|sym| Operator::try_from_str(builtins::demangle(sym.access())));

                match op {
                    Some(op) => self.resolve_operator(cir, node, op, to, args),
                    None => Ok(()),
                }
            }
        }
    }
}
