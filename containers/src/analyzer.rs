//! The analysis pass itself: classification happens up front from the type
//! table, then a single traversal checks static bounds on fixed arrays,
//! enforces the no-mutation-during-iteration rule on dynamic containers,
//! and marks `map`/`filter`/`collect` pipelines worth batching.

use ast::{Node as AstNode, Value};
use cir::{Cir, Fallible, Kind, Node, OriginIdx, RefIdx, Traversal};
use error::{ErrKind, Error};
use flatten::{AstInfo, FlattenData};
use typecheck::TypeMap;
use types::{Primitive, Type};

use crate::{ContainerAnalysis, ContainerKind};

pub(crate) struct Analyzer<'ctx> {
    pub(crate) types: &'ctx TypeMap,
    pub(crate) analysis: ContainerAnalysis,
}

fn multi(mut errs: Vec<Error>) -> Fallible<Error> {
    match errs.len() {
        0 => Ok(()),
        1 => Err(errs.swap_remove(0)),
        _ => Err(Error::new(ErrKind::Multiple(errs))),
    }
}

/// The binding a container expression reads from: `seq`, `seq[i]` and
/// `seq[i].field` all go through `seq`
fn base_binding(cir: &Cir<FlattenData<'_>>, reference: &RefIdx) -> Option<OriginIdx> {
    match &cir[reference].kind {
        Kind::NodeRef(to) => {
            let target = to.expect_resolved();

            match &cir[&target].kind {
                Kind::Binding { .. } | Kind::TypedValue { .. } => Some(target),
                _ => None,
            }
        }
        Kind::Index { container, .. } => base_binding(cir, container),
        Kind::FieldAccess { instance } => base_binding(cir, instance),
        _ => None,
    }
}

/// The integer a directly-written index literal holds, for static bounds
fn constant_index(cir: &Cir<FlattenData<'_>>, reference: &RefIdx) -> Option<i64> {
    match &cir[reference].data.ast {
        AstInfo::Node(ast::Ast {
            node: AstNode::Constant(Value::Integer(value)),
            ..
        }) => Some(*value),
        _ => None,
    }
}

/// Whether a function value (named or lambda) is free of side effects:
/// no assignments, no calls to mutating builtins anywhere in its body.
/// Externs are opaque and count as impure.
fn pure_function(cir: &Cir<FlattenData<'_>>, reference: &RefIdx) -> bool {
    let target = match &cir[reference].kind {
        Kind::NodeRef(to) => to,
        _ => reference,
    };

    match &cir[target].kind {
        Kind::Function {
            block: Some(block), ..
        } => side_effect_free(cir, block),
        _ => false,
    }
}

fn side_effect_free(cir: &Cir<FlattenData<'_>>, reference: &RefIdx) -> bool {
    match &cir[reference].kind {
        Kind::Assignment { .. } => false,
        Kind::Call { to, args, .. } => {
            // calls compute; mutating builtins do not
            let name = match to {
                RefIdx::Resolved(origin) => cir[origin].data.ast.symbol(),
                RefIdx::Unresolved => None,
            };
            let mutates =
                matches!(name, Some(name) if builtins::demangle(name.access()) == "push");

            !mutates && args.iter().all(|arg| side_effect_free(cir, arg))
        }
        Kind::Statements(stmts) => stmts.iter().all(|stmt| side_effect_free(cir, stmt)),
        Kind::Conditional {
            condition,
            true_block,
            false_block,
        } => {
            side_effect_free(cir, condition)
                && side_effect_free(cir, true_block)
                && false_block
                    .as_ref()
                    .map_or(true, |block| side_effect_free(cir, block))
        }
        Kind::ForLoop { subject, block, .. } => {
            side_effect_free(cir, subject) && side_effect_free(cir, block)
        }
        Kind::Binding { value, .. } => side_effect_free(cir, value),
        Kind::Return(value) => value
            .as_ref()
            .map_or(true, |value| side_effect_free(cir, value)),
        Kind::Index { container, index } => {
            side_effect_free(cir, container) && side_effect_free(cir, index)
        }
        Kind::FieldAccess { instance } => side_effect_free(cir, instance),
        Kind::NullTest { on, .. } => side_effect_free(cir, on),
        Kind::SequenceLiteral { elements } => {
            elements.iter().all(|element| side_effect_free(cir, element))
        }
        Kind::Instantiation { fields, .. } => {
            fields.iter().all(|field| side_effect_free(cir, field))
        }
        _ => true,
    }
}

/// Every write into `subject` lexically inside a loop body: assignments
/// through an index derived from it, and calls growing it
fn find_writes(
    cir: &Cir<FlattenData<'_>>,
    reference: &RefIdx,
    subject: OriginIdx,
    writes: &mut Vec<OriginIdx>,
) {
    let node = &cir[reference];

    match &node.kind {
        Kind::Statements(stmts) => stmts
            .iter()
            .for_each(|stmt| find_writes(cir, stmt, subject, writes)),
        Kind::Conditional {
            true_block,
            false_block,
            ..
        } => {
            find_writes(cir, true_block, subject, writes);
            if let Some(false_block) = false_block {
                find_writes(cir, false_block, subject, writes);
            }
        }
        Kind::ForLoop { block, .. } => find_writes(cir, block, subject, writes),
        Kind::Binding { value, .. } => find_writes(cir, value, subject, writes),
        Kind::Return(Some(value)) => find_writes(cir, value, subject, writes),
        Kind::Assignment { to, .. } => {
            let through_index = matches!(&cir[to].kind, Kind::Index { .. });

            if through_index && base_binding(cir, to) == Some(subject) {
                writes.push(node.origin);
            }
        }
        Kind::Call { to, args, .. } => {
            let name = match to {
                RefIdx::Resolved(origin) => cir[origin].data.ast.symbol(),
                RefIdx::Unresolved => None,
            };
            let grows =
                matches!(name, Some(name) if builtins::demangle(name.access()) == "push");

            if grows && args.first().and_then(|arg| base_binding(cir, arg)) == Some(subject) {
                writes.push(node.origin);
            }
        }
        _ => {}
    }
}

impl Analyzer<'_> {
    fn kind_of(&self, reference: &RefIdx) -> Option<ContainerKind> {
        self.analysis.kind_of(&reference.expect_resolved())
    }

    /// Walk a `map`/`filter` chain down to the container it reads from,
    /// checking each stage's purity along the way. Returns the stages and
    /// the base, or nothing if the shape does not match.
    fn pipeline(
        &self,
        cir: &Cir<FlattenData<'_>>,
        reference: &RefIdx,
        stages: &mut Vec<OriginIdx>,
    ) -> Option<OriginIdx> {
        let node = &cir[&reference.expect_resolved()];

        let (name, args) = match (&node.kind, node.data.ast.symbol()) {
            (Kind::Call { args, .. }, Some(name)) => (name, args),
            // the chain bottoms out at the container expression
            _ => return Some(node.origin),
        };

        match builtins::demangle(name.access()) {
            "map" | "filter" => {
                if !pure_function(cir, args.get(1)?) {
                    return None;
                }

                stages.push(node.origin);
                self.pipeline(cir, args.first()?, stages)
            }
            _ => Some(node.origin),
        }
    }

    fn numeric_sequence(&self, origin: &OriginIdx) -> bool {
        matches!(
            self.types.type_of(origin).map(Type::narrowed),
            Some(Type::Sequence(element))
                if matches!(
                    element.as_ref(),
                    Type::Primitive(Primitive::Int) | Type::Primitive(Primitive::Float)
                )
        )
    }
}

impl Traversal<FlattenData<'_>, Error> for Analyzer<'_> {
    /// Static 1-based bounds on fixed arrays: a directly-written index
    /// literal must fall within `[1, len]`
    fn traverse_index(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        container: &RefIdx,
        index: &RefIdx,
    ) -> Fallible<Error> {
        let len = match self.kind_of(container) {
            Some(ContainerKind::Fixed { len }) => len,
            // dynamic lengths are only known at run time
            _ => return Ok(()),
        };

        let value = match constant_index(cir, index) {
            Some(value) => value,
            None => return Ok(()),
        };

        if value < 1 || value > len as i64 {
            return Err(Error::new(ErrKind::IndexOutOfBounds)
                .with_msg(format!(
                    "index {value} is outside `[1, {len}]`, the bounds of this array"
                ))
                .with_loc(Some(node.data.ast.location().clone()))
                .with_hint(Error::hint().with_msg(String::from(
                    "indexing is 1-based: `a[1]` is the first element",
                ))));
        }

        Ok(())
    }

    fn traverse_for_loop(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        _index: &Option<RefIdx>,
        _value: &RefIdx,
        subject: &RefIdx,
        block: &RefIdx,
    ) -> Fallible<Error> {
        // fixed arrays cannot grow or shrink under the loop; only dynamic
        // subjects carry the rule
        if !matches!(self.kind_of(subject), Some(ContainerKind::Dynamic)) {
            return Ok(());
        }

        let subject_binding = match base_binding(cir, subject) {
            Some(binding) => binding,
            None => return Ok(()),
        };
        // loop subjects always carry the name they were bound to
        let name = cir[&subject_binding].data.ast.symbol().unwrap();

        let mut writes = Vec::new();
        find_writes(cir, block, subject_binding, &mut writes);

        let errs = writes
            .into_iter()
            .map(|write| {
                Error::new(ErrKind::MutationDuringIteration)
                    .with_msg(format!("cannot mutate `{name}` while iterating over it"))
                    .with_loc(Some(cir[&write].data.ast.location().clone()))
                    .with_hint(
                        Error::hint()
                            .with_msg(format!("the loop over `{name}` starts here"))
                            .with_loc(Some(node.data.ast.location().clone())),
                    )
            })
            .collect();

        multi(errs)
    }

    /// A `collect` ending a pure `map`/`filter` chain over one numeric
    /// dynamic container marks the whole chain as a candidate for batched
    /// lowering
    fn traverse_call(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        _to: &RefIdx,
        _generics: &[RefIdx],
        args: &[RefIdx],
    ) -> Fallible<Error> {
        match node.data.ast.symbol() {
            Some(name) if builtins::demangle(name.access()) == "collect" => {}
            _ => return Ok(()),
        }

        let receiver = match args.first() {
            Some(receiver) => receiver,
            None => return Ok(()),
        };

        let mut stages = vec![node.origin];
        let base = match self.pipeline(cir, receiver, &mut stages) {
            Some(base) => base,
            None => return Ok(()),
        };

        // a bare `collect` with nothing to fuse is not worth marking
        if stages.len() < 2 {
            return Ok(());
        }

        if !matches!(
            self.analysis.kind_of(&base),
            Some(ContainerKind::Dynamic)
        ) || !self.numeric_sequence(&base)
        {
            return Ok(());
        }

        self.analysis.vectorizable.extend(stages);

        Ok(())
    }
}
