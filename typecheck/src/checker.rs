//! Verification of the typed, monomorphized graph. Where the earlier stages
//! *establish* types, this one only compares them: call arguments against
//! declared parameters, assigned values against their targets, conditions
//! against `bool`, and so on. Errors are collected across the whole graph
//! rather than stopping at the first.

use ast::Node as AstNode;
use builtins::Operator;
use cir::{Cir, Fallible, Kind, Node, RefIdx, Traversal};
use error::{ErrKind, Error};
use flatten::{AstInfo, FlattenData};
use location::SpanTuple;
use types::{Capabilities, Capability, Primitive, Type};

use crate::TypeMap;

pub(crate) struct Checker<'ctx> {
    pub(crate) types: &'ctx TypeMap,
    pub(crate) capabilities: &'ctx Capabilities,
}

/// Terminal fragments for type errors. Types render purple to stand out
/// from the surrounding message, like the rest of the diagnostics do
mod fmt {
    use colored::Colorize;
    use types::Type;

    pub(super) fn ty(ty: Option<&Type>) -> String {
        match ty {
            Some(ty) => format!("`{}`", ty.to_string().purple()),
            None => String::from("no value"),
        }
    }
}

/// Equal types are assignable, a nullable accepts its inner type and the
/// `None` literal, and a nullable may flow in where its inner type is
/// expected - the nullability pass checks that it was narrowed first.
/// Nothing else widens.
fn assignable(expected: &Type, got: &Type) -> bool {
    if expected == got {
        return true;
    }

    match expected {
        Type::Nullable(inner) => matches!(got, Type::None) || inner.as_ref() == got,
        _ => matches!(got, Type::Nullable(inner) if inner.as_ref() == expected),
    }
}

fn type_mismatch(loc: &SpanTuple, expected: Option<&Type>, got: Option<&Type>) -> Error {
    Error::new(ErrKind::TypeChecker)
        .with_msg(format!(
            "mismatched types: expected {}, got {}",
            fmt::ty(expected),
            fmt::ty(got)
        ))
        .with_loc(Some(loc.clone()))
}

fn multi(mut errs: Vec<Error>) -> Fallible<Error> {
    match errs.len() {
        0 => Ok(()),
        1 => Err(errs.swap_remove(0)),
        _ => Err(Error::new(ErrKind::Multiple(errs))),
    }
}

impl Checker<'_> {
    fn type_of(&self, reference: &RefIdx) -> Option<&Type> {
        self.types.type_of(&reference.expect_resolved())
    }

    /// Check supplied values against declared slots, shared between calls
    /// and instantiations
    fn check_arguments(
        &self,
        node: &Node<FlattenData<'_>>,
        declared: &[Option<&Type>],
        supplied: &[RefIdx],
        declaration_loc: &SpanTuple,
        what: &str,
    ) -> Vec<Error> {
        let loc = node.data.ast.location();

        if declared.len() != supplied.len() {
            return vec![Error::new(ErrKind::TypeChecker)
                .with_msg(format!(
                    "{what} takes {} argument{} but {} {} supplied",
                    declared.len(),
                    if declared.len() == 1 { "" } else { "s" },
                    supplied.len(),
                    if supplied.len() == 1 { "was" } else { "were" },
                ))
                .with_loc(Some(loc.clone()))
                .with_hint(
                    Error::hint()
                        .with_msg(format!("{what} declared here"))
                        .with_loc(Some(declaration_loc.clone())),
                )];
        }

        declared
            .iter()
            .zip(supplied)
            .filter_map(|(declared, supplied)| {
                let got = self.type_of(supplied);

                match declared {
                    Some(declared) if got.map_or(true, |got| !assignable(declared, got)) => {
                        Some(type_mismatch(loc, Some(declared), got))
                    }
                    _ => None,
                }
            })
            .collect()
    }

    fn check_operator(
        &self,
        node: &Node<FlattenData<'_>>,
        op: Operator,
        args: &[RefIdx],
    ) -> Fallible<Error> {
        let lhs = self.type_of(&args[0]);
        let rhs = self.type_of(&args[1]);

        let mut errs = Vec::new();

        if let (Some(lhs), Some(rhs)) = (lhs.map(Type::narrowed), rhs.map(Type::narrowed)) {
            if lhs != rhs {
                errs.push(
                    Error::new(ErrKind::TypeChecker)
                        .with_msg(format!(
                            "operands of `{}` must share one type, got {} and {}",
                            op.as_str(),
                            fmt::ty(Some(lhs)),
                            fmt::ty(Some(rhs)),
                        ))
                        .with_loc(Some(node.data.ast.location().clone())),
                );
            }

            // operator bounds are known capabilities by construction
            let capability = Capability::try_from_str(op.bound()).unwrap();

            if !self.capabilities.satisfies(lhs, capability) {
                errs.push(
                    Error::new(ErrKind::UnsatisfiedConstraint)
                        .with_msg(format!(
                            "cannot apply `{}` to {}: `{capability}` is not satisfied",
                            op.as_str(),
                            fmt::ty(Some(lhs)),
                        ))
                        .with_loc(Some(node.data.ast.location().clone())),
                );
            }
        }

        multi(errs)
    }
}

impl Traversal<FlattenData<'_>, Error> for Checker<'_> {
    fn traverse_call(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
        _generics: &[RefIdx],
        args: &[RefIdx],
    ) -> Fallible<Error> {
        let target = &cir[to];

        // operator uses still aimed at a builtin extern get their own
        // diagnostic; dispatched ones are ordinary method calls by now
        if let Some(op) = node
            .data
            .ast
            .symbol()
            .and_then(|sym| Operator::try_from_str(builtins::demangle(sym.access())))
        {
            let target_name = target.data.ast.symbol().unwrap();

            if builtins::demangle(target_name.access()) == op.as_str() {
                return self.check_operator(node, op, args);
            }
        }

        match &target.kind {
            Kind::Function {
                args: declared, ..
            } => {
                let declared = declared
                    .iter()
                    .map(|arg| self.type_of(arg))
                    .collect::<Vec<Option<&Type>>>();
                // functions always carry a name; lambdas never end up as
                // direct call targets without one
                let name = target
                    .data
                    .ast
                    .symbol()
                    .map_or_else(|| String::from("function"), |sym| format!("`{sym}`"));

                multi(self.check_arguments(
                    node,
                    &declared,
                    args,
                    target.data.ast.location(),
                    &name,
                ))
            }
            // calls through function-valued bindings and slots
            _ => match self.type_of(to) {
                Some(Type::Function(declared, _)) => {
                    let declared = declared.iter().map(Some).collect::<Vec<Option<&Type>>>();

                    multi(self.check_arguments(
                        node,
                        &declared,
                        args,
                        target.data.ast.location(),
                        "this function value",
                    ))
                }
                // an uncallable target was already reported during inference
                _ => Ok(()),
            },
        }
    }

    fn traverse_instantiation(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
        _generics: &[RefIdx],
        fields: &[RefIdx],
    ) -> Fallible<Error> {
        let target = &cir[to];

        let declared = match &target.kind {
            Kind::RecordType { fields, .. } => fields
                .iter()
                .map(|field| self.type_of(field))
                .collect::<Vec<Option<&Type>>>(),
            _ => return Ok(()),
        };

        // class declarations always carry a name
        let name = format!("class `{}`", target.data.ast.symbol().unwrap());

        multi(self.check_arguments(node, &declared, fields, target.data.ast.location(), &name))
    }

    fn traverse_assignment(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
        from: &RefIdx,
    ) -> Fallible<Error> {
        let mut errs = Vec::new();
        let loc = node.data.ast.location();

        match assignment_target(cir, to) {
            Some(target) => {
                // assignment goes through a binding, which must be mutable
                let mutable = matches!(
                    &target.data.ast,
                    AstInfo::Node(ast::Ast {
                        node: AstNode::Binding { mutable: true, .. },
                        ..
                    })
                );

                if !mutable {
                    // targets always carry the name they were declared with
                    let name = target.data.ast.symbol().unwrap();

                    let err = match &target.kind {
                        Kind::Binding { .. } => Error::new(ErrKind::TypeChecker)
                            .with_msg(format!("cannot assign to immutable binding `{name}`"))
                            .with_loc(Some(loc.clone()))
                            .with_hint(
                                Error::hint()
                                    .with_msg(format!("declare it as `let mut {name}`"))
                                    .with_loc(Some(target.data.ast.location().clone())),
                            ),
                        _ => Error::new(ErrKind::TypeChecker)
                            .with_msg(format!(
                                "cannot assign to `{name}`, which is not a binding"
                            ))
                            .with_loc(Some(loc.clone())),
                    };

                    errs.push(err);
                }
            }
            None => errs.push(
                Error::new(ErrKind::TypeChecker)
                    .with_msg(String::from("invalid assignment target"))
                    .with_loc(Some(loc.clone())),
            ),
        }

        let expected = self.type_of(to);
        let got = self.type_of(from);

        match (expected, got) {
            (Some(expected), Some(got)) if !assignable(expected, got) => {
                errs.push(type_mismatch(loc, Some(expected), Some(got)))
            }
            (Some(expected), None) => errs.push(type_mismatch(loc, Some(expected), None)),
            _ => {}
        }

        multi(errs)
    }

    fn traverse_binding(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        value: &RefIdx,
        ty: &Option<RefIdx>,
    ) -> Fallible<Error> {
        let annotation = match ty {
            Some(ty) => self.type_of(ty),
            None => return Ok(()),
        };

        let got = self.type_of(value);

        match (annotation, got) {
            (Some(expected), Some(got)) if !assignable(expected, got) => Err(type_mismatch(
                node.data.ast.location(),
                Some(expected),
                Some(got),
            )),
            (Some(expected), None) => {
                Err(type_mismatch(node.data.ast.location(), Some(expected), None))
            }
            _ => Ok(()),
        }
    }

    fn traverse_function(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        _generics: &[RefIdx],
        _args: &[RefIdx],
        return_type: &Option<RefIdx>,
        block: &Option<RefIdx>,
    ) -> Fallible<Error> {
        let block = match block {
            Some(block) => block,
            // externs have no body to check
            None => return Ok(()),
        };

        let expected = return_type.as_ref().and_then(|ty| self.type_of(ty));

        let mut errs = Vec::new();
        let mut returns = Vec::new();
        collect_returns(cir, block, &mut returns);

        for ret in &returns {
            let got = self.type_of(ret);

            match (expected, got) {
                (Some(expected), Some(got)) if !assignable(expected, got) => errs.push(
                    type_mismatch(cir[ret].data.ast.location(), Some(expected), Some(got)),
                ),
                (Some(expected), None) => errs.push(type_mismatch(
                    cir[ret].data.ast.location(),
                    Some(expected),
                    None,
                )),
                (None, Some(got)) => errs.push(
                    Error::new(ErrKind::TypeChecker)
                        .with_msg(format!(
                            "returning a value of type {} from a function with no return type",
                            fmt::ty(Some(got))
                        ))
                        .with_loc(Some(cir[ret].data.ast.location().clone())),
                ),
                _ => {}
            }
        }

        if expected.is_some() && returns.is_empty() {
            errs.push(
                Error::new(ErrKind::TypeChecker)
                    .with_msg(format!(
                        "this function must return a value of type {}",
                        fmt::ty(expected)
                    ))
                    .with_loc(Some(node.data.ast.location().clone())),
            );
        }

        multi(errs)
    }

    fn traverse_condition(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        condition: &RefIdx,
        _true_block: &RefIdx,
        _false_block: &Option<RefIdx>,
    ) -> Fallible<Error> {
        match self.type_of(condition) {
            Some(Type::Primitive(Primitive::Bool)) | Some(Type::Nullable(_)) | None => Ok(()),
            Some(other) => Err(Error::new(ErrKind::TypeChecker)
                .with_msg(format!(
                    "a condition must be `bool` or nullable, got {}",
                    fmt::ty(Some(other))
                ))
                .with_loc(Some(node.data.ast.location().clone()))),
        }
    }

    fn traverse_null_test(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        on: &RefIdx,
        _negated: bool,
    ) -> Fallible<Error> {
        match self.type_of(on) {
            Some(Type::Nullable(_)) | Some(Type::None) | None => Ok(()),
            Some(other) => Err(Error::new(ErrKind::TypeChecker)
                .with_msg(format!(
                    "null test on a value of type {}, which can never be `None`",
                    fmt::ty(Some(other))
                ))
                .with_loc(Some(node.data.ast.location().clone()))),
        }
    }

    fn traverse_index(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        container: &RefIdx,
        index: &RefIdx,
    ) -> Fallible<Error> {
        let mut errs = Vec::new();
        let loc = node.data.ast.location();

        match self.type_of(container).map(Type::narrowed) {
            Some(Type::FixedArray(..)) | Some(Type::Sequence(_)) | None => {}
            Some(other) => errs.push(
                Error::new(ErrKind::TypeChecker)
                    .with_msg(format!(
                        "cannot index into a value of type {}",
                        fmt::ty(Some(other))
                    ))
                    .with_loc(Some(loc.clone())),
            ),
        }

        if let Some(index_ty) = self.type_of(index) {
            if !self.capabilities.satisfies(index_ty.narrowed(), Capability::Integer) {
                errs.push(
                    Error::new(ErrKind::TypeChecker)
                        .with_msg(format!(
                            "an index must be an `int`, got {}",
                            fmt::ty(Some(index_ty))
                        ))
                        .with_loc(Some(loc.clone())),
                );
            }
        }

        multi(errs)
    }

    fn traverse_sequence_literal(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        _node: &Node<FlattenData<'_>>,
        elements: &[RefIdx],
    ) -> Fallible<Error> {
        let first = match elements.first().and_then(|first| self.type_of(first)) {
            Some(first) => first,
            None => return Ok(()),
        };

        let errs = elements
            .iter()
            .skip(1)
            .filter_map(|element| match self.type_of(element) {
                Some(got) if got != first => Some(
                    Error::new(ErrKind::TypeChecker)
                        .with_msg(format!(
                            "sequence literals must be homogeneous: expected {}, got {}",
                            fmt::ty(Some(first)),
                            fmt::ty(Some(got))
                        ))
                        .with_loc(Some(cir[element].data.ast.location().clone())),
                ),
                _ => None,
            })
            .collect::<Vec<Error>>();

        multi(errs)
    }

    fn traverse_for_loop(
        &mut self,
        _cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        _index: &Option<RefIdx>,
        _value: &RefIdx,
        subject: &RefIdx,
        _block: &RefIdx,
    ) -> Fallible<Error> {
        match self.type_of(subject).map(Type::narrowed) {
            Some(Type::FixedArray(..)) | Some(Type::Sequence(_)) | None => Ok(()),
            Some(other) => Err(Error::new(ErrKind::TypeChecker)
                .with_msg(format!(
                    "cannot iterate over a value of type {}",
                    fmt::ty(Some(other))
                ))
                .with_loc(Some(node.data.ast.location().clone()))),
        }
    }
}

/// Chase an assignment target down to the binding (or slot) it writes
/// through: `xs[1].field` writes through `xs`
fn assignment_target<'a, 'ast>(
    cir: &'a Cir<FlattenData<'ast>>,
    to: &RefIdx,
) -> Option<&'a Node<FlattenData<'ast>>> {
    match &cir[to].kind {
        Kind::NodeRef(target) => Some(&cir[target]),
        Kind::Index { container, .. } => assignment_target(cir, container),
        Kind::FieldAccess { instance } => assignment_target(cir, instance),
        _ => None,
    }
}

/// Every return statement lexically inside a block, without descending into
/// nested function declarations (which are checked on their own)
fn collect_returns(cir: &Cir<FlattenData<'_>>, block: &RefIdx, acc: &mut Vec<RefIdx>) {
    let stmts = match &cir[block].kind {
        Kind::Statements(stmts) => stmts,
        _ => return,
    };

    for stmt in stmts {
        match &cir[stmt].kind {
            Kind::Return(_) => acc.push(*stmt),
            Kind::Statements(_) => collect_returns(cir, stmt, acc),
            Kind::Conditional {
                true_block,
                false_block,
                ..
            } => {
                collect_returns(cir, true_block, acc);
                if let Some(false_block) = false_block {
                    collect_returns(cir, false_block, acc);
                }
            }
            Kind::ForLoop { block, .. } => collect_returns(cir, block, acc),
            _ => {}
        }
    }
}
