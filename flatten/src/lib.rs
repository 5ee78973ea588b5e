//! The goal of the flatten crate is to produce a flat representation of a given syntax tree.
//! This means going from an [`Ast`] to a [`Cir`]. The goal of this crate is not to name-resolve:
//! Instead, this crate will produce a [`Cir`] containing enough information to perform name
//! resolution strictly on an instance of [`Cir`].
//!
//! Let's take the following chao program:
//!
//! ```text
//! func double(x: int) -> int
//!     return x * 2
//! end
//!
//! double(15)
//! ```
//!
//! We first visit the top level block. We go through all of its statements (visit them) and
//! then add the block to the [`Cir`]. We do this since a [`Kind::Statements`] only contains
//! *references* to the statements it contains, meaning the statements have to be defined
//! within the [`Cir`] before we define the block.
//!
//! The first statement is the function declaration. We have to visit its generics (none
//! here), its arguments, its return type, and finally its block, appending each to the
//! [`Cir`] so that the function node can refer to them. The argument `x: int` needs a
//! reference to the `int` type, which we cannot resolve yet - we only record that a type
//! named `int` is used here, and a later pass will point it at an actual declaration.
//!
//! ```text
//! Cir [
//!     (Origin::1, TypeReference(RefIdx::Unresolved)), // `int`
//!     (Origin::2, TypedValue { ty: RefIdx::Ref(1) }), // `x`
//!     (Origin::3, TypeReference(RefIdx::Unresolved)), // the return type
//! ]
//! ```
//!
//! The function's block contains a single return statement. Its value is the operation
//! `x * 2`, which desugars to a call to the operator `*` with two arguments: a use of the
//! binding `x` and the constant `2`. Uses and constants are leaf nodes, appended as
//! unresolved until name resolution and type inference give them meaning.
//!
//! ```text
//! Cir [
//!     ...
//!     (Origin::4, NodeRef(RefIdx::Unresolved)),       // `x`
//!     (Origin::5, Constant(RefIdx::Unresolved)),      // `2`, type unknown for now
//!     (Origin::6, Call { to: RefIdx::Unresolved, args: [Ref(4), Ref(5)] }), // `*`
//!     (Origin::7, Return(Some(Ref(6)))),
//!     (Origin::8, Statements([Ref(7)])),
//! ]
//! ```
//!
//! Which means we now have enough to create the function, and, continuing on, the outer
//! call and the top level block itself:
//!
//! ```text
//! Cir [
//!     ...
//!     (Origin::9, Function {
//!             generics: [],
//!             args: [Ref(2)],
//!             return_type: Some(Ref(3)),
//!             block: Some(Ref(8)),
//!         }
//!     ),
//!     (Origin::10, Constant(RefIdx::Unresolved)),     // `15`
//!     (Origin::11, Call { to: RefIdx::Unresolved, args: [Ref(10)] }),
//!     (Origin::12, Statements([Ref(9), Ref(11)])),
//! ]
//! ```

use ast::{Ast, Call, Declaration, GenericArgument, Node as AstNode, TypeArgument, TypedValue};
use cir::{Cir, Kind, Node, OriginIdx, RefIdx};
use location::SpanTuple;
use symbol::Symbol;

#[doc(hidden)]
trait VecExt<T> {
    fn with(self, elt: T) -> Self;
}

impl<T> VecExt<T> for Vec<T> {
    fn with(mut self, elt: T) -> Vec<T> {
        self.push(elt);

        self
    }
}

trait OriginExt {
    /// Returns the new value
    fn increment(&mut self) -> Self;
}

impl OriginExt for OriginIdx {
    fn increment(&mut self) -> OriginIdx {
        self.0 += 1;

        *self
    }
}

/// Where a [`Cir`] node comes from. Most nodes keep a reference into the
/// syntax tree they were flattened from. Nodes which do not map back to one
/// syntactic element, such as function arguments, loop variables or
/// monomorphized copies, carry their own symbol and location instead.
#[derive(Debug, Clone)]
pub enum AstInfo<'ast> {
    Node(&'ast Ast),
    Type(&'ast TypeArgument),
    Helper(Symbol, SpanTuple),
}

impl<'ast> AstInfo<'ast> {
    pub fn node(&self) -> &'ast Ast {
        match self {
            AstInfo::Node(ast) => ast,
            info => unreachable!(
                "no syntax node associated with this node's info ({info:?}). this is an interpreter error"
            ),
        }
    }

    pub fn symbol(&self) -> Option<Symbol> {
        match self {
            AstInfo::Node(ast) => match &ast.node {
                AstNode::Function { decl, .. } => Some(decl.name),
                AstNode::Class { name, .. } => Some(*name),
                AstNode::Instantiation(call) | AstNode::FunctionCall(call) => Some(call.to),
                AstNode::MethodCall { call, .. } => Some(call.to),
                AstNode::BinaryOp(op, _, _) => Some(Symbol::from(op.as_str())),
                AstNode::FieldAccess(_, field) => Some(*field),
                AstNode::Binding { name, .. } => Some(*name),
                AstNode::Var(sym) => Some(*sym),
                _ => None,
            },
            AstInfo::Type(ty) => match &ty.kind {
                ast::TypeKind::Named { name, .. } => Some(*name),
                _ => None,
            },
            AstInfo::Helper(sym, _) => Some(*sym),
        }
    }

    pub fn location(&self) -> &SpanTuple {
        match self {
            AstInfo::Node(ast) => &ast.location,
            AstInfo::Type(ty) => &ty.location,
            AstInfo::Helper(_, loc) => loc,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlattenData<'ast> {
    pub ast: AstInfo<'ast>,
}

struct Ctx<'ast> {
    pub cir: Cir<FlattenData<'ast>>,
    pub origin: OriginIdx,
}

impl<'ast> Ctx<'ast> {
    fn append(mut self, data: FlattenData<'ast>, kind: Kind) -> (Ctx<'ast>, RefIdx) {
        let next = self.origin.increment();
        let node = Node {
            data,
            origin: next,
            kind,
        };

        (
            Ctx {
                cir: self.cir.append(node),
                ..self
            },
            RefIdx::Resolved(next),
        )
    }

    fn append_node(self, ast: &'ast Ast, kind: Kind) -> (Ctx<'ast>, RefIdx) {
        let data = FlattenData {
            ast: AstInfo::Node(ast),
        };

        self.append(data, kind)
    }

    fn append_ty(self, ty: &'ast TypeArgument, kind: Kind) -> (Ctx<'ast>, RefIdx) {
        let data = FlattenData {
            ast: AstInfo::Type(ty),
        };

        self.append(data, kind)
    }

    fn visit_fold<T>(
        self,
        iter: impl Iterator<Item = T>,
        visitor: impl Fn(Ctx<'ast>, T) -> (Ctx<'ast>, RefIdx),
    ) -> (Ctx<'ast>, Vec<RefIdx>) {
        iter.fold((self, vec![]), |(ctx, refs), node| {
            let (ctx, new_ref) = visitor(ctx, node);

            (ctx, refs.with(new_ref))
        })
    }

    fn visit_opt<T>(
        self,
        node: Option<T>,
        visitor: impl Fn(Ctx<'ast>, T) -> (Ctx<'ast>, RefIdx),
    ) -> (Ctx<'ast>, Option<RefIdx>) {
        match node {
            Some(node) => {
                let (ctx, idx) = visitor(self, node);
                (ctx, Some(idx))
            }
            None => (self, None),
        }
    }

    fn handle_generic_node(
        self,
        location: &SpanTuple,
        generic: &GenericArgument,
    ) -> (Ctx<'ast>, RefIdx) {
        let data = FlattenData {
            ast: AstInfo::Helper(generic.name, location.clone()),
        };
        let kind = Kind::Generic {
            bound: generic.bound,
        };

        self.append(data, kind)
    }

    fn handle_ty_node(self, ty: &'ast TypeArgument) -> (Ctx<'ast>, RefIdx) {
        match &ty.kind {
            ast::TypeKind::Named { generics, .. } => {
                let (ctx, args) = self.visit_fold(generics.iter(), Ctx::handle_ty_node);

                ctx.append_ty(
                    ty,
                    Kind::TypeReference {
                        to: RefIdx::Unresolved,
                        args,
                    },
                )
            }
            ast::TypeKind::FixedArray { element, size } => {
                let (ctx, element) = self.handle_ty_node(element);

                ctx.append_ty(
                    ty,
                    Kind::ArrayType {
                        element,
                        size: *size,
                    },
                )
            }
            ast::TypeKind::Sequence(element) => {
                let (ctx, element) = self.handle_ty_node(element);

                ctx.append_ty(ty, Kind::SequenceType { element })
            }
            ast::TypeKind::Nullable(inner) => {
                let (ctx, inner) = self.handle_ty_node(inner);

                ctx.append_ty(ty, Kind::NullableType { inner })
            }
            ast::TypeKind::FunctionLike(args, return_type) => {
                let (ctx, args) = self.visit_fold(args.iter(), Ctx::handle_ty_node);
                let (ctx, return_type) =
                    ctx.visit_opt(return_type.as_deref(), Ctx::handle_ty_node);

                ctx.append_ty(ty, Kind::FunctionType { args, return_type })
            }
        }
    }

    fn visit_typed_value(
        self,
        TypedValue {
            location,
            symbol,
            ty,
        }: &'ast TypedValue,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, ty) = self.handle_ty_node(ty);

        let data = FlattenData {
            ast: AstInfo::Helper(*symbol, location.clone()),
        };

        ctx.append(data, Kind::TypedValue { ty })
    }

    fn visit_block(
        self,
        ast: &'ast Ast,
        stmts: &'ast [Ast],
        last_is_expr: bool,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, refs) = if let Some((maybe_return, nodes)) = stmts.split_last() {
            let (ctx, refs) = self.visit_fold(nodes.iter(), Ctx::visit);
            let (ctx, idx) = ctx.visit(maybe_return);

            // If the block contains a last expression, transform it into a return
            let (ctx, last_idx) = if last_is_expr {
                ctx.append_node(maybe_return, Kind::Return(Some(idx)))
            } else {
                (ctx, idx)
            };

            (ctx, refs.with(last_idx))
        } else {
            (self, vec![])
        };

        ctx.append_node(ast, Kind::Statements(refs))
    }

    fn visit_function(
        self,
        ast: &'ast Ast,
        Declaration {
            generics,
            args,
            return_type,
            ..
        }: &'ast Declaration,
        block: &'ast Option<Box<Ast>>,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, generics) = self.visit_fold(generics.iter(), |ctx, generic| {
            ctx.handle_generic_node(&ast.location, generic)
        });
        let (ctx, args) = ctx.visit_fold(args.iter(), Ctx::visit_typed_value);
        let (ctx, return_type) = ctx.visit_opt(return_type.as_ref(), Ctx::handle_ty_node);
        let (ctx, block) = ctx.visit_opt(block.as_deref(), Ctx::visit);

        let kind = Kind::Function {
            generics,
            args,
            return_type,
            block,
        };

        ctx.append_node(ast, kind)
    }

    fn visit_class(
        self,
        ast: &'ast Ast,
        generics: &'ast [GenericArgument],
        capabilities: &[Symbol],
        fields: &'ast [TypedValue],
        methods: &'ast [Ast],
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, generics) = self.visit_fold(generics.iter(), |ctx, generic| {
            ctx.handle_generic_node(&ast.location, generic)
        });
        let (ctx, fields) = ctx.visit_fold(fields.iter(), Ctx::visit_typed_value);
        let (ctx, methods) = ctx.visit_fold(methods.iter(), Ctx::visit);

        let kind = Kind::RecordType {
            generics,
            fields,
            methods,
            capabilities: capabilities.to_vec(),
        };

        ctx.append_node(ast, kind)
    }

    fn visit_fn_call(
        self,
        ast: &'ast Ast,
        Call { generics, args, .. }: &'ast Call,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, generics) = self.visit_fold(generics.iter(), Ctx::handle_ty_node);
        let (ctx, args) = ctx.visit_fold(args.iter(), Ctx::visit);

        let kind = Kind::Call {
            to: RefIdx::Unresolved,
            generics,
            args,
        };

        ctx.append_node(ast, kind)
    }

    /// The receiver of a method call becomes the call's first argument, so
    /// that once dispatched, a method call is just a call
    fn visit_method_call(
        self,
        ast: &'ast Ast,
        instance: &'ast Ast,
        Call { generics, args, .. }: &'ast Call,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, idx) = self.visit(instance);
        let (ctx, generics) = ctx.visit_fold(generics.iter(), Ctx::handle_ty_node);
        let (ctx, mut args) = ctx.visit_fold(args.iter(), Ctx::visit);

        args.insert(0, idx);

        let kind = Kind::Call {
            to: RefIdx::Unresolved,
            generics,
            args,
        };

        ctx.append_node(ast, kind)
    }

    fn visit_instantiation(
        self,
        ast: &'ast Ast,
        Call { generics, args, .. }: &'ast Call,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, generics) = self.visit_fold(generics.iter(), Ctx::handle_ty_node);
        let (ctx, fields) = ctx.visit_fold(args.iter(), Ctx::visit);

        let kind = Kind::Instantiation {
            to: RefIdx::Unresolved,
            generics,
            fields,
        };

        ctx.append_node(ast, kind)
    }

    fn visit_binary_op(self, ast: &'ast Ast, lhs: &'ast Ast, rhs: &'ast Ast) -> (Ctx<'ast>, RefIdx) {
        let (ctx, lhs) = self.visit(lhs);
        let (ctx, rhs) = ctx.visit(rhs);

        // Operations desugar to calls, named after the operator itself.
        // Dispatch later turns them into calls to the proper method
        let kind = Kind::Call {
            to: RefIdx::Unresolved,
            generics: vec![],
            args: vec![lhs, rhs],
        };

        ctx.append_node(ast, kind)
    }

    fn visit_if_else(
        self,
        ast: &'ast Ast,
        condition: &'ast Ast,
        if_block: &'ast Ast,
        else_block: &'ast Option<Box<Ast>>,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, condition) = self.visit(condition);
        let (ctx, true_block) = ctx.visit(if_block);
        let (ctx, false_block) = ctx.visit_opt(else_block.as_deref(), Ctx::visit);

        let kind = Kind::Conditional {
            condition,
            true_block,
            false_block,
        };

        ctx.append_node(ast, kind)
    }

    fn visit_binding(
        self,
        ast: &'ast Ast,
        ty: &'ast Option<TypeArgument>,
        value: &'ast Ast,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, ty) = self.visit_opt(ty.as_ref(), Ctx::handle_ty_node);
        let (ctx, value) = ctx.visit(value);

        ctx.append_node(ast, Kind::Binding { value, ty })
    }

    fn visit_for_loop(
        self,
        ast: &'ast Ast,
        index: &Option<Symbol>,
        value: Symbol,
        subject: &'ast Ast,
        block: &'ast Ast,
    ) -> (Ctx<'ast>, RefIdx) {
        // the subject is evaluated once, before the loop runs
        let (ctx, subject) = self.visit(subject);

        let loop_variable = |ctx: Ctx<'ast>, sym: Symbol| {
            let data = FlattenData {
                ast: AstInfo::Helper(sym, ast.location.clone()),
            };

            // the variable's type comes from the subject, which we know
            // nothing about yet
            ctx.append(
                data,
                Kind::TypedValue {
                    ty: RefIdx::Unresolved,
                },
            )
        };

        let (ctx, index) = ctx.visit_opt(index.as_ref(), |ctx, sym| loop_variable(ctx, *sym));
        let (ctx, value) = loop_variable(ctx, value);
        let (ctx, block) = ctx.visit(block);

        let kind = Kind::ForLoop {
            index,
            value,
            subject,
            block,
        };

        ctx.append_node(ast, kind)
    }

    fn visit_lambda(
        self,
        ast: &'ast Ast,
        args: &'ast [TypedValue],
        return_type: &'ast Option<TypeArgument>,
        block: &'ast Ast,
    ) -> (Ctx<'ast>, RefIdx) {
        let (ctx, args) = self.visit_fold(args.iter(), Ctx::visit_typed_value);
        let (ctx, return_type) = ctx.visit_opt(return_type.as_ref(), Ctx::handle_ty_node);
        let (ctx, block) = ctx.visit(block);

        // a lambda is just a nameless function
        let kind = Kind::Function {
            generics: vec![],
            args,
            return_type,
            block: Some(block),
        };

        ctx.append_node(ast, kind)
    }

    fn visit(self, ast: &'ast Ast) -> (Ctx<'ast>, RefIdx) {
        match &ast.node {
            AstNode::Block {
                stmts,
                last_is_expr,
            } => self.visit_block(ast, stmts, *last_is_expr),
            AstNode::Function { decl, block, .. } => self.visit_function(ast, decl, block),
            AstNode::Class {
                generics,
                capabilities,
                fields,
                methods,
                ..
            } => self.visit_class(ast, generics, capabilities, fields, methods),
            AstNode::Instantiation(call) => self.visit_instantiation(ast, call),
            AstNode::FunctionCall(call) => self.visit_fn_call(ast, call),
            AstNode::MethodCall { instance, call } => self.visit_method_call(ast, instance, call),
            AstNode::BinaryOp(_, lhs, rhs) => self.visit_binary_op(ast, lhs, rhs),
            AstNode::FieldAccess(instance, _) => {
                let (ctx, instance) = self.visit(instance);

                ctx.append_node(ast, Kind::FieldAccess { instance })
            }
            AstNode::IfElse {
                condition,
                if_block,
                else_block,
            } => self.visit_if_else(ast, condition, if_block, else_block),
            AstNode::Binding { ty, value, .. } => self.visit_binding(ast, ty, value),
            AstNode::Assignment { target, value } => {
                let (ctx, to) = self.visit(target);
                let (ctx, from) = ctx.visit(value);

                ctx.append_node(ast, Kind::Assignment { to, from })
            }
            AstNode::Var(_) => self.append_node(ast, Kind::NodeRef(RefIdx::Unresolved)),
            AstNode::NullTest { value, negated } => {
                let (ctx, on) = self.visit(value);

                ctx.append_node(
                    ast,
                    Kind::NullTest {
                        on,
                        negated: *negated,
                    },
                )
            }
            AstNode::ForLoop {
                index,
                value,
                subject,
                block,
            } => self.visit_for_loop(ast, index, *value, subject, block),
            AstNode::Return(value) => {
                let (ctx, idx) = self.visit_opt(value.as_deref(), Ctx::visit);

                ctx.append_node(ast, Kind::Return(idx))
            }
            AstNode::Index { container, index } => {
                let (ctx, container) = self.visit(container);
                let (ctx, index) = ctx.visit(index);

                ctx.append_node(ast, Kind::Index { container, index })
            }
            AstNode::SequenceLiteral(elements) => {
                let (ctx, elements) = self.visit_fold(elements.iter(), Ctx::visit);

                ctx.append_node(ast, Kind::SequenceLiteral { elements })
            }
            AstNode::Lambda {
                args,
                return_type,
                block,
            } => self.visit_lambda(ast, args, return_type, block),
            // Leaf nodes
            AstNode::Default => self.append_node(ast, Kind::Default),
            AstNode::Constant(_) => self.append_node(ast, Kind::Constant(RefIdx::Unresolved)),
            AstNode::Empty => self.append_node(ast, Kind::Statements(vec![])),
        }
    }
}

impl<'ast> FlattenAst<'ast> for Ast {
    fn flatten(&'ast self) -> Cir<FlattenData<'ast>> {
        let ctx = Ctx {
            cir: Cir::default(),
            origin: OriginIdx::default(),
        };

        let (ctx, _last_ref) = ctx.visit(self);

        ctx.cir.check();

        ctx.cir
    }
}

pub trait FlattenAst<'ast>: Sized {
    fn flatten(&'ast self) -> Cir<FlattenData<'ast>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::builder::*;

    #[test]
    fn block_order() {
        // { 14; 15; }
        let block = block(vec![int_constant(14), int_constant(15)]);

        let cir = block.flatten();

        assert!(matches!(cir[&OriginIdx(1)].kind, Kind::Constant(_)));
        assert!(matches!(cir[&OriginIdx(2)].kind, Kind::Constant(_)));
        assert!(matches!(cir[&OriginIdx(3)].kind, Kind::Statements(_)));
    }

    #[test]
    fn block_expr() {
        // { 15 }
        let block = expr_block(vec![int_constant(15)]);

        let cir = block.flatten();

        let block = &cir[&OriginIdx(3)];
        let stmts = match &block.kind {
            Kind::Statements(stmts) => stmts,
            _ => unreachable!(),
        };

        assert!(matches!(cir[&stmts[0]].kind, Kind::Return(Some(_))));
    }

    #[test]
    fn operation_becomes_call() {
        // 1 + 2
        let op = binary_op(ast::Operator::Add, int_constant(1), int_constant(2));

        let cir = op.flatten();

        let call = &cir[&OriginIdx(3)];
        match &call.kind {
            Kind::Call { to, generics, args } => {
                assert_eq!(*to, RefIdx::Unresolved);
                assert!(generics.is_empty());
                assert_eq!(args.len(), 2);
            }
            _ => unreachable!(),
        }

        assert_eq!(call.data.ast.symbol(), Some(Symbol::from("+")));
    }

    #[test]
    fn method_receiver_is_first_arg() {
        // s.push(15)
        let push = method_call(var("s"), "push", vec![int_constant(15)]);

        let cir = push.flatten();

        let receiver = &cir[&OriginIdx(1)];
        assert!(matches!(receiver.kind, Kind::NodeRef(_)));

        let call = &cir[&OriginIdx(3)];
        match &call.kind {
            Kind::Call { args, .. } => {
                assert_eq!(args[0], RefIdx::Resolved(OriginIdx(1)));
                assert_eq!(args.len(), 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn loop_variables_stay_untyped() {
        // for i, v in values {}
        let loop_ast = for_loop(Some("i"), "v", var("values"), block(vec![]));

        let cir = loop_ast.flatten();

        let loop_node = cir
            .nodes
            .values()
            .find(|node| matches!(node.kind, Kind::ForLoop { .. }));

        let (index, value) = match &loop_node.unwrap().kind {
            Kind::ForLoop { index, value, .. } => (index.unwrap(), *value),
            _ => unreachable!(),
        };

        assert!(matches!(
            cir[&index].kind,
            Kind::TypedValue {
                ty: RefIdx::Unresolved
            }
        ));
        assert!(matches!(
            cir[&value].kind,
            Kind::TypedValue {
                ty: RefIdx::Unresolved
            }
        ));
    }

    #[test]
    fn annotation_chain() {
        // let grid: [int; 4] = default
        let binding = typed_binding("grid", array_ty(ty("int"), 4), default_init());

        let cir = binding.flatten();

        // the `int` reference must exist before the array type that wraps it
        assert!(matches!(cir[&OriginIdx(1)].kind, Kind::TypeReference { .. }));
        assert!(matches!(
            cir[&OriginIdx(2)].kind,
            Kind::ArrayType { size: 4, .. }
        ));
        assert!(matches!(cir[&OriginIdx(3)].kind, Kind::Default));
        assert!(matches!(cir[&OriginIdx(4)].kind, Kind::Binding { .. }));
    }
}
