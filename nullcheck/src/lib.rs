//! Nullability analysis. The type layer lets a `T?` flow anywhere a `T` is
//! required; this pass walks every body in evaluation order and checks that
//! each such use was proven non-null first - by a `None` test or by the
//! truthiness of the value itself. Narrowing is lexical: it holds inside
//! the branch that proved it, and past the conditional only when the other
//! branch cannot fall through. The pass never alters the graph; it only
//! collects diagnostics, as many as it can find.

use cir::Cir;
use error::{ErrKind, Error};
use flatten::FlattenData;
use typecheck::TypeMap;

mod flow;

pub trait NullCheck {
    /// Verify every nullable use in the graph. `types` must come from
    /// inferring `self`.
    fn null_check(&self, types: &TypeMap) -> Result<(), Error>;
}

impl NullCheck for Cir<FlattenData<'_>> {
    fn null_check(&self, types: &TypeMap) -> Result<(), Error> {
        let mut errs = flow::check(self, types);

        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.swap_remove(0)),
            _ => Err(Error::new(ErrKind::Multiple(errs))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::builder::*;
    use builtins::AppendAstBuiltins;
    use flatten::FlattenAst;
    use generics::Monomorphize;
    use name_resolve::NameResolve;
    use typecheck::TypeCheck;

    fn check(ast: &ast::Ast) -> Result<(), Error> {
        let (cir, types) = ast.flatten().name_resolve().unwrap().type_infer().unwrap();
        let (cir, types) = cir
            .monomorphize(&types)
            .unwrap()
            .type_infer()
            .unwrap();

        // these programs are well-typed; only their nullability is at stake
        cir.type_check(&types).unwrap();

        cir.null_check(&types)
    }

    /// An `int?` of unknown provenance
    fn fetch() -> ast::Ast {
        extern_function("fetch", vec![], vec![], Some(nullable_ty(ty("int"))))
    }

    #[test]
    fn unproven_use_is_reported() {
        let ast = block(vec![
            fetch(),
            binding("x", call("fetch", vec![])),
            binding("y", binary_op(ast::Operator::Add, var("x"), int_constant(1))),
        ])
        .append_builtins()
        .unwrap();

        let err = check(&ast).unwrap_err();

        assert!(matches!(err.kind(), ErrKind::PossiblyNullValue));
    }

    #[test]
    fn narrowed_use_inside_the_branch_is_accepted() {
        let ast = block(vec![
            fetch(),
            binding("x", call("fetch", vec![])),
            if_else(
                is_not_none(var("x")),
                block(vec![binding(
                    "y",
                    binary_op(ast::Operator::Add, var("x"), int_constant(1)),
                )]),
                None,
            ),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn narrowing_ends_with_the_branch() {
        let ast = block(vec![
            fetch(),
            binding("x", call("fetch", vec![])),
            if_else(is_not_none(var("x")), block(vec![]), None),
            binding("y", binary_op(ast::Operator::Add, var("x"), int_constant(1))),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn the_negated_test_narrows_the_other_branch() {
        let ast = block(vec![
            fetch(),
            binding("x", call("fetch", vec![])),
            if_else(
                is_none(var("x")),
                block(vec![]),
                Some(block(vec![binding(
                    "y",
                    binary_op(ast::Operator::Add, var("x"), int_constant(1)),
                )])),
            ),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn a_confirmed_none_is_reported() {
        let ast = block(vec![
            fetch(),
            binding("x", call("fetch", vec![])),
            if_else(
                is_none(var("x")),
                block(vec![binding(
                    "y",
                    binary_op(ast::Operator::Add, var("x"), int_constant(1)),
                )]),
                None,
            ),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn truthiness_narrows() {
        let ast = block(vec![
            fetch(),
            binding("x", call("fetch", vec![])),
            if_else(
                var("x"),
                block(vec![binding(
                    "y",
                    binary_op(ast::Operator::Add, var("x"), int_constant(1)),
                )]),
                None,
            ),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn an_early_return_persists_the_narrowing() {
        let ast = block(vec![function(
            "or_one",
            vec![],
            vec![argument("x", nullable_ty(ty("int")))],
            Some(ty("int")),
            block(vec![
                if_else(
                    is_none(var("x")),
                    block(vec![return_value(Some(int_constant(1)))]),
                    None,
                ),
                return_value(Some(binary_op(
                    ast::Operator::Add,
                    var("x"),
                    int_constant(0),
                ))),
            ]),
        )])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn assignment_of_none_widens_again() {
        let ast = block(vec![
            fetch(),
            mut_binding("x", Some(nullable_ty(ty("int"))), call("fetch", vec![])),
            if_else(
                is_not_none(var("x")),
                block(vec![
                    assignment(var("x"), none()),
                    binding("y", binary_op(ast::Operator::Add, var("x"), int_constant(1))),
                ]),
                None,
            ),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn a_proven_initializer_starts_narrowed() {
        let ast = block(vec![
            typed_binding("x", nullable_ty(ty("int")), int_constant(15)),
            binding("y", binary_op(ast::Operator::Add, var("x"), int_constant(1))),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn nullable_argument_to_a_non_nullable_parameter() {
        let takes_int = extern_function(
            "takes_int",
            vec![],
            vec![argument("n", ty("int"))],
            None,
        );

        let rejected = block(vec![
            fetch(),
            takes_int.clone(),
            binding("x", call("fetch", vec![])),
            call("takes_int", vec![var("x")]),
        ])
        .append_builtins()
        .unwrap();
        let narrowed = block(vec![
            fetch(),
            takes_int,
            binding("x", call("fetch", vec![])),
            if_else(
                is_not_none(var("x")),
                block(vec![call("takes_int", vec![var("x")])]),
                None,
            ),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&rejected).is_err());
        assert!(check(&narrowed).is_ok());
    }

    #[test]
    fn a_nullable_parameter_takes_the_value_as_is() {
        let ast = block(vec![
            fetch(),
            extern_function(
                "takes_opt",
                vec![],
                vec![argument("n", nullable_ty(ty("int")))],
                None,
            ),
            binding("x", call("fetch", vec![])),
            call("takes_opt", vec![var("x")]),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn field_access_requires_a_proven_instance() {
        let point = class(
            "Point",
            vec![],
            vec![],
            vec![argument("x", ty("int"))],
            vec![],
        );
        let fetch_point = extern_function(
            "fetch_point",
            vec![],
            vec![],
            Some(nullable_ty(ty("Point"))),
        );

        let rejected = block(vec![
            point.clone(),
            fetch_point.clone(),
            binding("p", call("fetch_point", vec![])),
            binding("a", field_access(var("p"), "x")),
        ])
        .append_builtins()
        .unwrap();
        let narrowed = block(vec![
            point,
            fetch_point,
            binding("p", call("fetch_point", vec![])),
            if_else(
                is_not_none(var("p")),
                block(vec![binding("a", field_access(var("p"), "x"))]),
                None,
            ),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&rejected).is_err());
        assert!(check(&narrowed).is_ok());
    }

    #[test]
    fn a_nullable_index_must_be_proven() {
        let ast = block(vec![
            fetch(),
            binding("xs", sequence(vec![int_constant(1), int_constant(2)])),
            binding("i", call("fetch", vec![])),
            binding("first", index(var("xs"), var("i"))),
        ])
        .append_builtins()
        .unwrap();

        let err = check(&ast).unwrap_err();

        assert!(matches!(err.kind(), ErrKind::PossiblyNullValue));
    }
}
