//! Type inference and verification over the flat graph. Inference assigns
//! every value-producing node a canonical [`Type`] and resolves the calls
//! name resolution could not (methods, operators on class instances); the
//! check then compares each use site against its declaration. The two are
//! separate entry points because monomorphization sits between them: it
//! consumes an inferred (possibly generic) program and produces one worth
//! checking.

use cir::{Cir, Traversal};
use error::{ErrKind, Error};
use flatten::FlattenData;
use types::capability;
use types::primitives;

mod actual;
mod checker;
mod dispatch;
mod typemap;
mod typer;

pub use typemap::TypeMap;

pub trait TypeCheck<'ast>: Sized {
    /// Assign a type to every value-producing node and resolve method and
    /// operator dispatch. Dispatch rewrites call targets, which can unlock
    /// further inference (the receiver of a chained call is typed by the
    /// inner call), so the two run to a fixed point.
    fn type_infer(self) -> Result<(Cir<FlattenData<'ast>>, TypeMap), Error>;

    /// Verify every use site against its declaration: call arguments,
    /// assignments, conditions, returns, indexing, literals
    fn type_check(&self, types: &TypeMap) -> Result<(), Error>;
}

impl<'ast> TypeCheck<'ast> for Cir<FlattenData<'ast>> {
    fn type_infer(mut self) -> Result<(Cir<FlattenData<'ast>>, TypeMap), Error> {
        let primitives = primitives::find(&self)?;

        loop {
            let map = actual::resolve(&self, &primitives)?;

            if !dispatch::dispatch(&mut self, &map)? {
                self.check();

                return Ok((self, map));
            }
        }
    }

    fn type_check(&self, types: &TypeMap) -> Result<(), Error> {
        let capabilities = capability::collect(self)?;

        let mut checker = checker::Checker {
            types,
            capabilities: &capabilities,
        };

        checker.traverse(self).map_err(|mut errs| match errs.len() {
            1 => errs.swap_remove(0),
            _ => Error::new(ErrKind::Multiple(errs)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::builder::*;
    use builtins::AppendAstBuiltins;
    use cir::{Kind, Node, OriginIdx, RefIdx};
    use flatten::FlattenAst;
    use name_resolve::NameResolve;
    use symbol::Symbol;
    use types::{Primitive, Type};

    fn infer(ast: &ast::Ast) -> (Cir<FlattenData<'_>>, TypeMap) {
        ast.flatten().name_resolve().unwrap().type_infer().unwrap()
    }

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

    fn type_of<'map>(
        cir: &Cir<FlattenData<'_>>,
        types: &'map TypeMap,
        name: &str,
        filter: impl Fn(&Kind) -> bool,
    ) -> &'map Type {
        types.type_of(&find_node(cir, name, filter).origin).unwrap()
    }

    fn int() -> Type {
        Type::Primitive(Primitive::Int)
    }

    #[test]
    fn literals_type_on_sight() {
        let ast = block(vec![
            binding("a", int_constant(15)),
            binding("b", float_constant(4.2)),
            binding("c", string_constant("hey")),
        ])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        assert_eq!(
            type_of(&cir, &types, "a", |k| matches!(k, Kind::Binding { .. })),
            &int()
        );
        assert_eq!(
            type_of(&cir, &types, "b", |k| matches!(k, Kind::Binding { .. })),
            &Type::Primitive(Primitive::Float)
        );
        assert_eq!(
            type_of(&cir, &types, "c", |k| matches!(k, Kind::Binding { .. })),
            &Type::Primitive(Primitive::String)
        );
    }

    #[test]
    fn uses_share_their_binding_type() {
        // let x = 15; x
        let ast = block(vec![binding("x", int_constant(15)), var("x")])
            .append_builtins()
            .unwrap();

        let (cir, types) = infer(&ast);

        assert_eq!(
            type_of(&cir, &types, "x", |k| matches!(k, Kind::NodeRef(_))),
            &int()
        );
    }

    #[test]
    fn calls_take_the_declared_return_type() {
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
        ])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        assert_eq!(
            type_of(&cir, &types, "pi", |k| matches!(k, Kind::Call { .. })),
            &Type::Primitive(Primitive::Float)
        );
    }

    #[test]
    fn loop_variable_takes_the_element_type() {
        // let xs = 1{}; for v in xs { v }
        let ast = block(vec![
            binding("xs", sequence(vec![int_constant(1)])),
            for_loop(None, "v", var("xs"), block(vec![var("v")])),
        ])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        assert_eq!(
            type_of(&cir, &types, "v", |k| matches!(k, Kind::TypedValue { .. })),
            &int()
        );
    }

    #[test]
    fn loop_index_is_an_int() {
        let ast = block(vec![
            binding("xs", sequence(vec![int_constant(1)])),
            for_loop(Some("i"), "v", var("xs"), block(vec![var("i")])),
        ])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        assert_eq!(
            type_of(&cir, &types, "i", |k| matches!(k, Kind::TypedValue { .. })),
            &int()
        );
    }

    #[test]
    fn default_takes_the_annotated_type() {
        // let x: int = default
        let ast = block(vec![typed_binding("x", ty("int"), default_init())])
            .append_builtins()
            .unwrap();

        let (cir, types) = infer(&ast);

        assert_eq!(
            type_of(&cir, &types, "x", |k| matches!(k, Kind::Binding { .. })),
            &int()
        );
    }

    #[test]
    fn unannotated_default_cannot_be_inferred() {
        let ast = block(vec![binding("x", default_init())])
            .append_builtins()
            .unwrap();

        let result = ast.flatten().name_resolve().unwrap().type_infer();

        assert!(result.is_err());
    }

    #[test]
    fn empty_sequence_takes_the_annotated_type() {
        // let xs: int{} = {}
        let ast = block(vec![typed_binding(
            "xs",
            sequence_ty(ty("int")),
            sequence(vec![]),
        )])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        assert_eq!(
            type_of(&cir, &types, "xs", |k| matches!(k, Kind::Binding { .. })),
            &Type::Sequence(Box::new(int()))
        );
    }

    #[test]
    fn method_call_dispatches_on_the_receiver_type() {
        // class Point(x: int) { func norm(self: Point) -> int { self.x } }
        // let p = Point(x: 15); p.norm()
        let ast = block(vec![
            class(
                "Point",
                vec![],
                vec![],
                vec![argument("x", ty("int"))],
                vec![function(
                    "norm",
                    vec![],
                    vec![argument("self", ty("Point"))],
                    Some(ty("int")),
                    expr_block(vec![field_access(var("self"), "x")]),
                )],
            ),
            binding("p", instantiation("Point", vec![], vec![int_constant(15)])),
            method_call(var("p"), "norm", vec![]),
        ])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        let method = find_node(&cir, "norm", |k| matches!(k, Kind::Function { .. }));
        let call = find_node(&cir, "norm", |k| matches!(k, Kind::Call { .. }));

        match &call.kind {
            Kind::Call { to, .. } => assert_eq!(*to, RefIdx::Resolved(method.origin)),
            _ => unreachable!(),
        }

        assert_eq!(types.type_of(&call.origin).unwrap(), &int());
    }

    #[test]
    fn chained_method_calls_dispatch_in_order() {
        // p.double().norm() needs two rounds: the receiver of `norm` is only
        // typed once `double` is dispatched
        let ast = block(vec![
            class(
                "Point",
                vec![],
                vec![],
                vec![argument("x", ty("int"))],
                vec![
                    function(
                        "double",
                        vec![],
                        vec![argument("self", ty("Point"))],
                        Some(ty("Point")),
                        expr_block(vec![instantiation(
                            "Point",
                            vec![],
                            vec![binary_op(
                                ast::Operator::Mul,
                                field_access(var("self"), "x"),
                                int_constant(2),
                            )],
                        )]),
                    ),
                    function(
                        "norm",
                        vec![],
                        vec![argument("self", ty("Point"))],
                        Some(ty("int")),
                        expr_block(vec![field_access(var("self"), "x")]),
                    ),
                ],
            ),
            binding("p", instantiation("Point", vec![], vec![int_constant(15)])),
            method_call(
                method_call(var("p"), "double", vec![]),
                "norm",
                vec![],
            ),
        ])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        let norm = find_node(&cir, "norm", |k| matches!(k, Kind::Function { .. }));
        let call = find_node(&cir, "norm", |k| matches!(k, Kind::Call { .. }));

        match &call.kind {
            Kind::Call { to, .. } => assert_eq!(*to, RefIdx::Resolved(norm.origin)),
            _ => unreachable!(),
        }

        assert_eq!(types.type_of(&call.origin).unwrap(), &int());
    }

    #[test]
    fn missing_method_is_reported() {
        let ast = block(vec![
            class(
                "Point",
                vec![],
                vec![],
                vec![argument("x", ty("int"))],
                vec![],
            ),
            binding("p", instantiation("Point", vec![], vec![int_constant(15)])),
            method_call(var("p"), "norm", vec![]),
        ])
        .append_builtins()
        .unwrap();

        let result = ast.flatten().name_resolve().unwrap().type_infer();

        assert!(result.is_err());
    }

    #[test]
    fn operators_dispatch_to_class_methods() {
        // class Meters { ... func __add__(...) } m + m
        let ast = block(vec![
            class(
                "Meters",
                vec![],
                vec!["Number"],
                vec![argument("value", ty("int"))],
                vec![function(
                    "__add__",
                    vec![],
                    vec![
                        argument("self", ty("Meters")),
                        argument("other", ty("Meters")),
                    ],
                    Some(ty("Meters")),
                    expr_block(vec![instantiation(
                        "Meters",
                        vec![],
                        vec![binary_op(
                            ast::Operator::Add,
                            field_access(var("self"), "value"),
                            field_access(var("other"), "value"),
                        )],
                    )]),
                )],
            ),
            binding("m", instantiation("Meters", vec![], vec![int_constant(3)])),
            binary_op(ast::Operator::Add, var("m"), var("m")),
        ])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        let method = find_node(&cir, "__add__", |k| matches!(k, Kind::Function { .. }));
        // the class-operand use of `+`, as opposed to the one inside the
        // method body which stays on the builtin
        let operation = cir
            .nodes
            .values()
            .filter(|node| matches!(node.kind, Kind::Call { .. }))
            .filter(|node| node.data.ast.symbol() == Some(Symbol::from("+")))
            .find(|node| match &node.kind {
                Kind::Call { to, .. } => *to == RefIdx::Resolved(method.origin),
                _ => false,
            });

        let operation = operation.expect("operator use was not dispatched to `__add__`");

        match types.type_of(&operation.origin).unwrap() {
            Type::Record(decl, _) => assert_eq!(decl.name, Symbol::from("Meters")),
            other => panic!("expected a `Meters` result, got `{other}`"),
        }
    }

    #[test]
    fn operator_without_method_is_reported() {
        let ast = block(vec![
            class(
                "Point",
                vec![],
                vec![],
                vec![argument("x", ty("int"))],
                vec![],
            ),
            binding("p", instantiation("Point", vec![], vec![int_constant(15)])),
            binary_op(ast::Operator::Add, var("p"), var("p")),
        ])
        .append_builtins()
        .unwrap();

        let result = ast.flatten().name_resolve().unwrap().type_infer();

        assert!(result.is_err());
    }

    #[test]
    fn field_access_types_through_generic_arguments() {
        // class Pair[T](first: T, second: T)
        // let p = Pair[int](1, 2); p.first
        let ast = block(vec![
            class(
                "Pair",
                vec![generic("T")],
                vec![],
                vec![argument("first", ty("T")), argument("second", ty("T"))],
                vec![],
            ),
            binding(
                "p",
                instantiation(
                    "Pair",
                    vec![ty("int")],
                    vec![int_constant(1), int_constant(2)],
                ),
            ),
            field_access(var("p"), "first"),
        ])
        .append_builtins()
        .unwrap();

        let (cir, types) = infer(&ast);

        assert_eq!(
            type_of(&cir, &types, "first", |k| matches!(
                k,
                Kind::FieldAccess { .. }
            )),
            &int()
        );
    }

    fn check(ast: &ast::Ast) -> Result<(), Error> {
        let (cir, types) = ast
            .flatten()
            .name_resolve()
            .unwrap()
            .type_infer()
            .unwrap();

        cir.type_check(&types)
    }

    #[test]
    fn well_typed_program_checks() {
        let ast = block(vec![
            function(
                "double",
                vec![],
                vec![argument("x", ty("int"))],
                Some(ty("int")),
                expr_block(vec![binary_op(
                    ast::Operator::Mul,
                    var("x"),
                    int_constant(2),
                )]),
            ),
            binding("x", call("double", vec![int_constant(7)])),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn call_argument_type_mismatch() {
        let ast = block(vec![
            function(
                "double",
                vec![],
                vec![argument("x", ty("int"))],
                Some(ty("int")),
                expr_block(vec![var("x")]),
            ),
            call("double", vec![bool_constant(true)]),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn call_arity_mismatch() {
        let ast = block(vec![
            function(
                "double",
                vec![],
                vec![argument("x", ty("int"))],
                Some(ty("int")),
                expr_block(vec![var("x")]),
            ),
            call("double", vec![int_constant(1), int_constant(2)]),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn operands_must_share_a_type() {
        // 1 + 1.5
        let ast = block(vec![binary_op(
            ast::Operator::Add,
            int_constant(1),
            float_constant(1.5),
        )])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn arithmetic_needs_the_number_capability() {
        // true + false
        let ast = block(vec![binary_op(
            ast::Operator::Add,
            bool_constant(true),
            bool_constant(false),
        )])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn equality_works_on_bools() {
        let ast = block(vec![binary_op(
            ast::Operator::Equals,
            bool_constant(true),
            bool_constant(false),
        )])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn assignment_needs_a_mutable_binding() {
        let ast = block(vec![
            binding("x", int_constant(1)),
            assignment(var("x"), int_constant(2)),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn assignment_to_a_mutable_binding_checks() {
        let ast = block(vec![
            mut_binding("x", None, int_constant(1)),
            assignment(var("x"), int_constant(2)),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn assignment_value_must_match() {
        let ast = block(vec![
            mut_binding("x", None, int_constant(1)),
            assignment(var("x"), bool_constant(true)),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn condition_must_be_bool_or_nullable() {
        let ast = block(vec![if_else(int_constant(1), block(vec![]), None)])
            .append_builtins()
            .unwrap();

        assert!(check(&ast).is_err());

        let nullable = block(vec![
            typed_binding("x", nullable_ty(ty("int")), int_constant(1)),
            if_else(var("x"), block(vec![]), None),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&nullable).is_ok());
    }

    #[test]
    fn return_type_must_match_the_declaration() {
        let ast = block(vec![function(
            "pi",
            vec![],
            vec![],
            Some(ty("float")),
            expr_block(vec![int_constant(3)]),
        )])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn declared_return_requires_a_value() {
        let ast = block(vec![function(
            "pi",
            vec![],
            vec![],
            Some(ty("float")),
            block(vec![int_constant(3)]),
        )])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn nullable_accepts_inner_and_none() {
        let ast = block(vec![
            typed_binding("a", nullable_ty(ty("int")), int_constant(1)),
            typed_binding("b", nullable_ty(ty("int")), none()),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn nullable_passes_where_the_inner_type_is_expected() {
        // the type layer lets the nullable through; whether it was narrowed
        // is the nullability pass's concern
        let ast = block(vec![
            typed_binding("x", nullable_ty(ty("int")), int_constant(1)),
            typed_binding("y", ty("int"), var("x")),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_ok());
    }

    #[test]
    fn non_nullable_rejects_none() {
        let ast = block(vec![typed_binding("a", ty("int"), none())])
            .append_builtins()
            .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn null_test_on_a_plain_value_is_reported() {
        let ast = block(vec![
            binding("x", int_constant(1)),
            is_none(var("x")),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn index_must_be_an_integer() {
        let ast = block(vec![
            binding("xs", sequence(vec![int_constant(1)])),
            index(var("xs"), bool_constant(true)),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn only_containers_can_be_indexed() {
        let ast = block(vec![
            binding("x", int_constant(1)),
            index(var("x"), int_constant(1)),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn sequence_literals_must_be_homogeneous() {
        let ast = block(vec![sequence(vec![
            int_constant(1),
            string_constant("two"),
        ])])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn instantiation_fields_are_checked() {
        let ast = block(vec![
            class(
                "Point",
                vec![],
                vec![],
                vec![argument("x", ty("int"))],
                vec![],
            ),
            instantiation("Point", vec![], vec![bool_constant(true)]),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn instantiation_field_count_is_checked() {
        let ast = block(vec![
            class(
                "Point",
                vec![],
                vec![],
                vec![argument("x", ty("int")), argument("y", ty("int"))],
                vec![],
            ),
            instantiation("Point", vec![], vec![int_constant(1)]),
        ])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    #[test]
    fn fixed_array_and_sequence_do_not_mix() {
        // let xs: [int; 3] = 1{}
        let ast = block(vec![typed_binding(
            "xs",
            array_ty(ty("int"), 3),
            sequence(vec![int_constant(1)]),
        )])
        .append_builtins()
        .unwrap();

        assert!(check(&ast).is_err());
    }

    // origins handed to the map directly, for tests below the full pipeline
    #[test]
    fn typemap_lookup() {
        let mut map = TypeMap::default();
        map.insert(OriginIdx(4), int());

        assert_eq!(map.type_of(&OriginIdx(4)), Some(&int()));
        assert_eq!(map.type_of(&OriginIdx(5)), None);
    }
}
