//! Turn type-annotation nodes from the flat graph into canonical [`Type`]
//! values. This is where the two representations of "a type" meet: the graph
//! side is a web of references, the canonical side is a self-contained
//! value.

use cir::{Cir, Kind, RefIdx};
use error::{ErrKind, Error};
use flatten::FlattenData;

use crate::{DeclId, PrimitiveTypes, Type};

/// Build the canonical type described by an annotation node. The
/// annotation's references must have been resolved beforehand.
pub fn from_annotation(
    cir: &Cir<FlattenData<'_>>,
    annotation: &RefIdx,
    primitives: &PrimitiveTypes,
) -> Result<Type, Error> {
    let node = &cir[annotation];

    match &node.kind {
        Kind::TypeReference { to, args } => {
            let target = &cir[to];

            if let Some(primitive) = primitives.primitive_of(target.origin) {
                if !args.is_empty() {
                    return Err(Error::new(ErrKind::TypeChecker)
                        .with_msg(format!(
                            "primitive type `{}` takes no type arguments",
                            primitive.name()
                        ))
                        .with_loc(Some(node.data.ast.location().clone())));
                }

                return Ok(Type::Primitive(primitive));
            }

            // declarations always carry a name, or this is an interpreter error
            let decl = DeclId {
                origin: target.origin,
                name: target.data.ast.symbol().unwrap(),
            };

            match &target.kind {
                Kind::RecordType { .. } => {
                    let args = args
                        .iter()
                        .map(|arg| from_annotation(cir, arg, primitives))
                        .collect::<Result<Vec<Type>, Error>>()?;

                    Ok(Type::Record(decl, args))
                }
                Kind::Generic { .. } if args.is_empty() => Ok(Type::Parameter(decl)),
                Kind::Generic { .. } => Err(Error::new(ErrKind::TypeChecker)
                    .with_msg(format!("type parameter `{}` takes no type arguments", decl.name))
                    .with_loc(Some(node.data.ast.location().clone()))),
                other => unreachable!(
                    "type reference to a node which declares no type ({other:?}). this is an interpreter error"
                ),
            }
        }
        Kind::ArrayType { element, size } => Ok(Type::FixedArray(
            Box::new(from_annotation(cir, element, primitives)?),
            *size,
        )),
        Kind::SequenceType { element } => Ok(Type::Sequence(Box::new(from_annotation(
            cir, element, primitives,
        )?))),
        Kind::NullableType { inner } => Ok(Type::Nullable(Box::new(from_annotation(
            cir, inner, primitives,
        )?))),
        Kind::FunctionType { args, return_type } => Ok(Type::Function(
            args.iter()
                .map(|arg| from_annotation(cir, arg, primitives))
                .collect::<Result<Vec<Type>, Error>>()?,
            return_type
                .as_ref()
                .map(|ty| from_annotation(cir, ty, primitives).map(Box::new))
                .transpose()?,
        )),
        other => unreachable!(
            "building a type out of a non-annotation node ({other:?}). this is an interpreter error"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Primitive;

    use ast::builder::*;
    use builtins::AppendAstBuiltins;
    use cir::Node;
    use flatten::FlattenAst;
    use name_resolve::NameResolve;
    use symbol::Symbol;

    fn build(
        cir: &Cir<FlattenData<'_>>,
        annotation: &RefIdx,
    ) -> Result<Type, Error> {
        let primitives = crate::primitives::find(cir).unwrap();

        from_annotation(cir, annotation, &primitives)
    }

    fn binding_annotation<'ast, 'cir>(
        cir: &'cir Cir<FlattenData<'ast>>,
    ) -> &'cir RefIdx {
        cir.nodes
            .values()
            .find_map(|node| match &node.kind {
                Kind::Binding { ty: Some(ty), .. } => Some(ty),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn primitive_annotation() {
        let ast = block(vec![typed_binding("x", ty("int"), default_init())])
            .append_builtins()
            .unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let built = build(&cir, binding_annotation(&cir)).unwrap();

        assert_eq!(built, Type::Primitive(Primitive::Int));
    }

    #[test]
    fn nested_annotation() {
        // let x: [int?{}; 3] = default
        let annotation = array_ty(sequence_ty(nullable_ty(ty("int"))), 3);
        let ast = block(vec![typed_binding("x", annotation, default_init())])
            .append_builtins()
            .unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let built = build(&cir, binding_annotation(&cir)).unwrap();

        assert_eq!(
            built,
            Type::FixedArray(
                Box::new(Type::Sequence(Box::new(Type::Nullable(Box::new(
                    Type::Primitive(Primitive::Int)
                ))))),
                3
            )
        );
    }

    #[test]
    fn record_and_parameter_annotations() {
        // class Box[T](inner: T) ... let x: Box[float] = ...
        let ast = block(vec![
            class(
                "Box",
                vec![generic("T")],
                vec![],
                vec![argument("inner", ty("T"))],
                vec![],
            ),
            typed_binding(
                "x",
                generic_ty("Box", vec![ty("float")]),
                instantiation("Box", vec![], vec![float_constant(1.0)]),
            ),
        ])
        .append_builtins()
        .unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let built = build(&cir, binding_annotation(&cir)).unwrap();

        match built {
            Type::Record(decl, args) => {
                assert_eq!(decl.name, Symbol::from("Box"));
                assert_eq!(args, vec![Type::Primitive(Primitive::Float)]);
            }
            other => panic!("expected a record type, got {other}"),
        }

        // the field's annotation is the parameter itself
        let field_annotation = cir
            .nodes
            .values()
            .find_map(|node| match &node.kind {
                Kind::RecordType { fields, .. }
                    if node.data.ast.symbol() == Some(Symbol::from("Box")) =>
                {
                    Some(&fields[0])
                }
                _ => None,
            })
            .unwrap();

        let field_ty = match &cir[field_annotation] {
            Node {
                kind: Kind::TypedValue { ty },
                ..
            } => ty,
            _ => unreachable!(),
        };

        match build(&cir, field_ty).unwrap() {
            Type::Parameter(decl) => assert_eq!(decl.name, Symbol::from("T")),
            other => panic!("expected a parameter type, got {other}"),
        }
    }

    #[test]
    fn function_annotation() {
        let annotation = function_ty(vec![ty("int")], Some(ty("bool")));
        let value = lambda(
            vec![argument("n", ty("int"))],
            Some(ty("bool")),
            expr_block(vec![bool_constant(true)]),
        );
        let ast = block(vec![typed_binding("f", annotation, value)])
            .append_builtins()
            .unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        let built = build(&cir, binding_annotation(&cir)).unwrap();

        assert_eq!(
            built,
            Type::Function(
                vec![Type::Primitive(Primitive::Int)],
                Some(Box::new(Type::Primitive(Primitive::Bool)))
            )
        );
    }

    #[test]
    fn primitive_with_arguments_is_rejected() {
        let ast = block(vec![typed_binding(
            "x",
            generic_ty("int", vec![ty("float")]),
            default_init(),
        )])
        .append_builtins()
        .unwrap();

        let cir = ast.flatten().name_resolve().unwrap();

        assert!(build(&cir, binding_annotation(&cir)).is_err());
    }
}
