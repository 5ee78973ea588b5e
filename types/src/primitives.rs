//! Before any typing happens, we need to locate the primitive type
//! declarations the builtins prepend, and error out if they are absent or
//! declared twice. This module uses typestates to ensure we only ever hand
//! out a complete set of primitives: the collecting context has optional
//! indices, the finalized one does not.

use cir::{Cir, Fallible, Node, OriginIdx, RefIdx, Traversal};
use error::{ErrKind, Error};
use flatten::FlattenData;
use location::SpanTuple;
use symbol::Symbol;

/// All primitive declarations that must be found before typechecking
#[derive(Default)]
struct PrimitiveTypeCtx {
    int_type: Option<OriginIdx>,
    float_type: Option<OriginIdx>,
    bool_type: Option<OriginIdx>,
    char_type: Option<OriginIdx>,
    string_type: Option<OriginIdx>,
}

/// The finalized version of the collecting context: every index is valid,
/// or [`find`] returned an [`Error`] instead
#[derive(Clone, Copy)]
pub struct PrimitiveTypes {
    pub(crate) int_type: OriginIdx,
    pub(crate) float_type: OriginIdx,
    pub(crate) bool_type: OriginIdx,
    pub(crate) char_type: OriginIdx,
    pub(crate) string_type: OriginIdx,
}

impl PrimitiveTypes {
    /// The declaration a primitive resolves to. Passes which synthesize
    /// annotation nodes need this to point them at the right class
    pub fn origin_of(&self, primitive: crate::Primitive) -> OriginIdx {
        use crate::Primitive::*;

        match primitive {
            Int => self.int_type,
            Float => self.float_type,
            Bool => self.bool_type,
            Char => self.char_type,
            String => self.string_type,
        }
    }

    /// Which primitive a declaration origin denotes, if any
    pub(crate) fn primitive_of(&self, origin: OriginIdx) -> Option<crate::Primitive> {
        use crate::Primitive::*;

        match origin {
            o if o == self.int_type => Some(Int),
            o if o == self.float_type => Some(Float),
            o if o == self.bool_type => Some(Bool),
            o if o == self.char_type => Some(Char),
            o if o == self.string_type => Some(String),
            _ => None,
        }
    }
}

fn validate_declaration(
    cir: &Cir<FlattenData<'_>>,
    sym: &Symbol,
    loc: &SpanTuple,
    generics: &[RefIdx],
    fields: &[RefIdx],
) -> Fallible<Error> {
    let maybe_err = |many_refs: &[RefIdx], kind: &str, to_remove: &str| {
        (!many_refs.is_empty()).then(|| {
            let err = Error::new(ErrKind::TypeChecker)
                .with_msg(format!("primitive type `{sym}` declared with {kind}"))
                .with_loc(Some(loc.clone()));

            many_refs
                .iter()
                .map(|reference| cir[reference].data.ast.location().clone())
                .fold(err, |err, loc| {
                    err.with_hint(
                        Error::hint()
                            .with_msg(format!("remove this {to_remove}"))
                            .with_loc(Some(loc)),
                    )
                })
        })
    };

    let generic_error = maybe_err(generics, "generic parameters", "generic parameter");
    let field_error = maybe_err(fields, "fields", "field");

    match (generic_error, field_error) {
        (None, None) => Ok(()),
        (Some(e1), Some(e2)) => Err(Error::new(ErrKind::Multiple(vec![e1, e2]))),
        (Some(e), _) | (_, Some(e)) => Err(e),
    }
}

fn duplicate(cir: &Cir<FlattenData<'_>>, old: &OriginIdx, new: &OriginIdx) -> Error {
    let old = &cir[old].data.ast;

    // primitive declarations always carry a name
    let name = old.symbol().unwrap();
    let old_loc = old.location().clone();
    let new_loc = cir[new].data.ast.location().clone();

    Error::new(ErrKind::TypeChecker)
        .with_msg(format!("re-declaration of primitive type `{name}`"))
        .with_loc(Some(new_loc))
        .with_hint(
            Error::hint()
                .with_msg(format!("primitive type `{name}` previously declared here"))
                .with_loc(Some(old_loc)),
        )
}

impl Traversal<FlattenData<'_>, Error> for PrimitiveTypeCtx {
    fn traverse_record_type(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        generics: &[RefIdx],
        fields: &[RefIdx],
        _methods: &[RefIdx],
        _capabilities: &[Symbol],
    ) -> Fallible<Error> {
        let ast = &node.data.ast;
        // class declarations always have a symbol, or this is an interpreter
        // error
        let name = ast.symbol().unwrap();

        let field_to_set = match name.access() {
            "int" => &mut self.int_type,
            "float" => &mut self.float_type,
            "bool" => &mut self.bool_type,
            "char" => &mut self.char_type,
            "string" => &mut self.string_type,
            _ => return Ok(()),
        };

        match *field_to_set {
            Some(existing) => Err(duplicate(cir, &existing, &node.origin)),
            None => {
                validate_declaration(cir, &name, ast.location(), generics, fields)?;
                *field_to_set = Some(node.origin);

                Ok(())
            }
        }
    }
}

fn extract_types(ctx: &PrimitiveTypeCtx) -> Result<PrimitiveTypes, Error> {
    let missing_ty = |name| {
        move || {
            Error::new(ErrKind::TypeChecker)
                .with_msg(format!("missing declaration of primitive type `{name}`"))
        }
    };

    let int_type = ctx.int_type.ok_or_else(missing_ty("int"))?;
    let float_type = ctx.float_type.ok_or_else(missing_ty("float"))?;
    let bool_type = ctx.bool_type.ok_or_else(missing_ty("bool"))?;
    let char_type = ctx.char_type.ok_or_else(missing_ty("char"))?;
    let string_type = ctx.string_type.ok_or_else(missing_ty("string"))?;

    Ok(PrimitiveTypes {
        int_type,
        float_type,
        bool_type,
        char_type,
        string_type,
    })
}

pub fn find(cir: &Cir<FlattenData<'_>>) -> Result<PrimitiveTypes, Error> {
    let mut ctx = PrimitiveTypeCtx::default();

    ctx.traverse(cir)
        .map_err(|errs| Error::new(ErrKind::Multiple(errs)))?;

    extract_types(&ctx)
}

#[cfg(test)]
mod tests {
    use ast::builder::*;
    use builtins::AppendAstBuiltins;
    use flatten::FlattenAst;

    #[test]
    fn builtins_provide_every_primitive() {
        let ast = block(vec![]).append_builtins().unwrap();

        let cir = ast.flatten();

        assert!(super::find(&cir).is_ok());
    }

    #[test]
    fn missing_primitive() {
        let ast = block(vec![
            class("int", vec![], vec![], vec![], vec![]),
            class("float", vec![], vec![], vec![], vec![]),
        ]);

        let cir = ast.flatten();

        assert!(super::find(&cir).is_err());
    }

    #[test]
    fn redeclared_primitive() {
        let ast = block(vec![class("int", vec![], vec![], vec![], vec![])])
            .append_builtins()
            .unwrap();

        let cir = ast.flatten();

        assert!(super::find(&cir).is_err());
    }

    #[test]
    fn primitive_with_fields() {
        let ast = block(vec![
            class("int", vec![], vec![], vec![argument("inner", ty("float"))], vec![]),
            class("float", vec![], vec![], vec![], vec![]),
            class("bool", vec![], vec![], vec![], vec![]),
            class("char", vec![], vec![], vec![], vec![]),
            class("string", vec![], vec![], vec![], vec![]),
        ]);

        let cir = ast.flatten();

        assert!(super::find(&cir).is_err());
    }
}
