//! Capability bounds, checked at the instantiation. A bound never influences
//! which specialization gets built - it only decides whether building it is
//! allowed, so the check runs right before each specialization and reports
//! every violated bound of that instantiation at once.

use cir::{Cir, Node, RefIdx};
use error::{ErrKind, Error};
use flatten::FlattenData;
use location::SpanTuple;
use types::{Capabilities, Type};

/// All the ways one instantiation of `decl` with `args` violates the
/// declaration's bounds. An empty result means the specialization may be
/// built.
pub(crate) fn check(
    cir: &Cir<FlattenData<'_>>,
    decl: &Node<FlattenData<'_>>,
    params: &[RefIdx],
    args: &[Type],
    capabilities: &Capabilities,
    loc: &SpanTuple,
) -> Vec<Error> {
    // declarations always carry a name
    let name = decl.data.ast.symbol().unwrap();

    if params.len() != args.len() {
        return vec![Error::new(ErrKind::Generics)
            .with_msg(format!(
                "`{name}` takes {} type argument{} but {} {} supplied",
                params.len(),
                if params.len() == 1 { "" } else { "s" },
                args.len(),
                if args.len() == 1 { "was" } else { "were" },
            ))
            .with_loc(Some(loc.clone()))
            .with_hint(
                Error::hint()
                    .with_msg(format!("`{name}` declared here"))
                    .with_loc(Some(decl.data.ast.location().clone())),
            )];
    }

    let mut errs = Vec::new();

    for (param, arg) in params.iter().zip(args) {
        let origin = param.expect_resolved();
        // type parameters always carry a name
        let param_name = cir[&origin].data.ast.symbol().unwrap();

        for capability in capabilities.declared(&origin) {
            if !capabilities.satisfies(arg, *capability) {
                errs.push(
                    Error::new(ErrKind::UnsatisfiedConstraint)
                        .with_msg(format!(
                            "type `{arg}` does not satisfy `{capability}`, required by parameter `{param_name}` of `{name}`"
                        ))
                        .with_loc(Some(loc.clone()))
                        .with_hint(
                            Error::hint()
                                .with_msg(String::from("bound declared here"))
                                .with_loc(Some(cir[&origin].data.ast.location().clone())),
                        ),
                );
            }
        }
    }

    errs
}
