//! The chao semantic core, wired end to end. A front-end hands [`check`] a
//! syntax tree with the builtin declarations appended; what comes back is a
//! fully monomorphized, fully verified flat graph, its type table and its
//! container analysis - everything a backend needs, with no type parameter
//! and no unproven nullable access left. [`execute`] runs a checked program
//! through the reference evaluator.
//!
//! The pipeline order matters. Inference runs twice because the
//! monomorphizer sits in the middle: the first run types the generic program
//! so that specialization requests can be inferred from call sites, the
//! second types the specialized copies. Verification, nullability and
//! container analysis all want the second, concrete table.

use ast::Ast;
use cir::Cir;
use containers::{ContainerAnalysis, ContainerCheck};
use error::Error;
use flatten::{FlattenAst, FlattenData};
use generics::Monomorphize;
use name_resolve::NameResolve;
use nullcheck::NullCheck;
use typecheck::{TypeCheck, TypeMap};

pub use builtins::AppendAstBuiltins;
pub use cire::instance::Instance;
pub use cire::Interpret;
pub use containers::ContainerKind;

/// A program every pass signed off on
#[derive(Debug)]
pub struct CheckedProgram<'ast> {
    pub cir: Cir<FlattenData<'ast>>,
    pub types: TypeMap,
    pub containers: ContainerAnalysis,
}

/// Run the whole analysis pipeline over a syntax tree. The tree must
/// already carry the builtin declarations
/// (see [`AppendAstBuiltins::append_builtins`]).
pub fn check(ast: &Ast) -> Result<CheckedProgram<'_>, Error> {
    let cir = ast.flatten().name_resolve()?;

    let (cir, types) = cir.type_infer()?;
    let cir = cir.monomorphize(&types)?;
    let (cir, types) = cir.type_infer()?;

    cir.type_check(&types)?;
    cir.null_check(&types)?;
    let containers = cir.container_check(&types)?;

    Ok(CheckedProgram {
        cir,
        types,
        containers,
    })
}

/// Evaluate a checked program and hand back its final value, if any
pub fn execute(program: &CheckedProgram<'_>) -> Result<Option<Instance>, Error> {
    program.cir.interpret(&program.types)
}
