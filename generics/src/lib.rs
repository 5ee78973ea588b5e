//! Generic instantiation. This pass consumes an inferred program that still
//! contains generic declarations and produces one with none: every generic
//! function and class used from non-generic code is copied once per distinct
//! list of type arguments, under a mangled name (`sum+int`), and every use
//! is pointed at its copy. Capability bounds are enforced here, when the
//! concrete types are finally known, and instantiation cycles that would
//! require infinitely many copies are reported instead of looping.
//!
//! The output deliberately contains no [`Kind::Generic`] node and no
//! non-empty type argument list; re-running inference on it yields a fully
//! concrete [`TypeMap`].

use cir::{Cir, Kind, Pass};
use error::Error;
use flatten::FlattenData;
use typecheck::TypeMap;
use types::{capability, primitives, Capabilities, PrimitiveTypes};

mod bounds;
mod mono;

pub trait Monomorphize<'ast>: Sized {
    /// Specialize every used generic declaration and drop the originals.
    /// `types` must come from inferring `self`.
    fn monomorphize(self, types: &TypeMap) -> Result<Cir<FlattenData<'ast>>, Error>;
}

struct MonoCtx<'ctx> {
    types: &'ctx TypeMap,
    primitives: PrimitiveTypes,
    capabilities: Capabilities,
}

impl<'ast> Pass<FlattenData<'ast>, FlattenData<'ast>, Error> for MonoCtx<'_> {
    fn pre_condition(_cir: &Cir<FlattenData<'ast>>) {}

    fn post_condition(cir: &Cir<FlattenData<'ast>>) {
        // nothing generic survives the pass
        for node in cir.nodes.values() {
            match &node.kind {
                Kind::Generic { .. } => {
                    unreachable!("type parameter survived monomorphization. this is an interpreter error")
                }
                Kind::Function { generics, .. }
                | Kind::RecordType { generics, .. }
                | Kind::Call { generics, .. }
                | Kind::Instantiation { generics, .. } => {
                    assert!(
                        generics.is_empty(),
                        "generic declaration or use survived monomorphization. this is an interpreter error"
                    )
                }
                Kind::TypeReference { args, .. } => {
                    assert!(
                        args.is_empty(),
                        "parameterized type use survived monomorphization. this is an interpreter error"
                    )
                }
                _ => {}
            }
        }
    }

    fn transform(
        &mut self,
        cir: Cir<FlattenData<'ast>>,
    ) -> Result<Cir<FlattenData<'ast>>, Error> {
        mono::run(cir, self.types, &self.primitives, &self.capabilities)
    }
}

impl<'ast> Monomorphize<'ast> for Cir<FlattenData<'ast>> {
    fn monomorphize(self, types: &TypeMap) -> Result<Cir<FlattenData<'ast>>, Error> {
        let primitives = primitives::find(&self)?;
        let capabilities = capability::collect(&self)?;

        MonoCtx {
            types,
            primitives,
            capabilities,
        }
        .pass(self)
    }
}
