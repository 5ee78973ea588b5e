//! Container analysis. Every value the type table knows as a container is
//! classified up front: fixed arrays carry their length, sequences are
//! dynamic. On top of the classification the pass checks what can be checked
//! without running the program: an index literal into a fixed array must fall
//! inside its bounds, and a dynamic container must not be grown or written
//! through an index while a loop iterates over it. As a side product, pure
//! `map`/`filter`/`collect` pipelines over numeric sequences are marked as
//! candidates for batched lowering. The analysis never alters the graph.

use std::collections::{HashMap, HashSet};

use cir::{Cir, OriginIdx, Traversal};
use error::{ErrKind, Error};
use flatten::FlattenData;
use typecheck::TypeMap;
use types::Type;

mod analyzer;

/// How a container's length behaves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    /// Length fixed at the declaration, part of the type
    Fixed { len: usize },
    /// Length only known at run time
    Dynamic,
}

/// What the pass learned about a graph's containers
#[derive(Debug, Default)]
pub struct ContainerAnalysis {
    kinds: HashMap<OriginIdx, ContainerKind>,
    vectorizable: HashSet<OriginIdx>,
}

impl ContainerAnalysis {
    pub fn kind_of(&self, origin: &OriginIdx) -> Option<ContainerKind> {
        self.kinds.get(origin).copied()
    }

    /// Whether this call belongs to a pipeline a backend may batch
    pub fn is_vectorizable(&self, origin: &OriginIdx) -> bool {
        self.vectorizable.contains(origin)
    }
}

pub trait ContainerCheck {
    /// Classify and verify every container use in the graph. `types` must
    /// come from inferring `self`.
    fn container_check(&self, types: &TypeMap) -> Result<ContainerAnalysis, Error>;
}

impl ContainerCheck for Cir<FlattenData<'_>> {
    fn container_check(&self, types: &TypeMap) -> Result<ContainerAnalysis, Error> {
        let kinds = self
            .nodes
            .keys()
            .filter_map(|origin| {
                let kind = match types.type_of(origin).map(Type::narrowed) {
                    Some(Type::FixedArray(_, len)) => ContainerKind::Fixed { len: *len },
                    Some(Type::Sequence(_)) => ContainerKind::Dynamic,
                    _ => return None,
                };

                Some((*origin, kind))
            })
            .collect();

        let mut analyzer = analyzer::Analyzer {
            types,
            analysis: ContainerAnalysis {
                kinds,
                vectorizable: HashSet::new(),
            },
        };

        match analyzer.traverse(self) {
            Ok(_) => Ok(analyzer.analysis),
            Err(mut errs) => match errs.len() {
                1 => Err(errs.swap_remove(0)),
                _ => Err(Error::new(ErrKind::Multiple(errs))),
            },
        }
    }
}
