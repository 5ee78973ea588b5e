use std::collections::HashMap;

use cir::OriginIdx;
use types::Type;

/// Canonical types per node, keyed by origin. The graph itself never stores
/// a [`Type`]: typing is a side table, rebuilt from scratch on every
/// inference run. A node with no entry is void - a declaration, a statement,
/// or an expression whose type could not be established (in which case an
/// error was recorded alongside).
#[derive(Debug, Default)]
pub struct TypeMap {
    types: HashMap<OriginIdx, Type>,
}

impl TypeMap {
    pub(crate) fn insert(&mut self, origin: OriginIdx, ty: Type) {
        self.types.insert(origin, ty);
    }

    pub fn type_of(&self, origin: &OriginIdx) -> Option<&Type> {
        self.types.get(origin)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OriginIdx, &Type)> {
        self.types.iter()
    }
}
