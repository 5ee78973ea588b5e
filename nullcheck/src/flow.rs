//! The flow walker. Statements are visited in evaluation order, carrying a
//! table of nullability facts about places (bindings, argument slots, and
//! fields reached directly through one). Conditionals fork the table, apply
//! what their condition proves to each branch, and join the results; a
//! branch that always returns drops out of the join, which is how an early
//! `return` makes a narrowing stick for the rest of the scope.

use std::collections::HashMap;

use cir::{Cir, Kind, OriginIdx, RefIdx};
use error::{log, ErrKind, Error};
use flatten::FlattenData;
use symbol::Symbol;
use typecheck::TypeMap;
use types::Type;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum NullState {
    MaybeNull,
    ProvenNonNull,
    ProvenNull,
}

/// What a nullability fact is about. Only simple places are tracked: a
/// binding, or one field reached directly through one - anything more
/// indirect stays [`NullState::MaybeNull`] until bound to a name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Place {
    Binding(OriginIdx),
    Field(OriginIdx, Symbol),
}

pub(crate) struct FlowChecker<'ctx, 'ast> {
    cir: &'ctx Cir<FlattenData<'ast>>,
    types: &'ctx TypeMap,
    /// Facts currently in force. A nullable place with no entry is
    /// [`NullState::MaybeNull`].
    state: HashMap<Place, NullState>,
    errs: Vec<Error>,
}

pub(crate) fn check(cir: &Cir<FlattenData<'_>>, types: &TypeMap) -> Vec<Error> {
    let mut checker = FlowChecker {
        cir,
        types,
        state: HashMap::new(),
        errs: Vec::new(),
    };

    // each body is its own flow scope: arguments start unproven
    for node in cir.nodes.values() {
        if let Kind::Function {
            block: Some(block),
            return_type,
            ..
        } = &node.kind
        {
            let ret = return_type
                .as_ref()
                .and_then(|ty| types.type_of(&ty.expect_resolved()))
                .cloned();

            checker.state.clear();
            checker.walk(block, ret.as_ref());
        }
    }

    // the program's top-level block is the last node
    if let Some((origin, _)) = cir.nodes.last_key_value() {
        checker.state.clear();
        checker.walk(&RefIdx::Resolved(*origin), None);
    }

    checker.errs
}

fn inverse(state: NullState) -> NullState {
    match state {
        NullState::ProvenNonNull => NullState::ProvenNull,
        NullState::ProvenNull => NullState::ProvenNonNull,
        NullState::MaybeNull => NullState::MaybeNull,
    }
}

/// Facts surviving a conditional are the ones both branches agree on;
/// everything else falls back to the unproven default
fn join(
    true_state: &HashMap<Place, NullState>,
    false_state: &HashMap<Place, NullState>,
) -> HashMap<Place, NullState> {
    true_state
        .iter()
        .filter(|(place, state)| false_state.get(place) == Some(state))
        .map(|(place, state)| (*place, *state))
        .collect()
}

/// Whether a block always leaves the enclosing function
fn diverges(cir: &Cir<FlattenData<'_>>, reference: &RefIdx) -> bool {
    match &cir[reference].kind {
        Kind::Return(_) => true,
        Kind::Statements(stmts) => stmts.iter().any(|stmt| diverges(cir, stmt)),
        Kind::Conditional {
            true_block,
            false_block: Some(false_block),
            ..
        } => diverges(cir, true_block) && diverges(cir, false_block),
        _ => false,
    }
}

impl<'ctx, 'ast> FlowChecker<'ctx, 'ast> {
    fn type_of(&self, reference: &RefIdx) -> Option<&'ctx Type> {
        match reference {
            RefIdx::Resolved(origin) => self.types.type_of(origin),
            RefIdx::Unresolved => None,
        }
    }

    fn nullable(&self, reference: &RefIdx) -> bool {
        matches!(
            self.type_of(reference),
            Some(Type::Nullable(_)) | Some(Type::None)
        )
    }

    fn place_of(&self, reference: &RefIdx) -> Option<Place> {
        let origin = match reference {
            RefIdx::Resolved(origin) => origin,
            RefIdx::Unresolved => return None,
        };

        match &self.cir[origin].kind {
            Kind::NodeRef(to) => {
                let target = to.expect_resolved();

                match &self.cir[&target].kind {
                    Kind::Binding { .. } | Kind::TypedValue { .. } => {
                        Some(Place::Binding(target))
                    }
                    _ => None,
                }
            }
            Kind::FieldAccess { instance } => match self.place_of(instance)? {
                Place::Binding(base) => {
                    // field accesses always carry the field's name
                    let field = self.cir[origin].data.ast.symbol().unwrap();

                    Some(Place::Field(base, field))
                }
                Place::Field(..) => None,
            },
            _ => None,
        }
    }

    fn state_of(&self, place: &Place) -> NullState {
        self.state
            .get(place)
            .copied()
            .unwrap_or(NullState::MaybeNull)
    }

    /// The nullability of one value as it flows somewhere: non-nullable
    /// types are always proven, tracked places carry their current fact,
    /// and any other nullable expression is unproven
    fn value_state(&self, reference: &RefIdx) -> NullState {
        match self.type_of(reference) {
            Some(Type::None) => NullState::ProvenNull,
            Some(Type::Nullable(_)) => match self.place_of(reference) {
                Some(place) => self.state_of(&place),
                None => NullState::MaybeNull,
            },
            _ => NullState::ProvenNonNull,
        }
    }

    /// Require a value proven non-null at this point of the flow
    fn demand(&mut self, reference: &RefIdx) {
        let state = self.value_state(reference);

        if state == NullState::ProvenNonNull {
            return;
        }

        let origin = match reference {
            RefIdx::Resolved(origin) => origin,
            RefIdx::Unresolved => return,
        };
        let node = &self.cir[origin];

        let subject = match node.data.ast.symbol() {
            Some(name) => format!("`{name}`"),
            None => String::from("this value"),
        };
        let verdict = match state {
            NullState::ProvenNull => "is always",
            _ => "may be",
        };

        self.errs.push(
            Error::new(ErrKind::PossiblyNullValue)
                .with_msg(format!("{subject} {verdict} `None` here"))
                .with_loc(Some(node.data.ast.location().clone()))
                .with_hint(Error::hint().with_msg(String::from(
                    "test it against `None` before this use",
                ))),
        );
    }

    /// The parameter types one call or instantiation checks its values
    /// against
    fn declared_slots(&self, to: &RefIdx) -> Vec<Option<Type>> {
        match &self.cir[to].kind {
            Kind::Function { args, .. } => args
                .iter()
                .map(|arg| self.type_of(arg).cloned())
                .collect(),
            Kind::RecordType { fields, .. } => fields
                .iter()
                .map(|field| self.type_of(field).cloned())
                .collect(),
            // calls through function-valued bindings and slots
            _ => match self.type_of(to) {
                Some(Type::Function(args, _)) => args.iter().cloned().map(Some).collect(),
                _ => vec![],
            },
        }
    }

    fn demand_arguments(&mut self, to: &RefIdx, supplied: &[RefIdx]) {
        let declared = self.declared_slots(to);

        for (declared, supplied) in declared.iter().zip(supplied) {
            match declared {
                // a nullable slot takes the value as-is, proven or not
                Some(Type::Nullable(_)) | None => {}
                Some(_) => {
                    if self.nullable(supplied) {
                        self.demand(supplied);
                    }
                }
            }
        }
    }

    /// What one condition proves about a place in the branch where it holds:
    /// `x != None` and bare truthiness prove non-null, `x == None` proves
    /// null. Value-truthiness of the contained value is deliberately not a
    /// narrowing - only null-state is.
    fn narrowing(&self, condition: &RefIdx) -> Option<(Place, NullState)> {
        let origin = match condition {
            RefIdx::Resolved(origin) => origin,
            RefIdx::Unresolved => return None,
        };

        match &self.cir[origin].kind {
            Kind::NullTest { on, negated } => {
                let place = self.place_of(on)?;
                let state = if *negated {
                    NullState::ProvenNonNull
                } else {
                    NullState::ProvenNull
                };

                Some((place, state))
            }
            _ if matches!(self.type_of(condition), Some(Type::Nullable(_))) => {
                Some((self.place_of(condition)?, NullState::ProvenNonNull))
            }
            _ => None,
        }
    }

    /// Record what flows into a place, dropping any field facts that hung
    /// off it
    fn assign(&mut self, target: &RefIdx, value: &RefIdx) {
        if !self.nullable(target) {
            return;
        }

        if let Some(place) = self.place_of(target) {
            let state = self.value_state(value);

            if let Place::Binding(base) = place {
                self.state
                    .retain(|tracked, _| !matches!(tracked, Place::Field(b, _) if *b == base));
            }

            self.state.insert(place, state);
        }
    }

    fn walk_conditional(
        &mut self,
        condition: &RefIdx,
        true_block: &RefIdx,
        false_block: &Option<RefIdx>,
        ret: Option<&Type>,
    ) {
        self.walk(condition, ret);

        let fact = self.narrowing(condition);
        let base = self.state.clone();

        if let Some((place, state)) = fact {
            log!("nullcheck", "narrowing {place:?} to {state:?} in the true branch");

            self.state.insert(place, state);
        }
        self.walk(true_block, ret);
        let true_state = std::mem::replace(&mut self.state, base);

        if let Some((place, state)) = fact {
            self.state.insert(place, inverse(state));
        }
        if let Some(false_block) = false_block {
            self.walk(false_block, ret);
        }
        let false_state = std::mem::take(&mut self.state);

        let true_exits = diverges(self.cir, true_block);
        let false_exits = false_block
            .as_ref()
            .map_or(false, |block| diverges(self.cir, block));

        // a branch that always returns contributes nothing to the state
        // after the conditional - its narrowing persists through the other
        // path
        self.state = match (true_exits, false_exits) {
            (true, false) => false_state,
            (false, true) => true_state,
            _ => join(&true_state, &false_state),
        };
    }

    fn walk(&mut self, reference: &RefIdx, ret: Option<&Type>) {
        let origin = match reference {
            RefIdx::Resolved(origin) => origin,
            RefIdx::Unresolved => return,
        };
        let cir = self.cir;
        let node = &cir[origin];

        match &node.kind {
            Kind::Statements(stmts) => {
                for stmt in stmts {
                    self.walk(stmt, ret);
                }
            }
            Kind::Binding { value, ty } => {
                self.walk(value, ret);

                // an annotated non-nullable binding demands a proven value
                let annotated = ty.as_ref().and_then(|ty| self.type_of(ty));
                if matches!(annotated, Some(ty) if !matches!(ty, Type::Nullable(_)))
                    && self.nullable(value)
                {
                    self.demand(value);
                }

                if self.nullable(reference) {
                    let state = self.value_state(value);
                    self.state.insert(Place::Binding(*origin), state);
                }
            }
            Kind::Assignment { to, from } => {
                self.walk(to, ret);
                self.walk(from, ret);

                if !self.nullable(to) && self.nullable(from) {
                    self.demand(from);
                }

                self.assign(to, from);
            }
            Kind::Call { to, args, .. } => {
                for arg in args {
                    self.walk(arg, ret);
                }

                self.demand_arguments(to, args);
            }
            Kind::Instantiation { to, fields, .. } => {
                for field in fields {
                    self.walk(field, ret);
                }

                self.demand_arguments(to, fields);
            }
            Kind::FieldAccess { instance } => {
                self.walk(instance, ret);

                if self.nullable(instance) {
                    self.demand(instance);
                }
            }
            Kind::Index { container, index } => {
                self.walk(container, ret);
                self.walk(index, ret);

                if self.nullable(container) {
                    self.demand(container);
                }
                if self.nullable(index) {
                    self.demand(index);
                }
            }
            Kind::Conditional {
                condition,
                true_block,
                false_block,
            } => self.walk_conditional(condition, true_block, false_block, ret),
            Kind::NullTest { on, .. } => self.walk(on, ret),
            Kind::ForLoop { subject, block, .. } => {
                self.walk(subject, ret);

                if self.nullable(subject) {
                    self.demand(subject);
                }

                // the body may run zero times, so only facts it leaves
                // unchanged survive it
                let before = self.state.clone();
                self.walk(block, ret);
                self.state = join(&before, &std::mem::take(&mut self.state));
            }
            Kind::Return(value) => {
                if let Some(value) = value {
                    self.walk(value, ret);

                    if matches!(ret, Some(ty) if !matches!(ty, Type::Nullable(_)))
                        && self.nullable(value)
                    {
                        self.demand(value);
                    }
                }
            }
            Kind::SequenceLiteral { elements } => {
                for element in elements {
                    self.walk(element, ret);
                }
            }
            // mentions, literals and declarations prove nothing on their
            // own; declarations' bodies are walked as their own scopes
            _ => {}
        }
    }
}
