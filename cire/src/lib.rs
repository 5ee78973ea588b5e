//! CIRE stands for [`Cir`] Executor, or [`Cir`] Engine: the runtime boundary
//! of the semantic core. It walks a checked, monomorphized graph and fires
//! each node in evaluation order. The passes before it proved everything
//! they could prove statically; what remains here is the behavior only a run
//! can decide - which branch a condition picks, how long a sequence grows,
//! and whether a dynamic index lands inside its container. That last check
//! is the one fault this crate raises: an out-of-bounds index surfaces as a
//! recoverable [`Error`] handed back to the embedder, never a crash.
//!
//! Indexing is 1-based at the surface. The bounds check happens on the
//! surface index, against `[1, len]`, and only then does the access
//! translate to the 0-based backing slot.

pub mod instance;

use std::collections::HashMap;
use std::ops::ControlFlow;

use builtins::Operator;
use cir::{Cir, Kind, Node, OriginIdx, RefIdx};
use error::{ErrKind, Error};
use flatten::FlattenData;
use location::SpanTuple;
use symbol::Symbol;
use typecheck::TypeMap;
use types::{Primitive, Type};

use instance::Instance;

/// Saves typing `ControlFlow::Continue(())` at the end of every firing
/// function
#[allow(non_upper_case_globals)]
const KeepGoing: ControlFlow<EarlyExit> = ControlFlow::Continue(());

/// Why evaluation stopped following statement order: a `return` unwinds to
/// the enclosing call, a fault unwinds all the way out to the embedder
enum EarlyExit {
    Return(OriginIdx),
    Fault(Error),
}

fn fault<T>(kind: ErrKind, msg: String, loc: &SpanTuple) -> ControlFlow<EarlyExit, T> {
    ControlFlow::Break(EarlyExit::Fault(
        Error::new(kind).with_msg(msg).with_loc(Some(loc.clone())),
    ))
}

pub trait Interpret {
    /// Execute the program and hand back its final value, if the last
    /// statement produced one. `types` must come from inferring `self`
    /// after monomorphization: `default` initializers are built from them.
    fn interpret(&self, types: &TypeMap) -> Result<Option<Instance>, Error>;
}

impl Interpret for Cir<FlattenData<'_>> {
    fn interpret(&self, types: &TypeMap) -> Result<Option<Instance>, Error> {
        let mut fire = Fire {
            store: Store(HashMap::new()),
            cir: self,
            types,
        };

        fire.start()
    }
}

/// Every value computed during the run, keyed by the origin of the node that
/// computed it. Bindings and function arguments live here next to the
/// temporaries; a recursive call reuses its callee's slots, which is sound
/// because arguments are copied out before the callee fires.
struct Store(HashMap<OriginIdx, Instance>);

impl Store {
    fn allocate(&mut self, key: OriginIdx, value: Instance) {
        self.0.insert(key, value);
    }

    /// Make `key` hold the value computed by `from`, if it computed one
    fn copy(&mut self, from: &RefIdx, key: OriginIdx) {
        if let Some(instance) = self.0.get(&from.expect_resolved()) {
            let instance = instance.clone();
            self.allocate(key, instance);
        }
    }

    fn lookup(&self, key: &OriginIdx) -> Option<&Instance> {
        self.0.get(key)
    }
}

/// One step of an assignment target: a named field or a 1-based slot. The
/// slot keeps the surface index; the bounds check happens when the write
/// reaches the container, which is the first moment its length is known.
enum Access {
    Field(Symbol),
    Slot(i64),
}

/// A storage location resolved from an assignment target: the origin of the
/// binding (or argument) at its root, then the projections to follow
struct Place {
    base: OriginIdx,
    path: Vec<Access>,
}

/// Walk a [`Place`]'s projections down to the slot they name, one recursion
/// step per projection
fn descend<'i>(
    slot: &'i mut Instance,
    path: &[Access],
    loc: &SpanTuple,
) -> ControlFlow<EarlyExit, &'i mut Instance> {
    let (access, rest) = match path.split_first() {
        Some(pair) => pair,
        None => return ControlFlow::Continue(slot),
    };

    let next = match access {
        Access::Field(name) => match slot.field_mut(*name) {
            Some(field) => field,
            None => unreachable!(
                "assignment to a missing field after typechecking. this is an interpreter error"
            ),
        },
        Access::Slot(index) => {
            let elements = match slot {
                Instance::Array(elements) | Instance::Seq(elements) => elements,
                _ => unreachable!(
                    "indexed assignment into a non-container. this is an interpreter error"
                ),
            };

            if *index < 1 || *index as usize > elements.len() {
                return fault(
                    ErrKind::IndexOutOfBounds,
                    format!(
                        "index `{index}` is outside of this container of length `{}`",
                        elements.len()
                    ),
                    loc,
                );
            }

            &mut elements[*index as usize - 1]
        }
    };

    descend(next, rest, loc)
}

struct Fire<'ast, 'cir> {
    store: Store,
    cir: &'cir Cir<FlattenData<'ast>>,
    types: &'cir TypeMap,
}

impl<'ast, 'cir> Fire<'ast, 'cir> {
    fn access(&self, r: &RefIdx) -> &'cir Node<FlattenData<'ast>> {
        &self.cir.nodes[&r.expect_resolved()]
    }

    fn node(&self, origin: &OriginIdx) -> &'cir Node<FlattenData<'ast>> {
        &self.cir.nodes[origin]
    }

    /// Fire a node and hand back the value it computed. Only call this on
    /// references the typechecker proved to be expressions
    #[must_use]
    fn eval(&mut self, r: &RefIdx) -> ControlFlow<EarlyExit, Instance> {
        self.fire_reference(r)?;

        let instance = match self.store.lookup(&r.expect_resolved()) {
            Some(instance) => instance.clone(),
            None => unreachable!(
                "expression node {:?} fired without producing a value. this is an interpreter error",
                r.expect_resolved()
            ),
        };

        ControlFlow::Continue(instance)
    }

    #[must_use]
    fn fire_reference(&mut self, r: &RefIdx) -> ControlFlow<EarlyExit> {
        self.fire_node(self.access(r))
    }

    #[must_use]
    fn fire_block(
        &mut self,
        node: &Node<FlattenData<'_>>,
        stmts: &[RefIdx],
    ) -> ControlFlow<EarlyExit> {
        stmts
            .iter()
            .try_for_each(|stmt| self.fire_reference(stmt))?;

        // a block's value is its last statement's, when there is one
        if let Some(last) = stmts.last() {
            self.store.copy(last, node.origin);
        }

        KeepGoing
    }

    #[must_use]
    fn fire_constant(&mut self, node: &Node<FlattenData<'_>>) -> ControlFlow<EarlyExit> {
        let ast = node.data.ast.node();

        let instance = match &ast.node {
            ast::Node::Constant(ast::Value::Integer(i)) => Instance::from(*i),
            ast::Node::Constant(ast::Value::Float(f)) => Instance::from(*f),
            ast::Node::Constant(ast::Value::Bool(b)) => Instance::from(*b),
            ast::Node::Constant(ast::Value::Char(c)) => Instance::from(*c),
            ast::Node::Constant(ast::Value::Str(s)) => Instance::from(s),
            ast::Node::Constant(ast::Value::None) => Instance::Null,
            _ => unreachable!("constant node without a literal. this is an interpreter error"),
        };

        self.store.allocate(node.origin, instance);

        KeepGoing
    }

    /// Run a function body with already-computed arguments and hand back its
    /// value. This is the shared tail of user calls and of the functional
    /// sequence builtins applying their lambda
    #[must_use]
    fn apply(
        &mut self,
        def: &Node<FlattenData<'_>>,
        args: Vec<Instance>,
    ) -> ControlFlow<EarlyExit, Instance> {
        let (def_args, block) = match &def.kind {
            Kind::Function {
                args,
                block: Some(block),
                ..
            } => (args, block),
            _ => unreachable!("applying a non-function node. this is an interpreter error"),
        };

        def_args
            .iter()
            .zip(args)
            .for_each(|(slot, instance)| self.store.allocate(slot.expect_resolved(), instance));

        let result = match self.fire_reference(block) {
            ControlFlow::Break(EarlyExit::Return(returned)) => returned,
            ControlFlow::Break(fault) => return ControlFlow::Break(fault),
            ControlFlow::Continue(()) => block.expect_resolved(),
        };

        let value = self
            .store
            .lookup(&result)
            .cloned()
            .unwrap_or(Instance::Unit);

        ControlFlow::Continue(value)
    }

    #[must_use]
    fn fire_call(
        &mut self,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
        args: &[RefIdx],
    ) -> ControlFlow<EarlyExit> {
        let def = self.access(to);

        let has_block = matches!(&def.kind, Kind::Function { block: Some(_), .. });
        if !has_block {
            return self.fire_builtin(node, def, args);
        }

        let mut instances = Vec::with_capacity(args.len());
        for arg in args {
            instances.push(self.eval(arg)?);
        }

        let result = self.apply(def, instances)?;
        self.store.allocate(node.origin, result);

        KeepGoing
    }

    /// Sequence and operator externs, dispatched by demangled name. These
    /// are the only declarations without a body left after monomorphization
    #[must_use]
    fn fire_builtin(
        &mut self,
        node: &Node<FlattenData<'_>>,
        def: &Node<FlattenData<'_>>,
        args: &[RefIdx],
    ) -> ControlFlow<EarlyExit> {
        // builtins always carry a name
        let name = def.data.ast.symbol().unwrap();
        let name = builtins::demangle(name.access());
        let loc = node.data.ast.location().clone();

        if let Some(op) = Operator::try_from_str(name) {
            let lhs = self.eval(&args[0])?;
            let rhs = self.eval(&args[1])?;
            let result = self.fire_operator(op, lhs, rhs, &loc)?;
            self.store.allocate(node.origin, result);

            return KeepGoing;
        }

        let result = match name {
            "len" => {
                let elements = self.eval_container(&args[0])?;

                Instance::Int(elements.len() as i64)
            }
            "push" => {
                let value = self.eval(&args[1])?;
                let place = self.place(&args[0])?;
                let slot = self.slot_mut(&place, &loc)?;

                match slot {
                    Instance::Seq(elements) => elements.push(value),
                    _ => unreachable!("`push` on a non-sequence. this is an interpreter error"),
                }

                Instance::Unit
            }
            "map" => {
                let elements = self.eval_container(&args[0])?;
                let function = self.eval_function(&args[1])?;

                let mut mapped = Vec::with_capacity(elements.len());
                for element in elements {
                    let def = self.node(&function);
                    mapped.push(self.apply(def, vec![element])?);
                }

                Instance::Seq(mapped)
            }
            "filter" => {
                let elements = self.eval_container(&args[0])?;
                let function = self.eval_function(&args[1])?;

                let mut kept = Vec::new();
                for element in elements {
                    let def = self.node(&function);
                    let verdict = self.apply(def, vec![element.clone()])?;
                    if verdict == Instance::Bool(true) {
                        kept.push(element);
                    }
                }

                Instance::Seq(kept)
            }
            "collect" => Instance::Seq(self.eval_container(&args[0])?),
            other => unreachable!(
                "no runtime implementation for builtin `{other}`. this is an interpreter error"
            ),
        };

        self.store.allocate(node.origin, result);

        KeepGoing
    }

    #[must_use]
    fn fire_operator(
        &mut self,
        op: Operator,
        lhs: Instance,
        rhs: Instance,
        loc: &SpanTuple,
    ) -> ControlFlow<EarlyExit, Instance> {
        use builtins::{Arithmetic, Comparison, Equality};

        let result = match (op, lhs, rhs) {
            (Operator::Arithmetic(op), Instance::Int(l), Instance::Int(r)) => {
                let value = match op {
                    Arithmetic::Add => l.checked_add(r),
                    Arithmetic::Sub => l.checked_sub(r),
                    Arithmetic::Mul => l.checked_mul(r),
                    Arithmetic::Div if r == 0 => {
                        return fault(
                            ErrKind::Interpreter,
                            String::from("division by zero"),
                            loc,
                        )
                    }
                    Arithmetic::Div => l.checked_div(r),
                };

                match value {
                    Some(value) => Instance::Int(value),
                    None => {
                        return fault(
                            ErrKind::Interpreter,
                            String::from("integer overflow"),
                            loc,
                        )
                    }
                }
            }
            (Operator::Arithmetic(op), Instance::Float(l), Instance::Float(r)) => match op {
                Arithmetic::Add => Instance::Float(l + r),
                Arithmetic::Sub => Instance::Float(l - r),
                Arithmetic::Mul => Instance::Float(l * r),
                Arithmetic::Div => Instance::Float(l / r),
            },
            (Operator::Comparison(op), lhs, rhs) => {
                let ordering = match (&lhs, &rhs) {
                    (Instance::Int(l), Instance::Int(r)) => l.cmp(r),
                    (Instance::Char(l), Instance::Char(r)) => l.cmp(r),
                    (Instance::Str(l), Instance::Str(r)) => l.cmp(r),
                    (Instance::Float(l), Instance::Float(r)) => match l.partial_cmp(r) {
                        Some(ordering) => ordering,
                        None => {
                            return fault(
                                ErrKind::Interpreter,
                                String::from("comparison on a NaN value"),
                                loc,
                            )
                        }
                    },
                    _ => unreachable!(
                        "ordering on unordered operands. this is an interpreter error"
                    ),
                };

                let holds = match op {
                    Comparison::Lt => ordering.is_lt(),
                    Comparison::Gt => ordering.is_gt(),
                    Comparison::LtEq => ordering.is_le(),
                    Comparison::GtEq => ordering.is_ge(),
                };

                Instance::Bool(holds)
            }
            (Operator::Equality(Equality::Equals), lhs, rhs) => Instance::Bool(lhs == rhs),
            (Operator::Equality(Equality::Differs), lhs, rhs) => Instance::Bool(lhs != rhs),
            _ => unreachable!("arithmetic on non-numeric operands. this is an interpreter error"),
        };

        ControlFlow::Continue(result)
    }

    #[must_use]
    fn eval_container(&mut self, r: &RefIdx) -> ControlFlow<EarlyExit, Vec<Instance>> {
        let elements = match self.eval(r)? {
            Instance::Array(elements) | Instance::Seq(elements) => elements,
            _ => unreachable!("container expected at runtime. this is an interpreter error"),
        };

        ControlFlow::Continue(elements)
    }

    #[must_use]
    fn eval_function(&mut self, r: &RefIdx) -> ControlFlow<EarlyExit, OriginIdx> {
        let function = match self.eval(r)? {
            Instance::Fn(origin) => origin,
            _ => unreachable!("function value expected at runtime. this is an interpreter error"),
        };

        ControlFlow::Continue(function)
    }

    /// Check a surface index against `[1, len]` and translate it to the
    /// backing slot. The check comes first: no translation of an index that
    /// was never valid
    #[must_use]
    fn checked_slot(
        &self,
        index: i64,
        len: usize,
        loc: &SpanTuple,
    ) -> ControlFlow<EarlyExit, usize> {
        if index < 1 || index as usize > len {
            return fault(
                ErrKind::IndexOutOfBounds,
                format!("index `{index}` is outside of this container of length `{len}`"),
                loc,
            );
        }

        ControlFlow::Continue(index as usize - 1)
    }

    /// Resolve an assignment target down to its storage location,
    /// evaluating the indices along the way
    #[must_use]
    fn place(&mut self, r: &RefIdx) -> ControlFlow<EarlyExit, Place> {
        let node = self.access(r);

        match &node.kind {
            Kind::NodeRef(to) => ControlFlow::Continue(Place {
                base: to.expect_resolved(),
                path: vec![],
            }),
            Kind::Index { container, index } => {
                let mut place = self.place(container)?;
                let index = match self.eval(index)? {
                    Instance::Int(i) => i,
                    _ => unreachable!(
                        "non-integer index after typechecking. this is an interpreter error"
                    ),
                };

                place.path.push(Access::Slot(index));

                ControlFlow::Continue(place)
            }
            Kind::FieldAccess { instance } => {
                // field accesses always carry the field's name
                let field = node.data.ast.symbol().unwrap();
                let mut place = self.place(instance)?;

                place.path.push(Access::Field(field));

                ControlFlow::Continue(place)
            }
            _ => unreachable!(
                "invalid assignment target after typechecking. this is an interpreter error"
            ),
        }
    }

    /// Follow a resolved [`Place`] to the slot it names, bounds-checking
    /// every index on the way down
    #[must_use]
    fn slot_mut(
        &mut self,
        place: &Place,
        loc: &SpanTuple,
    ) -> ControlFlow<EarlyExit, &mut Instance> {
        let slot = match self.store.0.get_mut(&place.base) {
            Some(slot) => slot,
            None => unreachable!(
                "assignment to a location that was never bound. this is an interpreter error"
            ),
        };

        descend(slot, &place.path, loc)
    }

    #[must_use]
    fn fire_assignment(
        &mut self,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
        from: &RefIdx,
    ) -> ControlFlow<EarlyExit> {
        let value = self.eval(from)?;
        let place = self.place(to)?;
        let loc = node.data.ast.location().clone();

        *self.slot_mut(&place, &loc)? = value;

        KeepGoing
    }

    #[must_use]
    fn fire_instantiation(
        &mut self,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
        fields: &[RefIdx],
    ) -> ControlFlow<EarlyExit> {
        let class = self.access(to);
        let field_names: Vec<Symbol> = match &class.kind {
            Kind::RecordType { fields, .. } => fields
                .iter()
                // fields always carry a name
                .map(|field| self.access(field).data.ast.symbol().unwrap())
                .collect(),
            _ => unreachable!("instantiation of a non-class. this is an interpreter error"),
        };

        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            values.push(self.eval(field)?);
        }

        let instance = Instance::Record {
            class: to.expect_resolved(),
            fields: field_names.into_iter().zip(values).collect(),
        };

        self.store.allocate(node.origin, instance);

        KeepGoing
    }

    #[must_use]
    fn fire_field_access(
        &mut self,
        node: &Node<FlattenData<'_>>,
        instance: &RefIdx,
    ) -> ControlFlow<EarlyExit> {
        // field accesses always carry the field's name
        let field = node.data.ast.symbol().unwrap();
        let record = self.eval(instance)?;

        let value = match record.field(field) {
            Some(value) => value.clone(),
            None => unreachable!(
                "access to a missing field after typechecking. this is an interpreter error"
            ),
        };

        self.store.allocate(node.origin, value);

        KeepGoing
    }

    #[must_use]
    fn fire_condition(
        &mut self,
        node: &Node<FlattenData<'_>>,
        condition: &RefIdx,
        true_block: &RefIdx,
        false_block: Option<&RefIdx>,
    ) -> ControlFlow<EarlyExit> {
        let verdict = self.eval(condition)?;

        let to_run = match verdict.truthy() {
            true => Some(true_block),
            false => false_block,
        };

        if let Some(block) = to_run {
            self.fire_reference(block)?;
            self.store.copy(block, node.origin);
        }

        KeepGoing
    }

    #[must_use]
    fn fire_null_test(
        &mut self,
        node: &Node<FlattenData<'_>>,
        on: &RefIdx,
        negated: bool,
    ) -> ControlFlow<EarlyExit> {
        let is_null = self.eval(on)? == Instance::Null;

        // `x is None` reads naturally; `negated` encodes `is not None`
        self.store
            .allocate(node.origin, Instance::Bool(is_null != negated));

        KeepGoing
    }

    #[must_use]
    fn fire_loop(
        &mut self,
        index: Option<&RefIdx>,
        value: &RefIdx,
        subject: &RefIdx,
        block: &RefIdx,
    ) -> ControlFlow<EarlyExit> {
        // iteration walks a snapshot; growing the subject mid-loop is
        // already rejected statically
        let elements = self.eval_container(subject)?;

        for (slot, element) in elements.into_iter().enumerate() {
            if let Some(index) = index {
                self.store
                    .allocate(index.expect_resolved(), Instance::Int(slot as i64 + 1));
            }

            self.store.allocate(value.expect_resolved(), element);
            self.fire_reference(block)?;
        }

        KeepGoing
    }

    #[must_use]
    fn fire_index(
        &mut self,
        node: &Node<FlattenData<'_>>,
        container: &RefIdx,
        index: &RefIdx,
    ) -> ControlFlow<EarlyExit> {
        let elements = self.eval_container(container)?;
        let surface = match self.eval(index)? {
            Instance::Int(i) => i,
            _ => unreachable!(
                "non-integer index after typechecking. this is an interpreter error"
            ),
        };

        let loc = node.data.ast.location();
        let slot = self.checked_slot(surface, elements.len(), loc)?;

        self.store.allocate(node.origin, elements[slot].clone());

        KeepGoing
    }

    /// Build the zero value of a type: numeric zeroes, empty strings and
    /// sequences, element-defaulted arrays, `Null` for nullables, and
    /// field-defaulted records
    fn default_instance(&self, ty: &Type) -> Instance {
        match ty {
            Type::Primitive(Primitive::Int) => Instance::Int(0),
            Type::Primitive(Primitive::Float) => Instance::Float(0.0),
            Type::Primitive(Primitive::Bool) => Instance::Bool(false),
            Type::Primitive(Primitive::Char) => Instance::Char('\0'),
            Type::Primitive(Primitive::String) => Instance::Str(String::new()),
            Type::FixedArray(element, len) => {
                Instance::Array(vec![self.default_instance(element); *len])
            }
            Type::Sequence(_) => Instance::Seq(vec![]),
            Type::Nullable(_) => Instance::Null,
            Type::Record(decl, _) => {
                let fields = match &self.cir.nodes[&decl.origin].kind {
                    Kind::RecordType { fields, .. } => fields,
                    _ => unreachable!(
                        "record type without a class declaration. this is an interpreter error"
                    ),
                };

                let fields = fields
                    .iter()
                    .map(|field| {
                        let origin = field.expect_resolved();
                        // fields always carry a name and, once typed, a type
                        let name = self.cir.nodes[&origin].data.ast.symbol().unwrap();
                        let ty = self.types.type_of(&origin).unwrap();

                        (name, self.default_instance(ty))
                    })
                    .collect();

                Instance::Record {
                    class: decl.origin,
                    fields,
                }
            }
            Type::Function(..) | Type::Parameter(_) | Type::None => unreachable!(
                "`default` of type `{ty}` got past the typechecker. this is an interpreter error"
            ),
        }
    }

    #[must_use]
    fn fire_default(&mut self, node: &Node<FlattenData<'_>>) -> ControlFlow<EarlyExit> {
        // contextual nodes are typed from their binding's annotation; an
        // untyped `default` would have failed inference
        let ty = match self.types.type_of(&node.origin) {
            Some(ty) => ty,
            None => unreachable!("untyped `default` initializer. this is an interpreter error"),
        };

        let instance = self.default_instance(ty);
        self.store.allocate(node.origin, instance);

        KeepGoing
    }

    #[must_use]
    fn fire_sequence_literal(
        &mut self,
        node: &Node<FlattenData<'_>>,
        elements: &[RefIdx],
    ) -> ControlFlow<EarlyExit> {
        let mut instances = Vec::with_capacity(elements.len());
        for element in elements {
            instances.push(self.eval(element)?);
        }

        self.store.allocate(node.origin, Instance::Seq(instances));

        KeepGoing
    }

    #[must_use]
    fn fire_node_ref(
        &mut self,
        node: &Node<FlattenData<'_>>,
        to: &RefIdx,
    ) -> ControlFlow<EarlyExit> {
        self.store.copy(to, node.origin);

        KeepGoing
    }

    #[must_use]
    fn fire_return(&mut self, node: &Node<FlattenData<'_>>, expr: &Option<RefIdx>) -> ControlFlow<EarlyExit> {
        if let Some(returned) = expr {
            let value = self.eval(returned)?;
            self.store.allocate(node.origin, value);
        }

        ControlFlow::Break(EarlyExit::Return(node.origin))
    }

    #[must_use]
    fn fire_node(&mut self, node: &Node<FlattenData<'_>>) -> ControlFlow<EarlyExit> {
        match &node.kind {
            Kind::Constant(_) => self.fire_constant(node),
            Kind::Statements(stmts) => self.fire_block(node, stmts),
            Kind::Call { to, args, .. } => self.fire_call(node, to, args),
            Kind::Binding { value, .. } => {
                self.fire_reference(value)?;
                self.store.copy(value, node.origin);

                KeepGoing
            }
            Kind::NodeRef(to) => self.fire_node_ref(node, to),
            Kind::Assignment { to, from } => self.fire_assignment(node, to, from),
            Kind::Instantiation { to, fields, .. } => self.fire_instantiation(node, to, fields),
            Kind::FieldAccess { instance } => self.fire_field_access(node, instance),
            Kind::Conditional {
                condition,
                true_block,
                false_block,
            } => self.fire_condition(node, condition, true_block, false_block.as_ref()),
            Kind::NullTest { on, negated } => self.fire_null_test(node, on, *negated),
            Kind::ForLoop {
                index,
                value,
                subject,
                block,
            } => self.fire_loop(index.as_ref(), value, subject, block),
            Kind::Return(expr) => self.fire_return(node, expr),
            Kind::Index { container, index } => self.fire_index(node, container, index),
            Kind::Default => self.fire_default(node),
            Kind::SequenceLiteral { elements } => self.fire_sequence_literal(node, elements),
            // a function in expression or statement position is a value;
            // its body only fires when called
            Kind::Function { .. } => {
                self.store.allocate(node.origin, Instance::Fn(node.origin));

                KeepGoing
            }
            // declarations and annotations hold no runtime behavior
            Kind::TypeReference { .. }
            | Kind::ArrayType { .. }
            | Kind::SequenceType { .. }
            | Kind::NullableType { .. }
            | Kind::FunctionType { .. }
            | Kind::Generic { .. }
            | Kind::RecordType { .. }
            | Kind::TypedValue { .. } => KeepGoing,
        }
    }

    fn start(&mut self) -> Result<Option<Instance>, Error> {
        let entry = match self.cir.nodes.last_key_value() {
            Some((origin, _)) => *origin,
            None => return Ok(None),
        };
        let entry = self.node(&entry);

        let stmts = match &entry.kind {
            Kind::Statements(stmts) => stmts,
            _ => unreachable!(
                "expected a list of statements as the entry point. this is an interpreter error"
            ),
        };

        let result = match self.fire_block(entry, stmts) {
            ControlFlow::Break(EarlyExit::Return(result)) => result,
            ControlFlow::Break(EarlyExit::Fault(err)) => return Err(err),
            ControlFlow::Continue(()) => entry.origin,
        };

        Ok(self.store.lookup(&result).cloned())
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

    fn run(ast: &ast::Ast) -> Result<Option<Instance>, Error> {
        let (cir, types) = ast.flatten().name_resolve().unwrap().type_infer().unwrap();
        let (cir, types) = cir.monomorphize(&types).unwrap().type_infer().unwrap();

        cir.type_check(&types).unwrap();

        cir.interpret(&types)
    }

    fn eval(ast: &ast::Ast) -> Instance {
        run(ast).unwrap().unwrap()
    }

    #[test]
    fn last_value() {
        let ast = expr_block(vec![string_constant("chao")])
            .append_builtins()
            .unwrap();

        assert_eq!(eval(&ast), Instance::from("chao"));
    }

    #[test]
    fn calling_a_function() {
        let ast = expr_block(vec![
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
            call("double", vec![int_constant(14)]),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(28));
    }

    #[test]
    fn nested_call() {
        let ast = expr_block(vec![
            function(
                "id",
                vec![generic("T")],
                vec![argument("x", ty("T"))],
                Some(ty("T")),
                expr_block(vec![var("x")]),
            ),
            call("id", vec![call("id", vec![string_constant("chao")])]),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from("chao"));
    }

    #[test]
    fn arithmetic_and_comparison() {
        let sum = expr_block(vec![binary_op(
            ast::Operator::Add,
            int_constant(14),
            int_constant(7),
        )])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&sum), Instance::from(21));

        let ordering = expr_block(vec![binary_op(
            ast::Operator::Lt,
            float_constant(1.5),
            float_constant(2.5),
        )])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ordering), Instance::from(true));
    }

    #[test]
    fn division_by_zero_is_a_fault() {
        let ast = expr_block(vec![binary_op(
            ast::Operator::Div,
            int_constant(1),
            int_constant(0),
        )])
        .append_builtins()
        .unwrap();

        let err = run(&ast).unwrap_err();
        assert_eq!(err.kind(), &ErrKind::Interpreter);
    }

    #[test]
    fn integer_overflow_is_a_fault() {
        let ast = expr_block(vec![binary_op(
            ast::Operator::Add,
            int_constant(i64::MAX),
            int_constant(1),
        )])
        .append_builtins()
        .unwrap();

        let err = run(&ast).unwrap_err();
        assert_eq!(err.kind(), &ErrKind::Interpreter);
    }

    #[test]
    fn early_return() {
        let ast = expr_block(vec![
            function(
                "pick",
                vec![],
                vec![argument("b", ty("bool"))],
                Some(ty("string")),
                expr_block(vec![
                    if_else(
                        var("b"),
                        block(vec![return_value(Some(string_constant("yes")))]),
                        None,
                    ),
                    string_constant("no"),
                ]),
            ),
            call("pick", vec![bool_constant(true)]),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from("yes"));
    }

    #[test]
    fn condition_picks_the_else_branch() {
        let ast = expr_block(vec![
            function(
                "pick",
                vec![],
                vec![argument("b", ty("bool"))],
                Some(ty("string")),
                expr_block(vec![if_else(
                    var("b"),
                    expr_block(vec![string_constant("yes")]),
                    Some(expr_block(vec![string_constant("no")])),
                )]),
            ),
            call("pick", vec![bool_constant(false)]),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from("no"));
    }

    #[test]
    fn default_array_is_zero_filled() {
        // let a: [int; 4] = default; a[4]
        let ast = expr_block(vec![
            typed_binding("a", array_ty(ty("int"), 4), default_init()),
            index(var("a"), int_constant(4)),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(0));
    }

    #[test]
    fn default_nullable_is_null() {
        let ast = expr_block(vec![
            typed_binding("x", nullable_ty(ty("int")), default_init()),
            is_none(var("x")),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(true));
    }

    #[test]
    fn sequence_literal_length() {
        let ast = expr_block(vec![
            binding(
                "s",
                sequence(vec![
                    int_constant(1),
                    int_constant(2),
                    int_constant(4),
                    int_constant(5),
                    int_constant(6),
                ]),
            ),
            call("len", vec![var("s")]),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(5));
    }

    #[test]
    fn indexing_is_one_based() {
        let ast = expr_block(vec![
            binding("s", sequence(vec![int_constant(15), int_constant(16)])),
            index(var("s"), int_constant(1)),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(15));
    }

    #[test]
    fn index_zero_is_out_of_bounds() {
        let ast = expr_block(vec![
            binding("s", sequence(vec![int_constant(15)])),
            index(var("s"), int_constant(0)),
        ])
        .append_builtins()
        .unwrap();

        let err = run(&ast).unwrap_err();
        assert_eq!(err.kind(), &ErrKind::IndexOutOfBounds);
    }

    #[test]
    fn index_past_the_length_is_out_of_bounds() {
        let ast = expr_block(vec![
            binding(
                "s",
                sequence(vec![
                    int_constant(1),
                    int_constant(2),
                    int_constant(4),
                    int_constant(5),
                    int_constant(6),
                ]),
            ),
            index(var("s"), int_constant(6)),
        ])
        .append_builtins()
        .unwrap();

        let err = run(&ast).unwrap_err();
        assert_eq!(err.kind(), &ErrKind::IndexOutOfBounds);
    }

    #[test]
    fn push_grows_the_sequence() {
        let ast = expr_block(vec![
            binding("s", sequence(vec![int_constant(1)])),
            method_call(var("s"), "push", vec![int_constant(2)]),
            index(var("s"), int_constant(2)),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(2));
    }

    #[test]
    fn indexed_assignment_writes_through() {
        let ast = expr_block(vec![
            mut_binding(
                "s",
                None,
                sequence(vec![int_constant(1), int_constant(2)]),
            ),
            assignment(index(var("s"), int_constant(1)), int_constant(9)),
            index(var("s"), int_constant(1)),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(9));
    }

    #[test]
    fn indexed_assignment_out_of_bounds_is_a_fault() {
        let ast = expr_block(vec![
            mut_binding(
                "s",
                None,
                sequence(vec![int_constant(1), int_constant(2)]),
            ),
            assignment(index(var("s"), int_constant(3)), int_constant(9)),
        ])
        .append_builtins()
        .unwrap();

        let err = run(&ast).unwrap_err();
        assert_eq!(err.kind(), &ErrKind::IndexOutOfBounds);
    }

    #[test]
    fn for_loop_accumulates() {
        // let mut sum = 0; for i, v in s { sum = sum + v }; sum
        let ast = expr_block(vec![
            binding(
                "s",
                sequence(vec![int_constant(1), int_constant(2), int_constant(3)]),
            ),
            mut_binding("sum", None, int_constant(0)),
            for_loop(
                Some("i"),
                "v",
                var("s"),
                block(vec![assignment(
                    var("sum"),
                    binary_op(ast::Operator::Add, var("sum"), var("v")),
                )]),
            ),
            var("sum"),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(6));
    }

    #[test]
    fn map_collect_pipeline() {
        // s.map(x -> x + 1).collect()[3]
        let ast = expr_block(vec![
            binding(
                "s",
                sequence(vec![int_constant(1), int_constant(2), int_constant(3)]),
            ),
            index(
                method_call(
                    method_call(
                        var("s"),
                        "map",
                        vec![lambda(
                            vec![argument("x", ty("int"))],
                            Some(ty("int")),
                            expr_block(vec![binary_op(
                                ast::Operator::Add,
                                var("x"),
                                int_constant(1),
                            )]),
                        )],
                    ),
                    "collect",
                    vec![],
                ),
                int_constant(3),
            ),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(4));
    }

    #[test]
    fn filter_keeps_matching_elements() {
        let ast = expr_block(vec![
            binding(
                "s",
                sequence(vec![int_constant(1), int_constant(2), int_constant(3)]),
            ),
            call(
                "len",
                vec![method_call(
                    var("s"),
                    "filter",
                    vec![lambda(
                        vec![argument("x", ty("int"))],
                        Some(ty("bool")),
                        expr_block(vec![binary_op(
                            ast::Operator::Gt,
                            var("x"),
                            int_constant(1),
                        )]),
                    )],
                )],
            ),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(2));
    }

    #[test]
    fn class_instantiation_and_field_access() {
        let ast = expr_block(vec![
            class(
                "Point",
                vec![],
                vec![],
                vec![argument("x", ty("int")), argument("y", ty("int"))],
                vec![],
            ),
            binding(
                "p",
                instantiation("Point", vec![], vec![int_constant(3), int_constant(4)]),
            ),
            field_access(var("p"), "y"),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(4));
    }

    #[test]
    fn operator_dispatches_to_the_class_method() {
        let ast = expr_block(vec![
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
            binding("a", instantiation("Meters", vec![], vec![int_constant(3)])),
            binding("b", instantiation("Meters", vec![], vec![int_constant(4)])),
            field_access(
                binary_op(ast::Operator::Add, var("a"), var("b")),
                "value",
            ),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(7));
    }

    #[test]
    fn null_test_observes_the_value() {
        let ast = expr_block(vec![
            typed_binding("x", nullable_ty(ty("int")), none()),
            is_not_none(var("x")),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(false));
    }

    #[test]
    fn generic_class_round_trip() {
        let ast = expr_block(vec![
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
            field_access(var("p"), "second"),
        ])
        .append_builtins()
        .unwrap();

        assert_eq!(eval(&ast), Instance::from(2));
    }
}
