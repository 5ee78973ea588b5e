//! The monomorphization engine. Every use of a generic declaration in
//! non-generic code is a root: the engine works out the root's type
//! arguments, deep-copies the declaration with its parameters replaced by
//! the concrete types, and points the root at the copy. Copies are cached
//! per declaration and argument list, so `sum(ints)` written twice builds
//! one `sum+int`. Once every root points at a specialization, the generic
//! originals (and everything only they referenced) are swept out.
//!
//! A specialization's origin is reserved *before* its body is copied.
//! Self-references - a recursive call, a method's `self: Pair[T]` annotation -
//! hit the cache and land on the reservation, so recursion over the same
//! specialization terminates. Recursion that keeps requesting *new*
//! specializations of a declaration already being built can never terminate
//! and is reported instead.

use std::collections::{BTreeSet, HashMap, HashSet};

use cir::{Cir, Kind, Node, OriginIdx, RefIdx, TreeLike};
use error::{log, ErrKind, Error};
use flatten::{AstInfo, FlattenData};
use location::SpanTuple;
use symbol::Symbol;
use typecheck::TypeMap;
use types::{Capabilities, PrimitiveTypes, Type};

use crate::bounds;

/// `sum` instantiated with `int` becomes `sum+int`: a name no user
/// declaration can collide with, and one the runtime can split back apart
/// when dispatching builtins
pub(crate) fn mangle(name: Symbol, type_args: &[Type]) -> Symbol {
    let mangled = type_args
        .iter()
        .fold(String::from(name.access()), |name, ty| {
            format!("{name}+{ty}")
        });

    Symbol::from(mangled)
}

fn is_generic_kind(kind: &Kind) -> bool {
    matches!(
        kind,
        Kind::Function { generics, .. } | Kind::RecordType { generics, .. } if !generics.is_empty()
    )
}

/// The nodes making up one declaration: its arguments, annotations, body and
/// nested declarations, but nothing it merely *refers* to - not its callees,
/// not outer bindings, not the declarations its annotations name
#[derive(Default)]
struct OwnedSubtree {
    seen: BTreeSet<OriginIdx>,
}

impl OwnedSubtree {
    fn collect(cir: &Cir<FlattenData<'_>>, decl: &OriginIdx) -> BTreeSet<OriginIdx> {
        let mut collector = OwnedSubtree::default();

        collector.seen.insert(*decl);
        collector.visit(cir, decl);

        collector.seen
    }
}

impl TreeLike<FlattenData<'_>> for OwnedSubtree {
    fn visit_reference(&mut self, cir: &Cir<FlattenData<'_>>, reference: &RefIdx) {
        if let RefIdx::Resolved(origin) = reference {
            if self.seen.insert(*origin) {
                self.visit(cir, origin);
            }
        }
    }

    // uses point outwards; only the use node itself belongs to the subtree
    fn visit_node_ref(&mut self, _cir: &Cir<FlattenData<'_>>, _node: &Node<FlattenData<'_>>, _to: &RefIdx) {}

    fn visit_type_reference(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        _node: &Node<FlattenData<'_>>,
        _to: &RefIdx,
        args: &[RefIdx],
    ) {
        self.visit_many(cir, args);
    }

    fn visit_call(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        _node: &Node<FlattenData<'_>>,
        _to: &RefIdx,
        generics: &[RefIdx],
        args: &[RefIdx],
    ) {
        self.visit_many(cir, generics);
        self.visit_many(cir, args);
    }

    fn visit_instantiation(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        _node: &Node<FlattenData<'_>>,
        _to: &RefIdx,
        generics: &[RefIdx],
        fields: &[RefIdx],
    ) {
        self.visit_many(cir, generics);
        self.visit_many(cir, fields);
    }
}

/// Marks everything reachable from the entry point by following resolved
/// references, cycles included
#[derive(Default)]
struct Reachable {
    seen: HashSet<OriginIdx>,
}

impl TreeLike<FlattenData<'_>> for Reachable {
    fn visit_reference(&mut self, cir: &Cir<FlattenData<'_>>, reference: &RefIdx) {
        if let RefIdx::Resolved(origin) = reference {
            if self.seen.insert(*origin) {
                self.visit(cir, origin);
            }
        }
    }
}

struct Mono<'ctx, 'ast> {
    cir: Cir<FlattenData<'ast>>,
    types: &'ctx TypeMap,
    primitives: &'ctx PrimitiveTypes,
    capabilities: &'ctx Capabilities,
    /// Which generic class each method belongs to
    method_classes: HashMap<OriginIdx, OriginIdx>,
    /// Where each method of each class specialization landed
    method_map: HashMap<(OriginIdx, Symbol), OriginIdx>,
    cache: HashMap<(OriginIdx, Vec<Type>), OriginIdx>,
    /// The mangled name of each specialization, known before its copy is
    /// complete
    spec_names: HashMap<OriginIdx, Symbol>,
    /// Declarations currently being specialized, for cycle detection
    path: Vec<OriginIdx>,
    current: OriginIdx,
    errs: Vec<Error>,
}

pub(crate) fn run<'ast>(
    cir: Cir<FlattenData<'ast>>,
    types: &TypeMap,
    primitives: &PrimitiveTypes,
    capabilities: &Capabilities,
) -> Result<Cir<FlattenData<'ast>>, Error> {
    // the program's top-level block is always the last node
    let root = match cir.nodes.last_key_value() {
        Some((origin, _)) => *origin,
        None => return Ok(cir),
    };

    let owned = cir
        .nodes
        .values()
        .filter(|node| is_generic_kind(&node.kind))
        .flat_map(|node| OwnedSubtree::collect(&cir, &node.origin))
        .collect::<HashSet<OriginIdx>>();

    let mut method_classes = HashMap::new();
    for node in cir.nodes.values() {
        if let Kind::RecordType {
            generics, methods, ..
        } = &node.kind
        {
            if generics.is_empty() {
                continue;
            }

            for method in methods {
                method_classes.insert(method.expect_resolved(), node.origin);
            }
        }
    }

    let mut mono = Mono {
        current: root,
        cir,
        types,
        primitives,
        capabilities,
        method_classes,
        method_map: HashMap::new(),
        cache: HashMap::new(),
        spec_names: HashMap::new(),
        path: Vec::new(),
        errs: Vec::new(),
    };

    let roots = mono
        .cir
        .nodes
        .values()
        .filter(|node| !owned.contains(&node.origin))
        .map(|node| node.origin)
        .collect::<Vec<OriginIdx>>();

    roots.into_iter().for_each(|origin| mono.visit_root(origin));

    match mono.errs.len() {
        0 => {}
        1 => return Err(mono.errs.swap_remove(0)),
        _ => return Err(Error::new(ErrKind::Multiple(mono.errs))),
    }

    let mut cir = mono.cir;

    // generic declarations are statements too; unhook them so the sweep can
    // reclaim them now that nothing calls them anymore
    let generic = cir
        .nodes
        .values()
        .filter(|node| is_generic_kind(&node.kind))
        .map(|node| node.origin)
        .collect::<HashSet<OriginIdx>>();

    let dropped = |reference: &RefIdx| match reference {
        RefIdx::Resolved(origin) => generic.contains(origin),
        RefIdx::Unresolved => false,
    };

    for node in cir.nodes.values_mut() {
        match &mut node.kind {
            Kind::Statements(stmts) => stmts.retain(|stmt| !dropped(stmt)),
            Kind::RecordType { methods, .. } => methods.retain(|method| !dropped(method)),
            _ => {}
        }
    }

    let mut reachable = Reachable::default();
    reachable.seen.insert(root);
    reachable.visit(&cir, &root);

    cir.nodes.retain(|origin, _| reachable.seen.contains(origin));

    // the copies were appended after the top-level block; move it back to
    // the end, where the rest of the pipeline expects the entry point
    if let Some(block) = cir.nodes.remove(&root) {
        let relocated = cir
            .nodes
            .last_key_value()
            .map_or(root, |(origin, _)| origin.next());

        cir.nodes.insert(
            relocated,
            Node {
                origin: relocated,
                ..block
            },
        );
    }

    Ok(cir)
}

impl<'ast> Mono<'_, 'ast> {
    fn next_origin(&mut self) -> OriginIdx {
        self.current = self.current.next();
        self.current
    }

    fn is_generic(&self, origin: &OriginIdx) -> bool {
        is_generic_kind(&self.cir[origin].kind)
    }

    /// The canonical type of an original node, with the enclosing
    /// specialization's bindings applied
    fn type_of(&mut self, reference: &RefIdx, env: &HashMap<OriginIdx, Type>) -> Option<Type> {
        let ty = self.types.type_of(&reference.expect_resolved())?.clone();

        match ty.substitute(env) {
            Ok(ty) => Some(ty),
            Err(e) => {
                self.errs.push(e);
                None
            }
        }
    }

    fn visit_root(&mut self, origin: OriginIdx) {
        let node = self.cir[&origin].clone();
        let empty = HashMap::new();
        let loc = node.data.ast.location().clone();

        match &node.kind {
            Kind::Call {
                to, generics, args, ..
            } => {
                let target = to.expect_resolved();

                if self.is_generic(&target) {
                    let type_args =
                        self.call_type_arguments(&loc, target, generics, args, &empty);

                    if let Some(spec) =
                        type_args.and_then(|args| self.instantiate(target, args, &empty, &loc))
                    {
                        self.retarget(origin, spec);
                    }
                } else if let Some(class) = self.method_classes.get(&target).copied() {
                    if let Some(method) =
                        self.specialized_method(class, target, args.first(), &empty, &loc)
                    {
                        self.retarget(origin, method);
                    }
                }
            }
            Kind::Instantiation { to, .. } => {
                let target = to.expect_resolved();

                if !self.is_generic(&target) {
                    return;
                }

                // inference already worked the arguments out from the
                // supplied fields (or the written annotations)
                if let Some(Type::Record(_, type_args)) =
                    self.type_of(&RefIdx::Resolved(origin), &empty)
                {
                    if let Some(spec) = self.instantiate(target, type_args, &empty, &loc) {
                        self.retarget(origin, spec);
                    }
                }
            }
            Kind::TypeReference { to, .. } => {
                let target = to.expect_resolved();

                if !self.is_generic(&target) {
                    return;
                }

                if let Some(Type::Record(_, type_args)) =
                    self.type_of(&RefIdx::Resolved(origin), &empty)
                {
                    if let Some(spec) = self.instantiate(target, type_args, &empty, &loc) {
                        self.retarget(origin, spec);
                    }
                }
            }
            Kind::NodeRef(to) => {
                let target = to.expect_resolved();

                if self.is_generic(&target)
                    && matches!(self.cir[&target].kind, Kind::Function { .. })
                {
                    // functions always carry a name
                    let name = self.cir[&target].data.ast.symbol().unwrap();

                    self.errs.push(
                        Error::new(ErrKind::Generics)
                            .with_msg(format!(
                                "generic function `{name}` cannot be used as a value"
                            ))
                            .with_loc(Some(loc))
                            .with_hint(Error::hint().with_msg(String::from(
                                "call it, or wrap it in a lambda with concrete types",
                            ))),
                    );
                }
            }
            _ => {}
        }
    }

    fn retarget(&mut self, origin: OriginIdx, new_target: OriginIdx) {
        // specializations always carry their mangled name
        let new_name = self.cir[&new_target].data.ast.symbol().unwrap();

        if let Some(node) = self.cir.nodes.get_mut(&origin) {
            match &mut node.kind {
                Kind::Call { to, generics, .. } | Kind::Instantiation { to, generics, .. } => {
                    *to = RefIdx::Resolved(new_target);
                    generics.clear();
                }
                Kind::TypeReference { to, args } => {
                    *to = RefIdx::Resolved(new_target);
                    args.clear();
                }
                _ => return,
            }

            // the use now names the copy it points at, so that nothing in
            // the output graph mentions the swept original
            let loc = node.data.ast.location().clone();
            node.data.ast = AstInfo::Helper(new_name, loc);
        }
    }

    /// The mangled name a use should take over, when its target is a
    /// specialization. Looked up in [`Mono::spec_names`] rather than the
    /// graph: a self-referential use is copied before its specialization's
    /// root node lands
    fn specialized_name(&self, kind: &Kind) -> Option<Symbol> {
        let target = match kind {
            Kind::TypeReference {
                to: RefIdx::Resolved(target),
                ..
            }
            | Kind::Call {
                to: RefIdx::Resolved(target),
                ..
            }
            | Kind::Instantiation {
                to: RefIdx::Resolved(target),
                ..
            } => target,
            _ => return None,
        };

        self.spec_names.get(target).copied()
    }

    /// The type arguments one call hands a generic declaration: the written
    /// ones when present, the supplied arguments unified against the
    /// declared ones otherwise
    fn call_type_arguments(
        &mut self,
        loc: &SpanTuple,
        decl: OriginIdx,
        explicit: &[RefIdx],
        supplied: &[RefIdx],
        env: &HashMap<OriginIdx, Type>,
    ) -> Option<Vec<Type>> {
        let (params, slots) = match &self.cir[&decl].kind {
            Kind::Function { generics, args, .. } => (generics.clone(), args.clone()),
            Kind::RecordType {
                generics, fields, ..
            } => (generics.clone(), fields.clone()),
            _ => return None,
        };

        if !explicit.is_empty() {
            return explicit
                .iter()
                .map(|annotation| self.type_of(annotation, env))
                .collect();
        }

        let mut inferred = HashMap::new();

        for (slot, arg) in slots.iter().zip(supplied) {
            let declared = match self.types.type_of(&slot.expect_resolved()) {
                Some(ty) => ty.clone(),
                None => continue,
            };
            let actual = match self.type_of(arg, env) {
                Some(ty) => ty,
                None => continue,
            };
            // a nullable argument may flow into a non-nullable slot; the
            // nullability pass checks it was narrowed first
            let actual = match &declared {
                Type::Nullable(_) => actual,
                _ => actual.narrowed().clone(),
            };

            types::unify(&declared, &actual, &mut inferred);
        }

        let type_args = params
            .iter()
            .map(|param| inferred.get(&param.expect_resolved()).cloned())
            .collect::<Option<Vec<Type>>>();

        match type_args {
            Some(type_args) => Some(type_args),
            None => {
                // declarations always carry a name
                let name = self.cir[&decl].data.ast.symbol().unwrap();

                self.errs.push(
                    Error::new(ErrKind::Generics)
                        .with_msg(format!(
                            "cannot infer the type arguments of `{name}` from this call"
                        ))
                        .with_loc(Some(loc.clone()))
                        .with_hint(
                            Error::hint()
                                .with_msg(format!("spell them out: `{name}[int](...)`")),
                        ),
                );

                None
            }
        }
    }

    /// The specialized counterpart of a generic class's method, for one
    /// receiver. Instantiates the class if this is its first use with these
    /// arguments.
    fn specialized_method(
        &mut self,
        class: OriginIdx,
        method: OriginIdx,
        receiver: Option<&RefIdx>,
        env: &HashMap<OriginIdx, Type>,
        loc: &SpanTuple,
    ) -> Option<OriginIdx> {
        // dispatch put the receiver first
        let receiver = receiver?;

        let class_args = match self.type_of(receiver, env)?.narrowed() {
            Type::Record(_, args) => args.clone(),
            // dispatch already guaranteed a class instance
            _ => return None,
        };

        let spec = self.instantiate(class, class_args, env, loc)?;
        // methods always carry their name
        let name = self.cir[&method].data.ast.symbol().unwrap();

        self.method_map.get(&(spec, name)).copied()
    }

    fn instantiate(
        &mut self,
        decl: OriginIdx,
        type_args: Vec<Type>,
        outer: &HashMap<OriginIdx, Type>,
        loc: &SpanTuple,
    ) -> Option<OriginIdx> {
        if let Some(spec) = self.cache.get(&(decl, type_args.clone())) {
            log!("generics", "cache hit, reusing specialization {spec:?}");

            return Some(*spec);
        }

        // the cache above catches monomorphic recursion, so a declaration
        // already on the path is being instantiated again with different
        // arguments: each specialization would require the next one
        if self.path.contains(&decl) {
            // declarations always carry a name
            let name = self.cir[&decl].data.ast.symbol().unwrap();

            self.errs.push(
                Error::new(ErrKind::RecursiveInstantiation)
                    .with_msg(format!(
                        "instantiating `{name}` can never finish: every specialization requires another, different one"
                    ))
                    .with_loc(Some(loc.clone()))
                    .with_hint(
                        Error::hint()
                            .with_msg(format!("`{name}` declared here"))
                            .with_loc(Some(self.cir[&decl].data.ast.location().clone())),
                    ),
            );

            return None;
        }

        let decl_node = self.cir[&decl].clone();
        let params = match &decl_node.kind {
            Kind::Function { generics, .. } | Kind::RecordType { generics, .. } => {
                generics.clone()
            }
            _ => return None,
        };

        let bound_errs = bounds::check(
            &self.cir,
            &decl_node,
            &params,
            &type_args,
            self.capabilities,
            loc,
        );
        if !bound_errs.is_empty() {
            self.errs.extend(bound_errs);
            return None;
        }

        // nested declarations see the enclosing specialization's bindings
        let mut env = outer.clone();
        params
            .iter()
            .map(RefIdx::expect_resolved)
            .zip(type_args.iter().cloned())
            .for_each(|(param, arg)| {
                env.insert(param, arg);
            });

        // reserve the specialization's origin before copying anything, so
        // that self-references land on it
        let spec = self.next_origin();
        self.cache.insert((decl, type_args.clone()), spec);
        self.path.push(decl);

        // declarations always carry a name
        log!(
            "generics",
            "instantiating `{}` as {spec:?}",
            decl_node.data.ast.symbol().unwrap()
        );

        let subtree = OwnedSubtree::collect(&self.cir, &decl);

        let mut map = HashMap::new();
        map.insert(decl, spec);
        for old in &subtree {
            if *old == decl || env.contains_key(old) {
                continue;
            }

            map.insert(*old, self.next_origin());
        }

        if let Kind::RecordType { methods, .. } = &decl_node.kind {
            for method in methods {
                let method = method.expect_resolved();
                // methods always carry their name
                let name = self.cir[&method].data.ast.symbol().unwrap();

                self.method_map.insert((spec, name), map[&method]);
            }
        }

        // declarations always carry a name
        let mangled = mangle(decl_node.data.ast.symbol().unwrap(), &type_args);
        self.spec_names.insert(spec, mangled);

        for old in &subtree {
            // bound parameters are not copied; their uses are replaced
            if env.contains_key(old) {
                continue;
            }

            let node = self.cir[old].clone();
            self.copy_node(node, decl, mangled, &map, &env, loc);
        }

        self.path.pop();

        Some(spec)
    }

    /// Copy one node of a declaration being specialized, rewriting its
    /// references into the copy and replacing every use of a bound type
    /// parameter with the concrete type it stands for
    fn copy_node(
        &mut self,
        node: Node<FlattenData<'ast>>,
        decl: OriginIdx,
        mangled: Symbol,
        map: &HashMap<OriginIdx, OriginIdx>,
        env: &HashMap<OriginIdx, Type>,
        loc: &SpanTuple,
    ) {
        let Node { data, origin, kind } = node;
        let new_origin = map[&origin];

        let remap = |reference: &RefIdx| match reference {
            RefIdx::Resolved(old) => RefIdx::Resolved(map.get(old).copied().unwrap_or(*old)),
            RefIdx::Unresolved => RefIdx::Unresolved,
        };
        let remap_all =
            |references: &[RefIdx]| references.iter().map(remap).collect::<Vec<RefIdx>>();
        let remap_opt = |reference: &Option<RefIdx>| reference.as_ref().map(remap);

        let kind = match kind {
            Kind::TypeReference { to, args } => {
                let target = to.expect_resolved();

                if let Some(bound) = env.get(&target).cloned() {
                    // the parameter use becomes the concrete type's
                    // annotation, built from scratch
                    self.materialized(&bound, env, data.ast.location())
                        .unwrap_or(Kind::TypeReference { to, args: vec![] })
                } else if self.is_generic(&target) {
                    let type_args = args
                        .iter()
                        .map(|arg| self.type_of(arg, env))
                        .collect::<Option<Vec<Type>>>();

                    match type_args.and_then(|args| self.instantiate(target, args, env, loc)) {
                        Some(spec) => Kind::TypeReference {
                            to: RefIdx::Resolved(spec),
                            args: vec![],
                        },
                        None => Kind::TypeReference {
                            to: remap(&to),
                            args: remap_all(&args),
                        },
                    }
                } else {
                    Kind::TypeReference {
                        to: remap(&to),
                        args: remap_all(&args),
                    }
                }
            }
            Kind::Call { to, generics, args } => {
                let target = to.expect_resolved();

                if self.is_generic(&target) {
                    let type_args = self.call_type_arguments(
                        data.ast.location(),
                        target,
                        &generics,
                        &args,
                        env,
                    );

                    match type_args.and_then(|type_args| {
                        self.instantiate(target, type_args, env, data.ast.location())
                    }) {
                        Some(spec) => Kind::Call {
                            to: RefIdx::Resolved(spec),
                            generics: vec![],
                            args: remap_all(&args),
                        },
                        None => Kind::Call {
                            to: remap(&to),
                            generics: remap_all(&generics),
                            args: remap_all(&args),
                        },
                    }
                } else if !map.contains_key(&target) && self.method_classes.contains_key(&target)
                {
                    // a method of another generic class; the receiver's
                    // (now concrete) type names the specialization
                    let class = self.method_classes[&target];

                    match self.specialized_method(
                        class,
                        target,
                        args.first(),
                        env,
                        data.ast.location(),
                    ) {
                        Some(method) => Kind::Call {
                            to: RefIdx::Resolved(method),
                            generics: vec![],
                            args: remap_all(&args),
                        },
                        None => Kind::Call {
                            to: remap(&to),
                            generics: remap_all(&generics),
                            args: remap_all(&args),
                        },
                    }
                } else {
                    Kind::Call {
                        to: remap(&to),
                        generics: remap_all(&generics),
                        args: remap_all(&args),
                    }
                }
            }
            Kind::Instantiation {
                to,
                generics,
                fields,
            } => {
                let target = to.expect_resolved();

                if let Some(bound) = env.get(&target).cloned() {
                    // `T(...)` with `T` now concrete
                    match self.declaration_of(&bound, env, data.ast.location()) {
                        Some(class) => Kind::Instantiation {
                            to: RefIdx::Resolved(class),
                            generics: vec![],
                            fields: remap_all(&fields),
                        },
                        None => Kind::Instantiation {
                            to,
                            generics: vec![],
                            fields: remap_all(&fields),
                        },
                    }
                } else if self.is_generic(&target) {
                    let spec = match self.type_of(&RefIdx::Resolved(origin), env) {
                        Some(Type::Record(_, type_args)) => {
                            self.instantiate(target, type_args, env, data.ast.location())
                        }
                        _ => None,
                    };

                    match spec {
                        Some(spec) => Kind::Instantiation {
                            to: RefIdx::Resolved(spec),
                            generics: vec![],
                            fields: remap_all(&fields),
                        },
                        None => Kind::Instantiation {
                            to: remap(&to),
                            generics: remap_all(&generics),
                            fields: remap_all(&fields),
                        },
                    }
                } else {
                    Kind::Instantiation {
                        to: remap(&to),
                        generics: remap_all(&generics),
                        fields: remap_all(&fields),
                    }
                }
            }
            Kind::Function {
                generics,
                args,
                return_type,
                block,
            } => Kind::Function {
                generics: if origin == decl {
                    vec![]
                } else {
                    remap_all(&generics)
                },
                args: remap_all(&args),
                return_type: remap_opt(&return_type),
                block: remap_opt(&block),
            },
            Kind::RecordType {
                generics,
                fields,
                methods,
                capabilities,
            } => Kind::RecordType {
                generics: if origin == decl {
                    vec![]
                } else {
                    remap_all(&generics)
                },
                fields: remap_all(&fields),
                methods: remap_all(&methods),
                capabilities,
            },
            Kind::Constant(c) => Kind::Constant(c),
            Kind::ArrayType { element, size } => Kind::ArrayType {
                element: remap(&element),
                size,
            },
            Kind::SequenceType { element } => Kind::SequenceType {
                element: remap(&element),
            },
            Kind::NullableType { inner } => Kind::NullableType {
                inner: remap(&inner),
            },
            Kind::FunctionType { args, return_type } => Kind::FunctionType {
                args: remap_all(&args),
                return_type: remap_opt(&return_type),
            },
            Kind::Generic { bound } => Kind::Generic { bound },
            Kind::TypedValue { ty } => Kind::TypedValue { ty: remap(&ty) },
            Kind::Binding { value, ty } => Kind::Binding {
                value: remap(&value),
                ty: remap_opt(&ty),
            },
            Kind::NodeRef(to) => Kind::NodeRef(remap(&to)),
            Kind::Assignment { to, from } => Kind::Assignment {
                to: remap(&to),
                from: remap(&from),
            },
            Kind::FieldAccess { instance } => Kind::FieldAccess {
                instance: remap(&instance),
            },
            Kind::Statements(stmts) => Kind::Statements(remap_all(&stmts)),
            Kind::Conditional {
                condition,
                true_block,
                false_block,
            } => Kind::Conditional {
                condition: remap(&condition),
                true_block: remap(&true_block),
                false_block: remap_opt(&false_block),
            },
            Kind::NullTest { on, negated } => Kind::NullTest {
                on: remap(&on),
                negated,
            },
            Kind::ForLoop {
                index,
                value,
                subject,
                block,
            } => Kind::ForLoop {
                index: remap_opt(&index),
                value: remap(&value),
                subject: remap(&subject),
                block: remap(&block),
            },
            Kind::Return(value) => Kind::Return(remap_opt(&value)),
            Kind::Index { container, index } => Kind::Index {
                container: remap(&container),
                index: remap(&index),
            },
            Kind::Default => Kind::Default,
            Kind::SequenceLiteral { elements } => Kind::SequenceLiteral {
                elements: remap_all(&elements),
            },
        };

        let data = if origin == decl {
            FlattenData {
                ast: AstInfo::Helper(mangled, data.ast.location().clone()),
            }
        } else if let Some(spec_name) = self.specialized_name(&kind) {
            // a use whose target became a specialization names the copy,
            // not the swept original
            FlattenData {
                ast: AstInfo::Helper(spec_name, data.ast.location().clone()),
            }
        } else {
            data
        };

        self.cir.nodes.insert(
            new_origin,
            Node {
                data,
                origin: new_origin,
                kind,
            },
        );
    }

    /// Build the annotation nodes describing a concrete type, the way
    /// flattening would have had the user written it out
    fn materialized(
        &mut self,
        ty: &Type,
        env: &HashMap<OriginIdx, Type>,
        loc: &SpanTuple,
    ) -> Option<Kind> {
        match ty {
            Type::Primitive(p) => Some(Kind::TypeReference {
                to: RefIdx::Resolved(self.primitives.origin_of(*p)),
                args: vec![],
            }),
            Type::Record(decl, args) if args.is_empty() => Some(Kind::TypeReference {
                to: RefIdx::Resolved(decl.origin),
                args: vec![],
            }),
            Type::Record(decl, args) => {
                let spec = self.instantiate(decl.origin, args.clone(), env, loc)?;

                Some(Kind::TypeReference {
                    to: RefIdx::Resolved(spec),
                    args: vec![],
                })
            }
            Type::FixedArray(element, size) => Some(Kind::ArrayType {
                element: self.annotation_node(element, env, loc)?,
                size: *size,
            }),
            Type::Sequence(element) => Some(Kind::SequenceType {
                element: self.annotation_node(element, env, loc)?,
            }),
            Type::Nullable(inner) => Some(Kind::NullableType {
                inner: self.annotation_node(inner, env, loc)?,
            }),
            Type::Function(args, return_type) => {
                let args = args
                    .iter()
                    .map(|arg| self.annotation_node(arg, env, loc))
                    .collect::<Option<Vec<RefIdx>>>()?;
                let return_type = match return_type {
                    Some(ty) => Some(self.annotation_node(ty, env, loc)?),
                    None => None,
                };

                Some(Kind::FunctionType { args, return_type })
            }
            Type::Parameter(decl) => {
                self.errs.push(
                    Error::new(ErrKind::UnboundTypeParameter)
                        .with_msg(format!(
                            "no type argument bound to parameter `{}`",
                            decl.name
                        ))
                        .with_loc(Some(loc.clone())),
                );

                None
            }
            Type::None => {
                self.errs.push(
                    Error::new(ErrKind::Generics)
                        .with_msg(String::from(
                            "`None` has no declaration and cannot be used as a type argument",
                        ))
                        .with_loc(Some(loc.clone())),
                );

                None
            }
        }
    }

    fn annotation_node(
        &mut self,
        ty: &Type,
        env: &HashMap<OriginIdx, Type>,
        loc: &SpanTuple,
    ) -> Option<RefIdx> {
        let kind = self.materialized(ty, env, loc)?;
        let origin = self.next_origin();

        self.cir.nodes.insert(
            origin,
            Node {
                data: FlattenData {
                    ast: AstInfo::Helper(Symbol::from(ty.to_string()), loc.clone()),
                },
                origin,
                kind,
            },
        );

        Some(RefIdx::Resolved(origin))
    }

    /// The declaration a concrete type instantiates: `T(...)` is only
    /// meaningful when `T` turned out to be a class or a primitive
    fn declaration_of(
        &mut self,
        ty: &Type,
        env: &HashMap<OriginIdx, Type>,
        loc: &SpanTuple,
    ) -> Option<OriginIdx> {
        match ty {
            Type::Primitive(p) => Some(self.primitives.origin_of(*p)),
            Type::Record(decl, args) if args.is_empty() => Some(decl.origin),
            Type::Record(decl, args) => self.instantiate(decl.origin, args.clone(), env, loc),
            other => {
                self.errs.push(
                    Error::new(ErrKind::Generics)
                        .with_msg(format!("cannot instantiate a value of type `{other}`"))
                        .with_loc(Some(loc.clone())),
                );

                None
            }
        }
    }
}
