//! Second inference stage: resolve the typing facts recorded by the
//! [`crate::typer`] into canonical [`Type`]s by chasing through the graph
//! until a terminal annotation or literal is reached. Resolution is memoized
//! per origin, so chasing a deep chain types every node along the way.

use std::collections::{HashMap, HashSet};

use cir::{Cir, Kind, Node, OriginIdx, RefIdx, Traversal};
use error::{ErrKind, Error};
use flatten::FlattenData;
use types::{builder, DeclId, PrimitiveTypes, Type};

use crate::typer::{TypeVariable, Typer};
use crate::TypeMap;

struct Actual<'ctx> {
    primitives: &'ctx PrimitiveTypes,
    variables: HashMap<OriginIdx, TypeVariable>,
    map: TypeMap,
    visited: HashSet<OriginIdx>,
    errs: Vec<Error>,
}

/// Run both inference stages and produce the canonical type table for the
/// whole graph. Errors (contextual nodes with nothing to take a type from,
/// malformed annotations) are collected across nodes.
pub(crate) fn resolve(
    cir: &Cir<FlattenData<'_>>,
    primitives: &PrimitiveTypes,
) -> Result<TypeMap, Error> {
    let mut typer = Typer::default();
    // the typer records facts and never errors
    let _ = typer.traverse(cir);

    let mut actual = Actual {
        primitives,
        variables: typer.variables,
        map: TypeMap::default(),
        visited: HashSet::new(),
        errs: Vec::new(),
    };

    cir.nodes.keys().for_each(|origin| {
        actual.type_of(cir, *origin);
    });

    match actual.errs.len() {
        0 => Ok(actual.map),
        1 => Err(actual.errs.swap_remove(0)),
        _ => Err(Error::new(ErrKind::Multiple(actual.errs))),
    }
}

fn cannot_infer(node: &Node<FlattenData<'_>>) -> Error {
    Error::new(ErrKind::TypeChecker)
        .with_msg(String::from("cannot infer a type for this initializer"))
        .with_loc(Some(node.data.ast.location().clone()))
        .with_hint(Error::hint().with_msg(String::from(
            "annotate the enclosing binding with the intended type",
        )))
}

impl Actual<'_> {
    fn type_of(&mut self, cir: &Cir<FlattenData<'_>>, origin: OriginIdx) -> Option<Type> {
        if !self.visited.insert(origin) {
            return self.map.type_of(&origin).cloned();
        }

        let ty = self.compute(cir, &cir[&origin]);

        if let Some(ty) = &ty {
            self.map.insert(origin, ty.clone());
        }

        ty
    }

    fn follow(&mut self, cir: &Cir<FlattenData<'_>>, reference: &RefIdx) -> Option<Type> {
        match reference {
            RefIdx::Resolved(origin) => self.type_of(cir, *origin),
            RefIdx::Unresolved => None,
        }
    }

    fn annotation(&mut self, cir: &Cir<FlattenData<'_>>, reference: &RefIdx) -> Option<Type> {
        match builder::from_annotation(cir, reference, self.primitives) {
            Ok(ty) => Some(ty),
            Err(e) => {
                self.errs.push(e);
                None
            }
        }
    }

    fn from_variable(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        variable: TypeVariable,
    ) -> Option<Type> {
        match variable {
            TypeVariable::Actual(ty) => Some(ty),
            TypeVariable::Reference(reference) => match &cir[&reference].kind {
                Kind::TypeReference { .. }
                | Kind::ArrayType { .. }
                | Kind::SequenceType { .. }
                | Kind::NullableType { .. }
                | Kind::FunctionType { .. } => self.annotation(cir, &reference),
                _ => self.follow(cir, &reference),
            },
            TypeVariable::ReturnOf(callee) => self.return_of(cir, node, &callee),
            // an uniterable subject is reported by the checker; the loop
            // variable simply stays untyped here
            TypeVariable::ElementOf(subject) => {
                self.follow(cir, &subject)?.narrowed().element().cloned()
            }
            TypeVariable::Contextual { annotation } => match annotation {
                Some(annotation) => self.annotation(cir, &annotation),
                None => {
                    self.errs.push(cannot_infer(node));
                    None
                }
            },
        }
    }

    fn return_of(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        callee: &RefIdx,
    ) -> Option<Type> {
        match &cir[callee].kind {
            Kind::Function {
                generics,
                args: slots,
                return_type,
                ..
            } => {
                let return_type = return_type.as_ref()?;
                let return_type = self.annotation(cir, return_type)?;

                if generics.is_empty() {
                    return Some(return_type);
                }

                // a generic callee's return annotation mentions its type
                // parameters; the call site says what they are
                let bindings = self.call_site_bindings(cir, node, generics, slots);

                match return_type.substitute(&bindings) {
                    Ok(ty) => Some(ty),
                    // an unbound parameter is reported during
                    // monomorphization, with the instantiation in hand
                    Err(_) => Some(return_type),
                }
            }
            // calls through function-valued bindings and slots
            _ => match self.follow(cir, callee)? {
                Type::Function(_, return_type) => return_type.map(|ty| *ty),
                other => {
                    self.errs.push(
                        Error::new(ErrKind::TypeChecker)
                            .with_msg(format!("cannot call a value of type `{other}`"))
                            .with_loc(Some(node.data.ast.location().clone())),
                    );

                    None
                }
            },
        }
    }

    /// What each of a generic callee's parameters stands for at one call
    /// site: explicit type arguments when written, the supplied arguments
    /// unified against the declared ones otherwise
    fn call_site_bindings(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        params: &[RefIdx],
        slots: &[RefIdx],
    ) -> HashMap<OriginIdx, Type> {
        let (explicit, supplied) = match &node.kind {
            Kind::Call { generics, args, .. } => (generics.clone(), args.clone()),
            _ => (vec![], vec![]),
        };

        let mut bindings = HashMap::new();

        if !explicit.is_empty() {
            for (param, annotation) in params.iter().zip(&explicit) {
                if let Some(ty) = self.annotation(cir, annotation) {
                    bindings.insert(param.expect_resolved(), ty);
                }
            }

            return bindings;
        }

        for (slot, arg) in slots.to_vec().iter().zip(&supplied) {
            let declared = self.follow(cir, slot);
            let actual = self.follow(cir, arg);

            if let (Some(declared), Some(actual)) = (declared, actual) {
                // a nullable argument may flow into a non-nullable slot;
                // the nullability pass checks it was narrowed first
                let actual = match &declared {
                    Type::Nullable(_) => actual,
                    _ => actual.narrowed().clone(),
                };

                types::unify(&declared, &actual, &mut bindings);
            }
        }

        bindings
    }

    fn compute(&mut self, cir: &Cir<FlattenData<'_>>, node: &Node<FlattenData<'_>>) -> Option<Type> {
        // typing facts recorded by the typer take precedence
        if let Some(variable) = self.variables.get(&node.origin).cloned() {
            return self.from_variable(cir, node, variable);
        }

        match &node.kind {
            Kind::TypeReference { .. }
            | Kind::ArrayType { .. }
            | Kind::SequenceType { .. }
            | Kind::NullableType { .. }
            | Kind::FunctionType { .. } => {
                self.annotation(cir, &RefIdx::Resolved(node.origin))
            }
            Kind::Binding { value, ty } => match ty {
                Some(ty) => self.annotation(cir, ty),
                None => self.follow(cir, value),
            },
            // a function used as a value has a function type
            Kind::Function {
                args, return_type, ..
            } => {
                let args = args
                    .iter()
                    .map(|arg| self.follow(cir, arg))
                    .collect::<Option<Vec<Type>>>()?;
                let return_type = match return_type {
                    Some(ty) => Some(Box::new(self.follow(cir, ty)?)),
                    None => None,
                };

                Some(Type::Function(args, return_type))
            }
            Kind::Instantiation {
                to,
                generics,
                fields,
            } => {
                let target = &cir[to];
                // type declarations always carry a name
                let decl = DeclId {
                    origin: target.origin,
                    name: target.data.ast.symbol().unwrap(),
                };

                match &target.kind {
                    Kind::Generic { .. } => Some(Type::Parameter(decl)),
                    Kind::RecordType {
                        generics: params,
                        fields: slots,
                        ..
                    } if generics.is_empty() && !params.is_empty() => {
                        // `Pair(1, 2)` - the field values say what the
                        // parameters are
                        let params = params.clone();
                        let slots = slots.clone();
                        let fields = fields.clone();

                        let mut bindings = HashMap::new();

                        for (slot, field) in slots.iter().zip(&fields) {
                            let declared = self.follow(cir, slot);
                            let actual = self.follow(cir, field);

                            if let (Some(declared), Some(actual)) = (declared, actual) {
                                let actual = match &declared {
                                    Type::Nullable(_) => actual,
                                    _ => actual.narrowed().clone(),
                                };

                                types::unify(&declared, &actual, &mut bindings);
                            }
                        }

                        let args = params
                            .iter()
                            .map(|param| bindings.get(&param.expect_resolved()).cloned())
                            .collect::<Option<Vec<Type>>>();

                        match args {
                            Some(args) => Some(Type::Record(decl, args)),
                            None => {
                                self.errs.push(
                                    Error::new(ErrKind::Generics)
                                        .with_msg(format!(
                                            "cannot infer the type arguments of `{}` from this instantiation",
                                            decl.name
                                        ))
                                        .with_loc(Some(node.data.ast.location().clone()))
                                        .with_hint(Error::hint().with_msg(String::from(
                                            "spell them out: `Pair[int](...)`",
                                        ))),
                                );

                                None
                            }
                        }
                    }
                    _ => {
                        let args = generics
                            .iter()
                            .map(|arg| self.annotation(cir, arg))
                            .collect::<Option<Vec<Type>>>()?;

                        Some(Type::Record(decl, args))
                    }
                }
            }
            Kind::FieldAccess { instance } => self.field_access(cir, node, instance),
            // a block has a type when its last statement is a value-carrying
            // return, which is how expression blocks flatten
            Kind::Statements(stmts) => {
                let last = stmts.last()?;

                match &cir[last].kind {
                    Kind::Return(Some(_)) => self.follow(cir, last),
                    _ => None,
                }
            }
            // both branches must agree, which the checker verifies; the
            // conditional shares the true branch's type
            Kind::Conditional { true_block, .. } => self.follow(cir, true_block),
            Kind::Return(expr) => self.follow(cir, expr.as_ref()?),
            Kind::Index { container, .. } => {
                self.follow(cir, container)?.narrowed().element().cloned()
            }
            Kind::SequenceLiteral { elements } => match elements.first() {
                Some(first) => {
                    let first = self.follow(cir, first)?;

                    Some(Type::Sequence(Box::new(first)))
                }
                // an empty literal outside a binding has no element type to
                // take; inside one, the typer made it contextual
                None => {
                    self.errs.push(cannot_infer(node));
                    None
                }
            },
            Kind::Default => {
                self.errs.push(cannot_infer(node));
                None
            }
            // declarations and the remaining statements are void
            _ => None,
        }
    }

    fn field_access(
        &mut self,
        cir: &Cir<FlattenData<'_>>,
        node: &Node<FlattenData<'_>>,
        instance: &RefIdx,
    ) -> Option<Type> {
        // a narrowed nullable instance exposes the inner class's fields
        let instance_ty = self.follow(cir, instance)?;

        let (decl, args) = match instance_ty.narrowed() {
            Type::Record(decl, args) => (decl, args),
            other => {
                self.errs.push(
                    Error::new(ErrKind::TypeChecker)
                        .with_msg(format!("no fields on a value of type `{other}`"))
                        .with_loc(Some(node.data.ast.location().clone())),
                );

                return None;
            }
        };

        let (generics, fields) = match &cir[&decl.origin].kind {
            Kind::RecordType {
                generics, fields, ..
            } => (generics, fields),
            _ => unreachable!("record type resolved to a non-class declaration. this is an interpreter error"),
        };

        // field accesses always carry the field's name
        let field_name = node.data.ast.symbol().unwrap();

        let field = fields
            .iter()
            .find(|field| cir[*field].data.ast.symbol() == Some(field_name));

        let field = match field {
            Some(field) => field,
            None => {
                self.errs.push(
                    Error::new(ErrKind::TypeChecker)
                        .with_msg(format!(
                            "no field `{field_name}` on class `{}`",
                            decl.name
                        ))
                        .with_loc(Some(node.data.ast.location().clone())),
                );

                return None;
            }
        };

        let field_ty = self.follow(cir, field)?;

        // before monomorphization, a generic class leaves its parameters in
        // the field's type; the instance's arguments fill them in
        let bindings = generics
            .iter()
            .map(RefIdx::expect_resolved)
            .zip(args.iter().cloned())
            .collect::<HashMap<OriginIdx, Type>>();

        match field_ty.substitute(&bindings) {
            Ok(ty) => Some(ty),
            Err(_) => Some(field_ty),
        }
    }
}
