use std::fmt::{Display, Formatter, Result as FmtResult};

use ast::Node as AstNode;
use cir::{Kind, Mapper, Node, OriginIdx, RefIdx};
use error::Error;
use flatten::{AstInfo, FlattenData};
use location::SpanTuple;
use symbol::Symbol;

use crate::{NameResolutionError, NameResolveCtx, Scope};

#[derive(Clone, Copy)]
pub(crate) enum ResolveKind {
    Call,
    Type,
    Var,
}

impl Display for ResolveKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ResolveKind::Call => write!(f, "call"),
            ResolveKind::Type => write!(f, "type"),
            ResolveKind::Var => write!(f, "binding"),
        }
    }
}

pub(crate) struct Resolver<'ctx>(pub(crate) &'ctx NameResolveCtx);

impl<'ctx> Resolver<'ctx> {
    fn scope(&self, origin: OriginIdx) -> Scope {
        // the scoper visits every node, or this is an interpreter error
        self.0.enclosing_scope[&origin]
    }

    fn get_definition(
        &self,
        kind: ResolveKind,
        sym: &Symbol,
        location: &SpanTuple,
        scope: Scope,
    ) -> Result<OriginIdx, NameResolutionError> {
        let mappings = &self.0.mappings;
        let map = match kind {
            ResolveKind::Call => &mappings.functions,
            ResolveKind::Type => &mappings.types,
            ResolveKind::Var => &mappings.bindings,
        };

        map.lookup(sym, scope, &self.0.enclosing_scope).map_or_else(
            || Err(NameResolutionError::unresolved(kind, mappings, sym, location)),
            |def| Ok(*def),
        )
    }
}

impl<'ast, 'ctx> Mapper<FlattenData<'ast>, FlattenData<'ast>, NameResolutionError>
    for Resolver<'ctx>
{
    fn map_data(&mut self, data: FlattenData<'ast>) -> FlattenData<'ast> {
        data
    }

    fn map_call(
        &mut self,
        data: FlattenData<'ast>,
        origin: OriginIdx,
        to: RefIdx,
        generics: Vec<RefIdx>,
        args: Vec<RefIdx>,
    ) -> Result<Node<FlattenData<'ast>>, NameResolutionError> {
        let is_method_call = matches!(
            &data.ast,
            AstInfo::Node(ast::Ast {
                node: AstNode::MethodCall { .. },
                ..
            })
        );

        // calls always name their target, or this is an interpreter error
        let sym = data.ast.symbol().unwrap();

        let location = data.ast.location();
        let scope = self.scope(origin);

        let definition = self.get_definition(ResolveKind::Call, &sym, location, scope);

        let to = match (definition, is_method_call) {
            (Ok(definition), _) => RefIdx::Resolved(definition),
            // a method call with no matching free function is resolved by the
            // typechecker's dispatcher, once the receiver's type is known
            (Err(_), true) => to,
            // a plain call can also go through a function-valued binding:
            // `let f = state_machine(); f(input)`
            (Err(err), false) => match self.get_definition(ResolveKind::Var, &sym, location, scope)
            {
                Ok(definition) => RefIdx::Resolved(definition),
                Err(_) => return Err(err),
            },
        };

        Ok(Node {
            data,
            origin,
            kind: Kind::Call { to, generics, args },
        })
    }

    fn map_node_ref(
        &mut self,
        data: FlattenData<'ast>,
        origin: OriginIdx,
        _to: RefIdx,
    ) -> Result<Node<FlattenData<'ast>>, NameResolutionError> {
        // variable uses always carry their name
        let sym = data.ast.symbol().unwrap();
        let location = data.ast.location();
        let scope = self.scope(origin);

        let definition = self
            .get_definition(ResolveKind::Var, &sym, location, scope)
            // a bare function name is a value too: `map(values, double)`
            .or_else(|unresolved| {
                self.get_definition(ResolveKind::Call, &sym, location, scope)
                    .map_err(|_| unresolved)
            });

        match definition {
            Ok(definition) => Ok(Node {
                data,
                origin,
                kind: Kind::NodeRef(RefIdx::Resolved(definition)),
            }),
            Err(err) => {
                let err = match self.get_definition(ResolveKind::Type, &sym, location, scope) {
                    Ok(_) => NameResolutionError(err.0.with_hint(
                        Error::hint().with_msg(format!("`{sym}` is a type, which is not a value")),
                    )),
                    Err(_) => err,
                };

                Err(err)
            }
        }
    }

    fn map_type_reference(
        &mut self,
        data: FlattenData<'ast>,
        origin: OriginIdx,
        _to: RefIdx,
        args: Vec<RefIdx>,
    ) -> Result<Node<FlattenData<'ast>>, NameResolutionError> {
        // type references always carry the name they reference
        let sym = data.ast.symbol().unwrap();

        let definition = self.get_definition(
            ResolveKind::Type,
            &sym,
            data.ast.location(),
            self.scope(origin),
        )?;

        Ok(Node {
            data,
            origin,
            kind: Kind::TypeReference {
                to: RefIdx::Resolved(definition),
                args,
            },
        })
    }

    fn map_instantiation(
        &mut self,
        data: FlattenData<'ast>,
        origin: OriginIdx,
        _to: RefIdx,
        generics: Vec<RefIdx>,
        fields: Vec<RefIdx>,
    ) -> Result<Node<FlattenData<'ast>>, NameResolutionError> {
        // instantiations always name the type they build
        let sym = data.ast.symbol().unwrap();

        let definition = self.get_definition(
            ResolveKind::Type,
            &sym,
            data.ast.location(),
            self.scope(origin),
        )?;

        Ok(Node {
            data,
            origin,
            kind: Kind::Instantiation {
                to: RefIdx::Resolved(definition),
                generics,
                fields,
            },
        })
    }
}
