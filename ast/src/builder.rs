//! Very simple Ast builder module, not suitable for general use - this is
//! only for builtin declarations and for tests, where writing the tree out
//! by hand drowns the point of the test in location noise.

use location::SpanTuple;
use symbol::Symbol;

use crate::{
    Ast, Call, Declaration, FunctionKind, GenericArgument, Node, Operator, TypeArgument, TypeKind,
    TypedValue, Value, Visibility,
};

fn ast(node: Node) -> Ast {
    Ast {
        location: SpanTuple::builtin(),
        node,
    }
}

pub fn ty(name: &str) -> TypeArgument {
    generic_ty(name, vec![])
}

pub fn generic_ty(name: &str, generics: Vec<TypeArgument>) -> TypeArgument {
    TypeArgument {
        kind: TypeKind::Named {
            name: Symbol::from(name),
            generics,
        },
        location: SpanTuple::builtin(),
    }
}

pub fn array_ty(element: TypeArgument, size: usize) -> TypeArgument {
    TypeArgument {
        kind: TypeKind::FixedArray {
            element: Box::new(element),
            size,
        },
        location: SpanTuple::builtin(),
    }
}

pub fn sequence_ty(element: TypeArgument) -> TypeArgument {
    TypeArgument {
        kind: TypeKind::Sequence(Box::new(element)),
        location: SpanTuple::builtin(),
    }
}

pub fn nullable_ty(inner: TypeArgument) -> TypeArgument {
    TypeArgument {
        kind: TypeKind::Nullable(Box::new(inner)),
        location: SpanTuple::builtin(),
    }
}

pub fn function_ty(args: Vec<TypeArgument>, return_type: Option<TypeArgument>) -> TypeArgument {
    TypeArgument {
        kind: TypeKind::FunctionLike(args, return_type.map(Box::new)),
        location: SpanTuple::builtin(),
    }
}

pub fn argument(name: &str, ty: TypeArgument) -> TypedValue {
    TypedValue {
        location: SpanTuple::builtin(),
        symbol: Symbol::from(name),
        ty,
    }
}

pub fn generic(name: &str) -> GenericArgument {
    GenericArgument {
        name: Symbol::from(name),
        bound: None,
    }
}

pub fn bounded_generic(name: &str, bound: &str) -> GenericArgument {
    GenericArgument {
        name: Symbol::from(name),
        bound: Some(Symbol::from(bound)),
    }
}

pub fn function(
    name: &str,
    generics: Vec<GenericArgument>,
    args: Vec<TypedValue>,
    return_type: Option<TypeArgument>,
    block: Ast,
) -> Ast {
    ast(Node::Function {
        kind: FunctionKind::Func,
        decl: Declaration {
            name: Symbol::from(name),
            generics,
            args,
            return_type,
            visibility: Visibility::Private,
        },
        block: Some(Box::new(block)),
    })
}

pub fn extern_function(
    name: &str,
    generics: Vec<GenericArgument>,
    args: Vec<TypedValue>,
    return_type: Option<TypeArgument>,
) -> Ast {
    ast(Node::Function {
        kind: FunctionKind::Extern,
        decl: Declaration {
            name: Symbol::from(name),
            generics,
            args,
            return_type,
            visibility: Visibility::Private,
        },
        block: None,
    })
}

pub fn class(
    name: &str,
    generics: Vec<GenericArgument>,
    capabilities: Vec<&str>,
    fields: Vec<TypedValue>,
    methods: Vec<Ast>,
) -> Ast {
    ast(Node::Class {
        name: Symbol::from(name),
        generics,
        capabilities: capabilities.into_iter().map(Symbol::from).collect(),
        fields,
        methods,
        visibility: Visibility::Private,
    })
}

pub fn block(stmts: Vec<Ast>) -> Ast {
    ast(Node::Block {
        stmts,
        last_is_expr: false,
    })
}

/// A block whose last statement is its value
pub fn expr_block(stmts: Vec<Ast>) -> Ast {
    ast(Node::Block {
        stmts,
        last_is_expr: true,
    })
}

pub fn binding(name: &str, value: Ast) -> Ast {
    ast(Node::Binding {
        mutable: false,
        name: Symbol::from(name),
        ty: None,
        value: Box::new(value),
    })
}

pub fn typed_binding(name: &str, ty: TypeArgument, value: Ast) -> Ast {
    ast(Node::Binding {
        mutable: false,
        name: Symbol::from(name),
        ty: Some(ty),
        value: Box::new(value),
    })
}

pub fn mut_binding(name: &str, ty: Option<TypeArgument>, value: Ast) -> Ast {
    ast(Node::Binding {
        mutable: true,
        name: Symbol::from(name),
        ty,
        value: Box::new(value),
    })
}

pub fn assignment(target: Ast, value: Ast) -> Ast {
    ast(Node::Assignment {
        target: Box::new(target),
        value: Box::new(value),
    })
}

pub fn var(name: &str) -> Ast {
    ast(Node::Var(Symbol::from(name)))
}

pub fn call(name: &str, args: Vec<Ast>) -> Ast {
    generic_call(name, vec![], args)
}

pub fn generic_call(name: &str, generics: Vec<TypeArgument>, args: Vec<Ast>) -> Ast {
    ast(Node::FunctionCall(Call {
        to: Symbol::from(name),
        generics,
        args,
    }))
}

pub fn method_call(instance: Ast, name: &str, args: Vec<Ast>) -> Ast {
    ast(Node::MethodCall {
        instance: Box::new(instance),
        call: Call {
            to: Symbol::from(name),
            generics: vec![],
            args,
        },
    })
}

pub fn instantiation(name: &str, generics: Vec<TypeArgument>, fields: Vec<Ast>) -> Ast {
    ast(Node::Instantiation(Call {
        to: Symbol::from(name),
        generics,
        args: fields,
    }))
}

pub fn binary_op(op: Operator, lhs: Ast, rhs: Ast) -> Ast {
    ast(Node::BinaryOp(op, Box::new(lhs), Box::new(rhs)))
}

pub fn field_access(instance: Ast, field: &str) -> Ast {
    ast(Node::FieldAccess(Box::new(instance), Symbol::from(field)))
}

pub fn if_else(condition: Ast, if_block: Ast, else_block: Option<Ast>) -> Ast {
    ast(Node::IfElse {
        condition: Box::new(condition),
        if_block: Box::new(if_block),
        else_block: else_block.map(Box::new),
    })
}

pub fn is_none(value: Ast) -> Ast {
    ast(Node::NullTest {
        value: Box::new(value),
        negated: false,
    })
}

pub fn is_not_none(value: Ast) -> Ast {
    ast(Node::NullTest {
        value: Box::new(value),
        negated: true,
    })
}

pub fn for_loop(index: Option<&str>, value: &str, subject: Ast, block: Ast) -> Ast {
    ast(Node::ForLoop {
        index: index.map(Symbol::from),
        value: Symbol::from(value),
        subject: Box::new(subject),
        block: Box::new(block),
    })
}

pub fn return_value(value: Option<Ast>) -> Ast {
    ast(Node::Return(value.map(Box::new)))
}

pub fn index(container: Ast, idx: Ast) -> Ast {
    ast(Node::Index {
        container: Box::new(container),
        index: Box::new(idx),
    })
}

pub fn sequence(elements: Vec<Ast>) -> Ast {
    ast(Node::SequenceLiteral(elements))
}

pub fn default_init() -> Ast {
    ast(Node::Default)
}

pub fn lambda(args: Vec<TypedValue>, return_type: Option<TypeArgument>, block: Ast) -> Ast {
    ast(Node::Lambda {
        args,
        return_type,
        block: Box::new(block),
    })
}

pub fn int_constant(value: i64) -> Ast {
    ast(Node::Constant(Value::Integer(value)))
}

pub fn float_constant(value: f64) -> Ast {
    ast(Node::Constant(Value::Float(value)))
}

pub fn bool_constant(value: bool) -> Ast {
    ast(Node::Constant(Value::Bool(value)))
}

pub fn char_constant(value: char) -> Ast {
    ast(Node::Constant(Value::Char(value)))
}

pub fn string_constant(value: &str) -> Ast {
    ast(Node::Constant(Value::Str(String::from(value))))
}

pub fn none() -> Ast {
    ast(Node::Constant(Value::None))
}
