//! Abstract Syntax Tree representation of chao source code. The semantic
//! core does not parse: a front-end (or the [`builder`] module, for builtins
//! and tests) hands us one of these trees.

use location::SpanTuple;
use symbol::Symbol;

pub mod builder;

/// The shape of a type annotation
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// A named type, possibly applied to generic arguments: `int`, `T`,
    /// `Pair[int, float]`
    Named {
        name: Symbol,
        generics: Vec<TypeArgument>,
    },
    /// `[T; N]` with a compile-time length
    FixedArray { element: Box<TypeArgument>, size: usize },
    /// `T{}`
    Sequence(Box<TypeArgument>),
    /// `T?`
    Nullable(Box<TypeArgument>),
    /// `func(T, U) -> V`
    FunctionLike(Vec<TypeArgument>, Option<Box<TypeArgument>>),
}

/// A type annotation, i.e. when specifying a variable's type or performing a
/// specific generic call
///
/// ```ignore
/// let a: int = id[int](15)
///
/// let grid: [int; 4] = default
/// let names: string{} = ArrayList()
/// let maybe: int? = None
/// ```
#[derive(Debug, Clone)]
pub struct TypeArgument {
    pub kind: TypeKind,
    pub location: SpanTuple,
}

/// A value with its associated type. This is used for function arguments or
/// class fields
#[derive(Debug, Clone)]
pub struct TypedValue {
    pub location: SpanTuple,
    pub symbol: Symbol,
    pub ty: TypeArgument,
}

/// A type parameter declaration, with an optional capability bound
/// ```ignore
/// //       v
/// func sum[T](values: T{}) -> T where (T: Number) ... end
/// //       ^             bound ^^^^^^^^^^^^^^^^^^
/// ```
#[derive(Debug, Clone)]
pub struct GenericArgument {
    pub name: Symbol,
    pub bound: Option<Symbol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Equals,
    NotEquals,
}

impl Operator {
    /// Source representation of the operator, which is also how desugared
    /// operator calls are named before dispatch
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::LtEq => "<=",
            Operator::GtEq => ">=",
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
        }
    }
}

/// Opaque export marker. Carried through the semantic core untouched; a
/// cross-module visibility pass consumes it elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: Symbol,
    pub generics: Vec<GenericArgument>,
    pub args: Vec<TypedValue>,
    pub return_type: Option<TypeArgument>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Func,
    Extern,
}

/// Common parts of a "call", to a function, method, or a class constructor.
/// This does not differentiate between a function call and an instantiation
/// and does not reflect the differences in syntax.
#[derive(Debug, Clone)]
pub struct Call {
    pub to: Symbol,
    pub generics: Vec<TypeArgument>,
    pub args: Vec<Ast>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Char(char),
    Bool(bool),
    Str(String),
    /// The bare `None` literal
    None,
}

#[derive(Debug, Clone)]
pub enum Node {
    Block {
        stmts: Vec<Ast>,
        last_is_expr: bool,
    },
    Function {
        kind: FunctionKind,
        decl: Declaration,
        block: Option<Box<Ast>>,
    },
    /// A class declaration: `class Pair[L, R] implements ... fields ... methods ... end`
    Class {
        name: Symbol,
        generics: Vec<GenericArgument>,
        capabilities: Vec<Symbol>,
        fields: Vec<TypedValue>,
        methods: Vec<Ast>,
        visibility: Visibility,
    },
    /// Constructing a class value: `Pair[int, float](1, 2.0)`
    Instantiation(Call),
    FunctionCall(Call),
    MethodCall {
        instance: Box<Ast>,
        call: Call,
    },
    BinaryOp(Operator, Box<Ast>, Box<Ast>),
    FieldAccess(Box<Ast>, Symbol),
    IfElse {
        condition: Box<Ast>,
        if_block: Box<Ast>,
        else_block: Option<Box<Ast>>,
    },
    /// Introducing a binding: `let mut x: int? = compute()`
    Binding {
        mutable: bool,
        name: Symbol,
        ty: Option<TypeArgument>,
        value: Box<Ast>,
    },
    /// Writing to an existing target: a variable, an index expression or a
    /// field projection
    Assignment {
        target: Box<Ast>,
        value: Box<Ast>,
    },
    Var(Symbol),
    /// `value is None` when `negated` is false, `value is not None` otherwise
    NullTest {
        value: Box<Ast>,
        negated: bool,
    },
    /// `for i, v in subject ... end`; the index binding is optional
    ForLoop {
        index: Option<Symbol>,
        value: Symbol,
        subject: Box<Ast>,
        block: Box<Ast>,
    },
    Return(Option<Box<Ast>>),
    /// 1-based element access: `subject[idx]`
    Index {
        container: Box<Ast>,
        index: Box<Ast>,
    },
    /// `ArrayList(1, 2, 3)` - a growable sequence from listed elements
    SequenceLiteral(Vec<Ast>),
    /// The `default` initializer. Takes its type from the enclosing binding
    Default,
    Constant(Value),
    /// `function(x: int) -> int return x + 1 end` in argument position
    Lambda {
        args: Vec<TypedValue>,
        return_type: Option<TypeArgument>,
        block: Box<Ast>,
    },
    Empty,
}

/// The [`Ast`] structure is a wrapper around the [`Node`] sum type, which
/// contains extra information such as the node's location
#[derive(Debug, Clone)]
pub struct Ast {
    pub location: SpanTuple,
    pub node: Node,
}
