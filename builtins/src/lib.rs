//! Declarations every program starts from: the primitive type classes, one
//! generic extern per operator, and the generic sequence externs. This crate
//! is also home to the operator table shared by the dispatcher and the
//! runtime boundary, which both need to go from an operator's source
//! spelling to its capability class or its method name.

use ast::{builder, Ast, Node};
use error::Error;

/// Arithmetic operators take two operands of one `Number` type and produce
/// that same type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
}

/// Ordering operators take two operands of one `Ordered` type and produce
/// a `bool`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Gt,
    LtEq,
    GtEq,
}

/// Equality operators take two operands of one `Comparable` type and
/// produce a `bool`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Equality {
    Equals,
    Differs,
}

/// An operator, grouped by the capability class of its operands. Grouping
/// by capability rather than by spelling is what lets the checker and the
/// runtime treat a whole class of operators uniformly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Arithmetic(Arithmetic),
    Comparison(Comparison),
    Equality(Equality),
}

use Arithmetic::*;
use Comparison::*;
use Equality::*;

/// Every operator of the language, in declaration order
pub const OPERATORS: &[Operator] = &[
    Operator::Arithmetic(Add),
    Operator::Arithmetic(Sub),
    Operator::Arithmetic(Mul),
    Operator::Arithmetic(Div),
    Operator::Comparison(Lt),
    Operator::Comparison(Gt),
    Operator::Comparison(LtEq),
    Operator::Comparison(GtEq),
    Operator::Equality(Equals),
    Operator::Equality(Differs),
];

/// Primitive types which must be in scope before any user code runs
pub const PRIMITIVES: &[&str] = &["int", "float", "bool", "char", "string"];

impl Operator {
    /// Operators desugar to calls named after their source spelling, so this
    /// is also how we recover an operator from a call it desugared to
    pub fn try_from_str(s: &str) -> Option<Operator> {
        let op = match s {
            "+" => Operator::Arithmetic(Add),
            "-" => Operator::Arithmetic(Sub),
            "*" => Operator::Arithmetic(Mul),
            "/" => Operator::Arithmetic(Div),
            "<" => Operator::Comparison(Lt),
            ">" => Operator::Comparison(Gt),
            "<=" => Operator::Comparison(LtEq),
            ">=" => Operator::Comparison(GtEq),
            "==" => Operator::Equality(Equals),
            "!=" => Operator::Equality(Differs),
            _ => return None,
        };

        Some(op)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Arithmetic(Add) => "+",
            Operator::Arithmetic(Sub) => "-",
            Operator::Arithmetic(Mul) => "*",
            Operator::Arithmetic(Div) => "/",
            Operator::Comparison(Lt) => "<",
            Operator::Comparison(Gt) => ">",
            Operator::Comparison(LtEq) => "<=",
            Operator::Comparison(GtEq) => ">=",
            Operator::Equality(Equals) => "==",
            Operator::Equality(Differs) => "!=",
        }
    }

    /// Name of the capability an operand type must satisfy. This is the
    /// bound carried by the operator's builtin declaration
    pub fn bound(self) -> &'static str {
        match self {
            Operator::Arithmetic(_) => "Number",
            Operator::Comparison(_) => "Ordered",
            Operator::Equality(_) => "Comparable",
        }
    }

    /// Method a class must define for the operator to apply to its
    /// instances
    pub fn method_name(self) -> &'static str {
        match self {
            Operator::Arithmetic(Add) => "__add__",
            Operator::Arithmetic(Sub) => "__sub__",
            Operator::Arithmetic(Mul) => "__mul__",
            Operator::Arithmetic(Div) => "__div__",
            Operator::Comparison(Lt) => "__lt__",
            Operator::Comparison(Gt) => "__gt__",
            Operator::Comparison(LtEq) => "__le__",
            Operator::Comparison(GtEq) => "__ge__",
            Operator::Equality(Equals) => "__eq__",
            Operator::Equality(Differs) => "__ne__",
        }
    }
}

/// Recover the base name of a possibly-specialized declaration name.
/// Specializations are named `base+arg1+arg2`, so the base is everything
/// before the first `+` - except that operator spellings themselves start
/// with symbols, so they are tried first, longest spelling first.
pub fn demangle(name: &str) -> &str {
    const SPELLINGS: &[&str] = &["<=", ">=", "==", "!=", "+", "-", "*", "/", "<", ">"];

    for spelling in SPELLINGS {
        if let Some(rest) = name.strip_prefix(spelling) {
            if rest.is_empty() || rest.starts_with('+') {
                return spelling;
            }
        }
    }

    name.split_once('+').map_or(name, |(base, _)| base)
}

impl From<ast::Operator> for Operator {
    fn from(op: ast::Operator) -> Operator {
        match op {
            ast::Operator::Add => Operator::Arithmetic(Add),
            ast::Operator::Sub => Operator::Arithmetic(Sub),
            ast::Operator::Mul => Operator::Arithmetic(Mul),
            ast::Operator::Div => Operator::Arithmetic(Div),
            ast::Operator::Lt => Operator::Comparison(Lt),
            ast::Operator::Gt => Operator::Comparison(Gt),
            ast::Operator::LtEq => Operator::Comparison(LtEq),
            ast::Operator::GtEq => Operator::Comparison(GtEq),
            ast::Operator::Equals => Operator::Equality(Equals),
            ast::Operator::NotEquals => Operator::Equality(Differs),
        }
    }
}

/// One bounded generic declaration per operator, so that operator uses go
/// through the same bound checking and specialization as any other generic
/// call
fn operator_declarations() -> impl Iterator<Item = Ast> {
    OPERATORS.iter().map(|op| {
        let return_type = match op {
            Operator::Arithmetic(_) => builder::ty("T"),
            Operator::Comparison(_) | Operator::Equality(_) => builder::ty("bool"),
        };

        builder::extern_function(
            op.as_str(),
            vec![builder::bounded_generic("T", op.bound())],
            vec![
                builder::argument("lhs", builder::ty("T")),
                builder::argument("rhs", builder::ty("T")),
            ],
            Some(return_type),
        )
    })
}

fn sequence_declarations() -> Vec<Ast> {
    vec![
        builder::extern_function(
            "len",
            vec![builder::generic("T")],
            vec![builder::argument(
                "s",
                builder::sequence_ty(builder::ty("T")),
            )],
            Some(builder::ty("int")),
        ),
        builder::extern_function(
            "push",
            vec![builder::generic("T")],
            vec![
                builder::argument("s", builder::sequence_ty(builder::ty("T"))),
                builder::argument("value", builder::ty("T")),
            ],
            None,
        ),
        builder::extern_function(
            "map",
            vec![builder::generic("T"), builder::generic("U")],
            vec![
                builder::argument("s", builder::sequence_ty(builder::ty("T"))),
                builder::argument(
                    "f",
                    builder::function_ty(vec![builder::ty("T")], Some(builder::ty("U"))),
                ),
            ],
            Some(builder::sequence_ty(builder::ty("U"))),
        ),
        builder::extern_function(
            "filter",
            vec![builder::generic("T")],
            vec![
                builder::argument("s", builder::sequence_ty(builder::ty("T"))),
                builder::argument(
                    "f",
                    builder::function_ty(vec![builder::ty("T")], Some(builder::ty("bool"))),
                ),
            ],
            Some(builder::sequence_ty(builder::ty("T"))),
        ),
        builder::extern_function(
            "collect",
            vec![builder::generic("T")],
            vec![builder::argument(
                "s",
                builder::sequence_ty(builder::ty("T")),
            )],
            Some(builder::sequence_ty(builder::ty("T"))),
        ),
    ]
}

pub trait AppendAstBuiltins: Sized {
    fn append_builtins(self) -> Result<Self, Error>;
}

impl AppendAstBuiltins for Ast {
    fn append_builtins(self) -> Result<Self, Error> {
        let (stmts, last_is_expr) = match self.node {
            Node::Block {
                stmts,
                last_is_expr,
            } => (stmts, last_is_expr),
            _ => unreachable!("appending builtins to a non-block root. this is an interpreter error"),
        };

        let primitives = PRIMITIVES
            .iter()
            .map(|name| builder::class(name, vec![], vec![], vec![], vec![]));

        // prepend, not append: a program whose last statement is its value
        // has to keep that statement last
        let mut new_stmts: Vec<Ast> = primitives.chain(operator_declarations()).collect();
        new_stmts.extend(sequence_declarations());
        new_stmts.extend(stmts);

        Ok(Ast {
            node: Node::Block {
                stmts: new_stmts,
                last_is_expr,
            },
            ..self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::builder::*;
    use ast::{Declaration, FunctionKind};
    use symbol::Symbol;

    #[test]
    fn operator_spellings_round_trip() {
        OPERATORS
            .iter()
            .for_each(|op| assert_eq!(Operator::try_from_str(op.as_str()), Some(*op)));
    }

    #[test]
    fn unknown_spelling_is_rejected() {
        assert_eq!(Operator::try_from_str("%"), None);
        assert_eq!(Operator::try_from_str(""), None);
    }

    #[test]
    fn demangling_recovers_base_names() {
        assert_eq!(demangle("sum+int"), "sum");
        assert_eq!(demangle("map+int+float"), "map");
        assert_eq!(demangle("push"), "push");
        assert_eq!(demangle("++int"), "+");
        assert_eq!(demangle("<=+float"), "<=");
        assert_eq!(demangle("<"), "<");
    }

    #[test]
    fn last_expression_stays_last() {
        let ast = expr_block(vec![int_constant(15)]);

        let ast = ast.append_builtins().unwrap();

        let (stmts, last_is_expr) = match ast.node {
            Node::Block {
                stmts,
                last_is_expr,
            } => (stmts, last_is_expr),
            _ => unreachable!(),
        };

        assert!(last_is_expr);
        assert!(matches!(
            stmts.last().unwrap().node,
            Node::Constant(ast::Value::Integer(15))
        ));
    }

    #[test]
    fn every_builtin_is_a_declaration() {
        let ast = block(vec![]);

        let ast = ast.append_builtins().unwrap();

        let stmts = match ast.node {
            Node::Block { stmts, .. } => stmts,
            _ => unreachable!(),
        };

        // five primitives, ten operators, five sequence functions
        assert_eq!(stmts.len(), 20);
        stmts.iter().for_each(|stmt| {
            assert!(matches!(
                stmt.node,
                Node::Class { .. } | Node::Function { .. }
            ))
        });
    }

    #[test]
    fn operators_are_bounded_externs() {
        let ast = block(vec![]);

        let ast = ast.append_builtins().unwrap();

        let stmts = match ast.node {
            Node::Block { stmts, .. } => stmts,
            _ => unreachable!(),
        };

        let add = stmts
            .iter()
            .find_map(|stmt| match &stmt.node {
                Node::Function {
                    kind: FunctionKind::Extern,
                    decl: decl @ Declaration { name, .. },
                    ..
                } if *name == Symbol::from("+") => Some(decl),
                _ => None,
            })
            .unwrap();

        assert_eq!(add.generics.len(), 1);
        assert_eq!(add.generics[0].bound, Some(Symbol::from("Number")));
        assert_eq!(add.args.len(), 2);
    }
}
