//! CIR stands for Chao Intermediate Representation. It is the flat form of a
//! chao program that every semantic pass consumes and produces: nodes are
//! scattered (flatly) in an ordered map, and edges between them are indices,
//! resolved or not. Let's take the following chao program:
//!
//! ```ignore
//! func first(s: int{}) -> int
//!     return s[1]
//! end
//!
//! first(numbers)
//! ```
//!
//! Right after flattening, the [`Cir`] looks something like this:
//!
//! ```ignore
//! [
//!   {OriginIdx::1, TypeReference(to: RefIdx::Unresolved, args: [])},     // int
//!   {OriginIdx::2, SequenceType(element: RefIdx::Resolved(1))},          // int{}
//!   {OriginIdx::3, TypedValue(ty: RefIdx::Resolved(2))},                 // s
//!   ...
//!   {OriginIdx::9, Call(to: RefIdx::Unresolved, args: [...])}            // first(numbers)
//! ]
//! ```
//!
//! Name resolution turns the `Unresolved` references into `Resolved` ones:
//! the `int` reference now points at the primitive declaration, the call at
//! the function. Typing does not change the graph's shape at all - it builds
//! a side table from [`OriginIdx`] to canonical types. Monomorphization is
//! the only pass that grows the graph, appending specialized copies of
//! generic declarations and retargeting their uses.
//!
//! Since the representation is flat, the position of a node never matters;
//! only the indices do. Nodes are kept in a [`BTreeMap`] so that iterating a
//! [`Cir`] always happens in creation order, which keeps every pass (and
//! every emitted diagnostic) deterministic.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Index;

use symbol::Symbol;

mod checks;
pub mod iter;

pub use iter::{Fallible, Incomplete, Mapper, Traversal, TreeLike};

/// A reference to another [`Node`] in the [`Cir`]. References start out
/// [`RefIdx::Unresolved`] and get switched to [`RefIdx::Resolved`] by the
/// pass responsible for them: name resolution for most, the typechecker's
/// dispatcher for method calls. A handful never resolve at all - loop
/// variable types live in the type map, not in the graph.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum RefIdx {
    /// An unresolved index into the [`Cir`]. This indicates a step that has
    /// not been done yet
    Unresolved,
    /// A resolved reference to a definition/origin point
    Resolved(OriginIdx),
}

impl RefIdx {
    /// Accessor for passes which run after the reference's resolving pass
    ///
    /// # Panics
    ///
    /// Panics on an [`RefIdx::Unresolved`] reference, which at that point is
    /// an internal error
    pub fn expect_resolved(&self) -> OriginIdx {
        match self {
            RefIdx::Resolved(origin) => *origin,
            RefIdx::Unresolved => unreachable!("unexpected unresolved reference"),
        }
    }
}

/// Each [`Node`] in the [`Cir`] has its own [`OriginIdx`], which is an
/// origin point. This is a bit wasteful since most nodes aren't definitions
/// and instead *refer* to definitions, but it makes it easy to refer to call
/// points or to emit errors.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct OriginIdx(pub u64);

impl OriginIdx {
    /// Get the next origin from an existing one. This allows passes to
    /// simply keep an [`OriginIdx`] in their context and repeatedly call
    /// [`OriginIdx::next`] on it.
    pub fn next(&self) -> OriginIdx {
        OriginIdx(self.0 + 1)
    }
}

/// Helper trait to enable an immutable pattern on the [`Cir`]
trait WithBTreeMap<K: Ord, V> {
    fn with(self, key: K, value: V) -> Self;
}

impl<K: Ord, V> WithBTreeMap<K, V> for BTreeMap<K, V> {
    fn with(mut self, key: K, value: V) -> BTreeMap<K, V> {
        self.insert(key, value);

        self
    }
}

#[derive(Debug, Clone)]
pub enum Kind {
    /// A literal. The value lives in the node's data; the type comes from
    /// the value itself during typing (contextually, for `None`), so the
    /// reference stays unresolved
    Constant(RefIdx),
    /// Use of a type by name: a primitive, a class, or a type parameter,
    /// with explicit type arguments when the target is generic
    TypeReference {
        to: RefIdx,         // to Kind::RecordType | Kind::Generic
        args: Vec<RefIdx>,  // to type annotations
    },
    /// `[T; N]` - the length is part of the annotation
    ArrayType {
        element: RefIdx, // to a type annotation
        size: usize,
    },
    /// `T{}`
    SequenceType {
        element: RefIdx, // to a type annotation
    },
    /// `T?`
    NullableType {
        inner: RefIdx, // to a type annotation
    },
    /// `func(T, U) -> V`
    FunctionType {
        args: Vec<RefIdx>,           // to type annotations
        return_type: Option<RefIdx>, // to a type annotation
    },
    /// A type parameter declaration with an optional capability bound.
    /// Capabilities are not nodes - the resolver knows them by name
    Generic { bound: Option<Symbol> },
    /// A class declaration. Primitives are field-less, method-less record
    /// types declared by the builtins
    RecordType {
        generics: Vec<RefIdx>, // to Kind::Generic
        fields: Vec<RefIdx>,   // to Kind::TypedValue
        methods: Vec<RefIdx>,  // to Kind::Function
        capabilities: Vec<Symbol>,
    },
    /// A named, typed slot: a function argument, a class field, or a loop
    /// variable (whose `ty` stays unresolved until typed from the subject)
    TypedValue {
        ty: RefIdx, // to a type annotation
    },
    /// A function or a lambda - lambdas carry no symbol in their data
    Function {
        generics: Vec<RefIdx>,       // to Kind::Generic
        args: Vec<RefIdx>,           // to Kind::TypedValue
        return_type: Option<RefIdx>, // to a type annotation
        block: Option<RefIdx>,       // to Kind::Statements, None for externs
    },
    /// `let x: T = value`
    Binding {
        value: RefIdx,      // to any expression
        ty: Option<RefIdx>, // to a type annotation
    },
    /// Use of a binding or typed slot by name
    NodeRef(RefIdx), // to Kind::Binding | Kind::TypedValue
    Assignment {
        to: RefIdx,   // to Kind::NodeRef | Kind::Index | Kind::FieldAccess
        from: RefIdx, // to any expression
    },
    /// A class constructor call
    Instantiation {
        to: RefIdx,            // to Kind::RecordType
        generics: Vec<RefIdx>, // to type annotations
        fields: Vec<RefIdx>,   // to any expressions
    },
    Call {
        to: RefIdx,            // to Kind::Function
        generics: Vec<RefIdx>, // to type annotations
        args: Vec<RefIdx>,     // to any expressions
    },
    /// Field projection; the field's name lives in the node's data
    FieldAccess {
        instance: RefIdx, // to any expression
    },
    Statements(Vec<RefIdx>), // to any kind
    Conditional {
        condition: RefIdx,           // to any expression
        true_block: RefIdx,          // to Kind::Statements
        false_block: Option<RefIdx>, // to Kind::Statements
    },
    /// `x is None` (negated: false) or `x is not None` (negated: true)
    NullTest { on: RefIdx, negated: bool },
    /// `for i, v in subject ... end`. The loop variables are [`Kind::TypedValue`]
    /// nodes; their types come from the subject during typing
    ForLoop {
        index: Option<RefIdx>, // to Kind::TypedValue
        value: RefIdx,         // to Kind::TypedValue
        subject: RefIdx,       // to any expression
        block: RefIdx,         // to Kind::Statements
    },
    Return(Option<RefIdx>), // to any expression
    /// 1-based element access
    Index {
        container: RefIdx, // to any expression
        index: RefIdx,     // to any expression
    },
    /// The `default` initializer; typed from the enclosing binding
    Default,
    /// `ArrayList(1, 2, 3)`
    SequenceLiteral {
        elements: Vec<RefIdx>, // to any expressions
    },
}

#[derive(Debug, Clone)]
pub struct Node<T: Debug = ()> {
    pub data: T,
    pub origin: OriginIdx,
    pub kind: Kind,
}

/// An instance of [`Cir`] is similar to a graph, containing [`Node`]s and
/// relationships binding them together.
#[derive(Debug)]
pub struct Cir<T: Debug = ()> {
    pub nodes: BTreeMap<OriginIdx, Node<T>>,
}

// derived `Default` would also require `T: Default`, which node data like
// `FlattenData` does not implement
impl<T: Debug> Default for Cir<T> {
    fn default() -> Cir<T> {
        Cir {
            nodes: BTreeMap::new(),
        }
    }
}

impl<T: Debug> Cir<T> {
    /// Append a new node to the [`Cir`]
    pub fn append(self, node: Node<T>) -> Cir<T> {
        Cir {
            nodes: self.nodes.with(node.origin, node),
        }
    }
}

impl<T: Debug> Index<&OriginIdx> for Cir<T> {
    type Output = Node<T>;

    fn index(&self, index: &OriginIdx) -> &Node<T> {
        &self.nodes[index]
    }
}

impl<T: Debug> Index<&RefIdx> for Cir<T> {
    type Output = Node<T>;

    fn index(&self, index: &RefIdx) -> &Node<T> {
        &self.nodes[&index.expect_resolved()]
    }
}

pub trait Pass<T: Debug, U: Debug, E> {
    /// This function should panic if a condition fails to be upheld
    fn pre_condition(cir: &Cir<T>);

    /// This function should panic if a condition fails to be upheld
    fn post_condition(cir: &Cir<U>);

    /// The actual pass algorithm
    fn transform(&mut self, cir: Cir<T>) -> Result<Cir<U>, E>;

    fn pass(&mut self, cir: Cir<T>) -> Result<Cir<U>, E> {
        Self::pre_condition(&cir);

        let new_cir = self.transform(cir)?;

        Self::post_condition(&new_cir);
        new_cir.check();

        Ok(new_cir)
    }
}
