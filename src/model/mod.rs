//! # Typed Model - Middle-end IR
//!
//! Algebraic definition of the typed, asset-oriented intermediate
//! representation the lowering pipeline operates on: types, terms,
//! declarations, storage, functions, specifications, security and the
//! top-level [`Model`] record.
//!
//! Every term carries its node, its type and a source location. The
//! lowering passes consume and rebuild terms structurally; structural
//! equality, ordering and hashing deliberately ignore source locations so
//! that rewrites can compare subterms without being defeated by position
//! noise.
//!
//! ## Pipeline Position
//!
//! ```text
//! typed model (type checker) -> [passes::* rewrites] -> lowered model (back-end)
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod builders;
pub mod dates;

/// Identifier used throughout the model (asset names, fields, locals, labels)
pub type Ident = String;

// ============================================================================
// Source locations
// ============================================================================

/// Source position attached to every term and declaration.
///
/// `Loc::NONE` marks synthesised nodes (temporaries, lowered constructs).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
}

impl Loc {
    /// Location of synthesised nodes
    pub const NONE: Loc = Loc { line: 0, col: 0 };

    pub fn new(line: u32, col: u32) -> Self {
        Loc { line, col }
    }
}

// ============================================================================
// Types
// ============================================================================

/// Intent tag carried by an asset container type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ContainerKind {
    /// The asset's own top-level collection
    Collection,
    /// Owned child collection: members live and die with the parent
    Partition,
    /// Referenced child collection: members must pre-exist
    Aggregate,
    /// Raw container of asset values
    AssetContainer,
    /// Container of asset keys
    AssetKey,
    /// Container of asset record values
    AssetValue,
    /// Ordered key list derived by select/sort/head/tail
    View,
}

/// Storage representation declared for an asset
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum MapKind {
    Map,
    BigMap,
    IterableBigMap,
}

/// Semantic tag of a type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tnode {
    Unit,
    Bool,
    Int,
    Nat,
    Rational,
    String,
    Bytes,
    Address,
    TxRollupL2Address,
    Date,
    Duration,
    Timestamp,
    Currency,
    Key,
    KeyHash,
    Signature,
    ChainId,
    Bls12381Fr,
    Bls12381G1,
    Bls12381G2,
    Never,
    Chest,
    ChestKey,
    /// `option<T>`
    Option(Box<Type>),
    /// `list<T>`
    List(Box<Type>),
    /// `set<T>`
    Set(Box<Type>),
    /// `map<K, V>`
    Map(Box<Type>, Box<Type>),
    /// `big_map<K, V>`
    BigMap(Box<Type>, Box<Type>),
    /// `iterable_big_map<K, V>` - big map plus insertion-order index
    IterableBigMap(Box<Type>, Box<Type>),
    /// `or<L, R>`
    Or(Box<Type>, Box<Type>),
    /// `contract<T>`
    Contract(Box<Type>),
    /// `ticket<T>`
    Ticket(Box<Type>),
    SaplingState(u32),
    SaplingTransaction(u32),
    /// `lambda<A, R>`
    Lambda(Box<Type>, Box<Type>),
    /// `(T1 * T2 * ...)`
    Tuple(Vec<Type>),
    /// Aggregate-of-asset wrapper: asset name plus intent tag
    Container(Ident, ContainerKind),
    /// `asset<A>`
    Asset(Ident),
    /// `enum<E>`
    Enum(Ident),
    /// `record<R>`
    Record(Ident),
    /// `event<R>`
    Event(Ident),
    State,
    Storage,
    Operation,
    Entry,
}

/// A type: semantic tag plus optional annotation.
///
/// The annotation is an identifier used for structural labeling of sum-type
/// arms (Michelson `%`/`:` annots survive enum lowering through it).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Type {
    pub node: Tnode,
    pub annot: Option<Ident>,
}

impl Type {
    pub fn new(node: Tnode) -> Self {
        Type { node, annot: None }
    }

    pub fn annotated(node: Tnode, annot: impl Into<Ident>) -> Self {
        Type {
            node,
            annot: Some(annot.into()),
        }
    }

    pub fn with_annot(mut self, annot: impl Into<Ident>) -> Self {
        self.annot = Some(annot.into());
        self
    }

    /// Strip the annotation (used when a type moves into a positional slot)
    pub fn without_annot(mut self) -> Self {
        self.annot = None;
        self
    }

    /// Apply `f` to every immediate inner type, preserving the outer tag
    pub fn map_inner(self, f: &mut impl FnMut(Type) -> Type) -> Type {
        let node = match self.node {
            Tnode::Option(t) => Tnode::Option(Box::new(f(*t))),
            Tnode::List(t) => Tnode::List(Box::new(f(*t))),
            Tnode::Set(t) => Tnode::Set(Box::new(f(*t))),
            Tnode::Map(k, v) => Tnode::Map(Box::new(f(*k)), Box::new(f(*v))),
            Tnode::BigMap(k, v) => Tnode::BigMap(Box::new(f(*k)), Box::new(f(*v))),
            Tnode::IterableBigMap(k, v) => {
                Tnode::IterableBigMap(Box::new(f(*k)), Box::new(f(*v)))
            }
            Tnode::Or(l, r) => Tnode::Or(Box::new(f(*l)), Box::new(f(*r))),
            Tnode::Contract(t) => Tnode::Contract(Box::new(f(*t))),
            Tnode::Ticket(t) => Tnode::Ticket(Box::new(f(*t))),
            Tnode::Lambda(a, r) => Tnode::Lambda(Box::new(f(*a)), Box::new(f(*r))),
            Tnode::Tuple(ts) => Tnode::Tuple(ts.into_iter().map(f).collect()),
            other => other,
        };
        Type {
            node,
            annot: self.annot,
        }
    }

    /// Recursively rewrite the whole type bottom-up with `f`
    pub fn rewrite(self, f: &mut impl FnMut(Type) -> Type) -> Type {
        let inner = self.map_inner(&mut |t| t.rewrite(f));
        f(inner)
    }

    /// True if `p` holds on this type or any nested type
    pub fn any(&self, p: &mut impl FnMut(&Type) -> bool) -> bool {
        if p(self) {
            return true;
        }
        match &self.node {
            Tnode::Option(t)
            | Tnode::List(t)
            | Tnode::Set(t)
            | Tnode::Contract(t)
            | Tnode::Ticket(t) => t.any(p),
            Tnode::Map(k, v) | Tnode::BigMap(k, v) | Tnode::IterableBigMap(k, v) => {
                k.any(p) || v.any(p)
            }
            Tnode::Or(l, r) | Tnode::Lambda(l, r) => l.any(p) || r.any(p),
            Tnode::Tuple(ts) => ts.iter().any(|t| t.any(p)),
            _ => false,
        }
    }

    pub fn is_asset(&self) -> bool {
        matches!(self.node, Tnode::Asset(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self.node, Tnode::Container(_, _))
    }

    pub fn as_asset(&self) -> Option<&Ident> {
        match &self.node {
            Tnode::Asset(a) | Tnode::Container(a, _) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Tnode::Unit => write!(f, "unit"),
            Tnode::Bool => write!(f, "bool"),
            Tnode::Int => write!(f, "int"),
            Tnode::Nat => write!(f, "nat"),
            Tnode::Rational => write!(f, "rational"),
            Tnode::String => write!(f, "string"),
            Tnode::Bytes => write!(f, "bytes"),
            Tnode::Address => write!(f, "address"),
            Tnode::TxRollupL2Address => write!(f, "tx_rollup_l2_address"),
            Tnode::Date => write!(f, "date"),
            Tnode::Duration => write!(f, "duration"),
            Tnode::Timestamp => write!(f, "timestamp"),
            Tnode::Currency => write!(f, "tez"),
            Tnode::Key => write!(f, "key"),
            Tnode::KeyHash => write!(f, "key_hash"),
            Tnode::Signature => write!(f, "signature"),
            Tnode::ChainId => write!(f, "chain_id"),
            Tnode::Bls12381Fr => write!(f, "bls12_381_fr"),
            Tnode::Bls12381G1 => write!(f, "bls12_381_g1"),
            Tnode::Bls12381G2 => write!(f, "bls12_381_g2"),
            Tnode::Never => write!(f, "never"),
            Tnode::Chest => write!(f, "chest"),
            Tnode::ChestKey => write!(f, "chest_key"),
            Tnode::Option(t) => write!(f, "option<{t}>"),
            Tnode::List(t) => write!(f, "list<{t}>"),
            Tnode::Set(t) => write!(f, "set<{t}>"),
            Tnode::Map(k, v) => write!(f, "map<{k}, {v}>"),
            Tnode::BigMap(k, v) => write!(f, "big_map<{k}, {v}>"),
            Tnode::IterableBigMap(k, v) => write!(f, "iterable_big_map<{k}, {v}>"),
            Tnode::Or(l, r) => write!(f, "or<{l}, {r}>"),
            Tnode::Contract(t) => write!(f, "contract<{t}>"),
            Tnode::Ticket(t) => write!(f, "ticket<{t}>"),
            Tnode::SaplingState(n) => write!(f, "sapling_state({n})"),
            Tnode::SaplingTransaction(n) => write!(f, "sapling_transaction({n})"),
            Tnode::Lambda(a, r) => write!(f, "lambda<{a}, {r}>"),
            Tnode::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Tnode::Container(a, k) => write!(f, "{k:?}<{a}>"),
            Tnode::Asset(a) => write!(f, "asset<{a}>"),
            Tnode::Enum(e) => write!(f, "enum<{e}>"),
            Tnode::Record(r) => write!(f, "record<{r}>"),
            Tnode::Event(e) => write!(f, "event<{e}>"),
            Tnode::State => write!(f, "state"),
            Tnode::Storage => write!(f, "storage"),
            Tnode::Operation => write!(f, "operation"),
            Tnode::Entry => write!(f, "entry"),
        }
    }
}

// ============================================================================
// Term-level tag enums
// ============================================================================

/// Assignment / update operator
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AssignOp {
    /// `:=`
    Assign,
    /// `+=`
    Plus,
    /// `-=`
    Minus,
    /// `*=`
    Mult,
    /// `/=`
    Div,
    /// `&=`
    And,
    /// `|=`
    Or,
}

/// Comparison operator carried by `ratcmp` and the three-way lowering
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum CmpKind {
    Gt,
    Ge,
    Lt,
    Le,
}

/// Rational arithmetic operator for the `ratarith` primitive
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RatArithOp {
    Plus,
    Minus,
    Mult,
    Div,
}

/// Sort direction for sort criteria
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Resolution scope of a variable reference
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VarScope {
    /// `let`-bound or loop-bound local
    Local,
    /// Function argument
    Param,
    /// Storage variable
    StorageVar,
    /// Storage collection (asset container slot)
    StorageCol,
    /// The contract state variable
    State,
    /// The pending-operations list
    Operations,
}

/// Collection operand of an asset operation.
///
/// Mirrors the three shapes an asset expression can take: the asset's own
/// collection, a derived ordered view, or a container field of one record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Ck {
    /// The asset's whole collection
    Coll,
    /// A materialised view (ordered key list)
    View(Box<Mterm>),
    /// `A[k].f` - container field of the parent record
    Field {
        asset: Ident,
        field: Ident,
        key: Box<Mterm>,
    },
}

/// Assignment target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssignKind {
    /// Local variable
    Var(Ident),
    /// Storage variable
    StorageVar(Ident),
    /// `A[k].f`
    AssetField {
        asset: Ident,
        field: Ident,
        key: Box<Mterm>,
    },
    /// Field of a record lvalue
    RecordField {
        lvalue: Box<Mterm>,
        record: Ident,
        field: Ident,
    },
    /// Slot of a tuple lvalue
    TupleSlot {
        lvalue: Box<Mterm>,
        index: usize,
        arity: usize,
    },
    /// The contract state variable
    State,
    /// `A[k].state` - the state field of one asset record
    AssetState { asset: Ident, key: Box<Mterm> },
    /// The pending-operations list
    Operations,
}

/// Match pattern
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// `| _ ->`
    Wild,
    /// `| v ->` binds the scrutinee whole
    Binding(Ident),
    /// Enum constructor with argument binders
    Const {
        enum_id: Ident,
        ctor: Ident,
        binders: Vec<Ident>,
    },
    /// `| some v ->`
    Some(Ident),
    /// `| none ->`
    None,
    /// `| left l ->`
    Left(Ident),
    /// `| right r ->`
    Right(Ident),
    /// `| hd :: tl ->`
    Cons(Ident, Ident),
    /// `| [] ->`
    Nil,
}

/// One arm of a `match`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Mterm,
}

/// Binder of a `for` loop
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ForBinder {
    /// `for x in c`
    Single(Ident),
    /// `for (k, v) in m`
    KeyValue(Ident, Ident),
}

/// Shape of a `transfer` effect
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    /// `transfer v to a`
    Simple { value: Box<Mterm>, dest: Box<Mterm> },
    /// `transfer v to a call e(arg)`
    Call {
        value: Box<Mterm>,
        dest: Box<Mterm>,
        entry: Ident,
        arg: Box<Mterm>,
    },
    /// `transfer v to entry c(arg)` where `c : contract<T>`
    ToContract {
        value: Box<Mterm>,
        contract: Box<Mterm>,
        arg: Box<Mterm>,
    },
}

/// One `field op value` item of an asset update
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpdateItem {
    pub field: Ident,
    pub op: AssignOp,
    pub value: Mterm,
}

/// In-place container instruction (post `expr_to_instr`)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ContainerInstrOp {
    SetAdd,
    SetRemove,
    ListPrepend,
    MapPut,
    MapRemove,
    MapUpdate,
}

/// Builtin function tag.
///
/// Grouped the way the execution primitives group: plain builtins, crypto,
/// voting, tickets, sapling, BLS, timelock and the numeric casts used by the
/// rational lowering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BuiltinFn {
    Min,
    Max,
    Abs,
    Concat,
    Slice,
    Length,
    IsSome,
    IsNone,
    RequireSome,
    IntToNat,
    Floor,
    Ceil,
    NatToString,
    Pack,
    Unpack,
    SetDelegate,
    // crypto
    Blake2b,
    Sha256,
    Sha512,
    Sha3,
    Keccak,
    KeyToKeyHash,
    CheckSignature,
    // voting
    VotingPower,
    // tickets
    CreateTicket,
    ReadTicket,
    SplitTicket,
    JoinTickets,
    // sapling
    SaplingEmptyState,
    SaplingVerifyUpdate,
    // BLS
    PairingCheck,
    // timelock
    OpenChest,
    // numeric casts used by the rational / date lowering
    NatToInt,
    NatToRat,
    IntToRat,
    IntToDate,
    MutezToNat,
}

impl fmt::Display for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = format!("{self:?}");
        // CamelCase -> snake_case, matching the surface names
        let mut out = String::new();
        for (i, c) in s.chars().enumerate() {
            if c.is_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.extend(c.to_lowercase());
            } else {
                out.push(c);
            }
        }
        write!(f, "{out}")
    }
}

/// Context constant (transaction / chain environment)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ConstKind {
    Now,
    Transferred,
    Caller,
    Balance,
    Source,
    SelfAddress,
    SelfChainId,
    Metadata,
    Level,
    MinBlockTime,
    TotalVotingPower,
}

// ============================================================================
// Terms
// ============================================================================

/// A typed term: node, type, source location.
///
/// Equality, ordering and hashing are structural over `node` and `type_`
/// and ignore `loc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mterm {
    pub node: Mnode,
    pub type_: Type,
    pub loc: Loc,
}

impl Mterm {
    pub fn new(node: Mnode, type_: Type, loc: Loc) -> Self {
        Mterm { node, type_, loc }
    }

    /// Same node and type at a synthesised location
    pub fn synthesised(node: Mnode, type_: Type) -> Self {
        Mterm::new(node, type_, Loc::NONE)
    }

    /// Replace the node, keeping type and location
    pub fn with_node(mut self, node: Mnode) -> Self {
        self.node = node;
        self
    }

    /// Replace the type, keeping node and location
    pub fn with_type(mut self, type_: Type) -> Self {
        self.type_ = type_;
        self
    }

    /// Point a synthesised node at the source position of the construct it
    /// replaces
    pub fn with_loc(mut self, loc: Loc) -> Self {
        self.loc = loc;
        self
    }

    pub fn is_unit_type(&self) -> bool {
        matches!(self.type_.node, Tnode::Unit)
    }

    /// The empty sequence, used as a placeholder after a recorded error
    pub fn skip(loc: Loc) -> Self {
        Mterm::new(Mnode::Seq(Vec::new()), Type::new(Tnode::Unit), loc)
    }
}

impl PartialEq for Mterm {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.type_ == other.type_
    }
}

impl Eq for Mterm {}

impl PartialOrd for Mterm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Mterm {
    fn cmp(&self, other: &Self) -> Ordering {
        self.node
            .cmp(&other.node)
            .then_with(|| self.type_.cmp(&other.type_))
    }
}

impl Hash for Mterm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
        self.type_.hash(state);
    }
}

/// Term node.
///
/// One variant per construct the passes pattern-match on; builtins, crypto
/// and context constants are grouped under tag enums ([`BuiltinFn`],
/// [`ConstKind`]) the way the target VM groups its primitives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mnode {
    // --- bindings -----------------------------------------------------------
    /// `let id = value in body`
    Letin {
        id: Ident,
        value: Box<Mterm>,
        body: Box<Mterm>,
    },
    /// `var id = value` (statement form, removed by `replace_declvar_by_letin`)
    Declvar { id: Ident, value: Box<Mterm> },
    /// `var id ?= value : fail_with` (removed by `remove_decl_var_opt`)
    DeclvarOpt {
        id: Ident,
        value: Box<Mterm>,
        fail_with: Option<Box<Mterm>>,
    },
    /// Variable reference
    Var { id: Ident, scope: VarScope },
    /// Assignment to any lvalue kind
    Assign {
        op: AssignOp,
        kind: AssignKind,
        value: Box<Mterm>,
    },

    // --- control flow -------------------------------------------------------
    If {
        cond: Box<Mterm>,
        then_branch: Box<Mterm>,
        else_branch: Option<Box<Mterm>>,
    },
    Match {
        expr: Box<Mterm>,
        arms: Vec<MatchArm>,
    },
    /// Binary sum elimination produced by enum lowering
    MatchOr {
        expr: Box<Mterm>,
        left_id: Ident,
        left: Box<Mterm>,
        right_id: Ident,
        right: Box<Mterm>,
    },
    For {
        label: Option<Ident>,
        binder: ForBinder,
        coll: Box<Mterm>,
        body: Box<Mterm>,
    },
    /// `iter i from a to b do body`
    Iter {
        label: Option<Ident>,
        id: Ident,
        from: Box<Mterm>,
        to: Box<Mterm>,
        body: Box<Mterm>,
    },
    While {
        label: Option<Ident>,
        cond: Box<Mterm>,
        body: Box<Mterm>,
    },
    Seq(Vec<Mterm>),
    Return(Box<Mterm>),
    /// Free-standing label (removed by `replace_label_by_mark`)
    Label(Ident),
    /// A label scoping the instruction suffix that follows it
    Mark { label: Ident, body: Box<Mterm> },

    // --- effects ------------------------------------------------------------
    Fail(Box<Mterm>),
    /// `fail_some(opt)` - fail with the payload when present
    FailSome(Box<Mterm>),
    Transfer(TransferKind),
    Emit { event: Ident, value: Box<Mterm> },
    /// Raw operation construction
    MkOperation {
        value: Box<Mterm>,
        dest: Box<Mterm>,
        arg: Box<Mterm>,
    },

    /// Call of a contract-internal function
    App { func: Ident, args: Vec<Mterm> },

    // --- entry-point / self / view interop -----------------------------------
    /// `get_entrypoint<T>("%name", addr)`
    Entrypoint {
        arg_type: Type,
        name: Ident,
        addr: Box<Mterm>,
    },
    /// `self.name`
    SelfEntrypoint { name: Ident },
    /// On-chain view call
    CallView {
        ret: Type,
        addr: Box<Mterm>,
        view: Ident,
        arg: Box<Mterm>,
    },

    // --- literals -----------------------------------------------------------
    Unit,
    Bool(bool),
    Int(i128),
    Nat(u128),
    /// Exact ratio literal, numerator / denominator
    Rational(i128, u128),
    String(String),
    /// Hex payload without `0x`
    Bytes(String),
    Address(String),
    /// Mutez amount
    Currency(u128),
    Date(DateTime<Utc>),
    /// Seconds
    Duration(i64),
    /// Seconds since epoch
    Timestamp(i64),
    KeyLit(String),
    KeyHashLit(String),
    SignatureLit(String),
    ChainIdLit(String),
    Tuple(Vec<Mterm>),
    Some_(Box<Mterm>),
    None_,
    Left(Box<Mterm>),
    Right(Box<Mterm>),
    LitSet(Vec<Mterm>),
    LitList(Vec<Mterm>),
    LitMap(Vec<(Mterm, Mterm)>),
    LitRecord(Vec<(Ident, Mterm)>),
    /// Literal asset: field name to value, in declaration order
    LitAsset(Vec<(Ident, Mterm)>),
    /// Collection of literal assets (partition field initialiser)
    Massets(Vec<Mterm>),
    Lambda {
        arg: Ident,
        arg_type: Type,
        body: Box<Mterm>,
    },
    /// Enum constructor application
    EnumVal {
        enum_id: Ident,
        ctor: Ident,
        args: Vec<Mterm>,
    },
    /// Read of the state field of one asset record
    AssetStateVal { asset: Ident, key: Box<Mterm> },

    // --- access and utilities -------------------------------------------------
    /// Record field access
    Dot { expr: Box<Mterm>, field: Ident },
    /// `A[k].f` sugar (removed by `replace_dotassetfield_by_dot`)
    DotAssetField {
        asset: Ident,
        key: Box<Mterm>,
        field: Ident,
    },
    /// `x ?. f` - optional chaining on an option of record
    QuestionOption { expr: Box<Mterm>, field: Ident },
    TupleAccess {
        expr: Box<Mterm>,
        index: usize,
        arity: usize,
    },
    /// Functional record update
    RecUpdate {
        expr: Box<Mterm>,
        fields: Vec<(Ident, Mterm)>,
    },
    /// Pairs a key with a record value into an asset value
    MakeAsset {
        asset: Ident,
        key: Box<Mterm>,
        value: Box<Mterm>,
    },
    /// Coerce an expression into an asset container value
    ToContainer { asset: Ident, src: Box<Mterm> },
    /// Cast; the destination type is the node's own type
    Cast { src: Type, expr: Box<Mterm> },

    // --- booleans, comparisons, arithmetic ------------------------------------
    Not(Box<Mterm>),
    And(Box<Mterm>, Box<Mterm>),
    Or(Box<Mterm>, Box<Mterm>),
    Xor(Box<Mterm>, Box<Mterm>),
    Equal(Box<Mterm>, Box<Mterm>),
    Nequal(Box<Mterm>, Box<Mterm>),
    Gt(Box<Mterm>, Box<Mterm>),
    Ge(Box<Mterm>, Box<Mterm>),
    Lt(Box<Mterm>, Box<Mterm>),
    Le(Box<Mterm>, Box<Mterm>),
    /// Three-way comparison
    Cmp(Box<Mterm>, Box<Mterm>),
    Plus(Box<Mterm>, Box<Mterm>),
    Minus(Box<Mterm>, Box<Mterm>),
    Mult(Box<Mterm>, Box<Mterm>),
    Div(Box<Mterm>, Box<Mterm>),
    Modulo(Box<Mterm>, Box<Mterm>),
    UMinus(Box<Mterm>),
    ShiftLeft(Box<Mterm>, Box<Mterm>),
    ShiftRight(Box<Mterm>, Box<Mterm>),
    /// `c ? a : b` (removed by `remove_ternary_operator`)
    TernaryBool {
        cond: Box<Mterm>,
        then_: Box<Mterm>,
        else_: Box<Mterm>,
    },
    /// `opt ? a : b` on an option scrutinee
    TernaryOption {
        cond: Box<Mterm>,
        then_: Box<Mterm>,
        else_: Box<Mterm>,
    },

    // --- asset API: effects ----------------------------------------------------
    AddAsset { asset: Ident, value: Box<Mterm> },
    /// Unconditional write of a full asset record
    PutSingleAsset { asset: Ident, value: Box<Mterm> },
    RemoveAsset { asset: Ident, key: Box<Mterm> },
    RemoveAll { asset: Ident, ck: Ck },
    RemoveIf {
        asset: Ident,
        ck: Ck,
        pred: Box<Mterm>,
    },
    ClearAsset { asset: Ident, ck: Ck },
    UpdateAsset {
        asset: Ident,
        key: Box<Mterm>,
        updates: Vec<UpdateItem>,
    },
    UpdateAll {
        asset: Ident,
        ck: Ck,
        updates: Vec<UpdateItem>,
    },
    AddUpdate {
        asset: Ident,
        ck: Ck,
        key: Box<Mterm>,
        updates: Vec<UpdateItem>,
    },
    /// Add a child to an aggregate or partition field
    AddField {
        asset: Ident,
        field: Ident,
        key: Box<Mterm>,
        value: Box<Mterm>,
    },
    /// Remove a child from an aggregate or partition field
    RemoveField {
        asset: Ident,
        field: Ident,
        key: Box<Mterm>,
        child_key: Box<Mterm>,
    },
    /// `map_update`-shaped write (rejected on iterable big maps)
    PutRemove {
        asset: Ident,
        ck: Ck,
        key: Box<Mterm>,
        value: Box<Mterm>,
    },

    // --- asset API: expressions -------------------------------------------------
    GetAsset {
        asset: Ident,
        ck: Ck,
        key: Box<Mterm>,
    },
    GetAssetOpt {
        asset: Ident,
        ck: Ck,
        key: Box<Mterm>,
    },
    Select {
        asset: Ident,
        ck: Ck,
        pred: Box<Mterm>,
    },
    Sort {
        asset: Ident,
        ck: Ck,
        criteria: Vec<(Ident, SortDir)>,
    },
    ContainsAsset {
        asset: Ident,
        ck: Ck,
        key: Box<Mterm>,
    },
    Nth {
        asset: Ident,
        ck: Ck,
        index: Box<Mterm>,
    },
    CountAsset { asset: Ident, ck: Ck },
    SumAsset {
        asset: Ident,
        ck: Ck,
        expr: Box<Mterm>,
    },
    Head {
        asset: Ident,
        ck: Ck,
        count: Box<Mterm>,
    },
    Tail {
        asset: Ident,
        ck: Ck,
        count: Box<Mterm>,
    },

    // --- primitive containers: expressions --------------------------------------
    SetAdd(Box<Mterm>, Box<Mterm>),
    SetRemove(Box<Mterm>, Box<Mterm>),
    SetContains(Box<Mterm>, Box<Mterm>),
    SetLength(Box<Mterm>),
    ListPrepend(Box<Mterm>, Box<Mterm>),
    ListConcat(Box<Mterm>, Box<Mterm>),
    ListLength(Box<Mterm>),
    ListContains(Box<Mterm>, Box<Mterm>),
    /// Option-returning positional access
    ListNth(Box<Mterm>, Box<Mterm>),
    ListReverse(Box<Mterm>),
    MapPut(Box<Mterm>, Box<Mterm>, Box<Mterm>),
    MapRemove(Box<Mterm>, Box<Mterm>),
    /// `map_update(m, k, opt_v)`
    MapUpdate(Box<Mterm>, Box<Mterm>, Box<Mterm>),
    /// Failing lookup (lowered to a match by `remove_high_level_model`)
    MapGet(Box<Mterm>, Box<Mterm>),
    MapGetOpt(Box<Mterm>, Box<Mterm>),
    MapContains(Box<Mterm>, Box<Mterm>),
    MapLength(Box<Mterm>),

    // --- primitive containers: in-place instructions -----------------------------
    InstrContainer {
        op: ContainerInstrOp,
        target: AssignKind,
        args: Vec<Mterm>,
    },

    // --- builtins, crypto, context -----------------------------------------------
    Builtin(BuiltinFn, Vec<Mterm>),
    Const(ConstKind),

    // --- rational primitives -------------------------------------------------------
    RatEq(Box<Mterm>, Box<Mterm>),
    RatCmp(CmpKind, Box<Mterm>, Box<Mterm>),
    RatArith(RatArithOp, Box<Mterm>, Box<Mterm>),
    RatUminus(Box<Mterm>),
    /// `rational * tez`
    RatTez(Box<Mterm>, Box<Mterm>),
    /// `rational * duration`
    RatDur(Box<Mterm>, Box<Mterm>),

    // --- formulas ---------------------------------------------------------------
    Forall {
        id: Ident,
        typ: Type,
        coll: Option<Box<Mterm>>,
        body: Box<Mterm>,
    },
    Exists {
        id: Ident,
        typ: Type,
        coll: Option<Box<Mterm>>,
        body: Box<Mterm>,
    },
    Imply(Box<Mterm>, Box<Mterm>),
    Equiv(Box<Mterm>, Box<Mterm>),
    /// Keys of the labeled loop still to be visited
    SetToIterate(Box<Mterm>),
    /// Keys of the labeled loop already visited
    SetIterated(Box<Mterm>),
    EmptyColl,
    Singleton(Box<Mterm>),
    SubsetOf(Box<Mterm>, Box<Mterm>),
    IsEmpty(Box<Mterm>),
    Union(Box<Mterm>, Box<Mterm>),
    Inter(Box<Mterm>, Box<Mterm>),
    Diff(Box<Mterm>, Box<Mterm>),
}

// ============================================================================
// Declarations
// ============================================================================

/// Mutability kind of a variable declaration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VarKind {
    Constant,
    Variable,
}

/// Labeled invariant attached to declarations and loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    pub label: Ident,
    pub formulas: Vec<Mterm>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: Ident,
    pub typ: Type,
    pub kind: VarKind,
    pub default: Option<Mterm>,
    pub invariants: Vec<Invariant>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumCtor {
    pub name: Ident,
    pub args: Vec<Type>,
    pub invariants: Vec<Invariant>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: Ident,
    pub ctors: Vec<EnumCtor>,
    /// Initial constructor (state enums start here)
    pub initial: Ident,
    pub loc: Loc,
}

impl EnumDecl {
    pub fn ctor_index(&self, ctor: &str) -> Option<usize> {
        self.ctors.iter().position(|c| c.name == ctor)
    }

    /// True when every constructor is argument-less
    pub fn is_simple(&self) -> bool {
        self.ctors.iter().all(|c| c.args.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetField {
    pub name: Ident,
    pub typ: Type,
    /// Type as written in the source, before container/enum rewrites
    pub original_type: Type,
    pub default: Option<Mterm>,
    pub shadow: bool,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDecl {
    pub name: Ident,
    /// Primary key field names (flattened to one by `process_multi_keys`)
    pub keys: Vec<Ident>,
    /// Default sort criteria field names
    pub sort_fields: Vec<Ident>,
    pub fields: Vec<AssetField>,
    /// Initial values, literal assets only
    pub init: Vec<Mterm>,
    pub invariants: Vec<Invariant>,
    /// State enum, when declared `with states E`
    pub state: Option<Ident>,
    pub map_kind: MapKind,
    pub loc: Loc,
}

impl AssetDecl {
    pub fn field(&self, name: &str) -> Option<&AssetField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn is_key_field(&self, name: &str) -> bool {
        self.keys.iter().any(|k| k == name)
    }

    /// Non-shadow value fields (everything but the keys)
    pub fn value_fields(&self) -> impl Iterator<Item = &AssetField> {
        self.fields
            .iter()
            .filter(move |f| !self.is_key_field(&f.name) && !f.shadow)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: Ident,
    pub typ: Type,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub name: Ident,
    pub fields: Vec<RecordField>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Var(VarDecl),
    Enum(EnumDecl),
    Asset(AssetDecl),
    Record(RecordDecl),
    Event(RecordDecl),
}

impl Decl {
    pub fn name(&self) -> &Ident {
        match self {
            Decl::Var(d) => &d.name,
            Decl::Enum(d) => &d.name,
            Decl::Asset(d) => &d.name,
            Decl::Record(d) | Decl::Event(d) => &d.name,
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    Var,
    Const,
    Asset(Ident),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageItem {
    pub id: Ident,
    pub kind: StorageKind,
    pub typ: Type,
    pub default: Mterm,
    /// Logical-only item materialised for verification backends
    pub ghost: bool,
    pub loc: Loc,
}

// ============================================================================
// Functions
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ViewVisibility {
    OnChain,
    OffChain,
    OnOrOff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionKind {
    Entry,
    Getter(Type),
    View(Type, ViewVisibility),
    Function(Type),
}

impl FunctionKind {
    pub fn return_type(&self) -> Option<&Type> {
        match self {
            FunctionKind::Entry => None,
            FunctionKind::Getter(t) | FunctionKind::View(t, _) | FunctionKind::Function(t) => {
                Some(t)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: Ident,
    pub typ: Type,
    pub default: Option<Mterm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: Ident,
    pub kind: FunctionKind,
    pub args: Vec<Argument>,
    /// Extra arguments threaded in by whole-program passes
    pub eargs: Vec<Argument>,
    pub body: Mterm,
    /// Storage variables this function reads or writes (`fill_stovars`)
    pub stovars: Vec<Ident>,
    pub spec: Option<Specification>,
    pub loc: Loc,
}

impl FunctionDef {
    pub fn is_entry(&self) -> bool {
        matches!(self.kind, FunctionKind::Entry)
    }
}

// ============================================================================
// Specification and security
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledTerm {
    pub label: Ident,
    pub term: Mterm,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: Ident,
    pub typ: Type,
    pub var: Ident,
    pub body: Mterm,
    pub loc: Loc,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PostMode {
    Post,
    Assert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Postcondition {
    pub name: Ident,
    pub mode: PostMode,
    pub formula: Mterm,
    pub invariants: Vec<Invariant>,
    pub uses: Vec<Ident>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecVariable {
    pub name: Ident,
    pub typ: Type,
    pub default: Option<Mterm>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailSpec {
    pub label: Ident,
    pub fid: Option<Ident>,
    pub arg_type: Type,
    pub formula: Mterm,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Specification {
    pub predicates: Vec<LabeledTerm>,
    pub definitions: Vec<Definition>,
    pub lemmas: Vec<LabeledTerm>,
    pub theorems: Vec<LabeledTerm>,
    /// Shadow variables, materialised as ghost storage
    pub variables: Vec<SpecVariable>,
    pub invariants: Vec<Invariant>,
    /// Shadow effects, spliced into the owning entry body
    pub effects: Vec<Mterm>,
    pub postconditions: Vec<Postcondition>,
    pub fails: Vec<FailSpec>,
    pub loc: Loc,
}

impl Specification {
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
            && self.definitions.is_empty()
            && self.lemmas.is_empty()
            && self.theorems.is_empty()
            && self.variables.is_empty()
            && self.invariants.is_empty()
            && self.effects.is_empty()
            && self.postconditions.is_empty()
            && self.fails.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SecurityAction {
    Entry(Ident),
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SecurityPredicate {
    OnlyByRole {
        action: SecurityAction,
        roles: Vec<Ident>,
    },
    OnlyInEntry {
        action: SecurityAction,
        entries: Vec<Ident>,
    },
    NotByRole {
        action: SecurityAction,
        roles: Vec<Ident>,
    },
    NotInEntry {
        action: SecurityAction,
        entries: Vec<Ident>,
    },
    TransferredBy { action: SecurityAction },
    TransferredTo { action: SecurityAction },
    NoStorageFail { action: SecurityAction },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityItem {
    pub label: Ident,
    pub predicate: SecurityPredicate,
    pub loc: Loc,
}

// ============================================================================
// API items
// ============================================================================

/// Which collection shape a helper operates on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ApiContainer {
    Coll,
    View,
}

/// Required storage helper operation, recorded by the lowering passes and
/// canonicalised by `filter_api_storage`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApiStorage {
    Get(Ident),
    Set(Ident),
    Add(Ident),
    Remove(Ident),
    Clear(Ident, ApiContainer),
    Update(Ident),
    FieldAdd(Ident, Ident),
    FieldRemove(Ident, Ident),
    RemoveAll(Ident, Ident),
    RemoveIf(Ident, ApiContainer),
    Contains(Ident, ApiContainer),
    Nth(Ident, ApiContainer),
    Select(Ident, ApiContainer),
    Sort(Ident, ApiContainer),
    Count(Ident, ApiContainer),
    Sum(Ident, ApiContainer),
    Head(Ident, ApiContainer),
    Tail(Ident, ApiContainer),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApiItem {
    pub node: ApiStorage,
    /// Required by specification formulas only
    pub only_formula: bool,
}

// ============================================================================
// Model
// ============================================================================

/// Contract metadata channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataKind {
    /// Off-chain pointer
    Uri(String),
    /// JSON embedded under the `here` key
    Json(serde_json::Value),
    /// Deployment-parameter-driven value
    Parameter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Ident,
    pub typ: Type,
    pub default: Option<Mterm>,
    pub constant: bool,
    pub loc: Loc,
}

/// Top-level model record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: Ident,
    pub parameters: Vec<Parameter>,
    pub metadata: Option<MetadataKind>,
    pub decls: Vec<Decl>,
    pub storage: Vec<StorageItem>,
    pub functions: Vec<FunctionDef>,
    pub api_items: Vec<ApiItem>,
    pub api_verif: Vec<ApiItem>,
    pub specification: Specification,
    pub security: Vec<SecurityItem>,
    /// Free-form flags set by whole-program passes
    pub extra: BTreeMap<Ident, String>,
    pub loc: Loc,
}

impl Model {
    pub fn new(name: impl Into<Ident>) -> Self {
        Model {
            name: name.into(),
            parameters: Vec::new(),
            metadata: None,
            decls: Vec::new(),
            storage: Vec::new(),
            functions: Vec::new(),
            api_items: Vec::new(),
            api_verif: Vec::new(),
            specification: Specification::default(),
            security: Vec::new(),
            extra: BTreeMap::new(),
            loc: Loc::NONE,
        }
    }
}
