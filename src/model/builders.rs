//! Construction Helpers for Model Nodes
//!
//! Short constructors for types and terms, plus fluent builders for
//! declarations and functions. The lowering passes synthesise a lot of IR;
//! these helpers keep that code close to the shape of the terms it builds.
//!
//! ## Example
//!
//! ```rust
//! use archetype_ir::model::builders::*;
//!
//! // if contains(ledger, k) then fail("KEY_EXISTS") else skip
//! let k = mvar_local("k", taddress());
//! let guard = mif(
//!     mmap_contains(mvar_storage("ledger", tbig_map(taddress(), tnat())), k),
//!     mfail_str(KEY_EXISTS),
//!     None,
//! );
//! ```

use super::{
    Argument, AssetDecl, AssetField, AssignKind, AssignOp, Ck, EnumCtor, EnumDecl, ForBinder,
    FunctionDef, FunctionKind, Ident, Loc, MapKind, MatchArm, Mnode, Mterm, Pattern, Tnode, Type,
    UpdateItem, VarScope,
};

// ============================================================================
// Runtime failure codes
// ============================================================================

pub const NOT_FOUND: &str = "NOT_FOUND";
pub const ASSET_NOT_FOUND: &str = "ASSET_NOT_FOUND";
pub const KEY_EXISTS: &str = "KEY_EXISTS";
pub const OUT_OF_BOUND: &str = "OUT_OF_BOUND";
pub const INVALID_STATE: &str = "INVALID_STATE";
pub const OPTION_IS_NONE: &str = "OPTION_IS_NONE";
pub const DIV_BY_ZERO: &str = "DIV_BY_ZERO";
pub const NAT_NEG_ASSIGN: &str = "NAT_NEG_ASSIGN";
pub const ENTRY_NOT_FOUND: &str = "ENTRY_NOT_FOUND";
pub const INVALID_CONDITION: &str = "INVALID_CONDITION";

// ============================================================================
// Types
// ============================================================================

pub fn tunit() -> Type {
    Type::new(Tnode::Unit)
}
pub fn tbool() -> Type {
    Type::new(Tnode::Bool)
}
pub fn tint() -> Type {
    Type::new(Tnode::Int)
}
pub fn tnat() -> Type {
    Type::new(Tnode::Nat)
}
pub fn trat() -> Type {
    Type::new(Tnode::Rational)
}
/// The pair encoding a rational after `remove_rational`
pub fn trat_pair() -> Type {
    ttuple(vec![tint(), tnat()])
}
pub fn tstring() -> Type {
    Type::new(Tnode::String)
}
pub fn tbytes() -> Type {
    Type::new(Tnode::Bytes)
}
pub fn taddress() -> Type {
    Type::new(Tnode::Address)
}
pub fn tdate() -> Type {
    Type::new(Tnode::Date)
}
pub fn tduration() -> Type {
    Type::new(Tnode::Duration)
}
pub fn ttimestamp() -> Type {
    Type::new(Tnode::Timestamp)
}
pub fn tcurrency() -> Type {
    Type::new(Tnode::Currency)
}
pub fn tkey() -> Type {
    Type::new(Tnode::Key)
}
pub fn tkeyhash() -> Type {
    Type::new(Tnode::KeyHash)
}
pub fn tsignature() -> Type {
    Type::new(Tnode::Signature)
}
pub fn tchainid() -> Type {
    Type::new(Tnode::ChainId)
}
pub fn toperation() -> Type {
    Type::new(Tnode::Operation)
}
pub fn tstate() -> Type {
    Type::new(Tnode::State)
}
pub fn toption(t: Type) -> Type {
    Type::new(Tnode::Option(Box::new(t)))
}
pub fn tlist(t: Type) -> Type {
    Type::new(Tnode::List(Box::new(t)))
}
pub fn tset(t: Type) -> Type {
    Type::new(Tnode::Set(Box::new(t)))
}
pub fn tmap(k: Type, v: Type) -> Type {
    Type::new(Tnode::Map(Box::new(k), Box::new(v)))
}
pub fn tbig_map(k: Type, v: Type) -> Type {
    Type::new(Tnode::BigMap(Box::new(k), Box::new(v)))
}
pub fn titerable_big_map(k: Type, v: Type) -> Type {
    Type::new(Tnode::IterableBigMap(Box::new(k), Box::new(v)))
}
pub fn tmap_kind(kind: MapKind, k: Type, v: Type) -> Type {
    match kind {
        MapKind::Map => tmap(k, v),
        MapKind::BigMap => tbig_map(k, v),
        MapKind::IterableBigMap => titerable_big_map(k, v),
    }
}
pub fn tor(l: Type, r: Type) -> Type {
    Type::new(Tnode::Or(Box::new(l), Box::new(r)))
}
pub fn tcontract(t: Type) -> Type {
    Type::new(Tnode::Contract(Box::new(t)))
}
pub fn tlambda(a: Type, r: Type) -> Type {
    Type::new(Tnode::Lambda(Box::new(a), Box::new(r)))
}
pub fn ttuple(ts: Vec<Type>) -> Type {
    Type::new(Tnode::Tuple(ts))
}
pub fn tasset(name: impl Into<Ident>) -> Type {
    Type::new(Tnode::Asset(name.into()))
}
pub fn tenum(name: impl Into<Ident>) -> Type {
    Type::new(Tnode::Enum(name.into()))
}
pub fn trecord(name: impl Into<Ident>) -> Type {
    Type::new(Tnode::Record(name.into()))
}
pub fn tcontainer(name: impl Into<Ident>, kind: super::ContainerKind) -> Type {
    Type::new(Tnode::Container(name.into(), kind))
}
pub fn tview(name: impl Into<Ident>) -> Type {
    tcontainer(name, super::ContainerKind::View)
}

// ============================================================================
// Terms: literals
// ============================================================================

pub fn munit() -> Mterm {
    Mterm::synthesised(Mnode::Unit, tunit())
}
pub fn mbool(b: bool) -> Mterm {
    Mterm::synthesised(Mnode::Bool(b), tbool())
}
pub fn mtrue() -> Mterm {
    mbool(true)
}
pub fn mfalse() -> Mterm {
    mbool(false)
}
pub fn mint(v: i128) -> Mterm {
    Mterm::synthesised(Mnode::Int(v), tint())
}
pub fn mnat(v: u128) -> Mterm {
    Mterm::synthesised(Mnode::Nat(v), tnat())
}
pub fn mrational(num: i128, den: u128) -> Mterm {
    Mterm::synthesised(Mnode::Rational(num, den), trat())
}
/// The `(int, nat)` pair a rational lowers to
pub fn mrat_pair(num: i128, den: u128) -> Mterm {
    Mterm::synthesised(
        Mnode::Tuple(vec![mint(num), mnat(den)]),
        trat_pair(),
    )
}
pub fn mstring(s: impl Into<String>) -> Mterm {
    Mterm::synthesised(Mnode::String(s.into()), tstring())
}
pub fn maddress(s: impl Into<String>) -> Mterm {
    Mterm::synthesised(Mnode::Address(s.into()), taddress())
}
pub fn mcurrency(utz: u128) -> Mterm {
    Mterm::synthesised(Mnode::Currency(utz), tcurrency())
}
pub fn mduration(secs: i64) -> Mterm {
    Mterm::synthesised(Mnode::Duration(secs), tduration())
}
pub fn mtimestamp(secs: i64) -> Mterm {
    Mterm::synthesised(Mnode::Timestamp(secs), ttimestamp())
}
pub fn mnone(inner: Type) -> Mterm {
    Mterm::synthesised(Mnode::None_, toption(inner))
}
pub fn msome(v: Mterm) -> Mterm {
    let t = toption(v.type_.clone());
    Mterm::synthesised(Mnode::Some_(Box::new(v)), t)
}
pub fn mtuple(items: Vec<Mterm>) -> Mterm {
    let t = ttuple(items.iter().map(|i| i.type_.clone()).collect());
    Mterm::synthesised(Mnode::Tuple(items), t)
}
pub fn mlit_set(elems: Vec<Mterm>, elem_ty: Type) -> Mterm {
    Mterm::synthesised(Mnode::LitSet(elems), tset(elem_ty))
}
pub fn mlit_list(elems: Vec<Mterm>, elem_ty: Type) -> Mterm {
    Mterm::synthesised(Mnode::LitList(elems), tlist(elem_ty))
}
pub fn mlit_map(entries: Vec<(Mterm, Mterm)>, k: Type, v: Type) -> Mterm {
    Mterm::synthesised(Mnode::LitMap(entries), tmap(k, v))
}
pub fn mlit_big_map(entries: Vec<(Mterm, Mterm)>, k: Type, v: Type) -> Mterm {
    Mterm::synthesised(Mnode::LitMap(entries), tbig_map(k, v))
}

// ============================================================================
// Terms: variables and assignment
// ============================================================================

pub fn mvar(id: impl Into<Ident>, scope: VarScope, ty: Type) -> Mterm {
    Mterm::synthesised(
        Mnode::Var {
            id: id.into(),
            scope,
        },
        ty,
    )
}
pub fn mvar_local(id: impl Into<Ident>, ty: Type) -> Mterm {
    mvar(id, VarScope::Local, ty)
}
pub fn mvar_param(id: impl Into<Ident>, ty: Type) -> Mterm {
    mvar(id, VarScope::Param, ty)
}
pub fn mvar_storage(id: impl Into<Ident>, ty: Type) -> Mterm {
    mvar(id, VarScope::StorageVar, ty)
}
pub fn mvar_storage_col(id: impl Into<Ident>, ty: Type) -> Mterm {
    mvar(id, VarScope::StorageCol, ty)
}

pub fn massign(kind: AssignKind, value: Mterm) -> Mterm {
    Mterm::synthesised(
        Mnode::Assign {
            op: AssignOp::Assign,
            kind,
            value: Box::new(value),
        },
        tunit(),
    )
}
pub fn massign_var(id: impl Into<Ident>, value: Mterm) -> Mterm {
    massign(AssignKind::Var(id.into()), value)
}
pub fn massign_storage(id: impl Into<Ident>, value: Mterm) -> Mterm {
    massign(AssignKind::StorageVar(id.into()), value)
}

pub fn mletin(id: impl Into<Ident>, value: Mterm, body: Mterm) -> Mterm {
    let ty = body.type_.clone();
    Mterm::synthesised(
        Mnode::Letin {
            id: id.into(),
            value: Box::new(value),
            body: Box::new(body),
        },
        ty,
    )
}

// ============================================================================
// Terms: control flow
// ============================================================================

/// Instruction-position `if` (unit-typed)
pub fn mif(cond: Mterm, then_branch: Mterm, else_branch: Option<Mterm>) -> Mterm {
    Mterm::synthesised(
        Mnode::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        },
        tunit(),
    )
}

/// Expression-position `if` (typed by its branches)
pub fn mif_expr(cond: Mterm, then_branch: Mterm, else_branch: Mterm) -> Mterm {
    let ty = then_branch.type_.clone();
    Mterm::synthesised(
        Mnode::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        },
        ty,
    )
}

/// Sequence; typed by its last item, unit when empty
pub fn mseq(items: Vec<Mterm>) -> Mterm {
    let ty = items
        .last()
        .map(|i| i.type_.clone())
        .unwrap_or_else(tunit);
    Mterm::synthesised(Mnode::Seq(items), ty)
}

pub fn mskip() -> Mterm {
    Mterm::skip(Loc::NONE)
}

pub fn mfor(binder: ForBinder, coll: Mterm, body: Mterm) -> Mterm {
    Mterm::synthesised(
        Mnode::For {
            label: None,
            binder,
            coll: Box::new(coll),
            body: Box::new(body),
        },
        tunit(),
    )
}

pub fn miter(id: impl Into<Ident>, from: Mterm, to: Mterm, body: Mterm) -> Mterm {
    Mterm::synthesised(
        Mnode::Iter {
            label: None,
            id: id.into(),
            from: Box::new(from),
            to: Box::new(to),
            body: Box::new(body),
        },
        tunit(),
    )
}

pub fn mwhile(cond: Mterm, body: Mterm) -> Mterm {
    Mterm::synthesised(
        Mnode::While {
            label: None,
            cond: Box::new(cond),
            body: Box::new(body),
        },
        tunit(),
    )
}

pub fn mmatch(expr: Mterm, arms: Vec<MatchArm>, ty: Type) -> Mterm {
    Mterm::synthesised(
        Mnode::Match {
            expr: Box::new(expr),
            arms,
        },
        ty,
    )
}

pub fn marm(pattern: Pattern, body: Mterm) -> MatchArm {
    MatchArm { pattern, body }
}

/// `match opt with | some id -> some_body | none -> none_body`
pub fn mmatch_option(
    expr: Mterm,
    id: impl Into<Ident>,
    some_body: Mterm,
    none_body: Mterm,
) -> Mterm {
    let ty = some_body.type_.clone();
    mmatch(
        expr,
        vec![
            marm(Pattern::Some(id.into()), some_body),
            marm(Pattern::None, none_body),
        ],
        ty,
    )
}

// ============================================================================
// Terms: effects and failures
// ============================================================================

pub fn mfail(v: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Fail(Box::new(v)), tunit())
}
pub fn mfail_str(code: &str) -> Mterm {
    mfail(mstring(code))
}
/// `fail((code, asset))` for asset-specific runtime failures
pub fn mfail_asset(code: &str, asset: &str) -> Mterm {
    mfail(mtuple(vec![mstring(code), mstring(asset)]))
}

// ============================================================================
// Terms: booleans, comparisons, arithmetic
// ============================================================================

pub fn mnot(a: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Not(Box::new(a)), tbool())
}
pub fn mand(a: Mterm, b: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::And(Box::new(a), Box::new(b)), tbool())
}
pub fn mor(a: Mterm, b: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Or(Box::new(a), Box::new(b)), tbool())
}
pub fn meq(a: Mterm, b: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Equal(Box::new(a), Box::new(b)), tbool())
}
pub fn mneq(a: Mterm, b: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Nequal(Box::new(a), Box::new(b)), tbool())
}
pub fn mgt(a: Mterm, b: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Gt(Box::new(a), Box::new(b)), tbool())
}
pub fn mge(a: Mterm, b: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Ge(Box::new(a), Box::new(b)), tbool())
}
pub fn mlt(a: Mterm, b: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Lt(Box::new(a), Box::new(b)), tbool())
}
pub fn mle(a: Mterm, b: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::Le(Box::new(a), Box::new(b)), tbool())
}
pub fn mplus(a: Mterm, b: Mterm, ty: Type) -> Mterm {
    Mterm::synthesised(Mnode::Plus(Box::new(a), Box::new(b)), ty)
}
pub fn mminus(a: Mterm, b: Mterm, ty: Type) -> Mterm {
    Mterm::synthesised(Mnode::Minus(Box::new(a), Box::new(b)), ty)
}
pub fn mmult(a: Mterm, b: Mterm, ty: Type) -> Mterm {
    Mterm::synthesised(Mnode::Mult(Box::new(a), Box::new(b)), ty)
}

// ============================================================================
// Terms: access
// ============================================================================

pub fn mdot(expr: Mterm, field: impl Into<Ident>, ty: Type) -> Mterm {
    Mterm::synthesised(
        Mnode::Dot {
            expr: Box::new(expr),
            field: field.into(),
        },
        ty,
    )
}
pub fn mtuple_access(expr: Mterm, index: usize, arity: usize, ty: Type) -> Mterm {
    Mterm::synthesised(
        Mnode::TupleAccess {
            expr: Box::new(expr),
            index,
            arity,
        },
        ty,
    )
}
pub fn mrec_update(expr: Mterm, fields: Vec<(Ident, Mterm)>) -> Mterm {
    let ty = expr.type_.clone();
    Mterm::synthesised(
        Mnode::RecUpdate {
            expr: Box::new(expr),
            fields,
        },
        ty,
    )
}

// ============================================================================
// Terms: primitive containers
// ============================================================================

pub fn mset_add(set: Mterm, elt: Mterm) -> Mterm {
    let ty = set.type_.clone();
    Mterm::synthesised(Mnode::SetAdd(Box::new(set), Box::new(elt)), ty)
}
pub fn mset_remove(set: Mterm, elt: Mterm) -> Mterm {
    let ty = set.type_.clone();
    Mterm::synthesised(Mnode::SetRemove(Box::new(set), Box::new(elt)), ty)
}
pub fn mset_contains(set: Mterm, elt: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::SetContains(Box::new(set), Box::new(elt)), tbool())
}
pub fn mset_length(set: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::SetLength(Box::new(set)), tnat())
}
pub fn mlist_prepend(list: Mterm, elt: Mterm) -> Mterm {
    let ty = list.type_.clone();
    Mterm::synthesised(Mnode::ListPrepend(Box::new(list), Box::new(elt)), ty)
}
pub fn mlist_reverse(list: Mterm) -> Mterm {
    let ty = list.type_.clone();
    Mterm::synthesised(Mnode::ListReverse(Box::new(list)), ty)
}
pub fn mlist_length(list: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::ListLength(Box::new(list)), tnat())
}
pub fn mlist_nth(list: Mterm, index: Mterm, elem_ty: Type) -> Mterm {
    Mterm::synthesised(
        Mnode::ListNth(Box::new(list), Box::new(index)),
        toption(elem_ty),
    )
}
pub fn mmap_put(map: Mterm, k: Mterm, v: Mterm) -> Mterm {
    let ty = map.type_.clone();
    Mterm::synthesised(Mnode::MapPut(Box::new(map), Box::new(k), Box::new(v)), ty)
}
pub fn mmap_remove(map: Mterm, k: Mterm) -> Mterm {
    let ty = map.type_.clone();
    Mterm::synthesised(Mnode::MapRemove(Box::new(map), Box::new(k)), ty)
}
pub fn mmap_update(map: Mterm, k: Mterm, opt_v: Mterm) -> Mterm {
    let ty = map.type_.clone();
    Mterm::synthesised(
        Mnode::MapUpdate(Box::new(map), Box::new(k), Box::new(opt_v)),
        ty,
    )
}
pub fn mmap_get(map: Mterm, k: Mterm, val_ty: Type) -> Mterm {
    Mterm::synthesised(Mnode::MapGet(Box::new(map), Box::new(k)), val_ty)
}
pub fn mmap_get_opt(map: Mterm, k: Mterm, val_ty: Type) -> Mterm {
    Mterm::synthesised(
        Mnode::MapGetOpt(Box::new(map), Box::new(k)),
        toption(val_ty),
    )
}
pub fn mmap_contains(map: Mterm, k: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::MapContains(Box::new(map), Box::new(k)), tbool())
}
pub fn mmap_length(map: Mterm) -> Mterm {
    Mterm::synthesised(Mnode::MapLength(Box::new(map)), tnat())
}

// ============================================================================
// Update items
// ============================================================================

pub fn uitem(field: impl Into<Ident>, op: AssignOp, value: Mterm) -> UpdateItem {
    UpdateItem {
        field: field.into(),
        op,
        value,
    }
}

// ============================================================================
// Fluent declaration builders
// ============================================================================

/// Builder for [`AssetDecl`], mainly for tests and fixtures
#[derive(Debug, Clone)]
pub struct AssetDeclBuilder {
    decl: AssetDecl,
}

impl AssetDeclBuilder {
    pub fn new(name: impl Into<Ident>) -> Self {
        AssetDeclBuilder {
            decl: AssetDecl {
                name: name.into(),
                keys: Vec::new(),
                sort_fields: Vec::new(),
                fields: Vec::new(),
                init: Vec::new(),
                invariants: Vec::new(),
                state: None,
                map_kind: MapKind::Map,
                loc: Loc::NONE,
            },
        }
    }

    pub fn key(mut self, name: impl Into<Ident>, typ: Type) -> Self {
        let name = name.into();
        self.decl.keys.push(name.clone());
        self.decl.fields.push(AssetField {
            name,
            typ: typ.clone(),
            original_type: typ,
            default: None,
            shadow: false,
            loc: Loc::NONE,
        });
        self
    }

    pub fn field(mut self, name: impl Into<Ident>, typ: Type) -> Self {
        self.decl.fields.push(AssetField {
            name: name.into(),
            typ: typ.clone(),
            original_type: typ,
            default: None,
            shadow: false,
            loc: Loc::NONE,
        });
        self
    }

    pub fn field_with_default(mut self, name: impl Into<Ident>, typ: Type, default: Mterm) -> Self {
        self.decl.fields.push(AssetField {
            name: name.into(),
            typ: typ.clone(),
            original_type: typ,
            default: Some(default),
            shadow: false,
            loc: Loc::NONE,
        });
        self
    }

    pub fn shadow_field(mut self, name: impl Into<Ident>, typ: Type) -> Self {
        self.decl.fields.push(AssetField {
            name: name.into(),
            typ: typ.clone(),
            original_type: typ,
            default: None,
            shadow: true,
            loc: Loc::NONE,
        });
        self
    }

    pub fn sort_field(mut self, name: impl Into<Ident>) -> Self {
        self.decl.sort_fields.push(name.into());
        self
    }

    pub fn init(mut self, value: Mterm) -> Self {
        self.decl.init.push(value);
        self
    }

    pub fn state(mut self, enum_id: impl Into<Ident>) -> Self {
        self.decl.state = Some(enum_id.into());
        self
    }

    pub fn map_kind(mut self, kind: MapKind) -> Self {
        self.decl.map_kind = kind;
        self
    }

    pub fn build(self) -> AssetDecl {
        self.decl
    }
}

/// Builder for [`FunctionDef`]
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    def: FunctionDef,
}

impl FunctionBuilder {
    pub fn entry(name: impl Into<Ident>) -> Self {
        FunctionBuilder {
            def: FunctionDef {
                name: name.into(),
                kind: FunctionKind::Entry,
                args: Vec::new(),
                eargs: Vec::new(),
                body: mskip(),
                stovars: Vec::new(),
                spec: None,
                loc: Loc::NONE,
            },
        }
    }

    pub fn getter(name: impl Into<Ident>, ret: Type) -> Self {
        let mut b = Self::entry(name);
        b.def.kind = FunctionKind::Getter(ret);
        b
    }

    pub fn view(name: impl Into<Ident>, ret: Type, vis: super::ViewVisibility) -> Self {
        let mut b = Self::entry(name);
        b.def.kind = FunctionKind::View(ret, vis);
        b
    }

    pub fn function(name: impl Into<Ident>, ret: Type) -> Self {
        let mut b = Self::entry(name);
        b.def.kind = FunctionKind::Function(ret);
        b
    }

    pub fn arg(mut self, name: impl Into<Ident>, typ: Type) -> Self {
        self.def.args.push(Argument {
            name: name.into(),
            typ,
            default: None,
        });
        self
    }

    pub fn body(mut self, body: Mterm) -> Self {
        self.def.body = body;
        self
    }

    pub fn spec(mut self, spec: super::Specification) -> Self {
        self.def.spec = Some(spec);
        self
    }

    pub fn build(self) -> FunctionDef {
        self.def
    }
}

/// Builder for [`EnumDecl`]
#[derive(Debug, Clone)]
pub struct EnumDeclBuilder {
    decl: EnumDecl,
}

impl EnumDeclBuilder {
    pub fn new(name: impl Into<Ident>) -> Self {
        EnumDeclBuilder {
            decl: EnumDecl {
                name: name.into(),
                ctors: Vec::new(),
                initial: Ident::new(),
                loc: Loc::NONE,
            },
        }
    }

    pub fn ctor(self, name: impl Into<Ident>) -> Self {
        self.ctor_with(name, Vec::new())
    }

    pub fn ctor_with(mut self, name: impl Into<Ident>, args: Vec<Type>) -> Self {
        let name = name.into();
        if self.decl.ctors.is_empty() {
            self.decl.initial = name.clone();
        }
        self.decl.ctors.push(EnumCtor {
            name,
            args,
            invariants: Vec::new(),
            loc: Loc::NONE,
        });
        self
    }

    pub fn build(self) -> EnumDecl {
        self.decl
    }
}

// ============================================================================
// Ck helpers
// ============================================================================

pub fn ck_coll() -> Ck {
    Ck::Coll
}
pub fn ck_view(v: Mterm) -> Ck {
    Ck::View(Box::new(v))
}
pub fn ck_field(asset: impl Into<Ident>, field: impl Into<Ident>, key: Mterm) -> Ck {
    Ck::Field {
        asset: asset.into(),
        field: field.into(),
        key: Box::new(key),
    }
}
