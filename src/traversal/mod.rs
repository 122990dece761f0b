//! # Traversal Kit
//!
//! Generic recursion combinators over terms and models:
//!
//! - [`map_term`] applies a function to every immediate subterm while
//!   preserving the parent constructor and type
//! - [`fold_term`] folds over immediate subterms left-to-right
//! - [`fold_map_term`] rebuilds the node while threading an accumulator
//! - [`map_model_terms`] walks every term position of a model under a
//!   [`Ctx`] describing the enclosing function, label, spec and invariant
//!
//! These operators visit every term a model carries exactly once per pass;
//! most rewrites rely on that exhaustiveness. The matches below are
//! deliberately complete with no wildcard arm over node kinds, so adding a
//! term variant fails compilation here first.

use crate::model::{
    AssignKind, Ck, Decl, FunctionKind, Ident, MatchArm, Mnode, Mterm, Model, Specification,
    TransferKind, Type, UpdateItem,
};

// ============================================================================
// Context
// ============================================================================

/// Enclosing function info threaded through a model walk
#[derive(Debug, Clone, PartialEq)]
pub struct CtxFun {
    pub name: Ident,
    pub kind: FunctionKind,
}

/// Walk context: where in the model the current term position lives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ctx {
    pub fun: Option<CtxFun>,
    /// Label of the nearest enclosing labeled construct
    pub label: Option<Ident>,
    /// Specification element being walked
    pub spec_id: Option<Ident>,
    /// Invariant label being walked
    pub invariant_id: Option<Ident>,
    /// Label of the nearest enclosing loop
    pub loop_id: Option<Ident>,
}

impl Ctx {
    pub fn in_fun(name: &Ident, kind: &FunctionKind) -> Self {
        Ctx {
            fun: Some(CtxFun {
                name: name.clone(),
                kind: kind.clone(),
            }),
            ..Ctx::default()
        }
    }

    pub fn with_spec(mut self, id: &Ident) -> Self {
        self.spec_id = Some(id.clone());
        self
    }

    pub fn with_invariant(mut self, id: &Ident) -> Self {
        self.invariant_id = Some(id.clone());
        self
    }
}

// ============================================================================
// Shared sub-structure mappers
// ============================================================================

fn map_ck(ck: Ck, f: &mut impl FnMut(Mterm) -> Mterm) -> Ck {
    match ck {
        Ck::Coll => Ck::Coll,
        Ck::View(v) => Ck::View(Box::new(f(*v))),
        Ck::Field { asset, field, key } => Ck::Field {
            asset,
            field,
            key: Box::new(f(*key)),
        },
    }
}

fn map_assign_kind(kind: AssignKind, f: &mut impl FnMut(Mterm) -> Mterm) -> AssignKind {
    match kind {
        AssignKind::Var(id) => AssignKind::Var(id),
        AssignKind::StorageVar(id) => AssignKind::StorageVar(id),
        AssignKind::AssetField { asset, field, key } => AssignKind::AssetField {
            asset,
            field,
            key: Box::new(f(*key)),
        },
        AssignKind::RecordField {
            lvalue,
            record,
            field,
        } => AssignKind::RecordField {
            lvalue: Box::new(f(*lvalue)),
            record,
            field,
        },
        AssignKind::TupleSlot {
            lvalue,
            index,
            arity,
        } => AssignKind::TupleSlot {
            lvalue: Box::new(f(*lvalue)),
            index,
            arity,
        },
        AssignKind::State => AssignKind::State,
        AssignKind::AssetState { asset, key } => AssignKind::AssetState {
            asset,
            key: Box::new(f(*key)),
        },
        AssignKind::Operations => AssignKind::Operations,
    }
}

fn map_updates(updates: Vec<UpdateItem>, f: &mut impl FnMut(Mterm) -> Mterm) -> Vec<UpdateItem> {
    updates
        .into_iter()
        .map(|u| UpdateItem {
            field: u.field,
            op: u.op,
            value: f(u.value),
        })
        .collect()
}

fn map_transfer(tk: TransferKind, f: &mut impl FnMut(Mterm) -> Mterm) -> TransferKind {
    match tk {
        TransferKind::Simple { value, dest } => TransferKind::Simple {
            value: Box::new(f(*value)),
            dest: Box::new(f(*dest)),
        },
        TransferKind::Call {
            value,
            dest,
            entry,
            arg,
        } => TransferKind::Call {
            value: Box::new(f(*value)),
            dest: Box::new(f(*dest)),
            entry,
            arg: Box::new(f(*arg)),
        },
        TransferKind::ToContract {
            value,
            contract,
            arg,
        } => TransferKind::ToContract {
            value: Box::new(f(*value)),
            contract: Box::new(f(*contract)),
            arg: Box::new(f(*arg)),
        },
    }
}

// ============================================================================
// map_term
// ============================================================================

/// Apply `f` to every immediate subterm of `mt`, preserving the parent node
/// constructor, type and location.
pub fn map_term(mt: Mterm, f: &mut impl FnMut(Mterm) -> Mterm) -> Mterm {
    map_term_with_types(mt, f, &mut |t| t)
}

/// [`map_term`] with a type transformer `ft` applied to the node's own type
/// and to every type the node carries directly.
pub fn map_term_with_types(
    mt: Mterm,
    f: &mut impl FnMut(Mterm) -> Mterm,
    ft: &mut impl FnMut(Type) -> Type,
) -> Mterm {
    let Mterm { node, type_, loc } = mt;
    let node = match node {
        // bindings
        Mnode::Letin { id, value, body } => Mnode::Letin {
            id,
            value: Box::new(f(*value)),
            body: Box::new(f(*body)),
        },
        Mnode::Declvar { id, value } => Mnode::Declvar {
            id,
            value: Box::new(f(*value)),
        },
        Mnode::DeclvarOpt {
            id,
            value,
            fail_with,
        } => Mnode::DeclvarOpt {
            id,
            value: Box::new(f(*value)),
            fail_with: fail_with.map(|e| Box::new(f(*e))),
        },
        n @ Mnode::Var { .. } => n,
        Mnode::Assign { op, kind, value } => Mnode::Assign {
            op,
            kind: map_assign_kind(kind, f),
            value: Box::new(f(*value)),
        },

        // control flow
        Mnode::If {
            cond,
            then_branch,
            else_branch,
        } => Mnode::If {
            cond: Box::new(f(*cond)),
            then_branch: Box::new(f(*then_branch)),
            else_branch: else_branch.map(|e| Box::new(f(*e))),
        },
        Mnode::Match { expr, arms } => Mnode::Match {
            expr: Box::new(f(*expr)),
            arms: arms
                .into_iter()
                .map(|a| MatchArm {
                    pattern: a.pattern,
                    body: f(a.body),
                })
                .collect(),
        },
        Mnode::MatchOr {
            expr,
            left_id,
            left,
            right_id,
            right,
        } => Mnode::MatchOr {
            expr: Box::new(f(*expr)),
            left_id,
            left: Box::new(f(*left)),
            right_id,
            right: Box::new(f(*right)),
        },
        Mnode::For {
            label,
            binder,
            coll,
            body,
        } => Mnode::For {
            label,
            binder,
            coll: Box::new(f(*coll)),
            body: Box::new(f(*body)),
        },
        Mnode::Iter {
            label,
            id,
            from,
            to,
            body,
        } => Mnode::Iter {
            label,
            id,
            from: Box::new(f(*from)),
            to: Box::new(f(*to)),
            body: Box::new(f(*body)),
        },
        Mnode::While { label, cond, body } => Mnode::While {
            label,
            cond: Box::new(f(*cond)),
            body: Box::new(f(*body)),
        },
        Mnode::Seq(items) => Mnode::Seq(items.into_iter().map(&mut *f).collect()),
        Mnode::Return(v) => Mnode::Return(Box::new(f(*v))),
        n @ Mnode::Label(_) => n,
        Mnode::Mark { label, body } => Mnode::Mark {
            label,
            body: Box::new(f(*body)),
        },

        // effects
        Mnode::Fail(v) => Mnode::Fail(Box::new(f(*v))),
        Mnode::FailSome(v) => Mnode::FailSome(Box::new(f(*v))),
        Mnode::Transfer(tk) => Mnode::Transfer(map_transfer(tk, f)),
        Mnode::Emit { event, value } => Mnode::Emit {
            event,
            value: Box::new(f(*value)),
        },
        Mnode::MkOperation { value, dest, arg } => Mnode::MkOperation {
            value: Box::new(f(*value)),
            dest: Box::new(f(*dest)),
            arg: Box::new(f(*arg)),
        },

        Mnode::App { func, args } => Mnode::App {
            func,
            args: args.into_iter().map(&mut *f).collect(),
        },

        // interop
        Mnode::Entrypoint {
            arg_type,
            name,
            addr,
        } => Mnode::Entrypoint {
            arg_type: ft(arg_type),
            name,
            addr: Box::new(f(*addr)),
        },
        n @ Mnode::SelfEntrypoint { .. } => n,
        Mnode::CallView {
            ret,
            addr,
            view,
            arg,
        } => Mnode::CallView {
            ret: ft(ret),
            addr: Box::new(f(*addr)),
            view,
            arg: Box::new(f(*arg)),
        },

        // literals
        n @ (Mnode::Unit
        | Mnode::Bool(_)
        | Mnode::Int(_)
        | Mnode::Nat(_)
        | Mnode::Rational(_, _)
        | Mnode::String(_)
        | Mnode::Bytes(_)
        | Mnode::Address(_)
        | Mnode::Currency(_)
        | Mnode::Date(_)
        | Mnode::Duration(_)
        | Mnode::Timestamp(_)
        | Mnode::KeyLit(_)
        | Mnode::KeyHashLit(_)
        | Mnode::SignatureLit(_)
        | Mnode::ChainIdLit(_)
        | Mnode::None_
        | Mnode::EmptyColl
        | Mnode::Const(_)) => n,
        Mnode::Tuple(items) => Mnode::Tuple(items.into_iter().map(&mut *f).collect()),
        Mnode::Some_(v) => Mnode::Some_(Box::new(f(*v))),
        Mnode::Left(v) => Mnode::Left(Box::new(f(*v))),
        Mnode::Right(v) => Mnode::Right(Box::new(f(*v))),
        Mnode::LitSet(items) => Mnode::LitSet(items.into_iter().map(&mut *f).collect()),
        Mnode::LitList(items) => Mnode::LitList(items.into_iter().map(&mut *f).collect()),
        Mnode::LitMap(entries) => Mnode::LitMap(
            entries
                .into_iter()
                .map(|(k, v)| (f(k), f(v)))
                .collect(),
        ),
        Mnode::LitRecord(fields) => Mnode::LitRecord(
            fields.into_iter().map(|(id, v)| (id, f(v))).collect(),
        ),
        Mnode::LitAsset(fields) => Mnode::LitAsset(
            fields.into_iter().map(|(id, v)| (id, f(v))).collect(),
        ),
        Mnode::Massets(items) => Mnode::Massets(items.into_iter().map(&mut *f).collect()),
        Mnode::Lambda {
            arg,
            arg_type,
            body,
        } => Mnode::Lambda {
            arg,
            arg_type: ft(arg_type),
            body: Box::new(f(*body)),
        },
        Mnode::EnumVal {
            enum_id,
            ctor,
            args,
        } => Mnode::EnumVal {
            enum_id,
            ctor,
            args: args.into_iter().map(&mut *f).collect(),
        },
        Mnode::AssetStateVal { asset, key } => Mnode::AssetStateVal {
            asset,
            key: Box::new(f(*key)),
        },

        // access and utilities
        Mnode::Dot { expr, field } => Mnode::Dot {
            expr: Box::new(f(*expr)),
            field,
        },
        Mnode::DotAssetField { asset, key, field } => Mnode::DotAssetField {
            asset,
            key: Box::new(f(*key)),
            field,
        },
        Mnode::QuestionOption { expr, field } => Mnode::QuestionOption {
            expr: Box::new(f(*expr)),
            field,
        },
        Mnode::TupleAccess { expr, index, arity } => Mnode::TupleAccess {
            expr: Box::new(f(*expr)),
            index,
            arity,
        },
        Mnode::RecUpdate { expr, fields } => Mnode::RecUpdate {
            expr: Box::new(f(*expr)),
            fields: fields.into_iter().map(|(id, v)| (id, f(v))).collect(),
        },
        Mnode::MakeAsset { asset, key, value } => Mnode::MakeAsset {
            asset,
            key: Box::new(f(*key)),
            value: Box::new(f(*value)),
        },
        Mnode::ToContainer { asset, src } => Mnode::ToContainer {
            asset,
            src: Box::new(f(*src)),
        },
        Mnode::Cast { src, expr } => Mnode::Cast {
            src: ft(src),
            expr: Box::new(f(*expr)),
        },

        // booleans, comparisons, arithmetic
        Mnode::Not(a) => Mnode::Not(Box::new(f(*a))),
        Mnode::And(a, b) => Mnode::And(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Or(a, b) => Mnode::Or(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Xor(a, b) => Mnode::Xor(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Equal(a, b) => Mnode::Equal(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Nequal(a, b) => Mnode::Nequal(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Gt(a, b) => Mnode::Gt(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Ge(a, b) => Mnode::Ge(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Lt(a, b) => Mnode::Lt(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Le(a, b) => Mnode::Le(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Cmp(a, b) => Mnode::Cmp(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Plus(a, b) => Mnode::Plus(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Minus(a, b) => Mnode::Minus(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Mult(a, b) => Mnode::Mult(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Div(a, b) => Mnode::Div(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Modulo(a, b) => Mnode::Modulo(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::UMinus(a) => Mnode::UMinus(Box::new(f(*a))),
        Mnode::ShiftLeft(a, b) => Mnode::ShiftLeft(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::ShiftRight(a, b) => Mnode::ShiftRight(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::TernaryBool { cond, then_, else_ } => Mnode::TernaryBool {
            cond: Box::new(f(*cond)),
            then_: Box::new(f(*then_)),
            else_: Box::new(f(*else_)),
        },
        Mnode::TernaryOption { cond, then_, else_ } => Mnode::TernaryOption {
            cond: Box::new(f(*cond)),
            then_: Box::new(f(*then_)),
            else_: Box::new(f(*else_)),
        },

        // asset effects
        Mnode::AddAsset { asset, value } => Mnode::AddAsset {
            asset,
            value: Box::new(f(*value)),
        },
        Mnode::PutSingleAsset { asset, value } => Mnode::PutSingleAsset {
            asset,
            value: Box::new(f(*value)),
        },
        Mnode::RemoveAsset { asset, key } => Mnode::RemoveAsset {
            asset,
            key: Box::new(f(*key)),
        },
        Mnode::RemoveAll { asset, ck } => Mnode::RemoveAll {
            asset,
            ck: map_ck(ck, f),
        },
        Mnode::RemoveIf { asset, ck, pred } => Mnode::RemoveIf {
            asset,
            ck: map_ck(ck, f),
            pred: Box::new(f(*pred)),
        },
        Mnode::ClearAsset { asset, ck } => Mnode::ClearAsset {
            asset,
            ck: map_ck(ck, f),
        },
        Mnode::UpdateAsset {
            asset,
            key,
            updates,
        } => Mnode::UpdateAsset {
            asset,
            key: Box::new(f(*key)),
            updates: map_updates(updates, f),
        },
        Mnode::UpdateAll { asset, ck, updates } => Mnode::UpdateAll {
            asset,
            ck: map_ck(ck, f),
            updates: map_updates(updates, f),
        },
        Mnode::AddUpdate {
            asset,
            ck,
            key,
            updates,
        } => Mnode::AddUpdate {
            asset,
            ck: map_ck(ck, f),
            key: Box::new(f(*key)),
            updates: map_updates(updates, f),
        },
        Mnode::AddField {
            asset,
            field,
            key,
            value,
        } => Mnode::AddField {
            asset,
            field,
            key: Box::new(f(*key)),
            value: Box::new(f(*value)),
        },
        Mnode::RemoveField {
            asset,
            field,
            key,
            child_key,
        } => Mnode::RemoveField {
            asset,
            field,
            key: Box::new(f(*key)),
            child_key: Box::new(f(*child_key)),
        },
        Mnode::PutRemove {
            asset,
            ck,
            key,
            value,
        } => Mnode::PutRemove {
            asset,
            ck: map_ck(ck, f),
            key: Box::new(f(*key)),
            value: Box::new(f(*value)),
        },

        // asset expressions
        Mnode::GetAsset { asset, ck, key } => Mnode::GetAsset {
            asset,
            ck: map_ck(ck, f),
            key: Box::new(f(*key)),
        },
        Mnode::GetAssetOpt { asset, ck, key } => Mnode::GetAssetOpt {
            asset,
            ck: map_ck(ck, f),
            key: Box::new(f(*key)),
        },
        Mnode::Select { asset, ck, pred } => Mnode::Select {
            asset,
            ck: map_ck(ck, f),
            pred: Box::new(f(*pred)),
        },
        Mnode::Sort {
            asset,
            ck,
            criteria,
        } => Mnode::Sort {
            asset,
            ck: map_ck(ck, f),
            criteria,
        },
        Mnode::ContainsAsset { asset, ck, key } => Mnode::ContainsAsset {
            asset,
            ck: map_ck(ck, f),
            key: Box::new(f(*key)),
        },
        Mnode::Nth { asset, ck, index } => Mnode::Nth {
            asset,
            ck: map_ck(ck, f),
            index: Box::new(f(*index)),
        },
        Mnode::CountAsset { asset, ck } => Mnode::CountAsset {
            asset,
            ck: map_ck(ck, f),
        },
        Mnode::SumAsset { asset, ck, expr } => Mnode::SumAsset {
            asset,
            ck: map_ck(ck, f),
            expr: Box::new(f(*expr)),
        },
        Mnode::Head { asset, ck, count } => Mnode::Head {
            asset,
            ck: map_ck(ck, f),
            count: Box::new(f(*count)),
        },
        Mnode::Tail { asset, ck, count } => Mnode::Tail {
            asset,
            ck: map_ck(ck, f),
            count: Box::new(f(*count)),
        },

        // primitive containers
        Mnode::SetAdd(a, b) => Mnode::SetAdd(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::SetRemove(a, b) => Mnode::SetRemove(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::SetContains(a, b) => Mnode::SetContains(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::SetLength(a) => Mnode::SetLength(Box::new(f(*a))),
        Mnode::ListPrepend(a, b) => Mnode::ListPrepend(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::ListConcat(a, b) => Mnode::ListConcat(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::ListLength(a) => Mnode::ListLength(Box::new(f(*a))),
        Mnode::ListContains(a, b) => Mnode::ListContains(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::ListNth(a, b) => Mnode::ListNth(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::ListReverse(a) => Mnode::ListReverse(Box::new(f(*a))),
        Mnode::MapPut(m, k, v) => {
            Mnode::MapPut(Box::new(f(*m)), Box::new(f(*k)), Box::new(f(*v)))
        }
        Mnode::MapRemove(m, k) => Mnode::MapRemove(Box::new(f(*m)), Box::new(f(*k))),
        Mnode::MapUpdate(m, k, v) => {
            Mnode::MapUpdate(Box::new(f(*m)), Box::new(f(*k)), Box::new(f(*v)))
        }
        Mnode::MapGet(m, k) => Mnode::MapGet(Box::new(f(*m)), Box::new(f(*k))),
        Mnode::MapGetOpt(m, k) => Mnode::MapGetOpt(Box::new(f(*m)), Box::new(f(*k))),
        Mnode::MapContains(m, k) => Mnode::MapContains(Box::new(f(*m)), Box::new(f(*k))),
        Mnode::MapLength(m) => Mnode::MapLength(Box::new(f(*m))),
        Mnode::InstrContainer { op, target, args } => Mnode::InstrContainer {
            op,
            target: map_assign_kind(target, f),
            args: args.into_iter().map(&mut *f).collect(),
        },

        // builtins
        Mnode::Builtin(b, args) => Mnode::Builtin(b, args.into_iter().map(&mut *f).collect()),

        // rationals
        Mnode::RatEq(a, b) => Mnode::RatEq(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::RatCmp(op, a, b) => Mnode::RatCmp(op, Box::new(f(*a)), Box::new(f(*b))),
        Mnode::RatArith(op, a, b) => Mnode::RatArith(op, Box::new(f(*a)), Box::new(f(*b))),
        Mnode::RatUminus(a) => Mnode::RatUminus(Box::new(f(*a))),
        Mnode::RatTez(a, b) => Mnode::RatTez(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::RatDur(a, b) => Mnode::RatDur(Box::new(f(*a)), Box::new(f(*b))),

        // formulas
        Mnode::Forall {
            id,
            typ,
            coll,
            body,
        } => Mnode::Forall {
            id,
            typ: ft(typ),
            coll: coll.map(|c| Box::new(f(*c))),
            body: Box::new(f(*body)),
        },
        Mnode::Exists {
            id,
            typ,
            coll,
            body,
        } => Mnode::Exists {
            id,
            typ: ft(typ),
            coll: coll.map(|c| Box::new(f(*c))),
            body: Box::new(f(*body)),
        },
        Mnode::Imply(a, b) => Mnode::Imply(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Equiv(a, b) => Mnode::Equiv(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::SetToIterate(a) => Mnode::SetToIterate(Box::new(f(*a))),
        Mnode::SetIterated(a) => Mnode::SetIterated(Box::new(f(*a))),
        Mnode::Singleton(a) => Mnode::Singleton(Box::new(f(*a))),
        Mnode::SubsetOf(a, b) => Mnode::SubsetOf(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::IsEmpty(a) => Mnode::IsEmpty(Box::new(f(*a))),
        Mnode::Union(a, b) => Mnode::Union(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Inter(a, b) => Mnode::Inter(Box::new(f(*a)), Box::new(f(*b))),
        Mnode::Diff(a, b) => Mnode::Diff(Box::new(f(*a)), Box::new(f(*b))),
    };
    Mterm {
        node,
        type_: ft(type_),
        loc,
    }
}

// ============================================================================
// children / fold_term
// ============================================================================

fn ck_children<'a>(ck: &'a Ck, out: &mut Vec<&'a Mterm>) {
    match ck {
        Ck::Coll => {}
        Ck::View(v) => out.push(v),
        Ck::Field { key, .. } => out.push(key),
    }
}

fn assign_kind_children<'a>(kind: &'a AssignKind, out: &mut Vec<&'a Mterm>) {
    match kind {
        AssignKind::Var(_)
        | AssignKind::StorageVar(_)
        | AssignKind::State
        | AssignKind::Operations => {}
        AssignKind::AssetField { key, .. } => out.push(key),
        AssignKind::RecordField { lvalue, .. } => out.push(lvalue),
        AssignKind::TupleSlot { lvalue, .. } => out.push(lvalue),
        AssignKind::AssetState { key, .. } => out.push(key),
    }
}

/// Immediate subterms of `mt`, left to right
pub fn children(mt: &Mterm) -> Vec<&Mterm> {
    let mut out: Vec<&Mterm> = Vec::new();
    match &mt.node {
        Mnode::Letin { value, body, .. } => {
            out.push(value);
            out.push(body);
        }
        Mnode::Declvar { value, .. } => out.push(value),
        Mnode::DeclvarOpt {
            value, fail_with, ..
        } => {
            out.push(value);
            if let Some(e) = fail_with {
                out.push(e);
            }
        }
        Mnode::Var { .. } => {}
        Mnode::Assign { kind, value, .. } => {
            assign_kind_children(kind, &mut out);
            out.push(value);
        }
        Mnode::If {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push(cond);
            out.push(then_branch);
            if let Some(e) = else_branch {
                out.push(e);
            }
        }
        Mnode::Match { expr, arms } => {
            out.push(expr);
            for a in arms {
                out.push(&a.body);
            }
        }
        Mnode::MatchOr {
            expr, left, right, ..
        } => {
            out.push(expr);
            out.push(left);
            out.push(right);
        }
        Mnode::For { coll, body, .. } => {
            out.push(coll);
            out.push(body);
        }
        Mnode::Iter {
            from, to, body, ..
        } => {
            out.push(from);
            out.push(to);
            out.push(body);
        }
        Mnode::While { cond, body, .. } => {
            out.push(cond);
            out.push(body);
        }
        Mnode::Seq(items) => out.extend(items.iter()),
        Mnode::Return(v) | Mnode::Fail(v) | Mnode::FailSome(v) => out.push(v),
        Mnode::Label(_) => {}
        Mnode::Mark { body, .. } => out.push(body),
        Mnode::Transfer(tk) => match tk {
            TransferKind::Simple { value, dest } => {
                out.push(value);
                out.push(dest);
            }
            TransferKind::Call {
                value, dest, arg, ..
            } => {
                out.push(value);
                out.push(dest);
                out.push(arg);
            }
            TransferKind::ToContract {
                value,
                contract,
                arg,
            } => {
                out.push(value);
                out.push(contract);
                out.push(arg);
            }
        },
        Mnode::Emit { value, .. } => out.push(value),
        Mnode::MkOperation { value, dest, arg } => {
            out.push(value);
            out.push(dest);
            out.push(arg);
        }
        Mnode::App { args, .. } => out.extend(args.iter()),
        Mnode::Entrypoint { addr, .. } => out.push(addr),
        Mnode::SelfEntrypoint { .. } => {}
        Mnode::CallView { addr, arg, .. } => {
            out.push(addr);
            out.push(arg);
        }
        Mnode::Unit
        | Mnode::Bool(_)
        | Mnode::Int(_)
        | Mnode::Nat(_)
        | Mnode::Rational(_, _)
        | Mnode::String(_)
        | Mnode::Bytes(_)
        | Mnode::Address(_)
        | Mnode::Currency(_)
        | Mnode::Date(_)
        | Mnode::Duration(_)
        | Mnode::Timestamp(_)
        | Mnode::KeyLit(_)
        | Mnode::KeyHashLit(_)
        | Mnode::SignatureLit(_)
        | Mnode::ChainIdLit(_)
        | Mnode::None_
        | Mnode::EmptyColl
        | Mnode::Const(_) => {}
        Mnode::Tuple(items)
        | Mnode::LitSet(items)
        | Mnode::LitList(items)
        | Mnode::Massets(items) => out.extend(items.iter()),
        Mnode::Some_(v) | Mnode::Left(v) | Mnode::Right(v) => out.push(v),
        Mnode::LitMap(entries) => {
            for (k, v) in entries {
                out.push(k);
                out.push(v);
            }
        }
        Mnode::LitRecord(fields) | Mnode::LitAsset(fields) => {
            for (_, v) in fields {
                out.push(v);
            }
        }
        Mnode::Lambda { body, .. } => out.push(body),
        Mnode::EnumVal { args, .. } => out.extend(args.iter()),
        Mnode::AssetStateVal { key, .. } => out.push(key),
        Mnode::Dot { expr, .. }
        | Mnode::QuestionOption { expr, .. }
        | Mnode::TupleAccess { expr, .. } => out.push(expr),
        Mnode::DotAssetField { key, .. } => out.push(key),
        Mnode::RecUpdate { expr, fields } => {
            out.push(expr);
            for (_, v) in fields {
                out.push(v);
            }
        }
        Mnode::MakeAsset { key, value, .. } => {
            out.push(key);
            out.push(value);
        }
        Mnode::ToContainer { src, .. } => out.push(src),
        Mnode::Cast { expr, .. } => out.push(expr),
        Mnode::Not(a) | Mnode::UMinus(a) => out.push(a),
        Mnode::And(a, b)
        | Mnode::Or(a, b)
        | Mnode::Xor(a, b)
        | Mnode::Equal(a, b)
        | Mnode::Nequal(a, b)
        | Mnode::Gt(a, b)
        | Mnode::Ge(a, b)
        | Mnode::Lt(a, b)
        | Mnode::Le(a, b)
        | Mnode::Cmp(a, b)
        | Mnode::Plus(a, b)
        | Mnode::Minus(a, b)
        | Mnode::Mult(a, b)
        | Mnode::Div(a, b)
        | Mnode::Modulo(a, b)
        | Mnode::ShiftLeft(a, b)
        | Mnode::ShiftRight(a, b) => {
            out.push(a);
            out.push(b);
        }
        Mnode::TernaryBool { cond, then_, else_ }
        | Mnode::TernaryOption { cond, then_, else_ } => {
            out.push(cond);
            out.push(then_);
            out.push(else_);
        }
        Mnode::AddAsset { value, .. } | Mnode::PutSingleAsset { value, .. } => out.push(value),
        Mnode::RemoveAsset { key, .. } => out.push(key),
        Mnode::RemoveAll { ck, .. } | Mnode::ClearAsset { ck, .. } => ck_children(ck, &mut out),
        Mnode::RemoveIf { ck, pred, .. } => {
            ck_children(ck, &mut out);
            out.push(pred);
        }
        Mnode::UpdateAsset { key, updates, .. } => {
            out.push(key);
            for u in updates {
                out.push(&u.value);
            }
        }
        Mnode::UpdateAll { ck, updates, .. } => {
            ck_children(ck, &mut out);
            for u in updates {
                out.push(&u.value);
            }
        }
        Mnode::AddUpdate {
            ck, key, updates, ..
        } => {
            ck_children(ck, &mut out);
            out.push(key);
            for u in updates {
                out.push(&u.value);
            }
        }
        Mnode::AddField { key, value, .. } => {
            out.push(key);
            out.push(value);
        }
        Mnode::RemoveField {
            key, child_key, ..
        } => {
            out.push(key);
            out.push(child_key);
        }
        Mnode::PutRemove { ck, key, value, .. } => {
            ck_children(ck, &mut out);
            out.push(key);
            out.push(value);
        }
        Mnode::GetAsset { ck, key, .. }
        | Mnode::GetAssetOpt { ck, key, .. }
        | Mnode::ContainsAsset { ck, key, .. } => {
            ck_children(ck, &mut out);
            out.push(key);
        }
        Mnode::Select { ck, pred, .. } => {
            ck_children(ck, &mut out);
            out.push(pred);
        }
        Mnode::Sort { ck, .. } | Mnode::CountAsset { ck, .. } => ck_children(ck, &mut out),
        Mnode::Nth { ck, index, .. } => {
            ck_children(ck, &mut out);
            out.push(index);
        }
        Mnode::SumAsset { ck, expr, .. } => {
            ck_children(ck, &mut out);
            out.push(expr);
        }
        Mnode::Head { ck, count, .. } | Mnode::Tail { ck, count, .. } => {
            ck_children(ck, &mut out);
            out.push(count);
        }
        Mnode::SetAdd(a, b)
        | Mnode::SetRemove(a, b)
        | Mnode::SetContains(a, b)
        | Mnode::ListPrepend(a, b)
        | Mnode::ListConcat(a, b)
        | Mnode::ListContains(a, b)
        | Mnode::ListNth(a, b)
        | Mnode::MapRemove(a, b)
        | Mnode::MapGet(a, b)
        | Mnode::MapGetOpt(a, b)
        | Mnode::MapContains(a, b) => {
            out.push(a);
            out.push(b);
        }
        Mnode::SetLength(a)
        | Mnode::ListLength(a)
        | Mnode::ListReverse(a)
        | Mnode::MapLength(a) => out.push(a),
        Mnode::MapPut(m, k, v) | Mnode::MapUpdate(m, k, v) => {
            out.push(m);
            out.push(k);
            out.push(v);
        }
        Mnode::InstrContainer { target, args, .. } => {
            assign_kind_children(target, &mut out);
            out.extend(args.iter());
        }
        Mnode::Builtin(_, args) => out.extend(args.iter()),
        Mnode::RatEq(a, b)
        | Mnode::RatCmp(_, a, b)
        | Mnode::RatArith(_, a, b)
        | Mnode::RatTez(a, b)
        | Mnode::RatDur(a, b) => {
            out.push(a);
            out.push(b);
        }
        Mnode::RatUminus(a) => out.push(a),
        Mnode::Forall { coll, body, .. } | Mnode::Exists { coll, body, .. } => {
            if let Some(c) = coll {
                out.push(c);
            }
            out.push(body);
        }
        Mnode::Imply(a, b)
        | Mnode::Equiv(a, b)
        | Mnode::SubsetOf(a, b)
        | Mnode::Union(a, b)
        | Mnode::Inter(a, b)
        | Mnode::Diff(a, b) => {
            out.push(a);
            out.push(b);
        }
        Mnode::SetToIterate(a)
        | Mnode::SetIterated(a)
        | Mnode::Singleton(a)
        | Mnode::IsEmpty(a) => out.push(a),
    }
    out
}

/// Fold `f` over the immediate subterms of `mt`, left to right
pub fn fold_term<'a, A>(mt: &'a Mterm, acc: A, f: &mut impl FnMut(A, &'a Mterm) -> A) -> A {
    children(mt).into_iter().fold(acc, |acc, c| f(acc, c))
}

/// Rebuild the node while threading an accumulator through every immediate
/// subterm, left to right
pub fn fold_map_term<A>(
    mt: Mterm,
    acc: A,
    f: &mut impl FnMut(A, Mterm) -> (Mterm, A),
) -> (Mterm, A) {
    let mut slot = Some(acc);
    let out = map_term(mt, &mut |t| {
        let (t2, a2) = f(slot.take().expect("accumulator threaded"), t);
        slot = Some(a2);
        t2
    });
    (out, slot.expect("accumulator threaded"))
}

/// True if `p` holds on `mt` or any descendant
pub fn any_term(mt: &Mterm, p: &mut impl FnMut(&Mterm) -> bool) -> bool {
    if p(mt) {
        return true;
    }
    children(mt).into_iter().any(|c| any_term(c, p))
}

/// Rewrite the whole tree bottom-up with `f`
pub fn rewrite_term(mt: Mterm, f: &mut impl FnMut(Mterm) -> Mterm) -> Mterm {
    let mt = map_term(mt, &mut |t| rewrite_term(t, f));
    f(mt)
}

/// Rewrite every type position in the tree (node types and carried types)
pub fn map_term_types(mt: Mterm, ft: &mut impl FnMut(Type) -> Type) -> Mterm {
    let mt = map_term_with_types(mt, &mut |t| map_term_types(t, ft), &mut |t| t);
    let Mterm { node, type_, loc } = mt;
    Mterm {
        node,
        type_: ft(type_),
        loc,
    }
}

// ============================================================================
// Model walkers
// ============================================================================

fn map_spec_terms(
    spec: Specification,
    base: &Ctx,
    f: &mut impl FnMut(&Ctx, Mterm) -> Mterm,
) -> Specification {
    let mut spec = spec;
    spec.predicates = spec
        .predicates
        .into_iter()
        .map(|mut p| {
            let ctx = base.clone().with_spec(&p.label);
            p.term = f(&ctx, p.term);
            p
        })
        .collect();
    spec.definitions = spec
        .definitions
        .into_iter()
        .map(|mut d| {
            let ctx = base.clone().with_spec(&d.name);
            d.body = f(&ctx, d.body);
            d
        })
        .collect();
    spec.lemmas = spec
        .lemmas
        .into_iter()
        .map(|mut p| {
            let ctx = base.clone().with_spec(&p.label);
            p.term = f(&ctx, p.term);
            p
        })
        .collect();
    spec.theorems = spec
        .theorems
        .into_iter()
        .map(|mut p| {
            let ctx = base.clone().with_spec(&p.label);
            p.term = f(&ctx, p.term);
            p
        })
        .collect();
    spec.variables = spec
        .variables
        .into_iter()
        .map(|mut v| {
            let ctx = base.clone().with_spec(&v.name);
            v.default = v.default.map(|d| f(&ctx, d));
            v
        })
        .collect();
    spec.invariants = spec
        .invariants
        .into_iter()
        .map(|mut inv| {
            let ctx = base.clone().with_invariant(&inv.label);
            inv.formulas = inv.formulas.into_iter().map(|t| f(&ctx, t)).collect();
            inv
        })
        .collect();
    spec.effects = spec
        .effects
        .into_iter()
        .map(|t| f(base, t))
        .collect();
    spec.postconditions = spec
        .postconditions
        .into_iter()
        .map(|mut p| {
            let ctx = base.clone().with_spec(&p.name);
            p.formula = f(&ctx, p.formula);
            p.invariants = p
                .invariants
                .into_iter()
                .map(|mut inv| {
                    let ictx = ctx.clone().with_invariant(&inv.label);
                    inv.formulas = inv.formulas.into_iter().map(|t| f(&ictx, t)).collect();
                    inv
                })
                .collect();
            p
        })
        .collect();
    spec.fails = spec
        .fails
        .into_iter()
        .map(|mut fs| {
            let ctx = base.clone().with_spec(&fs.label);
            fs.formula = f(&ctx, fs.formula);
            fs
        })
        .collect();
    spec
}

fn map_invariants(
    invs: Vec<crate::model::Invariant>,
    base: &Ctx,
    f: &mut impl FnMut(&Ctx, Mterm) -> Mterm,
) -> Vec<crate::model::Invariant> {
    invs.into_iter()
        .map(|mut inv| {
            let ctx = base.clone().with_invariant(&inv.label);
            inv.formulas = inv.formulas.into_iter().map(|t| f(&ctx, t)).collect();
            inv
        })
        .collect()
}

/// Walk every term position in the model: function bodies, argument and
/// storage defaults, declaration defaults and initial values, invariants and
/// specifications. `f` receives the position's [`Ctx`] and the whole term.
pub fn map_model_terms(model: Model, f: &mut impl FnMut(&Ctx, Mterm) -> Mterm) -> Model {
    let mut model = model;
    let top = Ctx::default();

    model.decls = model
        .decls
        .into_iter()
        .map(|decl| match decl {
            Decl::Var(mut v) => {
                v.default = v.default.map(|d| f(&top, d));
                v.invariants = map_invariants(v.invariants, &top, f);
                Decl::Var(v)
            }
            Decl::Enum(mut e) => {
                e.ctors = e
                    .ctors
                    .into_iter()
                    .map(|mut c| {
                        c.invariants = map_invariants(c.invariants, &top, f);
                        c
                    })
                    .collect();
                Decl::Enum(e)
            }
            Decl::Asset(mut a) => {
                a.fields = a
                    .fields
                    .into_iter()
                    .map(|mut fl| {
                        fl.default = fl.default.map(|d| f(&top, d));
                        fl
                    })
                    .collect();
                a.init = a.init.into_iter().map(|t| f(&top, t)).collect();
                a.invariants = map_invariants(a.invariants, &top, f);
                Decl::Asset(a)
            }
            d @ (Decl::Record(_) | Decl::Event(_)) => d,
        })
        .collect();

    model.parameters = model
        .parameters
        .into_iter()
        .map(|mut p| {
            p.default = p.default.map(|d| f(&top, d));
            p
        })
        .collect();

    model.storage = model
        .storage
        .into_iter()
        .map(|mut item| {
            item.default = f(&top, item.default);
            item
        })
        .collect();

    model.functions = model
        .functions
        .into_iter()
        .map(|mut fun| {
            let ctx = Ctx::in_fun(&fun.name, &fun.kind);
            fun.args = fun
                .args
                .into_iter()
                .map(|mut a| {
                    a.default = a.default.map(|d| f(&ctx, d));
                    a
                })
                .collect();
            fun.body = f(&ctx, fun.body);
            fun.spec = fun.spec.map(|s| map_spec_terms(s, &ctx, f));
            fun
        })
        .collect();

    model.specification = map_spec_terms(model.specification, &top, f);
    model
}

/// Apply `ft` to every type position of the model: declarations, storage,
/// function signatures, specifications, and (deeply) every term.
pub fn map_model_types(model: Model, ft: &mut impl FnMut(Type) -> Type) -> Model {
    let mut model = map_model_terms(model, &mut |_ctx, t| map_term_types(t, ft));

    model.decls = model
        .decls
        .into_iter()
        .map(|decl| match decl {
            Decl::Var(mut v) => {
                v.typ = ft(v.typ);
                Decl::Var(v)
            }
            Decl::Enum(mut e) => {
                e.ctors = e
                    .ctors
                    .into_iter()
                    .map(|mut c| {
                        c.args = c.args.into_iter().map(&mut *ft).collect();
                        c
                    })
                    .collect();
                Decl::Enum(e)
            }
            Decl::Asset(mut a) => {
                a.fields = a
                    .fields
                    .into_iter()
                    .map(|mut fl| {
                        fl.typ = ft(fl.typ);
                        fl
                    })
                    .collect();
                Decl::Asset(a)
            }
            Decl::Record(mut r) => {
                r.fields = r
                    .fields
                    .into_iter()
                    .map(|mut fl| {
                        fl.typ = ft(fl.typ);
                        fl
                    })
                    .collect();
                Decl::Record(r)
            }
            Decl::Event(mut r) => {
                r.fields = r
                    .fields
                    .into_iter()
                    .map(|mut fl| {
                        fl.typ = ft(fl.typ);
                        fl
                    })
                    .collect();
                Decl::Event(r)
            }
        })
        .collect();

    model.parameters = model
        .parameters
        .into_iter()
        .map(|mut p| {
            p.typ = ft(p.typ);
            p
        })
        .collect();

    model.storage = model
        .storage
        .into_iter()
        .map(|mut item| {
            item.typ = ft(item.typ);
            item
        })
        .collect();

    model.functions = model
        .functions
        .into_iter()
        .map(|mut fun| {
            fun.kind = match fun.kind {
                FunctionKind::Entry => FunctionKind::Entry,
                FunctionKind::Getter(t) => FunctionKind::Getter(ft(t)),
                FunctionKind::View(t, v) => FunctionKind::View(ft(t), v),
                FunctionKind::Function(t) => FunctionKind::Function(ft(t)),
            };
            fun.args = fun
                .args
                .into_iter()
                .map(|mut a| {
                    a.typ = ft(a.typ);
                    a
                })
                .collect();
            fun.eargs = fun
                .eargs
                .into_iter()
                .map(|mut a| {
                    a.typ = ft(a.typ);
                    a
                })
                .collect();
            fun
        })
        .collect();

    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builders::*;

    #[test]
    fn map_term_preserves_shape() {
        let t = mif(
            meq(mvar_local("x", tint()), mint(1)),
            massign_var("x", mint(2)),
            None,
        );
        let mapped = map_term(t.clone(), &mut |s| s);
        assert_eq!(t, mapped);
    }

    #[test]
    fn fold_term_visits_left_to_right() {
        let t = mseq(vec![mint(1), mint(2), mint(3)]);
        let order = fold_term(&t, Vec::new(), &mut |mut acc, c| {
            if let crate::model::Mnode::Int(i) = c.node {
                acc.push(i);
            }
            acc
        });
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn fold_map_threads_accumulator() {
        let t = mseq(vec![mint(1), mint(2)]);
        let (_t2, n) = fold_map_term(t, 0usize, &mut |acc, c| (c, acc + 1));
        assert_eq!(n, 2);
    }

    #[test]
    fn rewrite_replaces_leaves() {
        let t = mplus(mint(1), mint(2), tint());
        let out = rewrite_term(t, &mut |s| match s.node {
            crate::model::Mnode::Int(i) => mint(i * 10),
            _ => s,
        });
        let expected = mplus(mint(10), mint(20), tint());
        assert_eq!(out, expected);
    }
}
