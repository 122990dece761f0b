//! # Whole-program Passes
//!
//! Environment rewrites that look at the model as a whole: storage
//! threading, constant inlining, initial-value evaluation, canonical
//! storage literals, operation ordering, parameters, metadata, getters,
//! test instrumentation, ABI patching and API-item canonicalisation.
//!
//! ## Pipeline Position
//!
//! ```text
//! lowerings -> [whole program] -> housekeeping -> back-end
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{stop_code, Bus, ErrorKind, Stop};
use crate::model::builders::*;
use crate::model::{
    ApiContainer, ApiItem, ApiStorage, Argument, AssignKind, Decl, FunctionDef, FunctionKind,
    Ident, Loc, MetadataKind, Mnode, Model, Mterm, StorageItem, StorageKind, TransferKind,
    VarKind, VarScope,
};
use crate::traversal::{any_term, map_model_terms, rewrite_term};
use crate::utils::{self, eval, Env};

/// Name of the local the single storage slot is threaded through
pub const SINGLE_STORAGE_VAR: &str = "_s";

// ============================================================================
// process_single_field_storage
// ============================================================================

/// With exactly one storage slot there is no record to project from: every
/// reference goes through the threaded local `_s`.
pub fn process_single_field_storage(model: Model) -> Model {
    if model.storage.len() != 1 {
        return model;
    }
    let id = model.storage[0].id.clone();
    let ty = model.storage[0].typ.clone();
    let mut model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match &s.node {
            Mnode::Var {
                id: vid,
                scope: VarScope::StorageVar | VarScope::StorageCol,
            } if *vid == id => mvar_local(SINGLE_STORAGE_VAR, ty.clone()).with_loc(s.loc),
            Mnode::Assign { op, kind, value } => match kind {
                AssignKind::StorageVar(vid) if *vid == id => Mterm::new(
                    Mnode::Assign {
                        op: *op,
                        kind: AssignKind::Var(SINGLE_STORAGE_VAR.to_string()),
                        value: value.clone(),
                    },
                    s.type_.clone(),
                    s.loc,
                ),
                _ => s,
            },
            _ => s,
        })
    });
    model
        .extra
        .insert("single_field_storage".into(), id);
    model
}

// ============================================================================
// remove_storage_field_in_function
// ============================================================================

fn direct_storage_refs(body: &Mterm, storage_ids: &BTreeSet<Ident>) -> BTreeSet<Ident> {
    let mut out = BTreeSet::new();
    any_term(body, &mut |t| {
        match &t.node {
            Mnode::Var {
                id,
                scope: VarScope::StorageVar | VarScope::StorageCol,
            } if storage_ids.contains(id) => {
                out.insert(id.clone());
            }
            Mnode::Assign {
                kind: AssignKind::StorageVar(id),
                ..
            } if storage_ids.contains(id) => {
                out.insert(id.clone());
            }
            _ => {}
        }
        false
    });
    out
}

fn callees(body: &Mterm) -> BTreeSet<Ident> {
    let mut out = BTreeSet::new();
    any_term(body, &mut |t| {
        if let Mnode::App { func, .. } = &t.node {
            out.insert(func.clone());
        }
        false
    });
    out
}

/// Pure functions get the storage they touch as explicit parameters; call
/// sites are extended to match. Runs to a fixpoint since callees may
/// transitively use more.
pub fn remove_storage_field_in_function(model: Model) -> Model {
    let storage_ids: BTreeSet<Ident> = model.storage.iter().map(|i| i.id.clone()).collect();
    let storage_types: BTreeMap<Ident, crate::model::Type> = model
        .storage
        .iter()
        .map(|i| (i.id.clone(), i.typ.clone()))
        .collect();
    let user_funs: BTreeSet<Ident> = model
        .functions
        .iter()
        .filter(|f| matches!(f.kind, FunctionKind::Function(_)))
        .map(|f| f.name.clone())
        .collect();

    // fixpoint over the call graph
    let mut uses: BTreeMap<Ident, BTreeSet<Ident>> = model
        .functions
        .iter()
        .map(|f| (f.name.clone(), direct_storage_refs(&f.body, &storage_ids)))
        .collect();
    let calls: BTreeMap<Ident, BTreeSet<Ident>> = model
        .functions
        .iter()
        .map(|f| (f.name.clone(), callees(&f.body)))
        .collect();
    loop {
        let mut changed = false;
        for f in model.functions.iter() {
            let mut set = uses[&f.name].clone();
            for callee in calls[&f.name].iter() {
                if let Some(cs) = uses.get(callee) {
                    for s in cs.clone() {
                        set.insert(s);
                    }
                }
            }
            if set.len() != uses[&f.name].len() {
                uses.insert(f.name.clone(), set);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut model = model;
    // extend signatures of user functions
    for f in &mut model.functions {
        if !user_funs.contains(&f.name) {
            continue;
        }
        f.eargs = uses[&f.name]
            .iter()
            .map(|id| Argument {
                name: id.clone(),
                typ: storage_types[id].clone(),
                default: None,
            })
            .collect();
    }
    // extend call sites
    let uses_ref = uses;
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::App { func, mut args } = s.node else { return s };
            if user_funs.contains(&func) {
                if let Some(set) = uses_ref.get(&func) {
                    for id in set {
                        args.push(mvar_storage(id.clone(), storage_types[id].clone()));
                    }
                }
            }
            Mterm::new(Mnode::App { func, args }, s.type_, s.loc)
        })
    })
}

// ============================================================================
// remove_constant
// ============================================================================

/// Inline every constant declaration at its references and drop it
pub fn remove_constant(model: Model) -> Model {
    let consts: BTreeMap<Ident, Mterm> = model
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Var(v) if v.kind == VarKind::Constant => {
                v.default.clone().map(|def| (v.name.clone(), def))
            }
            _ => None,
        })
        .collect();
    if consts.is_empty() {
        return model;
    }
    let mut model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match &s.node {
            Mnode::Var { id, .. } => match consts.get(id) {
                Some(def) => def.clone().with_loc(s.loc),
                None => s,
            },
            _ => s,
        })
    });
    model.decls.retain(
        |d| !matches!(d, Decl::Var(v) if v.kind == VarKind::Constant && consts.contains_key(&v.name)),
    );
    model
        .storage
        .retain(|item| !(item.kind == StorageKind::Const && consts.contains_key(&item.id)));
    model
}

// ============================================================================
// eval_storage / eval_variable_initial_value
// ============================================================================

/// Fold literal storage defaults in declaration order, threading each
/// item's value into the environment for the ones after it.
pub fn eval_storage(model: Model) -> Model {
    let mut model = model;
    let mut env = Env::new();
    for item in &mut model.storage {
        if let Ok(v) = eval(&env, &item.default) {
            item.default = v;
        }
        env.insert(item.id.clone(), item.default.clone());
    }
    model
}

/// Same folding for variable declaration defaults
pub fn eval_variable_initial_value(model: Model) -> Model {
    let mut model = model;
    let mut env = Env::new();
    for d in &mut model.decls {
        if let Decl::Var(v) = d {
            if let Some(def) = &v.default {
                if let Ok(folded) = eval(&env, def) {
                    v.default = Some(folded);
                }
            }
            if let Some(def) = &v.default {
                env.insert(v.name.clone(), def.clone());
            }
        }
    }
    model
}

// ============================================================================
// normalize_storage / sort_container
// ============================================================================

/// Substitute storage-internal variable references in defaults by the
/// referenced item's own default, in topological (declaration) order.
pub fn normalize_storage(model: Model) -> Model {
    let mut model = model;
    let mut resolved: BTreeMap<Ident, Mterm> = BTreeMap::new();
    for item in &mut model.storage {
        let default = std::mem::replace(&mut item.default, munit());
        let default = rewrite_term(default, &mut |s| match &s.node {
            Mnode::Var { id, .. } => match resolved.get(id) {
                Some(v) => v.clone().with_loc(s.loc),
                None => s,
            },
            _ => s,
        });
        resolved.insert(item.id.clone(), default.clone());
        item.default = default;
    }
    model
}

/// Canonicalise literal sets and maps by sorted element / key
pub fn sort_container(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::LitSet(mut items) => {
                items.sort();
                Mterm::new(Mnode::LitSet(items), s.type_, s.loc)
            }
            Mnode::LitMap(mut entries) => {
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));
                Mterm::new(Mnode::LitMap(entries), s.type_, s.loc)
            }
            node => Mterm::new(node, s.type_, s.loc),
        })
    })
}

// ============================================================================
// reverse_operations
// ============================================================================

/// Bodies that prepend to the operations list end with an explicit reverse
/// so operations leave in call order.
pub fn reverse_operations(model: Model) -> Model {
    let mut model = model;
    for f in &mut model.functions {
        if !utils::with_operations_for_mterm(&f.body) {
            continue;
        }
        let ops_ty = tlist(toperation());
        let reverse = massign(
            AssignKind::Operations,
            mlist_reverse(mvar("operations", VarScope::Operations, ops_ty)),
        );
        let body = std::mem::replace(&mut f.body, mskip());
        f.body = mseq(vec![body, reverse]);
    }
    model
}

// ============================================================================
// process_parameter
// ============================================================================

/// Contract parameters become storage variables
pub fn process_parameter(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    let mut model = model;
    let params: Vec<crate::model::Parameter> = model.parameters.drain(..).collect();
    for p in params {
        let Some(default) = p.default else {
            let kind = if p.constant {
                ErrorKind::NoInitValueForConstParam(p.name.clone())
            } else {
                ErrorKind::NoInitValueForParameter(p.name.clone())
            };
            bus.emit_error(p.loc, kind);
            continue;
        };
        model.storage.push(StorageItem {
            id: p.name,
            kind: if p.constant {
                StorageKind::Const
            } else {
                StorageKind::Var
            },
            typ: p.typ,
            default,
            ghost: false,
            loc: p.loc,
        });
    }
    bus.stop_if_errors(stop_code::INIT)?;
    Ok(model)
}

// ============================================================================
// process_metadata
// ============================================================================

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Metadata policy resolved from the options
#[derive(Debug, Clone, Default)]
pub struct MetadataPolicy<'a> {
    pub uri: Option<&'a str>,
    pub storage_json: Option<&'a str>,
    pub with_metadata: bool,
}

/// Choose between a URI bytes value, a JSON-embedded `here` pointer, or a
/// parameter-driven metadata slot; materialise the `%metadata` big map.
pub fn process_metadata(
    model: Model,
    policy: &MetadataPolicy<'_>,
    bus: &mut Bus,
) -> Result<Model, Stop> {
    let mut model = model;
    let kind = if let Some(uri) = policy.uri {
        Some(MetadataKind::Uri(uri.to_string()))
    } else if let Some(json) = policy.storage_json {
        match serde_json::from_str::<serde_json::Value>(json) {
            Ok(v) => Some(MetadataKind::Json(v)),
            Err(e) => {
                bus.emit_error(Loc::NONE, ErrorKind::InvalidMetadata(e.to_string()));
                None
            }
        }
    } else if policy.with_metadata {
        Some(MetadataKind::Parameter)
    } else {
        model.metadata.take()
    };
    bus.stop_if_errors(stop_code::INIT)?;

    let Some(kind) = kind else { return Ok(model) };
    let ty = tbig_map(tstring(), tbytes());
    let default = match &kind {
        MetadataKind::Uri(uri) => {
            let entry = (
                mstring(""),
                Mterm::synthesised(Mnode::Bytes(to_hex(uri.as_bytes())), tbytes()),
            );
            Mterm::synthesised(Mnode::LitMap(vec![entry]), ty.clone())
        }
        MetadataKind::Json(v) => {
            let here = (
                mstring(""),
                Mterm::synthesised(
                    Mnode::Bytes(to_hex("tezos-storage:here".as_bytes())),
                    tbytes(),
                ),
            );
            let body = (
                mstring("here"),
                Mterm::synthesised(Mnode::Bytes(to_hex(v.to_string().as_bytes())), tbytes()),
            );
            Mterm::synthesised(Mnode::LitMap(vec![here, body]), ty.clone())
        }
        MetadataKind::Parameter => Mterm::synthesised(Mnode::LitMap(Vec::new()), ty.clone()),
    };
    model.metadata = Some(kind);
    // the slot is replaced when already present
    model.storage.retain(|i| i.id != "metadata");
    model.storage.push(StorageItem {
        id: "metadata".into(),
        kind: StorageKind::Var,
        typ: ty,
        default,
        ghost: false,
        loc: Loc::NONE,
    });
    Ok(model)
}

// ============================================================================
// getter_to_entry
// ============================================================================

/// Callback argument threaded into rewritten getters
pub const GETTER_CB: &str = "_cb";

/// A getter returning `T` becomes an entry with an extra `_cb: contract<T>`
/// argument; `return x` becomes a zero-amount transfer to the callback.
pub fn getter_to_entry(model: Model) -> Model {
    let mut model = model;
    for f in &mut model.functions {
        let FunctionKind::Getter(ret) = f.kind.clone() else { continue };
        let cb_ty = tcontract(ret.clone());
        f.args.push(Argument {
            name: GETTER_CB.to_string(),
            typ: cb_ty.clone(),
            default: None,
        });
        let body = std::mem::replace(&mut f.body, mskip());
        f.body = rewrite_term(body, &mut |s| match s.node {
            Mnode::Return(v) => Mterm::new(
                Mnode::Transfer(TransferKind::ToContract {
                    value: Box::new(mcurrency(0)),
                    contract: Box::new(mvar_param(GETTER_CB, cb_ty.clone())),
                    arg: v,
                }),
                tunit(),
                s.loc,
            ),
            node => Mterm::new(node, s.type_, s.loc),
        });
        f.kind = FunctionKind::Entry;
    }
    model
}

// ============================================================================
// test_mode
// ============================================================================

/// Name of the instrumented clock variable
pub const TEST_NOW: &str = "_now";

/// Test instrumentation: `now` reads a storage variable `_now` written by a
/// dedicated `_set_now` entry.
pub fn test_mode(model: Model) -> Model {
    let mut model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Const(crate::model::ConstKind::Now) => {
                mvar_storage(TEST_NOW, tdate()).with_loc(s.loc)
            }
            node => Mterm::new(node, s.type_, s.loc),
        })
    });
    model.storage.push(StorageItem {
        id: TEST_NOW.into(),
        kind: StorageKind::Var,
        typ: tdate(),
        default: mtimestamp(0).with_type(tdate()),
        ghost: false,
        loc: Loc::NONE,
    });
    model.functions.push(FunctionDef {
        name: "_set_now".into(),
        kind: FunctionKind::Entry,
        args: vec![Argument {
            name: "v".into(),
            typ: tdate(),
            default: None,
        }],
        eargs: Vec::new(),
        body: massign_storage(TEST_NOW, mvar_param("v", tdate())),
        stovars: vec![TEST_NOW.into()],
        spec: None,
        loc: Loc::NONE,
    });
    model
}

// ============================================================================
// process_event_well
// ============================================================================

/// Route `emit` through the event-well contract: the packed event payload
/// travels as a zero-amount call to the well's `%event` entry.
pub fn process_event_well(model: Model, address: &str) -> Model {
    let address = address.to_string();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Emit { event: _, value } => {
                let packed = Mterm::synthesised(
                    Mnode::Builtin(crate::model::BuiltinFn::Pack, vec![*value]),
                    tbytes(),
                );
                Mterm::new(
                    Mnode::Transfer(TransferKind::Call {
                        value: Box::new(mcurrency(0)),
                        dest: Box::new(maddress(address.clone())),
                        entry: "event".into(),
                        arg: Box::new(packed),
                    }),
                    tunit(),
                    s.loc,
                )
            }
            node => Mterm::new(node, s.type_, s.loc),
        })
    })
}

// ============================================================================
// patch_fa2
// ============================================================================

/// Annotate the argument types of the token-standard entry points so the
/// emitted ABI matches the FA2 interface.
pub fn patch_fa2(model: Model) -> Model {
    let annots: &[(&str, &[&str])] = &[
        ("transfer", &["txs"]),
        ("balance_of", &["requests", "callback"]),
        ("update_operators", &["txs"]),
    ];
    let mut model = model;
    for f in &mut model.functions {
        let Some((_, names)) = annots.iter().find(|(n, _)| *n == f.name) else {
            continue;
        };
        for (arg, annot) in f.args.iter_mut().zip(names.iter()) {
            if arg.typ.annot.is_none() {
                arg.typ.annot = Some((*annot).to_string());
            }
        }
    }
    model
}

// ============================================================================
// fill_stovars
// ============================================================================

/// Attach to each function the storage variables it actually touches
pub fn fill_stovars(model: Model) -> Model {
    let storage_ids: BTreeSet<Ident> = model.storage.iter().map(|i| i.id.clone()).collect();
    let mut model = model;
    for f in &mut model.functions {
        f.stovars = direct_storage_refs(&f.body, &storage_ids)
            .into_iter()
            .collect();
    }
    model
}

// ============================================================================
// filter_api_storage
// ============================================================================

/// Canonicalise the helper operations recorded by the lowerings: dedupe and
/// collapse the `Coll`/`View` variants of the same operation.
pub fn filter_api_storage(model: Model) -> Model {
    let mut model = model;
    let items = std::mem::take(&mut model.api_items);

    // formula-only status merges with an AND: one exec use makes it exec
    let mut merged: BTreeMap<ApiStorage, bool> = BTreeMap::new();
    for item in items {
        merged
            .entry(item.node)
            .and_modify(|f| *f = *f && item.only_formula)
            .or_insert(item.only_formula);
    }

    // a View variant subsumes its Coll counterpart
    let collapse = |node: &ApiStorage| -> Option<ApiStorage> {
        let widened = match node {
            ApiStorage::Contains(a, ApiContainer::Coll) => {
                ApiStorage::Contains(a.clone(), ApiContainer::View)
            }
            ApiStorage::Nth(a, ApiContainer::Coll) => {
                ApiStorage::Nth(a.clone(), ApiContainer::View)
            }
            ApiStorage::Select(a, ApiContainer::Coll) => {
                ApiStorage::Select(a.clone(), ApiContainer::View)
            }
            ApiStorage::Sort(a, ApiContainer::Coll) => {
                ApiStorage::Sort(a.clone(), ApiContainer::View)
            }
            ApiStorage::Count(a, ApiContainer::Coll) => {
                ApiStorage::Count(a.clone(), ApiContainer::View)
            }
            ApiStorage::Sum(a, ApiContainer::Coll) => {
                ApiStorage::Sum(a.clone(), ApiContainer::View)
            }
            ApiStorage::Head(a, ApiContainer::Coll) => {
                ApiStorage::Head(a.clone(), ApiContainer::View)
            }
            ApiStorage::Tail(a, ApiContainer::Coll) => {
                ApiStorage::Tail(a.clone(), ApiContainer::View)
            }
            _ => return None,
        };
        Some(widened)
    };

    let mut out: BTreeMap<ApiStorage, bool> = BTreeMap::new();
    for (node, formula) in &merged {
        match collapse(node) {
            Some(widened) if merged.contains_key(&widened) => {
                let wf = merged[&widened];
                out.entry(widened)
                    .and_modify(|f| *f = *f && (*formula && wf))
                    .or_insert(*formula && wf);
            }
            _ => {
                out.entry(node.clone())
                    .and_modify(|f| *f = *f && *formula)
                    .or_insert(*formula);
            }
        }
    }
    model.api_items = out
        .into_iter()
        .map(|(node, only_formula)| ApiItem { node, only_formula })
        .collect();
    model
}

// ============================================================================
// process_fail
// ============================================================================

/// Once condition labels are no longer needed, a labeled invalid-condition
/// failure keeps only its payload.
pub fn process_fail(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::Fail(arg) = &s.node else { return s };
            let Mnode::Tuple(items) = &arg.node else { return s };
            if items.len() == 3 {
                if let Mnode::String(tag) = &items[0].node {
                    if tag == INVALID_CONDITION {
                        return mfail(items[2].clone()).with_loc(s.loc);
                    }
                }
            }
            s
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_inline_and_disappear() {
        let mut m = Model::new("test");
        m.decls.push(Decl::Var(crate::model::VarDecl {
            name: "rate".into(),
            typ: tnat(),
            kind: VarKind::Constant,
            default: Some(mnat(5)),
            invariants: Vec::new(),
            loc: Loc::NONE,
        }));
        m.functions.push(
            FunctionBuilder::entry("go")
                .body(massign_var("x", mvar_storage("rate", tnat())))
                .build(),
        );
        let out = remove_constant(m);
        assert!(out.decls.is_empty());
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        assert_eq!(value.node, Mnode::Nat(5));
    }

    #[test]
    fn storage_defaults_fold_in_order() {
        let mut m = Model::new("test");
        m.storage.push(StorageItem {
            id: "a".into(),
            kind: StorageKind::Var,
            typ: tint(),
            default: mint(2),
            ghost: false,
            loc: Loc::NONE,
        });
        m.storage.push(StorageItem {
            id: "b".into(),
            kind: StorageKind::Var,
            typ: tint(),
            default: mplus(mvar_storage("a", tint()), mint(3), tint()),
            ghost: false,
            loc: Loc::NONE,
        });
        let out = eval_storage(m);
        assert_eq!(out.storage[1].default, mint(5));
    }

    #[test]
    fn literal_sets_sort_canonically() {
        let mut m = Model::new("test");
        m.storage.push(StorageItem {
            id: "s".into(),
            kind: StorageKind::Var,
            typ: tset(tnat()),
            default: mlit_set(vec![mnat(3), mnat(1), mnat(2)], tnat()),
            ghost: false,
            loc: Loc::NONE,
        });
        let out = sort_container(m);
        assert_eq!(
            out.storage[0].default,
            mlit_set(vec![mnat(1), mnat(2), mnat(3)], tnat())
        );
    }

    #[test]
    fn operation_writers_get_a_final_reverse() {
        let mut m = Model::new("test");
        m.functions.push(
            FunctionBuilder::entry("pay")
                .body(Mterm::synthesised(
                    Mnode::Transfer(TransferKind::Simple {
                        value: Box::new(mcurrency(1)),
                        dest: Box::new(maddress("tz1x")),
                    }),
                    tunit(),
                ))
                .build(),
        );
        m.functions
            .push(FunctionBuilder::entry("quiet").body(mskip()).build());
        let out = reverse_operations(m);
        let Mnode::Seq(items) = &out.functions[0].body.node else { panic!() };
        let Mnode::Assign { kind, value, .. } = &items[1].node else { panic!() };
        assert_eq!(*kind, AssignKind::Operations);
        assert!(matches!(value.node, Mnode::ListReverse(_)));
        // the quiet entry is untouched
        assert_eq!(out.functions[1].body, mskip());
    }

    #[test]
    fn getter_becomes_callback_entry() {
        let mut m = Model::new("test");
        m.functions.push(
            FunctionBuilder::getter("get_total", tnat())
                .body(Mterm::synthesised(
                    Mnode::Return(Box::new(mnat(42))),
                    tnat(),
                ))
                .build(),
        );
        let out = getter_to_entry(m);
        let f = &out.functions[0];
        assert_eq!(f.kind, FunctionKind::Entry);
        assert_eq!(f.args.last().unwrap().name, GETTER_CB);
        assert!(matches!(
            f.body.node,
            Mnode::Transfer(TransferKind::ToContract { .. })
        ));
    }

    #[test]
    fn test_mode_redirects_now() {
        let mut m = Model::new("test");
        m.functions.push(
            FunctionBuilder::entry("go")
                .body(massign_var(
                    "t",
                    Mterm::synthesised(
                        Mnode::Const(crate::model::ConstKind::Now),
                        tdate(),
                    ),
                ))
                .build(),
        );
        let out = test_mode(m);
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        assert!(
            matches!(&value.node, Mnode::Var { id, .. } if id == TEST_NOW),
            "now should read the instrumented clock"
        );
        assert!(out.storage.iter().any(|i| i.id == TEST_NOW));
        assert!(out.functions.iter().any(|f| f.name == "_set_now"));
    }

    #[test]
    fn parameters_become_storage() {
        let mut m = Model::new("test");
        m.parameters.push(crate::model::Parameter {
            name: "owner".into(),
            typ: taddress(),
            default: Some(maddress("tz1abc")),
            constant: true,
            loc: Loc::NONE,
        });
        let mut bus = Bus::new();
        let out = process_parameter(m, &mut bus).unwrap();
        assert!(out.parameters.is_empty());
        let item = out.storage_item("owner").unwrap();
        assert_eq!(item.kind, StorageKind::Const);
    }

    #[test]
    fn missing_parameter_value_is_fatal() {
        let mut m = Model::new("test");
        m.parameters.push(crate::model::Parameter {
            name: "owner".into(),
            typ: taddress(),
            default: None,
            constant: false,
            loc: Loc::NONE,
        });
        let mut bus = Bus::new();
        let err = process_parameter(m, &mut bus).unwrap_err();
        assert!(matches!(
            err.diagnostics[0].kind,
            ErrorKind::NoInitValueForParameter(_)
        ));
    }

    #[test]
    fn emit_routes_through_the_event_well() {
        let mut m = Model::new("test");
        m.functions.push(
            FunctionBuilder::entry("log")
                .body(Mterm::synthesised(
                    Mnode::Emit {
                        event: "minted".into(),
                        value: Box::new(mnat(1)),
                    },
                    tunit(),
                ))
                .build(),
        );
        let out = process_event_well(m, "KT1EventWell");
        let Mnode::Transfer(TransferKind::Call { dest, arg, .. }) = &out.functions[0].body.node
        else {
            panic!("expected event-well call, got {:?}", out.functions[0].body.node)
        };
        assert_eq!(dest.node, Mnode::Address("KT1EventWell".into()));
        assert!(matches!(
            arg.node,
            Mnode::Builtin(crate::model::BuiltinFn::Pack, _)
        ));
    }

    #[test]
    fn metadata_uri_builds_bytes_slot() {
        let m = Model::new("test");
        let mut bus = Bus::new();
        let policy = MetadataPolicy {
            uri: Some("ipfs://QmX"),
            ..MetadataPolicy::default()
        };
        let out = process_metadata(m, &policy, &mut bus).unwrap();
        let item = out.storage_item("metadata").unwrap();
        assert_eq!(item.typ, tbig_map(tstring(), tbytes()));
        let Mnode::LitMap(entries) = &item.default.node else { panic!() };
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn api_items_collapse_coll_into_view() {
        let mut m = Model::new("test");
        m.api_items = vec![
            ApiItem {
                node: ApiStorage::Select("a".into(), ApiContainer::Coll),
                only_formula: false,
            },
            ApiItem {
                node: ApiStorage::Select("a".into(), ApiContainer::View),
                only_formula: true,
            },
            ApiItem {
                node: ApiStorage::Select("a".into(), ApiContainer::Coll),
                only_formula: false,
            },
        ];
        let out = filter_api_storage(m);
        assert_eq!(out.api_items.len(), 1);
        assert_eq!(
            out.api_items[0].node,
            ApiStorage::Select("a".into(), ApiContainer::View)
        );
        assert!(!out.api_items[0].only_formula);
    }

    #[test]
    fn storage_threading_reaches_fixpoint() {
        let mut m = Model::new("test");
        m.storage.push(StorageItem {
            id: "counter".into(),
            kind: StorageKind::Var,
            typ: tnat(),
            default: mnat(0),
            ghost: false,
            loc: Loc::NONE,
        });
        // helper reads the counter; outer calls helper without touching it
        m.functions.push(
            FunctionBuilder::function("helper", tnat())
                .body(Mterm::synthesised(
                    Mnode::Return(Box::new(mvar_storage("counter", tnat()))),
                    tnat(),
                ))
                .build(),
        );
        m.functions.push(
            FunctionBuilder::function("outer", tnat())
                .body(Mterm::synthesised(
                    Mnode::Return(Box::new(Mterm::synthesised(
                        Mnode::App {
                            func: "helper".into(),
                            args: vec![],
                        },
                        tnat(),
                    ))),
                    tnat(),
                ))
                .build(),
        );
        let out = remove_storage_field_in_function(m);
        let outer = out.functions.iter().find(|f| f.name == "outer").unwrap();
        assert_eq!(outer.eargs.len(), 1, "transitive storage use is threaded");
        assert!(any_term(&outer.body, &mut |t| {
            matches!(&t.node, Mnode::App { args, .. } if args.len() == 1)
        }));
    }
}
