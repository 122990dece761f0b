//! # Normalisation Passes
//!
//! Structural clean-ups run before the semantic lowerings: sequence
//! flattening, label discipline, declaration scoping, shadow-variable
//! materialisation and loop labeling.
//!
//! ## Pipeline Position
//!
//! ```text
//! validation -> [normalisation] -> asset method lowering -> ...
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{stop_code, Bus, ErrorKind, Stop};
use crate::model::builders::*;
use crate::model::{
    Decl, Ident, Mnode, Model, Mterm, Specification, StorageItem, StorageKind, Tnode,
};
use crate::traversal::{any_term, map_model_terms, rewrite_term, Ctx};
use crate::utils::{default_for_type, retrieve_all_properties};

// ============================================================================
// prune_formula
// ============================================================================

/// Strip every specification element from the model: declaration and enum
/// invariants, function specs, global specification and security items.
/// Used for pure-code output paths.
pub fn prune_formula(model: Model) -> Model {
    let mut model = model;
    model.decls = model
        .decls
        .into_iter()
        .map(|d| match d {
            Decl::Var(mut v) => {
                v.invariants.clear();
                Decl::Var(v)
            }
            Decl::Enum(mut e) => {
                for c in &mut e.ctors {
                    c.invariants.clear();
                }
                Decl::Enum(e)
            }
            Decl::Asset(mut a) => {
                a.invariants.clear();
                a.fields.retain(|f| !f.shadow);
                Decl::Asset(a)
            }
            other => other,
        })
        .collect();
    for f in &mut model.functions {
        f.spec = None;
    }
    model.specification = Specification::default();
    model.security.clear();
    model
}

// ============================================================================
// prune_properties
// ============================================================================

/// Keep only the property named by `focused`, dropping every other
/// postcondition, invariant and security item.
pub fn prune_properties(model: Model, focused: &str) -> Model {
    let known: BTreeSet<Ident> = retrieve_all_properties(&model)
        .into_iter()
        .map(|p| p.id().clone())
        .collect();
    if !known.contains(focused) {
        return model;
    }
    let mut model = model;
    model
        .specification
        .invariants
        .retain(|i| i.label == focused);
    model
        .specification
        .postconditions
        .retain(|p| p.name == focused);
    for f in &mut model.functions {
        if let Some(spec) = &mut f.spec {
            spec.postconditions.retain(|p| p.name == focused);
        }
    }
    model.security.retain(|s| s.label == focused);
    model
}

// ============================================================================
// flat_sequence
// ============================================================================

fn flatten_seq_items(items: Vec<Mterm>) -> Vec<Mterm> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.node {
            Mnode::Seq(inner) if item.type_.node == Tnode::Unit => {
                out.extend(flatten_seq_items(inner));
            }
            Mnode::Unit => {}
            _ => out.push(item),
        }
    }
    out
}

/// Collapse nested sequences bottom-up: `seq[seq[..]]` flattens, `seq[]`
/// stays the unit placeholder, `seq[x]` becomes `x`.
pub fn flat_sequence(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Seq(items) => {
                let mut items = flatten_seq_items(items);
                if items.len() == 1 {
                    items.remove(0)
                } else {
                    Mterm::new(Mnode::Seq(items), s.type_, s.loc)
                }
            }
            _ => s,
        })
    })
}

// ============================================================================
// remove_label / replace_label_by_mark
// ============================================================================

/// Drop labels entirely: `label L` becomes skip, `mark(L, body)` unwraps
pub fn remove_label(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Label(_) => Mterm::skip(s.loc),
            Mnode::Mark { body, .. } => *body,
            _ => s,
        })
    })
}

fn mark_labels_in_seq(items: Vec<Mterm>) -> Vec<Mterm> {
    let mut out: Vec<Mterm> = Vec::new();
    let mut iter = items.into_iter();
    while let Some(item) = iter.next() {
        if let Mnode::Label(label) = item.node {
            let rest: Vec<Mterm> = iter.collect();
            if rest.is_empty() {
                // free-standing tail label: put it back for the error scan
                out.push(Mterm::new(Mnode::Label(label), item.type_, item.loc));
            } else {
                let suffix = mark_labels_in_seq(rest);
                let body = mseq(suffix);
                out.push(Mterm::new(
                    Mnode::Mark {
                        label,
                        body: Box::new(body),
                    },
                    tunit(),
                    item.loc,
                ));
            }
            return out;
        }
        out.push(item);
    }
    out
}

/// Turn `label L; rest` into `mark(L, rest)` so a label scopes the suffix
/// that follows it. Any label left standing alone afterwards is an error.
pub fn replace_label_by_mark(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    let model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Seq(items) => {
                Mterm::new(Mnode::Seq(mark_labels_in_seq(items)), s.type_, s.loc)
            }
            _ => s,
        })
    });
    for fun in &model.functions {
        any_term(&fun.body, &mut |t| {
            if let Mnode::Label(l) = &t.node {
                bus.emit_error(t.loc, ErrorKind::FreeStandingLabel(l.clone()));
            }
            false
        });
    }
    bus.stop_if_errors(stop_code::SEMANTIC)?;
    Ok(model)
}

// ============================================================================
// replace_declvar_by_letin
// ============================================================================

fn bind_declvars_in_seq(items: Vec<Mterm>) -> Vec<Mterm> {
    let mut out: Vec<Mterm> = Vec::new();
    let mut iter = items.into_iter();
    while let Some(item) = iter.next() {
        if let Mnode::Declvar { id, value } = item.node {
            let rest: Vec<Mterm> = iter.collect();
            let body = if rest.is_empty() {
                mskip()
            } else {
                mseq(bind_declvars_in_seq(rest))
            };
            let ty = body.type_.clone();
            out.push(Mterm::new(
                Mnode::Letin {
                    id,
                    value,
                    body: Box::new(body),
                },
                ty,
                item.loc,
            ));
            return out;
        }
        out.push(item);
    }
    out
}

/// `var id = e; rest` becomes `let id = e in rest`, giving later lowerings
/// proper scoping to work with.
pub fn replace_declvar_by_letin(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Seq(items) => {
                Mterm::new(Mnode::Seq(bind_declvars_in_seq(items)), s.type_, s.loc)
            }
            // a declaration standing alone binds nothing
            Mnode::Declvar { id, value } => {
                let body = mskip();
                Mterm::new(
                    Mnode::Letin {
                        id,
                        value,
                        body: Box::new(body),
                    },
                    tunit(),
                    s.loc,
                )
            }
            _ => s,
        })
    })
}

// ============================================================================
// rename_shadow_variable
// ============================================================================

/// Shadow-spec variables are renamed `v -> v_<entry>` so splicing shadow
/// effects into exec bodies is collision-free.
pub fn rename_shadow_variable(model: Model) -> Model {
    let mut model = model;
    model.functions = model
        .functions
        .into_iter()
        .map(|mut fun| {
            let Some(mut spec) = fun.spec.take() else {
                return fun;
            };
            let renames: BTreeMap<Ident, Ident> = spec
                .variables
                .iter()
                .map(|v| (v.name.clone(), format!("{}_{}", v.name, fun.name)))
                .collect();
            if renames.is_empty() {
                fun.spec = Some(spec);
                return fun;
            }
            for v in &mut spec.variables {
                if let Some(n) = renames.get(&v.name) {
                    v.name = n.clone();
                }
            }
            let mut rename_term = |t: Mterm| {
                rewrite_term(t, &mut |s| match s.node {
                    Mnode::Var { id, scope } => match renames.get(&id) {
                        Some(n) => Mterm::new(
                            Mnode::Var {
                                id: n.clone(),
                                scope,
                            },
                            s.type_,
                            s.loc,
                        ),
                        None => Mterm::new(Mnode::Var { id, scope }, s.type_, s.loc),
                    },
                    Mnode::Assign { op, kind, value } => {
                        let kind = match kind {
                            crate::model::AssignKind::Var(id) => crate::model::AssignKind::Var(
                                renames.get(&id).cloned().unwrap_or(id),
                            ),
                            crate::model::AssignKind::StorageVar(id) => {
                                crate::model::AssignKind::StorageVar(
                                    renames.get(&id).cloned().unwrap_or(id),
                                )
                            }
                            other => other,
                        };
                        Mterm::new(Mnode::Assign { op, kind, value }, s.type_, s.loc)
                    }
                    _ => s,
                })
            };
            spec.effects = spec.effects.into_iter().map(&mut rename_term).collect();
            spec.postconditions = spec
                .postconditions
                .into_iter()
                .map(|mut p| {
                    p.formula = rename_term(p.formula);
                    p
                })
                .collect();
            fun.spec = Some(spec);
            fun
        })
        .collect();
    model
}

// ============================================================================
// assign_loop_label
// ============================================================================

fn ctx_label_base(ctx: &Ctx) -> String {
    match (&ctx.fun, &ctx.spec_id, &ctx.invariant_id) {
        (_, _, Some(inv)) => inv.clone(),
        (_, Some(spec), _) => spec.clone(),
        (Some(f), _, _) => f.name.clone(),
        _ => "top".to_string(),
    }
}

/// Give every unlabeled `for`/`iter`/`while` a unique synthesised label
/// derived from its enclosing function or spec context.
pub fn assign_loop_label(model: Model) -> Model {
    // labels already claimed anywhere in the model
    let mut claimed: BTreeSet<Ident> = BTreeSet::new();
    for fun in &model.functions {
        any_term(&fun.body, &mut |t| {
            match &t.node {
                Mnode::For { label: Some(l), .. }
                | Mnode::Iter { label: Some(l), .. }
                | Mnode::While { label: Some(l), .. }
                | Mnode::Mark { label: l, .. } => {
                    claimed.insert(l.clone());
                }
                _ => {}
            }
            false
        });
    }

    let mut counters: BTreeMap<String, u32> = BTreeMap::new();
    map_model_terms(model, &mut |ctx, t| {
        let base = ctx_label_base(ctx);
        let fresh = |counters: &mut BTreeMap<String, u32>, claimed: &mut BTreeSet<Ident>| {
            loop {
                let n = counters.entry(base.clone()).or_insert(0);
                let candidate = format!("{base}_loop_{n}");
                *n += 1;
                if claimed.insert(candidate.clone()) {
                    return candidate;
                }
            }
        };
        rewrite_term(t, &mut |s| match s.node {
            Mnode::For {
                label: None,
                binder,
                coll,
                body,
            } => Mterm::new(
                Mnode::For {
                    label: Some(fresh(&mut counters, &mut claimed)),
                    binder,
                    coll,
                    body,
                },
                s.type_,
                s.loc,
            ),
            Mnode::Iter {
                label: None,
                id,
                from,
                to,
                body,
            } => Mterm::new(
                Mnode::Iter {
                    label: Some(fresh(&mut counters, &mut claimed)),
                    id,
                    from,
                    to,
                    body,
                },
                s.type_,
                s.loc,
            ),
            Mnode::While {
                label: None,
                cond,
                body,
            } => Mterm::new(
                Mnode::While {
                    label: Some(fresh(&mut counters, &mut claimed)),
                    cond,
                    body,
                },
                s.type_,
                s.loc,
            ),
            _ => s,
        })
    })
}

// ============================================================================
// extend_loop_iter
// ============================================================================

/// Inside invariants, replace the pseudo-variables `toiterate` / `iterated`
/// with `set_to_iterate(c)` / `set_iterated(c)` where `c` is the collection
/// of the loop carrying the invariant's label.
pub fn extend_loop_iter(model: Model) -> Model {
    // label -> collection expression of the labeled loop
    let mut colls: BTreeMap<Ident, Mterm> = BTreeMap::new();
    for fun in &model.functions {
        any_term(&fun.body, &mut |t| {
            if let Mnode::For {
                label: Some(l),
                coll,
                ..
            } = &t.node
            {
                colls.insert(l.clone(), (**coll).clone());
            }
            false
        });
    }

    map_model_terms(model, &mut |ctx, t| {
        let Some(inv) = ctx.invariant_id.clone() else {
            return t;
        };
        let Some(coll) = colls.get(&inv).cloned() else {
            return t;
        };
        rewrite_term(t, &mut |s| match &s.node {
            Mnode::Var { id, .. } if id == "toiterate" => Mterm::new(
                Mnode::SetToIterate(Box::new(coll.clone())),
                s.type_.clone(),
                s.loc,
            ),
            Mnode::Var { id, .. } if id == "iterated" => Mterm::new(
                Mnode::SetIterated(Box::new(coll.clone())),
                s.type_.clone(),
                s.loc,
            ),
            _ => s,
        })
    })
}

// ============================================================================
// transfer_shadow_variable_to_storage
// ============================================================================

/// Move shadow spec variables into storage as ghost items
pub fn transfer_shadow_variable_to_storage(model: Model) -> Model {
    let mut model = model;
    let mut new_items: Vec<StorageItem> = Vec::new();
    for fun in &mut model.functions {
        if let Some(spec) = &mut fun.spec {
            for v in spec.variables.drain(..) {
                let default = v
                    .default
                    .or_else(|| default_for_type(&v.typ))
                    .unwrap_or_else(munit);
                new_items.push(StorageItem {
                    id: v.name,
                    kind: StorageKind::Var,
                    typ: v.typ,
                    default,
                    ghost: true,
                    loc: v.loc,
                });
            }
        }
    }
    model.storage.extend(new_items);
    model
}

// ============================================================================
// concat_shadow_effect_to_exec
// ============================================================================

/// Splice each specification's shadow effects at the end of its owning
/// entry's body.
pub fn concat_shadow_effect_to_exec(model: Model) -> Model {
    let mut model = model;
    for fun in &mut model.functions {
        let Some(spec) = &mut fun.spec else { continue };
        if spec.effects.is_empty() {
            continue;
        }
        let effects: Vec<Mterm> = spec.effects.drain(..).collect();
        let body = std::mem::replace(&mut fun.body, mskip());
        let mut items = vec![body];
        items.extend(effects);
        fun.body = mseq(items);
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FunctionKind;

    fn entry_with_body(body: Mterm) -> Model {
        let mut m = Model::new("test");
        m.functions
            .push(FunctionBuilder::entry("go").body(body).build());
        m
    }

    #[test]
    fn nested_sequences_flatten() {
        let body = mseq(vec![
            mseq(vec![massign_var("a", mint(1)), massign_var("b", mint(2))]),
            massign_var("c", mint(3)),
        ]);
        let out = flat_sequence(entry_with_body(body));
        match &out.functions[0].body.node {
            Mnode::Seq(items) => assert_eq!(items.len(), 3),
            other => panic!("expected flat seq, got {other:?}"),
        }
    }

    #[test]
    fn singleton_sequence_unwraps() {
        let body = mseq(vec![massign_var("a", mint(1))]);
        let out = flat_sequence(entry_with_body(body));
        assert!(matches!(out.functions[0].body.node, Mnode::Assign { .. }));
    }

    #[test]
    fn label_scopes_suffix() {
        let body = mseq(vec![
            massign_var("a", mint(1)),
            Mterm::synthesised(Mnode::Label("l1".into()), tunit()),
            massign_var("b", mint(2)),
            massign_var("c", mint(3)),
        ]);
        let mut bus = Bus::new();
        let out = replace_label_by_mark(entry_with_body(body), &mut bus).unwrap();
        let Mnode::Seq(items) = &out.functions[0].body.node else {
            panic!()
        };
        assert_eq!(items.len(), 2);
        let Mnode::Mark { label, body } = &items[1].node else {
            panic!("expected mark")
        };
        assert_eq!(label, "l1");
        let Mnode::Seq(suffix) = &body.node else { panic!() };
        assert_eq!(suffix.len(), 2);
    }

    #[test]
    fn tail_label_is_an_error() {
        let body = mseq(vec![
            massign_var("a", mint(1)),
            Mterm::synthesised(Mnode::Label("dangling".into()), tunit()),
        ]);
        let mut bus = Bus::new();
        let err = replace_label_by_mark(entry_with_body(body), &mut bus).unwrap_err();
        assert!(matches!(
            err.diagnostics[0].kind,
            ErrorKind::FreeStandingLabel(_)
        ));
    }

    #[test]
    fn declvar_becomes_letin_scoping_the_rest() {
        let body = mseq(vec![
            Mterm::synthesised(
                Mnode::Declvar {
                    id: "x".into(),
                    value: Box::new(mint(1)),
                },
                tunit(),
            ),
            massign_var("y", mvar_local("x", tint())),
        ]);
        let out = replace_declvar_by_letin(entry_with_body(body));
        let out = flat_sequence(out);
        let Mnode::Letin { id, body, .. } = &out.functions[0].body.node else {
            panic!("expected letin, got {:?}", out.functions[0].body.node)
        };
        assert_eq!(id, "x");
        assert!(matches!(body.node, Mnode::Assign { .. }));
    }

    #[test]
    fn loops_get_unique_labels() {
        let body = mseq(vec![
            mfor(
                crate::model::ForBinder::Single("i".into()),
                mvar_storage_col("xs", tset(tnat())),
                mskip(),
            ),
            mfor(
                crate::model::ForBinder::Single("j".into()),
                mvar_storage_col("xs", tset(tnat())),
                mskip(),
            ),
        ]);
        let out = assign_loop_label(entry_with_body(body));
        let mut labels = Vec::new();
        any_term(&out.functions[0].body, &mut |t| {
            if let Mnode::For { label: Some(l), .. } = &t.node {
                labels.push(l.clone());
            }
            false
        });
        assert_eq!(labels.len(), 2);
        assert_ne!(labels[0], labels[1]);
        assert!(labels[0].starts_with("go_loop_"));
    }

    #[test]
    fn shadow_variables_move_to_ghost_storage() {
        let mut m = Model::new("test");
        let mut spec = Specification::default();
        spec.variables.push(crate::model::SpecVariable {
            name: "total".into(),
            typ: tint(),
            default: None,
            loc: crate::model::Loc::NONE,
        });
        m.functions.push(
            FunctionBuilder::entry("go")
                .body(mskip())
                .spec(spec)
                .build(),
        );
        let m = rename_shadow_variable(m);
        let m = transfer_shadow_variable_to_storage(m);
        assert_eq!(m.storage.len(), 1);
        assert_eq!(m.storage[0].id, "total_go");
        assert!(m.storage[0].ghost);
        assert_eq!(m.functions[0].kind, FunctionKind::Entry);
    }

    #[test]
    fn shadow_effects_append_to_body() {
        let mut m = Model::new("test");
        let mut spec = Specification::default();
        spec.effects.push(massign_storage("total", mint(1)));
        m.functions.push(
            FunctionBuilder::entry("go")
                .body(massign_var("x", mint(0)))
                .spec(spec)
                .build(),
        );
        let m = concat_shadow_effect_to_exec(m);
        let Mnode::Seq(items) = &m.functions[0].body.node else {
            panic!()
        };
        assert_eq!(items.len(), 2);
    }
}
