//! # Control-flow Lowerings
//!
//! The remaining high-level constructs: guarded gets, deterministic view
//! ordering, indexed iteration, optional declarations, short-circuit
//! booleans, ternaries, list concatenation, bounded `iter`, failing map
//! reads and the instruction/expression container conversions.
//!
//! ## Pipeline Position
//!
//! ```text
//! ... -> [update_all / contain-on-get / explicit sort / nth typing : before remove_asset]
//!     -> [for_to_iter / laziness / ternary / high-level removal / instr forms : after]
//! ```

use crate::model::builders::*;
use crate::model::{
    AssignKind, Ck, ContainerInstrOp, ForBinder, Mnode, Model, Mterm, Pattern, SortDir, Tnode,
};
use crate::traversal::{map_model_terms, map_term, rewrite_term};
use crate::utils::get_asset_key;

// ============================================================================
// remove_update_all
// ============================================================================

/// `update_all(A, coll, l)` becomes a keyed loop of plain updates
pub fn remove_update_all(model: Model) -> Model {
    let keys: std::collections::BTreeMap<String, crate::model::Type> = model
        .assets()
        .map(|a| (a.name.clone(), get_asset_key(a).1))
        .collect();
    let mut gen = super::TempGen::new();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::UpdateAll { asset, ck, updates } = s.node else {
                return s;
            };
            let key_ty = keys.get(&asset).cloned().unwrap_or_else(tnat);
            let coll = match ck {
                Ck::Coll => mvar_storage_col(
                    asset.clone(),
                    tcontainer(asset.clone(), crate::model::ContainerKind::Collection),
                ),
                Ck::View(v) => *v,
                Ck::Field {
                    asset: parent,
                    field,
                    key,
                } => Mterm::synthesised(
                    Mnode::DotAssetField {
                        asset: parent,
                        key,
                        field: field.clone(),
                    },
                    tcontainer(asset.clone(), crate::model::ContainerKind::Partition),
                ),
            };
            let kid = gen.fresh("_kid");
            let kvar = mvar_local(kid.clone(), key_ty);
            mfor(
                ForBinder::Single(kid),
                coll,
                Mterm::new(
                    Mnode::UpdateAsset {
                        asset,
                        key: Box::new(kvar),
                        updates,
                    },
                    tunit(),
                    s.loc,
                ),
            )
            .with_loc(s.loc)
        })
    })
}

// ============================================================================
// add_contain_on_get
// ============================================================================

/// Containment facts proven on the current branch
type Facts = Vec<(String, Mterm)>;

fn facts_of_cond(cond: &Mterm, positive: bool, out: &mut Facts) {
    match &cond.node {
        Mnode::ContainsAsset {
            asset,
            ck: Ck::Coll,
            key,
        } if positive => out.push((asset.clone(), (**key).clone())),
        Mnode::Not(inner) => facts_of_cond(inner, !positive, out),
        Mnode::And(a, b) if positive => {
            facts_of_cond(a, true, out);
            facts_of_cond(b, true, out);
        }
        Mnode::Or(a, b) if !positive => {
            facts_of_cond(a, false, out);
            facts_of_cond(b, false, out);
        }
        _ => {}
    }
}

fn guard_gets(t: Mterm, facts: &Facts) -> Mterm {
    match t.node {
        Mnode::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond = guard_gets(*cond, facts);
            let mut then_facts = facts.clone();
            facts_of_cond(&cond, true, &mut then_facts);
            let mut else_facts = facts.clone();
            facts_of_cond(&cond, false, &mut else_facts);
            Mterm {
                node: Mnode::If {
                    cond: Box::new(cond),
                    then_branch: Box::new(guard_gets(*then_branch, &then_facts)),
                    else_branch: else_branch.map(|e| Box::new(guard_gets(*e, &else_facts))),
                },
                type_: t.type_,
                loc: t.loc,
            }
        }
        _ => {
            let t = map_term(t, &mut |c| guard_gets(c, facts));
            match &t.node {
                Mnode::GetAsset {
                    asset,
                    ck: Ck::Coll,
                    key,
                } => {
                    let proven = facts
                        .iter()
                        .any(|(a, k)| a == asset && *k == **key);
                    if proven {
                        t
                    } else {
                        let contains = Mterm::synthesised(
                            Mnode::ContainsAsset {
                                asset: asset.clone(),
                                ck: Ck::Coll,
                                key: key.clone(),
                            },
                            tbool(),
                        );
                        let ty = t.type_.clone();
                        let loc = t.loc;
                        mif_expr(
                            contains,
                            t.clone(),
                            mfail_str(NOT_FOUND).with_type(ty),
                        )
                        .with_loc(loc)
                    }
                }
                _ => t,
            }
        }
    }
}

/// Guard every unproven `get(A, k)` with its containment check. Facts
/// gained along an `if contains(A, k)` true branch suppress redundant
/// checks.
pub fn add_contain_on_get(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| guard_gets(t, &Facts::new()))
}

// ============================================================================
// add_explicit_sort
// ============================================================================

/// `nth`/`head`/`tail` over an implicit collection get an explicit sort by
/// primary key ascending so traversal order is deterministic.
pub fn add_explicit_sort(model: Model) -> Model {
    let keys: std::collections::BTreeMap<String, String> = model
        .assets()
        .map(|a| (a.name.clone(), get_asset_key(a).0))
        .collect();
    let sorted_coll = |asset: &str| -> Ck {
        let key = keys.get(asset).cloned().unwrap_or_default();
        Ck::View(Box::new(Mterm::synthesised(
            Mnode::Sort {
                asset: asset.to_string(),
                ck: Ck::Coll,
                criteria: vec![(key, SortDir::Asc)],
            },
            tview(asset),
        )))
    };
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Nth {
                asset,
                ck: Ck::Coll,
                index,
            } => {
                let ck = sorted_coll(&asset);
                Mterm::new(Mnode::Nth { asset, ck, index }, s.type_, s.loc)
            }
            Mnode::Head {
                asset,
                ck: Ck::Coll,
                count,
            } => {
                let ck = sorted_coll(&asset);
                Mterm::new(Mnode::Head { asset, ck, count }, s.type_, s.loc)
            }
            Mnode::Tail {
                asset,
                ck: Ck::Coll,
                count,
            } => {
                let ck = sorted_coll(&asset);
                Mterm::new(Mnode::Tail { asset, ck, count }, s.type_, s.loc)
            }
            node => Mterm::new(node, s.type_, s.loc),
        })
    })
}

// ============================================================================
// change_type_of_nth
// ============================================================================

/// `nth` answers a key; where the caller expected the record, a follow-up
/// `get` is inserted.
pub fn change_type_of_nth(model: Model) -> Model {
    let keys: std::collections::BTreeMap<String, crate::model::Type> = model
        .assets()
        .map(|a| (a.name.clone(), get_asset_key(a).1))
        .collect();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::Nth { asset, ck, index } = s.node else { return s };
            let expects_record = matches!(&s.type_.node, Tnode::Asset(a) if *a == asset);
            let key_ty = keys.get(&asset).cloned().unwrap_or_else(tnat);
            let nth = Mterm::new(
                Mnode::Nth {
                    asset: asset.clone(),
                    ck,
                    index,
                },
                key_ty,
                s.loc,
            );
            if expects_record {
                Mterm::new(
                    Mnode::GetAsset {
                        asset: asset.clone(),
                        ck: Ck::Coll,
                        key: Box::new(nth),
                    },
                    s.type_,
                    s.loc,
                )
            } else {
                nth
            }
        })
    })
}

// ============================================================================
// replace_for_to_iter
// ============================================================================

/// `for x in list` becomes an indexed `iter` with an `nth` read per step
pub fn replace_for_to_iter(model: Model) -> Model {
    let mut gen = super::TempGen::new();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::For {
                label,
                binder: ForBinder::Single(x),
                coll,
                body,
            } = s.node
            else {
                return s;
            };
            let Tnode::List(elem_ty) = coll.type_.node.clone() else {
                return Mterm::new(
                    Mnode::For {
                        label,
                        binder: ForBinder::Single(x),
                        coll,
                        body,
                    },
                    s.type_,
                    s.loc,
                );
            };
            let idx = gen.fresh("_idx");
            let idx_var = mvar_local(idx.clone(), tnat());
            let vid = gen.fresh("_tmp");
            let read = mmatch_option(
                mlist_nth((*coll).clone(), idx_var, (*elem_ty).clone()),
                vid.clone(),
                mvar_local(vid, (*elem_ty).clone()),
                mfail_str(OUT_OF_BOUND).with_type((*elem_ty).clone()),
            );
            let inner = mletin(x, read, *body);
            Mterm::new(
                Mnode::Iter {
                    label,
                    id: idx,
                    from: Box::new(mnat(0)),
                    to: Box::new(mminus(mlist_length(*coll), mnat(1), tint())),
                    body: Box::new(inner),
                },
                tunit(),
                s.loc,
            )
        })
    })
}

// ============================================================================
// remove_decl_var_opt
// ============================================================================

fn unwrap_opt_decl(id: String, value: Mterm, fail_with: Option<Box<Mterm>>, body: Mterm) -> Mterm {
    let inner_ty = match &value.type_.node {
        Tnode::Option(t) => (**t).clone(),
        _ => value.type_.clone(),
    };
    let fail = match fail_with {
        Some(e) => mfail(*e),
        None => mfail_str(OPTION_IS_NONE),
    };
    let v = "_tmp_opt".to_string();
    let unwrapped = mmatch_option(
        value,
        v.clone(),
        mvar_local(v, inner_ty.clone()),
        fail.with_type(inner_ty),
    );
    mletin(id, unwrapped, body)
}

/// `var id ?= e : otherwise` becomes a `let` over the unwrapping match
pub fn remove_decl_var_opt(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Seq(items) => {
                let mut out: Vec<Mterm> = Vec::new();
                let mut iter = items.into_iter();
                while let Some(item) = iter.next() {
                    if let Mnode::DeclvarOpt {
                        id,
                        value,
                        fail_with,
                    } = item.node
                    {
                        let rest: Vec<Mterm> = iter.collect();
                        let body = if rest.is_empty() { mskip() } else { mseq(rest) };
                        out.push(unwrap_opt_decl(id, *value, fail_with, body));
                        break;
                    }
                    out.push(item);
                }
                Mterm::new(Mnode::Seq(out), s.type_, s.loc)
            }
            Mnode::DeclvarOpt {
                id,
                value,
                fail_with,
            } => unwrap_opt_decl(id, *value, fail_with, mskip()),
            _ => s,
        })
    })
}

// ============================================================================
// lazy_eval_condition
// ============================================================================

/// Short-circuit `and`/`or` as nested conditionals; the VM's boolean
/// operators are eager.
pub fn lazy_eval_condition(model: Model) -> Model {
    map_model_terms(model, &mut |ctx, t| {
        // logical formulas keep their connectives
        if ctx.spec_id.is_some() || ctx.invariant_id.is_some() {
            return t;
        }
        rewrite_term(t, &mut |s| match s.node {
            Mnode::And(a, b) => {
                mif_expr(*a, mif_expr(*b, mtrue(), mfalse()), mfalse()).with_loc(s.loc)
            }
            Mnode::Or(a, b) => {
                mif_expr(*a, mtrue(), mif_expr(*b, mtrue(), mfalse())).with_loc(s.loc)
            }
            node => Mterm::new(node, s.type_, s.loc),
        })
    })
}

// ============================================================================
// remove_ternary_operator
// ============================================================================

/// `c ? a : b` becomes a conditional; the option form becomes a match
pub fn remove_ternary_operator(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::TernaryBool { cond, then_, else_ } => {
                mif_expr(*cond, *then_, *else_).with_loc(s.loc)
            }
            Mnode::TernaryOption { cond, then_, else_ } => {
                let ty = then_.type_.clone();
                mmatch(
                    *cond,
                    vec![
                        crate::model::MatchArm {
                            pattern: Pattern::Some("_".to_string()),
                            body: *then_,
                        },
                        crate::model::MatchArm {
                            pattern: Pattern::None,
                            body: *else_,
                        },
                    ],
                    ty,
                )
                .with_loc(s.loc)
            }
            node => Mterm::new(node, s.type_, s.loc),
        })
    })
}

// ============================================================================
// remove_high_level_model
// ============================================================================

/// The last high-level conveniences: list concatenation, bounded `iter`,
/// failing map reads and `fail_some`.
pub fn remove_high_level_model(model: Model) -> Model {
    let mut gen = super::TempGen::new();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let loc = s.loc;
            match s.node {
                Mnode::ListConcat(a, b) => {
                    let list_ty = b.type_.clone();
                    let elem_ty = match &list_ty.node {
                        Tnode::List(t) => (**t).clone(),
                        _ => tunit(),
                    };
                    let accu = gen.fresh("_accu");
                    let accu_var = mvar_local(accu.clone(), list_ty);
                    let x = gen.fresh("_tmp");
                    let loop_ = mfor(
                        ForBinder::Single(x.clone()),
                        mlist_reverse(*a),
                        massign_var(
                            accu.clone(),
                            mlist_prepend(accu_var.clone(), mvar_local(x, elem_ty)),
                        ),
                    );
                    mletin(accu, *b, mseq(vec![loop_, accu_var])).with_loc(loc)
                }
                Mnode::Iter {
                    label: _,
                    id,
                    from,
                    to,
                    body,
                } => {
                    let end = gen.fresh("_tmp");
                    let end_var = mvar_local(end.clone(), to.type_.clone());
                    let id_var = mvar_local(id.clone(), from.type_.clone());
                    let step = massign_var(
                        id.clone(),
                        mplus(id_var.clone(), mnat(1), from.type_.clone()),
                    );
                    let while_ = mwhile(
                        mle(id_var, end_var),
                        mseq(vec![*body, step]),
                    );
                    mletin(id, *from, mletin(end, *to, while_)).with_loc(loc)
                }
                Mnode::MapGet(m, k) => {
                    let val_ty = s.type_.clone();
                    let v = gen.fresh("_tmp");
                    mmatch_option(
                        mmap_get_opt(*m, *k, val_ty.clone()),
                        v.clone(),
                        mvar_local(v, val_ty.clone()),
                        mfail_str(ASSET_NOT_FOUND).with_type(val_ty),
                    )
                    .with_loc(loc)
                }
                Mnode::FailSome(e) => {
                    let v = gen.fresh("_tmp");
                    let inner_ty = match &e.type_.node {
                        Tnode::Option(t) => (**t).clone(),
                        _ => e.type_.clone(),
                    };
                    mmatch(
                        *e,
                        vec![
                            crate::model::MatchArm {
                                pattern: Pattern::Some(v.clone()),
                                body: mfail(mvar_local(v, inner_ty)),
                            },
                            crate::model::MatchArm {
                                pattern: Pattern::None,
                                body: mskip(),
                            },
                        ],
                        tunit(),
                    )
                    .with_loc(loc)
                }
                node => Mterm::new(node, s.type_, loc),
            }
        })
    })
}

// ============================================================================
// expr_to_instr / instr_to_expr_exec
// ============================================================================

fn target_reads(container: &Mterm, kind: &AssignKind) -> bool {
    match (&container.node, kind) {
        (Mnode::Var { id, .. }, AssignKind::Var(t)) => id == t,
        (Mnode::Var { id, .. }, AssignKind::StorageVar(t)) => id == t,
        _ => false,
    }
}

/// `x := op(x, args)` becomes the dedicated in-place instruction when the
/// container operand is the assignment target itself.
pub fn expr_to_instr(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::Assign {
                op: crate::model::AssignOp::Assign,
                kind,
                value,
            } = s.node
            else {
                return s;
            };
            let instr = |op: ContainerInstrOp, args: Vec<Mterm>| {
                Mterm::new(
                    Mnode::InstrContainer {
                        op,
                        target: kind.clone(),
                        args,
                    },
                    tunit(),
                    s.loc,
                )
            };
            match value.node {
                Mnode::SetAdd(c, e) if target_reads(&c, &kind) => {
                    instr(ContainerInstrOp::SetAdd, vec![*c, *e])
                }
                Mnode::SetRemove(c, e) if target_reads(&c, &kind) => {
                    instr(ContainerInstrOp::SetRemove, vec![*c, *e])
                }
                Mnode::ListPrepend(c, e) if target_reads(&c, &kind) => {
                    instr(ContainerInstrOp::ListPrepend, vec![*c, *e])
                }
                Mnode::MapPut(c, k, v) if target_reads(&c, &kind) => {
                    instr(ContainerInstrOp::MapPut, vec![*c, *k, *v])
                }
                Mnode::MapRemove(c, k) if target_reads(&c, &kind) => {
                    instr(ContainerInstrOp::MapRemove, vec![*c, *k])
                }
                Mnode::MapUpdate(c, k, v) if target_reads(&c, &kind) => {
                    instr(ContainerInstrOp::MapUpdate, vec![*c, *k, *v])
                }
                node => Mterm::new(
                    Mnode::Assign {
                        op: crate::model::AssignOp::Assign,
                        kind,
                        value: Box::new(Mterm {
                            node,
                            type_: value.type_,
                            loc: value.loc,
                        }),
                    },
                    s.type_,
                    s.loc,
                ),
            }
        })
    })
}

/// Reverse of [`expr_to_instr`]: reconstruct the functional assignment
pub fn instr_to_expr_exec(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::InstrContainer { op, target, args } = s.node else {
                return s;
            };
            let mut args = args.into_iter();
            let c = args.next().expect("container operand");
            let cty = c.type_.clone();
            let value = match op {
                ContainerInstrOp::SetAdd => {
                    mset_add(c, args.next().expect("element"))
                }
                ContainerInstrOp::SetRemove => {
                    mset_remove(c, args.next().expect("element"))
                }
                ContainerInstrOp::ListPrepend => {
                    mlist_prepend(c, args.next().expect("element"))
                }
                ContainerInstrOp::MapPut => {
                    let k = args.next().expect("key");
                    let v = args.next().expect("value");
                    mmap_put(c, k, v)
                }
                ContainerInstrOp::MapRemove => mmap_remove(c, args.next().expect("key")),
                ContainerInstrOp::MapUpdate => {
                    let k = args.next().expect("key");
                    let v = args.next().expect("value");
                    mmap_update(c, k, v)
                }
            };
            Mterm::new(
                Mnode::Assign {
                    op: crate::model::AssignOp::Assign,
                    kind: target,
                    value: Box::new(value.with_type(cty)),
                },
                tunit(),
                s.loc,
            )
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Decl;

    fn entry_model(body: Mterm) -> Model {
        let mut m = Model::new("test");
        m.functions
            .push(FunctionBuilder::entry("go").body(body).build());
        m
    }

    #[test]
    fn and_becomes_nested_conditionals() {
        let body = massign_var(
            "x",
            mand(mvar_local("a", tbool()), mvar_local("b", tbool())),
        );
        let out = lazy_eval_condition(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::If { else_branch, .. } = &value.node else {
            panic!("expected conditional, got {:?}", value.node)
        };
        assert_eq!(else_branch.as_ref().unwrap().node, Mnode::Bool(false));
    }

    #[test]
    fn ternary_becomes_if() {
        let body = massign_var(
            "x",
            Mterm::synthesised(
                Mnode::TernaryBool {
                    cond: Box::new(mvar_local("c", tbool())),
                    then_: Box::new(mint(1)),
                    else_: Box::new(mint(2)),
                },
                tint(),
            ),
        );
        let out = remove_ternary_operator(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        assert!(matches!(value.node, Mnode::If { .. }));
    }

    #[test]
    fn iter_unrolls_to_while() {
        let body = miter("i", mnat(0), mnat(9), mskip());
        let out = remove_high_level_model(entry_model(body));
        let Mnode::Letin { id, body, .. } = &out.functions[0].body.node else {
            panic!("expected let-bound bounds, got {:?}", out.functions[0].body.node)
        };
        assert_eq!(id, "i");
        let Mnode::Letin { body, .. } = &body.node else { panic!() };
        assert!(matches!(body.node, Mnode::While { .. }));
    }

    #[test]
    fn map_get_becomes_match_with_fail() {
        let m_ty = tbig_map(taddress(), tnat());
        let body = massign_var(
            "x",
            mmap_get(
                mvar_storage("ledger", m_ty),
                mvar_param("a", taddress()),
                tnat(),
            ),
        );
        let out = remove_high_level_model(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::Match { expr, arms } = &value.node else {
            panic!("expected match, got {:?}", value.node)
        };
        assert!(matches!(expr.node, Mnode::MapGetOpt(_, _)));
        assert!(arms
            .iter()
            .any(|a| matches!(a.pattern, Pattern::None)
                && matches!(a.body.node, Mnode::Fail(_))));
    }

    #[test]
    fn self_assignment_becomes_in_place_instruction() {
        let set_ty = tset(tnat());
        let body = massign_storage(
            "s",
            mset_add(mvar_storage("s", set_ty), mnat(1)),
        );
        let out = expr_to_instr(entry_model(body));
        let Mnode::InstrContainer { op, target, .. } = &out.functions[0].body.node else {
            panic!("expected instruction form, got {:?}", out.functions[0].body.node)
        };
        assert_eq!(*op, ContainerInstrOp::SetAdd);
        assert_eq!(*target, AssignKind::StorageVar("s".into()));

        // and back
        let out = instr_to_expr_exec(out);
        assert!(matches!(
            out.functions[0].body.node,
            Mnode::Assign { .. }
        ));
    }

    #[test]
    fn unguarded_get_grows_contains_check() {
        let mut m = Model::new("test");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("thing")
                .key("id", tnat())
                .field("v", tstring())
                .build(),
        ));
        let get = Mterm::synthesised(
            Mnode::GetAsset {
                asset: "thing".into(),
                ck: Ck::Coll,
                key: Box::new(mnat(1)),
            },
            tasset("thing"),
        );
        m.functions.push(
            FunctionBuilder::entry("go")
                .body(massign_var("x", get))
                .build(),
        );
        let out = add_contain_on_get(m);
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::If { cond, .. } = &value.node else {
            panic!("expected guard, got {:?}", value.node)
        };
        assert!(matches!(cond.node, Mnode::ContainsAsset { .. }));
    }

    #[test]
    fn proven_get_is_left_alone() {
        let mut m = Model::new("test");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("thing")
                .key("id", tnat())
                .field("v", tstring())
                .build(),
        ));
        let contains = Mterm::synthesised(
            Mnode::ContainsAsset {
                asset: "thing".into(),
                ck: Ck::Coll,
                key: Box::new(mnat(1)),
            },
            tbool(),
        );
        let get = Mterm::synthesised(
            Mnode::GetAsset {
                asset: "thing".into(),
                ck: Ck::Coll,
                key: Box::new(mnat(1)),
            },
            tasset("thing"),
        );
        m.functions.push(
            FunctionBuilder::entry("go")
                .body(mif(contains, massign_var("x", get), None))
                .build(),
        );
        let out = add_contain_on_get(m);
        let Mnode::If { then_branch, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::Assign { value, .. } = &then_branch.node else { panic!() };
        assert!(
            matches!(value.node, Mnode::GetAsset { .. }),
            "no redundant guard inside the proven branch"
        );
    }
}
