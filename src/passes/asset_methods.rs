//! # Asset Method Lowering
//!
//! Rewrites of the high-level asset methods whose decisions directly shape
//! the final code: `add_update` splitting, container-field update
//! decomposition, update merging and the dotted-access clean-ups.
//!
//! ## Pipeline Position
//!
//! ```text
//! normalisation -> [asset methods] -> enum lowering -> asset lowering
//! ```

use crate::diagnostics::{stop_code, Bus, ErrorKind, Stop};
use crate::model::builders::*;
use crate::model::{
    AssetDecl, AssignKind, AssignOp, Ck, Ident, Mnode, Model, Mterm, RatArithOp, Tnode,
    UpdateItem,
};
use crate::traversal::{map_model_terms, rewrite_term};
use crate::utils::get_field_container;

// ============================================================================
// remove_add_update
// ============================================================================

/// Build the full record literal an `add` branch needs from the update
/// items plus field defaults. Fields with no update and no default are an
/// error.
fn build_record_from_updates(
    asset: &AssetDecl,
    key: &Mterm,
    updates: &[UpdateItem],
    bus: &mut Bus,
    loc: crate::model::Loc,
) -> Option<Mterm> {
    let mut fields: Vec<(Ident, Mterm)> = Vec::new();
    for f in &asset.fields {
        if f.shadow {
            continue;
        }
        if asset.is_key_field(&f.name) {
            fields.push((f.name.clone(), key.clone()));
            continue;
        }
        let item = updates.iter().find(|u| u.field == f.name);
        let value = match (item, &f.default) {
            (Some(u), d) => match u.op {
                AssignOp::Assign | AssignOp::Plus | AssignOp::Or => match (u.op, d) {
                    (AssignOp::Plus, Some(d)) => {
                        mplus(d.clone(), u.value.clone(), f.typ.clone())
                    }
                    _ => u.value.clone(),
                },
                AssignOp::Minus | AssignOp::Mult | AssignOp::Div | AssignOp::And => match d {
                    Some(d) => {
                        let node = match u.op {
                            AssignOp::Minus => {
                                Mnode::Minus(Box::new(d.clone()), Box::new(u.value.clone()))
                            }
                            AssignOp::Mult => {
                                Mnode::Mult(Box::new(d.clone()), Box::new(u.value.clone()))
                            }
                            AssignOp::Div => {
                                Mnode::Div(Box::new(d.clone()), Box::new(u.value.clone()))
                            }
                            _ => Mnode::And(Box::new(d.clone()), Box::new(u.value.clone())),
                        };
                        Mterm::new(node, f.typ.clone(), loc)
                    }
                    None => {
                        bus.emit_error(
                            loc,
                            ErrorKind::CannotBuildAsset(asset.name.clone(), f.name.clone()),
                        );
                        return None;
                    }
                },
            },
            (None, Some(d)) => d.clone(),
            (None, None) => match crate::utils::default_for_type(&f.typ) {
                Some(d) => d,
                None => {
                    bus.emit_error(
                        loc,
                        ErrorKind::CannotBuildAsset(asset.name.clone(), f.name.clone()),
                    );
                    return None;
                }
            },
        };
        fields.push((f.name.clone(), value));
    }
    Some(Mterm::new(
        Mnode::LitAsset(fields),
        tasset(asset.name.clone()),
        loc,
    ))
}

/// True when the update list covers every non-shadow value field with `:=`
fn is_full_assign(asset: &AssetDecl, updates: &[UpdateItem]) -> bool {
    let all_assign = updates.iter().all(|u| u.op == AssignOp::Assign);
    let covered = asset
        .value_fields()
        .all(|f| updates.iter().any(|u| u.field == f.name));
    all_assign && covered && updates.len() == asset.value_fields().count()
}

/// `A.add_update(k, upd)` splits into a put (full-record assign), or a
/// contains-guarded update/add choice; through a partition field it becomes
/// the parent-guarded `add_field`/`update` choice.
pub fn remove_add_update(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    let assets: Vec<AssetDecl> = model.assets().cloned().collect();
    let find = |name: &str| assets.iter().find(|a| a.name == name);

    let model2 = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::AddUpdate {
                asset,
                ck,
                key,
                updates,
            } = s.node
            else {
                return s;
            };
            let loc = s.loc;
            let Some(decl) = find(&asset) else {
                bus.emit_error(loc, ErrorKind::AssetNotFound(asset.clone()));
                return Mterm::skip(loc);
            };

            // full-record assign over the plain collection: a single put
            if matches!(ck, Ck::Coll) && is_full_assign(decl, &updates) {
                let Some(record) = build_record_from_updates(decl, &key, &updates, bus, loc)
                else {
                    return Mterm::skip(loc);
                };
                return Mterm::new(
                    Mnode::PutSingleAsset {
                        asset,
                        value: Box::new(record),
                    },
                    tunit(),
                    loc,
                );
            }

            let Some(record) = build_record_from_updates(decl, &key, &updates, bus, loc) else {
                return Mterm::skip(loc);
            };

            match ck {
                Ck::Field {
                    asset: parent,
                    field,
                    key: pk,
                } => {
                    // the child belongs to a partition: guard on the parent
                    // record and choose between update and add_field
                    let inner = mif(
                        Mterm::new(
                            Mnode::ContainsAsset {
                                asset: asset.clone(),
                                ck: Ck::Field {
                                    asset: parent.clone(),
                                    field: field.clone(),
                                    key: pk.clone(),
                                },
                                key: key.clone(),
                            },
                            tbool(),
                            loc,
                        ),
                        Mterm::new(
                            Mnode::UpdateAsset {
                                asset: asset.clone(),
                                key: key.clone(),
                                updates: updates.clone(),
                            },
                            tunit(),
                            loc,
                        ),
                        Some(Mterm::new(
                            Mnode::AddField {
                                asset: parent.clone(),
                                field: field.clone(),
                                key: pk.clone(),
                                value: Box::new(record),
                            },
                            tunit(),
                            loc,
                        )),
                    );
                    mif(
                        Mterm::new(
                            Mnode::ContainsAsset {
                                asset: parent.clone(),
                                ck: Ck::Coll,
                                key: pk.clone(),
                            },
                            tbool(),
                            loc,
                        ),
                        inner,
                        Some(mfail_asset(ASSET_NOT_FOUND, &parent)),
                    )
                }
                ck => {
                    mif(
                        Mterm::new(
                            Mnode::ContainsAsset {
                                asset: asset.clone(),
                                ck: ck.clone(),
                                key: key.clone(),
                            },
                            tbool(),
                            loc,
                        ),
                        Mterm::new(
                            Mnode::UpdateAsset {
                                asset: asset.clone(),
                                key: key.clone(),
                                updates,
                            },
                            tunit(),
                            loc,
                        ),
                        Some(Mterm::new(
                            Mnode::AddAsset {
                                asset,
                                value: Box::new(record),
                            },
                            tunit(),
                            loc,
                        )),
                    )
                }
            }
        })
    });
    bus.stop_if_errors(stop_code::LOWERING)?;
    Ok(model2)
}

// ============================================================================
// remove_container_op_in_update / remove_container_op_in_update_exec
// ============================================================================

fn lower_container_update_item(
    decl: &AssetDecl,
    asset: &str,
    key: &Mterm,
    item: UpdateItem,
    out: &mut Vec<Mterm>,
) -> Option<UpdateItem> {
    let Some(field_decl) = decl.field(&item.field) else {
        return Some(item);
    };
    let loc = item.value.loc;

    // asset-container fields decompose to add_field / remove_field
    if let Ok((_target, _kind)) = get_field_container(decl, &item.field) {
        let elems: Vec<Mterm> = match item.value.node.clone() {
            Mnode::Massets(items) | Mnode::LitList(items) | Mnode::LitSet(items) => items,
            _ => vec![item.value.clone()],
        };
        match item.op {
            AssignOp::Assign => {
                out.push(Mterm::new(
                    Mnode::RemoveAll {
                        asset: asset.to_string(),
                        ck: Ck::Field {
                            asset: asset.to_string(),
                            field: item.field.clone(),
                            key: Box::new(key.clone()),
                        },
                    },
                    tunit(),
                    loc,
                ));
                for e in elems {
                    out.push(Mterm::new(
                        Mnode::AddField {
                            asset: asset.to_string(),
                            field: item.field.clone(),
                            key: Box::new(key.clone()),
                            value: Box::new(e),
                        },
                        tunit(),
                        loc,
                    ));
                }
            }
            AssignOp::Plus => {
                for e in elems {
                    out.push(Mterm::new(
                        Mnode::AddField {
                            asset: asset.to_string(),
                            field: item.field.clone(),
                            key: Box::new(key.clone()),
                            value: Box::new(e),
                        },
                        tunit(),
                        loc,
                    ));
                }
            }
            AssignOp::Minus => {
                for e in elems {
                    out.push(Mterm::new(
                        Mnode::RemoveField {
                            asset: asset.to_string(),
                            field: item.field.clone(),
                            key: Box::new(key.clone()),
                            child_key: Box::new(e),
                        },
                        tunit(),
                        loc,
                    ));
                }
            }
            _ => return Some(item),
        }
        return None;
    }

    // primitive container fields rewrite to set/map surgery on the field
    let is_prim_container = matches!(
        field_decl.typ.node,
        Tnode::Set(_) | Tnode::List(_) | Tnode::Map(_, _) | Tnode::BigMap(_, _)
    );
    if !is_prim_container || item.op == AssignOp::Assign {
        return Some(item);
    }
    let read = Mterm::new(
        Mnode::DotAssetField {
            asset: asset.to_string(),
            key: Box::new(key.clone()),
            field: item.field.clone(),
        },
        field_decl.typ.clone(),
        loc,
    );
    let elems: Vec<Mterm> = match item.value.node.clone() {
        Mnode::LitList(items) | Mnode::LitSet(items) => items,
        _ => vec![item.value.clone()],
    };
    let mut acc = read;
    for e in elems {
        acc = match (&field_decl.typ.node, item.op) {
            (Tnode::Set(_), AssignOp::Plus) => mset_add(acc, e),
            (Tnode::Set(_), AssignOp::Minus) => mset_remove(acc, e),
            (Tnode::List(_), AssignOp::Plus) => mlist_prepend(acc, e),
            (Tnode::Map(_, _) | Tnode::BigMap(_, _), AssignOp::Plus) => match e.node {
                Mnode::Tuple(mut kv) if kv.len() == 2 => {
                    let v = kv.pop().expect("pair");
                    let k = kv.pop().expect("pair");
                    mmap_put(acc, k, v)
                }
                _ => mmap_put(acc.clone(), e, munit()),
            },
            (Tnode::Map(_, _) | Tnode::BigMap(_, _), AssignOp::Minus) => mmap_remove(acc, e),
            _ => acc,
        };
    }
    Some(UpdateItem {
        field: item.field,
        op: AssignOp::Assign,
        value: acc,
    })
}

fn lower_update_containers_in_term(t: Mterm, assets: &[AssetDecl]) -> Mterm {
    rewrite_term(t, &mut |s| {
        let Mnode::UpdateAsset {
            asset,
            key,
            updates,
        } = s.node
        else {
            return s;
        };
        let Some(decl) = assets.iter().find(|a| a.name == asset) else {
            return Mterm::new(
                Mnode::UpdateAsset {
                    asset,
                    key,
                    updates,
                },
                s.type_,
                s.loc,
            );
        };
        let mut extra: Vec<Mterm> = Vec::new();
        let kept: Vec<UpdateItem> = updates
            .into_iter()
            .filter_map(|u| lower_container_update_item(decl, &asset, &key, u, &mut extra))
            .collect();
        if extra.is_empty() {
            return Mterm::new(
                Mnode::UpdateAsset {
                    asset,
                    key,
                    updates: kept,
                },
                s.type_,
                s.loc,
            );
        }
        let mut items = Vec::new();
        if !kept.is_empty() {
            items.push(Mterm::new(
                Mnode::UpdateAsset {
                    asset,
                    key,
                    updates: kept,
                },
                tunit(),
                s.loc,
            ));
        }
        items.extend(extra);
        mseq(items)
    })
}

/// Container fields updated via `:=`, `+=`, `-=` decompose into explicit
/// field surgery, in specification formulas.
pub fn remove_container_op_in_update(model: Model) -> Model {
    let assets: Vec<AssetDecl> = model.assets().cloned().collect();
    map_model_terms(model, &mut |ctx, t| {
        if ctx.fun.is_some() && ctx.spec_id.is_none() && ctx.invariant_id.is_none() {
            return t;
        }
        lower_update_containers_in_term(t, &assets)
    })
}

/// Same decomposition in executable bodies
pub fn remove_container_op_in_update_exec(model: Model) -> Model {
    let assets: Vec<AssetDecl> = model.assets().cloned().collect();
    map_model_terms(model, &mut |ctx, t| {
        if ctx.fun.is_none() || ctx.spec_id.is_some() || ctx.invariant_id.is_some() {
            return t;
        }
        lower_update_containers_in_term(t, &assets)
    })
}

// ============================================================================
// remove_empty_update
// ============================================================================

/// `update(..., [])` and `update_all(..., [])` become skip
pub fn remove_empty_update(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match &s.node {
            Mnode::UpdateAsset { updates, .. } if updates.is_empty() => Mterm::skip(s.loc),
            Mnode::UpdateAll { updates, .. } if updates.is_empty() => Mterm::skip(s.loc),
            _ => s,
        })
    })
}

// ============================================================================
// merge_update
// ============================================================================

fn merge_update_items(mut first: Vec<UpdateItem>, second: Vec<UpdateItem>) -> Vec<UpdateItem> {
    for item in second {
        if item.op == AssignOp::Assign {
            first.retain(|u| u.field != item.field);
        }
        first.push(item);
    }
    first
}

/// Consecutive `update(A, k, l1); update(A, k, l2)` on the same key collapse
pub fn merge_update(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::Seq(items) = s.node else { return s };
            let mut out: Vec<Mterm> = Vec::new();
            for item in items {
                let mut merged = false;
                if let Mnode::UpdateAsset {
                    asset,
                    key,
                    updates,
                } = &item.node
                {
                    if let Some(prev) = out.last_mut() {
                        if let Mnode::UpdateAsset {
                            asset: pa,
                            key: pk,
                            updates: pu,
                        } = &mut prev.node
                        {
                            if pa == asset && pk == key {
                                *pu = merge_update_items(std::mem::take(pu), updates.clone());
                                merged = true;
                            }
                        }
                    }
                }
                if !merged {
                    out.push(item);
                }
            }
            Mterm::new(Mnode::Seq(out), s.type_, s.loc)
        })
    })
}

// ============================================================================
// replace_assignfield_by_update
// ============================================================================

/// `A[k].f op= v` becomes `update(A, k, [(f, op, v)])`
pub fn replace_assignfield_by_update(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Assign {
                op,
                kind: AssignKind::AssetField { asset, field, key },
                value,
            } => Mterm::new(
                Mnode::UpdateAsset {
                    asset,
                    key,
                    updates: vec![UpdateItem {
                        field,
                        op,
                        value: *value,
                    }],
                },
                tunit(),
                s.loc,
            ),
            _ => s,
        })
    })
}

// ============================================================================
// replace_update_by_set
// ============================================================================

fn update_item_to_field(decl: &AssetDecl, bound: &Mterm, item: &UpdateItem) -> (Ident, Mterm) {
    let fty = decl
        .field(&item.field)
        .map(|f| f.typ.clone())
        .unwrap_or_else(tunit);
    let read = mdot(bound.clone(), item.field.clone(), fty.clone());
    let value = match item.op {
        AssignOp::Assign => item.value.clone(),
        AssignOp::Plus if fty.node == Tnode::Rational => Mterm::synthesised(
            Mnode::RatArith(
                RatArithOp::Plus,
                Box::new(read),
                Box::new(item.value.clone()),
            ),
            fty.clone(),
        ),
        AssignOp::Plus => mplus(read, item.value.clone(), fty.clone()),
        AssignOp::Minus if fty.node == Tnode::Rational => Mterm::synthesised(
            Mnode::RatArith(
                RatArithOp::Minus,
                Box::new(read),
                Box::new(item.value.clone()),
            ),
            fty.clone(),
        ),
        AssignOp::Minus => mminus(read, item.value.clone(), fty.clone()),
        AssignOp::Mult => mmult(read, item.value.clone(), fty.clone()),
        AssignOp::Div => Mterm::synthesised(
            Mnode::Div(Box::new(read), Box::new(item.value.clone())),
            fty.clone(),
        ),
        AssignOp::And => Mterm::synthesised(
            Mnode::And(Box::new(read), Box::new(item.value.clone())),
            tbool(),
        ),
        AssignOp::Or => Mterm::synthesised(
            Mnode::Or(Box::new(read), Box::new(item.value.clone())),
            tbool(),
        ),
    };
    (item.field.clone(), value)
}

/// Every `update` becomes get / functional record update / put
pub fn replace_update_by_set(model: Model) -> Model {
    let assets: Vec<AssetDecl> = model.assets().cloned().collect();
    let mut gen = super::TempGen::new();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::UpdateAsset {
                asset,
                key,
                updates,
            } = s.node
            else {
                return s;
            };
            let Some(decl) = assets.iter().find(|a| a.name == asset) else {
                return Mterm::new(
                    Mnode::UpdateAsset {
                        asset,
                        key,
                        updates,
                    },
                    s.type_,
                    s.loc,
                );
            };
            let id = gen.fresh("_a");
            let bound = mvar_local(id.clone(), tasset(asset.clone()));
            let fields: Vec<(Ident, Mterm)> = updates
                .iter()
                .map(|u| update_item_to_field(decl, &bound, u))
                .collect();
            let updated = mrec_update(bound.clone(), fields);
            let put = Mterm::new(
                Mnode::PutSingleAsset {
                    asset: asset.clone(),
                    value: Box::new(Mterm::synthesised(
                        Mnode::MakeAsset {
                            asset: asset.clone(),
                            key: key.clone(),
                            value: Box::new(updated),
                        },
                        tasset(asset.clone()),
                    )),
                },
                tunit(),
                s.loc,
            );
            let get = Mterm::new(
                Mnode::GetAsset {
                    asset: asset.clone(),
                    ck: Ck::Coll,
                    key,
                },
                tasset(asset),
                s.loc,
            );
            mletin(id, get, put)
        })
    })
}

// ============================================================================
// replace_instr_verif
// ============================================================================

/// Under verification semantics, a remove is guarded by containment
pub fn replace_instr_verif(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::RemoveAsset { asset, key } => {
                let contains = Mterm::new(
                    Mnode::ContainsAsset {
                        asset: asset.clone(),
                        ck: Ck::Coll,
                        key: key.clone(),
                    },
                    tbool(),
                    s.loc,
                );
                mif(
                    contains,
                    Mterm::new(Mnode::RemoveAsset { asset, key }, tunit(), s.loc),
                    None,
                )
            }
            _ => s,
        })
    })
}

// ============================================================================
// replace_dotassetfield_by_dot
// ============================================================================

/// `A[k].f` becomes `dot(get(A, k), f)` once `get` is primitive
pub fn replace_dotassetfield_by_dot(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::DotAssetField { asset, key, field } => {
                let get = Mterm::new(
                    Mnode::GetAsset {
                        asset: asset.clone(),
                        ck: Ck::Coll,
                        key,
                    },
                    tasset(asset.clone()),
                    s.loc,
                );
                Mterm::new(
                    Mnode::Dot {
                        expr: Box::new(get),
                        field,
                    },
                    s.type_,
                    s.loc,
                )
            }
            _ => s,
        })
    })
}

// ============================================================================
// remove_duplicate_key
// ============================================================================

/// For a single-field asset whose sole field is the key, storage drops to a
/// set; key-only record literals reduce to the bare key.
pub fn remove_duplicate_key(model: Model) -> Model {
    let single: Vec<(Ident, Ident)> = model
        .assets()
        .filter(|a| crate::utils::is_asset_single_field(a))
        .map(|a| (a.name.clone(), a.keys[0].clone()))
        .collect();
    if single.is_empty() {
        return model;
    }
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match &s.node {
            Mnode::LitAsset(fields) if fields.len() == 1 => {
                let asset = match &s.type_.node {
                    Tnode::Asset(a) => Some(a.clone()),
                    _ => None,
                };
                match asset.and_then(|a| single.iter().find(|(n, _)| *n == a).cloned()) {
                    Some((_, key_field)) if fields[0].0 == key_field => fields[0].1.clone(),
                    _ => s,
                }
            }
            _ => s,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Decl, MapKind};

    fn ledger_model(body: Mterm) -> Model {
        let mut m = Model::new("fa12");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("ledger")
                .key("holder", taddress())
                .field("tokens", tnat())
                .map_kind(MapKind::BigMap)
                .build(),
        ));
        m.functions
            .push(FunctionBuilder::entry("transfer").body(body).build());
        m
    }

    #[test]
    fn add_update_splits_into_contains_choice() {
        let to = mvar_param("to", taddress());
        let value = mvar_param("value", tnat());
        let body = Mterm::synthesised(
            Mnode::AddUpdate {
                asset: "ledger".into(),
                ck: Ck::Coll,
                key: Box::new(to.clone()),
                updates: vec![uitem("tokens", AssignOp::Plus, value)],
            },
            tunit(),
        );
        let mut bus = Bus::new();
        let out = remove_add_update(ledger_model(body), &mut bus).unwrap();
        let Mnode::If {
            cond,
            then_branch,
            else_branch,
        } = &out.functions[0].body.node
        else {
            panic!("expected if, got {:?}", out.functions[0].body.node)
        };
        assert!(matches!(cond.node, Mnode::ContainsAsset { .. }));
        assert!(matches!(then_branch.node, Mnode::UpdateAsset { .. }));
        let else_b = else_branch.as_ref().unwrap();
        let Mnode::AddAsset { value, .. } = &else_b.node else {
            panic!("expected add in else branch")
        };
        // the add branch carries the full record: holder = to, tokens = value
        let Mnode::LitAsset(fields) = &value.node else { panic!() };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "holder");
        assert_eq!(fields[1].0, "tokens");
    }

    #[test]
    fn full_assign_add_update_becomes_put() {
        let body = Mterm::synthesised(
            Mnode::AddUpdate {
                asset: "ledger".into(),
                ck: Ck::Coll,
                key: Box::new(mvar_param("to", taddress())),
                updates: vec![uitem("tokens", AssignOp::Assign, mnat(0))],
            },
            tunit(),
        );
        let mut bus = Bus::new();
        let out = remove_add_update(ledger_model(body), &mut bus).unwrap();
        assert!(matches!(
            out.functions[0].body.node,
            Mnode::PutSingleAsset { .. }
        ));
    }

    #[test]
    fn empty_update_becomes_skip() {
        let body = Mterm::synthesised(
            Mnode::UpdateAsset {
                asset: "ledger".into(),
                key: Box::new(mvar_param("to", taddress())),
                updates: vec![],
            },
            tunit(),
        );
        let out = remove_empty_update(ledger_model(body));
        assert_eq!(out.functions[0].body, mskip());
    }

    #[test]
    fn consecutive_updates_merge_with_override() {
        let k = mvar_param("to", taddress());
        let upd = |items: Vec<UpdateItem>| {
            Mterm::synthesised(
                Mnode::UpdateAsset {
                    asset: "ledger".into(),
                    key: Box::new(k.clone()),
                    updates: items,
                },
                tunit(),
            )
        };
        let body = mseq(vec![
            upd(vec![uitem("tokens", AssignOp::Assign, mnat(1))]),
            upd(vec![uitem("tokens", AssignOp::Assign, mnat(2))]),
        ]);
        let out = merge_update(ledger_model(body));
        let body = &out.functions[0].body;
        let updates = match &body.node {
            Mnode::UpdateAsset { updates, .. } => updates,
            Mnode::Seq(items) if items.len() == 1 => match &items[0].node {
                Mnode::UpdateAsset { updates, .. } => updates,
                other => panic!("expected one update, got {other:?}"),
            },
            other => panic!("expected merged update, got {other:?}"),
        };
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].value, mnat(2));
    }

    #[test]
    fn assignfield_turns_into_update() {
        let body = Mterm::synthesised(
            Mnode::Assign {
                op: AssignOp::Plus,
                kind: AssignKind::AssetField {
                    asset: "ledger".into(),
                    field: "tokens".into(),
                    key: Box::new(mvar_param("to", taddress())),
                },
                value: Box::new(mnat(5)),
            },
            tunit(),
        );
        let out = replace_assignfield_by_update(ledger_model(body));
        let Mnode::UpdateAsset { updates, .. } = &out.functions[0].body.node else {
            panic!()
        };
        assert_eq!(updates[0].op, AssignOp::Plus);
    }

    #[test]
    fn update_by_set_builds_get_let_put() {
        let body = Mterm::synthesised(
            Mnode::UpdateAsset {
                asset: "ledger".into(),
                key: Box::new(mvar_param("to", taddress())),
                updates: vec![uitem("tokens", AssignOp::Assign, mnat(3))],
            },
            tunit(),
        );
        let out = replace_update_by_set(ledger_model(body));
        let Mnode::Letin { value, body, .. } = &out.functions[0].body.node else {
            panic!()
        };
        assert!(matches!(value.node, Mnode::GetAsset { .. }));
        assert!(matches!(body.node, Mnode::PutSingleAsset { .. }));
    }

    #[test]
    fn dotassetfield_lowers_to_dot_on_get() {
        let body = massign_var(
            "x",
            Mterm::synthesised(
                Mnode::DotAssetField {
                    asset: "ledger".into(),
                    key: Box::new(mvar_param("to", taddress())),
                    field: "tokens".into(),
                },
                tnat(),
            ),
        );
        let out = replace_dotassetfield_by_dot(ledger_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::Dot { expr, field } = &value.node else { panic!() };
        assert_eq!(field, "tokens");
        assert!(matches!(expr.node, Mnode::GetAsset { .. }));
    }
}
