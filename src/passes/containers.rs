//! # Container Lowerings
//!
//! Multi-key flattening, the iterable-big-map triple encoding, container
//! arithmetic expansion, asset-literal fixing and the final key/value split
//! of asset literals.
//!
//! ## Pipeline Position
//!
//! ```text
//! fix_container / extract_item_collection / process_multi_keys : before remove_asset
//! split_key_values / remove_iterable_big_map / process_arith_container : after
//! ```

use std::collections::BTreeMap;

use crate::model::builders::*;
use crate::model::{
    AssetDecl, AssetField, AssignKind, ContainerKind, Decl, ForBinder, Ident, Mnode, Model,
    Mterm, Tnode, Type,
};
use crate::traversal::{map_model_terms, map_model_types, rewrite_term};
use crate::utils::{flat_key_type, FLAT_KEY_ID};

// ============================================================================
// process_multi_keys
// ============================================================================

/// Assets with two or more primary keys are flattened to a synthetic tuple
/// key; member-key reads become tuple accesses on it.
pub fn process_multi_keys(model: Model) -> Model {
    // asset -> ordered member keys and their types
    let mut multi: BTreeMap<Ident, Vec<(Ident, Type)>> = BTreeMap::new();
    for asset in model.assets() {
        if asset.keys.len() >= 2 {
            let keys = asset
                .keys
                .iter()
                .filter_map(|k| asset.field(k).map(|f| (k.clone(), f.typ.clone())))
                .collect();
            multi.insert(asset.name.clone(), keys);
        }
    }
    if multi.is_empty() {
        return model;
    }

    let mut model = model;
    model.decls = model
        .decls
        .into_iter()
        .map(|d| match d {
            Decl::Asset(mut a) if multi.contains_key(&a.name) => {
                let tuple_ty = flat_key_type(&a);
                let keys = a.keys.clone();
                a.fields.retain(|f| !keys.contains(&f.name));
                a.fields.insert(
                    0,
                    AssetField {
                        name: FLAT_KEY_ID.to_string(),
                        typ: tuple_ty.clone(),
                        original_type: tuple_ty,
                        default: None,
                        shadow: false,
                        loc: a.loc,
                    },
                );
                a.keys = vec![FLAT_KEY_ID.to_string()];
                Decl::Asset(a)
            }
            other => other,
        })
        .collect();

    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match &s.node {
            // member-key read on an asset value
            Mnode::Dot { expr, field } => {
                let Some(keys) = expr.type_.as_asset().and_then(|a| multi.get(a)) else {
                    return s;
                };
                let Some(idx) = keys.iter().position(|(k, _)| k == field) else {
                    return s;
                };
                let tuple_ty = ttuple(keys.iter().map(|(_, t)| t.clone()).collect());
                let read = mdot((**expr).clone(), FLAT_KEY_ID, tuple_ty);
                mtuple_access(read, idx, keys.len(), s.type_.clone()).with_loc(s.loc)
            }
            // literal assets fold their member keys into the tuple field
            Mnode::LitAsset(fields) => {
                let Some(keys) = s.type_.as_asset().and_then(|a| multi.get(a)) else {
                    return s;
                };
                let parts: Option<Vec<Mterm>> = keys
                    .iter()
                    .map(|(k, _)| {
                        fields.iter().find(|(n, _)| n == k).map(|(_, v)| v.clone())
                    })
                    .collect();
                let Some(parts) = parts else { return s };
                let mut out: Vec<(Ident, Mterm)> =
                    vec![(FLAT_KEY_ID.to_string(), mtuple(parts))];
                out.extend(
                    fields
                        .iter()
                        .filter(|(n, _)| !keys.iter().any(|(k, _)| k == n))
                        .cloned(),
                );
                Mterm::new(Mnode::LitAsset(out), s.type_.clone(), s.loc)
            }
            _ => s,
        })
    })
}

// ============================================================================
// fix_container
// ============================================================================

/// In an asset literal, a list literal sitting in a partition field is a
/// collection of constructed child assets
pub fn fix_container(model: Model) -> Model {
    let mut partition_fields: BTreeMap<(Ident, Ident), Ident> = BTreeMap::new();
    for asset in model.assets() {
        for f in &asset.fields {
            if let Tnode::Container(target, ContainerKind::Partition) = &f.original_type.node {
                partition_fields
                    .insert((asset.name.clone(), f.name.clone()), target.clone());
            }
        }
    }
    if partition_fields.is_empty() {
        return model;
    }
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::LitAsset(fields) = &s.node else { return s };
            let Some(asset) = s.type_.as_asset().cloned() else { return s };
            let fields: Vec<(Ident, Mterm)> = fields
                .iter()
                .map(|(name, v)| {
                    let is_partition =
                        partition_fields.contains_key(&(asset.clone(), name.clone()));
                    let v = match (&v.node, is_partition) {
                        (Mnode::LitList(items), true) => Mterm::new(
                            Mnode::Massets(items.clone()),
                            v.type_.clone(),
                            v.loc,
                        ),
                        _ => v.clone(),
                    };
                    (name.clone(), v)
                })
                .collect();
            Mterm::new(Mnode::LitAsset(fields), s.type_.clone(), s.loc)
        })
    })
}

// ============================================================================
// extract_item_collection_from_add_asset
// ============================================================================

/// `add(A, {..; f = [c1, c2]})` becomes the add with an emptied field
/// followed by one `add_field` per element.
pub fn extract_item_collection_from_add_asset(model: Model) -> Model {
    let assets: Vec<AssetDecl> = model.assets().cloned().collect();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::AddAsset { asset, value } = &s.node else { return s };
            let Mnode::LitAsset(fields) = &value.node else { return s };
            let Some(decl) = assets.iter().find(|a| a.name == *asset) else {
                return s;
            };
            let Some(key) = crate::utils::extract_key_value_from_masset(decl, value) else {
                return s;
            };

            let mut extracted: Vec<Mterm> = Vec::new();
            let mut new_fields: Vec<(Ident, Mterm)> = Vec::new();
            for (name, v) in fields {
                let container = matches!(
                    decl.field(name).map(|f| &f.original_type.node),
                    Some(Tnode::Container(
                        _,
                        ContainerKind::Partition | ContainerKind::Aggregate
                    ))
                );
                let elems = match (&v.node, container) {
                    (Mnode::Massets(items), true) | (Mnode::LitList(items), true) => {
                        Some(items.clone())
                    }
                    _ => None,
                };
                match elems {
                    Some(items) if !items.is_empty() => {
                        for c in items {
                            extracted.push(Mterm::new(
                                Mnode::AddField {
                                    asset: asset.clone(),
                                    field: name.clone(),
                                    key: Box::new(key.clone()),
                                    value: Box::new(c),
                                },
                                tunit(),
                                s.loc,
                            ));
                        }
                        new_fields.push((
                            name.clone(),
                            Mterm::new(Mnode::Massets(Vec::new()), v.type_.clone(), v.loc),
                        ));
                    }
                    _ => new_fields.push((name.clone(), v.clone())),
                }
            }
            if extracted.is_empty() {
                return s;
            }
            let add = Mterm::new(
                Mnode::AddAsset {
                    asset: asset.clone(),
                    value: Box::new(Mterm::new(
                        Mnode::LitAsset(new_fields),
                        value.type_.clone(),
                        value.loc,
                    )),
                },
                tunit(),
                s.loc,
            );
            let mut items = vec![add];
            items.extend(extracted);
            mseq(items)
        })
    })
}

// ============================================================================
// split_key_values
// ============================================================================

/// Remaining asset literals become explicit key/record pairs, and the asset
/// declarations leave the model for good.
pub fn split_key_values(model: Model) -> Model {
    let assets: Vec<AssetDecl> = model.assets().cloned().collect();
    if assets.is_empty() {
        return model;
    }
    let value_record = |decl: &AssetDecl, fields: &[(Ident, Mterm)]| -> Mterm {
        let out: Vec<(Ident, Mterm)> = fields
            .iter()
            .filter(|(n, _)| !decl.is_key_field(n))
            .cloned()
            .collect();
        Mterm::synthesised(Mnode::LitRecord(out), trecord(decl.name.clone()))
    };

    let model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::LitAsset(fields) = &s.node else { return s };
            let Some(decl) = s
                .type_
                .as_asset()
                .and_then(|a| assets.iter().find(|d| d.name == *a))
            else {
                return s;
            };
            let Some(key) = crate::utils::extract_key_value_from_masset(decl, &s) else {
                return s;
            };
            let record = value_record(decl, fields);
            mtuple(vec![key, record]).with_loc(s.loc)
        })
    });

    let mut model = model;
    model.decls.retain(|d| !matches!(d, Decl::Asset(_)));
    model
}

// ============================================================================
// remove_iterable_big_map
// ============================================================================

fn is_ibm(ty: &Type) -> bool {
    matches!(ty.node, Tnode::IterableBigMap(_, _))
}

fn ibm_key_value(ty: &Type) -> (Type, Type) {
    match &ty.node {
        Tnode::IterableBigMap(k, v) => ((**k).clone(), (**v).clone()),
        _ => unreachable!("iterable big map type expected"),
    }
}

/// The storage triple an iterable big map lowers to:
/// `(big_map<K, (nat, V)>, big_map<nat, K>, nat)`
pub fn ibm_triple_type(k: &Type, v: &Type) -> Type {
    ttuple(vec![
        tbig_map(k.clone(), ttuple(vec![tnat(), v.clone()])),
        tbig_map(tnat(), k.clone()),
        tnat(),
    ])
}

struct IbmCtx {
    key_ty: Type,
    val_ty: Type,
}

impl IbmCtx {
    fn of(ty: &Type) -> Self {
        let (key_ty, val_ty) = ibm_key_value(ty);
        IbmCtx { key_ty, val_ty }
    }

    fn triple(&self) -> Type {
        ibm_triple_type(&self.key_ty, &self.val_ty)
    }

    fn entry_ty(&self) -> Type {
        ttuple(vec![tnat(), self.val_ty.clone()])
    }

    fn values(&self, m: &Mterm) -> Mterm {
        mtuple_access(
            m.clone().with_type(self.triple()),
            0,
            3,
            tbig_map(self.key_ty.clone(), self.entry_ty()),
        )
    }

    fn index(&self, m: &Mterm) -> Mterm {
        mtuple_access(
            m.clone().with_type(self.triple()),
            1,
            3,
            tbig_map(tnat(), self.key_ty.clone()),
        )
    }

    fn size(&self, m: &Mterm) -> Mterm {
        mtuple_access(m.clone().with_type(self.triple()), 2, 3, tnat())
    }

    /// `(values, index, size)` tuple from the three components
    fn pack(&self, values: Mterm, index: Mterm, size: Mterm) -> Mterm {
        mtuple(vec![values, index, size])
    }

    /// Insertion: existing keys keep their position, new keys append
    fn lower_put(&self, target: AssignKind, m: &Mterm, k: Mterm, v: Mterm) -> Mterm {
        let values = self.values(m);
        let index = self.index(m);
        let size = self.size(m);
        let existing_idx = mtuple_access(
            mmap_get(values.clone(), k.clone(), self.entry_ty()),
            0,
            2,
            tnat(),
        );
        let keep = massign(
            target.clone(),
            self.pack(
                mmap_put(
                    values.clone(),
                    k.clone(),
                    mtuple(vec![existing_idx, v.clone()]),
                ),
                index.clone(),
                size.clone(),
            ),
        );
        let next = mplus(size.clone(), mnat(1), tnat());
        let append = massign(
            target,
            self.pack(
                mmap_put(values.clone(), k.clone(), mtuple(vec![next.clone(), v])),
                mmap_put(index, next.clone(), k.clone()),
                next,
            ),
        );
        mif(mmap_contains(values, k), keep, Some(append))
    }

    /// Removal: the last entry is swapped into the removed slot so the
    /// position index stays dense
    fn lower_remove(&self, target: AssignKind, m: &Mterm, k: Mterm) -> Mterm {
        let values = self.values(m);
        let index = self.index(m);
        let size = self.size(m);

        let e = "_ibm_e".to_string();
        let e_var = mvar_local(e.clone(), self.entry_ty());
        let idx = mtuple_access(e_var.clone(), 0, 2, tnat());
        let last_key = "_ibm_lk".to_string();
        let lk_var = mvar_local(last_key.clone(), self.key_ty.clone());
        let last_val = "_ibm_lv".to_string();
        let lv_var = mvar_local(last_val.clone(), self.entry_ty());
        let new_size = Mterm::synthesised(
            Mnode::Builtin(
                crate::model::BuiltinFn::Abs,
                vec![mminus(size.clone(), mnat(1), tint())],
            ),
            tnat(),
        );

        // swap path: move the entry at the last position into the hole
        let swap = mletin(
            last_key.clone(),
            mmap_get(index.clone(), size.clone(), self.key_ty.clone()),
            mletin(
                last_val.clone(),
                mmap_get(values.clone(), lk_var.clone(), self.entry_ty()),
                massign(
                    target.clone(),
                    self.pack(
                        mmap_put(
                            mmap_remove(values.clone(), k.clone()),
                            lk_var.clone(),
                            mtuple(vec![
                                idx.clone(),
                                mtuple_access(lv_var, 1, 2, self.val_ty.clone()),
                            ]),
                        ),
                        mmap_put(
                            mmap_remove(index.clone(), size.clone()),
                            idx.clone(),
                            lk_var,
                        ),
                        new_size.clone(),
                    ),
                ),
            ),
        );
        // tail path: the removed entry was the last one
        let pop = massign(
            target,
            self.pack(
                mmap_remove(values.clone(), k.clone()),
                mmap_remove(index, size.clone()),
                new_size,
            ),
        );
        let body = mif(mlt(idx, size), swap, Some(pop));
        mif(
            mmap_contains(values.clone(), k.clone()),
            mletin(e, mmap_get(values, k, self.entry_ty()), body),
            None,
        )
    }
}

/// Replace every `iterable_big_map<K, V>` with the value/index/size triple,
/// rewriting put, remove, lookup, length and iteration to maintain the two
/// maps and the counter.
pub fn remove_iterable_big_map(model: Model) -> Model {
    let mut gen = super::TempGen::new();
    let model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let loc = s.loc;
            match &s.node {
                Mnode::Assign { op: _, kind, value } => match &value.node {
                    Mnode::MapPut(m, k, v) if is_ibm(&m.type_) => {
                        let ctx = IbmCtx::of(&m.type_);
                        ctx.lower_put(kind.clone(), m, (**k).clone(), (**v).clone())
                            .with_loc(loc)
                    }
                    Mnode::MapRemove(m, k) if is_ibm(&m.type_) => {
                        let ctx = IbmCtx::of(&m.type_);
                        ctx.lower_remove(kind.clone(), m, (**k).clone()).with_loc(loc)
                    }
                    Mnode::MapUpdate(m, k, opt) if is_ibm(&m.type_) => {
                        let ctx = IbmCtx::of(&m.type_);
                        let vid = gen.fresh("_ibm_v");
                        let some = ctx.lower_put(
                            kind.clone(),
                            m,
                            (**k).clone(),
                            mvar_local(vid.clone(), ctx.val_ty.clone()),
                        );
                        let none = ctx.lower_remove(kind.clone(), m, (**k).clone());
                        mmatch_option((**opt).clone(), vid, some, none).with_loc(loc)
                    }
                    _ => s,
                },
                Mnode::MapGet(m, k) if is_ibm(&m.type_) => {
                    let ctx = IbmCtx::of(&m.type_);
                    mtuple_access(
                        mmap_get(ctx.values(m), (**k).clone(), ctx.entry_ty()),
                        1,
                        2,
                        ctx.val_ty.clone(),
                    )
                    .with_loc(loc)
                }
                Mnode::MapGetOpt(m, k) if is_ibm(&m.type_) => {
                    let ctx = IbmCtx::of(&m.type_);
                    let eid = gen.fresh("_ibm_e");
                    let e_var = mvar_local(eid.clone(), ctx.entry_ty());
                    mmatch_option(
                        mmap_get_opt(ctx.values(m), (**k).clone(), ctx.entry_ty()),
                        eid,
                        msome(mtuple_access(e_var, 1, 2, ctx.val_ty.clone())),
                        mnone(ctx.val_ty.clone()),
                    )
                    .with_loc(loc)
                }
                Mnode::MapContains(m, k) if is_ibm(&m.type_) => {
                    let ctx = IbmCtx::of(&m.type_);
                    mmap_contains(ctx.values(m), (**k).clone()).with_loc(loc)
                }
                Mnode::MapLength(m) if is_ibm(&m.type_) => {
                    let ctx = IbmCtx::of(&m.type_);
                    ctx.size(m).with_loc(loc)
                }
                // insertion-order iteration via the position index
                Mnode::For {
                    label,
                    binder,
                    coll,
                    body,
                } if is_ibm(&coll.type_) => {
                    let ctx = IbmCtx::of(&coll.type_);
                    let i = gen.fresh("_idx");
                    let i_var = mvar_local(i.clone(), tnat());
                    let (kid, vid) = match binder {
                        ForBinder::Single(k) => (k.clone(), None),
                        ForBinder::KeyValue(k, v) => (k.clone(), Some(v.clone())),
                    };
                    let k_read = mmap_get(ctx.index(coll), i_var.clone(), ctx.key_ty.clone());
                    let mut inner = (**body).clone();
                    if let Some(vid) = vid {
                        let v_read = mtuple_access(
                            mmap_get(
                                ctx.values(coll),
                                mvar_local(kid.clone(), ctx.key_ty.clone()),
                                ctx.entry_ty(),
                            ),
                            1,
                            2,
                            ctx.val_ty.clone(),
                        );
                        inner = mletin(vid, v_read, inner);
                    }
                    let inner = mletin(kid, k_read, inner);
                    Mterm::new(
                        Mnode::Iter {
                            label: label.clone(),
                            id: i,
                            from: Box::new(mnat(1)),
                            to: Box::new(ctx.size(coll)),
                            body: Box::new(inner),
                        },
                        tunit(),
                        loc,
                    )
                }
                _ => s,
            }
        })
    });

    map_model_types(model, &mut |ty| {
        ty.rewrite(&mut |t| match &t.node {
            Tnode::IterableBigMap(k, v) => {
                let mut out = ibm_triple_type(k, v);
                out.annot = t.annot.clone();
                out
            }
            _ => t,
        })
    })
}

// ============================================================================
// process_arith_container
// ============================================================================

/// `set + list`, `map + list of (k, v)` and their `-` analogs become
/// explicit element-at-a-time folds.
pub fn process_arith_container(model: Model) -> Model {
    let mut gen = super::TempGen::new();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let loc = s.loc;
            let (a, b, add) = match &s.node {
                Mnode::Plus(a, b) => (a, b, true),
                Mnode::Minus(a, b) => (a, b, false),
                _ => return s,
            };
            let elem_step = |acc: Mterm, e: Mterm| -> Option<Mterm> {
                match (&acc.type_.node, add) {
                    (Tnode::Set(_), true) => Some(mset_add(acc, e)),
                    (Tnode::Set(_), false) => Some(mset_remove(acc, e)),
                    (Tnode::Map(_, _) | Tnode::BigMap(_, _), true) => match e.node {
                        Mnode::Tuple(mut kv) if kv.len() == 2 => {
                            let v = kv.pop().expect("pair");
                            let k = kv.pop().expect("pair");
                            Some(mmap_put(acc, k, v))
                        }
                        _ => None,
                    },
                    (Tnode::Map(_, _) | Tnode::BigMap(_, _), false) => {
                        Some(mmap_remove(acc, e))
                    }
                    _ => None,
                }
            };
            let container = matches!(
                a.type_.node,
                Tnode::Set(_) | Tnode::Map(_, _) | Tnode::BigMap(_, _)
            );
            let Tnode::List(elem_ty) = &b.type_.node else { return s };
            if !container {
                return s;
            }
            // literal element lists unroll statically
            if let Mnode::LitList(items) = &b.node {
                let mut acc = (**a).clone();
                for e in items {
                    match elem_step(acc.clone(), e.clone()) {
                        Some(next) => acc = next,
                        None => return s,
                    }
                }
                return acc.with_loc(loc);
            }
            // general shape folds through an accumulator
            let accu = gen.fresh("_accu");
            let accu_var = mvar_local(accu.clone(), a.type_.clone());
            let x = gen.fresh("_tmp");
            let x_var = mvar_local(x.clone(), (**elem_ty).clone());
            let Some(step) = elem_step(accu_var.clone(), x_var) else {
                return s;
            };
            let loop_ = mfor(
                ForBinder::Single(x),
                (**b).clone(),
                massign_var(accu.clone(), step),
            );
            mletin(accu, (**a).clone(), mseq(vec![loop_, accu_var])).with_loc(loc)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MapKind;

    fn entry_model(body: Mterm) -> Model {
        let mut m = Model::new("test");
        m.functions
            .push(FunctionBuilder::entry("go").body(body).build());
        m
    }

    #[test]
    fn allowance_keys_flatten_to_tuple() {
        let mut m = Model::new("fa12");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("allowance")
                .key("owner", taddress())
                .key("spender", taddress())
                .field("amount", tnat())
                .map_kind(MapKind::BigMap)
                .build(),
        ));
        let out = process_multi_keys(m);
        let a = out.get_asset("allowance").unwrap();
        assert_eq!(a.keys, vec![FLAT_KEY_ID.to_string()]);
        let kf = a.field(FLAT_KEY_ID).unwrap();
        assert_eq!(kf.typ, ttuple(vec![taddress(), taddress()]));
        assert!(a.field("owner").is_none());
    }

    #[test]
    fn member_key_read_becomes_tuple_access() {
        let mut m = Model::new("fa12");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("allowance")
                .key("owner", taddress())
                .key("spender", taddress())
                .field("amount", tnat())
                .build(),
        ));
        let the = mvar_local("the", tasset("allowance"));
        m.functions.push(
            FunctionBuilder::entry("go")
                .body(massign_var("x", mdot(the, "spender", taddress())))
                .build(),
        );
        let out = process_multi_keys(m);
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::TupleAccess { index, arity, .. } = &value.node else {
            panic!("expected tuple access, got {:?}", value.node)
        };
        assert_eq!((*index, *arity), (1, 2));
    }

    #[test]
    fn ibm_type_lowers_to_triple() {
        assert_eq!(
            ibm_triple_type(&tstring(), &tnat()),
            ttuple(vec![
                tbig_map(tstring(), ttuple(vec![tnat(), tnat()])),
                tbig_map(tnat(), tstring()),
                tnat()
            ])
        );
    }

    #[test]
    fn ibm_put_appends_and_keeps_existing_positions() {
        let m_ty = titerable_big_map(tstring(), tnat());
        let body = massign_storage(
            "m",
            mmap_put(mvar_storage("m", m_ty.clone()), mstring("a"), mnat(1)),
        );
        let out = remove_iterable_big_map(entry_model(body));
        let Mnode::If {
            cond, else_branch, ..
        } = &out.functions[0].body.node
        else {
            panic!("expected contains choice, got {:?}", out.functions[0].body.node)
        };
        assert!(matches!(cond.node, Mnode::MapContains(_, _)));
        // the append path writes all three components
        let else_b = else_branch.as_ref().unwrap();
        let Mnode::Assign { value, .. } = &else_b.node else { panic!() };
        let Mnode::Tuple(items) = &value.node else { panic!() };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn ibm_iteration_walks_the_position_index() {
        let m_ty = titerable_big_map(tstring(), tnat());
        let body = mfor(
            ForBinder::KeyValue("k".into(), "v".into()),
            mvar_storage("m", m_ty),
            mskip(),
        );
        let out = remove_iterable_big_map(entry_model(body));
        let Mnode::Iter { from, .. } = &out.functions[0].body.node else {
            panic!("expected indexed iteration, got {:?}", out.functions[0].body.node)
        };
        assert_eq!(from.node, Mnode::Nat(1));
    }

    #[test]
    fn set_plus_literal_list_unrolls() {
        let body = massign_var(
            "s",
            Mterm::synthesised(
                Mnode::Plus(
                    Box::new(mvar_local("s", tset(tnat()))),
                    Box::new(mlit_list(vec![mnat(1), mnat(2)], tnat())),
                ),
                tset(tnat()),
            ),
        );
        let out = process_arith_container(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::SetAdd(inner, e2) = &value.node else {
            panic!("expected unrolled adds, got {:?}", value.node)
        };
        assert_eq!(e2.node, Mnode::Nat(2));
        assert!(matches!(inner.node, Mnode::SetAdd(_, _)));
    }

    #[test]
    fn split_key_values_drops_asset_decls() {
        let mut m = Model::new("test");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("thing")
                .key("id", tnat())
                .field("v", tstring())
                .build(),
        ));
        let lit = Mterm::synthesised(
            Mnode::LitAsset(vec![("id".into(), mnat(1)), ("v".into(), mstring("x"))]),
            tasset("thing"),
        );
        m.functions
            .push(FunctionBuilder::entry("go").body(massign_var("t", lit)).build());
        let out = split_key_values(m);
        assert!(out.decls.iter().all(|d| !matches!(d, Decl::Asset(_))));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::Tuple(items) = &value.node else {
            panic!("expected key/record pair")
        };
        assert_eq!(items[0].node, Mnode::Nat(1));
        assert!(matches!(items[1].node, Mnode::LitRecord(_)));
    }
}
