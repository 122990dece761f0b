//! # Asset Lowering
//!
//! `remove_asset`: eliminates every `asset<A>` value from runtime code by
//! choosing a storage shape per asset and translating each high-level asset
//! operation to primitive container operations and explicit control flow.
//!
//! Shape selection:
//! - key-only record: storage is `set<K>`
//! - one plain value field: storage is `map_kind<K, V>` with `V` the field's
//!   type
//! - otherwise: storage is `map_kind<K, record<A>>` with a generated record
//!
//! Collection folds dispatch on the operand kind ([`Ck`]): the asset's own
//! collection folds over the set/map, a view folds over its key list, a
//! field folds over the key set found in the parent record.
//!
//! ## Pipeline Position
//!
//! ```text
//! enum lowering -> [remove_asset] -> split_key_values -> remaining lowerings
//! ```

use std::collections::BTreeMap;

use crate::diagnostics::{stop_code, Bus, ErrorKind, Stop};
use crate::model::builders::*;
use crate::model::{
    ApiContainer, ApiItem, ApiStorage, AssetDecl, AssignKind, AssignOp, Ck, ContainerKind, Decl,
    ForBinder, Ident, Loc, MapKind, Mnode, Model, Mterm, RatArithOp, RecordDecl, RecordField,
    SortDir, StorageItem, StorageKind, Tnode, Type, UpdateItem,
};
use crate::traversal::{map_model_terms, map_model_types, rewrite_term};
use crate::utils::{self, get_asset_key};

// ============================================================================
// Shapes
// ============================================================================

/// Runtime value carried per key once the asset is lowered
#[derive(Debug, Clone, PartialEq)]
enum ValueShape {
    /// Key-only asset: storage is a set of keys, the value is the key
    SetOnly,
    /// Exactly one plain value field: stored bare
    Single { field: Ident, ty: Type },
    /// Generated record of the non-key fields
    Record { fields: Vec<(Ident, Type)> },
}

#[derive(Debug, Clone)]
struct AssetShape {
    name: Ident,
    key_id: Ident,
    key_ty: Type,
    value: ValueShape,
    map_kind: MapKind,
    storage_ty: Type,
    value_ty: Type,
    /// Partition fields: (field, child asset)
    partitions: Vec<(Ident, Ident)>,
    /// Aggregate fields: (field, child asset)
    aggregates: Vec<(Ident, Ident)>,
}

type Shapes = BTreeMap<Ident, AssetShape>;

/// Container fields store the child's key set
fn lowered_field_type(model: &Model, ty: &Type) -> Type {
    match &ty.node {
        Tnode::Container(target, ContainerKind::View) => {
            let child_key = model
                .get_asset(target)
                .map(|a| get_asset_key(a).1)
                .unwrap_or_else(|_| tnat());
            tlist(child_key)
        }
        Tnode::Container(target, _) => {
            let child_key = model
                .get_asset(target)
                .map(|a| get_asset_key(a).1)
                .unwrap_or_else(|_| tnat());
            tset(child_key)
        }
        _ => ty.clone(),
    }
}

fn build_shape(model: &Model, asset: &AssetDecl) -> AssetShape {
    let (key_id, key_ty) = get_asset_key(asset);
    let value_fields: Vec<(Ident, Type)> = asset
        .fields
        .iter()
        .filter(|f| !asset.is_key_field(&f.name) && !f.shadow)
        .map(|f| (f.name.clone(), lowered_field_type(model, &f.typ)))
        .collect();
    let value = if value_fields.is_empty() {
        ValueShape::SetOnly
    } else if value_fields.len() == 1
        && !matches!(
            asset.field(&value_fields[0].0).map(|f| &f.original_type.node),
            Some(Tnode::Container(_, _))
        )
    {
        ValueShape::Single {
            field: value_fields[0].0.clone(),
            ty: value_fields[0].1.clone(),
        }
    } else {
        ValueShape::Record {
            fields: value_fields,
        }
    };
    let value_ty = match &value {
        ValueShape::SetOnly => key_ty.clone(),
        ValueShape::Single { ty, .. } => ty.clone(),
        ValueShape::Record { .. } => trecord(asset.name.clone()),
    };
    let storage_ty = match &value {
        ValueShape::SetOnly => tset(key_ty.clone()),
        _ => tmap_kind(asset.map_kind, key_ty.clone(), value_ty.clone()),
    };
    let mut partitions = Vec::new();
    let mut aggregates = Vec::new();
    for f in &asset.fields {
        match &f.original_type.node {
            Tnode::Container(target, ContainerKind::Partition) => {
                partitions.push((f.name.clone(), target.clone()));
            }
            Tnode::Container(target, ContainerKind::Aggregate) => {
                aggregates.push((f.name.clone(), target.clone()));
            }
            _ => {}
        }
    }
    AssetShape {
        name: asset.name.clone(),
        key_id,
        key_ty,
        value,
        map_kind: asset.map_kind,
        storage_ty,
        value_ty,
        partitions,
        aggregates,
    }
}

// ============================================================================
// Term builders over a shape
// ============================================================================

fn va(shape: &AssetShape) -> Mterm {
    mvar_storage_col(shape.name.clone(), shape.storage_ty.clone())
}

fn assign_col(shape: &AssetShape, value: Mterm) -> Mterm {
    massign(AssignKind::StorageVar(shape.name.clone()), value)
}

fn is_map_shape(shape: &AssetShape) -> bool {
    !matches!(shape.value, ValueShape::SetOnly)
}

/// `map_get(va, k)` typed with the asset's value
fn col_get(shape: &AssetShape, key: Mterm) -> Mterm {
    mmap_get(va(shape), key, shape.value_ty.clone())
}

fn col_contains(shape: &AssetShape, key: Mterm) -> Mterm {
    if is_map_shape(shape) {
        mmap_contains(va(shape), key)
    } else {
        mset_contains(va(shape), key)
    }
}

/// Read one field out of a lowered asset value
fn value_field_read(shape: &AssetShape, value: Mterm, field: &str) -> Mterm {
    match &shape.value {
        ValueShape::SetOnly => value,
        ValueShape::Single { field: f, ty } if f == field => value.with_type(ty.clone()),
        ValueShape::Single { .. } => value,
        ValueShape::Record { fields } => {
            let ty = fields
                .iter()
                .find(|(n, _)| n == field)
                .map(|(_, t)| t.clone())
                .unwrap_or_else(tunit);
            mdot(value, field, ty)
        }
    }
}

/// Containment test of `ck` for `key`
fn ck_contains(shapes: &Shapes, asset: &str, ck: &Ck, key: Mterm) -> Mterm {
    let shape = &shapes[asset];
    match ck {
        Ck::Coll => col_contains(shape, key),
        Ck::View(v) => Mterm::synthesised(
            Mnode::ListContains(Box::new((**v).clone()), Box::new(key)),
            tbool(),
        ),
        Ck::Field {
            asset: parent,
            field,
            key: pk,
        } => {
            let pshape = &shapes[parent];
            let keyset = value_field_read(
                pshape,
                col_get(pshape, (**pk).clone()),
                field,
            );
            mset_contains(keyset, key)
        }
    }
}

/// One-key loop over the collection denoted by `ck`.
///
/// `body(key_var, value_var)`: the value var is available for plain map
/// collections only; other kinds re-read through `map_get` when needed.
fn fold_ck(
    shapes: &Shapes,
    asset: &str,
    ck: &Ck,
    gen: &mut super::TempGen,
    body: impl FnOnce(&mut super::TempGen, Mterm, Option<Mterm>) -> Mterm,
) -> Mterm {
    let shape = &shapes[asset];
    let kid = gen.fresh("_kid");
    let kvar = mvar_local(kid.clone(), shape.key_ty.clone());
    match ck {
        Ck::Coll if is_map_shape(shape) => {
            let vid = gen.fresh("_vid");
            let vvar = mvar_local(vid.clone(), shape.value_ty.clone());
            let inner = body(gen, kvar, Some(vvar));
            mfor(ForBinder::KeyValue(kid, vid), va(shape), inner)
        }
        Ck::Coll => {
            let inner = body(gen, kvar, None);
            mfor(ForBinder::Single(kid), va(shape), inner)
        }
        Ck::View(v) => {
            let inner = body(gen, kvar, None);
            mfor(ForBinder::Single(kid), (**v).clone(), inner)
        }
        Ck::Field {
            asset: parent,
            field,
            key: pk,
        } => {
            let pshape = &shapes[parent];
            let keyset = value_field_read(pshape, col_get(pshape, (**pk).clone()), field);
            let inner = body(gen, kvar, None);
            mfor(ForBinder::Single(kid), keyset, inner)
        }
    }
}

/// Bind `the` to the asset value for the current loop key
fn bind_the(shape: &AssetShape, kvar: &Mterm, vvar: Option<&Mterm>, body: Mterm) -> Mterm {
    let value = match (&shape.value, vvar) {
        (ValueShape::SetOnly, _) => kvar.clone(),
        (_, Some(v)) => v.clone(),
        (_, None) => col_get(shape, kvar.clone()),
    };
    mletin("the", value, body)
}

/// Rewrite reads of `the` inside a predicate: `the.f` becomes a value-shape
/// aware read, `the.key` becomes the loop key.
fn resolve_the(shape: &AssetShape, kvar: &Mterm, pred: Mterm) -> Mterm {
    rewrite_term(pred, &mut |s| match &s.node {
        Mnode::Dot { expr, field } => match &expr.node {
            Mnode::Var { id, .. } if id == "the" => {
                if *field == shape.key_id {
                    kvar.clone()
                } else {
                    value_field_read(shape, (**expr).clone(), field)
                        .with_type(s.type_.clone())
                }
            }
            _ => s,
        },
        _ => s,
    })
}

// ============================================================================
// Literal asset decomposition
// ============================================================================

/// Key and storage value of an asset expression.
///
/// Literal assets decompose directly; `make_asset` carries the pair; any
/// other expression is read through its fields.
fn key_and_value(
    shapes: &Shapes,
    shape: &AssetShape,
    v: &Mterm,
) -> (Mterm, Mterm, Vec<(Ident, Vec<Mterm>)>) {
    match &v.node {
        Mnode::MakeAsset { key, value, .. } => ((**key).clone(), (**value).clone(), Vec::new()),
        Mnode::LitAsset(fields) => {
            let key = fields
                .iter()
                .find(|(n, _)| *n == shape.key_id)
                .map(|(_, t)| t.clone())
                .unwrap_or_else(munit);
            let mut children: Vec<(Ident, Vec<Mterm>)> = Vec::new();
            let value = match &shape.value {
                ValueShape::SetOnly => key.clone(),
                ValueShape::Single { field, ty } => fields
                    .iter()
                    .find(|(n, _)| n == field)
                    .map(|(_, t)| t.clone())
                    .unwrap_or_else(|| {
                        utils::default_for_type(ty).unwrap_or_else(munit)
                    }),
                ValueShape::Record {
                    fields: rec_fields,
                } => {
                    let mut out: Vec<(Ident, Mterm)> = Vec::new();
                    for (name, ty) in rec_fields {
                        let raw = fields.iter().find(|(n, _)| n == name).map(|(_, t)| t);
                        let is_partition =
                            shape.partitions.iter().any(|(f, _)| f == name);
                        let is_aggregate =
                            shape.aggregates.iter().any(|(f, _)| f == name);
                        let term = match raw {
                            Some(t) if is_partition => {
                                // children are added to their own collection;
                                // the parent stores their keys
                                let target = &shape
                                    .partitions
                                    .iter()
                                    .find(|(f, _)| f == name)
                                    .expect("partition field")
                                    .1;
                                let tshape = &shapes[target];
                                let elems = match &t.node {
                                    Mnode::Massets(items) | Mnode::LitList(items) => {
                                        items.clone()
                                    }
                                    _ => Vec::new(),
                                };
                                children.push((name.clone(), elems.clone()));
                                let keys: Vec<Mterm> = elems
                                    .iter()
                                    .map(|c| key_and_value(shapes, tshape, c).0)
                                    .collect();
                                mlit_set(keys, tshape.key_ty.clone())
                            }
                            Some(t) if is_aggregate => {
                                let elems = match &t.node {
                                    Mnode::LitList(items) | Mnode::LitSet(items) => {
                                        items.clone()
                                    }
                                    _ => vec![t.clone()],
                                };
                                let Tnode::Set(elem_ty) = &ty.node else {
                                    unreachable!("aggregate field lowers to a set")
                                };
                                mlit_set(elems, (**elem_ty).clone())
                            }
                            Some(t) => t.clone(),
                            None => utils::default_for_type(ty).unwrap_or_else(munit),
                        };
                        out.push((name.clone(), term));
                    }
                    Mterm::synthesised(
                        Mnode::LitRecord(out),
                        trecord(shape.name.clone()),
                    )
                }
            };
            (key, value, children)
        }
        _ => {
            let key = value_field_read(shape, v.clone(), &shape.key_id)
                .with_type(shape.key_ty.clone());
            (key, v.clone(), Vec::new())
        }
    }
}

// ============================================================================
// Effect lowerings
// ============================================================================

/// `va := put(va, k, v)` (or set add for key-only assets)
fn col_put(shape: &AssetShape, key: Mterm, value: Mterm) -> Mterm {
    if is_map_shape(shape) {
        assign_col(shape, mmap_put(va(shape), key, value))
    } else {
        assign_col(shape, mset_add(va(shape), key))
    }
}

fn col_remove_entry(shape: &AssetShape, key: Mterm) -> Mterm {
    if is_map_shape(shape) {
        assign_col(shape, mmap_remove(va(shape), key))
    } else {
        assign_col(shape, mset_remove(va(shape), key))
    }
}

/// Full removal of one asset record, cascading over partition children
fn lower_remove(shapes: &Shapes, shape: &AssetShape, key: Mterm, gen: &mut super::TempGen) -> Mterm {
    let mut items: Vec<Mterm> = Vec::new();
    for (field, target) in &shape.partitions {
        let tshape = &shapes[target];
        let kid = gen.fresh("_kid");
        let kvar = mvar_local(kid.clone(), tshape.key_ty.clone());
        let keyset = value_field_read(shape, col_get(shape, key.clone()), field);
        items.push(mfor(
            ForBinder::Single(kid),
            keyset,
            col_remove_entry(tshape, kvar),
        ));
    }
    items.push(col_remove_entry(shape, key));
    mseq(items)
}

/// `add(A, v)`: key-exists guard, aggregate pre-checks, partition child
/// recursion, then the put.
fn lower_add(
    shapes: &Shapes,
    shape: &AssetShape,
    v: &Mterm,
    gen: &mut super::TempGen,
) -> Mterm {
    let (key, value, children) = key_and_value(shapes, shape, v);
    let mut items: Vec<Mterm> = Vec::new();

    // aggregate keys must pre-exist
    if let Mnode::LitAsset(fields) = &v.node {
        for (field, target) in &shape.aggregates {
            let tshape = &shapes[target];
            if let Some((_, value)) = fields.iter().find(|(n, _)| n == field) {
                let elems = match &value.node {
                    Mnode::LitList(items) | Mnode::LitSet(items) => items.clone(),
                    _ => Vec::new(),
                };
                for e in elems {
                    items.push(mif(
                        mnot(col_contains(tshape, e)),
                        mfail_asset(ASSET_NOT_FOUND, target),
                        None,
                    ));
                }
            }
        }
    }

    // partition children recurse into their own collection
    for (_field, elems) in &children {
        let target = shape
            .partitions
            .iter()
            .find(|(f, _)| f == _field)
            .map(|(_, t)| t.clone())
            .expect("partition field");
        let tshape = shapes[&target].clone();
        for child in elems {
            items.push(lower_add(shapes, &tshape, child, gen));
        }
    }

    items.push(col_put(shape, key.clone(), value));
    mif(
        col_contains(shape, key),
        mfail_asset(KEY_EXISTS, &shape.name),
        Some(mseq(items)),
    )
}

/// Rewrite one update item into its functional field value
fn update_item_value(shape: &AssetShape, current: &Mterm, item: &UpdateItem) -> Mterm {
    let read = value_field_read(shape, current.clone(), &item.field);
    let ty = read.type_.clone();
    match item.op {
        AssignOp::Assign => item.value.clone(),
        AssignOp::Plus if ty.node == Tnode::Rational => Mterm::synthesised(
            Mnode::RatArith(RatArithOp::Plus, Box::new(read), Box::new(item.value.clone())),
            ty,
        ),
        AssignOp::Minus if ty.node == Tnode::Rational => Mterm::synthesised(
            Mnode::RatArith(
                RatArithOp::Minus,
                Box::new(read),
                Box::new(item.value.clone()),
            ),
            ty,
        ),
        AssignOp::Mult if ty.node == Tnode::Rational => Mterm::synthesised(
            Mnode::RatArith(RatArithOp::Mult, Box::new(read), Box::new(item.value.clone())),
            ty,
        ),
        AssignOp::Div if ty.node == Tnode::Rational => Mterm::synthesised(
            Mnode::RatArith(RatArithOp::Div, Box::new(read), Box::new(item.value.clone())),
            ty,
        ),
        AssignOp::Plus => mplus(read, item.value.clone(), ty),
        AssignOp::Minus => mminus(read, item.value.clone(), ty),
        AssignOp::Mult => mmult(read, item.value.clone(), ty),
        AssignOp::Div => {
            Mterm::synthesised(Mnode::Div(Box::new(read), Box::new(item.value.clone())), ty)
        }
        AssignOp::And => {
            Mterm::synthesised(Mnode::And(Box::new(read), Box::new(item.value.clone())), tbool())
        }
        AssignOp::Or => {
            Mterm::synthesised(Mnode::Or(Box::new(read), Box::new(item.value.clone())), tbool())
        }
    }
}

fn lower_update(
    shape: &AssetShape,
    key: Mterm,
    updates: &[UpdateItem],
    gen: &mut super::TempGen,
) -> Mterm {
    match &shape.value {
        ValueShape::SetOnly => mskip(),
        ValueShape::Single { .. } => {
            let vid = gen.fresh("_vid");
            let vvar = mvar_local(vid.clone(), shape.value_ty.clone());
            let new_value = updates
                .iter()
                .fold(vvar.clone(), |acc, item| update_item_value(shape, &acc, item));
            mletin(
                vid,
                col_get(shape, key.clone()),
                col_put(shape, key, new_value),
            )
        }
        ValueShape::Record { .. } => {
            let vid = gen.fresh("_vid");
            let vvar = mvar_local(vid.clone(), shape.value_ty.clone());
            let fields: Vec<(Ident, Mterm)> = updates
                .iter()
                .map(|u| (u.field.clone(), update_item_value(shape, &vvar, u)))
                .collect();
            mletin(
                vid,
                col_get(shape, key.clone()),
                col_put(shape, key, mrec_update(vvar, fields)),
            )
        }
    }
}

/// Replace the key-set field of one record with `new_set`
fn put_with_field(shape: &AssetShape, key: Mterm, field: &str, new_set: Mterm) -> Mterm {
    match &shape.value {
        ValueShape::Single { .. } => col_put(shape, key, new_set),
        _ => {
            let current = col_get(shape, key.clone());
            col_put(
                shape,
                key,
                mrec_update(current, vec![(field.to_string(), new_set)]),
            )
        }
    }
}

fn empty_col(shape: &AssetShape) -> Mterm {
    match &shape.value {
        ValueShape::SetOnly => mlit_set(Vec::new(), shape.key_ty.clone()),
        _ => Mterm::synthesised(Mnode::LitMap(Vec::new()), shape.storage_ty.clone()),
    }
}

/// `remove_all(A, ck)`: empty the container slot; partition children never
/// outlive their parent, so their records are removed first.
fn lower_remove_all(
    shapes: &Shapes,
    asset: &str,
    ck: &Ck,
    gen: &mut super::TempGen,
) -> Mterm {
    let shape = shapes[asset].clone();
    match ck {
        Ck::Coll => lower_clear(shapes, asset, &Ck::Coll, gen),
        Ck::View(v) => {
            let kid = gen.fresh("_kid");
            let kvar = mvar_local(kid.clone(), shape.key_ty.clone());
            mfor(
                ForBinder::Single(kid),
                (**v).clone(),
                lower_remove(shapes, &shape, kvar, gen),
            )
        }
        Ck::Field {
            asset: parent,
            field,
            key: pk,
        } => {
            let pshape = shapes[parent].clone();
            let keyset =
                value_field_read(&pshape, col_get(&pshape, (**pk).clone()), field);
            let is_partition = pshape.partitions.iter().any(|(f, _)| f == field);
            let mut items = Vec::new();
            if is_partition {
                let kid = gen.fresh("_kid");
                let kvar = mvar_local(kid.clone(), shape.key_ty.clone());
                items.push(mfor(
                    ForBinder::Single(kid),
                    keyset,
                    lower_remove(shapes, &shape, kvar, gen),
                ));
            }
            items.push(put_with_field(
                &pshape,
                (**pk).clone(),
                field,
                mlit_set(Vec::new(), shape.key_ty.clone()),
            ));
            mseq(items)
        }
    }
}

/// `clear(A, ck)`: remove every member of the denoted collection
fn lower_clear(shapes: &Shapes, asset: &str, ck: &Ck, gen: &mut super::TempGen) -> Mterm {
    let shape = shapes[asset].clone();
    match ck {
        Ck::Coll => {
            let mut items = Vec::new();
            if !shape.partitions.is_empty() {
                let cascade = fold_ck(shapes, asset, &Ck::Coll, gen, |gen, kvar, vvar| {
                    let mut inner = Vec::new();
                    for (field, target) in &shape.partitions {
                        let tshape = &shapes[target];
                        let kid = gen.fresh("_kid");
                        let kv = mvar_local(kid.clone(), tshape.key_ty.clone());
                        let keyset = match &vvar {
                            Some(v) => value_field_read(&shape, v.clone(), field),
                            None => value_field_read(
                                &shape,
                                col_get(&shape, kvar.clone()),
                                field,
                            ),
                        };
                        inner.push(mfor(
                            ForBinder::Single(kid),
                            keyset,
                            col_remove_entry(tshape, kv),
                        ));
                    }
                    mseq(inner)
                });
                items.push(cascade);
            }
            items.push(assign_col(&shape, empty_col(&shape)));
            mseq(items)
        }
        Ck::View(_) | Ck::Field { .. } => lower_remove_all(shapes, asset, ck, gen),
    }
}

// ============================================================================
// Expression lowerings (accumulator folds)
// ============================================================================

/// `select`: ascending-key list of the keys whose value satisfies `pred`
fn lower_select(
    shapes: &Shapes,
    asset: &str,
    ck: &Ck,
    pred: &Mterm,
    gen: &mut super::TempGen,
) -> Mterm {
    let shape = shapes[asset].clone();
    let accu = gen.fresh("_accu");
    let accu_ty = tlist(shape.key_ty.clone());
    let accu_var = mvar_local(accu.clone(), accu_ty.clone());
    let loop_ = fold_ck(shapes, asset, ck, gen, |_gen, kvar, vvar| {
        let cond = resolve_the(&shape, &kvar, pred.clone());
        let step = mif(
            cond,
            massign_var(accu.clone(), mlist_prepend(accu_var.clone(), kvar.clone())),
            None,
        );
        bind_the(&shape, &kvar, vvar.as_ref(), step)
    });
    mletin(
        accu,
        mlit_list(Vec::new(), shape.key_ty.clone()),
        mseq(vec![loop_, mlist_reverse(accu_var)]),
    )
}

/// Lexicographic "a before b" comparison over the sort criteria
fn sort_before(
    shape: &AssetShape,
    a_val: &Mterm,
    b_val: &Mterm,
    criteria: &[(Ident, SortDir)],
) -> Mterm {
    let mut out = mfalse();
    for (field, dir) in criteria.iter().rev() {
        let fa = value_field_read(shape, a_val.clone(), field);
        let fb = value_field_read(shape, b_val.clone(), field);
        let (lt, eq) = match dir {
            SortDir::Asc => (mlt(fa.clone(), fb.clone()), meq(fa, fb)),
            SortDir::Desc => (mgt(fa.clone(), fb.clone()), meq(fa, fb)),
        };
        out = mor(lt, mand(eq, out));
    }
    out
}

/// `sort`: insertion fold producing the ordered key list
fn lower_sort(
    shapes: &Shapes,
    asset: &str,
    ck: &Ck,
    criteria: &[(Ident, SortDir)],
    gen: &mut super::TempGen,
) -> Mterm {
    let shape = shapes[asset].clone();
    let accu = gen.fresh("_accu");
    let accu_ty = tlist(shape.key_ty.clone());
    let accu_var = mvar_local(accu.clone(), accu_ty.clone());

    let loop_ = fold_ck(shapes, asset, ck, gen, |_gen, kvar, vvar| {
        // insert kvar into the ordered accumulator
        let tmp = "_accu2".to_string();
        let tmp_var = mvar_local(tmp.clone(), accu_ty.clone());
        let ins = "_inserted".to_string();
        let ins_var = mvar_local(ins.clone(), tbool());
        let x = "_x".to_string();
        let x_var = mvar_local(x.clone(), shape.key_ty.clone());

        let new_val = match (&shape.value, &vvar) {
            (ValueShape::SetOnly, _) => kvar.clone(),
            (_, Some(v)) => v.clone(),
            (_, None) => col_get(&shape, kvar.clone()),
        };
        let x_val = match &shape.value {
            ValueShape::SetOnly => x_var.clone(),
            _ => col_get(&shape, x_var.clone()),
        };
        let before = sort_before(&shape, &new_val, &x_val, criteria);

        let inner = mseq(vec![
            mif(
                mand(mnot(ins_var.clone()), before),
                mseq(vec![
                    massign_var(tmp.clone(), mlist_prepend(tmp_var.clone(), kvar.clone())),
                    massign_var(ins.clone(), mtrue()),
                ]),
                None,
            ),
            massign_var(tmp.clone(), mlist_prepend(tmp_var.clone(), x_var.clone())),
        ]);
        let body = mseq(vec![
            mfor(ForBinder::Single(x), accu_var.clone(), inner),
            mif(
                mnot(ins_var.clone()),
                massign_var(tmp.clone(), mlist_prepend(tmp_var.clone(), kvar.clone())),
                None,
            ),
            massign_var(accu.clone(), mlist_reverse(tmp_var.clone())),
        ]);
        mletin(
            tmp,
            mlit_list(Vec::new(), shape.key_ty.clone()),
            mletin(ins, mfalse(), body),
        )
    });

    mletin(
        accu,
        mlit_list(Vec::new(), shape.key_ty.clone()),
        mseq(vec![loop_, accu_var]),
    )
}

/// `sum`: numeric fold of `expr(the)` over the collection
fn lower_sum(
    shapes: &Shapes,
    asset: &str,
    ck: &Ck,
    expr: &Mterm,
    result_ty: Type,
    gen: &mut super::TempGen,
) -> Mterm {
    let shape = shapes[asset].clone();
    let accu = gen.fresh("_accu");
    let accu_var = mvar_local(accu.clone(), result_ty.clone());
    let loop_ = fold_ck(shapes, asset, ck, gen, |_gen, kvar, vvar| {
        let contribution = resolve_the(&shape, &kvar, expr.clone());
        let step = massign_var(
            accu.clone(),
            mplus(accu_var.clone(), contribution, result_ty.clone()),
        );
        bind_the(&shape, &kvar, vvar.as_ref(), step)
    });
    let zero = utils::default_for_type(&result_ty).unwrap_or_else(|| mint(0));
    mletin(accu, zero, mseq(vec![loop_, accu_var]))
}

/// `nth`: the key at position `n`, failing out of bounds
fn lower_nth(
    shapes: &Shapes,
    asset: &str,
    ck: &Ck,
    index: &Mterm,
    gen: &mut super::TempGen,
) -> Mterm {
    let shape = shapes[asset].clone();
    let q = gen.fresh("_q_opt");
    let q_var = mvar_local(q.clone(), toption(shape.key_ty.clone()));
    let idx = gen.fresh("_idx");
    let idx_var = mvar_local(idx.clone(), tnat());
    let loop_ = fold_ck(shapes, asset, ck, gen, |_gen, kvar, _vvar| {
        mseq(vec![
            mif(
                meq(idx_var.clone(), index.clone()),
                massign_var(q.clone(), msome(kvar)),
                None,
            ),
            massign_var(idx.clone(), mplus(idx_var.clone(), mnat(1), tnat())),
        ])
    });
    let kid = gen.fresh("_kid");
    let unwrap = mmatch_option(
        q_var,
        kid.clone(),
        mvar_local(kid, shape.key_ty.clone()),
        mfail_str(OUT_OF_BOUND).with_type(shape.key_ty.clone()),
    );
    mletin(
        q,
        mnone(shape.key_ty.clone()),
        mletin(idx, mnat(0), mseq(vec![loop_, unwrap])),
    )
}

/// `head`/`tail`: the first/last `n` keys as a list
fn lower_head_tail(
    shapes: &Shapes,
    asset: &str,
    ck: &Ck,
    count: &Mterm,
    tail: bool,
    gen: &mut super::TempGen,
) -> Mterm {
    let shape = shapes[asset].clone();
    let accu = gen.fresh("_accu");
    let accu_ty = tlist(shape.key_ty.clone());
    let accu_var = mvar_local(accu.clone(), accu_ty.clone());
    let idx = gen.fresh("_idx");
    let idx_var = mvar_local(idx.clone(), tnat());

    let total = match ck {
        Ck::Coll if is_map_shape(&shape) => mmap_length(va(&shape)),
        Ck::Coll => mset_length(va(&shape)),
        Ck::View(v) => mlist_length((**v).clone()),
        Ck::Field {
            asset: parent,
            field,
            key: pk,
        } => {
            let pshape = &shapes[parent];
            mset_length(value_field_read(pshape, col_get(pshape, (**pk).clone()), field))
        }
    };

    let keep = if tail {
        // keep positions with idx + n >= total
        mge(
            mplus(idx_var.clone(), count.clone(), tnat()),
            total,
        )
    } else {
        mlt(idx_var.clone(), count.clone())
    };
    let loop_ = fold_ck(shapes, asset, ck, gen, |_gen, kvar, _vvar| {
        mseq(vec![
            mif(
                keep,
                massign_var(accu.clone(), mlist_prepend(accu_var.clone(), kvar)),
                None,
            ),
            massign_var(idx.clone(), mplus(idx_var.clone(), mnat(1), tnat())),
        ])
    });
    mletin(
        accu,
        mlit_list(Vec::new(), shape.key_ty.clone()),
        mletin(idx, mnat(0), mseq(vec![loop_, mlist_reverse(accu_var)])),
    )
}

// ============================================================================
// The pass
// ============================================================================

/// Lower every asset to its primitive storage shape. After this pass no
/// `asset<A>` type appears outside literal construction contexts and all
/// `A[k]` sugar is gone.
pub fn remove_asset(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    let shapes: Shapes = model
        .assets()
        .map(|a| (a.name.clone(), build_shape(&model, a)))
        .collect();
    if shapes.is_empty() {
        return Ok(model);
    }

    let mut gen = super::TempGen::new();
    let mut api: Vec<ApiItem> = Vec::new();

    let model = map_model_terms(model, &mut |ctx, t| {
        let only_formula = ctx.spec_id.is_some() || ctx.invariant_id.is_some();
        let mut push_api = |node: ApiStorage| {
            api.push(ApiItem { node, only_formula });
        };
        rewrite_term(t, &mut |s| {
            let loc = s.loc;
            match &s.node {
                // storage collection references take the lowered type
                Mnode::Var {
                    id,
                    scope: crate::model::VarScope::StorageCol,
                } => match shapes.get(id) {
                    Some(shape) => s.with_type(shape.storage_ty.clone()),
                    None => s,
                },

                // late-synthesised field sugar reads through the record
                Mnode::DotAssetField { asset, key, field } => {
                    let shape = &shapes[asset];
                    value_field_read(shape, col_get(shape, (**key).clone()), field)
                        .with_loc(loc)
                }

                Mnode::GetAsset { asset, ck, key } => {
                    push_api(ApiStorage::Get(asset.clone()));
                    let shape = &shapes[asset];
                    let key = (**key).clone();
                    let out = match ck {
                        Ck::Coll => match shape.value {
                            ValueShape::SetOnly => key,
                            _ => col_get(shape, key),
                        },
                        _ => {
                            let contains = ck_contains(&shapes, asset, ck, key.clone());
                            let get = match shape.value {
                                ValueShape::SetOnly => key.clone(),
                                _ => col_get(shape, key),
                            };
                            mif_expr(
                                contains,
                                get,
                                mfail_asset(ASSET_NOT_FOUND, asset)
                                    .with_type(shape.value_ty.clone()),
                            )
                        }
                    };
                    out.with_loc(loc)
                }
                Mnode::GetAssetOpt { asset, ck, key } => {
                    push_api(ApiStorage::Get(asset.clone()));
                    let shape = &shapes[asset];
                    let key = (**key).clone();
                    let out = match ck {
                        Ck::Coll if is_map_shape(shape) => {
                            mmap_get_opt(va(shape), key, shape.value_ty.clone())
                        }
                        Ck::Coll => mif_expr(
                            mset_contains(va(shape), key.clone()),
                            msome(key.clone()),
                            mnone(shape.key_ty.clone()),
                        ),
                        ck => {
                            let contains = ck_contains(&shapes, asset, ck, key.clone());
                            let value = match shape.value {
                                ValueShape::SetOnly => key.clone(),
                                _ => col_get(shape, key),
                            };
                            mif_expr(contains, msome(value), mnone(shape.value_ty.clone()))
                        }
                    };
                    out.with_loc(loc)
                }
                Mnode::ContainsAsset { asset, ck, key } => {
                    push_api(ApiStorage::Contains(
                        asset.clone(),
                        api_container_of(ck),
                    ));
                    ck_contains(&shapes, asset, ck, (**key).clone()).with_loc(loc)
                }
                Mnode::CountAsset { asset, ck } => {
                    push_api(ApiStorage::Count(asset.clone(), api_container_of(ck)));
                    let shape = &shapes[asset];
                    let out = match ck {
                        Ck::Coll if is_map_shape(shape) => mmap_length(va(shape)),
                        Ck::Coll => mset_length(va(shape)),
                        Ck::View(v) => mlist_length((**v).clone()),
                        Ck::Field {
                            asset: parent,
                            field,
                            key: pk,
                        } => {
                            let pshape = &shapes[parent];
                            mset_length(value_field_read(
                                pshape,
                                col_get(pshape, (**pk).clone()),
                                field,
                            ))
                        }
                    };
                    out.with_loc(loc)
                }
                Mnode::Select { asset, ck, pred } => {
                    push_api(ApiStorage::Select(asset.clone(), api_container_of(ck)));
                    lower_select(&shapes, asset, ck, pred, &mut gen).with_loc(loc)
                }
                Mnode::Sort {
                    asset,
                    ck,
                    criteria,
                } => {
                    push_api(ApiStorage::Sort(asset.clone(), api_container_of(ck)));
                    lower_sort(&shapes, asset, ck, criteria, &mut gen).with_loc(loc)
                }
                Mnode::SumAsset { asset, ck, expr } => {
                    push_api(ApiStorage::Sum(asset.clone(), api_container_of(ck)));
                    lower_sum(&shapes, asset, ck, expr, s.type_.clone(), &mut gen)
                        .with_loc(loc)
                }
                Mnode::Nth { asset, ck, index } => {
                    push_api(ApiStorage::Nth(asset.clone(), api_container_of(ck)));
                    lower_nth(&shapes, asset, ck, index, &mut gen).with_loc(loc)
                }
                Mnode::Head { asset, ck, count } => {
                    push_api(ApiStorage::Head(asset.clone(), api_container_of(ck)));
                    lower_head_tail(&shapes, asset, ck, count, false, &mut gen).with_loc(loc)
                }
                Mnode::Tail { asset, ck, count } => {
                    push_api(ApiStorage::Tail(asset.clone(), api_container_of(ck)));
                    lower_head_tail(&shapes, asset, ck, count, true, &mut gen).with_loc(loc)
                }

                Mnode::AddAsset { asset, value } => {
                    push_api(ApiStorage::Add(asset.clone()));
                    let shape = shapes[asset].clone();
                    lower_add(&shapes, &shape, value, &mut gen).with_loc(loc)
                }
                Mnode::PutSingleAsset { asset, value } => {
                    push_api(ApiStorage::Set(asset.clone()));
                    let shape = &shapes[asset];
                    let (key, value, _children) = key_and_value(&shapes, shape, value);
                    col_put(shape, key, value).with_loc(loc)
                }
                Mnode::RemoveAsset { asset, key } => {
                    push_api(ApiStorage::Remove(asset.clone()));
                    let shape = shapes[asset].clone();
                    lower_remove(&shapes, &shape, (**key).clone(), &mut gen).with_loc(loc)
                }
                Mnode::UpdateAsset {
                    asset,
                    key,
                    updates,
                } => {
                    push_api(ApiStorage::Update(asset.clone()));
                    let shape = &shapes[asset];
                    lower_update(shape, (**key).clone(), updates, &mut gen).with_loc(loc)
                }
                Mnode::AddField {
                    asset,
                    field,
                    key,
                    value,
                } => {
                    push_api(ApiStorage::FieldAdd(asset.clone(), field.clone()));
                    let shape = shapes[asset].clone();
                    let key = (**key).clone();
                    let out = if let Some((_, target)) =
                        shape.partitions.iter().find(|(f, _)| f == field)
                    {
                        let tshape = shapes[target].clone();
                        let (child_key, _, _) = key_and_value(&shapes, &tshape, value);
                        let keyset =
                            value_field_read(&shape, col_get(&shape, key.clone()), field);
                        mseq(vec![
                            lower_add(&shapes, &tshape, value, &mut gen),
                            put_with_field(
                                &shape,
                                key,
                                field,
                                mset_add(keyset, child_key),
                            ),
                        ])
                    } else {
                        // aggregate: the operand is a child key
                        let target = shape
                            .aggregates
                            .iter()
                            .find(|(f, _)| f == field)
                            .map(|(_, t)| t.clone())
                            .unwrap_or_default();
                        let tshape = &shapes[&target];
                        let child_key = (**value).clone();
                        let keyset =
                            value_field_read(&shape, col_get(&shape, key.clone()), field);
                        mseq(vec![
                            mif(
                                mnot(col_contains(tshape, child_key.clone())),
                                mfail_asset(ASSET_NOT_FOUND, &target),
                                None,
                            ),
                            put_with_field(&shape, key, field, mset_add(keyset, child_key)),
                        ])
                    };
                    out.with_loc(loc)
                }
                Mnode::RemoveField {
                    asset,
                    field,
                    key,
                    child_key,
                } => {
                    push_api(ApiStorage::FieldRemove(asset.clone(), field.clone()));
                    let shape = shapes[asset].clone();
                    let key = (**key).clone();
                    let child_key = (**child_key).clone();
                    let keyset =
                        value_field_read(&shape, col_get(&shape, key.clone()), field);
                    let unlink = put_with_field(
                        &shape,
                        key,
                        field,
                        mset_remove(keyset, child_key.clone()),
                    );
                    let out = if let Some((_, target)) =
                        shape.partitions.iter().find(|(f, _)| f == field)
                    {
                        let tshape = shapes[target].clone();
                        mseq(vec![
                            unlink,
                            lower_remove(&shapes, &tshape, child_key, &mut gen),
                        ])
                    } else {
                        unlink
                    };
                    out.with_loc(loc)
                }
                Mnode::RemoveAll { asset, ck } => {
                    push_api(ApiStorage::RemoveAll(
                        asset.clone(),
                        match ck {
                            Ck::Field { field, .. } => field.clone(),
                            _ => String::new(),
                        },
                    ));
                    lower_remove_all(&shapes, asset, ck, &mut gen).with_loc(loc)
                }
                Mnode::ClearAsset { asset, ck } => {
                    push_api(ApiStorage::Clear(asset.clone(), api_container_of(ck)));
                    lower_clear(&shapes, asset, ck, &mut gen).with_loc(loc)
                }
                Mnode::RemoveIf { asset, ck, pred } => {
                    push_api(ApiStorage::RemoveIf(asset.clone(), api_container_of(ck)));
                    let shape = shapes[asset].clone();
                    let pred: Mterm = (**pred).clone();
                    fold_ck(&shapes, asset, ck, &mut gen, |gen, kvar, vvar| {
                        let cond = resolve_the(&shape, &kvar, pred.clone());
                        let step = mif(
                            cond,
                            lower_remove(&shapes, &shape, kvar.clone(), gen),
                            None,
                        );
                        bind_the(&shape, &kvar, vvar.as_ref(), step)
                    })
                    .with_loc(loc)
                }
                Mnode::PutRemove {
                    asset,
                    ck: _,
                    key,
                    value,
                } => {
                    let shape = &shapes[asset];
                    if shape.map_kind == MapKind::IterableBigMap {
                        bus.emit_error(
                            loc,
                            ErrorKind::NoPutRemoveForIterableBigMapAsset(asset.clone()),
                        );
                        return Mterm::skip(loc);
                    }
                    let out = if is_map_shape(shape) {
                        assign_col(
                            shape,
                            mmap_update(va(shape), (**key).clone(), (**value).clone()),
                        )
                    } else {
                        let cond = Mterm::synthesised(
                            Mnode::Builtin(
                                crate::model::BuiltinFn::IsSome,
                                vec![(**value).clone()],
                            ),
                            tbool(),
                        );
                        mif(
                            cond,
                            assign_col(shape, mset_add(va(shape), (**key).clone())),
                            Some(assign_col(shape, mset_remove(va(shape), (**key).clone()))),
                        )
                    };
                    out.with_loc(loc)
                }

                // iteration over an asset collection binds the key (and the
                // hidden value for map shapes)
                Mnode::For {
                    label,
                    binder: ForBinder::Single(id),
                    coll,
                    body,
                } => {
                    let asset = match &coll.type_.node {
                        Tnode::Container(a, _) => Some(a.clone()),
                        Tnode::Map(_, _) | Tnode::BigMap(_, _) => {
                            match &coll.node {
                                Mnode::Var { id, .. } if shapes.contains_key(id) => {
                                    Some(id.clone())
                                }
                                _ => None,
                            }
                        }
                        _ => None,
                    };
                    match asset {
                        Some(a) if is_map_shape(&shapes[&a]) && matches!(coll.node, Mnode::Var { .. }) => {
                            let vid = gen.fresh("_vid");
                            Mterm::new(
                                Mnode::For {
                                    label: label.clone(),
                                    binder: ForBinder::KeyValue(id.clone(), vid),
                                    coll: coll.clone(),
                                    body: body.clone(),
                                },
                                s.type_.clone(),
                                loc,
                            )
                        }
                        _ => s,
                    }
                }

                Mnode::ToContainer { src, .. } => (**src).clone(),

                _ => s,
            }
        })
    });

    bus.stop_if_errors(stop_code::LOWERING)?;

    // declaration-level rewrites: record decls and storage defaults
    let mut model = model;
    let mut records: Vec<RecordDecl> = Vec::new();
    for shape in shapes.values() {
        if let ValueShape::Record { fields } = &shape.value {
            records.push(RecordDecl {
                name: shape.name.clone(),
                fields: fields
                    .iter()
                    .map(|(n, t)| RecordField {
                        name: n.clone(),
                        typ: t.clone(),
                        loc: Loc::NONE,
                    })
                    .collect(),
                loc: Loc::NONE,
            });
        }
    }

    // initial values: parent inits may carry partition children that land in
    // the child's own collection
    let mut extra_inits: BTreeMap<Ident, Vec<(Mterm, Mterm)>> = BTreeMap::new();
    let mut defaults: BTreeMap<Ident, Mterm> = BTreeMap::new();
    let asset_decls: Vec<AssetDecl> = model.assets().cloned().collect();
    for decl in &asset_decls {
        let shape = &shapes[&decl.name];
        let mut entries: Vec<(Mterm, Mterm)> = Vec::new();
        for init in &decl.init {
            let (key, value, children) = key_and_value(&shapes, shape, init);
            for (field, elems) in children {
                let target = shape
                    .partitions
                    .iter()
                    .find(|(f, _)| *f == field)
                    .map(|(_, t)| t.clone())
                    .expect("partition field");
                let tshape = &shapes[&target];
                for child in elems {
                    let (ck, cv, _) = key_and_value(&shapes, tshape, &child);
                    extra_inits.entry(target.clone()).or_default().push((ck, cv));
                }
            }
            entries.push((key, value));
        }
        defaults.insert(decl.name.clone(), build_storage_default(shape, entries));
    }
    for (target, extra) in extra_inits {
        let shape = &shapes[&target];
        let default = defaults
            .get_mut(&target)
            .expect("child asset has a storage default");
        merge_storage_entries(shape, default, extra);
    }

    for item in &mut model.storage {
        if let StorageKind::Asset(name) = &item.kind {
            let shape = &shapes[name];
            item.typ = shape.storage_ty.clone();
            if let Some(d) = defaults.get(name) {
                item.default = d.clone();
            }
        }
    }
    // assets with no storage item yet get one, in declaration order
    for decl in &asset_decls {
        if !model
            .storage
            .iter()
            .any(|i| matches!(&i.kind, StorageKind::Asset(n) if *n == decl.name))
        {
            let shape = &shapes[&decl.name];
            model.storage.push(StorageItem {
                id: decl.name.clone(),
                kind: StorageKind::Asset(decl.name.clone()),
                typ: shape.storage_ty.clone(),
                default: defaults[&decl.name].clone(),
                ghost: false,
                loc: decl.loc,
            });
        }
    }

    model.decls.extend(records.into_iter().map(Decl::Record));
    model.api_items.extend(api);

    // types: asset and container types reach their lowered forms
    let model = map_model_types(model, &mut |ty| {
        ty.rewrite(&mut |t| match &t.node {
            Tnode::Asset(a) => match shapes.get(a) {
                Some(shape) => shape.value_ty.clone(),
                None => t,
            },
            Tnode::Container(a, kind) => match shapes.get(a) {
                Some(shape) => match kind {
                    ContainerKind::Collection | ContainerKind::AssetContainer => {
                        shape.storage_ty.clone()
                    }
                    ContainerKind::View => tlist(shape.key_ty.clone()),
                    ContainerKind::AssetKey => shape.key_ty.clone(),
                    ContainerKind::AssetValue => shape.value_ty.clone(),
                    ContainerKind::Partition | ContainerKind::Aggregate => {
                        tset(shape.key_ty.clone())
                    }
                },
                None => t,
            },
            _ => t,
        })
    });

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::any_term;

    fn my_asset_model(body: Mterm) -> Model {
        let mut m = Model::new("test");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("my_asset")
                .key("id", tnat())
                .field("s", tstring())
                .field("b", tbool())
                .build(),
        ));
        m.functions
            .push(FunctionBuilder::entry("go").body(body).build());
        m
    }

    #[test]
    fn ledger_shape_is_bare_big_map() {
        let mut m = Model::new("fa12");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("ledger")
                .key("holder", taddress())
                .field("tokens", tnat())
                .map_kind(MapKind::BigMap)
                .build(),
        ));
        m.functions
            .push(FunctionBuilder::entry("noop").body(mskip()).build());
        let mut bus = Bus::new();
        let out = remove_asset(m, &mut bus).unwrap();
        let item = out.storage_item("ledger").expect("storage item");
        assert_eq!(item.typ, tbig_map(taddress(), tnat()));
    }

    #[test]
    fn multi_field_asset_generates_record() {
        let body = mskip();
        let mut bus = Bus::new();
        let out = remove_asset(my_asset_model(body), &mut bus).unwrap();
        let rec = out.get_record("my_asset").expect("generated record");
        assert_eq!(rec.fields.len(), 2);
        let item = out.storage_item("my_asset").unwrap();
        assert_eq!(item.typ, tmap(tnat(), trecord("my_asset")));
    }

    #[test]
    fn remove_if_becomes_scan_loop_with_guard() {
        // remove_if(the.id >= n or (the.s = s and the.b = false))
        let the = mvar_local("the", tasset("my_asset"));
        let pred = mor(
            mge(mdot(the.clone(), "id", tnat()), mvar_param("n", tnat())),
            mand(
                meq(mdot(the.clone(), "s", tstring()), mvar_param("s", tstring())),
                meq(mdot(the, "b", tbool()), mfalse()),
            ),
        );
        let body = Mterm::synthesised(
            Mnode::RemoveIf {
                asset: "my_asset".into(),
                ck: Ck::Coll,
                pred: Box::new(pred),
            },
            tunit(),
        );
        let mut bus = Bus::new();
        let out = remove_asset(my_asset_model(body), &mut bus).unwrap();
        let body = &out.functions[0].body;
        let Mnode::For { binder, body: inner, .. } = &body.node else {
            panic!("expected scan loop, got {:?}", body.node)
        };
        assert!(matches!(binder, ForBinder::KeyValue(_, _)));
        // the guard wraps the removal
        assert!(any_term(inner, &mut |t| matches!(t.node, Mnode::If { .. })));
        assert!(any_term(inner, &mut |t| matches!(
            t.node,
            Mnode::MapRemove(_, _)
        )));
        // no asset operation survives
        assert!(!any_term(body, &mut |t| matches!(
            t.node,
            Mnode::RemoveIf { .. } | Mnode::RemoveAsset { .. }
        )));
    }

    #[test]
    fn put_remove_on_iterable_big_map_is_rejected() {
        let mut m = Model::new("test");
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("log")
                .key("id", tnat())
                .field("msg", tstring())
                .map_kind(MapKind::IterableBigMap)
                .build(),
        ));
        let body = Mterm::synthesised(
            Mnode::PutRemove {
                asset: "log".into(),
                ck: Ck::Coll,
                key: Box::new(mnat(0)),
                value: Box::new(mnone(tstring())),
            },
            tunit(),
        );
        m.functions
            .push(FunctionBuilder::entry("go").body(body).build());
        let mut bus = Bus::new();
        let err = remove_asset(m, &mut bus).unwrap_err();
        assert!(matches!(
            err.diagnostics[0].kind,
            ErrorKind::NoPutRemoveForIterableBigMapAsset(_)
        ));
    }

    #[test]
    fn sum_lowers_to_accumulator_fold() {
        let the = mvar_local("the", tasset("my_asset"));
        let body = massign_var(
            "total",
            Mterm::synthesised(
                Mnode::SumAsset {
                    asset: "my_asset".into(),
                    ck: Ck::Coll,
                    expr: Box::new(mdot(the, "id", tnat())),
                },
                tnat(),
            ),
        );
        let mut bus = Bus::new();
        let out = remove_asset(my_asset_model(body), &mut bus).unwrap();
        let body = &out.functions[0].body;
        assert!(any_term(body, &mut |t| matches!(t.node, Mnode::For { .. })));
        assert!(any_term(body, &mut |t| matches!(
            &t.node,
            Mnode::Letin { id, .. } if id.starts_with("_accu")
        )));
        assert!(!any_term(body, &mut |t| matches!(
            t.node,
            Mnode::SumAsset { .. }
        )));
    }

    #[test]
    fn get_asset_types_disappear_after_lowering() {
        let body = massign_var(
            "s",
            mdot(
                Mterm::synthesised(
                    Mnode::GetAsset {
                        asset: "my_asset".into(),
                        ck: Ck::Coll,
                        key: Box::new(mnat(1)),
                    },
                    tasset("my_asset"),
                ),
                "s",
                tstring(),
            ),
        );
        let mut bus = Bus::new();
        let out = remove_asset(my_asset_model(body), &mut bus).unwrap();
        let mut saw_asset_type = false;
        any_term(&out.functions[0].body, &mut |t| {
            if t.type_.any(&mut |ty| matches!(ty.node, Tnode::Asset(_))) {
                saw_asset_type = true;
            }
            false
        });
        assert!(!saw_asset_type, "asset types must be lowered");
    }
}

fn api_container_of(ck: &Ck) -> ApiContainer {
    match ck {
        Ck::View(_) => ApiContainer::View,
        _ => ApiContainer::Coll,
    }
}

fn build_storage_default(shape: &AssetShape, entries: Vec<(Mterm, Mterm)>) -> Mterm {
    match &shape.value {
        ValueShape::SetOnly => mlit_set(
            entries.into_iter().map(|(k, _)| k).collect(),
            shape.key_ty.clone(),
        ),
        _ => {
            let lit = Mterm::synthesised(Mnode::LitMap(entries), shape.storage_ty.clone());
            lit
        }
    }
}

fn merge_storage_entries(shape: &AssetShape, default: &mut Mterm, extra: Vec<(Mterm, Mterm)>) {
    match &mut default.node {
        Mnode::LitMap(entries) => entries.extend(extra),
        Mnode::LitSet(items) => items.extend(extra.into_iter().map(|(k, _)| k)),
        _ => {
            *default = build_storage_default(shape, extra);
        }
    }
}

