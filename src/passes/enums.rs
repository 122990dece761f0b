//! # Enum and State Lowering
//!
//! Turns every enum into either an integer encoding (all constructors
//! argument-less) or a balanced `or<..>` tree of payload tuples, elaborates
//! `match` accordingly, and lowers declared asset states to a synthetic
//! state field.
//!
//! ## Pipeline Position
//!
//! ```text
//! asset methods -> [process_asset_state -> remove_enum -> remove_enum000] -> asset lowering
//! ```

use std::collections::BTreeMap;

use crate::model::builders::*;
use crate::model::{
    AssetField, Decl, EnumDecl, Ident, Loc, Mnode, Model, Mterm, Pattern, Tnode, Type,
};
use crate::traversal::{map_model_terms, map_model_types, rewrite_term};

// ============================================================================
// EnumInfo
// ============================================================================

/// Lowering recipe of one enum: target type, per-constructor value builder
/// and match elaboration.
#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub name: Ident,
    pub target: Type,
    ctors: Vec<CtorInfo>,
    simple: bool,
}

#[derive(Debug, Clone)]
struct CtorInfo {
    name: Ident,
    /// Payload type of the constructor (unit / single / tuple)
    payload: Type,
    /// Left(false)/Right(true) path from the root of the or-tree
    path: Vec<bool>,
    index: usize,
}

fn payload_type(args: &[Type], ctor: &str) -> Type {
    let t = match args {
        [] => tunit(),
        [one] => one.clone(),
        many => ttuple(many.to_vec()),
    };
    t.with_annot(ctor)
}

fn or_tree(leaves: &[Type]) -> Type {
    match leaves {
        [] => tunit(),
        [one] => one.clone(),
        many => {
            let mid = many.len().div_ceil(2);
            tor(or_tree(&many[..mid]), or_tree(&many[mid..]))
        }
    }
}

fn assign_paths(ctors: &mut [CtorInfo], lo: usize, hi: usize, prefix: Vec<bool>) {
    if hi - lo <= 1 {
        if lo < hi {
            ctors[lo].path = prefix;
        }
        return;
    }
    let mid = lo + (hi - lo).div_ceil(2);
    let mut left = prefix.clone();
    left.push(false);
    let mut right = prefix;
    right.push(true);
    assign_paths(ctors, lo, mid, left);
    assign_paths(ctors, mid, hi, right);
}

impl EnumInfo {
    pub fn build(decl: &EnumDecl) -> Self {
        let simple = decl.is_simple();
        let mut ctors: Vec<CtorInfo> = decl
            .ctors
            .iter()
            .enumerate()
            .map(|(i, c)| CtorInfo {
                name: c.name.clone(),
                payload: payload_type(&c.args, &c.name),
                path: Vec::new(),
                index: i,
            })
            .collect();
        let target = if simple {
            tnat()
        } else {
            let leaves: Vec<Type> = ctors.iter().map(|c| c.payload.clone()).collect();
            let n = ctors.len();
            assign_paths(&mut ctors, 0, n, Vec::new());
            or_tree(&leaves)
        };
        EnumInfo {
            name: decl.name.clone(),
            target,
            ctors,
            simple,
        }
    }

    fn ctor(&self, name: &str) -> Option<&CtorInfo> {
        self.ctors.iter().find(|c| c.name == name)
    }

    /// The target-type value of one constructor application
    pub fn construct(&self, ctor: &str, args: Vec<Mterm>, loc: Loc) -> Mterm {
        let info = self
            .ctor(ctor)
            .unwrap_or_else(|| unreachable!("unknown constructor '{ctor}' of enum '{}'", self.name));
        if self.simple {
            return Mterm::new(Mnode::Nat(info.index as u128), tnat(), loc);
        }
        let payload = match args.len() {
            0 => munit(),
            1 => args.into_iter().next().expect("one argument"),
            _ => mtuple(args),
        };
        // wrap the payload with the injection path, innermost first
        let mut node = payload;
        let mut ty = info.payload.clone();
        for (depth, right) in info.path.iter().enumerate().rev() {
            let sibling = self.subtree_type(&info.path[..depth], !*right);
            ty = if *right {
                tor(sibling, ty)
            } else {
                tor(ty, sibling)
            };
            node = Mterm::new(
                if *right {
                    Mnode::Right(Box::new(node))
                } else {
                    Mnode::Left(Box::new(node))
                },
                ty.clone(),
                loc,
            );
        }
        node
    }

    /// Type of the subtree reached by `path` then one more step `right`
    fn subtree_type(&self, path: &[bool], right: bool) -> Type {
        let mut full = path.to_vec();
        full.push(right);
        let leaves: Vec<&CtorInfo> = self
            .ctors
            .iter()
            .filter(|c| c.path.len() >= full.len() && c.path[..full.len()] == full[..])
            .collect();
        let types: Vec<Type> = leaves.iter().map(|c| c.payload.clone()).collect();
        or_tree(&types)
    }

    /// Lower `match scrutinee with arms` into if-chains (integer encoding)
    /// or a balanced match_or tree (sum encoding).
    pub fn elaborate_match(
        &self,
        scrutinee: Mterm,
        arms: &[crate::model::MatchArm],
        result: Type,
        gen: &mut super::TempGen,
        loc: Loc,
    ) -> Mterm {
        let body_for = |ctor: &CtorInfo| -> Option<(Vec<Ident>, Mterm)> {
            for arm in arms {
                match &arm.pattern {
                    Pattern::Const { ctor: c, binders, .. } if *c == ctor.name => {
                        return Some((binders.clone(), arm.body.clone()));
                    }
                    _ => {}
                }
            }
            for arm in arms {
                match &arm.pattern {
                    Pattern::Wild => return Some((Vec::new(), arm.body.clone())),
                    Pattern::Binding(id) => {
                        return Some((vec![id.clone()], arm.body.clone()));
                    }
                    _ => {}
                }
            }
            None
        };

        if self.simple {
            // chained `if scrutinee = <index>` with the last arm as fallback
            let id = gen.fresh("_state");
            let var = mvar_local(id.clone(), tnat());
            let mut bodies: Vec<(usize, Mterm)> = Vec::new();
            for c in &self.ctors {
                if let Some((_, body)) = body_for(c) {
                    bodies.push((c.index, body));
                }
            }
            let fallback = bodies
                .last()
                .map(|(_, b)| b.clone())
                .unwrap_or_else(mskip);
            let mut out = fallback;
            for (idx, body) in bodies.into_iter().rev().skip(1) {
                out = Mterm::new(
                    Mnode::If {
                        cond: Box::new(meq(var.clone(), mnat(idx as u128))),
                        then_branch: Box::new(body),
                        else_branch: Some(Box::new(out)),
                    },
                    result.clone(),
                    loc,
                );
            }
            return mletin(id, scrutinee, out);
        }

        // sum encoding: mirror the or-tree with match_or nodes
        let indices: Vec<usize> = (0..self.ctors.len()).collect();
        self.match_or_tree(scrutinee, &indices, &body_for, result, gen, loc)
    }

    fn match_or_tree(
        &self,
        scrutinee: Mterm,
        ctor_indices: &[usize],
        body_for: &impl Fn(&CtorInfo) -> Option<(Vec<Ident>, Mterm)>,
        result: Type,
        gen: &mut super::TempGen,
        loc: Loc,
    ) -> Mterm {
        if ctor_indices.len() == 1 {
            let c = &self.ctors[ctor_indices[0]];
            let (binders, body) = body_for(c)
                .unwrap_or_else(|| unreachable!("non-exhaustive match on enum '{}'", self.name));
            return bind_payload(scrutinee, &c.payload, &binders, body);
        }
        let mid = ctor_indices.len().div_ceil(2);
        let (l, r) = ctor_indices.split_at(mid);
        let lid = gen.fresh("_l");
        let rid = gen.fresh("_r");
        let ltypes: Vec<Type> = l.iter().map(|i| self.ctors[*i].payload.clone()).collect();
        let rtypes: Vec<Type> = r.iter().map(|i| self.ctors[*i].payload.clone()).collect();
        let lvar = mvar_local(lid.clone(), or_tree(&ltypes));
        let rvar = mvar_local(rid.clone(), or_tree(&rtypes));
        let left = self.match_or_tree(lvar, l, body_for, result.clone(), gen, loc);
        let right = self.match_or_tree(rvar, r, body_for, result.clone(), gen, loc);
        Mterm::new(
            Mnode::MatchOr {
                expr: Box::new(scrutinee),
                left_id: lid,
                left: Box::new(left),
                right_id: rid,
                right: Box::new(right),
            },
            result,
            loc,
        )
    }
}

/// Bind constructor argument binders over the payload value
fn bind_payload(payload: Mterm, payload_ty: &Type, binders: &[Ident], body: Mterm) -> Mterm {
    match binders {
        [] => body,
        [one] => mletin(one.clone(), payload, body),
        many => {
            let Tnode::Tuple(ts) = &payload_ty.node else {
                return mletin(many[0].clone(), payload, body);
            };
            let tmp = "_p".to_string();
            let var = mvar_local(tmp.clone(), payload_ty.clone());
            let mut out = body;
            for (i, b) in many.iter().enumerate().rev() {
                let ty = ts.get(i).cloned().unwrap_or_else(tunit);
                out = mletin(
                    b.clone(),
                    mtuple_access(var.clone(), i, many.len(), ty),
                    out,
                );
            }
            mletin(tmp, payload, out)
        }
    }
}

// ============================================================================
// process_asset_state
// ============================================================================

/// Synthetic state field name of an asset
pub fn state_field_name(asset: &str) -> Ident {
    format!("state_{asset}")
}

/// An asset declared `with states E` gets an appended `state_A` field of
/// enum type `E` initialized to the enum's initial constructor; state reads
/// and assignments become field reads and updates.
pub fn process_asset_state(model: Model) -> Model {
    let mut stateful: BTreeMap<Ident, Ident> = BTreeMap::new();
    for asset in model.assets() {
        if let Some(e) = &asset.state {
            stateful.insert(asset.name.clone(), e.clone());
        }
    }
    if stateful.is_empty() {
        return model;
    }

    let initials: BTreeMap<Ident, Ident> = stateful
        .values()
        .filter_map(|e| model.get_enum(e).ok().map(|d| (e.clone(), d.initial.clone())))
        .collect();

    let mut model = model;
    model.decls = model
        .decls
        .into_iter()
        .map(|d| match d {
            Decl::Asset(mut a) => {
                if let Some(e) = a.state.take() {
                    let field = state_field_name(&a.name);
                    let initial = initials.get(&e).cloned().unwrap_or_default();
                    let default = Mterm::synthesised(
                        Mnode::EnumVal {
                            enum_id: e.clone(),
                            ctor: initial,
                            args: Vec::new(),
                        },
                        tenum(e.clone()),
                    );
                    a.fields.push(AssetField {
                        name: field,
                        typ: tenum(e.clone()),
                        original_type: tenum(e),
                        default: Some(default),
                        shadow: false,
                        loc: a.loc,
                    });
                }
                Decl::Asset(a)
            }
            other => other,
        })
        .collect();

    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::AssetStateVal { asset, key } if stateful.contains_key(&asset) => {
                let field = state_field_name(&asset);
                Mterm::new(
                    Mnode::DotAssetField { asset, key, field },
                    s.type_,
                    s.loc,
                )
            }
            Mnode::Assign {
                op,
                kind: crate::model::AssignKind::AssetState { asset, key },
                value,
            } if stateful.contains_key(&asset) => {
                let field = state_field_name(&asset);
                Mterm::new(
                    Mnode::UpdateAsset {
                        asset,
                        key,
                        updates: vec![crate::model::UpdateItem {
                            field,
                            op,
                            value: *value,
                        }],
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
// remove_enum
// ============================================================================

/// Lower every enum to its target encoding, elaborating constructors and
/// matches; drop the enum declarations afterwards.
pub fn remove_enum(model: Model) -> Model {
    let infos: BTreeMap<Ident, EnumInfo> = model
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Enum(e) => Some((e.name.clone(), EnumInfo::build(e))),
            _ => None,
        })
        .collect();
    if infos.is_empty() {
        return model;
    }

    let mut gen = super::TempGen::new();
    let model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match &s.node {
            Mnode::EnumVal { enum_id, .. } => {
                let Some(info) = infos.get(enum_id) else { return s };
                let Mnode::EnumVal { ctor, args, .. } = s.node else {
                    unreachable!()
                };
                info.construct(&ctor, args, s.loc)
            }
            Mnode::Match { expr, arms } => {
                let scrut_enum = match &expr.type_.node {
                    Tnode::Enum(e) => Some(e.clone()),
                    _ => None,
                };
                let Some(info) = scrut_enum.and_then(|e| infos.get(&e)) else {
                    return s;
                };
                let arms = arms.clone();
                let Mnode::Match { expr, .. } = s.node else { unreachable!() };
                info.elaborate_match(*expr, &arms, s.type_.clone(), &mut gen, s.loc)
            }
            _ => s,
        })
    });

    // types: enum<E> -> encoding target
    let model = map_model_types(model, &mut |ty| {
        ty.rewrite(&mut |t| match &t.node {
            Tnode::Enum(e) => match infos.get(e) {
                Some(info) => {
                    let mut target = info.target.clone();
                    target.annot = t.annot.clone().or_else(|| Some(e.clone()));
                    target
                }
                None => t,
            },
            _ => t,
        })
    });

    let mut model = model;
    model.decls.retain(|d| !matches!(d, Decl::Enum(_)));
    model
}

// ============================================================================
// remove_enum000
// ============================================================================

/// Name of the storage slot holding the contract state
pub const STATE_VAR: &str = "_state";

/// The contract-state pseudo-enum becomes plain integer constants: the
/// `state` type maps to `nat`, state reads and writes go through a storage
/// variable.
pub fn remove_enum000(model: Model) -> Model {
    let model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Var {
                scope: crate::model::VarScope::State,
                ..
            } => Mterm::new(
                Mnode::Var {
                    id: STATE_VAR.to_string(),
                    scope: crate::model::VarScope::StorageVar,
                },
                tnat(),
                s.loc,
            ),
            Mnode::Assign {
                op,
                kind: crate::model::AssignKind::State,
                value,
            } => Mterm::new(
                Mnode::Assign {
                    op,
                    kind: crate::model::AssignKind::StorageVar(STATE_VAR.to_string()),
                    value,
                },
                s.type_,
                s.loc,
            ),
            _ => s,
        })
    });

    let mut model = map_model_types(model, &mut |ty| {
        ty.rewrite(&mut |t| match t.node {
            Tnode::State => tnat().with_annot(t.annot.unwrap_or_else(|| "state".into())),
            _ => t,
        })
    });

    for item in &mut model.storage {
        if item.typ.node == Tnode::Nat && item.id == "state" {
            item.id = STATE_VAR.to_string();
        }
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchArm, MapKind};

    fn order_states() -> EnumDecl {
        EnumDeclBuilder::new("order_state")
            .ctor("Placed")
            .ctor("Assigned")
            .ctor("Delivered")
            .build()
    }

    #[test]
    fn simple_enum_encodes_to_nat_constants() {
        let info = EnumInfo::build(&order_states());
        assert_eq!(info.target, tnat());
        let v = info.construct("Assigned", Vec::new(), Loc::NONE);
        assert_eq!(v.node, Mnode::Nat(1));
    }

    #[test]
    fn payload_enum_encodes_to_or_tree() {
        let decl = EnumDeclBuilder::new("action")
            .ctor_with("Mint", vec![tnat()])
            .ctor_with("Burn", vec![tnat()])
            .ctor("Pause")
            .build();
        let info = EnumInfo::build(&decl);
        let Tnode::Or(_, _) = &info.target.node else {
            panic!("expected or-tree, got {}", info.target)
        };
        // Mint sits on the leftmost leaf
        let v = info.construct("Mint", vec![mnat(5)], Loc::NONE);
        let Mnode::Left(inner) = &v.node else { panic!("expected left injection") };
        let Mnode::Left(payload) = &inner.node else { panic!("expected nested left") };
        assert_eq!(payload.node, Mnode::Nat(5));
    }

    #[test]
    fn simple_match_elaborates_to_if_chain() {
        let info = EnumInfo::build(&order_states());
        let arms = vec![
            MatchArm {
                pattern: Pattern::Const {
                    enum_id: "order_state".into(),
                    ctor: "Placed".into(),
                    binders: vec![],
                },
                body: mint(1),
            },
            MatchArm {
                pattern: Pattern::Wild,
                body: mint(0),
            },
        ];
        let mut gen = crate::passes::TempGen::new();
        let out = info.elaborate_match(
            mvar_local("s", tnat()),
            &arms,
            tint(),
            &mut gen,
            Loc::NONE,
        );
        let Mnode::Letin { body, .. } = &out.node else { panic!() };
        assert!(matches!(body.node, Mnode::If { .. }));
    }

    #[test]
    fn asset_state_becomes_synthetic_field() {
        let mut m = Model::new("vehicle_lifecycle");
        m.decls.push(Decl::Enum(order_states()));
        m.decls.push(Decl::Asset(
            AssetDeclBuilder::new("order")
                .key("oid", tnat())
                .field("vin", tstring())
                .state("order_state")
                .map_kind(MapKind::BigMap)
                .build(),
        ));
        let body = Mterm::synthesised(
            Mnode::Assign {
                op: crate::model::AssignOp::Assign,
                kind: crate::model::AssignKind::AssetState {
                    asset: "order".into(),
                    key: Box::new(mvar_param("ok", tnat())),
                },
                value: Box::new(Mterm::synthesised(
                    Mnode::EnumVal {
                        enum_id: "order_state".into(),
                        ctor: "Assigned".into(),
                        args: vec![],
                    },
                    tenum("order_state"),
                )),
            },
            tunit(),
        );
        m.functions
            .push(FunctionBuilder::entry("assign_vin").body(body).build());

        let m = process_asset_state(m);
        let asset = m.get_asset("order").unwrap();
        let f = asset.field("state_order").expect("state field appended");
        assert_eq!(f.typ, tenum("order_state"));
        let Mnode::UpdateAsset { updates, .. } = &m.functions[0].body.node else {
            panic!("state assign should become update")
        };
        assert_eq!(updates[0].field, "state_order");

        // then the enum encodes to nat
        let m = remove_enum(m);
        let asset = m.get_asset("order").unwrap();
        let f = asset.field("state_order").unwrap();
        assert_eq!(f.typ.node, Tnode::Nat);
        let Mnode::UpdateAsset { updates, .. } = &m.functions[0].body.node else {
            panic!()
        };
        assert_eq!(updates[0].value.node, Mnode::Nat(1));
    }
}
