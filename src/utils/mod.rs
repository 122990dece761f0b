//! # Model Utilities
//!
//! Read-only queries over the model (asset lookups, key and container
//! topology, partition listings, specification properties) plus the literal
//! partial evaluator used to fold constants and resolve initial values.
//!
//! The name-to-declaration maps built here are the per-pass symbol-table
//! layer: the model is a tree with backward references by name only, so a
//! cheap map rebuilt per pass is all a rewrite needs.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::{
    AssetDecl, ContainerKind, Decl, EnumDecl, FunctionDef, Ident, Mnode, Mterm, Model,
    RecordDecl, StorageItem, Tnode, Type, VarDecl,
};
use crate::model::builders::{mbool, mint, mnat, mstring, ttuple};
use crate::traversal::any_term;

/// Synthetic field name of a flattened multi-key tuple
pub const FLAT_KEY_ID: &str = "_kid";

// ============================================================================
// Lookup errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("asset '{0}' not found")]
    AssetNotFound(Ident),
    #[error("enum '{0}' not found")]
    EnumNotFound(Ident),
    #[error("record '{0}' not found")]
    RecordNotFound(Ident),
    #[error("field '{1}' not found in asset '{0}'")]
    FieldNotFound(Ident, Ident),
}

// ============================================================================
// Model queries
// ============================================================================

impl Model {
    pub fn get_asset(&self, name: &str) -> Result<&AssetDecl, LookupError> {
        self.decls
            .iter()
            .find_map(|d| match d {
                Decl::Asset(a) if a.name == name => Some(a),
                _ => None,
            })
            .ok_or_else(|| LookupError::AssetNotFound(name.to_string()))
    }

    pub fn get_asset_mut(&mut self, name: &str) -> Result<&mut AssetDecl, LookupError> {
        self.decls
            .iter_mut()
            .find_map(|d| match d {
                Decl::Asset(a) if a.name == name => Some(a),
                _ => None,
            })
            .ok_or_else(|| LookupError::AssetNotFound(name.to_string()))
    }

    pub fn get_enum(&self, name: &str) -> Result<&EnumDecl, LookupError> {
        self.decls
            .iter()
            .find_map(|d| match d {
                Decl::Enum(e) if e.name == name => Some(e),
                _ => None,
            })
            .ok_or_else(|| LookupError::EnumNotFound(name.to_string()))
    }

    pub fn get_record(&self, name: &str) -> Result<&RecordDecl, LookupError> {
        self.decls
            .iter()
            .find_map(|d| match d {
                Decl::Record(r) | Decl::Event(r) if r.name == name => Some(r),
                _ => None,
            })
            .ok_or_else(|| LookupError::RecordNotFound(name.to_string()))
    }

    pub fn get_var(&self, name: &str) -> Option<&VarDecl> {
        self.decls.iter().find_map(|d| match d {
            Decl::Var(v) if v.name == name => Some(v),
            _ => None,
        })
    }

    pub fn storage_item(&self, id: &str) -> Option<&StorageItem> {
        self.storage.iter().find(|s| s.id == id)
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Asset(a) => Some(a),
            _ => None,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.iter().filter(|f| f.is_entry())
    }

    /// Name-to-asset map for a pass
    pub fn asset_table(&self) -> BTreeMap<&str, &AssetDecl> {
        self.assets().map(|a| (a.name.as_str(), a)).collect()
    }
}

// ============================================================================
// Asset topology
// ============================================================================

/// The sole primary key of an asset, after multi-key flattening.
///
/// A multi-key asset that has not been flattened yet answers with the
/// synthetic tuple key it will get.
pub fn get_asset_key(asset: &AssetDecl) -> (Ident, Type) {
    if asset.keys.len() == 1 {
        let k = &asset.keys[0];
        let typ = asset
            .field(k)
            .map(|f| f.typ.clone())
            .unwrap_or_else(|| unreachable!("key field '{k}' missing in asset '{}'", asset.name));
        (k.clone(), typ)
    } else {
        (FLAT_KEY_ID.to_string(), flat_key_type(asset))
    }
}

/// Tuple type of a flattened multi-key
pub fn flat_key_type(asset: &AssetDecl) -> Type {
    ttuple(
        asset
            .keys
            .iter()
            .map(|k| {
                asset
                    .field(k)
                    .map(|f| f.typ.clone())
                    .unwrap_or_else(|| {
                        unreachable!("key field '{k}' missing in asset '{}'", asset.name)
                    })
            })
            .collect(),
    )
}

/// Target asset and container kind of a container field
pub fn get_field_container(
    asset: &AssetDecl,
    field: &str,
) -> Result<(Ident, ContainerKind), LookupError> {
    let f = asset
        .field(field)
        .ok_or_else(|| LookupError::FieldNotFound(asset.name.clone(), field.to_string()))?;
    match &f.original_type.node {
        Tnode::Container(target, kind) => Ok((target.clone(), *kind)),
        _ => Err(LookupError::FieldNotFound(
            asset.name.clone(),
            field.to_string(),
        )),
    }
}

pub fn is_partition(asset: &AssetDecl, field: &str) -> bool {
    matches!(
        get_field_container(asset, field),
        Ok((_, ContainerKind::Partition))
    )
}

pub fn is_aggregate(asset: &AssetDecl, field: &str) -> bool {
    matches!(
        get_field_container(asset, field),
        Ok((_, ContainerKind::Aggregate))
    )
}

/// True when the asset record is its key alone (storage shape drops to a set)
pub fn is_asset_single_field(asset: &AssetDecl) -> bool {
    asset.fields.iter().filter(|f| !f.shadow).count() == asset.keys.len()
        && asset.keys.len() == 1
}

/// True when the asset stores as a map (has value fields beyond the key)
pub fn is_asset_map(asset: &AssetDecl) -> bool {
    !is_asset_single_field(asset)
}

/// Container fields of an asset, with their targets
pub fn container_fields(asset: &AssetDecl) -> Vec<(Ident, Ident, ContainerKind)> {
    asset
        .fields
        .iter()
        .filter_map(|f| match &f.original_type.node {
            Tnode::Container(target, kind) => Some((f.name.clone(), target.clone(), *kind)),
            _ => None,
        })
        .collect()
}

/// All partition fields of the model: (owning asset, field, target asset type)
pub fn get_partitions(model: &Model) -> Vec<(Ident, Ident, Type)> {
    let mut out = Vec::new();
    for asset in model.assets() {
        for f in &asset.fields {
            if let Tnode::Container(target, ContainerKind::Partition) = &f.original_type.node {
                out.push((
                    asset.name.clone(),
                    f.name.clone(),
                    Type::new(Tnode::Asset(target.clone())),
                ));
            }
        }
    }
    out
}

/// The asset, if any, that owns `name` through a partition field
pub fn partition_owner<'a>(model: &'a Model, name: &str) -> Option<(&'a AssetDecl, &'a str)> {
    for asset in model.assets() {
        for f in &asset.fields {
            if let Tnode::Container(target, ContainerKind::Partition) = &f.original_type.node {
                if target == name {
                    return Some((asset, f.name.as_str()));
                }
            }
        }
    }
    None
}

// ============================================================================
// Specification properties
// ============================================================================

/// A named property of the model (used for property-focused pruning)
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyRef {
    Postcondition { fun: Option<Ident>, id: Ident },
    Invariant { id: Ident },
    Security { id: Ident },
}

impl PropertyRef {
    pub fn id(&self) -> &Ident {
        match self {
            PropertyRef::Postcondition { id, .. }
            | PropertyRef::Invariant { id }
            | PropertyRef::Security { id } => id,
        }
    }
}

/// All properties the model declares, in source order
pub fn retrieve_all_properties(model: &Model) -> Vec<PropertyRef> {
    let mut out = Vec::new();
    for inv in &model.specification.invariants {
        out.push(PropertyRef::Invariant {
            id: inv.label.clone(),
        });
    }
    for p in &model.specification.postconditions {
        out.push(PropertyRef::Postcondition {
            fun: None,
            id: p.name.clone(),
        });
    }
    for f in &model.functions {
        if let Some(spec) = &f.spec {
            for p in &spec.postconditions {
                out.push(PropertyRef::Postcondition {
                    fun: Some(f.name.clone()),
                    id: p.name.clone(),
                });
            }
        }
    }
    for s in &model.security {
        out.push(PropertyRef::Security {
            id: s.label.clone(),
        });
    }
    out
}

/// Find one property by id
pub fn retrieve_property(model: &Model, id: &str) -> Option<PropertyRef> {
    retrieve_all_properties(model)
        .into_iter()
        .find(|p| p.id() == id)
}

// ============================================================================
// Operations detection
// ============================================================================

/// True when the body writes to the pending-operations list
pub fn with_operations_for_mterm(mt: &Mterm) -> bool {
    any_term(mt, &mut |t| {
        matches!(
            t.node,
            Mnode::Transfer(_)
                | Mnode::Emit { .. }
                | Mnode::MkOperation { .. }
                | Mnode::Assign {
                    kind: crate::model::AssignKind::Operations,
                    ..
                }
        )
    })
}

/// Project the key value out of a literal asset expression
pub fn extract_key_value_from_masset(asset: &AssetDecl, lit: &Mterm) -> Option<Mterm> {
    match &lit.node {
        Mnode::LitAsset(fields) => {
            if asset.keys.len() == 1 {
                fields
                    .iter()
                    .find(|(id, _)| *id == asset.keys[0])
                    .map(|(_, v)| v.clone())
            } else {
                let parts: Option<Vec<Mterm>> = asset
                    .keys
                    .iter()
                    .map(|k| {
                        fields
                            .iter()
                            .find(|(id, _)| id == k)
                            .map(|(_, v)| v.clone())
                    })
                    .collect();
                parts.map(crate::model::builders::mtuple)
            }
        }
        _ => None,
    }
}

// ============================================================================
// Literal evaluation
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("not a literal: {0}")]
    NotLiteral(String),
    #[error("division by zero")]
    DivByZero,
    #[error("unbound variable '{0}'")]
    Unbound(Ident),
}

/// Evaluation environment: previously evaluated item defaults by name
pub type Env = BTreeMap<Ident, Mterm>;

fn as_int(mt: &Mterm) -> Option<i128> {
    match mt.node {
        Mnode::Int(i) => Some(i),
        Mnode::Nat(n) => i128::try_from(n).ok(),
        _ => None,
    }
}

/// Partially evaluate a term over literals.
///
/// Folds arithmetic, booleans, comparisons, string concatenation, tuple
/// access and rational constructors; resolves variable references through
/// `env`. Anything irreducible is returned as-is, except unbound variables
/// which are an error.
pub fn eval(env: &Env, mt: &Mterm) -> Result<Mterm, EvalError> {
    let loc = mt.loc;
    let ty = mt.type_.clone();
    let out = match &mt.node {
        Mnode::Var { id, .. } => {
            return env
                .get(id)
                .cloned()
                .ok_or_else(|| EvalError::Unbound(id.clone()));
        }
        Mnode::Plus(a, b) => {
            let (a, b) = (eval(env, a)?, eval(env, b)?);
            match (&a.node, &b.node) {
                (Mnode::Int(x), Mnode::Int(y)) => mint(x + y),
                (Mnode::Nat(x), Mnode::Nat(y)) => mnat(x + y),
                (Mnode::String(x), Mnode::String(y)) => mstring(format!("{x}{y}")),
                (Mnode::Currency(x), Mnode::Currency(y)) => {
                    Mterm::new(Mnode::Currency(x + y), ty, loc)
                }
                _ => Mterm::new(Mnode::Plus(Box::new(a), Box::new(b)), ty, loc),
            }
        }
        Mnode::Minus(a, b) => {
            let (a, b) = (eval(env, a)?, eval(env, b)?);
            match (as_int(&a), as_int(&b)) {
                (Some(x), Some(y)) => mint(x - y),
                _ => Mterm::new(Mnode::Minus(Box::new(a), Box::new(b)), ty, loc),
            }
        }
        Mnode::Mult(a, b) => {
            let (a, b) = (eval(env, a)?, eval(env, b)?);
            match (&a.node, &b.node) {
                (Mnode::Int(x), Mnode::Int(y)) => mint(x * y),
                (Mnode::Nat(x), Mnode::Nat(y)) => mnat(x * y),
                _ => Mterm::new(Mnode::Mult(Box::new(a), Box::new(b)), ty, loc),
            }
        }
        Mnode::Div(a, b) => {
            let (a, b) = (eval(env, a)?, eval(env, b)?);
            match (as_int(&a), as_int(&b)) {
                (_, Some(0)) => return Err(EvalError::DivByZero),
                (Some(x), Some(y)) => mint(x.div_euclid(y)),
                _ => Mterm::new(Mnode::Div(Box::new(a), Box::new(b)), ty, loc),
            }
        }
        Mnode::UMinus(a) => {
            let a = eval(env, a)?;
            match as_int(&a) {
                Some(x) => mint(-x),
                _ => Mterm::new(Mnode::UMinus(Box::new(a)), ty, loc),
            }
        }
        Mnode::Not(a) => {
            let a = eval(env, a)?;
            match a.node {
                Mnode::Bool(v) => mbool(!v),
                _ => Mterm::new(Mnode::Not(Box::new(a)), ty, loc),
            }
        }
        Mnode::And(a, b) => {
            let (a, b) = (eval(env, a)?, eval(env, b)?);
            match (&a.node, &b.node) {
                (Mnode::Bool(x), Mnode::Bool(y)) => mbool(*x && *y),
                _ => Mterm::new(Mnode::And(Box::new(a), Box::new(b)), ty, loc),
            }
        }
        Mnode::Or(a, b) => {
            let (a, b) = (eval(env, a)?, eval(env, b)?);
            match (&a.node, &b.node) {
                (Mnode::Bool(x), Mnode::Bool(y)) => mbool(*x || *y),
                _ => Mterm::new(Mnode::Or(Box::new(a), Box::new(b)), ty, loc),
            }
        }
        Mnode::Equal(a, b) => {
            let (a, b) = (eval(env, a)?, eval(env, b)?);
            if is_literal(&a) && is_literal(&b) {
                mbool(a == b)
            } else {
                Mterm::new(Mnode::Equal(Box::new(a), Box::new(b)), ty, loc)
            }
        }
        Mnode::TupleAccess { expr, index, arity } => {
            let e = eval(env, expr)?;
            match e.node {
                Mnode::Tuple(mut items) if *index < items.len() => items.swap_remove(*index),
                _ => Mterm::new(
                    Mnode::TupleAccess {
                        expr: Box::new(e),
                        index: *index,
                        arity: *arity,
                    },
                    ty,
                    loc,
                ),
            }
        }
        Mnode::Builtin(crate::model::BuiltinFn::Abs, args) if args.len() == 1 => {
            let a = eval(env, &args[0])?;
            match a.node {
                Mnode::Int(i) => mnat(i.unsigned_abs()),
                _ => Mterm::new(
                    Mnode::Builtin(crate::model::BuiltinFn::Abs, vec![a]),
                    ty,
                    loc,
                ),
            }
        }
        // structural recursion over literal aggregates
        _ => {
            let mut err = None;
            let out = crate::traversal::map_term(mt.clone(), &mut |t| match eval(env, &t) {
                Ok(v) => v,
                Err(e) => {
                    err.get_or_insert(e);
                    t
                }
            });
            if let Some(e) = err {
                return Err(e);
            }
            out
        }
    };
    Ok(out)
}

/// The canonical default value of a type, used when a record has to be
/// built from partial field updates
pub fn default_for_type(ty: &Type) -> Option<Mterm> {
    use crate::model::builders::*;
    let out = match &ty.node {
        Tnode::Unit => munit(),
        Tnode::Bool => mfalse(),
        Tnode::Int => mint(0),
        Tnode::Nat => mnat(0),
        Tnode::Rational => mrational(0, 1),
        Tnode::String => mstring(""),
        Tnode::Bytes => Mterm::synthesised(Mnode::Bytes(String::new()), ty.clone()),
        Tnode::Currency => mcurrency(0),
        Tnode::Duration => mduration(0),
        Tnode::Timestamp => mtimestamp(0),
        Tnode::Option(_) => Mterm::synthesised(Mnode::None_, ty.clone()),
        Tnode::List(_) => Mterm::synthesised(Mnode::LitList(Vec::new()), ty.clone()),
        Tnode::Set(_) => Mterm::synthesised(Mnode::LitSet(Vec::new()), ty.clone()),
        Tnode::Map(_, _) | Tnode::BigMap(_, _) | Tnode::IterableBigMap(_, _) => {
            Mterm::synthesised(Mnode::LitMap(Vec::new()), ty.clone())
        }
        Tnode::Container(_, _) => Mterm::synthesised(Mnode::Massets(Vec::new()), ty.clone()),
        Tnode::Tuple(ts) => {
            let items: Option<Vec<Mterm>> = ts.iter().map(default_for_type).collect();
            Mterm::synthesised(Mnode::Tuple(items?), ty.clone())
        }
        _ => return None,
    };
    Some(out)
}

/// True for fully literal terms (no variables, no runtime context)
pub fn is_literal(mt: &Mterm) -> bool {
    match &mt.node {
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
        | Mnode::EmptyColl => true,
        Mnode::Tuple(items)
        | Mnode::LitSet(items)
        | Mnode::LitList(items)
        | Mnode::Massets(items)
        | Mnode::EnumVal { args: items, .. } => items.iter().all(is_literal),
        Mnode::Some_(v) | Mnode::Left(v) | Mnode::Right(v) => is_literal(v),
        Mnode::LitMap(entries) => entries.iter().all(|(k, v)| is_literal(k) && is_literal(v)),
        Mnode::LitRecord(fields) | Mnode::LitAsset(fields) => {
            fields.iter().all(|(_, v)| is_literal(v))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builders::*;
    use crate::model::MapKind;

    fn sample_asset() -> AssetDecl {
        AssetDeclBuilder::new("my_asset")
            .key("id", tnat())
            .field("s", tstring())
            .field("b", tbool())
            .map_kind(MapKind::Map)
            .build()
    }

    #[test]
    fn asset_key_of_single_key_asset() {
        let a = sample_asset();
        let (k, t) = get_asset_key(&a);
        assert_eq!(k, "id");
        assert_eq!(t, tnat());
    }

    #[test]
    fn single_field_detection() {
        let only_key = AssetDeclBuilder::new("tags").key("tag", tstring()).build();
        assert!(is_asset_single_field(&only_key));
        assert!(!is_asset_single_field(&sample_asset()));
        assert!(is_asset_map(&sample_asset()));
    }

    #[test]
    fn eval_folds_arithmetic() {
        let env = Env::new();
        let t = mplus(mint(1), mmult(mint(2), mint(3), tint()), tint());
        assert_eq!(eval(&env, &t).unwrap(), mint(7));
    }

    #[test]
    fn eval_concatenates_strings() {
        let env = Env::new();
        let t = mplus(mstring("ab"), mstring("cd"), tstring());
        assert_eq!(eval(&env, &t).unwrap(), mstring("abcd"));
    }

    #[test]
    fn eval_resolves_env() {
        let mut env = Env::new();
        env.insert("x".into(), mint(5));
        let t = mplus(mvar_storage("x", tint()), mint(1), tint());
        assert_eq!(eval(&env, &t).unwrap(), mint(6));
    }

    #[test]
    fn eval_rejects_unbound() {
        let env = Env::new();
        let t = mvar_storage("missing", tint());
        assert!(matches!(eval(&env, &t), Err(EvalError::Unbound(_))));
    }

    #[test]
    fn key_extraction_from_literal_asset() {
        let a = sample_asset();
        let lit = Mterm::synthesised(
            crate::model::Mnode::LitAsset(vec![
                ("id".into(), mnat(7)),
                ("s".into(), mstring("x")),
                ("b".into(), mtrue()),
            ]),
            tasset("my_asset"),
        );
        assert_eq!(extract_key_value_from_masset(&a, &lit), Some(mnat(7)));
    }
}
