//! # Validation Passes
//!
//! No-rewrite checks run before any lowering. Each pass records every
//! diagnostic it can find, then stops the pipeline with its cluster's code
//! if anything was recorded. `check_and_replace_init_caller` is the one
//! member that also rewrites (caller substitution in defaults).
//!
//! ## Pipeline Position
//!
//! ```text
//! typed model -> [validation] -> normalisation -> ... -> lowered model
//! ```

use crate::diagnostics::{stop_code, Bus, ErrorKind, Stop, WarningKind};
use crate::model::{
    AssetDecl, Ck, Decl, Mnode, Model, Mterm, Tnode, Type,
};
use crate::traversal::{any_term, map_model_terms};
use crate::utils::{self, is_literal, partition_owner};

/// Render a literal key for duplicate reporting
fn literal_label(mt: &Mterm) -> String {
    match &mt.node {
        Mnode::Int(i) => i.to_string(),
        Mnode::Nat(n) => n.to_string(),
        Mnode::Bool(b) => b.to_string(),
        Mnode::String(s) | Mnode::Address(s) | Mnode::Bytes(s) => s.clone(),
        Mnode::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(literal_label).collect();
            format!("({})", inner.join(", "))
        }
        other => format!("{other:?}"),
    }
}

fn is_container_type(ty: &Type) -> bool {
    matches!(
        ty.node,
        Tnode::List(_)
            | Tnode::Set(_)
            | Tnode::Map(_, _)
            | Tnode::BigMap(_, _)
            | Tnode::IterableBigMap(_, _)
            | Tnode::Container(_, _)
    )
}

fn is_empty_container_literal(mt: &Mterm) -> bool {
    match &mt.node {
        Mnode::LitSet(items) | Mnode::LitList(items) | Mnode::Massets(items) => items.is_empty(),
        Mnode::LitMap(entries) => entries.is_empty(),
        Mnode::EmptyColl => true,
        _ => false,
    }
}

// ============================================================================
// check_partition_access
// ============================================================================

/// Fail on any `add`/`remove`/`clear` that targets a partitioned asset
/// directly instead of going through the owning field.
pub fn check_partition_access(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    let partitioned: Vec<(String, String, String)> = model
        .assets()
        .filter_map(|a| {
            partition_owner(&model, &a.name)
                .map(|(owner, field)| (a.name.clone(), field.to_string(), owner.name.clone()))
        })
        .collect();

    let lookup = |name: &str| -> Option<&(String, String, String)> {
        partitioned.iter().find(|(a, _, _)| a == name)
    };

    for fun in &model.functions {
        any_term(&fun.body, &mut |t| {
            match &t.node {
                Mnode::AddAsset { asset, .. } | Mnode::RemoveAsset { asset, .. } => {
                    if let Some((a, f, owner)) = lookup(asset) {
                        bus.emit_error(
                            t.loc,
                            ErrorKind::AssetPartitionnedBy(a.clone(), f.clone(), owner.clone()),
                        );
                    }
                }
                Mnode::ClearAsset {
                    asset,
                    ck: Ck::Coll,
                }
                | Mnode::RemoveAll {
                    asset,
                    ck: Ck::Coll,
                } => {
                    if lookup(asset).is_some() {
                        bus.emit_error(t.loc, ErrorKind::NoClearForPartitionAsset(asset.clone()));
                    }
                }
                _ => {}
            }
            false
        });
    }
    bus.stop_if_errors(stop_code::SEMANTIC)?;
    Ok(model)
}

// ============================================================================
// check_containers_asset
// ============================================================================

/// A container field may only reference an asset that has no container
/// fields of its own.
pub fn check_containers_asset(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    let has_containers = |a: &AssetDecl| -> bool {
        a.fields
            .iter()
            .any(|f| matches!(f.original_type.node, Tnode::Container(_, _)))
    };

    for asset in model.assets() {
        for field in &asset.fields {
            if let Tnode::Container(target, _) = &field.original_type.node {
                if let Ok(target_decl) = model.get_asset(target) {
                    if has_containers(target_decl) {
                        bus.emit_error(
                            field.loc,
                            ErrorKind::ContainersInAssetContainers(
                                asset.name.clone(),
                                field.name.clone(),
                                target.clone(),
                            ),
                        );
                    }
                }
            }
        }
    }
    bus.stop_if_errors(stop_code::SEMANTIC)?;
    Ok(model)
}

// ============================================================================
// check_empty_container_on_asset_default_value
// ============================================================================

/// A default for a container field must be the empty literal container
pub fn check_empty_container_on_asset_default_value(
    model: Model,
    bus: &mut Bus,
) -> Result<Model, Stop> {
    for asset in model.assets() {
        for field in &asset.fields {
            if is_container_type(&field.original_type) {
                if let Some(default) = &field.default {
                    if !is_empty_container_literal(default) {
                        bus.emit_error(
                            default.loc,
                            ErrorKind::NoEmptyContainerForDefaultValue(
                                asset.name.clone(),
                                field.name.clone(),
                            ),
                        );
                    }
                }
            }
        }
    }
    bus.stop_if_errors(stop_code::SEMANTIC)?;
    Ok(model)
}

// ============================================================================
// check_asset_key
// ============================================================================

/// The key field carries no default; sort criteria cannot name a key of a
/// multi-key asset.
pub fn check_asset_key(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    for asset in model.assets() {
        for key in &asset.keys {
            if let Some(field) = asset.field(key) {
                if field.default.is_some() {
                    bus.emit_error(
                        field.loc,
                        ErrorKind::DefaultValueOnKeyAsset(asset.name.clone(), key.clone()),
                    );
                }
            }
        }
        if asset.keys.len() >= 2 {
            for s in &asset.sort_fields {
                if asset.is_key_field(s) {
                    bus.emit_error(
                        asset.loc,
                        ErrorKind::NoSortOnKeyWithMultiKey(asset.name.clone(), s.clone()),
                    );
                }
            }
        }
    }
    bus.stop_if_errors(stop_code::SEMANTIC)?;
    Ok(model)
}

// ============================================================================
// check_invalid_init_value
// ============================================================================

fn runtime_value_name(t: &Mterm) -> Option<String> {
    match &t.node {
        Mnode::Const(c) => Some(format!("{c:?}").to_lowercase()),
        Mnode::Builtin(b @ (crate::model::BuiltinFn::Pack | crate::model::BuiltinFn::Unpack), _) => {
            Some(b.to_string())
        }
        _ => None,
    }
}

fn reject_runtime_values(mt: &Mterm, bus: &mut Bus) {
    any_term(mt, &mut |t| {
        if let Some(name) = runtime_value_name(t) {
            bus.emit_error(t.loc, ErrorKind::InvalidInitValue(name));
        }
        false
    });
}

/// No runtime context constant may appear in any default value
pub fn check_invalid_init_value(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    for decl in &model.decls {
        match decl {
            Decl::Var(v) => {
                if let Some(d) = &v.default {
                    reject_runtime_values(d, bus);
                }
            }
            Decl::Asset(a) => {
                for f in &a.fields {
                    if let Some(d) = &f.default {
                        reject_runtime_values(d, bus);
                    }
                }
                for init in &a.init {
                    reject_runtime_values(init, bus);
                }
            }
            _ => {}
        }
    }
    for p in &model.parameters {
        if let Some(d) = &p.default {
            reject_runtime_values(d, bus);
        }
    }
    bus.stop_if_errors(stop_code::INIT)?;
    Ok(model)
}

// ============================================================================
// check_init_partition_in_asset
// ============================================================================

/// An asset used in a partition cannot be initialized directly
pub fn check_init_partition_in_asset(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    for asset in model.assets() {
        if !asset.init.is_empty() && partition_owner(&model, &asset.name).is_some() {
            bus.emit_error(
                asset.loc,
                ErrorKind::NoInitForPartitionAsset(asset.name.clone()),
            );
        }
    }
    bus.stop_if_errors(stop_code::INIT)?;
    Ok(model)
}

// ============================================================================
// check_duplicated_keys_in_asset
// ============================================================================

/// Initial values are literals and carry pairwise distinct primary keys
pub fn check_duplicated_keys_in_asset(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    for asset in model.assets() {
        let mut seen: Vec<Mterm> = Vec::new();
        for init in &asset.init {
            if !is_literal(init) {
                bus.emit_error(init.loc, ErrorKind::OnlyLiteralInAssetInit(asset.name.clone()));
                continue;
            }
            let Some(key) = utils::extract_key_value_from_masset(asset, init) else {
                bus.emit_error(init.loc, ErrorKind::OnlyLiteralInAssetInit(asset.name.clone()));
                continue;
            };
            if seen.contains(&key) {
                bus.emit_error(
                    init.loc,
                    ErrorKind::DuplicatedKeyAsset(asset.name.clone(), literal_label(&key)),
                );
            } else {
                seen.push(key);
            }
        }
    }
    bus.stop_if_errors(stop_code::INIT)?;
    Ok(model)
}

// ============================================================================
// check_and_replace_init_caller
// ============================================================================

/// Defaults using `caller` either get the explicit option-provided address
/// or fail the run.
pub fn check_and_replace_init_caller(
    model: Model,
    caller: Option<&str>,
    bus: &mut Bus,
) -> Result<Model, Stop> {
    let mut missing: Vec<crate::model::Loc> = Vec::new();
    let model = map_model_terms(model, &mut |ctx, t| {
        // only default positions: skip function bodies
        if ctx.fun.is_some() {
            return t;
        }
        crate::traversal::rewrite_term(t, &mut |s| match s.node {
            Mnode::Const(crate::model::ConstKind::Caller) => match caller {
                Some(addr) => Mterm::new(Mnode::Address(addr.to_string()), s.type_, s.loc),
                None => {
                    missing.push(s.loc);
                    s
                }
            },
            _ => s,
        })
    });
    for loc in missing {
        bus.emit_error(loc, ErrorKind::CallerNotSetInInit);
    }
    bus.stop_if_errors(stop_code::INIT)?;
    Ok(model)
}

// ============================================================================
// check_if_asset_in_function
// ============================================================================

/// Function signatures may not expose a raw asset type: the runtime value of
/// an asset is a key/record pair, not a first-class value.
pub fn check_if_asset_in_function(model: Model, bus: &mut Bus) -> Result<Model, Stop> {
    let offending = |ty: &Type| -> Option<String> {
        let mut found = None;
        ty.any(&mut |t| match &t.node {
            Tnode::Asset(a) | Tnode::Container(a, _) => {
                found = Some(a.clone());
                true
            }
            _ => false,
        });
        found
    };

    for fun in &model.functions {
        for arg in &fun.args {
            if let Some(a) = offending(&arg.typ) {
                bus.emit_error(fun.loc, ErrorKind::AssetInFunctionSig(fun.name.clone(), a));
            }
        }
        if let Some(ret) = fun.kind.return_type() {
            if let Some(a) = offending(ret) {
                bus.emit_error(fun.loc, ErrorKind::AssetInFunctionSig(fun.name.clone(), a));
            }
        }
    }
    bus.stop_if_errors(stop_code::ASSET_IN_FUNCTION)?;
    Ok(model)
}

// ============================================================================
// check_unused_variables
// ============================================================================

fn uses_var(body: &Mterm, id: &str) -> bool {
    any_term(body, &mut |t| {
        matches!(&t.node, Mnode::Var { id: v, .. } if v == id)
    })
}

/// Warnings for unused function arguments and unused let-bindings
pub fn check_unused_variables(model: Model, bus: &mut Bus) -> Model {
    for fun in &model.functions {
        for arg in &fun.args {
            if !uses_var(&fun.body, &arg.name) {
                bus.emit_warning(fun.loc, WarningKind::UnusedArgument(arg.name.clone()));
            }
        }
        any_term(&fun.body, &mut |t| {
            match &t.node {
                Mnode::Letin { id, body, .. } if !id.starts_with('_') => {
                    if !uses_var(body, id) {
                        bus.emit_warning(t.loc, WarningKind::UnusedVariable(id.clone()));
                    }
                }
                _ => {}
            }
            false
        });
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builders::*;
    use crate::model::{ContainerKind, Loc, MapKind};

    fn model_with(decls: Vec<Decl>) -> Model {
        let mut m = Model::new("test");
        m.decls = decls;
        m
    }

    #[test]
    fn defaulted_key_is_rejected() {
        let asset = AssetDeclBuilder::new("my_asset")
            .key("id", tnat())
            .field("v", tint())
            .build();
        let mut asset = asset;
        asset.fields[0].default = Some(mnat(0));
        let model = model_with(vec![Decl::Asset(asset)]);
        let mut bus = Bus::new();
        let err = check_asset_key(model, &mut bus).unwrap_err();
        assert_eq!(err.code, stop_code::SEMANTIC);
        assert!(matches!(
            err.diagnostics[0].kind,
            ErrorKind::DefaultValueOnKeyAsset(_, _)
        ));
    }

    #[test]
    fn duplicate_init_keys_are_rejected() {
        let lit = |id: u128| {
            Mterm::synthesised(
                Mnode::LitAsset(vec![("id".into(), mnat(id)), ("v".into(), mint(0))]),
                tasset("my_asset"),
            )
        };
        let asset = AssetDeclBuilder::new("my_asset")
            .key("id", tnat())
            .field("v", tint())
            .init(lit(1))
            .init(lit(1))
            .build();
        let model = model_with(vec![Decl::Asset(asset)]);
        let mut bus = Bus::new();
        let err = check_duplicated_keys_in_asset(model, &mut bus).unwrap_err();
        assert!(matches!(
            err.diagnostics[0].kind,
            ErrorKind::DuplicatedKeyAsset(_, _)
        ));
    }

    #[test]
    fn caller_in_default_without_address_fails() {
        let mut var = crate::model::VarDecl {
            name: "admin".into(),
            typ: taddress(),
            kind: crate::model::VarKind::Variable,
            default: None,
            invariants: Vec::new(),
            loc: Loc::new(3, 1),
        };
        var.default = Some(Mterm::synthesised(
            Mnode::Const(crate::model::ConstKind::Caller),
            taddress(),
        ));
        let model = model_with(vec![Decl::Var(var)]);
        let mut bus = Bus::new();
        let err = check_and_replace_init_caller(model, None, &mut bus).unwrap_err();
        assert!(matches!(err.diagnostics[0].kind, ErrorKind::CallerNotSetInInit));
    }

    #[test]
    fn caller_in_default_is_substituted() {
        let var = crate::model::VarDecl {
            name: "admin".into(),
            typ: taddress(),
            kind: crate::model::VarKind::Variable,
            default: Some(Mterm::synthesised(
                Mnode::Const(crate::model::ConstKind::Caller),
                taddress(),
            )),
            invariants: Vec::new(),
            loc: Loc::NONE,
        };
        let model = model_with(vec![Decl::Var(var)]);
        let mut bus = Bus::new();
        let out = check_and_replace_init_caller(model, Some("tz1abc"), &mut bus).unwrap();
        let Decl::Var(v) = &out.decls[0] else { panic!() };
        assert_eq!(v.default.as_ref().unwrap().node, Mnode::Address("tz1abc".into()));
    }

    #[test]
    fn partition_direct_add_is_rejected() {
        let mile = AssetDeclBuilder::new("mile")
            .key("id", tstring())
            .field("amount", tint())
            .build();
        let owner = AssetDeclBuilder::new("owner")
            .key("addr", taddress())
            .field(
                "miles",
                tcontainer("mile", ContainerKind::Partition),
            )
            .map_kind(MapKind::Map)
            .build();
        let body = Mterm::synthesised(
            Mnode::AddAsset {
                asset: "mile".into(),
                value: Box::new(munit()),
            },
            tunit(),
        );
        let mut model = model_with(vec![Decl::Asset(mile), Decl::Asset(owner)]);
        model
            .functions
            .push(FunctionBuilder::entry("bad").body(body).build());
        let mut bus = Bus::new();
        let err = check_partition_access(model, &mut bus).unwrap_err();
        assert!(matches!(
            err.diagnostics[0].kind,
            ErrorKind::AssetPartitionnedBy(_, _, _)
        ));
    }

    #[test]
    fn unused_argument_warns() {
        let mut model = model_with(Vec::new());
        model.functions.push(
            FunctionBuilder::entry("noop")
                .arg("unused", tint())
                .body(mskip())
                .build(),
        );
        let mut bus = Bus::new();
        check_unused_variables(model, &mut bus);
        assert_eq!(bus.warnings().len(), 1);
    }
}
