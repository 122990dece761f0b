//! # Pipeline Driver
//!
//! Sequences the rewrite passes in cohort order over a typed model and
//! returns the lowered model together with the run report (pass trace and
//! accumulated warnings).
//!
//! ```text
//! A validation -> B normalisation -> C asset methods -> D enums
//!   -> E asset lowering -> F remaining lowerings -> G whole program
//!   -> H housekeeping
//! ```
//!
//! A handful of passes are gated by [`Options`]; `update_nat_int_rat` and
//! `flat_sequence` run twice by design. The asset-shape-dependent members
//! of cohort F (`fix_container`, `extract_item_collection_from_add_asset`,
//! `process_multi_keys`, `remove_update_all`, `add_explicit_sort`,
//! `change_type_of_nth`, `add_contain_on_get`) run just before
//! `remove_asset`, which consumes the asset declarations they rely on.

use anyhow::bail;
use thiserror::Error;
use tracing::debug;

use crate::diagnostics::{stop_code, Bus, Diagnostic, ErrorKind, Stop, WarningKind};
use crate::model::Model;
use crate::passes;

// ============================================================================
// Options
// ============================================================================

/// Back-end target; currently only metadata handling looks at it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    Michelson,
    Whyml,
}

/// Read-only run configuration
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Address substituted for `caller` in defaults
    pub caller: Option<String>,
    /// Retain only the named property
    pub property_focused: Option<String>,
    /// Off-chain metadata URI
    pub metadata_uri: Option<String>,
    /// JSON metadata embedded in storage
    pub metadata_storage: Option<String>,
    /// Force a parameter-driven metadata slot
    pub with_metadata: bool,
    /// `_now` / `_set_now` instrumentation
    pub test_mode: bool,
    /// Address used for `emit` rewrites
    pub event_well_address: Option<String>,
    pub target: Target,
}

impl Options {
    /// Cross-field sanity of the option set
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.metadata_uri.is_some() && self.metadata_storage.is_some() {
            bail!("metadata uri and metadata storage are mutually exclusive");
        }
        if let Some(addr) = &self.caller {
            if !(addr.starts_with("tz") || addr.starts_with("KT")) {
                bail!("'{addr}' does not look like an address");
            }
        }
        Ok(())
    }
}

// ============================================================================
// Report and errors
// ============================================================================

/// What a run did: pass trace plus the warnings it accumulated
#[derive(Debug, Default)]
pub struct RunReport {
    pub passes: Vec<&'static str>,
    pub warnings: Vec<Diagnostic<WarningKind>>,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid options: {0}")]
    InvalidOptions(#[source] anyhow::Error),
    #[error(transparent)]
    Stop(#[from] Stop),
}

// ============================================================================
// Driver
// ============================================================================

struct Driver {
    report: RunReport,
    bus: Bus,
}

impl Driver {
    fn pure(&mut self, name: &'static str, model: Model, f: impl FnOnce(Model) -> Model) -> Model {
        debug!(pass = name, "applying");
        self.report.passes.push(name);
        f(model)
    }

    fn checked(
        &mut self,
        name: &'static str,
        model: Model,
        f: impl FnOnce(Model, &mut Bus) -> Result<Model, Stop>,
    ) -> Result<Model, Stop> {
        debug!(pass = name, "applying");
        self.report.passes.push(name);
        f(model, &mut self.bus)
    }
}

/// Run the whole lowering pipeline
pub fn run(model: Model, opts: &Options) -> Result<(Model, RunReport), PipelineError> {
    opts.validate().map_err(PipelineError::InvalidOptions)?;
    let mut d = Driver {
        report: RunReport::default(),
        bus: Bus::new(),
    };

    // the model must expose at least one entry point
    if !model.functions.iter().any(|f| f.is_entry()) {
        d.bus.emit_error(model.loc, ErrorKind::NoEntrypoint);
        d.bus.stop_if_errors(stop_code::MODEL).map_err(Stop::from)?;
    }

    use passes::*;

    // --- A: validation ------------------------------------------------------
    let model = d.checked("check_partition_access", model, check::check_partition_access)?;
    let model = d.checked("check_containers_asset", model, check::check_containers_asset)?;
    let model = d.checked(
        "check_empty_container_on_asset_default_value",
        model,
        check::check_empty_container_on_asset_default_value,
    )?;
    let model = d.checked("check_asset_key", model, check::check_asset_key)?;
    let model = d.checked("check_invalid_init_value", model, check::check_invalid_init_value)?;
    let model = d.checked(
        "check_init_partition_in_asset",
        model,
        check::check_init_partition_in_asset,
    )?;
    let model = d.checked(
        "check_duplicated_keys_in_asset",
        model,
        check::check_duplicated_keys_in_asset,
    )?;
    let model = {
        let caller = opts.caller.as_deref();
        debug!(pass = "check_and_replace_init_caller", "applying");
        d.report.passes.push("check_and_replace_init_caller");
        check::check_and_replace_init_caller(model, caller, &mut d.bus)?
    };
    let model = d.checked(
        "check_if_asset_in_function",
        model,
        check::check_if_asset_in_function,
    )?;
    let model = {
        debug!(pass = "check_unused_variables", "applying");
        d.report.passes.push("check_unused_variables");
        check::check_unused_variables(model, &mut d.bus)
    };

    // --- option-gated early passes ------------------------------------------
    let model = match &opts.property_focused {
        Some(p) => {
            let p = p.clone();
            d.pure("prune_properties", model, move |m| {
                normalize::prune_properties(m, &p)
            })
        }
        None => model,
    };
    let model = if opts.test_mode {
        d.pure("test_mode", model, whole_program::test_mode)
    } else {
        model
    };

    // --- B: normalisation ---------------------------------------------------
    let model = d.pure("flat_sequence", model, normalize::flat_sequence);
    let model = d.checked("replace_label_by_mark", model, |m, bus| {
        normalize::replace_label_by_mark(m, bus)
    })?;
    let model = d.pure("remove_decl_var_opt", model, control::remove_decl_var_opt);
    let model = d.pure(
        "replace_declvar_by_letin",
        model,
        normalize::replace_declvar_by_letin,
    );
    let model = d.pure(
        "rename_shadow_variable",
        model,
        normalize::rename_shadow_variable,
    );
    let model = d.pure("assign_loop_label", model, normalize::assign_loop_label);
    let model = d.pure("extend_loop_iter", model, normalize::extend_loop_iter);
    let model = d.pure(
        "transfer_shadow_variable_to_storage",
        model,
        normalize::transfer_shadow_variable_to_storage,
    );
    let model = d.pure(
        "concat_shadow_effect_to_exec",
        model,
        normalize::concat_shadow_effect_to_exec,
    );
    let model = d.pure("flat_sequence", model, normalize::flat_sequence);

    // --- C: asset methods ---------------------------------------------------
    // asset states and multi-keys normalise first: state sugar produces
    // field accesses the passes below must still see, and record building
    // relies on the flattened key
    let model = d.pure("process_asset_state", model, enums::process_asset_state);
    let model = d.pure("process_multi_keys", model, containers::process_multi_keys);
    let model = d.checked("remove_add_update", model, asset_methods::remove_add_update)?;
    let model = d.pure(
        "replace_assignfield_by_update",
        model,
        asset_methods::replace_assignfield_by_update,
    );
    let model = d.pure(
        "remove_container_op_in_update",
        model,
        asset_methods::remove_container_op_in_update,
    );
    let model = d.pure(
        "remove_container_op_in_update_exec",
        model,
        asset_methods::remove_container_op_in_update_exec,
    );
    let model = d.pure("remove_empty_update", model, asset_methods::remove_empty_update);
    let model = d.pure("merge_update", model, asset_methods::merge_update);
    let model = d.pure(
        "remove_duplicate_key",
        model,
        asset_methods::remove_duplicate_key,
    );
    let model = d.pure(
        "replace_dotassetfield_by_dot",
        model,
        asset_methods::replace_dotassetfield_by_dot,
    );

    // --- D: enums and states ------------------------------------------------
    let model = d.pure("remove_enum", model, enums::remove_enum);
    let model = d.pure("remove_enum000", model, enums::remove_enum000);

    // --- E: asset lowering (and the decl-dependent F members before it) ------
    let model = d.pure("fix_container", model, containers::fix_container);
    let model = d.pure(
        "extract_item_collection_from_add_asset",
        model,
        containers::extract_item_collection_from_add_asset,
    );
    let model = d.pure("remove_update_all", model, control::remove_update_all);
    let model = d.pure("add_explicit_sort", model, control::add_explicit_sort);
    let model = d.pure("change_type_of_nth", model, control::change_type_of_nth);
    let model = d.pure("add_contain_on_get", model, control::add_contain_on_get);
    let model = d.checked("remove_asset", model, asset_lowering::remove_asset)?;
    let model = d.pure("split_key_values", model, containers::split_key_values);

    // --- F: remaining lowerings ---------------------------------------------
    let model = d.pure("remove_rational", model, rational::remove_rational);
    let model = d.pure("update_nat_int_rat", model, rational::update_nat_int_rat);
    let model = d.pure(
        "replace_date_duration_by_timestamp",
        model,
        rational::replace_date_duration_by_timestamp,
    );
    let model = d.pure("update_nat_int_rat", model, rational::update_nat_int_rat);
    let model = d.pure("abs_tez", model, rational::abs_tez);
    let model = d.pure(
        "process_internal_string",
        model,
        rational::process_internal_string,
    );
    let model = d.pure(
        "process_arith_container",
        model,
        containers::process_arith_container,
    );
    let model = d.pure(
        "remove_iterable_big_map",
        model,
        containers::remove_iterable_big_map,
    );
    let model = d.pure("replace_for_to_iter", model, control::replace_for_to_iter);
    let model = d.pure("lazy_eval_condition", model, control::lazy_eval_condition);
    let model = d.pure(
        "remove_ternary_operator",
        model,
        control::remove_ternary_operator,
    );
    let model = d.pure(
        "remove_high_level_model",
        model,
        control::remove_high_level_model,
    );
    let model = d.pure("flat_sequence", model, normalize::flat_sequence);

    // --- G: whole program ---------------------------------------------------
    let model = d.pure("getter_to_entry", model, whole_program::getter_to_entry);
    let model = d.checked("process_parameter", model, whole_program::process_parameter)?;
    let model = {
        let policy = whole_program::MetadataPolicy {
            uri: opts.metadata_uri.as_deref(),
            storage_json: opts.metadata_storage.as_deref(),
            with_metadata: opts.with_metadata,
        };
        debug!(pass = "process_metadata", "applying");
        d.report.passes.push("process_metadata");
        if opts.target == Target::Whyml {
            model
        } else {
            whole_program::process_metadata(model, &policy, &mut d.bus)?
        }
    };
    let model = d.pure("remove_constant", model, whole_program::remove_constant);
    let model = d.pure(
        "eval_variable_initial_value",
        model,
        whole_program::eval_variable_initial_value,
    );
    let model = d.pure("normalize_storage", model, whole_program::normalize_storage);
    let model = d.pure("eval_storage", model, whole_program::eval_storage);
    let model = d.pure("sort_container", model, whole_program::sort_container);
    let model = match &opts.event_well_address {
        Some(addr) => {
            let addr = addr.clone();
            d.pure("process_event_well", model, move |m| {
                whole_program::process_event_well(m, &addr)
            })
        }
        None => model,
    };
    let model = d.pure("reverse_operations", model, whole_program::reverse_operations);
    let model = d.pure(
        "remove_storage_field_in_function",
        model,
        whole_program::remove_storage_field_in_function,
    );
    let model = d.pure(
        "process_single_field_storage",
        model,
        whole_program::process_single_field_storage,
    );
    let model = d.pure("fill_stovars", model, whole_program::fill_stovars);
    let model = d.pure("filter_api_storage", model, whole_program::filter_api_storage);
    let model = d.pure("process_fail", model, whole_program::process_fail);
    let model = d.pure("patch_fa2", model, whole_program::patch_fa2);

    // --- H: housekeeping ----------------------------------------------------
    let model = d.pure(
        "remove_letin_from_expr",
        model,
        housekeeping::remove_letin_from_expr,
    );
    let model = d.pure("remove_fun_dotasset", model, housekeeping::remove_fun_dotasset);
    let model = d.pure("expr_to_instr", model, control::expr_to_instr);
    let model = d.pure("flat_sequence", model, normalize::flat_sequence);

    d.report.warnings = d.bus.take_warnings();
    Ok((model, d.report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builders::*;
    use crate::model::{Decl, MapKind, Mterm};

    fn minimal_model() -> Model {
        let mut m = Model::new("minimal");
        m.functions
            .push(FunctionBuilder::entry("noop").body(mskip()).build());
        m
    }

    #[test]
    fn model_without_entry_is_rejected() {
        let m = Model::new("empty");
        let err = run(m, &Options::default()).unwrap_err();
        let PipelineError::Stop(stop) = err else { panic!("expected stop") };
        assert_eq!(stop.code, stop_code::MODEL);
        assert!(matches!(stop.diagnostics[0].kind, ErrorKind::NoEntrypoint));
    }

    #[test]
    fn invalid_caller_option_is_rejected() {
        let opts = Options {
            caller: Some("not-an-address".into()),
            ..Options::default()
        };
        let err = run(minimal_model(), &opts).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOptions(_)));
    }

    #[test]
    fn minimal_model_runs_every_cohort() {
        let (out, report) = run(minimal_model(), &Options::default()).unwrap();
        assert_eq!(out.name, "minimal");
        // the driver applied the doubled passes twice
        let flat_count = report
            .passes
            .iter()
            .filter(|p| **p == "flat_sequence")
            .count();
        assert!(flat_count >= 3);
        let fold_count = report
            .passes
            .iter()
            .filter(|p| **p == "update_nat_int_rat")
            .count();
        assert_eq!(fold_count, 2);
    }

    #[test]
    fn pipeline_is_deterministic() {
        let build = || {
            let mut m = Model::new("det");
            m.decls.push(Decl::Asset(
                AssetDeclBuilder::new("ledger")
                    .key("holder", taddress())
                    .field("tokens", tnat())
                    .map_kind(MapKind::BigMap)
                    .build(),
            ));
            m.functions.push(
                FunctionBuilder::entry("mint")
                    .arg("to", taddress())
                    .arg("value", tnat())
                    .body(Mterm::synthesised(
                        crate::model::Mnode::AddUpdate {
                            asset: "ledger".into(),
                            ck: crate::model::Ck::Coll,
                            key: Box::new(mvar_param("to", taddress())),
                            updates: vec![uitem(
                                "tokens",
                                crate::model::AssignOp::Plus,
                                mvar_param("value", tnat()),
                            )],
                        },
                        tunit(),
                    ))
                    .build(),
            );
            m
        };
        let (a, _) = run(build(), &Options::default()).unwrap();
        let (b, _) = run(build(), &Options::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mode_option_gates_instrumentation() {
        let opts = Options {
            test_mode: true,
            ..Options::default()
        };
        let (out, _) = run(minimal_model(), &opts).unwrap();
        assert!(out.functions.iter().any(|f| f.name == "_set_now"));

        let (out, _) = run(minimal_model(), &Options::default()).unwrap();
        assert!(!out.functions.iter().any(|f| f.name == "_set_now"));
    }
}
