//! # Diagnostic Bus
//!
//! Typed error and warning kinds with source locations, an append-only
//! per-run accumulator, and the fatal [`Stop`] raised at the end of a
//! validation pass that recorded errors.
//!
//! `emit_error` records but never throws: a pass keeps collecting so the
//! user sees every diagnostic of the cluster at once. Warnings never stop
//! the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Ident, Loc};

// ============================================================================
// Error kinds
// ============================================================================

/// Closed taxonomy of fatal-class diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Direct add/remove/clear on an asset owned by a partition field
    #[error("asset '{0}' is partitioned by field '{1}' of asset '{2}'; update it through the partition")]
    AssetPartitionnedBy(Ident, Ident, Ident),

    /// Asset lookup failed while lowering
    #[error("asset '{0}' not found")]
    AssetNotFound(Ident),

    /// `caller` used in a default value without `--set-caller-init`
    #[error("'caller' is used as initial value but the caller address is not set")]
    CallerNotSetInInit,

    /// A record value could not be synthesised from partial field updates
    #[error("cannot build asset '{0}': no value for field '{1}'")]
    CannotBuildAsset(Ident, Ident),

    /// A container field references an asset that itself holds containers
    #[error("field '{1}' of asset '{0}' references asset '{2}' which contains container fields")]
    ContainersInAssetContainers(Ident, Ident, Ident),

    #[error("the key field '{1}' of asset '{0}' must not carry a default value")]
    DefaultValueOnKeyAsset(Ident, Ident),

    #[error("duplicate key '{1}' in initial values of asset '{0}'")]
    DuplicatedKeyAsset(Ident, Ident),

    /// A runtime context constant in a default value
    #[error("invalid initial value: runtime value '{0}' cannot appear in a default")]
    InvalidInitValue(String),

    #[error("asset '{0}' is used as a partition; clear it through the owning field")]
    NoClearForPartitionAsset(Ident),

    #[error("default value for container field '{1}' of asset '{0}' must be an empty container")]
    NoEmptyContainerForDefaultValue(Ident, Ident),

    #[error("contract has no entrypoint")]
    NoEntrypoint,

    #[error("asset '{0}' is used as a partition and cannot be initialized directly")]
    NoInitForPartitionAsset(Ident),

    #[error("constant parameter '{0}' has no initial value")]
    NoInitValueForConstParam(Ident),

    #[error("parameter '{0}' has no initial value")]
    NoInitValueForParameter(Ident),

    #[error("put_remove is not available on iterable big map asset '{0}'")]
    NoPutRemoveForIterableBigMapAsset(Ident),

    #[error("asset '{0}': cannot sort on '{1}', the sole key of a multi-key asset")]
    NoSortOnKeyWithMultiKey(Ident, Ident),

    #[error("initial value of asset '{0}' must be a literal")]
    OnlyLiteralInAssetInit(Ident),

    #[error("unknown contract '{0}'")]
    UnknownContract(Ident),

    /// Function signatures cannot expose a raw asset type
    #[error("function '{0}' exposes asset type '{1}' in its signature")]
    AssetInFunctionSig(Ident, Ident),

    /// A label left standing alone after label normalisation
    #[error("free-standing label '{0}'")]
    FreeStandingLabel(Ident),

    #[error("invalid metadata value: {0}")]
    InvalidMetadata(String),
}

/// Non-fatal diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    #[error("unused argument '{0}'")]
    UnusedArgument(Ident),

    #[error("unused variable '{0}'")]
    UnusedVariable(Ident),
}

/// A located diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic<K> {
    pub loc: Loc,
    pub kind: K,
}

impl<K: fmt::Display> fmt::Display for Diagnostic<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loc == Loc::NONE {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}:{}: {}", self.loc.line, self.loc.col, self.kind)
        }
    }
}

// ============================================================================
// Stop
// ============================================================================

/// Per-cluster stop codes
pub mod stop_code {
    /// Missing entrypoint or malformed top level
    pub const MODEL: u8 = 4;
    /// Semantic validation cluster (cohort A checks)
    pub const SEMANTIC: u8 = 5;
    /// Initial-value validation cluster
    pub const INIT: u8 = 6;
    /// Invariant violations discovered while lowering
    pub const LOWERING: u8 = 7;
    /// Asset type exposed by a function signature
    pub const ASSET_IN_FUNCTION: u8 = 8;
}

/// Fatal halt raised after a pass recorded errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("pipeline stopped (code {code}): {} error(s)", .diagnostics.len())]
pub struct Stop {
    pub code: u8,
    pub diagnostics: Vec<Diagnostic<ErrorKind>>,
}

// ============================================================================
// Bus
// ============================================================================

/// Per-run diagnostic accumulator.
///
/// Owned by the driver and lent to validation passes; append-only within a
/// run.
#[derive(Debug, Default)]
pub struct Bus {
    errors: Vec<Diagnostic<ErrorKind>>,
    warnings: Vec<Diagnostic<WarningKind>>,
}

impl Bus {
    pub fn new() -> Self {
        Bus::default()
    }

    /// Record a fatal-class diagnostic; does not throw
    pub fn emit_error(&mut self, loc: Loc, kind: ErrorKind) {
        tracing::warn!(%kind, line = loc.line, col = loc.col, "error recorded");
        self.errors.push(Diagnostic { loc, kind });
    }

    /// Record a warning
    pub fn emit_warning(&mut self, loc: Loc, kind: WarningKind) {
        tracing::warn!(%kind, line = loc.line, col = loc.col, "warning recorded");
        self.warnings.push(Diagnostic { loc, kind });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Diagnostic<ErrorKind>] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Diagnostic<WarningKind>] {
        &self.warnings
    }

    /// End-of-pass check: raise [`Stop`] with `code` when any error was
    /// recorded since the last flush, draining the error buffer.
    pub fn stop_if_errors(&mut self, code: u8) -> Result<(), Stop> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Stop {
                code,
                diagnostics: std::mem::take(&mut self.errors),
            })
        }
    }

    /// Hand the warnings to the driver at end of run
    pub fn take_warnings(&mut self) -> Vec<Diagnostic<WarningKind>> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_accumulate_then_stop() {
        let mut bus = Bus::new();
        bus.emit_error(Loc::new(1, 1), ErrorKind::NoEntrypoint);
        bus.emit_error(Loc::new(2, 1), ErrorKind::CallerNotSetInInit);
        let err = bus.stop_if_errors(stop_code::SEMANTIC).unwrap_err();
        assert_eq!(err.code, stop_code::SEMANTIC);
        assert_eq!(err.diagnostics.len(), 2);
        // drained: a second check passes
        assert!(bus.stop_if_errors(stop_code::SEMANTIC).is_ok());
    }

    #[test]
    fn warnings_never_stop() {
        let mut bus = Bus::new();
        bus.emit_warning(Loc::NONE, WarningKind::UnusedVariable("x".into()));
        assert!(bus.stop_if_errors(stop_code::SEMANTIC).is_ok());
        assert_eq!(bus.take_warnings().len(), 1);
    }
}
