//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Candidate validation.
//!
//! Runs the structural schema checks followed by every plugin's `validate`
//! callback. Validation is read-only with respect to the datastores: the
//! prospective tree is only inspected, never installed.

use nacre_datastore::validate::{self, Diagnostic, XPathEvaluator};
use nacre_northbound::{self as northbound, PluginBus, TransactionCtx, TransactionPhase};
use nacre_yang::SchemaContext;
use tracing::debug;

/// How a validation run failed.
#[derive(Debug)]
pub enum ValidateFailure {
    /// The tree violates the schema.
    Schema(Vec<Diagnostic>),
    /// A plugin rejected the configuration; `observed` counts the plugins
    /// that saw the validate phase (including the rejecting one).
    Plugin {
        observed: usize,
        error: northbound::error::Error,
    },
}

// ===== global functions =====

/// Validates the transaction's target tree against the schema and the
/// registered plugins.
pub fn validate_tree(
    plugins: &mut PluginBus,
    schema: &SchemaContext,
    xpath: &dyn XPathEvaluator,
    tx: &TransactionCtx<'_>,
) -> Result<(), ValidateFailure> {
    // Structural schema checks come first; plugins may assume they only
    // ever see schema-valid trees.
    let diagnostics = validate::validate(tx.source, schema, xpath);
    if !diagnostics.is_empty() {
        for diagnostic in &diagnostics {
            debug!(path = %diagnostic.path, message = %diagnostic.message,
                "validation diagnostic");
        }
        return Err(ValidateFailure::Schema(diagnostics));
    }

    plugins
        .invoke_forward(TransactionPhase::Validate, tx)
        .map_err(|(observed, error)| ValidateFailure::Plugin {
            observed,
            error,
        })
}
