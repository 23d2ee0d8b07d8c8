//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Startup controller.
//!
//! Recovers the running datastore on boot from one of several sources
//! (none, init, running, startup), upgrades the persisted configuration
//! when the loaded module revisions changed, and commits the result
//! through the engine. Recovery failures fall back to the failsafe
//! configuration; the resulting status is published for later inspection.

use std::path::Path;

use nacre_datastore::merge;
use nacre_datastore::validate::Diagnostic;
use nacre_datastore::{ConfigTree, DatastoreName, xml};
use nacre_yang::{ModuleState, module_state_diff};
use tracing::{debug, info, warn};

use crate::config::StartupMode;
use crate::core::commit;
use crate::core::error::{Error, Result};
use crate::core::Context;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartupStatus {
    /// `STARTUP_OK`: running was recovered and committed.
    Ok,
    /// `STARTUP_ERR`: the startup source could not be read or applied.
    Err,
    /// `STARTUP_INVALID`: the startup source failed schema validation.
    Invalid,
}

/// Published startup outcome, kept for later inspection.
#[derive(Clone, Debug)]
pub struct StartupReport {
    pub status: StartupStatus,
    pub diagnostics: Vec<Diagnostic>,
}

// ===== global functions =====

/// Runs the boot sequence. Returns the published report; hard I/O errors
/// on the running datastore itself are fatal.
pub fn run(
    ctx: &mut Context,
    mode: StartupMode,
    extra_xml: Option<&Path>,
) -> Result<StartupReport> {
    info!(?mode, "starting up");
    ctx.datastores.create_if_missing(&DatastoreName::Running)?;

    let mut report = match mode {
        StartupMode::None => StartupReport {
            status: StartupStatus::Ok,
            diagnostics: Vec::new(),
        },
        StartupMode::Init => {
            // Scratch running and start from empty.
            ctx.datastores
                .put(&DatastoreName::Running, ConfigTree::new())?;
            StartupReport {
                status: StartupStatus::Ok,
                diagnostics: Vec::new(),
            }
        }
        StartupMode::Running => {
            // Copy the original running to tmp and treat it as startup
            // input.
            match ctx
                .datastores
                .copy(&DatastoreName::Running, &DatastoreName::Tmp)
            {
                Ok(()) => startup_from(ctx, &DatastoreName::Tmp),
                Err(error) => {
                    warn!(%error, "failed to stage running configuration");
                    StartupReport {
                        status: StartupStatus::Err,
                        diagnostics: Vec::new(),
                    }
                }
            }
        }
        StartupMode::Startup => {
            ctx.datastores.create_if_missing(&DatastoreName::Startup)?;
            startup_from(ctx, &DatastoreName::Startup)
        }
    };

    if report.status != StartupStatus::Ok {
        apply_failsafe(ctx, &report)?;
    }

    // Initiate the shared candidate.
    ctx.datastores
        .copy(&DatastoreName::Running, &DatastoreName::Candidate)?;

    // Merge the externally supplied overlay without committing: the
    // content becomes visible in candidate only.
    if report.status == StartupStatus::Ok
        && mode != StartupMode::None
        && let Some(path) = extra_xml
        && let Err(error) = overlay_extra_xml(ctx, path)
    {
        warn!(%error, path = %path.display(), "failed to merge extra XML overlay");
    }

    if report.status == StartupStatus::Ok {
        store_module_state(ctx);
    }
    if !report.diagnostics.is_empty() {
        for diagnostic in &report.diagnostics {
            warn!(path = %diagnostic.path, message = %diagnostic.message,
                "startup diagnostic");
        }
    }

    ctx.startup = Some(report.clone());
    info!(status = ?report.status, "startup complete");
    Ok(report)
}

// ===== helper functions =====

// Loads, upgrades, validates and commits the given startup source.
fn startup_from(ctx: &mut Context, db: &DatastoreName) -> StartupReport {
    let mut tree = match ctx.datastores.get(db) {
        Ok(tree) => (*tree).clone(),
        Err(error) => {
            warn!(%error, %db, "failed to load startup source");
            return StartupReport {
                status: StartupStatus::Err,
                diagnostics: Vec::new(),
            };
        }
    };
    tree.bind_schema(&ctx.schema);

    // Compare the stored module-state with the backend's and run upgrade
    // callbacks for every changed module, in alphabetical order. A boot
    // without a persisted module-state has nothing to compare against.
    let stored = load_module_state(ctx);
    let upgrades = match stored.is_empty() {
        true => Vec::new(),
        false => module_state_diff(&stored, &ctx.schema.module_state()),
    };
    for upgrade in &upgrades {
        debug!(module = %upgrade.name, from = ?upgrade.from, to = ?upgrade.to,
            "module revision changed, running upgrade callbacks");
        if let Err(error) = ctx.plugins.upgrade(upgrade, &mut tree) {
            error.log();
            return StartupReport {
                status: StartupStatus::Err,
                diagnostics: Vec::new(),
            };
        }
    }

    // Validate and commit through the engine.
    match commit::commit_tree(ctx, tree, 0, None) {
        Ok(_) => StartupReport {
            status: StartupStatus::Ok,
            diagnostics: Vec::new(),
        },
        Err(Error::Validation(diagnostics)) => StartupReport {
            status: StartupStatus::Invalid,
            diagnostics,
        },
        Err(error) => {
            warn!(%error, %db, "failed to commit startup source");
            StartupReport {
                status: StartupStatus::Err,
                diagnostics: Vec::new(),
            }
        }
    }
}

// Replaces running with the failsafe content, or with an empty tree when
// no failsafe is provisioned.
fn apply_failsafe(ctx: &mut Context, report: &StartupReport) -> Result<()> {
    warn!(status = ?report.status,
        "startup recovery failed, applying failsafe configuration");

    if ctx.datastores.exists(&DatastoreName::Failsafe) {
        let failsafe = ctx.datastores.get(&DatastoreName::Failsafe)?;
        match commit::commit_tree(ctx, (*failsafe).clone(), 0, None) {
            Ok(_) => {
                info!("failsafe configuration applied");
                return Ok(());
            }
            Err(error) => {
                warn!(%error, "failed to apply failsafe configuration");
            }
        }
    }

    ctx.datastores
        .put(&DatastoreName::Running, ConfigTree::new())?;
    Ok(())
}

// Merges the extra-xml overlay into the candidate datastore only.
fn overlay_extra_xml(ctx: &mut Context, path: &Path) -> Result<()> {
    let data = std::fs::read(path).map_err(Error::Io)?;
    let overlay = xml::parse_datastore(&data).map_err(Error::Parse)?;

    let mut candidate =
        (*ctx.datastores.get(&DatastoreName::Candidate)?).clone();
    merge::merge(&mut candidate, &overlay, &ctx.schema)?;
    ctx.datastores.put(&DatastoreName::Candidate, candidate)?;
    debug!(path = %path.display(), "merged extra XML overlay into candidate");
    Ok(())
}

fn load_module_state(ctx: &Context) -> Vec<ModuleState> {
    match std::fs::read(&ctx.module_state_path) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_else(|error| {
            warn!(%error, "failed to parse persisted module state");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

fn store_module_state(ctx: &Context) {
    let state = ctx.schema.module_state();
    match serde_json::to_vec_pretty(&state) {
        Ok(data) => {
            if let Err(error) = nacre_utils::file::atomic_write(
                &ctx.module_state_path,
                &data,
            ) {
                warn!(%error, "failed to persist module state");
            }
        }
        Err(error) => {
            warn!(%error, "failed to serialize module state");
        }
    }
}
