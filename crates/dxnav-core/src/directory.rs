use std::time::Instant;

use dxnav_telemetry::{self as telemetry, Outcome};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::OpContext;
use crate::error::{DxError, DxResult};
use crate::process::DxRunner;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Stopped early; entries already removed stay removed.
    Cancelled,
}

fn qualify(project_id: Option<&str>, path: &str) -> String {
    match project_id {
        Some(project) => format!("{project}:{path}"),
        None => path.to_string(),
    }
}

fn listed_items(listing: Value) -> Vec<Value> {
    match listing {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("objects") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Deletes a remote folder bottom-up: every entry, recursing into
/// sub-folders first, then the folder itself.
///
/// Cancellation is checked before each entry. Progress is reported per
/// immediate child of each folder, so nested deletions are not counted
/// against the top-level total.
pub async fn delete_remote_directory(
    runner: &dyn DxRunner,
    path: &str,
    project_id: Option<&str>,
    ctx: &OpContext,
) -> DxResult<DeleteOutcome> {
    let started = Instant::now();
    let result = delete_recursive(runner, path.trim_end_matches('/'), project_id, ctx).await;
    let outcome = match &result {
        Ok(DeleteOutcome::Deleted) => Outcome::Succeeded,
        Ok(DeleteOutcome::Cancelled) => Outcome::Cancelled,
        Err(_) => Outcome::Failed,
    };
    telemetry::operation(
        "delete_directory",
        outcome,
        started.elapsed().as_millis(),
        &[("op_id", ctx.op_id.as_str())],
    );
    result
}

fn delete_recursive<'a>(
    runner: &'a dyn DxRunner,
    path: &'a str,
    project_id: Option<&'a str>,
    ctx: &'a OpContext,
) -> BoxFuture<'a, DxResult<DeleteOutcome>> {
    Box::pin(async move {
        delete_contents(runner, path, project_id, ctx)
            .await
            .map_err(|err| err.wrap(format!("failed to delete directory {path}")))
    })
}

async fn delete_contents(
    runner: &dyn DxRunner,
    path: &str,
    project_id: Option<&str>,
    ctx: &OpContext,
) -> DxResult<DeleteOutcome> {
    let full = qualify(project_id, path);
    let listing = runner
        .call(&["ls".to_string(), "--json".to_string(), full.clone()])
        .await?
        .into_json("dx ls")?;
    let items = listed_items(listing);
    let total = items.len();
    debug!("deleting {total} entries under {full}");

    for (index, item) in items.iter().enumerate() {
        if ctx.is_cancelled() {
            info!("Deletion of {full} cancelled after {index}/{total} entries");
            return Ok(DeleteOutcome::Cancelled);
        }

        let name = item.get("name").and_then(Value::as_str).ok_or_else(|| {
            DxError::UnexpectedOutput(format!("entry without a name under {full}"))
        })?;
        let child = format!("{path}/{name}");
        if item.get("class").and_then(Value::as_str) == Some("folder") {
            if delete_recursive(runner, &child, project_id, ctx).await? == DeleteOutcome::Cancelled {
                return Ok(DeleteOutcome::Cancelled);
            }
        } else {
            runner
                .call(&["rm".to_string(), qualify(project_id, &child)])
                .await?;
        }

        ctx.report(
            &format!("Deleted {}/{total}", index + 1),
            Some(100.0 / total as f64),
        );
    }

    runner.call(&["rmdir".to_string(), full]).await?;
    Ok(DeleteOutcome::Deleted)
}
