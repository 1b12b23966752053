use std::collections::BTreeSet;

use busbar_sf_jobs::{FileLedger, Result, TypeRegistry};
use tracing::{debug, instrument, warn};

use super::{CommandResult, Context};
use crate::cli::ListMetadataArgs;

pub(super) async fn list(args: ListMetadataArgs, ctx: &Context) -> Result<CommandResult> {
    let mut components = ctx
        .api
        .list_metadata(&args.metadata_type, args.folder.as_deref())
        .await?;
    components.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    Ok(CommandResult::Listing(components))
}

pub(super) async fn describe(ctx: &Context) -> Result<CommandResult> {
    let describe = ctx.api.describe_metadata().await?;
    Ok(CommandResult::Describe(describe))
}

/// Refresh the ledger's remote revisions for `types` from `listMetadata`.
///
/// In-folder types are skipped since they can only be listed per folder.
/// A type the org rejects is logged and skipped. Returns the number of
/// components newly pending.
#[instrument(skip_all, fields(types = types.len()))]
pub(super) async fn observe_remote(
    ctx: &Context,
    ledger: &FileLedger,
    types: &BTreeSet<String>,
) -> Result<usize> {
    let registry = TypeRegistry::default();
    let mut listing = Vec::new();
    for metadata_type in types {
        if registry.by_name(metadata_type).is_some_and(|t| t.in_folder) {
            debug!(%metadata_type, "Skipping in-folder type");
            continue;
        }
        match ctx.api.list_metadata(metadata_type, None).await {
            Ok(components) => listing.extend(components),
            Err(e) => warn!(%metadata_type, error = %e, "Cannot list remote components"),
        }
    }
    ledger.observe_remote(&listing)
}
