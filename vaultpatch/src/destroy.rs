use anyhow::{Context, Result};
use tracing::{info_span, Instrument as _};
use vaultpatch_resource::{framework::ResourceProvider, schema::v0};

use crate::{provider, state::StateSession, Options};

pub(crate) async fn destroy(options: &Options, name: &str) -> Result<()> {
    let mut session = StateSession::open(&options.state)?;
    let tracked = session
        .kv_keys(name)?
        .with_context(|| format!("Resource {} is not tracked in {}", name, options.state.display()))?;
    eprintln!("{}: removing {} keys from {}", name, tracked.keys.len(), tracked.location());
    let provider = provider::connect(&options.vault).await?;
    destroy_resource(&provider, &mut session, name).await
}

/// Remove the resource's keys from Vault, then stop tracking it.
pub(crate) async fn destroy_resource(
    provider: &impl ResourceProvider,
    session: &mut StateSession,
    name: &str,
) -> Result<()> {
    let resource = session
        .resource(name)
        .with_context(|| format!("Resource {} is not tracked", name))?
        .to_extant();
    provider
        .destroy(v0::DestroyResourceRequest { resource })
        .instrument(info_span!("destroying resource", name))
        .await?;
    session.forget(name, "destroy")
}
