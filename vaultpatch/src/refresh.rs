use anyhow::{Context, Result};
use tracing::{info_span, Instrument as _};
use vaultpatch_engine::KeyDiff;
use vaultpatch_resource::{
    framework::{parse_properties, ResourceProvider},
    schema::v0,
    state::schema::v0::ResourceState,
};
use vaultpatch_resources_kv::{KvKeysOutProperties, KV_KEYS};

use crate::{provider, state::StateSession, Options};

/// What a refresh found in Vault.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Refreshed {
    /// The tracked keys were found; `drift` compares them with the state.
    Present { drift: KeyDiff },
    /// None of the tracked keys exist anymore; the resource was dropped
    /// from the state.
    Gone,
}

pub(crate) async fn refresh(options: &Options, name: &str) -> Result<()> {
    let mut session = StateSession::open(&options.state)?;
    if session.kv_keys(name)?.is_none() {
        anyhow::bail!("Resource {} is not tracked in {}", name, options.state.display());
    }
    let provider = provider::connect(&options.vault).await?;
    match refresh_resource(&provider, &mut session, name).await? {
        Refreshed::Present { drift } if drift.is_empty() => {
            eprintln!("{}: in sync", name)
        }
        Refreshed::Present { drift } => eprintln!("{}: drifted: {}", name, drift),
        Refreshed::Gone => eprintln!("{}: all managed keys are gone; no longer tracked", name),
    }
    Ok(())
}

pub(crate) async fn refresh_resource(
    provider: &impl ResourceProvider,
    session: &mut StateSession,
    name: &str,
) -> Result<Refreshed> {
    let tracked: ResourceState = session
        .resource(name)
        .with_context(|| format!("Resource {} is not tracked", name))?
        .clone();
    let before: KvKeysOutProperties = parse_properties(&tracked.output_properties, KV_KEYS)?;

    let response = provider
        .read(v0::ReadResourceRequest {
            resource: tracked.to_extant(),
        })
        .instrument(info_span!("refreshing resource", name))
        .await?;

    match response.output_properties {
        None => {
            session.forget(name, "refresh")?;
            Ok(Refreshed::Gone)
        }
        Some(observed) => {
            let after: KvKeysOutProperties = parse_properties(&observed.0, KV_KEYS)?;
            session.record(
                name,
                ResourceState {
                    output_properties: observed.0,
                    ..tracked
                },
                "refresh",
            )?;
            Ok(Refreshed::Present {
                drift: KeyDiff::between(&before.keys, &after.keys),
            })
        }
    }
}
