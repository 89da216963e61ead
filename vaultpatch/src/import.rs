use anyhow::{bail, Result};
use tracing::{info_span, Instrument as _};
use vaultpatch_engine::key_names;
use vaultpatch_resource::{
    framework::{parse_properties, ResourceProvider},
    schema::v0,
    state::schema::v0::ResourceState,
};
use vaultpatch_resources_kv::{KvKeysOutProperties, KV_KEYS};

use crate::{provider, state::StateSession, Options};

pub(crate) async fn import(options: &Options, name: &str, id: &str) -> Result<()> {
    let mut session = StateSession::open(&options.state)?;
    if session.resource(name).is_some() {
        bail!("Resource {} is already tracked in {}", name, options.state.display());
    }
    let provider = provider::connect(&options.vault).await?;
    let imported = import_resource(&provider, &mut session, name, id).await?;
    eprintln!(
        "{}: imported {} from {}",
        name,
        key_names(&imported.keys),
        imported.location()
    );
    Ok(())
}

/// Start tracking every key at `id` as resource `name`.
pub(crate) async fn import_resource(
    provider: &impl ResourceProvider,
    session: &mut StateSession,
    name: &str,
    id: &str,
) -> Result<KvKeysOutProperties> {
    if session.resource(name).is_some() {
        bail!("Resource {} is already tracked", name);
    }
    let response = provider
        .import(v0::ImportResourceRequest {
            type_: v0::ResourceType(KV_KEYS.to_string()),
            import_id: id.to_string(),
        })
        .instrument(info_span!("importing resource", name, id))
        .await?;
    let imported = parse_properties(&response.output_properties.0, KV_KEYS)?;
    session.record(
        name,
        ResourceState {
            type_: KV_KEYS.to_string(),
            input_properties: response.input_properties.0,
            output_properties: response.output_properties.0,
        },
        "import",
    )?;
    Ok(imported)
}
