use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use vaultpatch_engine::{key_names, KeyDiff, ManagedKeys};
use vaultpatch_resource::{
    framework::{parse_properties, to_properties, ResourceProvider},
    schema::v0,
    state::schema::v0::ResourceState,
};
use vaultpatch_resources_kv::{KvKeysInProperties, KvKeysOutProperties, KV_KEYS};

use tracing::{info_span, Instrument as _};

use crate::{
    provider,
    refresh::{refresh_resource, Refreshed},
    state::StateSession,
    Options,
};

#[derive(clap::Parser, Debug)]
pub(crate) struct Args {
    /// The name under which the resource is tracked in the state file
    pub name: String,

    /// The mount path of the KV v2 secrets engine
    #[arg(long)]
    pub mount: String,

    /// The path of the secret within the mount
    #[arg(long)]
    pub path: String,

    /// A key to manage, with its value
    #[arg(long("key"), short('k'), number_of_values = 2, value_names = &["NAME", "VALUE"])]
    pub key: Vec<String>,

    /// All keys to manage, as a JSON object of strings
    #[arg(long("keys-json"))]
    pub keys_json: Option<String>,
}

impl Args {
    pub(crate) fn to_inputs(&self) -> Result<KvKeysInProperties> {
        Ok(KvKeysInProperties {
            mount: self.mount.clone(),
            path: self.path.clone(),
            keys: parse_keys(self.keys_json.as_deref(), &self.key)?,
        })
    }
}

/// Gather the declared keys from `--keys-json` and `--key` pairs.
///
/// A key may be given only once: flag order is not preserved, so there is
/// no "last one wins".
pub(crate) fn parse_keys(keys_json: Option<&str>, pairs: &[String]) -> Result<ManagedKeys> {
    let mut keys = match keys_json {
        Some(json_string) => serde_json::from_str::<BTreeMap<String, String>>(json_string)
            .context("failed to parse value of --keys-json; expected an object of strings")?,
        None => ManagedKeys::new(),
    };
    for pair in pairs.chunks(2) {
        let [k, v] = pair else {
            bail!("--key requires a NAME and a VALUE");
        };
        if keys.contains_key(k) {
            bail!("duplicate key: {}", k);
        }
        keys.insert(k.clone(), v.clone());
    }
    Ok(keys)
}

/// What `apply` will do for one resource.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Plan {
    Create,
    Update {
        prior: KvKeysOutProperties,
        diff: KeyDiff,
    },
    UpToDate,
}

pub(crate) fn plan(tracked: Option<KvKeysOutProperties>, inputs: &KvKeysInProperties) -> Plan {
    match tracked {
        None => Plan::Create,
        Some(prior) => {
            let diff = KeyDiff::between(&prior.keys, &inputs.keys);
            if diff.is_empty() && prior.location() == inputs.location() {
                Plan::UpToDate
            } else {
                Plan::Update { prior, diff }
            }
        }
    }
}

pub(crate) async fn apply(options: &Options, args: &Args) -> Result<()> {
    let inputs = args.to_inputs()?;
    let mut session = StateSession::open(&options.state)?;
    // fail on a foreign resource type before logging in
    session.kv_keys(&args.name)?;
    let provider = provider::connect(&options.vault).await?;
    apply_resource(&provider, &mut session, &args.name, &inputs).await
}

/// Bring resource `name` to the declared keys.
///
/// A tracked resource is refreshed first, so that keys changed or deleted
/// outside of vaultpatch are restored.
pub(crate) async fn apply_resource(
    provider: &impl ResourceProvider,
    session: &mut StateSession,
    name: &str,
    inputs: &KvKeysInProperties,
) -> Result<()> {
    async move {
        if session.resource(name).is_some() {
            match refresh_resource(provider, session, name).await? {
                Refreshed::Present { drift } if !drift.is_empty() => {
                    eprintln!("{}: drifted in Vault: {}", name, drift)
                }
                Refreshed::Present { .. } => {}
                Refreshed::Gone => eprintln!("{}: managed keys are gone from Vault", name),
            }
        }
        let plan = plan(session.kv_keys(name)?, inputs);
        if plan == Plan::UpToDate {
            eprintln!("{}: up to date", name);
            return Ok(());
        }
        apply_plan(provider, session, name, inputs, plan).await
    }
    .instrument(info_span!("applying resource", name))
    .await
}

pub(crate) async fn apply_plan(
    provider: &impl ResourceProvider,
    session: &mut StateSession,
    name: &str,
    inputs: &KvKeysInProperties,
    plan: Plan,
) -> Result<()> {
    let input_properties = v0::InputProperties(to_properties(inputs)?);
    let output_properties = match plan {
        Plan::UpToDate => return Ok(()),
        Plan::Create => {
            eprintln!(
                "{}: creating {} at {}",
                name,
                key_names(&inputs.keys),
                inputs.location()
            );
            provider
                .create(v0::CreateResourceRequest {
                    type_: v0::ResourceType(KV_KEYS.to_string()),
                    input_properties: input_properties.clone(),
                })
                .await?
                .output_properties
        }
        Plan::Update { prior, diff } => {
            if prior.location() != inputs.location() {
                eprintln!("{}: moving from {} to {}", name, prior.location(), inputs.location());
            } else {
                eprintln!("{}: updating {}: {}", name, inputs.location(), diff);
            }
            let resource = session
                .resource(name)
                .context("tracked resource disappeared from the state")?
                .to_extant();
            provider
                .update(v0::UpdateResourceRequest {
                    resource,
                    input_properties: input_properties.clone(),
                })
                .await?
                .output_properties
        }
    };
    // Fail before recording anything the provider did not return in shape.
    let _: KvKeysOutProperties = parse_properties(&output_properties.0, KV_KEYS)?;
    session.record(
        name,
        ResourceState {
            type_: KV_KEYS.to_string(),
            input_properties: input_properties.0,
            output_properties: output_properties.0,
        },
        "apply",
    )
}
