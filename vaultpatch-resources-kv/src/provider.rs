use anyhow::{bail, Context, Result};
use serde_json::Value;
use vaultpatch_engine::{
    key_names, on_create, on_delete, on_import, on_refresh, on_update, to_json_patch, Document,
    ManagedKeys, RefreshOutcome,
};
use vaultpatch_resource::{
    framework::{parse_properties, to_properties, ResourceProvider},
    schema::v0,
};

use crate::{
    location::Location,
    store::{DocumentStore, RemoteDocument},
};

pub const KV_KEYS: &str = "kv_keys";

/// What the user declares for a `kv_keys` resource.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KvKeysInProperties {
    /// The mount path of the KV v2 secrets engine (e.g., 'app_demo').
    pub mount: String,
    /// The path within the mount where the secret lives (e.g., 'my-service/test').
    pub path: String,
    /// The keys to manage within the secret, with their values.
    pub keys: ManagedKeys,
}

/// What is recorded in the state for a `kv_keys` resource: the keys this
/// resource is responsible for.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KvKeysOutProperties {
    /// `mount/path`
    pub id: String,
    pub mount: String,
    pub path: String,
    pub keys: ManagedKeys,
}

impl KvKeysInProperties {
    pub fn location(&self) -> Location {
        Location::new(&self.mount, &self.path)
    }
}

impl KvKeysOutProperties {
    pub fn new(location: Location, keys: ManagedKeys) -> Self {
        KvKeysOutProperties {
            id: location.to_string(),
            mount: location.mount,
            path: location.path,
            keys,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(&self.mount, &self.path)
    }

    /// The declaration that reproduces this tracked state.
    pub fn to_inputs(&self) -> KvKeysInProperties {
        KvKeysInProperties {
            mount: self.mount.clone(),
            path: self.path.clone(),
            keys: self.keys.clone(),
        }
    }
}

fn to_document(keys: &ManagedKeys) -> RemoteDocument {
    keys.iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

/// Managed values are strings. A non-string value found remotely is rendered
/// as compact JSON; it then differs from any declared value, so the next
/// apply overwrites it with the declared string.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_managed_keys(document: &RemoteDocument) -> ManagedKeys {
    document
        .iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect()
}

/// The remote mutations as `op path` pairs, without values.
fn describe_mutations(before: Option<&RemoteDocument>, after: &RemoteDocument) -> String {
    let empty = Document::new();
    to_json_patch(before.unwrap_or(&empty), after)
        .0
        .iter()
        .map(|op| {
            let op = serde_json::to_value(op).unwrap_or_default();
            format!(
                "{} {}",
                op["op"].as_str().unwrap_or("?"),
                op["path"].as_str().unwrap_or("?")
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reconciles the declared keys of `kv_keys` resources with the secrets in a
/// [`DocumentStore`].
///
/// Every operation fetches the secret, lets the patch engine compute the new
/// document, and stores it right away. Keys that are not managed by the
/// resource are written back as they were read.
pub struct KvKeysProvider<S> {
    store: S,
}

impl<S: DocumentStore> KvKeysProvider<S> {
    pub fn new(store: S) -> Self {
        KvKeysProvider { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn fetch(&self, location: &Location) -> Result<Option<RemoteDocument>> {
        self.store
            .fetch(location)
            .await
            .with_context(|| format!("Failed to read existing secret {}", location))
    }

    async fn write(
        &self,
        location: &Location,
        before: Option<&RemoteDocument>,
        after: &RemoteDocument,
    ) -> Result<()> {
        tracing::debug!(%location, mutations = %describe_mutations(before, after), "Writing secret");
        self.store
            .store(location, after)
            .await
            .with_context(|| format!("Failed to write secret {}", location))
    }

    pub async fn create_keys(&self, inputs: &KvKeysInProperties) -> Result<KvKeysOutProperties> {
        let location = inputs.location();
        tracing::info!(%location, keys = %key_names(&inputs.keys), "Creating keys in Vault");

        let existing = self.fetch(&location).await?;
        let patch = on_create(existing.as_ref(), &to_document(&inputs.keys));
        if patch.changed {
            self.write(&location, existing.as_ref(), &patch.document)
                .await?;
        } else {
            tracing::info!(%location, "All keys already exist with the same values, skipping write");
        }

        Ok(KvKeysOutProperties::new(location, inputs.keys.clone()))
    }

    /// Returns `None` when none of the tracked keys exist anymore.
    pub async fn read_keys(
        &self,
        tracked: &KvKeysOutProperties,
    ) -> Result<Option<KvKeysOutProperties>> {
        let location = tracked.location();
        tracing::info!(%location, "Reading keys from Vault");

        let existing = self.fetch(&location).await?;
        match on_refresh(existing.as_ref(), &tracked.keys) {
            RefreshOutcome::Observed(observed) => {
                let missing: ManagedKeys = tracked
                    .keys
                    .iter()
                    .filter(|(k, _)| !observed.contains_key(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if !missing.is_empty() {
                    tracing::warn!(%location, keys = %key_names(&missing), "Managed keys were deleted outside of vaultpatch");
                }
                Ok(Some(KvKeysOutProperties::new(
                    location,
                    to_managed_keys(&observed),
                )))
            }
            RefreshOutcome::AllManagedKeysVanished => {
                tracing::warn!(%location, "None of the managed keys exist in Vault, removing from state");
                Ok(None)
            }
        }
    }

    /// Move a resource from its tracked keys to newly declared keys.
    ///
    /// When the declaration points at a different location, the tracked keys
    /// are removed from the old secret and the declared keys are created in
    /// the new one.
    pub async fn update_keys(
        &self,
        prior: &KvKeysOutProperties,
        inputs: &KvKeysInProperties,
    ) -> Result<KvKeysOutProperties> {
        let location = inputs.location();
        if prior.location() != location {
            tracing::info!(from = %prior.location(), to = %location, "Location changed, moving managed keys");
            self.destroy_keys(prior).await?;
            return self.create_keys(inputs).await;
        }
        tracing::info!(%location, keys = %key_names(&inputs.keys), "Updating keys in Vault");

        let existing = self.fetch(&location).await?;
        let document = on_update(existing.as_ref(), &prior.keys, &to_document(&inputs.keys));
        self.write(&location, existing.as_ref(), &document).await?;

        Ok(KvKeysOutProperties::new(location, inputs.keys.clone()))
    }

    /// Remove the tracked keys from the secret.
    ///
    /// A secret that cannot be read is assumed to be cleaned up already, so
    /// that destroying is idempotent.
    pub async fn destroy_keys(&self, tracked: &KvKeysOutProperties) -> Result<()> {
        let location = tracked.location();
        tracing::info!(%location, keys = %key_names(&tracked.keys), "Deleting keys from Vault");

        let existing = match self.store.fetch(&location).await {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                tracing::info!(%location, "Secret does not exist, nothing to delete");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(%location, error = %e, "Could not read secret during delete, assuming already cleaned up");
                return Ok(());
            }
        };

        let document = on_delete(Some(&existing), &tracked.keys);
        if document == existing {
            tracing::info!(%location, "None of the managed keys are present, skipping write");
            return Ok(());
        }
        self.write(&location, Some(&existing), &document)
            .await
            .with_context(|| format!("Could not update {} after removing keys", location))
    }

    /// Start tracking every key currently in the secret at `id` (`mount/path`).
    pub async fn import_keys(&self, id: &str) -> Result<KvKeysOutProperties> {
        let location: Location = id.parse()?;
        let existing = self
            .fetch(&location)
            .await
            .context("Failed to read secret during import")?;
        if existing.is_none() {
            bail!("No secret found at {}; nothing to import", location);
        }

        let adopted = to_managed_keys(&on_import(existing.as_ref()));
        tracing::warn!(
            %location,
            keys = %key_names(&adopted),
            "Imported every key found at this location. Any of these keys left out of the declaration will be deleted from Vault on the next apply. If you do not own the other keys, drop this resource from the state and create it again with only the keys you manage"
        );
        Ok(KvKeysOutProperties::new(location, adopted))
    }
}

fn prior_outputs(resource: &v0::ExtantResource, operation: &str) -> Result<KvKeysOutProperties> {
    let outputs = resource.output_properties.as_ref().ok_or_else(|| {
        anyhow::anyhow!(
            "The {} operation on a {} resource requires that the output properties are set",
            operation,
            resource.type_.as_str()
        )
    })?;
    parse_properties(&outputs.0, &resource.type_)
}

#[async_trait::async_trait]
impl<S: DocumentStore> ResourceProvider for KvKeysProvider<S> {
    async fn create(
        &self,
        request: v0::CreateResourceRequest,
    ) -> Result<v0::CreateResourceResponse> {
        match request.type_.as_str() {
            KV_KEYS => {
                let inputs: KvKeysInProperties =
                    parse_properties(&request.input_properties.0, &request.type_)?;
                let outputs = self.create_keys(&inputs).await?;
                Ok(v0::CreateResourceResponse {
                    output_properties: v0::OutputProperties(to_properties(&outputs)?),
                })
            }
            t => bail!("KvKeysProvider::create: unknown resource type: {}", t),
        }
    }

    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse> {
        match request.resource.type_.as_str() {
            KV_KEYS => {
                let tracked = prior_outputs(&request.resource, "read")?;
                let observed = self.read_keys(&tracked).await?;
                Ok(v0::ReadResourceResponse {
                    output_properties: observed
                        .map(|o| to_properties(&o).map(v0::OutputProperties))
                        .transpose()?,
                })
            }
            t => bail!("KvKeysProvider::read: unknown resource type: {}", t),
        }
    }

    async fn update(
        &self,
        request: v0::UpdateResourceRequest,
    ) -> Result<v0::UpdateResourceResponse> {
        match request.resource.type_.as_str() {
            KV_KEYS => {
                let prior = prior_outputs(&request.resource, "update")?;
                let inputs: KvKeysInProperties =
                    parse_properties(&request.input_properties.0, &request.resource.type_)?;
                let outputs = self.update_keys(&prior, &inputs).await?;
                Ok(v0::UpdateResourceResponse {
                    output_properties: v0::OutputProperties(to_properties(&outputs)?),
                })
            }
            t => bail!("KvKeysProvider::update: unknown resource type: {}", t),
        }
    }

    async fn destroy(
        &self,
        request: v0::DestroyResourceRequest,
    ) -> Result<v0::DestroyResourceResponse> {
        match request.resource.type_.as_str() {
            KV_KEYS => {
                let tracked = prior_outputs(&request.resource, "destroy")?;
                self.destroy_keys(&tracked).await?;
                Ok(v0::DestroyResourceResponse {})
            }
            t => bail!("KvKeysProvider::destroy: unknown resource type: {}", t),
        }
    }

    async fn import(
        &self,
        request: v0::ImportResourceRequest,
    ) -> Result<v0::ImportResourceResponse> {
        match request.type_.as_str() {
            KV_KEYS => {
                let outputs = self.import_keys(&request.import_id).await?;
                Ok(v0::ImportResourceResponse {
                    input_properties: v0::InputProperties(to_properties(&outputs.to_inputs())?),
                    output_properties: v0::OutputProperties(to_properties(&outputs)?),
                })
            }
            t => bail!("KvKeysProvider::import: unknown resource type: {}", t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_to_string_keeps_strings_verbatim() {
        assert_eq!(value_to_string(&json!("a \"quoted\" value")), "a \"quoted\" value");
        assert_eq!(value_to_string(&json!(42)), "42");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!({ "nested": 1 })), r#"{"nested":1}"#);
    }

    #[test]
    fn out_properties_wire_format() {
        let outputs = KvKeysOutProperties::new(
            Location::new("app", "svc/test"),
            ManagedKeys::from([("A".to_string(), "1".to_string())]),
        );
        assert_eq!(
            serde_json::to_value(&outputs).unwrap(),
            json!({ "id": "app/svc/test", "mount": "app", "path": "svc/test", "keys": { "A": "1" } })
        );
        assert_eq!(outputs.to_inputs().location(), outputs.location());
    }

    #[test]
    fn describe_mutations_omits_values() {
        let before: RemoteDocument = [("a".to_string(), json!("secret"))].into();
        let after: RemoteDocument = [("b".to_string(), json!("secret"))].into();
        let described = describe_mutations(Some(&before), &after);
        assert!(!described.contains("secret"));
        assert!(described.contains("remove /a"));
        assert!(described.contains("add /b"));
    }

    #[test]
    fn describe_mutations_from_absent() {
        let after: RemoteDocument = [("a".to_string(), json!("1"))].into();
        assert_eq!(describe_mutations(None, &after), "add /a");
    }
}
