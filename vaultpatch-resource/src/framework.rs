use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::schema::v0;

/// The operations a resource provider implements, one per lifecycle
/// transition of a resource.
///
/// Providers are handed everything they need in the request; they keep no
/// state between calls. Whatever must survive between invocations is
/// returned as output properties and recorded in the state by the caller.
#[async_trait::async_trait]
pub trait ResourceProvider {
    async fn create(&self, request: v0::CreateResourceRequest)
        -> Result<v0::CreateResourceResponse>;

    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse>;

    async fn update(&self, request: v0::UpdateResourceRequest)
        -> Result<v0::UpdateResourceResponse>;

    async fn destroy(
        &self,
        request: v0::DestroyResourceRequest,
    ) -> Result<v0::DestroyResourceResponse>;

    async fn import(&self, request: v0::ImportResourceRequest)
        -> Result<v0::ImportResourceResponse>;
}

/// Deserialize a property map into the provider's typed properties.
pub fn parse_properties<T: DeserializeOwned>(
    properties: &Map<String, Value>,
    resource_type: &str,
) -> Result<T> {
    serde_json::from_value(Value::Object(properties.clone())).with_context(|| {
        format!(
            "Could not deserialize properties for {} resource",
            resource_type
        )
    })
}

/// Serialize typed properties back into a property map.
pub fn to_properties<T: Serialize>(properties: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(properties)? {
        Value::Object(o) => Ok(o),
        _ => bail!("Expected object as properties"),
    }
}
