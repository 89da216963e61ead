use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::v0::{ExtantResource, InputProperties, OutputProperties, ResourceType};

/// The root of the state document that the state events build up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(rename = "_type")]
    pub type_: StateType,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for State {
    fn default() -> Self {
        State {
            type_: StateType::VaultpatchState,
            resources: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateType {
    #[serde(rename = "vaultpatchState")]
    VaultpatchState,
}

/// A tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    #[serde(rename = "type")]
    pub type_: String,
    pub input_properties: Map<String, Value>,
    pub output_properties: Map<String, Value>,
}

impl ResourceState {
    pub fn to_extant(&self) -> ExtantResource {
        ExtantResource {
            type_: ResourceType(self.type_.clone()),
            input_properties: InputProperties(self.input_properties.clone()),
            output_properties: Some(OutputProperties(self.output_properties.clone())),
        }
    }
}
