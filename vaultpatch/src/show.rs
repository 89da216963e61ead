use anyhow::Result;
use vaultpatch_engine::key_names;
use vaultpatch_resource::{framework::parse_properties, state::schema::v0::State};
use vaultpatch_resources_kv::{KvKeysOutProperties, KV_KEYS};

use crate::{state, Options};

pub(crate) fn show(options: &Options) -> Result<()> {
    for line in render(&state::read_state(&options.state)?)? {
        println!("{}", line);
    }
    Ok(())
}

/// One line per resource. Values are never shown.
pub(crate) fn render(state: &State) -> Result<Vec<String>> {
    state
        .resources
        .iter()
        .map(|(name, resource)| {
            if resource.type_ != KV_KEYS {
                return Ok(format!("{}\t{}", name, resource.type_));
            }
            let outputs: KvKeysOutProperties =
                parse_properties(&resource.output_properties, &resource.type_)?;
            Ok(format!(
                "{}\t{}\t{}\t{}",
                name,
                resource.type_,
                outputs.id,
                key_names(&outputs.keys)
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn render_lists_key_names_only() {
        let state: State = serde_json::from_value(json!({
            "_type": "vaultpatchState",
            "resources": {
                "db": {
                    "type": "kv_keys",
                    "inputProperties": {},
                    "outputProperties": {
                        "id": "app/svc", "mount": "app", "path": "svc",
                        "keys": { "PASSWORD": "hunter2", "USER": "admin" }
                    }
                }
            }
        }))
        .unwrap();
        let lines = render(&state).unwrap();
        assert_eq!(lines, vec!["db\tkv_keys\tapp/svc\tPASSWORD, USER"]);
        assert!(!lines[0].contains("hunter2"));
    }

    #[test]
    fn render_empty_state() {
        assert!(render(&State::default()).unwrap().is_empty());
    }
}
