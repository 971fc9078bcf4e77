// Parsing of `docker ps --format json` output.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::sync::model::ServiceDescriptor;

/// Compose label holding the project's working directory.
pub const WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// One line of `docker ps --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DockerContainer {
    #[serde(rename = "Command", default)]
    pub command: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Names", default)]
    pub names: String,
    #[serde(rename = "Labels", default, deserialize_with = "deserialize_labels")]
    pub labels: HashMap<String, String>,
}

/// Docker prints labels as `k=v,k=v`; some tooling emits an object instead.
fn deserialize_labels<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawLabels {
        Text(String),
        Map(HashMap<String, String>),
    }

    Ok(match Option::<RawLabels>::deserialize(deserializer)? {
        Some(RawLabels::Text(text)) => parse_labels(&text),
        Some(RawLabels::Map(map)) => map,
        None => HashMap::new(),
    })
}

pub fn parse_labels(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Name a container is matched against the configured services by.
///
/// Uses the last segment of the compose working directory when present,
/// otherwise the container name without its leading slash.
pub fn extract_service_name(container: &DockerContainer) -> String {
    if let Some(dir) = container.labels.get(WORKING_DIR_LABEL) {
        let segment = dir.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        if !segment.is_empty() {
            return segment.to_string();
        }
    }
    container
        .names
        .strip_prefix('/')
        .unwrap_or(&container.names)
        .to_string()
}

/// Parses newline-delimited container JSON, keyed by service name.
/// Malformed lines are logged and skipped.
pub fn parse_ps_output(body: &str) -> HashMap<String, DockerContainer> {
    let mut containers = HashMap::new();
    for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match serde_json::from_str::<DockerContainer>(line) {
            Ok(container) => {
                containers.insert(extract_service_name(&container), container);
            }
            Err(err) => warn!(error = %err, "skipping unparsable container line"),
        }
    }
    containers
}

/// Status row served by `/api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatusEntry {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub state: String,
    pub status: String,
}

/// One entry per configured service, in configuration order.
pub fn build_statuses(
    services: &[ServiceDescriptor],
    containers: &HashMap<String, DockerContainer>,
) -> Vec<ServiceStatusEntry> {
    services
        .iter()
        .map(|service| {
            let (state, status) = match containers.get(&service.name) {
                Some(container) => (container.state.clone(), container.status.clone()),
                None => ("unknown".to_string(), "Not found".to_string()),
            };
            ServiceStatusEntry {
                name: service.name.clone(),
                display_name: service.display_name.clone(),
                state,
                status,
            }
        })
        .collect()
}
