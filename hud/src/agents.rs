use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_AGENT_ID: &str = "default";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a companion watching the screen with the user.";

/// On-disk agent settings at `<agents_dir>/<id>/config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
}

/// Agent settings with every fallback applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAgent {
    pub system_prompt: String,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to read agent config {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to parse agent config {0}: {1}")]
    Parse(String, serde_json::Error),
}

/// Agent ids come from HTTP requests and end up in a filesystem path.
fn is_valid_agent_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
}

fn config_path(agents_dir: &Path, id: &str) -> PathBuf {
    agents_dir.join(id).join("config.json")
}

/// Load one agent's config. Unknown or invalid ids yield `Ok(None)`.
pub fn load_agent(agents_dir: &Path, id: &str) -> Result<Option<AgentConfig>, AgentError> {
    if !is_valid_agent_id(id) {
        return Ok(None);
    }
    let path = config_path(agents_dir, id);
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| AgentError::Read(path.display().to_string(), e))?;
    let config = serde_json::from_str(&content)
        .map_err(|e| AgentError::Parse(path.display().to_string(), e))?;
    Ok(Some(config))
}

/// Every agent with a readable config, sorted by id. Never empty: a
/// placeholder default agent keeps the overlay's picker usable.
pub fn list_agents(agents_dir: &Path) -> Vec<AgentSummary> {
    let mut agents = Vec::new();
    match std::fs::read_dir(agents_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                match load_agent(agents_dir, &id) {
                    Ok(Some(config)) => {
                        let name = config.name.unwrap_or_else(|| id.clone());
                        agents.push(AgentSummary { id, name });
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, agent = id, "skipping unreadable agent"),
                }
            }
        }
        Err(e) => {
            warn!(error = %e, dir = %agents_dir.display(), "failed to read agents directory");
        }
    }
    agents.sort_by(|a, b| a.id.cmp(&b.id));

    if agents.is_empty() {
        agents.push(AgentSummary {
            id: DEFAULT_AGENT_ID.into(),
            name: "Default Agent".into(),
        });
    }
    agents
}

/// Load an agent and fill missing fields with defaults. Read or parse
/// failures fall back to defaults as well.
pub fn resolve_agent(agents_dir: &Path, id: &str, default_model: &str) -> ResolvedAgent {
    let config = match load_agent(agents_dir, id) {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, agent = id, "using default agent settings");
            AgentConfig::default()
        }
    };
    ResolvedAgent {
        system_prompt: config
            .system_prompt
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        model: config.model.unwrap_or_else(|| default_model.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_agent(dir: &Path, id: &str, json: &str) {
        let agent_dir = dir.join(id);
        std::fs::create_dir_all(&agent_dir).unwrap();
        std::fs::write(agent_dir.join("config.json"), json).unwrap();
    }

    #[test]
    fn lists_agents_sorted_with_name_fallback() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "zed", r#"{"name": "Zed"}"#);
        write_agent(dir.path(), "alpha", r#"{"model": "m1"}"#);
        write_agent(dir.path(), "broken", "{not json");
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let agents = list_agents(dir.path());
        assert_eq!(
            agents,
            vec![
                AgentSummary {
                    id: "alpha".into(),
                    name: "alpha".into()
                },
                AgentSummary {
                    id: "zed".into(),
                    name: "Zed".into()
                },
            ]
        );
    }

    #[test]
    fn missing_directory_yields_default_agent() {
        let agents = list_agents(Path::new("/no/such/agents/dir"));
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, "default");
        assert_eq!(agents[0].name, "Default Agent");
    }

    #[test]
    fn resolves_prompt_and_model() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(
            dir.path(),
            "guide",
            r#"{"name": "Guide", "systemPrompt": "Be brief.", "model": "vision-pro"}"#,
        );

        let agent = resolve_agent(dir.path(), "guide", "fallback-model");
        assert_eq!(agent.system_prompt, "Be brief.");
        assert_eq!(agent.model, "vision-pro");

        let unknown = resolve_agent(dir.path(), "nobody", "fallback-model");
        assert_eq!(unknown.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(unknown.model, "fallback-model");
    }

    #[test]
    fn path_traversal_ids_are_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "inner", r#"{"name": "Inner"}"#);
        let nested = dir.path().join("agents");
        std::fs::create_dir_all(&nested).unwrap();

        assert!(load_agent(&nested, "../inner").unwrap().is_none());
        assert!(load_agent(&nested, "..").unwrap().is_none());
        assert!(load_agent(dir.path(), "inner").unwrap().is_some());
    }

    #[test]
    fn parse_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "bad", "[1, 2");
        assert!(matches!(
            load_agent(dir.path(), "bad"),
            Err(AgentError::Parse(_, _))
        ));
    }
}
