//! Cross-project catalog lookups: a sub-agent id doesn't carry its project,
//! so finding one by id (or listing a session's sub-agents) means checking
//! every known project's index in turn.

use std::path::Path;

use jacques_protocol::SubAgentRef;

use super::indexer::load_project_index;
use super::session_index::known_project_paths;

pub fn find_sub_agent(agent_id: &str) -> Option<SubAgentRef> {
    for project_path in known_project_paths() {
        let index = load_project_index(Path::new(&project_path));
        if let Some(agent) = index.sub_agents.into_iter().find(|a| a.id == agent_id) {
            return Some(agent);
        }
    }
    None
}

pub fn sub_agents_for_session(session_id: &str) -> Vec<SubAgentRef> {
    for project_path in known_project_paths() {
        let index = load_project_index(Path::new(&project_path));
        if index.sub_agents.iter().any(|a| a.session_id == session_id) {
            return index
                .sub_agents
                .into_iter()
                .filter(|a| a.session_id == session_id)
                .collect();
        }
    }
    Vec::new()
}
