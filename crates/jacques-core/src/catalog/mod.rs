//! Catalog Indexer (spec §4.7): per-project catalogs and the global
//! session index derived from them.

pub mod indexer;
pub mod lookup;
pub mod session_index;

pub use indexer::{
    content_hash, extract_project_catalog, extract_sub_agents, index_path, jacques_dir, load_project_index,
    save_project_index, ExtractProgress, TranscriptFile,
};
pub use lookup::{find_sub_agent, sub_agents_for_session};
pub use session_index::{
    assistant_projects_root, build_session_index, decode_project_path, discover_transcripts,
    encode_project_path, known_project_paths, IndexProgress,
};
