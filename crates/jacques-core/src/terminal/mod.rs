//! Terminal introspection and orchestration (spec §4.11).

pub mod key;
pub mod orchestrator;
pub mod tmux;

pub use key::TerminalKey;
pub use orchestrator::{
    focus_terminal, launch_terminal_session, maximize_window, tile_windows, LaunchOptions,
    LaunchResult, TileLayout, WindowOpResult,
};
pub use tmux::{locate_by_cwd, CommandTmuxAdapter, TmuxAdapter, TmuxSnapshot};
