//! Session Factory, Registry, Process Monitor, and Cleanup Service
//! (spec §4.3–§4.6).

pub mod cleanup;
pub mod factory;
pub mod monitor;
pub mod registry;

pub use cleanup::CleanupService;
pub use factory::{from_context_update, from_hook_start, from_scanner};
pub use monitor::{
    enrich_pid_less_sessions, promote_bypass, retire_dead_processes, retire_long_idle,
    retire_trashed, PendingBypassMap, IDLE_TIMEOUT_MS, PID_LESS_GRACE_MS,
    PROCESS_VERIFY_INTERVAL_MS,
};
pub use registry::{SessionRegistry, UpsertOutcome};
