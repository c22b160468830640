// Managers Module
//
// Focused manager classes extracted from BreathingMonitor to apply Single Responsibility Principle.
//
// Each manager handles one specific concern:
// - SessionManager: Pipeline thread lifecycle (spawn, shutdown, join)
// - BroadcastChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;
pub mod session_manager;

pub use broadcast_manager::BroadcastChannelManager;
pub use session_manager::{SessionManager, SessionStartContext};
