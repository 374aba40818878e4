// ─── Launch ───
// Request assembly, gate orchestration and the JVM process spawner.

pub mod orchestrator;
pub mod request;
pub mod task;

pub use orchestrator::{
    GameProcessHandle, GameSpawner, LaunchOptions, LaunchOrchestrator, LaunchOutcome,
    LaunchTimings, ProcessEvent,
};
pub use request::{LaunchAuthorization, LaunchRequest, ServerAddress, WindowSize};
pub use task::SystemGameSpawner;
