//! Follow-mode coordinator and its Unix-socket control plane, covering
//! scheduled re-vectorization cycles with single-instance enforcement.

pub mod coordinator;
pub mod ipc;

pub use coordinator::{FollowCoordinator, PidLock};
pub use ipc::IpcServer;
