//! Track every thread a process spawns, transitively, and find out when all
//! of them have finished.
//!
//! Two tracker flavors share the [`Track`] contract: [`SpawnCounter`] keeps a
//! live count, [`SpawnRegistry`] keeps the identity of every live thread.
//! Both are created through [`Builder`].

mod error;
pub use error::SpawnError;

pub mod identity;
pub use identity::{IdentityScheme, PlatformIdentity, ThreadIdIdentity};

#[cfg(target_os = "linux")]
pub use identity::PthreadIdentity;

pub mod tracker;
pub use tracker::{
    Builder, DrainReport, SpawnCounter, SpawnRegistry, TaskHandle, Track, Tracker, TrackerConfig,
};

pub mod workload;
pub use workload::{FanOut, fan_out, spawn_fan_out};

mod utils;

#[cfg(test)]
mod test_utils;
