//! Distribution engine.
//!
//! - collectives between ranks (`channel`, `tcp`)
//! - work planning (`partition`)
//! - per-rank step execution (`executor`)
//! - top-level orchestration (`builder`)

pub mod builder;
pub mod channel;
pub mod executor;
pub mod partition;
pub mod tcp;

pub use builder::{MpiBuilder, RunSummary};
pub use channel::{CollectiveChannel, LocalGroup, ROOT, SingleRank, broadcast};
pub use executor::{RankReport, StepExecutor};
pub use partition::{WorkAssignment, array_split, partition};
pub use tcp::{LaunchInfo, TcpGroup};
