//! Guardian behavior engine, per-owner slot registry, and the lifecycle manager that
//! keeps live entities, stored records, and the owner's UI in agreement.

pub mod engine;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod sim;
pub mod store;
pub mod sync;
pub mod validator;

pub use engine::{
    follow_offset, AllyGuardian, EngineState, EngineStatus, FollowOffset, GuardianEngine,
};
pub use error::{GuardianError, Result};
pub use host::HostWorld;
pub use lifecycle::{
    ArchetypeOutcome, CaptureReport, DismissReport, GuardianInfo, GuardianManager,
    RelocationReport, ReleaseReport, SummonReport, TeachReport, UnlearnOutcome,
};
pub use registry::{ActiveGuardian, GuardianSlot, OwnerGuardianState};
pub use session::OwnerSession;
pub use sim::SimWorld;
pub use store::{GuardianStore, MemoryGuardianStore, StoreError};
pub use sync::{full_state, SyncOutbox, SyncSink};
pub use validator::can_capture;
