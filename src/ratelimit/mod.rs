//! Admission control logic and state management.

mod clock;
mod identity;
mod limiter;
mod sweeper;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::IdentityResolver;
pub use limiter::{AdmissionController, AdmissionPolicy, Decision};
pub use sweeper::spawn_sweeper;
pub use window::ClientWindow;
