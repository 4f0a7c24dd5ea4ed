//! Offer polling engine.
//!
//! [`Monitor`] drives a single cooperative loop: fetch the offer count,
//! classify the outcome, recover an expired session with a bounded number
//! of re-login attempts, detect count changes, and dispatch push
//! notifications. All collaborators sit behind traits so the loop runs
//! against fakes in tests and against [`live`] adapters in production.

pub mod live;
pub mod monitor;
pub mod notify;
pub mod recovery;
pub mod tracker;

pub use live::UcasAuthenticator;
pub use monitor::{
    Authenticator, Credentials, CycleOutcome, Monitor, MonitorConfig, MonitorError, OfferSource,
    SessionStore,
};
pub use notify::{BarkNotifier, NoNotifier, Notifier};
pub use recovery::{Recovery, RecoveryState};
pub use tracker::{OfferChange, OfferTracker};
