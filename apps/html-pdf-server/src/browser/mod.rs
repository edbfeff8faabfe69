//! Headless browser management
//!
//! Launch profiles, the CDP driver, per-request sessions and the admission
//! pool bounding how many browsers run at once.

pub mod engine;
pub mod idle;
pub mod pool;
pub mod profile;
pub mod session;

pub use engine::{BrowserEngine, BrowserInstance, ChromiumEngine};
pub use pool::{PoolStats, SessionPermit, SessionPool};
pub use profile::{EnvironmentProfile, LaunchProfile};
pub use session::{BrowserSession, SessionState};
