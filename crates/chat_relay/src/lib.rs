//! The streaming relay: composes a chat request, opens the configured model
//! backend and reframes its output as client events.

mod backends;
pub mod composer;
mod reachability;
mod relay;

pub use backends::{BackendResolver, HttpBackends, default_model};
pub use composer::{compose, format_file_size};
pub use reachability::{HostStatus, ProbeStatus, ReachabilityChecker, StatusReport};
pub use relay::{EventStream, Relay, RelayRequest, frame_events};
