//! Live-call streaming sessions.
//!
//! One [`CallSession`] task per connection: it ingests binary audio frames,
//! emits throttled advisory partial transcriptions while accumulating, and on
//! each segment boundary runs the full transcribe → reply → synthesize
//! pipeline, emitting one strictly-ordered `result` event per segment.

pub mod session;
pub mod state;

pub use session::{CallCommand, CallEvent, CallHandle, CallSession, CallSessionConfig, SegmentResult};
pub use state::{CallState, CallStateMachine};
