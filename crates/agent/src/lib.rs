//! The chat orchestration loop.
//!
//! Each request follows an **Ask → Act → Observe** cycle:
//!
//! 1. **Receive** a user message plus prior turns
//! 2. **Discover** tool schemas (cached process-wide)
//! 3. **Ask** the completion client, offering the tools
//! 4. **If tool calls**: validate each through the [`bridge`], invoke it on
//!    the tool host, append the result, loop back to step 3
//! 5. **If text**: emit the response and finish
//!
//! Progress is streamed as `DomainEvent`s through a bounded channel
//! ([`emitter`]); the loop ends with exactly one `done`.

pub mod bridge;
pub mod emitter;
pub mod loop_runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use emitter::{Cancelled, EventEmitter};
pub use loop_runner::{ANALYZING, ChatLoop, ChatRun, LoopConfig, REVIEWING};
