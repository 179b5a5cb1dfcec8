//! Byte-level plumbing around the cipher stream: block-aligned output to
//! switchable sinks, and reads that survive transient failures.

mod aligned;
mod resumable;

pub use {
    aligned::AlignedSwitchSink,
    resumable::{ContinuationProvider, ResumableSource, SourceState},
};
