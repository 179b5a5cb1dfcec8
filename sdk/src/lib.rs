//! Retry-safe encryption of multipart uploads and resumable reads of the result.
//!
//! See [`pipeline`] for the upload side and [`io::ResumableSource`] for downloads.

pub mod crypto;
mod error;
pub mod io;
pub mod pipeline;

pub use {
    crypto::{
        CipherDetails, CipherRegistry, DEFAULT_CIPHER, DecryptingWriter, EncryptionKey,
        EngineCloner, Iv, MacAlgorithm,
    },
    error::{Error, Result},
    pipeline::{
        CipherPipeline, EncryptingPartWriter, EngineCheckpoint, PartReport, PartWriteError,
        PipelineCore,
    },
};
