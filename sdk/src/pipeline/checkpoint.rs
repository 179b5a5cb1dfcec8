use {
    super::PipelineCore,
    crate::{
        Error, Result,
        crypto::{EngineCloner, EngineSet},
    },
    tracing::debug,
};

/// Snapshot of a pipeline's stream state, taken before a part is written.
///
/// A checkpoint can be used for any number of rewinds. It is only valid for the
/// pipeline that recorded it.
#[derive(Debug)]
pub struct EngineCheckpoint {
    pipeline_id: u64,
    cipher_id: String,
    engines: EngineSet,
    pending: Vec<u8>,
    plaintext_bytes: u64,
    ciphertext_bytes: u64,
    finished: bool,
}

impl EngineCheckpoint {
    #[must_use]
    #[inline]
    pub fn pipeline_id(&self) -> u64 {
        self.pipeline_id
    }

    #[must_use]
    #[inline]
    pub fn cipher_id(&self) -> &str {
        &self.cipher_id
    }

    #[must_use]
    #[inline]
    pub fn plaintext_bytes(&self) -> u64 {
        self.plaintext_bytes
    }

    #[must_use]
    #[inline]
    pub fn ciphertext_bytes(&self) -> u64 {
        self.ciphertext_bytes
    }
}

impl<W> PipelineCore<W> {
    /// Captures the current engine state without changing it.
    ///
    /// Fails with [`Error::EngineNotCloneable`] if the cipher is backed by an
    /// external provider.
    #[inline]
    pub fn record(&self) -> Result<EngineCheckpoint> {
        let engines = self.engines.try_clone_engine()?;
        debug!(
            id = self.id,
            plaintext = self.plaintext_bytes,
            pending = self.sink.remainder().len(),
            "recorded checkpoint"
        );
        Ok(EngineCheckpoint {
            pipeline_id: self.id,
            cipher_id: self.details.id().to_owned(),
            engines,
            pending: self.sink.remainder().to_vec(),
            plaintext_bytes: self.plaintext_bytes,
            ciphertext_bytes: self.ciphertext_bytes,
            finished: self.finished,
        })
    }

    /// Restores the state captured in `checkpoint`. The attached sink is left as is.
    #[inline]
    pub fn rewind(&mut self, checkpoint: &EngineCheckpoint) -> Result<()> {
        if checkpoint.pipeline_id != self.id {
            return Err(Error::RewindWithoutCheckpoint {
                reason: format!(
                    "checkpoint belongs to pipeline {}, not {}",
                    checkpoint.pipeline_id, self.id
                ),
            });
        }
        // The checkpoint stays untouched so it can be reused.
        self.engines = checkpoint.engines.try_clone_engine()?;
        self.sink.restore_remainder(&checkpoint.pending);
        self.plaintext_bytes = checkpoint.plaintext_bytes;
        self.ciphertext_bytes = checkpoint.ciphertext_bytes;
        self.finished = checkpoint.finished;
        debug!(
            id = self.id,
            plaintext = self.plaintext_bytes,
            "rewound to checkpoint"
        );
        Ok(())
    }
}
