//! One continuous cipher stream split across retryable parts.
//!
//! A [`CipherPipeline`] is created once per upload. Every part is written with an
//! [`EncryptingPartWriter`] while the pipeline lock is held; before a part is sent
//! the caller takes an [`EngineCheckpoint`], and if the part fails it rewinds to it
//! and sends the part again. Because the engines are restored from a clone, the
//! retried part has exactly the same ciphertext as the failed one was supposed to have.
//!
//! ```no_run
//! # use {reseal_sdk::{CipherRegistry, CipherPipeline, DEFAULT_CIPHER}, std::fs::File};
//! # fn main() -> reseal_sdk::Result<()> {
//! let details = CipherRegistry::default().get(DEFAULT_CIPHER)?;
//! let key = details.generate_key();
//! let pipeline = CipherPipeline::<File>::new(details.clone(), &key, &details.generate_iv(), 16)?;
//! let mut core = pipeline.lock();
//! let checkpoint = core.record()?;
//! let part = File::create("part-1")?;
//! if let Err(err) = core.part_writer().write_part(part, &b"first part"[..]) {
//!     drop(err.sink);
//!     core.rewind(&checkpoint)?;
//! }
//! # Ok(())
//! # }
//! ```

mod checkpoint;
mod part;

use {
    crate::{
        Error, Result,
        crypto::{CipherDetails, EncryptionKey, EngineSet, Iv},
        io::AlignedSwitchSink,
    },
    parking_lot::{Mutex, MutexGuard},
    std::{
        io::Write,
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
    },
    tracing::debug,
};

pub use {
    checkpoint::EngineCheckpoint,
    part::{DEFAULT_CHUNK_LEN, EncryptingPartWriter, PartReport, PartWriteError},
};

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// Encryption state of one upload, shared by all of its parts.
#[derive(Debug)]
pub struct CipherPipeline<W> {
    id: u64,
    details: Arc<CipherDetails>,
    core: Mutex<PipelineCore<W>>,
}

/// Pipeline state behind the lock.
#[derive(Debug)]
pub struct PipelineCore<W> {
    id: u64,
    details: Arc<CipherDetails>,
    engines: EngineSet,
    sink: AlignedSwitchSink<W>,
    scratch: Vec<u8>,
    plaintext_bytes: u64,
    ciphertext_bytes: u64,
    finished: bool,
}

impl<W> CipherPipeline<W> {
    /// Creates a pipeline that forwards ciphertext in multiples of `alignment` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is zero.
    #[inline]
    pub fn new(
        details: Arc<CipherDetails>,
        key: &EncryptionKey,
        iv: &Iv,
        alignment: usize,
    ) -> Result<Self> {
        let engines = details.encryptor(key, iv)?;
        let id = NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(id, cipher = details.id(), alignment, "created cipher pipeline");
        Ok(Self {
            id,
            details: details.clone(),
            core: Mutex::new(PipelineCore {
                id,
                details,
                engines,
                sink: AlignedSwitchSink::new(alignment),
                scratch: Vec::new(),
                plaintext_bytes: 0,
                ciphertext_bytes: 0,
                finished: false,
            }),
        })
    }

    #[must_use]
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    #[inline]
    pub fn details(&self) -> &Arc<CipherDetails> {
        &self.details
    }

    /// Locks the pipeline so that several operations (typically record, write, rewind)
    /// run as one critical section.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, PipelineCore<W>> {
        self.core.lock()
    }

    #[inline]
    pub fn record(&self) -> Result<EngineCheckpoint> {
        self.core.lock().record()
    }

    #[inline]
    pub fn rewind(&self, checkpoint: &EngineCheckpoint) -> Result<()> {
        self.core.lock().rewind(checkpoint)
    }

    #[inline]
    pub fn attach(&self, sink: W) -> Option<W> {
        self.core.lock().attach(sink)
    }

    #[inline]
    pub fn detach(&self) -> Option<W> {
        self.core.lock().detach()
    }

    /// Whether [`Self::record`] can succeed. Uploads through a pipeline without
    /// checkpoint support cannot retry a failed part.
    #[must_use]
    #[inline]
    pub fn supports_checkpoints(&self) -> bool {
        self.core.lock().supports_checkpoints()
    }

    #[inline]
    pub fn into_core(self) -> PipelineCore<W> {
        self.core.into_inner()
    }
}

impl<W> PipelineCore<W> {
    #[must_use]
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    #[inline]
    pub fn details(&self) -> &Arc<CipherDetails> {
        &self.details
    }

    /// Plaintext bytes consumed so far.
    #[must_use]
    #[inline]
    pub fn plaintext_bytes(&self) -> u64 {
        self.plaintext_bytes
    }

    /// Ciphertext bytes produced so far, including the ones still buffered
    /// for alignment and the trailer once the stream is finished.
    #[must_use]
    #[inline]
    pub fn ciphertext_bytes(&self) -> u64 {
        self.ciphertext_bytes
    }

    #[must_use]
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// SHA-256 of the plaintext consumed so far.
    #[must_use]
    #[inline]
    pub fn content_digest(&self) -> [u8; 32] {
        self.engines.digest.digest()
    }

    #[must_use]
    #[inline]
    pub fn supports_checkpoints(&self) -> bool {
        self.engines.cipher.is_cloneable()
    }

    #[must_use]
    #[inline]
    pub fn sink(&self) -> &AlignedSwitchSink<W> {
        &self.sink
    }

    #[inline]
    pub fn attach(&mut self, sink: W) -> Option<W> {
        self.sink.switch_sink(sink)
    }

    #[inline]
    pub fn detach(&mut self) -> Option<W> {
        self.sink.detach()
    }
}

impl<W: Write> PipelineCore<W> {
    /// Encrypts `plaintext` and forwards the aligned part of the ciphertext
    /// to the attached sink.
    #[inline]
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::PipelineFinished);
        }
        self.engines.digest.update(plaintext);
        self.scratch.clear();
        self.engines.cipher.update(plaintext, &mut self.scratch)?;
        self.plaintext_bytes += plaintext.len() as u64;
        self.emit()
    }

    /// Finalizes the stream and returns the bytes that have to follow everything
    /// already forwarded: the unaligned remainder, the final cipher block and the trailer.
    #[inline]
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        if self.finished {
            return Err(Error::PipelineFinished);
        }
        self.scratch.clear();
        self.engines.cipher.finish(&mut self.scratch)?;
        self.emit()?;
        let mut trailing = self.sink.take_remainder();
        if let Some(mac) = &self.engines.mac {
            let tag = mac.tag();
            self.ciphertext_bytes += tag.len() as u64;
            trailing.extend_from_slice(&tag);
        }
        self.finished = true;
        debug!(
            id = self.id,
            plaintext = self.plaintext_bytes,
            ciphertext = self.ciphertext_bytes,
            "cipher stream finished"
        );
        Ok(trailing)
    }

    fn emit(&mut self) -> Result<()> {
        if let Some(mac) = &mut self.engines.mac {
            mac.update(&self.scratch);
        }
        self.ciphertext_bytes += self.scratch.len() as u64;
        self.sink.write_data(&self.scratch)
    }

    #[inline]
    pub fn part_writer(&mut self) -> EncryptingPartWriter<'_, W> {
        EncryptingPartWriter::new(self)
    }
}
