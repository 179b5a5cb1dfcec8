use {
    crate::{Error, Result},
    derive_more::Display,
    std::io::{self, Read},
    tracing::{debug, warn},
};

/// Builds a source that continues a failed read.
///
/// The returned source must deliver the same logical data starting at
/// `bytes_delivered`. Verifying that it really is the same object (e.g. by
/// comparing integrity headers) is the provider's job.
pub trait ContinuationProvider<R> {
    fn build_continuation(&mut self, failure: &io::Error, bytes_delivered: u64) -> io::Result<R>;
}

impl<R, F> ContinuationProvider<R> for F
where
    F: FnMut(&io::Error, u64) -> io::Result<R>,
{
    #[inline]
    fn build_continuation(&mut self, failure: &io::Error, bytes_delivered: u64) -> io::Result<R> {
        self(failure, bytes_delivered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SourceState {
    #[display("ready")]
    Ready,
    #[display("at end of data")]
    EofSeen,
    #[display("closed")]
    Closed,
}

/// Reader that resumes from the exact delivered offset after I/O failures.
///
/// Only forward continuation is supported; there is no seeking or rewinding.
pub struct ResumableSource<R, P> {
    source: Option<R>,
    provider: P,
    delivered: u64,
    continuations: u64,
    state: SourceState,
}

impl<R: Read, P: ContinuationProvider<R>> ResumableSource<R, P> {
    #[inline]
    pub fn new(source: R, provider: P) -> Self {
        Self {
            source: Some(source),
            provider,
            delivered: 0,
            continuations: 0,
            state: SourceState::Ready,
        }
    }

    /// Number of bytes returned to the caller so far.
    #[must_use]
    #[inline]
    pub fn bytes_delivered(&self) -> u64 {
        self.delivered
    }

    #[must_use]
    #[inline]
    pub fn continuations(&self) -> u64 {
        self.continuations
    }

    #[must_use]
    #[inline]
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Replaces the current source with one that continues at [`Self::bytes_delivered`].
    #[inline]
    pub fn continue_with(&mut self, source: R) -> Result<()> {
        if self.state != SourceState::Ready {
            return Err(Error::IllegalContinuationState { state: self.state });
        }
        self.source = Some(source);
        self.continuations += 1;
        Ok(())
    }

    /// Drops the current source. The provider is left to its owner.
    #[inline]
    pub fn close(&mut self) {
        if self.state != SourceState::Closed {
            debug!(delivered = self.delivered, "closing resumable source");
        }
        self.source = None;
        self.state = SourceState::Closed;
    }

    #[inline]
    pub fn into_provider(self) -> P {
        self.provider
    }
}

impl<R: Read, P: ContinuationProvider<R>> Read for ResumableSource<R, P> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.state {
                SourceState::Ready => {}
                SourceState::EofSeen => return Ok(0),
                SourceState::Closed => return Err(Error::SourceClosed.into()),
            }
            let Some(source) = &mut self.source else {
                return Err(Error::SourceClosed.into());
            };
            match source.read(buf) {
                Ok(0) if !buf.is_empty() => {
                    self.state = SourceState::EofSeen;
                    self.source = None;
                    return Ok(0);
                }
                Ok(len) => {
                    self.delivered += len as u64;
                    return Ok(len);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(
                        error = %err,
                        delivered = self.delivered,
                        "read failed, requesting continuation"
                    );
                    match self.provider.build_continuation(&err, self.delivered) {
                        Ok(source) => self.continue_with(source)?,
                        Err(continuation) => {
                            return Err(Error::RecoverableReadFailure {
                                delivered: self.delivered,
                                source: err,
                                continuation,
                            }
                            .into());
                        }
                    }
                }
            }
        }
    }
}
