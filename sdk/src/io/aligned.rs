use {
    crate::{Error, Result},
    std::io::{self, Write},
    tracing::trace,
};

/// Forwards only whole blocks to the attached sink and keeps the rest buffered.
///
/// The attached sink can be switched at any time without flushing: bytes that do not
/// fill a block yet belong to whichever sink is attached when the block completes.
/// The sink is never closed by this type; whoever detaches it owns it again.
#[derive(Debug)]
pub struct AlignedSwitchSink<W> {
    block_size: usize,
    // Shorter than `block_size` after every write while a sink is attached.
    buf: Vec<u8>,
    sink: Option<W>,
    // Bytes written to the current attachment.
    flushed: u64,
}

impl<W> AlignedSwitchSink<W> {
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    #[must_use]
    #[inline]
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            block_size,
            buf: Vec::with_capacity(block_size),
            sink: None,
            flushed: 0,
        }
    }

    #[must_use]
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Attaches `sink` without flushing anything and returns the previously attached sink.
    #[inline]
    pub fn switch_sink(&mut self, sink: W) -> Option<W> {
        self.flushed = 0;
        self.sink.replace(sink)
    }

    #[inline]
    pub fn detach(&mut self) -> Option<W> {
        self.flushed = 0;
        self.sink.take()
    }

    #[must_use]
    #[inline]
    pub fn sink(&self) -> Option<&W> {
        self.sink.as_ref()
    }

    #[must_use]
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Bytes that have not been forwarded yet.
    #[must_use]
    #[inline]
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn take_remainder(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.buf, Vec::with_capacity(self.block_size))
    }

    /// Bytes forwarded to the currently attached sink since it was attached.
    #[must_use]
    #[inline]
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    pub(crate) fn restore_remainder(&mut self, remainder: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(remainder);
    }
}

impl<W: Write> AlignedSwitchSink<W> {
    /// Buffers `data` and forwards every complete block to the attached sink
    /// in a single write.
    #[inline]
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        let Some(sink) = &mut self.sink else {
            return Ok(());
        };
        let aligned = self.buf.len() - self.buf.len() % self.block_size;
        if aligned == 0 {
            return Ok(());
        }
        sink.write_all(&self.buf[..aligned])?;
        self.buf.drain(..aligned);
        self.flushed += aligned as u64;
        trace!(aligned, remainder = self.buf.len(), "flushed blocks");
        Ok(())
    }

    /// Forwards the whole buffer, including an incomplete block, to the attached sink.
    #[inline]
    pub fn flush_buffer(&mut self) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::SinkNotAttached)?;
        sink.write_all(&self.buf)?;
        sink.flush()?;
        self.flushed += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Writes `data` directly to the attached sink, bypassing the buffer.
    #[inline]
    pub fn write_through(&mut self, data: &[u8]) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::SinkNotAttached)?;
        sink.write_all(data)?;
        self.flushed += data.len() as u64;
        Ok(())
    }
}

impl<W: Write> Write for AlignedSwitchSink<W> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    /// Flushes the attached sink. Buffered partial blocks stay buffered;
    /// use [`AlignedSwitchSink::flush_buffer`] to force them out.
    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}
