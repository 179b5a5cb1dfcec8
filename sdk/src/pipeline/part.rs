use {
    super::PipelineCore,
    crate::{Error, Result},
    std::{
        fmt,
        io::{self, Read, Write},
    },
    tracing::{debug, instrument},
};

pub const DEFAULT_CHUNK_LEN: usize = 64 * 1024;

/// Outcome of a successfully written part.
#[derive(Debug)]
pub struct PartReport<W> {
    /// The part sink, detached and still open.
    pub sink: W,
    /// Plaintext bytes consumed from the part's source.
    pub plaintext_bytes: u64,
    /// Ciphertext bytes written to the part sink.
    pub bytes_written: u64,
}

/// A failed part. The sink is handed back so the caller can discard or reuse it.
pub struct PartWriteError<W> {
    /// `None` only if a finalizer detached the sink itself.
    pub sink: Option<W>,
    pub error: Error,
}

impl<W> fmt::Debug for PartWriteError<W> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartWriteError")
            .field("sink", &self.sink.as_ref().map(|_| ".."))
            .field("error", &self.error)
            .finish()
    }
}

impl<W> fmt::Display for PartWriteError<W> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to write part: {}", self.error)
    }
}

impl<W> std::error::Error for PartWriteError<W> {
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<W> From<PartWriteError<W>> for Error {
    #[inline]
    fn from(err: PartWriteError<W>) -> Self {
        err.error
    }
}

/// Writes parts of the stream to their own sinks.
///
/// Each call attaches the given sink for its duration only. Ciphertext that does not
/// fill an aligned block stays in the pipeline and opens the next part. The last part
/// also carries whatever the finalizer returns.
pub struct EncryptingPartWriter<'a, W> {
    core: &'a mut PipelineCore<W>,
    chunk_len: usize,
}

impl<'a, W: Write> EncryptingPartWriter<'a, W> {
    #[inline]
    pub fn new(core: &'a mut PipelineCore<W>) -> Self {
        Self {
            core,
            chunk_len: DEFAULT_CHUNK_LEN,
        }
    }

    /// Sets the size of plaintext chunks read from the source.
    #[must_use]
    #[inline]
    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }

    #[inline]
    pub fn write_part<R: Read>(
        &mut self,
        sink: W,
        source: R,
    ) -> Result<PartReport<W>, PartWriteError<W>> {
        self.write(sink, source, None::<fn(&mut PipelineCore<W>, u64) -> Result<Vec<u8>>>)
    }

    /// Writes the last part, then the bytes returned by `finalize`, which receives
    /// the total plaintext size. [`PipelineCore::finish`] is the usual finalizer.
    #[inline]
    pub fn write_last_part<R, F>(
        &mut self,
        sink: W,
        source: R,
        finalize: F,
    ) -> Result<PartReport<W>, PartWriteError<W>>
    where
        R: Read,
        F: FnOnce(&mut PipelineCore<W>, u64) -> Result<Vec<u8>>,
    {
        self.write(sink, source, Some(finalize))
    }

    #[instrument(skip_all, fields(pipeline = self.core.id(), last = finalize.is_some()))]
    fn write<R, F>(
        &mut self,
        sink: W,
        mut source: R,
        finalize: Option<F>,
    ) -> Result<PartReport<W>, PartWriteError<W>>
    where
        R: Read,
        F: FnOnce(&mut PipelineCore<W>, u64) -> Result<Vec<u8>>,
    {
        let previous = self.core.attach(sink);
        let start = self.core.plaintext_bytes();
        let outcome = self.pump(&mut source, finalize);
        let bytes_written = self.core.sink.flushed();
        let sink = self.core.detach();
        if let Some(previous) = previous {
            self.core.attach(previous);
        }
        match (outcome, sink) {
            (Ok(()), Some(sink)) => {
                let plaintext_bytes = self.core.plaintext_bytes() - start;
                debug!(plaintext_bytes, bytes_written, "part written");
                Ok(PartReport {
                    sink,
                    plaintext_bytes,
                    bytes_written,
                })
            }
            (Ok(()), None) => Err(PartWriteError {
                sink: None,
                error: Error::SinkNotAttached,
            }),
            (Err(error), sink) => {
                debug!(%error, bytes_written, "part failed");
                Err(PartWriteError { sink, error })
            }
        }
    }

    fn pump<R, F>(&mut self, source: &mut R, finalize: Option<F>) -> Result<()>
    where
        R: Read,
        F: FnOnce(&mut PipelineCore<W>, u64) -> Result<Vec<u8>>,
    {
        let mut buf = vec![0; self.chunk_len];
        loop {
            let len = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            self.core.encrypt(&buf[..len])?;
        }
        if let Some(finalize) = finalize {
            let total = self.core.plaintext_bytes();
            let trailing = finalize(&mut *self.core, total)?;
            self.core.sink.write_through(&trailing)?;
        }
        self.core.sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test")]
mod tests {
    use {
        super::*,
        crate::{
            CipherPipeline,
            crypto::{
                CipherDetails, CipherRegistry, DecryptingWriter, EncryptionKey, ExternalEngine,
                ExternalEngineFactory, Iv, MacAlgorithm,
            },
        },
        proptest::prelude::*,
        std::sync::Arc,
    };

    /// Accepts a limited number of bytes, then fails every write.
    #[derive(Debug)]
    struct Flaky {
        data: Vec<u8>,
        capacity: usize,
    }

    impl Flaky {
        fn failing_after(capacity: usize) -> Self {
            Self {
                data: Vec::new(),
                capacity,
            }
        }
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() > self.capacity - self.data.len() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection lost"));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn setup(cipher: &str) -> (Arc<CipherDetails>, EncryptionKey, Iv) {
        let mut registry = CipherRegistry::default();
        registry.register(
            CipherDetails::aes_ctr(16, MacAlgorithm::HmacSha256).with_mac(MacAlgorithm::HmacSha512),
        );
        let details = registry.get(cipher).unwrap();
        let key = details.generate_key();
        let iv = details.generate_iv();
        (details, key, iv)
    }

    fn single_pass(details: &Arc<CipherDetails>, key: &EncryptionKey, iv: &Iv, data: &[u8]) -> Vec<u8> {
        let pipeline = CipherPipeline::<Vec<u8>>::new(details.clone(), key, iv, 16).unwrap();
        let mut core = pipeline.lock();
        let report = core
            .part_writer()
            .write_last_part(Vec::new(), data, |core, _| core.finish())
            .unwrap();
        report.sink
    }

    fn decrypt(details: &CipherDetails, key: &EncryptionKey, iv: &Iv, ciphertext: &[u8]) -> Vec<u8> {
        let mut writer = DecryptingWriter::new(details, key, iv, Vec::new()).unwrap();
        writer.write_all(ciphertext).unwrap();
        writer.finish().unwrap().0
    }

    #[test]
    fn failed_second_part_is_retried() {
        for cipher in ["AES256/GCM/NoPadding", "AES128/CTR/NoPadding", "AES192/CBC/PKCS5Padding"] {
            let (details, key, iv) = setup(cipher);
            let data: Vec<u8> = (0..600u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
            let expected = single_pass(&details, &key, &iv, &data);

            let pipeline = CipherPipeline::<Flaky>::new(details.clone(), &key, &iv, 16).unwrap();
            let mut core = pipeline.lock();
            let first = core
                .part_writer()
                .write_part(Flaky::failing_after(usize::MAX), &data[..300])
                .unwrap();
            assert_eq!(first.plaintext_bytes, 300);
            assert_eq!(first.bytes_written % 16, 0);

            let checkpoint = core.record().unwrap();
            let err = core
                .part_writer()
                .write_last_part(Flaky::failing_after(100), &data[300..], |core, _| {
                    core.finish()
                })
                .unwrap_err();
            assert!(matches!(err.error, Error::Io(_)));
            assert!(err.sink.is_some());

            core.rewind(&checkpoint).unwrap();
            let second = core
                .part_writer()
                .with_chunk_len(7)
                .write_last_part(Flaky::failing_after(usize::MAX), &data[300..], |core, total| {
                    assert_eq!(total, 600);
                    core.finish()
                })
                .unwrap();
            assert_eq!(second.plaintext_bytes, 300);

            let mut ciphertext = first.sink.data;
            ciphertext.extend_from_slice(&second.sink.data);
            assert_eq!(ciphertext, expected, "{cipher}");
            assert_eq!(core.ciphertext_bytes(), ciphertext.len() as u64);
            assert_eq!(decrypt(&details, &key, &iv, &ciphertext), data);
        }
    }

    #[test]
    fn rewind_after_failed_finalization() {
        let (details, key, iv) = setup("AES256/CTR/NoPadding");
        let data = [9u8; 70];
        let expected = single_pass(&details, &key, &iv, &data);
        let pipeline = CipherPipeline::<Flaky>::new(details.clone(), &key, &iv, 32).unwrap();
        let mut core = pipeline.lock();
        let checkpoint = core.record().unwrap();
        // Aligned body (64 bytes) goes through, the trailing bytes do not.
        let err = core
            .part_writer()
            .write_last_part(Flaky::failing_after(64), &data[..], |core, _| core.finish())
            .unwrap_err();
        assert_eq!(err.sink.unwrap().data.len(), 64);
        assert!(core.is_finished());

        core.rewind(&checkpoint).unwrap();
        let report = core
            .part_writer()
            .write_last_part(Flaky::failing_after(usize::MAX), &data[..], |core, _| {
                core.finish()
            })
            .unwrap();
        assert_eq!(report.sink.data, expected);
        assert_eq!(report.bytes_written, expected.len() as u64);
    }

    #[test]
    fn previously_attached_sink_is_restored() {
        let (details, key, iv) = setup("AES128/GCM/NoPadding");
        let pipeline = CipherPipeline::<Vec<u8>>::new(details, &key, &iv, 16).unwrap();
        pipeline.attach(b"outer".to_vec());
        let mut core = pipeline.lock();
        let report = core.part_writer().write_part(Vec::new(), &[0u8; 40][..]).unwrap();
        assert_eq!(report.sink.len(), 32);
        assert_eq!(core.detach().unwrap(), b"outer");
    }

    struct Sealed;

    impl ExternalEngine for Sealed {
        fn provider(&self) -> &str {
            "sealed"
        }

        fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
            output.extend(input.iter().map(|b| !b));
            Ok(())
        }

        fn finish(&mut self, _output: &mut Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    struct SealedFactory;

    impl ExternalEngineFactory for SealedFactory {
        fn provider(&self) -> &str {
            "sealed"
        }

        fn create(&self, _key: &EncryptionKey, _iv: &Iv) -> Result<Box<dyn ExternalEngine>> {
            Ok(Box::new(Sealed))
        }
    }

    #[test]
    fn external_engine_writes_single_pass_only() {
        let details = Arc::new(CipherDetails::external("SEALED", 16, 16, 16, Arc::new(SealedFactory)));
        let key = details.generate_key();
        let iv = details.generate_iv();
        let pipeline = CipherPipeline::<Vec<u8>>::new(details, &key, &iv, 16).unwrap();
        assert!(!pipeline.supports_checkpoints());
        assert!(matches!(
            pipeline.record(),
            Err(Error::EngineNotCloneable { ref provider }) if provider == "sealed"
        ));
        let mut core = pipeline.lock();
        let report = core
            .part_writer()
            .write_last_part(Vec::new(), &[0u8; 3][..], |core, _| core.finish())
            .unwrap();
        assert_eq!(report.sink, vec![0xff; 3]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn retries_reproduce_ciphertext(
            cipher in prop::sample::select(vec![
                "AES128/GCM/NoPadding",
                "AES256/CTR/NoPadding",
                "AES256/CBC/PKCS5Padding",
                "AES128/CTR/NoPadding+HmacSHA512",
            ]),
            data in prop::collection::vec(any::<u8>(), 0..1500),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
            fail_at in prop::collection::vec(0usize..400, 0..4),
        ) {
            let (details, key, iv) = setup(cipher);
            let expected = single_pass(&details, &key, &iv, &data);

            let mut cuts: Vec<usize> = cuts.iter().map(|i| i.index(data.len() + 1)).collect();
            cuts.push(data.len());
            cuts.sort_unstable();
            let pipeline = CipherPipeline::<Flaky>::new(details.clone(), &key, &iv, 16).unwrap();
            let mut core = pipeline.lock();
            let mut ciphertext = Vec::new();
            let mut start = 0;
            for (i, &end) in cuts.iter().enumerate() {
                let last = i + 1 == cuts.len();
                let checkpoint = core.record().unwrap();
                if let Some(&capacity) = fail_at.get(i) {
                    let attempt = if last {
                        core.part_writer().write_last_part(
                            Flaky::failing_after(capacity),
                            &data[start..end],
                            |core, _| core.finish(),
                        )
                    } else {
                        core.part_writer()
                            .write_part(Flaky::failing_after(capacity), &data[start..end])
                    };
                    // Throw away whatever the attempt produced, successful or not.
                    drop(attempt);
                    core.rewind(&checkpoint).unwrap();
                }
                let sink = Flaky::failing_after(usize::MAX);
                let report = if last {
                    core.part_writer()
                        .write_last_part(sink, &data[start..end], |core, _| core.finish())
                } else {
                    core.part_writer().write_part(sink, &data[start..end])
                }
                .unwrap();
                ciphertext.extend_from_slice(&report.sink.data);
                start = end;
            }
            prop_assert_eq!(&ciphertext, &expected);
            prop_assert_eq!(decrypt(&details, &key, &iv, &ciphertext), data);
        }
    }
}
