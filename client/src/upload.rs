use {
    crate::{
        Ctx,
        store::{DirectoryStore, FlakyWriter, Manifest, PartFile},
    },
    anyhow::{Context as _, Error, Result, anyhow},
    reseal_sdk::{CipherPipeline, Error as SdkError, PartWriteError, PipelineCore},
    std::{
        future::Future,
        io::{Read, Seek, SeekFrom},
        path::Path,
    },
    tokio::{task::block_in_place, time::sleep},
    tracing::{info, instrument, warn},
};

type PartSink = FlakyWriter<PartFile>;

pub(crate) enum RequestError {
    Transport(Error),
    Application(Error),
}

impl RequestError {
    fn application(err: impl Into<Error>) -> Self {
        Self::Application(err.into())
    }

    fn transport(err: impl Into<Error>) -> Self {
        Self::Transport(err.into())
    }
}

/// Repeats `f` while it fails because of the transport, up to `max_attempts` times.
pub(crate) async fn ok_or_retry<T, F, Fut>(ctx: &Ctx, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let transport_err = match f().await {
            Ok(x) => break Ok(x),
            Err(RequestError::Application(err)) => break Err(err),
            Err(RequestError::Transport(err)) => err,
        };
        if attempt >= ctx.config.max_attempts {
            break Err(transport_err.context(format!("giving up after {attempt} attempts")));
        }
        warn!(error = %transport_err, attempt, "transport failed, will retry");
        sleep(ctx.config.retry_period).await;
    }
}

fn open_range(input: &Path, offset: u64, len: u64) -> Result<impl Read> {
    let mut file = fs_err::File::open(input)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(file.take(len))
}

fn classify(err: PartWriteError<PartSink>) -> RequestError {
    // The partially written part is discarded together with its sink.
    drop(err.sink);
    match err.error {
        err @ SdkError::Io(_) => RequestError::transport(err),
        err => RequestError::application(err),
    }
}

/// One attempt at one part: checkpoint, write, commit, or rewind on a transport failure.
fn write_part(
    ctx: &Ctx,
    pipeline: &CipherPipeline<PartSink>,
    store: &DirectoryStore,
    input: &Path,
    number: usize,
    (offset, len): (u64, u64),
    last: bool,
) -> Result<u64, RequestError> {
    let source = open_range(input, offset, len).map_err(RequestError::application)?;
    let sink = FlakyWriter::new(
        store.create_part(number).map_err(RequestError::application)?,
        ctx.config.fault_injection.write_failure_probability,
    );

    let mut core = pipeline.lock();
    let checkpoint = if core.supports_checkpoints() {
        Some(core.record().map_err(RequestError::application)?)
    } else {
        None
    };
    let mut writer = core.part_writer();
    let written = if last {
        writer.write_last_part(sink, source, |core: &mut PipelineCore<PartSink>, _| {
            core.finish()
        })
    } else {
        writer.write_part(sink, source)
    };
    let outcome = match written {
        Ok(report) => report
            .sink
            .into_inner()
            .commit()
            .map_err(RequestError::transport),
        Err(err) => Err(classify(err)),
    };
    match (outcome, checkpoint) {
        (Err(RequestError::Transport(err)), Some(checkpoint)) => {
            core.rewind(&checkpoint).map_err(RequestError::application)?;
            Err(RequestError::Transport(err))
        }
        (Err(RequestError::Transport(err)), None) => Err(RequestError::Application(
            err.context("cipher cannot be checkpointed, so a failed part cannot be retried"),
        )),
        (outcome, _) => outcome,
    }
}

/// Encrypts `input` into `store` part by part and writes the manifest.
#[instrument(skip(ctx))]
pub async fn encrypt(ctx: &Ctx, input: &Path, store_dir: &Path) -> Result<Manifest> {
    let details = ctx.details()?;
    let size = fs_err::metadata(input)?.len();
    let part_size = ctx.config.part_size.as_u64();
    let part_count = size.div_ceil(part_size).max(1);
    let store = DirectoryStore::create(store_dir.into())?;

    let iv = details.generate_iv();
    let pipeline =
        CipherPipeline::<PartSink>::new(details.clone(), &ctx.key, &iv, details.block_len())?;
    if !pipeline.supports_checkpoints() {
        warn!(cipher = details.id(), "failed parts cannot be retried with this cipher");
    }

    let (pipeline_ref, store_ref) = (&pipeline, &store);
    let mut parts = Vec::new();
    for index in 0..part_count {
        let offset = index * part_size;
        let range = (offset, part_size.min(size - offset));
        let last = index + 1 == part_count;
        let number = usize::try_from(index)? + 1;
        let written = ok_or_retry(ctx, || async move {
            block_in_place(|| write_part(ctx, pipeline_ref, store_ref, input, number, range, last))
        })
        .await
        .with_context(|| format!("failed to upload part {number}"))?;
        info!(number, written, "part committed");
        parts.push(written);
    }

    let core = pipeline.into_core();
    if !core.is_finished() {
        return Err(anyhow!("cipher stream was not finalized"));
    }
    let manifest = Manifest {
        cipher: details.id().to_owned(),
        iv: iv.to_base64(),
        plaintext_size: core.plaintext_bytes(),
        ciphertext_size: core.ciphertext_bytes(),
        sha256: hex::encode(core.content_digest()),
        parts,
    };
    store.write_manifest(&manifest)?;
    Ok(manifest)
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test")]
mod tests {
    use {
        super::*,
        crate::{config::FaultInjection, tests::ctx},
        std::sync::atomic::{AtomicU32, Ordering},
    };

    #[tokio::test]
    async fn retries_transport_errors_only() {
        let ctx = ctx("AES128/GCM/NoPadding", 1000, FaultInjection::default());
        let calls = &AtomicU32::new(0);
        let err = ok_or_retry(&ctx, || async move {
            calls.fetch_add(1, Ordering::Relaxed);
            Err::<(), _>(RequestError::transport(anyhow!("connection reset")))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::Relaxed), ctx.config.max_attempts);
        assert!(format!("{err:#}").contains("connection reset"));

        calls.store(0, Ordering::Relaxed);
        ok_or_retry(&ctx, || async move {
            calls.fetch_add(1, Ordering::Relaxed);
            Err::<(), _>(RequestError::application(anyhow!("bad input")))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        calls.store(0, Ordering::Relaxed);
        let value = ok_or_retry(&ctx, || async move {
            if calls.fetch_add(1, Ordering::Relaxed) < 3 {
                Err(RequestError::transport(anyhow!("timeout")))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }
}
