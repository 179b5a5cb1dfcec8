use {
    crate::{
        Ctx,
        store::{DirectoryStore, FlakyReader, PartsReader},
    },
    anyhow::{Context as _, Result, ensure},
    reseal_sdk::{DecryptingWriter, Iv, io::ResumableSource},
    std::{
        io::{self, BufWriter},
        path::Path,
        thread,
    },
    tempfile::NamedTempFile,
    tracing::{instrument, warn},
};

/// Restores the file stored in `store_dir` to `output`.
///
/// A failed read continues from the last delivered byte. The download is abandoned
/// once `max_attempts` consecutive reads fail without any progress in between.
#[instrument(skip(ctx))]
pub fn decrypt(ctx: &Ctx, store_dir: &Path, output: &Path) -> Result<()> {
    let store = DirectoryStore::open(store_dir.into())?;
    let manifest = store.read_manifest()?;
    let details = ctx.registry.get(&manifest.cipher)?;
    let iv = Iv::from_base64(&manifest.iv)?;
    let probability = ctx.config.fault_injection.read_failure_probability;

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file = NamedTempFile::new_in(parent)?;
    let mut writer = DecryptingWriter::new(&details, &ctx.key, &iv, BufWriter::new(file))?;

    let mut failures = 0;
    let mut progress_at = 0;
    let continuation = |err: &io::Error, delivered: u64| -> io::Result<FlakyReader<PartsReader>> {
        if delivered > progress_at {
            progress_at = delivered;
            failures = 0;
        }
        failures += 1;
        if failures >= ctx.config.max_attempts {
            return Err(io::Error::other(format!(
                "{failures} consecutive reads failed at offset {delivered}"
            )));
        }
        warn!(error = %err, delivered, failures, "read failed, continuing");
        thread::sleep(ctx.config.retry_period);
        let reader = store
            .open_at(&manifest, delivered)
            .map_err(io::Error::other)?;
        Ok(FlakyReader::new(reader, probability))
    };
    let mut source = ResumableSource::new(
        FlakyReader::new(store.open_at(&manifest, 0)?, probability),
        continuation,
    );
    io::copy(&mut source, &mut writer).context("failed to read encrypted content")?;
    let delivered = source.bytes_delivered();
    source.close();
    ensure!(
        delivered == manifest.ciphertext_size,
        "encrypted size mismatch; actual {delivered}, expected {}",
        manifest.ciphertext_size
    );

    let (file, actual_hash, actual_size) = writer.finish()?;
    ensure!(
        actual_size == manifest.plaintext_size,
        "content size mismatch; actual {actual_size}, expected {}",
        manifest.plaintext_size
    );
    let actual_hash = hex::encode(actual_hash);
    ensure!(
        actual_hash == manifest.sha256,
        "content hash mismatch; actual {actual_hash}, expected {}",
        manifest.sha256
    );
    file.into_inner()
        .map_err(io::IntoInnerError::into_error)?
        .persist(output)
        .map_err(|err| err.error)?;
    Ok(())
}
