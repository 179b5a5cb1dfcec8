use {
    anyhow::{Context as _, Result, bail, ensure},
    fs_err::{File, create_dir_all, remove_file, rename},
    rand::Rng,
    serde::{Deserialize, Serialize},
    std::{
        io::{self, Read, Seek, SeekFrom, Write},
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
};

const MANIFEST_FILE: &str = "manifest.json";

/// Describes an encrypted object stored as a sequence of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub cipher: String,
    /// Base64 (URL-safe, no padding).
    pub iv: String,
    /// Ciphertext size of every part, in order.
    pub parts: Vec<u64>,
    pub plaintext_size: u64,
    pub ciphertext_size: u64,
    /// Hex-encoded SHA-256 of the plaintext.
    pub sha256: String,
}

/// Local directory that stands in for an object store with multipart uploads.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    tmp: PathBuf,
}

impl DirectoryStore {
    pub fn create(root: PathBuf) -> Result<Self> {
        let tmp = root.join("tmp");
        create_dir_all(&tmp)?;
        create_dir_all(root.join("parts"))?;
        Ok(Self { root, tmp })
    }

    pub fn open(root: PathBuf) -> Result<Self> {
        if !root.join(MANIFEST_FILE).try_exists()? {
            bail!("{} is not an encrypted object store", root.display());
        }
        Ok(Self {
            tmp: root.join("tmp"),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn part_path(&self, number: usize) -> PathBuf {
        self.root.join("parts").join(format!("part-{number:05}"))
    }

    /// Starts a part. Nothing is visible in the store until [`PartFile::commit`].
    pub fn create_part(&self, number: usize) -> Result<PartFile> {
        Ok(PartFile {
            file: NamedTempFile::new_in(&self.tmp)?,
            path: self.part_path(number),
            len: 0,
        })
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let mut file = NamedTempFile::new_in(&self.tmp)?;
        serde_json::to_writer_pretty(&mut file, manifest)?;
        file.as_file().sync_all()?;
        file.persist(self.root.join(MANIFEST_FILE))
            .map_err(|err| err.error)?;
        Ok(())
    }

    pub fn read_manifest(&self) -> Result<Manifest> {
        let path = self.root.join(MANIFEST_FILE);
        let manifest: Manifest = serde_json::from_str(&fs_err::read_to_string(&path)?)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        for (index, &size) in manifest.parts.iter().enumerate() {
            let actual = fs_err::metadata(self.part_path(index + 1))?.len();
            ensure!(
                actual == size,
                "part {} has size {actual}, manifest says {size}",
                index + 1
            );
        }
        ensure!(
            manifest.parts.iter().sum::<u64>() == manifest.ciphertext_size,
            "part sizes do not add up to the ciphertext size"
        );
        Ok(manifest)
    }

    /// Reads the concatenated parts of `manifest`, starting at `offset`.
    pub fn open_at(&self, manifest: &Manifest, offset: u64) -> Result<PartsReader> {
        let mut reader = PartsReader {
            paths: (1..=manifest.parts.len())
                .map(|number| self.part_path(number))
                .collect(),
            next: 0,
            current: None,
        };
        let mut skip = offset;
        for &size in &manifest.parts {
            if skip < size {
                let mut file = File::open(&reader.paths[reader.next])?;
                file.seek(SeekFrom::Start(skip))?;
                reader.current = Some(file);
                reader.next += 1;
                return Ok(reader);
            }
            skip -= size;
            reader.next += 1;
        }
        ensure!(
            skip == 0,
            "offset {offset} is past the end of the object"
        );
        Ok(reader)
    }
}

/// Uncommitted part. Dropping it discards everything written to it.
#[derive(Debug)]
pub struct PartFile {
    file: NamedTempFile,
    path: PathBuf,
    len: u64,
}

impl PartFile {
    /// Makes the part durable under its final name and returns its size.
    pub fn commit(mut self) -> Result<u64> {
        self.file.flush()?;
        self.file.as_file().sync_all()?;
        let (_, old_path) = self.file.keep()?;
        if let Err(err) = rename(&old_path, &self.path) {
            let _ = remove_file(&old_path);
            return Err(err.into());
        }
        Ok(self.len)
    }
}

impl Write for PartFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.file.write(buf)?;
        self.len += len as u64;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[derive(Debug)]
pub struct PartsReader {
    paths: Vec<PathBuf>,
    next: usize,
    current: Option<File>,
}

impl Read for PartsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(file) = &mut self.current {
                let len = file.read(buf)?;
                if len > 0 || buf.is_empty() {
                    return Ok(len);
                }
            }
            let Some(path) = self.paths.get(self.next) else {
                return Ok(0);
            };
            self.current = Some(File::open(path)?);
            self.next += 1;
        }
    }
}

fn injected_failure(probability: f64) -> bool {
    probability > 0.0 && rand::rng().random_bool(probability.min(1.0))
}

/// Writer that fails with the given probability, simulating a lost connection.
#[derive(Debug)]
pub struct FlakyWriter<W> {
    inner: W,
    probability: f64,
}

impl<W> FlakyWriter<W> {
    pub fn new(inner: W, probability: f64) -> Self {
        Self { inner, probability }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for FlakyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if injected_failure(self.probability) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected write failure",
            ));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that fails with the given probability, simulating a dropped download.
#[derive(Debug)]
pub struct FlakyReader<R> {
    inner: R,
    probability: f64,
}

impl<R> FlakyReader<R> {
    pub fn new(inner: R, probability: f64) -> Self {
        Self { inner, probability }
    }
}

impl<R: Read> Read for FlakyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if injected_failure(self.probability) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "injected read failure",
            ));
        }
        self.inner.read(buf)
    }
}
