use {
    super::{
        details::{AES_BLOCK_LEN, CipherDetails, CipherMode},
        engine::{CbcEngine, CtrEngine, DigestEngine, GcmEngine, MacEngine},
        key::{EncryptionKey, Iv},
    },
    crate::{Error, Result},
    std::io::{self, Write},
    subtle::ConstantTimeEq,
};

enum Decryptor {
    Gcm(GcmEngine),
    Ctr(CtrEngine),
    Cbc(CbcEngine),
}

/// Decrypts a complete encrypted object written into it and verifies its tag.
///
/// Plaintext is released as soon as it is decrypted, so it must not be trusted
/// until [`DecryptingWriter::finish`] succeeds.
pub struct DecryptingWriter<W: Write> {
    decryptor: Decryptor,
    mac: Option<MacEngine>,
    digest: DigestEngine,
    trailer_len: usize,
    // Ciphertext that is not decrypted yet. The trailer (and the padded block for CBC)
    // is always held back until `finish`.
    buf: Vec<u8>,
    plaintext: Vec<u8>,
    output: W,
    plaintext_len: u64,
    ciphertext_len: u64,
}

impl<W: Write> DecryptingWriter<W> {
    #[inline]
    pub fn new(details: &CipherDetails, key: &EncryptionKey, iv: &Iv, output: W) -> Result<Self> {
        details.check_params(key, iv)?;
        let decryptor = match details.mode() {
            CipherMode::Gcm => Decryptor::Gcm(GcmEngine::new(key.as_bytes(), iv.as_ref())?),
            CipherMode::Ctr => Decryptor::Ctr(CtrEngine::new(key.as_bytes(), iv.as_ref())?),
            CipherMode::Cbc => Decryptor::Cbc(CbcEngine::new(key.as_bytes(), iv.as_ref())?),
            CipherMode::External(_) => {
                return Err(Error::UnsupportedCipher(details.id().to_owned()));
            }
        };
        let mac = details
            .mac()
            .map(|mac| MacEngine::new(mac, key.as_bytes(), iv.as_ref()))
            .transpose()?;
        Ok(Self {
            decryptor,
            mac,
            digest: DigestEngine::new(),
            trailer_len: details.trailer_len(),
            buf: Vec::new(),
            plaintext: Vec::new(),
            output,
            plaintext_len: 0,
            ciphertext_len: 0,
        })
    }

    fn held_back(&self) -> usize {
        match self.decryptor {
            Decryptor::Cbc(_) => self.trailer_len + AES_BLOCK_LEN,
            Decryptor::Gcm(_) | Decryptor::Ctr(_) => self.trailer_len,
        }
    }

    fn process(&mut self) -> Result<()> {
        let held_back = self.held_back();
        let mut ready = self.buf.len().saturating_sub(held_back);
        if matches!(self.decryptor, Decryptor::Cbc(_)) {
            ready = ready / AES_BLOCK_LEN * AES_BLOCK_LEN;
        }
        if ready == 0 {
            return Ok(());
        }
        let ciphertext: Vec<u8> = self.buf.drain(..ready).collect();
        self.decrypt_body(&ciphertext)?;
        self.write_plaintext()
    }

    fn decrypt_body(&mut self, ciphertext: &[u8]) -> Result<()> {
        if let Some(mac) = &mut self.mac {
            mac.update(ciphertext);
        }
        match &mut self.decryptor {
            Decryptor::Gcm(engine) => engine.decrypt_update(ciphertext, &mut self.plaintext)?,
            Decryptor::Ctr(engine) => {
                let start = self.plaintext.len();
                self.plaintext.extend_from_slice(ciphertext);
                engine.apply_keystream(&mut self.plaintext[start..]);
            }
            Decryptor::Cbc(engine) => {
                for block in ciphertext.chunks_exact(AES_BLOCK_LEN) {
                    let block: &[u8; AES_BLOCK_LEN] =
                        block.try_into().map_err(|_| Error::InvalidPadding)?;
                    self.plaintext
                        .extend_from_slice(&engine.decrypt_block(block));
                }
            }
        }
        Ok(())
    }

    fn write_plaintext(&mut self) -> Result<()> {
        self.digest.update(&self.plaintext);
        self.output.write_all(&self.plaintext)?;
        self.plaintext_len += self.plaintext.len() as u64;
        self.plaintext.clear();
        Ok(())
    }

    fn verify(&self, trailer: &[u8]) -> Result<()> {
        let expected = match (&self.decryptor, &self.mac) {
            (Decryptor::Gcm(engine), _) => engine.tag().to_vec(),
            (_, Some(mac)) => mac.tag(),
            (_, None) => Vec::new(),
        };
        if bool::from(expected.as_slice().ct_eq(trailer)) {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed)
        }
    }

    /// Verifies the trailer and returns the output, the SHA-256 of the plaintext and its size.
    #[inline]
    pub fn finish(mut self) -> Result<(W, [u8; 32], u64)> {
        self.process()?;
        let held_back = self.held_back() as u64;
        if self.buf.len() as u64 > held_back {
            // Only CBC keeps a partial block around after `process`.
            return Err(Error::MisalignedCiphertext {
                actual: self.ciphertext_len - self.trailer_len as u64,
                block_len: AES_BLOCK_LEN,
            });
        }
        if (self.buf.len() as u64) < held_back {
            return Err(Error::TruncatedCiphertext {
                actual: self.ciphertext_len,
                expected: held_back,
            });
        }
        let trailer = self.buf.split_off(self.buf.len() - self.trailer_len);
        let last_block = std::mem::take(&mut self.buf);
        if let Some(mac) = &mut self.mac {
            mac.update(&last_block);
        }
        self.verify(&trailer)?;

        if let Decryptor::Cbc(engine) = &mut self.decryptor {
            let block: &[u8; AES_BLOCK_LEN] = last_block
                .as_slice()
                .try_into()
                .map_err(|_| Error::InvalidPadding)?;
            let block = engine.decrypt_block(block);
            let pad = usize::from(block[AES_BLOCK_LEN - 1]);
            if pad == 0
                || pad > AES_BLOCK_LEN
                || block[AES_BLOCK_LEN - pad..]
                    .iter()
                    .any(|&byte| usize::from(byte) != pad)
            {
                return Err(Error::InvalidPadding);
            }
            self.plaintext
                .extend_from_slice(&block[..AES_BLOCK_LEN - pad]);
            self.write_plaintext()?;
        }
        self.output.flush()?;
        let digest = self.digest.digest();
        Ok((self.output, digest, self.plaintext_len))
    }
}

impl<W: Write> Write for DecryptingWriter<W> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        self.ciphertext_len += buf.len() as u64;
        self.process()?;
        Ok(buf.len())
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}
