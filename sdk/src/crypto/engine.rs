//! Stateful cryptographic engines and their cloning rules.
//!
//! Every engine keeps all of its mutable state in plain fields (key schedule,
//! counter block, buffered keystream, partial blocks, running hash state), so a
//! clone taken at any point continues exactly where the original was. Engines
//! whose state lives outside the process cannot be cloned and say so.

use {
    super::details::{AES_BLOCK_LEN, GCM_IV_LEN, GCM_TAG_LEN, MacAlgorithm},
    crate::{Error, Result},
    aes::{
        Aes128, Aes192, Aes256, Block,
        cipher::{BlockDecrypt, BlockEncrypt, KeyInit},
    },
    ghash::{
        GHash,
        universal_hash::UniversalHash,
    },
    hmac::{Hmac, Mac},
    sha2::{Digest, Sha256, Sha512},
    std::fmt,
};

/// Longest message GCM can process under one IV: `2^32 - 2` blocks.
pub const GCM_MAX_MESSAGE_LEN: u64 = (1 << 36) - 32;

/// Produces an independent copy of an engine.
///
/// Operations on the copy never affect the original and vice versa.
pub trait EngineCloner: Sized {
    fn try_clone_engine(&self) -> Result<Self>;
}

/// Expanded AES key schedule.
#[derive(Clone)]
pub(crate) enum BlockKey {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockKey {
    pub(crate) fn new(key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::InvalidKeyLength {
            cipher: format!("AES-{}", key.len() * 8),
            actual: key.len(),
            expected: key.len(),
        };
        match key.len() {
            16 => Aes128::new_from_slice(key).map(Self::Aes128).map_err(invalid),
            24 => Aes192::new_from_slice(key).map(Self::Aes192).map_err(invalid),
            32 => Aes256::new_from_slice(key).map(Self::Aes256).map_err(invalid),
            actual => Err(Error::UnsupportedKeyLength { actual }),
        }
    }

    pub(crate) fn encrypt(&self, block: &mut [u8; AES_BLOCK_LEN]) {
        let mut data = Block::clone_from_slice(block);
        match self {
            Self::Aes128(cipher) => cipher.encrypt_block(&mut data),
            Self::Aes192(cipher) => cipher.encrypt_block(&mut data),
            Self::Aes256(cipher) => cipher.encrypt_block(&mut data),
        }
        block.copy_from_slice(&data);
    }

    pub(crate) fn decrypt(&self, block: &mut [u8; AES_BLOCK_LEN]) {
        let mut data = Block::clone_from_slice(block);
        match self {
            Self::Aes128(cipher) => cipher.decrypt_block(&mut data),
            Self::Aes192(cipher) => cipher.decrypt_block(&mut data),
            Self::Aes256(cipher) => cipher.decrypt_block(&mut data),
        }
        block.copy_from_slice(&data);
    }
}

fn to_block(bytes: &[u8]) -> Result<[u8; AES_BLOCK_LEN]> {
    bytes.try_into().map_err(|_| Error::InvalidIvLength {
        cipher: "AES".into(),
        actual: bytes.len(),
        expected: AES_BLOCK_LEN,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CounterWidth {
    /// Whole block is a big-endian counter.
    Full,
    /// Only the last 32 bits are incremented (GCM).
    Low32,
}

/// AES in counter mode.
///
/// Also used as the keystream generator of [`GcmEngine`].
#[derive(Clone)]
pub struct CtrEngine {
    key: BlockKey,
    counter: [u8; AES_BLOCK_LEN],
    width: CounterWidth,
    keystream: [u8; AES_BLOCK_LEN],
    // Bytes of `keystream` already used.
    used: usize,
}

impl CtrEngine {
    #[inline]
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        Ok(Self::with_counter(
            BlockKey::new(key)?,
            to_block(iv)?,
            CounterWidth::Full,
        ))
    }

    pub(crate) fn with_counter(
        key: BlockKey,
        counter: [u8; AES_BLOCK_LEN],
        width: CounterWidth,
    ) -> Self {
        Self {
            key,
            counter,
            width,
            keystream: [0; AES_BLOCK_LEN],
            used: AES_BLOCK_LEN,
        }
    }

    fn next_keystream_block(&mut self) {
        self.keystream = self.counter;
        self.key.encrypt(&mut self.keystream);
        match self.width {
            CounterWidth::Full => {
                self.counter = u128::from_be_bytes(self.counter)
                    .wrapping_add(1)
                    .to_be_bytes();
            }
            CounterWidth::Low32 => {
                let mut low = [0u8; 4];
                low.copy_from_slice(&self.counter[12..]);
                let next = u32::from_be_bytes(low).wrapping_add(1);
                self.counter[12..].copy_from_slice(&next.to_be_bytes());
            }
        }
        self.used = 0;
    }

    /// XORs the keystream into `data`. Encryption and decryption are the same operation.
    #[inline]
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            if self.used == AES_BLOCK_LEN {
                self.next_keystream_block();
            }
            *byte ^= self.keystream[self.used];
            self.used += 1;
        }
    }
}

/// AES in CBC mode with PKCS#7 padding.
#[derive(Clone)]
pub struct CbcEngine {
    key: BlockKey,
    // IV before the first block, previous ciphertext block afterwards.
    chain: [u8; AES_BLOCK_LEN],
    // Plaintext of the incomplete block, always shorter than a block.
    pending: Vec<u8>,
    finished: bool,
}

impl CbcEngine {
    #[inline]
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        Ok(Self {
            key: BlockKey::new(key)?,
            chain: to_block(iv)?,
            pending: Vec::with_capacity(AES_BLOCK_LEN),
            finished: false,
        })
    }

    fn encrypt_block(&mut self, plaintext: &[u8], output: &mut Vec<u8>) {
        let mut block = self.chain;
        for (b, p) in block.iter_mut().zip(plaintext) {
            *b ^= p;
        }
        self.key.encrypt(&mut block);
        output.extend_from_slice(&block);
        self.chain = block;
    }

    #[inline]
    pub fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Error::EngineFinished);
        }
        let mut input = input;
        if !self.pending.is_empty() {
            let take = (AES_BLOCK_LEN - self.pending.len()).min(input.len());
            let (head, rest) = input.split_at(take);
            self.pending.extend_from_slice(head);
            input = rest;
            if self.pending.len() < AES_BLOCK_LEN {
                return Ok(());
            }
            let pending = std::mem::take(&mut self.pending);
            self.encrypt_block(&pending, output);
        }
        let mut blocks = input.chunks_exact(AES_BLOCK_LEN);
        for block in &mut blocks {
            self.encrypt_block(block, output);
        }
        self.pending.extend_from_slice(blocks.remainder());
        Ok(())
    }

    #[inline]
    pub fn finish(&mut self, output: &mut Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Error::EngineFinished);
        }
        let mut last = std::mem::take(&mut self.pending);
        let pad = u8::try_from(AES_BLOCK_LEN - last.len()).map_err(|_| Error::InvalidPadding)?;
        last.resize(AES_BLOCK_LEN, pad);
        self.encrypt_block(&last, output);
        self.finished = true;
        Ok(())
    }

    pub(crate) fn decrypt_block(&mut self, ciphertext: &[u8; AES_BLOCK_LEN]) -> [u8; AES_BLOCK_LEN] {
        let mut block = *ciphertext;
        self.key.decrypt(&mut block);
        for (b, c) in block.iter_mut().zip(self.chain) {
            *b ^= c;
        }
        self.chain = *ciphertext;
        block
    }
}

/// AES-GCM producing ciphertext incrementally and the tag on `finish`.
///
/// Only 96-bit IVs are supported. No additional authenticated data is used.
#[derive(Clone)]
pub struct GcmEngine {
    ctr: CtrEngine,
    ghash: GHash,
    // Ciphertext not yet absorbed by `ghash`, always shorter than a block.
    ghash_pending: Vec<u8>,
    // E(K, J0), XORed into the GHASH output to form the tag.
    tag_mask: [u8; AES_BLOCK_LEN],
    ciphertext_len: u64,
    finished: bool,
}

impl GcmEngine {
    #[inline]
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        if iv.len() != GCM_IV_LEN {
            return Err(Error::InvalidIvLength {
                cipher: "AES/GCM".into(),
                actual: iv.len(),
                expected: GCM_IV_LEN,
            });
        }
        let key = BlockKey::new(key)?;

        let mut hash_key = [0u8; AES_BLOCK_LEN];
        key.encrypt(&mut hash_key);
        let ghash = GHash::new(&Block::clone_from_slice(&hash_key));

        let mut j0 = [0u8; AES_BLOCK_LEN];
        j0[..GCM_IV_LEN].copy_from_slice(iv);
        j0[AES_BLOCK_LEN - 1] = 1;
        let mut tag_mask = j0;
        key.encrypt(&mut tag_mask);

        let mut counter = j0;
        counter[AES_BLOCK_LEN - 1] = 2;

        Ok(Self {
            ctr: CtrEngine::with_counter(key, counter, CounterWidth::Low32),
            ghash,
            ghash_pending: Vec::with_capacity(AES_BLOCK_LEN),
            tag_mask,
            ciphertext_len: 0,
            finished: false,
        })
    }

    fn absorb(&mut self, ciphertext: &[u8]) {
        self.ghash_pending.extend_from_slice(ciphertext);
        let full = self.ghash_pending.len() / AES_BLOCK_LEN * AES_BLOCK_LEN;
        for chunk in self.ghash_pending[..full].chunks_exact(AES_BLOCK_LEN) {
            self.ghash.update(&[Block::clone_from_slice(chunk)]);
        }
        self.ghash_pending.drain(..full);
        self.ciphertext_len += ciphertext.len() as u64;
    }

    #[inline]
    pub fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Error::EngineFinished);
        }
        self.check_len(input.len())?;
        let start = output.len();
        output.extend_from_slice(input);
        self.ctr.apply_keystream(&mut output[start..]);
        self.absorb(&output[start..]);
        Ok(())
    }

    // Past the limit the 32-bit counter wraps into J0, whose keystream masks the tag.
    fn check_len(&self, len: usize) -> Result<()> {
        let total = self.ciphertext_len.saturating_add(len as u64);
        if total > GCM_MAX_MESSAGE_LEN {
            return Err(Error::MessageTooLong {
                limit: GCM_MAX_MESSAGE_LEN,
            });
        }
        Ok(())
    }

    /// Authentication tag over everything encrypted so far. Does not change the state.
    #[must_use]
    #[inline]
    pub fn tag(&self) -> [u8; GCM_TAG_LEN] {
        let mut ghash = self.ghash.clone();
        ghash.update_padded(&self.ghash_pending);
        let mut lengths = [0u8; AES_BLOCK_LEN];
        lengths[8..].copy_from_slice(&(self.ciphertext_len * 8).to_be_bytes());
        ghash.update(&[Block::clone_from_slice(&lengths)]);
        let mut tag = [0u8; GCM_TAG_LEN];
        for ((t, s), m) in tag.iter_mut().zip(ghash.finalize()).zip(self.tag_mask) {
            *t = s ^ m;
        }
        tag
    }

    #[inline]
    pub fn finish(&mut self, output: &mut Vec<u8>) -> Result<()> {
        if self.finished {
            return Err(Error::EngineFinished);
        }
        output.extend_from_slice(&self.tag());
        self.finished = true;
        Ok(())
    }

    pub(crate) fn decrypt_update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        self.check_len(input.len())?;
        self.absorb(input);
        let start = output.len();
        output.extend_from_slice(input);
        self.ctr.apply_keystream(&mut output[start..]);
        Ok(())
    }
}

/// Cipher engine provided outside of this crate, e.g. by a hardware module.
///
/// Its state is not observable, so it can never be checkpointed.
pub trait ExternalEngine: Send {
    fn provider(&self) -> &str;

    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()>;

    fn finish(&mut self, output: &mut Vec<u8>) -> Result<()>;
}

pub enum CipherEngine {
    Gcm(GcmEngine),
    Ctr(CtrEngine),
    Cbc(CbcEngine),
    External(Box<dyn ExternalEngine>),
}

impl CipherEngine {
    /// Encrypts `input`, appending whatever ciphertext is ready to `output`.
    #[inline]
    pub fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Gcm(engine) => engine.update(input, output),
            Self::Ctr(engine) => {
                let start = output.len();
                output.extend_from_slice(input);
                engine.apply_keystream(&mut output[start..]);
                Ok(())
            }
            Self::Cbc(engine) => engine.update(input, output),
            Self::External(engine) => engine.update(input, output),
        }
    }

    /// Appends the final ciphertext bytes: the padded last block for CBC,
    /// the tag for GCM, nothing for CTR.
    #[inline]
    pub fn finish(&mut self, output: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Gcm(engine) => engine.finish(output),
            Self::Ctr(_) => Ok(()),
            Self::Cbc(engine) => engine.finish(output),
            Self::External(engine) => engine.finish(output),
        }
    }

    #[must_use]
    #[inline]
    pub fn provider(&self) -> &str {
        match self {
            Self::Gcm(_) | Self::Ctr(_) | Self::Cbc(_) => "builtin",
            Self::External(engine) => engine.provider(),
        }
    }

    #[must_use]
    #[inline]
    pub fn is_cloneable(&self) -> bool {
        !matches!(self, Self::External(_))
    }
}

impl EngineCloner for CipherEngine {
    #[inline]
    fn try_clone_engine(&self) -> Result<Self> {
        match self {
            Self::Gcm(engine) => Ok(Self::Gcm(engine.clone())),
            Self::Ctr(engine) => Ok(Self::Ctr(engine.clone())),
            Self::Cbc(engine) => Ok(Self::Cbc(engine.clone())),
            Self::External(engine) => Err(Error::EngineNotCloneable {
                provider: engine.provider().to_owned(),
            }),
        }
    }
}

impl fmt::Debug for CipherEngine {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gcm(_) => "Gcm",
            Self::Ctr(_) => "Ctr",
            Self::Cbc(_) => "Cbc",
            Self::External(_) => "External",
        };
        f.debug_tuple(name).field(&self.provider()).finish()
    }
}

/// HMAC keyed with the content key, covering the IV and all ciphertext.
#[derive(Clone)]
pub enum MacEngine {
    HmacSha256(Hmac<Sha256>),
    HmacSha512(Hmac<Sha512>),
}

impl MacEngine {
    #[inline]
    pub fn new(algorithm: MacAlgorithm, key: &[u8], iv: &[u8]) -> Result<Self> {
        let invalid = |_| Error::InvalidKeyLength {
            cipher: algorithm.to_string(),
            actual: key.len(),
            expected: algorithm.tag_len(),
        };
        let mut engine = match algorithm {
            MacAlgorithm::HmacSha256 => {
                Self::HmacSha256(<Hmac<Sha256> as Mac>::new_from_slice(key).map_err(invalid)?)
            }
            MacAlgorithm::HmacSha512 => {
                Self::HmacSha512(<Hmac<Sha512> as Mac>::new_from_slice(key).map_err(invalid)?)
            }
        };
        engine.update(iv);
        Ok(engine)
    }

    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::HmacSha256(mac) => Mac::update(mac, data),
            Self::HmacSha512(mac) => Mac::update(mac, data),
        }
    }

    /// Tag over everything absorbed so far. Does not change the state.
    #[must_use]
    #[inline]
    pub fn tag(&self) -> Vec<u8> {
        match self {
            Self::HmacSha256(mac) => mac.clone().finalize().into_bytes().to_vec(),
            Self::HmacSha512(mac) => mac.clone().finalize().into_bytes().to_vec(),
        }
    }
}

impl EngineCloner for MacEngine {
    #[inline]
    fn try_clone_engine(&self) -> Result<Self> {
        Ok(self.clone())
    }
}

/// SHA-256 of the plaintext.
#[derive(Clone, Default)]
pub struct DigestEngine(Sha256);

impl DigestEngine {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    #[must_use]
    #[inline]
    pub fn digest(&self) -> [u8; 32] {
        self.0.clone().finalize().into()
    }
}

impl EngineCloner for DigestEngine {
    #[inline]
    fn try_clone_engine(&self) -> Result<Self> {
        Ok(self.clone())
    }
}

/// All engines of one stream. They are cloned and restored together so that
/// the cipher and its authenticators never diverge.
#[derive(Debug)]
pub struct EngineSet {
    pub cipher: CipherEngine,
    pub mac: Option<MacEngine>,
    pub digest: DigestEngine,
}

impl EngineSet {
    #[must_use]
    #[inline]
    pub fn new(cipher: CipherEngine, mac: Option<MacEngine>, digest: DigestEngine) -> Self {
        Self {
            cipher,
            mac,
            digest,
        }
    }
}

impl EngineCloner for EngineSet {
    #[inline]
    fn try_clone_engine(&self) -> Result<Self> {
        Ok(Self {
            cipher: self.cipher.try_clone_engine()?,
            mac: self
                .mac
                .as_ref()
                .map(EngineCloner::try_clone_engine)
                .transpose()?,
            digest: self.digest.try_clone_engine()?,
        })
    }
}

impl fmt::Debug for MacEngine {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HmacSha256(_) => write!(f, "HmacSha256"),
            Self::HmacSha512(_) => write!(f, "HmacSha512"),
        }
    }
}

impl fmt::Debug for DigestEngine {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test")]
mod tests {
    use {
        super::*,
        aes_gcm::{Aes256Gcm, Nonce, aead::Aead},
        cbc::cipher::{BlockDecryptMut, KeyIvInit, StreamCipher, block_padding::Pkcs7},
    };

    const KEY: [u8; 32] = [7; 32];

    fn plaintext(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn encrypt_in_pieces(engine: &mut CipherEngine, data: &[u8], piece: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in data.chunks(piece) {
            engine.update(chunk, &mut out).unwrap();
        }
        engine.finish(&mut out).unwrap();
        out
    }

    #[test]
    fn gcm_matches_reference() {
        let iv = [3u8; 12];
        let data = plaintext(1000);
        let reference = Aes256Gcm::new_from_slice(&KEY)
            .unwrap()
            .encrypt(Nonce::from_slice(&iv), data.as_slice())
            .unwrap();
        for piece in [1, 7, 16, 33, 1000] {
            let mut engine = CipherEngine::Gcm(GcmEngine::new(&KEY, &iv).unwrap());
            assert_eq!(encrypt_in_pieces(&mut engine, &data, piece), reference);
        }
    }

    #[test]
    fn gcm_refuses_to_wrap_counter() {
        let iv = [4u8; 12];
        let mut engine = GcmEngine::new(&KEY, &iv).unwrap();
        // State of an engine that has encrypted all but the last allowed block.
        let mut counter = [0u8; AES_BLOCK_LEN];
        counter[..12].copy_from_slice(&iv);
        counter[12..].copy_from_slice(&u32::MAX.to_be_bytes());
        engine.ctr = CtrEngine::with_counter(
            BlockKey::new(&KEY).unwrap(),
            counter,
            CounterWidth::Low32,
        );
        engine.ciphertext_len = GCM_MAX_MESSAGE_LEN - 16;

        let mut out = Vec::new();
        engine.update(&[0; 16], &mut out).unwrap();
        assert_ne!(out.as_slice(), engine.tag_mask.as_slice());
        assert!(matches!(
            engine.update(&[0; 1], &mut out),
            Err(Error::MessageTooLong { limit: GCM_MAX_MESSAGE_LEN })
        ));
        assert_eq!(out.len(), 16);
        assert!(matches!(
            engine.decrypt_update(&[0; 1], &mut out),
            Err(Error::MessageTooLong { .. })
        ));
        // The tag is still available for what was accepted.
        engine.finish(&mut out).unwrap();
    }

    #[test]
    fn block_key_lengths() {
        for len in [16, 24, 32] {
            BlockKey::new(&vec![1; len]).unwrap();
        }
        assert!(matches!(
            BlockKey::new(&[1; 20]),
            Err(Error::UnsupportedKeyLength { actual: 20 })
        ));
    }

    #[test]
    fn gcm_empty_plaintext() {
        let iv = [9u8; 12];
        let reference = Aes256Gcm::new_from_slice(&KEY)
            .unwrap()
            .encrypt(Nonce::from_slice(&iv), &[][..])
            .unwrap();
        let mut engine = CipherEngine::Gcm(GcmEngine::new(&KEY, &iv).unwrap());
        assert_eq!(encrypt_in_pieces(&mut engine, &[], 1), reference);
    }

    #[test]
    fn ctr_matches_reference() {
        let iv = [0xff; 16];
        let data = plaintext(333);
        let mut reference = data.clone();
        ctr::Ctr128BE::<Aes256>::new(&KEY.into(), &iv.into()).apply_keystream(&mut reference);
        for piece in [1, 5, 16, 100] {
            let mut engine = CipherEngine::Ctr(CtrEngine::new(&KEY, &iv).unwrap());
            assert_eq!(encrypt_in_pieces(&mut engine, &data, piece), reference);
        }
    }

    #[test]
    fn cbc_decrypts_with_reference() {
        let iv = [1u8; 16];
        for len in [0, 15, 16, 17, 250] {
            let data = plaintext(len);
            let mut engine = CipherEngine::Cbc(CbcEngine::new(&KEY, &iv).unwrap());
            let ciphertext = encrypt_in_pieces(&mut engine, &data, 7);
            assert_eq!(ciphertext.len(), (len / 16 + 1) * 16);
            let decrypted = cbc::Decryptor::<Aes256>::new(&KEY.into(), &iv.into())
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                .unwrap();
            assert_eq!(decrypted, data);
        }
    }

    #[test]
    fn clones_are_independent() {
        let data = plaintext(100);
        let mut original = CipherEngine::Gcm(GcmEngine::new(&KEY, &[5; 12]).unwrap());
        let mut out = Vec::new();
        original.update(&data[..37], &mut out).unwrap();

        let mut copy = original.try_clone_engine().unwrap();
        let mut copy_out = out.clone();

        // Advancing the original must not move the copy.
        original.update(&data[37..], &mut out).unwrap();
        original.finish(&mut out).unwrap();
        copy.update(&data[37..], &mut copy_out).unwrap();
        copy.finish(&mut copy_out).unwrap();
        assert_eq!(out, copy_out);
        assert!(matches!(
            original.update(b"x", &mut out),
            Err(Error::EngineFinished)
        ));
    }

    #[test]
    fn mac_and_digest_clone_state() {
        let mut mac = MacEngine::new(MacAlgorithm::HmacSha512, &KEY, &[0; 16]).unwrap();
        mac.update(b"abc");
        let copy = mac.try_clone_engine().unwrap();
        mac.update(b"def");
        assert_ne!(mac.tag(), copy.tag());
        assert_eq!(copy.tag().len(), 64);

        let mut digest = DigestEngine::new();
        digest.update(b"abc");
        let copy = digest.try_clone_engine().unwrap();
        assert_eq!(digest.digest(), copy.digest());
    }

    struct Hsm;

    impl ExternalEngine for Hsm {
        fn provider(&self) -> &str {
            "hsm"
        }

        fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<()> {
            output.extend_from_slice(input);
            Ok(())
        }

        fn finish(&mut self, _output: &mut Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn external_engine_is_not_cloneable() {
        let engines = EngineSet::new(
            CipherEngine::External(Box::new(Hsm)),
            None,
            DigestEngine::new(),
        );
        assert!(!engines.cipher.is_cloneable());
        match engines.try_clone_engine() {
            Err(Error::EngineNotCloneable { provider }) => assert_eq!(provider, "hsm"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
