use {
    super::{
        engine::{
            CbcEngine, CipherEngine, CtrEngine, DigestEngine, EngineSet, ExternalEngine,
            GcmEngine, MacEngine,
        },
        key::{EncryptionKey, Iv},
    },
    crate::{Error, Result},
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, fmt, sync::Arc},
};

pub const AES_BLOCK_LEN: usize = 16;
pub const GCM_IV_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;

/// Creates engines for a cipher family whose state cannot be captured,
/// e.g. keys held in a hardware module.
pub trait ExternalEngineFactory: Send + Sync {
    fn provider(&self) -> &str;

    fn create(&self, key: &EncryptionKey, iv: &Iv) -> Result<Box<dyn ExternalEngine>>;
}

#[derive(Clone)]
pub enum CipherMode {
    Gcm,
    Ctr,
    Cbc,
    External(Arc<dyn ExternalEngineFactory>),
}

impl fmt::Debug for CipherMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcm => write!(f, "Gcm"),
            Self::Ctr => write!(f, "Ctr"),
            Self::Cbc => write!(f, "Cbc"),
            Self::External(factory) => write!(f, "External({})", factory.provider()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum MacAlgorithm {
    #[display("HmacSHA256")]
    #[serde(rename = "HmacSHA256")]
    HmacSha256,
    #[display("HmacSHA512")]
    #[serde(rename = "HmacSHA512")]
    HmacSha512,
}

impl MacAlgorithm {
    #[must_use]
    #[inline]
    pub fn tag_len(self) -> usize {
        match self {
            Self::HmacSha256 => 32,
            Self::HmacSha512 => 64,
        }
    }
}

/// Immutable description of a cipher family.
///
/// Shared by every engine, pipeline and checkpoint created from it.
#[derive(Debug, Clone)]
pub struct CipherDetails {
    id: String,
    key_len: usize,
    iv_len: usize,
    block_len: usize,
    mode: CipherMode,
    mac: Option<MacAlgorithm>,
}

impl CipherDetails {
    #[must_use]
    #[inline]
    pub fn aes_gcm(key_len: usize) -> Self {
        Self {
            id: format!("AES{}/GCM/NoPadding", key_len * 8),
            key_len,
            iv_len: GCM_IV_LEN,
            block_len: AES_BLOCK_LEN,
            mode: CipherMode::Gcm,
            mac: None,
        }
    }

    #[must_use]
    #[inline]
    pub fn aes_ctr(key_len: usize, mac: MacAlgorithm) -> Self {
        Self {
            id: format!("AES{}/CTR/NoPadding", key_len * 8),
            key_len,
            iv_len: AES_BLOCK_LEN,
            block_len: AES_BLOCK_LEN,
            mode: CipherMode::Ctr,
            mac: Some(mac),
        }
    }

    #[must_use]
    #[inline]
    pub fn aes_cbc(key_len: usize, mac: MacAlgorithm) -> Self {
        Self {
            id: format!("AES{}/CBC/PKCS5Padding", key_len * 8),
            key_len,
            iv_len: AES_BLOCK_LEN,
            block_len: AES_BLOCK_LEN,
            mode: CipherMode::Cbc,
            mac: Some(mac),
        }
    }

    #[must_use]
    #[inline]
    pub fn external(
        id: impl Into<String>,
        key_len: usize,
        iv_len: usize,
        block_len: usize,
        factory: Arc<dyn ExternalEngineFactory>,
    ) -> Self {
        Self {
            id: id.into(),
            key_len,
            iv_len,
            block_len,
            mode: CipherMode::External(factory),
            mac: None,
        }
    }

    /// Replaces the MAC of a non-AEAD family.
    #[must_use]
    #[inline]
    pub fn with_mac(mut self, mac: MacAlgorithm) -> Self {
        if !self.is_aead() {
            self.mac = Some(mac);
            self.id = format!("{}+{mac}", self.id.split('+').next().unwrap_or_default());
        }
        self
    }

    #[must_use]
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    #[inline]
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    #[must_use]
    #[inline]
    pub fn iv_len(&self) -> usize {
        self.iv_len
    }

    #[must_use]
    #[inline]
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    #[must_use]
    #[inline]
    pub fn mode(&self) -> &CipherMode {
        &self.mode
    }

    #[must_use]
    #[inline]
    pub fn mac(&self) -> Option<MacAlgorithm> {
        self.mac
    }

    #[must_use]
    #[inline]
    pub fn is_aead(&self) -> bool {
        matches!(self.mode, CipherMode::Gcm)
    }

    /// Number of bytes appended after the ciphertext body (GCM tag or HMAC).
    #[must_use]
    #[inline]
    pub fn trailer_len(&self) -> usize {
        match (&self.mode, self.mac) {
            (CipherMode::Gcm, _) => GCM_TAG_LEN,
            (_, Some(mac)) => mac.tag_len(),
            (_, None) => 0,
        }
    }

    #[must_use]
    #[inline]
    pub fn generate_iv(&self) -> Iv {
        Iv::random(self.iv_len)
    }

    #[must_use]
    #[inline]
    pub fn generate_key(&self) -> EncryptionKey {
        EncryptionKey::generate(self.key_len)
    }

    pub(crate) fn check_params(&self, key: &EncryptionKey, iv: &Iv) -> Result<()> {
        if key.len() != self.key_len {
            return Err(Error::InvalidKeyLength {
                cipher: self.id.clone(),
                actual: key.len(),
                expected: self.key_len,
            });
        }
        if iv.as_ref().len() != self.iv_len {
            return Err(Error::InvalidIvLength {
                cipher: self.id.clone(),
                actual: iv.as_ref().len(),
                expected: self.iv_len,
            });
        }
        Ok(())
    }

    /// Creates the engines that encrypt a new stream with `key` and `iv`.
    #[inline]
    pub fn encryptor(&self, key: &EncryptionKey, iv: &Iv) -> Result<EngineSet> {
        self.check_params(key, iv)?;
        let cipher = match &self.mode {
            CipherMode::Gcm => CipherEngine::Gcm(GcmEngine::new(key.as_bytes(), iv.as_ref())?),
            CipherMode::Ctr => CipherEngine::Ctr(CtrEngine::new(key.as_bytes(), iv.as_ref())?),
            CipherMode::Cbc => CipherEngine::Cbc(CbcEngine::new(key.as_bytes(), iv.as_ref())?),
            CipherMode::External(factory) => CipherEngine::External(factory.create(key, iv)?),
        };
        let mac = self
            .mac
            .map(|mac| MacEngine::new(mac, key.as_bytes(), iv.as_ref()))
            .transpose()?;
        Ok(EngineSet::new(cipher, mac, DigestEngine::new()))
    }
}

/// Cipher families available to pipelines, keyed by id.
///
/// Passed explicitly to whoever builds pipelines instead of being looked up globally.
#[derive(Debug, Clone)]
pub struct CipherRegistry {
    ciphers: BTreeMap<String, Arc<CipherDetails>>,
}

pub const DEFAULT_CIPHER: &str = "AES256/GCM/NoPadding";

impl Default for CipherRegistry {
    #[inline]
    fn default() -> Self {
        let mut registry = Self::empty();
        for key_len in [16, 24, 32] {
            registry.register(CipherDetails::aes_gcm(key_len));
            registry.register(CipherDetails::aes_ctr(key_len, MacAlgorithm::HmacSha256));
            registry.register(CipherDetails::aes_cbc(key_len, MacAlgorithm::HmacSha256));
        }
        registry
    }
}

impl CipherRegistry {
    #[must_use]
    #[inline]
    pub fn empty() -> Self {
        Self {
            ciphers: BTreeMap::new(),
        }
    }

    /// Adds a family, replacing any family with the same id.
    #[inline]
    pub fn register(&mut self, details: CipherDetails) -> Arc<CipherDetails> {
        let details = Arc::new(details);
        self.ciphers
            .insert(details.id().to_owned(), Arc::clone(&details));
        details
    }

    #[inline]
    pub fn get(&self, id: &str) -> Result<Arc<CipherDetails>> {
        self.ciphers
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| Error::UnsupportedCipher(id.to_owned()))
    }

    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ciphers.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test")]
mod tests {
    use super::*;

    #[test]
    fn default_registry() {
        let registry = CipherRegistry::default();
        assert_eq!(registry.ids().count(), 9);
        let gcm = registry.get(DEFAULT_CIPHER).unwrap();
        assert!(gcm.is_aead());
        assert_eq!(gcm.key_len(), 32);
        assert_eq!(gcm.iv_len(), 12);
        assert_eq!(gcm.trailer_len(), 16);

        let cbc = registry.get("AES128/CBC/PKCS5Padding").unwrap();
        assert_eq!(cbc.mac(), Some(MacAlgorithm::HmacSha256));
        assert_eq!(cbc.trailer_len(), 32);

        assert!(matches!(
            registry.get("DES/ECB/NoPadding"),
            Err(Error::UnsupportedCipher(_))
        ));
    }

    #[test]
    fn with_mac_renames() {
        let details = CipherDetails::aes_ctr(32, MacAlgorithm::HmacSha256)
            .with_mac(MacAlgorithm::HmacSha512);
        assert_eq!(details.id(), "AES256/CTR/NoPadding+HmacSHA512");
        assert_eq!(details.trailer_len(), 64);
        let gcm = CipherDetails::aes_gcm(16).with_mac(MacAlgorithm::HmacSha512);
        assert_eq!(gcm.mac(), None);
    }

    #[test]
    fn rejects_bad_params() {
        let details = CipherDetails::aes_gcm(32);
        let key = EncryptionKey::generate(16);
        assert!(matches!(
            details.encryptor(&key, &details.generate_iv()),
            Err(Error::InvalidKeyLength { actual: 16, .. })
        ));
        let key = details.generate_key();
        assert!(matches!(
            details.encryptor(&key, &Iv::random(16)),
            Err(Error::InvalidIvLength { actual: 16, .. })
        ));
    }
}
