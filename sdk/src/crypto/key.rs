use {
    crate::{Error, Result},
    base64::{Engine, display::Base64Display, prelude::BASE64_URL_SAFE_NO_PAD},
    derive_more::{From, Into},
    rand::RngCore,
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{
        borrow::Cow,
        fmt::{self, Debug, Display},
        str::FromStr,
    },
    zeroize::{Zeroize, ZeroizeOnDrop},
};

/// Secret used to encrypt content.
///
/// The same key is used for the cipher and, for modes without built-in
/// authentication, for the HMAC appended to the ciphertext.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    /// Generates a random key of `len` bytes.
    #[must_use]
    #[inline]
    pub fn generate(len: usize) -> Self {
        let mut key = vec![0u8; len];
        rand::rng().fill_bytes(&mut key);
        Self(key)
    }

    #[must_use]
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    #[inline]
    pub fn display_unmasked(&self) -> impl Display + '_ {
        Base64Display::new(&self.0, &BASE64_URL_SAFE_NO_PAD)
    }
}

impl FromStr for EncryptionKey {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
        if !matches!(bytes.len(), 16 | 24 | 32) {
            return Err(Error::UnsupportedKeyLength {
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }
}

impl<'de> Deserialize<'de> for EncryptionKey {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Serialize for EncryptionKey {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BASE64_URL_SAFE_NO_PAD.encode(&self.0).serialize(serializer)
    }
}

impl Debug for EncryptionKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey").finish()
    }
}

/// Initialization vector (or nonce) for a single cipher stream.
///
/// Never reuse an IV with the same key for different plaintext.
#[derive(Debug, Clone, PartialEq, Eq, From, Into)]
pub struct Iv(Vec<u8>);

impl Iv {
    #[must_use]
    #[inline]
    pub fn random(len: usize) -> Self {
        let mut iv = vec![0u8; len];
        rand::rng().fill_bytes(&mut iv);
        Self(iv)
    }

    #[must_use]
    #[inline]
    pub fn to_base64(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(&self.0)
    }

    #[inline]
    pub fn from_base64(s: &str) -> Result<Self> {
        BASE64_URL_SAFE_NO_PAD
            .decode(s)
            .map(Self)
            .map_err(|err| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))
    }
}

impl AsRef<[u8]> for Iv {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
