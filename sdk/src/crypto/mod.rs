//! Cipher families and the stateful engines that implement them.
//!
//! Content is encrypted as a single continuous cipher stream, no matter how many
//! parts it is uploaded in. The encrypted object has the following form:
//!
//! - ciphertext body
//! - trailer: the GCM tag for `AES*/GCM/NoPadding`, or an HMAC for the CTR and CBC
//!   families. The HMAC is keyed with the content key and covers the IV followed by
//!   the ciphertext body.
//!
//! GCM uses a 96-bit IV and no additional authenticated data. CTR treats the whole
//! 128-bit IV as a big-endian counter. CBC pads the last block with PKCS#7.
//!
//! Families are looked up in an explicit [`CipherRegistry`] rather than a global table,
//! so callers can add families (including non-cloneable external ones) per pipeline.

mod decrypt;
mod details;
mod engine;
mod key;

pub use {
    decrypt::DecryptingWriter,
    details::{
        AES_BLOCK_LEN, CipherDetails, CipherMode, CipherRegistry, DEFAULT_CIPHER,
        ExternalEngineFactory, GCM_IV_LEN, GCM_TAG_LEN, MacAlgorithm,
    },
    engine::{
        CbcEngine, CipherEngine, CtrEngine, DigestEngine, EngineCloner, EngineSet,
        ExternalEngine, GCM_MAX_MESSAGE_LEN, GcmEngine, MacEngine,
    },
    key::{EncryptionKey, Iv},
};
