use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use stowage_types::{ContentKey, HashAlgorithm};

/// Computes content keys for blocks.
///
/// Unlike a domain-separated object hasher, the key is the plain digest of
/// the raw bytes so that keys are reproducible with standard tools
/// (`sha256sum` and friends).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
}

impl ContentHasher {
    pub const fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Content key of `data`.
    pub fn key(&self, data: &[u8]) -> ContentKey {
        ContentKey::from_digest(&self.digest(data))
    }

    /// Raw digest bytes of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut digest = StreamDigest::new(self.algorithm);
        digest.update(data);
        digest.finalize_bytes()
    }

    /// Verify that `data` produces `expected`.
    pub fn verify(&self, data: &[u8], expected: &ContentKey) -> bool {
        self.key(data) == *expected
    }
}

/// Incremental digest over a byte stream.
///
/// Used for whole-stream checksums: fed block by block while a write
/// session proceeds sequentially. Cloning snapshots the running state, so
/// an interim checksum can be taken without disturbing the accumulator.
#[derive(Clone)]
pub struct StreamDigest {
    state: DigestState,
}

#[derive(Clone)]
enum DigestState {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
    Sha1(Sha1),
    Md5(Md5),
}

impl StreamDigest {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => DigestState::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => DigestState::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha1 => DigestState::Sha1(Sha1::new()),
            HashAlgorithm::Md5 => DigestState::Md5(Md5::new()),
        };
        Self { state }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self.state {
            DigestState::Sha256(_) => HashAlgorithm::Sha256,
            DigestState::Sha512(_) => HashAlgorithm::Sha512,
            DigestState::Blake3(_) => HashAlgorithm::Blake3,
            DigestState::Sha1(_) => HashAlgorithm::Sha1,
            DigestState::Md5(_) => HashAlgorithm::Md5,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            DigestState::Sha256(h) => h.update(data),
            DigestState::Sha512(h) => h.update(data),
            DigestState::Blake3(h) => {
                h.update(data);
            }
            DigestState::Sha1(h) => h.update(data),
            DigestState::Md5(h) => h.update(data),
        }
    }

    pub fn finalize_bytes(self) -> Vec<u8> {
        match self.state {
            DigestState::Sha256(h) => h.finalize().to_vec(),
            DigestState::Sha512(h) => h.finalize().to_vec(),
            DigestState::Blake3(h) => h.finalize().as_bytes().to_vec(),
            DigestState::Sha1(h) => h.finalize().to_vec(),
            DigestState::Md5(h) => h.finalize().to_vec(),
        }
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.finalize_bytes())
    }

    /// Hex digest of everything fed so far, leaving `self` usable.
    pub fn current_hex(&self) -> String {
        self.clone().finalize_hex()
    }

    /// Hex digest of the empty input.
    pub fn empty_hex(algorithm: HashAlgorithm) -> String {
        Self::new(algorithm).finalize_hex()
    }
}

impl std::fmt::Debug for StreamDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDigest")
            .field("algorithm", &self.algorithm())
            .finish()
    }
}
