use crate::error::{Error, ErrorKind, Result};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
    Blake3,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 3] = [Self::Sha256, Self::Sha512, Self::Blake3];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    /// Sidecar suffix, without the dot.
    pub fn extension(&self) -> &'static str {
        self.name()
    }

    /// `widget-1.0.jar` becomes `widget-1.0.jar.sha256`.
    pub fn sidecar_path(&self, path: &Path) -> PathBuf {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(".");
        sidecar.push(self.extension());
        PathBuf::from(sidecar)
    }

    /// Resolve configured algorithm names, failing on the first unknown one.
    pub fn resolve_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>> {
        let mut algorithms = Vec::with_capacity(names.len());
        for name in names {
            let algorithm: Self = name.as_ref().parse()?;
            if !algorithms.contains(&algorithm) {
                algorithms.push(algorithm);
            }
        }
        Ok(algorithms)
    }

    fn hasher(&self) -> Hasher {
        match self {
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Sha512 => Hasher::Sha512(Sha512::new()),
            Self::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            _ => exn::bail!(ErrorKind::AlgorithmUnavailable(s.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(bytes),
            Self::Sha512(h) => h.update(bytes),
            Self::Blake3(h) => {
                h.update(bytes);
            },
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => hex::encode(h.finalize().as_bytes()),
        }
    }
}

/// Lowercase hex digests, one per algorithm.
pub type Digests = BTreeMap<DigestAlgorithm, String>;

/// Digest everything `reader` yields with every algorithm in one pass.
pub fn compute_digests(mut reader: impl Read, algorithms: &[DigestAlgorithm]) -> io::Result<Digests> {
    let mut hashers: Vec<(DigestAlgorithm, Hasher)> = algorithms.iter().map(|a| (*a, a.hasher())).collect();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for (_, hasher) in &mut hashers {
            hasher.update(&buffer[..read]);
        }
    }
    Ok(hashers.into_iter().map(|(algorithm, hasher)| (algorithm, hasher.finalize_hex())).collect())
}

/// [`compute_digests`] over bytes already in memory.
pub fn digest_bytes(bytes: &[u8], algorithms: &[DigestAlgorithm]) -> Digests {
    algorithms
        .iter()
        .map(|algorithm| {
            let mut hasher = algorithm.hasher();
            hasher.update(bytes);
            (*algorithm, hasher.finalize_hex())
        })
        .collect()
}
