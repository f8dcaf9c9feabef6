use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the file at `path`, streamed.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to hash {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest every path, in order.
pub fn digest_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>> {
    paths.iter().map(|path| compute_sha256(path.as_ref())).collect()
}

/// Stable key over an ordered list of request parameters. Parts are length
/// prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let bytes = part.as_ref();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn file_digest_matches_known_vector() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("segment.bin");
        fs::write(&path, b"abc").unwrap();

        assert_eq!(
            compute_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest_all(&[&path, &path]).unwrap().len(), 2);
    }

    #[test]
    fn fingerprint_separates_part_boundaries() {
        assert_ne!(fingerprint(["ab", "c"]), fingerprint(["a", "bc"]));
        assert_eq!(fingerprint(["a", "bc"]), fingerprint(["a", "bc"]));
    }
}
