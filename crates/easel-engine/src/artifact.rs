use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Rendered image bytes. The artifact has no identity beyond its run.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Vec<u8>,
    mime_type: String,
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_base64(encoded: &str, mime_type: impl Into<String>) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim().as_bytes())
            .context("artifact base64 decode failed")?;
        Ok(Self::new(bytes, mime_type))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }

    /// Pixel size, when the payload decodes as an image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        image::load_from_memory(&self.bytes)
            .ok()
            .map(|decoded| (decoded.width(), decoded.height()))
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.bytes).with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::Artifact;

    #[test]
    fn base64_transport_preserves_bytes() -> anyhow::Result<()> {
        let artifact = Artifact::new(vec![0, 1, 2, 250], "image/png");
        let decoded = Artifact::from_base64(&artifact.to_base64(), "image/png")?;
        assert_eq!(decoded, artifact);
        assert!(Artifact::from_base64("%%%", "image/png").is_err());
        Ok(())
    }

    #[test]
    fn digest_is_sha256_hex() {
        let artifact = Artifact::new(b"abc".to_vec(), "image/png");
        assert_eq!(
            artifact.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn non_image_bytes_have_no_dimensions() {
        let artifact = Artifact::new(b"not an image".to_vec(), "image/png");
        assert_eq!(artifact.dimensions(), None);
        assert_eq!(artifact.extension(), "png");
        assert_eq!(Artifact::new(Vec::new(), "image/jpeg").extension(), "jpg");
    }

    #[test]
    fn debug_output_omits_payload() {
        let artifact = Artifact::new(vec![7; 32], "image/png");
        assert_eq!(
            format!("{artifact:?}"),
            "Artifact { bytes: 32, mime_type: \"image/png\" }"
        );
    }
}
