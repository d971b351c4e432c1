//! Shared long-lived secret (`K` in spec terms) loaded from a key file and
//! zeroized on drop.

use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub async fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            anyhow::bail!("key file {} is empty", path.display());
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}
