pub mod ffmpeg;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use crate::error::AssemblyError;

/// Combines a video stream and an optional replacement audio track into `output`.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> Result<(), AssemblyError>;
}

pub async fn compute_file_checksum(file_path: &Path) -> Result<String> {
    let file = File::open(file_path).await?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
