//! In-process byte concatenation of MPEG-TS segments

use super::traits::Merger;
use super::{bounded, ensure_output};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const OUTPUT_NAME: &str = "output.ts";

/// Fallback merger that appends segments into `output.ts`
///
/// Transport stream packets are self-delimiting, so appending whole segments
/// yields a playable stream without touching the payload.
#[derive(Debug, Clone)]
pub struct ConcatMerger {
    timeout: Duration,
}

impl ConcatMerger {
    /// Create a merger with the given time budget
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, segments: &[PathBuf], scratch_dir: &Path) -> Result<PathBuf> {
        let output_path = scratch_dir.join(OUTPUT_NAME);
        let mut output = tokio::fs::File::create(&output_path).await?;
        for segment in segments {
            let mut input = tokio::fs::File::open(segment).await?;
            tokio::io::copy(&mut input, &mut output).await?;
        }
        output.flush().await?;
        drop(output);

        ensure_output(&output_path).await?;
        Ok(output_path)
    }
}

#[async_trait]
impl Merger for ConcatMerger {
    async fn merge(
        &self,
        segments: &[PathBuf],
        scratch_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        bounded(self.run(segments, scratch_dir), self.timeout, cancel).await
    }

    fn name(&self) -> &'static str {
        "concat"
    }

    fn remuxes(&self) -> bool {
        false
    }
}
