//! TranscriptWriter (C10): writes the five on-disk transcript files
//! atomically (write-to-temp + rename, fsync where supported) in creation
//! order, under a uniquely-named directory per request.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::CouncilError;

/// Owns one request's transcript directory and writes files into it in
/// the order creation happens: `request → stage1 → stage2 → stage3 →
/// result`. Writing never leaves a half-written file visible — each call
/// writes to a sibling temp file, fsyncs it, then renames over the final
/// name.
pub struct TranscriptWriter {
    dir: PathBuf,
}

impl TranscriptWriter {
    /// Reserves a uniquely-named directory under `root`, appending a
    /// numeric suffix on collision.
    pub async fn create(root: &Path, short_id: &str) -> Result<Self, CouncilError> {
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let base_name = format!("{stamp}-{short_id}");

        let mut candidate = root.join(&base_name);
        let mut suffix = 1u32;
        loop {
            match fs::create_dir_all(root).await {
                Ok(()) => {}
                Err(e) => {
                    return Err(CouncilError::TranscriptWriteError {
                        path: root.to_path_buf(),
                        message: e.to_string(),
                    })
                }
            }

            match fs::create_dir(&candidate).await {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    candidate = root.join(format!("{base_name}-{suffix}"));
                }
                Err(e) => {
                    return Err(CouncilError::TranscriptWriteError {
                        path: candidate,
                        message: e.to_string(),
                    })
                }
            }
        }

        Ok(Self { dir: candidate })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write_request(&self, value: &impl Serialize) -> Result<(), CouncilError> {
        self.write_json("request.json", value).await
    }

    pub async fn write_stage1(&self, value: &impl Serialize) -> Result<(), CouncilError> {
        self.write_json("stage1.json", value).await
    }

    pub async fn write_stage2(&self, value: &impl Serialize) -> Result<(), CouncilError> {
        self.write_json("stage2.json", value).await
    }

    pub async fn write_stage3(&self, value: &impl Serialize) -> Result<(), CouncilError> {
        self.write_json("stage3.json", value).await
    }

    pub async fn write_result(&self, value: &impl Serialize) -> Result<(), CouncilError> {
        self.write_json("result.json", value).await
    }

    async fn write_json(&self, name: &str, value: &impl Serialize) -> Result<(), CouncilError> {
        let final_path = self.dir.join(name);
        let tmp_path = self.dir.join(format!("{name}.tmp"));

        // Round-trip through `Value` (BTreeMap-backed, `preserve_order` is
        // not enabled) so every file gets sorted object keys per §6
        // regardless of the source struct's field declaration order.
        let value = serde_json::to_value(value).map_err(|e| CouncilError::TranscriptWriteError {
            path: final_path.clone(),
            message: e.to_string(),
        })?;

        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(
            &mut buf,
            serde_json::ser::PrettyFormatter::with_indent(b"  "),
        );
        value
            .serialize(&mut serializer)
            .map_err(|e| CouncilError::TranscriptWriteError {
                path: final_path.clone(),
                message: e.to_string(),
            })?;
        buf.push(b'\n');

        let write_result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&buf).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &final_path).await
        }
        .await;

        write_result.map_err(|e| CouncilError::TranscriptWriteError {
            path: final_path.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn writes_in_order_and_produces_readable_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::create(dir.path(), "abcd1234").await.unwrap();

        writer.write_request(&json!({"prompt": "hi"})).await.unwrap();
        writer.write_stage1(&json!([])).await.unwrap();

        let request_contents = tokio::fs::read_to_string(writer.dir().join("request.json"))
            .await
            .unwrap();
        assert!(request_contents.contains("\"prompt\""));
        assert!(tokio::fs::metadata(writer.dir().join("stage1.json")).await.is_ok());
    }

    #[tokio::test]
    async fn collision_on_directory_name_appends_a_counter() {
        let dir = tempfile::tempdir().unwrap();
        let first = TranscriptWriter::create(dir.path(), "same-id").await.unwrap();
        let second = TranscriptWriter::create(dir.path(), "same-id").await.unwrap();
        assert_ne!(first.dir(), second.dir());
    }
}
