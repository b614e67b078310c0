//! Snapshot output
//!
//! Serialises an [`ExportRecord`] as JSON, indented or compact, to stdout or
//! to a file.

use std::path::Path;

use serde::Serialize;
use serde_json::ser::{CompactFormatter, PrettyFormatter, Serializer};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{DocsnapError, Result};

use super::record::ExportRecord;

/// How the snapshot is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// Indent nested values; compact single-line output otherwise.
    pub pretty: bool,
    /// Spaces per indentation level when `pretty` is set.
    pub indent: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            indent: 2,
        }
    }
}

/// Render the record to JSON bytes, newline-terminated.
pub fn render(record: &ExportRecord, options: &OutputOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if options.pretty {
        let indent = " ".repeat(options.indent);
        let mut serializer =
            Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
        record.serialize(&mut serializer)?;
    } else {
        let mut serializer = Serializer::with_formatter(&mut out, CompactFormatter);
        record.serialize(&mut serializer)?;
    }
    out.push(b'\n');
    Ok(out)
}

/// Write the rendered record to any async writer and flush it.
pub async fn write_record_to<W>(writer: &mut W, record: &ExportRecord, options: &OutputOptions) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = render(record, options)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    debug!(bytes = bytes.len(), "wrote snapshot");
    Ok(())
}

/// Write the record to `output`, or to stdout when no path is given.
pub async fn write_record(record: &ExportRecord, options: &OutputOptions, output: Option<&str>) -> Result<()> {
    match output {
        Some(path) => {
            validate_path(path)?;
            let mut writer = create_writer(path).await?;
            write_record_to(&mut writer, record, options).await
        }
        None => {
            let mut stdout = tokio::io::stdout();
            write_record_to(&mut stdout, record, options).await
        }
    }
}

/// Helper function to create a buffered file writer
pub(crate) async fn create_writer(path: &str) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .await
        .map_err(|e| DocsnapError::Generic(format!("Failed to create file {path}: {e}")))?;
    Ok(BufWriter::with_capacity(8 * 1024 * 1024, file))
}

/// Check that the parent directory of `path` exists.
pub(crate) fn validate_path(path: &str) -> Result<()> {
    let path_obj = Path::new(path);

    if let Some(parent) = path_obj.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(DocsnapError::Generic(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldData;
    use serde_json::json;

    fn sample() -> ExportRecord {
        let mut d1 = ExportRecord::new();
        d1.merge_fields(FieldData::from([("x".to_string(), json!(1))]));
        let mut a = ExportRecord::new();
        a.insert_record("d1", d1);
        let mut root = ExportRecord::new();
        root.insert_record("A", a);
        root.insert_record("B", ExportRecord::new());
        root
    }

    #[test]
    fn test_render_pretty_with_indent() {
        let options = OutputOptions {
            pretty: true,
            indent: 4,
        };
        let text = String::from_utf8(render(&sample(), &options).unwrap()).unwrap();
        assert!(text.starts_with("{\n    \"A\": {\n        \"d1\""));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_render_compact() {
        let options = OutputOptions {
            pretty: false,
            indent: 2,
        };
        let text = String::from_utf8(render(&sample(), &options).unwrap()).unwrap();
        assert_eq!(text, "{\"A\":{\"d1\":{\"x\":1}},\"B\":{}}\n");
    }

    #[tokio::test]
    async fn test_write_record_to_buffer() {
        let mut buffer: Vec<u8> = Vec::new();
        write_record_to(&mut buffer, &sample(), &OutputOptions::default())
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed, json!({ "A": { "d1": { "x": 1 } }, "B": {} }));
    }

    #[test]
    fn test_validate_path_rejects_missing_directory() {
        assert!(validate_path("snapshot.json").is_ok());
        assert!(validate_path("/definitely/not/a/dir/snapshot.json").is_err());
    }

    #[tokio::test]
    async fn test_write_record_to_file() {
        let path = std::env::temp_dir().join(format!("docsnap-writer-{}.json", std::process::id()));
        let path_str = path.to_string_lossy().to_string();

        write_record(&sample(), &OutputOptions::default(), Some(&path_str))
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(written.contains("\"d1\""));
    }
}
