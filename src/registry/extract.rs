use crate::error::{RegistryError, Result};
use base64::Engine;
use std::path::Path;
use tokio::fs;

/// A file queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = guess_mime_type(&name);
        Self {
            name,
            mime_type,
            data,
        }
    }

    /// Read a file from disk, naming it after the last path component.
    /// Names that aren't valid UTF-8 are converted lossily.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or(RegistryError::EmptyName)?;
        let data = fs::read(path).await?;
        Ok(Self::new(name, data))
    }

    /// Value sent as the `type` form field.
    pub fn file_type(&self) -> String {
        file_type(&self.name)
    }
}

/// Lower-cased extension, or an empty string when the name has none.
pub fn file_type(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Payload stored in the offline cache: a data URL for images, text otherwise.
pub fn cache_payload(file: &UploadFile) -> String {
    if file.mime_type.starts_with("image/") {
        let b64 = base64::engine::general_purpose::STANDARD.encode(&file.data);
        format!("data:{};base64,{}", file.mime_type, b64)
    } else {
        String::from_utf8_lossy(&file.data).into_owned()
    }
}

/// Guess MIME type from filename extension.
pub fn guess_mime_type(filename: &str) -> String {
    match file_type(filename).as_str() {
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_is_lowercased_extension() {
        assert_eq!(file_type("Report.PDF"), "pdf");
        assert_eq!(file_type("archive.tar.gz"), "gz");
        assert_eq!(file_type("Makefile"), "");
        assert_eq!(file_type("trailing."), "");
    }

    #[test]
    fn images_are_cached_as_data_urls() {
        let file = UploadFile::new("dot.PNG", vec![0x89, b'P', b'N', b'G']);
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(cache_payload(&file), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn other_files_are_cached_as_text() {
        let file = UploadFile::new("notes.txt", b"quarterly budget".to_vec());
        assert_eq!(cache_payload(&file), "quarterly budget");

        let binary = UploadFile::new("blob.bin", vec![0xff, b'a']);
        assert_eq!(binary.mime_type, "application/octet-stream");
        assert_eq!(cache_payload(&binary), "\u{fffd}a");
    }

    #[tokio::test]
    async fn from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.md");
        std::fs::write(&path, "# hi").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "hello.md");
        assert_eq!(file.mime_type, "text/markdown");
        assert_eq!(file.data, b"# hi");
        assert_eq!(file.file_type(), "md");
    }

    #[tokio::test]
    async fn from_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadFile::from_path(&dir.path().join("nope.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Io(_)));
    }

    #[tokio::test]
    async fn from_path_without_file_name_is_empty_name() {
        let err = UploadFile::from_path(Path::new("/")).await.unwrap_err();
        assert!(matches!(err, RegistryError::EmptyName));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn from_path_accepts_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"caf\xe9.txt"));
        std::fs::write(&path, "menu").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "caf\u{fffd}.txt");
        assert_eq!(file.file_type(), "txt");
        assert_eq!(file.data, b"menu");
    }
}
