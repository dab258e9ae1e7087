//! Files attached to a chat message.
//!
//! Images are inlined as a base64 `data:` URI next to a text part. Other
//! files are not uploaded; the model is only told their name.

use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::debug;

use mindmuse_core::MessageContent;

/// Sent with an image when the user adds no text of their own.
pub const IMAGE_PROMPT: &str = "Please analyze this image and describe what you see. \
If it contains text, charts, or data, please provide a thorough analysis.";

pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// MIME type by file extension.
pub fn detect_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png"          => "image/png",
        "gif"          => "image/gif",
        "webp"         => "image/webp",
        "bmp"          => "image/bmp",

        "pdf"          => "application/pdf",
        "txt"          => "text/plain",
        "md"           => "text/markdown",
        "doc"          => "application/msword",
        "docx"         => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",

        _              => "application/octet-stream",
    }
}

pub fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

/// What the model is told about a file it cannot see.
pub fn file_acknowledgement(file_name: &str) -> String {
    format!(
        "I've uploaded a file named \"{file_name}\". Please acknowledge this and let me know \
         what types of files you can analyze."
    )
}

/// Build the message content for `path`, with optional user text.
pub async fn attachment_content(path: &Path, text: Option<&str>) -> Result<MessageContent> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Cannot read attachment: {}", path.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a file", path.display());
    }

    let text = text.map(str::trim).filter(|t| !t.is_empty());
    let mime = detect_mime_type(path);
    if !is_image(mime) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let ack = file_acknowledgement(&name);
        return Ok(MessageContent::Text(match text {
            Some(text) => format!("{text}\n\n{ack}"),
            None => ack,
        }));
    }

    if metadata.len() > MAX_IMAGE_BYTES {
        bail!(
            "{} is {} bytes; images are limited to {MAX_IMAGE_BYTES}",
            path.display(),
            metadata.len()
        );
    }
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read attachment: {}", path.display()))?;
    debug!(mime, bytes = bytes.len(), "attaching image");

    let url = format!("data:{mime};base64,{}", STANDARD.encode(&bytes));
    Ok(MessageContent::text_with_image(text.unwrap_or(IMAGE_PROMPT), url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindmuse_core::ContentPart;

    #[test]
    fn detects_mime_by_extension() {
        assert_eq!(detect_mime_type(Path::new("face.JPG")), "image/jpeg");
        assert_eq!(detect_mime_type(Path::new("notes.pdf")), "application/pdf");
        assert_eq!(detect_mime_type(Path::new("noext")), "application/octet-stream");
        assert!(is_image("image/png"));
        assert!(!is_image("text/plain"));
    }

    #[tokio::test]
    async fn image_becomes_data_uri_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let content = attachment_content(&path, None).await.unwrap();
        let MessageContent::Parts(parts) = &content else {
            panic!("expected parts, got {content:?}");
        };
        assert_eq!(parts[0], ContentPart::Text { text: IMAGE_PROMPT.into() });
        match &parts[1] {
            ContentPart::ImageUrl { image_url } => {
                assert_eq!(image_url.url, "data:image/png;base64,iVBORw==");
            }
            other => panic!("expected image part, got {other:?}"),
        }

        let content = attachment_content(&path, Some("what does this say about me?")).await.unwrap();
        assert_eq!(content.as_text(), "what does this say about me?");
    }

    #[tokio::test]
    async fn other_files_are_acknowledged_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let content = attachment_content(&path, None).await.unwrap();
        assert_eq!(content, MessageContent::Text(file_acknowledgement("journal.pdf")));
        assert!(!content.has_image());

        let content = attachment_content(&path, Some("my week")).await.unwrap();
        assert!(content.as_text().starts_with("my week\n\n"));
    }

    #[tokio::test]
    async fn missing_file_or_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(attachment_content(&dir.path().join("gone.png"), None).await.is_err());
        assert!(attachment_content(dir.path(), None).await.is_err());
    }
}
