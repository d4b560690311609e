use super::LifecycleError;
use super::orchestrator::UploadFile;
use crate::config::UploadConfig;
use crate::utils::filename::validate_flat_filename;

const OCTET_STREAM: &str = "application/octet-stream";

/// Limits applied to every upload before anything is written.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: u64,
    allowed_mime_types: Vec<String>,
    max_files: usize,
}

impl UploadPolicy {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .collect(),
            max_files: config.max_files.max(1),
        }
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Validate one file and return its effective MIME type.
    ///
    /// The type is guessed from the extension first; the client-declared
    /// content type is used only when the extension is unknown.
    pub fn check(&self, file: &UploadFile) -> Result<String, LifecycleError> {
        let name = validate_flat_filename(&file.original_name)
            .map_err(|e| LifecycleError::UploadRejected(e.message().to_string()))?;

        if file.data.is_empty() {
            return Err(LifecycleError::UploadRejected(format!("'{name}' is empty")));
        }
        if file.data.len() as u64 > self.max_file_size {
            return Err(LifecycleError::UploadRejected(format!(
                "'{name}' exceeds the {} byte limit",
                self.max_file_size
            )));
        }

        let mime = mime_guess::from_path(name)
            .first()
            .map(|m| m.essence_str().to_string())
            .or_else(|| {
                file.content_type
                    .as_deref()
                    .and_then(|ct| ct.split(';').next())
                    .map(|ct| ct.trim().to_ascii_lowercase())
                    .filter(|ct| !ct.is_empty())
            })
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        if !self.allows(&mime) {
            return Err(LifecycleError::UploadRejected(format!(
                "'{name}': type {mime} is not allowed"
            )));
        }
        Ok(mime)
    }

    fn allows(&self, mime: &str) -> bool {
        self.allowed_mime_types.iter().any(|allowed| {
            match allowed.strip_suffix("/*") {
                Some(family) => mime
                    .split_once('/')
                    .is_some_and(|(top, _)| top == family),
                None => allowed == mime,
            }
        })
    }
}
