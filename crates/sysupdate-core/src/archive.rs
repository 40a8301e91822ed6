use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

const ZIP_LOCAL_FILE_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const ZIP_EMPTY_ARCHIVE_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

/// Upload form field carrying the package.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadRule {
    Required,
    File,
    Mimes,
}

impl UploadRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::File => "file",
            Self::Mimes => "mimes:zip",
        }
    }

    pub fn message(self) -> String {
        match self {
            Self::Required => format!("The {UPLOAD_FIELD} field is required."),
            Self::File => format!("The {UPLOAD_FIELD} must be a file."),
            Self::Mimes => format!("The {UPLOAD_FIELD} must be a file of type: zip."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub original_name: String,
    pub path: PathBuf,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            original_name: original_name.into(),
            path: path.into(),
        }
    }

    /// Treats the on-disk file name as the client-supplied name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let original_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            original_name,
            path,
        }
    }

    /// Final path component of the client name, with either separator style stripped.
    pub fn file_name(&self) -> Option<&str> {
        let name = self
            .original_name
            .rsplit(|ch: char| ch == '/' || ch == '\\')
            .next()
            .unwrap_or("")
            .trim();
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        Some(name)
    }

    pub fn first_failed_rule(&self) -> Option<UploadRule> {
        if self.original_name.trim().is_empty() || !self.path.exists() {
            return Some(UploadRule::Required);
        }
        if !self.path.is_file() || self.file_name().is_none() {
            return Some(UploadRule::File);
        }
        if !has_zip_extension(&self.original_name) || !has_zip_signature(&self.path) {
            return Some(UploadRule::Mimes);
        }
        None
    }
}

fn has_zip_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn has_zip_signature(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut magic = [0_u8; 4];
    if file.read_exact(&mut magic).is_err() {
        return false;
    }
    magic == ZIP_LOCAL_FILE_SIGNATURE || magic == ZIP_EMPTY_ARCHIVE_SIGNATURE
}
