mod archive;
mod digest;
mod manifest;
mod requester;
mod response;

pub use archive::{UploadRule, UploadedFile};
pub use digest::{sha256_file_hex, sha256_hex};
pub use manifest::{VersionManifest, MANIFEST_FILE_NAME, PAYLOAD_FILE_NAME};
pub use requester::{Requester, SUPER_ADMIN_ROLE};
pub use response::UpdateResponse;

#[cfg(test)]
mod tests;
