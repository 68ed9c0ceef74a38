mod template;

pub use template::{NamePlacement, TemplateConfig, TemplateStore, TemplateUploadError};

use std::path::Path;
use uuid::Uuid;

pub const CERTIFICATE_ID_LEN: usize = 12;

/// Random v4 UUID with separators stripped, uppercased and cut to
/// [`CERTIFICATE_ID_LEN`] characters.
pub fn generate_certificate_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string().to_uppercase();
    id.truncate(CERTIFICATE_ID_LEN);
    id
}

pub fn ensure_dirs(upload_folder: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(upload_folder)
}
