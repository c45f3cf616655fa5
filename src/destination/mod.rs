//! Object storage side of a transfer.
//!
//! - **`ObjectKeyGenerator`** - deterministic per-run object keys
//! - **`ObjectUploader`** - moves sealed chunks into a bucket and cleans up

mod key;
mod uploader;

pub use key::ObjectKeyGenerator;
pub use uploader::{FailedUpload, ObjectUploader, UploadReceipt};
