//! Document administration: the mirrored list, its filter, uploads and
//! deletes.

mod filter;
mod upload;
mod view;

#[cfg(test)]
mod fake;

pub use filter::{all_tags, filter_documents};
pub use upload::{parse_tags, UploadFlow, UploadState};
pub use view::{DeleteConfirmation, DocumentsView};
