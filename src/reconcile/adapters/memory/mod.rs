//! In-memory adapters for reconciliation tests and dry runs.

mod auth;
mod editor;
mod hosting;
mod working_copy;

pub use auth::InMemoryInstallationAuth;
pub use editor::InlineImageEditor;
pub use hosting::{HostingCall, HostingOperation, InMemoryHostingPlatform, PullRequestRecord};
pub use working_copy::{FileSet, PushRecord, SeededWorkingCopyProvider};
