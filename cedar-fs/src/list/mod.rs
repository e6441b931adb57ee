//! Filesystem enumeration: [`FilesystemList`] and its two specializations.

mod backup_file_list;
mod filesystem_list;
mod purge_item_list;

pub use backup_file_list::{BackupFileList, SpanItem, TarMode};
pub use filesystem_list::{ExcludePolicy, FilesystemList};
pub use purge_item_list::PurgeItemList;
