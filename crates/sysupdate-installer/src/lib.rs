mod archive;
mod cache;
mod config;
mod error;
mod fs_utils;
mod installer;
mod layout;
mod migrate;
mod overlay;
mod receipts;
mod settings;
mod transactions;
mod types;

pub use cache::{CacheInvalidator, FileCacheInvalidator, SYSTEM_SETTINGS_CACHE_REGION};
pub use config::UpdaterConfig;
pub use error::{UpdateError, INTERNAL_FAULT_MESSAGE, UPDATE_SUCCESS_MESSAGE};
pub use installer::UpdateInstaller;
pub use layout::AppLayout;
pub use migrate::{CommandMigrator, SchemaMigrator};
pub use receipts::{read_update_receipts, write_update_receipt};
pub use settings::{seed_system_version, FileSettingsStore, SettingsStore};
pub use transactions::{
    append_update_journal_entry, begin_update, clear_update_lock, current_unix_timestamp,
    new_update_txid, read_update_journal, read_update_lock, read_update_metadata, update_status,
    write_update_metadata, LockAcquire, UpdateLock,
};
pub use types::{
    wizard_checkmark_settings, Setting, UpdateJournalEntry, UpdateMetadata, UpdateReceipt,
    SYSTEM_VERSION_SETTING, WIZARD_CHECKMARK_SETTINGS,
};
