//! Store layout constants

/// Hidden per-folder directory holding the store and state file
pub const FOLDER_DATA_DIR: &str = ".fcd";

/// Database file name inside the hidden directory
pub const DB_FILE: &str = "index.db";

/// Exclusive-lock file name next to the database
pub const LOCK_FILE: &str = "index.db.lock";

/// JSON state file (schema version, last scan generation)
pub const STATE_FILE: &str = "state.json";

/// Suffix prefix applied to a corrupted database before rebuild; the full
/// name is `index.db.corrupted.<unix-ts>`
pub const CORRUPTED_SUFFIX: &str = "corrupted";

/// Schema version sidecar file name, co-located with the binary
pub const VERSION_SIDECAR: &str = "VERSION";

/// Latest schema version compiled into this binary
pub const LATEST_SCHEMA_VERSION: i32 = 3;
