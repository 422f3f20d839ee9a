use std::path::PathBuf;

/// Errors raised while loading terrarium profiles.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// The profile directory exists but could not be listed.
    #[error("failed to read profile directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A profile file could not be opened or read.
    #[error("failed to read profile {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A profile file is not a valid profile record.
    #[error("invalid profile {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A profile file exceeds the size limit.
    #[error("profile {} too large ({size} bytes, max {max})", path.display())]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    /// The directory held profile files but none of them could be used.
    #[error("no usable profiles in {}", path.display())]
    NoUsableProfiles { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, ProfileError>;
