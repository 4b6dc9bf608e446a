use std::path::PathBuf;

/// On-disk layout for pubdrive data.
///
/// Rooted at `$PUBDRIVE_DATA_DIR` when set, otherwise the platform data
/// directory (`$XDG_DATA_HOME/pubdrive` on Linux), with a `~/.pubdrive`
/// fallback for systems where no data dir can be resolved.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = std::env::var_os("PUBDRIVE_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join("pubdrive")))
            .or_else(|| dirs::home_dir().map(|h| h.join(".pubdrive")))
            .unwrap_or_else(|| PathBuf::from(".pubdrive"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Persistent browser profiles, one subdirectory per platform account.
    pub fn profiles_dir(&self) -> PathBuf {
        self.base.join("profiles")
    }

    pub fn profile_dir(&self, name: &str) -> PathBuf {
        let safe = name.replace([':', '/', '\\'], "_");
        self.profiles_dir().join(safe)
    }

    /// Screenshots and other post-mortem artifacts.
    pub fn media_dir(&self) -> PathBuf {
        self.base.join("media")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.profiles_dir())?;
        std::fs::create_dir_all(self.media_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
