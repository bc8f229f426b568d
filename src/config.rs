use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REPOSITORY_URL: &str = "https://repo1.maven.org/maven2/.index/";
pub const DEFAULT_CONTEXT_ID: &str = "central";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the index lives locally and which remote it tracks. The context id
/// names the per-remote directory pair, so two contexts never share state.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub repository_url: String,
    pub context_id: String,
    pub cache_dir: PathBuf,
    pub index_dir: PathBuf,
    pub timeout: Duration,
}

impl SearchConfig {
    pub fn new(context_id: impl Into<String>, repository_url: impl Into<String>) -> Result<Self> {
        let context_id = context_id.into();
        let base = index_home()?;
        Ok(Self {
            cache_dir: base.join(format!("{context_id}-cache")),
            index_dir: base.join(format!("{context_id}-index")),
            repository_url: repository_url.into(),
            context_id,
            timeout: DEFAULT_TIMEOUT,
        })
    }
}

fn index_home() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to resolve home directory"))?;
    Ok(home.join(".index"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_derive_from_context_id() -> Result<()> {
        let config = SearchConfig::new("central", DEFAULT_REPOSITORY_URL)?;
        assert!(config.cache_dir.ends_with(".index/central-cache"));
        assert!(config.index_dir.ends_with(".index/central-index"));
        Ok(())
    }

    #[test]
    fn contexts_do_not_share_directories() -> Result<()> {
        let a = SearchConfig::new("central", DEFAULT_REPOSITORY_URL)?;
        let b = SearchConfig::new("mirror", "https://mirror.example/.index/")?;
        assert_ne!(a.cache_dir, b.cache_dir);
        assert_ne!(a.index_dir, b.index_dir);
        Ok(())
    }
}
