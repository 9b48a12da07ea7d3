use async_trait::async_trait;
use netflash_core::{BoardFiles, BoardIdentity, FileProvider, ProviderError};

use super::{locate, optional_str, required_str};

/// Same firmware and configuration for every board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleProvider {
    firmware: String,
    config: Option<String>,
}

impl SimpleProvider {
    pub fn new(firmware: impl Into<String>, config: Option<String>) -> Self {
        Self {
            firmware: firmware.into(),
            config,
        }
    }

    /// `firmware` is required, `config` optional
    pub fn from_options(options: &toml::Table) -> Result<Self, ProviderError> {
        Ok(Self {
            firmware: required_str(options, "firmware")?,
            config: optional_str(options, "config")?,
        })
    }
}

#[async_trait]
impl FileProvider for SimpleProvider {
    fn name(&self) -> &str {
        "simple"
    }

    async fn get_files(&self, _board: &BoardIdentity) -> Result<BoardFiles, ProviderError> {
        let files = BoardFiles::new(locate(&self.firmware).await?);
        Ok(match &self.config {
            Some(config) => files.with_config(locate(config).await?),
            None => files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netflash_core::{FileRef, MacAddress};

    fn board() -> BoardIdentity {
        BoardIdentity::new(MacAddress::new([2, 0, 0, 0, 0, 1]), "RB750Gr3", "mmips")
    }

    #[test]
    fn test_from_options() {
        let options: toml::Table = toml::from_str(
            r#"
            firmware = "routeros-mmips.npk"
            config = "autorun.rsc"
            "#,
        )
        .unwrap();

        assert_eq!(
            SimpleProvider::from_options(&options).unwrap(),
            SimpleProvider::new("routeros-mmips.npk", Some("autorun.rsc".into()))
        );
        assert_eq!(
            SimpleProvider::from_options(&toml::Table::new()).unwrap_err(),
            ProviderError::MissingOption("firmware".into())
        );
    }

    #[tokio::test]
    async fn test_files_for_board() {
        let firmware = tempfile::NamedTempFile::new().unwrap();
        let provider = SimpleProvider::new(
            firmware.path().to_str().unwrap(),
            Some("https://files.example.com/autorun.rsc".into()),
        );

        let files = provider.get_files(&board()).await.unwrap();
        assert!(matches!(files.firmware, FileRef::Path(_)));
        assert!(matches!(files.config, Some(FileRef::Url(_))));
    }

    #[tokio::test]
    async fn test_missing_firmware_file() {
        let provider = SimpleProvider::new("/nonexistent/routeros.npk", None);
        let err = provider.get_files(&board()).await.unwrap_err();
        assert_eq!(err.to_string(), "File '/nonexistent/routeros.npk' doesn't exist");
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let firmware = tempfile::NamedTempFile::new().unwrap();
        let provider = SimpleProvider::new(
            firmware.path().to_str().unwrap(),
            Some("/nonexistent/autorun.rsc".into()),
        );
        assert!(matches!(
            provider.get_files(&board()).await,
            Err(ProviderError::NotFound(_))
        ));
    }
}
