use std::collections::BTreeMap;

use async_trait::async_trait;
use netflash_core::{BoardFiles, BoardIdentity, FileProvider, ProviderError};
use tracing::debug;

use super::{locate, optional_str};

/// Firmware chosen by the board's reported architecture
///
/// ```toml
/// [provider]
/// type = "arch"
/// config = "autorun.rsc"
///
/// [provider.firmware]
/// arm = "routeros-7.12-arm.npk"
/// mmips = "https://download.example.com/routeros-7.12-mmips.npk"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchProvider {
    firmware: BTreeMap<String, String>,
    config: Option<String>,
}

impl ArchProvider {
    pub fn new(firmware: BTreeMap<String, String>, config: Option<String>) -> Self {
        Self { firmware, config }
    }

    pub fn from_options(options: &toml::Table) -> Result<Self, ProviderError> {
        let table = match options.get("firmware") {
            Some(toml::Value::Table(table)) => table,
            Some(other) => {
                return Err(ProviderError::InvalidOption {
                    key: "firmware".into(),
                    reason: format!("expected a table of architectures, found {}", other.type_str()),
                })
            }
            None => return Err(ProviderError::MissingOption("firmware".into())),
        };

        let mut firmware = BTreeMap::new();
        for (arch, location) in table {
            let location = location.as_str().ok_or_else(|| ProviderError::InvalidOption {
                key: format!("firmware.{arch}"),
                reason: "expected a path or URL".into(),
            })?;
            firmware.insert(arch.clone(), location.to_string());
        }

        if firmware.is_empty() {
            return Err(ProviderError::InvalidOption {
                key: "firmware".into(),
                reason: "no architectures listed".into(),
            });
        }

        Ok(Self {
            firmware,
            config: optional_str(options, "config")?,
        })
    }

    pub fn architectures(&self) -> impl Iterator<Item = &str> {
        self.firmware.keys().map(String::as_str)
    }
}

#[async_trait]
impl FileProvider for ArchProvider {
    fn name(&self) -> &str {
        "arch"
    }

    async fn get_files(&self, board: &BoardIdentity) -> Result<BoardFiles, ProviderError> {
        let location = self
            .firmware
            .get(&board.arch)
            .ok_or_else(|| ProviderError::NoFirmware(board.arch.clone()))?;
        debug!(arch = %board.arch, firmware = %location, "Selected firmware");

        let files = BoardFiles::new(locate(location).await?);
        Ok(match &self.config {
            Some(config) => files.with_config(locate(config).await?),
            None => files,
        })
    }
}
