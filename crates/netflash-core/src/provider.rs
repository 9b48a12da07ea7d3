//! File provider capability

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::files::BoardFiles;
use crate::models::BoardIdentity;

/// Decides which firmware and configuration a board receives.
///
/// Called once per session, before the board is offered a flash. Errors are
/// per-session: the board is skipped and the runner moves on.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Registry key or other short name used in log lines
    fn name(&self) -> &str;

    async fn get_files(&self, board: &BoardIdentity) -> Result<BoardFiles, ProviderError>;
}
