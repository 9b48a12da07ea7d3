//! Protocol engine
//!
//! Drives one board through the fixed session script:
//!
//! 1. offer, expect `YACK`
//! 2. format, expect `STRT`
//! 3. spacer, expect `RETR`
//! 4. firmware transfer, then a done step expecting `RETR`
//! 5. optional configuration transfer as `autorun.scr`, then a done step
//! 6. finalize, expect `WTRM`
//! 7. terminate; the board reboots without answering
//!
//! Files are resolved before the offer, so a board is never formatted
//! without firmware to install.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use netflash_core::{AbortFlashing, BoardIdentity, FileProvider, SessionState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::codec::{Command, CONFIG_DESTINATION_NAME, TERMINATE_MESSAGE};
use crate::resolve::FileResolver;
use crate::session::Session;
use crate::transfer::{send_file, ProgressObserver, TransferOptions, TransferStats};
use crate::transport::Transport;

/// Outcome of a completed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub board: BoardIdentity,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Firmware first, then the configuration script if one was sent
    pub files: Vec<TransferStats>,
    #[serde(skip)]
    pub final_state: SessionState,
}

/// Runs flash sessions over a shared transport
pub struct Flasher {
    transport: Arc<dyn Transport>,
    provider: Arc<dyn FileProvider>,
    resolver: FileResolver,
    options: TransferOptions,
}

impl Flasher {
    pub fn new(transport: Arc<dyn Transport>, provider: Arc<dyn FileProvider>) -> Self {
        Self {
            transport,
            provider,
            resolver: FileResolver::new(),
            options: TransferOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    /// Flash `board`; every failure ends only this session
    pub async fn run(
        &self,
        board: &BoardIdentity,
        observer: &mut dyn ProgressObserver,
    ) -> Result<SessionReport, AbortFlashing> {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %session_id, board = %board.mac);
        self.run_script(session_id, board, observer)
            .instrument(span)
            .await
    }

    async fn run_script(
        &self,
        session_id: Uuid,
        board: &BoardIdentity,
        observer: &mut dyn ProgressObserver,
    ) -> Result<SessionReport, AbortFlashing> {
        let started_at = Utc::now();

        let files = self.provider.get_files(board).await?;
        debug!(provider = self.provider.name(), firmware = %files.firmware.describe(), "Files selected");

        let firmware = self.resolver.resolve(files.firmware).await?;
        let config = match files.config {
            Some(reference) => Some(self.resolver.resolve(reference).await?),
            None => None,
        };

        let session = Session::new(self.transport.as_ref(), board.mac);
        let mut state = SessionState::default();
        let mut stats = Vec::with_capacity(2);

        info!(step = "offer", "Sending the offer to flash");
        state = session.exchange(state, &Command::Offer).await?;
        info!(model = %board.model, arch = %board.arch, "Board accepted flash offer");

        info!(step = "format", "Formatting the board");
        state = session.exchange(state, &Command::Format).await?;

        info!(step = "spacer", "Waiting until the board is ready to receive files");
        state = session.exchange(state, &Command::Spacer).await?;

        info!(step = "firmware", "Sending the firmware");
        let firmware_name = firmware.name().to_string();
        let (next, firmware_stats) = send_file(
            &session,
            state,
            firmware,
            &firmware_name,
            &self.options,
            observer,
        )
        .await?;
        state = session.exchange(next, &Command::FileDone).await?;
        stats.push(firmware_stats);

        if let Some(config) = config {
            info!(step = "config", source = %config.name(), "Sending the configuration");
            let (next, config_stats) = send_file(
                &session,
                state,
                config,
                CONFIG_DESTINATION_NAME,
                &self.options,
                observer,
            )
            .await?;
            state = session.exchange(next, &Command::FileDone).await?;
            stats.push(config_stats);
        }

        info!(step = "finalize", "Installing the files");
        state = session.exchange(state, &Command::Finalize).await?;

        info!(step = "terminate", "Rebooting the board");
        state = session
            .exchange(
                state,
                &Command::Terminate {
                    message: TERMINATE_MESSAGE,
                },
            )
            .await?;

        info!(board = %board.mac, "Board successfully flashed");

        Ok(SessionReport {
            session_id,
            board: board.clone(),
            started_at,
            finished_at: Utc::now(),
            files: stats,
            final_state: state,
        })
    }
}
