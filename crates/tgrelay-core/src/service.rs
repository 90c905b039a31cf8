//! Operator-facing operations: list chats, start or resume forwarding.
//!
//! Replacement management does not need the platform and goes straight
//! through [`ReplacementStore`](crate::replacements::ReplacementStore).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    directory::{merge_listing, write_listing, ChatDirectory, ChatSelector},
    domain::{ChatId, ChatReference},
    forward::{EngineOptions, ForwardRequest, ForwardingEngine, RunReport},
    platform::ChatPlatform,
    replacements::load_dictionary,
    session::SessionStore,
    Result,
};

pub struct ForwardingService {
    cfg: Arc<Config>,
    directory: ChatDirectory,
    sessions: SessionStore,
}

impl ForwardingService {
    pub fn new(cfg: Arc<Config>, platform: Arc<dyn ChatPlatform>) -> Self {
        let sessions = SessionStore::new(cfg.session_file.clone());
        let directory = ChatDirectory::new(platform).with_listing(cfg.chats_file.clone());
        Self {
            cfg,
            directory,
            sessions,
        }
    }

    /// List chats and write the listing file.
    ///
    /// The adapter only reports chats seen since its last poll, so chats from
    /// the previous listing keep their index and new ones are appended.
    pub async fn list_chats(&self) -> Result<Vec<ChatReference>> {
        let known = self.directory.saved_listing()?.unwrap_or_default();
        let chats = merge_listing(known, self.directory.list_dialogs().await?);
        write_listing(&self.cfg.chats_file, &chats)?;
        tracing::info!(
            count = chats.len(),
            path = %self.cfg.chats_file.display(),
            "chat listing written"
        );
        Ok(chats)
    }

    pub async fn resolve(&self, selector: ChatSelector) -> Result<ChatId> {
        Ok(self.directory.resolve_selector(selector).await?.id)
    }

    /// Start a new forwarding run and drive it until cancelled or aborted.
    ///
    /// The replacement dictionary is read once here; edits made while the run
    /// is active apply to the next run.
    pub async fn start_forwarding(
        &self,
        req: ForwardRequest,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let rules = load_dictionary(&self.cfg.replacements_file)?;
        let engine = ForwardingEngine::start(
            &self.directory,
            &self.sessions,
            &rules,
            req,
            EngineOptions::from(self.cfg.as_ref()),
        )
        .await?;
        engine.run(cancel).await
    }

    /// Restart forwarding for the last saved pair. `Ok(None)` when no pair
    /// was ever saved.
    pub async fn resume_last_forwarding(
        &self,
        keywords: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<Option<RunReport>> {
        let Some(last) = self.sessions.load()? else {
            tracing::info!("No previous forwarding session found.");
            return Ok(None);
        };

        let req = ForwardRequest {
            source: last.source,
            destination: last.destination,
            keywords,
        };
        self.start_forwarding(req, cancel).await.map(Some)
    }
}
