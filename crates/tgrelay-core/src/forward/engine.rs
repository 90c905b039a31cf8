use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    directory::ChatDirectory,
    domain::{ChatId, ChatReference, ForwardingSession, Message, MessageId},
    errors::Error,
    forward::{cursor::Cursor, retry::RetryPolicy},
    platform::ChatPlatform,
    replacements::ReplacementDictionary,
    session::SessionStore,
    transform::{SuppressReason, TextTransform, Transformed},
    utils::truncate_text,
    Result,
};

const LOG_PREVIEW_CHARS: usize = 80;

/// Everything the operator decides before forwarding starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardRequest {
    pub source: ChatId,
    pub destination: ChatId,
    pub keywords: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            poll_interval: cfg.poll_interval,
            retry: cfg.retry_policy(),
        }
    }
}

/// Running totals for one forwarding run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub polls: u64,
    pub forwarded: u64,
    pub no_text: u64,
    pub filtered_out: u64,
    pub emptied: u64,
    pub last_seen: i64,
}

impl RunReport {
    pub fn suppressed(&self) -> u64 {
        self.no_text + self.filtered_out + self.emptied
    }

    fn count_suppressed(&mut self, reason: SuppressReason) {
        match reason {
            SuppressReason::NoText => self.no_text += 1,
            SuppressReason::FilteredOut => self.filtered_out += 1,
            SuppressReason::EmptiedByReplacement => self.emptied += 1,
        }
    }
}

/// Outcome of one fetch + send pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: Vec<(MessageId, String)>,
    pub suppressed: Vec<(MessageId, SuppressReason)>,
    pub last_seen: MessageId,
}

/// Poll-based relay from one chat to another.
///
/// Lifecycle: [`start`](Self::start) resolves both chats, seeds the cursor
/// and records the pair for `resume`; [`run`](Self::run) then alternates
/// polling and pacing until cancelled or a platform call fails for good.
pub struct ForwardingEngine {
    platform: Arc<dyn ChatPlatform>,
    source: ChatReference,
    destination: ChatReference,
    transform: TextTransform,
    cursor: Cursor,
    opts: EngineOptions,
    report: RunReport,
}

impl ForwardingEngine {
    pub async fn start(
        directory: &ChatDirectory,
        sessions: &SessionStore,
        rules: &ReplacementDictionary,
        req: ForwardRequest,
        opts: EngineOptions,
    ) -> Result<Self> {
        // Compile rules before touching the network so a bad dictionary fails fast.
        let transform = TextTransform::new(&req.keywords, rules)?;

        let source = directory.resolve(req.source).await?;
        let destination = directory.resolve(req.destination).await?;
        tracing::info!(
            "Forwarding messages from '{}' ({}) to '{}' ({})",
            source.title,
            source.id,
            destination.title,
            destination.id
        );

        let platform = directory.platform();
        let newest = platform.recent_message(source.id).await?;
        let cursor = Cursor::seeded(newest.map(|m| m.id));

        sessions.save(ForwardingSession {
            source: source.id,
            destination: destination.id,
        })?;

        tracing::info!(
            cursor = cursor.last_seen().0,
            keywords = ?transform.keywords(),
            rules = rules.len(),
            "forwarding initialised"
        );

        Ok(Self {
            platform,
            source,
            destination,
            transform,
            cursor,
            opts,
            report: RunReport {
                started_at: Utc::now(),
                last_seen: cursor.last_seen().0,
                ..Default::default()
            },
        })
    }

    pub fn source(&self) -> &ChatReference {
        &self.source
    }

    pub fn destination(&self) -> &ChatReference {
        &self.destination
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Poll until `cancel` fires. A platform failure that outlives the retry
    /// policy ends the run with [`Error::ForwardingAborted`].
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunReport> {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            tracing::debug!("Checking for messages and forwarding them...");
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = self.poll_once(&cancel) => res,
            };
            if let Err(e) = polled {
                return Err(self.abort(e));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.opts.poll_interval) => {}
            }
        }

        tracing::info!(
            forwarded = self.report.forwarded,
            suppressed = self.report.suppressed(),
            last_seen = self.report.last_seen,
            "forwarding stopped"
        );
        Ok(self.report)
    }

    /// Fetch everything newer than the cursor and relay it oldest-first.
    ///
    /// The cursor moves past every fetched message before its send is
    /// attempted, so a message is never considered twice even if sending it
    /// fails.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> Result<BatchReport> {
        let mut batch = self.fetch_new(cancel).await?;
        self.report.polls += 1;

        let cursor = self.cursor;
        batch.retain(|m| cursor.is_new(m.id));
        batch.sort_by_key(|m| m.id);
        batch.dedup_by_key(|m| m.id);

        let mut out = BatchReport::default();
        for msg in batch {
            let outcome = self.transform.apply(msg.text.as_deref());
            self.cursor.advance(msg.id);
            self.report.last_seen = self.cursor.last_seen().0;

            match outcome {
                Transformed::Forward(text) => {
                    self.platform.send_text(self.destination.id, &text).await?;
                    self.report.forwarded += 1;
                    tracing::info!(
                        message_id = msg.id.0,
                        text = %truncate_text(&text, LOG_PREVIEW_CHARS),
                        "message forwarded"
                    );
                    out.sent.push((msg.id, text));
                }
                Transformed::Suppressed(reason) => {
                    self.report.count_suppressed(reason);
                    tracing::debug!(
                        message_id = msg.id.0,
                        reason = reason.as_str(),
                        "message suppressed"
                    );
                    out.suppressed.push((msg.id, reason));
                }
            }
        }

        out.last_seen = self.cursor.last_seen();
        Ok(out)
    }

    async fn fetch_new(&self, cancel: &CancellationToken) -> Result<Vec<Message>> {
        let retry = self.opts.retry;
        let mut attempt = 0usize;
        loop {
            match self
                .platform
                .messages_since(self.source.id, self.cursor.last_seen())
                .await
            {
                Ok(messages) => return Ok(messages),
                Err(e) if e.is_transient() && attempt < retry.max_retries => {
                    let delay = retry.backoff(attempt);
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "fetch failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(Vec::new()),
                        _ = sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn abort(self, err: Error) -> Error {
        let last_seen = self.cursor.last_seen().0;
        tracing::error!(error = %err, last_seen, "forwarding aborted");
        Error::ForwardingAborted {
            last_seen,
            report: Box::new(self.report),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;

    const SRC: ChatId = ChatId(-100);
    const DST: ChatId = ChatId(-200);

    struct Harness {
        fake: Arc<FakePlatform>,
        sessions: SessionStore,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakePlatform::default());
        fake.add_chat(SRC, "Source");
        fake.add_chat(DST, "Destination");
        Harness {
            fake,
            sessions: SessionStore::new(dir.path().join("last_used_chats.txt")),
            _dir: dir,
        }
    }

    fn opts() -> EngineOptions {
        EngineOptions {
            poll_interval: Duration::from_millis(100),
            retry: RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(10),
                multiplier: 2,
                max_backoff: Duration::from_millis(50),
            },
        }
    }

    fn request(keywords: &[&str]) -> ForwardRequest {
        ForwardRequest {
            source: SRC,
            destination: DST,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn start(h: &Harness, keywords: &[&str], rules: &ReplacementDictionary) -> ForwardingEngine {
        let directory = ChatDirectory::new(h.fake.clone());
        ForwardingEngine::start(&directory, &h.sessions, rules, request(keywords), opts())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn start_seeds_cursor_and_persists_pair() {
        let h = harness();
        h.fake.push(SRC, 7, Some("old"));
        h.fake.push(SRC, 9, Some("older but newer id"));

        let engine = start(&h, &[], &ReplacementDictionary::new()).await;

        assert_eq!(engine.cursor().last_seen(), MessageId(9));
        assert_eq!(engine.source().title, "Source");
        assert_eq!(
            h.sessions.load().unwrap(),
            Some(ForwardingSession {
                source: SRC,
                destination: DST
            })
        );
    }

    #[tokio::test]
    async fn history_before_start_is_not_forwarded() {
        let h = harness();
        h.fake.push(SRC, 1, Some("before start"));
        let mut engine = start(&h, &[], &ReplacementDictionary::new()).await;

        let batch = engine.poll_once(&CancellationToken::new()).await.unwrap();
        assert!(batch.sent.is_empty());
        assert!(h.fake.sent_texts(DST).is_empty());
    }

    #[tokio::test]
    async fn empty_source_chat_uses_sentinel() {
        let h = harness();
        let mut engine = start(&h, &[], &ReplacementDictionary::new()).await;
        assert_eq!(engine.cursor().last_seen(), MessageId::NONE);

        h.fake.push(SRC, 1, Some("first ever"));
        let batch = engine.poll_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(batch.sent, vec![(MessageId(1), "first ever".to_string())]);
    }

    #[tokio::test]
    async fn empty_poll_on_empty_chat_reports_sentinel() {
        let h = harness();
        let mut engine = start(&h, &[], &ReplacementDictionary::new()).await;

        let batch = engine.poll_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(batch, BatchReport::default());
        assert_eq!(batch.last_seen, MessageId::NONE);
        assert_eq!(engine.report().polls, 1);
    }

    #[tokio::test]
    async fn unknown_chat_fails_start_without_saving() {
        let h = harness();
        let directory = ChatDirectory::new(h.fake.clone());
        let req = ForwardRequest {
            source: ChatId(999),
            destination: DST,
            keywords: vec![],
        };
        let err = match ForwardingEngine::start(
            &directory,
            &h.sessions,
            &ReplacementDictionary::new(),
            req,
            opts(),
        )
        .await
        {
            Ok(_) => panic!("start should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(h.sessions.load().unwrap(), None);
    }

    #[tokio::test]
    async fn end_to_end_filter_replace_and_cursor() {
        let h = harness();
        let mut rules = ReplacementDictionary::new();
        rules.insert("now", "today").unwrap();
        let mut engine = start(&h, &["sale"], &rules).await;

        h.fake.push(SRC, 10, Some("hi"));
        h.fake.push(SRC, 11, Some("SALE now"));
        h.fake.push(SRC, 12, None);

        let batch = engine.poll_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(batch.sent, vec![(MessageId(11), "SALE today".to_string())]);
        assert_eq!(
            batch.suppressed,
            vec![
                (MessageId(10), SuppressReason::FilteredOut),
                (MessageId(12), SuppressReason::NoText),
            ]
        );
        assert_eq!(engine.cursor().last_seen(), MessageId(12));
        assert_eq!(h.fake.sent_texts(DST), vec!["SALE today"]);

        let report = engine.report();
        assert_eq!(report.forwarded, 1);
        assert_eq!(report.filtered_out, 1);
        assert_eq!(report.no_text, 1);
        assert_eq!(report.last_seen, 12);
    }

    #[tokio::test]
    async fn cursor_advances_when_everything_is_suppressed() {
        let h = harness();
        let mut rules = ReplacementDictionary::new();
        rules.insert("spam", "").unwrap();
        let mut engine = start(&h, &[], &rules).await;

        h.fake.push(SRC, 5, None);
        h.fake.push(SRC, 6, Some("spam"));
        h.fake.push(SRC, 4, Some("SPAM"));

        let batch = engine.poll_once(&CancellationToken::new()).await.unwrap();
        assert!(batch.sent.is_empty());
        assert_eq!(batch.suppressed.len(), 3);
        assert_eq!(batch.suppressed[0], (MessageId(4), SuppressReason::EmptiedByReplacement));
        assert_eq!(engine.cursor().last_seen(), MessageId(6));

        // Nothing new: the next poll is a no-op and the cursor holds.
        let again = engine.poll_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(again, BatchReport {
            last_seen: MessageId(6),
            ..Default::default()
        });
    }

    #[tokio::test]
    async fn batches_are_relayed_in_chronological_order() {
        let h = harness();
        let mut engine = start(&h, &[], &ReplacementDictionary::new()).await;

        // The fake returns newest-first, like the real platform.
        for (id, text) in [(3, "c"), (1, "a"), (2, "b")] {
            h.fake.push(SRC, id, Some(text));
        }
        engine.poll_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(h.fake.sent_texts(DST), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stale_or_duplicate_ids_from_platform_are_ignored() {
        let h = harness();
        h.fake.push(SRC, 20, Some("seed"));
        let mut engine = start(&h, &[], &ReplacementDictionary::new()).await;

        h.fake.set_inclusive_fetch(true);
        h.fake.push(SRC, 21, Some("new"));
        engine.poll_once(&CancellationToken::new()).await.unwrap();
        engine.poll_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(h.fake.sent_texts(DST), vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_fetch_errors_are_retried() {
        let h = harness();
        let mut engine = start(&h, &[], &ReplacementDictionary::new()).await;

        h.fake.push(SRC, 1, Some("after hiccup"));
        h.fake.fail_fetches(2, true);
        let batch = engine.poll_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(batch.sent.len(), 1);
        // Initial attempt plus two retries.
        assert_eq!(h.fake.fetch_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abort_the_run() {
        let h = harness();
        let engine = start(&h, &[], &ReplacementDictionary::new()).await;
        h.fake.fail_fetches(10, true);

        let err = engine.run(CancellationToken::new()).await.unwrap_err();
        match err {
            Error::ForwardingAborted { source, .. } => assert!(source.is_transient()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.fake.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn permanent_fetch_errors_are_not_retried() {
        let h = harness();
        let mut engine = start(&h, &[], &ReplacementDictionary::new()).await;
        h.fake.fail_fetches(1, false);

        assert!(engine.poll_once(&CancellationToken::new()).await.is_err());
        assert_eq!(h.fake.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn send_failure_aborts_with_cursor_past_failed_message() {
        let h = harness();
        let engine = start(&h, &[], &ReplacementDictionary::new()).await;

        h.fake.push(SRC, 1, Some("ok"));
        h.fake.push(SRC, 2, Some("boom"));
        h.fake.push(SRC, 3, Some("never sent"));
        h.fake.fail_send_containing("boom");

        let err = engine.run(CancellationToken::new()).await.unwrap_err();
        match err {
            Error::ForwardingAborted {
                last_seen, report, ..
            } => {
                assert_eq!(last_seen, 2);
                assert_eq!(report.forwarded, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.fake.sent_texts(DST), vec!["ok"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_run_with_report() {
        let h = harness();
        let engine = start(&h, &[], &ReplacementDictionary::new()).await;
        h.fake.push(SRC, 1, Some("one"));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(engine.run(cancel.clone()));

        // Let a couple of poll cycles pass.
        sleep(Duration::from_millis(250)).await;
        h.fake.push(SRC, 2, Some("two"));
        sleep(Duration::from_millis(250)).await;
        cancel.cancel();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.forwarded, 2);
        assert!(report.polls >= 2);
        assert_eq!(report.last_seen, 2);
        assert_eq!(h.fake.sent_texts(DST), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn already_cancelled_token_returns_immediately() {
        let h = harness();
        let engine = start(&h, &[], &ReplacementDictionary::new()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = engine.run(cancel).await.unwrap();
        assert_eq!(report.polls, 0);
        assert_eq!(h.fake.fetch_calls(), 0);
    }
}
