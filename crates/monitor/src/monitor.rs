//! The polling control loop.
//!
//! One cooperative task alternates between waiting out the poll interval
//! and running a cycle: fetch, classify, recover if the session expired,
//! detect changes, notify. Recovery runs in-line and blocks the loop; a
//! successful recovery is followed by an immediate re-fetch with no
//! intervening wait.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ucas_client::auth::AuthError;
use ucas_client::track::TrackError;

use crate::notify::Notifier;
use crate::recovery::Recovery;
use crate::tracker::{OfferChange, OfferTracker};

/// Stored sign-in state: the cookie string the status query needs, plus
/// the credentials that allow minting a fresh one when it expires.
///
/// The cookie string is only ever replaced wholesale, never patched.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub cookies: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn can_reauthenticate(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[async_trait]
pub trait OfferSource: Send + Sync {
    async fn offer_count(&self, cookie_header: &str) -> Result<u64, TrackError>;
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<String, AuthError>;
}

/// Persists a refreshed cookie string. Failures are logged, never fatal.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn persist(&self, cookies: &str) -> std::io::Result<()>;
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("session expired and no credentials are stored")]
    CredentialsMissing,
    #[error("re-login failed {attempts} times in a row")]
    RecoveryExhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Wait between poll cycles.
    pub interval: Duration,
    /// Consecutive re-login attempts before giving up.
    pub max_login_retries: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_login_retries: 2,
        }
    }
}

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A count was read (and any change dispatched).
    Observed,
    /// The fetch failed for a transient reason; nothing changed.
    Transient,
    /// The session expired and was refreshed; re-fetch without waiting.
    Recovered,
}

pub struct Monitor<S, A, N, P> {
    source: S,
    auth: A,
    notifier: N,
    store: P,
    config: MonitorConfig,
    credentials: Credentials,
    tracker: OfferTracker,
    recovery: Recovery,
}

impl<S, A, N, P> Monitor<S, A, N, P>
where
    S: OfferSource,
    A: Authenticator,
    N: Notifier,
    P: SessionStore,
{
    pub fn new(
        source: S,
        auth: A,
        notifier: N,
        store: P,
        credentials: Credentials,
        config: MonitorConfig,
    ) -> Self {
        let recovery = Recovery::new(config.max_login_retries);
        Self {
            source,
            auth,
            notifier,
            store,
            config,
            credentials,
            tracker: OfferTracker::default(),
            recovery,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn last_observed(&self) -> Option<u64> {
        self.tracker.last()
    }

    /// Poll until cancelled or a terminal failure.
    pub async fn run(&mut self, token: CancellationToken) -> Result<(), MonitorError> {
        loop {
            if token.is_cancelled() {
                info!("monitor stopped");
                return Ok(());
            }

            match self.poll_once().await? {
                // Fresh cookies: re-fetch immediately, no wait in between.
                CycleOutcome::Recovered => continue,
                CycleOutcome::Observed | CycleOutcome::Transient => {}
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!("monitor stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// Run one poll cycle: fetch, classify, recover or observe.
    pub async fn poll_once(&mut self) -> Result<CycleOutcome, MonitorError> {
        match self.source.offer_count(&self.credentials.cookies).await {
            Ok(count) => {
                self.observe(count).await;
                Ok(CycleOutcome::Observed)
            }
            Err(TrackError::AuthExpired) => {
                warn!("status query rejected the session cookies");
                self.recover().await?;
                Ok(CycleOutcome::Recovered)
            }
            Err(err) => {
                warn!(error = %err, "status query failed; retrying next cycle");
                Ok(CycleOutcome::Transient)
            }
        }
    }

    async fn observe(&mut self, count: u64) {
        let first = self.tracker.last().is_none();
        match self.tracker.observe(count) {
            Some(change) => {
                info!(
                    previous = change.previous,
                    current = change.current,
                    "offer count changed"
                );
                let (title, message) = change_notification(&change);
                if !self.notifier.notify(&title, &message).await {
                    warn!("change notification was not delivered");
                }
            }
            None if first => info!(count, "baseline offer count recorded"),
            None => debug!(count, "offer count unchanged"),
        }
    }

    /// Re-run the sign-in exchange, bounded by the retry budget. Attempts
    /// run back to back; the budget check happens before each one.
    async fn recover(&mut self) -> Result<(), MonitorError> {
        if !self.credentials.can_reauthenticate() {
            let message =
                "Session cookies expired and no username/password is stored; sign in again manually.";
            warn!("{message}");
            self.notifier.notify("UCAS session expired", message).await;
            return Err(MonitorError::CredentialsMissing);
        }

        let username = self.credentials.username.clone().unwrap_or_default();
        let password = self.credentials.password.clone().unwrap_or_default();

        loop {
            let Some(attempt) = self.recovery.begin_attempt() else {
                let attempts = self.recovery.max_attempts();
                let message =
                    format!("Re-login failed {attempts} times in a row; check the account manually.");
                warn!("{message}");
                self.notifier.notify("UCAS re-login failed", &message).await;
                return Err(MonitorError::RecoveryExhausted { attempts });
            };

            info!(attempt, "session expired; attempting re-login");
            match self.auth.login(&username, &password).await {
                Ok(cookies) => {
                    self.credentials.cookies = cookies;
                    if let Err(err) = self.store.persist(&self.credentials.cookies).await {
                        warn!(error = %err, "failed to persist the refreshed session");
                    }
                    self.recovery.record_success();
                    info!("re-login succeeded; resuming monitoring");
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, attempt, "re-login attempt failed");
                }
            }
        }
    }
}

fn change_notification(change: &OfferChange) -> (String, String) {
    if change.is_increase() {
        (
            "New UCAS offer".to_owned(),
            format!(
                "{} new offer(s), {} in total. Check UCAS Hub!",
                change.delta(),
                change.current
            ),
        )
    } else {
        (
            "UCAS offers changed".to_owned(),
            format!(
                "Offer count changed from {} to {}",
                change.previous, change.current
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedSource {
        script: Mutex<VecDeque<Result<u64, TrackError>>>,
        fetches: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<u64, TrackError>>) -> (Self, Arc<AtomicUsize>) {
            let fetches = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    script: Mutex::new(script.into()),
                    fetches: fetches.clone(),
                },
                fetches,
            )
        }
    }

    #[async_trait]
    impl OfferSource for ScriptedSource {
        async fn offer_count(&self, _cookie_header: &str) -> Result<u64, TrackError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("fetch past the scripted outcomes")
        }
    }

    struct ScriptedAuth {
        script: Mutex<VecDeque<Result<String, AuthError>>>,
        logins: Arc<AtomicUsize>,
    }

    impl ScriptedAuth {
        fn new(script: Vec<Result<String, AuthError>>) -> (Self, Arc<AtomicUsize>) {
            let logins = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    script: Mutex::new(script.into()),
                    logins: logins.clone(),
                },
                logins,
            )
        }

        fn unused() -> Self {
            Self::new(Vec::new()).0
        }
    }

    #[async_trait]
    impl Authenticator for ScriptedAuth {
        async fn login(&self, _username: &str, _password: &str) -> Result<String, AuthError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("login past the scripted outcomes")
        }
    }

    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl RecordingNotifier {
        fn new() -> (Self, Arc<Mutex<Vec<(String, String)>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (Self { sent: sent.clone() }, sent)
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, title: &str, message: &str) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push((title.to_owned(), message.to_owned()));
            true
        }
    }

    struct RecordingStore {
        saved: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingStore {
        fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
            let saved = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    saved: saved.clone(),
                },
                saved,
            )
        }
    }

    #[async_trait]
    impl SessionStore for RecordingStore {
        async fn persist(&self, cookies: &str) -> std::io::Result<()> {
            self.saved.lock().unwrap().push(cookies.to_owned());
            Ok(())
        }
    }

    fn credentials_with_login() -> Credentials {
        Credentials {
            cookies: "stale=1".to_owned(),
            username: Some("alice".to_owned()),
            password: Some("pw".to_owned()),
        }
    }

    fn cookie_only_credentials() -> Credentials {
        Credentials {
            cookies: "stale=1".to_owned(),
            username: None,
            password: None,
        }
    }

    fn config(max_login_retries: u32) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(60),
            max_login_retries,
        }
    }

    #[tokio::test]
    async fn first_reading_sets_the_baseline_without_notifying() {
        let (source, _) = ScriptedSource::new(vec![Ok(3)]);
        let (notifier, sent) = RecordingNotifier::new();
        let (store, _) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            ScriptedAuth::unused(),
            notifier,
            store,
            cookie_only_credentials(),
            config(2),
        );

        assert_eq!(monitor.poll_once().await.unwrap(), CycleOutcome::Observed);
        assert_eq!(monitor.last_observed(), Some(3));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn an_increase_notifies_once_with_the_delta() {
        let (source, _) = ScriptedSource::new(vec![Ok(3), Ok(5), Ok(5)]);
        let (notifier, sent) = RecordingNotifier::new();
        let (store, _) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            ScriptedAuth::unused(),
            notifier,
            store,
            cookie_only_credentials(),
            config(2),
        );

        monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "New UCAS offer");
        assert!(sent[0].1.contains("2 new offer(s)"));
        assert!(sent[0].1.contains("5 in total"));
        assert_eq!(monitor.last_observed(), Some(5));
    }

    #[tokio::test]
    async fn a_decrease_notifies_with_old_and_new_values() {
        let (source, _) = ScriptedSource::new(vec![Ok(5), Ok(3)]);
        let (notifier, sent) = RecordingNotifier::new();
        let (store, _) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            ScriptedAuth::unused(),
            notifier,
            store,
            cookie_only_credentials(),
            config(2),
        );

        monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "UCAS offers changed");
        assert!(sent[0].1.contains("from 5 to 3"));
    }

    #[tokio::test]
    async fn transient_errors_change_nothing() {
        let (source, _) = ScriptedSource::new(vec![Err(TrackError::Status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        ))]);
        let (notifier, sent) = RecordingNotifier::new();
        let (store, _) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            ScriptedAuth::unused(),
            notifier,
            store,
            cookie_only_credentials(),
            config(2),
        );

        assert_eq!(monitor.poll_once().await.unwrap(), CycleOutcome::Transient);
        assert_eq!(monitor.last_observed(), None);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_failure_without_credentials_terminates_with_a_notification() {
        let (source, fetches) = ScriptedSource::new(vec![Err(TrackError::AuthExpired)]);
        let (notifier, sent) = RecordingNotifier::new();
        let (store, _) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            ScriptedAuth::unused(),
            notifier,
            store,
            cookie_only_credentials(),
            config(2),
        );

        let err = monitor.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MonitorError::CredentialsMissing));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "UCAS session expired");
    }

    #[tokio::test]
    async fn exhausted_recovery_terminates_after_the_bounded_attempts() {
        let (source, fetches) = ScriptedSource::new(vec![Err(TrackError::AuthExpired)]);
        let (auth, logins) = ScriptedAuth::new(vec![
            Err(AuthError::CredentialsRejected("error 403042".to_owned())),
            Err(AuthError::CredentialsRejected("error 403042".to_owned())),
        ]);
        let (notifier, sent) = RecordingNotifier::new();
        let (store, _) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            auth,
            notifier,
            store,
            credentials_with_login(),
            config(2),
        );

        let err = monitor.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MonitorError::RecoveryExhausted { attempts: 2 }));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(logins.load(Ordering::SeqCst), 2);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "UCAS re-login failed");
    }

    #[tokio::test]
    async fn successful_recovery_replaces_and_persists_the_session() {
        let (source, _) = ScriptedSource::new(vec![Err(TrackError::AuthExpired), Ok(4)]);
        let (auth, logins) = ScriptedAuth::new(vec![Ok("UcasIdentity=fresh".to_owned())]);
        let (notifier, sent) = RecordingNotifier::new();
        let (store, saved) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            auth,
            notifier,
            store,
            credentials_with_login(),
            config(2),
        );

        assert_eq!(monitor.poll_once().await.unwrap(), CycleOutcome::Recovered);
        assert_eq!(monitor.credentials().cookies, "UcasIdentity=fresh");
        assert_eq!(logins.load(Ordering::SeqCst), 1);
        assert_eq!(saved.lock().unwrap().len(), 1);
        assert_eq!(saved.lock().unwrap()[0], "UcasIdentity=fresh");

        // The next fetch uses the fresh session and seeds the baseline.
        assert_eq!(monitor.poll_once().await.unwrap(), CycleOutcome::Observed);
        assert_eq!(monitor.last_observed(), Some(4));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovery_success_resets_the_retry_budget() {
        let (source, _) = ScriptedSource::new(vec![
            Err(TrackError::AuthExpired),
            Err(TrackError::AuthExpired),
        ]);
        // First recovery: one failure, then success. Second recovery gets a
        // full budget again and exhausts it with two more failures.
        let (auth, logins) = ScriptedAuth::new(vec![
            Err(AuthError::LoginTokenMissing),
            Ok("fresh=1".to_owned()),
            Err(AuthError::LoginTokenMissing),
            Err(AuthError::LoginTokenMissing),
        ]);
        let (notifier, _) = RecordingNotifier::new();
        let (store, _) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            auth,
            notifier,
            store,
            credentials_with_login(),
            config(2),
        );

        assert_eq!(monitor.poll_once().await.unwrap(), CycleOutcome::Recovered);

        let err = monitor.poll_once().await.unwrap_err();
        assert!(matches!(err, MonitorError::RecoveryExhausted { attempts: 2 }));
        assert_eq!(logins.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_before_fetching() {
        let (source, fetches) = ScriptedSource::new(vec![]);
        let (notifier, _) = RecordingNotifier::new();
        let (store, _) = RecordingStore::new();
        let mut monitor = Monitor::new(
            source,
            ScriptedAuth::unused(),
            notifier,
            store,
            cookie_only_credentials(),
            config(2),
        );

        let token = CancellationToken::new();
        token.cancel();

        monitor.run(token).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }
}
