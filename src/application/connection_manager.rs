// Connection manager - supervises the backend link, reconnects with backoff and
// falls back to synthetic frames while disconnected.
use crate::application::fallback::FallbackGenerator;
use crate::application::session::{SessionHandle, SessionState};
use crate::application::transport::{Transport, TransportLink};
use crate::domain::telemetry::ControlUpdate;
use crate::infrastructure::protocol::{decode, encode_control};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

pub const BASE_DELAY: Duration = Duration::from_millis(500);
pub const MAX_DELAY: Duration = Duration::from_millis(6000);
pub const BACKOFF_CAP: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub cap: u32,
}

impl ReconnectPolicy {
    /// `min(max, base * 2^min(attempt, cap))`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(self.cap).min(31);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: BASE_DELAY,
            max: MAX_DELAY,
            cap: BACKOFF_CAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub fallback_active: bool,
    pub retry_attempt: u32,
    pub next_retry_in: Option<Duration>,
}

impl ConnectionStatus {
    fn initial() -> Self {
        Self {
            state: ConnectionState::Closed,
            fallback_active: false,
            retry_attempt: 0,
            next_retry_in: None,
        }
    }
}

/// State shared between the handle and the supervisor task.
struct Shared {
    disposed: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    status: watch::Sender<ConnectionStatus>,
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn set_outbound(&self, sender: Option<mpsc::UnboundedSender<String>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = sender;
    }
}

pub struct ConnectionManager {
    endpoint: String,
    transport: Arc<dyn Transport>,
    session: SessionHandle,
    policy: ReconnectPolicy,
    fallback: FallbackGenerator,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        session: SessionHandle,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::initial());
        let (shutdown, _) = watch::channel(false);
        Self {
            endpoint: endpoint.into(),
            transport,
            session,
            policy: ReconnectPolicy::default(),
            fallback: FallbackGenerator::default(),
            shared: Arc::new(Shared {
                disposed: AtomicBool::new(false),
                outbound: Mutex::new(None),
                status,
            }),
            shutdown,
            worker: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackGenerator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Spawns the supervisor on the current tokio runtime. Calling it again
    /// while a supervisor exists, or after `stop()`, does nothing.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() || self.shared.is_disposed() {
            return;
        }
        tracing::info!("Starting connection supervisor for {}", self.endpoint);
        let supervisor = Supervisor {
            endpoint: self.endpoint.clone(),
            transport: self.transport.clone(),
            session: self.session.clone(),
            policy: self.policy,
            fallback: self.fallback.clone(),
            shared: self.shared.clone(),
        };
        *worker = Some(tokio::spawn(supervisor.run(self.shutdown.subscribe())));
    }

    /// Tears the connection down: no timer fires and no frame is applied after
    /// this returns. Safe to call more than once.
    pub async fn stop(&self) {
        {
            // Taking the write lock orders this against any in-flight mutation.
            let _session = self.session.write();
            if self.shared.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        self.shared.set_outbound(None);
        self.shutdown.send_replace(true);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!("Connection supervisor ended abnormally: {}", err);
                }
            }
        }
        self.shared.status.send_modify(|status| {
            status.state = ConnectionState::Closed;
            status.fallback_active = false;
            status.next_retry_in = None;
        });
        tracing::info!("Connection to {} torn down", self.endpoint);
    }

    /// Best-effort send of a tuning update. Returns `false` unless a link is
    /// open right now; nothing is queued for a later link.
    pub fn send_control(&self, update: &ControlUpdate) -> bool {
        let payload = match encode_control(update) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("Could not encode control update: {}", err);
                return false;
            }
        };
        let outbound = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(sender) => sender.send(payload).is_ok(),
            None => false,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status().state == ConnectionState::Open
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.disposed.store(true, Ordering::Release);
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            handle.abort();
        }
    }
}

enum LinkEnd {
    Closed,
    Shutdown,
}

struct Supervisor {
    endpoint: String,
    transport: Arc<dyn Transport>,
    session: SessionHandle,
    policy: ReconnectPolicy,
    fallback: FallbackGenerator,
    shared: Arc<Shared>,
}

impl Supervisor {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        let mut fallback_timer = Some(self.fallback_interval());

        loop {
            if self.shared.is_disposed() {
                break;
            }
            self.publish(ConnectionState::Connecting, attempt, true, None);

            let transport = self.transport.clone();
            let endpoint = self.endpoint.clone();
            let connect = async move { transport.connect(&endpoint).await };
            tokio::pin!(connect);

            let connected = loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return,
                    result = &mut connect => break result,
                    _ = next_tick(&mut fallback_timer) => self.emit_fallback(),
                }
            };

            match connected {
                Ok(mut link) => {
                    attempt = 0;
                    fallback_timer = None;
                    let (tx, rx) = mpsc::unbounded_channel();
                    if self.mutate(|session| session.set_link_up()).is_none() {
                        link.close().await;
                        return;
                    }
                    self.shared.set_outbound(Some(tx));
                    self.publish(ConnectionState::Open, 0, false, None);
                    tracing::info!("Connected to {}", self.endpoint);

                    let end = self.pump(&mut *link, rx, &mut shutdown).await;
                    self.shared.set_outbound(None);
                    if let LinkEnd::Shutdown = end {
                        return;
                    }
                    tracing::warn!("Link to {} closed", self.endpoint);
                }
                Err(err) => {
                    tracing::warn!("{}", err);
                }
            }

            if self.mutate(|session| session.set_link_down()).is_none() {
                return;
            }
            if fallback_timer.is_none() {
                tracing::info!("Backend unreachable, serving synthetic telemetry");
                fallback_timer = Some(self.fallback_interval());
            }

            attempt = attempt.saturating_add(1);
            let delay = self.policy.delay_for_attempt(attempt);
            self.publish(ConnectionState::Closed, attempt, true, Some(delay));
            tracing::debug!("Reconnect attempt {} in {:?}", attempt, delay);

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return,
                    _ = &mut sleep => break,
                    _ = next_tick(&mut fallback_timer) => self.emit_fallback(),
                }
            }
        }
    }

    async fn pump(
        &self,
        link: &mut dyn TransportLink,
        mut outbound: mpsc::UnboundedReceiver<String>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> LinkEnd {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    link.close().await;
                    return LinkEnd::Shutdown;
                }
                Some(payload) = outbound.recv() => {
                    if let Err(err) = link.send_text(payload).await {
                        tracing::warn!("Control send failed: {}", err);
                        link.close().await;
                        return LinkEnd::Closed;
                    }
                }
                frame = link.next_frame() => match frame {
                    Some(Ok(text)) => {
                        if self.ingest(&text).is_none() {
                            link.close().await;
                            return LinkEnd::Shutdown;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!("Transport error: {}", err);
                        link.close().await;
                        return LinkEnd::Closed;
                    }
                    None => return LinkEnd::Closed,
                },
            }
        }
    }

    /// Returns `None` once the manager has been disposed.
    fn ingest(&self, text: &str) -> Option<()> {
        match decode(text) {
            Ok(message) => self.mutate(|session| {
                session.apply(message);
            }),
            Err(err) => {
                tracing::debug!("Dropping frame: {}", err);
                self.mutate(|_| ())
            }
        }
    }

    fn emit_fallback(&mut self) {
        let frames = self.fallback.frames(chrono::Utc::now().timestamp_millis());
        self.mutate(|session| {
            for frame in frames {
                session.apply(frame);
            }
        });
    }

    /// Runs `edit` under the session write lock unless teardown already happened.
    fn mutate<R>(&self, edit: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let mut session = self.session.write();
        if self.shared.is_disposed() {
            return None;
        }
        Some(edit(&mut session))
    }

    fn fallback_interval(&self) -> Interval {
        let mut interval = tokio::time::interval(self.fallback.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    fn publish(
        &self,
        state: ConnectionState,
        retry_attempt: u32,
        fallback_active: bool,
        next_retry_in: Option<Duration>,
    ) {
        if self.shared.is_disposed() {
            return;
        }
        self.shared.status.send_replace(ConnectionStatus {
            state,
            fallback_active,
            retry_attempt,
            next_retry_in,
        });
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fallback::FALLBACK_SERIES;
    use crate::application::transport::TransportError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    struct ChannelLink {
        inbound: mpsc::UnboundedReceiver<String>,
        sent: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl TransportLink for ChannelLink {
        async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.sent.send(text).map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) {
            self.inbound.close();
        }
    }

    /// Hands out prepared links in order, refusing once they run out.
    #[derive(Default)]
    struct ScriptedTransport {
        links: Mutex<VecDeque<ChannelLink>>,
        attempts: AtomicUsize,
        connect_delay: Duration,
    }

    impl ScriptedTransport {
        /// Queues a link; returns the backend's ends (frames in, frames out).
        fn push_link(&self) -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
            let (frames_tx, frames_rx) = mpsc::unbounded_channel();
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            self.links.lock().unwrap().push_back(ChannelLink {
                inbound: frames_rx,
                sent: sent_tx,
            });
            (frames_tx, sent_rx)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&self, endpoint: &str) -> Result<Box<dyn TransportLink>, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            match self.links.lock().unwrap().pop_front() {
                Some(link) => Ok(Box::new(link)),
                None => Err(TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    fn build_manager(transport: Arc<ScriptedTransport>) -> (ConnectionManager, SessionHandle) {
        let session = SessionHandle::default();
        let manager = ConnectionManager::new("ws://test/ws", transport, session.clone());
        (manager, session)
    }

    #[test]
    fn test_backoff_sequence() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| policy.delay_for_attempt(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 6000, 6000]);
        assert_eq!(policy.delay_for_attempt(0), BASE_DELAY);
        assert_eq!(policy.delay_for_attempt(u32::MAX), MAX_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_backend_serves_fallback_and_retries() {
        let transport = Arc::new(ScriptedTransport::default());
        let (manager, session) = build_manager(transport.clone());
        let mut status = manager.subscribe_status();
        manager.start();
        manager.start();

        let seen = status.wait_for(|s| s.retry_attempt >= 3).await.unwrap().clone();
        assert_eq!(seen.state, ConnectionState::Closed);
        assert!(seen.fallback_active);
        assert_eq!(seen.next_retry_in, Some(Duration::from_millis(4000)));
        // attempts at 0, 1000 and 3000 ms; a second supervisor would double these
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);

        {
            let session = session.read();
            assert!(!session.is_connected());
            assert_eq!(session.catalog().len(), FALLBACK_SERIES.len());
            assert!(!session.series().points("ekf_x").is_empty());
            assert!(session.map().revision() > 0);
        }

        // next attempt is due 4000 ms later, the one after that 6000 ms on
        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 4);
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_stops_once_link_opens() {
        let transport = Arc::new(ScriptedTransport {
            connect_delay: Duration::from_millis(100),
            ..Default::default()
        });
        let (_backend_tx, _backend_rx) = transport.push_link();
        let (manager, session) = build_manager(transport.clone());
        let mut status = manager.subscribe_status();
        manager.start();

        status
            .wait_for(|s| s.state == ConnectionState::Open)
            .await
            .unwrap();
        assert!(!manager.status().fallback_active);
        let at_open = session.read().series().points("fps").len();
        assert!(at_open > 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(session.read().series().points("fps").len(), at_open);
        assert_eq!(manager.status().state, ConnectionState::Open);
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_link_routes_frames_and_controls() {
        let transport = Arc::new(ScriptedTransport::default());
        let (backend_tx, mut backend_rx) = transport.push_link();
        let (manager, session) = build_manager(transport.clone());
        let mut status = manager.subscribe_status();

        assert!(!manager.send_control(&ControlUpdate::default()));
        manager.start();
        status
            .wait_for(|s| s.state == ConnectionState::Open)
            .await
            .unwrap();
        assert!(!manager.status().fallback_active);
        assert!(session.read().is_connected());
        assert!(session.read().status().current().backend_connected);

        backend_tx
            .send(r#"{"type":"data","timestamp":1000,"series":{"ekf_x":3.2}}"#.to_string())
            .unwrap();
        backend_tx.send("{broken".to_string()).unwrap();
        backend_tx
            .send(r#"{"type":"data","timestamp":1001,"series":{"ekf_x":3.3}}"#.to_string())
            .unwrap();

        let update = ControlUpdate {
            pid_p: Some(1.25),
            ..Default::default()
        };
        assert!(manager.send_control(&update));
        assert_eq!(backend_rx.recv().await.unwrap(), r#"{"pid_p":1.25}"#);

        // controls are served ahead of inbound frames; let the frames drain
        tokio::time::sleep(Duration::from_millis(10)).await;
        let timestamps: Vec<i64> = session
            .read()
            .series()
            .points("ekf_x")
            .iter()
            .map(|p| p.timestamp)
            .collect();
        assert_eq!(timestamps, vec![1000, 1001]);

        // backend goes away
        drop(backend_tx);
        let seen = status
            .wait_for(|s| s.state == ConnectionState::Closed)
            .await
            .unwrap()
            .clone();
        assert_eq!(seen.retry_attempt, 1);
        assert_eq!(seen.next_retry_in, Some(Duration::from_millis(1000)));
        assert!(seen.fallback_active);
        assert!(!manager.send_control(&update));
        {
            let session = session.read();
            assert!(!session.is_connected());
            assert!(!session.status().current().backend_connected);
            assert!(!session.status().current().shm_active);
        }
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_counter_resets_after_success() {
        let transport = Arc::new(ScriptedTransport::default());
        let (manager, _session) = build_manager(transport.clone());
        let mut status = manager.subscribe_status();
        manager.start();

        status.wait_for(|s| s.retry_attempt >= 2).await.unwrap();
        let (backend_tx, _backend_rx) = transport.push_link();
        let seen = status
            .wait_for(|s| s.state == ConnectionState::Open)
            .await
            .unwrap()
            .clone();
        assert_eq!(seen.retry_attempt, 0);

        drop(backend_tx);
        let seen = status
            .wait_for(|s| s.state == ConnectionState::Closed)
            .await
            .unwrap()
            .clone();
        assert_eq!(seen.retry_attempt, 1);
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_freezes_state() {
        let transport = Arc::new(ScriptedTransport::default());
        let (backend_tx, _backend_rx) = transport.push_link();
        let (manager, session) = build_manager(transport.clone());
        let mut status = manager.subscribe_status();
        manager.start();
        status
            .wait_for(|s| s.state == ConnectionState::Open)
            .await
            .unwrap();

        manager.stop().await;
        manager.stop().await;
        assert_eq!(manager.status().state, ConnectionState::Closed);
        assert!(!manager.send_control(&ControlUpdate::default()));

        // frames queued after teardown never land
        let _ = backend_tx.send(r#"{"type":"data","timestamp":5,"series":{"fps":1}}"#.to_string());
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert!(session.read().series().points("fps").is_empty());
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);

        // a disposed manager does not come back
        manager.start();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_backoff_halts_fallback() {
        let transport = Arc::new(ScriptedTransport::default());
        let (manager, session) = build_manager(transport.clone());
        let mut status = manager.subscribe_status();
        manager.start();
        status.wait_for(|s| s.retry_attempt >= 1).await.unwrap();

        assert!(manager.status().fallback_active);
        manager.stop().await;
        let stopped = manager.status();
        assert_eq!(stopped.state, ConnectionState::Closed);
        assert!(!stopped.fallback_active);
        assert_eq!(stopped.next_retry_in, None);
        let before = session.read().series().points("fps").len();
        let attempts = transport.attempts.load(Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(session.read().series().points("fps").len(), before);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), attempts);
    }
}
