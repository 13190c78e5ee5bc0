//! Broker session lifecycle.
//!
//! A [`BrokerSession`] owns one broker connection and runs its receive loop
//! until stopped. Inbound messages go to a [`MessageHandler`] strictly in
//! arrival order. Other tasks talk to the session through a cloneable
//! [`SessionHandle`]: publishing, subscribing, observing state and stopping.
//!
//! Connection failures never end the loop. Timeouts are retried after a
//! fixed delay; anything else backs off exponentially.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::transport::{BrokerLink, EventSource, Inbound, TransportError};

/// How long a stopping session keeps polling to flush its DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Stopped,
}

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay after a connection timeout.
    pub timeout_delay: Duration,
    /// First delay after any other failure; doubles up to `max_delay`.
    pub initial_delay: Duration,
    pub max_delay: Duration,
    next_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(timeout_delay: Duration, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            timeout_delay,
            initial_delay,
            max_delay,
            next_delay: initial_delay,
        }
    }

    /// How long to wait before reconnecting after `error`.
    pub fn delay_for(&mut self, error: &TransportError) -> Duration {
        match error {
            TransportError::Timeout => self.timeout_delay,
            _ => {
                let delay = self.next_delay;
                self.next_delay = (self.next_delay * 2).min(self.max_delay);
                delay
            }
        }
    }

    /// Call once the broker accepts a connection.
    pub fn reset(&mut self) {
        self.next_delay = self.initial_delay;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(10),
            Duration::from_secs(1),
            Duration::from_secs(120),
        )
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

struct HandleInner {
    name: &'static str,
    link: Arc<dyn BrokerLink>,
    /// Serializes writes to the link.
    writer: Mutex<()>,
    shutdown: watch::Sender<bool>,
    state: watch::Sender<SessionState>,
}

/// Cloneable control surface of a session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    pub fn new(name: &'static str, link: Arc<dyn BrokerLink>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            inner: Arc::new(HandleInner {
                name,
                link,
                writer: Mutex::new(()),
                shutdown,
                state,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        self.inner.state.send_replace(state);
    }

    /// Publish one message. Concurrent callers are serialized.
    ///
    /// Failures are logged; the message is dropped.
    pub async fn publish(&self, topic: &str, payload: Bytes) {
        let _guard = self.inner.writer.lock().await;
        match self.inner.link.publish(topic, payload).await {
            Ok(()) => debug!(session = self.name(), topic = %topic, "published"),
            Err(e) => warn!(session = self.name(), topic = %topic, error = %e, "publish failed"),
        }
    }

    pub async fn subscribe(&self, topic: &str) {
        let _guard = self.inner.writer.lock().await;
        match self.inner.link.subscribe(topic).await {
            Ok(()) => info!(session = self.name(), topic = %topic, "subscribed"),
            Err(e) => error!(session = self.name(), topic = %topic, error = %e, "subscribe failed"),
        }
    }

    /// Ask the session to end and disconnect from the broker.
    ///
    /// Safe to call from any task and more than once. Never waits on the
    /// connection; the receive loop flushes the DISCONNECT on its way out.
    pub async fn stop(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        info!(session = self.name(), "stopping");
        let _guard = self.inner.writer.lock().await;
        if let Err(e) = self.inner.link.disconnect().await {
            debug!(session = self.name(), error = %e, "disconnect failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Per-session message logic.
#[async_trait]
pub trait MessageHandler: Send {
    /// Called each time the broker accepts the connection.
    async fn on_connect(&mut self, session: &SessionHandle);

    async fn on_message(&mut self, topic: &str, payload: &Bytes);
}

pub struct BrokerSession<E, H> {
    handle: SessionHandle,
    events: E,
    handler: H,
    policy: ReconnectPolicy,
}

impl<E, H> BrokerSession<E, H>
where
    E: EventSource,
    H: MessageHandler,
{
    pub fn new(handle: SessionHandle, events: E, handler: H, policy: ReconnectPolicy) -> Self {
        Self {
            handle,
            events,
            handler,
            policy,
        }
    }

    /// Run the receive loop until [`SessionHandle::stop`] is called.
    ///
    /// Consumes the session; the handler and everything it owns (its
    /// database handle included) is dropped on return.
    pub async fn run(mut self) {
        let name = self.handle.name();
        let mut shutdown = self.handle.inner.shutdown.subscribe();
        let mut connected = false;

        info!(session = name, "session started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            if !connected {
                self.handle.set_state(SessionState::Connecting);
            }

            let event = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = self.events.next() => event,
            };

            match event {
                Ok(Inbound::Connected) => {
                    connected = true;
                    self.policy.reset();
                    self.handle.set_state(SessionState::Connected);
                    info!(session = name, "connected to MQTT broker");
                    self.handler.on_connect(&self.handle).await;
                }
                Ok(Inbound::Publish { topic, payload }) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = self.handler.on_message(&topic, &payload) => {}
                    }
                }
                Ok(Inbound::Disconnected | Inbound::Other) => {}
                Err(e) => {
                    connected = false;
                    self.handle.set_state(SessionState::Disconnected);
                    let delay = self.policy.delay_for(&e);
                    error!(
                        session = name,
                        error = %e,
                        retry_in_secs = delay.as_secs_f64(),
                        "MQTT connection failed, will retry"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if connected {
            self.flush_disconnect().await;
        }
        self.handle.set_state(SessionState::Stopped);
        info!(session = name, "session stopped");
    }

    /// Poll until the DISCONNECT is out, the connection fails or the grace
    /// period ends.
    async fn flush_disconnect(&mut self) {
        let name = self.handle.name();
        let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match self.events.next().await {
                    Ok(Inbound::Disconnected) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            warn!(session = name, "DISCONNECT not flushed before shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tokio::time::Instant;

    use super::*;
    use crate::transport::testing::{ChannelEvents, RecordingLink};

    /// Every connect attempt times out.
    struct TimingOut {
        attempts: Arc<StdMutex<Vec<Instant>>>,
    }

    #[async_trait]
    impl EventSource for TimingOut {
        async fn next(&mut self) -> Result<Inbound, TransportError> {
            self.attempts.lock().unwrap().push(Instant::now());
            Err(TransportError::Timeout)
        }
    }

    /// Remembers every message it sees.
    #[derive(Clone, Default)]
    struct Collecting {
        connects: Arc<StdMutex<usize>>,
        messages: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl MessageHandler for Collecting {
        async fn on_connect(&mut self, session: &SessionHandle) {
            *self.connects.lock().unwrap() += 1;
            session.subscribe("msh/router/#").await;
        }

        async fn on_message(&mut self, topic: &str, _payload: &Bytes) {
            self.messages.lock().unwrap().push(topic.to_string());
        }
    }

    #[test]
    fn test_timeout_delay_is_fixed() {
        let mut policy = ReconnectPolicy::default();
        for _ in 0..5 {
            assert_eq!(policy.delay_for(&TransportError::Timeout), Duration::from_secs(10));
        }
    }

    #[test]
    fn test_other_failures_back_off_exponentially() {
        let mut policy = ReconnectPolicy::default();
        let refused = TransportError::Other("refused".into());
        let delays: Vec<u64> = (0..9).map(|_| policy.delay_for(&refused).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 120, 120]);

        policy.reset();
        assert_eq!(policy.delay_for(&refused), Duration::from_secs(1));
    }

    #[test]
    fn test_timeouts_do_not_advance_backoff() {
        let mut policy = ReconnectPolicy::default();
        let refused = TransportError::Closed;
        policy.delay_for(&refused);
        policy.delay_for(&TransportError::Timeout);
        assert_eq!(policy.delay_for(&refused), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_retry_every_ten_seconds_until_stopped() {
        let attempts = Arc::new(StdMutex::new(Vec::new()));
        let link = Arc::new(RecordingLink::default());
        let handle = SessionHandle::new("remote", link.clone());
        let session = BrokerSession::new(
            handle.clone(),
            TimingOut { attempts: attempts.clone() },
            Collecting::default(),
            ReconnectPolicy::default(),
        );

        let task = tokio::spawn(session.run());
        let start = Instant::now();

        tokio::time::sleep(Duration::from_secs(35)).await;
        {
            let attempts = attempts.lock().unwrap();
            assert_eq!(attempts.len(), 4);
            for (i, at) in attempts.iter().enumerate() {
                assert_eq!(*at - start, Duration::from_secs(10 * i as u64));
            }
        }

        handle.stop().await;
        task.await.unwrap();
        assert_eq!(handle.state(), SessionState::Stopped);
        assert_eq!(*link.disconnects.lock().unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(attempts.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_connect_subscribes_and_delivers_in_order() {
        let (tx, events) = ChannelEvents::new();
        let link = Arc::new(RecordingLink::with_events(tx.clone()));
        let handle = SessionHandle::new("local", link.clone());
        let handler = Collecting::default();
        let session = BrokerSession::new(
            handle.clone(),
            events,
            handler.clone(),
            ReconnectPolicy::default(),
        );
        let mut state = handle.watch_state();
        let task = tokio::spawn(session.run());

        tx.send(Ok(Inbound::Connected)).unwrap();
        for topic in ["a", "b", "c"] {
            tx.send(Ok(Inbound::Publish {
                topic: topic.into(),
                payload: Bytes::from_static(b"x"),
            }))
            .unwrap();
        }

        state
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .unwrap();
        while handler.messages.lock().unwrap().len() < 3 {
            tokio::task::yield_now().await;
        }

        handle.stop().await;
        task.await.unwrap();

        assert_eq!(*handler.connects.lock().unwrap(), 1);
        assert_eq!(*link.subscribed.lock().unwrap(), vec!["msh/router/#".to_string()]);
        assert_eq!(*handler.messages.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stop_before_run_exits_immediately() {
        let handle = SessionHandle::new("local", Arc::new(RecordingLink::default()));
        let (_tx, events) = ChannelEvents::new();
        let session = BrokerSession::new(
            handle.clone(),
            events,
            Collecting::default(),
            ReconnectPolicy::default(),
        );

        handle.stop().await;
        handle.stop().await;
        session.run().await;
        assert_eq!(handle.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_publish_goes_through_link() {
        let link = Arc::new(RecordingLink::default());
        let handle = SessionHandle::new("local", link.clone());

        let a = handle.clone();
        let b = handle.clone();
        tokio::join!(
            a.publish("msh/router/one", Bytes::from_static(b"1")),
            b.publish("msh/router/two", Bytes::from_static(b"2")),
        );

        let mut topics = link.published_topics();
        topics.sort();
        assert_eq!(topics, vec!["msh/router/one", "msh/router/two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flushes_disconnect_before_exit() {
        let (tx, events) = ChannelEvents::new();
        let link = Arc::new(RecordingLink::with_events(tx.clone()));
        let handle = SessionHandle::new("local", link.clone());
        let session = BrokerSession::new(
            handle.clone(),
            events,
            Collecting::default(),
            ReconnectPolicy::default(),
        );
        let mut state = handle.watch_state();
        let task = tokio::spawn(session.run());

        tx.send(Ok(Inbound::Connected)).unwrap();
        state
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .unwrap();

        let start = Instant::now();
        handle.stop().await;
        task.await.unwrap();

        assert!(start.elapsed() < DISCONNECT_GRACE);
        assert_eq!(*link.disconnects.lock().unwrap(), 1);
        assert_eq!(handle.state(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unflushed_disconnect_is_bounded() {
        // Link never reports the DISCONNECT and the connection stays silent.
        let link = Arc::new(RecordingLink::default());
        let handle = SessionHandle::new("local", link.clone());
        let (tx, events) = ChannelEvents::new();
        let session = BrokerSession::new(
            handle.clone(),
            events,
            Collecting::default(),
            ReconnectPolicy::default(),
        );
        let mut state = handle.watch_state();
        let task = tokio::spawn(session.run());

        tx.send(Ok(Inbound::Connected)).unwrap();
        state
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .unwrap();

        let start = Instant::now();
        handle.stop().await;
        task.await.unwrap();

        assert!(start.elapsed() >= DISCONNECT_GRACE);
        assert_eq!(handle.state(), SessionState::Stopped);
    }
}
