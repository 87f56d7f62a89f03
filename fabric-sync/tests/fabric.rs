//! End-to-end fabric tests over the in-process transport (plus one TCP
//! pass): handshake, delivery, coalescing, echo suppression, disconnect
//! cleanup, and duplicate-peer displacement.

use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use fabric_sync::transport::mem;
use fabric_sync::transport::tcp::{TcpAcceptor, TcpConnector};
use fabric_sync::transport::Connector;
use fabric_sync::{
    serve, ComponentId, Frame, Join, MessageBatch, NodeId, Receiver, Reporter, SyncConfig,
    SyncMessage, Syncer, PROTOCOL_VERSION,
};

const RM: ComponentId = ComponentId::RESOURCE_MANAGER;

fn node(name: &str) -> NodeId {
    NodeId::from_name(name).unwrap()
}

fn test_config() -> SyncConfig {
    SyncConfig::default().with_cooldown_ms(10)
}

fn message(origin: &str, version: u64, payload: &str) -> SyncMessage {
    SyncMessage {
        origin: node(origin),
        component: RM,
        version,
        payload: Bytes::from(payload.to_string()),
    }
}

/// A reporter whose current snapshot is set from the test.
struct ScriptedReporter {
    origin: NodeId,
    component: ComponentId,
    state: Arc<Mutex<(u64, Bytes)>>,
}

/// Test-side handle publishing new snapshot versions.
#[derive(Clone)]
struct Publisher {
    state: Arc<Mutex<(u64, Bytes)>>,
}

impl Publisher {
    fn publish(&self, version: u64, payload: &str) {
        *self.state.lock().unwrap() = (version, Bytes::from(payload.to_string()));
    }
}

fn scripted_reporter(
    origin: NodeId,
    component: ComponentId,
    version: u64,
    payload: &str,
) -> (ScriptedReporter, Publisher) {
    let state = Arc::new(Mutex::new((version, Bytes::from(payload.to_string()))));
    (
        ScriptedReporter {
            origin,
            component,
            state: state.clone(),
        },
        Publisher { state },
    )
}

impl Reporter for ScriptedReporter {
    fn snapshot(&self) -> SyncMessage {
        let (version, payload) = self.state.lock().unwrap().clone();
        SyncMessage {
            origin: self.origin.clone(),
            component: self.component,
            version,
            payload,
        }
    }
}

/// Records every delivered message.
#[derive(Clone, Default)]
struct Capture {
    seen: Arc<Mutex<Vec<SyncMessage>>>,
}

impl Capture {
    fn receiver(&self) -> Box<dyn Receiver> {
        Box::new(CaptureReceiver(self.clone()))
    }

    fn all(&self) -> Vec<SyncMessage> {
        self.seen.lock().unwrap().clone()
    }

    fn versions(&self) -> Vec<u64> {
        self.all().iter().map(|m| m.version).collect()
    }

    fn last_version(&self) -> Option<u64> {
        self.versions().last().copied()
    }

    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

struct CaptureReceiver(Capture);

impl Receiver for CaptureReceiver {
    fn update(&mut self, message: &SyncMessage) {
        self.0.seen.lock().unwrap().push(message.clone());
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn snapshot_flows_from_follower_to_hub() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));
    let capture = Capture::default();
    hub.register(RM, None, Some(capture.receiver()));

    let (acceptor, connector) = mem::listener();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    let follower = Syncer::new(node("a"), test_config());
    let (reporter, _publisher) = scripted_reporter(node("a"), RM, 1, "a1");
    follower.register(RM, Some(Box::new(reporter)), None);

    let hub_id = follower.follow(&connector).await.unwrap();
    assert_eq!(hub_id, node("hub"));

    wait_until("hub receiver sees v1", || capture.last_version() == Some(1)).await;

    let delivered = capture.all();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].origin, node("a"));
    assert_eq!(delivered[0].component, RM);
    assert_eq!(delivered[0].payload, Bytes::from_static(b"a1"));

    // An unchanged snapshot is never re-delivered.
    sleep(Duration::from_millis(80)).await;
    assert_eq!(capture.count(), 1);

    follower.shutdown().await;
    serve_task.abort();
    hub.shutdown().await;
}

#[tokio::test]
async fn rapid_versions_coalesce_to_newest() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));
    let capture = Capture::default();
    hub.register(RM, None, Some(capture.receiver()));

    let (acceptor, connector) = mem::listener();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    let follower = Syncer::new(node("a"), test_config());
    let (reporter, publisher) = scripted_reporter(node("a"), RM, 1, "a1");
    follower.register(RM, Some(Box::new(reporter)), None);
    follower.follow(&connector).await.unwrap();

    publisher.publish(2, "a2");
    publisher.publish(3, "a3");

    wait_until("hub receiver reaches v3", || capture.last_version() == Some(3)).await;

    // Intermediate versions may be skipped, but never reordered.
    let versions = capture.versions();
    assert!(versions.windows(2).all(|w| w[0] < w[1]), "{versions:?}");
    assert_eq!(*versions.last().unwrap(), 3);

    follower.shutdown().await;
    serve_task.abort();
    hub.shutdown().await;
}

#[tokio::test]
async fn hub_relays_between_followers_without_echo() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));
    let capture_hub = Capture::default();
    hub.register(RM, None, Some(capture_hub.receiver()));

    let (acceptor, connector) = mem::listener();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    // A produces and also consumes the same component.
    let a = Syncer::new(node("a"), test_config());
    let capture_a = Capture::default();
    let (reporter, _publisher) = scripted_reporter(node("a"), RM, 5, "a5");
    a.register(RM, Some(Box::new(reporter)), Some(capture_a.receiver()));

    let c = Syncer::new(node("c"), test_config());
    let capture_c = Capture::default();
    c.register(RM, None, Some(capture_c.receiver()));

    a.follow(&connector).await.unwrap();
    c.follow(&connector).await.unwrap();

    wait_until("c sees a's snapshot", || capture_c.last_version() == Some(5)).await;
    assert_eq!(capture_c.all()[0].origin, node("a"));
    assert_eq!(capture_hub.last_version(), Some(5));

    // The producer never hears its own snapshot back.
    sleep(Duration::from_millis(80)).await;
    assert_eq!(capture_a.count(), 0);

    a.shutdown().await;
    c.shutdown().await;
    serve_task.abort();
    hub.shutdown().await;
}

#[tokio::test]
async fn stale_update_is_not_delivered() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));

    let (acceptor, connector) = mem::listener();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    let follower = Syncer::new(node("a"), test_config());
    let capture = Capture::default();
    follower.register(RM, None, Some(capture.receiver()));
    follower.follow(&connector).await.unwrap();

    // Injected as if relayed from some node x on behalf of origin z.
    hub.update(node("x"), message("z", 5, "z5"));
    wait_until("follower sees v5", || capture.last_version() == Some(5)).await;

    hub.update(node("x"), message("z", 4, "z4"));
    sleep(Duration::from_millis(80)).await;
    assert_eq!(capture.versions(), vec![5]);

    follower.shutdown().await;
    serve_task.abort();
    hub.shutdown().await;
}

#[tokio::test]
async fn disconnect_cleans_up_hub_state() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));
    let capture = Capture::default();
    hub.register(RM, None, Some(capture.receiver()));

    let (acceptor, connector) = mem::listener();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    let follower = Syncer::new(node("a"), test_config());
    let (reporter, _publisher) = scripted_reporter(node("a"), RM, 1, "a1");
    follower.register(RM, Some(Box::new(reporter)), None);
    follower.follow(&connector).await.unwrap();

    wait_until("hub sees the follower's snapshot", || {
        capture.last_version() == Some(1)
    })
    .await;
    assert_eq!(hub.peers().await, vec![node("a")]);

    follower.shutdown().await;

    let deadline = Instant::now() + Duration::from_secs(2);
    while !hub.peers().await.is_empty() {
        assert!(Instant::now() < deadline, "hub never dropped the peer");
        sleep(Duration::from_millis(5)).await;
    }

    // New state accumulates no queue entries for the departed viewer.
    hub.update(node("hub"), message("hub", 9, "h9"));
    let diagnostics = hub.diagnostics().await;
    assert!(diagnostics.viewers.is_empty(), "{diagnostics}");

    serve_task.abort();
    hub.shutdown().await;
}

#[tokio::test]
async fn reconnect_displaces_and_gets_a_full_refresh() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));
    let (reporter, _publisher) = scripted_reporter(node("hub"), RM, 1, "h1");
    hub.register(RM, Some(Box::new(reporter)), None);

    let (acceptor, connector) = mem::listener();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    let first = Syncer::new(node("a"), test_config());
    let capture_first = Capture::default();
    first.register(RM, None, Some(capture_first.receiver()));
    first.follow(&connector).await.unwrap();
    wait_until("first link sees hub state", || {
        capture_first.last_version() == Some(1)
    })
    .await;

    // Same node id reconnects while the old reactor is still registered.
    let second = Syncer::new(node("a"), test_config());
    let capture_second = Capture::default();
    second.register(RM, None, Some(capture_second.receiver()));
    second.follow(&connector).await.unwrap();

    // The replacement link gets the full current state on its first tick
    // even though no version changed.
    wait_until("second link is refreshed", || {
        capture_second.last_version() == Some(1)
    })
    .await;
    assert_eq!(hub.peers().await, vec![node("a")]);

    // The displaced follower's own link winds down too.
    let deadline = Instant::now() + Duration::from_secs(2);
    while !first.peers().await.is_empty() {
        assert!(Instant::now() < deadline, "displaced link never closed");
        sleep(Duration::from_millis(5)).await;
    }

    first.shutdown().await;
    second.shutdown().await;
    serve_task.abort();
    hub.shutdown().await;
}

#[tokio::test]
async fn stream_without_join_is_rejected() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));
    let (acceptor, connector) = mem::listener();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    let (mut sender, mut receiver) = connector.connect().await.unwrap();
    let batch = Frame::Batch(MessageBatch::default());
    sender.send(&batch.to_bytes().unwrap()).await.unwrap();

    // The hub drops the stream without a welcome and creates no reactor.
    assert!(receiver.recv().await.is_err());
    assert!(hub.peers().await.is_empty());

    serve_task.abort();
    hub.shutdown().await;
}

#[tokio::test]
async fn protocol_mismatch_is_rejected() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));
    let (acceptor, connector) = mem::listener();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    let (mut sender, mut receiver) = connector.connect().await.unwrap();
    let join = Frame::Join(Join {
        protocol: PROTOCOL_VERSION + 1,
        node_id: node("a"),
    });
    sender.send(&join.to_bytes().unwrap()).await.unwrap();

    assert!(receiver.recv().await.is_err());
    assert!(hub.peers().await.is_empty());

    serve_task.abort();
    hub.shutdown().await;
}

#[tokio::test]
async fn tcp_fabric_end_to_end() {
    let hub = Arc::new(Syncer::new(node("hub"), test_config()));
    let capture = Capture::default();
    hub.register(RM, None, Some(capture.receiver()));

    let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    let serve_task = tokio::spawn(serve(hub.clone(), acceptor));

    let follower = Syncer::new(node("a"), test_config());
    let (reporter, _publisher) = scripted_reporter(node("a"), RM, 1, "a1");
    follower.register(RM, Some(Box::new(reporter)), None);

    let connector = TcpConnector::new(addr.to_string());
    follower.follow(&connector).await.unwrap();

    wait_until("hub receives over tcp", || capture.last_version() == Some(1)).await;

    follower.shutdown().await;
    serve_task.abort();
    hub.shutdown().await;
}
