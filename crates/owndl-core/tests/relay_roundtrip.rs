use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use owndl_core::assembly::MediaAssembler;
use owndl_core::config::DeliveryLimits;
use owndl_core::delivery::{ChatAction, ChatDelivery, DeliveryError, OutboundMedia};
use owndl_core::dispatch::{DispatchOutcome, DispatchRouter};
use owndl_core::handler::ResponseHandler;
use owndl_core::links::extract_links;
use owndl_core::preferences::JsonPreferenceStore;
use owndl_core::registry::{ChatContext, ConnectionRegistry};
use owndl_core::server::RelayServer;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Recorder {
    texts: Mutex<Vec<(i64, String)>>,
    groups: Mutex<Vec<(i64, Vec<OutboundMedia>)>>,
}

impl Recorder {
    fn texts(&self) -> Vec<(i64, String)> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn groups(&self) -> Vec<(i64, Vec<OutboundMedia>)> {
        self.groups.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatDelivery for Recorder {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        if let Ok(mut texts) = self.texts.lock() {
            texts.push((chat_id, text.to_string()));
        }
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        media: Vec<OutboundMedia>,
    ) -> Result<usize, DeliveryError> {
        let count = media.len();
        if let Ok(mut groups) = self.groups.lock() {
            groups.push((chat_id, media));
        }
        Ok(count)
    }

    async fn send_chat_action(&self, _chat_id: i64, _action: ChatAction) -> Result<(), DeliveryError> {
        Ok(())
    }
}

struct Relay {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    delivery: Arc<Recorder>,
    shutdown: CancellationToken,
    _settings_dir: tempfile::TempDir,
}

async fn start_relay() -> Relay {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let settings_dir = tempfile::tempdir().expect("tempdir");
    let registry = Arc::new(ConnectionRegistry::new());
    let delivery = Arc::new(Recorder::default());
    let preferences = Arc::new(JsonPreferenceStore::new(
        settings_dir.path().join("settings.json"),
    ));
    let assembler = Arc::new(MediaAssembler::new(
        delivery.clone(),
        preferences,
        DeliveryLimits::default(),
        false,
    ));
    let handler = Arc::new(ResponseHandler::new(
        Arc::clone(&registry),
        assembler,
        delivery.clone(),
    ));

    let server = RelayServer::bind("127.0.0.1:0".parse().expect("addr"), Arc::clone(&registry), handler)
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");
    let shutdown = CancellationToken::new();
    tokio::spawn(server.run(shutdown.clone()));

    Relay {
        addr,
        registry,
        delivery,
        shutdown,
        _settings_dir: settings_dir,
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn worker_roundtrip_delivers_media_to_chat() {
    let relay = start_relay().await;
    let (mut worker, _) = connect_async(format!("ws://{}", relay.addr))
        .await
        .expect("connect");
    worker
        .send(Message::Text("platform:TikTok".into()))
        .await
        .expect("register");

    let registry = Arc::clone(&relay.registry);
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.lookup("tiktok").await.is_some() }
    })
    .await;

    let router = DispatchRouter::new(Arc::clone(&relay.registry));
    let links = extract_links("check https://vt.tiktok.com/ZSabc/ please");
    let context = ChatContext {
        chat_id: 42,
        sender: "alice".to_string(),
        message_id: 7,
    };
    let outcome = router.dispatch(&links[0], context).await.expect("dispatch");
    assert!(matches!(outcome, DispatchOutcome::Sent(_)));

    let frame = worker.next().await.expect("frame").expect("message");
    assert_eq!(frame, Message::Text("https://vt.tiktok.com/ZSabc/".into()));

    // A malformed reply is dropped without closing the connection
    worker
        .send(Message::Text("{oops".into()))
        .await
        .expect("malformed reply");
    worker
        .send(Message::Text(
            r#"{"media":[{"type":"video","url":"https://cdn/v.mp4"}]}"#.into(),
        ))
        .await
        .expect("reply");

    let delivery = Arc::clone(&relay.delivery);
    wait_until(|| {
        let delivery = Arc::clone(&delivery);
        async move { !delivery.groups().is_empty() }
    })
    .await;

    let groups = relay.delivery.groups();
    assert_eq!(groups.len(), 1);
    assert!(relay.delivery.texts().is_empty());
    assert!(relay.registry.lookup("tiktok").await.is_some());
    assert_eq!(groups[0].0, 42);
    assert_eq!(groups[0].1[0].caption.as_deref(), Some("Sent by alice"));

    worker
        .send(Message::Text(r#"{"error":"boom"}"#.into()))
        .await
        .expect("error reply");
    let delivery = Arc::clone(&relay.delivery);
    wait_until(|| {
        let delivery = Arc::clone(&delivery);
        async move { !delivery.texts().is_empty() }
    })
    .await;
    assert_eq!(relay.delivery.texts(), vec![(42, "boom".to_string())]);

    worker.close(None).await.expect("close");
    let registry = Arc::clone(&relay.registry);
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.is_empty().await }
    })
    .await;

    relay.shutdown.cancel();
}

#[tokio::test]
async fn invalid_registration_is_closed_with_policy_violation() {
    let relay = start_relay().await;
    let (mut worker, _) = connect_async(format!("ws://{}", relay.addr))
        .await
        .expect("connect");
    worker
        .send(Message::Text("hello relay".into()))
        .await
        .expect("send");

    let frame = worker.next().await.expect("frame").expect("message");
    let Message::Close(Some(close)) = frame else {
        panic!("expected close frame, got {frame:?}");
    };
    assert_eq!(close.code, CloseCode::Policy);
    assert_eq!(close.reason.as_str(), "Invalid registration");
    assert!(relay.registry.is_empty().await);

    relay.shutdown.cancel();
}
