use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use kome::live::models::{RelayInfo, StreamInfo, ViewerInfo};
use kome::live::{LiveApi, LiveError, LiveSession, SessionState, StreamStatus};
use kome::speaker::{Speaker, SpeakerDirectory, SpeakerError, SpeakerLookup, SqliteSpeakerStore};

const THREAD: i64 = 1234;
const THREAD_REQUEST: &[u8] = b"<thread thread=\"1234\" version=\"20061206\" res_from=\"-1000\"/>";

#[derive(Default)]
struct FakeApi {
    requested: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl LiveApi for FakeApi {
    async fn player_status(&self, _live_id: &str) -> Result<StreamStatus, LiveError> {
        Err(LiveError::NotStreaming)
    }

    async fn post_key(&self, thread: i64, block: i64) -> Result<String, LiveError> {
        self.requested.lock().push((thread, block));
        Ok("key".to_string())
    }
}

struct NamedByRemote;

#[async_trait]
impl SpeakerLookup for NamedByRemote {
    async fn lookup(&self, id: i64) -> Result<Speaker, SpeakerError> {
        Ok(Speaker::new(id, format!("user{}", id)))
    }
}

fn directory() -> Arc<SpeakerDirectory> {
    Arc::new(SpeakerDirectory::new(
        Arc::new(SqliteSpeakerStore::in_memory().unwrap()),
        Arc::new(NamedByRemote),
    ))
}

fn status(port: u16) -> StreamStatus {
    StreamStatus {
        stream: StreamInfo {
            title: "test stream".to_string(),
            start_time: 1000,
            end_time: 4600,
            ..Default::default()
        },
        viewer: ViewerInfo {
            user_id: "777".to_string(),
            name: "viewer".to_string(),
            premium: 1,
        },
        relay: RelayInfo {
            addr: "127.0.0.1".to_string(),
            port,
            thread: THREAD,
        },
    }
}

fn session(port: u16, api: Arc<FakeApi>, capacity: usize) -> LiveSession {
    LiveSession::new("lv1", status(port), api, directory(), capacity)
}

fn ack(last_res: i64) -> String {
    format!(
        "<thread resultcode=\"0\" thread=\"{}\" last_res=\"{}\" ticket=\"0x9a3bc\" revision=\"1\" server_time=\"1050\"/>\0",
        THREAD, last_res
    )
}

fn chat(no: i64, user_id: &str, body: &str) -> String {
    format!(
        "<chat thread=\"{}\" no=\"{}\" vpos=\"100\" date=\"1065\" user_id=\"{}\">{}</chat>\0",
        THREAD, no, user_id, body
    )
}

fn chat_result(no: i64) -> String {
    format!("<chat_result thread=\"{}\" status=\"0\" no=\"{}\"/>\0", THREAD, no)
}

async fn read_frame(socket: &mut TcpStream) -> Vec<u8> {
    let mut frame = Vec::new();
    loop {
        match socket.read_u8().await {
            Ok(0) | Err(_) => return frame,
            Ok(byte) => frame.push(byte),
        }
    }
}

/// Accepts one viewer, checks the thread request and answers with `script`.
/// Later frames from the viewer are forwarded to `frames`.
async fn relay(script: String) -> (u16, tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (frames, received) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        assert_eq!(read_frame(&mut socket).await, THREAD_REQUEST);
        socket.write_all(script.as_bytes()).await.unwrap();

        loop {
            let frame = read_frame(&mut socket).await;
            if frame.is_empty() || frames.send(frame).is_err() {
                break;
            }
        }
    });

    (port, received)
}

async fn wait_for_sequence(session: &LiveSession, expected: i64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while session.last_sequence() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sequence did not advance");
}

#[tokio::test]
async fn handshake_seeds_sequence_and_delivers_comments() {
    let script = [ack(57), chat(58, "12345", "hello"), chat(59, "a1B2c3", "quiet")].concat();
    let (port, _frames) = relay(script).await;
    let mut session = session(port, Arc::new(FakeApi::default()), 16);

    let mut comments = session.connect(Duration::from_secs(2)).await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
    let ack = session.handshake_ack().unwrap();
    assert_eq!(ack.last_res, 57);
    assert_eq!(ack.ticket, "0x9a3bc");
    assert_eq!(ack.server_time, 1050);

    let first = comments.recv().await.unwrap();
    assert_eq!(first.no, 58);
    assert_eq!(first.body, "hello");
    assert_eq!(first.speaker, Some(Speaker::new(12345, "user12345")));

    let second = comments.recv().await.unwrap();
    assert_eq!(second.no, 59);
    assert_eq!(second.speaker, Some(Speaker::anonymous()));
    assert_eq!(session.last_sequence(), 59);

    session.close().await;
}

#[tokio::test]
async fn handshake_times_out_when_relay_stays_silent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (hold_tx, hold_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_frame(&mut socket).await;
        let _ = hold_rx.await;
    });

    let mut session = session(port, Arc::new(FakeApi::default()), 16);
    let result = session.connect(Duration::from_millis(200)).await;

    assert!(matches!(result, Err(LiveError::HandshakeTimeout(_))));
    assert_eq!(session.state(), SessionState::Closed);
    drop(hold_tx);
}

#[tokio::test]
async fn connect_reports_unreachable_relay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut session = session(port, Arc::new(FakeApi::default()), 16);
    let result = session.connect(Duration::from_secs(1)).await;

    assert!(matches!(result, Err(LiveError::Connect { .. })));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn send_before_connect_is_rejected() {
    let session = session(1, Arc::new(FakeApi::default()), 16);

    assert!(matches!(session.send("hi", false).await, Err(LiveError::NotStreaming)));
}

#[tokio::test]
async fn send_writes_chat_frame_with_post_key() {
    let (port, mut frames) = relay(ack(57)).await;
    let api = Arc::new(FakeApi::default());
    let mut session = session(port, Arc::clone(&api), 16);
    let _comments = session.connect(Duration::from_secs(2)).await.unwrap();

    session.send("hello <world>", true).await.unwrap();

    let frame = String::from_utf8(frames.recv().await.unwrap()).unwrap();
    assert!(frame.starts_with("<chat thread=\"1234\" ticket=\"0x9a3bc\" vpos=\""), "{}", frame);
    assert!(
        frame.ends_with("postkey=\"key\" mail=\"184\" user_id=\"777\" premium=\"1\">hello &lt;world&gt;</chat>"),
        "{}",
        frame
    );

    let vpos: i64 = frame
        .split("vpos=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap()
        .parse()
        .unwrap();
    assert!((5000..5300).contains(&vpos), "vpos {}", vpos);
    assert_eq!(*api.requested.lock(), vec![(THREAD, 5)]);

    session.close().await;
}

#[tokio::test]
async fn post_acknowledgements_move_the_post_key_block() {
    let script = [ack(57), chat(58, "1", "a"), chat_result(63)].concat();
    let (port, mut frames) = relay(script).await;
    let api = Arc::new(FakeApi::default());
    let mut session = session(port, Arc::clone(&api), 16);
    let mut comments = session.connect(Duration::from_secs(2)).await.unwrap();

    assert_eq!(comments.recv().await.unwrap().no, 58);
    wait_for_sequence(&session, 63).await;

    session.send("again", false).await.unwrap();
    let frame = String::from_utf8(frames.recv().await.unwrap()).unwrap();
    assert!(frame.contains("mail=\"\""), "{}", frame);
    assert_eq!(*api.requested.lock(), vec![(THREAD, 6)]);

    session.close().await;
}

#[tokio::test]
async fn close_twice_ends_comment_stream() {
    let (port, _frames) = relay(ack(0)).await;
    let mut session = session(port, Arc::new(FakeApi::default()), 16);
    let mut comments = session.connect(Duration::from_secs(2)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), session.close()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), session.close()).await.unwrap();

    assert_eq!(session.state(), SessionState::Closed);
    assert!(comments.recv().await.is_none());
    assert!(matches!(session.send("late", false).await, Err(LiveError::NotStreaming)));
}

#[tokio::test]
async fn relay_disconnect_closes_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_frame(&mut socket).await;
        socket.write_all([ack(10), chat(11, "5", "bye")].concat().as_bytes()).await.unwrap();
    });

    let mut session = session(port, Arc::new(FakeApi::default()), 16);
    let mut comments = session.connect(Duration::from_secs(2)).await.unwrap();

    assert_eq!(comments.recv().await.unwrap().no, 11);
    assert!(comments.recv().await.is_none());
    tokio::time::timeout(Duration::from_secs(2), async {
        while session.state() != SessionState::Closed {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn close_wins_against_a_blocked_consumer() {
    let mut script = ack(0);
    for no in 1..=50 {
        script.push_str(&chat(no, "42", "flood"));
    }
    let (port, _frames) = relay(script).await;
    let mut session = session(port, Arc::new(FakeApi::default()), 1);
    let mut comments = session.connect(Duration::from_secs(2)).await.unwrap();

    // let the reader fill the channel and block on the next send
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(2), session.close())
        .await
        .expect("close blocked behind a full channel");

    let mut delivered = 0;
    while comments.recv().await.is_some() {
        delivered += 1;
    }
    assert!(delivered <= 1, "delivered {} comments after close", delivered);
}

#[tokio::test]
async fn close_unblocks_a_send_stuck_on_a_full_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (hold_tx, hold_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_frame(&mut socket).await;
        socket.write_all(ack(0).as_bytes()).await.unwrap();
        // never read again, so the viewer's writes back up
        let _ = hold_rx.await;
    });

    let mut session = session(port, Arc::new(FakeApi::default()), 16);
    let _comments = session.connect(Duration::from_secs(2)).await.unwrap();
    let session = Arc::new(session);

    let sender = Arc::clone(&session);
    let pending = tokio::spawn(async move { sender.send(&"x".repeat(64 * 1024 * 1024), false).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!pending.is_finished(), "send should be blocked on the socket");

    tokio::time::timeout(Duration::from_secs(3), session.close())
        .await
        .expect("close blocked behind a pending send");

    let sent = tokio::time::timeout(Duration::from_secs(3), pending).await.unwrap().unwrap();
    assert!(matches!(sent, Err(LiveError::Closed)));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.send("late", false).await, Err(LiveError::NotStreaming)));
    drop(hold_tx);
}
