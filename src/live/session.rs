use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::live::api::LiveApi;
use crate::live::codec::StreamCodec;
use crate::live::errors::LiveError;
use crate::live::models::{
    Comment, Element, OutgoingComment, Outbound, StreamStatus, ThreadHandshakeAck, ThreadRequest,
};
use crate::live::position::{compute_vpos, SequenceCounter};
use crate::speaker::SpeakerDirectory;

/// Mail field value that asks the relay to hide the poster's id.
pub const ANONYMOUS_MAIL: &str = "184";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Handshaking,
    Streaming,
    Closed,
}

fn transition(state: &Mutex<SessionState>, to: SessionState) -> Result<(), LiveError> {
    let mut current = state.lock();
    let from = *current;

    let allowed = matches!(
        (from, to),
        (SessionState::Idle, SessionState::Connecting)
            | (SessionState::Connecting, SessionState::Handshaking)
            | (SessionState::Handshaking, SessionState::Streaming)
            | (_, SessionState::Closed)
    );

    if !allowed {
        warn!("Invalid session transition attempted: {:?} -> {:?}", from, to);
        return Err(LiveError::InvalidTransition { from, to });
    }

    if from != to {
        info!("Session transition: {:?} -> {:?}", from, to);
    }
    *current = to;
    Ok(())
}

#[derive(Debug, Clone)]
struct Handshake {
    ack: ThreadHandshakeAck,
    open_time: i64,
}

/// One viewer's connection to a stream's comment relay.
///
/// `connect` performs the thread handshake and starts a reader task that
/// delivers decoded comments, in relay order, on the returned channel. The
/// channel ends when the session closes. `send` and `close` take `&self`, so
/// a connected session can be shared behind an `Arc`.
pub struct LiveSession {
    live_id: String,
    status: StreamStatus,
    api: Arc<dyn LiveApi>,
    directory: Arc<SpeakerDirectory>,
    capacity: usize,
    state: Arc<Mutex<SessionState>>,
    sequence: Arc<SequenceCounter>,
    handshake: Option<Handshake>,
    writer: AsyncMutex<Option<FramedWrite<OwnedWriteHalf, StreamCodec>>>,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl LiveSession {
    pub fn new(
        live_id: impl Into<String>,
        status: StreamStatus,
        api: Arc<dyn LiveApi>,
        directory: Arc<SpeakerDirectory>,
        capacity: usize,
    ) -> Self {
        Self {
            live_id: live_id.into(),
            status,
            api,
            directory,
            capacity: capacity.max(1),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            sequence: Arc::new(SequenceCounter::default()),
            handshake: None,
            writer: AsyncMutex::new(None),
            cancel: CancellationToken::new(),
            reader: Mutex::new(None),
        }
    }

    pub fn live_id(&self) -> &str {
        &self.live_id
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn last_sequence(&self) -> i64 {
        self.sequence.last()
    }

    pub fn handshake_ack(&self) -> Option<&ThreadHandshakeAck> {
        self.handshake.as_ref().map(|h| &h.ack)
    }

    /// Dials the relay and waits up to `timeout` for the thread acknowledgement.
    pub async fn connect(&mut self, timeout: Duration) -> Result<mpsc::Receiver<Comment>, LiveError> {
        transition(&self.state, SessionState::Connecting)?;

        let result = self.open(timeout).await;
        if let Err(e) = &result {
            error!("Failed to open live session {}: {}", self.live_id, e);
            let _ = transition(&self.state, SessionState::Closed);
        }
        result
    }

    async fn open(&mut self, timeout: Duration) -> Result<mpsc::Receiver<Comment>, LiveError> {
        let addr = self.status.relay.endpoint();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| LiveError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        transition(&self.state, SessionState::Handshaking)?;

        let (read_half, write_half) = stream.into_split();
        let mut frames = FramedRead::new(read_half, StreamCodec::new());
        let mut writer = FramedWrite::new(write_half, StreamCodec::new());

        let request = ThreadRequest {
            thread: self.status.relay.thread,
        };
        writer.send(Outbound::from(request)).await?;
        debug!("Thread request sent for thread {}", request.thread);

        let ack = match tokio::time::timeout(timeout, wait_for_ack(&mut frames)).await {
            Ok(ack) => ack?,
            Err(_) => {
                // the pending read was dropped with the timed out future;
                // dropping both halves closes the socket
                drop(frames);
                drop(writer);
                return Err(LiveError::HandshakeTimeout(timeout));
            }
        };

        if ack.result_code != 0 {
            warn!("Relay answered thread request with result code {}", ack.result_code);
        }
        let open_time = Utc::now().timestamp();
        info!(
            "Handshake complete: last_res={} server_time={} open_time={}",
            ack.last_res, ack.server_time, open_time
        );

        self.sequence.reset(ack.last_res);
        self.handshake = Some(Handshake { ack, open_time });
        *self.writer.get_mut() = Some(writer);

        let (comments, receiver) = mpsc::channel(self.capacity);
        transition(&self.state, SessionState::Streaming)?;

        let pump = CommentPump {
            directory: Arc::clone(&self.directory),
            sequence: Arc::clone(&self.sequence),
            comments,
            cancel: self.cancel.clone(),
        };
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let exit = pump.run(frames).await;
            info!("Comment reader stopped: {:?}", exit);
            let _ = transition(&state, SessionState::Closed);
        });
        *self.reader.lock() = Some(handle);

        Ok(receiver)
    }

    /// Posts `text` to the stream, hiding the viewer's id when `anonymous`.
    pub async fn send(&self, text: &str, anonymous: bool) -> Result<(), LiveError> {
        if self.cancel.is_cancelled() || self.state() != SessionState::Streaming {
            return Err(LiveError::NotStreaming);
        }
        let handshake = self.handshake.as_ref().ok_or(LiveError::NotStreaming)?;

        let block = self.sequence.block();
        let post_key = self.api.post_key(self.status.relay.thread, block).await?;

        let vpos = compute_vpos(
            handshake.ack.server_time,
            self.status.stream.start_time,
            Utc::now().timestamp(),
            handshake.open_time,
        );

        let comment = OutgoingComment {
            thread: self.status.relay.thread,
            ticket: handshake.ack.ticket.clone(),
            vpos,
            post_key,
            user_id: self.status.viewer.user_id.clone(),
            premium: self.status.viewer.premium,
            mail: if anonymous { ANONYMOUS_MAIL.to_string() } else { String::new() },
            text: text.to_string(),
        };

        // close() must be able to take the writer even while a write is stuck
        let mut writer = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(LiveError::Closed),
            writer = self.writer.lock() => writer,
        };
        let writer = writer.as_mut().ok_or(LiveError::NotStreaming)?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(LiveError::Closed),
            sent = writer.send(Outbound::from(comment)) => sent?,
        }

        info!("Comment posted at vpos {} (block {}, anonymous: {})", vpos, block, anonymous);
        Ok(())
    }

    /// Stops the reader and closes the socket. Safe to call more than once.
    pub async fn close(&self) {
        self.cancel.cancel();

        // dropping the write half shuts the socket down without flushing
        // whatever a cancelled send left in the buffer
        if let Some(writer) = self.writer.lock().await.take() {
            drop(writer);
            debug!("Relay socket closed for {}", self.live_id);
        }

        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Comment reader task failed: {}", e);
            }
        }

        let _ = transition(&self.state, SessionState::Closed);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn wait_for_ack<R>(frames: &mut FramedRead<R, StreamCodec>) -> Result<ThreadHandshakeAck, LiveError>
where
    R: AsyncRead + Unpin,
{
    while let Some(element) = frames.next().await {
        match element? {
            Element::Handshake(ack) => return Ok(ack),
            other => debug!("Ignoring {:?} before thread acknowledgement", other),
        }
    }
    Err(LiveError::Handshake("relay closed the connection".to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpExit {
    Cancelled,
    Disconnected,
}

/// The reader task: decodes relay frames, resolves speakers and hands
/// comments to the consumer.
pub(crate) struct CommentPump {
    pub(crate) directory: Arc<SpeakerDirectory>,
    pub(crate) sequence: Arc<SequenceCounter>,
    pub(crate) comments: mpsc::Sender<Comment>,
    pub(crate) cancel: CancellationToken,
}

impl CommentPump {
    pub(crate) async fn run<R>(self, mut frames: FramedRead<R, StreamCodec>) -> PumpExit
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpExit::Cancelled,
                next = frames.next() => next,
            };

            let element = match next {
                None => return PumpExit::Disconnected,
                Some(Err(e)) => {
                    warn!("Relay read failed: {}", e);
                    return PumpExit::Disconnected;
                }
                Some(Ok(element)) => element,
            };

            match element {
                Element::Comment(mut comment) => {
                    let speaker = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return PumpExit::Cancelled,
                        speaker = self.directory.resolve(&comment.user_id) => speaker,
                    };
                    comment.speaker = Some(speaker);
                    self.sequence.observe(comment.no);

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return PumpExit::Cancelled,
                        sent = self.comments.send(comment) => {
                            if sent.is_err() {
                                trace!("Comment consumer is gone");
                            }
                        }
                    }
                }
                Element::PostAck(ack) => {
                    let last = self.sequence.observe(ack.no);
                    debug!("Post acknowledged: status={} no={} last={}", ack.status, ack.no, last);
                }
                Element::Handshake(ack) => {
                    debug!("Ignoring repeated thread acknowledgement: {:?}", ack);
                }
            }
        }
    }
}
