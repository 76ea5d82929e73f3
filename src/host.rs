// src/host.rs - File and network I/O feeding the viewer
use crate::frame::{self, Frame};
use crate::playback::LiveFrame;
use crate::settings::Settings;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{LinesCodec, LinesCodecError};
use tokio_util::udp::UdpFramed;
use tracing::{debug, error, info, warn};

const MAX_LINE: usize = 65_536;
const REPLAY_QUEUE: usize = 64;

/// Requests from the UI. Step and playback requests are handled by the
/// render driver; the rest by [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    OpenFile,
    StartStep { forward: bool, reset: bool },
    StartPlayback { reset: bool },
    StartLiveReceive { record: bool },
    StopLiveReceive,
}

/// Completed I/O delivered back to the UI thread. Live frames do not come
/// through here; see [`Host::take_live_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    FileOpened { text: String, path: PathBuf },
    /// A live receive session ended, on request or on its own.
    StopStreaming { session: u64 },
    Failed(String),
}

struct LiveTask {
    session: u64,
    stop: oneshot::Sender<()>,
    frames: watch::Receiver<Option<LiveFrame>>,
    handle: JoinHandle<()>,
}

struct ReplayTask {
    addr: String,
    frames: tokio::sync::mpsc::Sender<String>,
}

pub struct Host {
    runtime: Runtime,
    events_tx: Sender<HostEvent>,
    events_rx: Receiver<HostEvent>,
    live: Option<LiveTask>,
    /// A stopped session that may still hold the socket.
    stopping: Option<JoinHandle<()>>,
    next_session: u64,
    replay: Option<ReplayTask>,
    bind_addr: String,
    recording_dir: PathBuf,
}

impl Host {
    pub fn new(settings: &Settings) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to start I/O runtime")?;
        let (events_tx, events_rx) = mpsc::channel();
        let mut host = Self {
            runtime,
            events_tx,
            events_rx,
            live: None,
            stopping: None,
            next_session: 1,
            replay: None,
            bind_addr: settings.live_bind_addr.clone(),
            recording_dir: settings.recording_dir.clone(),
        };
        host.apply_settings(settings);
        Ok(host)
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.bind_addr = settings.live_bind_addr.clone();
        self.recording_dir = settings.recording_dir.clone();

        let addr = settings.replay_addr();
        if self.replay.as_ref().map(|r| &r.addr) != addr.as_ref() {
            // Dropping the old sender ends its task.
            self.replay = addr.map(|addr| self.start_replay(addr));
        }
    }

    /// Drains every event that has arrived since the last call.
    pub fn poll_events(&self) -> Vec<HostEvent> {
        self.events_rx.try_iter().collect()
    }

    /// The newest frame of the current live session not yet taken.
    pub fn take_live_frame(&mut self) -> Option<LiveFrame> {
        let frames = &mut self.live.as_mut()?.frames;
        match frames.has_changed() {
            Ok(true) => frames.borrow_and_update().clone(),
            _ => None,
        }
    }

    pub fn is_receiving(&self) -> bool {
        self.live.as_ref().is_some_and(|task| !task.handle.is_finished())
    }

    /// Forgets `session` if it is still the current one. Returns false for a
    /// session that was already stopped or replaced.
    pub fn finish_session(&mut self, session: u64) -> bool {
        if self.live.as_ref().is_some_and(|task| task.session == session) {
            self.live = None;
            true
        } else {
            false
        }
    }

    /// Shows the file picker and reads the chosen capture in the background.
    pub fn open_file(&self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Capture", &["jsonl", "json", "txt"])
            .add_filter("All files", &["*"])
            .pick_file()
        else {
            debug!("Open file cancelled");
            return;
        };
        self.read_file(path);
    }

    pub fn read_file(&self, path: PathBuf) {
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            let event = match read_capture_text(&path).await {
                Ok(text) => {
                    info!("Read {} bytes from {}", text.len(), path.display());
                    HostEvent::FileOpened { text, path }
                }
                Err(e) => {
                    error!("{:#}", e);
                    HostEvent::Failed(format!("{:#}", e))
                }
            };
            let _ = tx.send(event);
        });
    }

    /// Starts a live receive session and returns its id, or `None` when one
    /// is already running.
    pub fn start_live_receive(&mut self, record: bool) -> Option<u64> {
        if self.is_receiving() {
            warn!("Live receive already running");
            return None;
        }

        let session = self.next_session;
        self.next_session += 1;

        let (stop, stop_rx) = oneshot::channel();
        let (frames_tx, frames) = watch::channel(None);
        let tx = self.events_tx.clone();
        let bind_addr = self.bind_addr.clone();
        let recording_dir = record.then(|| self.recording_dir.clone());
        let previous = self.stopping.take();

        let handle = self.runtime.spawn(async move {
            if let Some(previous) = previous {
                // Let the previous session release the port first.
                let _ = previous.await;
            }
            if let Err(e) = run_live_receive(&bind_addr, recording_dir, frames_tx, tx.clone(), stop_rx).await {
                error!("Live receive failed: {:#}", e);
                let _ = tx.send(HostEvent::Failed(format!("{:#}", e)));
            }
            let _ = tx.send(HostEvent::StopStreaming { session });
        });
        self.live = Some(LiveTask { session, stop, frames, handle });
        Some(session)
    }

    pub fn stop_live_receive(&mut self) {
        if let Some(task) = self.live.take() {
            // The task may already have exited on its own.
            let _ = task.stop.send(());
            self.stopping = Some(task.handle);
            info!("Live receive session {} stop requested", task.session);
        }
    }

    /// Sends a played frame to the replay target, if one is configured.
    /// Frames are dropped while the socket is behind.
    pub fn replay(&self, frame: &Frame) {
        let Some(replay) = &self.replay else {
            return;
        };
        let text = match frame::encode(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode frame for replay: {}", e);
                return;
            }
        };
        if let Err(e) = replay.frames.try_send(text) {
            debug!("Replay frame dropped: {}", e);
        }
    }

    fn start_replay(&self, addr: String) -> ReplayTask {
        let (frames, frames_rx) = tokio::sync::mpsc::channel(REPLAY_QUEUE);
        let tx = self.events_tx.clone();
        let target = addr.clone();
        self.runtime.spawn(async move {
            if let Err(e) = run_replay(&target, frames_rx).await {
                error!("Replay failed: {:#}", e);
                let _ = tx.send(HostEvent::Failed(format!("{:#}", e)));
            }
        });
        ReplayTask { addr, frames }
    }
}

async fn read_capture_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read capture file: {}", path.display()))
}

/// Appends received frames to a new capture file.
struct Recorder {
    file: File,
    path: PathBuf,
    lines: usize,
}

impl Recorder {
    async fn create(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create recording directory: {}", dir.display()))?;
        let path = dir.join(recording_file_name(chrono::Local::now()));
        let file = File::create(&path)
            .await
            .with_context(|| format!("Failed to create recording: {}", path.display()))?;
        info!("Recording live frames to {}", path.display());
        Ok(Self { file, path, lines: 0 })
    }

    async fn append(&mut self, line: &str) -> Result<()> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.lines += 1;
        Ok(())
    }

    async fn finish(mut self) -> Result<()> {
        self.file.flush().await?;
        info!("Recorded {} frames to {}", self.lines, self.path.display());
        Ok(())
    }
}

pub fn recording_file_name<Tz: chrono::TimeZone>(at: chrono::DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("capture_{}.jsonl", at.format("%Y%m%d_%H%M%S"))
}

async fn run_live_receive(
    bind_addr: &str,
    recording_dir: Option<PathBuf>,
    frames: watch::Sender<Option<LiveFrame>>,
    events: Sender<HostEvent>,
    stop_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let socket = UdpSocket::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Receiving live frames on {}", socket.local_addr()?);

    let recorder = match recording_dir {
        Some(dir) => Some(Recorder::create(&dir).await?),
        None => None,
    };

    receive_loop(socket, recorder, frames, events, stop_rx).await
}

fn line_framed(socket: UdpSocket) -> UdpFramed<LinesCodec> {
    UdpFramed::new(socket, LinesCodec::new_with_max_length(MAX_LINE))
}

/// Splits datagrams into frame lines and publishes the newest one. Lines
/// that are not UTF-8 or are too long are logged and skipped.
async fn receive_loop(
    socket: UdpSocket,
    mut recorder: Option<Recorder>,
    frames: watch::Sender<Option<LiveFrame>>,
    events: Sender<HostEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let mut framed = line_framed(socket);
    let mut index = 0usize;

    let result = loop {
        let mut reset_codec = false;

        tokio::select! {
            _ = &mut stop_rx => break Ok(()),
            received = framed.next() => match received {
                Some(Ok((line, peer))) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!("Frame line of {} bytes from {}", line.len(), peer);

                    let mut write_failed = false;
                    if let Some(rec) = recorder.as_mut() {
                        if let Err(e) = rec.append(&line).await {
                            error!("Recording stopped: {:#}", e);
                            let _ = events.send(HostEvent::Failed(format!("{:#}", e)));
                            write_failed = true;
                        }
                    }
                    if write_failed {
                        recorder = None;
                    }

                    frames.send_replace(Some(LiveFrame { text: line, index: Some(index), stamp: None }));
                    index += 1;
                    if frames.is_closed() {
                        debug!("Viewer gone, ending live receive");
                        break Ok(());
                    }
                }
                Some(Err(LinesCodecError::Io(e))) if e.kind() != std::io::ErrorKind::InvalidData => {
                    break Err(anyhow::Error::new(e).context("UDP receive failed"));
                }
                Some(Err(e)) => {
                    warn!("Skipping undecodable datagram: {}", e);
                    reset_codec = true;
                }
                None => break Ok(()),
            },
        }

        if reset_codec {
            // Drop whatever is left of the bad datagram along with the codec state.
            framed = line_framed(framed.into_inner());
        }
    };

    if let Some(recorder) = recorder {
        recorder.finish().await?;
    }
    info!("Live receive ended after {} frames", index);
    result
}

async fn run_replay(addr: &str, mut frames: tokio::sync::mpsc::Receiver<String>) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Failed to bind replay socket")?;
    socket
        .connect(addr)
        .await
        .with_context(|| format!("Failed to resolve replay target {}", addr))?;
    info!("Replaying played frames to {}", addr);

    let mut sent = 0usize;
    while let Some(text) = frames.recv().await {
        // Nobody may be listening.
        match socket.send(text.as_bytes()).await {
            Ok(_) => sent += 1,
            Err(e) => debug!("Replay datagram to {} not delivered: {}", addr, e),
        }
    }
    info!("Replay to {} ended after {} frames", addr, sent);
    Ok(())
}
