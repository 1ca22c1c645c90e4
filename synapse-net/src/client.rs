//! クライアント側の二重接続
//!
//! クライアントは自分でもリスナーを持ち、サーバーへの接続のハンドシェイクで
//! その待ち受け先を伝えます。サーバーからの通知はそのリスナーに届きます。
//! サーバーとの接続が切れている間は一定間隔で再接続を試みます。

use crate::config::NetConfig;
use crate::listener::{self, is_timeout, spawn_accept_loop};
use crate::Result;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use synapse_core::DebugError;
use synapse_proto::{encode_frame, FrameDecoder, Handshake, Message, ProtoError};
use synapse_target::ShutdownToken;
use tracing::{debug, info, warn};

type SharedStream = Arc<Mutex<Option<TcpStream>>>;

fn lock(stream: &SharedStream) -> MutexGuard<'_, Option<TcpStream>> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 再接続するクライアント
pub struct DuplexClient {
    outbound: SharedStream,
    listen_addr: SocketAddr,
    shutdown: ShutdownToken,
    threads: Vec<JoinHandle<()>>,
}

impl DuplexClient {
    /// 待ち受けを始め、サーバーへの接続を試み続けるスレッドを起動する
    ///
    /// サーバーから届いたメッセージは返り値のチャネルで受け取ります。
    pub fn start(server: &str, listen_host: &str, config: NetConfig) -> Result<(Self, Receiver<Message>)> {
        let reply_listener = listener::bind(&format!("{}:0", listen_host))?;
        let listen_addr = reply_listener.local_addr()?;
        let shutdown = ShutdownToken::new();
        let outbound: SharedStream = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::channel();

        let receiver = {
            let token = shutdown.clone();
            spawn_accept_loop(
                "client",
                reply_listener,
                shutdown.clone(),
                config.poll_interval,
                move |stream, _| receive(stream, &tx, &token),
            )?
        };

        let handshake = Handshake {
            host: listen_host.to_string(),
            port: listen_addr.port(),
        };
        let supervisor = {
            let server = server.to_string();
            let outbound = Arc::clone(&outbound);
            let token = shutdown.clone();
            thread::Builder::new()
                .name("client-supervisor".into())
                .spawn(move || supervise(&server, &handshake, &outbound, &token, &config))
        };
        let supervisor = match supervisor {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.trigger();
                let _ = receiver.join();
                return Err(e.into());
            }
        };

        let client = Self {
            outbound,
            listen_addr,
            shutdown,
            threads: vec![receiver, supervisor],
        };
        Ok((client, rx))
    }

    /// サーバーへメッセージを送る
    pub fn send(&self, message: &Message) -> Result<()> {
        let mut guard = lock(&self.outbound);
        let stream = guard.as_mut().ok_or(DebugError::NotConnected)?;
        if let Err(e) = stream.write_all(&encode_frame(message)) {
            *guard = None;
            return Err(anyhow::anyhow!("Failed to send {:?}: {}", message.message_type(), e));
        }
        Ok(())
    }

    /// サーバーに接続しているか
    pub fn is_connected(&self) -> bool {
        lock(&self.outbound).is_some()
    }

    /// 通知を受け付けているアドレス
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// スレッドを止めて合流する
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        lock(&self.outbound).take();
    }
}

impl Drop for DuplexClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 接続を保ち、切れたら再接続してハンドシェイクを送り直す
fn supervise(
    server: &str,
    handshake: &Handshake,
    outbound: &SharedStream,
    shutdown: &ShutdownToken,
    config: &NetConfig,
) {
    // 切断の検出用に複製したストリーム（サーバーはこの接続に書き込まない）
    let mut watcher: Option<TcpStream> = None;

    while !shutdown.is_triggered() {
        if lock(outbound).is_none() {
            watcher = None;
            match open(server, handshake, config) {
                Ok((stream, clone)) => {
                    info!("connected to {}", server);
                    *lock(outbound) = Some(stream);
                    watcher = Some(clone);
                }
                Err(e) => {
                    debug!("connect to {} failed: {:#}", server, e);
                    thread::sleep(config.reconnect_interval);
                }
            }
            continue;
        }

        let Some(stream) = watcher.as_mut() else {
            thread::sleep(config.poll_interval);
            continue;
        };
        let mut byte = [0u8; 1];
        let lost = match stream.read(&mut byte) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) if is_timeout(&e) => false,
            Err(_) => true,
        };
        if lost {
            warn!("connection to {} lost, reconnecting", server);
            lock(outbound).take();
        }
    }
}

fn open(server: &str, handshake: &Handshake, config: &NetConfig) -> Result<(TcpStream, TcpStream)> {
    let mut stream = listener::connect(server, config.write_timeout)?;
    stream.write_all(&encode_frame(&Message::Connect(handshake.clone())))?;
    let watcher = stream.try_clone()?;
    watcher.set_read_timeout(Some(config.poll_interval))?;
    Ok((stream, watcher))
}

/// サーバーからの通知を受け取ってチャネルへ流す
fn receive(mut stream: TcpStream, tx: &Sender<Message>, shutdown: &ShutdownToken) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    while !shutdown.is_triggered() {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        let frames = decoder
            .push(&buf[..n])
            .map_err(|e| anyhow::anyhow!("Unrecoverable frame error: {}", e))?;
        for payload in frames {
            match Message::decode(&payload) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        return Ok(());
                    }
                }
                Err(ProtoError::UnknownMessageType(tag)) => warn!("dropping message with unknown type {}", tag),
                Err(e) => warn!("dropping malformed message: {}", e),
            }
        }
    }
    Ok(())
}
