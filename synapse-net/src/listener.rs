//! TCPリスナーのacceptループ
//!
//! 1つのリスナーにつき同時に扱うセッションは1つだけです。
//! 接続を受け付けたらセッションが終わるまで処理し、次の接続を待ちます。

use crate::Result;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use synapse_target::ShutdownToken;
use tracing::{info, warn};

/// リスナーをバインドする
pub fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// acceptループのスレッドを起動する
///
/// `session` は受け付けた接続ごとに呼ばれ、戻るまで次の接続は受け付けません。
pub fn spawn_accept_loop<F>(
    name: &str,
    listener: TcpListener,
    shutdown: ShutdownToken,
    poll: Duration,
    mut session: F,
) -> Result<JoinHandle<()>>
where
    F: FnMut(TcpStream, SocketAddr) -> Result<()> + Send + 'static,
{
    let label = name.to_string();
    let handle = thread::Builder::new().name(format!("{}-accept", name)).spawn(move || {
        if let Ok(addr) = listener.local_addr() {
            info!("{} listening on {}", label, addr);
        }
        while !shutdown.is_triggered() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("{} connection from {}", label, peer);
                    if let Err(e) = prepare(&stream, poll).and_then(|()| session(stream, peer)) {
                        warn!("{} session with {} ended with error: {:#}", label, peer, e);
                    } else {
                        info!("{} session with {} closed", label, peer);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(poll),
                Err(e) => {
                    warn!("{} accept failed: {}", label, e);
                    thread::sleep(poll);
                }
            }
        }
        info!("{} listener closed", label);
    })?;
    Ok(handle)
}

/// 受け付けたソケットをブロッキングに戻し、読み取りにタイムアウトを付ける
fn prepare(stream: &TcpStream, poll: Duration) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(poll))?;
    stream.set_nodelay(true)?;
    Ok(())
}

/// 接続と書き込みに上限時間を付けて接続する
///
/// 名前解決の結果を順に試し、最初に繋がったものを返します。
pub(crate) fn connect<A: ToSocketAddrs>(target: A, timeout: Duration) -> io::Result<TcpStream> {
    let mut last = io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to connect to");
    for addr in target.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_write_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last = e,
        }
    }
    Err(last)
}

/// 読み取りのタイムアウトか
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
