//! UDP socket runtime
//!
//! A [`Socket`] binds one UDP endpoint and runs exactly one receive loop task
//! for it. Every accepted datagram is copied out of the shared receive buffer
//! and handed to a [`ReceiveHook`] on the loop task itself, so hooks must not
//! block; the dispatchers in [`crate::dispatch`] move real work elsewhere.
//!
//! `close` is idempotent and waits for the receive loop to exit, except when
//! it is reached from inside that loop, which is detected through a task-local
//! owner marker.

use crate::error::SocketError;
use log::{debug, error, info, trace};
use parking_lot::Mutex;
use shared::{Datagram, Message, HEADER_SIZE, MAX_UDP_SIZE};
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

tokio::task_local! {
    static RECEIVE_LOOP_OWNER: usize;
}

/// Called on the receive loop for every datagram at least one byte long.
pub trait ReceiveHook: Send + Sync + 'static {
    fn on_datagram(&self, socket: &Socket, datagram: Datagram);
}

struct Running {
    udp: Arc<UdpSocket>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    receive_task: JoinHandle<()>,
}

struct Inner {
    name: String,
    state: Mutex<Option<Running>>,
}

/// Cheaply cloneable handle to one UDP endpoint.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<Inner>,
}

impl Socket {
    /// Creates a socket that is not bound yet. `name` only shows up in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().is_some()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.state.lock().as_ref().map(|running| running.local_addr)
    }

    /// Binds and spawns the receive loop. Calling it while already running
    /// leaves the socket untouched and returns the current address.
    pub async fn start(
        &self,
        local_addr: SocketAddr,
        hook: Arc<dyn ReceiveHook>,
    ) -> Result<SocketAddr, SocketError> {
        if let Some(current) = self.local_addr() {
            debug!(
                "UDP socket {} already running on {}, start ignored",
                self.inner.name, current
            );
            return Ok(current);
        }

        let udp = UdpSocket::bind(local_addr)
            .await
            .map_err(|source| SocketError::Bind {
                addr: local_addr,
                source,
            })?;
        let bound = udp.local_addr().map_err(SocketError::LocalAddr)?;
        let udp = Arc::new(udp);
        let (shutdown, shutdown_rx) = watch::channel(false);

        {
            let mut state = self.inner.state.lock();
            if let Some(running) = state.as_ref() {
                debug!(
                    "UDP socket {} was started concurrently on {}, start ignored",
                    self.inner.name, running.local_addr
                );
                return Ok(running.local_addr);
            }

            let receive_task = tokio::spawn(RECEIVE_LOOP_OWNER.scope(
                self.id(),
                receive_loop(self.clone(), Arc::clone(&udp), shutdown_rx, hook),
            ));

            *state = Some(Running {
                udp,
                local_addr: bound,
                shutdown,
                receive_task,
            });
        }

        info!("UDP socket {} started on {}", self.inner.name, bound);
        Ok(bound)
    }

    /// Stops the receive loop and releases the endpoint.
    pub async fn close(&self) {
        let running = self.inner.state.lock().take();
        let Some(running) = running else {
            return;
        };

        let Running {
            udp,
            local_addr,
            shutdown,
            receive_task,
        } = running;

        shutdown.send_replace(true);
        drop(shutdown);
        drop(udp);
        debug!("UDP socket {} instance closed", self.inner.name);

        if self.in_own_receive_loop() {
            debug!(
                "UDP socket {} closed from its receive loop, not waiting for it",
                self.inner.name
            );
        } else {
            debug!("Waiting for UDP socket {} receive loop...", self.inner.name);
            if let Err(e) = receive_task.await {
                error!(
                    "UDP socket {} receive loop ended abnormally: {}",
                    self.inner.name, e
                );
            }
        }

        info!("UDP socket {} on {} closed", self.inner.name, local_addr);
    }

    /// Sends a raw payload. Safe to call concurrently with the receive loop
    /// and with other sends.
    pub async fn send(&self, payload: &[u8], remote: SocketAddr) -> Result<usize, SocketError> {
        let udp = self
            .inner
            .state
            .lock()
            .as_ref()
            .map(|running| Arc::clone(&running.udp))
            .ok_or(SocketError::NotRunning)?;

        let sent = udp
            .send_to(payload, remote)
            .await
            .map_err(|source| SocketError::Send {
                addr: remote,
                source,
            })?;

        trace!(
            "Sent UDP datagram (socket: {}, remote: {}, bytes: {})",
            self.inner.name,
            remote,
            sent
        );
        Ok(sent)
    }

    pub async fn send_message<M: Message + Sync>(
        &self,
        message: &M,
        remote: SocketAddr,
    ) -> Result<usize, SocketError> {
        let payload = message.encode();
        self.send(&payload, remote).await
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn in_own_receive_loop(&self) -> bool {
        RECEIVE_LOOP_OWNER
            .try_with(|owner| *owner == self.id())
            .unwrap_or(false)
    }
}

/// Receive errors that say something about one peer or one call, not about
/// the socket itself.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

async fn receive_loop(
    socket: Socket,
    udp: Arc<UdpSocket>,
    mut shutdown: watch::Receiver<bool>,
    hook: Arc<dyn ReceiveHook>,
) {
    debug!("UDP socket {} receive loop started", socket.name());

    let mut buffer = vec![0u8; MAX_UDP_SIZE];

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = udp.recv_from(&mut buffer) => received,
        };

        match received {
            Ok((len, remote)) => {
                if len < HEADER_SIZE {
                    continue;
                }

                // The buffer is reused by the next receive.
                let datagram = match Datagram::new(buffer[..len].to_vec(), remote) {
                    Ok(datagram) => datagram,
                    Err(_) => continue,
                };

                trace!(
                    "Received UDP datagram (socket: {}, remote: {}, length: {}, tag: {})",
                    socket.name(),
                    remote,
                    datagram.len(),
                    datagram.tag()
                );

                let dispatched =
                    std::panic::catch_unwind(AssertUnwindSafe(|| hook.on_datagram(&socket, datagram)));
                if dispatched.is_err() {
                    error!(
                        "UDP socket {} receive hook panicked, closing socket",
                        socket.name()
                    );
                    socket.close().await;
                    break;
                }
            }
            Err(e) if is_transient(&e) => {
                trace!(
                    "Ignored UDP socket {} receive error: {}",
                    socket.name(),
                    e
                );
            }
            Err(e) => {
                error!(
                    "UDP socket {} receive loop failed, closing socket: {}",
                    socket.name(),
                    e
                );
                socket.close().await;
                break;
            }
        }
    }

    debug!("UDP socket {} receive loop stopped", socket.name());
}
