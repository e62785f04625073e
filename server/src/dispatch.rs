//! Datagram dispatch policies layered on the socket receive hook.
//!
//! Two policies are available:
//! - [`TaskedDispatcher`] runs each datagram on its own task, capped at a
//!   maximum number of live tasks. Datagrams arriving at the cap are shed.
//! - [`QueuedDispatcher`] buffers datagrams in a bounded FIFO for a consumer
//!   to drain. Datagrams arriving while the queue is full are dropped.
//!
//! In both models a handler that fails or panics closes the owning socket.

use crate::error::HandlerError;
use crate::socket::{ReceiveHook, Socket};
use log::{error, trace, warn};
use parking_lot::Mutex;
use shared::Datagram;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Datagram handler run off the receive loop.
pub trait TaskedHandler: Send + Sync + 'static {
    fn on_tasked_datagram(
        &self,
        datagram: Datagram,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// Runs the handler on its own task so a panic is observed as an error
/// instead of unwinding through the caller.
async fn run_guarded<H: TaskedHandler>(handler: Arc<H>, datagram: Datagram) -> Result<(), String> {
    let outcome =
        tokio::spawn(async move { handler.on_tasked_datagram(datagram).await }).await;

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) if e.is_panic() => Err("handler panicked".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Shed-on-overload dispatcher.
pub struct TaskedDispatcher<H> {
    handler: Arc<H>,
    live: Arc<AtomicUsize>,
    max_tasks: usize,
}

impl<H: TaskedHandler> TaskedDispatcher<H> {
    pub fn new(handler: Arc<H>, max_tasks: usize) -> Self {
        Self {
            handler,
            live: Arc::new(AtomicUsize::new(0)),
            max_tasks,
        }
    }

    /// Handler invocations currently in flight.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    fn try_acquire(&self) -> bool {
        let max = self.max_tasks;
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < max).then_some(count + 1)
            })
            .is_ok()
    }
}

impl<H: TaskedHandler> ReceiveHook for TaskedDispatcher<H> {
    fn on_datagram(&self, socket: &Socket, datagram: Datagram) {
        if !self.try_acquire() {
            trace!(
                "Shed datagram on socket {}, {} tasks already live (remote: {}, tag: {})",
                socket.name(),
                self.max_tasks,
                datagram.remote(),
                datagram.tag()
            );
            return;
        }

        let handler = Arc::clone(&self.handler);
        let live = Arc::clone(&self.live);
        let socket = socket.clone();

        tokio::spawn(async move {
            trace!("Started datagram task on socket {}", socket.name());
            let result = run_guarded(handler, datagram).await;
            live.fetch_sub(1, Ordering::AcqRel);

            match result {
                Ok(()) => trace!("Finished datagram task on socket {}", socket.name()),
                Err(e) => {
                    error!(
                        "Fatal datagram task failure on socket {}, closing: {}",
                        socket.name(),
                        e
                    );
                    socket.close().await;
                }
            }
        });
    }
}

/// Bounded FIFO dispatcher. Thread-safe; drained by a consumer.
pub struct QueuedDispatcher {
    queue: Mutex<VecDeque<Datagram>>,
    capacity: usize,
    ready: Notify,
}

impl QueuedDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn dequeue_next(&self) -> Option<Datagram> {
        let datagram = self.queue.lock().pop_front();
        if let Some(datagram) = &datagram {
            trace!(
                "Dequeued datagram (remote: {}, length: {}, tag: {})",
                datagram.remote(),
                datagram.len(),
                datagram.tag()
            );
        }
        datagram
    }

    /// Removes every queued datagram in arrival order.
    pub fn dequeue_all(&self) -> Vec<Datagram> {
        let datagrams: Vec<Datagram> = self.queue.lock().drain(..).collect();
        trace!("Dequeued all datagrams (count: {})", datagrams.len());
        datagrams
    }

    /// Resolves once something was enqueued since the last wakeup.
    pub async fn ready(&self) {
        self.ready.notified().await;
    }
}

impl ReceiveHook for QueuedDispatcher {
    fn on_datagram(&self, socket: &Socket, datagram: Datagram) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                warn!(
                    "Dropped datagram on socket {}, queue is full (remote: {}, tag: {})",
                    socket.name(),
                    datagram.remote(),
                    datagram.tag()
                );
                return;
            }
            trace!(
                "Enqueued datagram on socket {} (remote: {}, length: {}, tag: {})",
                socket.name(),
                datagram.remote(),
                datagram.len(),
                datagram.tag()
            );
            queue.push_back(datagram);
        }
        self.ready.notify_one();
    }
}

/// Consumer task draining a [`QueuedDispatcher`] into a handler, one
/// datagram at a time.
pub struct QueuePump {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl QueuePump {
    pub fn spawn<H: TaskedHandler>(
        queue: Arc<QueuedDispatcher>,
        handler: Arc<H>,
        socket: Socket,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = queue.ready() => {
                        for datagram in queue.dequeue_all() {
                            if let Err(e) = run_guarded(Arc::clone(&handler), datagram).await {
                                error!(
                                    "Fatal queued datagram failure on socket {}, closing: {}",
                                    socket.name(),
                                    e
                                );
                                socket.close().await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        Self { shutdown, task }
    }

    /// Stops the pump and waits for it. Datagrams still queued stay queued.
    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            error!("Queue pump ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::sync::Semaphore;
    use tokio::time::{sleep, timeout};

    struct Gated {
        gate: Semaphore,
        invocations: AtomicUsize,
    }

    impl Gated {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                invocations: AtomicUsize::new(0),
            }
        }

        fn invocations(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    impl TaskedHandler for Gated {
        fn on_tasked_datagram(
            &self,
            _datagram: Datagram,
        ) -> impl Future<Output = Result<(), HandlerError>> + Send {
            async move {
                self.invocations.fetch_add(1, Ordering::SeqCst);
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|e| HandlerError::invariant(e.to_string()))?;
                Ok(())
            }
        }
    }

    struct Failing {
        panic: bool,
    }

    impl TaskedHandler for Failing {
        fn on_tasked_datagram(
            &self,
            _datagram: Datagram,
        ) -> impl Future<Output = Result<(), HandlerError>> + Send {
            let panic = self.panic;
            async move {
                if panic {
                    panic!("handler bug");
                }
                Err(HandlerError::invariant("broken state"))
            }
        }
    }

    struct Counting {
        seen: Mutex<Vec<u8>>,
    }

    impl TaskedHandler for Counting {
        fn on_tasked_datagram(
            &self,
            datagram: Datagram,
        ) -> impl Future<Output = Result<(), HandlerError>> + Send {
            self.seen.lock().push(datagram.tag());
            async { Ok(()) }
        }
    }

    fn test_datagram(tag: u8) -> Datagram {
        Datagram::new(vec![tag], "127.0.0.1:9000".parse().unwrap()).unwrap()
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !condition() {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_shed_when_at_capacity() {
        let handler = Arc::new(Gated::new());
        let dispatcher = TaskedDispatcher::new(Arc::clone(&handler), 2);
        let socket = Socket::new("shed");

        dispatcher.on_datagram(&socket, test_datagram(5));
        dispatcher.on_datagram(&socket, test_datagram(5));
        assert_eq!(dispatcher.live_count(), 2);

        // At the cap: no invocation, live count unchanged.
        dispatcher.on_datagram(&socket, test_datagram(5));
        assert_eq!(dispatcher.live_count(), 2);

        wait_until(|| handler.invocations() == 2).await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(handler.invocations(), 2);

        handler.gate.add_permits(2);
        wait_until(|| dispatcher.live_count() == 0).await;

        dispatcher.on_datagram(&socket, test_datagram(5));
        wait_until(|| handler.invocations() == 3).await;
        handler.gate.add_permits(1);
        wait_until(|| dispatcher.live_count() == 0).await;
    }

    #[tokio::test]
    async fn test_failing_handler_closes_socket() {
        let dispatcher = Arc::new(TaskedDispatcher::new(
            Arc::new(Failing { panic: false }),
            4,
        ));
        let socket = Socket::new("failing");
        let addr = socket.start(loopback(), dispatcher.clone()).await.unwrap();

        let peer = UdpSocket::bind(loopback()).await.unwrap();
        peer.send_to(&[3], addr).await.unwrap();

        wait_until(|| !socket.is_running()).await;
        wait_until(|| dispatcher.live_count() == 0).await;
    }

    #[tokio::test]
    async fn test_panicking_handler_closes_socket() {
        let dispatcher = Arc::new(TaskedDispatcher::new(
            Arc::new(Failing { panic: true }),
            4,
        ));
        let socket = Socket::new("panicking");
        let addr = socket.start(loopback(), dispatcher.clone()).await.unwrap();

        let peer = UdpSocket::bind(loopback()).await.unwrap();
        peer.send_to(&[3], addr).await.unwrap();

        wait_until(|| !socket.is_running()).await;
        wait_until(|| dispatcher.live_count() == 0).await;
    }

    #[test]
    fn test_queue_drops_when_full() {
        let queue = QueuedDispatcher::new(2);
        let socket = Socket::new("queue");

        queue.on_datagram(&socket, test_datagram(1));
        queue.on_datagram(&socket, test_datagram(2));
        queue.on_datagram(&socket, test_datagram(3));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.capacity(), 2);
        assert_eq!(queue.dequeue_next().map(|d| d.tag()), Some(1));

        queue.on_datagram(&socket, test_datagram(4));
        let tags: Vec<u8> = queue.dequeue_all().iter().map(|d| d.tag()).collect();
        assert_eq!(tags, vec![2, 4]);
        assert!(queue.is_empty());
        assert!(queue.dequeue_next().is_none());
    }

    #[tokio::test]
    async fn test_queue_pump_drains_in_order() {
        let queue = Arc::new(QueuedDispatcher::new(16));
        let handler = Arc::new(Counting {
            seen: Mutex::new(Vec::new()),
        });
        let socket = Socket::new("pumped");
        let addr = socket.start(loopback(), queue.clone()).await.unwrap();
        let pump = QueuePump::spawn(Arc::clone(&queue), Arc::clone(&handler), socket.clone());

        let peer = UdpSocket::bind(loopback()).await.unwrap();
        for tag in [7u8, 8, 9] {
            peer.send_to(&[tag], addr).await.unwrap();
        }

        wait_until(|| handler.seen.lock().len() == 3).await;
        assert_eq!(*handler.seen.lock(), vec![7, 8, 9]);

        pump.stop().await;
        socket.close().await;
    }
}
