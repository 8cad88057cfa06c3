//! Integration tests: the full write path against a live loop thread.
//!
//! Each test wires a `SocketOutput` to a real `LoopThread` and
//! `CompletionPool` plus an in-memory stream handle that completes its
//! requests through the loop, then drives it from producer threads.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use flowline::{
    BlockPool, BufView, CompletionPool, Config, Dispatcher, EndKind, Error, LoopHandle,
    LoopThread, NullTracer, ShutdownDone, SocketHandle, SocketOutput, Supervisor, WriteDone,
};

// ── In-memory stream handle ─────────────────────────────────────────

/// Copies submitted bytes immediately (submission happens on the loop
/// thread) and posts the completion callback back onto the loop, so
/// completions interleave with drains the way a real reactor's would.
struct MemorySocket {
    loop_handle: LoopHandle,
    received: Mutex<Vec<u8>>,
    fin_sent: AtomicBool,
    closed: AtomicBool,
    disposed: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySocket {
    fn new(loop_handle: LoopHandle) -> Self {
        MemorySocket {
            loop_handle,
            received: Mutex::new(Vec::new()),
            fin_sent: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }
}

impl SocketHandle for MemorySocket {
    fn submit_write(&self, bufs: &[BufView], done: WriteDone) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return self.loop_handle.post(Box::new(move || done(-libc::EPIPE)));
        }
        let mut n = 0usize;
        {
            let mut received = self.received.lock().unwrap();
            for view in bufs {
                received.extend_from_slice(unsafe { view.as_slice() });
                n += view.len();
            }
        }
        self.loop_handle.post(Box::new(move || done(n as i32)))
    }

    fn submit_shutdown(&self, done: ShutdownDone) -> Result<(), Error> {
        self.fin_sent.store(true, Ordering::Relaxed);
        self.loop_handle.post(Box::new(move || done(0)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Relaxed);
        self.closed.store(true, Ordering::Relaxed);
    }
}

struct AbortSupervisor {
    socket: Arc<MemorySocket>,
    aborts: AtomicU32,
}

impl Supervisor for AbortSupervisor {
    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
        self.socket.closed.store(true, Ordering::Relaxed);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

struct Rig {
    output: SocketOutput,
    loop_thread: LoopThread,
    socket: Arc<MemorySocket>,
    supervisor: Arc<AbortSupervisor>,
    pool: Arc<BlockPool>,
}

fn rig() -> Rig {
    let config = Config {
        initial_blocks: 16,
        max_free_blocks: 1024,
        completion_threads: 2,
    };
    let loop_thread = LoopThread::spawn().unwrap();
    let socket = Arc::new(MemorySocket::new(loop_thread.handle()));
    let supervisor = Arc::new(AbortSupervisor {
        socket: socket.clone(),
        aborts: AtomicU32::new(0),
    });
    let pool = Arc::new(BlockPool::new(&config));
    let output = SocketOutput::new(
        1,
        socket.clone(),
        Arc::new(loop_thread.handle()),
        pool.clone(),
        Arc::new(CompletionPool::new(&config).unwrap()),
        supervisor.clone(),
        Arc::new(NullTracer),
    );
    Rig {
        output,
        loop_thread,
        socket,
        supervisor,
        pool,
    }
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("timed out waiting for {what}");
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn producer_order_is_preserved_across_threads() {
    const PRODUCERS: usize = 4;
    const WRITES: usize = 100;
    const CHUNK: usize = 32;

    let r = rig();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let output = r.output.clone();
            thread::spawn(move || {
                for seq in 0..WRITES {
                    let mut chunk = [p as u8; CHUNK];
                    chunk[1] = (seq & 0xFF) as u8;
                    chunk[2] = (seq >> 8) as u8;
                    let _ = output.write_async(&chunk, true, false, false).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = PRODUCERS * WRITES * CHUNK;
    wait_until("all bytes received", || r.socket.received().len() == total);
    wait_until("pool drained", || r.pool.outstanding() == 0);

    // Each write is appended atomically under the output lock, so the stream
    // is a sequence of whole chunks, and each producer's sequence numbers
    // must appear in issue order.
    let received = r.socket.received();
    let mut next_seq = [0usize; PRODUCERS];
    for chunk in received.chunks_exact(CHUNK) {
        let p = chunk[0] as usize;
        let seq = chunk[1] as usize | (chunk[2] as usize) << 8;
        assert_eq!(seq, next_seq[p], "producer {p} out of order");
        next_seq[p] += 1;
    }
    assert_eq!(next_seq, [WRITES; PRODUCERS]);

    r.loop_thread.join().unwrap();
}

#[test]
fn blocking_writes_flow_through_backpressure() {
    const WRITES: usize = 20;
    const SIZE: usize = 60000;

    let r = rig();

    for i in 0..WRITES {
        let buf = vec![i as u8; SIZE];
        r.output.write(&buf, true).unwrap();
    }

    wait_until("all bytes received", || {
        r.socket.received().len() == WRITES * SIZE
    });
    wait_until("pool drained", || r.pool.outstanding() == 0);

    let received = r.socket.received();
    for (i, span) in received.chunks_exact(SIZE).enumerate() {
        assert!(span.iter().all(|&b| b == i as u8), "write {i} corrupted");
    }

    r.loop_thread.join().unwrap();
}

#[test]
fn graceful_close_sends_fin_then_disposes() {
    let r = rig();

    r.output.write(b"goodbye", true).unwrap();
    r.output.end(EndKind::ShutdownSend).unwrap();
    r.output.end(EndKind::Disconnect).unwrap();

    wait_until("fin sent", || r.socket.fin_sent.load(Ordering::Relaxed));
    wait_until("disposed", || r.socket.disposed.load(Ordering::Relaxed));
    wait_until("pool drained", || r.pool.outstanding() == 0);

    assert_eq!(r.socket.received(), b"goodbye");
    assert_eq!(r.supervisor.aborts.load(Ordering::Relaxed), 0);

    r.loop_thread.join().unwrap();
}

#[test]
fn write_failure_aborts_and_fails_later_writes() {
    let r = rig();
    r.socket.fail_writes.store(true, Ordering::Relaxed);

    // Fits the pre-completion budget, so this one reports success to the
    // producer; the failure lands in the completion callback.
    r.output.write(&[0u8; 1000], true).unwrap();
    wait_until("abort", || r.supervisor.aborts.load(Ordering::Relaxed) == 1);

    // The next producer is admitted but resolves with the latched error.
    match r.output.write(&[0u8; 1000], true) {
        Err(Error::Io(e)) => assert_eq!(e.raw_os_error(), Some(libc::EPIPE)),
        other => panic!("unexpected result: {other:?}"),
    }

    wait_until("pool drained", || r.pool.outstanding() == 0);
    assert_eq!(r.supervisor.aborts.load(Ordering::Relaxed), 1);
    assert!(r.socket.received().is_empty());

    r.loop_thread.join().unwrap();
}
