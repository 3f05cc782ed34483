//! # Process Output
//!
//! Every byte a supervised child writes to stdout or stderr is pumped into
//! a [`FanOutWriter`], which forwards it to:
//!
//! - the session's [`SharedBuffer`] (always)
//! - a [`ReadinessScanner`] when readiness is detected from the log
//! - a [`SinkForwarder`] for the caller-supplied sink (optional)
//!
//! The caller's sink is a blocking [`Write`] of unknown speed, so it never
//! runs on the pump: the forwarder queues chunks for a blocking task that
//! owns the sink. A slow sink cannot delay the buffer or the scanner.
//!
//! A sink that fails is dropped with a warning; the others keep receiving
//! output.

use crate::constants::OUTPUT_CHUNK_SIZE;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Caller-supplied destination for a child's stdout or stderr
pub type OutputSink = Box<dyn Write + Send>;

/// Growable byte buffer shared between the output pump and readers
///
/// Cloning yields another handle onto the same bytes, so a handle taken
/// right after `start()` keeps seeing output as it arrives.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Snapshot decoded as UTF-8 (invalid sequences replaced)
    #[must_use]
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        contains_bytes(&self.lock(), needle.as_bytes())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Forwards writes to every registered sink
///
/// Never returns an error itself; failing sinks are removed.
pub struct FanOutWriter {
    stream: &'static str,
    sinks: Vec<OutputSink>,
}

impl std::fmt::Debug for FanOutWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutWriter")
            .field("stream", &self.stream)
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

impl FanOutWriter {
    /// `stream` names the pipe ("stdout"/"stderr") in log messages
    #[must_use]
    pub fn new(stream: &'static str) -> Self {
        Self {
            stream,
            sinks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.push(sink);
        self
    }

    pub fn push(&mut self, sink: OutputSink) {
        self.sinks.push(sink);
    }

    /// Number of sinks still receiving output
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Write for FanOutWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let stream = self.stream;
        self.sinks.retain_mut(|sink| match sink.write_all(buf) {
            Ok(()) => true,
            Err(e) => {
                warn!(stream, error = %e, "Dropping output sink after write failure");
                false
            }
        });
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let stream = self.stream;
        self.sinks.retain_mut(|sink| match sink.flush() {
            Ok(()) => true,
            Err(e) => {
                warn!(stream, error = %e, "Dropping output sink after flush failure");
                false
            }
        });
        Ok(())
    }
}

/// Watches a byte stream for a literal marker
///
/// Keeps just enough of the previous chunk to find markers split across
/// reads. Flips the shared `watch` channel to `true` on the first match.
pub struct ReadinessScanner {
    needle: Vec<u8>,
    tail: Vec<u8>,
    found: bool,
    ready: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for ReadinessScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessScanner")
            .field("needle", &String::from_utf8_lossy(&self.needle))
            .field("found", &self.found)
            .finish_non_exhaustive()
    }
}

impl ReadinessScanner {
    #[must_use]
    pub fn new(needle: &str, ready: Arc<watch::Sender<bool>>) -> Self {
        Self {
            needle: needle.as_bytes().to_vec(),
            tail: Vec::new(),
            found: false,
            ready,
        }
    }
}

impl Write for ReadinessScanner {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.found {
            return Ok(buf.len());
        }

        self.tail.extend_from_slice(buf);
        if contains_bytes(&self.tail, &self.needle) {
            self.found = true;
            self.tail = Vec::new();
            self.ready.send_replace(true);
        } else {
            let keep = self.needle.len().saturating_sub(1);
            if self.tail.len() > keep {
                self.tail.drain(..self.tail.len() - keep);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Non-blocking [`Write`] that queues chunks for a caller sink
///
/// Writes only fail once the sink task has given up on its sink.
#[derive(Debug)]
pub struct SinkForwarder {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Write for SinkForwarder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, format!("output sink closed: {e}")))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Move `sink` onto a blocking task fed by the returned forwarder
///
/// The task writes every queued chunk in order and exits once the
/// forwarder is dropped and the queue is empty, or when the sink fails.
pub(crate) fn spawn_sink_writer(
    stream: &'static str,
    mut sink: OutputSink,
) -> (SinkForwarder, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let handle = tokio::task::spawn_blocking(move || {
        while let Some(chunk) = rx.blocking_recv() {
            if let Err(e) = sink.write_all(&chunk) {
                warn!(stream, error = %e, "Dropping output sink after write failure");
                return;
            }
        }
        if let Err(e) = sink.flush() {
            debug!(stream, error = %e, "Output sink flush failed");
        }
    });
    (SinkForwarder { tx }, handle)
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// Copy `reader` into `writer` until EOF on a background task
pub(crate) fn spawn_pump<R>(mut reader: R, mut writer: FanOutWriter) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; OUTPUT_CHUNK_SIZE];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = writer.write_all(&chunk[..n]) {
                        warn!(stream = writer.stream, error = %e, "Output fan-out failed");
                    }
                }
                Err(e) => {
                    debug!(stream = writer.stream, error = %e, "Output pipe read failed");
                    break;
                }
            }
        }
        if let Err(e) = writer.flush() {
            debug!(stream = writer.stream, error = %e, "Output flush failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that always fails
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_shared_buffer_handles_see_same_bytes() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(buffer.contents_lossy(), "hello world");
        assert!(buffer.contains("lo wo"));
        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn test_fan_out_drops_failing_sink_and_keeps_others() {
        let good = SharedBuffer::new();
        let mut fan_out = FanOutWriter::new("stdout")
            .with_sink(Box::new(BrokenSink))
            .with_sink(Box::new(good.clone()));
        assert_eq!(fan_out.len(), 2);

        fan_out.write_all(b"first").unwrap();
        assert_eq!(fan_out.len(), 1);

        fan_out.write_all(b" second").unwrap();
        assert_eq!(good.contents_lossy(), "first second");
    }

    #[test]
    fn test_scanner_finds_marker_split_across_writes() {
        let (tx, rx) = watch::channel(false);
        let mut scanner = ReadinessScanner::new("serving client requests", Arc::new(tx));

        scanner.write_all(b"noise noise serving cli").unwrap();
        assert!(!*rx.borrow());
        scanner.write_all(b"ent requests on 127.0.0.1").unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_scanner_ignores_unrelated_output() {
        let (tx, rx) = watch::channel(false);
        let mut scanner = ReadinessScanner::new("ready", Arc::new(tx));
        for _ in 0..100 {
            scanner.write_all(b"still warming up\n").unwrap();
        }
        assert!(!*rx.borrow());
        assert!(scanner.tail.len() < "ready".len());
    }

    /// Sink that sleeps on every write
    struct SlowSink {
        delay: std::time::Duration,
        inner: SharedBuffer,
    }

    impl Write for SlowSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            std::thread::sleep(self.delay);
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_sink_does_not_hold_back_scanner() {
        let forwarded = SharedBuffer::new();
        let (forwarder, sink_task) = spawn_sink_writer(
            "stdout",
            Box::new(SlowSink {
                delay: std::time::Duration::from_millis(500),
                inner: forwarded.clone(),
            }),
        );
        let (tx, rx) = watch::channel(false);
        let buffer = SharedBuffer::new();
        let mut fan_out = FanOutWriter::new("stdout")
            .with_sink(Box::new(buffer.clone()))
            .with_sink(Box::new(ReadinessScanner::new("READY", Arc::new(tx))))
            .with_sink(Box::new(forwarder));

        let started = std::time::Instant::now();
        fan_out.write_all(b"booting\n").unwrap();
        fan_out.write_all(b"READY\n").unwrap();
        assert!(started.elapsed() < std::time::Duration::from_millis(200));
        assert!(*rx.borrow());
        assert_eq!(buffer.contents_lossy(), "booting\nREADY\n");

        drop(fan_out);
        sink_task.await.unwrap();
        assert_eq!(forwarded.contents_lossy(), "booting\nREADY\n");
    }

    #[tokio::test]
    async fn test_forwarder_fails_once_sink_is_gone() {
        let (mut forwarder, sink_task) = spawn_sink_writer("stderr", Box::new(BrokenSink));
        forwarder.write_all(b"first").unwrap();
        sink_task.await.unwrap();
        assert!(forwarder.write_all(b"second").is_err());
    }

    #[tokio::test]
    async fn test_pump_copies_until_eof() {
        let buffer = SharedBuffer::new();
        let data: &[u8] = b"line one\nline two\n";
        let handle = spawn_pump(data, FanOutWriter::new("stdout").with_sink(Box::new(buffer.clone())));
        handle.await.unwrap();
        assert_eq!(buffer.contents_lossy(), "line one\nline two\n");
    }
}
