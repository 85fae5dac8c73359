//! # Input Streams
//!
//! The byte sources a decoding session reads from.
//!
//! Plugins never call [`InputStream::read`] directly; they go through the
//! stream access functions in [`crate::stream_access`], which make every
//! blocking read interruptible by a pending command.

use bytes::{Buf, BytesMut};
use parking_lot::{Condvar, Mutex};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::{debug, trace};

/// Callback invoked whenever an input stream may have become readable.
pub type ReadyHandler = Arc<dyn Fn() + Send + Sync>;

/// A byte source owned by one decoding session.
pub trait InputStream: Send {
    /// Location this stream was opened from.
    fn uri(&self) -> &str;

    /// Returns `true` if [`InputStream::seek`] can be used.
    fn is_seekable(&self) -> bool;

    /// Total size in bytes, if known.
    fn size(&self) -> Option<u64>;

    /// Current read position.
    fn offset(&self) -> u64;

    /// Returns `true` once the end of the stream has been reached.
    fn is_eof(&self) -> bool;

    /// Returns `true` if a call to [`InputStream::read`] would not block:
    /// data is buffered, or the stream has ended or failed.
    fn is_available(&self) -> bool {
        true
    }

    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move the read position to `offset` bytes from the start.
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Register a callback fired when the stream becomes available.
    ///
    /// Streams that are always available may ignore it.
    fn set_ready_handler(&mut self, _handler: ReadyHandler) {}
}

// ============================================================================
// Reader-backed stream
// ============================================================================

/// Seekable stream over any `Read + Seek` source (files, in-memory cursors).
///
/// Always available: reads may block on the underlying source but never
/// wait for a producer.
pub struct ReaderInputStream<R> {
    uri: String,
    reader: R,
    size: Option<u64>,
    offset: u64,
}

impl<R: Read + Seek + Send> ReaderInputStream<R> {
    /// Wrap `reader`, measuring its size and rewinding it to the start.
    pub fn new(uri: impl Into<String>, mut reader: R) -> io::Result<Self> {
        let size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        Ok(Self {
            uri: uri.into(),
            reader,
            size: Some(size),
            offset: 0,
        })
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl ReaderInputStream<std::fs::File> {
    /// Open a file from disk.
    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        Self::new(path.display().to_string(), file)
    }
}

impl<R: Read + Seek + Send> InputStream for ReaderInputStream<R> {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn is_eof(&self) -> bool {
        self.size.is_some_and(|size| self.offset >= size)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.offset = self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl<R> std::fmt::Debug for ReaderInputStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderInputStream")
            .field("uri", &self.uri)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .finish()
    }
}

// ============================================================================
// Producer-fed stream
// ============================================================================

#[derive(Default)]
struct FeedState {
    buffer: BytesMut,
    finished: bool,
    error: Option<(io::ErrorKind, String)>,
    handler: Option<ReadyHandler>,
}

impl FeedState {
    fn is_available(&self) -> bool {
        !self.buffer.is_empty() || self.finished || self.error.is_some()
    }
}

struct Feed {
    state: Mutex<FeedState>,
    cond: Condvar,
}

/// Non-seekable stream fed by another thread through an [`InputFeeder`].
///
/// Models network sources: data arrives in bursts, and a read issued
/// while the buffer is empty blocks until the feeder delivers.
pub struct BufferedInputStream {
    uri: String,
    feed: Arc<Feed>,
    size: Option<u64>,
    offset: u64,
}

/// Producer half of a [`BufferedInputStream`].
///
/// Dropping the feeder ends the stream.
pub struct InputFeeder {
    feed: Arc<Feed>,
}

impl BufferedInputStream {
    /// Create a stream and the feeder that supplies it.
    pub fn new(uri: impl Into<String>) -> (Self, InputFeeder) {
        let feed = Arc::new(Feed {
            state: Mutex::new(FeedState::default()),
            cond: Condvar::new(),
        });

        let stream = Self {
            uri: uri.into(),
            feed: Arc::clone(&feed),
            size: None,
            offset: 0,
        };
        (stream, InputFeeder { feed })
    }

    /// Announce the total size, e.g. from a `Content-Length` header.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Bytes received but not yet read.
    pub fn buffered(&self) -> usize {
        self.feed.state.lock().buffer.len()
    }
}

impl InputStream for BufferedInputStream {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn is_eof(&self) -> bool {
        let state = self.feed.state.lock();
        state.finished && state.buffer.is_empty() && state.error.is_none()
    }

    fn is_available(&self) -> bool {
        self.feed.state.lock().is_available()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.feed.state.lock();
        while !state.is_available() {
            self.feed.cond.wait(&mut state);
        }

        if !state.buffer.is_empty() {
            let n = buf.len().min(state.buffer.len());
            buf[..n].copy_from_slice(&state.buffer[..n]);
            state.buffer.advance(n);
            self.offset += n as u64;
            return Ok(n);
        }

        match &state.error {
            Some((kind, message)) => Err(io::Error::new(*kind, message.clone())),
            None => Ok(0),
        }
    }

    fn seek(&mut self, _offset: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream is not seekable",
        ))
    }

    fn set_ready_handler(&mut self, handler: ReadyHandler) {
        self.feed.state.lock().handler = Some(handler);
    }
}

impl std::fmt::Debug for BufferedInputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedInputStream")
            .field("uri", &self.uri)
            .field("offset", &self.offset)
            .finish()
    }
}

impl InputFeeder {
    /// Append received bytes.
    pub fn push(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.update(|state| {
            if !state.finished {
                state.buffer.extend_from_slice(data);
            }
        });
        trace!(bytes = data.len(), "Input data received");
    }

    /// Signal the end of the stream.
    pub fn finish(&self) {
        self.update(|state| state.finished = true);
        debug!("Input finished");
    }

    /// Fail the stream. Buffered bytes remain readable first.
    pub fn fail(&self, error: io::Error) {
        debug!(error = %error, "Input failed");
        let entry = (error.kind(), error.to_string());
        self.update(|state| {
            state.error = Some(entry);
            state.finished = true;
        });
    }

    // The feed lock is released before the handler runs; the handler
    // takes the control lock, which is always acquired first elsewhere.
    fn update(&self, apply: impl FnOnce(&mut FeedState)) {
        let handler = {
            let mut state = self.feed.state.lock();
            apply(&mut state);
            state.handler.clone()
        };
        self.feed.cond.notify_all();

        if let Some(handler) = handler {
            handler();
        }
    }
}

impl Drop for InputFeeder {
    fn drop(&mut self) {
        let finished = self.feed.state.lock().finished;
        if !finished {
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reader_stream_tracks_offset_and_size() {
        let mut input = ReaderInputStream::new("mem://a", Cursor::new(vec![7u8; 10])).unwrap();
        assert_eq!(input.size(), Some(10));
        assert!(input.is_seekable());
        assert!(input.is_available());

        let mut buf = [0u8; 4];
        assert_eq!(input.read(&mut buf).unwrap(), 4);
        assert_eq!(input.offset(), 4);

        input.seek(8).unwrap();
        assert_eq!(input.read(&mut buf).unwrap(), 2);
        assert!(input.is_eof());
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn buffered_stream_delivers_in_order() {
        let (mut input, feeder) = BufferedInputStream::new("http://radio");
        assert!(!input.is_available());
        assert!(!input.is_seekable());

        feeder.push(&[1, 2, 3]);
        feeder.push(&[4, 5]);
        assert!(input.is_available());

        let mut buf = [0u8; 4];
        assert_eq!(input.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(input.buffered(), 1);

        feeder.finish();
        assert_eq!(input.read(&mut buf).unwrap(), 1);
        assert_eq!(input.read(&mut buf).unwrap(), 0);
        assert!(input.is_eof());
        assert_eq!(input.offset(), 5);
    }

    #[test]
    fn buffered_stream_reports_failure_after_data() {
        let (mut input, feeder) = BufferedInputStream::new("http://radio");
        feeder.push(&[9]);
        feeder.fail(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));

        let mut buf = [0u8; 4];
        assert_eq!(input.read(&mut buf).unwrap(), 1);
        let err = input.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(!input.is_eof());
    }

    #[test]
    fn feeder_fires_ready_handler() {
        let (mut input, feeder) = BufferedInputStream::new("http://radio");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        input.set_ready_handler(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        feeder.push(&[1]);
        feeder.finish();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn blocked_read_wakes_on_push() {
        let (mut input, feeder) = BufferedInputStream::new("http://radio");
        let producer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            feeder.push(&[42]);
        });

        let mut buf = [0u8; 1];
        assert_eq!(input.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 42);
        producer.join().unwrap();
    }

    #[test]
    fn dropping_feeder_ends_stream() {
        let (mut input, feeder) = BufferedInputStream::new("http://radio");
        drop(feeder);
        let mut buf = [0u8; 1];
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }
}
