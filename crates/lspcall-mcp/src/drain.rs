//! Background consumer for the server's stderr.
//!
//! A server that writes diagnostics faster than anyone reads them will block
//! once the pipe buffer fills, so stderr is drained for the whole session and
//! forwarded line by line to a [`DiagnosticSink`].

use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

const READ_CHUNK: usize = 4096;

/// Receives server stderr output one line at a time.
pub trait DiagnosticSink: Send {
    /// A complete line, decoded as UTF-8, without its line terminator.
    fn line(&mut self, line: &str);

    /// A line that was not valid UTF-8.
    fn undecodable(&mut self, raw: &[u8]);

    /// Reading stderr failed; the drain stops after this.
    fn read_error(&mut self, err: &io::Error) {
        tracing::warn!("error reading server stderr: {err}");
    }
}

/// Forwards server stderr into the `tracing` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn line(&mut self, line: &str) {
        tracing::info!(target: "lspcall::server_stderr", "{line}");
    }

    fn undecodable(&mut self, raw: &[u8]) {
        tracing::info!(
            target: "lspcall::server_stderr",
            "<failed to decode line: {}>",
            String::from_utf8_lossy(raw)
        );
    }
}

/// A diagnostic event captured by [`CollectingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Line(String),
    Undecodable(Vec<u8>),
    ReadError(String),
}

/// Keeps every event in memory. Clones share the same buffer, so one clone
/// can be handed to the drain and another inspected afterwards.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<Diagnostic>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Only the decoded lines, in arrival order.
    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Diagnostic::Line(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl DiagnosticSink for CollectingSink {
    fn line(&mut self, line: &str) {
        self.push(Diagnostic::Line(line.to_string()));
    }

    fn undecodable(&mut self, raw: &[u8]) {
        self.push(Diagnostic::Undecodable(raw.to_vec()));
    }

    fn read_error(&mut self, err: &io::Error) {
        self.push(Diagnostic::ReadError(err.to_string()));
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Box<S> {
    fn line(&mut self, line: &str) {
        (**self).line(line);
    }

    fn undecodable(&mut self, raw: &[u8]) {
        (**self).undecodable(raw);
    }

    fn read_error(&mut self, err: &io::Error) {
        (**self).read_error(err);
    }
}

/// Incremental line splitter: bytes in, complete lines out.
#[derive(Debug, Default)]
pub struct DrainState {
    buffer: Vec<u8>,
    lines_emitted: usize,
}

impl DrainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines handed to the sink so far.
    pub fn lines_emitted(&self) -> usize {
        self.lines_emitted
    }

    /// Append a chunk and emit every line it completes.
    pub fn feed(&mut self, chunk: &[u8], sink: &mut dyn DiagnosticSink) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.emit(&line, sink);
        }
    }

    /// Emit whatever is left without a trailing newline.
    pub fn finish(&mut self, sink: &mut dyn DiagnosticSink) {
        if self.buffer.is_empty() {
            return;
        }
        let rest = std::mem::take(&mut self.buffer);
        self.emit(&rest, sink);
    }

    fn emit(&mut self, raw: &[u8], sink: &mut dyn DiagnosticSink) {
        match std::str::from_utf8(raw) {
            Ok(text) => sink.line(text.trim_end()),
            Err(_) => sink.undecodable(raw),
        }
        self.lines_emitted += 1;
    }
}

/// Why the drain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// The stream reached end-of-file or was closed by the other side.
    EndOfStream,
    /// The coordinator cancelled the drain.
    Cancelled,
    /// A read failed; the error went to the sink.
    ReadFailed,
}

/// Summary returned when a drain finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub end: DrainEnd,
    pub lines: usize,
}

/// Consumes one stderr stream for the lifetime of a session.
pub struct StderrDrain<S> {
    sink: S,
    state: DrainState,
}

impl<S: DiagnosticSink> StderrDrain<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: DrainState::new(),
        }
    }

    /// Read `stream` until end-of-stream, a read failure, or `cancel`.
    ///
    /// Never fails: a broken pipe counts as end-of-stream and any other read
    /// error is reported to the sink. Buffered partial data is flushed on
    /// every exit path.
    pub async fn run<R>(mut self, mut stream: R, cancel: CancellationToken) -> DrainReport
    where
        R: AsyncRead + Unpin,
    {
        tracing::debug!("stderr drain started");
        let mut chunk = vec![0u8; READ_CHUNK];

        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break DrainEnd::Cancelled,
                read = stream.read(&mut chunk) => match read {
                    Ok(0) => break DrainEnd::EndOfStream,
                    Ok(n) => self.state.feed(&chunk[..n], &mut self.sink),
                    Err(e) if is_closed(&e) => break DrainEnd::EndOfStream,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.sink.read_error(&e);
                        break DrainEnd::ReadFailed;
                    }
                },
            }
        };

        self.state.finish(&mut self.sink);
        let report = DrainReport {
            end,
            lines: self.state.lines_emitted(),
        };
        tracing::debug!(end = ?report.end, lines = report.lines, "stderr drain finished");
        report
    }
}

fn is_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[test]
    fn feed_emits_complete_lines_only() {
        let mut sink = CollectingSink::new();
        let mut state = DrainState::new();

        state.feed(b"a\nb\nc", &mut sink);
        assert_eq!(sink.lines(), ["a", "b"]);
        assert_eq!(state.lines_emitted(), 2);

        state.finish(&mut sink);
        assert_eq!(sink.lines(), ["a", "b", "c"]);
        assert_eq!(state.lines_emitted(), 3);
    }

    #[test]
    fn line_split_across_chunks() {
        let mut sink = CollectingSink::new();
        let mut state = DrainState::new();
        state.feed(b"hel", &mut sink);
        assert!(sink.lines().is_empty());
        state.feed(b"lo\r\nwor", &mut sink);
        state.feed(b"ld\n", &mut sink);
        state.finish(&mut sink);
        assert_eq!(sink.lines(), ["hello", "world"]);
    }

    #[test]
    fn invalid_utf8_becomes_marker() {
        let mut sink = CollectingSink::new();
        let mut state = DrainState::new();
        state.feed(b"ok\n\xff\xfe\nafter\n", &mut sink);
        assert_eq!(
            sink.events(),
            [
                Diagnostic::Line("ok".into()),
                Diagnostic::Undecodable(b"\xff\xfe\n".to_vec()),
                Diagnostic::Line("after".into()),
            ]
        );
        assert_eq!(state.lines_emitted(), 3);
    }

    #[test]
    fn finish_on_empty_buffer_emits_nothing() {
        let mut sink = CollectingSink::new();
        let mut state = DrainState::new();
        state.feed(b"one\n", &mut sink);
        state.finish(&mut sink);
        assert_eq!(sink.lines(), ["one"]);
    }

    #[tokio::test]
    async fn run_flushes_trailing_partial_line() {
        let sink = CollectingSink::new();
        let report = StderrDrain::new(sink.clone())
            .run(&b"a\nb\nc"[..], CancellationToken::new())
            .await;
        assert_eq!(report.end, DrainEnd::EndOfStream);
        assert_eq!(report.lines, 3);
        assert_eq!(sink.lines(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn cancellation_stops_a_pending_read() {
        // The write half stays open so the read never completes on its own.
        let (_writer, reader) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(StderrDrain::new(CollectingSink::new()).run(reader, cancel.clone()));

        cancel.cancel();
        let report = tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("drain should stop promptly")
            .unwrap();
        assert_eq!(report.end, DrainEnd::Cancelled);
    }

    #[tokio::test]
    async fn tracing_sink_counts_lines() {
        let report = StderrDrain::new(TracingSink)
            .run(&b"warming up\n\xff\n"[..], CancellationToken::new())
            .await;
        assert_eq!(report.end, DrainEnd::EndOfStream);
        assert_eq!(report.lines, 2);
    }

    struct FailingReader {
        kind: io::ErrorKind,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(self.kind, "boom")))
        }
    }

    #[tokio::test]
    async fn broken_pipe_is_normal_completion() {
        let sink = CollectingSink::new();
        let report = StderrDrain::new(sink.clone())
            .run(
                FailingReader {
                    kind: io::ErrorKind::BrokenPipe,
                },
                CancellationToken::new(),
            )
            .await;
        assert_eq!(report.end, DrainEnd::EndOfStream);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn other_read_errors_go_to_the_sink() {
        let sink = CollectingSink::new();
        let report = StderrDrain::new(sink.clone())
            .run(
                FailingReader {
                    kind: io::ErrorKind::PermissionDenied,
                },
                CancellationToken::new(),
            )
            .await;
        assert_eq!(report.end, DrainEnd::ReadFailed);
        assert_eq!(sink.events(), [Diagnostic::ReadError("boom".into())]);
    }
}
