//! Blocking line reader for the merged output pipe.
//!
//! Runs on a dedicated OS thread: pipe reads block, and the worker must stay
//! responsive to cancellation. Lines are decoded lossily (the solver is not
//! guaranteed to print UTF-8) and trailing `\n` / `\r\n` is stripped.
//!
//! The channel is bounded; a slow worker back-pressures the solver through
//! the pipe instead of buffering without limit. The thread stops at EOF, on a
//! read error (forwarded as `Err`) or when the worker drops the receiver.

use std::io::{self, BufRead, BufReader, Read};
use std::thread;

use tokio::sync::mpsc;

/// Item delivered to the worker.
pub(crate) type LineResult = io::Result<String>;

pub(crate) fn spawn_line_reader<R>(
    source: R,
    capacity: usize,
) -> io::Result<(mpsc::Receiver<LineResult>, thread::JoinHandle<()>)>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = thread::Builder::new()
        .name("simvisor-reader".into())
        .spawn(move || read_lines(source, tx))?;
    Ok((rx, handle))
}

fn read_lines<R: Read>(source: R, tx: mpsc::Sender<LineResult>) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.blocking_send(Ok(line)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn collect(data: &'static [u8]) -> Vec<String> {
        let (mut rx, handle) = spawn_line_reader(Cursor::new(data), 2).unwrap();
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item.unwrap());
        }
        handle.join().unwrap();
        out
    }

    #[tokio::test]
    async fn test_strips_line_endings() {
        let lines = collect(b"iT = 1\r\nNS residual = 1e-3\nlast without newline").await;
        assert_eq!(lines, vec!["iT = 1", "NS residual = 1e-3", "last without newline"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let lines = collect(b"caf\xe9 ok\n").await;
        assert_eq!(lines, vec!["caf\u{FFFD} ok"]);
    }

    #[tokio::test]
    async fn test_read_error_is_forwarded() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("pipe broke"))
            }
        }
        let (mut rx, _h) = spawn_line_reader(Broken, 4).unwrap();
        let first = rx.recv().await.unwrap();
        assert!(first.is_err());
        assert!(rx.recv().await.is_none());
    }
}
