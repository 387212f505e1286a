use std::{
    io::{self, Read},
    pin::Pin,
    task::{Context, Poll, ready},
};

use tokio::{
    io::{AsyncRead, ReadBuf},
    sync::mpsc,
};
use tracing::trace;

/// Async view of a blocking reader that runs on its own detached thread.
///
/// A read blocked on a terminal cannot be interrupted, and tokio's runtime waits for its
/// blocking pool on shutdown. A plain thread is abandoned instead: dropping the reader
/// stops the hand-off, and the thread exits after its next read or with the process.
pub(crate) struct ThreadReader {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl ThreadReader {
    pub(crate) fn spawn<R>(mut src: R) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(4);
        std::thread::Builder::new()
            .name("skiff-stdin".into())
            .spawn(move || {
                let mut buf = [0u8; 1024];
                loop {
                    let item = match src.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => Ok(buf[..n].to_vec()),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => Err(e),
                    };
                    let failed = item.is_err();
                    if tx.blocking_send(item).is_err() || failed {
                        break;
                    }
                }
                trace!(target: "skiff.exec.proc", "input thread finished");
            })?;

        Ok(Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        })
    }
}

impl AsyncRead for ThreadReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.pos == this.chunk.len() {
            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(())),
            }
        }

        let n = (this.chunk.len() - this.pos).min(buf.remaining());
        buf.put_slice(&this.chunk[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::{os::unix::net::UnixStream, time::Duration};

    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn reads_until_eof() {
        let mut r = ThreadReader::spawn(&b"hello"[..]).unwrap();
        let mut out = String::new();
        r.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn small_buffers_see_whole_chunk() {
        let mut r = ThreadReader::spawn(&b"abcdef"[..]).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(r.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn blocked_source_does_not_hold_runtime() {
        let (_writer, source) = UnixStream::pair().unwrap();
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let mut r = ThreadReader::spawn(source).unwrap();
                let mut buf = [0u8; 8];
                let res = tokio::time::timeout(Duration::from_millis(50), r.read(&mut buf)).await;
                assert!(res.is_err());
            });
            drop(rt);
            let _ = done_tx.send(());
        });

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
