use skiff_core::DetachNotifier;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Result of feeding input through a [`DetachScanner`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Scan {
    /// Bytes to pass on. Bytes that may start the sequence are held back.
    Forward(Vec<u8>),
    /// The sequence was typed; carries the bytes that preceded it.
    Detach(Vec<u8>),
}

/// Watches an input stream for the detach key sequence.
pub(crate) struct DetachScanner {
    keys: Vec<u8>,
    held: usize,
}

impl DetachScanner {
    pub(crate) fn new(keys: &[u8]) -> Self {
        Self {
            keys: keys.to_vec(),
            held: 0,
        }
    }

    pub(crate) fn feed(&mut self, input: &[u8]) -> Scan {
        if self.keys.is_empty() {
            return Scan::Forward(input.to_vec());
        }

        let mut out = Vec::with_capacity(input.len());
        for &b in input {
            if self.held > 0 && b != self.keys[self.held] {
                // partial match broken: release what was held
                out.extend_from_slice(&self.keys[..self.held]);
                self.held = 0;
            }
            if b == self.keys[self.held] {
                self.held += 1;
                if self.held == self.keys.len() {
                    self.held = 0;
                    return Scan::Detach(out);
                }
            } else {
                out.push(b);
            }
        }
        Scan::Forward(out)
    }
}

/// Copy `reader` into `writer` until EOF, `stop`, or the detach sequence.
///
/// On detach the notifier fires and the writer is handed back so the caller can keep the
/// process's input open.
pub(crate) async fn copy_input<R, W>(
    mut reader: R,
    mut writer: W,
    mut scanner: DetachScanner,
    notifier: DetachNotifier,
    stop: CancellationToken,
) -> Option<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    loop {
        let n = tokio::select! {
            biased;
            _ = stop.cancelled() => return None,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    trace!(target: "skiff.exec.proc", "stdin closed");
                    return None;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(target: "skiff.exec.proc", error = %e, "stdin read failed");
                    return None;
                }
            },
        };

        match scanner.feed(&buf[..n]) {
            Scan::Forward(bytes) => {
                if bytes.is_empty() {
                    continue;
                }
                if let Err(e) = write_all(&mut writer, &bytes).await {
                    debug!(target: "skiff.exec.proc", error = %e, "stdin write failed");
                    return None;
                }
            }
            Scan::Detach(bytes) => {
                if !bytes.is_empty() {
                    let _ = write_all(&mut writer, &bytes).await;
                }
                debug!(target: "skiff.exec.proc", "detach sequence read");
                notifier.notify();
                return Some(writer);
            }
        }
    }
}

async fn write_all<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}
