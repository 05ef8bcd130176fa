use crate::sys::platform;

use std::io;
use std::os::fd::RawFd;

/// Size of the scratch buffer used to empty the pipe.
const DRAIN_CHUNK: usize = 100;

/// Self-wakeup pipe of the poll server.
///
/// Writing a byte to the pipe makes the read end readable, which
/// interrupts the server's blocking wait. Both ends are non-blocking and
/// close-on-exec.
pub(crate) struct Wakeup {
    reader: RawFd,
    writer: RawFd,
}

impl Wakeup {
    pub(crate) fn new() -> io::Result<Self> {
        let (reader, writer) = platform::pipe()?;

        Ok(Self { reader, writer })
    }

    /// Read end, registered persistently with the poller.
    pub(crate) fn reader(&self) -> RawFd {
        self.reader
    }

    /// Interrupts the server's blocking wait.
    ///
    /// A full pipe already guarantees a pending wakeup, so `EAGAIN` is
    /// ignored.
    pub(crate) fn signal(&self) {
        match platform::write(self.writer, &[0]) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => log::warn!("poll server wakeup write failed: {e}"),
        }
    }

    /// Reads everything buffered in the pipe.
    pub(crate) fn drain(&self) {
        let mut scratch = [0u8; DRAIN_CHUNK];

        loop {
            match platform::read(self.reader, &mut scratch) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }
}

impl Drop for Wakeup {
    fn drop(&mut self) {
        let _ = platform::close(self.reader);
        let _ = platform::close(self.writer);
    }
}
