//! The byte source/sink behind the terminal
//!
//! The pty master (and the child process behind it) lives outside the
//! core; the controller only needs non-blocking reads and writes. A read
//! of zero bytes means the child has gone away.

use std::io;

/// A pty-like byte stream
///
/// Both directions use non-blocking semantics: `WouldBlock` from `read`
/// ends the current pump, and `WouldBlock` from `write` makes the
/// controller spill into its outbound queue.
pub trait Tty {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

impl<T: Tty + ?Sized> Tty for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }
}
