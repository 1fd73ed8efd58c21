//! Buffered byte stream over a [`Content`] buffer.
//!
//! A single fixed-capacity window moves over the underlying buffer. For
//! readable modes the window is filled on open; reads advance a cursor
//! inside it and load the next block when it is exhausted. Writes dirty
//! the window, which is flushed on overflow, [`flush`](ByteStream::flush),
//! [`close`](ByteStream::close), or a seek that leaves it. Dropping the
//! stream flushes pending writes, so content is never lost when a scope
//! unwinds early; use `close` to observe flush errors.

use crate::content::Content;
use crate::error::{Result, VfsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Idle,
    Read,
    Write,
}

pub struct ByteStream<'a> {
    content: &'a mut Content,
    mode: StreamMode,
    capacity: usize,
    window: Vec<u8>,
    /// Buffer offset of the window start.
    win_start: usize,
    /// Valid bytes in the window.
    win_used: usize,
    /// Cursor inside the window.
    win_pos: usize,
    dirty: bool,
    eof: bool,
    role: Role,
}

impl<'a> ByteStream<'a> {
    pub fn open(content: &'a mut Content, mode: StreamMode, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(VfsError::InvalidArg(
                "stream window capacity must be non-zero".into(),
            ));
        }
        let mut stream = ByteStream {
            content,
            mode,
            capacity,
            window: vec![0; capacity],
            win_start: 0,
            win_used: 0,
            win_pos: 0,
            dirty: false,
            eof: false,
            role: Role::Idle,
        };
        if stream.can_read() {
            stream.fill_window(0)?;
        }
        Ok(stream)
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok((self.read(&mut byte)? == 1).then_some(byte[0]))
    }

    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.ensure_readable()?;
        if dst.is_empty() {
            return Ok(0);
        }
        let mut total = 0;
        while total < dst.len() {
            if self.win_pos >= self.win_used {
                let next = self.win_start + self.win_used;
                self.fill_window(next)?;
                if self.win_used == 0 {
                    break;
                }
            }
            let available = self.win_used - self.win_pos;
            let chunk = available.min(dst.len() - total);
            dst[total..total + chunk]
                .copy_from_slice(&self.window[self.win_pos..self.win_pos + chunk]);
            self.win_pos += chunk;
            total += chunk;
        }
        if total == 0 && self.win_used == 0 {
            self.eof = true;
        }
        Ok(total)
    }

    pub fn read_char(&mut self) -> Result<Option<char>> {
        Ok(self.read_byte()?.map(char::from))
    }

    /// Read up to the next `\n` (consumed, not returned) or end of buffer.
    pub fn read_line(&mut self) -> Result<String> {
        self.ensure_readable()?;
        let mut line = String::new();
        while let Some(ch) = self.read_char()? {
            if ch == '\n' {
                break;
            }
            line.push(ch);
        }
        Ok(line)
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte]).map(|_| ())
    }

    pub fn write(&mut self, src: &[u8]) -> Result<usize> {
        self.ensure_writable()?;
        if src.is_empty() {
            return Ok(0);
        }
        self.prepare_for_write();
        let mut total = 0;
        while total < src.len() {
            if self.win_pos >= self.capacity {
                self.flush_window()?;
            }
            let space = self.capacity - self.win_pos;
            let chunk = space.min(src.len() - total);
            self.window[self.win_pos..self.win_pos + chunk]
                .copy_from_slice(&src[total..total + chunk]);
            self.win_pos += chunk;
            self.win_used = self.win_used.max(self.win_pos);
            self.dirty = true;
            total += chunk;
            if self.win_pos == self.capacity {
                self.flush_window()?;
            }
        }
        Ok(total)
    }

    /// Write a single byte-sized character.
    pub fn write_char(&mut self, ch: char) -> Result<()> {
        self.write_byte(ch as u8)
    }

    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.write(text.as_bytes()).map(|_| ())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.can_write() {
            self.flush_window()?;
        }
        Ok(())
    }

    pub fn tell(&self) -> usize {
        self.win_start + self.win_pos
    }

    /// Seek to an absolute position. Seeking within the current read
    /// window only moves the cursor; otherwise the window is reset at the
    /// target position.
    pub fn seek(&mut self, pos: usize) -> Result<usize> {
        if self.can_write() && self.dirty {
            self.flush_window()?;
        }
        if self.can_read() && self.role == Role::Read {
            let start = self.win_start;
            let end = self.win_start + self.win_used;
            if pos >= start && pos <= end {
                self.win_pos = pos - start;
                self.eof = false;
                return Ok(self.tell());
            }
        }
        self.win_start = pos;
        self.win_pos = 0;
        self.win_used = 0;
        self.eof = false;
        self.role = Role::Idle;
        if self.can_read() {
            self.fill_window(pos)?;
        } else if self.can_write() {
            self.role = Role::Write;
        }
        Ok(self.tell())
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Flush pending writes and consume the stream.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.can_write() && self.dirty {
            self.flush_window()?;
        }
        Ok(())
    }

    fn fill_window(&mut self, pos: usize) -> Result<()> {
        let size = self.content.len();
        self.win_start = pos;
        self.win_pos = 0;
        self.role = Role::Read;
        if pos >= size {
            self.win_used = 0;
            self.eof = true;
            return Ok(());
        }
        let take = self.capacity.min(size - pos);
        let chunk = self.content.read(pos, take)?;
        self.window[..chunk.len()].copy_from_slice(&chunk);
        self.win_used = chunk.len();
        self.eof = false;
        Ok(())
    }

    fn flush_window(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let used = self.win_used;
        self.content.write(self.win_start, &self.window[..used])?;
        self.win_start += used;
        self.win_pos = 0;
        self.win_used = 0;
        self.dirty = false;
        self.role = Role::Write;
        Ok(())
    }

    fn prepare_for_write(&mut self) {
        if self.role == Role::Write {
            return;
        }
        let absolute = self.win_start + self.win_pos;
        self.win_start = absolute;
        self.win_pos = 0;
        self.win_used = 0;
        self.dirty = false;
        self.role = Role::Write;
    }

    fn ensure_readable(&self) -> Result<()> {
        if self.can_read() {
            Ok(())
        } else {
            Err(VfsError::InvalidArg("stream is write-only".into()))
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.can_write() {
            Ok(())
        } else {
            Err(VfsError::InvalidArg("stream is read-only".into()))
        }
    }

    fn can_read(&self) -> bool {
        matches!(self.mode, StreamMode::ReadOnly | StreamMode::ReadWrite)
    }

    fn can_write(&self) -> bool {
        matches!(self.mode, StreamMode::WriteOnly | StreamMode::ReadWrite)
    }
}

impl Drop for ByteStream<'_> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
