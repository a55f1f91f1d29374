//! Bounds-checked cursor access to DNS wire data.
//!
//! Both cursors operate on a fixed-capacity region and check
//! `cursor + size <= capacity` before every access. Multi-byte integers are
//! converted between host and network byte order by [`byteorder`].

use crate::error::WireError;

pub type Result<T> = std::result::Result<T, WireError>;

/// Host/network byte-order conversion, one width-correct swap per width.
pub mod byteorder {
    pub const HOST_LITTLE_ENDIAN: bool = cfg!(target_endian = "little");

    #[inline]
    pub const fn swap16(value: u16) -> u16 {
        (value << 8) | (value >> 8)
    }

    #[inline]
    pub const fn swap32(value: u32) -> u32 {
        ((value & 0x0000_00ff) << 24)
            | ((value & 0x0000_ff00) << 8)
            | ((value & 0x00ff_0000) >> 8)
            | ((value & 0xff00_0000) >> 24)
    }

    /// Convert `value` to network order on a host of the given endianness.
    #[inline]
    pub const fn to_network_u16_on(value: u16, host_little_endian: bool) -> u16 {
        if host_little_endian { swap16(value) } else { value }
    }

    #[inline]
    pub const fn to_network_u32_on(value: u32, host_little_endian: bool) -> u32 {
        if host_little_endian { swap32(value) } else { value }
    }

    // The swap is an involution, so the inverse direction is the same operation.
    #[inline]
    pub const fn from_network_u16_on(value: u16, host_little_endian: bool) -> u16 {
        to_network_u16_on(value, host_little_endian)
    }

    #[inline]
    pub const fn from_network_u32_on(value: u32, host_little_endian: bool) -> u32 {
        to_network_u32_on(value, host_little_endian)
    }

    #[inline]
    pub const fn to_network_u16(value: u16) -> u16 {
        to_network_u16_on(value, HOST_LITTLE_ENDIAN)
    }

    #[inline]
    pub const fn to_network_u32(value: u32) -> u32 {
        to_network_u32_on(value, HOST_LITTLE_ENDIAN)
    }

    #[inline]
    pub const fn from_network_u16(value: u16) -> u16 {
        from_network_u16_on(value, HOST_LITTLE_ENDIAN)
    }

    #[inline]
    pub const fn from_network_u32(value: u32) -> u32 {
        from_network_u32_on(value, HOST_LITTLE_ENDIAN)
    }
}

/// Write cursor over a fixed-capacity buffer
#[derive(Debug)]
pub struct WireWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Resume writing at `len`, e.g. after a previous writer was dropped
    pub fn at(buf: &'a mut [u8], len: usize) -> Result<Self> {
        if len > buf.len() {
            return Err(WireError::Overrun {
                need: len,
                have: buf.len(),
            });
        }
        Ok(Self { buf, len })
    }

    #[inline]
    fn reserve(&mut self, size: usize) -> Result<usize> {
        let start = self.len;
        if size > self.buf.len() - start {
            return Err(WireError::Overrun {
                need: size,
                have: self.buf.len() - start,
            });
        }
        self.len += size;
        Ok(start)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        let at = self.reserve(1)?;
        self.buf[at] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        let at = self.reserve(2)?;
        self.buf[at..at + 2].copy_from_slice(&byteorder::to_network_u16(value).to_ne_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let at = self.reserve(4)?;
        self.buf[at..at + 4].copy_from_slice(&byteorder::to_network_u32(value).to_ne_bytes());
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let at = self.reserve(data.len())?;
        self.buf[at..at + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Skip `n` bytes, leaving them to be filled in later
    pub fn seek(&mut self, n: usize) -> Result<()> {
        self.reserve(n).map(|_| ())
    }

    /// Overwrite a u16 at an absolute position that was already written or skipped
    pub fn patch_u16(&mut self, at: usize, value: u16) -> Result<()> {
        if at + 2 > self.len {
            return Err(WireError::Overrun {
                need: at + 2,
                have: self.len,
            });
        }
        self.buf[at..at + 2].copy_from_slice(&byteorder::to_network_u16(value).to_ne_bytes());
        Ok(())
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    pub fn written(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Read cursor over a borrowed buffer
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn take(&mut self, size: usize) -> Result<&'a [u8]> {
        let start = self.pos;
        if size > self.buf.len() - start {
            return Err(WireError::Overrun {
                need: size,
                have: self.buf.len() - start,
            });
        }
        self.pos += size;
        Ok(&self.buf[start..start + size])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(byteorder::from_network_u16(u16::from_ne_bytes([
            bytes[0], bytes[1],
        ])))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(byteorder::from_network_u32(u32::from_ne_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])))
    }

    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        self.take(length)
    }

    pub fn seek(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The unread tail of the buffer
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
