use std::mem;
use std::sync::OnceLock;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::errors::{NetlinkError, NetlinkErrorKind, Result};

/// Byte order of the host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    fn detect() -> Endianness {
        let marker = 0x01020304u32;
        if marker.to_ne_bytes()[0] == 0x01 {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    pub fn read_u16(self, buffer: &[u8]) -> u16 {
        match self {
            Endianness::Little => LittleEndian::read_u16(buffer),
            Endianness::Big => BigEndian::read_u16(buffer),
        }
    }

    pub fn read_u32(self, buffer: &[u8]) -> u32 {
        match self {
            Endianness::Little => LittleEndian::read_u32(buffer),
            Endianness::Big => BigEndian::read_u32(buffer),
        }
    }

    pub fn read_i32(self, buffer: &[u8]) -> i32 {
        match self {
            Endianness::Little => LittleEndian::read_i32(buffer),
            Endianness::Big => BigEndian::read_i32(buffer),
        }
    }

    pub fn write_u16(self, buffer: &mut [u8], value: u16) {
        match self {
            Endianness::Little => LittleEndian::write_u16(buffer, value),
            Endianness::Big => BigEndian::write_u16(buffer, value),
        }
    }

    pub fn write_u32(self, buffer: &mut [u8], value: u32) {
        match self {
            Endianness::Little => LittleEndian::write_u32(buffer, value),
            Endianness::Big => BigEndian::write_u32(buffer, value),
        }
    }

    pub fn write_i32(self, buffer: &mut [u8], value: i32) {
        match self {
            Endianness::Little => LittleEndian::write_i32(buffer, value),
            Endianness::Big => BigEndian::write_i32(buffer, value),
        }
    }
}

/// Host byte order, detected on first use
///
/// Netlink headers and attribute values without the network byte order flag
/// are written in this order.
pub fn byte_order() -> Endianness {
    static ORDER: OnceLock<Endianness> = OnceLock::new();
    *ORDER.get_or_init(Endianness::detect)
}

fn not_enough_data() -> NetlinkError {
    NetlinkError::new(NetlinkErrorKind::NotEnoughData)
}

pub trait NativeUnpack: Sized {
    fn unpack(buffer: &[u8]) -> Result<Self> {
        Self::unpack_with_size(buffer).map(|(_, value)| value)
    }
    fn unpack_with_size(buffer: &[u8]) -> Result<(usize, Self)> {
        let size = mem::size_of::<Self>();
        if buffer.len() < size {
            return Err(not_enough_data().into());
        }
        Ok((size, Self::unpack_unchecked(buffer)))
    }
    fn unpack_unchecked(buffer: &[u8]) -> Self;
}

impl NativeUnpack for u8 {
    fn unpack_unchecked(buffer: &[u8]) -> Self {
        buffer[0]
    }
}
impl NativeUnpack for u16 {
    fn unpack_unchecked(buffer: &[u8]) -> Self
    {
        byte_order().read_u16(buffer)
    }
}
impl NativeUnpack for u32 {
    fn unpack_unchecked(buffer: &[u8]) -> Self
    {
        byte_order().read_u32(buffer)
    }
}
impl NativeUnpack for i32 {
    fn unpack_unchecked(buffer: &[u8]) -> Self
    {
        byte_order().read_i32(buffer)
    }
}

pub trait NativePack: Sized {
    /// Number of bytes written by `pack`
    fn packed_size(&self) -> usize {
        mem::size_of::<Self>()
    }
    fn pack<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a mut [u8]> {
        let size = self.packed_size();
        if buffer.len() < size {
            return Err(not_enough_data().into());
        }
        self.pack_unchecked(buffer);
        Ok(&mut buffer[size..])
    }
    fn pack_unchecked(&self, buffer: &mut [u8]);
}

impl NativePack for u8 {
    fn pack_unchecked(&self, buffer: &mut [u8])
    {
        buffer[0] = *self;
    }
}
impl NativePack for u16 {
    fn pack_unchecked(&self, buffer: &mut [u8])
    {
        byte_order().write_u16(buffer, *self);
    }
}
impl NativePack for u32 {
    fn pack_unchecked(&self, buffer: &mut [u8])
    {
        byte_order().write_u32(buffer, *self);
    }
}
impl NativePack for i32 {
    fn pack_unchecked(&self, buffer: &mut [u8])
    {
        byte_order().write_i32(buffer, *self);
    }
}
impl NativePack for Vec<u8> {
    fn packed_size(&self) -> usize {
        self.len()
    }
    fn pack_unchecked(&self, buffer: &mut [u8])
    {
        buffer[..self.len()].copy_from_slice(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::cmp;

    fn pack_unpack_test<T>(bytes: &[u8], value: T)
        where T: NativePack + NativeUnpack + fmt::Debug + cmp::PartialEq + Sized
    {
        let value_size = mem::size_of::<T>();
        assert_eq!(bytes.len(), value_size);
        assert_eq!(T::unpack(bytes).unwrap(), value);
        let mut buffer = vec![0u8; mem::size_of::<T>()];
        {
            let left = T::pack(&value, &mut buffer).unwrap();
            assert_eq!(left.len(), 0);
        }
        assert_eq!(buffer, bytes);
    }

    #[test]
    fn detect_byte_order() {
        let expected = if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        };
        assert_eq!(byte_order(), expected);
        assert_eq!(byte_order(), byte_order());
    }

    #[test]
    fn explicit_byte_orders() {
        let mut buffer = [0u8; 4];
        Endianness::Big.write_u32(&mut buffer, 300);
        assert_eq!(buffer, [0x00, 0x00, 0x01, 0x2c]);
        Endianness::Little.write_u32(&mut buffer, 300);
        assert_eq!(buffer, [0x2c, 0x01, 0x00, 0x00]);
        Endianness::Big.write_u16(&mut buffer, 0x1234);
        assert_eq!(&buffer[..2], &[0x12, 0x34]);
        assert_eq!(Endianness::Big.read_u16(&buffer), 0x1234);
        assert_eq!(Endianness::Little.read_u16(&buffer), 0x3412);
    }

    #[test]
    fn pack_unpack_u8() {
        pack_unpack_test(&[0x5a], 0x5au8);
    }

    #[test]
    fn pack_unpack_u16() {
        pack_unpack_test(&0xaa22u16.to_ne_bytes(), 0xaa22u16);
    }

    #[test]
    fn pack_unpack_u32() {
        pack_unpack_test(&0x11223344u32.to_ne_bytes(), 0x11223344u32);
    }

    #[test]
    fn pack_unpack_i32() {
        pack_unpack_test(&(-1540152815i32).to_ne_bytes(), -1540152815i32);
    }

    #[test]
    fn unpack_short_buffer() {
        assert!(u32::unpack(&[0x01, 0x02, 0x03]).is_err());
        assert!(u16::unpack(&[]).is_err());
    }

    #[test]
    fn pack_short_buffer() {
        let mut buffer = [0u8; 2];
        assert!(0x11223344u32.pack(&mut buffer).is_err());
        assert!(vec![1u8, 2, 3].pack(&mut buffer).is_err());
    }

    #[test]
    fn pack_bytes_by_length() {
        let value = vec![1u8, 2, 3];
        assert_eq!(value.packed_size(), 3);
        assert_eq!(0x1122u16.packed_size(), 2);
        let mut buffer = [0u8; 5];
        let rest = value.pack(&mut buffer).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(buffer, [1, 2, 3, 0, 0]);
    }
}
