use std::ffi::{CStr, CString};

use byteorder::{BigEndian, ByteOrder};
use log::trace;

use crate::core::message::{netlink_align, netlink_padding, RequestData};
use crate::core::pack::{byte_order, NativePack, NativeUnpack};
use crate::errors::{NetlinkError, NetlinkErrorKind, Result};

bitflags! {
    /// Flags carried in the upper bits of the attribute identifier
    pub struct AttributeFlags: u16 {
        const NESTED        = 0x8000;
        const NET_BYTEORDER = 0x4000;
    }
}

/// Attribute value, either raw bytes or nested attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Nested(Vec<Attribute>),
}

/// Netlink attribute
///
/// ```text
/// | length | identifier |        data        | padding |
/// |--------|------------|--------------------|---------|
/// |   u16  |     u16    |  u8 * (length - 4) |         |
/// ```
///
/// The length field holds the unpadded length, the data is 4 byte aligned.
/// A nested attribute has the `NESTED` flag in its identifier and carries
/// its children, each aligned, as data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute identifier, including flags
    pub identifier: u16,
    payload: Payload,
}

impl Attribute {
    pub const HEADER_SIZE: usize = 4;

    /// Unpack all attributes in the byte slice
    ///
    /// Stops at the first chunk which isn't a complete attribute.
    pub fn unpack_all(data: &[u8]) -> (usize, Vec<Attribute>) {
        let mut pos = 0usize;
        let mut attrs = vec![];
        loop {
            match Attribute::unpack_with_size(&data[pos..]) {
                Ok(r) => { attrs.push(r.1); pos += r.0; },
                Err(_) => { break; },
            }
        }
        (pos, attrs)
    }

    /// Unpack one attribute, returning the aligned size consumed
    pub fn unpack_with_size(buffer: &[u8]) -> Result<(usize, Attribute)> {
        if buffer.len() < Attribute::HEADER_SIZE {
            return Err(NetlinkError::new(NetlinkErrorKind::NotEnoughData).into());
        }
        let length = u16::unpack_unchecked(buffer) as usize;
        let identifier = u16::unpack_unchecked(&buffer[2..]);
        if length < Attribute::HEADER_SIZE {
            return Err(NetlinkError::new(NetlinkErrorKind::InvalidLength).into());
        }
        if buffer.len() < length {
            return Err(NetlinkError::new(NetlinkErrorKind::NotEnoughData).into());
        }
        let data = &buffer[Attribute::HEADER_SIZE..length];
        let payload = if identifier & AttributeFlags::NESTED.bits() != 0 {
            let (used, children) = Attribute::unpack_all(data);
            if used != data.len() {
                return Err(NetlinkError::new(NetlinkErrorKind::InvalidLength).into());
            }
            Payload::Nested(children)
        } else {
            Payload::Bytes(data.to_vec())
        };
        let used = netlink_align(length).min(buffer.len());
        Ok((used, Attribute { identifier: identifier, payload: payload }))
    }

    /// Create a new attribute holding the provided bytes
    pub fn new_bytes<ID: Into<u16>>(identifier: ID, value: &[u8]) -> Attribute
    {
        Attribute { identifier: identifier.into(),
            payload: Payload::Bytes(value.to_vec()) }
    }

    /// Create a new attribute holding bytes already in network byte order
    pub fn new_network_bytes<ID: Into<u16>>(identifier: ID, value: &[u8])
        -> Attribute
    {
        let identifier = identifier.into() | AttributeFlags::NET_BYTEORDER.bits();
        Attribute::new_bytes(identifier, value)
    }

    /// Create a new string attribute with a terminating NUL
    ///
    /// Fails if the string contains a NUL.
    pub fn new_string_with_nul<ID: Into<u16>>(identifier: ID, value: &str)
        -> Result<Attribute>
    {
        let c_string = CString::new(value)
            .map_err(|_| NetlinkError::new(NetlinkErrorKind::InvalidValue))?;
        Ok(Attribute { identifier: identifier.into(),
            payload: Payload::Bytes(c_string.into_bytes_with_nul()) })
    }

    /// Create a new attribute from a type that can be packed into a byte slice
    ///
    /// The value is packed in host byte order.
    pub fn new<ID: Into<u16>, V: NativePack>(identifier: ID, value: V)
        -> Attribute
    {
        let mut data = vec![0u8; value.packed_size()];
        value.pack_unchecked(&mut data);
        Attribute { identifier: identifier.into(), payload: Payload::Bytes(data) }
    }

    /// Create a new u32 attribute
    ///
    /// The value is big endian if the identifier carries the network byte
    /// order flag, host byte order otherwise.
    pub fn new_u32<ID: Into<u16>>(identifier: ID, value: u32) -> Attribute
    {
        let identifier = identifier.into();
        let mut data = vec![0u8; 4];
        if identifier & AttributeFlags::NET_BYTEORDER.bits() != 0 {
            BigEndian::write_u32(&mut data, value);
        } else {
            byte_order().write_u32(&mut data, value);
        }
        Attribute { identifier: identifier, payload: Payload::Bytes(data) }
    }

    /// Create a new u32 attribute in network byte order
    pub fn new_network_u32<ID: Into<u16>>(identifier: ID, value: u32)
        -> Attribute
    {
        let identifier = identifier.into() | AttributeFlags::NET_BYTEORDER.bits();
        Attribute::new_u32(identifier, value)
    }

    /// Create a new nested attribute holding the provided children
    pub fn new_nested<ID: Into<u16>>(identifier: ID, children: Vec<Attribute>)
        -> Attribute
    {
        let identifier = identifier.into() | AttributeFlags::NESTED.bits();
        Attribute { identifier: identifier, payload: Payload::Nested(children) }
    }

    /// Attribute identifier without flags
    pub fn kind(&self) -> u16 {
        self.identifier & !AttributeFlags::all().bits()
    }

    /// Flags of the attribute identifier
    pub fn flags(&self) -> AttributeFlags {
        AttributeFlags::from_bits_truncate(self.identifier)
    }

    pub fn is_nested(&self) -> bool {
        self.flags().contains(AttributeFlags::NESTED)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Child attributes, empty for an attribute holding bytes
    pub fn children(&self) -> &[Attribute] {
        match self.payload {
            Payload::Nested(ref children) => children,
            Payload::Bytes(_) => &[],
        }
    }

    /// Unpadded length of header and data
    pub fn len(&self) -> usize {
        match self.payload {
            Payload::Bytes(ref data) => Attribute::HEADER_SIZE + data.len(),
            Payload::Nested(ref children) => {
                let data: usize = children.iter().map(|c| c.aligned_len()).sum();
                Attribute::HEADER_SIZE + data
            }
        }
    }

    /// Length of header, data and padding
    pub fn aligned_len(&self) -> usize {
        let length = self.len();
        length + netlink_padding(length)
    }

    /// Unpack the underlying data into a u8
    pub fn as_u8(&self) -> Result<u8> {
        u8::unpack(self.data()?)
    }
    /// Unpack the underlying data into a u32, honoring the byte order flag
    pub fn as_u32(&self) -> Result<u32> {
        let data = self.data()?;
        if data.len() < 4 {
            return Err(NetlinkError::new(NetlinkErrorKind::NotEnoughData).into());
        }
        if self.flags().contains(AttributeFlags::NET_BYTEORDER) {
            Ok(BigEndian::read_u32(data))
        } else {
            u32::unpack(data)
        }
    }
    /// Unpack the underlying data into a String
    pub fn as_string(&self) -> Result<String> {
        let data = self.data()?;
        let bytes = match CStr::from_bytes_with_nul(data) {
            Ok(c_str) => c_str.to_bytes(),
            Err(_) => data,
        };
        String::from_utf8(bytes.to_vec())
            .map_err(|_| NetlinkError::new(NetlinkErrorKind::InvalidValue).into())
    }
    /// Get the underlying data
    pub fn as_bytes(&self) -> Result<&[u8]> {
        self.data()
    }

    fn data(&self) -> Result<&[u8]> {
        match self.payload {
            Payload::Bytes(ref data) => Ok(data),
            Payload::Nested(_) =>
                Err(NetlinkError::new(NetlinkErrorKind::InvalidValue).into()),
        }
    }

    /// Serialize into a buffer of the aligned length
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let length = self.len();
        if length > u16::max_value() as usize {
            return Err(NetlinkError::new(NetlinkErrorKind::AttributeOverflow).into());
        }
        let mut buffer = vec![0u8; netlink_align(length)];
        if length != 0 {
            (length as u16).pack_unchecked(&mut buffer);
        }
        self.identifier.pack_unchecked(&mut buffer[2..]);
        let mut pos = Attribute::HEADER_SIZE;
        match self.payload {
            Payload::Bytes(ref data) => {
                buffer[pos..pos + data.len()].copy_from_slice(data);
            }
            Payload::Nested(ref children) => {
                for child in children {
                    let bytes = child.serialize()?;
                    buffer[pos..pos + bytes.len()].copy_from_slice(&bytes);
                    pos += bytes.len();
                }
            }
        }
        trace!("attribute {:04x} serialized, {} bytes", self.identifier, length);
        Ok(buffer)
    }
}

impl RequestData for Attribute {
    fn len(&self) -> usize {
        Attribute::len(self)
    }
    fn serialize(&self) -> Result<Vec<u8>> {
        Attribute::serialize(self)
    }
}
