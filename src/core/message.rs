use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::core::pack::{NativePack, NativeUnpack};
use crate::core::sequence::SequenceCounter;
use crate::errors::{NetlinkError, NetlinkErrorKind, Result};

bitflags! {
    pub struct MessageFlags: u16 {
        const REQUEST     = 0x0001;
        const ACKNOWLEDGE = 0x0004;
    }
}

pub enum MessageMode {
    None,
    Acknowledge,
}

impl Into<MessageFlags> for MessageMode {
    fn into(self) -> MessageFlags {
        let flags = MessageFlags::REQUEST;
        match self {
            MessageMode::None => flags,
            MessageMode::Acknowledge => flags | MessageFlags::ACKNOWLEDGE,
        }
    }
}

pub(crate) const NLMSG_NOOP: u16 = 1;
pub(crate) const NLMSG_ERROR: u16 = 2;
pub(crate) const NLMSG_DONE: u16 = 3;

#[inline]
pub(crate) fn align_to(len: usize, align_to: usize) -> usize
{
    (len + align_to - 1) & !(align_to - 1)
}

/// Round `len` up to the netlink alignment of 4 octets
#[inline]
pub fn netlink_align(len: usize) -> usize
{
    align_to(len, 4usize)
}

#[inline]
pub fn netlink_padding(len: usize) -> usize
{
    netlink_align(len) - len
}

/// Netlink message header
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub length: u32,
    pub identifier: u16,
    pub flags: u16,
    pub sequence: u32,
    pub pid: u32,
}

impl Header {
    pub const HEADER_SIZE: usize = 16;

    pub fn length(&self) -> usize {
        self.length as usize
    }

    pub fn data_length(&self) -> usize {
        self.length().saturating_sub(Header::HEADER_SIZE)
    }

    pub fn aligned_data_length(&self) -> usize {
        netlink_align(self.data_length())
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,
            "Length: {0:08x} {0}\nIdentifier: {1:04x}\nFlags: {2:04x}\n\
            Sequence: {3:08x} {3}\nPID: {4:08x} {4}",
            self.length,
            self.identifier,
            self.flags,
            self.sequence,
            self.pid,
        )
    }
}

impl NativePack for Header {
    fn pack_unchecked(&self, buffer: &mut [u8])
    {
        self.length.pack_unchecked(buffer);
        self.identifier.pack_unchecked(&mut buffer[4..]);
        self.flags.pack_unchecked(&mut buffer[6..]);
        self.sequence.pack_unchecked(&mut buffer[8..]);
        self.pid.pack_unchecked(&mut buffer[12..]);
    }
}

impl NativeUnpack for Header {
    fn unpack_unchecked(buffer: &[u8]) -> Self
    {
        let length = u32::unpack_unchecked(&buffer[..]);
        let identifier = u16::unpack_unchecked(&buffer[4..]);
        let flags = u16::unpack_unchecked(&buffer[6..]);
        let sequence = u32::unpack_unchecked(&buffer[8..]);
        let pid = u32::unpack_unchecked(&buffer[12..]);
        Header {
            length: length,
            identifier: identifier,
            flags: flags,
            sequence: sequence,
            pid: pid, }
    }
}

/// Data serialized after the netlink header of a request
pub trait RequestData {
    /// Unpadded length
    fn len(&self) -> usize;
    /// Serialize, including padding up to the netlink alignment
    fn serialize(&self) -> Result<Vec<u8>>;
}

/// Netfilter generic message header
///
/// ```text
/// | family | version | resource id |
/// |--------|---------|-------------|
/// |   u8   |   u8    |   u16 (BE)  |
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenericHeader {
    pub family: u8,
    pub version: u8,
    pub resource_id: u16,
}

impl GenericHeader {
    pub const HEADER_SIZE: usize = 4;

    pub fn new(family: u8, version: u8, resource_id: u16) -> GenericHeader {
        GenericHeader { family: family, version: version, resource_id: resource_id }
    }
}

impl RequestData for GenericHeader {
    fn len(&self) -> usize {
        GenericHeader::HEADER_SIZE
    }
    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; netlink_align(GenericHeader::HEADER_SIZE)];
        buffer[0] = self.family;
        buffer[1] = self.version;
        BigEndian::write_u16(&mut buffer[2..4], self.resource_id);
        Ok(buffer)
    }
}

/// Netlink request
///
/// A header followed by the request data, in the order it was appended, and
/// optional raw bytes. The header length is computed when serializing.
pub struct Request {
    pub header: Header,
    data: Vec<Box<dyn RequestData + Send>>,
    raw_data: Vec<u8>,
}

impl Request {
    /// Create a request, taking its sequence number from `sequence`
    pub fn new<T: Into<u16>, M: Into<MessageFlags>>(message_type: T, mode: M,
        sequence: &SequenceCounter) -> Request
    {
        let flags = mode.into() | MessageFlags::REQUEST;
        Request {
            header: Header {
                length: Header::HEADER_SIZE as u32,
                identifier: message_type.into(),
                flags: flags.bits(),
                sequence: sequence.next(),
                pid: 0,
            },
            data: vec![],
            raw_data: vec![],
        }
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn flags(&self) -> MessageFlags {
        MessageFlags::from_bits_truncate(self.header.flags)
    }

    /// Append data to the request
    pub fn append<D: RequestData + Send + 'static>(&mut self, data: D) {
        self.data.push(Box::new(data));
    }

    /// Append raw bytes, serialized after all data
    pub fn append_raw(&mut self, data: &[u8]) {
        self.raw_data.extend_from_slice(data);
    }

    /// Total length of the serialized request
    pub fn len(&self) -> usize {
        let data: usize = self.data.iter().map(|d| netlink_align(d.len())).sum();
        Header::HEADER_SIZE + data + self.raw_data.len()
    }

    /// Serialize header, data and raw bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut parts = Vec::with_capacity(self.data.len());
        let mut length = Header::HEADER_SIZE;
        for data in &self.data {
            let bytes = data.serialize()?;
            length = length.checked_add(bytes.len())
                .ok_or(NetlinkError::new(NetlinkErrorKind::MessageOverflow))?;
            parts.push(bytes);
        }
        length = length.checked_add(self.raw_data.len())
            .ok_or(NetlinkError::new(NetlinkErrorKind::MessageOverflow))?;
        if length > u32::max_value() as usize {
            return Err(NetlinkError::new(NetlinkErrorKind::MessageOverflow).into());
        }
        let header = Header { length: length as u32, .. self.header };
        let mut buffer = vec![0u8; length];
        header.pack(&mut buffer)?;
        let mut pos = Header::HEADER_SIZE;
        for part in parts {
            buffer[pos..pos + part.len()].copy_from_slice(&part);
            pos += part.len();
        }
        buffer[pos..].copy_from_slice(&self.raw_data);
        Ok(buffer)
    }
}

pub struct DataMessage {
    pub header: Header,
    pub data: Vec<u8>,
}

/// Netlink data message
impl DataMessage {
    pub fn unpack(data: &[u8], header: Header) -> Result<(usize, DataMessage)>
    {
        let size = header.data_length();
        if data.len() < size {
            return Err(NetlinkError::new(NetlinkErrorKind::NotEnoughData).into());
        }
        let aligned_size = header.aligned_data_length().min(data.len());
        Ok((aligned_size,
            DataMessage { header: header, data: (&data[..size]).to_vec() }
        ))
    }
}

/// Netlink error message
///
/// An error code of zero acknowledges the original request.
pub struct ErrorMessage {
    pub header: Header,
    pub code: i32,
    pub original_header: Header,
}

impl ErrorMessage {
    pub fn unpack(data: &[u8], header: Header) -> Result<(usize, ErrorMessage)>
    {
        let size = 4 + Header::HEADER_SIZE;
        if data.len() < size {
            return Err(NetlinkError::new(NetlinkErrorKind::NotEnoughData).into());
        }
        let code = i32::unpack_unchecked(data);
        let (_, original) = Header::unpack_with_size(&data[4..])?;
        // The kernel may echo the request payload and extended
        // acknowledgement attributes after the original header.
        let used = header.aligned_data_length().max(size).min(data.len());
        Ok((used,
            ErrorMessage { header: header, code: code,
                original_header: original }))
    }

    pub fn pack<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a mut [u8]> {
        let slice = self.header.pack(buffer)?;
        let slice = self.code.pack(slice)?;
        let slice = self.original_header.pack(slice)?;
        Ok(slice)
    }

    pub fn is_acknowledge(&self) -> bool {
        self.code == 0
    }
}

pub enum Message {
    Data(DataMessage),
    Error(ErrorMessage),
    Done(Header),
}

impl Message {
    pub fn header(&self) -> &Header {
        match *self {
            Message::Data(ref msg) => &msg.header,
            Message::Error(ref msg) => &msg.header,
            Message::Done(ref header) => header,
        }
    }

    /// Unpack every message in a received datagram, skipping no-op messages
    pub fn unpack_all(data: &[u8]) -> Result<Vec<Message>>
    {
        let mut messages = vec![];
        let mut pos = 0;
        while pos + Header::HEADER_SIZE <= data.len() {
            let (used, header) = Header::unpack_with_size(&data[pos..])?;
            if header.length() < Header::HEADER_SIZE {
                return Err(NetlinkError::new(NetlinkErrorKind::InvalidLength).into());
            }
            pos += used;
            if header.identifier == NLMSG_NOOP {
                pos += header.aligned_data_length();
            }
            else if header.identifier == NLMSG_ERROR {
                let (used, msg) = ErrorMessage::unpack(&data[pos..], header)?;
                pos += used;
                messages.push(Message::Error(msg));
            }
            else if header.identifier == NLMSG_DONE {
                pos += header.aligned_data_length();
                messages.push(Message::Done(header));
            }
            else {
                let (used, msg) = DataMessage::unpack(&data[pos..], header)?;
                pos += used;
                messages.push(Message::Data(msg));
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attribute::Attribute;

    fn header_bytes(length: u32, identifier: u16, flags: u16, sequence: u32,
        pid: u32) -> Vec<u8>
    {
        let mut data = vec![];
        data.extend_from_slice(&length.to_ne_bytes()); // size
        data.extend_from_slice(&identifier.to_ne_bytes()); // identifier
        data.extend_from_slice(&flags.to_ne_bytes()); // flags
        data.extend_from_slice(&sequence.to_ne_bytes()); // sequence
        data.extend_from_slice(&pid.to_ne_bytes()); // pid
        data
    }

    #[test]
    fn alignment()
    {
        assert_eq!(netlink_align(0), 0);
        assert_eq!(netlink_align(1), 4);
        assert_eq!(netlink_align(4), 4);
        assert_eq!(netlink_align(5), 8);
        assert_eq!(netlink_align(1503), 1504);
        assert_eq!(netlink_padding(5), 3);
        assert_eq!(netlink_padding(8), 0);
    }

    #[test]
    fn unpack_header()
    {
        let data = header_bytes(18, 0x1000, 0x0010, 1, 4);
        assert!(Header::unpack(&data[..15]).is_err());
        let (used, header) = Header::unpack_with_size(&data).unwrap();
        assert_eq!(used, Header::HEADER_SIZE);
        assert_eq!(header.length, 18u32);
        assert_eq!(header.data_length(), 2usize);
        assert_eq!(header.aligned_data_length(), 4usize);
        assert_eq!(header.identifier, 0x1000u16);
        assert_eq!(header.flags, 0x0010u16);
        assert_eq!(header.sequence, 1u32);
        assert_eq!(header.pid, 4u32);
        assert_eq!(header.to_string(), "Length: 00000012 18\nIdentifier: 1000\n\
            Flags: 0010\nSequence: 00000001 1\nPID: 00000004 4");
    }

    #[test]
    fn pack_header()
    {
        let header = Header {
            length: 18,
            identifier: 0x1000,
            flags: 0x0010,
            sequence: 1,
            pid: 4,
        };
        let mut buffer = [0u8; 32];
        {
            let slice = header.pack(&mut buffer).unwrap();
            assert_eq!(slice.len(), 16usize);
        }
        assert_eq!(&buffer[..16], header_bytes(18, 0x1000, 0x0010, 1, 4).as_slice());
    }

    #[test]
    fn message_modes()
    {
        let flags: MessageFlags = MessageMode::None.into();
        assert_eq!(flags, MessageFlags::REQUEST);
        let flags: MessageFlags = MessageMode::Acknowledge.into();
        assert_eq!(flags, MessageFlags::REQUEST | MessageFlags::ACKNOWLEDGE);
    }

    #[test]
    fn generic_header()
    {
        let header = GenericHeader::new(10, 0, 0x0102);
        assert_eq!(RequestData::len(&header), 4);
        assert_eq!(header.serialize().unwrap(), vec![10, 0, 0x01, 0x02]);
    }

    #[test]
    fn request_always_has_request_flag()
    {
        let counter = SequenceCounter::new();
        let request = Request::new(0x0602u16, MessageFlags::empty(), &counter);
        assert!(request.flags().contains(MessageFlags::REQUEST));
        assert_eq!(request.sequence(), 1);
        let request = Request::new(0x0602u16, MessageMode::None, &counter);
        assert_eq!(request.sequence(), 2);
    }

    #[test]
    fn serialize_request()
    {
        let counter = SequenceCounter::starting_at(0x12345678);
        let mut request = Request::new(0x0603u16, MessageMode::None, &counter);
        request.header.pid = 1;
        request.append(GenericHeader::new(2, 0, 0));
        request.append(Attribute::new(1u16, 6u8));
        request.append_raw(&[0xaa, 0x55]);
        assert_eq!(request.len(), 16 + 4 + 8 + 2);
        let buffer = request.serialize().unwrap();
        let mut data = header_bytes(30, 0x0603, 0x0001, 0x12345678, 1);
        data.extend_from_slice(&[2, 0, 0, 0]); // generic header
        data.extend_from_slice(&5u16.to_ne_bytes()); // size
        data.extend_from_slice(&1u16.to_ne_bytes()); // identifier
        data.extend_from_slice(&[6, 0, 0, 0]); // protocol, padding
        data.extend_from_slice(&[0xaa, 0x55]); // raw data
        assert_eq!(buffer, data);
        // the stored header is left untouched
        assert_eq!(request.header.length, 16);
    }

    #[test]
    fn unpack_error_message()
    {
        let mut data = header_bytes(36, NLMSG_ERROR, 0x0000, 1, 4);
        data.extend_from_slice(&(-17i32).to_ne_bytes()); // error code
        data.extend_from_slice(&header_bytes(18, 0x0602, 0x0005, 1, 5));
        let messages = Message::unpack_all(&data).unwrap();
        assert_eq!(messages.len(), 1);
        match messages[0] {
            Message::Error(ref msg) => {
                assert_eq!(msg.code, -17);
                assert!(!msg.is_acknowledge());
                assert_eq!(msg.original_header.identifier, 0x0602);
                assert_eq!(msg.original_header.length, 18);
                assert_eq!(msg.original_header.pid, 5);
            },
            _ => panic!("expected an error message"),
        }
    }

    #[test]
    fn pack_error_message()
    {
        let message = ErrorMessage {
            header: Header {
                length: 36,
                identifier: NLMSG_ERROR,
                flags: 0,
                sequence: 1,
                pid: 4,
            },
            code: 0,
            original_header: Header {
                length: 18,
                identifier: 0x0609,
                flags: 0x0005,
                sequence: 1,
                pid: 5,
            },
        };
        let mut buffer = [0xffu8; 36];
        {
            let slice = message.pack(&mut buffer).unwrap();
            assert_eq!(slice.len(), 0usize);
        }
        let (_, unpacked) = Header::unpack_with_size(&buffer).unwrap();
        let (used, unpacked) = ErrorMessage::unpack(&buffer[16..], unpacked).unwrap();
        assert_eq!(used, 20);
        assert!(unpacked.is_acknowledge());
        assert_eq!(unpacked.original_header, message.original_header);
    }

    #[test]
    fn unpack_several_messages()
    {
        let mut data = header_bytes(16, NLMSG_NOOP, 0, 7, 0);
        data.extend_from_slice(&header_bytes(18, 0x0601, 0x0002, 7, 0));
        data.extend_from_slice(&[0xaa, 0x55, 0x00, 0x00]); // data with padding
        data.extend_from_slice(&header_bytes(20, NLMSG_DONE, 0x0002, 7, 0));
        data.extend_from_slice(&[0, 0, 0, 0]);
        let messages = Message::unpack_all(&data).unwrap();
        assert_eq!(messages.len(), 2);
        match messages[0] {
            Message::Data(ref msg) => assert_eq!(msg.data, vec![0xaa, 0x55]),
            _ => panic!("expected a data message"),
        }
        match messages[1] {
            Message::Done(ref header) => assert_eq!(header.sequence, 7),
            _ => panic!("expected a done message"),
        }
    }

    #[test]
    fn unpack_invalid_message_length()
    {
        let data = header_bytes(8, 0x0601, 0, 1, 0);
        assert!(Message::unpack_all(&data).is_err());
    }
}
