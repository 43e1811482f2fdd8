//! Netlink core parts

#[macro_use]
mod helpers;
mod attribute;
mod message;
mod pack;
mod sequence;
mod socket;

extended_enum!(Protocol, i32,
    Route => 0,
    Netfilter => 12,
    Generic => 16,
);

pub use self::attribute::{Attribute, AttributeFlags, Payload};
pub use self::message::{netlink_align, netlink_padding, DataMessage,
    ErrorMessage, GenericHeader, Header, Message, MessageFlags, MessageMode,
    Request, RequestData};
pub use self::pack::{byte_order, Endianness, NativePack, NativeUnpack};
pub use self::sequence::SequenceCounter;
pub use self::socket::{Socket, Transport};

/// A trait for converting a value from one type to another.
/// Any failure in converting will return None.
pub trait ConvertFrom<T: Sized>
where
    Self: Sized,
{
    /// Convert value from one type to the other, returning None if conversion failed
    fn convert_from(value: T) -> Option<Self>;
}
