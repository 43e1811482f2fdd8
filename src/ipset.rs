//! ipset commands over netfilter netlink
//!
//! Each command is encoded as a netlink request holding a netfilter generic
//! header followed by ipset attributes. Set entries are stored in a
//! `hash:net` set.
//!
//! ```text
//! | nlmsghdr | nfgenmsg | PROTOCOL | SETNAME | ... | DATA (nested) |
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, warn};

use crate::core::{Attribute, GenericHeader, MessageMode, Protocol, Request,
    SequenceCounter, Socket, Transport};
use crate::errors::{Error, NetlinkError, NetlinkErrorKind, Result};

/// Netfilter netlink subsystem of ipset
const NFNL_SUBSYS_IPSET: u16 = 6;
/// Version of the ipset netlink protocol
const IPSET_PROTOCOL: u8 = 6;
/// Maximum length of a set name
pub const IPSET_MAXNAMELEN: usize = 32;

const IPSET_TYPE_NAME: &str = "hash:net";
const IPSET_TYPE_REVISION: u8 = 1;
// The kernel expects a line number with every entry, this client never has one
const IPSET_LINE_NUMBER: u32 = 0;

extended_enum!(Command, u8,
    Create => 2,
    Destroy => 3,
    Flush => 4,
    Add => 9,
    Delete => 10,
);

impl Command {
    /// Netlink message type, the command in the low byte and the ipset
    /// subsystem in the high byte
    pub fn message_type(self) -> u16 {
        u16::from(u8::from(self)) | (NFNL_SUBSYS_IPSET << 8)
    }
}

/// Attributes at command level
extended_enum!(AttributeId, u16,
    Protocol => 1,
    SetName => 2,
    TypeName => 3,
    Revision => 4,
    Family => 5,
    Data => 7,
);

/// Attributes nested in the data attribute
extended_enum!(DataAttributeId, u16,
    Ip => 1,
    Cidr => 3,
    Timeout => 6,
    LineNumber => 9,
);

/// Attributes nested in the IP attribute
extended_enum!(AddressAttributeId, u16,
    Ipv4 => 1,
    Ipv6 => 2,
);

/// Options for creating sets and adding entries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Create an IPv6 set
    pub ipv6: bool,
    /// Timeout in seconds, zero for no timeout
    pub timeout: u32,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    pub fn with_ipv6(mut self) -> Options {
        self.ipv6 = true;
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Options {
        self.timeout = seconds;
        self
    }

    fn family(&self) -> u8 {
        if self.ipv6 { libc::AF_INET6 as u8 } else { libc::AF_INET as u8 }
    }

    fn timeout_attribute(&self) -> Option<Attribute> {
        if self.timeout == 0 {
            return None;
        }
        Some(Attribute::new_network_u32(DataAttributeId::Timeout, self.timeout))
    }
}

/// Set entry, an address with an optional prefix length
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub address: IpAddr,
    pub prefix: Option<u8>,
}

impl Entry {
    pub fn new(address: IpAddr) -> Entry {
        Entry { address: address, prefix: None }
    }

    /// Create a network entry, fails if the prefix exceeds the address width
    pub fn with_prefix(address: IpAddr, prefix: u8) -> Result<Entry> {
        let width = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > width {
            return Err(NetlinkError::new(NetlinkErrorKind::InvalidPrefix).into());
        }
        Ok(Entry { address: address, prefix: Some(prefix) })
    }

    fn address_attribute(&self) -> Attribute {
        match self.address {
            IpAddr::V4(ref address) =>
                Attribute::new_network_bytes(AddressAttributeId::Ipv4, &address.octets()),
            IpAddr::V6(ref address) =>
                Attribute::new_network_bytes(AddressAttributeId::Ipv6, &address.octets()),
        }
    }
}

impl FromStr for Entry {
    type Err = Error;

    /// Parse `"192.168.1.1"`, `"192.168.1.0/24"` or the IPv6 equivalents
    fn from_str(entry: &str) -> Result<Entry> {
        match entry.split_once('/') {
            Some((address, prefix)) => {
                let address = address.trim().parse::<IpAddr>()?;
                let prefix = prefix.trim().parse::<u8>()
                    .map_err(|_| NetlinkError::new(NetlinkErrorKind::InvalidPrefix))?;
                Entry::with_prefix(address, prefix)
            }
            None => Ok(Entry::new(entry.trim().parse::<IpAddr>()?)),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.prefix {
            Some(prefix) => write!(f, "{}/{}", self.address, prefix),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Conversion of parsed and unparsed addresses into an `Entry`
pub trait IntoEntry {
    fn into_entry(self) -> Result<Entry>;
}

impl IntoEntry for Entry {
    fn into_entry(self) -> Result<Entry> { Ok(self) }
}
impl IntoEntry for IpAddr {
    fn into_entry(self) -> Result<Entry> { Ok(Entry::new(self)) }
}
impl IntoEntry for Ipv4Addr {
    fn into_entry(self) -> Result<Entry> { Ok(Entry::new(IpAddr::V4(self))) }
}
impl IntoEntry for Ipv6Addr {
    fn into_entry(self) -> Result<Entry> { Ok(Entry::new(IpAddr::V6(self))) }
}
impl IntoEntry for (IpAddr, u8) {
    fn into_entry(self) -> Result<Entry> { Entry::with_prefix(self.0, self.1) }
}
impl<'a> IntoEntry for &'a str {
    fn into_entry(self) -> Result<Entry> { self.parse() }
}
impl<'a> IntoEntry for &'a String {
    fn into_entry(self) -> Result<Entry> { self.parse() }
}
impl IntoEntry for String {
    fn into_entry(self) -> Result<Entry> { self.parse() }
}

/// Check that a set name is usable
pub fn check_set_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NetlinkError::new(NetlinkErrorKind::EmptySetName).into());
    }
    if name.len() > IPSET_MAXNAMELEN {
        return Err(NetlinkError::new(NetlinkErrorKind::SetNameTooLong).into());
    }
    Ok(())
}

fn command_request(command: Command, family: u8, name: &str, mode: MessageMode,
    sequence: &SequenceCounter) -> Result<Request>
{
    check_set_name(name)?;
    let mut request = Request::new(command.message_type(), mode, sequence);
    request.append(GenericHeader::new(family, 0, 0));
    request.append(Attribute::new(AttributeId::Protocol, IPSET_PROTOCOL));
    request.append(Attribute::new_string_with_nul(AttributeId::SetName, name)?);
    Ok(request)
}

/// Encode the request creating a `hash:net` set
pub fn create_request(name: &str, options: &Options, mode: MessageMode,
    sequence: &SequenceCounter) -> Result<Request>
{
    let family = options.family();
    let mut request = command_request(Command::Create, family, name, mode,
        sequence)?;
    request.append(Attribute::new_string_with_nul(AttributeId::TypeName,
        IPSET_TYPE_NAME)?);
    request.append(Attribute::new(AttributeId::Revision, IPSET_TYPE_REVISION));
    request.append(Attribute::new(AttributeId::Family, family));
    let data = options.timeout_attribute().into_iter().collect();
    request.append(Attribute::new_nested(AttributeId::Data, data));
    Ok(request)
}

/// Encode the request destroying a set
pub fn destroy_request(name: &str, mode: MessageMode,
    sequence: &SequenceCounter) -> Result<Request>
{
    command_request(Command::Destroy, libc::AF_INET as u8, name, mode, sequence)
}

/// Encode the request removing all entries of a set
pub fn flush_request(name: &str, mode: MessageMode,
    sequence: &SequenceCounter) -> Result<Request>
{
    command_request(Command::Flush, libc::AF_INET as u8, name, mode, sequence)
}

/// Encode the request adding an entry to, or deleting an entry from, a set
///
/// The address attribute follows the address, IPv4 or IPv6, independent of
/// `options.ipv6`.
pub fn entry_request(command: Command, name: &str, entry: &Entry,
    options: &Options, mode: MessageMode, sequence: &SequenceCounter)
    -> Result<Request>
{
    if command != Command::Add && command != Command::Delete {
        return Err(NetlinkError::new(NetlinkErrorKind::InvalidValue).into());
    }
    let mut request = command_request(command, libc::AF_INET as u8, name, mode,
        sequence)?;
    let mut data = vec![];
    if let Some(timeout) = options.timeout_attribute() {
        data.push(timeout);
    }
    data.push(Attribute::new_nested(DataAttributeId::Ip,
        vec![entry.address_attribute()]));
    if let Some(prefix) = entry.prefix {
        data.push(Attribute::new(DataAttributeId::Cidr, prefix));
    }
    data.push(Attribute::new_network_u32(DataAttributeId::LineNumber,
        IPSET_LINE_NUMBER));
    request.append(Attribute::new_nested(AttributeId::Data, data));
    Ok(request)
}

/// Handle for managing ipset sets
///
/// Requests ask the kernel for an acknowledgement by default and report a
/// rejected request as `Error::Kernel`. With acknowledgements turned off
/// requests are only sent, kernel side failures go unnoticed.
pub struct IpSet<T: Transport> {
    transport: T,
    sequence: Arc<SequenceCounter>,
    acknowledge: bool,
}

impl IpSet<Socket> {
    /// Open a netfilter netlink socket
    pub fn open() -> Result<IpSet<Socket>> {
        Ok(IpSet::new(Socket::new(Protocol::Netfilter)?))
    }
}

impl<T: Transport> IpSet<T> {
    /// Create a handle using the process wide sequence counter
    pub fn new(transport: T) -> IpSet<T> {
        IpSet {
            transport: transport,
            sequence: SequenceCounter::shared(),
            acknowledge: true,
        }
    }

    /// Use another sequence counter
    pub fn with_sequence(mut self, sequence: Arc<SequenceCounter>) -> IpSet<T> {
        self.sequence = sequence;
        self
    }

    /// Select whether to wait for the kernel acknowledgement
    pub fn acknowledge(mut self, acknowledge: bool) -> IpSet<T> {
        self.acknowledge = acknowledge;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Create a `hash:net` set
    pub fn create(&mut self, name: &str, options: &Options) -> Result<()> {
        debug!("create set {} ({:?})", name, options);
        let request = create_request(name, options, self.mode(), &self.sequence)?;
        self.execute(request)
    }

    /// Destroy a set
    pub fn destroy(&mut self, name: &str) -> Result<()> {
        debug!("destroy set {}", name);
        let request = destroy_request(name, self.mode(), &self.sequence)?;
        self.execute(request)
    }

    /// Remove all entries of a set
    pub fn flush(&mut self, name: &str) -> Result<()> {
        debug!("flush set {}", name);
        let request = flush_request(name, self.mode(), &self.sequence)?;
        self.execute(request)
    }

    /// Add an entry, `"1.1.1.1"` or `"192.168.1.0/24"` for instance
    pub fn add<E: IntoEntry>(&mut self, name: &str, entry: E, options: &Options)
        -> Result<()>
    {
        check_set_name(name)?;
        let entry = entry.into_entry()?;
        debug!("add {} to set {}", entry, name);
        let request = entry_request(Command::Add, name, &entry, options,
            self.mode(), &self.sequence)?;
        self.execute(request)
    }

    /// Delete an entry
    pub fn delete<E: IntoEntry>(&mut self, name: &str, entry: E) -> Result<()> {
        check_set_name(name)?;
        let entry = entry.into_entry()?;
        debug!("delete {} from set {}", entry, name);
        let request = entry_request(Command::Delete, name, &entry,
            &Options::default(), self.mode(), &self.sequence)?;
        self.execute(request)
    }

    fn mode(&self) -> MessageMode {
        if self.acknowledge { MessageMode::Acknowledge } else { MessageMode::None }
    }

    fn execute(&mut self, mut request: Request) -> Result<()> {
        self.transport.send_request(&mut request)?;
        if !self.acknowledge {
            return Ok(());
        }
        let sequence = request.sequence();
        self.transport.receive_acknowledge(sequence).map_err(|err| {
            warn!("request {:04x} sequence {} failed: {}",
                request.header.identifier, sequence, err);
            err
        })
    }
}
