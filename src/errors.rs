use std::error;
use std::fmt;
use std::io;
use std::net;
use std::result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetlinkErrorKind {
    NotEnoughData,
    InvalidValue,
    InvalidLength,
    /// The set name is empty
    EmptySetName,
    /// The set name does not fit in the kernel set name buffer
    SetNameTooLong,
    /// The prefix length is not a number or exceeds the address width
    InvalidPrefix,
    /// An attribute does not fit the 16-bit length field
    AttributeOverflow,
    /// A message does not fit the 32-bit length field
    MessageOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetlinkError {
    pub kind: NetlinkErrorKind,
}

impl NetlinkError {
    pub fn new(kind: NetlinkErrorKind) -> NetlinkError {
        NetlinkError { kind: kind }
    }
}

impl fmt::Display for NetlinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NetlinkError {:?}", self.kind)
    }
}

impl error::Error for NetlinkError {}

// Private error codes from include/uapi/linux/netfilter/ipset/ip_set.h
const IPSET_ERR_PRIVATE: i32 = 4096;
const IPSET_ERR_TYPE_SPECIFIC: i32 = 4352;
const IPSET_ERR_MESSAGES: [&str; 19] = [
    "wrong protocol version",
    "set type not supported",
    "maximal number of sets reached",
    "set is busy",
    "set with the same name already exists",
    "set type mismatch",
    "element already exists",
    "invalid CIDR",
    "invalid netmask",
    "invalid protocol family",
    "timeout not supported by set",
    "set is in use",
    "invalid IPv4 address",
    "invalid IPv6 address",
    "counters not supported by set",
    "comments not supported by set",
    "invalid markmask",
    "skbinfo not supported by set",
    "bitmask and netmask are mutually exclusive",
];

/// Rejection reported by the kernel in a netlink error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelError {
    /// Positive error number, either an errno or an ipset private code
    pub code: i32,
}

impl KernelError {
    pub fn new(code: i32) -> KernelError {
        KernelError { code: code }
    }

    /// The ipset specific meaning of the code, if it is one of the ipset
    /// private codes
    pub fn ipset_message(&self) -> Option<&'static str> {
        if self.code > IPSET_ERR_PRIVATE
            && self.code <= IPSET_ERR_PRIVATE + IPSET_ERR_MESSAGES.len() as i32 {
            return Some(IPSET_ERR_MESSAGES[(self.code - IPSET_ERR_PRIVATE - 1) as usize]);
        }
        if self.code >= IPSET_ERR_TYPE_SPECIFIC {
            return Some("set type specific error");
        }
        None
    }

    /// Convert into an io::Error when the code is a plain errno
    pub fn as_io_error(&self) -> Option<io::Error> {
        if self.code < IPSET_ERR_PRIVATE {
            Some(io::Error::from_raw_os_error(self.code))
        } else {
            None
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(message) = self.ipset_message() {
            return write!(f, "{} ({})", message, self.code);
        }
        if self.code == libc::ENOENT {
            return write!(f, "set does not exist ({})", self.code);
        }
        match self.as_io_error() {
            Some(err) => write!(f, "{}", err),
            None => write!(f, "unknown error {}", self.code),
        }
    }
}

impl error::Error for KernelError {}

/// Errors signaling issues with the ipset netlink communication
#[derive(Debug)]
pub enum Error {
    /// An std::io error has occured
    Io(io::Error),
    /// A Netlink encoding or validation error has occured
    Netlink(NetlinkError),
    /// An address could not be parsed
    AddressParse(net::AddrParseError),
    /// The kernel rejected the request
    Kernel(KernelError),
}

impl Error {
    /// Kind of the netlink error, if this is one
    pub fn netlink_kind(&self) -> Option<NetlinkErrorKind> {
        match *self {
            Error::Netlink(ref err) => Some(err.kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "IO error: {}", err),
            Error::Netlink(ref err) => write!(f, "Netlink error: {}", err),
            Error::AddressParse(ref err) => write!(f, "Address error: {}", err),
            Error::Kernel(ref err) => write!(f, "Kernel error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            Error::Netlink(ref err) => Some(err),
            Error::AddressParse(ref err) => Some(err),
            Error::Kernel(ref err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<NetlinkError> for Error {
    fn from(err: NetlinkError) -> Error {
        Error::Netlink(err)
    }
}

impl From<NetlinkErrorKind> for Error {
    fn from(kind: NetlinkErrorKind) -> Error {
        Error::Netlink(NetlinkError::new(kind))
    }
}

impl From<net::AddrParseError> for Error {
    fn from(err: net::AddrParseError) -> Error {
        Error::AddressParse(err)
    }
}

impl From<KernelError> for Error {
    fn from(err: KernelError) -> Error {
        Error::Kernel(err)
    }
}

/// Result alias for crate errors
pub type Result<T> = result::Result<T, Error>;
