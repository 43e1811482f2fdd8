//! Manage netfilter ipset sets by talking netlink to the kernel
//!
//! ```no_run
//! use ipset_netlink::{IpSet, Options};
//!
//! let mut ipset = IpSet::open().unwrap();
//! ipset.create("blocklist", &Options::new().with_timeout(300)).unwrap();
//! ipset.add("blocklist", "192.168.1.0/24", &Options::new()).unwrap();
//! ipset.delete("blocklist", "192.168.1.0/24").unwrap();
//! ipset.flush("blocklist").unwrap();
//! ipset.destroy("blocklist").unwrap();
//! ```

#[macro_use] extern crate bitflags;

mod errors;
#[macro_use] pub mod core;
pub mod ipset;

pub use crate::errors::{Error, KernelError, NetlinkError, NetlinkErrorKind,
    Result};
pub use crate::core::{Attribute, ConvertFrom, GenericHeader, MessageMode,
    Protocol, Request, SequenceCounter, Socket, Transport};
pub use crate::ipset::{Command, Entry, IntoEntry, IpSet, Options};
