use std::io;
use std::mem::{self, size_of};
use std::os::unix::io::{AsRawFd, RawFd};

use log::{debug, trace};

use crate::core::message::{netlink_align, Message, Request};
use crate::core::Protocol;
use crate::errors::{KernelError, Result};

/// Byte transport towards the kernel
///
/// Implemented by `Socket`; anything able to carry netlink datagrams, such
/// as a recording transport in tests, can be used in its place.
pub trait Transport {
    /// Send one datagram
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Receive one datagram
    fn receive(&mut self) -> Result<Vec<u8>>;

    /// Port identifier used in the header of sent requests
    fn pid(&self) -> u32 {
        0
    }

    /// Serialize and send a request
    fn send_request(&mut self, request: &mut Request) -> Result<usize> {
        request.header.pid = self.pid();
        let bytes = request.serialize()?;
        debug!("send request {:04x} sequence {} ({} bytes)",
            request.header.identifier, request.sequence(), bytes.len());
        self.send(&bytes)
    }

    /// Wait for the kernel to acknowledge the request with `sequence`
    ///
    /// Replies belonging to other requests are skipped. A negative error
    /// code in the acknowledgement is returned as `Error::Kernel`.
    fn receive_acknowledge(&mut self, sequence: u32) -> Result<()> {
        loop {
            let data = self.receive()?;
            if data.is_empty() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof,
                    "netlink socket closed").into());
            }
            for message in Message::unpack_all(&data)? {
                if message.header().sequence != sequence {
                    trace!("skip reply\n{}", message.header());
                    continue;
                }
                match message {
                    Message::Error(ref msg) if msg.is_acknowledge() => {
                        return Ok(());
                    }
                    Message::Error(ref msg) => {
                        return Err(KernelError::new(-msg.code).into());
                    }
                    Message::Done(_) => {
                        return Ok(());
                    }
                    Message::Data(_) => {}
                }
            }
        }
    }
}

/// Netlink Socket can be used to communicate with the Linux kernel using the
/// netlink protocol.
pub struct Socket {
    socket: RawFd,
    pid: u32,
    receive_buffer: Vec<u8>,
}

fn netlink_address(pid: u32, groups: u32) -> libc::sockaddr_nl {
    let mut address: libc::sockaddr_nl = unsafe { mem::zeroed() };
    address.nl_family = libc::AF_NETLINK as u16;
    address.nl_pid = pid;
    address.nl_groups = groups;
    address
}

fn set_socket_option(socket: RawFd, level: i32, name: i32, value: i32)
    -> io::Result<()>
{
    let result = unsafe {
        libc::setsockopt(socket, level, name,
            &value as *const i32 as *const libc::c_void,
            size_of::<i32>() as libc::socklen_t)
    };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 { 4096 } else { size as usize }
}

impl Socket {
    /// Create a new Socket bound to a kernel assigned port
    pub fn new(protocol: Protocol) -> Result<Socket>
    {
        let socket = unsafe {
            libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                i32::from(protocol))
        };
        if socket < 0 {
            return Err(io::Error::last_os_error().into());
        }
        match Socket::bind(socket) {
            Ok(pid) => {
                debug!("netlink socket {} bound, pid {}", socket, pid);
                Ok(Socket {
                    socket: socket,
                    pid: pid,
                    receive_buffer: vec![0u8; netlink_align(page_size())],
                })
            }
            Err(err) => {
                unsafe { libc::close(socket) };
                Err(err.into())
            }
        }
    }

    fn bind(socket: RawFd) -> io::Result<u32> {
        set_socket_option(socket, libc::SOL_SOCKET, libc::SO_SNDBUF, 32768)?;
        set_socket_option(socket, libc::SOL_SOCKET, libc::SO_RCVBUF, 32768)?;
        let mut local = netlink_address(0, 0);
        let length = size_of::<libc::sockaddr_nl>() as libc::socklen_t;
        let result = unsafe {
            libc::bind(socket,
                &local as *const libc::sockaddr_nl as *const libc::sockaddr,
                length)
        };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut length = length;
        let result = unsafe {
            libc::getsockname(socket,
                &mut local as *mut libc::sockaddr_nl as *mut libc::sockaddr,
                &mut length)
        };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(local.nl_pid)
    }
}

impl Transport for Socket {
    fn send(&mut self, data: &[u8]) -> Result<usize>
    {
        let peer = netlink_address(0, 0);
        let sent = unsafe {
            libc::sendto(self.socket,
                data.as_ptr() as *const libc::c_void,
                data.len(),
                0,
                &peer as *const libc::sockaddr_nl as *const libc::sockaddr,
                size_of::<libc::sockaddr_nl>() as libc::socklen_t)
        };
        if sent < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if sent as usize != data.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero,
                "incomplete netlink send").into());
        }
        Ok(sent as usize)
    }

    fn receive(&mut self) -> Result<Vec<u8>>
    {
        let received = unsafe {
            libc::recv(self.socket,
                self.receive_buffer.as_mut_ptr() as *mut libc::c_void,
                self.receive_buffer.len(),
                0)
        };
        if received < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(self.receive_buffer[..received as usize].to_vec())
    }

    fn pid(&self) -> u32 {
        self.pid
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd
    {
        self.socket
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        unsafe { libc::close(self.socket) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::core::message::{MessageMode, NLMSG_ERROR};
    use crate::core::sequence::SequenceCounter;

    struct Replay {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl Transport for Replay {
        fn send(&mut self, data: &[u8]) -> Result<usize> {
            self.sent.push(data.to_vec());
            Ok(data.len())
        }
        fn receive(&mut self) -> Result<Vec<u8>> {
            Ok(self.replies.pop_front().unwrap_or_default())
        }
        fn pid(&self) -> u32 {
            77
        }
    }

    fn error_reply(sequence: u32, code: i32) -> Vec<u8> {
        let mut data = vec![];
        data.extend_from_slice(&36u32.to_ne_bytes()); // size
        data.extend_from_slice(&NLMSG_ERROR.to_ne_bytes()); // identifier
        data.extend_from_slice(&0u16.to_ne_bytes()); // flags
        data.extend_from_slice(&sequence.to_ne_bytes()); // sequence
        data.extend_from_slice(&77u32.to_ne_bytes()); // pid
        data.extend_from_slice(&code.to_ne_bytes()); // error code
        data.extend_from_slice(&[0u8; 16]); // original header
        data
    }

    #[test]
    fn send_request_sets_pid() {
        let counter = SequenceCounter::new();
        let mut transport = Replay { sent: vec![], replies: VecDeque::new() };
        let mut request = Request::new(0x0603u16, MessageMode::None, &counter);
        assert_eq!(transport.send_request(&mut request).unwrap(), 16);
        assert_eq!(&transport.sent[0][12..16], &77u32.to_ne_bytes());
    }

    #[test]
    fn acknowledge_skips_other_sequences() {
        let mut transport = Replay { sent: vec![], replies: VecDeque::new() };
        transport.replies.push_back(error_reply(4, -17));
        transport.replies.push_back(error_reply(5, 0));
        assert!(transport.receive_acknowledge(5).is_ok());
        assert!(transport.replies.is_empty());
    }

    #[test]
    fn acknowledge_with_error() {
        let mut transport = Replay { sent: vec![], replies: VecDeque::new() };
        transport.replies.push_back(error_reply(9, -4103));
        match transport.receive_acknowledge(9) {
            Err(crate::Error::Kernel(err)) => assert_eq!(err.code, 4103),
            _ => panic!("expected a kernel error"),
        }
    }

    #[test]
    fn acknowledge_on_closed_transport() {
        let mut transport = Replay { sent: vec![], replies: VecDeque::new() };
        match transport.receive_acknowledge(1) {
            Err(crate::Error::Io(err)) =>
                assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            _ => panic!("expected an io error"),
        }
    }
}
