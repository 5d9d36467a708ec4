//! # Sockets
//! src/sys/socket.rs

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::RawFd;

/// Backlog fijo y pequeño de la cola de escucha
pub const LISTEN_BACKLOG: i32 = 5;

/// Crea el socket de escucha IPv4 con `SO_REUSEADDR`, no bloqueante
pub fn bind_listener(addr: &str, backlog: i32) -> io::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    if !addr.is_ipv4() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "only IPv4 listeners are supported",
        ));
    }

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Escritura scatter de varios segmentos en una sola syscall.
///
/// `WouldBlock` llega como error con ese `kind`.
pub fn writev(fd: RawFd, bufs: &[&[u8]]) -> io::Result<usize> {
    let mut iovecs: [libc::iovec; 2] = unsafe { std::mem::zeroed() };
    let count = bufs.len().min(iovecs.len());
    if count == 0 {
        return Ok(0);
    }

    for (iov, buf) in iovecs.iter_mut().zip(bufs.iter()) {
        *iov = libc::iovec {
            iov_base: buf.as_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };
    }

    let res = unsafe { libc::writev(fd, iovecs.as_ptr(), count as libc::c_int) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(res as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpStream;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_bind_listener_ephemeral() {
        let listener = bind_listener("127.0.0.1:0", LISTEN_BACKLOG).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        // No bloqueante: accept sin clientes devuelve WouldBlock
        let err = listener.accept().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_bind_listener_rejects_ipv6() {
        let err = bind_listener("[::1]:0", LISTEN_BACKLOG).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_writev_two_segments() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let n = writev(server.as_raw_fd(), &[b"hello ", b"world"]).unwrap();
        assert_eq!(n, 11);
        drop(server);

        let mut out = String::new();
        client.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }
}
