//! Blocking client connection.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use bytes::{Bytes, BytesMut};
use cinder_protocol::{parse_reply, write_request, Reply};

pub struct Connection {
    stream: TcpStream,
    rbuf: BytesMut,
}

impl Connection {
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(Connection {
            stream,
            rbuf: BytesMut::with_capacity(4096),
        })
    }

    /// Sends one command and blocks for its reply.
    pub fn request(&mut self, args: &[Bytes]) -> io::Result<Reply> {
        let mut out = BytesMut::new();
        write_request(&mut out, args);
        self.stream.write_all(&out)?;

        let mut chunk = [0u8; 4096];
        loop {
            match parse_reply(&self.rbuf) {
                Ok(Some((reply, consumed))) => {
                    let _ = self.rbuf.split_to(consumed);
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
            }

            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                ));
            }
            self.rbuf.extend_from_slice(&chunk[..n]);
        }
    }
}
