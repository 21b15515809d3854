//! Minimal blocking peers speaking the wire protocol over loopback.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use chaincalc_wire::{
    Frame, FrameKind, Operand, RESPONSE_FRAME_LEN, RequestChunk, RequestId, ResponseFrame,
    decode_response, encode_frame,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Splits a chain into chunks addressed to `reply_port`.
pub fn chunks_for(reply_port: u16, request_id: i32, operands: &[Operand]) -> Vec<RequestChunk> {
    let total = u32::try_from(operands.len()).expect("chain fits in u32");
    operands
        .iter()
        .zip(0_u32..)
        .map(|(operand, order)| RequestChunk {
            reply_port,
            order,
            request_id: RequestId(request_id),
            total_chunks: total,
            operand: *operand,
        })
        .collect()
}

/// Connection carrying frames into one of the server's ports.
pub struct ChunkConnection {
    stream: TcpStream,
}

impl ChunkConnection {
    pub fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect chunk stream");
        stream.set_nodelay(true).expect("disable nagle");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set read timeout");
        Self { stream }
    }

    pub fn send(&mut self, frame: &Frame) {
        let mut buffer = BytesMut::new();
        encode_frame(frame, &mut buffer);
        self.stream.write_all(&buffer).expect("write frame");
    }

    pub fn send_chunks(&mut self, chunks: &[RequestChunk]) {
        for chunk in chunks {
            self.send(&Frame::Chunk(*chunk));
        }
    }

    /// Writes the frame one byte per write call.
    pub fn send_trickled(&mut self, frame: &Frame) {
        let mut buffer = BytesMut::new();
        encode_frame(frame, &mut buffer);
        for byte in buffer.iter() {
            self.stream.write_all(&[*byte]).expect("write byte");
            self.stream.flush().expect("flush byte");
        }
    }

    /// Sends a chunk whose unary operator tag is not in the operator set.
    pub fn send_unknown_operator(&mut self, reply_port: u16, request_id: i32) {
        let tag = b"MODULO";
        let mut body = BytesMut::new();
        body.put_u8(FrameKind::Chunk as u8);
        body.put_i32(i32::from(reply_port));
        body.put_i32(0);
        body.put_i32(request_id);
        body.put_i32(1);
        body.put_i32(i32::try_from(tag.len()).expect("tag length"));
        body.put_slice(tag);
        body.put_f64(1.0);
        body.put_i32(-1);
        let mut frame = BytesMut::new();
        frame.put_u32(u32::try_from(body.len()).expect("body length"));
        frame.put_slice(&body);
        self.stream.write_all(&frame).expect("write raw frame");
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).expect("write raw bytes");
    }

    /// Reads until the server closes the connection.
    pub fn wait_for_close(&mut self) -> io::Result<()> {
        let mut sink = Vec::new();
        self.stream.read_to_end(&mut sink)?;
        Ok(())
    }
}

/// Registered reply connection receiving result frames.
pub struct ReplyConnection {
    inner: ChunkConnection,
}

impl ReplyConnection {
    /// Connects to `port` and registers it as the reply port.
    pub fn register(port: u16) -> Self {
        let mut inner = ChunkConnection::connect(port);
        inner.send(&Frame::Register { reply_port: port });
        Self { inner }
    }

    pub fn recv(&mut self) -> io::Result<ResponseFrame> {
        let mut bytes = [0_u8; RESPONSE_FRAME_LEN];
        self.inner.stream.read_exact(&mut bytes)?;
        Ok(decode_response(&bytes))
    }

    /// Sends a control frame over the reply connection.
    pub fn send(&mut self, frame: &Frame) {
        self.inner.send(frame);
    }

    pub fn wait_for_close(&mut self) -> io::Result<()> {
        self.inner.wait_for_close()
    }
}
