//! A server stand-in that records every frame and never answers.

use std::io::{ErrorKind, Read};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chaincalc_wire::{Frame, FrameDecoder};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Recorded {
    frames: Mutex<Vec<(u16, Frame)>>,
    streams: Mutex<Vec<TcpStream>>,
}

pub(crate) struct FakeServer {
    ports: Vec<u16>,
    recorded: Arc<Recorded>,
}

impl FakeServer {
    pub(crate) fn start(count: usize) -> Self {
        let recorded = Arc::new(Recorded::default());
        let ports = (0..count)
            .map(|_| {
                let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake listener");
                let port = listener.local_addr().expect("fake listener address").port();
                let recorded = Arc::clone(&recorded);
                thread::spawn(move || accept(&listener, port, &recorded));
                port
            })
            .collect();
        Self { ports, recorded }
    }

    pub(crate) fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Polls until `done` accepts the recorded frames or `timeout` passes.
    pub(crate) fn wait_for(
        &self,
        timeout: Duration,
        done: impl Fn(&[(u16, Frame)]) -> bool,
    ) -> Vec<(u16, Frame)> {
        let started = Instant::now();
        loop {
            let frames = self.recorded.frames.lock().expect("frames lock").clone();
            if done(&frames) || started.elapsed() >= timeout {
                return frames;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Drops every accepted connection.
    pub(crate) fn sever(&self) {
        for stream in self.recorded.streams.lock().expect("streams lock").iter() {
            stream.shutdown(Shutdown::Both).ok();
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.sever();
    }
}

fn accept(listener: &TcpListener, port: u16, recorded: &Arc<Recorded>) {
    for stream in listener.incoming() {
        let Ok(stream) = stream else {
            return;
        };
        if let Ok(clone) = stream.try_clone() {
            recorded.streams.lock().expect("streams lock").push(clone);
        }
        let recorded = Arc::clone(recorded);
        thread::spawn(move || record(stream, port, &recorded));
    }
}

fn record(mut stream: TcpStream, port: u16, recorded: &Recorded) {
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0_u8; 512];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) => return,
            Ok(read) => decoder.extend(buffer.get(..read).unwrap_or_default()),
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return,
        }
        while let Ok(Some(frame)) = decoder.next_frame() {
            recorded
                .frames
                .lock()
                .expect("frames lock")
                .push((port, frame));
        }
    }
}
