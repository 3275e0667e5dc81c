use std::time::Instant;

/// Per-connection state owned by the event loop. The read buffer accumulates
/// raw bytes from the socket; the write buffer drains toward it with
/// `bytes_sent` marking progress. Timestamps feed the timeout sweep.
#[derive(Debug)]
pub struct ClientSession {
    pub read_buffer: Vec<u8>,
    pub write_buffer: Vec<u8>,
    pub bytes_sent: usize,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub keep_alive: bool,
}

impl ClientSession {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            read_buffer: Vec::new(),
            write_buffer: Vec::new(),
            bytes_sent: 0,
            connected_at: now,
            last_activity: now,
            keep_alive: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_seconds(&self, now: Instant) -> u64 {
        now.duration_since(self.last_activity).as_secs()
    }

    /// Queue a serialized response; any previous unsent payload is replaced.
    pub fn queue_response(&mut self, wire: Vec<u8>) {
        self.write_buffer = wire;
        self.bytes_sent = 0;
    }

    /// Append a serialized response behind whatever is still queued, so
    /// pipelined responses go out in arrival order.
    pub fn append_response(&mut self, wire: &[u8]) {
        if self.write_buffer.is_empty() {
            self.bytes_sent = 0;
        }
        self.write_buffer.extend_from_slice(wire);
    }

    pub fn has_pending_write(&self) -> bool {
        self.bytes_sent < self.write_buffer.len()
    }

    pub fn unsent(&self) -> &[u8] {
        &self.write_buffer[self.bytes_sent..]
    }

    /// Drop `consumed` bytes off the front of the read buffer, keeping any
    /// pipelined follow-up request.
    pub fn consume_read(&mut self, consumed: usize) {
        if consumed >= self.read_buffer.len() {
            self.read_buffer.clear();
        } else {
            self.read_buffer.drain(..consumed);
        }
    }

    /// After a full send on a keep-alive connection the session is retained:
    /// buffers reset, keep-alive flag untouched.
    pub fn reset_for_next_request(&mut self) {
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.bytes_sent = 0;
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}
