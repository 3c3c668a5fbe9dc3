use parking_lot::Mutex;

/// Comment position in centiseconds since the official stream start.
///
/// `server_time` and `open_time` are the relay clock and the local clock
/// captured at the same handshake, so their difference cancels any local
/// clock skew.
pub fn compute_vpos(server_time: i64, stream_start: i64, now: i64, open_time: i64) -> i64 {
    100 * (server_time - stream_start + now - open_time)
}

/// Post keys are issued per block of ten sequence numbers.
pub fn block_number(last_seq: i64) -> i64 {
    last_seq.div_euclid(10)
}

/// Highest sequence number seen on the thread.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: Mutex<i64>,
}

impl SequenceCounter {
    pub fn new(seed: i64) -> Self {
        Self {
            last: Mutex::new(seed),
        }
    }

    /// Records `no`; the counter never moves backwards.
    pub fn observe(&self, no: i64) -> i64 {
        let mut last = self.last.lock();
        *last = (*last).max(no);
        *last
    }

    pub fn reset(&self, seed: i64) {
        *self.last.lock() = seed;
    }

    pub fn last(&self) -> i64 {
        *self.last.lock()
    }

    pub fn block(&self) -> i64 {
        block_number(*self.last.lock())
    }
}
