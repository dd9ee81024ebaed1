//! Pooled buffers for response body streaming.
//!
//! Large transfers pump every chunk through a leased fixed-size buffer
//! instead of allocating per frame. A buffer whose previous chunk has been
//! consumed downstream reclaims its allocation for the next copy; one still
//! shared with an in-flight chunk is simply dropped when it comes back.

use std::sync::Mutex;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use http_body_util::BodyExt;

/// Size of one pooled copy buffer.
pub const BUFFER_SIZE: usize = 16 * 1024;

/// Idle buffers kept around between bursts.
const POOL_LIMIT: usize = 32;

/// A process-wide pool to acquire temporary copy buffers from anywhere in
/// the program.
pub static BUFFERS: BufferPool = BufferPool::new(BUFFER_SIZE);

pub struct BufferPool {
    size: usize,
    idle: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub const fn new(size: usize) -> Self {
        Self {
            size,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Lease a buffer; it returns to the pool when the lease drops.
    pub fn get(&'static self) -> Lease {
        let buffer = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop()
        };

        Lease {
            pool: self,
            buffer: buffer.unwrap_or_else(|| BytesMut::with_capacity(self.size)),
        }
    }

    fn put(&self, mut buffer: BytesMut) {
        if !buffer.try_reclaim(self.size) {
            // Still shared with an undelivered chunk; let it go.
            return;
        }
        buffer.clear();

        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < POOL_LIMIT {
            idle.push(buffer);
        }
    }

    #[cfg(test)]
    fn idle_buffers(&self) -> usize {
        self.idle.lock().unwrap().len()
    }
}

/// A buffer on loan from a [`BufferPool`].
pub struct Lease {
    pool: &'static BufferPool,
    buffer: BytesMut,
}

impl Lease {
    /// Copy `data` through the leased buffer and hand the result out as a
    /// frozen chunk.
    fn copy_chunk(&mut self, data: &[u8]) -> Bytes {
        // Best effort: reuse the allocation when the previous chunk has
        // already been dropped downstream.
        let _ = self.buffer.try_reclaim(data.len());
        self.buffer.extend_from_slice(data);
        self.buffer.split().freeze()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buffer));
    }
}

struct Pump<B> {
    upstream: B,
    carry: Bytes,
    lease: Lease,
}

impl<B> Pump<B>
where
    B: http_body::Body<Data = Bytes> + Unpin,
{
    async fn next_chunk(&mut self) -> Option<Result<Bytes, B::Error>> {
        loop {
            if !self.carry.is_empty() {
                let take = self.carry.split_to(self.carry.len().min(BUFFER_SIZE));
                return Some(Ok(self.lease.copy_chunk(&take)));
            }

            match self.upstream.frame().await? {
                Ok(frame) => {
                    // Trailer frames are dropped; only data travels on.
                    if let Ok(data) = frame.into_data() {
                        self.carry = data;
                    }
                }
                Err(error) => return Some(Err(error)),
            }
        }
    }
}

/// Stream `upstream` to a fresh [`Body`], pumping every chunk through a
/// pooled buffer. The lease is released on every exit path, including the
/// client going away mid-transfer.
pub fn pooled_copy<B>(upstream: B) -> Body
where
    B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let pump = Pump {
        upstream,
        carry: Bytes::new(),
        lease: BUFFERS.get(),
    };

    Body::from_stream(stream::unfold(pump, |mut pump| async move {
        pump.next_chunk().await.map(|chunk| (chunk, pump))
    }))
}
