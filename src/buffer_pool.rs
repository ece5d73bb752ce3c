//! Bounded pool of scratch byte buffers. Rentals own their buffer
//! exclusively; release returns it to a mutex-guarded freelist in O(1).

use std::sync::Mutex;

pub struct BufferPool {
    freelist: Mutex<Vec<Vec<u8>>>,
    max_buffers: usize,
}

impl BufferPool {
    pub fn new(max_buffers: usize) -> Self {
        Self {
            freelist: Mutex::new(Vec::new()),
            max_buffers,
        }
    }

    /// Rent a cleared buffer with at least `capacity` bytes reserved.
    pub fn acquire(&self, capacity: usize) -> Vec<u8> {
        let mut freelist = self.freelist.lock().unwrap_or_else(|e| e.into_inner());
        match freelist.pop() {
            Some(mut buf) => {
                buf.clear();
                buf.reserve(capacity);
                buf
            }
            None => Vec::with_capacity(capacity),
        }
    }

    /// Return a buffer; dropped instead when the pool is full.
    pub fn release(&self, buf: Vec<u8>) {
        let mut freelist = self.freelist.lock().unwrap_or_else(|e| e.into_inner());
        if freelist.len() < self.max_buffers {
            freelist.push(buf);
        }
    }

    pub fn idle_buffers(&self) -> usize {
        self.freelist.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_recycled() {
        let pool = BufferPool::new(4);
        let mut buf = pool.acquire(128);
        buf.extend_from_slice(&[1, 2, 3]);
        let cap = buf.capacity();
        pool.release(buf);
        assert_eq!(pool.idle_buffers(), 1);

        let again = pool.acquire(16);
        assert!(again.is_empty());
        assert!(again.capacity() >= cap.min(16));
        assert_eq!(pool.idle_buffers(), 0);
    }

    #[test]
    fn pool_is_bounded() {
        let pool = BufferPool::new(2);
        for _ in 0..5 {
            pool.release(Vec::with_capacity(8));
        }
        assert_eq!(pool.idle_buffers(), 2);
    }

    #[test]
    fn concurrent_rentals() {
        use std::sync::Arc;
        let pool = Arc::new(BufferPool::new(8));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let buf = pool.acquire(64);
                        pool.release(buf);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.idle_buffers() <= 8);
    }
}
