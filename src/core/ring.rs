// Fixed-capacity ring buffer backing pipe-mode payloads
//
// A single mutator owns the buffer; `append` and `consume` each update the
// cursors and the free count as one step. Cross-thread producers must wrap
// the buffer in their own lock.

use crate::core::error::{Result, SignalError};
use crate::core::format::{ScalarType, SignalHeader};
use tracing::{trace, warn};

pub type WriteListener = Box<dyn FnMut(usize) + Send>;

/// How write listeners are invoked after an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Queue the notification until `dispatch_pending` runs. Queued
    /// appends coalesce into one notification carrying their total.
    #[default]
    Deferred,
    /// Invoke listeners before `append` returns.
    Sync,
}

pub struct RingBuffer {
    data: Vec<f64>,
    bits_per_element: usize,
    capacity_bytes: usize,
    write_idx: usize,
    read_idx: usize,
    free: usize,
    total_appended: u64,
    listeners: Vec<WriteListener>,
    /// Elements appended since the last deferred notification.
    pending: usize,
    #[cfg(feature = "async")]
    watch_tx: tokio::sync::watch::Sender<u64>,
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity_bytes", &self.capacity_bytes)
            .field("capacity_elements", &self.data.len())
            .field("write_idx", &self.write_idx)
            .field("read_idx", &self.read_idx)
            .field("free", &self.free)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl RingBuffer {
    /// Ring of `capacity_bytes` holding scalars of type `scalar`.
    pub fn new(capacity_bytes: usize, scalar: ScalarType) -> Self {
        let bits_per_element = scalar.bits();
        let capacity_elements = capacity_bytes * 8 / bits_per_element;
        Self {
            data: vec![0.0; capacity_elements],
            bits_per_element,
            capacity_bytes,
            write_idx: 0,
            read_idx: 0,
            free: capacity_elements,
            total_appended: 0,
            listeners: Vec::new(),
            pending: 0,
            #[cfg(feature = "async")]
            watch_tx: tokio::sync::watch::channel(0).0,
        }
    }

    /// Ring sized by a pipe header's `pipesize`.
    pub fn from_header(header: &SignalHeader) -> Result<Self> {
        if !header.pipe {
            return Err(SignalError::NotAPipe);
        }
        if header.pipesize <= 0 {
            return Err(SignalError::InvalidHeader(format!(
                "pipe size must be positive, got {}",
                header.pipesize
            )));
        }
        Ok(Self::new(
            header.pipesize as usize,
            header.format.scalar_type(),
        ))
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn capacity_elements(&self) -> usize {
        self.data.len()
    }

    pub fn free_elements(&self) -> usize {
        self.free
    }

    /// Elements written but not yet consumed.
    pub fn available(&self) -> usize {
        self.data.len() - self.free
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Byte offset of the next write.
    pub fn write_cursor(&self) -> usize {
        self.write_idx * self.bits_per_element / 8
    }

    /// Byte offset of the next read.
    pub fn read_cursor(&self) -> usize {
        self.read_idx * self.bits_per_element / 8
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    pub fn on_write<F>(&mut self, listener: F)
    where
        F: FnMut(usize) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
        self.pending = 0;
    }

    #[cfg(feature = "async")]
    /// Receiver tracking the running count of appended elements.
    pub fn watch(&self) -> tokio::sync::watch::Receiver<u64> {
        self.watch_tx.subscribe()
    }

    /// Append with deferred listener dispatch.
    pub fn append(&mut self, samples: &[f64]) -> Result<()> {
        self.append_with(samples, Dispatch::Deferred)
    }

    pub fn append_with(&mut self, samples: &[f64], dispatch: Dispatch) -> Result<()> {
        let n = samples.len();
        if n > self.free {
            warn!("Pipe full: dropping write of {} elements ({} free)", n, self.free);
            return Err(SignalError::Overflow {
                requested: n,
                free: self.free,
            });
        }
        if n == 0 {
            return Ok(());
        }

        let cap = self.data.len();
        let first = n.min(cap - self.write_idx);
        self.data[self.write_idx..self.write_idx + first].copy_from_slice(&samples[..first]);
        self.data[..n - first].copy_from_slice(&samples[first..]);
        self.write_idx = (self.write_idx + n) % cap;
        self.free -= n;
        self.total_appended += n as u64;
        trace!("Appended {} elements, {} free", n, self.free);

        #[cfg(feature = "async")]
        self.watch_tx.send_replace(self.total_appended);

        match dispatch {
            Dispatch::Sync => self.notify(n),
            Dispatch::Deferred => self.pending += n,
        }
        Ok(())
    }

    /// Copy up to `requested` elements (default: as many as fit in `dest`)
    /// into `dest`. Returns 0 without consuming when fewer are available.
    pub fn consume(&mut self, dest: &mut [f64], requested: Option<i64>) -> Result<usize> {
        let available = self.available();
        let count = match requested {
            None => dest.len().min(available),
            Some(r) if r < 0 => return Err(SignalError::Negative(r)),
            Some(r) => r as usize,
        };
        if count > dest.len() {
            return Err(SignalError::OutOfRange {
                offset: 0,
                len: count,
                available: dest.len(),
            });
        }
        if count > available || count == 0 {
            return Ok(0);
        }

        let cap = self.data.len();
        let first = count.min(cap - self.read_idx);
        dest[..first].copy_from_slice(&self.data[self.read_idx..self.read_idx + first]);
        dest[first..count].copy_from_slice(&self.data[..count - first]);
        self.read_idx = (self.read_idx + count) % cap;
        self.free += count;
        Ok(count)
    }

    /// Deliver the coalesced write notification, if any. Returns how many
    /// notifications were delivered (0 or 1).
    pub fn dispatch_pending(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        if pending == 0 {
            return 0;
        }
        self.notify(pending);
        1
    }

    fn notify(&mut self, n: usize) {
        for listener in self.listeners.iter_mut() {
            listener(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ring(elements: usize) -> RingBuffer {
        RingBuffer::new(elements * 8, ScalarType::Float64)
    }

    #[test]
    fn test_capacity_from_element_size() {
        let r = RingBuffer::new(64, ScalarType::Int16);
        assert_eq!(r.capacity_elements(), 32);
        let bits = RingBuffer::new(2, ScalarType::PackedBit);
        assert_eq!(bits.capacity_elements(), 16);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let cap = 16;
        let mut r = ring(cap);
        let first: Vec<f64> = (0..cap - 3).map(|i| i as f64).collect();
        r.append(&first).unwrap();

        let mut head = vec![0.0; cap - 3];
        assert_eq!(r.consume(&mut head, None).unwrap(), cap - 3);
        assert_eq!(head, first);

        let second: Vec<f64> = (100..106).map(|i| i as f64).collect();
        r.append(&second).unwrap();
        assert_eq!(r.write_cursor(), 3 * 8);

        let mut out = vec![0.0; cap];
        assert_eq!(r.consume(&mut out, None).unwrap(), 6);
        assert_eq!(&out[..6], &second[..]);
    }

    #[test]
    fn test_fill_across_boundary_then_drain() {
        let cap = 10;
        let mut r = ring(cap);
        r.append(&[0.0; 7]).unwrap();
        let mut sink = [0.0; 7];
        r.consume(&mut sink, None).unwrap();

        let all: Vec<f64> = (0..cap).map(|i| i as f64 * 1.5).collect();
        r.append(&all[..cap - 3]).unwrap();
        r.append(&all[cap - 3..]).unwrap();
        assert_eq!(r.free_elements(), 0);

        let mut out = vec![0.0; cap];
        assert_eq!(r.consume(&mut out, Some(cap as i64)).unwrap(), cap);
        assert_eq!(out, all);
    }

    #[test]
    fn test_overflow_rejected() {
        let mut r = ring(4);
        r.append(&[1.0, 2.0, 3.0]).unwrap();
        let err = r.append(&[4.0, 5.0]).unwrap_err();
        assert!(matches!(err, SignalError::Overflow { requested: 2, free: 1 }));
        assert_eq!(r.available(), 3);
    }

    #[test]
    fn test_consume_edge_cases() {
        let mut r = ring(8);
        r.append(&[1.0, 2.0]).unwrap();
        let mut dest = [0.0; 4];
        assert!(matches!(
            r.consume(&mut dest, Some(-1)),
            Err(SignalError::Negative(-1))
        ));
        assert_eq!(r.consume(&mut dest, Some(3)).unwrap(), 0);
        assert_eq!(r.available(), 2);
        assert!(r.consume(&mut dest, Some(5)).is_err());
        assert_eq!(r.consume(&mut dest, Some(2)).unwrap(), 2);
        assert_eq!(&dest[..2], &[1.0, 2.0]);
        assert_eq!(r.consume(&mut dest, None).unwrap(), 0);
    }

    #[test]
    fn test_conservation_randomized() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut r = ring(37);
        let mut expected = std::collections::VecDeque::new();
        let mut next = 0.0;
        let mut dest = vec![0.0; 64];

        for _ in 0..2000 {
            if rng.gen_bool(0.5) {
                let n = rng.gen_range(0..=r.free_elements());
                let batch: Vec<f64> = (0..n)
                    .map(|_| {
                        next += 1.0;
                        next
                    })
                    .collect();
                r.append(&batch).unwrap();
                expected.extend(batch);
            } else {
                let n = rng.gen_range(0..=r.available());
                let got = r.consume(&mut dest[..n], None).unwrap();
                assert_eq!(got, n);
                for v in &dest[..n] {
                    assert_eq!(Some(*v), expected.pop_front());
                }
            }
            assert_eq!(r.free_elements() + r.available(), r.capacity_elements());
            assert_eq!(r.available(), expected.len());
        }
    }

    #[test]
    fn test_listener_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut r = ring(8);
        r.on_write(move |n| {
            seen.fetch_add(n, Ordering::SeqCst);
        });

        r.append(&[1.0, 2.0]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        r.append_with(&[3.0], Dispatch::Sync).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.dispatch_pending(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(r.dispatch_pending(), 0);
    }

    #[test]
    fn test_deferred_writes_coalesce() {
        let calls = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));
        let (c, t) = (calls.clone(), total.clone());
        let mut r = ring(4);
        r.on_write(move |n| {
            c.fetch_add(1, Ordering::SeqCst);
            t.fetch_add(n, Ordering::SeqCst);
        });

        for _ in 0..1000 {
            r.append(&[1.0, 2.0]).unwrap();
            let mut dest = [0.0; 2];
            assert_eq!(r.consume(&mut dest, None).unwrap(), 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(r.dispatch_pending(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(total.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn test_from_header_requires_pipe() {
        use crate::core::codec::{synthesize, HeaderOverrides, Payload};
        let resident = synthesize(&HeaderOverrides::default(), Payload::Samples(&[1.0])).unwrap();
        assert!(matches!(RingBuffer::from_header(&resident), Err(SignalError::NotAPipe)));

        let pipe = synthesize(
            &HeaderOverrides::default(),
            Payload::Pipe { capacity_bytes: 400 },
        )
        .unwrap();
        let r = RingBuffer::from_header(&pipe).unwrap();
        assert_eq!(r.capacity_elements(), 100);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_watch_tracks_appends() {
        let mut r = ring(8);
        let mut rx = r.watch();
        r.append(&[1.0, 2.0, 3.0]).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 3);
    }
}
