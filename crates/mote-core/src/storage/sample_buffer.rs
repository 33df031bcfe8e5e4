use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};

use super::SAMPLE_WINDOW;
use crate::value::ScaledValue;

/// Slot storage guarded by the buffer's lock
struct Slots<const N: usize> {
    samples: [i32; N],
    /// Slot the next write lands in
    next: usize,
    /// Writes since the last fill
    writes: u32,
}

/// Fixed-capacity circular store of raw samples for one metric
///
/// The buffer always holds exactly `N` samples: it is constructed pre-filled
/// and every write overwrites the oldest slot. All access goes through a
/// blocking mutex that is held only for the in-memory scan or update, so a
/// reader can never observe a partially written slot and the lock is never
/// held across sensor or network I/O.
///
/// With the default [`CriticalSectionRawMutex`] every buffer locks the same
/// process-wide critical section, so buffers of different metrics briefly
/// serialize against each other. Pick another `R` (e.g. a `NoopRawMutex` for
/// buffers confined to one executor) to give a buffer a lock of its own.
///
/// ```rust,ignore
/// static TEMPERATURE: SampleBuffer<6> = SampleBuffer::new(0);
///
/// TEMPERATURE.write(2371);
/// let avg = TEMPERATURE.snapshot_and_average();
/// ```
pub struct SampleBuffer<const N: usize = SAMPLE_WINDOW, R = CriticalSectionRawMutex> {
    slots: Mutex<R, RefCell<Slots<N>>>,
}

impl<const N: usize, R: RawMutex> SampleBuffer<N, R> {
    /// Create a buffer whose `N` slots all hold `initial`
    pub const fn new(initial: i32) -> Self {
        const { assert!(N > 0, "a sample buffer needs at least one slot") };
        Self {
            slots: Mutex::new(RefCell::new(Slots {
                samples: [initial; N],
                next: 0,
                writes: 0,
            })),
        }
    }

    /// Number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Overwrite every slot with `value` and reset the write cursor
    pub fn fill(&self, value: i32) {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            slots.samples = [value; N];
            slots.next = 0;
            slots.writes = 0;
        });
    }

    /// Store `value` in the oldest slot
    pub fn write(&self, value: i32) {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            let next = slots.next;
            slots.samples[next] = value;
            slots.next = (next + 1) % N;
            slots.writes = slots.writes.wrapping_add(1);
        });
    }

    /// Truncating integer mean of all slots, still scaled
    pub fn snapshot_and_average(&self) -> ScaledValue {
        let sum = self.slots.lock(|slots| {
            slots
                .borrow()
                .samples
                .iter()
                .map(|&sample| i64::from(sample))
                .sum::<i64>()
        });
        // The mean of i32 values always fits in an i32
        ScaledValue::new((sum / N as i64) as i32)
    }

    /// Copy of the slots in write order, oldest first
    pub fn snapshot(&self) -> [i32; N] {
        self.slots.lock(|slots| {
            let slots = slots.borrow();
            core::array::from_fn(|i| slots.samples[(slots.next + i) % N])
        })
    }

    /// Writes since construction or the last [`fill`](Self::fill)
    pub fn writes(&self) -> u32 {
        self.slots.lock(|slots| slots.borrow().writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_with_local_lock() {
        use embassy_sync::blocking_mutex::raw::NoopRawMutex;

        let humidity = SampleBuffer::<3, NoopRawMutex>::new(4500);
        let temperature = SampleBuffer::<3, NoopRawMutex>::new(2000);
        humidity.write(4800);
        temperature.write(2300);

        assert_eq!(humidity.snapshot(), [4500, 4500, 4800]);
        assert_eq!(humidity.snapshot_and_average().raw(), 4600);
        assert_eq!(temperature.snapshot_and_average().raw(), 2100);
    }

    #[test]
    fn test_new_buffer_is_prefilled() {
        let buffer = SampleBuffer::<6>::new(2371);
        assert_eq!(buffer.snapshot(), [2371; 6]);
        assert_eq!(buffer.snapshot_and_average().raw(), 2371);
        assert_eq!(buffer.writes(), 0);
    }

    #[test]
    fn test_circular_overwrite_keeps_last_n_in_order() {
        let buffer = SampleBuffer::<4>::new(0);
        for value in 1..=10 {
            buffer.write(value);
        }
        assert_eq!(buffer.snapshot(), [7, 8, 9, 10]);

        buffer.write(11);
        assert_eq!(buffer.snapshot(), [8, 9, 10, 11]);
        assert_eq!(buffer.writes(), 11);
    }

    #[test]
    fn test_partial_window_mixes_with_initial_fill() {
        let buffer = SampleBuffer::<4>::new(5);
        buffer.write(1);
        buffer.write(2);
        assert_eq!(buffer.snapshot(), [5, 5, 1, 2]);
    }

    #[test]
    fn test_average_truncates() {
        let buffer = SampleBuffer::<6>::new(100);
        assert_eq!(buffer.snapshot_and_average().raw(), 100);

        for value in [100, 101, 100, 101, 100, 101] {
            buffer.write(value);
        }
        // 603 / 6 = 100.5
        assert_eq!(buffer.snapshot_and_average().raw(), 100);
    }

    #[test]
    fn test_average_truncates_toward_zero_for_negative_sums() {
        let buffer = SampleBuffer::<6>::new(-100);
        buffer.write(-101);
        buffer.write(-101);
        buffer.write(-101);
        // -603 / 6 = -100.5
        assert_eq!(buffer.snapshot_and_average().raw(), -100);
    }

    #[test]
    fn test_average_does_not_overflow() {
        let buffer = SampleBuffer::<6>::new(i32::MAX);
        assert_eq!(buffer.snapshot_and_average().raw(), i32::MAX);
    }

    #[test]
    fn test_average_is_idempotent() {
        let buffer = SampleBuffer::<6>::new(0);
        for value in [3, 1, 4, 1, 5, 9] {
            buffer.write(value);
        }
        let first = buffer.snapshot_and_average();
        let second = buffer.snapshot_and_average();
        assert_eq!(first, second);
        assert_eq!(first.raw(), 3);
    }

    #[test]
    fn test_fill_resets_cursor() {
        let buffer = SampleBuffer::<3>::new(0);
        buffer.write(1);
        buffer.fill(7);
        assert_eq!(buffer.snapshot(), [7, 7, 7]);
        assert_eq!(buffer.writes(), 0);

        buffer.write(8);
        assert_eq!(buffer.snapshot(), [7, 7, 8]);
    }
}
