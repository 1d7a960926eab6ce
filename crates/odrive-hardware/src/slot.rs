use std::sync::atomic::{AtomicU64, Ordering};

/// Shared storage for one channel value.
///
/// The axis registry and every exported interface hold the same `Arc<Slot>`, so a
/// value written on one side is read on the other without copying. Stored as the bit
/// pattern of an `f64` so access never blocks.
#[derive(Debug, Default)]
pub struct Slot(AtomicU64);

impl Slot {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_shared_slot() {
        let slot = Arc::new(Slot::default());
        let view = Arc::clone(&slot);
        assert_eq!(view.get(), 0.0);
        slot.set(-1.25);
        assert_eq!(view.get(), -1.25);
        view.set(f64::NAN);
        assert!(slot.get().is_nan());
    }
}
