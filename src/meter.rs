/// Mints meter identifiers for a single switch
///
/// Identifiers start at 1 and increase by one per allocation. Each switch session
/// owns its own allocator so switches never share (or contend for) a counter.
#[derive(Debug, Default)]
pub struct MeterAllocator {
    counter: u32,
}

impl MeterAllocator {
    pub fn new() -> Self {
        MeterAllocator::default()
    }

    pub fn next_meter_id(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }

    /// Most recently allocated meter id (0 if none yet)
    pub fn current(&self) -> u32 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let mut meters = MeterAllocator::new();
        assert_eq!(meters.current(), 0);
        let ids: Vec<u32> = (0..5).map(|_| meters.next_meter_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(meters.current(), 5);
    }

    #[test]
    fn test_independent_allocators() {
        let mut a = MeterAllocator::new();
        let mut b = MeterAllocator::new();
        assert_eq!(a.next_meter_id(), 1);
        assert_eq!(a.next_meter_id(), 2);
        assert_eq!(b.next_meter_id(), 1);
        assert_eq!(a.next_meter_id(), 3);
    }
}
