use std::cmp::min;
use std::ops::Index;

use log::debug;

use crate::utils::PerfectHash;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: usize,
}

impl<T> Entry<T> {
    /// Create a new cell with the given value.
    pub fn new(value: T) -> Self {
        Self { value, next: 0 }
    }
}

/// Hash-consing table: values are stored in a growable arena and chained into buckets.
///
/// Index 0 is a sentry and never holds a value.
pub struct Table<T> {
    data: Vec<Entry<T>>,

    buckets: Vec<usize>,
    bitmask: u64,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with the initial capacity of `2^bits`.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Storage bits should be in the range 0..=31");

        let capacity = 1 << bits;
        let mut data: Vec<Entry<T>> = Vec::with_capacity(capacity);
        data.push(Entry::new(T::default())); // sentry

        let buckets_bits = min(bits, 16);
        let buckets_size = 1 << buckets_bits;
        let buckets = vec![0; buckets_size];
        let bitmask = (buckets_size - 1) as u64;

        Self { data, buckets, bitmask }
    }
}

impl<T> Table<T> {
    /// Get the capacity of the table.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
    /// Get the number of stored values.
    pub fn size(&self) -> usize {
        self.data.len() - 1
    }
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    /// Get the index of the next cell in the same bucket.
    pub fn next(&self, index: usize) -> usize {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next
    }
    fn set_next(&mut self, index: usize, next: usize) {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next = next;
    }

    /// Add a new value to the table (bypassing the buckets) and return its index.
    pub fn add(&mut self, value: T) -> usize {
        self.data.push(Entry::new(value));
        self.data.len() - 1
    }
}

impl<T> Table<T>
where
    T: PerfectHash,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Put a new value into the table and return its index.
    ///
    /// If an equal value is already stored, its index is returned instead.
    pub fn put(&mut self, value: T) -> usize
    where
        T: Eq,
    {
        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        if index == 0 {
            // Create new node and put it into the bucket.
            let i = self.add(value);
            self.buckets[bucket_index] = i;
            self.maybe_rehash();
            return i;
        }

        loop {
            assert!(index > 0);

            if &value == self.value(index) {
                // The node already exists.
                return index;
            }

            let next = self.next(index);

            if next == 0 {
                // Create new node and append it to the bucket.
                let i = self.add(value);
                self.set_next(index, i);
                self.maybe_rehash();
                return i;
            } else {
                // Go to the next node in the bucket.
                index = next;
            }
        }
    }

    /// Double the number of buckets once chains get long on average.
    fn maybe_rehash(&mut self) {
        if self.size() <= 4 * self.buckets.len() {
            return;
        }

        let buckets_size = self.buckets.len() * 2;
        debug!("Rehashing table: {} -> {} buckets", self.buckets.len(), buckets_size);
        self.buckets = vec![0; buckets_size];
        self.bitmask = (buckets_size - 1) as u64;

        for index in 1..self.data.len() {
            let bucket_index = self.bucket_index(&self.data[index].value);
            self.data[index].next = self.buckets[bucket_index];
            self.buckets[bucket_index] = index;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    struct Item(i32);

    impl PerfectHash for Item {
        fn hash(&self) -> u64 {
            self.0.unsigned_abs() as u64
        }
    }

    #[test]
    fn test_add() {
        let mut table = Table::new(2);
        let index = table.add(42);
        assert_eq!(index, 1);
        assert_eq!(table[index], 42);
        assert_eq!(table.next(index), 0);
    }

    #[test]
    fn test_put() {
        let mut storage = Table::new(2);
        let index1 = storage.put(Item(5));
        let index2 = storage.put(Item(-5));
        assert_ne!(index1, index2);
        assert_eq!(storage[index1], Item(5));
        assert_eq!(storage[index2], Item(-5));
        assert_eq!(storage.next(index1), index2);
        assert_eq!(storage.put(Item(5)), index1);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut storage = Table::new(2);
        let indices: Vec<usize> = (0..100).map(|i| storage.put(Item(i))).collect();
        assert_eq!(storage.size(), 100);
        assert!(storage.num_buckets() > 4);
        for (i, &index) in indices.iter().enumerate() {
            assert_eq!(storage[index], Item(i as i32));
            assert_eq!(storage.put(Item(i as i32)), index);
        }
    }
}
