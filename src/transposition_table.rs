//! Score bound caches used by the [`Solver`](crate::solver::Solver)
//!
//! Both tables are direct-mapped: a key lives at `key % len` and only its
//! low 32 bits are stored. With an odd length of at least
//! `2^(WIDTH * (HEIGHT + 1) - 32)` the index and the stored bits together
//! identify a key exactly, so a hit is never a false positive.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{atomic::*, Arc};

use crate::error::TableError;
use crate::solver::MAX_ENCODED_BOUND;
use crate::{HEIGHT, WIDTH};

const TABLE_MAX_SIZE: usize = (1 << 23) + 9; // prime value
// largest snapshot accepted by `load`, still addressable by its u32 indices
const TABLE_LIMIT: u64 = 16 * TABLE_MAX_SIZE as u64;
const SNAPSHOT_MAGIC: &[u8; 4] = b"C4TT";

/// Storage for encoded score bounds, 0 meaning "no entry"
pub trait ScoreCache {
    fn get(&self, key: u64) -> u8;
    fn set(&mut self, key: u64, value: u8);
}

/// The smallest table length that keeps partial keys unambiguous
const fn min_table_size() -> usize {
    let key_bits = WIDTH * (HEIGHT + 1);
    if key_bits > 32 {
        1 << (key_bits - 32)
    } else {
        1
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut i = 2;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

fn table_size(requested: usize) -> usize {
    let mut size = requested.max(min_table_size());
    while !is_prime(size) {
        size += 1;
    }
    size
}

fn usable_size(size: u64) -> bool {
    size >= min_table_size() as u64 && size <= TABLE_LIMIT && size % 2 == 1
}

#[derive(Copy, Clone)]
struct Entry {
    key: u32,
    value: u8,
}
impl Entry {
    pub fn new() -> Self {
        Self { key: 0, value: 0 }
    }
}

/// A single-threaded transposition table
#[derive(Clone)]
pub struct TranspositionTable {
    entries: Vec<Entry>,
}

impl TranspositionTable {
    pub fn new() -> Self {
        Self {
            entries: vec![Entry::new(); TABLE_MAX_SIZE],
        }
    }

    /// Creates a table with at least `entries` slots, rounded up to a prime
    pub fn with_capacity(entries: usize) -> Self {
        Self {
            entries: vec![Entry::new(); table_size(entries)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// The number of slots holding a bound
    pub fn occupied(&self) -> usize {
        self.entries.iter().filter(|e| e.value != 0).count()
    }

    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = Entry::new();
        }
    }

    /// Writes every occupied slot to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        let mut file = BufWriter::new(File::create(path.as_ref())?);
        file.write_all(SNAPSHOT_MAGIC)?;
        file.write_u32::<BigEndian>(WIDTH as u32)?;
        file.write_u32::<BigEndian>(HEIGHT as u32)?;
        file.write_u64::<BigEndian>(self.entries.len() as u64)?;

        let occupied = self.occupied();
        file.write_u64::<BigEndian>(occupied as u64)?;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.value != 0 {
                file.write_u32::<BigEndian>(index as u32)?;
                file.write_u32::<BigEndian>(entry.key)?;
                file.write_u8(entry.value)?;
            }
        }
        file.flush()?;

        info!(
            "saved {} transposition table entries to {}",
            occupied,
            path.as_ref().display()
        );
        Ok(())
    }

    /// Reads a table written by [`TranspositionTable::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let mut file = BufReader::new(File::open(path.as_ref())?);

        let mut magic = [0; 4];
        file.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(TableError::BadMagic);
        }
        let width = file.read_u32::<BigEndian>()? as usize;
        let height = file.read_u32::<BigEndian>()? as usize;
        if (width, height) != (WIDTH, HEIGHT) {
            return Err(TableError::DimensionMismatch { width, height });
        }
        let size = file.read_u64::<BigEndian>()?;
        if !usable_size(size) {
            return Err(TableError::BadCapacity(size));
        }

        let mut entries = vec![Entry::new(); size as usize];
        let occupied = file.read_u64::<BigEndian>()?;
        for _ in 0..occupied {
            let index = file.read_u32::<BigEndian>()? as usize;
            let key = file.read_u32::<BigEndian>()?;
            let value = file.read_u8()?;
            if index >= entries.len() {
                return Err(TableError::BadCapacity(size));
            }
            if value == 0 || value > MAX_ENCODED_BOUND {
                return Err(TableError::BadValue { index, value });
            }
            entries[index] = Entry { key, value };
        }

        info!(
            "loaded {} transposition table entries from {}",
            occupied,
            path.as_ref().display()
        );
        Ok(Self { entries })
    }
}

impl ScoreCache for TranspositionTable {
    fn set(&mut self, key: u64, value: u8) {
        let len = self.entries.len();
        self.entries[(key % len as u64) as usize] = Entry {
            key: key as u32,
            value,
        };
    }
    fn get(&self, key: u64) -> u8 {
        let entry = self.entries[(key % self.entries.len() as u64) as usize];
        if entry.key == key as u32 {
            entry.value
        } else {
            0
        }
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        Self::new()
    }
}

struct SharedEntry {
    key: AtomicU32,
    value: AtomicU8,
}
impl SharedEntry {
    pub fn new() -> Self {
        Self {
            key: AtomicU32::new(0),
            value: AtomicU8::new(0),
        }
    }
    pub fn store(&self, key: u32, value: u8) {
        self.key.store(key, Ordering::Relaxed);
        self.value.store(value, Ordering::Relaxed);
    }
}

/// A transposition table that can be shared between threads
///
/// Clones share storage. Concurrent writes to one slot may interleave; the
/// stored key is mixed with the value so a torn entry reads as a miss.
#[derive(Clone)]
pub struct SharedTranspositionTable {
    entries: Arc<Vec<SharedEntry>>,
}
impl SharedTranspositionTable {
    pub fn new() -> Self {
        Self::with_size(TABLE_MAX_SIZE)
    }

    pub fn with_capacity(entries: usize) -> Self {
        Self::with_size(table_size(entries))
    }

    fn with_size(size: usize) -> Self {
        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            entries.push(SharedEntry::new());
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

impl ScoreCache for SharedTranspositionTable {
    fn set(&mut self, key: u64, value: u8) {
        let i = (key % self.entries.len() as u64) as usize;
        self.entries[i].store(key as u32 ^ value as u32, value);
    }
    fn get(&self, key: u64) -> u8 {
        let entry = &self.entries[(key % self.entries.len() as u64) as usize];
        let data = entry.value.load(Ordering::Relaxed);
        if entry.key.load(Ordering::Relaxed) == key as u32 ^ data as u32 {
            data
        } else {
            0
        }
    }
}

impl Default for SharedTranspositionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_prime_and_unambiguous() {
        let table = TranspositionTable::with_capacity(1000);
        assert!(is_prime(table.capacity()));
        assert!(usable_size(table.capacity() as u64));
        assert!(usable_size(TABLE_MAX_SIZE as u64));
        assert!(TABLE_LIMIT <= u32::MAX as u64 + 1);
    }

    #[test]
    fn colliding_slots_miss() {
        let mut table = TranspositionTable::with_capacity(0);
        let len = table.capacity() as u64;
        table.set(5, 42);
        assert_eq!(table.get(5), 42);
        // same slot, different key
        assert_eq!(table.get(5 + len), 0);
        table.set(5 + len, 7);
        assert_eq!(table.get(5), 0);
        assert_eq!(table.get(5 + len), 7);
    }

    #[test]
    fn shared_clones_see_each_other() {
        let mut writer = SharedTranspositionTable::with_capacity(0);
        let reader = writer.clone();
        writer.set(123_456_789, 9);
        assert_eq!(reader.get(123_456_789), 9);
        assert_eq!(reader.get(123_456_788), 0);
    }

    fn write_snapshot(name: &str, size: u64, records: &[(u32, u32, u8)]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.c4tt", name, std::process::id()));
        let mut file = BufWriter::new(File::create(&path).unwrap());
        file.write_all(SNAPSHOT_MAGIC).unwrap();
        file.write_u32::<BigEndian>(WIDTH as u32).unwrap();
        file.write_u32::<BigEndian>(HEIGHT as u32).unwrap();
        file.write_u64::<BigEndian>(size).unwrap();
        file.write_u64::<BigEndian>(records.len() as u64).unwrap();
        for &(index, key, value) in records {
            file.write_u32::<BigEndian>(index).unwrap();
            file.write_u32::<BigEndian>(key).unwrap();
            file.write_u8(value).unwrap();
        }
        file.flush().unwrap();
        path
    }

    #[test]
    fn oversized_snapshot_is_rejected() {
        let size = (1 << 62) + 1;
        let path = write_snapshot("oversized", size, &[]);
        let result = TranspositionTable::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(TableError::BadCapacity(s)) if s == size));
    }

    #[test]
    fn snapshot_values_must_be_bounds() {
        let size = table_size(0) as u64;
        for &value in &[0, MAX_ENCODED_BOUND + 1, u8::MAX] {
            let path = write_snapshot("bad-value", size, &[(3, 3, value)]);
            let result = TranspositionTable::load(&path);
            std::fs::remove_file(&path).unwrap();
            assert!(matches!(
                result,
                Err(TableError::BadValue { index: 3, value: v }) if v == value
            ));
        }

        let path = write_snapshot("good-value", size, &[(3, 3, MAX_ENCODED_BOUND)]);
        let table = TranspositionTable::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(table.get(3), MAX_ENCODED_BOUND);
    }
}
