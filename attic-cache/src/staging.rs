// Copyright 2025 attic Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

/// Bulk-load write buffer: N append-only bucket files selected by the high
/// bits of the key hash.
///
/// Each file holds a sequence of records prefixed by a `u64` little-endian
/// byte length. File names are deterministic (`stage-NNNN.bin`), so a crash
/// between enter and replay leaves recoverable, bucket-identifiable state; a
/// torn trailing record is dropped on replay.
pub(crate) struct Staging {
    dir: PathBuf,
    bucket_bits: u32,
    writers: Vec<BufWriter<File>>,
    paths: Vec<PathBuf>,
}

impl Staging {
    /// Open `buckets` staging files under `dir`, truncating leftovers from a
    /// previous run. The bucket count is rounded up to a power of two.
    pub fn create(dir: &Path, buckets: usize) -> std::io::Result<Self> {
        let buckets = buckets.max(1).next_power_of_two();
        let bucket_bits = buckets.trailing_zeros();
        std::fs::create_dir_all(dir)?;

        let mut writers = Vec::with_capacity(buckets);
        let mut paths = Vec::with_capacity(buckets);
        for index in 0..buckets {
            let path = dir.join(format!("stage-{index:04}.bin"));
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            writers.push(BufWriter::new(file));
            paths.push(path);
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            bucket_bits,
            writers,
            paths,
        })
    }

    /// Bucket index for a key hash: the hash's high bits.
    pub fn bucket_of(&self, hash: u32) -> usize {
        if self.bucket_bits == 0 {
            0
        } else {
            (hash >> (32 - self.bucket_bits)) as usize
        }
    }

    /// Append a serialized record to the bucket of `hash`.
    pub fn append(&mut self, hash: u32, record: &[u8]) -> std::io::Result<()> {
        let bucket = self.bucket_of(hash);
        let writer = &mut self.writers[bucket];
        writer.write_all(&(record.len() as u64).to_le_bytes())?;
        writer.write_all(record)
    }

    /// Staging directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flush and close every writer, handing back the bucket files for
    /// replay, in bucket order.
    pub fn into_buckets(mut self) -> std::io::Result<Vec<StagingBucket>> {
        for writer in &mut self.writers {
            writer.flush()?;
        }
        drop(self.writers);
        Ok(self.paths.into_iter().map(StagingBucket::new).collect())
    }
}

/// One closed staging file, ready to be replayed and deleted.
pub(crate) struct StagingBucket {
    path: PathBuf,
}

impl StagingBucket {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the bucket's records in append order.
    pub fn records(&self) -> std::io::Result<StagingRecords> {
        Ok(StagingRecords {
            reader: BufReader::new(File::open(&self.path)?),
            path: self.path.clone(),
            done: false,
        })
    }

    /// Delete the consumed bucket file.
    pub fn delete(self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }
}

/// Iterator over the length-prefixed records of one bucket.
pub(crate) struct StagingRecords {
    reader: BufReader<File>,
    path: PathBuf,
    done: bool,
}

impl Iterator for StagingRecords {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut len = [0u8; 8];
        match self.reader.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                // Clean end of bucket, or a prefix torn by a crash mid-write.
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        }
        let len = u64::from_le_bytes(len) as usize;
        let mut record = vec![0u8; len];
        match self.reader.read_exact(&mut record) {
            Ok(()) => Some(Ok(record)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::warn!(
                    path = %self.path.display(),
                    "[staging]: torn trailing record dropped"
                );
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_roundtrip_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = Staging::create(dir.path(), 4).unwrap();
        assert_eq!(staging.bucket_bits, 2);

        // Hashes picked so both land in bucket 0 (high bits zero).
        staging.append(0x0000_0001, b"first").unwrap();
        staging.append(0x0000_0002, b"second").unwrap();
        // And one in the last bucket.
        staging.append(0xffff_ffff, b"elsewhere").unwrap();

        let buckets = staging.into_buckets().unwrap();
        assert_eq!(buckets.len(), 4);

        let records: Vec<_> = buckets[0].records().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![b"first".to_vec(), b"second".to_vec()]);

        let records: Vec<_> = buckets[3].records().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![b"elsewhere".to_vec()]);

        assert!(buckets[1].records().unwrap().next().is_none());

        for bucket in buckets {
            let path = bucket.path().to_path_buf();
            bucket.delete().unwrap();
            assert!(!path.exists());
        }
    }

    #[test_log::test]
    fn test_torn_trailing_record_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = Staging::create(dir.path(), 1).unwrap();
        staging.append(0, b"whole").unwrap();
        let buckets = staging.into_buckets().unwrap();

        // Append a length prefix promising more bytes than exist.
        let mut file = OpenOptions::new()
            .append(true)
            .open(buckets[0].path())
            .unwrap();
        file.write_all(&100u64.to_le_bytes()).unwrap();
        file.write_all(b"torn").unwrap();
        drop(file);

        let records: Vec<_> = buckets[0].records().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![b"whole".to_vec()]);
    }

    #[test]
    fn test_bucket_names_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::create(dir.path(), 2).unwrap();
        assert!(staging.dir().join("stage-0000.bin").exists());
        assert!(staging.dir().join("stage-0001.bin").exists());
    }
}
