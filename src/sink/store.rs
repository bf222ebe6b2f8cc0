use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

// --- Interfaces ---

/// The key-value store compiled artifacts end up in.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<()>;
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn del(&self, keys: &[String]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;
}

// --- In-Memory Implementation ---

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Bytes(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
    Set(BTreeSet<String>),
}

/// One applied write, in the order the store saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub key: String,
    pub field: Option<String>,
}

/// DashMap-backed store used for dry runs and tests. Keeps a log of every
/// write so ordering can be inspected afterwards.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    log: Mutex<Vec<WriteRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Fields of a hash key, sorted.
    pub fn hash_fields(&self, key: &str) -> Vec<String> {
        match self.entries.get(key).as_deref() {
            Some(Entry::Hash(map)) => {
                let mut fields: Vec<String> = map.keys().cloned().collect();
                fields.sort();
                fields
            }
            _ => Vec::new(),
        }
    }

    /// Size in bytes of a key's payload, summed over hash fields.
    pub fn size_of(&self, key: &str) -> usize {
        match self.entries.get(key).as_deref() {
            Some(Entry::Bytes(b)) => b.len(),
            Some(Entry::Hash(map)) => map.values().map(|v| v.len()).sum(),
            Some(Entry::Set(set)) => set.iter().map(|m| m.len()).sum(),
            None => 0,
        }
    }

    fn record(&self, key: &str, field: Option<&str>) {
        if let Ok(mut log) = self.log.lock() {
            log.push(WriteRecord { key: key.to_string(), field: field.map(str::to_string) });
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), Entry::Bytes(value.to_vec()));
        self.record(key, None);
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        {
            let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry::Hash(HashMap::new()));
            match entry.value_mut() {
                Entry::Hash(map) => {
                    map.insert(field.to_string(), value.to_vec());
                }
                _ => return Err(anyhow!("WRONGTYPE: {} is not a hash", key)),
            }
        }
        self.record(key, Some(field));
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        {
            let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry::Set(BTreeSet::new()));
            match entry.value_mut() {
                Entry::Set(set) => {
                    set.insert(member.to_string());
                }
                _ => return Err(anyhow!("WRONGTYPE: {} is not a set", key)),
            }
        }
        self.record(key, Some(member));
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        match self.entries.get(key).as_deref() {
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(anyhow!("WRONGTYPE: {} is not a set", key)),
            None => Ok(Vec::new()),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(key).as_deref() {
            Some(Entry::Bytes(b)) => Ok(Some(b.clone())),
            Some(_) => Err(anyhow!("WRONGTYPE: {} is not a string", key)),
            None => Ok(None),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(key).as_deref() {
            Some(Entry::Hash(map)) => Ok(map.get(field).cloned()),
            Some(_) => Err(anyhow!("WRONGTYPE: {} is not a hash", key)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_types() {
        let store = MemoryStore::new();
        store.set("a", b"1").await.unwrap();
        store.hset("h", "f", b"2").await.unwrap();
        store.sadd("s", "m").await.unwrap();
        store.sadd("s", "m").await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.hget("h", "f").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.smembers("s").await.unwrap(), vec!["m".to_string()]);
        assert!(store.hset("a", "f", b"x").await.is_err());

        store.del(&["a".to_string(), "s".to_string()]).await.unwrap();
        assert_eq!(store.keys(), vec!["h".to_string()]);
        assert_eq!(store.write_log().len(), 4);
    }
}
