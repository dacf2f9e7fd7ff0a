use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;

const HASH_MULTIPLIER: u64 = 37;
const SEED: u64 = 17;

/// Value-equality identifier for a query invocation.
///
/// Built by absorbing components in order: statement id, offset, limit,
/// final SQL, each IN-mode parameter value, environment id. Equality is
/// component-wise; the running hash is order-sensitive. Arrays absorb
/// element-wise, and null is absorbed as an explicit marker distinct from
/// not absorbing at all.
#[derive(Debug, Clone)]
pub struct CacheKey {
    hash: u64,
    checksum: u64,
    count: usize,
    parts: Vec<Value>,
}

impl CacheKey {
    pub fn new() -> Self {
        Self {
            hash: SEED,
            checksum: 0,
            count: 0,
            parts: Vec::new(),
        }
    }

    /// Absorbs one component. Arrays are absorbed element-wise,
    /// recursively.
    pub fn update(&mut self, part: Value) {
        if let Value::Array(items) = part {
            for item in items {
                self.update(item);
            }
            return;
        }
        self.absorb(part);
    }

    pub fn update_str(&mut self, part: impl Into<String>) {
        self.update(Value::String(part.into()));
    }

    pub fn update_usize(&mut self, part: usize) {
        self.update(Value::from(part as u64));
    }

    fn absorb(&mut self, part: Value) {
        let base = value_hash(&part);
        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        let scaled = base.wrapping_mul(self.count as u64);
        self.hash = self
            .hash
            .wrapping_mul(HASH_MULTIPLIER)
            .wrapping_add(scaled);
        self.parts.push(part);
    }

    pub fn part_count(&self) -> usize {
        self.count
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.checksum == other.checksum
            && self.count == other.count
            && self.parts == other.parts
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Order-insensitive hash of a single value; numbers hash by their f64
/// bits so integral floats and integers collide as they compare equal.
fn value_hash(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_value_into(value, &mut hasher);
    hasher.finish()
}

fn hash_value_into(value: &Value, hasher: &mut DefaultHasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            match n.as_f64() {
                Some(f) => f.to_bits().hash(hasher),
                None => n.to_string().hash(hasher),
            }
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(items) => {
            4u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_value_into(item, hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            map.len().hash(hasher);
            for (k, v) in map {
                k.hash(hasher);
                hash_value_into(v, hasher);
            }
        }
    }
}
