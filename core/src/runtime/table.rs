//! Insertion-ordered hash tables built on an open-addressed chained scatter
//! with Brent's variation: a chain starting at a bucket only ever holds keys
//! whose home is that bucket, because inserts evict mid-chain squatters to a
//! free bucket instead of growing foreign chains. Entry storage and bucket
//! metadata are both copy-on-write shared.

use crate::consts::TABLE_MAX_BUCKETS;
use crate::error::RuntimeError;
use crate::runtime::hashing;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::text::Text;
use crate::runtime::types::{
    generic_as_text, generic_compare, generic_equal, generic_hash, Metamethods,
    TypeDescriptor, TypeTag, Value,
};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as Atomic};
use std::sync::Arc;

const END_OF_CHAIN: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, Default)]
struct Bucket {
    occupied: bool,
    index: u32,
    next: u32,
}

#[derive(Clone, Debug)]
struct BucketInfo {
    count: u32,
    last_free: u32,
    buckets: Vec<Bucket>,
}

/// An insertion-ordered hash map. Cloning shares entry and bucket storage;
/// mutation copies shared storage first.
#[derive(Debug)]
pub struct Table {
    entries: Arc<Vec<(Value, Value)>>,
    bucket_info: Option<Arc<BucketInfo>>,
    /// Cached hash; 0 means "not yet computed"
    hash: AtomicU64,
    fallback: Option<Arc<Table>>,
    none: bool,
}

impl Clone for Table {
    fn clone(&self) -> Self {
        Table {
            entries: self.entries.clone(),
            bucket_info: self.bucket_info.clone(),
            hash: AtomicU64::new(self.hash.load(Atomic::Relaxed)),
            fallback: self.fallback.clone(),
            none: self.none,
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

fn key_ty(ty: &TypeDescriptor) -> &Arc<TypeDescriptor> {
    match &ty.tag {
        TypeTag::Table { key, .. } => key,
        _ => panic!("table metamethod on non-table descriptor"),
    }
}

fn value_ty(ty: &TypeDescriptor) -> &Arc<TypeDescriptor> {
    match &ty.tag {
        TypeTag::Table { value, .. } => value,
        _ => panic!("table metamethod on non-table descriptor"),
    }
}

impl Table {
    pub fn new() -> Table {
        Table {
            entries: Arc::new(Vec::new()),
            bucket_info: None,
            hash: AtomicU64::new(0),
            fallback: None,
            none: false,
        }
    }

    /// The none table (the sentinel for an optional table).
    pub fn none() -> Table {
        Table { none: true, ..Table::new() }
    }

    pub fn is_none(&self) -> bool {
        self.none
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fallback(&self) -> Option<&Table> {
        self.fallback.as_deref()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// The nth entry (1-based) in insertion order.
    pub fn entry(&self, n: i64) -> Option<(&Value, &Value)> {
        if n < 1 || n > self.len() as i64 {
            return None;
        }
        let (k, v) = &self.entries[(n - 1) as usize];
        Some((k, v))
    }

    fn home_bucket(&self, key: &Value, ty: &TypeDescriptor) -> usize {
        let info = self.bucket_info.as_ref().expect("buckets allocated");
        (generic_hash(key, key_ty(ty)) % info.count as u64) as usize
    }

    /// Find the entry index for a key, without consulting fallbacks.
    fn lookup(&self, key: &Value, ty: &TypeDescriptor) -> Option<usize> {
        let info = self.bucket_info.as_ref()?;
        if self.entries.is_empty() {
            return None;
        }
        let mut i = self.home_bucket(key, ty);
        while info.buckets[i].occupied {
            let entry_index = info.buckets[i].index as usize;
            if generic_equal(&self.entries[entry_index].0, key, key_ty(ty)) {
                return Some(entry_index);
            }
            if info.buckets[i].next == END_OF_CHAIN {
                break;
            }
            i = info.buckets[i].next as usize;
        }
        None
    }

    /// Get a value without consulting the fallback chain.
    pub fn get_raw(&self, key: &Value, ty: &TypeDescriptor) -> Option<&Value> {
        self.lookup(key, ty).map(|i| &self.entries[i].1)
    }

    /// Get a value, consulting each chained fallback on a miss.
    pub fn get(&self, key: &Value, ty: &TypeDescriptor) -> Option<&Value> {
        let mut table = self;
        loop {
            if let Some(value) = table.get_raw(key, ty) {
                return Some(value);
            }
            table = table.fallback.as_deref()?;
        }
    }

    /// Wire a bucket for the entry at `entry_index`. On a collision with a
    /// mid-chain squatter the squatter is evicted to a free bucket; on a
    /// collision with a chain head the new entry is spliced in at chain
    /// position two (Brent's variation).
    fn set_bucket(&mut self, entry_index: usize, ty: &TypeDescriptor) {
        let home = self.home_bucket(&self.entries[entry_index].0, ty);
        let collided_home = {
            let info = self.bucket_info.as_ref().expect("buckets allocated");
            if !info.buckets[home].occupied {
                None
            } else {
                let occupant_key =
                    &self.entries[info.buckets[home].index as usize].0;
                Some(
                    (generic_hash(occupant_key, key_ty(ty))
                        % info.count as u64) as usize,
                )
            }
        };

        let info = Arc::make_mut(
            self.bucket_info.as_mut().expect("buckets allocated"),
        );
        match collided_home {
            None => {
                info.buckets[home] = Bucket {
                    occupied: true,
                    index: entry_index as u32,
                    next: END_OF_CHAIN,
                };
            }
            Some(collided) => {
                while info.buckets[info.last_free as usize].occupied {
                    debug_assert!(info.last_free > 0);
                    info.last_free -= 1;
                }
                let free = info.last_free as usize;
                if collided != home {
                    // The occupant is a squatter from some other chain:
                    // evict it to the free bucket and rewire its predecessor
                    let mut predecessor = collided;
                    while info.buckets[predecessor].next as usize != home {
                        predecessor = info.buckets[predecessor].next as usize;
                    }
                    info.buckets[predecessor].next = free as u32;
                    info.buckets[free] = info.buckets[home];
                    info.buckets[home] = Bucket {
                        occupied: true,
                        index: entry_index as u32,
                        next: END_OF_CHAIN,
                    };
                } else {
                    // The occupant is this chain's head: put the new entry
                    // in chain position two
                    info.buckets[free] = Bucket {
                        occupied: true,
                        index: entry_index as u32,
                        next: info.buckets[home].next,
                    };
                    info.buckets[home].next = free as u32;
                }
            }
        }
    }

    fn resize_buckets(
        &mut self,
        new_capacity: u32,
        ty: &TypeDescriptor,
    ) -> Result<(), RuntimeError> {
        if new_capacity > TABLE_MAX_BUCKETS {
            return Err(RuntimeError::ResourceExhausted {
                reason: "table has exceeded the maximum bucket count (2^31) and cannot grow further",
            });
        }
        log::debug!(
            "resizing table buckets from {} to {new_capacity}",
            self.bucket_info.as_ref().map(|b| b.count).unwrap_or(0)
        );
        self.bucket_info = Some(Arc::new(BucketInfo {
            count: new_capacity,
            last_free: new_capacity - 1,
            buckets: vec![Bucket::default(); new_capacity as usize],
        }));
        for i in 0..self.entries.len() {
            self.set_bucket(i, ty);
        }
        Ok(())
    }

    /// Get-or-insert: ensures a slot exists for the key and returns a
    /// mutable reference to its value. An absent key with no given value
    /// seeds the slot from the fallback chain (or null).
    pub fn reserve(
        &mut self,
        key: Value,
        value: Option<Value>,
        ty: &TypeDescriptor,
    ) -> Result<&mut Value, RuntimeError> {
        self.hash.store(0, Atomic::Relaxed);

        if self.bucket_info.as_ref().map(|b| b.count).unwrap_or(0) == 0 {
            self.resize_buckets(8, ty)?;
        } else if let Some(entry_index) = self.lookup(&key, ty) {
            // Overwrite in place (after any copy-on-write)
            let entries = Arc::make_mut(&mut self.entries);
            if let Some(value) = value {
                entries[entry_index].1 = value;
            }
            return Ok(&mut entries[entry_index].1);
        }

        // New entry: grow buckets by half when full
        let count = self.bucket_info.as_ref().expect("buckets allocated").count;
        if self.entries.len() as u32 >= count {
            let grown = (3 * count / 2).max(8).min(TABLE_MAX_BUCKETS);
            if self.entries.len() as u32 >= grown {
                return Err(RuntimeError::ResourceExhausted {
                    reason: "table has exceeded the maximum bucket count (2^31) and cannot grow further",
                });
            }
            self.resize_buckets(grown, ty)?;
        }

        let value = match value {
            Some(value) => value,
            None => {
                let mut fallback = self.fallback.as_deref();
                let mut inherited = None;
                while let Some(table) = fallback {
                    if let Some(found) = table.get_raw(&key, ty) {
                        inherited = Some(found.clone());
                        break;
                    }
                    fallback = table.fallback.as_deref();
                }
                inherited.unwrap_or(Value::Null)
            }
        };

        let entries = Arc::make_mut(&mut self.entries);
        entries.push((key, value));
        let entry_index = entries.len() - 1;
        self.set_bucket(entry_index, ty);
        let entries = Arc::make_mut(&mut self.entries);
        Ok(&mut entries[entry_index].1)
    }

    pub fn set(
        &mut self,
        key: Value,
        value: Value,
        ty: &TypeDescriptor,
    ) -> Result<(), RuntimeError> {
        self.reserve(key, Some(value), ty).map(|_| ())
    }

    /// Remove a key (a no-op when absent). The last entry is swapped into
    /// the removed slot, so removal is O(1) but disturbs insertion order for
    /// that one entry.
    pub fn remove(&mut self, key: &Value, ty: &TypeDescriptor) {
        if self.entries.is_empty() || self.bucket_info.is_none() {
            return;
        }

        // Walk the chain to the key's bucket, remembering the predecessor
        let mut prev: Option<usize> = None;
        let mut bucket_pos = self.home_bucket(key, ty);
        {
            let info = self.bucket_info.as_ref().expect("buckets allocated");
            loop {
                if !info.buckets[bucket_pos].occupied {
                    return;
                }
                let entry_index = info.buckets[bucket_pos].index as usize;
                if generic_equal(&self.entries[entry_index].0, key, key_ty(ty)) {
                    break;
                }
                if info.buckets[bucket_pos].next == END_OF_CHAIN {
                    return;
                }
                prev = Some(bucket_pos);
                bucket_pos = info.buckets[bucket_pos].next as usize;
            }
        }

        self.hash.store(0, Atomic::Relaxed);

        let removed_index =
            self.bucket_info.as_ref().expect("buckets allocated").buckets
                [bucket_pos]
                .index as usize;
        let last_entry = self.entries.len() - 1;

        if removed_index != last_entry {
            // Find the bucket pointing at the last entry and repoint it at
            // the slot the removed entry is vacating
            let mut i = self.home_bucket(&self.entries[last_entry].0, ty);
            {
                let info = self.bucket_info.as_ref().expect("buckets allocated");
                while info.buckets[i].index as usize != last_entry {
                    i = info.buckets[i].next as usize;
                }
            }
            let info = Arc::make_mut(
                self.bucket_info.as_mut().expect("buckets allocated"),
            );
            info.buckets[i].index = removed_index as u32;
            let entries = Arc::make_mut(&mut self.entries);
            entries.swap(removed_index, last_entry);
        }

        let entries = Arc::make_mut(&mut self.entries);
        entries.pop();

        let info = Arc::make_mut(
            self.bucket_info.as_mut().expect("buckets allocated"),
        );
        let bucket_to_clear = if let Some(prev) = prev {
            // Middle (or end) of a chain
            info.buckets[prev].next = info.buckets[bucket_pos].next;
            bucket_pos
        } else if info.buckets[bucket_pos].next != END_OF_CHAIN {
            // Start of a chain: promote the second link into the head
            let second = info.buckets[bucket_pos].next as usize;
            info.buckets[bucket_pos] = info.buckets[second];
            second
        } else {
            bucket_pos
        };
        info.buckets[bucket_to_clear] = Bucket::default();
        if bucket_to_clear as u32 > info.last_free {
            info.last_free = bucket_to_clear as u32;
        }
    }

    pub fn clear(&mut self) {
        *self = Table::new();
    }

    /// A copy of this table with the given fallback (or none).
    pub fn with_fallback(&self, fallback: Option<Table>) -> Table {
        let mut copy = self.clone();
        copy.hash.store(0, Atomic::Relaxed);
        copy.fallback = fallback.filter(|f| !f.is_empty()).map(Arc::new);
        copy
    }

    /// Build a table from ordered entries (later duplicates overwrite).
    pub fn from_entries(
        entries: Vec<(Value, Value)>,
        ty: &TypeDescriptor,
    ) -> Result<Table, RuntimeError> {
        let mut table = Table::new();
        for (key, value) in entries {
            table.set(key, value, ty)?;
        }
        Ok(table)
    }

    /// A new table with the same entries, ordered by key.
    pub fn sorted(&self, ty: &TypeDescriptor) -> Result<Table, RuntimeError> {
        let mut entries = self.entries.as_ref().clone();
        entries.sort_by(|(a, _), (b, _)| generic_compare(a, b, key_ty(ty)));
        Table::from_entries(entries, ty)
    }

    // ===== Set algebra (fallback chains included; inputs untouched) =====

    fn chain(&self) -> impl Iterator<Item = &Table> {
        std::iter::successors(Some(self), |t| t.fallback.as_deref())
    }

    /// Intersection: entries present in both sides with equal values.
    pub fn overlap(&self, other: &Table, ty: &TypeDescriptor) -> Result<Table, RuntimeError> {
        let mut result = Table::new();
        for table in self.chain() {
            for (key, value) in table.iter() {
                if let Some(other_value) = other.get(key, ty) {
                    if generic_equal(value, other_value, value_ty(ty)) {
                        result.set(key.clone(), value.clone(), ty)?;
                    }
                }
            }
        }
        Ok(result)
    }

    /// Union: entries of both sides, with `other` winning on key clashes.
    pub fn with(&self, other: &Table, ty: &TypeDescriptor) -> Result<Table, RuntimeError> {
        let mut result = Table::new();
        for table in self.chain() {
            for (key, value) in table.iter() {
                result.set(key.clone(), value.clone(), ty)?;
            }
        }
        for table in other.chain() {
            for (key, value) in table.iter() {
                result.set(key.clone(), value.clone(), ty)?;
            }
        }
        Ok(result)
    }

    /// Symmetric difference: keys present in exactly one side.
    pub fn xor(&self, other: &Table, ty: &TypeDescriptor) -> Result<Table, RuntimeError> {
        let mut result = Table::new();
        for table in self.chain() {
            for (key, value) in table.iter() {
                if other.get(key, ty).is_none() {
                    result.set(key.clone(), value.clone(), ty)?;
                }
            }
        }
        for table in other.chain() {
            for (key, value) in table.iter() {
                if self.get(key, ty).is_none() {
                    result.set(key.clone(), value.clone(), ty)?;
                }
            }
        }
        Ok(result)
    }

    /// Difference: entries of `self` whose key is absent from `other` (or
    /// mapped to a different value there).
    pub fn without(&self, other: &Table, ty: &TypeDescriptor) -> Result<Table, RuntimeError> {
        let mut result = Table::new();
        for table in self.chain() {
            for (key, value) in table.iter() {
                let keep = match other.get(key, ty) {
                    None => true,
                    Some(other_value) => {
                        !generic_equal(value, other_value, value_ty(ty))
                    }
                };
                if keep {
                    result.set(key.clone(), value.clone(), ty)?;
                }
            }
        }
        Ok(result)
    }

    pub fn is_subset_of(&self, other: &Table, strict: bool, ty: &TypeDescriptor) -> bool {
        if self.len() > other.len() || (strict && self.len() == other.len()) {
            return false;
        }
        self.iter().all(|(key, _)| other.get_raw(key, ty).is_some())
    }

    pub fn is_superset_of(&self, other: &Table, strict: bool, ty: &TypeDescriptor) -> bool {
        other.is_subset_of(self, strict, ty)
    }

    /// Cached table hash: `siphash(length, xor of key hashes, xor of value
    /// hashes, fallback hash)`. A computed hash of 0 is remapped so that 0
    /// can mean "uncached".
    pub fn hash_value(&self, ty: &TypeDescriptor) -> u64 {
        let cached = self.hash.load(Atomic::Relaxed);
        if cached != 0 {
            return cached;
        }
        let mut keys_hash = 0u64;
        let mut values_hash = 0u64;
        for (key, value) in self.iter() {
            keys_hash ^= generic_hash(key, key_ty(ty));
            values_hash ^= generic_hash(value, value_ty(ty));
        }
        let fallback_hash = self
            .fallback
            .as_deref()
            .map(|f| f.hash_value(ty))
            .unwrap_or(0);
        let mut hash = hashing::siphash_words(&[
            self.len() as u64,
            keys_hash,
            values_hash,
            fallback_hash,
        ]);
        if hash == 0 {
            hash = 1234567;
        }
        self.hash.store(hash, Atomic::Relaxed);
        hash
    }
}

// ===== Metamethods =====

fn as_table(v: &Value) -> &Table {
    match v {
        Value::Table(t) => t,
        other => panic!("expected Table, got {other:?}"),
    }
}

fn table_equal(x: &Value, y: &Value, ty: &TypeDescriptor) -> bool {
    let (a, b) = (as_table(x), as_table(y));
    let (ha, hb) = (a.hash.load(Atomic::Relaxed), b.hash.load(Atomic::Relaxed));
    if ha != 0 && hb != 0 && ha != hb {
        return false;
    }
    if a.len() != b.len() {
        return false;
    }
    if a.fallback.is_some() != b.fallback.is_some() {
        return false;
    }
    for (key, value) in a.iter() {
        match b.get_raw(key, ty) {
            Some(other_value)
                if generic_equal(value, other_value, value_ty(ty)) => {}
            _ => return false,
        }
    }
    if let (Some(fa), Some(fb)) = (&a.fallback, &b.fallback) {
        if !table_equal(
            &Value::Table(fa.as_ref().clone()),
            &Value::Table(fb.as_ref().clone()),
            ty,
        ) {
            return false;
        }
    }
    true
}

// Tables compare as if comparing sorted key lists, then value lists for the
// sorted keys. Done in linear time by tracking the smallest mismatched key
// and the largest key on each side.
fn table_compare(x: &Value, y: &Value, ty: &TypeDescriptor) -> Ordering {
    let (a, b) = (as_table(x), as_table(y));
    let key = key_ty(ty);
    let value = value_ty(ty);

    // Empty tables sort before non-empty tables
    if a.is_empty() || b.is_empty() {
        return a.len().cmp(&b.len());
    }

    let mut mismatched_key: Option<&Value> = None;
    let mut max_a_key: Option<&Value> = None;
    for (k, v) in a.iter() {
        if max_a_key
            .map(|m| generic_compare(k, m, key) == Ordering::Greater)
            .unwrap_or(true)
        {
            max_a_key = Some(k);
        }
        let matches = a
            .get_raw(k, ty)
            .and_then(|_| b.get_raw(k, ty))
            .map(|bv| generic_equal(v, bv, value))
            .unwrap_or(false);
        if !matches
            && mismatched_key
                .map(|m| generic_compare(k, m, key) == Ordering::Less)
                .unwrap_or(true)
        {
            mismatched_key = Some(k);
        }
    }

    let mut max_b_key: Option<&Value> = None;
    for (k, v) in b.iter() {
        if max_b_key
            .map(|m| generic_compare(k, m, key) == Ordering::Greater)
            .unwrap_or(true)
        {
            max_b_key = Some(k);
        }
        let matches = a
            .get_raw(k, ty)
            .map(|av| generic_equal(av, v, value))
            .unwrap_or(false);
        if !matches
            && mismatched_key
                .map(|m| generic_compare(k, m, key) == Ordering::Less)
                .unwrap_or(true)
        {
            mismatched_key = Some(k);
        }
    }

    if let Some(mismatched) = mismatched_key {
        let a_value = a.get_raw(mismatched, ty);
        let b_value = b.get_raw(mismatched, ty);
        return match (a_value, b_value) {
            (Some(av), Some(bv)) => generic_compare(av, bv, value),
            (None, Some(_)) => {
                // The smallest mismatched key is only in b: a is bigger iff
                // its largest key exceeds the mismatch
                match max_a_key {
                    Some(max) => generic_compare(max, mismatched, key),
                    None => Ordering::Less,
                }
            }
            (Some(_), None) => match max_b_key {
                Some(max) => generic_compare(max, mismatched, key).reverse(),
                None => Ordering::Greater,
            },
            (None, None) => Ordering::Equal,
        };
    }

    match (&a.fallback, &b.fallback) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(fa), Some(fb)) => table_compare(
            &Value::Table(fa.as_ref().clone()),
            &Value::Table(fb.as_ref().clone()),
            ty,
        ),
    }
}

fn table_hash(v: &Value, ty: &TypeDescriptor) -> u64 {
    as_table(v).hash_value(ty)
}

fn table_as_text(obj: Option<&Value>, colorize: bool, ty: &TypeDescriptor) -> Text {
    let key = key_ty(ty);
    let value = value_ty(ty);
    match obj {
        None => Text::from_str("{")
            .concat(&generic_as_text(None, false, key))
            .concat(&Text::from_str(":"))
            .concat(&generic_as_text(None, false, value))
            .concat(&Text::from_str("}")),
        Some(v) => {
            let table = as_table(v);
            let mut out = Text::from_str("{");
            for (i, (k, val)) in table.iter().enumerate() {
                if i > 0 {
                    out = out.concat(&Text::from_str(", "));
                }
                out = out.concat(&generic_as_text(Some(k), colorize, key));
                out = out.concat(&Text::from_str(": "));
                out = out.concat(&generic_as_text(Some(val), colorize, value));
            }
            if let Some(fallback) = &table.fallback {
                out = out.concat(&Text::from_str("; fallback="));
                out = out.concat(&table_as_text(
                    Some(&Value::Table(fallback.as_ref().clone())),
                    colorize,
                    ty,
                ));
            }
            out.concat(&Text::from_str("}"))
        }
    }
}

fn table_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    let table = as_table(obj);
    serialize::write_varint(out, table.len() as i64);
    for (key, value) in table.iter() {
        serialize::serialize_value(key, out, key_ty(ty))?;
        serialize::serialize_value(value, out, value_ty(ty))?;
    }
    match &table.fallback {
        None => out.push(0),
        Some(fallback) => {
            out.push(1);
            table_serialize(&Value::Table(fallback.as_ref().clone()), out, ty)?;
        }
    }
    Ok(())
}

fn table_deserialize(
    input: &mut ByteReader<'_>,
    ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let len = input.read_varint()?;
    if len < 0 {
        return Err(RuntimeError::InvalidData { reason: "negative table length" });
    }
    let mut table = Table::new();
    for _ in 0..len {
        let key = serialize::deserialize_value(input, key_ty(ty))?;
        let value = serialize::deserialize_value(input, value_ty(ty))?;
        table.set(key, value, ty)?;
    }
    if input.read_u8()? != 0 {
        let fallback = table_deserialize(input, ty)?;
        table = table.with_fallback(Some(as_table(&fallback).clone()));
    }
    Ok(Value::Table(table))
}

/// Descriptor for a table of `key` to `value`.
pub fn table_of(
    key: Arc<TypeDescriptor>,
    value: Arc<TypeDescriptor>,
) -> Arc<TypeDescriptor> {
    Arc::new(TypeDescriptor {
        size: 40,
        align: 8,
        tag: TypeTag::Table { key, value },
        metamethods: Metamethods {
            hash: Some(table_hash),
            compare: Some(table_compare),
            equal: Some(table_equal),
            as_text: Some(table_as_text),
            is_none: Some(|v, _| as_table(v).is_none()),
            serialize: Some(table_serialize),
            deserialize: Some(table_deserialize),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::intx::INT64;
    use crate::runtime::text::{Text, TEXT};
    use pretty_assertions::assert_eq;

    fn int_table_ty() -> Arc<TypeDescriptor> {
        table_of(INT64.clone(), INT64.clone())
    }

    fn get_i64(table: &Table, key: i64, ty: &TypeDescriptor) -> Option<i64> {
        table.get(&Value::Int64(key), ty).map(|v| match v {
            Value::Int64(x) => *x,
            other => panic!("expected Int64, got {other:?}"),
        })
    }

    #[test]
    fn test_set_get_remove() {
        let ty = int_table_ty();
        let mut t = Table::new();
        for i in 0..8 {
            t.set(Value::Int64(i), Value::Int64(i * 10), &ty).unwrap();
        }
        assert_eq!(t.len(), 8);
        for i in 0..8 {
            assert_eq!(get_i64(&t, i, &ty), Some(i * 10));
        }
        assert_eq!(get_i64(&t, 99, &ty), None);

        t.remove(&Value::Int64(0), &ty);
        assert_eq!(t.len(), 7);
        assert_eq!(get_i64(&t, 0, &ty), None);
        for i in 1..8 {
            assert_eq!(get_i64(&t, i, &ty), Some(i * 10));
        }
        // Removing a missing key is a no-op
        t.remove(&Value::Int64(12345), &ty);
        assert_eq!(t.len(), 7);
    }

    #[test]
    fn test_overwrite_keeps_length() {
        let ty = int_table_ty();
        let mut t = Table::new();
        t.set(Value::Int64(1), Value::Int64(10), &ty).unwrap();
        t.set(Value::Int64(1), Value::Int64(20), &ty).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(get_i64(&t, 1, &ty), Some(20));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let ty = int_table_ty();
        let mut t = Table::new();
        for i in [5i64, 3, 9, 1] {
            t.set(Value::Int64(i), Value::Int64(-i), &ty).unwrap();
        }
        let keys: Vec<i64> = t
            .iter()
            .map(|(k, _)| match k {
                Value::Int64(x) => *x,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec![5, 3, 9, 1]);
        assert!(matches!(t.entry(4), Some((Value::Int64(1), _))));
        assert!(t.entry(5).is_none());
        assert!(t.entry(0).is_none());
    }

    #[test]
    fn test_many_inserts_with_collisions() {
        // Push through several resizes so chains, evictions, and rehashing
        // all get exercised
        let ty = int_table_ty();
        let mut t = Table::new();
        for i in 0..1000 {
            t.set(Value::Int64(i), Value::Int64(i * 3), &ty).unwrap();
        }
        assert_eq!(t.len(), 1000);
        for i in 0..1000 {
            assert_eq!(get_i64(&t, i, &ty), Some(i * 3));
        }
        for i in (0..1000).step_by(3) {
            t.remove(&Value::Int64(i), &ty);
        }
        for i in 0..1000 {
            let expected = if i % 3 == 0 { None } else { Some(i * 3) };
            assert_eq!(get_i64(&t, i, &ty), expected, "key {i}");
        }
    }

    #[test]
    fn test_cow_shared_tables() {
        let ty = int_table_ty();
        let mut a = Table::new();
        a.set(Value::Int64(1), Value::Int64(1), &ty).unwrap();
        let b = a.clone();
        a.set(Value::Int64(2), Value::Int64(2), &ty).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1, "the aliased copy is untouched");
        assert_eq!(get_i64(&b, 2, &ty), None);
    }

    #[test]
    fn test_fallback_on_miss_only() {
        let ty = int_table_ty();
        let mut base = Table::new();
        base.set(Value::Int64(1), Value::Int64(100), &ty).unwrap();
        base.set(Value::Int64(2), Value::Int64(200), &ty).unwrap();

        let mut t = Table::new();
        t.set(Value::Int64(1), Value::Int64(-1), &ty).unwrap();
        let t = t.with_fallback(Some(base));

        assert_eq!(get_i64(&t, 1, &ty), Some(-1), "own entry wins");
        assert_eq!(get_i64(&t, 2, &ty), Some(200), "fallback consulted on miss");
        assert_eq!(t.get_raw(&Value::Int64(2), &ty), None, "raw skips fallback");
    }

    #[test]
    fn test_hash_cache_invalidation() {
        let ty = int_table_ty();
        let mut t = Table::new();
        t.set(Value::Int64(1), Value::Int64(1), &ty).unwrap();
        let h1 = t.hash_value(&ty);
        assert_ne!(h1, 0);
        assert_eq!(t.hash_value(&ty), h1);
        t.set(Value::Int64(2), Value::Int64(2), &ty).unwrap();
        let h2 = t.hash_value(&ty);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_equal_and_hash_agree() {
        let ty = int_table_ty();
        let mut a = Table::new();
        let mut b = Table::new();
        // Same contents, different insertion order
        for i in [1i64, 2, 3] {
            a.set(Value::Int64(i), Value::Int64(i), &ty).unwrap();
        }
        for i in [3i64, 1, 2] {
            b.set(Value::Int64(i), Value::Int64(i), &ty).unwrap();
        }
        let (va, vb) = (Value::Table(a), Value::Table(b));
        assert!(generic_equal(&va, &vb, &ty));
        assert_eq!(generic_hash(&va, &ty), generic_hash(&vb, &ty));
    }

    #[test]
    fn test_compare_by_sorted_keys() {
        let ty = int_table_ty();
        let make = |keys: &[i64]| {
            let mut t = Table::new();
            for &k in keys {
                t.set(Value::Int64(k), Value::Int64(0), &ty).unwrap();
            }
            Value::Table(t)
        };
        // {10,20,30} > {10,20,25,30} because 30 > 25
        assert_eq!(
            generic_compare(&make(&[10, 20, 30]), &make(&[10, 20, 25, 30]), &ty),
            Ordering::Greater
        );
        // {10,20,30} < {10,20,30,999}
        assert_eq!(
            generic_compare(&make(&[10, 20, 30]), &make(&[10, 20, 30, 999]), &ty),
            Ordering::Less
        );
        assert_eq!(
            generic_compare(&make(&[1, 2]), &make(&[1, 2]), &ty),
            Ordering::Equal
        );
    }

    #[test]
    fn test_sorted_idempotent() {
        let ty = int_table_ty();
        let mut t = Table::new();
        for i in [5i64, 1, 4, 2, 3] {
            t.set(Value::Int64(i), Value::Int64(i), &ty).unwrap();
        }
        let once = t.sorted(&ty).unwrap();
        let keys: Vec<i64> = once
            .iter()
            .map(|(k, _)| match k {
                Value::Int64(x) => *x,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
        let twice = once.sorted(&ty).unwrap();
        assert!(generic_equal(
            &Value::Table(once),
            &Value::Table(twice),
            &ty
        ));
    }

    #[test]
    fn test_set_algebra() {
        let ty = int_table_ty();
        let make = |pairs: &[(i64, i64)]| {
            let mut t = Table::new();
            for &(k, v) in pairs {
                t.set(Value::Int64(k), Value::Int64(v), &ty).unwrap();
            }
            t
        };
        let a = make(&[(1, 1), (2, 2), (3, 3)]);
        let b = make(&[(2, 2), (3, 30), (4, 4)]);

        let overlap = a.overlap(&b, &ty).unwrap();
        assert_eq!(overlap.len(), 1, "only key 2 has a matching value");
        assert_eq!(get_i64(&overlap, 2, &ty), Some(2));

        let union = a.with(&b, &ty).unwrap();
        assert_eq!(union.len(), 4);
        assert_eq!(get_i64(&union, 3, &ty), Some(30), "b wins clashes");

        let xor = a.xor(&b, &ty).unwrap();
        assert_eq!(xor.len(), 2);
        assert!(xor.get(&Value::Int64(1), &ty).is_some());
        assert!(xor.get(&Value::Int64(4), &ty).is_some());

        let without = a.without(&b, &ty).unwrap();
        assert_eq!(without.len(), 2);
        assert_eq!(get_i64(&without, 1, &ty), Some(1));
        assert_eq!(get_i64(&without, 3, &ty), Some(3), "differing value kept");

        assert!(make(&[(1, 1)]).is_subset_of(&a, true, &ty));
        assert!(!a.is_subset_of(&a, true, &ty));
        assert!(a.is_subset_of(&a, false, &ty));
    }

    #[test]
    fn test_text_keys() {
        let ty = table_of(TEXT.clone(), INT64.clone());
        let mut t = Table::new();
        t.set(Value::Text(Text::from_str("one")), Value::Int64(1), &ty).unwrap();
        t.set(Value::Text(Text::from_str("two")), Value::Int64(2), &ty).unwrap();
        let probe = Value::Text(Text::from_str("on").concat(&Text::from_str("e")));
        assert!(matches!(t.get(&probe, &ty), Some(Value::Int64(1))));
    }

    #[test]
    fn test_as_text() {
        let ty = int_table_ty();
        let mut t = Table::new();
        t.set(Value::Int64(1), Value::Int64(10), &ty).unwrap();
        t.set(Value::Int64(2), Value::Int64(20), &ty).unwrap();
        assert_eq!(
            generic_as_text(Some(&Value::Table(t)), false, &ty).to_string(),
            "{1: 10, 2: 20}"
        );
    }

    #[test]
    fn test_reserve_inherits_from_fallback() {
        let ty = int_table_ty();
        let mut base = Table::new();
        base.set(Value::Int64(7), Value::Int64(77), &ty).unwrap();
        let mut t = Table::new().with_fallback(Some(base));
        let slot = t.reserve(Value::Int64(7), None, &ty).unwrap();
        assert!(matches!(slot, Value::Int64(77)));
    }

    #[test]
    fn test_none_table() {
        assert!(Table::none().is_none());
        assert!(!Table::new().is_none());
    }
}
