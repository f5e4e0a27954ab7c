//! Contiguous typed sequences with copy-on-write sharing. Slices, `by`
//! views, and reversals share the underlying buffer by reinterpreting the
//! stride (possibly negative); any mutation of an aliased or strided list
//! first compacts into a fresh buffer.

use crate::consts::LIST_MAX_STRIDE;
use crate::error::RuntimeError;
use crate::runtime::hashing;
use crate::runtime::int::Int;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::table::Table;
use crate::runtime::text::Text;
use crate::runtime::types::{
    generic_as_text, generic_compare, generic_equal, generic_hash, Metamethods,
    TypeDescriptor, TypeTag, Value,
};
use rand::rngs::OsRng;
use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;

/// A comparator over two values, returning their ordering.
pub type Comparator<'a> = &'a mut dyn FnMut(&Value, &Value) -> Ordering;

/// A user-supplied random integer source: `f(min, max)` returns a value in
/// `[min, max]`.
pub type RandomInt<'a> = &'a mut dyn FnMut(i64, i64) -> i64;

/// A user-supplied random fraction source returning values in `[0, 1)`.
pub type RandomNum<'a> = &'a mut dyn FnMut() -> f64;

/// A dynamically typed list. Cloning shares the buffer; the shared reference
/// count doubles as the copy-on-write hint.
#[derive(Clone, Debug)]
pub struct List {
    data: Arc<Vec<Value>>,
    /// Index of the first viewed element within `data`
    offset: usize,
    /// Element count; negative encodes the none list
    length: i64,
    /// Step between consecutive elements, in elements (negative = reversed)
    stride: i64,
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    pub fn new() -> List {
        List { data: Arc::new(Vec::new()), offset: 0, length: 0, stride: 1 }
    }

    /// The none list (the sentinel for an optional list).
    pub fn none() -> List {
        List { data: Arc::new(Vec::new()), offset: 0, length: -1, stride: 1 }
    }

    pub fn from_vec(items: Vec<Value>) -> List {
        let length = items.len() as i64;
        List { data: Arc::new(items), offset: 0, length, stride: 1 }
    }

    pub fn is_none(&self) -> bool {
        self.length < 0
    }

    pub fn len(&self) -> usize {
        self.length.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element stride in elements; negative for reversed views.
    pub fn stride(&self) -> i64 {
        self.stride
    }

    fn slot(&self, i: usize) -> usize {
        (self.offset as i64 + i as i64 * self.stride) as usize
    }

    fn item(&self, i: usize) -> &Value {
        &self.data[self.slot(i)]
    }

    /// 1-based access; negative indices count from the end.
    pub fn get(&self, index: i64) -> Option<&Value> {
        let len = self.len() as i64;
        let i = if index < 0 { len + index + 1 } else { index };
        if i < 1 || i > len {
            return None;
        }
        Some(self.item((i - 1) as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> + '_ {
        (0..self.len()).map(|i| self.item(i))
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().cloned().collect()
    }

    fn is_aliased(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// Make the buffer unshared and contiguous (stride 1). Aliased or
    /// strided lists copy their viewed elements into a fresh buffer; plain
    /// unique lists are untouched.
    fn ensure_plain(&mut self, extra_capacity: usize) {
        if !self.is_aliased() && self.stride == 1 {
            return;
        }
        let mut fresh = Vec::with_capacity(self.len() + extra_capacity);
        fresh.extend(self.iter().cloned());
        self.offset = 0;
        self.stride = 1;
        self.length = fresh.len() as i64;
        self.data = Arc::new(fresh);
    }

    fn plain_vec(&mut self) -> &mut Vec<Value> {
        Arc::get_mut(&mut self.data).expect("buffer is unshared after ensure_plain")
    }

    /// Grow slack for one more element: +50% of the length, at least 8.
    fn grow_slack(len: usize) -> usize {
        (len.max(8)) / 2 + 1
    }

    /// Insert at a 1-based index; non-positive indices count from one past
    /// the end (so 0 appends). Fails on indices beyond `len + 1`.
    pub fn insert(&mut self, item: Value, index: i64) -> Result<(), RuntimeError> {
        let len = self.len() as i64;
        let mut index = if index <= 0 { len + index + 1 } else { index };
        if index < 1 {
            index = 1;
        } else if index > len + 1 {
            return Err(RuntimeError::InvalidIndex { index, length: len });
        }

        self.ensure_plain(Self::grow_slack(self.len()));
        let offset = self.offset;
        let vec = self.plain_vec();
        if vec.capacity() == vec.len() {
            vec.reserve(Self::grow_slack(len as usize));
        }
        vec.insert(offset + (index - 1) as usize, item);
        self.length += 1;
        Ok(())
    }

    /// Insert every element of `other` starting at the given 1-based index.
    pub fn insert_all(&mut self, other: &List, index: i64) -> Result<(), RuntimeError> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() && !self.is_none() {
            *self = other.clone();
            return Ok(());
        }
        let len = self.len() as i64;
        let mut index = if index <= 0 { len + index + 1 } else { index };
        if index < 1 {
            index = 1;
        } else if index > len + 1 {
            return Err(RuntimeError::InvalidIndex { index, length: len });
        }
        let incoming = other.to_vec();
        self.ensure_plain(incoming.len());
        let at = self.offset + (index - 1) as usize;
        let vec = self.plain_vec();
        vec.splice(at..at, incoming);
        self.length = (vec.len() - self.offset) as i64;
        Ok(())
    }

    /// Remove `count` elements starting at a 1-based index. Out-of-range
    /// requests are clamped; removals at the head or tail of an unaliased
    /// plain list are O(1).
    pub fn remove_at(&mut self, index: i64, count: i64) {
        let len = self.len() as i64;
        let index = if index < 1 { len + index + 1 } else { index };
        if index < 1 || index > len || count < 1 {
            return;
        }
        let count = count.min(len - index + 1);

        if !self.is_aliased() && self.stride == 1 {
            if index == 1 {
                // Trim the head by bumping the offset
                self.offset += count as usize;
                self.length -= count;
                return;
            }
            if index + count > len {
                let keep = self.offset + (index - 1) as usize;
                self.plain_vec().truncate(keep);
                self.length -= count;
                return;
            }
            let start = self.offset + (index - 1) as usize;
            self.plain_vec().drain(start..start + count as usize);
            self.length -= count;
            return;
        }

        // Aliased or strided: copy out everything we keep
        let mut fresh = Vec::with_capacity((len - count) as usize);
        for i in 0..len {
            if i < index - 1 || i >= index - 1 + count {
                fresh.push(self.item(i as usize).clone());
            }
        }
        *self = List::from_vec(fresh);
    }

    /// Remove every element equal to `item` (up to `max_removals`; negative
    /// means unbounded).
    pub fn remove_item(&mut self, item: &Value, max_removals: i64, item_ty: &TypeDescriptor) {
        let mut removals = max_removals;
        let mut i = 1i64;
        while i <= self.len() as i64 {
            if removals == 0 {
                break;
            }
            if generic_equal(self.item((i - 1) as usize), item, item_ty) {
                self.remove_at(i, 1);
                removals -= 1;
            } else {
                i += 1;
            }
        }
    }

    /// A sub-list view: 1-based inclusive bounds, negatives from the end,
    /// saturating. Shares the buffer with the input.
    pub fn slice(&self, first: i64, last: i64) -> List {
        let len = self.len() as i64;
        let first = if first < 0 { len + first + 1 } else { first };
        let mut last = if last < 0 { len + last + 1 } else { last };
        if last > len {
            last = len;
        }
        if first < 1 || first > len || last == 0 || last < first {
            return List::new();
        }
        List {
            data: self.data.clone(),
            offset: self.slot((first - 1) as usize),
            length: last - first + 1,
            stride: self.stride,
        }
    }

    pub fn from(&self, first: i64) -> List {
        self.slice(first, -1)
    }

    pub fn to(&self, last: i64) -> List {
        self.slice(1, last)
    }

    /// Every `step`-th element, as a view when the combined stride fits the
    /// stride bound; otherwise a compacted copy. A zero step yields the
    /// empty list.
    pub fn by(&self, step: i64) -> List {
        if step == 0 {
            return List::new();
        }
        let len = self.len() as i64;
        let new_len = len / step.abs() + i64::from(len % step.abs() != 0);
        let combined = self.stride.checked_mul(step);
        match combined {
            Some(stride) if stride.abs() <= LIST_MAX_STRIDE => {
                if new_len == 0 {
                    return List::new();
                }
                List {
                    data: self.data.clone(),
                    offset: if step < 0 {
                        self.slot((len - 1) as usize)
                    } else {
                        self.offset
                    },
                    length: new_len,
                    stride,
                }
            }
            // Stride overflow: fall back to a compacted copy
            _ => {
                let mut items = Vec::with_capacity(new_len.max(0) as usize);
                let mut i = if step < 0 { len - 1 } else { 0 };
                while i >= 0 && i < len {
                    items.push(self.item(i as usize).clone());
                    i += step;
                }
                List::from_vec(items)
            }
        }
    }

    /// A reversed view (negated stride); falls back to a copy when negation
    /// would overflow the stride bound.
    pub fn reversed(&self) -> List {
        if self.stride.abs() > LIST_MAX_STRIDE || self.is_empty() {
            return self.by(-1);
        }
        List {
            data: self.data.clone(),
            offset: self.slot(self.len() - 1),
            length: self.length,
            stride: -self.stride,
        }
    }

    pub fn concat(&self, other: &List) -> List {
        let mut items = Vec::with_capacity(self.len() + other.len());
        items.extend(self.iter().cloned());
        items.extend(other.iter().cloned());
        List::from_vec(items)
    }

    pub fn clear(&mut self) {
        *self = List::new();
    }

    // ===== Searching =====

    pub fn find(&self, item: &Value, item_ty: &TypeDescriptor) -> Option<i64> {
        (0..self.len())
            .find(|&i| generic_equal(self.item(i), item, item_ty))
            .map(|i| i as i64 + 1)
    }

    pub fn has(&self, item: &Value, item_ty: &TypeDescriptor) -> bool {
        self.find(item, item_ty).is_some()
    }

    /// First index satisfying the predicate.
    pub fn first(&self, mut predicate: impl FnMut(&Value) -> bool) -> Option<i64> {
        (0..self.len()).find(|&i| predicate(self.item(i))).map(|i| i as i64 + 1)
    }

    /// Occurrence counts of each distinct element.
    pub fn counts(
        &self,
        item_ty: &Arc<TypeDescriptor>,
    ) -> Result<Table, RuntimeError> {
        let mut counts = Table::new();
        let count_ty = table_of(item_ty.clone(), crate::runtime::int::INT.clone());
        for item in self.iter() {
            let current = counts
                .get(item, &count_ty)
                .and_then(|v| match v {
                    Value::Int(i) => i.to_i64(false).ok(),
                    _ => None,
                })
                .unwrap_or(0);
            counts.set(item.clone(), Value::Int(Int::Small(current + 1)), &count_ty)?;
        }
        Ok(counts)
    }

    /// Binary search over a sorted list: the matching 1-based index, or the
    /// insertion point if absent.
    pub fn binary_search(&self, target: &Value, cmp: Comparator) -> i64 {
        let mut lo = 0i64;
        let mut hi = self.len() as i64 - 1;
        while lo <= hi {
            let mid = (lo + hi) / 2;
            match cmp(self.item(mid as usize), target) {
                Ordering::Equal => return mid + 1,
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid - 1,
            }
        }
        lo + 1
    }

    // ===== Reordering =====

    pub fn sort(&mut self, cmp: Comparator) {
        self.ensure_plain(0);
        let offset = self.offset;
        let len = self.len();
        let vec = self.plain_vec();
        vec[offset..offset + len].sort_by(|a, b| cmp(a, b));
    }

    pub fn sorted(&self, cmp: Comparator) -> List {
        let mut copy = List::from_vec(self.to_vec());
        copy.sort(cmp);
        copy
    }

    fn default_random_int(min: i64, max: i64) -> i64 {
        OsRng.gen_range(min..=max)
    }

    /// Fisher–Yates shuffle, using the OS RNG unless a custom source is
    /// given.
    pub fn shuffle(&mut self, rng: Option<RandomInt>) -> Result<(), RuntimeError> {
        self.ensure_plain(0);
        let offset = self.offset;
        let len = self.len();
        let vec = self.plain_vec();
        let items = &mut vec[offset..offset + len];
        let mut default_rng = Self::default_random_int;
        let rng: RandomInt = match rng {
            Some(f) => f,
            None => &mut default_rng,
        };
        for i in (1..len).rev() {
            let j = rng(0, i as i64);
            if j < 0 || j > i as i64 {
                return Err(RuntimeError::CallbackContract {
                    reason: format!(
                        "The provided random number function returned an invalid value: {j} (not between 0 and {i})"
                    ),
                });
            }
            items.swap(i, j as usize);
        }
        Ok(())
    }

    pub fn shuffled(&self, rng: Option<RandomInt>) -> Result<List, RuntimeError> {
        let mut copy = List::from_vec(self.to_vec());
        copy.shuffle(rng)?;
        Ok(copy)
    }

    /// A uniformly random element, by value. None for the empty list.
    pub fn random(&self, rng: Option<RandomInt>) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        let mut default_rng = Self::default_random_int;
        let rng: RandomInt = match rng {
            Some(f) => f,
            None => &mut default_rng,
        };
        let index = rng(0, self.len() as i64 - 1).clamp(0, self.len() as i64 - 1);
        Some(self.item(index as usize).clone())
    }

    /// Weighted sampling with replacement using the alias method: O(n)
    /// setup, O(1) per draw. Weights must be finite, non-negative, the same
    /// length as the list, and not all zero.
    pub fn sample(
        &self,
        n: i64,
        weights: &[f64],
        rng: Option<RandomNum>,
    ) -> Result<List, RuntimeError> {
        if n < 0 {
            return Err(RuntimeError::InvalidWeight {
                reason: "cannot select a negative number of values",
            });
        }
        if n == 0 {
            return Ok(List::new());
        }
        let len = self.len();
        if len == 0 {
            return Err(RuntimeError::InvalidIndex { index: 1, length: 0 });
        }
        if weights.len() != len {
            return Err(RuntimeError::InvalidWeight {
                reason: "weight count does not match list length",
            });
        }
        let mut total = 0.0;
        for &w in weights {
            if w.is_infinite() {
                return Err(RuntimeError::InvalidWeight { reason: "infinite weight" });
            }
            if w.is_nan() {
                return Err(RuntimeError::InvalidWeight { reason: "NaN weight" });
            }
            if w < 0.0 {
                return Err(RuntimeError::InvalidWeight { reason: "negative weight" });
            }
            total += w;
        }
        if total.is_infinite() {
            return Err(RuntimeError::InvalidWeight {
                reason: "weights overflowed to infinity",
            });
        }
        if total == 0.0 {
            return Err(RuntimeError::InvalidWeight {
                reason: "none of the given weights are nonzero",
            });
        }

        // Build the alias table
        let inverse_average = len as f64 / total;
        let mut odds: Vec<f64> =
            weights.iter().map(|w| w * inverse_average).collect();
        let mut alias: Vec<i64> = vec![-1; len];
        let mut small = 0usize;
        for big in 0..len {
            while odds[big] >= 1.0 {
                while small < len && (odds[small] >= 1.0 || alias[small] != -1) {
                    small += 1;
                }
                if small >= len {
                    odds[big] = 1.0;
                    alias[big] = big as i64;
                    break;
                }
                alias[small] = big as i64;
                odds[big] = (odds[small] + odds[big]) - 1.0;
            }
            if big < small {
                small = big;
            }
        }
        for (i, a) in alias.iter_mut().enumerate() {
            if *a == -1 {
                *a = i as i64;
            }
        }

        let mut default_rng = || OsRng.gen::<f64>();
        let rng: RandomNum = match rng {
            Some(f) => f,
            None => &mut default_rng,
        };
        let mut selected = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let r = rng();
            if !(0.0..1.0).contains(&r) {
                return Err(RuntimeError::CallbackContract {
                    reason: format!(
                        "The random number function returned a value not between 0.0 (inclusive) and 1.0 (exclusive): {r}"
                    ),
                });
            }
            let scaled = r * len as f64;
            let mut index = scaled as usize;
            if (scaled - index as f64) > odds[index] {
                index = alias[index] as usize;
            }
            selected.push(self.item(index).clone());
        }
        Ok(List::from_vec(selected))
    }

    // ===== Binary heap (a min-heap under the comparator) =====

    fn sift_toward_root(&mut self, startpos: usize, mut pos: usize, cmp: Comparator) {
        let offset = self.offset;
        let vec = self.plain_vec();
        while pos > startpos {
            let parent = (pos - 1) >> 1;
            if cmp(&vec[offset + pos], &vec[offset + parent]) == Ordering::Less {
                vec.swap(offset + pos, offset + parent);
                pos = parent;
            } else {
                break;
            }
        }
    }

    fn sift_toward_leaves(&mut self, mut pos: usize, cmp: Comparator) {
        let len = self.len();
        let startpos = pos;
        {
            let offset = self.offset;
            let vec = self.plain_vec();
            let limit = len >> 1;
            while pos < limit {
                let mut child = 2 * pos + 1;
                if child + 1 < len
                    && cmp(&vec[offset + child], &vec[offset + child + 1])
                        != Ordering::Less
                {
                    child += 1;
                }
                vec.swap(offset + pos, offset + child);
                pos = child;
            }
        }
        self.sift_toward_root(startpos, pos, cmp);
    }

    pub fn heap_push(&mut self, item: Value, cmp: Comparator) {
        self.ensure_plain(Self::grow_slack(self.len()));
        self.plain_vec().push(item);
        self.length += 1;
        let last = self.len() - 1;
        self.sift_toward_root(0, last, cmp);
    }

    /// Pop the heap's top element. Fails on an empty list.
    pub fn heap_pop(&mut self, cmp: Comparator) -> Result<Value, RuntimeError> {
        let len = self.len();
        if len == 0 {
            return Err(RuntimeError::InvalidIndex { index: 1, length: 0 });
        }
        self.ensure_plain(0);
        let offset = self.offset;
        let vec = self.plain_vec();
        let top = vec[offset].clone();
        if len == 1 {
            *self = List::new();
            return Ok(top);
        }
        let last = vec.len() - 1;
        vec.swap(offset, last);
        vec.truncate(last);
        self.length -= 1;
        self.sift_toward_leaves(0, cmp);
        Ok(top)
    }

    pub fn heapify(&mut self, cmp: Comparator) {
        self.ensure_plain(0);
        let len = self.len();
        for i in (0..len / 2).rev() {
            self.sift_toward_leaves(i, cmp);
        }
    }
}

// ===== Type descriptor =====

fn as_list(v: &Value) -> &List {
    match v {
        Value::List(l) => l,
        other => panic!("expected List, got {other:?}"),
    }
}

fn item_ty(ty: &TypeDescriptor) -> &Arc<TypeDescriptor> {
    match &ty.tag {
        TypeTag::List { item } => item,
        _ => panic!("list metamethod on non-list descriptor"),
    }
}

fn list_hash(v: &Value, ty: &TypeDescriptor) -> u64 {
    let list = as_list(v);
    let item = item_ty(ty);
    let mut words: Vec<u64> =
        list.iter().map(|x| generic_hash(x, item)).collect();
    words.push(list.len() as u64);
    hashing::siphash_words(&words)
}

fn list_compare(x: &Value, y: &Value, ty: &TypeDescriptor) -> Ordering {
    let (a, b) = (as_list(x), as_list(y));
    // Two views of the same buffer with the same stride compare by length
    if Arc::ptr_eq(&a.data, &b.data)
        && a.offset == b.offset
        && a.stride == b.stride
    {
        return a.length.cmp(&b.length);
    }
    let item = item_ty(ty);
    for i in 0..a.len().min(b.len()) {
        let cmp = generic_compare(a.item(i), b.item(i), item);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    a.length.cmp(&b.length)
}

fn list_equal(x: &Value, y: &Value, ty: &TypeDescriptor) -> bool {
    let (a, b) = (as_list(x), as_list(y));
    a.length == b.length && list_compare(x, y, ty) == Ordering::Equal
}

fn list_as_text(obj: Option<&Value>, colorize: bool, ty: &TypeDescriptor) -> Text {
    let item = item_ty(ty);
    match obj {
        None => Text::from_str("[")
            .concat(&generic_as_text(None, false, item))
            .concat(&Text::from_str("]")),
        Some(v) => {
            let mut out = Text::from_str("[");
            for (i, x) in as_list(v).iter().enumerate() {
                if i > 0 {
                    out = out.concat(&Text::from_str(", "));
                }
                out = out.concat(&generic_as_text(Some(x), colorize, item));
            }
            out.concat(&Text::from_str("]"))
        }
    }
}

fn list_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    let list = as_list(obj);
    let item = item_ty(ty);
    serialize::write_varint(out, list.len() as i64);
    for x in list.iter() {
        serialize::serialize_value(x, out, item)?;
    }
    Ok(())
}

fn list_deserialize(
    input: &mut ByteReader<'_>,
    ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let item = item_ty(ty);
    let len = input.read_varint()?;
    if len < 0 {
        return Err(RuntimeError::InvalidData { reason: "negative list length" });
    }
    let mut items = Vec::with_capacity(len.min(4096) as usize);
    for _ in 0..len {
        items.push(serialize::deserialize_value(input, item)?);
    }
    Ok(Value::List(List::from_vec(items)))
}

/// Descriptor for a list of `item`.
pub fn list_of(item: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
    Arc::new(TypeDescriptor {
        size: 16,
        align: 8,
        tag: TypeTag::List { item },
        metamethods: Metamethods {
            hash: Some(list_hash),
            compare: Some(list_compare),
            equal: Some(list_equal),
            as_text: Some(list_as_text),
            is_none: Some(|v, _| as_list(v).is_none()),
            serialize: Some(list_serialize),
            deserialize: Some(list_deserialize),
        },
    })
}

use crate::runtime::table::table_of;
