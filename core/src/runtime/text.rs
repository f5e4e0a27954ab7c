//! Immutable Unicode text, stored as a rope. Short ASCII and grapheme runs
//! live in flat leaf nodes, bulk payloads keep their UTF-8 bytes in blob
//! nodes, and concatenation builds binary trees that are rebalanced past a
//! depth limit. Lengths and indices are always in grapheme clusters, never
//! bytes or codepoints.

use crate::consts::MAX_TEXT_DEPTH;
use crate::runtime::hashing::IdChunker;
use crate::runtime::serialize::{self, ByteReader};
use crate::runtime::types::{
    Metamethods, TypeDescriptor, TypeTag, Value,
};
use crate::error::RuntimeError;
use once_cell::sync::{Lazy, OnceCell};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering as Atomic};
use std::sync::{Arc, RwLock};
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Non-ASCII owned strings at or above this many bytes keep their UTF-8
/// payload in a blob node instead of expanding to a grapheme array up front.
const BLOB_THRESHOLD: usize = 128;

// ===== Synthetic grapheme table =====

/// Multi-codepoint grapheme clusters are assigned negative IDs indexing this
/// process-wide table. The table is append-only: once issued, an ID never
/// changes meaning.
struct SyntheticGraphemes {
    by_cluster: BTreeMap<Box<[char]>, i32>,
    clusters: Vec<Arc<[char]>>,
}

static SYNTHETIC_GRAPHEMES: Lazy<RwLock<SyntheticGraphemes>> =
    Lazy::new(|| {
        RwLock::new(SyntheticGraphemes {
            by_cluster: BTreeMap::new(),
            clusters: Vec::new(),
        })
    });

fn synthetic_id(cluster: &[char]) -> i32 {
    {
        let table = SYNTHETIC_GRAPHEMES.read().unwrap();
        if let Some(&id) = table.by_cluster.get(cluster) {
            return id;
        }
    }
    let mut table = SYNTHETIC_GRAPHEMES.write().unwrap();
    if let Some(&id) = table.by_cluster.get(cluster) {
        return id;
    }
    let id = -(table.clusters.len() as i32) - 1;
    table.clusters.push(cluster.into());
    table.by_cluster.insert(cluster.into(), id);
    id
}

/// The codepoints of a grapheme ID: a single codepoint for positive IDs, or
/// the registered cluster for negative ones.
pub fn grapheme_codepoints(id: i32) -> Arc<[char]> {
    if id >= 0 {
        let ch = char::from_u32(id as u32).unwrap_or('\u{FFFD}');
        Arc::from(vec![ch].into_boxed_slice())
    } else {
        let table = SYNTHETIC_GRAPHEMES.read().unwrap();
        table.clusters[(-id - 1) as usize].clone()
    }
}

fn id_for_grapheme(cluster: &str) -> i32 {
    let mut chars = cluster.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => ch as i32,
        _ => synthetic_id(&cluster.chars().collect::<Vec<char>>()),
    }
}

// ===== Node types =====

#[derive(Debug)]
struct AsciiNode {
    bytes: Box<[u8]>,
    hash: AtomicU64,
}

#[derive(Debug)]
struct GraphemeNode {
    ids: Box<[i32]>,
    hash: AtomicU64,
}

#[derive(Debug)]
struct BlobNode {
    /// NFC-normalized UTF-8 payload
    bytes: Box<[u8]>,
    /// Grapheme count, computed eagerly so the header length is always known
    length: usize,
    /// Grapheme IDs, decoded on first indexed access
    ids: OnceCell<Box<[i32]>>,
    hash: AtomicU64,
}

impl BlobNode {
    fn ids(&self) -> &[i32] {
        self.ids.get_or_init(|| {
            let s = std::str::from_utf8(&self.bytes)
                .expect("blob bytes are validated UTF-8");
            s.graphemes(true).map(id_for_grapheme).collect()
        })
    }
}

#[derive(Debug)]
struct ConcatNode {
    left: Text,
    right: Text,
    length: usize,
    depth: u8,
    hash: AtomicU64,
}

#[derive(Clone, Debug)]
enum Repr {
    None,
    Ascii { node: Arc<AsciiNode>, off: usize, len: usize },
    Graphemes { node: Arc<GraphemeNode>, off: usize, len: usize },
    Blob { node: Arc<BlobNode>, off: usize, len: usize },
    Concat(Arc<ConcatNode>),
}

/// An immutable Unicode string. Cloning is cheap (shared storage); all
/// mutation-shaped operations return new values.
#[derive(Clone, Debug)]
pub struct Text {
    repr: Repr,
}

/// Cached cursor for sequential grapheme access over a concat tree. Moving
/// forward within the cached leaf is O(1); crossing a leaf boundary (in
/// either direction) re-descends from the root.
#[derive(Default)]
pub struct IterState {
    leaf: Option<(Repr, usize)>,
}

impl Text {
    // ===== Constructors =====

    /// The none text (the sentinel for `Text?`).
    pub fn none() -> Text {
        Text { repr: Repr::None }
    }

    /// The empty text.
    pub fn empty() -> Text {
        Text {
            repr: Repr::Ascii {
                node: Arc::new(AsciiNode {
                    bytes: Box::default(),
                    hash: AtomicU64::new(0),
                }),
                off: 0,
                len: 0,
            },
        }
    }

    /// Build a text from a string slice. All-ASCII input takes the byte fast
    /// path; anything else is NFC-normalized and split into grapheme
    /// clusters.
    pub fn from_str(s: &str) -> Text {
        if s.is_ascii() {
            return Text {
                repr: Repr::Ascii {
                    node: Arc::new(AsciiNode {
                        bytes: s.as_bytes().into(),
                        hash: AtomicU64::new(0),
                    }),
                    off: 0,
                    len: s.len(),
                },
            };
        }
        let normalized: String = s.nfc().collect();
        let ids: Box<[i32]> =
            normalized.graphemes(true).map(id_for_grapheme).collect();
        let len = ids.len();
        Text {
            repr: Repr::Graphemes {
                node: Arc::new(GraphemeNode { ids, hash: AtomicU64::new(0) }),
                off: 0,
                len,
            },
        }
    }

    /// Build a text from an owned string. Large non-ASCII payloads keep
    /// their UTF-8 bytes in a blob node with lazily decoded grapheme IDs.
    pub fn from_string(s: String) -> Text {
        if s.is_ascii() {
            let bytes: Box<[u8]> = s.into_bytes().into();
            let len = bytes.len();
            return Text {
                repr: Repr::Ascii {
                    node: Arc::new(AsciiNode { bytes, hash: AtomicU64::new(0) }),
                    off: 0,
                    len,
                },
            };
        }
        if s.len() < BLOB_THRESHOLD {
            return Text::from_str(&s);
        }
        let normalized: String = s.nfc().collect();
        let length = normalized.graphemes(true).count();
        Text {
            repr: Repr::Blob {
                node: Arc::new(BlobNode {
                    bytes: normalized.into_bytes().into(),
                    length,
                    ids: OnceCell::new(),
                    hash: AtomicU64::new(0),
                }),
                off: 0,
                len: length,
            },
        }
    }

    /// Build a text from UTF-8 bytes. Returns `None` on invalid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Option<Text> {
        std::str::from_utf8(bytes).ok().map(Text::from_str)
    }

    /// Build a text from a codepoint sequence (normalizing to NFC).
    pub fn from_codepoints(codepoints: &[char]) -> Text {
        let s: String = codepoints.iter().collect();
        Text::from_str(&s)
    }

    /// Build a text from UTF-16 code units. Returns `None` on unpaired
    /// surrogates.
    pub fn from_utf16(units: &[u16]) -> Option<Text> {
        String::from_utf16(units).ok().map(|s| Text::from_str(&s))
    }

    // ===== Basic queries =====

    /// Length in grapheme clusters.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::None => 0,
            Repr::Ascii { len, .. }
            | Repr::Graphemes { len, .. }
            | Repr::Blob { len, .. } => *len,
            Repr::Concat(node) => node.length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is the none text.
    pub fn is_none(&self) -> bool {
        matches!(self.repr, Repr::None)
    }

    /// Depth of the concat tree (leaves are depth 0).
    pub fn depth(&self) -> u8 {
        match &self.repr {
            Repr::Concat(node) => node.depth,
            _ => 0,
        }
    }

    // ===== Concatenation =====

    /// Concatenate two texts. The empty text is the identity on both sides;
    /// the result shares both inputs' storage. Trees exceeding the depth
    /// limit are rebalanced.
    pub fn concat(&self, other: &Text) -> Text {
        if self.is_empty() || self.is_none() {
            return other.clone();
        }
        if other.is_empty() || other.is_none() {
            return self.clone();
        }
        let depth = 1 + self.depth().max(other.depth());
        let joined = Text {
            repr: Repr::Concat(Arc::new(ConcatNode {
                left: self.clone(),
                right: other.clone(),
                length: self.len() + other.len(),
                depth,
                hash: AtomicU64::new(0),
            })),
        };
        if depth >= MAX_TEXT_DEPTH {
            joined.rebalanced()
        } else {
            joined
        }
    }

    /// Concatenate a sequence of texts left to right.
    pub fn concat_all(items: &[Text]) -> Text {
        let mut result = Text::empty();
        for item in items {
            result = result.concat(item);
        }
        result
    }

    fn leaves(&self, out: &mut Vec<Text>) {
        match &self.repr {
            Repr::Concat(node) => {
                node.left.leaves(out);
                node.right.leaves(out);
            }
            Repr::None => {}
            _ => out.push(self.clone()),
        }
    }

    /// Rebuild as a balanced tree over the same leaves (in-order walk, split
    /// by leaf count).
    fn rebalanced(&self) -> Text {
        let mut leaf_list = Vec::new();
        self.leaves(&mut leaf_list);
        fn build(leaves: &[Text]) -> Text {
            match leaves.len() {
                0 => Text::empty(),
                1 => leaves[0].clone(),
                n => {
                    let (l, r) = leaves.split_at(n / 2);
                    let left = build(l);
                    let right = build(r);
                    Text {
                        repr: Repr::Concat(Arc::new(ConcatNode {
                            length: left.len() + right.len(),
                            depth: 1 + left.depth().max(right.depth()),
                            left,
                            right,
                            hash: AtomicU64::new(0),
                        })),
                    }
                }
            }
        }
        build(&leaf_list)
    }

    // ===== Slicing =====

    /// Slice with 1-based inclusive indices. Negative indices count from the
    /// end; `last == 0` yields the empty text; out-of-bounds indices
    /// saturate. The result shares storage with the input.
    pub fn slice(&self, first: i64, last: i64) -> Text {
        let len = self.len() as i64;
        if last == 0 {
            return Text::empty();
        }
        let mut first = if first < 0 { len + first + 1 } else { first };
        let mut last = if last < 0 { len + last + 1 } else { last };
        if first < 1 {
            first = 1;
        }
        if last > len {
            last = len;
        }
        if first > len || last < first {
            return Text::empty();
        }
        if first == 1 && last == len {
            return self.clone();
        }
        self.slice_abs((first - 1) as usize, (last - first + 1) as usize)
    }

    /// Zero-based slice of `count` graphemes starting at `start`. Bounds are
    /// assumed valid.
    fn slice_abs(&self, start: usize, count: usize) -> Text {
        if count == 0 {
            return Text::empty();
        }
        match &self.repr {
            Repr::None => Text::empty(),
            Repr::Ascii { node, off, .. } => Text {
                repr: Repr::Ascii {
                    node: node.clone(),
                    off: off + start,
                    len: count,
                },
            },
            Repr::Graphemes { node, off, .. } => Text {
                repr: Repr::Graphemes {
                    node: node.clone(),
                    off: off + start,
                    len: count,
                },
            },
            Repr::Blob { node, off, .. } => Text {
                repr: Repr::Blob {
                    node: node.clone(),
                    off: off + start,
                    len: count,
                },
            },
            Repr::Concat(node) => {
                let left_len = node.left.len();
                if start + count <= left_len {
                    node.left.slice_abs(start, count)
                } else if start >= left_len {
                    node.right.slice_abs(start - left_len, count)
                } else {
                    let from_left = left_len - start;
                    node.left
                        .slice_abs(start, from_left)
                        .concat(&node.right.slice_abs(0, count - from_left))
                }
            }
        }
    }

    // ===== Grapheme access =====

    fn leaf_id(repr: &Repr, i: usize) -> i32 {
        match repr {
            Repr::Ascii { node, off, .. } => node.bytes[off + i] as i32,
            Repr::Graphemes { node, off, .. } => node.ids[off + i],
            Repr::Blob { node, off, .. } => node.ids()[off + i],
            _ => unreachable!("not a leaf"),
        }
    }

    /// Find the leaf containing grapheme index `i`, along with the absolute
    /// index of that leaf's first grapheme.
    fn find_leaf(&self, i: usize) -> (Repr, usize) {
        let mut cur = self.repr.clone();
        let mut base = 0;
        loop {
            match cur {
                Repr::Concat(node) => {
                    let left_len = node.left.len();
                    if i < base + left_len {
                        cur = node.left.repr.clone();
                    } else {
                        base += left_len;
                        cur = node.right.repr.clone();
                    }
                }
                leaf => return (leaf, base),
            }
        }
    }

    fn leaf_len(repr: &Repr) -> usize {
        match repr {
            Repr::Ascii { len, .. }
            | Repr::Graphemes { len, .. }
            | Repr::Blob { len, .. } => *len,
            Repr::None => 0,
            Repr::Concat(node) => node.length,
        }
    }

    /// Grapheme ID at 0-based index `i`, using `state` to make sequential
    /// access amortized O(1).
    pub fn grapheme_at(&self, state: &mut IterState, i: usize) -> Option<i32> {
        if i >= self.len() {
            return None;
        }
        if let Some((leaf, start)) = &state.leaf {
            if i >= *start && i < *start + Self::leaf_len(leaf) {
                return Some(Self::leaf_id(leaf, i - start));
            }
        }
        let (leaf, start) = self.find_leaf(i);
        let id = Self::leaf_id(&leaf, i - start);
        state.leaf = Some((leaf, start));
        Some(id)
    }

    /// Grapheme ID at a 1-based index; negative counts from the end.
    pub fn get_grapheme(&self, index: i64) -> Option<i32> {
        let len = self.len() as i64;
        let i = if index < 0 { len + index + 1 } else { index };
        if i < 1 || i > len {
            return None;
        }
        self.grapheme_at(&mut IterState::default(), (i - 1) as usize)
    }

    /// Iterate over all grapheme IDs.
    pub fn grapheme_ids(&self) -> impl Iterator<Item = i32> + '_ {
        let mut state = IterState::default();
        (0..self.len()).map(move |i| {
            self.grapheme_at(&mut state, i).expect("index in bounds")
        })
    }

    /// The text split into one single-grapheme text per cluster.
    pub fn graphemes(&self) -> Vec<Text> {
        (1..=self.len() as i64).map(|i| self.slice(i, i)).collect()
    }

    // ===== Conversions out =====

    fn push_grapheme(out: &mut String, id: i32) {
        if id >= 0 {
            out.push(char::from_u32(id as u32).unwrap_or('\u{FFFD}'));
        } else {
            out.extend(grapheme_codepoints(id).iter());
        }
    }

    /// UTF-8 bytes of the whole text.
    pub fn utf8_bytes(&self) -> Vec<u8> {
        // Whole blob/ascii slices can be copied without re-encoding
        match &self.repr {
            Repr::Ascii { node, off, len } => {
                return node.bytes[*off..off + len].to_vec()
            }
            Repr::Blob { node, off, len }
                if *off == 0 && *len == node.length =>
            {
                return node.bytes.to_vec()
            }
            _ => {}
        }
        self.to_string().into_bytes()
    }

    /// The codepoints of the whole text.
    pub fn utf32_codepoints(&self) -> Vec<char> {
        let mut out = Vec::with_capacity(self.len());
        for id in self.grapheme_ids() {
            if id >= 0 {
                out.push(char::from_u32(id as u32).unwrap_or('\u{FFFD}'));
            } else {
                out.extend(grapheme_codepoints(id).iter());
            }
        }
        out
    }

    /// UTF-16 code units of the whole text.
    pub fn utf16_units(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(self.len());
        for ch in self.utf32_codepoints() {
            let mut buf = [0u16; 2];
            out.extend_from_slice(ch.encode_utf16(&mut buf));
        }
        out
    }

    /// The Unicode name of each grapheme cluster. Clusters made of several
    /// codepoints report all names joined with `" + "`.
    pub fn codepoint_names(&self) -> Vec<Text> {
        self.grapheme_ids()
            .map(|id| {
                let names: Vec<String> = grapheme_codepoints(id)
                    .iter()
                    .map(|&ch| match unicode_names2::name(ch) {
                        Some(name) => name.to_string(),
                        None => format!("U+{:04X}", ch as u32),
                    })
                    .collect();
                Text::from_str(&names.join(" + "))
            })
            .collect()
    }

    // ===== Comparison and hashing =====

    /// Grapheme-by-grapheme equality. Texts built through the public
    /// constructors are NFC-normalized, so this is equality under NFC.
    /// When both sides carry cached hashes, a mismatch rejects immediately.
    pub fn equal(&self, other: &Text) -> bool {
        if self.is_none() || other.is_none() {
            return self.is_none() == other.is_none();
        }
        if self.len() != other.len() {
            return false;
        }
        let (ha, hb) = (self.cached_hash(), other.cached_hash());
        if ha != 0 && hb != 0 && ha != hb {
            return false;
        }
        let mut sa = IterState::default();
        let mut sb = IterState::default();
        for i in 0..self.len() {
            if self.grapheme_at(&mut sa, i) != other.grapheme_at(&mut sb, i) {
                return false;
            }
        }
        true
    }

    /// Lexicographic comparison by codepoint. Synthetic clusters expand to
    /// their codepoint sequences for the comparison.
    pub fn compare(&self, other: &Text) -> Ordering {
        let mut sa = IterState::default();
        let mut sb = IterState::default();
        let max = self.len().max(other.len());
        for i in 0..max {
            let ai = self.grapheme_at(&mut sa, i);
            let bi = other.grapheme_at(&mut sb, i);
            match (ai, bi) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(a), Some(b)) => {
                    if a == b {
                        continue;
                    }
                    let ca = grapheme_codepoints(a);
                    let cb = grapheme_codepoints(b);
                    let cmp = ca.iter().cmp(cb.iter());
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
            }
        }
        Ordering::Equal
    }

    /// Case-insensitive equality (per-cluster casefold).
    pub fn equal_ignoring_case(&self, other: &Text) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut sa = IterState::default();
        let mut sb = IterState::default();
        for i in 0..self.len() {
            let a = self.grapheme_at(&mut sa, i).unwrap();
            let b = other.grapheme_at(&mut sb, i).unwrap();
            if a == b {
                continue;
            }
            let fold = |id: i32| -> Vec<char> {
                grapheme_codepoints(id)
                    .iter()
                    .flat_map(|ch| ch.to_lowercase())
                    .collect()
            };
            if fold(a) != fold(b) {
                return false;
            }
        }
        true
    }

    fn cache_slot(&self) -> Option<&AtomicU64> {
        match &self.repr {
            Repr::None => None,
            Repr::Ascii { node, off, len } => {
                (*off == 0 && *len == node.bytes.len()).then(|| &node.hash)
            }
            Repr::Graphemes { node, off, len } => {
                (*off == 0 && *len == node.ids.len()).then(|| &node.hash)
            }
            Repr::Blob { node, off, len } => {
                (*off == 0 && *len == node.length).then(|| &node.hash)
            }
            Repr::Concat(node) => Some(&node.hash),
        }
    }

    fn cached_hash(&self) -> u64 {
        self.cache_slot().map(|slot| slot.load(Atomic::Relaxed)).unwrap_or(0)
    }

    /// SipHash of the grapheme IDs, chunked into 64-bit words. Cached on the
    /// rope node lazily; 0 means "unset", so a computed 0 is remapped to 1.
    pub fn hash(&self) -> u64 {
        if let Some(slot) = self.cache_slot() {
            let cached = slot.load(Atomic::Relaxed);
            if cached != 0 {
                return cached;
            }
        }
        let mut chunker = IdChunker::new();
        for id in self.grapheme_ids() {
            chunker.push(id);
        }
        let mut hash = chunker.finish(self.len() as u64);
        if hash == 0 {
            hash = 1;
        }
        if let Some(slot) = self.cache_slot() {
            slot.store(hash, Atomic::Relaxed);
        }
        hash
    }

    // ===== Searching and rewriting =====

    /// 1-based index of the first occurrence of `pattern` at or after
    /// `from`. The empty pattern matches at `from`.
    pub fn find(&self, pattern: &Text, from: i64) -> Option<i64> {
        let len = self.len() as i64;
        let from = if from < 0 { len + from + 1 } else { from }.max(1);
        let plen = pattern.len();
        if plen == 0 {
            return (from <= len + 1).then_some(from);
        }
        let pat: Vec<i32> = pattern.grapheme_ids().collect();
        let mut state = IterState::default();
        let mut i = (from - 1) as usize;
        'outer: while i + plen <= self.len() {
            for (j, pid) in pat.iter().enumerate() {
                if self.grapheme_at(&mut state, i + j) != Some(*pid) {
                    i += 1;
                    continue 'outer;
                }
            }
            return Some(i as i64 + 1);
        }
        None
    }

    /// Whether `pattern` occurs anywhere in the text.
    pub fn has(&self, pattern: &Text) -> bool {
        self.find(pattern, 1).is_some()
    }

    pub fn starts_with(&self, prefix: &Text) -> bool {
        prefix.len() <= self.len()
            && self.slice(1, prefix.len() as i64).equal(prefix)
    }

    pub fn ends_with(&self, suffix: &Text) -> bool {
        suffix.len() <= self.len()
            && self
                .slice(self.len() as i64 - suffix.len() as i64 + 1, -1)
                .equal(suffix)
    }

    /// Replace occurrences of `pattern` left to right, non-overlapping.
    /// The empty pattern replaces nothing.
    pub fn replace(&self, pattern: &Text, replacement: &Text) -> Text {
        if pattern.is_empty() {
            return self.clone();
        }
        let mut out = Text::empty();
        let mut pos = 1i64;
        while let Some(found) = self.find(pattern, pos) {
            out = out.concat(&self.slice(pos, found - 1));
            out = out.concat(replacement);
            pos = found + pattern.len() as i64;
        }
        out.concat(&self.slice(pos, -1))
    }

    /// Split on a separator. The empty separator splits into single
    /// graphemes.
    pub fn split(&self, separator: &Text) -> Vec<Text> {
        if separator.is_empty() {
            return self.graphemes();
        }
        let mut parts = Vec::new();
        let mut pos = 1i64;
        while let Some(found) = self.find(separator, pos) {
            parts.push(self.slice(pos, found - 1));
            pos = found + separator.len() as i64;
        }
        parts.push(self.slice(pos, -1));
        parts
    }

    /// Split into lines, treating `\n` and `\r\n` as terminators.
    pub fn lines(&self) -> Vec<Text> {
        let mut lines = Vec::new();
        let mut current = Vec::new();
        for id in self.grapheme_ids() {
            // "\r\n" forms a single synthetic cluster, so check both forms
            if id == '\n' as i32 || is_crlf(id) {
                lines.push(Text::from_codepoints(&current));
                current.clear();
            } else {
                current.extend(grapheme_codepoints(id).iter());
            }
        }
        if !current.is_empty() {
            lines.push(Text::from_codepoints(&current));
        }
        lines
    }

    /// Join `items` with `self` as the separator.
    pub fn join(&self, items: &[Text]) -> Text {
        let mut out = Text::empty();
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out = out.concat(self);
            }
            out = out.concat(item);
        }
        out
    }

    /// Repeat the text `n` times.
    pub fn repeat(&self, n: i64) -> Text {
        let mut out = Text::empty();
        for _ in 0..n.max(0) {
            out = out.concat(self);
        }
        out
    }

    /// Trim graphemes in `trim_set` (default whitespace) from either end.
    pub fn trim(&self, trim_set: Option<&Text>, left: bool, right: bool) -> Text {
        let default = Text::from_str(" \t\r\n\u{000B}\u{000C}");
        let set: Vec<i32> =
            trim_set.unwrap_or(&default).grapheme_ids().collect();
        let ids: Vec<i32> = self.grapheme_ids().collect();
        let mut start = 0usize;
        let mut end = ids.len();
        if left {
            while start < end && set.contains(&ids[start]) {
                start += 1;
            }
        }
        if right {
            while end > start && set.contains(&ids[end - 1]) {
                end -= 1;
            }
        }
        self.slice(start as i64 + 1, end as i64)
    }

    // ===== Case mapping =====

    pub fn upper(&self) -> Text {
        let mapped: Vec<char> = self
            .utf32_codepoints()
            .into_iter()
            .flat_map(|ch| ch.to_uppercase())
            .collect();
        Text::from_codepoints(&mapped)
    }

    pub fn lower(&self) -> Text {
        let mapped: Vec<char> = self
            .utf32_codepoints()
            .into_iter()
            .flat_map(|ch| ch.to_lowercase())
            .collect();
        Text::from_codepoints(&mapped)
    }

    /// Uppercase the first letter of each word, lowercase the rest.
    pub fn title(&self) -> Text {
        let mut mapped = Vec::new();
        let mut at_word_start = true;
        for ch in self.utf32_codepoints() {
            if ch.is_alphabetic() {
                if at_word_start {
                    mapped.extend(ch.to_uppercase());
                } else {
                    mapped.extend(ch.to_lowercase());
                }
                at_word_start = false;
            } else {
                mapped.push(ch);
                at_word_start = true;
            }
        }
        Text::from_codepoints(&mapped)
    }

    // ===== Quoting =====

    /// C-style quoted form: non-printable bytes escaped, non-ASCII graphemes
    /// preserved verbatim.
    pub fn quoted(&self, colorize: bool, quote: char) -> Text {
        let mut out = String::new();
        if colorize {
            out.push_str("\x1b[35m");
        }
        out.push(quote);
        let escape = |out: &mut String, esc: &str, colorize: bool| {
            if colorize {
                out.push_str("\x1b[34;1m");
            }
            out.push('\\');
            out.push_str(esc);
            if colorize {
                out.push_str("\x1b[0;35m");
            }
        };
        for id in self.grapheme_ids() {
            match id {
                0x07 => escape(&mut out, "a", colorize),
                0x08 => escape(&mut out, "b", colorize),
                0x1b => escape(&mut out, "e", colorize),
                0x0c => escape(&mut out, "f", colorize),
                0x0a => escape(&mut out, "n", colorize),
                0x0d => escape(&mut out, "r", colorize),
                0x09 => escape(&mut out, "t", colorize),
                0x0b => escape(&mut out, "v", colorize),
                0x5c => escape(&mut out, "\\", colorize),
                id if id == quote as i32 => {
                    escape(&mut out, &quote.to_string(), colorize)
                }
                id if (0..0x20).contains(&id) || id == 0x7f => {
                    escape(&mut out, &format!("x{id:02X}"), colorize)
                }
                id => Self::push_grapheme(&mut out, id),
            }
        }
        out.push(quote);
        if colorize {
            out.push_str("\x1b[m");
        }
        Text::from_str(&out)
    }
}

fn is_crlf(id: i32) -> bool {
    id < 0 && *grapheme_codepoints(id) == ['\r', '\n']
}

impl Display for Text {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for id in self.grapheme_ids() {
            Self::push_grapheme(&mut out, id);
        }
        f.write_str(&out)
    }
}

impl PartialEq for Text {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Eq for Text {}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text::from_str(s)
    }
}

// ===== Type descriptor =====

/// The `Text` type descriptor.
pub static TEXT: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| text_descriptor(None));

/// A descriptor for a `lang`-tagged text type (e.g. `Pattern`, `Shell`).
pub fn text_descriptor(lang: Option<String>) -> Arc<TypeDescriptor> {
    Arc::new(TypeDescriptor {
        size: 24,
        align: 8,
        tag: TypeTag::Text { lang },
        metamethods: Metamethods {
            hash: Some(text_hash),
            compare: Some(text_compare),
            equal: Some(text_equal),
            as_text: Some(text_as_text),
            is_none: Some(|v, _| as_text_value(v).is_none()),
            serialize: Some(text_serialize),
            deserialize: Some(text_deserialize),
        },
    })
}

fn as_text_value(v: &Value) -> &Text {
    match v {
        Value::Text(t) => t,
        other => panic!("expected Text, got {other:?}"),
    }
}

fn text_hash(v: &Value, _ty: &TypeDescriptor) -> u64 {
    as_text_value(v).hash()
}

fn text_compare(x: &Value, y: &Value, _ty: &TypeDescriptor) -> Ordering {
    as_text_value(x).compare(as_text_value(y))
}

fn text_equal(x: &Value, y: &Value, _ty: &TypeDescriptor) -> bool {
    as_text_value(x).equal(as_text_value(y))
}

fn text_as_text(obj: Option<&Value>, colorize: bool, ty: &TypeDescriptor) -> Text {
    match obj {
        None => match &ty.tag {
            TypeTag::Text { lang: Some(lang) } => Text::from_str(lang),
            _ => Text::from_str("Text"),
        },
        Some(v) => as_text_value(v).quoted(colorize, '"'),
    }
}

fn text_serialize(
    obj: &Value,
    out: &mut Vec<u8>,
    _ty: &TypeDescriptor,
) -> Result<(), RuntimeError> {
    let bytes = as_text_value(obj).utf8_bytes();
    serialize::write_varint(out, bytes.len() as i64);
    out.extend_from_slice(&bytes);
    Ok(())
}

fn text_deserialize(
    input: &mut ByteReader<'_>,
    _ty: &TypeDescriptor,
) -> Result<Value, RuntimeError> {
    let len = input.read_varint()?;
    let bytes = input.read_bytes(len as usize)?;
    let text = Text::from_bytes(bytes)
        .ok_or(RuntimeError::InvalidData { reason: "invalid UTF-8 in Text" })?;
    Ok(Value::Text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ascii_fast_path() {
        let t = Text::from_str("hello");
        assert_eq!(t.len(), 5);
        assert_eq!(t.to_string(), "hello");
        assert_eq!(t.depth(), 0);
    }

    #[test]
    fn test_grapheme_lengths_are_clusters() {
        // 👋 + ❤️ (two codepoints) + A
        let t = Text::from_str("\u{1F44B}\u{2764}\u{FE0F}A");
        assert_eq!(t.len(), 3);
        assert!(t.get_grapheme(2).unwrap() < 0, "cluster gets a synthetic id");
        assert_eq!(t.get_grapheme(3), Some('A' as i32));
    }

    #[test]
    fn test_concat_identity_and_sharing() {
        let a = Text::from_str("abc");
        let empty = Text::empty();
        assert_eq!(a.concat(&empty).to_string(), "abc");
        assert_eq!(empty.concat(&a).to_string(), "abc");
        let ab = a.concat(&Text::from_str("def"));
        assert_eq!(ab.to_string(), "abcdef");
        assert_eq!(ab.len(), 6);
        assert_eq!(ab.depth(), 1);
    }

    #[test]
    fn test_concat_associative() {
        let (a, b, c) = (
            Text::from_str("ab"),
            Text::from_str("cd"),
            Text::from_str("ef"),
        );
        let left = a.concat(&b).concat(&c);
        let right = a.concat(&b.concat(&c));
        assert!(left.equal(&right));
        assert_eq!(left.hash(), right.hash());
    }

    #[test]
    fn test_deep_concat_rebalances() {
        let mut t = Text::from_str("x");
        for _ in 0..200 {
            t = t.concat(&Text::from_str("y"));
        }
        assert_eq!(t.len(), 201);
        assert!(t.depth() < MAX_TEXT_DEPTH);
        assert_eq!(t.slice(1, 3).to_string(), "xyy");
    }

    #[test]
    fn test_slice_semantics() {
        let t = Text::from_str("hello world");
        assert_eq!(t.slice(1, 5).to_string(), "hello");
        assert_eq!(t.slice(7, -1).to_string(), "world");
        assert_eq!(t.slice(-5, -1).to_string(), "world");
        assert_eq!(t.slice(3, 0).to_string(), "");
        assert_eq!(t.slice(50, 60).to_string(), "");
        assert_eq!(t.slice(1, 50).to_string(), "hello world");
    }

    #[test]
    fn test_slice_of_concat_shares_storage() {
        let t = Text::from_str("abc").concat(&Text::from_str("defgh"));
        assert_eq!(t.slice(2, 6).to_string(), "bcdef");
    }

    #[test]
    fn test_utf8_round_trip() {
        let bytes: &[u8] =
            &[0xF0, 0x9F, 0x91, 0x8B, 0xE2, 0x9D, 0xA4, 0xEF, 0xB8, 0x8F, 0x41];
        let t = Text::from_bytes(bytes).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.utf8_bytes(), bytes);
    }

    #[test]
    fn test_codepoint_names() {
        let t = Text::from_bytes(&[
            0xF0, 0x9F, 0x91, 0x8B, 0xE2, 0x9D, 0xA4, 0xEF, 0xB8, 0x8F, 0x41,
        ])
        .unwrap();
        let names: Vec<String> =
            t.codepoint_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "WAVING HAND SIGN",
                "HEAVY BLACK HEART + VARIATION SELECTOR-16",
                "LATIN CAPITAL LETTER A",
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_is_none() {
        assert!(Text::from_bytes(&[0xFF, 0xFE]).is_none());
    }

    #[test]
    fn test_utf16_round_trip() {
        let t = Text::from_str("a\u{1F44B}z");
        let units = t.utf16_units();
        let back = Text::from_utf16(&units).unwrap();
        assert!(t.equal(&back));
    }

    #[test]
    fn test_nfc_equality() {
        // "é" precomposed vs decomposed
        let composed = Text::from_str("\u{00E9}");
        let decomposed = Text::from_str("e\u{0301}");
        assert!(composed.equal(&decomposed));
        assert_eq!(composed.hash(), decomposed.hash());
    }

    #[test]
    fn test_hash_cached_and_nonzero() {
        let t = Text::from_str("cache me");
        let h1 = t.hash();
        assert_ne!(h1, 0);
        assert_eq!(t.hash(), h1);
        // Same content split differently still agrees
        let split = Text::from_str("cache").concat(&Text::from_str(" me"));
        assert_eq!(split.hash(), h1);
    }

    #[test]
    fn test_compare_order() {
        let a = Text::from_str("apple");
        let b = Text::from_str("banana");
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&Text::from_str("apple")), Ordering::Equal);
        assert_eq!(a.compare(&Text::from_str("app")), Ordering::Greater);
    }

    #[test]
    fn test_find_and_replace() {
        let t = Text::from_str("one two one two");
        assert_eq!(t.find(&Text::from_str("two"), 1), Some(5));
        assert_eq!(t.find(&Text::from_str("two"), 6), Some(13));
        assert_eq!(t.find(&Text::from_str("three"), 1), None);
        let replaced = t.replace(&Text::from_str("one"), &Text::from_str("1"));
        assert_eq!(replaced.to_string(), "1 two 1 two");
        // Non-overlapping left-to-right walk
        let aaa = Text::from_str("aaaa");
        assert_eq!(
            aaa.replace(&Text::from_str("aa"), &Text::from_str("b")).to_string(),
            "bb"
        );
    }

    #[test]
    fn test_split_join_lines() {
        let t = Text::from_str("a,b,,c");
        let parts: Vec<String> =
            t.split(&Text::from_str(",")).iter().map(|p| p.to_string()).collect();
        assert_eq!(parts, vec!["a", "b", "", "c"]);
        let joined = Text::from_str(", ").join(&[
            Text::from_str("x"),
            Text::from_str("y"),
        ]);
        assert_eq!(joined.to_string(), "x, y");
        let lines: Vec<String> = Text::from_str("one\ntwo\r\nthree")
            .lines()
            .iter()
            .map(|l| l.to_string())
            .collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_case_ops() {
        assert_eq!(Text::from_str("Hello").upper().to_string(), "HELLO");
        assert_eq!(Text::from_str("Hello").lower().to_string(), "hello");
        assert_eq!(
            Text::from_str("hello world").title().to_string(),
            "Hello World"
        );
        assert!(Text::from_str("HELLO")
            .equal_ignoring_case(&Text::from_str("hello")));
    }

    #[test]
    fn test_quoted() {
        let t = Text::from_str("line\nwith \"quotes\"");
        assert_eq!(
            t.quoted(false, '"').to_string(),
            "\"line\\nwith \\\"quotes\\\"\""
        );
    }

    #[test]
    fn test_blob_construction() {
        let payload = "héllo wörld ".repeat(32);
        let t = Text::from_string(payload.clone());
        let expected: String = payload.nfc().collect();
        assert_eq!(t.to_string(), expected);
        assert!(t.len() > 0);
        assert_eq!(t.utf8_bytes(), expected.as_bytes());
    }

    #[test]
    fn test_none_text() {
        let none = Text::none();
        assert!(none.is_none());
        assert!(!Text::empty().is_none());
        assert_eq!(none.concat(&Text::from_str("x")).to_string(), "x");
    }

    #[test]
    fn test_trim() {
        let t = Text::from_str("  padded  ");
        assert_eq!(t.trim(None, true, true).to_string(), "padded");
        assert_eq!(t.trim(None, true, false).to_string(), "padded  ");
        let custom = Text::from_str("xxabcxx");
        assert_eq!(
            custom
                .trim(Some(&Text::from_str("x")), true, true)
                .to_string(),
            "abc"
        );
    }
}
