/// Indentation is measured in units of either one tab or this many spaces.
/// Mixing tabs and spaces on a single line is a parse error.
pub const SPACES_PER_INDENT: usize = 4;

/// The cache of {filename -> parsed AST} will hold at most this many entries.
/// When full, a uniformly random entry is evicted.
pub const PARSE_CACHE_SIZE: usize = 100;

/// Concat trees deeper than this get rebalanced. A balanced tree of this
/// depth already covers more text than will fit in memory.
pub const MAX_TEXT_DEPTH: u8 = 48;

/// Hash tables refuse to grow their bucket array past this many buckets.
pub const TABLE_MAX_BUCKETS: u32 = 0x7fff_ffff;

/// The largest magnitude a list's element stride may take before stride-based
/// views fall back to compacting copies.
pub const LIST_MAX_STRIDE: i64 = 0x7ff;

/// Multiplier for converting degree literals (`90deg`) to radians.
pub const RADIANS_PER_DEGREE: f64 =
    0.017_453_292_519_943_295_769_236_907_684_886_127;

/// Reserved words that can never be used as identifiers.
pub const KEYWORDS: &[&str] = &[
    "yes", "xor", "while", "when", "use", "struct", "stop", "skip", "return",
    "repeat", "pass", "or", "not", "no", "mod1", "mod", "lang", "inline",
    "in", "if", "func", "for", "extern", "enum", "else", "do", "defer", "and",
    "_min_", "_max_",
];
