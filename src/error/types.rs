use thiserror::Error;

/// Unified result type for runtime entry points.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures while decoding a binary bundle. Decode never partially applies a
/// corrupt document: the first error aborts the load.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bad magic 0x{0:08X}")]
    BadMagic(u32),
    #[error("unsupported major version {major} (runtime speaks {supported})")]
    UnsupportedVersion { major: u16, supported: u16 },
    #[error("{what} count {declared} exceeds limit {limit}")]
    LimitExceeded {
        what: &'static str,
        declared: u64,
        limit: u64,
    },
    #[error("payload checksum mismatch (stored 0x{stored:08X}, computed 0x{computed:08X})")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("unknown element tag 0x{0:04X}")]
    UnknownElementTag(u16),
    #[error("unknown property tag 0x{0:02X}")]
    UnknownPropertyTag(u8),
    #[error("property value length {got} does not match tag 0x{tag:02X} (expected {expected})")]
    ValueSizeMismatch { tag: u8, expected: u16, got: u16 },
    #[error("string index {index} out of range (table holds {len})")]
    StringIndexOutOfRange { index: u16, len: usize },
    #[error("string entry {0} is not valid UTF-8")]
    InvalidUtf8(usize),
    #[error("input truncated while reading {0}")]
    Truncated(&'static str),
    #[error("header declares {declared} {what}, found {found}")]
    CountMismatch {
        what: &'static str,
        declared: u32,
        found: u32,
    },
    #[error("declared compression `{0}` is not supported by this build")]
    UnsupportedCompression(&'static str),
    #[error("unknown compression kind {0}")]
    UnknownCompression(u8),
    #[error("element {child} references missing parent {parent}")]
    MissingParent { child: u32, parent: u32 },
    #[error("element {0} is its own ancestor")]
    CyclicParent(u32),
    #[error("duplicate element id {0}")]
    DuplicateElementId(u32),
}

/// Failures while serializing a bundle.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("string table overflow ({0} entries)")]
    StringTableOverflow(usize),
    #[error("{what} count {count} overflows the header field")]
    CountOverflow { what: &'static str, count: usize },
    #[error("element {element} references unknown child {child}")]
    UnresolvedReference { element: u32, child: u32 },
}

/// Structural failures on the element tree.
#[derive(Debug, Error)]
pub enum ElementError {
    #[error("invalid element handle")]
    InvalidHandle,
    #[error("element is {0:?}; mutation is not permitted")]
    InvalidPhase(crate::tree::Phase),
    #[error("element has no parent")]
    HasNoParent,
    #[error("element limit {0} reached")]
    TreeFull(usize),
}

/// Per-property application failures. Non-fatal: the mutation is skipped and
/// logged, the tree stays consistent.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("unknown property `{0}`")]
    Unknown(String),
    #[error("property `{name}` expects {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
}

/// State store failures.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state path `{0}` does not resolve")]
    PathNotFound(String),
    #[error("index {index} out of range at `{path}`")]
    IndexOutOfRange { path: String, index: usize },
    #[error("`{0}` is not an array or object")]
    NotAContainer(String),
    #[error("empty or malformed state path `{0}`")]
    InvalidPath(String),
    #[error("state write during observer notification")]
    ReentrantWrite,
}

/// The bounded event queue rejected a push.
#[derive(Debug, Error)]
#[error("event queue full (capacity {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Block allocator failures. Double frees are detected and reported, never
/// undefined behavior.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("allocation of {size} bytes failed: pool exhausted")]
    OutOfMemory { size: usize },
    #[error("block already freed")]
    DoubleFree,
    #[error("unknown block reference")]
    InvalidBlock,
    #[error("alignment {0} is not a power of two")]
    BadAlignment(usize),
}

/// Key combo strings that fail to parse (e.g. `"Ctrl+"`).
#[derive(Debug, Error)]
pub enum ShortcutParseError {
    #[error("empty key combo")]
    Empty,
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("duplicate modifier `{0}`")]
    DuplicateModifier(String),
}

/// Umbrella error for the runtime driver surface.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("element error: {0}")]
    Element(#[from] ElementError),
    #[error("property error: {0}")]
    Property(#[from] PropertyError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("allocation error: {0}")]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    QueueFull(#[from] QueueFull),
    #[error("no document loaded")]
    NoDocument,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
