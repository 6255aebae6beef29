//! Logical device identifiers.
//!
//! A discovered node like `/dev/video3` is announced under a stable identifier
//! of the form `device@1.1/external/<id>`, where `<id>` is the node's numeric
//! suffix shifted by the configured offset. The mapping is injective for a
//! fixed offset, so concurrently attached devices never collide.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Directory holding the character device nodes. Fixed by the host
/// environment's naming convention, not configurable.
pub const DEVICE_DIR: &str = "/dev";

/// Node-name prefix of capture device nodes under [`DEVICE_DIR`].
pub const NODE_PREFIX: &str = "video";

/// Interface version baked into every identifier.
pub const DEVICE_VERSION: &str = "1.1";

fn identifier_re() -> &'static regex::Regex {
    static IDENTIFIER_RE: OnceLock<regex::Regex> = OnceLock::new();
    IDENTIFIER_RE.get_or_init(|| {
        regex::Regex::new(r"^device@([0-9]+\.[0-9]+)/external/([0-9]+)$").unwrap()
    })
}

/// A string that does not name a device this subsystem recognizes.
///
/// Callers must treat this as "not ours", never as a fatal condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseError;

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not an external capture device identifier")
    }
}

impl std::error::Error for ParseError {}

/// Result of parsing a logical identifier back into host terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub version: String,
    pub node_path: PathBuf,
}

/// Numeric suffix of a `video*` node name, if it has one.
pub(crate) fn node_index(node: &Path) -> Option<u32> {
    let name = node.file_name()?.to_str()?;
    name.strip_prefix(NODE_PREFIX)?.parse().ok()
}

/// Identifier for a device node, or `None` when the node name does not carry
/// a numeric `video*` suffix.
pub fn identifier_for(node: &Path, offset: u32) -> Option<String> {
    let index = node_index(node)?;
    Some(format!(
        "device@{}/external/{}",
        DEVICE_VERSION,
        offset as u64 + index as u64
    ))
}

/// Parse a logical identifier, recovering the interface version and the node
/// path it was derived from under the given offset.
pub fn parse_identifier(identifier: &str, offset: u32) -> Result<ParsedIdentifier, ParseError> {
    let captures = identifier_re().captures(identifier).ok_or(ParseError)?;
    let version = captures[1].to_string();
    let id: u64 = captures[2].parse().map_err(|_| ParseError)?;
    // An id below the offset cannot have been produced by this subsystem.
    let index = id.checked_sub(offset as u64).ok_or(ParseError)?;
    Ok(ParsedIdentifier {
        version,
        node_path: PathBuf::from(format!("{}/{}{}", DEVICE_DIR, NODE_PREFIX, index)),
    })
}
