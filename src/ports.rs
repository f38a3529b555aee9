use crate::error::ValidationError;

/// Largest span a single scan may cover.
pub const DEFAULT_MAX_RANGE: u32 = 10_000;

/// A validated inclusive TCP port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Validate `start..=end` against the port space and a maximum span.
    ///
    /// Bounds arrive as `u32` so out-of-range inputs such as `65536` are rejected
    /// here with a range error instead of being truncated by the caller.
    pub fn new(start: u32, end: u32, max_span: u32) -> Result<Self, ValidationError> {
        let start_port = check_port(start)?;
        let end_port = check_port(end)?;
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        let len = end - start + 1;
        if len > max_span {
            return Err(ValidationError::RangeTooLarge { len, max: max_span });
        }
        Ok(Self {
            start: start_port,
            end: end_port,
        })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn len(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

/// Parse `80` or `8000-8010` into validated inclusive bounds.
///
/// Whitespace around either bound is ignored.
pub fn parse_range_str(s: &str, max_span: u32) -> Result<PortRange, ValidationError> {
    let line = s.trim();
    if line.is_empty() {
        return Err(ValidationError::Syntax("empty port range".into()));
    }
    let (a, b) = line.split_once('-').unwrap_or((line, line));
    let start = parse_port_str(a.trim())?;
    let end = parse_port_str(b.trim())?;
    PortRange::new(start, end, max_span)
}

fn parse_port_str(s: &str) -> Result<u32, ValidationError> {
    s.parse::<u32>()
        .map_err(|e| ValidationError::Syntax(format!("{s:?}: {e}")))
}

fn check_port(port: u32) -> Result<u16, ValidationError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ValidationError::PortOutOfRange { port }),
    }
}
