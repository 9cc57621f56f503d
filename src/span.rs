/// A byte range inside an IR interchange document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    pub fn is_dummy(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }

    /// Find the first occurrence of `"needle"` (as a quoted JSON string)
    /// in `source` and return its span, quotes included.
    ///
    /// IR documents carry no position information once deserialized, so
    /// diagnostics point back at the document by searching for the name
    /// they are about.
    pub fn locate(source: &str, needle: &str) -> Option<Span> {
        let quoted = format!("\"{}\"", needle);
        let start = source.find(&quoted)?;
        let end = start + quoted.len();
        Some(Span::new(start as u32, end as u32))
    }
}
