/// Splits streamed output into complete lines
///
/// Chunks may end anywhere, including in the middle of a line. Text after
/// the last newline is kept as a residual until a later chunk completes it.
#[derive(Debug, Default)]
pub struct OutputLineBuffer {
    lines: Vec<String>,
    residual: String,
}

impl OutputLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk, returning the lines it completed (in order)
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        if !chunk.contains('\n') {
            self.residual.push_str(chunk);
            return Vec::new();
        }

        self.residual.push_str(chunk);
        let combined = std::mem::take(&mut self.residual);
        let mut parts: Vec<&str> = combined.split('\n').collect();
        // split always yields at least one part; the last is the new residual
        self.residual = parts.pop().unwrap_or_default().to_string();

        let completed: Vec<String> = parts.into_iter().map(str::to_string).collect();
        self.lines.extend(completed.iter().cloned());
        completed
    }

    /// Flush a non-empty residual as a final line (used when the stream ends)
    pub fn finish(&mut self) -> Option<String> {
        if self.residual.is_empty() {
            return None;
        }
        let last = std::mem::take(&mut self.residual);
        self.lines.push(last.clone());
        Some(last)
    }

    /// Every complete line emitted so far
    pub fn snapshot(&self) -> &[String] {
        &self.lines
    }

    #[allow(dead_code)] // Only the line-reconstruction tests need the raw tail
    pub fn residual(&self) -> &str {
        &self.residual
    }
}
