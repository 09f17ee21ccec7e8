//! Maps byte offsets to line and column positions for diagnostic rendering.

/// Byte offsets of line starts. `\n`, `\r` and `\r\n` all end a line.
pub struct LineMap {
    lines: Vec<u32>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LinePos {
    /// zero-based line index
    pub line: u32,
    /// zero-based byte offset within the line
    pub column: u32,
}

impl LineMap {
    pub fn new(src: &str) -> LineMap {
        assert!(src.len() <= u32::MAX as usize);
        let mut lines = vec![0];
        let mut bytes = src.bytes().enumerate();
        while let Some((mut i, byte)) = bytes.next() {
            match byte {
                b'\n' | b'\r' => {
                    if byte == b'\r' {
                        if let Some((next_i, b'\n')) = bytes.clone().next() {
                            bytes.next();
                            i = next_i;
                        }
                    }
                    lines.push(i as u32 + 1);
                }
                _ => {}
            }
        }
        LineMap { lines }
    }

    /// The position of `offset`, clamped to the end of the source.
    pub fn offset_to_pos(&self, src: &str, offset: u32) -> LinePos {
        let offset = u32::min(offset, src.len() as u32);
        let line = self.lines.partition_point(|&start| start <= offset) - 1;
        LinePos {
            line: line as u32,
            column: offset - self.lines[line],
        }
    }

    /// The content of a line, without its terminator.
    pub fn line_text<'a>(&self, src: &'a str, line: u32) -> &'a str {
        let start = self.lines[line as usize] as usize;
        let end = match self.lines.get(line as usize + 1) {
            Some(&next) => {
                let mut end = next as usize;
                while end > start && matches!(src.as_bytes()[end - 1], b'\n' | b'\r') {
                    end -= 1;
                }
                end
            }
            None => src.len(),
        };
        &src[start..end]
    }
}
