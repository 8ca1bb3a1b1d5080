//! Splits a `.prsd` container document into its fenced Prescribe code blocks
//! (`spec.md` §6). A block is delimited by a line whose trimmed content is
//! exactly `:::prescribe` and a line whose trimmed content is exactly `:::`;
//! prose outside fences is discarded. A document with no fences at all is
//! treated as a single block containing the whole text.
//!
//! Deliberately trivial: this is one of the out-of-scope "thin shell"
//! collaborators named in `spec.md` §1, so it gets plain line-scanning, no
//! parser dependency.

/// One source block extracted from a container document, with the 1-based
/// line number its content starts at (for diagnostics to report the right
/// line number within the overall document rather than within the block).
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub source: String,
    pub start_line: usize,
}

const FENCE_OPEN: &str = ":::prescribe";
const FENCE_CLOSE: &str = ":::";

/// Extracts the fenced blocks from a `.prsd` document. Returns one block
/// (the whole document, starting at line 1) if no fence line is present.
pub fn split_blocks(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text.lines().collect();
    if !lines.iter().any(|l| l.trim() == FENCE_OPEN) {
        return vec![Block {
            source: text.to_string(),
            start_line: 1,
        }];
    }

    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if lines[i].trim() == FENCE_OPEN {
            let start_line = i + 2; // content begins on the line after the fence
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && lines[i].trim() != FENCE_CLOSE {
                body.push(lines[i]);
                i += 1;
            }
            // an unterminated fence still yields whatever content was collected
            blocks.push(Block {
                source: body.join("\n"),
                start_line,
            });
        }
        i += 1;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fences_is_one_block() {
        let blocks = split_blocks("PROGRAM P\nENDPROGRAM\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].start_line, 1);
    }

    #[test]
    fn test_single_fenced_block() {
        let text = "prose\n:::prescribe\nPROGRAM P\nENDPROGRAM\n:::\nmore prose\n";
        let blocks = split_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "PROGRAM P\nENDPROGRAM");
        assert_eq!(blocks[0].start_line, 3);
    }

    #[test]
    fn test_multiple_fenced_blocks_in_order() {
        let text = ":::prescribe\nA\n:::\ntext\n:::prescribe\nB\n:::\n";
        let blocks = split_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].source, "A");
        assert_eq!(blocks[1].source, "B");
    }

    #[test]
    fn test_unterminated_fence_yields_remaining_content() {
        let text = ":::prescribe\nPROGRAM P\nOUTPUT 1\n";
        let blocks = split_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "PROGRAM P\nOUTPUT 1");
    }
}
