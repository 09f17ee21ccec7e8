use crate::{FailKind, Failure};

/// Decodes the UTF-8 codepoint at the start of `bytes`, returning the scalar
/// and its encoded length.
pub fn decode_utf8(bytes: &[u8]) -> Option<(char, u32)> {
    let first = *bytes.first()?;
    let len = match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return None,
    };
    if bytes.len() < len {
        return None;
    }
    let str = std::str::from_utf8(&bytes[..len]).ok()?;
    let char = str.chars().next()?;
    Some((char, len as u32))
}

/// A set of Unicode scalar values stored as sorted inclusive ranges.
pub struct CharSet {
    ranges: std::borrow::Cow<'static, [(u32, u32)]>,
}

impl CharSet {
    /// Ranges must already be sorted by their lower bound.
    pub const fn borrowed(ranges: &'static [(u32, u32)]) -> CharSet {
        CharSet {
            ranges: std::borrow::Cow::Borrowed(ranges),
        }
    }

    pub fn new(mut ranges: Vec<(u32, u32)>) -> CharSet {
        ranges.sort_unstable();
        CharSet {
            ranges: std::borrow::Cow::Owned(ranges),
        }
    }

    pub fn contains(&self, char: char) -> bool {
        let value = char as u32;
        // ranges may overlap, so a binary search over lower bounds is not
        // enough; sets stay small in practice
        self.ranges.iter().any(|&(lo, hi)| lo <= value && value <= hi)
    }

    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }
}

/// The character-property predicates of the grammar language.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[rustfmt::skip]
pub enum CharProperty {
    Alnum, Alpha, Ascii, Control, Ddigit, Digit, Graph,
    Lower, Print, Punct, Space, Upper, Wordchar, Xdigit,
}

impl CharProperty {
    pub fn from_name(name: &[u8]) -> Option<CharProperty> {
        let property = match name {
            b"alnum" => CharProperty::Alnum,
            b"alpha" => CharProperty::Alpha,
            b"ascii" => CharProperty::Ascii,
            b"control" => CharProperty::Control,
            b"ddigit" => CharProperty::Ddigit,
            b"digit" => CharProperty::Digit,
            b"graph" => CharProperty::Graph,
            b"lower" => CharProperty::Lower,
            b"print" => CharProperty::Print,
            b"punct" => CharProperty::Punct,
            b"space" => CharProperty::Space,
            b"upper" => CharProperty::Upper,
            b"wordchar" => CharProperty::Wordchar,
            b"xdigit" => CharProperty::Xdigit,
            _ => return None,
        };
        Some(property)
    }

    pub fn contains(self, char: char) -> bool {
        match self {
            CharProperty::Alnum => char.is_alphanumeric(),
            CharProperty::Alpha => char.is_alphabetic(),
            CharProperty::Ascii => char.is_ascii(),
            CharProperty::Control => char.is_control(),
            CharProperty::Ddigit => char.is_ascii_digit(),
            CharProperty::Digit => char.is_numeric(),
            CharProperty::Graph => !char.is_whitespace() && !char.is_control(),
            CharProperty::Lower => char.is_lowercase(),
            CharProperty::Print => !char.is_control(),
            CharProperty::Punct => char.is_ascii_punctuation(),
            CharProperty::Space => char.is_whitespace(),
            CharProperty::Upper => char.is_uppercase(),
            CharProperty::Wordchar => char.is_alphanumeric() || char == '_',
            CharProperty::Xdigit => char.is_ascii_hexdigit(),
        }
    }
}

/// A cursor over the input bytes. Matchers advance it on success and leave it
/// untouched on failure; combinators restore it wholesale through
/// [`Backtrack`]. The cursor also owns the rule-name stack and the list of
/// failures at the furthest position reached, which parse reports are built
/// from.
pub struct Cursor<'a> {
    src: &'a [u8],
    pos: u32,
    furthest: u32,
    rule_stack: Vec<&'static str>,
    failures: Vec<Failure>,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a [u8]) -> Cursor<'a> {
        assert!(src.len() <= u32::MAX as usize);
        Cursor {
            src,
            pos: 0,
            furthest: 0,
            rule_stack: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn src(&self) -> &'a [u8] {
        self.src
    }

    pub fn pos(&self) -> u32 {
        self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos as usize == self.src.len()
    }

    pub fn mark(&self) -> u32 {
        self.pos
    }

    pub fn reset(&mut self, mark: u32) {
        debug_assert!(mark as usize <= self.src.len());
        self.pos = mark;
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.src.get(self.pos as usize).copied()
    }

    pub fn peek_char(&self) -> Option<(char, u32)> {
        decode_utf8(&self.src[self.pos as usize..])
    }

    pub fn bump(&mut self, count: u32) {
        debug_assert!((self.pos + count) as usize <= self.src.len());
        self.pos += count;
    }

    pub fn push_rule(&mut self, name: &'static str) {
        self.rule_stack.push(name);
    }

    pub fn pop_rule(&mut self) {
        self.rule_stack.pop();
    }

    /// Records a failure at the current position and returns its kind.
    ///
    /// Only failures at the furthest position reached so far are retained;
    /// reaching a new furthest position discards the older entries.
    pub fn fail(&mut self, kind: FailKind) -> FailKind {
        if self.pos > self.furthest {
            self.furthest = self.pos;
            self.failures.clear();
        }
        if self.pos == self.furthest {
            self.failures.push(Failure {
                pos: self.pos,
                kind,
                rules: self.rule_stack.clone(),
            });
        }
        kind
    }

    pub fn furthest(&self) -> u32 {
        self.furthest
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    fn fail_here(&mut self) -> FailKind {
        let kind = match self.is_eof() {
            true => FailKind::UnexpectedEof,
            false => FailKind::UnexpectedChar,
        };
        self.fail(kind)
    }

    /// Succeeds iff the input at the cursor starts with `prefix`.
    pub fn match_bytes(&mut self, prefix: &[u8]) -> Result<(), FailKind> {
        if self.src[self.pos as usize..].starts_with(prefix) {
            self.pos += prefix.len() as u32;
            Ok(())
        } else {
            Err(self.fail_here())
        }
    }

    /// Matches any single codepoint.
    pub fn match_any(&mut self) -> Result<char, FailKind> {
        match self.peek_char() {
            Some((char, len)) => {
                self.pos += len;
                Ok(char)
            }
            None => Err(self.fail_here()),
        }
    }

    /// Matches a single codepoint contained in `set`.
    pub fn match_class(&mut self, set: &CharSet) -> Result<char, FailKind> {
        match self.peek_char() {
            Some((char, len)) if set.contains(char) => {
                self.pos += len;
                Ok(char)
            }
            _ => Err(self.fail_here()),
        }
    }

    /// Matches a single codepoint satisfying `property`.
    pub fn match_property(&mut self, property: CharProperty) -> Result<char, FailKind> {
        match self.peek_char() {
            Some((char, len)) if property.contains(char) => {
                self.pos += len;
                Ok(char)
            }
            _ => Err(self.fail_here()),
        }
    }
}

#[test]
fn test_decode_utf8() {
    assert_eq!(decode_utf8(b"a rest"), Some(('a', 1)));
    assert_eq!(decode_utf8("é".as_bytes()), Some(('é', 2)));
    assert_eq!(decode_utf8("👍x".as_bytes()), Some(('👍', 4)));
    assert_eq!(decode_utf8(b""), None);
    // a lone continuation byte is not a codepoint
    assert_eq!(decode_utf8(&[0x80]), None);
    // a truncated two-byte sequence
    assert_eq!(decode_utf8(&[0xc3]), None);
}

#[test]
fn test_char_set() {
    let set = CharSet::new(vec![(b'a' as u32, b'c' as u32), (b'0' as u32, b'9' as u32)]);
    for char in ['a', 'b', 'c', '0', '5', '9'] {
        assert!(set.contains(char), "{char}");
    }
    for char in ['d', '`', '/', ':', 'A'] {
        assert!(!set.contains(char), "{char}");
    }

    let empty = CharSet::new(Vec::new());
    assert!(!empty.contains('a'));
}

#[test]
fn test_char_property() {
    assert!(CharProperty::Ddigit.contains('7'));
    assert!(!CharProperty::Ddigit.contains('x'));
    assert!(CharProperty::Wordchar.contains('_'));
    assert!(CharProperty::Space.contains('\t'));
    assert!(CharProperty::Xdigit.contains('F'));
    assert!(!CharProperty::Xdigit.contains('g'));
    assert_eq!(CharProperty::from_name(b"graph"), Some(CharProperty::Graph));
    assert_eq!(CharProperty::from_name(b"bogus"), None);
}

#[test]
fn test_match_bytes_restores_nothing_on_fail() {
    let mut c = Cursor::new(b"abc");
    assert!(c.match_bytes(b"ab").is_ok());
    assert_eq!(c.pos(), 2);
    assert!(c.match_bytes(b"x").is_err());
    assert_eq!(c.pos(), 2);
    assert!(c.match_bytes(b"c").is_ok());
    assert!(c.is_eof());
    assert_eq!(c.match_bytes(b"c"), Err(FailKind::UnexpectedEof));
}

#[test]
fn test_furthest_failure_retention() {
    let mut c = Cursor::new(b"abc");
    c.push_rule("First");
    _ = c.match_bytes(b"x");
    c.pop_rule();

    _ = c.match_bytes(b"ab");
    c.push_rule("Second");
    _ = c.match_bytes(b"x");
    c.pop_rule();

    // only the failure at position 2 survives
    assert_eq!(c.furthest(), 2);
    assert_eq!(c.failures().len(), 1);
    assert_eq!(c.failures()[0].rules, &["Second"]);
}
