use super::IoError;
use crate::core::models::template::{
    FormatModifier, SrcLoc, Template, TemplateItem, TextBlock, VarKind, VarRef,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

pub const ESCAPE: char = '\\';
pub const COMMENT: char = '#';

const PUNCTUATION: &str = "(){}=|";
const QUOTES: &str = "\"'";
const MAX_INCLUDE_DEPTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("{loc}: unterminated quotation")]
    UnterminatedQuote { loc: SrcLoc },

    #[error("{loc}: input ended immediately after an escape character")]
    EofAfterEscape { loc: SrcLoc },

    #[error("{loc}: null variable name")]
    EmptyVariableName { loc: SrcLoc },

    #[error("{loc}: incomplete bracketed variable name")]
    UnterminatedVariable { loc: SrcLoc },

    #[error("{loc}: unrecognized format modifier \".{modifier}()\"")]
    UnknownFormatModifier { loc: SrcLoc, modifier: String },

    #[error("{loc}: invalid width in format modifier \"{text}\"")]
    InvalidFormatModifier { loc: SrcLoc, text: String },

    #[error("{loc}: unbalanced parentheses or brackets in expression")]
    UnterminatedExpression { loc: SrcLoc },

    #[error("{loc}: expected {expected}, found \"{found}\"")]
    UnexpectedToken {
        loc: SrcLoc,
        found: String,
        expected: &'static str,
    },

    #[error("{loc}: expected {expected}, but the input ended")]
    UnexpectedEof { loc: SrcLoc, expected: &'static str },

    #[error("{loc}: cannot find file \"{target}\" to include")]
    IncludeNotFound { loc: SrcLoc, target: String },

    #[error("{loc}: files are included more than {MAX_INCLUDE_DEPTH} levels deep")]
    IncludeTooDeep { loc: SrcLoc },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub quoted: bool,
    pub loc: SrcLoc,
}

impl Token {
    pub fn is(&self, text: &str) -> bool {
        !self.quoted && self.text == text
    }
}

#[derive(Debug)]
struct Source {
    name: String,
    dir: Option<PathBuf>,
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Source {
    fn new(name: String, dir: Option<PathBuf>, text: &str) -> Self {
        Self {
            name,
            dir,
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }
}

/// Reads tokens and templates from a stack of sources.
///
/// `import` and `include` push a new source; tokens continue from it until it is
/// exhausted, then from the source that included it. `import` reads a given file
/// at most once, `include` every time it appears.
#[derive(Debug)]
pub struct Lexer {
    sources: Vec<Source>,
    search_path: Vec<PathBuf>,
    seen_files: HashSet<PathBuf>,
}

impl Lexer {
    pub fn from_text(name: &str, text: &str) -> Self {
        Self {
            sources: vec![Source::new(name.to_string(), None, text)],
            search_path: Vec::new(),
            seen_files: HashSet::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, IoError> {
        let text = fs::read_to_string(path).map_err(|e| IoError::new(path, e))?;
        let mut lexer = Self::from_text(&path.display().to_string(), &text);
        if let Some(source) = lexer.sources.last_mut() {
            source.dir = path.parent().map(Path::to_path_buf);
        }
        lexer.seen_files.insert(canonical(path));
        Ok(lexer)
    }

    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn loc(&self) -> SrcLoc {
        match self.sources.last() {
            Some(s) => SrcLoc::new(s.name.clone(), s.line),
            None => SrcLoc::default(),
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let source = self.sources.last_mut()?;
        let c = *source.chars.get(source.pos)?;
        source.pos += 1;
        if c == '\n' {
            source.line += 1;
        }
        Some(c)
    }

    /// Steps back over the character most recently returned by `read_char`.
    fn unread_char(&mut self) {
        if let Some(source) = self.sources.last_mut() {
            if source.pos > 0 {
                source.pos -= 1;
                if source.chars[source.pos] == '\n' {
                    source.line -= 1;
                }
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        let source = self.sources.last()?;
        source.chars.get(source.pos).copied()
    }

    fn peek_non_whitespace(&self) -> Option<char> {
        let source = self.sources.last()?;
        source.chars[source.pos..]
            .iter()
            .copied()
            .find(|c| !c.is_whitespace())
    }

    /// The next token, with `import`/`include` directives handled transparently.
    pub fn next_token(&mut self) -> Result<Option<Token>, super::parser::ParseError> {
        loop {
            match self.read_raw_token()? {
                None => {
                    if self.sources.len() > 1 {
                        if let Some(done) = self.sources.pop() {
                            trace!(file = %done.name, "Finished reading included file.");
                        }
                        continue;
                    }
                    return Ok(None);
                }
                Some(tok) if tok.is("import") || tok.is("include") => {
                    let target = self.read_raw_token()?.ok_or_else(|| LexError::UnexpectedEof {
                        loc: tok.loc.clone(),
                        expected: "a file name",
                    })?;
                    self.open_include(&target.text, tok.is("import"), &tok.loc)?;
                }
                Some(tok) => return Ok(Some(tok)),
            }
        }
    }

    fn open_include(
        &mut self,
        target: &str,
        once: bool,
        loc: &SrcLoc,
    ) -> Result<(), super::parser::ParseError> {
        if self.sources.len() >= MAX_INCLUDE_DEPTH {
            return Err(LexError::IncludeTooDeep { loc: loc.clone() }.into());
        }
        let path = self
            .locate(target)
            .ok_or_else(|| LexError::IncludeNotFound {
                loc: loc.clone(),
                target: target.to_string(),
            })?;
        let first_time = self.seen_files.insert(canonical(&path));
        if once && !first_time {
            debug!(file = %path.display(), "Skipping file that was already imported.");
            return Ok(());
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| IoError::new(path.clone(), e).at(loc.clone()))?;
        debug!(file = %path.display(), "Reading included file.");
        let dir = path.parent().map(Path::to_path_buf);
        self.sources
            .push(Source::new(path.display().to_string(), dir, &text));
        Ok(())
    }

    /// Relative names are tried against the including file's directory first and
    /// then against each search-path entry in order.
    fn locate(&self, target: &str) -> Option<PathBuf> {
        let candidate = Path::new(target);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        let local = match self.sources.last().and_then(|s| s.dir.clone()) {
            Some(dir) => dir.join(candidate),
            None => candidate.to_path_buf(),
        };
        std::iter::once(local)
            .chain(self.search_path.iter().map(|dir| dir.join(candidate)))
            .find(|p| p.is_file())
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.read_char() {
            if c == COMMENT {
                while let Some(c) = self.read_char() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if !c.is_whitespace() {
                self.unread_char();
                return;
            }
        }
    }

    fn read_raw_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_whitespace_and_comments();
        let loc = self.loc();
        let Some(first) = self.read_char() else {
            return Ok(None);
        };

        if PUNCTUATION.contains(first) {
            return Ok(Some(Token {
                text: first.to_string(),
                quoted: false,
                loc,
            }));
        }

        let mut text = String::new();
        if QUOTES.contains(first) {
            loop {
                match self.read_char() {
                    None => return Err(LexError::UnterminatedQuote { loc }),
                    Some(ESCAPE) => match self.read_char() {
                        None => return Err(LexError::EofAfterEscape { loc: self.loc() }),
                        Some(c) if c == first || c == ESCAPE => text.push(c),
                        Some(c) => {
                            text.push(ESCAPE);
                            text.push(c);
                        }
                    },
                    Some(c) if c == first => break,
                    Some(c) => text.push(c),
                }
            }
            return Ok(Some(Token {
                text,
                quoted: true,
                loc,
            }));
        }

        self.unread_char();
        while let Some(c) = self.read_char() {
            if c == ESCAPE {
                match self.read_char() {
                    Some(next) => text.push(next),
                    None => return Err(LexError::EofAfterEscape { loc: self.loc() }),
                }
            } else if c == '{' && matches!(text.as_str(), "$" | "@") {
                text.push(c);
                self.read_braced_name(&mut text, &loc)?;
            } else if c.is_whitespace()
                || c == COMMENT
                || PUNCTUATION.contains(c)
                || QUOTES.contains(c)
            {
                self.unread_char();
                break;
            } else {
                text.push(c);
            }
        }
        Ok(Some(Token {
            text,
            quoted: false,
            loc,
        }))
    }

    /// Copies a `${...}` or `@{...}` name into `text` through its matching brace.
    fn read_braced_name(&mut self, text: &mut String, loc: &SrcLoc) -> Result<(), LexError> {
        let mut depth = 1usize;
        while depth > 0 {
            let c = self
                .read_char()
                .ok_or_else(|| LexError::UnterminatedVariable { loc: loc.clone() })?;
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            text.push(c);
        }
        Ok(())
    }

    /// Reads up to the `)` matching an already consumed `(`, returning the text in
    /// between.
    pub fn read_until_close_paren(&mut self) -> Result<String, LexError> {
        let loc = self.loc();
        let mut depth = 1usize;
        let mut out = String::new();
        loop {
            let Some(c) = self.read_char() else {
                return Err(LexError::UnterminatedExpression { loc });
            };
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                }
                _ => {}
            }
            out.push(c);
        }
    }

    /// Reads the expression following `new`: a class path, an optional transform
    /// chain and optional array dimensions, e.g. `Monomer.move(1,0,0) [10].move(2,0,0)`.
    ///
    /// Whitespace is dropped. The expression continues across whitespace only if
    /// the next visible character is `.` or `[`.
    pub fn read_instance_expr(&mut self) -> Result<(String, SrcLoc), LexError> {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.read_char();
        }
        let loc = self.loc();
        let mut out = String::new();
        let mut depth = 0usize;
        while let Some(c) = self.peek_char() {
            if depth == 0 {
                if c.is_whitespace() {
                    if matches!(self.peek_non_whitespace(), Some('.') | Some('[')) {
                        self.read_char();
                        continue;
                    }
                    break;
                }
                if c == '{' || c == '}' || c == COMMENT || QUOTES.contains(c) {
                    break;
                }
            }
            self.read_char();
            match c {
                '(' | '[' => depth += 1,
                ')' | ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| LexError::UnterminatedExpression { loc: loc.clone() })?;
                }
                _ => {}
            }
            if !c.is_whitespace() {
                out.push(c);
            }
        }
        if depth > 0 {
            return Err(LexError::UnterminatedExpression { loc });
        }
        if out.is_empty() {
            return Err(LexError::UnexpectedEof {
                loc,
                expected: "a class name after \"new\"",
            });
        }
        Ok((out, loc))
    }

    /// Splits raw template text into literal blocks and variable references.
    ///
    /// Reading stops at the first unescaped character in `terminators` (returned as
    /// the second element) or at the end of the current source (`None`). Inside a
    /// template a comment does not end the line: `$`, `@` and terminators that
    /// follow a `#` on the same line are kept as literal text.
    pub fn read_template(&mut self, terminators: &str) -> Result<(Template, Option<char>), LexError> {
        let mut items: Template = Vec::new();
        let mut text = String::new();
        let mut text_loc = self.loc();
        let mut pending: Option<PendingVar> = None;
        let mut escaped = false;
        let mut commented = false;

        loop {
            let here = self.loc();
            let Some(c) = self.read_char() else {
                if escaped {
                    return Err(LexError::EofAfterEscape { loc: here });
                }
                match pending.take() {
                    Some(var) => items.push(TemplateItem::Var(var.finish()?)),
                    None => flush_text(&mut items, &mut text, &text_loc),
                }
                return Ok((items, None));
            };

            if let Some(var) = pending.as_mut() {
                if escaped {
                    escaped = false;
                    if removes_escape(c, terminators) || is_var_terminator(c) {
                        var.name.pop();
                    }
                    var.name.push(c);
                    continue;
                }
                if c == ESCAPE {
                    var.name.push(c);
                    escaped = true;
                    continue;
                }
                if var.depth > 0 {
                    match c {
                        '{' => var.depth += 1,
                        '}' => {
                            var.depth -= 1;
                            if var.depth == 0 {
                                var.suffix.push('}');
                                if let Some(done) = pending.take() {
                                    items.push(TemplateItem::Var(done.finish()?));
                                }
                                text_loc = self.loc();
                                continue;
                            }
                        }
                        _ => {}
                    }
                    var.name.push(c);
                    continue;
                }
                if c == '{' && var.name.is_empty() && !var.prefix.ends_with('{') {
                    var.prefix.push('{');
                    var.depth = 1;
                    continue;
                }
                if terminators.contains(c) {
                    if let Some(done) = pending.take() {
                        items.push(TemplateItem::Var(done.finish()?));
                    }
                    return Ok((items, Some(c)));
                }
                if VarKind::from_delim(c).is_some() {
                    if let Some(done) = pending.take() {
                        items.push(TemplateItem::Var(done.finish()?));
                    }
                    pending = Some(PendingVar::new(c, here));
                    continue;
                }
                if is_var_terminator(c) {
                    if let Some(done) = pending.take() {
                        items.push(TemplateItem::Var(done.finish()?));
                    }
                    text_loc = here;
                    text.push(c);
                    if c == '\n' {
                        commented = false;
                    }
                    continue;
                }
                var.name.push(c);
                continue;
            }

            if escaped {
                escaped = false;
                if removes_escape(c, terminators) {
                    text.pop();
                }
                text.push(c);
                continue;
            }
            match c {
                ESCAPE => {
                    text.push(c);
                    escaped = true;
                }
                '\n' => {
                    commented = false;
                    text.push(c);
                }
                COMMENT => {
                    commented = true;
                    text.push(c);
                }
                _ if commented => text.push(c),
                _ if terminators.contains(c) => {
                    flush_text(&mut items, &mut text, &text_loc);
                    return Ok((items, Some(c)));
                }
                _ if VarKind::from_delim(c).is_some() => {
                    flush_text(&mut items, &mut text, &text_loc);
                    pending = Some(PendingVar::new(c, here));
                }
                _ => text.push(c),
            }
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// An escape is dropped when it protects another escape, a brace, a variable
/// delimiter or a terminator; otherwise it stays in the text.
fn removes_escape(c: char, terminators: &str) -> bool {
    c == ESCAPE || c == '{' || c == '}' || VarKind::from_delim(c).is_some() || terminators.contains(c)
}

fn is_var_terminator(c: char) -> bool {
    c.is_whitespace() || "{}(),".contains(c)
}

fn flush_text(items: &mut Template, text: &mut String, loc: &SrcLoc) {
    if !text.is_empty() {
        items.push(TemplateItem::Text(TextBlock {
            text: std::mem::take(text),
            loc: loc.clone(),
        }));
    }
}

struct PendingVar {
    prefix: String,
    name: String,
    suffix: String,
    depth: usize,
    loc: SrcLoc,
}

impl PendingVar {
    fn new(delim: char, loc: SrcLoc) -> Self {
        Self {
            prefix: delim.to_string(),
            name: String::new(),
            suffix: String::new(),
            depth: 0,
            loc,
        }
    }

    fn finish(self) -> Result<VarRef, LexError> {
        if self.depth > 0 {
            return Err(LexError::UnterminatedVariable { loc: self.loc });
        }
        let (descr, modifier) = split_format_modifier(&self.name, &self.loc)?;
        if descr.is_empty() {
            return Err(LexError::EmptyVariableName { loc: self.loc });
        }
        Ok(VarRef {
            prefix: self.prefix,
            descr,
            suffix: self.suffix,
            modifier,
            loc: self.loc,
            binding: None,
        })
    }
}

/// Separates a trailing `.rjust(n)` or `.ljust(n)` from a variable name.
fn split_format_modifier(
    name: &str,
    loc: &SrcLoc,
) -> Result<(String, Option<FormatModifier>), LexError> {
    let Some(inner) = name.strip_suffix(')') else {
        return Ok((name.to_string(), None));
    };
    let Some(open) = inner.rfind('(') else {
        return Ok((name.to_string(), None));
    };
    let head = &inner[..open];
    let Some(dot) = head.rfind('.') else {
        return Ok((name.to_string(), None));
    };
    let method = &head[dot + 1..];
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Ok((name.to_string(), None));
    }
    let arg = inner[open + 1..].trim();
    let width = || {
        arg.parse::<usize>()
            .map_err(|_| LexError::InvalidFormatModifier {
                loc: loc.clone(),
                text: name[dot..].to_string(),
            })
    };
    let modifier = match method {
        "rjust" => FormatModifier::RightJustify(width()?),
        "ljust" => FormatModifier::LeftJustify(width()?),
        other => {
            return Err(LexError::UnknownFormatModifier {
                loc: loc.clone(),
                modifier: other.to_string(),
            });
        }
    };
    Ok((head[..dot].to_string(), Some(modifier)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn text_of(items: &Template) -> Vec<String> {
        items
            .iter()
            .map(|i| match i {
                TemplateItem::Text(t) => format!("T:{}", t.text),
                TemplateItem::Var(v) => format!("V:{}", v.source_text()),
            })
            .collect()
    }

    fn tokens(src: &str) -> Vec<String> {
        let mut lexer = Lexer::from_text("tok.lt", src);
        let mut out = Vec::new();
        while let Some(tok) = lexer.next_token().unwrap() {
            out.push(tok.text);
        }
        out
    }

    mod token_stream {
        use super::*;

        #[test]
        fn punctuation_splits_words() {
            assert_eq!(
                tokens("write(\"Data Atoms\") {"),
                vec!["write", "(", "Data Atoms", ")", "{"]
            );
        }

        #[test]
        fn braced_variables_are_single_tokens() {
            assert_eq!(
                tokens("assign ${atom:x} 5\ncategory @{atom}(3)"),
                vec!["assign", "${atom:x}", "5", "category", "@{atom}", "(", "3", ")"]
            );
        }

        #[test]
        fn unclosed_braced_variable_token_is_an_error() {
            let mut lexer = Lexer::from_text("tok.lt", "assign ${atom:x 5");
            lexer.next_token().unwrap();
            assert!(lexer.next_token().is_err());
        }

        #[test]
        fn comments_are_skipped() {
            assert_eq!(tokens("a # b c\n d"), vec!["a", "d"]);
        }

        #[test]
        fn word_escapes_keep_the_next_character() {
            assert_eq!(tokens("a\\ b c"), vec!["a b", "c"]);
        }

        #[test]
        fn unterminated_quote_is_an_error() {
            let mut lexer = Lexer::from_text("q.lt", "\"abc");
            let err = lexer.next_token().unwrap_err();
            assert!(err.to_string().contains("unterminated quotation"));
        }

        #[test]
        fn token_locations_track_lines() {
            let mut lexer = Lexer::from_text("l.lt", "a\n\nb");
            lexer.next_token().unwrap();
            let b = lexer.next_token().unwrap().unwrap();
            assert_eq!(b.loc, SrcLoc::new("l.lt", 3));
        }
    }

    mod includes {
        use super::*;

        #[test]
        fn include_splices_tokens_from_another_file() {
            let dir = tempfile::tempdir().unwrap();
            let inc = dir.path().join("inner.lt");
            std::fs::File::create(&inc)
                .unwrap()
                .write_all(b"x y")
                .unwrap();
            let main = dir.path().join("main.lt");
            std::fs::write(&main, "a include \"inner.lt\" b").unwrap();

            let mut lexer = Lexer::from_file(&main).unwrap();
            let mut out = Vec::new();
            while let Some(tok) = lexer.next_token().unwrap() {
                out.push(tok.text);
            }
            assert_eq!(out, vec!["a", "x", "y", "b"]);
        }

        #[test]
        fn import_reads_a_file_only_once() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("once.lt"), "z").unwrap();
            let main = dir.path().join("main.lt");
            std::fs::write(&main, "import once.lt import once.lt include once.lt").unwrap();

            let mut lexer = Lexer::from_file(&main).unwrap();
            let mut out = Vec::new();
            while let Some(tok) = lexer.next_token().unwrap() {
                out.push(tok.text);
            }
            assert_eq!(out, vec!["z", "z"]);
        }

        #[test]
        fn search_path_is_consulted_after_the_local_directory() {
            let lib = tempfile::tempdir().unwrap();
            std::fs::write(lib.path().join("ff.lt"), "ff").unwrap();
            let mut lexer = Lexer::from_text("main.lt", "import \"ff.lt\"")
                .with_search_path(vec![lib.path().to_path_buf()]);
            assert_eq!(lexer.next_token().unwrap().unwrap().text, "ff");
        }

        #[test]
        fn missing_include_reports_location() {
            let mut lexer = Lexer::from_text("main.lt", "\n\nimport nowhere.lt");
            let err = lexer.next_token().unwrap_err();
            assert!(
                err.to_string()
                    .starts_with("\"main.lt\", line 3: cannot find file \"nowhere.lt\"")
            );
        }
    }

    mod templates {
        use super::*;

        fn template(src: &str) -> (Template, Option<char>) {
            Lexer::from_text("tmpl.lt", src).read_template("}").unwrap()
        }

        #[test]
        fn splits_text_and_variables() {
            let (items, term) = template("  $atom:C1 $mol:. @atom:C 0 0 0\n}");
            assert_eq!(term, Some('}'));
            assert_eq!(
                text_of(&items),
                vec![
                    "T:  ",
                    "V:$atom:C1",
                    "T: ",
                    "V:$mol:.",
                    "T: ",
                    "V:@atom:C",
                    "T: 0 0 0\n"
                ]
            );
        }

        #[test]
        fn escaped_delimiters_and_braces_stay_literal() {
            let (items, term) = template("abc \\$def \\{ghi\\}");
            assert_eq!(term, None);
            assert_eq!(text_of(&items), vec!["T:abc $def {ghi}"]);
        }

        #[test]
        fn escape_before_ordinary_character_is_kept() {
            let (items, _) = template("a\\nb}");
            assert_eq!(text_of(&items), vec!["T:a\\nb"]);
        }

        #[test]
        fn braced_variable_may_contain_spaces_and_nested_braces() {
            let (items, _) = template("${atom:a b{c}}x}");
            let v = items[0].as_var().unwrap();
            assert_eq!(v.descr, "atom:a b{c}");
            assert!(v.is_braced());
            assert_eq!(text_of(&items)[1], "T:x");
        }

        #[test]
        fn adjacent_variables_split_at_the_delimiter() {
            let (items, _) = template("$a$b}");
            assert_eq!(text_of(&items), vec!["V:$a", "V:$b"]);
        }

        #[test]
        fn variable_ends_at_the_template_terminator() {
            let (items, term) = template("$atom:x}tail");
            assert_eq!(text_of(&items), vec!["V:$atom:x"]);
            assert_eq!(term, Some('}'));
        }

        #[test]
        fn comment_protects_delimiters_until_end_of_line() {
            let (items, term) = template("1 # cost $5 }\n$x}");
            assert_eq!(text_of(&items), vec!["T:1 # cost $5 }\n", "V:$x"]);
            assert_eq!(term, Some('}'));
        }

        #[test]
        fn justify_modifier_is_extracted() {
            let (items, _) = template("${atom:C.rjust(6)}}");
            let v = items[0].as_var().unwrap();
            assert_eq!(v.descr, "atom:C");
            assert_eq!(v.modifier, Some(FormatModifier::RightJustify(6)));
        }

        #[test]
        fn unknown_modifier_is_fatal() {
            let err = Lexer::from_text("m.lt", "${atom:C.center(6)}")
                .read_template("}")
                .unwrap_err();
            assert!(matches!(err, LexError::UnknownFormatModifier { modifier, .. } if modifier == "center"));
        }

        #[test]
        fn null_variable_name_is_fatal() {
            let err = Lexer::from_text("n.lt", "a $ b}").read_template("}").unwrap_err();
            assert!(matches!(err, LexError::EmptyVariableName { .. }));
            let err = Lexer::from_text("n.lt", "${}").read_template("}").unwrap_err();
            assert!(matches!(err, LexError::EmptyVariableName { .. }));
        }

        #[test]
        fn incomplete_braced_variable_is_fatal() {
            let err = Lexer::from_text("b.lt", "${atom:C").read_template("}").unwrap_err();
            assert!(matches!(err, LexError::UnterminatedVariable { .. }));
        }

        #[test]
        fn escape_at_end_of_input_is_fatal() {
            let err = Lexer::from_text("e.lt", "abc\\").read_template("}").unwrap_err();
            assert!(matches!(err, LexError::EofAfterEscape { .. }));
        }

        #[test]
        fn variable_locations_point_at_the_delimiter() {
            let (items, _) = template("\n\n  $x}");
            assert_eq!(items[1].as_var().unwrap().loc.line, 3);
        }
    }

    mod expressions {
        use super::*;

        #[test]
        fn instance_expression_spans_array_suffixes() {
            let mut lexer = Lexer::from_text("e.lt", " Mono.move(1, 0,0)\n   [3].move(2,0,0) next");
            let (expr, _) = lexer.read_instance_expr().unwrap();
            assert_eq!(expr, "Mono.move(1,0,0)[3].move(2,0,0)");
            assert_eq!(lexer.next_token().unwrap().unwrap().text, "next");
        }

        #[test]
        fn instance_expression_stops_before_a_body() {
            let mut lexer = Lexer::from_text("e.lt", "Mono {");
            let (expr, _) = lexer.read_instance_expr().unwrap();
            assert_eq!(expr, "Mono");
            assert_eq!(lexer.next_token().unwrap().unwrap().text, "{");
        }

        #[test]
        fn close_paren_reader_handles_nesting() {
            let mut lexer = Lexer::from_text("p.lt", ".rot(90,0,0,1).move(1,2,3)) rest");
            assert_eq!(
                lexer.read_until_close_paren().unwrap(),
                ".rot(90,0,0,1).move(1,2,3)"
            );
        }
    }
}
