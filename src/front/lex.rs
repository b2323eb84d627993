//! The lexer.

use crate::common::Line;
use derive_more::Display;
use regex::Regex;
use std::sync::OnceLock;

/// Tokens in the program.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
    /// 1-based line the token starts on, for diagnostics.
    pub line: Line,
}

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("id")]
    Id,
    #[display("num")]
    Num,
    #[display("int")]
    Int,
    #[display("void")]
    Void,
    #[display("if")]
    If,
    #[display("else")]
    Else,
    #[display("while")]
    While,
    #[display("break")]
    Break,
    #[display("continue")]
    Continue,
    #[display("return")]
    Return,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display(",")]
    Comma,
    #[display(";")]
    Semi,
    #[display("==")]
    EqEq,
    #[display("!=")]
    NotEq,
    #[display("<=")]
    Le,
    #[display(">=")]
    Ge,
    #[display("&&")]
    AndAnd,
    #[display("||")]
    OrOr,
    #[display("=")]
    Assign,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("!")]
    Not,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Percent,
}

pub struct LexError(pub usize, pub char);

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lexer error: unexpected character {:?} at {}", self.1, self.0)
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lexer error: unexpected character {:?} at {}", self.1, self.0)
    }
}

/// Lazily-built, process-wide matcher table: each matcher is tried in
/// order at the current position, and the first one that matches wins.
/// Keywords are listed ahead of the identifier pattern, anchored with a
/// trailing word boundary, so `intx` lexes as an identifier while `int`
/// lexes as the keyword.
fn matchers() -> &'static [(Regex, TokenKind)] {
    static MATCHERS: OnceLock<Vec<(Regex, TokenKind)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        use TokenKind::*;
        let specs: &[(&str, TokenKind)] = &[
            (r"\Aint\b", Int),
            (r"\Avoid\b", Void),
            (r"\Aif\b", If),
            (r"\Aelse\b", Else),
            (r"\Awhile\b", While),
            (r"\Abreak\b", Break),
            (r"\Acontinue\b", Continue),
            (r"\Areturn\b", Return),
            (r"\A[A-Za-z_][A-Za-z0-9_]*", Id),
            (r"\A[0-9]+", Num),
            (r"\A==", EqEq),
            (r"\A!=", NotEq),
            (r"\A<=", Le),
            (r"\A>=", Ge),
            (r"\A&&", AndAnd),
            (r"\A\|\|", OrOr),
            (r"\A=", Assign),
            (r"\A<", Lt),
            (r"\A>", Gt),
            (r"\A!", Not),
            (r"\A\+", Plus),
            (r"\A-", Minus),
            (r"\A\*", Mul),
            (r"\A/", Div),
            (r"\A%", Percent),
            (r"\A\(", LParen),
            (r"\A\)", RParen),
            (r"\A\{", LBrace),
            (r"\A\}", RBrace),
            (r"\A\[", LBracket),
            (r"\A\]", RBracket),
            (r"\A,", Comma),
            (r"\A;", Semi),
        ];
        specs
            .iter()
            .map(|(re, kind)| (Regex::new(re).unwrap(), *kind))
            .collect()
    })
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: Line,
    whitespace: Regex,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Lexer {
            input,
            pos: 0,
            line: 1,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://[^\n]*))*").unwrap(),
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    // Skip comments and whitespace, advancing the line counter past any
    // newlines consumed.
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            let consumed = &self.input[self.pos..self.pos + m.end()];
            self.line += consumed.matches('\n').count() as Line;
            self.pos += m.end();
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }
        let rest = &self.input[self.pos..];
        for (re, kind) in matchers() {
            if let Some(m) = re.find(rest) {
                let text = m.as_str();
                let token = Token {
                    kind: *kind,
                    text,
                    line: self.line,
                };
                self.pos += text.len();
                return Ok(Some(token));
            }
        }
        let bad_char = rest.chars().next().unwrap();
        Err(LexError(self.pos, bad_char))
    }

    /// Lex the entire input eagerly, for callers (the parser, `-S Tokens`
    /// output) that want a plain slice rather than a pull-based stream.
    pub fn tokenize(mut self) -> Result<Vec<Token<'input>>, LexError> {
        let mut out = vec![];
        while let Some(tok) = self.next()? {
            out.push(tok);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keyword_vs_identifier_prefix() {
        assert_eq!(kinds("int intx"), vec![Int, Id]);
    }

    #[test]
    fn multi_char_operators_take_priority() {
        assert_eq!(kinds("a == b != c"), vec![Id, EqEq, Id, NotEq, Id]);
        assert_eq!(kinds("a && b || !c"), vec![Id, AndAnd, Id, OrOr, Not, Id]);
    }

    #[test]
    fn line_tracking_across_comments_and_newlines() {
        let toks = Lexer::new("int a; // comment\nint b;").tokenize().unwrap();
        let lines: Vec<Line> = toks.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn unexpected_character_is_an_error() {
        assert!(Lexer::new("int a = @;").tokenize().is_err());
    }
}
