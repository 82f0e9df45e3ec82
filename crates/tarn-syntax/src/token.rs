//! Token definitions for the Tarn lexer.
//!
//! Newlines are significant (they separate statements), so horizontal
//! whitespace is skipped but `\n` is a token. Numeric literals carry their
//! decoded value; the suffixes `U`, `L` and `UL` select the unsigned and
//! 64-bit integer types.

use logos::Logos;

use crate::ParseError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    // Comments
    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"/\*[^*]*\*+([^/*][^*]*\*+)*/", logos::skip)]
    Comment,

    // Statement separator
    #[token("\n")]
    Newline,

    // Keywords
    #[token("val")]
    Val,
    #[token("var")]
    Var,
    #[token("fun")]
    Fun,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("const")]
    Const,
    #[token("struct")]
    Struct,
    #[token("sizeof")]
    SizeOf,
    #[token("as")]
    As,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    // Operators
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token("||")]
    OrOr,
    #[token("&&")]
    AndAnd,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("&")]
    Amp,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    // Literals. The unsuffixed integer form is `Int`; suffixes pick the
    // wider/unsigned types and are stripped before parsing the digits.
    #[regex(r"[0-9]+UL", |lex| { let s = lex.slice(); s[..s.len() - 2].parse::<u64>().ok() })]
    ULong(u64),

    #[regex(r"[0-9]+U", |lex| { let s = lex.slice(); s[..s.len() - 1].parse::<u32>().ok() })]
    UInt(u32),

    #[regex(r"[0-9]+L", |lex| { let s = lex.slice(); s[..s.len() - 1].parse::<i64>().ok() })]
    Long(i64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i32>().ok())]
    Int(i32),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Double(f64),

    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),

    #[regex(r"'([^'\\\n]|\\u[0-9a-fA-F]{4}|\\.)'", |lex| unescape_char(lex.slice()))]
    Char(u16),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape_string(lex.slice()))]
    Str(String),

    // Identifiers
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| Some(lex.slice().to_string()))]
    Ident(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Comment => write!(f, "comment"),
            Token::Newline => write!(f, "newline"),
            Token::Val => write!(f, "`val`"),
            Token::Var => write!(f, "`var`"),
            Token::Fun => write!(f, "`fun`"),
            Token::Return => write!(f, "`return`"),
            Token::If => write!(f, "`if`"),
            Token::Else => write!(f, "`else`"),
            Token::While => write!(f, "`while`"),
            Token::Do => write!(f, "`do`"),
            Token::Const => write!(f, "`const`"),
            Token::Struct => write!(f, "`struct`"),
            Token::SizeOf => write!(f, "`sizeof`"),
            Token::As => write!(f, "`as`"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
            Token::LBrace => write!(f, "`{{`"),
            Token::RBrace => write!(f, "`}}`"),
            Token::Colon => write!(f, "`:`"),
            Token::Comma => write!(f, "`,`"),
            Token::Dot => write!(f, "`.`"),
            Token::Eq => write!(f, "`=`"),
            Token::PlusEq => write!(f, "`+=`"),
            Token::MinusEq => write!(f, "`-=`"),
            Token::StarEq => write!(f, "`*=`"),
            Token::SlashEq => write!(f, "`/=`"),
            Token::PercentEq => write!(f, "`%=`"),
            Token::AmpEq => write!(f, "`&=`"),
            Token::PipeEq => write!(f, "`|=`"),
            Token::CaretEq => write!(f, "`^=`"),
            Token::ShlEq => write!(f, "`<<=`"),
            Token::ShrEq => write!(f, "`>>=`"),
            Token::OrOr => write!(f, "`||`"),
            Token::AndAnd => write!(f, "`&&`"),
            Token::Pipe => write!(f, "`|`"),
            Token::Caret => write!(f, "`^`"),
            Token::Amp => write!(f, "`&`"),
            Token::EqEq => write!(f, "`==`"),
            Token::NotEq => write!(f, "`!=`"),
            Token::Lt => write!(f, "`<`"),
            Token::LtEq => write!(f, "`<=`"),
            Token::Gt => write!(f, "`>`"),
            Token::GtEq => write!(f, "`>=`"),
            Token::Shl => write!(f, "`<<`"),
            Token::Shr => write!(f, "`>>`"),
            Token::Plus => write!(f, "`+`"),
            Token::Minus => write!(f, "`-`"),
            Token::Star => write!(f, "`*`"),
            Token::Slash => write!(f, "`/`"),
            Token::Percent => write!(f, "`%`"),
            Token::Tilde => write!(f, "`~`"),
            Token::Bang => write!(f, "`!`"),
            Token::PlusPlus => write!(f, "`++`"),
            Token::MinusMinus => write!(f, "`--`"),
            Token::ULong(v) => write!(f, "integer literal `{}UL`", v),
            Token::UInt(v) => write!(f, "integer literal `{}U`", v),
            Token::Long(v) => write!(f, "integer literal `{}L`", v),
            Token::Int(v) => write!(f, "integer literal `{}`", v),
            Token::Double(v) => write!(f, "float literal `{}`", v),
            Token::Bool(v) => write!(f, "`{}`", v),
            Token::Char(_) => write!(f, "character literal"),
            Token::Str(_) => write!(f, "string literal"),
            Token::Ident(name) => write!(f, "identifier `{}`", name),
        }
    }
}

/// A token plus the byte range it came from.
#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub value: T,
    pub span: std::ops::Range<usize>,
}

pub type SpannedToken = Spanned<Token>;

/// Tokenizes a whole source string, failing on the first unrecognized or
/// malformed lexeme (bad escape, overflowing literal, stray character).
pub fn tokenize(source: &str) -> crate::Result<Vec<SpannedToken>> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(Spanned {
                value: token,
                span: lexer.span(),
            }),
            Err(()) => {
                let span = lexer.span();
                let (line, column) = line_col(source, span.start);
                return Err(ParseError::InvalidToken {
                    text: source[span].to_string(),
                    line,
                    column,
                });
            }
        }
    }

    Ok(tokens)
}

/// Maps a byte offset to a 1-based (line, column) pair.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

fn unescape_char(slice: &str) -> Option<u16> {
    let body = &slice[1..slice.len() - 1];
    let mut chars = body.chars();
    let c = match chars.next()? {
        '\\' => unescape_sequence(&mut chars)?,
        c => c,
    };
    if chars.next().is_some() {
        return None;
    }
    // Char is a 16-bit code unit; anything outside the BMP does not fit.
    u16::try_from(c as u32).ok()
}

fn unescape_string(slice: &str) -> Option<String> {
    let body = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(unescape_sequence(&mut chars)?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn unescape_sequence(chars: &mut std::str::Chars) -> Option<char> {
    match chars.next()? {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' => Some('\0'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        'u' => {
            let mut code = 0u32;
            for _ in 0..4 {
                code = code * 16 + chars.next()?.to_digit(16)?;
            }
            char::from_u32(code)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_and_operators() {
        let tokens = tokenize("val x = 1 + 2").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(
            kinds,
            vec![
                &Token::Val,
                &Token::Ident("x".to_string()),
                &Token::Eq,
                &Token::Int(1),
                &Token::Plus,
                &Token::Int(2),
            ]
        );
    }

    #[test]
    fn test_integer_suffixes() {
        let tokens = tokenize("1 2U 3L 4UL").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(
            kinds,
            vec![
                &Token::Int(1),
                &Token::UInt(2),
                &Token::Long(3),
                &Token::ULong(4),
            ]
        );
    }

    #[test]
    fn test_float_literals() {
        let tokens = tokenize("1.5 2e3 6.02e23").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(
            kinds,
            vec![
                &Token::Double(1.5),
                &Token::Double(2e3),
                &Token::Double(6.02e23),
            ]
        );
    }

    #[test]
    fn test_plain_integer_stays_int() {
        let tokens = tokenize("123.x").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(
            kinds,
            vec![
                &Token::Int(123),
                &Token::Dot,
                &Token::Ident("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_char_literals() {
        let tokens = tokenize(r"'a' '\n' 'A'").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(
            kinds,
            vec![
                &Token::Char('a' as u16),
                &Token::Char('\n' as u16),
                &Token::Char('A' as u16),
            ]
        );
    }

    #[test]
    fn test_char_outside_bmp_is_rejected() {
        assert!(tokenize("'\u{1F600}'").is_err());
    }

    #[test]
    fn test_string_unescaping() {
        let tokens = tokenize(r#""a\tb!""#).unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(matches!(&tokens[0].value, Token::Str(s) if s == "a\tb!"));
    }

    #[test]
    fn test_newline_is_a_token() {
        let tokens = tokenize("1\n2").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(kinds, vec![&Token::Int(1), &Token::Newline, &Token::Int(2)]);
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("1 // line\n/* block\nstill block */ 2").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(kinds, vec![&Token::Int(1), &Token::Newline, &Token::Int(2)]);
    }

    #[test]
    fn test_compound_operators_lex_longest() {
        let tokens = tokenize("<<= << < && &").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| &t.value).collect();
        assert_eq!(
            kinds,
            vec![
                &Token::ShlEq,
                &Token::Shl,
                &Token::Lt,
                &Token::AndAnd,
                &Token::Amp,
            ]
        );
    }

    #[test]
    fn test_int_overflow_is_an_error() {
        let err = tokenize("2147483648").unwrap_err();
        assert!(matches!(err, ParseError::InvalidToken { .. }));
    }

    #[test]
    fn test_unknown_escape_is_an_error() {
        assert!(tokenize(r"'\q'").is_err());
    }
}
