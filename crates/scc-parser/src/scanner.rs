//! Hand-written scanner.
//!
//! Produces a dense token vector with byte spans. Comments (`//` and
//! `/* ... */`) and whitespace are skipped; an unterminated block comment
//! or string literal is a scan error.

use scc_common::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    IntLit(u64),
    FloatLit(f64),
    StrLit(String),

    // Keywords
    KwModule,
    KwImport,
    KwKind,
    KwDomain,
    KwStruct,
    KwTemplate,
    KwOperator,
    KwCast,
    KwVoid,
    KwPublic,
    KwType,
    KwDim,
    KwTrue,
    KwFalse,
    KwIf,
    KwElse,
    KwWhile,
    KwDo,
    KwFor,
    KwReturn,
    KwBreak,
    KwContinue,
    KwPrint,
    KwAssert,
    KwCat,
    KwReshape,
    KwShape,
    KwSize,
    KwToString,
    KwStrlen,
    KwDeclassify,
    KwClassify,
    KwDomainId,
    KwBytesFromString,
    KwStringFromBytes,

    // Punctuation and operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleLBracket,
    DoubleRBracket,
    Comma,
    Semicolon,
    Colon,
    DoubleColon,
    Question,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    PlusPlus,
    MinusMinus,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    LessEq,
    Less,
    GreaterEq,
    Greater,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    Bang,
    Tilde,

    Eof,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    let kw = match ident {
        "module" => TokenKind::KwModule,
        "import" => TokenKind::KwImport,
        "kind" => TokenKind::KwKind,
        "domain" => TokenKind::KwDomain,
        "struct" => TokenKind::KwStruct,
        "template" => TokenKind::KwTemplate,
        "operator" => TokenKind::KwOperator,
        "cast" => TokenKind::KwCast,
        "void" => TokenKind::KwVoid,
        "public" => TokenKind::KwPublic,
        "type" => TokenKind::KwType,
        "dim" => TokenKind::KwDim,
        "true" => TokenKind::KwTrue,
        "false" => TokenKind::KwFalse,
        "if" => TokenKind::KwIf,
        "else" => TokenKind::KwElse,
        "while" => TokenKind::KwWhile,
        "do" => TokenKind::KwDo,
        "for" => TokenKind::KwFor,
        "return" => TokenKind::KwReturn,
        "break" => TokenKind::KwBreak,
        "continue" => TokenKind::KwContinue,
        "print" => TokenKind::KwPrint,
        "assert" => TokenKind::KwAssert,
        "cat" => TokenKind::KwCat,
        "reshape" => TokenKind::KwReshape,
        "shape" => TokenKind::KwShape,
        "size" => TokenKind::KwSize,
        "tostring" => TokenKind::KwToString,
        "strlen" => TokenKind::KwStrlen,
        "declassify" => TokenKind::KwDeclassify,
        "classify" => TokenKind::KwClassify,
        "__domainid" => TokenKind::KwDomainId,
        "__bytes_from_string" => TokenKind::KwBytesFromString,
        "__string_from_bytes" => TokenKind::KwStringFromBytes,
        _ => return None,
    };
    Some(kw)
}

pub struct ScanError {
    pub span: Span,
    pub message: String,
}

/// Scan a whole file into tokens, ending with `Eof`.
pub fn scan(text: &str) -> Result<Vec<Token>, ScanError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    macro_rules! push {
        ($kind:expr, $start:expr, $end:expr) => {
            tokens.push(Token {
                kind: $kind,
                span: Span::new($start as u32, $end as u32),
            })
        };
    }

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;

        // Whitespace
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let mut j = i + 2;
            loop {
                if j + 1 >= bytes.len() {
                    return Err(ScanError {
                        span: Span::new(start as u32, bytes.len() as u32),
                        message: "unterminated block comment".to_owned(),
                    });
                }
                if bytes[j] == b'*' && bytes[j + 1] == b'/' {
                    break;
                }
                j += 1;
            }
            i = j + 2;
            continue;
        }

        // Identifiers and keywords
        if b.is_ascii_alphabetic() || b == b'_' {
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            let word = &text[i..j];
            let kind = keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_owned()));
            push!(kind, i, j);
            i = j;
            continue;
        }

        // Numbers
        if b.is_ascii_digit() {
            let mut j = i;
            if b == b'0' && bytes.get(i + 1).map(|c| c.eq_ignore_ascii_case(&b'x')) == Some(true) {
                j = i + 2;
                let mut value: u64 = 0;
                let digits_start = j;
                while j < bytes.len() && bytes[j].is_ascii_hexdigit() {
                    let d = (bytes[j] as char).to_digit(16).unwrap() as u64;
                    value = value.wrapping_mul(16).wrapping_add(d);
                    j += 1;
                }
                if j == digits_start {
                    return Err(ScanError {
                        span: Span::new(i as u32, j as u32),
                        message: "hexadecimal literal without digits".to_owned(),
                    });
                }
                push!(TokenKind::IntLit(value), i, j);
                i = j;
                continue;
            }

            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }

            let is_float = (j < bytes.len()
                && bytes[j] == b'.'
                && bytes.get(j + 1).map(|c| c.is_ascii_digit()) == Some(true))
                || (j < bytes.len() && (bytes[j] == b'e' || bytes[j] == b'E'));
            if is_float {
                if bytes[j] == b'.' {
                    j += 1;
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                }
                if j < bytes.len() && (bytes[j] == b'e' || bytes[j] == b'E') {
                    j += 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                }
                let value: f64 = text[i..j].parse().map_err(|_| ScanError {
                    span: Span::new(i as u32, j as u32),
                    message: "malformed float literal".to_owned(),
                })?;
                push!(TokenKind::FloatLit(value), i, j);
            } else {
                let value: u64 = text[i..j].parse().map_err(|_| ScanError {
                    span: Span::new(i as u32, j as u32),
                    message: "integer literal out of range".to_owned(),
                })?;
                push!(TokenKind::IntLit(value), i, j);
            }
            i = j;
            continue;
        }

        // Strings
        if b == b'"' {
            let mut j = i + 1;
            let mut value = String::new();
            loop {
                if j >= bytes.len() {
                    return Err(ScanError {
                        span: Span::new(start as u32, bytes.len() as u32),
                        message: "unterminated string literal".to_owned(),
                    });
                }
                match bytes[j] {
                    b'"' => break,
                    b'\\' => {
                        let esc = bytes.get(j + 1).copied().ok_or_else(|| ScanError {
                            span: Span::new(j as u32, (j + 1) as u32),
                            message: "unterminated escape sequence".to_owned(),
                        })?;
                        let c = match esc {
                            b'n' => '\n',
                            b't' => '\t',
                            b'r' => '\r',
                            b'\\' => '\\',
                            b'"' => '"',
                            b'0' => '\0',
                            other => {
                                return Err(ScanError {
                                    span: Span::new(j as u32, (j + 2) as u32),
                                    message: format!(
                                        "unknown escape sequence '\\{}'",
                                        other as char
                                    ),
                                })
                            }
                        };
                        value.push(c);
                        j += 2;
                    }
                    _ => {
                        // Keep multi-byte characters intact.
                        let ch_len = text[j..].chars().next().map(char::len_utf8).unwrap_or(1);
                        value.push_str(&text[j..j + ch_len]);
                        j += ch_len;
                    }
                }
            }
            push!(TokenKind::StrLit(value), i, j + 1);
            i = j + 1;
            continue;
        }

        // Operators and punctuation, longest first.
        let two = if i + 1 < bytes.len() {
            &text[i..i + 2]
        } else {
            ""
        };
        let kind2 = match two {
            "[[" => Some(TokenKind::DoubleLBracket),
            "]]" => Some(TokenKind::DoubleRBracket),
            "::" => Some(TokenKind::DoubleColon),
            "==" => Some(TokenKind::EqEq),
            "!=" => Some(TokenKind::NotEq),
            "<=" => Some(TokenKind::LessEq),
            ">=" => Some(TokenKind::GreaterEq),
            "&&" => Some(TokenKind::AndAnd),
            "||" => Some(TokenKind::OrOr),
            "<<" => Some(TokenKind::Shl),
            ">>" => Some(TokenKind::Shr),
            "++" => Some(TokenKind::PlusPlus),
            "--" => Some(TokenKind::MinusMinus),
            "+=" => Some(TokenKind::PlusAssign),
            "-=" => Some(TokenKind::MinusAssign),
            "*=" => Some(TokenKind::StarAssign),
            "/=" => Some(TokenKind::SlashAssign),
            "%=" => Some(TokenKind::PercentAssign),
            "&=" => Some(TokenKind::AmpAssign),
            "|=" => Some(TokenKind::PipeAssign),
            "^=" => Some(TokenKind::CaretAssign),
            _ => None,
        };
        if let Some(kind) = kind2 {
            push!(kind, i, i + 2);
            i += 2;
            continue;
        }

        let kind1 = match b {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b'?' => TokenKind::Question,
            b'.' => TokenKind::Dot,
            b'=' => TokenKind::Assign,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'<' => TokenKind::Less,
            b'>' => TokenKind::Greater,
            b'&' => TokenKind::Amp,
            b'|' => TokenKind::Pipe,
            b'^' => TokenKind::Caret,
            b'!' => TokenKind::Bang,
            b'~' => TokenKind::Tilde,
            other => {
                return Err(ScanError {
                    span: Span::new(i as u32, (i + 1) as u32),
                    message: format!("unexpected character '{}'", other as char),
                })
            }
        };
        push!(kind1, i, i + 1);
        i += 1;
    }

    push!(TokenKind::Eof, i, i);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        scan(text).ok().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_declaration() {
        let toks = kinds("int [[1]] x (3) = {1,2,3};");
        assert_eq!(toks[0], TokenKind::Ident("int".to_owned()));
        assert_eq!(toks[1], TokenKind::DoubleLBracket);
        assert_eq!(toks[2], TokenKind::IntLit(1));
        assert_eq!(toks[3], TokenKind::DoubleRBracket);
        assert!(toks.contains(&TokenKind::LBrace));
        assert_eq!(*toks.last().unwrap(), TokenKind::Eof);
    }

    #[test]
    fn scans_operators_longest_first() {
        let toks = kinds("a <<= b");
        // "<<=" scans as "<<" then "="
        assert_eq!(toks[1], TokenKind::Shl);
        assert_eq!(toks[2], TokenKind::Assign);
    }

    #[test]
    fn scans_strings_with_escapes() {
        let toks = kinds(r#""he\"llo\n""#);
        assert_eq!(toks[0], TokenKind::StrLit("he\"llo\n".to_owned()));
    }

    #[test]
    fn scans_numbers() {
        assert_eq!(kinds("0x10")[0], TokenKind::IntLit(16));
        assert_eq!(kinds("3.5")[0], TokenKind::FloatLit(3.5));
        assert_eq!(kinds("7")[0], TokenKind::IntLit(7));
    }

    #[test]
    fn comments_are_skipped() {
        let toks = kinds("a // line\n/* block */ b");
        assert_eq!(toks.len(), 3); // a, b, eof
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(scan("\"abc").is_err());
    }
}
