//! EDN reader (winnow)
//!
//! Queries, rules and inputs arrive as EDN text. This is a small reader for
//! the subset the query language uses: nil, booleans, longs, doubles,
//! strings, keywords, symbols, lists, vectors and maps. Commas are
//! whitespace; `;` comments run to end of line. Fails fast with the offset of
//! the first bad byte.

use crate::error::{Error, Result};
use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::token::{any, take_while};
use winnow::{ModalResult, Parser};

/// One EDN form.
#[derive(Clone, Debug, PartialEq)]
pub enum Edn {
    Nil,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
    /// Keyword body without the leading colon (`db/add` for `:db/add`)
    Keyword(String),
    Symbol(String),
    List(Vec<Edn>),
    Vector(Vec<Edn>),
    Map(Vec<(Edn, Edn)>),
}

impl Edn {
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Edn::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Edn::Keyword(s) => Some(s),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[Edn]> {
        match self {
            Edn::List(v) | Edn::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Edn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edn::Nil => write!(f, "nil"),
            Edn::Bool(b) => write!(f, "{}", b),
            Edn::Long(n) => write!(f, "{}", n),
            Edn::Double(d) => write!(f, "{}", d),
            Edn::Str(s) => write!(f, "{:?}", s),
            Edn::Keyword(k) => write!(f, ":{}", k),
            Edn::Symbol(s) => write!(f, "{}", s),
            Edn::List(items) => {
                write!(f, "(")?;
                for (i, x) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, ")")
            }
            Edn::Vector(items) => {
                write!(f, "[")?;
                for (i, x) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, "]")
            }
            Edn::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Read a single EDN form; trailing whitespace is allowed, trailing content
/// is an error.
pub fn read_edn(text: &str) -> Result<Edn> {
    let mut input = text;
    let form = form(&mut input).map_err(|_| err_at(text, input))?;
    skip_ws(&mut input);
    if !input.is_empty() {
        return Err(err_at(text, input));
    }
    Ok(form)
}

fn err_at(text: &str, remaining: &str) -> Error {
    let offset = text.len() - remaining.len();
    let snippet: String = remaining.chars().take(20).collect();
    let message = if snippet.is_empty() {
        "unexpected end of input".to_string()
    } else {
        format!("unexpected input {snippet:?}")
    };
    Error::Edn { offset, message }
}

fn skip_ws(input: &mut &str) {
    loop {
        let _: ModalResult<&str, ContextError> =
            take_while(0.., |c: char| c.is_whitespace() || c == ',').parse_next(input);
        if input.starts_with(';') {
            let _: ModalResult<&str, ContextError> =
                take_while(0.., |c| c != '\n').parse_next(input);
        } else {
            break;
        }
    }
}

fn backtrack() -> ErrMode<ContextError> {
    ErrMode::Backtrack(ContextError::new())
}

fn form(input: &mut &str) -> ModalResult<Edn> {
    skip_ws(input);
    alt((vector, list, map, string, keyword, number, symbol)).parse_next(input)
}

fn seq_until(input: &mut &str, close: char) -> ModalResult<Vec<Edn>> {
    let mut items = Vec::new();
    loop {
        skip_ws(input);
        if input.starts_with(close) {
            any.parse_next(input)?;
            return Ok(items);
        }
        if input.is_empty() {
            return Err(ErrMode::Cut(ContextError::new()));
        }
        items.push(form(input)?);
    }
}

fn vector(input: &mut &str) -> ModalResult<Edn> {
    '['.parse_next(input)?;
    Ok(Edn::Vector(seq_until(input, ']')?))
}

fn list(input: &mut &str) -> ModalResult<Edn> {
    '('.parse_next(input)?;
    Ok(Edn::List(seq_until(input, ')')?))
}

fn map(input: &mut &str) -> ModalResult<Edn> {
    '{'.parse_next(input)?;
    let items = seq_until(input, '}')?;
    if items.len() % 2 != 0 {
        return Err(ErrMode::Cut(ContextError::new()));
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut it = items.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        pairs.push((k, v));
    }
    Ok(Edn::Map(pairs))
}

fn string(input: &mut &str) -> ModalResult<Edn> {
    '"'.parse_next(input)?;
    let mut out = String::new();
    loop {
        let chunk: &str = take_while(0.., |c| c != '"' && c != '\\').parse_next(input)?;
        out.push_str(chunk);
        if input.starts_with('"') {
            '"'.parse_next(input)?;
            return Ok(Edn::Str(out));
        }
        if input.starts_with('\\') {
            '\\'.parse_next(input)?;
            let c: char = any.parse_next(input)?;
            match c {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                _ => return Err(ErrMode::Cut(ContextError::new())),
            }
        } else {
            // unterminated
            return Err(ErrMode::Cut(ContextError::new()));
        }
    }
}

fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace()
        && !matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ',' | ';')
}

fn keyword(input: &mut &str) -> ModalResult<Edn> {
    ':'.parse_next(input)?;
    let body: &str = take_while(1.., is_symbol_char).parse_next(input)?;
    Ok(Edn::Keyword(body.to_string()))
}

fn number(input: &mut &str) -> ModalResult<Edn> {
    let start = *input;
    let neg = opt('-').parse_next(input)?.is_some();
    let digits: &str = take_while(0.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    if digits.is_empty() {
        *input = start;
        return Err(backtrack());
    }
    let frac = if input.starts_with('.') {
        '.'.parse_next(input)?;
        let frac: &str = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
        Some(frac)
    } else {
        None
    };
    // a number must end at a delimiter, otherwise this is a symbol like `1x`
    if input.chars().next().is_some_and(is_symbol_char) {
        *input = start;
        return Err(backtrack());
    }
    match frac {
        Some(frac) => {
            let text = format!("{}{}.{}", if neg { "-" } else { "" }, digits, frac);
            let d: f64 = text.parse().map_err(|_| ErrMode::Cut(ContextError::new()))?;
            Ok(Edn::Double(d))
        }
        None => {
            let text = format!("{}{}", if neg { "-" } else { "" }, digits);
            let n: i64 = text.parse().map_err(|_| ErrMode::Cut(ContextError::new()))?;
            Ok(Edn::Long(n))
        }
    }
}

fn symbol(input: &mut &str) -> ModalResult<Edn> {
    let body: &str = take_while(1.., is_symbol_char).parse_next(input)?;
    Ok(match body {
        "nil" => Edn::Nil,
        "true" => Edn::Bool(true),
        "false" => Edn::Bool(false),
        _ => Edn::Symbol(body.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(read_edn("nil").unwrap(), Edn::Nil);
        assert_eq!(read_edn("true").unwrap(), Edn::Bool(true));
        assert_eq!(read_edn("42").unwrap(), Edn::Long(42));
        assert_eq!(read_edn("-7").unwrap(), Edn::Long(-7));
        assert_eq!(read_edn("2.5").unwrap(), Edn::Double(2.5));
        assert_eq!(read_edn("\"a b\"").unwrap(), Edn::Str("a b".into()));
        assert_eq!(read_edn(":db/add").unwrap(), Edn::Keyword("db/add".into()));
        assert_eq!(read_edn("?e").unwrap(), Edn::Symbol("?e".into()));
        assert_eq!(read_edn("$2").unwrap(), Edn::Symbol("$2".into()));
    }

    #[test]
    fn test_collections() {
        let v = read_edn("[?e :name \"Ivan\"]").unwrap();
        assert_eq!(
            v,
            Edn::Vector(vec![
                Edn::Symbol("?e".into()),
                Edn::Keyword("name".into()),
                Edn::Str("Ivan".into()),
            ])
        );

        let l = read_edn("(or [?e :age 10] [?e :age 20])").unwrap();
        let Edn::List(items) = l else { panic!() };
        assert_eq!(items.len(), 3);

        let m = read_edn("{:find [?e] :where [[?e :name]]}").unwrap();
        let Edn::Map(pairs) = m else { panic!() };
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_commas_and_comments() {
        let v = read_edn("[1, 2, ; trailing\n 3]").unwrap();
        assert_eq!(v, Edn::Vector(vec![Edn::Long(1), Edn::Long(2), Edn::Long(3)]));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            read_edn("\"a\\nb\\\"c\"").unwrap(),
            Edn::Str("a\nb\"c".into())
        );
    }

    #[test]
    fn test_errors_carry_offset() {
        let err = read_edn("[1 2").unwrap_err();
        assert_eq!(err.kind(), "query/edn");
        let err = read_edn("[1] trailing").unwrap_err();
        assert!(matches!(err, Error::Edn { .. }));
    }

    #[test]
    fn test_full_query_shape() {
        let q = read_edn(
            "[:find ?e
              :where (or [?e :name \"Oleg\"]
                         [?e :age 10])]",
        )
        .unwrap();
        let Edn::Vector(items) = q else { panic!() };
        assert_eq!(items[0], Edn::Keyword("find".into()));
    }
}
