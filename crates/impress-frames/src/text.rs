//! Text record format
//!
//! Grammar:
//! ```text
//! payload := record*
//! record  := '{' ('=' symbol)? slot* '}'
//! slot    := symbol ':' value
//! value   := string | record | float | number | symbol
//! float   := 'nan' | 'inf' | '-inf'
//! symbol  := [A-Za-z_/$][A-Za-z0-9_/$.-]* | '#' string
//! string  := '"' (char | '\' escape)* '"'
//! ```
//!
//! The symbols `nan` and `inf` are printed quoted so they read back as
//! symbols. Records may nest at most [`MAX_DEPTH`] levels.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while},
    character::complete::{char, i64 as integer, multispace0, one_of, satisfy},
    combinator::{map, not, opt, peek, recognize, value},
    error::{Error, ErrorKind},
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::binary::MAX_DEPTH;
use crate::error::FrameError;
use crate::store::{Handle, Slot, Store, Value};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Int(i64),
    Float(f64),
    Str(String),
    Sym(String),
    Record(RecordNode),
}

#[derive(Debug, Clone, PartialEq)]
struct RecordNode {
    id: Option<String>,
    slots: Vec<(String, Node)>,
}

fn is_symbol_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '_' | '/' | '$')
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '$' | '.' | '-')
}

fn is_bare_symbol(s: &str) -> bool {
    if matches!(s, "nan" | "inf") {
        return false;
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_symbol_start(c) => chars.all(is_symbol_char),
        _ => false,
    }
}

/// Parse a string literal with escapes
fn string_literal(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", tag("\\")),
                    value("\"", tag("\"")),
                    value("\n", tag("n")),
                    value("\t", tag("t")),
                    value("\r", tag("r")),
                )),
            )),
            Option::unwrap_or_default,
        ),
        char('"'),
    )(input)
}

/// Parse a bare or quoted symbol
fn symbol(input: &str) -> IResult<&str, String> {
    alt((
        map(
            recognize(pair(satisfy(is_symbol_start), take_while(is_symbol_char))),
            String::from,
        ),
        preceded(char('#'), string_literal),
    ))(input)
}

/// Parse an integer or a float
fn number(input: &str) -> IResult<&str, Node> {
    let (input, _) = peek(one_of("-0123456789"))(input)?;
    alt((
        map(terminated(integer, not(one_of(".eE"))), Node::Int),
        map(double, Node::Float),
    ))(input)
}

/// Parse a non-finite float
fn special_float(input: &str) -> IResult<&str, Node> {
    map(
        terminated(
            alt((
                value(f64::NAN, tag("nan")),
                value(f64::INFINITY, tag("inf")),
                value(f64::NEG_INFINITY, tag("-inf")),
            )),
            not(satisfy(is_symbol_char)),
        ),
        Node::Float,
    )(input)
}

fn node(input: &str, depth: usize) -> IResult<&str, Node> {
    alt((
        map(string_literal, Node::Str),
        map(|i| record(i, depth + 1), Node::Record),
        special_float,
        number,
        map(symbol, Node::Sym),
    ))(input)
}

fn slot(input: &str, depth: usize) -> IResult<&str, (String, Node)> {
    let (input, key) = symbol(input)?;
    let (input, _) = delimited(multispace0, char(':'), multispace0)(input)?;
    let (input, value) = node(input, depth)?;
    Ok((input, (key, value)))
}

fn record(input: &str, depth: usize) -> IResult<&str, RecordNode> {
    if depth > MAX_DEPTH {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
    }
    let (input, _) = terminated(char('{'), multispace0)(input)?;
    let (input, id) = opt(terminated(preceded(char('='), symbol), multispace0))(input)?;
    let (input, slots) = many0(terminated(|i| slot(i, depth), multispace0))(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, RecordNode { id, slots }))
}

fn parse_error(text: &str, err: nom::Err<nom::error::Error<&str>>) -> FrameError {
    match err {
        nom::Err::Incomplete(_) => FrameError::UnexpectedEnd,
        nom::Err::Failure(e) if e.code == ErrorKind::TooLarge => FrameError::Parse {
            offset: text.len() - e.input.len(),
            message: "records nested too deeply".to_string(),
        },
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            if e.input.is_empty() {
                FrameError::UnexpectedEnd
            } else {
                FrameError::Parse {
                    offset: text.len() - e.input.len(),
                    message: format!("{:?}", e.code),
                }
            }
        }
    }
}

/// Parse text records into `store`, returning the top-level records in order.
pub fn parse_text(store: &mut Store, text: &str) -> Result<Vec<Handle>, FrameError> {
    let (rest, records) =
        many0(preceded(multispace0, |i| record(i, 0)))(text).map_err(|e| parse_error(text, e))?;

    let rest = rest.trim_start();
    if !rest.is_empty() {
        // Re-run on the remainder to report where the record broke.
        return Err(match record(rest, 0) {
            Err(e) => parse_error(text, e),
            Ok(_) => FrameError::Parse {
                offset: text.len() - rest.len(),
                message: "unexpected input after record".to_string(),
            },
        });
    }

    Ok(records
        .into_iter()
        .map(|r| materialize(store, r))
        .collect())
}

fn materialize(store: &mut Store, node: RecordNode) -> Handle {
    let mut slots = Vec::with_capacity(node.slots.len());
    for (key, value) in node.slots {
        let key = store.lookup(&key);
        let value = materialize_value(store, value);
        slots.push(Slot { key, value });
    }
    let h = match node.id {
        Some(id) => store.lookup(&id),
        None => store.anonymous(),
    };
    store.replace_slots(h, slots);
    h
}

fn materialize_value(store: &mut Store, node: Node) -> Value {
    match node {
        Node::Int(n) => Value::Int(n),
        Node::Float(f) => Value::Float(f),
        Node::Str(s) => Value::Str(s),
        Node::Sym(s) => Value::Ref(store.lookup(&s)),
        Node::Record(r) => Value::Ref(materialize(store, r)),
    }
}

/// Text encoder for records.
///
/// Named records referenced from slots are written as symbols; anonymous
/// records are written inline.
pub struct Printer<'a> {
    store: &'a Store,
    output: String,
}

impl<'a> Printer<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            output: String::new(),
        }
    }

    /// Print a record as a top-level definition.
    pub fn print(&mut self, h: Handle) {
        let store = self.store;
        self.print_record(store.id(h), store.slots(h));
    }

    /// Print a record that is not (or not yet) stored.
    pub fn print_record(&mut self, id: Option<&str>, slots: &[Slot]) {
        self.write_record(id, slots);
        self.output.push('\n');
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn write_record(&mut self, id: Option<&str>, slots: &[Slot]) {
        self.output.push('{');
        let mut first = true;
        if let Some(id) = id {
            self.output.push('=');
            self.write_symbol(id);
            first = false;
        }
        for slot in slots {
            if !first {
                self.output.push(' ');
            }
            first = false;
            let key = self.store.id(slot.key).unwrap_or_default();
            self.write_symbol(key);
            self.output.push(':');
            self.write_value(&slot.value);
        }
        self.output.push('}');
    }

    fn write_value(&mut self, value: &Value) {
        match value {
            Value::Int(n) => self.output.push_str(&n.to_string()),
            Value::Float(f) if f.is_nan() => self.output.push_str("nan"),
            Value::Float(f) if f.is_infinite() => {
                self.output.push_str(if *f > 0.0 { "inf" } else { "-inf" })
            }
            Value::Float(f) => self.output.push_str(&format!("{:?}", f)),
            Value::Str(s) => self.write_string(s),
            Value::Ref(h) => {
                let store = self.store;
                match store.id(*h) {
                    Some(id) => self.write_symbol(id),
                    None => self.write_record(None, store.slots(*h)),
                }
            }
        }
    }

    fn write_symbol(&mut self, s: &str) {
        if is_bare_symbol(s) {
            self.output.push_str(s);
        } else {
            self.output.push('#');
            self.write_string(s);
        }
    }

    fn write_string(&mut self, s: &str) {
        self.output.push('"');
        for c in s.chars() {
            match c {
                '"' => self.output.push_str("\\\""),
                '\\' => self.output.push_str("\\\\"),
                '\n' => self.output.push_str("\\n"),
                '\t' => self.output.push_str("\\t"),
                '\r' => self.output.push_str("\\r"),
                c => self.output.push(c),
            }
        }
        self.output.push('"');
    }
}
