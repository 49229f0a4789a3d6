//! Native type spelling parser.
//!
//! Parses C++ type spellings as they appear in hints, type maps and fixture
//! files into an unresolved syntax tree. Names are kept as written; turning
//! them into qualified [`NativeType`](declmatch_core::NativeType)s is the job
//! of whoever knows the declarations (see [`crate::fixture`]).
//!
//! ## Grammar
//!
//! ```text
//! <type>        := <cv>* <base> <cv>* <declarator>* [<params>]
//! <base>        := <builtin-word>+ | ["::"] <segment> ("::" <segment>)*
//! <segment>     := ident [<targs>]
//! <targs>       := "<" [<targ> ("," <targ>)*] ">"
//! <targ>        := integer | <type>
//! <declarator>  := "*" <cv>* | "&&" | "&"
//! <params>      := "(" [<type> ("," <type>)*] ")"
//! ```
//!
//! ## Examples
//!
//! ```text
//! unsigned long long
//! const ::ns::Klass &
//! ComposedType<int>
//! Fixed<3>
//! ::std::function<void (child, int)>
//! int *const
//! ```

use std::fmt;

use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::take_while;
use winnow::ModalResult;

use declmatch_core::native::BUILTIN_WORDS;
use declmatch_core::{Builtin, OracleError};

/// A parsed, unresolved type spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedType {
    pub is_const: bool,
    pub base: ParsedBase,
    /// Declarators in application order (innermost first).
    pub declarators: Vec<Declarator>,
    /// Present for function types: `void (int, child)`.
    pub function_params: Option<Vec<ParsedType>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedBase {
    Builtin(Builtin),
    /// A name as written; `args` belong to the final segment.
    Named { name: String, args: Vec<ParsedArg> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArg {
    Type(ParsedType),
    Value(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declarator {
    Pointer { is_const: bool },
    LValueRef,
    RValueRef,
}

impl ParsedType {
    /// Plain `void`, as in `void (void)`.
    pub fn is_plain_void(&self) -> bool {
        !self.is_const
            && self.declarators.is_empty()
            && self.function_params.is_none()
            && self.base == ParsedBase::Builtin(Builtin::Void)
    }
}

impl fmt::Display for ParsedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            f.write_str("const ")?;
        }
        match &self.base {
            ParsedBase::Builtin(b) => f.write_str(b.spelling())?,
            ParsedBase::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    f.write_str(">")?;
                }
            }
        }
        for declarator in &self.declarators {
            match declarator {
                Declarator::Pointer { is_const: true } => f.write_str(" *const")?,
                Declarator::Pointer { is_const: false } => f.write_str(" *")?,
                Declarator::LValueRef => f.write_str(" &")?,
                Declarator::RValueRef => f.write_str(" &&")?,
            }
        }
        if let Some(params) = &self.function_params {
            f.write_str(" (")?;
            for (i, param) in params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", param)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for ParsedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedArg::Type(ty) => write!(f, "{}", ty),
            ParsedArg::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Parse a complete type spelling.
pub fn parse_type_spelling(input: &str) -> Result<ParsedType, OracleError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(OracleError::InvalidSpelling {
            spelling: input.to_string(),
            message: "empty spelling".to_string(),
        });
    }

    parse_type
        .parse(input)
        .map_err(|e| OracleError::InvalidSpelling {
            spelling: input.to_string(),
            message: format!("{:?}", e),
        })
}

/// Parse an integral literal spelling (`3`, `-1`), as used for non-type
/// template arguments.
pub fn parse_integral_literal(input: &str) -> Option<i64> {
    parse_integer.parse(input.trim()).ok()
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

fn parse_type(input: &mut &str) -> ModalResult<ParsedType> {
    let _ = multispace0.parse_next(input)?;
    let leading_const = parse_cv(input)?;
    let base = alt((parse_builtin.map(ParsedBase::Builtin), parse_named)).parse_next(input)?;
    let trailing_const = parse_cv(input)?;
    let declarators: Vec<Declarator> = repeat(0.., parse_declarator).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let function_params = opt(parse_function_params).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;

    Ok(ParsedType {
        is_const: leading_const || trailing_const,
        base,
        declarators,
        function_params,
    })
}

/// Parse cv-qualifiers and elaborated-type keywords; returns whether `const` was seen.
fn parse_cv(input: &mut &str) -> ModalResult<bool> {
    let mut is_const = false;
    loop {
        let checkpoint = *input;
        let _ = multispace0.parse_next(input)?;
        match opt(parse_identifier).parse_next(input)? {
            Some("const") => is_const = true,
            Some("volatile" | "typename" | "struct" | "class" | "enum") => {}
            _ => {
                *input = checkpoint;
                return Ok(is_const);
            }
        }
    }
}

fn parse_identifier<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse a sequence of builtin keywords (`unsigned long long`).
fn parse_builtin(input: &mut &str) -> ModalResult<Builtin> {
    let start = *input;
    let mut words = Vec::new();
    loop {
        let checkpoint = *input;
        let _ = multispace0.parse_next(input)?;
        match opt(parse_identifier).parse_next(input)? {
            Some(word) if BUILTIN_WORDS.contains(&word) => words.push(word),
            _ => {
                *input = checkpoint;
                break;
            }
        }
    }

    match Builtin::from_words(&words) {
        Some(builtin) => Ok(builtin),
        None => {
            *input = start;
            Err(ErrMode::from_input(input))
        }
    }
}

/// Parse a possibly qualified, possibly specialized name.
fn parse_named(input: &mut &str) -> ModalResult<ParsedBase> {
    let _ = multispace0.parse_next(input)?;
    let leading = opt("::").parse_next(input)?.is_some();
    let first = parse_name_segment(input)?;
    let rest: Vec<(String, Vec<ParsedArg>)> =
        repeat(0.., preceded("::", parse_name_segment)).parse_next(input)?;

    let mut segments = vec![first];
    segments.extend(rest);
    let (last_name, last_args) = segments.pop().unwrap_or_default();

    let mut name = String::new();
    if leading {
        name.push_str("::");
    }
    for (segment, args) in &segments {
        name.push_str(segment);
        if !args.is_empty() {
            let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
            name.push('<');
            name.push_str(&rendered.join(", "));
            name.push('>');
        }
        name.push_str("::");
    }
    name.push_str(&last_name);

    Ok(ParsedBase::Named {
        name,
        args: last_args,
    })
}

fn parse_name_segment(input: &mut &str) -> ModalResult<(String, Vec<ParsedArg>)> {
    let ident = parse_identifier(input)?;
    let args = opt(parse_template_args).parse_next(input)?.unwrap_or_default();
    Ok((ident.to_string(), args))
}

fn parse_template_args(input: &mut &str) -> ModalResult<Vec<ParsedArg>> {
    let args: Vec<ParsedArg> = delimited(
        ('<', multispace0),
        separated(0.., parse_template_arg, (multispace0, ',', multispace0)),
        (multispace0, '>'),
    )
    .parse_next(input)?;
    Ok(args)
}

fn parse_template_arg(input: &mut &str) -> ModalResult<ParsedArg> {
    alt((
        parse_integer.map(ParsedArg::Value),
        parse_type.map(ParsedArg::Type),
    ))
    .parse_next(input)
}

fn parse_integer(input: &mut &str) -> ModalResult<i64> {
    let text: &str = (opt('-'), take_while(1.., |c: char| c.is_ascii_digit()))
        .take()
        .parse_next(input)?;
    text.parse::<i64>().map_err(|_| ErrMode::from_input(input))
}

fn parse_declarator(input: &mut &str) -> ModalResult<Declarator> {
    let _ = multispace0.parse_next(input)?;
    alt((
        "&&".value(Declarator::RValueRef),
        "&".value(Declarator::LValueRef),
        preceded('*', parse_cv).map(|is_const| Declarator::Pointer { is_const }),
    ))
    .parse_next(input)
}

fn parse_function_params(input: &mut &str) -> ModalResult<Vec<ParsedType>> {
    let params: Vec<ParsedType> = delimited(
        ('(', multispace0),
        separated(0.., parse_type, (multispace0, ',', multispace0)),
        (multispace0, ')'),
    )
    .parse_next(input)?;

    if params.len() == 1 && params[0].is_plain_void() {
        Ok(Vec::new())
    } else {
        Ok(params)
    }
}
