//! DSL parser for authorization schemas.
//!
//! Parses the OpenFGA 1.1 DSL subset into [`AuthorizationModel`] structures.
//!
//! Example DSL:
//! ```text
//! model
//!   schema 1.1
//!
//! type user
//!
//! type folder
//!   relations
//!     define parent: [folder]
//!     define viewer: [user, user:*] or viewer from parent
//!
//! type document
//!   relations
//!     define parent: [folder]
//!     define writer: [user]
//!     define blocked: [user]
//!     define viewer: (writer or viewer from parent) but not blocked
//! ```
//!
//! Operator precedence, tightest first: `but not`, `and`, `or`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, satisfy, space0, space1},
    combinator::{all_consuming, cut, map, not, opt, recognize, value},
    error::{context, convert_error, ContextError, ErrorKind, ParseError, VerboseError},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::{
    AuthorizationModel, RelationDefinition, TypeConstraint, TypeDefinition, Userset,
    DEFAULT_SCHEMA_VERSION,
};

/// Parser error type with context for better error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl ParserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn with_position(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} at position {}", self.message, pos),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParserError {}

/// Result type for parser operations.
pub type ParserResult<T> = Result<T, ParserError>;

// ============ Helper Parsers ============

/// Parse a comment (# to end of line)
fn comment<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, (), E> {
    value((), pair(char('#'), take_while(|c| c != '\n' && c != '\r')))(input)
}

/// Parse whitespace including comments and newlines
fn ws<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, (), E> {
    value((), many0(alt((value((), multispace1), comment))))(input)
}

/// Words with grammatical meaning; never valid as type or relation names.
const RESERVED_KEYWORDS: &[&str] = &[
    "type",
    "relations",
    "define",
    "or",
    "and",
    "but",
    "not",
    "from",
    "model",
    "schema",
];

fn is_reserved(s: &str) -> bool {
    RESERVED_KEYWORDS.contains(&s)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Parse an identifier (alphanumeric, underscore or hyphen; not a reserved keyword)
fn identifier<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, &'a str, E> {
    let (rest, id) = take_while1(is_identifier_char)(input)?;
    if is_reserved(id) {
        return Err(nom::Err::Error(E::add_context(
            input,
            "identifier (reserved keyword)",
            E::from_error_kind(input, ErrorKind::Tag),
        )));
    }
    Ok((rest, id))
}

/// Match a keyword that is not immediately followed by more identifier characters.
fn keyword<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    word: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
    terminated(tag(word), not(satisfy(is_identifier_char)))
}

// ============ Rewrite Expressions ============

/// A rewrite expression plus every direct type restriction that appeared in it.
#[derive(Debug, Clone)]
struct Expr {
    rewrite: Userset,
    restrictions: Vec<Vec<TypeConstraint>>,
}

impl Expr {
    fn leaf(rewrite: Userset) -> Self {
        Self {
            rewrite,
            restrictions: Vec::new(),
        }
    }

    fn restriction(constraints: Vec<TypeConstraint>) -> Self {
        Self {
            rewrite: Userset::This,
            restrictions: vec![constraints],
        }
    }

    fn exclude(self, subtract: Expr) -> Self {
        let mut restrictions = self.restrictions;
        restrictions.extend(subtract.restrictions);
        Self {
            rewrite: Userset::Exclusion {
                base: Box::new(self.rewrite),
                subtract: Box::new(subtract.rewrite),
            },
            restrictions,
        }
    }

    /// Fold `first op rest...` into one n-ary node, or return `first` alone.
    fn combine(first: Expr, rest: Vec<Expr>, build: fn(Vec<Userset>) -> Userset) -> Self {
        if rest.is_empty() {
            return first;
        }
        let mut restrictions = first.restrictions;
        let mut children = vec![first.rewrite];
        for operand in rest {
            restrictions.extend(operand.restrictions);
            children.push(operand.rewrite);
        }
        Self {
            rewrite: build(children),
            restrictions,
        }
    }
}

/// Parse one restriction entry: `user`, `user:*` or `group#member`
fn restriction_entry<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, TypeConstraint, E> {
    context(
        "type restriction",
        map(
            recognize(pair(
                identifier,
                opt(alt((recognize(pair(char('#'), identifier)), tag(":*")))),
            )),
            |s: &str| TypeConstraint::new(s),
        ),
    )(input)
}

/// Parse a direct type restriction like [user] or [user, user:*, group#member]
fn direct_restriction<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Vec<TypeConstraint>, E> {
    context(
        "direct type restriction",
        delimited(
            pair(char('['), space0),
            cut(separated_list1(
                tuple((space0, char(','), space0)),
                restriction_entry,
            )),
            cut(pair(space0, char(']'))),
        ),
    )(input)
}

/// Parse "relation from tupleset" (tuple to userset)
fn tuple_to_userset<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Userset, E> {
    context(
        "tuple to userset",
        map(
            tuple((identifier, space1, keyword("from"), space1, cut(identifier))),
            |(computed, _, _, _, tupleset): (&str, _, _, _, &str)| {
                Userset::ttu(tupleset, computed)
            },
        ),
    )(input)
}

/// Parse a bare relation name on the same object
fn computed_userset<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Userset, E> {
    map(identifier, Userset::computed)(input)
}

fn grouped<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    context(
        "parenthesized expression",
        delimited(
            pair(char('('), space0),
            cut(expression),
            cut(pair(space0, char(')'))),
        ),
    )(input)
}

fn atom<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    alt((
        grouped,
        map(direct_restriction, Expr::restriction),
        map(tuple_to_userset, Expr::leaf),
        map(computed_userset, Expr::leaf),
    ))(input)
}

/// `base but not subtract`, left-associative
fn exclusion_level<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (rest, base) = atom(input)?;
    let (rest, subtracts) = many0(preceded(
        tuple((space0, keyword("but"), space1, keyword("not"), space0)),
        context("exclusion", cut(atom)),
    ))(rest)?;
    Ok((rest, subtracts.into_iter().fold(base, Expr::exclude)))
}

fn intersection_level<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (rest, first) = exclusion_level(input)?;
    let (rest, operands) = many0(preceded(
        pair(space0, keyword("and")),
        preceded(space0, context("intersection", cut(exclusion_level))),
    ))(rest)?;
    Ok((
        rest,
        Expr::combine(first, operands, |children| Userset::Intersection {
            children,
        }),
    ))
}

/// Parse a complete rewrite expression; union binds loosest
fn expression<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, Expr, E> {
    let (rest, first) = intersection_level(input)?;
    let (rest, operands) = many0(preceded(
        pair(space0, keyword("or")),
        preceded(space0, context("union", cut(intersection_level))),
    ))(rest)?;
    Ok((
        rest,
        Expr::combine(first, operands, |children| Userset::Union { children }),
    ))
}

// ============ Definitions ============

/// Parse a relation definition like "define viewer: [user] or editor"
fn relation_definition<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, RelationDefinition, E> {
    let (rest, (_, _, _, name, _, _)) = tuple((
        space0,
        keyword("define"),
        space1,
        context("relation name", cut(identifier)),
        space0,
        context("':' after relation name", cut(char(':'))),
    ))(input)?;
    let (rest, expr) = context("relation rewrite", cut(preceded(space0, expression)))(rest)?;
    let (rest, _) = space0(rest)?;

    if expr.restrictions.len() > 1 {
        return Err(nom::Err::Failure(E::add_context(
            input,
            "relation definition (at most one direct type restriction allowed)",
            E::from_error_kind(input, ErrorKind::Verify),
        )));
    }

    Ok((
        rest,
        RelationDefinition {
            name: name.to_string(),
            type_constraints: expr.restrictions.into_iter().flatten().collect(),
            rewrite: expr.rewrite,
        },
    ))
}

/// Parse a type definition with optional relations
fn type_definition<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, TypeDefinition, E> {
    context(
        "type definition",
        map(
            tuple((
                keyword("type"),
                space1,
                cut(identifier),
                ws,
                opt(preceded(
                    pair(keyword("relations"), ws),
                    many0(terminated(relation_definition, ws)),
                )),
            )),
            |(_, _, type_name, _, relations): (_, _, &str, _, _)| TypeDefinition {
                type_name: type_name.to_string(),
                relations: relations.unwrap_or_default(),
            },
        ),
    )(input)
}

/// Parse the optional `model` / `schema X.Y` header
fn model_header<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, &'a str, E> {
    context(
        "model header",
        preceded(
            pair(keyword("model"), ws),
            preceded(
                pair(cut(keyword("schema")), space1),
                cut(recognize(tuple((digit1, char('.'), digit1)))),
            ),
        ),
    )(input)
}

fn model<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, AuthorizationModel, E> {
    context(
        "authorization model",
        map(
            tuple((
                ws,
                opt(terminated(model_header, ws)),
                many0(terminated(type_definition, ws)),
            )),
            |(_, version, type_definitions)| AuthorizationModel {
                schema_version: version.unwrap_or(DEFAULT_SCHEMA_VERSION).to_string(),
                type_definitions,
            },
        ),
    )(input)
}

// ============ Public API ============

/// Parse a DSL string into an AuthorizationModel.
///
/// # Example
///
/// ```
/// use relgen_domain::model::parse;
///
/// let model = parse(
///     "type user\n\ntype document\n  relations\n    define viewer: [user]\n",
/// )
/// .unwrap();
/// assert_eq!(model.type_definitions.len(), 2);
/// ```
pub fn parse(input: &str) -> ParserResult<AuthorizationModel> {
    match all_consuming(model::<VerboseError<&str>>)(input) {
        Ok((_, model)) => Ok(model),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = e.errors.first().map(|(rest, _)| input.len() - rest.len());
            let message = format!("Parse error: {}", convert_error(input, e));
            Err(match position {
                Some(pos) => ParserError::with_position(message, pos),
                None => ParserError::new(message),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(ParserError::new("Incomplete input")),
    }
}
