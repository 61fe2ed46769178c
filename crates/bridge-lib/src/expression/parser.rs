//! nom grammar for formulas
//!
//! Precedence, lowest first: conditional, `or`, `xor`, `and`, `|`, `&`,
//! comparison, additive, multiplicative, implicit multiplication, unary,
//! power, factorial. Every binary level folds left except power and the
//! conditional, which nest to the right.

use super::{BinaryOp, Expr, ParseError, UnaryOp};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{cut, map, map_res, not, opt, recognize, value, verify},
    multi::{fold_many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// Words reserved for operators; never parsed as symbols
const KEYWORDS: &[&str] = &["and", "or", "xor", "not", "mod"];

const OPERATOR_CHARS: &str = "+-*/%^()<>=!,.?:&|";

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

pub(crate) fn parse_formula(formula: &str) -> Result<Expr, ParseError> {
    if formula.trim().is_empty() {
        return Ok(Expr::Empty);
    }
    if let Some((pos, ch)) = formula
        .char_indices()
        .find(|(_, c)| !(is_ident_char(*c) || c.is_whitespace() || OPERATOR_CHARS.contains(*c)))
    {
        return Err(ParseError::UnknownCharacter { pos, ch });
    }

    match delimited(multispace0, conditional, multispace0)(formula) {
        Ok(("", expr)) => Ok(expr),
        Ok((rest, _)) => Err(locate(formula, rest)),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(locate(formula, e.input)),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::UnexpectedEnd),
    }
}

/// Turn the input left at a failure into a positioned error
fn locate(formula: &str, rest: &str) -> ParseError {
    if let Some(pos) = unbalanced_parenthesis(formula) {
        return ParseError::UnbalancedParenthesis { pos };
    }

    let rest = rest.trim_start();
    if rest.is_empty() {
        return ParseError::UnexpectedEnd;
    }
    let word: String = rest
        .chars()
        .take_while(|c| is_ident_char(*c) || *c == '.')
        .collect();
    let found = if word.is_empty() {
        rest.chars().take(1).collect()
    } else {
        word
    };
    ParseError::UnexpectedToken {
        pos: formula.len() - rest.len(),
        found,
    }
}

fn unbalanced_parenthesis(formula: &str) -> Option<usize> {
    let mut open = Vec::new();
    for (pos, c) in formula.char_indices() {
        match c {
            '(' => open.push(pos),
            ')' if open.pop().is_none() => return Some(pos),
            _ => {}
        }
    }
    open.last().copied()
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(satisfy(is_ident_char)))
}

/// One left-associative precedence level
fn left_assoc<'a>(
    input: &'a str,
    operator: fn(&'a str) -> IResult<&'a str, BinaryOp>,
    operand: fn(&'a str) -> IResult<&'a str, Expr>,
) -> IResult<&'a str, Expr> {
    let (input, first) = operand(input)?;
    fold_many0(
        pair(ws(operator), cut(operand)),
        move || first.clone(),
        |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
    )(input)
}

fn conditional(input: &str) -> IResult<&str, Expr> {
    let (input, condition) = logical_or(input)?;
    let (input, branches) = opt(preceded(
        ws(char('?')),
        cut(pair(conditional, preceded(ws(char(':')), conditional))),
    ))(input)?;

    let expr = match branches {
        Some((then, otherwise)) => Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
        None => condition,
    };
    Ok((input, expr))
}

fn logical_or(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, |i| value(BinaryOp::Or, keyword("or"))(i), logical_xor)
}

fn logical_xor(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, |i| value(BinaryOp::Xor, keyword("xor"))(i), logical_and)
}

fn logical_and(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, |i| value(BinaryOp::And, keyword("and"))(i), bitwise_or)
}

fn bitwise_or(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, |i| value(BinaryOp::BitOr, char('|'))(i), bitwise_and)
}

fn bitwise_and(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, |i| value(BinaryOp::BitAnd, char('&'))(i), comparison)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    left_assoc(input, comparison_operator, additive)
}

fn comparison_operator(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Lt, char('<')),
        value(BinaryOp::Gt, char('>')),
    ))(input)
}

fn additive(input: &str) -> IResult<&str, Expr> {
    left_assoc(
        input,
        |i| {
            alt((
                value(BinaryOp::Add, char('+')),
                value(BinaryOp::Sub, char('-')),
            ))(i)
        },
        multiplicative,
    )
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    left_assoc(
        input,
        |i| {
            alt((
                value(BinaryOp::Mul, char('*')),
                value(BinaryOp::Div, char('/')),
                value(BinaryOp::Mod, char('%')),
                value(BinaryOp::Mod, keyword("mod")),
            ))(i)
        },
        implicit_product,
    )
}

/// Whether a number may directly follow `factor`: `x 2` and `n! 2` yes,
/// `2 3` and `x^2 3` no
fn takes_number_factor(factor: &Expr) -> bool {
    matches!(
        factor,
        Expr::Symbol(_)
            | Expr::Group(_)
            | Expr::Call { .. }
            | Expr::Unary {
                op: UnaryOp::Factorial,
                ..
            }
    )
}

/// Juxtaposed factors: `2x`, `x y`, `(a)(b)`, `3(a + b)`
fn implicit_product(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut product) = unary(input)?;
    let mut last = product.clone();

    loop {
        let (rest, _) = multispace0::<_, nom::error::Error<&str>>(input)?;
        let starts_factor = rest.starts_with('(')
            || identifier(rest).is_ok()
            || (takes_number_factor(&last) && number(rest).is_ok());
        if !starts_factor {
            return Ok((input, product));
        }

        let (rest, factor) = unary(rest)?;
        last = factor.clone();
        product = Expr::binary(BinaryOp::Mul, product, factor);
        input = rest;
    }
}

fn unary(input: &str) -> IResult<&str, Expr> {
    let operator = alt((
        value(UnaryOp::Neg, char('-')),
        value(UnaryOp::Plus, char('+')),
        value(UnaryOp::Not, keyword("not")),
    ));
    alt((
        map(pair(ws(operator), cut(unary)), |(op, operand)| Expr::Unary {
            op,
            operand: Box::new(operand),
        }),
        power,
    ))(input)
}

/// Right-associative; the exponent may carry a sign (`2^-1`)
fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = factorial(input)?;
    let (input, exponent) = opt(preceded(ws(char('^')), cut(unary)))(input)?;
    let expr = match exponent {
        Some(exponent) => Expr::binary(BinaryOp::Pow, base, exponent),
        None => base,
    };
    Ok((input, expr))
}

fn factorial(input: &str) -> IResult<&str, Expr> {
    let (input, operand) = primary(input)?;
    fold_many0(
        preceded(multispace0, terminated(char('!'), not(char('=')))),
        move || operand.clone(),
        |operand, _| Expr::Unary {
            op: UnaryOp::Factorial,
            operand: Box::new(operand),
        },
    )(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    preceded(
        multispace0,
        alt((
            map(number, Expr::Number),
            call_or_symbol,
            map(
                preceded(
                    char('('),
                    cut(terminated(conditional, preceded(multispace0, char(')')))),
                ),
                |inner| Expr::Group(Box::new(inner)),
            ),
        )),
    )(input)
}

fn call_or_symbol(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, args) = opt(preceded(
        preceded(multispace0, char('(')),
        cut(terminated(
            separated_list0(ws(char(',')), conditional),
            preceded(multispace0, char(')')),
        )),
    ))(input)?;

    let expr = match args {
        Some(args) => Expr::Call { name, args },
        None => Expr::Symbol(name),
    };
    Ok((input, expr))
}

fn identifier(input: &str) -> IResult<&str, String> {
    map(
        verify(
            recognize(pair(satisfy(is_ident_start), take_while(is_ident_char))),
            |name: &str| !KEYWORDS.contains(&name),
        ),
        |name: &str| name.to_string(),
    )(input)
}

/// Unsigned decimal with optional fraction and exponent; `2e` leaves the `e`
fn number(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |text: &str| text.parse::<f64>(),
    )(input)
}
