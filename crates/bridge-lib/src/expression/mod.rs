//! Formula parsing for composite metrics and utility functions
//!
//! This module provides:
//! - A nom-based precedence-climbing parser for arithmetic and logical formulas
//! - Free variable extraction used to derive composite-metric arguments

mod parser;

use std::collections::HashSet;
use std::fmt;

/// Errors raised for malformed formulas
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown character '{ch}' at position {pos}")]
    UnknownCharacter { pos: usize, ch: char },

    #[error("unexpected token '{found}' at position {pos}")]
    UnexpectedToken { pos: usize, found: String },

    #[error("unbalanced parenthesis at position {pos}")]
    UnbalancedParenthesis { pos: usize },

    #[error("unexpected end of formula")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    /// Postfix `!`
    Factorial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Xor,
    BitAnd,
    BitOr,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
        }
    }
}

/// Parsed formula
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Result of parsing an empty formula
    Empty,
    Number(f64),
    Symbol(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Function application; the function name is not a variable
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// Parenthesized sub-expression
    Group(Box<Expr>),
    /// `condition ? then : otherwise`
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Expr::Empty)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Empty => Ok(()),
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Symbol(name) => f.write_str(name),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "-{}", operand),
                UnaryOp::Plus => write!(f, "+{}", operand),
                UnaryOp::Not => write!(f, "not {}", operand),
                UnaryOp::Factorial => write!(f, "{}!", operand),
            },
            Expr::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Group(inner) => write!(f, "({})", inner),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => write!(f, "{} ? {} : {}", condition, then, otherwise),
        }
    }
}

/// Parse a formula; blank input yields [`Expr::Empty`]
pub fn parse(formula: &str) -> Result<Expr, ParseError> {
    parser::parse_formula(formula)
}

/// Collect the distinct symbol names of a tree, depth-first
///
/// Names are returned in order of first appearance so output built from
/// them is stable; callers should still treat the result as a set.
pub fn extract_variable_names(expr: &Expr) -> Vec<String> {
    fn visit(expr: &Expr, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        match expr {
            Expr::Empty | Expr::Number(_) => {}
            Expr::Symbol(name) => {
                if seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
            Expr::Unary { operand, .. } => visit(operand, seen, out),
            Expr::Binary { lhs, rhs, .. } => {
                visit(lhs, seen, out);
                visit(rhs, seen, out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    visit(arg, seen, out);
                }
            }
            Expr::Group(inner) => visit(inner, seen, out),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                visit(condition, seen, out);
                visit(then, seen, out);
                visit(otherwise, seen, out);
            }
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    visit(expr, &mut seen, &mut out);
    out
}

/// Parse and extract in one step
pub fn variables_of(formula: &str) -> Result<Vec<String>, ParseError> {
    parse(formula).map(|expr| extract_variable_names(&expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn vars(formula: &str) -> BTreeSet<String> {
        variables_of(formula).unwrap().into_iter().collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_duplicate_symbols_are_collapsed() {
        assert_eq!(vars("a + b * a"), set(&["a", "b"]));
        assert_eq!(variables_of("a + b * a").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_formula_is_not_an_error() {
        assert_eq!(parse("").unwrap(), Expr::Empty);
        assert_eq!(parse("   ").unwrap(), Expr::Empty);
        assert!(variables_of("").unwrap().is_empty());
    }

    #[test]
    fn test_grouping_and_calls() {
        assert_eq!(
            vars("mean(cpu_a, (cpu_b + cpu_c)) / max(1, nodes)"),
            set(&["cpu_a", "cpu_b", "cpu_c", "nodes"])
        );
    }

    #[test]
    fn test_function_names_are_not_variables() {
        assert_eq!(vars("sqrt(x)"), set(&["x"]));
    }

    #[test]
    fn test_numbers_only() {
        assert!(vars("1 + 2 * 3").is_empty());
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * c").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                rhs,
                ..
            } => assert!(matches!(
                *rhs,
                Expr::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            )),
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse("a ^ b ^ c").unwrap();
        assert_eq!(expr.to_string(), "a ^ b ^ c");
        match expr {
            Expr::Binary {
                op: BinaryOp::Pow,
                lhs,
                rhs,
            } => {
                assert_eq!(*lhs, Expr::Symbol("a".into()));
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(vars("2x + 3(y - z)"), set(&["x", "y", "z"]));
        assert_eq!(parse("x y").unwrap().to_string(), "x * y");
        assert_eq!(parse("(a)(b)").unwrap().to_string(), "(a) * (b)");
        assert_eq!(parse("x 2").unwrap().to_string(), "x * 2");
    }

    #[test]
    fn test_adjacent_numbers_are_rejected() {
        assert!(matches!(
            parse("2 3"),
            Err(ParseError::UnexpectedToken { pos: 2, .. })
        ));
    }

    #[test]
    fn test_keyword_operators() {
        let expr = parse("a and b or not c").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Or, .. }));
        assert_eq!(expr.to_string(), "a and b or not c");
        assert_eq!(vars("a and b or not c"), set(&["a", "b", "c"]));

        assert_eq!(parse("x mod y").unwrap(), parse("x % y").unwrap());
        assert!(matches!(
            parse("p xor q").unwrap(),
            Expr::Binary { op: BinaryOp::Xor, .. }
        ));
        // keywords only match whole words
        assert_eq!(vars("order + android"), set(&["order", "android"]));
    }

    #[test]
    fn test_conditional() {
        let expr = parse("a > b ? a : b").unwrap();
        match &expr {
            Expr::Conditional { condition, .. } => {
                assert!(matches!(**condition, Expr::Binary { op: BinaryOp::Gt, .. }))
            }
            other => panic!("unexpected tree {:?}", other),
        }
        assert_eq!(expr.to_string(), "a > b ? a : b");
        assert_eq!(vars("x > 0 ? y : z"), set(&["x", "y", "z"]));
        assert!(parse("a ? b").is_err());
    }

    #[test]
    fn test_factorial() {
        let expr = parse("n!").unwrap();
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Factorial,
                operand: Box::new(Expr::Symbol("n".into())),
            }
        );
        assert_eq!(parse("n! / 2").unwrap().to_string(), "n! / 2");
        assert!(matches!(
            parse("a != b").unwrap(),
            Expr::Binary { op: BinaryOp::Ne, .. }
        ));
    }

    #[test]
    fn test_bitwise_operators() {
        assert!(matches!(
            parse("a | b & c").unwrap(),
            Expr::Binary { op: BinaryOp::BitOr, .. }
        ));
    }

    #[test]
    fn test_comparison_and_unary() {
        assert_eq!(vars("-latency <= -max_latency"), set(&["latency", "max_latency"]));
    }

    #[test]
    fn test_malformed_formulas() {
        assert!(matches!(parse("a +"), Err(ParseError::UnexpectedEnd)));
        assert!(matches!(
            parse("(a + b"),
            Err(ParseError::UnbalancedParenthesis { pos: 0 })
        ));
        assert!(matches!(
            parse("a + b)"),
            Err(ParseError::UnbalancedParenthesis { pos: 5 })
        ));
        assert!(matches!(
            parse("a * * b"),
            Err(ParseError::UnexpectedToken { pos: 4, .. })
        ));
        assert!(matches!(
            parse("a # b"),
            Err(ParseError::UnknownCharacter { pos: 2, ch: '#' })
        ));
        assert!(matches!(
            parse("max(a,"),
            Err(ParseError::UnbalancedParenthesis { pos: 3 })
        ));
    }
}
