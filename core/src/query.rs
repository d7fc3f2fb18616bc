//! Boolean query expressions: `AND`, `OR`, `DIFF` and parentheses over
//! terms, converted to postfix with the shunting-yard algorithm and
//! evaluated with the sorted-list set operations.
//!
//! Adjacent operands are joined by an implicit `AND`. `AND` and `DIFF` bind
//! tighter than `OR`; equal precedence associates left.

use std::fmt;

use thiserror::Error;

use crate::set_ops::{conjunctive_intersect, difference, intersect, union};
use crate::tokenizer::Analyzer;
use crate::DocId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("query is empty")]
    Empty,

    #[error("query contains the stopword \"{0}\"")]
    Stopword(String),

    #[error("unbalanced parentheses")]
    UnbalancedParentheses,

    #[error("empty parentheses")]
    EmptyGroup,

    #[error("operator {0} is missing an operand")]
    MissingOperand(Operator),

    #[error("malformed query expression")]
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Diff,
}

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Operator::And | Operator::Diff => 2,
            Operator::Or => 1,
        }
    }

    pub fn apply(self, left: &[DocId], right: &[DocId]) -> Vec<DocId> {
        match self {
            Operator::And => intersect(left, right),
            Operator::Or => union(left, right),
            Operator::Diff => difference(left, right),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Diff => "DIFF",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryToken {
    Term(String),
    Op(Operator),
}

enum Lexeme {
    Term(String),
    Op(Operator),
    LeftParen,
    RightParen,
}

enum Stacked {
    Op(Operator),
    LeftParen,
}

fn lex(query: &str, analyzer: &Analyzer) -> Result<Vec<Lexeme>, QueryError> {
    let spaced = query.replace('(', " ( ").replace(')', " ) ");
    let mut lexemes = Vec::new();
    for word in spaced.split_whitespace() {
        match word {
            "(" => lexemes.push(Lexeme::LeftParen),
            ")" => lexemes.push(Lexeme::RightParen),
            "AND" => lexemes.push(Lexeme::Op(Operator::And)),
            "OR" => lexemes.push(Lexeme::Op(Operator::Or)),
            "DIFF" => lexemes.push(Lexeme::Op(Operator::Diff)),
            _ => {
                for term in analyzer.query_terms(word)? {
                    lexemes.push(Lexeme::Term(term));
                }
            }
        }
    }
    Ok(lexemes)
}

fn push_operator(op: Operator, stack: &mut Vec<Stacked>, output: &mut Vec<QueryToken>) {
    while let Some(Stacked::Op(top)) = stack.last() {
        if top.precedence() < op.precedence() {
            break;
        }
        output.push(QueryToken::Op(*top));
        stack.pop();
    }
    stack.push(Stacked::Op(op));
}

/// A parsed query in postfix order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanQuery {
    postfix: Vec<QueryToken>,
}

impl BooleanQuery {
    pub fn parse(query: &str, analyzer: &Analyzer) -> Result<Self, QueryError> {
        let lexemes = lex(query, analyzer)?;
        if lexemes.is_empty() {
            return Err(QueryError::Empty);
        }

        let mut output = Vec::new();
        let mut stack: Vec<Stacked> = Vec::new();
        let mut expect_operand = true;
        let mut pending_op: Option<Operator> = None;

        for lexeme in lexemes {
            match lexeme {
                Lexeme::Term(term) => {
                    if !expect_operand {
                        push_operator(Operator::And, &mut stack, &mut output);
                    }
                    output.push(QueryToken::Term(term));
                    expect_operand = false;
                    pending_op = None;
                }
                Lexeme::LeftParen => {
                    if !expect_operand {
                        push_operator(Operator::And, &mut stack, &mut output);
                    }
                    stack.push(Stacked::LeftParen);
                    expect_operand = true;
                    pending_op = None;
                }
                Lexeme::RightParen => {
                    if !stack.iter().any(|s| matches!(s, Stacked::LeftParen)) {
                        return Err(QueryError::UnbalancedParentheses);
                    }
                    if expect_operand {
                        return Err(match pending_op {
                            Some(op) => QueryError::MissingOperand(op),
                            None => QueryError::EmptyGroup,
                        });
                    }
                    while let Some(top) = stack.pop() {
                        match top {
                            Stacked::Op(op) => output.push(QueryToken::Op(op)),
                            Stacked::LeftParen => break,
                        }
                    }
                }
                Lexeme::Op(op) => {
                    if expect_operand {
                        return Err(QueryError::MissingOperand(op));
                    }
                    push_operator(op, &mut stack, &mut output);
                    expect_operand = true;
                    pending_op = Some(op);
                }
            }
        }

        if expect_operand {
            return Err(match pending_op {
                Some(op) => QueryError::MissingOperand(op),
                None => QueryError::UnbalancedParentheses,
            });
        }
        while let Some(top) = stack.pop() {
            match top {
                Stacked::Op(op) => output.push(QueryToken::Op(op)),
                Stacked::LeftParen => return Err(QueryError::UnbalancedParentheses),
            }
        }
        Ok(Self { postfix: output })
    }

    pub fn postfix(&self) -> &[QueryToken] {
        &self.postfix
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postfix.iter().filter_map(|t| match t {
            QueryToken::Term(term) => Some(term.as_str()),
            QueryToken::Op(_) => None,
        })
    }

    /// True when every operator is `AND`.
    pub fn is_conjunctive(&self) -> bool {
        self.postfix
            .iter()
            .all(|t| matches!(t, QueryToken::Term(_) | QueryToken::Op(Operator::And)))
    }

    /// Evaluate with `fetch` supplying the postings list of each term.
    /// Pure conjunctions are intersected shortest list first.
    pub fn evaluate<F, E>(&self, mut fetch: F) -> Result<Vec<DocId>, E>
    where
        F: FnMut(&str) -> Result<Vec<DocId>, E>,
        E: From<QueryError>,
    {
        if self.is_conjunctive() {
            let lists = self.terms().map(&mut fetch).collect::<Result<Vec<_>, E>>()?;
            return Ok(conjunctive_intersect(lists));
        }

        let mut stack: Vec<Vec<DocId>> = Vec::new();
        for token in &self.postfix {
            match token {
                QueryToken::Term(term) => stack.push(fetch(term)?),
                QueryToken::Op(op) => {
                    let right = stack.pop().ok_or(QueryError::Malformed)?;
                    let left = stack.pop().ok_or(QueryError::Malformed)?;
                    stack.push(op.apply(&left, &right));
                }
            }
        }
        if stack.len() != 1 {
            return Err(QueryError::Malformed.into());
        }
        Ok(stack.pop().unwrap_or_default())
    }
}

impl fmt::Display for BooleanQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.postfix.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match token {
                QueryToken::Term(term) => f.write_str(term)?,
                QueryToken::Op(op) => write!(f, "{op}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::AnalyzerConfig;
    use std::collections::HashMap;

    fn plain() -> Analyzer {
        Analyzer::from_config(&AnalyzerConfig::plain()).unwrap()
    }

    fn postfix(query: &str) -> String {
        BooleanQuery::parse(query, &plain()).unwrap().to_string()
    }

    #[test]
    fn converts_infix_to_postfix() {
        assert_eq!(
            postfix("(universitas AND indonesia OR depok) DIFF ilmu AND komputer"),
            "universitas indonesia AND depok OR ilmu DIFF komputer AND"
        );
        assert_eq!(postfix("a OR b AND c"), "a b c AND OR");
        assert_eq!(postfix("a DIFF b DIFF c"), "a b DIFF c DIFF");
        assert_eq!(postfix("((a))"), "a");
    }

    #[test]
    fn adjacent_operands_are_anded() {
        assert_eq!(postfix("pupil mata"), "pupil mata AND");
        assert_eq!(postfix("a (b OR c)"), "a b c OR AND");
        assert_eq!(postfix("(a OR b) c"), "a b OR c AND");
    }

    #[test]
    fn reports_syntax_errors() {
        let analyzer = plain();
        let parse = |q: &str| BooleanQuery::parse(q, &analyzer).unwrap_err();
        assert_eq!(parse(""), QueryError::Empty);
        assert_eq!(parse("   "), QueryError::Empty);
        assert_eq!(parse("AND a"), QueryError::MissingOperand(Operator::And));
        assert_eq!(parse("a OR"), QueryError::MissingOperand(Operator::Or));
        assert_eq!(parse("a DIFF )"), QueryError::UnbalancedParentheses);
        assert_eq!(parse("(a DIFF )"), QueryError::MissingOperand(Operator::Diff));
        assert_eq!(parse("(a"), QueryError::UnbalancedParentheses);
        assert_eq!(parse("a)"), QueryError::UnbalancedParentheses);
        assert_eq!(parse("()"), QueryError::EmptyGroup);
        assert_eq!(parse("a AND ("), QueryError::UnbalancedParentheses);
    }

    #[test]
    fn rejects_stopwords() {
        let err = BooleanQuery::parse("cat AND the", &Analyzer::default()).unwrap_err();
        assert_eq!(err, QueryError::Stopword("the".to_string()));
    }

    #[test]
    fn evaluates_against_postings() {
        let postings: HashMap<&str, Vec<DocId>> = HashMap::from([
            ("halo", vec![0, 2]),
            ("dunia", vec![0, 1]),
            ("indah", vec![1]),
        ]);
        let analyzer = plain();
        let run = |q: &str| {
            BooleanQuery::parse(q, &analyzer)
                .unwrap()
                .evaluate(|term| {
                    Ok::<_, QueryError>(postings.get(term).cloned().unwrap_or_default())
                })
                .unwrap()
        };
        assert_eq!(run("halo AND dunia"), vec![0]);
        assert_eq!(run("halo OR dunia"), vec![0, 1, 2]);
        assert_eq!(run("dunia DIFF halo"), vec![1]);
        assert_eq!(run("(halo OR indah) DIFF dunia"), vec![2]);
        assert_eq!(run("halo dunia indah"), Vec::<DocId>::new());
        assert_eq!(run("hilang OR indah"), vec![1]);
        assert_eq!(run("HALO"), vec![0, 2]);
    }

    #[test]
    fn conjunctive_detection() {
        let analyzer = plain();
        assert!(BooleanQuery::parse("a b AND c", &analyzer).unwrap().is_conjunctive());
        assert!(BooleanQuery::parse("a", &analyzer).unwrap().is_conjunctive());
        assert!(!BooleanQuery::parse("a OR b", &analyzer).unwrap().is_conjunctive());
    }
}
