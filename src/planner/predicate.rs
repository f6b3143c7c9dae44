//! Join predicate parsing and validation.
//!
//! Uses sqlparser-rs with the ClickHouse dialect to parse a join condition,
//! rejects anything other than column references, literals and simple
//! operators, and rewrites every column reference into its fully qualified,
//! back-quoted form.

use sqlparser::ast::{BinaryOperator, Expr, Ident, UnaryOperator, Value};
use sqlparser::dialect::ClickHouseDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::error::{GatewayError, Result};
use crate::schema::TableSchema;

use super::resolve_column;

/// A validated join condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    /// Parses `text` and resolves its column references against `scope`.
    pub fn parse(text: &str, scope: &[&TableSchema]) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GatewayError::bad_request("join condition must not be empty"));
        }

        let dialect = ClickHouseDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(text)
            .map_err(|e| GatewayError::schema(format!("invalid join condition: {e}")))?;
        let mut expr = parser
            .parse_expr()
            .map_err(|e| GatewayError::schema(format!("invalid join condition: {e}")))?;

        let next = parser.peek_token();
        if next.token != Token::EOF {
            return Err(GatewayError::schema(format!(
                "invalid join condition: unexpected '{}' after expression",
                next.token
            )));
        }

        resolve_expr(&mut expr, scope)?;
        Ok(Self { expr })
    }

    /// The resolved expression tree.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Statement text for the predicate.
    pub fn to_sql(&self) -> String {
        self.expr.to_string()
    }
}

/// Validates node kinds and rewrites column references in place.
fn resolve_expr(expr: &mut Expr, scope: &[&TableSchema]) -> Result<()> {
    match expr {
        Expr::Identifier(ident) => {
            let (table, column) = resolve_column(scope, None, &ident.value)?;
            *expr = qualified_identifier(&table.parts(), &column);
            Ok(())
        }
        Expr::CompoundIdentifier(parts) => {
            let Some((column, qualifier)) = parts.split_last() else {
                return Err(GatewayError::schema("empty identifier in join condition"));
            };
            let qualifier = qualifier
                .iter()
                .map(|p| p.value.as_str())
                .collect::<Vec<_>>()
                .join(".");
            let (table, column) = resolve_column(scope, Some(&qualifier), &column.value)?;
            *expr = qualified_identifier(&table.parts(), &column);
            Ok(())
        }
        Expr::Value(value) => match value {
            Value::Number(..)
            | Value::SingleQuotedString(_)
            | Value::Boolean(_)
            | Value::Null => Ok(()),
            other => Err(GatewayError::schema(format!(
                "unsupported literal in join condition: {other}"
            ))),
        },
        Expr::BinaryOp { left, op, right } => {
            if !is_allowed_operator(op) {
                return Err(GatewayError::schema(format!(
                    "unsupported operator in join condition: {op}"
                )));
            }
            resolve_expr(left, scope)?;
            resolve_expr(right, scope)
        }
        Expr::UnaryOp { op, expr: inner } => match op {
            UnaryOperator::Not | UnaryOperator::Minus | UnaryOperator::Plus => {
                resolve_expr(inner, scope)
            }
            other => Err(GatewayError::schema(format!(
                "unsupported operator in join condition: {other}"
            ))),
        },
        Expr::Nested(inner) | Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
            resolve_expr(inner, scope)
        }
        other => Err(GatewayError::schema(format!(
            "unsupported expression in join condition: {other}"
        ))),
    }
}

fn is_allowed_operator(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::And
            | BinaryOperator::Or
            | BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo
    )
}

fn qualified_identifier(table_parts: &[&str], column: &str) -> Expr {
    let idents = table_parts
        .iter()
        .copied()
        .chain(std::iter::once(column))
        .map(|part| Ident::with_quote('`', part))
        .collect();
    Expr::CompoundIdentifier(idents)
}
