// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Tree-sitter CST -> [`EsExpr`] conversion
//!
//! The reader is the only module that knows tree-sitter node kinds. It walks
//! the CST produced by the stock JavaScript grammar and builds the owned
//! expression AST, rejecting everything outside the lambda subset.

use std::sync::OnceLock;

use tree_sitter::{Node, Parser};

use crate::ast::{EsArrow, EsBinaryOp, EsExpr, EsUnaryOp};
use crate::error::{ParseError, ParseResult};

/// The JavaScript grammar, initialized once per process
fn language() -> &'static tree_sitter::Language {
    static LANGUAGE: OnceLock<tree_sitter::Language> = OnceLock::new();
    LANGUAGE.get_or_init(|| tree_sitter_javascript::LANGUAGE.into())
}

/// Parse lambda source text into an expression AST
///
/// The text is expected to be a single expression, normally an arrow
/// function such as `u => u.age >= p.minAge`. Returns [`ParseError::Syntax`]
/// when the text is not parseable JavaScript.
pub fn parse_lambda(source: &str) -> ParseResult<EsExpr> {
    let mut parser = Parser::new();
    parser
        .set_language(language())
        .map_err(|_| ParseError::Syntax)?;

    let tree = parser.parse(source, None).ok_or(ParseError::Syntax)?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(ParseError::Syntax);
    }

    let reader = Reader { source };
    let statement = reader.sole_named_child(root)?;
    let expr = match statement.kind() {
        "expression_statement" => reader.sole_named_child(statement)?,
        _ => statement,
    };
    reader.convert(expr)
}

struct Reader<'s> {
    source: &'s str,
}

impl<'s> Reader<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// The single meaningful child of a wrapper node, skipping comments
    fn sole_named_child<'t>(&self, node: Node<'t>) -> ParseResult<Node<'t>> {
        let mut found = None;
        for i in 0..node.named_child_count() {
            let child = node.named_child(i).ok_or(ParseError::Syntax)?;
            if child.kind() == "comment" {
                continue;
            }
            if found.is_some() {
                return Err(ParseError::Syntax);
            }
            found = Some(child);
        }
        found.ok_or(ParseError::Syntax)
    }

    fn named_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        (0..node.named_child_count())
            .filter_map(|i| node.named_child(i))
            .filter(|child| child.kind() != "comment")
            .collect()
    }

    fn field<'t>(&self, node: Node<'t>, name: &str) -> ParseResult<Node<'t>> {
        node.child_by_field_name(name)
            .ok_or_else(|| ParseError::UnknownExpression {
                kind: node.kind().to_string(),
            })
    }

    fn convert(&self, node: Node<'_>) -> ParseResult<EsExpr> {
        match node.kind() {
            "arrow_function" => self.convert_arrow(node),
            "binary_expression" => self.convert_binary(node),
            "unary_expression" => self.convert_unary(node),
            "ternary_expression" => Ok(EsExpr::Conditional {
                test: Box::new(self.convert(self.field(node, "condition")?)?),
                consequent: Box::new(self.convert(self.field(node, "consequence")?)?),
                alternate: Box::new(self.convert(self.field(node, "alternative")?)?),
            }),
            "member_expression" => {
                let object = self.convert(self.field(node, "object")?)?;
                let property = self.text(self.field(node, "property")?);
                Ok(EsExpr::member(object, property))
            }
            "subscript_expression" => {
                let object = self.convert(self.field(node, "object")?)?;
                let index = self.field(node, "index")?;
                // row["order"] is the escape hatch for reserved identifiers
                if index.kind() == "string" {
                    return Ok(EsExpr::member(object, self.string_value(index)));
                }
                Ok(EsExpr::Index {
                    object: Box::new(object),
                    index: Box::new(self.convert(index)?),
                })
            }
            "call_expression" => {
                let callee = self.convert(self.field(node, "function")?)?;
                let arguments = self.field(node, "arguments")?;
                let args = self
                    .named_children(arguments)
                    .into_iter()
                    .map(|arg| self.convert(arg))
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(EsExpr::call(callee, args))
            }
            "parenthesized_expression" => self.convert(self.sole_named_child(node)?),
            "object" => self.convert_object(node),
            "array" => Ok(EsExpr::Array(
                self.named_children(node)
                    .into_iter()
                    .map(|item| self.convert(item))
                    .collect::<ParseResult<Vec<_>>>()?,
            )),
            "identifier" => {
                let name = self.text(node);
                if name == "undefined" {
                    Ok(EsExpr::Undefined)
                } else {
                    Ok(EsExpr::Identifier(name.to_string()))
                }
            }
            "string" => Ok(EsExpr::String(self.string_value(node))),
            "template_string" => self.convert_template(node),
            "number" => {
                let text = self.text(node);
                text.parse::<f64>()
                    .map(EsExpr::Number)
                    .map_err(|_| ParseError::UnknownExpression {
                        kind: format!("number literal {text}"),
                    })
            }
            "true" => Ok(EsExpr::Bool(true)),
            "false" => Ok(EsExpr::Bool(false)),
            "null" => Ok(EsExpr::Null),
            "undefined" => Ok(EsExpr::Undefined),
            kind => Err(ParseError::UnknownExpression {
                kind: kind.to_string(),
            }),
        }
    }

    fn convert_arrow(&self, node: Node<'_>) -> ParseResult<EsExpr> {
        let mut params = Vec::new();
        if let Some(single) = node.child_by_field_name("parameter") {
            if single.kind() != "identifier" {
                return Err(ParseError::UnsupportedParameter {
                    context: self.text(node).to_string(),
                });
            }
            params.push(self.text(single).to_string());
        } else if let Some(list) = node.child_by_field_name("parameters") {
            for param in self.named_children(list) {
                if param.kind() != "identifier" {
                    return Err(ParseError::UnsupportedParameter {
                        context: self.text(node).to_string(),
                    });
                }
                params.push(self.text(param).to_string());
            }
        }

        let body_node = self.field(node, "body")?;
        let body = if body_node.kind() == "statement_block" {
            let mut returned = None;
            for child in self.named_children(body_node) {
                match child.kind() {
                    "return_statement" if returned.is_none() => {
                        returned = Some(self.convert(self.sole_named_child(child)?)?);
                    }
                    _ => return Err(ParseError::BlockBody),
                }
            }
            returned.ok_or(ParseError::BlockBody)?
        } else {
            self.convert(body_node)?
        };

        Ok(EsExpr::Arrow(Box::new(EsArrow { params, body })))
    }

    fn convert_binary(&self, node: Node<'_>) -> ParseResult<EsExpr> {
        let left = self.convert(self.field(node, "left")?)?;
        let right = self.convert(self.field(node, "right")?)?;
        let op_text = self.text(self.field(node, "operator")?);
        let op = match op_text {
            "==" | "===" => EsBinaryOp::Eq,
            "!=" | "!==" => EsBinaryOp::Ne,
            ">" => EsBinaryOp::Gt,
            ">=" => EsBinaryOp::Ge,
            "<" => EsBinaryOp::Lt,
            "<=" => EsBinaryOp::Le,
            "+" => EsBinaryOp::Add,
            "-" => EsBinaryOp::Sub,
            "*" => EsBinaryOp::Mul,
            "/" => EsBinaryOp::Div,
            "%" => EsBinaryOp::Mod,
            "&&" => EsBinaryOp::And,
            "||" => EsBinaryOp::Or,
            "??" => EsBinaryOp::NullishCoalesce,
            other => {
                return Err(ParseError::UnknownExpression {
                    kind: format!("operator {other}"),
                });
            }
        };
        Ok(EsExpr::binary(op, left, right))
    }

    fn convert_unary(&self, node: Node<'_>) -> ParseResult<EsExpr> {
        let argument = self.convert(self.field(node, "argument")?)?;
        match self.text(self.field(node, "operator")?) {
            "!" => Ok(EsExpr::Unary {
                op: EsUnaryOp::Not,
                argument: Box::new(argument),
            }),
            "-" => Ok(EsExpr::Unary {
                op: EsUnaryOp::Neg,
                argument: Box::new(argument),
            }),
            "+" => Ok(argument),
            other => Err(ParseError::UnknownExpression {
                kind: format!("operator {other}"),
            }),
        }
    }

    fn convert_object(&self, node: Node<'_>) -> ParseResult<EsExpr> {
        let mut properties = Vec::new();
        for child in self.named_children(node) {
            match child.kind() {
                "pair" => {
                    let key_node = self.field(child, "key")?;
                    let key = match key_node.kind() {
                        "property_identifier" => self.text(key_node).to_string(),
                        "string" => self.string_value(key_node),
                        "number" => self.text(key_node).to_string(),
                        kind => {
                            return Err(ParseError::UnknownExpression {
                                kind: kind.to_string(),
                            });
                        }
                    };
                    let value = self.convert(self.field(child, "value")?)?;
                    properties.push((key, value));
                }
                "shorthand_property_identifier" => {
                    let name = self.text(child).to_string();
                    properties.push((name.clone(), EsExpr::Identifier(name)));
                }
                kind => {
                    return Err(ParseError::UnknownExpression {
                        kind: kind.to_string(),
                    });
                }
            }
        }
        Ok(EsExpr::Object(properties))
    }

    fn convert_template(&self, node: Node<'_>) -> ParseResult<EsExpr> {
        // Substitution-free templates are plain strings
        let mut value = String::new();
        for child in self.named_children(node) {
            match child.kind() {
                "string_fragment" => value.push_str(self.text(child)),
                "escape_sequence" => value.push_str(&unescape(self.text(child))),
                kind => {
                    return Err(ParseError::UnknownExpression {
                        kind: kind.to_string(),
                    });
                }
            }
        }
        Ok(EsExpr::String(value))
    }

    /// Quoted string node -> unquoted, unescaped value
    fn string_value(&self, node: Node<'_>) -> String {
        let mut value = String::new();
        let fragments = self.named_children(node);
        if fragments.is_empty() {
            let raw = self.text(node);
            if raw.len() >= 2 {
                return unescape(&raw[1..raw.len() - 1]);
            }
            return raw.to_string();
        }
        for fragment in fragments {
            match fragment.kind() {
                "escape_sequence" => value.push_str(&unescape(self.text(fragment))),
                _ => value.push_str(self.text(fragment)),
            }
        }
        value
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
