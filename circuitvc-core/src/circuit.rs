// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Circuit payload parsing
//!
//! Turns a circuit source (OpenQASM 2/3 style) into an ordered sequence of
//! [`Operation`]s for structural diffing. Parsing never fails: anything that
//! is not a recognizable gate application or declaration is kept as an
//! [`Operation::Unparsed`] pseudo-operation carrying its normalized text, so
//! every byte of the payload still shows up in a diff.
//!
//! ## Statement rules
//!
//! - `//` and `/* */` comments are dropped
//! - statements end with `;`; a `{ ... }` block ends at its closing brace
//! - sources without any `;` or `{` (e.g. Python circuit scripts) are split
//!   per non-empty line; there `#` starts a comment and `//` is an operator

use serde::{Deserialize, Serialize};
use std::fmt;

/// Statement keywords that declare structure rather than apply a gate.
const DECLARATION_KEYWORDS: &[&str] = &[
    "OPENQASM", "include", "qreg", "creg", "qubit", "bit", "gate", "opaque", "def", "input",
    "output", "const",
];

/// A register reference: `q` or `q[3]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operand {
    pub register: String,
    pub index: Option<u32>,
}

impl Operand {
    pub fn new(register: impl Into<String>, index: Option<u32>) -> Self {
        Self {
            register: register.into(),
            index,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.register, index),
            None => write!(f, "{}", self.register),
        }
    }
}

/// A gate application: `name(params) operands`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateOp {
    pub name: String,
    /// Parameter expressions with all whitespace removed (`pi/2`)
    pub params: Vec<String>,
    /// Target qubits, then classical targets for `measure`
    pub operands: Vec<Operand>,
    /// Classical condition from `if (c==1) ...`, whitespace removed
    pub condition: Option<String>,
}

impl GateOp {
    pub fn new(name: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            operands,
            condition: None,
        }
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }
}

impl fmt::Display for GateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cond) = &self.condition {
            write!(f, "if ({}) ", cond)?;
        }
        write!(f, "{}", self.name)?;
        if !self.params.is_empty() {
            write!(f, "({})", self.params.join(", "))?;
        }
        if self.name == "measure" && self.operands.len() == 2 {
            return write!(f, " {} -> {}", self.operands[0], self.operands[1]);
        }
        let operands: Vec<String> = self.operands.iter().map(|o| o.to_string()).collect();
        if !operands.is_empty() {
            write!(f, " {}", operands.join(", "))?;
        }
        Ok(())
    }
}

/// One element of a parsed circuit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Header, include, register or gate-definition statement
    Declaration { keyword: String, body: String },
    /// Gate application (including `measure`, `reset`, `barrier`)
    Gate(GateOp),
    /// Anything else, kept verbatim modulo whitespace
    Unparsed { text: String },
}

impl Operation {
    pub fn gate(name: impl Into<String>, operands: Vec<Operand>) -> Self {
        Operation::Gate(GateOp::new(name, operands))
    }

    /// Gate name for gate applications
    pub fn gate_name(&self) -> Option<&str> {
        match self {
            Operation::Gate(op) => Some(&op.name),
            _ => None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        matches!(self, Operation::Declaration { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Declaration { keyword, body } if body.is_empty() => write!(f, "{}", keyword),
            Operation::Declaration { keyword, body } => write!(f, "{} {}", keyword, body),
            Operation::Gate(op) => write!(f, "{}", op),
            Operation::Unparsed { text } => write!(f, "{}", text),
        }
    }
}

/// Parse raw payload bytes. Invalid UTF-8 is replaced, not rejected.
pub fn parse_payload(payload: &[u8]) -> Vec<Operation> {
    parse_circuit(&String::from_utf8_lossy(payload))
}

/// Parse circuit source text into operations in declaration order.
pub fn parse_circuit(source: &str) -> Vec<Operation> {
    let stripped = strip_comments(source);

    if !stripped.contains(';') && !stripped.contains('{') {
        return source
            .lines()
            .map(|line| normalize_whitespace(strip_hash_comment(line)))
            .filter(|line| !line.is_empty())
            .map(|text| Operation::Unparsed { text })
            .collect();
    }

    split_statements(&stripped)
        .iter()
        .filter_map(|stmt| classify(stmt))
        .collect()
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

/// Drop a `#` comment from one line of script source, ignoring `#` inside
/// quoted strings.
fn strip_hash_comment(line: &str) -> &str {
    let mut quote = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '#' => return &line[..i],
                _ => {}
            },
        }
    }
    line
}

fn split_statements(source: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in source.chars() {
        current.push(c);
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    statements.push(std::mem::take(&mut current));
                }
            }
            ';' if depth == 0 => {
                current.pop();
                statements.push(std::mem::take(&mut current));
            }
            _ => {}
        }
    }

    // Trailing text without a terminator
    if !current.trim().is_empty() {
        statements.push(current);
    }

    statements
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn classify(statement: &str) -> Option<Operation> {
    let text = normalize_whitespace(statement);
    if text.is_empty() {
        return None;
    }

    let (ident, rest) = split_identifier(&text);
    if DECLARATION_KEYWORDS.contains(&ident) {
        return Some(Operation::Declaration {
            keyword: ident.to_string(),
            body: rest.trim().to_string(),
        });
    }

    Some(match parse_statement(&text) {
        Some(op) => Operation::Gate(op),
        None => Operation::Unparsed { text },
    })
}

fn parse_statement(text: &str) -> Option<GateOp> {
    let (ident, rest) = split_identifier(text);

    if ident == "if" {
        let rest = rest.trim_start();
        let (inner, after) = take_parenthesized(rest)?;
        let mut op = parse_statement(after.trim())?;
        if op.condition.is_some() {
            return None;
        }
        op.condition = Some(strip_whitespace(inner));
        return Some(op);
    }

    // OpenQASM 3 assignment form: `c[0] = measure q[0]`
    if let Some((target, source)) = text.split_once('=') {
        let source = source.trim();
        let (keyword, measured) = split_identifier(source);
        if keyword != "measure" {
            return None;
        }
        let measured = parse_operand(measured)?;
        let target = parse_operand(target)?;
        return Some(GateOp::new("measure", vec![measured, target]));
    }

    if ident == "measure" {
        if let Some((from, to)) = rest.split_once("->") {
            return Some(GateOp::new(
                "measure",
                vec![parse_operand(from)?, parse_operand(to)?],
            ));
        }
    }

    parse_gate(text)
}

fn parse_gate(text: &str) -> Option<GateOp> {
    let (name, rest) = split_identifier(text);
    if name.is_empty() {
        return None;
    }

    let mut rest = rest.trim_start();
    let mut params = Vec::new();
    if rest.starts_with('(') {
        let (inner, after) = take_parenthesized(rest)?;
        params = split_top_level(inner)
            .into_iter()
            .map(strip_whitespace)
            .collect();
        if params.iter().any(|p| p.is_empty()) {
            return None;
        }
        rest = after.trim_start();
    }

    let operands = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',')
            .map(parse_operand)
            .collect::<Option<Vec<_>>>()?
    };

    if operands.is_empty() && params.is_empty() {
        return None;
    }

    Some(GateOp {
        name: name.to_string(),
        params,
        operands,
        condition: None,
    })
}

fn parse_operand(text: &str) -> Option<Operand> {
    let text = strip_whitespace(text);
    let (register, rest) = split_identifier(&text);
    if register.is_empty() {
        return None;
    }
    if rest.is_empty() {
        return Some(Operand::new(register, None));
    }
    let index = rest.strip_prefix('[')?.strip_suffix(']')?;
    let index = index.parse::<u32>().ok()?;
    Some(Operand::new(register, Some(index)))
}

/// Split a leading identifier (`[A-Za-z_][A-Za-z0-9_]*`) off `text`.
fn split_identifier(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    let mut end = 0;
    for (i, c) in text.char_indices() {
        let valid = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !valid {
            break;
        }
        end = i + c.len_utf8();
    }
    text.split_at(end)
}

/// Given text starting with `(`, return the inside of the balanced group and
/// the remainder after the closing `)`.
fn take_parenthesized(text: &str) -> Option<(&str, &str)> {
    if !text.starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&text[1..i], &text[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
