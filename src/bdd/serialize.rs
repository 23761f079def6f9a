//! BDD serialization (component C4, spec.md §4.4): a textual, section
//! delimited format carrying a kQuery-flavored expression pool per call
//! path, a global expression pool, a node table, an edge table, and a
//! roots footer.
//!
//! The exact kQuery SMT-LIB grammar is out of scope (spec.md §1: "the
//! kQuery serialization format is specified only to the extent required to
//! round-trip the BDD"), so expressions are written as a small
//! self-contained s-expression syntax instead of full SMT-LIB. This module
//! hand-rolls its own lexer/parser for that syntax and for the node/edge
//! sections, the same way this lineage's `pla.rs` hand-rolls the
//! line-oriented PLA format rather than reaching for a parser-generator —
//! `lalrpop` remains this crate's choice for genuine infix-operator
//! grammars (none of which this format has).

use super::populate::generated_symbols_of;
use super::{Bdd, Node, NodeId, ReturnInitValue, ReturnProcessOp};
use crate::call::{Arg, Call, CallBuilder, CallPath, CallPathBuilder};
use crate::error::{Error, ParseError, Result};
use crate::expr::{apply_binop, Expr, ExprBinOp};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

// ---- Lexer ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Amp,
    Arrow,
    Word(String),
}

fn lex(s: &str) -> Vec<Tok> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '(' => {
                out.push(Tok::LParen);
                chars.next();
            }
            ')' => {
                out.push(Tok::RParen);
                chars.next();
            }
            '[' => {
                out.push(Tok::LBracket);
                chars.next();
            }
            ']' => {
                out.push(Tok::RBracket);
                chars.next();
            }
            '{' => {
                out.push(Tok::LBrace);
                chars.next();
            }
            '}' => {
                out.push(Tok::RBrace);
                chars.next();
            }
            ',' => {
                out.push(Tok::Comma);
                chars.next();
            }
            ':' => {
                out.push(Tok::Colon);
                chars.next();
            }
            '&' => {
                out.push(Tok::Amp);
                chars.next();
            }
            '-' => {
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                    out.push(Tok::Arrow);
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if "()[]{},:&".contains(c) || c.is_whitespace() || c == '-' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                out.push(Tok::Word(word));
            }
        }
    }
    out
}

struct Parser<'a> {
    toks: &'a [Tok],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(toks: &'a [Tok]) -> Parser<'a> {
        Parser { toks, pos: 0 }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Result<Tok> {
        let t = self
            .toks
            .get(self.pos)
            .cloned()
            .ok_or_else(|| syntax_err("unexpected end of input"))?;
        self.pos += 1;
        Ok(t)
    }

    fn expect(&mut self, want: &Tok) -> Result<()> {
        let t = self.bump()?;
        if &t == want {
            Ok(())
        } else {
            Err(syntax_err(&format!("expected {:?}, found {:?}", want, t)))
        }
    }

    fn expect_word(&mut self) -> Result<String> {
        match self.bump()? {
            Tok::Word(w) => Ok(w),
            other => Err(syntax_err(&format!("expected a word, found {:?}", other))),
        }
    }

    fn expect_number(&mut self) -> Result<u128> {
        let w = self.expect_word()?;
        w.parse::<u128>().map_err(|_| syntax_err(&format!("expected a number, found `{}`", w)))
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.expect(&Tok::LParen)?;
        let head = self.expect_word()?;
        let e = match head.as_str() {
            "const" => {
                let v = self.expect_number()?;
                let w = self.expect_number()? as u32;
                Expr::constant(v, w)
            }
            "read" => {
                let array = self.expect_word()?;
                let index = self.parse_expr()?;
                Expr::read(array, &index)
            }
            "concat" => {
                let hi = self.parse_expr()?;
                let lo = self.parse_expr()?;
                Expr::concat(&hi, &lo)
            }
            "extract" => {
                let src = self.parse_expr()?;
                let offset = self.expect_number()? as u32;
                let width = self.expect_number()? as u32;
                Expr::extract(&src, offset, width)
            }
            "zext" => {
                let src = self.parse_expr()?;
                let w = self.expect_number()? as u32;
                Expr::zext(&src, w)
            }
            "sext" => {
                let src = self.parse_expr()?;
                let w = self.expect_number()? as u32;
                Expr::sext(&src, w)
            }
            "not" => {
                let src = self.parse_expr()?;
                Expr::not(&src)
            }
            "select" => {
                let c = self.parse_expr()?;
                let t = self.parse_expr()?;
                let f = self.parse_expr()?;
                Expr::select(&c, &t, &f)
            }
            other => {
                let op = binop_from_name(other).ok_or_else(|| syntax_err(&format!("unknown expression head `{}`", other)))?;
                let a = self.parse_expr()?;
                let b = self.parse_expr()?;
                apply_binop(op, &a, &b)
            }
        };
        self.expect(&Tok::RParen)?;
        Ok(e)
    }

    /// Parses one `name:expr[&suffix]` argument.
    fn parse_arg(&mut self) -> Result<(String, Arg)> {
        let name = self.expect_word()?;
        self.expect(&Tok::Colon)?;
        let expr = self.parse_expr()?;
        if self.peek() == Some(&Tok::Amp) {
            self.bump()?;
            if self.peek() == Some(&Tok::LBracket) {
                self.bump()?;
                let in_ = self.parse_expr()?;
                self.expect(&Tok::Arrow)?;
                let out = self.parse_expr()?;
                self.expect(&Tok::RBracket)?;
                return Ok((
                    name,
                    Arg {
                        expr: in_.clone(),
                        in_: Some(in_),
                        out: Some(out),
                        fn_ptr_name: None,
                    },
                ));
            }
            let fn_ptr_name = self.expect_word()?;
            return Ok((
                name,
                Arg {
                    expr,
                    in_: None,
                    out: None,
                    fn_ptr_name: Some(Arc::from(fn_ptr_name.as_str())),
                },
            ));
        }
        Ok((name, Arg::new(expr)))
    }

    fn parse_call(&mut self) -> Result<Call> {
        let function = self.expect_word()?;
        self.expect(&Tok::LParen)?;
        let mut builder = CallBuilder::new(function);
        if self.peek() != Some(&Tok::RParen) {
            loop {
                let (name, arg) = self.parse_arg()?;
                builder = builder.arg(name, arg);
                if self.peek() == Some(&Tok::Comma) {
                    self.bump()?;
                    continue;
                }
                break;
            }
        }
        self.expect(&Tok::RParen)?;

        if self.peek() == Some(&Tok::LBrace) {
            self.bump()?;
            while self.peek() != Some(&Tok::RBrace) {
                let name = self.expect_word()?;
                self.expect(&Tok::Colon)?;
                self.expect(&Tok::LBracket)?;
                let before = self.parse_expr()?;
                self.expect(&Tok::Arrow)?;
                let after = self.parse_expr()?;
                self.expect(&Tok::RBracket)?;
                builder = builder.extra_var(name, before, after);
            }
            self.expect(&Tok::RBrace)?;
        }

        self.expect(&Tok::Arrow)?;
        if self.peek() == Some(&Tok::LBracket) {
            self.bump()?;
            self.expect(&Tok::RBracket)?;
        } else {
            let ret = self.parse_expr()?;
            builder = builder.ret(ret);
        }
        Ok(builder.build())
    }
}

fn syntax_err(message: &str) -> Error {
    Error::from(ParseError::Syntax {
        file: None,
        line: 0,
        message: message.to_string(),
    })
}

fn binop_from_name(name: &str) -> Option<ExprBinOp> {
    use ExprBinOp::*;
    Some(match name {
        "add" => Add,
        "sub" => Sub,
        "mul" => Mul,
        "udiv" => UDiv,
        "sdiv" => SDiv,
        "urem" => URem,
        "srem" => SRem,
        "and" => And,
        "or" => Or,
        "xor" => Xor,
        "shl" => Shl,
        "lshr" => LShr,
        "ashr" => AShr,
        "eq" => Eq,
        "ne" => Ne,
        "ult" => Ult,
        "ule" => Ule,
        "ugt" => Ugt,
        "uge" => Uge,
        "slt" => Slt,
        "sle" => Sle,
        "sgt" => Sgt,
        "sge" => Sge,
        _ => return None,
    })
}

fn binop_name(op: ExprBinOp) -> &'static str {
    use ExprBinOp::*;
    match op {
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        UDiv => "udiv",
        SDiv => "sdiv",
        URem => "urem",
        SRem => "srem",
        And => "and",
        Or => "or",
        Xor => "xor",
        Shl => "shl",
        LShr => "lshr",
        AShr => "ashr",
        Eq => "eq",
        Ne => "ne",
        Ult => "ult",
        Ule => "ule",
        Ugt => "ugt",
        Uge => "uge",
        Slt => "slt",
        Sle => "sle",
        Sgt => "sgt",
        Sge => "sge",
    }
}

// ---- Encoding -------------------------------------------------------------

fn encode_expr(e: &Expr) -> String {
    use crate::expr::ExprView;
    match e.view() {
        ExprView::Constant(v) => format!("(const {} {})", v, e.width()),
        ExprView::Read { array, index } => format!("(read {} {})", array, encode_expr(&index)),
        ExprView::Concat(hi, lo) => format!("(concat {} {})", encode_expr(&hi), encode_expr(&lo)),
        ExprView::Extract { src, offset } => format!("(extract {} {} {})", encode_expr(&src), offset, e.width()),
        ExprView::ZExt(src) => format!("(zext {} {})", encode_expr(&src), e.width()),
        ExprView::SExt(src) => format!("(sext {} {})", encode_expr(&src), e.width()),
        ExprView::Not(src) => format!("(not {})", encode_expr(&src)),
        ExprView::Binary(op, a, b) => format!("({} {} {})", binop_name(op), encode_expr(&a), encode_expr(&b)),
        ExprView::Select { cond, then_branch, else_branch } => {
            format!("(select {} {} {})", encode_expr(&cond), encode_expr(&then_branch), encode_expr(&else_branch))
        }
    }
}

fn encode_arg(name: &str, arg: &Arg) -> String {
    let mut s = format!("{}:{}", name, encode_expr(&arg.expr));
    if let Some(fname) = &arg.fn_ptr_name {
        let _ = write!(s, "&{}", fname);
    } else if let (Some(in_), Some(out)) = (&arg.in_, &arg.out) {
        let _ = write!(s, "&[{}->{}]", encode_expr(in_), encode_expr(out));
    }
    s
}

fn encode_call(call: &Call) -> String {
    let args: Vec<String> = call.args().map(|(n, a)| encode_arg(n, a)).collect();
    let mut s = format!("{}({})", call.function, args.join(", "));
    let extras: Vec<String> = call
        .extra_vars()
        .map(|(n, (before, after))| format!("{}:[{}->{}]", n, encode_expr(before), encode_expr(after)))
        .collect();
    if !extras.is_empty() {
        let _ = write!(s, "{{{}}}", extras.join(" "));
    }
    s.push_str("->");
    match &call.ret {
        Some(ret) => s.push_str(&encode_expr(ret)),
        None => s.push_str("[]"),
    }
    s
}

fn encode_provenance(files: &[Arc<str>]) -> String {
    let quoted: Vec<String> = files.iter().map(|f| format!("\"{}\"", f)).collect();
    format!("[{}]", quoted.join(" "))
}

fn parse_provenance(s: &str) -> Vec<Arc<str>> {
    s.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split_whitespace()
        .map(|w| Arc::from(w.trim_matches('"')))
        .collect()
}

/// Serializes `bdd` and the call paths it was built from into the
/// five-section textual format of spec.md §4.4.
pub fn serialize(bdd: &Bdd, call_paths: &[CallPath]) -> String {
    let mut out = String::new();

    for path in call_paths {
        let _ = writeln!(out, ";;-- Call path kQuery --");
        let _ = writeln!(out, "filename:{}", path.filename);
        for c in &path.constraints {
            let _ = writeln!(out, "{}", encode_expr(c));
        }
    }

    // Global pool, keyed by each node's payload expression: Branch
    // conditions and every expression transitively referenced by a Call.
    let mut pool: Vec<Expr> = Vec::new();
    let mut pool_index: HashMap<u64, usize> = HashMap::new();
    let mut pool_of = |e: &Expr, pool: &mut Vec<Expr>, idx: &mut HashMap<u64, usize>| -> usize {
        *idx.entry(e.node_id()).or_insert_with(|| {
            let i = pool.len();
            pool.push(e.clone());
            i
        })
    };

    let mut branch_pool_indices: HashMap<NodeId, usize> = HashMap::new();
    for n in bdd.iter() {
        if let Node::Branch { id, condition, .. } = n {
            let i = pool_of(condition, &mut pool, &mut pool_index);
            branch_pool_indices.insert(*id, i);
        }
    }

    let _ = writeln!(out, ";;-- kQuery --");
    for (i, e) in pool.iter().enumerate() {
        let _ = writeln!(out, "N{}:{}", i, encode_expr(e));
    }

    let _ = writeln!(out, ";; -- Nodes --");
    for n in bdd.iter() {
        let (kind, payload) = match n {
            Node::Call { call, .. } => ("CALL".to_string(), encode_call(call)),
            Node::Branch { id, .. } => ("BRANCH".to_string(), branch_pool_indices[id].to_string()),
            Node::ReturnInit { value, .. } => (
                "RETURN_INIT".to_string(),
                match value {
                    ReturnInitValue::Success => "SUCCESS".to_string(),
                    ReturnInitValue::Failure => "FAILURE".to_string(),
                },
            ),
            Node::ReturnProcess { operation, .. } => (
                "RETURN_PROCESS".to_string(),
                match operation {
                    ReturnProcessOp::Fwd(port) => format!("FWD {}", port),
                    ReturnProcessOp::Drop => "DROP 0".to_string(),
                    ReturnProcessOp::Broadcast => "BCAST 0".to_string(),
                    ReturnProcessOp::Err => "ERR 0".to_string(),
                },
            ),
        };
        let _ = writeln!(out, "{}:({} {} {})", n.id(), encode_provenance(n.provenance()), kind, payload);
    }

    let _ = writeln!(out, ";; -- Edges --");
    for n in bdd.iter() {
        match n {
            Node::Call { id, next, .. } => {
                let _ = writeln!(out, "({}->{})", id, next);
            }
            Node::Branch { id, on_true, on_false, .. } => {
                let _ = writeln!(out, "({}->{}->{})", id, on_true, on_false);
            }
            Node::ReturnInit { .. } | Node::ReturnProcess { .. } => {}
        }
    }

    let _ = writeln!(out, ";; -- Roots --");
    let _ = writeln!(out, "init:{}", bdd.init_root());
    let _ = writeln!(out, "process:{}", bdd.process_root());

    out
}

enum PartialNode {
    Branch { condition: Expr, provenance: Vec<Arc<str>> },
    Call { call: Call, provenance: Vec<Arc<str>> },
    ReturnInit { value: ReturnInitValue, provenance: Vec<Arc<str>> },
    ReturnProcess { operation: ReturnProcessOp, provenance: Vec<Arc<str>> },
}

/// The inverse of [`serialize`]: parses the three expression pools, then
/// the node/edge/roots sections, producing a `Bdd` isomorphic to the
/// original modulo node-id renumbering (spec.md §8 property 5).
pub fn deserialize(text: &str) -> Result<(Bdd, Vec<CallPath>)> {
    let mut lines = text.lines().peekable();
    let mut call_paths = Vec::new();

    while lines.peek().map(|l| l.trim() == ";;-- Call path kQuery --").unwrap_or(false) {
        lines.next();
        let header = lines.next().ok_or_else(|| syntax_err("missing call-path filename header"))?;
        let filename = header
            .strip_prefix("filename:")
            .ok_or_else(|| syntax_err("expected `filename:` header"))?;
        let mut builder = CallPathBuilder::new(filename);
        while let Some(&line) = lines.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(";;") {
                break;
            }
            let toks = lex(trimmed);
            let mut p = Parser::new(&toks);
            builder = builder.constraint(p.parse_expr()?);
            lines.next();
        }
        call_paths.push(builder.build());
    }

    expect_section_header(&mut lines, ";;-- kQuery --")?;
    let mut pool: Vec<Expr> = Vec::new();
    while let Some(&line) = lines.peek() {
        let trimmed = line.trim();
        if !trimmed.starts_with('N') {
            break;
        }
        lines.next();
        let (_label, rest) = trimmed.split_once(':').ok_or_else(|| syntax_err("malformed pool entry"))?;
        let toks = lex(rest);
        let mut p = Parser::new(&toks);
        pool.push(p.parse_expr()?);
    }

    expect_section_header(&mut lines, ";; -- Nodes --")?;
    let mut partials: Vec<PartialNode> = Vec::new();
    while let Some(&line) = lines.peek() {
        let trimmed = line.trim();
        if !trimmed.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            break;
        }
        lines.next();
        let (id_str, rest) = trimmed.split_once(':').ok_or_else(|| syntax_err("malformed node entry"))?;
        let id: usize = id_str.parse().map_err(|_| syntax_err("malformed node id"))?;
        let body = rest.trim().trim_start_matches('(').trim_end_matches(')');
        let bracket_end = body.find(']').ok_or_else(|| syntax_err("malformed node provenance"))?;
        let provenance = parse_provenance(&body[..=bracket_end]);
        let remainder = body[bracket_end + 1..].trim();
        let (kind, payload) = remainder.split_once(' ').unwrap_or((remainder, ""));

        let partial = match kind {
            "CALL" => {
                let toks = lex(payload);
                let mut p = Parser::new(&toks);
                PartialNode::Call {
                    call: p.parse_call()?,
                    provenance,
                }
            }
            "BRANCH" => {
                let idx: usize = payload.trim().parse().map_err(|_| syntax_err("malformed branch pool index"))?;
                let condition = pool
                    .get(idx)
                    .cloned()
                    .ok_or(Error::from(ParseError::DanglingReference { section: "Nodes", index: idx }))?;
                PartialNode::Branch { condition, provenance }
            }
            "RETURN_INIT" => {
                let value = match payload.trim() {
                    "SUCCESS" => ReturnInitValue::Success,
                    "FAILURE" => ReturnInitValue::Failure,
                    other => return Err(syntax_err(&format!("unknown ReturnInit value `{}`", other))),
                };
                PartialNode::ReturnInit { value, provenance }
            }
            "RETURN_PROCESS" => {
                let mut parts = payload.split_whitespace();
                let tag = parts.next().unwrap_or_default();
                let arg: u32 = parts.next().unwrap_or("0").parse().unwrap_or(0);
                let operation = match tag {
                    "FWD" => ReturnProcessOp::Fwd(arg),
                    "DROP" => ReturnProcessOp::Drop,
                    "BCAST" => ReturnProcessOp::Broadcast,
                    "ERR" => ReturnProcessOp::Err,
                    other => return Err(syntax_err(&format!("unknown ReturnProcess operation `{}`", other))),
                };
                PartialNode::ReturnProcess { operation, provenance }
            }
            other => return Err(syntax_err(&format!("unknown node kind `{}`", other))),
        };
        if partials.len() != id {
            return Err(Error::from(ParseError::DanglingReference { section: "Nodes", index: id }));
        }
        partials.push(partial);
    }

    expect_section_header(&mut lines, ";; -- Edges --")?;
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    while let Some(&line) = lines.peek() {
        let trimmed = line.trim();
        if !trimmed.starts_with('(') {
            break;
        }
        lines.next();
        let inner = trimmed.trim_start_matches('(').trim_end_matches(')');
        let ids: Result<Vec<NodeId>> = inner
            .split("->")
            .map(|s| s.trim().parse::<NodeId>().map_err(|_| syntax_err("malformed edge")))
            .collect();
        let mut ids = ids?;
        let src = ids.remove(0);
        successors.insert(src, ids);
    }

    expect_section_header(&mut lines, ";; -- Roots --")?;
    let init_line = lines.next().ok_or_else(|| syntax_err("missing init root"))?;
    let process_line = lines.next().ok_or_else(|| syntax_err("missing process root"))?;
    let init_root: NodeId = init_line
        .trim()
        .strip_prefix("init:")
        .ok_or_else(|| syntax_err("expected `init:` root"))?
        .parse()
        .map_err(|_| syntax_err("malformed init root"))?;
    let process_root: NodeId = process_line
        .trim()
        .strip_prefix("process:")
        .ok_or_else(|| syntax_err("expected `process:` root"))?
        .parse()
        .map_err(|_| syntax_err("malformed process root"))?;

    let mut nodes = Vec::with_capacity(partials.len());
    for (id, partial) in partials.into_iter().enumerate() {
        let succ = successors.get(&id).cloned().unwrap_or_default();
        let node = match partial {
            PartialNode::Branch { condition, provenance } => Node::Branch {
                id,
                condition,
                on_true: succ[0],
                on_false: succ[1],
                provenance,
            },
            PartialNode::Call { call, provenance } => {
                let generated_symbols = generated_symbols_of(&call);
                Node::Call {
                    id,
                    call,
                    generated_symbols,
                    next: succ[0],
                    provenance,
                }
            }
            PartialNode::ReturnInit { value, provenance } => Node::ReturnInit { id, value, provenance },
            PartialNode::ReturnProcess { operation, provenance } => Node::ReturnProcess { id, operation, provenance },
        };
        nodes.push(node);
    }

    let bdd = Bdd::from_parts(nodes, init_root, process_root);
    bdd.check_shape()?;
    Ok((bdd, call_paths))
}

fn expect_section_header<'a>(lines: &mut std::iter::Peekable<std::str::Lines<'a>>, header: &str) -> Result<()> {
    match lines.next() {
        Some(l) if l.trim() == header => Ok(()),
        Some(other) => Err(syntax_err(&format!("expected section header `{}`, found `{}`", header, other))),
        None => Err(syntax_err(&format!("expected section header `{}`, found end of input", header))),
    }
}
