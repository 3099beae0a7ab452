//! Regex analysis: derive required literal substrings for index lookup.
//!
//! The planner walks the regex-syntax HIR and extracts a disjunction of
//! literal byte strings such that every match of the pattern contains at
//! least one of them. The suffix index turns each literal into a candidate
//! set; the full regex still verifies every candidate line.

use regex_syntax::hir::{self, Hir, HirKind, RepetitionKind, RepetitionRange};
use regex_syntax::ParserBuilder;

use crate::error::{Error, Result};

/// Reject regexes whose estimated compiled program exceeds this.
pub(crate) const MAX_PROGRAM_SIZE: u64 = 4000;
/// Reject regexes whose alternation fan-out during extraction exceeds this.
pub(crate) const MAX_WIDTH: usize = 200;
/// Literals are clipped to this many bytes; a prefix of a required substring
/// is still required.
const MAX_LITERAL_BYTES: usize = 64;
/// Character classes spanning more than this many code points yield nothing.
const CLASS_LIMIT: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Every match contains at least one of these byte strings.
    Literals(Vec<Vec<u8>>),
    /// No useful literals; scan every line.
    FullScan,
}

/// What the extractor knows about one HIR node.
#[derive(Debug, Clone)]
enum Info {
    /// The node matches exactly the strings in the set.
    Exact(Vec<Vec<u8>>),
    /// Every match of the node contains at least one string in the set as a
    /// substring. Strings are non-empty.
    Required(Vec<Vec<u8>>),
    /// Nothing is known to be required.
    Any,
}

/// Analyze `pattern` into an index plan.
///
/// `fold_case` parses with the case-insensitive flag, so folded literal
/// variants fall out of class expansion and the plan covers every case form
/// the verifier regex will accept.
pub(crate) fn plan(pattern: &str, fold_case: bool) -> Result<Plan> {
    let hir = ParserBuilder::new()
        .allow_invalid_utf8(true)
        .case_insensitive(fold_case)
        .build()
        .parse(pattern)
        .map_err(|e| Error::QuerySyntax(e.to_string()))?;

    let size = program_size(&hir);
    if size > MAX_PROGRAM_SIZE {
        return Err(Error::QueryTooComplex(format!(
            "program size {} exceeds {}",
            size, MAX_PROGRAM_SIZE
        )));
    }

    let set = match extract(&hir)? {
        Info::Exact(set) | Info::Required(set) => set,
        Info::Any => return Ok(Plan::FullScan),
    };
    // An empty string in the set means some match requires nothing.
    if set.is_empty() || set.iter().any(|l| l.is_empty()) {
        return Ok(Plan::FullScan);
    }
    let mut lits: Vec<Vec<u8>> = set
        .into_iter()
        .map(|mut l| {
            l.truncate(MAX_LITERAL_BYTES);
            l
        })
        .collect();
    lits.sort();
    lits.dedup();
    Ok(Plan::Literals(lits))
}

fn extract(h: &Hir) -> Result<Info> {
    Ok(match h.kind() {
        HirKind::Empty | HirKind::Anchor(_) | HirKind::WordBoundary(_) => {
            Info::Exact(vec![Vec::new()])
        }
        HirKind::Literal(lit) => Info::Exact(vec![literal_bytes(lit)]),
        HirKind::Class(class) => match expand_class(class) {
            Some(set) => Info::Exact(set),
            None => Info::Any,
        },
        HirKind::Group(g) => extract(&g.hir)?,
        HirKind::Repetition(rep) => {
            if repetition_min(&rep.kind) == 0 {
                Info::Any
            } else {
                // At least one occurrence: the inner literals are required,
                // but exactness is lost.
                match extract(&rep.hir)? {
                    Info::Exact(set) => demote(set),
                    other => other,
                }
            }
        }
        HirKind::Concat(list) => extract_concat(list)?,
        HirKind::Alternation(list) => extract_alternation(list)?,
    })
}

/// Concatenation: cartesian-append exact runs, closing a run whenever width,
/// literal length, or an inexact child would overflow it. The best closed run
/// (longest minimal literal) survives as the required set.
fn extract_concat(list: &[Hir]) -> Result<Info> {
    let mut exact = true;
    let mut best: Option<Vec<Vec<u8>>> = None;
    let mut cur: Vec<Vec<u8>> = vec![Vec::new()];
    for child in list {
        match extract(child)? {
            Info::Exact(set) => {
                let fits = cur.len() * set.len() <= MAX_WIDTH
                    && max_len(&cur) + max_len(&set) <= MAX_LITERAL_BYTES;
                if fits {
                    cur = cartesian(&cur, &set);
                } else {
                    exact = false;
                    best = better(best, usable(std::mem::take(&mut cur)));
                    if set.len() <= MAX_WIDTH {
                        cur = set;
                    } else {
                        best = better(best, usable(set));
                        cur = vec![Vec::new()];
                    }
                }
            }
            Info::Required(set) => {
                exact = false;
                best = better(best, usable(std::mem::replace(&mut cur, vec![Vec::new()])));
                best = better(best, Some(set));
            }
            Info::Any => {
                exact = false;
                best = better(best, usable(std::mem::replace(&mut cur, vec![Vec::new()])));
            }
        }
    }
    if exact {
        return Ok(Info::Exact(cur));
    }
    best = better(best, usable(cur));
    Ok(match best {
        Some(set) => Info::Required(set),
        None => Info::Any,
    })
}

/// Alternation: union of branch sets. A branch with nothing required makes
/// the whole node unprovable; a union wider than `MAX_WIDTH` is rejected.
fn extract_alternation(list: &[Hir]) -> Result<Info> {
    let mut union: Vec<Vec<u8>> = Vec::new();
    let mut exact = true;
    for child in list {
        let set = match extract(child)? {
            Info::Exact(set) => {
                if set.iter().any(|l| l.is_empty()) {
                    return Ok(Info::Any);
                }
                set
            }
            Info::Required(set) => {
                exact = false;
                set
            }
            Info::Any => return Ok(Info::Any),
        };
        union.extend(set);
        if union.len() > MAX_WIDTH {
            return Err(Error::QueryTooComplex(format!(
                "alternation width exceeds {}",
                MAX_WIDTH
            )));
        }
    }
    union.sort();
    union.dedup();
    Ok(if exact {
        Info::Exact(union)
    } else {
        Info::Required(union)
    })
}

fn demote(set: Vec<Vec<u8>>) -> Info {
    match usable(set) {
        Some(set) => Info::Required(set),
        None => Info::Any,
    }
}

/// A set works as a required disjunction only if it is non-empty and free of
/// empty strings.
fn usable(set: Vec<Vec<u8>>) -> Option<Vec<Vec<u8>>> {
    if set.is_empty() || set.iter().any(|l| l.is_empty()) {
        None
    } else {
        Some(set)
    }
}

/// Prefer the candidate whose rarest (shortest) literal is longest.
fn better(a: Option<Vec<Vec<u8>>>, b: Option<Vec<Vec<u8>>>) -> Option<Vec<Vec<u8>>> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let score = |s: &[Vec<u8>]| s.iter().map(Vec::len).min().unwrap_or(0);
            if score(&a) >= score(&b) {
                Some(a)
            } else {
                Some(b)
            }
        }
        (a, None) => a,
        (None, b) => b,
    }
}

fn cartesian(a: &[Vec<u8>], b: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(a.len() * b.len());
    for x in a {
        for y in b {
            let mut s = x.clone();
            s.extend_from_slice(y);
            out.push(s);
        }
    }
    out.sort();
    out.dedup();
    out
}

fn max_len(set: &[Vec<u8>]) -> usize {
    set.iter().map(Vec::len).max().unwrap_or(0)
}

fn literal_bytes(lit: &hir::Literal) -> Vec<u8> {
    match lit {
        hir::Literal::Unicode(c) => {
            let mut buf = [0u8; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
        hir::Literal::Byte(b) => vec![*b],
    }
}

/// Expand a small class into the set of its single-character byte strings.
fn expand_class(class: &hir::Class) -> Option<Vec<Vec<u8>>> {
    let mut out: Vec<Vec<u8>> = Vec::new();
    match class {
        hir::Class::Unicode(cls) => {
            for range in cls.iter() {
                let span = (range.end() as u32).saturating_sub(range.start() as u32) as usize;
                if out.len() + span + 1 > CLASS_LIMIT {
                    return None;
                }
                let mut c = range.start();
                loop {
                    let mut buf = [0u8; 4];
                    out.push(c.encode_utf8(&mut buf).as_bytes().to_vec());
                    if c == range.end() {
                        break;
                    }
                    c = char::from_u32(c as u32 + 1)?;
                }
            }
        }
        hir::Class::Bytes(cls) => {
            for range in cls.iter() {
                let span = (range.end() - range.start()) as usize;
                if out.len() + span + 1 > CLASS_LIMIT {
                    return None;
                }
                for b in range.start()..=range.end() {
                    out.push(vec![b]);
                }
            }
        }
    }
    if out.is_empty() {
        return None;
    }
    Some(out)
}

fn repetition_min(kind: &RepetitionKind) -> u32 {
    match kind {
        RepetitionKind::ZeroOrOne | RepetitionKind::ZeroOrMore => 0,
        RepetitionKind::OneOrMore => 1,
        RepetitionKind::Range(RepetitionRange::Exactly(n))
        | RepetitionKind::Range(RepetitionRange::AtLeast(n))
        | RepetitionKind::Range(RepetitionRange::Bounded(n, _)) => *n,
    }
}

fn repetition_factor(kind: &RepetitionKind) -> u64 {
    match kind {
        RepetitionKind::ZeroOrOne => 1,
        RepetitionKind::ZeroOrMore | RepetitionKind::OneOrMore => 2,
        RepetitionKind::Range(RepetitionRange::Exactly(n))
        | RepetitionKind::Range(RepetitionRange::AtLeast(n)) => (*n).max(1) as u64,
        RepetitionKind::Range(RepetitionRange::Bounded(_, m)) => (*m).max(1) as u64,
    }
}

/// Rough count of compiled NFA instructions, mirroring the bound the original
/// enforced on its regex engine's program size.
fn program_size(h: &Hir) -> u64 {
    match h.kind() {
        HirKind::Empty | HirKind::Anchor(_) | HirKind::WordBoundary(_) => 1,
        HirKind::Literal(_) => 1,
        HirKind::Class(_) => 2,
        HirKind::Group(g) => program_size(&g.hir) + 1,
        HirKind::Repetition(rep) => {
            program_size(&rep.hir).saturating_mul(repetition_factor(&rep.kind)) + 1
        }
        HirKind::Concat(list) => list.iter().map(program_size).sum(),
        HirKind::Alternation(list) => {
            list.iter().map(program_size).sum::<u64>() + list.len() as u64
        }
    }
}
