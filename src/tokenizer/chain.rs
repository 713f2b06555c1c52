/*!
# Tokenized Path Chains

Assembles lexed tokens into notated segments: collection notation (append,
pinned index, pre/post alignment anchor), map slot markers, and the sanitized
token names used as Path-Tree keys. Enforces the single-anchor rule and
validates per-script overrides against the chain.
*/

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::core::{CompileError, Diagnostic, DiagnosticSink};
use crate::scripts::model::{AccessKind, OverrideSpec};

use super::lexer::{lex_chain, ChainToken, Lexed, IDENT_RE};

/// Whether an anchor's companion index precedes or follows the `~`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorKind {
    /// `[~]` or `[~N]`: the offset counter starts at N (default 0)
    Pre,
    /// `[N~]`: the first N slots stay pinned before the pivot takes over
    Post,
}

/// Collection notation stripped from one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionNotation {
    /// `[]`: iterate, or append at end on the target side
    Append,
    /// `[N]`: pinned index, never looped
    Index(usize),
    /// `[~]`, `[~N]`, `[N~]`: alignment pivot
    Anchor { kind: AnchorKind, start: usize },
}

impl CollectionNotation {
    pub fn is_pinned(&self) -> bool {
        matches!(self, CollectionNotation::Index(_))
    }

    pub fn is_anchor(&self) -> bool {
        matches!(self, CollectionNotation::Anchor { .. })
    }
}

/// Map slot marker stripped from one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapSlot {
    Key,
    Value,
}

/// One sanitized segment with its recorded notation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSegment {
    pub name: String,
    pub collection: Option<CollectionNotation>,
    pub map_slot: Option<MapSlot>,
}

impl ChainSegment {
    /// A level the alignment algorithm drives with a loop variable, the
    /// offset counter, or a map ordinal. Pinned indexes are excluded.
    pub fn is_iterated(&self) -> bool {
        match (self.collection, self.map_slot) {
            (Some(CollectionNotation::Index(_)), _) => false,
            (Some(_), _) => true,
            (None, Some(_)) => true,
            (None, None) => false,
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self.collection, Some(CollectionNotation::Index(_)))
    }

    /// Any collection or map notation at all.
    pub fn has_notation(&self) -> bool {
        self.collection.is_some() || self.map_slot.is_some()
    }
}

impl fmt::Display for ChainSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        match self.collection {
            Some(CollectionNotation::Append) => write!(f, "[]")?,
            Some(CollectionNotation::Index(n)) => write!(f, "[{}]", n)?,
            Some(CollectionNotation::Anchor {
                kind: AnchorKind::Pre,
                start,
            }) => {
                if start == 0 {
                    write!(f, "[~]")?
                } else {
                    write!(f, "[~{}]", start)?
                }
            }
            Some(CollectionNotation::Anchor {
                kind: AnchorKind::Post,
                start,
            }) => write!(f, "[{}~]", start)?,
            None => {}
        }
        match self.map_slot {
            Some(MapSlot::Key) => write!(f, "<K>")?,
            Some(MapSlot::Value) => write!(f, "<V>")?,
            None => {}
        }
        Ok(())
    }
}

/// A fully tokenized chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedChain {
    pub raw: String,
    pub segments: Vec<ChainSegment>,
    /// Segment index of the single alignment anchor, if any
    pub anchor: Option<usize>,
}

impl TokenizedChain {
    /// Tokenizes one raw chain; syntax failures name the owning script.
    pub fn tokenize(script_id: &str, raw: &str) -> Result<TokenizedChain, CompileError> {
        let tokens = lex_chain(raw)
            .map_err(|msg| CompileError::syntax(script_id, msg).at_path(raw))?;
        Parser {
            script_id,
            raw,
            tokens: &tokens,
            pos: 0,
        }
        .parse()
    }

    /// Dotted sanitized names; re-tokenizing this form is idempotent.
    pub fn sanitized(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Dotted sanitized prefix through segment `idx` inclusive.
    pub fn token_path_to(&self, idx: usize) -> String {
        self.segments[..=idx]
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Number of iterated collection/map levels (pinned levels excluded).
    pub fn iterated_depth(&self) -> usize {
        self.segments.iter().filter(|s| s.is_iterated()).count()
    }

    /// Whether any segment carries collection or map notation.
    pub fn has_nesting(&self) -> bool {
        self.segments.iter().any(|s| s.has_notation())
    }

    /// Position of the anchored segment among iterated levels.
    pub fn anchor_level(&self) -> Option<usize> {
        let anchor = self.anchor?;
        Some(
            self.segments[..anchor]
                .iter()
                .filter(|s| s.is_iterated())
                .count(),
        )
    }

    pub fn leaf(&self) -> &ChainSegment {
        self.segments.last().expect("chain has at least one segment")
    }
}

impl fmt::Display for TokenizedChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
            first = false;
        }
        Ok(())
    }
}

struct Parser<'a> {
    script_id: &'a str,
    raw: &'a str,
    tokens: &'a [Lexed],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Lexed> {
        self.tokens.get(self.pos)
    }

    // the returned token borrows the slice, not the parser
    fn bump(&mut self) -> Option<&'a Lexed> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.script_id, message).at_path(self.raw)
    }

    fn parse(mut self) -> Result<TokenizedChain, CompileError> {
        let mut segments = Vec::new();
        let mut anchor = None;

        loop {
            let segment = self.parse_segment(&mut anchor, segments.len())?;
            segments.push(segment);
            match self.bump() {
                None => break,
                Some(t) if t.token == ChainToken::Dot => {
                    if self.peek().is_none() {
                        return Err(self.err("chain ends with a dangling '.'"));
                    }
                }
                Some(t) => {
                    return Err(self.err(format!("unexpected '{}' after segment", t.text)))
                }
            }
        }

        if segments.is_empty() {
            return Err(self.err("empty path chain"));
        }

        Ok(TokenizedChain {
            raw: self.raw.to_string(),
            segments,
            anchor,
        })
    }

    fn parse_segment(
        &mut self,
        anchor: &mut Option<usize>,
        segment_index: usize,
    ) -> Result<ChainSegment, CompileError> {
        let name = match self.bump() {
            Some(t) if t.token == ChainToken::Ident => t.text.clone(),
            Some(t) if t.token == ChainToken::Anchor => {
                return Err(self.err("alignment anchor outside collection brackets"));
            }
            Some(t) => return Err(self.err(format!("expected field name, found '{}'", t.text))),
            None => return Err(self.err("expected field name")),
        };
        debug_assert!(IDENT_RE.is_match(&name));

        let mut collection = None;
        let mut map_slot = None;

        while let Some(next) = self.peek() {
            match next.token {
                ChainToken::OpenBracket => {
                    self.bump();
                    match self.parse_bracket_group(&name)? {
                        BracketContent::Collection(notation) => {
                            if collection.is_some() {
                                return Err(self.err(format!(
                                    "segment '{}' carries more than one bracket group",
                                    name
                                )));
                            }
                            collection = Some(notation);
                        }
                        BracketContent::Slot(slot) => {
                            if map_slot.is_some() {
                                return Err(self.err(format!(
                                    "segment '{}' carries more than one map slot marker",
                                    name
                                )));
                            }
                            map_slot = Some(slot);
                        }
                    }
                }
                ChainToken::KeySlot | ChainToken::ValueSlot => {
                    if map_slot.is_some() {
                        return Err(self.err(format!(
                            "segment '{}' carries more than one map slot marker",
                            name
                        )));
                    }
                    map_slot = Some(if next.token == ChainToken::KeySlot {
                        MapSlot::Key
                    } else {
                        MapSlot::Value
                    });
                    self.bump();
                }
                ChainToken::Anchor => {
                    return Err(self.err("alignment anchor outside collection brackets"));
                }
                _ => break,
            }
        }

        if matches!(collection, Some(CollectionNotation::Anchor { .. })) {
            if anchor.is_some() {
                return Err(self.err("a chain may carry at most one alignment anchor"));
            }
            *anchor = Some(segment_index);
        }

        Ok(ChainSegment {
            name,
            collection,
            map_slot,
        })
    }

    fn parse_bracket_group(&mut self, segment: &str) -> Result<BracketContent, CompileError> {
        let mut index: Option<usize> = None;
        let mut tilde_at: Option<bool> = None; // Some(true) = tilde before index
        let mut slot: Option<MapSlot> = None;

        loop {
            match self.bump() {
                Some(t) if t.token == ChainToken::CloseBracket => break,
                Some(t)
                    if t.token == ChainToken::KeySlot || t.token == ChainToken::ValueSlot =>
                {
                    if slot.is_some() || index.is_some() || tilde_at.is_some() {
                        return Err(self.err(format!(
                            "map slot marker cannot be combined with other notation in segment '{}'",
                            segment
                        )));
                    }
                    slot = Some(if t.token == ChainToken::KeySlot {
                        MapSlot::Key
                    } else {
                        MapSlot::Value
                    });
                }
                Some(t) if t.token == ChainToken::Number => {
                    if slot.is_some() {
                        return Err(self.err(format!(
                            "map slot marker cannot be combined with other notation in segment '{}'",
                            segment
                        )));
                    }
                    if index.is_some() {
                        return Err(self.err(format!(
                            "segment '{}' has more than one index in brackets",
                            segment
                        )));
                    }
                    index = Some(t.text.parse::<usize>().map_err(|_| {
                        CompileError::syntax(
                            self.script_id,
                            format!("index out of range in segment '{}'", segment),
                        )
                        .at_path(self.raw)
                    })?);
                }
                Some(t) if t.token == ChainToken::Anchor => {
                    if slot.is_some() {
                        return Err(self.err(format!(
                            "map slot marker cannot be combined with other notation in segment '{}'",
                            segment
                        )));
                    }
                    if tilde_at.is_some() {
                        return Err(self.err(format!(
                            "segment '{}' repeats the anchor inside brackets",
                            segment
                        )));
                    }
                    tilde_at = Some(index.is_none());
                }
                Some(t) => {
                    return Err(self.err(format!(
                        "unexpected '{}' inside brackets of segment '{}'",
                        t.text, segment
                    )))
                }
                None => {
                    return Err(self.err(format!("unclosed bracket in segment '{}'", segment)))
                }
            }
        }

        if let Some(slot) = slot {
            return Ok(BracketContent::Slot(slot));
        }

        Ok(BracketContent::Collection(match (tilde_at, index) {
            (None, None) => CollectionNotation::Append,
            (None, Some(n)) => CollectionNotation::Index(n),
            (Some(true), n) => CollectionNotation::Anchor {
                kind: AnchorKind::Pre,
                start: n.unwrap_or(0),
            },
            (Some(false), Some(n)) => CollectionNotation::Anchor {
                kind: AnchorKind::Post,
                start: n,
            },
            (Some(false), None) => unreachable!("post anchor implies a preceding index"),
        }))
    }
}

enum BracketContent {
    Collection(CollectionNotation),
    Slot(MapSlot),
}

/// Override roles that may be attached to one token path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOverride {
    pub concrete_type: Option<String>,
    pub access: Option<AccessKind>,
}

impl NodeOverride {
    pub fn helper_access(&self) -> bool {
        self.access == Some(AccessKind::Helper)
    }
}

/// Per-script overrides keyed by the token path they target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachedOverrides {
    map: HashMap<String, NodeOverride>,
}

impl AttachedOverrides {
    pub fn get(&self, token_path: &str) -> Option<&NodeOverride> {
        self.map.get(token_path)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Validates and attaches a script's overrides to the token paths of its
/// chain. An override path that does not prefix the chain is a syntax error;
/// a second conflicting override for an already-set role is dropped with a
/// warning (the earlier resolution wins).
pub fn attach_overrides(
    chain: &TokenizedChain,
    specs: &[OverrideSpec],
    script_id: &str,
    sink: &mut DiagnosticSink,
) -> Result<AttachedOverrides, CompileError> {
    let mut attached = AttachedOverrides::default();
    for spec in specs {
        let prefix_len = spec.path.split('.').count();
        let is_prefix = prefix_len <= chain.segments.len()
            && spec
                .path
                .split('.')
                .zip(chain.segments.iter())
                .all(|(name, segment)| name == segment.name);
        if !is_prefix {
            return Err(CompileError::syntax(
                script_id,
                format!(
                    "override path '{}' does not prefix chain '{}'",
                    spec.path,
                    chain.sanitized()
                ),
            )
            .at_path(&spec.path));
        }

        let entry = attached.map.entry(spec.path.clone()).or_default();
        if let Some(concrete) = &spec.concrete_type {
            match &entry.concrete_type {
                Some(existing) if existing != concrete => {
                    warn!(
                        script_id,
                        path = %spec.path,
                        kept = %existing,
                        dropped = %concrete,
                        "conflicting concrete-type override ignored"
                    );
                    sink.push(
                        Diagnostic::warning(format!(
                            "conflicting concrete-type override '{}' ignored, keeping '{}'",
                            concrete, existing
                        ))
                        .for_script(script_id)
                        .at_path(&spec.path),
                    );
                }
                Some(_) => {}
                None => entry.concrete_type = Some(concrete.clone()),
            }
        }
        if let Some(access) = spec.access {
            match entry.access {
                Some(existing) if existing != access => {
                    warn!(
                        script_id,
                        path = %spec.path,
                        kept = ?existing,
                        dropped = ?access,
                        "conflicting access override ignored"
                    );
                    sink.push(
                        Diagnostic::warning(format!(
                            "conflicting access override '{:?}' ignored, keeping '{:?}'",
                            access, existing
                        ))
                        .for_script(script_id)
                        .at_path(&spec.path),
                    );
                }
                Some(_) => {}
                None => entry.access = Some(access),
            }
        }
    }
    Ok(attached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tokenizes_plain_chain() {
        let chain = TokenizedChain::tokenize("s", "customer.fullName").unwrap();
        assert_eq!(chain.segments.len(), 2);
        assert_eq!(chain.sanitized(), "customer.fullName");
        assert_eq!(chain.iterated_depth(), 0);
        assert!(chain.anchor.is_none());
    }

    #[test]
    fn tokenizes_collection_and_anchor_notation() {
        let chain = TokenizedChain::tokenize("s", "rows[~].cells[].value").unwrap();
        assert_eq!(chain.sanitized(), "rows.cells.value");
        assert_eq!(chain.iterated_depth(), 2);
        assert_eq!(chain.anchor, Some(0));
        assert_eq!(chain.anchor_level(), Some(0));
        assert_eq!(
            chain.segments[0].collection,
            Some(CollectionNotation::Anchor {
                kind: AnchorKind::Pre,
                start: 0
            })
        );
    }

    #[test]
    fn pinned_levels_do_not_count_as_iterated() {
        let chain = TokenizedChain::tokenize("s", "rows[2].cells[].value").unwrap();
        assert_eq!(chain.iterated_depth(), 1);
        assert!(chain.segments[0].is_pinned());
    }

    #[test]
    fn map_slots_are_iterated_levels() {
        let chain = TokenizedChain::tokenize("s", "labels<K>").unwrap();
        assert_eq!(chain.segments[0].map_slot, Some(MapSlot::Key));
        assert_eq!(chain.iterated_depth(), 1);

        // the bracketed spelling is equivalent
        let bracketed = TokenizedChain::tokenize("s", "labels[<V>]").unwrap();
        assert_eq!(bracketed.segments[0].map_slot, Some(MapSlot::Value));
        assert!(TokenizedChain::tokenize("s", "labels[0<K>]").is_err());
    }

    #[test]
    fn pre_and_post_anchor_forms() {
        let pre = TokenizedChain::tokenize("s", "rows[~3]").unwrap();
        assert_eq!(
            pre.segments[0].collection,
            Some(CollectionNotation::Anchor {
                kind: AnchorKind::Pre,
                start: 3
            })
        );
        let post = TokenizedChain::tokenize("s", "rows[3~]").unwrap();
        assert_eq!(
            post.segments[0].collection,
            Some(CollectionNotation::Anchor {
                kind: AnchorKind::Post,
                start: 3
            })
        );
    }

    #[test]
    fn second_anchor_is_a_syntax_error() {
        let err = TokenizedChain::tokenize("s7", "rows[~].cells[~]").unwrap_err();
        assert_eq!(err.script_id(), "s7");
        assert!(err.to_string().contains("at most one alignment anchor"));
    }

    #[test]
    fn anchor_outside_brackets_is_a_syntax_error() {
        let err = TokenizedChain::tokenize("s", "rows~.cells").unwrap_err();
        assert!(err.to_string().contains("outside collection brackets"));
    }

    #[test]
    fn retokenizing_sanitized_form_is_idempotent() {
        let chain = TokenizedChain::tokenize("s", "rows[~1].cells[].value").unwrap();
        let sanitized = chain.sanitized();
        let again = TokenizedChain::tokenize("s", &sanitized).unwrap();
        assert_eq!(again.sanitized(), sanitized);
        let names: Vec<_> = chain.segments.iter().map(|s| s.name.clone()).collect();
        let names2: Vec<_> = again.segments.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, names2);
    }

    #[test]
    fn stray_tokens_are_reported_with_their_text() {
        let err = TokenizedChain::tokenize("s", "rows]x").unwrap_err();
        assert!(err.to_string().contains("unexpected ']' after segment"));

        let err = TokenizedChain::tokenize("s", ".name").unwrap_err();
        assert!(err.to_string().contains("expected field name, found '.'"));

        let err = TokenizedChain::tokenize("s", "rows[x]").unwrap_err();
        assert!(err.to_string().contains("unexpected 'x' inside brackets"));
    }

    #[test]
    fn override_must_prefix_chain() {
        let chain = TokenizedChain::tokenize("s", "rows[].value").unwrap();
        let mut sink = DiagnosticSink::new();
        let bad = vec![OverrideSpec {
            path: "cells".into(),
            concrete_type: Some("DenseRow".into()),
            access: None,
        }];
        assert!(attach_overrides(&chain, &bad, "s", &mut sink).is_err());
    }

    #[test]
    fn conflicting_override_warns_and_keeps_first() {
        let chain = TokenizedChain::tokenize("s", "rows[].value").unwrap();
        let mut sink = DiagnosticSink::new();
        let specs = vec![
            OverrideSpec {
                path: "rows".into(),
                concrete_type: Some("DenseRow".into()),
                access: None,
            },
            OverrideSpec {
                path: "rows".into(),
                concrete_type: Some("SparseRow".into()),
                access: None,
            },
        ];
        let attached = attach_overrides(&chain, &specs, "s", &mut sink).unwrap();
        assert_eq!(
            attached.get("rows").unwrap().concrete_type.as_deref(),
            Some("DenseRow")
        );
        assert_eq!(sink.warning_count(), 1);
    }

    #[test]
    fn conflicting_access_override_keeps_first() {
        let chain = TokenizedChain::tokenize("s", "rows[].value").unwrap();
        let access = |kind| OverrideSpec {
            path: "rows".into(),
            concrete_type: None,
            access: Some(kind),
        };

        // default recorded first: the later helper request is dropped
        let mut sink = DiagnosticSink::new();
        let specs = vec![access(AccessKind::Default), access(AccessKind::Helper)];
        let attached = attach_overrides(&chain, &specs, "s", &mut sink).unwrap();
        assert!(!attached.get("rows").unwrap().helper_access());
        assert_eq!(sink.warning_count(), 1);

        // helper recorded first: the later default request is dropped
        let mut sink = DiagnosticSink::new();
        let specs = vec![access(AccessKind::Helper), access(AccessKind::Default)];
        let attached = attach_overrides(&chain, &specs, "s", &mut sink).unwrap();
        assert!(attached.get("rows").unwrap().helper_access());
        assert_eq!(sink.warning_count(), 1);
    }
}
