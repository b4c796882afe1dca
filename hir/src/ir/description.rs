//! Graph descriptions
//!
//! A JSON form of a block graph: labelled blocks with flags, a terminator
//! kind, successors and covering handlers, plus the standard and OSR entries.
//! Descriptions are materialized through [`HirBuilder`], so the resulting
//! graph obeys the same construction rules as one built from bytecode.
//!
//! ```json
//! {
//!   "name": "count",
//!   "entry": "entry",
//!   "blocks": {
//!     "entry":  { "end": "goto",   "successors": ["header"] },
//!     "header": { "end": "if",     "successors": ["body", "exit"], "flags": ["plh"] },
//!     "body":   { "end": "goto",   "successors": ["header"] },
//!     "exit":   { "end": "return" }
//!   }
//! }
//! ```

use super::{BlockEnd, BlockFlags, BlockId, Condition, ConstantValue, HirBuilder, HirGraph, MethodInfo};
use crate::error::{HirError, StructuralError};
use crate::HirOptions;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_name() -> String {
    "described".to_string()
}

/// A whole method graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDescription {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub max_locals: usize,
    #[serde(default)]
    pub max_stack: usize,
    /// Label of the standard entry block
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osr_entry: Option<String>,
    /// Split critical edges after construction, as the ordering pass expects
    #[serde(default)]
    pub split_critical_edges: bool,
    /// Blocks in creation order
    pub blocks: IndexMap<String, BlockDescription>,
}

/// One block of a [`GraphDescription`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockDescription {
    /// Defaults to the block's position in the description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bci: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    pub end: TerminatorKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub successors: Vec<String>,
    /// Exception handlers covering this block
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatorKind {
    Goto,
    If,
    /// Table switch; the last successor is the default
    Switch,
    Return,
    Throw,
}

impl TerminatorKind {
    fn accepts(self, successors: usize) -> bool {
        match self {
            TerminatorKind::Goto => successors == 1,
            TerminatorKind::If => successors == 2,
            TerminatorKind::Switch => successors >= 1,
            TerminatorKind::Return | TerminatorKind::Throw => successors == 0,
        }
    }
}

impl fmt::Display for TerminatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminatorKind::Goto => "goto",
            TerminatorKind::If => "if",
            TerminatorKind::Switch => "switch",
            TerminatorKind::Return => "return",
            TerminatorKind::Throw => "throw",
        };
        write!(f, "{}", name)
    }
}

/// Errors from reading or materializing a description.
#[derive(Debug)]
pub enum DescriptionError {
    Json(serde_json::Error),
    UnknownBlock(String),
    UnknownFlag { block: String, flag: String },
    Arity {
        block: String,
        end: TerminatorKind,
        successors: usize,
    },
    Hir(HirError),
}

impl fmt::Display for DescriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptionError::Json(err) => write!(f, "invalid graph description: {}", err),
            DescriptionError::UnknownBlock(label) => write!(f, "unknown block '{}'", label),
            DescriptionError::UnknownFlag { block, flag } => {
                write!(f, "block '{}': unknown flag '{}'", block, flag)
            }
            DescriptionError::Arity {
                block,
                end,
                successors,
            } => write!(f, "block '{}': {} cannot have {} successors", block, end, successors),
            DescriptionError::Hir(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for DescriptionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DescriptionError::Json(err) => Some(err),
            DescriptionError::Hir(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DescriptionError {
    fn from(err: serde_json::Error) -> Self {
        DescriptionError::Json(err)
    }
}

impl From<HirError> for DescriptionError {
    fn from(err: HirError) -> Self {
        DescriptionError::Hir(err)
    }
}

impl From<StructuralError> for DescriptionError {
    fn from(err: StructuralError) -> Self {
        DescriptionError::Hir(err.into())
    }
}

/// A materialized description with its label map.
#[derive(Debug, Clone)]
pub struct DescribedGraph {
    pub graph: HirGraph,
    pub labels: IndexMap<String, BlockId>,
}

impl DescribedGraph {
    /// Block created for `label`.
    pub fn id(&self, label: &str) -> Option<BlockId> {
        self.labels.get(label).copied()
    }

    /// Label of `block`, or `None` for blocks the builder added itself.
    pub fn label(&self, block: BlockId) -> Option<&str> {
        self.labels
            .iter()
            .find(|(_, &id)| id == block)
            .map(|(label, _)| label.as_str())
    }

    /// Labels of `blocks`, falling back to the block id.
    pub fn labels_of(&self, blocks: &[BlockId]) -> Vec<String> {
        blocks
            .iter()
            .map(|&b| self.label(b).map_or_else(|| b.to_string(), str::to_string))
            .collect()
    }
}

impl GraphDescription {
    pub fn from_json(text: &str) -> Result<Self, DescriptionError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, DescriptionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn resolve(&self, labels: &IndexMap<String, BlockId>, label: &str) -> Result<BlockId, DescriptionError> {
        labels
            .get(label)
            .copied()
            .ok_or_else(|| DescriptionError::UnknownBlock(label.to_string()))
    }

    /// Build the graph. Blocks are created in description order, so block
    /// ids follow it; the start block (and an entry header, if the entry has
    /// predecessors) come after them.
    pub fn build(&self, options: HirOptions) -> Result<DescribedGraph, DescriptionError> {
        let method = MethodInfo::new(self.name.clone(), self.max_locals, self.max_stack);
        let mut builder = HirBuilder::new(method, options);
        let mut labels = IndexMap::with_capacity(self.blocks.len());

        for (index, (label, block)) in self.blocks.iter().enumerate() {
            let mut flags = BlockFlags::empty();
            for name in &block.flags {
                flags |= BlockFlags::from_label(name).ok_or_else(|| DescriptionError::UnknownFlag {
                    block: label.clone(),
                    flag: name.clone(),
                })?;
            }
            if !block.end.accepts(block.successors.len()) {
                return Err(DescriptionError::Arity {
                    block: label.clone(),
                    end: block.end,
                    successors: block.successors.len(),
                });
            }
            let bci = block.bci.unwrap_or(index as i32);
            labels.insert(label.clone(), builder.create_block_with_flags(bci, flags));
        }

        // handler targets are exception entries whether or not they say so
        for block in self.blocks.values() {
            for handler in &block.handlers {
                let id = self.resolve(&labels, handler)?;
                builder.graph_mut().block_mut(id).set_flag(BlockFlags::EXCEPTION_ENTRY);
            }
        }

        for (label, block) in &self.blocks {
            let id = self.resolve(&labels, label)?;
            let successors = block
                .successors
                .iter()
                .map(|s| self.resolve(&labels, s))
                .collect::<Result<Vec<_>, _>>()?;
            for handler in &block.handlers {
                let handler = self.resolve(&labels, handler)?;
                builder.add_exception_handler(id, handler)?;
                let state = builder.graph().new_state();
                builder.graph_mut().add_exception_state(handler, state)?;
            }

            builder.switch_to_block(id)?;
            let state = builder.graph().new_state();
            let end = match block.end {
                TerminatorKind::Goto => BlockEnd::goto(successors[0]),
                TerminatorKind::If => {
                    let x = builder.constant(ConstantValue::Int(0))?;
                    BlockEnd::if_(x, Condition::Eq, x, successors[0], successors[1])
                }
                TerminatorKind::Switch => {
                    let key = builder.constant(ConstantValue::Int(0))?;
                    let (default, cases) = match successors.split_last() {
                        Some(split) => split,
                        None => return Err(DescriptionError::UnknownBlock(label.clone())),
                    };
                    BlockEnd::table_switch(key, 0, cases, *default)
                }
                TerminatorKind::Return => BlockEnd::return_(None),
                TerminatorKind::Throw => {
                    let exception = builder.constant(ConstantValue::Null)?;
                    BlockEnd::throw(exception)
                }
            };
            builder.terminate(end.with_state_after(state))?;
        }

        let entry = self.resolve(&labels, &self.entry)?;
        let osr = self
            .osr_entry
            .as_deref()
            .map(|label| self.resolve(&labels, label))
            .transpose()?;
        builder.finish_start(entry, osr)?;

        let mut graph = builder.finish();
        if self.split_critical_edges {
            graph.split_critical_edges()?;
        }
        Ok(DescribedGraph { graph, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP: &str = r#"{
        "name": "count",
        "entry": "entry",
        "blocks": {
            "entry":  { "end": "goto", "successors": ["header"] },
            "header": { "end": "if", "successors": ["body", "exit"], "flags": ["plh"] },
            "body":   { "end": "goto", "successors": ["header"], "handlers": ["catch"] },
            "catch":  { "end": "throw" },
            "exit":   { "end": "return" }
        }
    }"#;

    #[test]
    fn test_build_loop() {
        let desc = GraphDescription::from_json(LOOP).unwrap();
        let built = desc.build(HirOptions::default()).unwrap();
        let g = &built.graph;
        let header = built.id("header").unwrap();
        let body = built.id("body").unwrap();
        let catch = built.id("catch").unwrap();

        assert_eq!(header, BlockId(1));
        assert!(g.block(header).is_parser_loop_header());
        assert_eq!(g.block(header).predecessors(), &[BlockId(0), body]);
        assert!(g.block(catch).is_exception_entry());
        assert_eq!(g.block(body).exception_handlers(), &[catch]);
        assert_eq!(g.block(catch).exception_states().len(), 1);

        let start = g.start().unwrap();
        assert_eq!(built.label(start), None);
        assert_eq!(g.successors(start), &[built.id("entry").unwrap()]);
        assert_eq!(crate::ir::validation::validate_graph(g), Ok(()));
    }

    #[test]
    fn test_round_trip_keeps_block_order() {
        let desc = GraphDescription::from_json(LOOP).unwrap();
        let again = GraphDescription::from_json(&desc.to_json().unwrap()).unwrap();
        assert_eq!(desc, again);
        let order: Vec<_> = again.blocks.keys().cloned().collect();
        assert_eq!(order, ["entry", "header", "body", "catch", "exit"]);
    }

    #[test]
    fn test_rejects_bad_descriptions() {
        let unknown = r#"{ "entry": "a", "blocks": { "a": { "end": "goto", "successors": ["b"] } } }"#;
        let err = GraphDescription::from_json(unknown)
            .unwrap()
            .build(HirOptions::default())
            .unwrap_err();
        assert!(matches!(err, DescriptionError::UnknownBlock(ref b) if b == "b"));

        let arity = r#"{ "entry": "a", "blocks": { "a": { "end": "return", "successors": ["a"] } } }"#;
        let err = GraphDescription::from_json(arity)
            .unwrap()
            .build(HirOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("return cannot have 1 successors"));

        let flag = r#"{ "entry": "a", "blocks": { "a": { "end": "return", "flags": ["hot"] } } }"#;
        let err = GraphDescription::from_json(flag)
            .unwrap()
            .build(HirOptions::default())
            .unwrap_err();
        assert!(matches!(err, DescriptionError::UnknownFlag { .. }));

        assert!(matches!(
            GraphDescription::from_json(r#"{ "blocks": {} }"#),
            Err(DescriptionError::Json(_))
        ));
    }
}
