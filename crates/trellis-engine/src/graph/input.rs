use std::fmt;

use trellis_core::error::{Result, TrellisError};

/// Where a node input comes from.
///
/// Parsed once when a node is added to a graph, never per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRef {
    /// One of the enclosing graph's own inputs (at the root: a seed key).
    Parent(String),
    /// The output of a sibling node, optionally narrowed to a field of
    /// that output (`/rag/generate`).
    Sibling { node: String, fields: Vec<String> },
}

impl InputRef {
    /// Parse `name`, `/node` or `/node/field/...`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TrellisError::GraphConstruction(
                "empty input reference".into(),
            ));
        }

        match s.strip_prefix('/') {
            Some(path) => {
                let segments: Vec<&str> = path.split('/').collect();
                if segments.iter().any(|seg| seg.is_empty()) {
                    return Err(TrellisError::GraphConstruction(format!(
                        "malformed input reference '{}'",
                        s
                    )));
                }
                Ok(InputRef::Sibling {
                    node: segments[0].to_string(),
                    fields: segments[1..].iter().map(|f| f.to_string()).collect(),
                })
            }
            None if s.contains('/') => Err(TrellisError::GraphConstruction(format!(
                "input reference '{}' must start with '/' to address a node",
                s
            ))),
            None => Ok(InputRef::Parent(s.to_string())),
        }
    }

    /// The whole output of sibling `node`.
    pub fn sibling(node: impl Into<String>) -> Self {
        InputRef::Sibling {
            node: node.into(),
            fields: Vec::new(),
        }
    }

    /// The sibling node this reference depends on, if any.
    pub fn producer(&self) -> Option<&str> {
        match self {
            InputRef::Sibling { node, .. } => Some(node),
            InputRef::Parent(_) => None,
        }
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputRef::Parent(name) => write!(f, "{}", name),
            InputRef::Sibling { node, fields } => {
                write!(f, "/{}", node)?;
                for field in fields {
                    write!(f, "/{}", field)?;
                }
                Ok(())
            }
        }
    }
}

/// Binds an input reference to one of a node's declared input names.
///
/// Without an explicit local name the binding is positional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMapping {
    pub reference: InputRef,
    pub local_name: Option<String>,
}

impl InputMapping {
    pub fn new(reference: InputRef, local_name: impl Into<String>) -> Self {
        Self {
            reference,
            local_name: Some(local_name.into()),
        }
    }

    pub fn positional(reference: InputRef) -> Self {
        Self {
            reference,
            local_name: None,
        }
    }

    /// Parse `ref` or `ref as local`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(" as ") {
            Some((reference, local)) => {
                let local = local.trim();
                if local.is_empty() {
                    return Err(TrellisError::GraphConstruction(format!(
                        "missing local name in '{}'",
                        s
                    )));
                }
                Ok(Self::new(InputRef::parse(reference)?, local))
            }
            None => Ok(Self::positional(InputRef::parse(s)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parent() {
        assert_eq!(
            InputRef::parse("query").unwrap(),
            InputRef::Parent("query".into())
        );
    }

    #[test]
    fn test_parse_sibling_with_fields() {
        let r = InputRef::parse("/rag/generate").unwrap();
        assert_eq!(
            r,
            InputRef::Sibling {
                node: "rag".into(),
                fields: vec!["generate".into()],
            }
        );
        assert_eq!(r.producer(), Some("rag"));
        assert_eq!(r.to_string(), "/rag/generate");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(InputRef::parse("").is_err());
        assert!(InputRef::parse("/").is_err());
        assert!(InputRef::parse("/a//b").is_err());
        assert!(InputRef::parse("a/b").is_err());
    }

    #[test]
    fn test_mapping_with_local_name() {
        let m = InputMapping::parse("/retriever as contexts").unwrap();
        assert_eq!(m.reference.producer(), Some("retriever"));
        assert_eq!(m.local_name.as_deref(), Some("contexts"));

        let m = InputMapping::parse("/retriever").unwrap();
        assert!(m.local_name.is_none());

        assert!(InputMapping::parse("/retriever as ").is_err());
    }
}
