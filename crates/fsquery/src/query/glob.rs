//! Compiled glob trees.
//!
//! User glob patterns are split on `/` and merged into a tree so patterns
//! sharing literal prefixes walk the directory tree together. Literal
//! components match children by hash lookup; wildcard components are
//! compiled per-fragment and applied to every child; `**` components fork
//! during evaluation (see the glob generator).

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};

/// Wildmatch evaluation flags.
///
/// The default is case-sensitive path-mode without the period restriction.
#[derive(Debug, Clone, Copy)]
pub struct GlobFlags {
    pub case_sensitive: bool,
    /// When false, a leading `.` only matches when the pattern spells it
    /// out (hidden files require an explicit period).
    pub include_dot_files: bool,
}

impl Default for GlobFlags {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            include_dot_files: true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum GlobToken {
    Literal(String),
    Pattern(Pattern),
    DoubleStar,
}

impl PartialEq for GlobToken {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            (Self::DoubleStar, Self::DoubleStar) => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct GlobNode {
    pub(crate) token: GlobToken,
    pub(crate) children: Vec<GlobNode>,
    /// A pattern ends at this node; files may match here.
    pub(crate) is_leaf: bool,
}

/// The compiled form of a query's glob patterns.
#[derive(Debug)]
pub struct GlobTree {
    pub(crate) roots: Vec<GlobNode>,
    pub(crate) options: MatchOptions,
    pub(crate) case_sensitive: bool,
}

impl GlobTree {
    pub fn compile(patterns: &[String], flags: GlobFlags) -> Result<Self> {
        let mut roots = Vec::new();
        for pattern in patterns {
            let tokens = tokenize(pattern)?;
            insert(&mut roots, &tokens);
        }
        Ok(Self {
            roots,
            options: MatchOptions {
                case_sensitive: flags.case_sensitive,
                require_literal_separator: true,
                require_literal_leading_dot: !flags.include_dot_files,
            },
            case_sensitive: flags.case_sensitive,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

fn tokenize(pattern: &str) -> Result<Vec<GlobToken>> {
    if pattern.is_empty() {
        return Err(Error::Parse("glob pattern must not be empty".into()));
    }
    let mut tokens = Vec::new();
    for comp in pattern.split('/') {
        if comp.is_empty() {
            return Err(Error::Parse(format!(
                "glob '{pattern}' contains an empty path component"
            )));
        }
        let token = if comp == "**" {
            GlobToken::DoubleStar
        } else if comp.contains(['*', '?', '[']) {
            GlobToken::Pattern(Pattern::new(comp).map_err(|err| {
                Error::Parse(format!("failed to compile glob fragment '{comp}': {err}"))
            })?)
        } else {
            GlobToken::Literal(comp.to_string())
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn insert(nodes: &mut Vec<GlobNode>, tokens: &[GlobToken]) {
    let [first, rest @ ..] = tokens else {
        return;
    };
    let idx = match nodes.iter().position(|node| node.token == *first) {
        Some(idx) => idx,
        None => {
            nodes.push(GlobNode {
                token: first.clone(),
                children: Vec::new(),
                is_leaf: false,
            });
            nodes.len() - 1
        }
    };
    if rest.is_empty() {
        nodes[idx].is_leaf = true;
    } else {
        insert(&mut nodes[idx].children, rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(patterns: &[&str]) -> GlobTree {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        GlobTree::compile(&patterns, GlobFlags::default()).unwrap()
    }

    #[test]
    fn shared_literal_prefixes_merge() {
        let tree = compile(&["src/a.rs", "src/b.rs"]);
        assert_eq!(tree.roots.len(), 1);
        assert!(matches!(&tree.roots[0].token, GlobToken::Literal(l) if l == "src"));
        assert_eq!(tree.roots[0].children.len(), 2);
        assert!(tree.roots[0].children.iter().all(|n| n.is_leaf));
    }

    #[test]
    fn doublestar_and_pattern_tokens() {
        let tree = compile(&["**/*.cpp"]);
        assert_eq!(tree.roots.len(), 1);
        assert!(matches!(tree.roots[0].token, GlobToken::DoubleStar));
        let child = &tree.roots[0].children[0];
        assert!(matches!(&child.token, GlobToken::Pattern(p) if p.as_str() == "*.cpp"));
        assert!(child.is_leaf);
    }

    #[test]
    fn prefix_and_longer_pattern_both_leaf() {
        let tree = compile(&["src", "src/lib.rs"]);
        assert!(tree.roots[0].is_leaf);
        assert!(tree.roots[0].children[0].is_leaf);
    }

    #[test]
    fn empty_components_rejected() {
        let patterns = vec!["a//b".to_string()];
        assert!(GlobTree::compile(&patterns, GlobFlags::default()).is_err());
        let patterns = vec!["".to_string()];
        assert!(GlobTree::compile(&patterns, GlobFlags::default()).is_err());
    }

    #[test]
    fn bad_fragment_rejected() {
        let patterns = vec!["src/[".to_string()];
        assert!(GlobTree::compile(&patterns, GlobFlags::default()).is_err());
    }
}
