//! Symmetry constraints.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Orientation of a symmetry axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SymmetryAxis {
    /// Modules mirror left/right about a vertical line.
    Vertical,
    /// Modules mirror bottom/top about a horizontal line.
    Horizontal,
}

impl SymmetryAxis {
    /// The other orientation.
    pub fn flipped(self) -> Self {
        match self {
            Self::Vertical => Self::Horizontal,
            Self::Horizontal => Self::Vertical,
        }
    }
}

/// A group of modules that must be placed symmetrically about one axis.
///
/// Holds symmetry pairs (mirrored about the axis) and self-symmetric
/// modules (centered on it). Every module belongs to at most one group;
/// the loader enforces this.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SymmetryGroup {
    name: String,
    axis: SymmetryAxis,
    pairs: Vec<(String, String)>,
    self_symmetric: Vec<String>,
}

impl SymmetryGroup {
    /// Creates an empty group with the given axis.
    pub fn new(name: impl Into<String>, axis: SymmetryAxis) -> Self {
        Self {
            name: name.into(),
            axis,
            pairs: Vec::new(),
            self_symmetric: Vec::new(),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current axis orientation.
    pub fn axis(&self) -> SymmetryAxis {
        self.axis
    }

    /// Flips the axis orientation. Only the convert-symmetry-type move
    /// calls this; affected trees re-lock and rebuild afterwards.
    pub fn flip_axis(&mut self) {
        self.axis = self.axis.flipped();
    }

    /// Adds a symmetry pair.
    pub fn add_pair(&mut self, a: impl Into<String>, b: impl Into<String>) {
        self.pairs.push((a.into(), b.into()));
    }

    /// Adds a self-symmetric module.
    pub fn add_self_symmetric(&mut self, name: impl Into<String>) {
        self.self_symmetric.push(name.into());
    }

    /// The symmetry pairs of this group.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// The self-symmetric modules of this group.
    pub fn self_symmetric(&self) -> &[String] {
        &self.self_symmetric
    }

    /// Iterates over every module name in the group.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.pairs
            .iter()
            .flat_map(|(a, b)| [a.as_str(), b.as_str()])
            .chain(self.self_symmetric.iter().map(String::as_str))
    }

    /// Returns true if the module belongs to this group.
    pub fn contains(&self, module: &str) -> bool {
        self.member_names().any(|name| name == module)
    }

    /// Returns true if the module is self-symmetric in this group.
    pub fn is_self_symmetric(&self, module: &str) -> bool {
        self.self_symmetric.iter().any(|name| name == module)
    }

    /// The partner of a paired module, if any.
    pub fn partner_of(&self, module: &str) -> Option<&str> {
        for (a, b) in &self.pairs {
            if a == module {
                return Some(b);
            }
            if b == module {
                return Some(a);
            }
        }
        None
    }

    /// The default representative of a pair: the lexicographically larger
    /// name. Self-symmetric modules represent themselves.
    pub fn default_representative<'a>(a: &'a str, b: &'a str) -> &'a str {
        if a > b {
            a
        } else {
            b
        }
    }

    /// Number of modules in the group.
    pub fn len(&self) -> usize {
        self.pairs.len() * 2 + self.self_symmetric.len()
    }

    /// Returns true if the group has no modules.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && self.self_symmetric.is_empty()
    }
}
